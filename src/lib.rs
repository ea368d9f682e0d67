//! Merit: multi-stage review of student credit claims.
//!
//! Records (volunteer hours, competition and research applications) pass
//! three review stages before approval. Admins may override a decided
//! record. Teacher projects take student selections up to a fixed number
//! of slots.
//!
//! [`review`] holds the pure state machine, [`storage`] persists records
//! with optimistic concurrency, and [`workflow::Desk`] ties the two together
//! with authorization and notifications.

pub mod cli;
pub mod config;
pub mod identity;
pub mod model;
pub mod review;
pub mod selection;
pub mod storage;
pub mod workflow;

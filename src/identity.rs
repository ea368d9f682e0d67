//! Actor resolution for Merit commands.
//!
//! Every command that touches a record needs to know who is acting and in
//! which role. Rather than requiring `--as` and `--role` on every invocation,
//! both are resolved through a chain:
//!
//! 1. `--as <identity>` / `--role <role>`: explicit per-command override
//! 2. `MERIT_IDENTITY` / `MERIT_ROLE` env vars: process/session level
//! 3. `default-identity` / `default-role` in the config file
//!
//! The identity is recorded verbatim as the reviewer on trail events.

use std::env;

use crate::config::Config;
use crate::model::{Actor, Role};

/// Error message shown when identity cannot be resolved.
pub const IDENTITY_REQUIRED: &str = "identity required: pass --as <identity>, \
    set MERIT_IDENTITY, or add `default-identity = \"...\"` to ~/.merit/config.toml";

/// Error message shown when role cannot be resolved.
pub const ROLE_REQUIRED: &str = "role required: pass --role <student|teacher|admin>, \
    set MERIT_ROLE, or add `default-role = \"...\"` to ~/.merit/config.toml";

/// Resolve the acting identity and role from the tiered chain.
pub fn resolve_actor(
    identity: Option<&str>,
    role: Option<&str>,
    config: &Config,
) -> Result<Actor, String> {
    resolve_with(identity, role, config, |key| env::var(key).ok())
}

fn resolve_with(
    identity: Option<&str>,
    role: Option<&str>,
    config: &Config,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Actor, String> {
    let identity = identity
        .map(str::to_string)
        .or_else(|| env("MERIT_IDENTITY"))
        .or_else(|| config.default_identity.clone())
        .filter(|id| !id.trim().is_empty())
        .ok_or(IDENTITY_REQUIRED)?;

    let role = match role.map(str::to_string).or_else(|| env("MERIT_ROLE")) {
        Some(r) if !r.is_empty() => r.parse::<Role>()?,
        _ => config.default_role.ok_or(ROLE_REQUIRED)?,
    };

    Ok(Actor::new(identity, role))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn explicit_wins() {
        let config = Config {
            default_identity: Some("admin".into()),
            default_role: Some(Role::Admin),
            ..Config::default()
        };
        let env = |key: &str| (key == "MERIT_IDENTITY").then(|| "from-env".to_string());

        let actor = resolve_with(Some("teacherA"), Some("Teacher"), &config, env).unwrap();
        assert_eq!(actor, Actor::new("teacherA", Role::Teacher));
    }

    #[test]
    fn env_beats_config() {
        let config = Config {
            default_identity: Some("admin".into()),
            default_role: Some(Role::Admin),
            ..Config::default()
        };
        let env = |key: &str| match key {
            "MERIT_IDENTITY" => Some("lihua@example.com".to_string()),
            "MERIT_ROLE" => Some("student".to_string()),
            _ => None,
        };

        let actor = resolve_with(None, None, &config, env).unwrap();
        assert_eq!(actor, Actor::new("lihua@example.com", Role::Student));
    }

    #[test]
    fn config_is_the_fallback() {
        let config = Config {
            default_identity: Some("admin".into()),
            default_role: Some(Role::Admin),
            ..Config::default()
        };
        let actor = resolve_with(None, None, &config, no_env).unwrap();
        assert_eq!(actor, Actor::new("admin", Role::Admin));
    }

    #[test]
    fn missing_sources_explain_themselves() {
        let config = Config::default();
        assert_eq!(
            resolve_with(None, Some("admin"), &config, no_env).unwrap_err(),
            IDENTITY_REQUIRED
        );
        assert_eq!(
            resolve_with(Some("admin"), None, &config, no_env).unwrap_err(),
            ROLE_REQUIRED
        );
    }

    #[test]
    fn unknown_role_is_an_error() {
        let err = resolve_with(Some("x"), Some("dean"), &Config::default(), no_env).unwrap_err();
        assert!(err.contains("dean"));
    }
}

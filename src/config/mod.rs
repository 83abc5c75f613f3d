//! Runtime environment flag.
//!
//! The only configuration the dispatcher consults is whether it runs in
//! production, which decides if error envelopes carry a `stack` field.

use std::env;
use std::fmt;

/// Environment variable read by [`Environment::from_env`].
pub const ENV_VAR: &str = "APP_ENV";

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    Production,
    #[default]
    Development,
}

impl Environment {
    /// Reads [`ENV_VAR`]; `production` (any case) selects [`Environment::Production`],
    /// anything else or an unset variable selects [`Environment::Development`].
    pub fn from_env() -> Self {
        Self::from_value(env::var(ENV_VAR).ok().as_deref())
    }

    fn from_value(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("production") => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }

    /// Whether error envelopes should include a stack rendering.
    pub fn exposes_stack(self) -> bool {
        !self.is_production()
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Production => "production",
            Self::Development => "development",
        })
    }
}

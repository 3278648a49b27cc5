//! `cloudlift-config` — layered, environment-substituting configuration.
//!
//! Resolution contract:
//!
//! 1. `config.base.json` (required),
//! 2. `config.{environment}.json` layered over it (environment from
//!    `CONFIG_ENV`, default `local`),
//! 3. deep merge: maps merge key-by-key recursively, any non-map override
//!    replaces the base value wholesale,
//! 4. `${VAR}` / `${VAR:default}` substitution over every string value,
//!    recursively through arrays and maps.
//!
//! There is no process-wide cache: a [`ConfigLoader`] is owned by whichever
//! composition root constructs it, and "reload" means constructing a new
//! loader. That keeps test and request state from leaking through a global.

mod loader;
mod substitute;

pub use loader::{AppConfig, ConfigLoader, DEFAULT_ENVIRONMENT, ENVIRONMENT_VAR};
pub use substitute::substitute_value;

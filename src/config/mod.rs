// src/config/mod.rs

//! Configuration loading and validation for niftibatch.
//!
//! - `model.rs`: the TOML-backed data model (`RawConfigFile`) and the
//!   validated `ConfigFile`.
//! - `loader.rs`: reading the file and environment overrides.
//! - `validate.rs`: `TryFrom<RawConfigFile>` plus the duration parser.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{ACCOUNT_KEY_ENV_VAR, load_and_validate, load_from_path, load_or_default};
pub use model::{
    AuthSection, ConfigFile, ExecutorSection, JobSection, RawConfigFile, RawMonitorSection,
    RawServiceSection, ServiceSection,
};
pub use validate::parse_duration;

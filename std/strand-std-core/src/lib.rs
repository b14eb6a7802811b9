//!
//! strand-std-core - Core Runtime Types
//!
//! This crate provides the fundamental types shared across all strand crates:
//!
//! - `Object` - the opaque, reference-counted value stored in thread-local
//!   slots, handed to thread bodies and passed to timer targets
//! - `date` - wall-clock helpers used for fire dates and `sleep_until_date`
//! - `config` - `RuntimeConfig` parsed from a `strand.toml` file
//! - `logging` - installs the tracing subscriber
//!
//! "Null" is always spelled `Option::<Object>::None`.
//!

pub mod config;
pub mod date;
pub mod logging;
pub mod value;

pub use config::{ConfigError, LoggingConfig, RuntimeConfig, ThreadsConfig};
pub use date::Date;
pub use value::*;

//! Logging setup.
//!
//! The engine logs through the `log` facade only; `init_logging` wires it to
//! `env_logger` once, early in `main`.

mod init;

pub use init::{init_logging, LoggingConfig};

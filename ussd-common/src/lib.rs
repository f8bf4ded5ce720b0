//! USSD Common - Shared types and utilities for the USSD router.
//!
//! This crate provides:
//! - Configuration types and loading
//! - The unified error type and its fault classification
//! - Logging setup
//! - Text helpers used by menu handlers

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;

pub use config::{Config, ExpiryConfig, MessagesConfig, ObservabilityConfig, RouterConfig, ServerConfig};
pub use error::{Error, ErrorKind, Result, ResultExt};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::logging::init_logging;
    pub use crate::util::{is_empty_text, new_line_strings};
}

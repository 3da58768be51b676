//! Shared foundations for the ember crates.
//!
//! - Error type and result alias
//! - Logging bootstrap
//! - Frame timer
//! - TOML configuration

pub mod config;
mod error;
mod logging;
mod timer;

pub use config::{EmberConfig, ParticleConfig, PresentModePreference, RenderConfig, WindowConfig};
pub use error::{Error, Result};
pub use logging::{DEFAULT_FILTER, init_logging};
pub use timer::{MAX_FRAME_DELTA, Timer};

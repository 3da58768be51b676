//! TOML configuration.
//!
//! Every field has a default, so an empty file, a partial file and a missing
//! file are all valid. Only malformed TOML or out-of-range values are errors.
//!
//! ```toml
//! [window]
//! width = 1280
//! height = 720
//!
//! [render]
//! present_mode = "fifo"
//! max_msaa_samples = 4
//!
//! [particles]
//! max_particles = 3000
//! seed = 42
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Root of `ember.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmberConfig {
    pub window: WindowConfig,
    pub render: RenderConfig,
    pub particles: ParticleConfig,
}

/// Initial window geometry.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "ember".to_string(),
        }
    }
}

/// Preferred presentation behaviour.
///
/// `Mailbox` still falls back to FIFO when the surface does not offer it.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresentModePreference {
    #[default]
    Mailbox,
    Fifo,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderConfig {
    /// Enable the Khronos validation layer when it is installed.
    pub validation: bool,
    pub present_mode: PresentModePreference,
    pub clear_color: [f32; 4],
    /// Cap on the multisample count; the device maximum is used below it.
    pub max_msaa_samples: u32,
    /// Directory holding the compiled `.spv` modules. Unset means the
    /// directory the renderer's build script compiled them into.
    pub shader_dir: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            validation: cfg!(debug_assertions),
            present_mode: PresentModePreference::Mailbox,
            clear_color: [0.01, 0.01, 0.01, 1.0],
            max_msaa_samples: 64,
            shader_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ParticleConfig {
    pub max_particles: u32,
    /// Particles per second.
    pub emission_rate: f32,
    /// Mean lifetime in seconds.
    pub lifetime: f32,
    pub size: f32,
    pub color: [f32; 3],
    /// Seed for the initial particle distribution. `None` seeds from the clock.
    pub seed: Option<u64>,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            max_particles: 3000,
            emission_rate: 800.0,
            lifetime: 5.0,
            size: 0.05,
            color: [1.0, 0.3, 0.0],
            seed: None,
        }
    }
}

impl EmberConfig {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file, falling back to defaults when it does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => {
                let config = Self::from_toml_str(&text)?;
                info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No configuration at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Reject values the renderer cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        if self.particles.max_particles == 0 {
            return Err(Error::Config("particles.max_particles must be > 0".into()));
        }
        if self.particles.lifetime <= 0.0 {
            return Err(Error::Config("particles.lifetime must be > 0".into()));
        }
        if !self.render.max_msaa_samples.is_power_of_two() || self.render.max_msaa_samples > 64 {
            return Err(Error::Config(format!(
                "render.max_msaa_samples must be a power of two in 1..=64, got {}",
                self.render.max_msaa_samples
            )));
        }
        Ok(())
    }
}

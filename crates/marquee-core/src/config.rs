//! Configuration
//!
//! Texture settings are consulted on every cache decision, so they live behind a
//! shared [`SettingsHandle`] instead of being copied into the components that use them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult, MEGABYTE};

/// Settings that drive texture memory management
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureSettings {
    /// Soft ceiling on GPU-resident texture memory, in megabytes
    pub max_vram_mb: u32,
    /// Decode images no larger than the size they are displayed at
    pub optimize_vram: bool,
    /// Decode textures on the loader threads when their size is known up front
    pub async_images: bool,
    /// Screen width, the fallback downscale bound for raster images
    pub screen_width: u32,
    /// Screen height, the fallback downscale bound for raster images
    pub screen_height: u32,
}

impl Default for TextureSettings {
    fn default() -> Self {
        Self {
            max_vram_mb: 100,
            optimize_vram: true,
            async_images: true,
            screen_width: 1280,
            screen_height: 720,
        }
    }
}

impl TextureSettings {
    /// VRAM budget in bytes
    pub fn max_vram_bytes(&self) -> usize {
        self.max_vram_mb as usize * MEGABYTE
    }

    /// Check the settings for values the cache cannot work with
    pub fn validate(&self) -> CoreResult<()> {
        if self.screen_width == 0 || self.screen_height == 0 {
            return Err(CoreError::InvalidConfig(format!(
                "screen size {}x{} must be non-zero",
                self.screen_width, self.screen_height
            )));
        }
        Ok(())
    }
}

/// Frontend configuration as stored on disk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontendConfig {
    /// Texture memory settings
    pub textures: TextureSettings,
    /// Directories searched, in order, for bundled `:/` resources
    pub resource_roots: Vec<PathBuf>,
    /// Directory for generated thumbnails and the image size cache
    pub cache_dir: Option<PathBuf>,
}

impl FrontendConfig {
    /// Load a configuration file
    pub fn load(path: &Path) -> CoreResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.textures.validate()?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load a configuration file, falling back to defaults when it does not exist
    pub fn load_or_default(path: &Path) -> CoreResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write the configuration as pretty-printed JSON
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Shared, live view of the texture settings
///
/// Cloning the handle shares the underlying settings; updates made through any clone
/// are seen by the next read of every other clone.
#[derive(Debug, Clone, Default)]
pub struct SettingsHandle {
    inner: Arc<RwLock<TextureSettings>>,
}

impl SettingsHandle {
    /// Create a handle over the given settings
    pub fn new(settings: TextureSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(settings)),
        }
    }

    /// Copy of the current settings
    pub fn snapshot(&self) -> TextureSettings {
        self.inner.read().clone()
    }

    /// Current VRAM budget in bytes
    pub fn max_vram_bytes(&self) -> usize {
        self.inner.read().max_vram_bytes()
    }

    /// Whether decode-time downscaling is enabled
    pub fn optimize_vram(&self) -> bool {
        self.inner.read().optimize_vram
    }

    /// Whether textures may be decoded asynchronously
    pub fn async_images(&self) -> bool {
        self.inner.read().async_images
    }

    /// Screen size as (width, height)
    pub fn screen_size(&self) -> (u32, u32) {
        let settings = self.inner.read();
        (settings.screen_width, settings.screen_height)
    }

    /// Modify the settings in place
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut TextureSettings),
    {
        f(&mut self.inner.write());
    }
}

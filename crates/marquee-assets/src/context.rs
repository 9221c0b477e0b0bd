//! Shared services for the texture system
//!
//! One [`TextureContext`] is built at startup and shared (behind an `Arc`) by every
//! texture, the loader threads and the cache.

use std::sync::Arc;

use marquee_core::{FrontendConfig, SettingsHandle, Size2};
use marquee_platform::FileSystem;
use marquee_renderer::TextureBackend;

use crate::decode::DecoderRegistry;
use crate::image_io::ImageSizeCache;

/// Backend, decoders, live settings, size cache and file system
pub struct TextureContext {
    backend: Arc<dyn TextureBackend>,
    decoders: DecoderRegistry,
    settings: SettingsHandle,
    size_cache: ImageSizeCache,
    fs: FileSystem,
}

impl TextureContext {
    /// Create a context with the default decoders and an empty size cache
    pub fn new(backend: Arc<dyn TextureBackend>, settings: SettingsHandle, fs: FileSystem) -> Self {
        Self {
            backend,
            decoders: DecoderRegistry::default(),
            settings,
            size_cache: ImageSizeCache::new(),
            fs,
        }
    }

    /// Create a context from a loaded frontend configuration
    pub fn from_config(backend: Arc<dyn TextureBackend>, config: &FrontendConfig) -> Self {
        let defaults = FileSystem::new();
        let roots = if config.resource_roots.is_empty() {
            defaults.resource_roots().to_vec()
        } else {
            config.resource_roots.clone()
        };
        let cache_dir = config
            .cache_dir
            .clone()
            .unwrap_or_else(|| defaults.cache_dir().to_path_buf());

        Self::new(
            backend,
            SettingsHandle::new(config.textures.clone()),
            FileSystem::with_dirs(roots, cache_dir),
        )
    }

    /// Replace the decoder registry
    pub fn with_decoders(mut self, decoders: DecoderRegistry) -> Self {
        self.decoders = decoders;
        self
    }

    /// Replace the image size cache
    pub fn with_size_cache(mut self, size_cache: ImageSizeCache) -> Self {
        self.size_cache = size_cache;
        self
    }

    /// GPU backend
    pub fn backend(&self) -> &Arc<dyn TextureBackend> {
        &self.backend
    }

    /// Decoders per source kind
    pub fn decoders(&self) -> &DecoderRegistry {
        &self.decoders
    }

    /// Live texture settings
    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    /// Image size cache
    pub fn size_cache(&self) -> &ImageSizeCache {
        &self.size_cache
    }

    /// File system
    pub fn fs(&self) -> &FileSystem {
        &self.fs
    }

    /// Screen size as currently configured
    pub fn screen(&self) -> Size2 {
        let (width, height) = self.settings.screen_size();
        Size2::new(width, height)
    }
}

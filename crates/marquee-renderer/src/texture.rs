//! GPU Textures
//!
//! Texture handles, the backend trait and an in-memory backend.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use ahash::AHashMap;
use marquee_core::MemoryStats;
use parking_lot::Mutex;

use crate::{RendererError, RendererResult, RendererStats};

/// Handle to a texture living on the GPU
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(NonZeroU32);

impl TextureId {
    /// Wrap a raw, non-zero backend handle
    pub fn new(raw: u32) -> Option<Self> {
        NonZeroU32::new(raw).map(Self)
    }

    /// Raw backend handle
    pub fn get(&self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Pixel layout of texture data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureFormat {
    /// 8-bit red, green, blue, alpha
    #[default]
    Rgba,
    /// 8-bit alpha only
    Alpha,
}

impl TextureFormat {
    /// Bytes per pixel
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::Rgba => 4,
            Self::Alpha => 1,
        }
    }
}

/// Everything needed to allocate a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDescriptor {
    /// Pixel layout
    pub format: TextureFormat,
    /// Use linear filtering instead of nearest
    pub linear: bool,
    /// Repeat instead of clamping at the edges
    pub repeat: bool,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl TextureDescriptor {
    /// Descriptor for an RGBA texture
    pub fn rgba(width: u32, height: u32, linear: bool, repeat: bool) -> Self {
        Self {
            format: TextureFormat::Rgba,
            linear,
            repeat,
            width,
            height,
        }
    }

    /// Bytes occupied by a full upload
    pub fn byte_size(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

/// The texture primitives the cache drives
///
/// Implementations are shared between the render thread and the cache, so they must
/// be `Send + Sync`; all calls are made from the render thread in practice.
pub trait TextureBackend: Send + Sync {
    /// Allocate a texture and upload `data` into it
    fn create_texture(&self, desc: &TextureDescriptor, data: &[u8]) -> RendererResult<TextureId>;

    /// Replace a region of an existing texture
    fn update_texture(
        &self,
        id: TextureId,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> RendererResult<()>;

    /// Free a texture
    fn destroy_texture(&self, id: TextureId);

    /// Bind a texture for drawing; `None` unbinds
    fn bind_texture(&self, id: Option<TextureId>);
}

struct Allocation {
    desc: TextureDescriptor,
    bytes: usize,
}

/// In-memory texture backend
///
/// Tracks allocations and binds without touching a GPU. An optional VRAM limit makes
/// `create_texture` fail with [`RendererError::OutOfMemory`] once exceeded.
pub struct HeadlessBackend {
    textures: Mutex<AHashMap<TextureId, Allocation>>,
    bound: Mutex<Option<TextureId>>,
    next_id: AtomicU32,
    vram_limit: Option<usize>,
    memory: MemoryStats,
    created: AtomicU64,
    destroyed: AtomicU64,
    binds: AtomicU64,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    /// Create a backend without a VRAM limit
    pub fn new() -> Self {
        Self {
            textures: Mutex::new(AHashMap::new()),
            bound: Mutex::new(None),
            next_id: AtomicU32::new(1),
            vram_limit: None,
            memory: MemoryStats::new(),
            created: AtomicU64::new(0),
            destroyed: AtomicU64::new(0),
            binds: AtomicU64::new(0),
        }
    }

    /// Create a backend that refuses allocations beyond `bytes`
    pub fn with_vram_limit(bytes: usize) -> Self {
        Self {
            vram_limit: Some(bytes),
            ..Self::new()
        }
    }

    /// Currently bound texture
    pub fn bound(&self) -> Option<TextureId> {
        *self.bound.lock()
    }

    /// Check whether a texture is alive
    pub fn contains(&self, id: TextureId) -> bool {
        self.textures.lock().contains_key(&id)
    }

    /// Descriptor a live texture was created with
    pub fn descriptor(&self, id: TextureId) -> Option<TextureDescriptor> {
        self.textures.lock().get(&id).map(|a| a.desc)
    }

    /// Get renderer statistics
    pub fn stats(&self) -> RendererStats {
        RendererStats {
            texture_count: self.textures.lock().len(),
            textures_created: self.created.load(Ordering::Relaxed),
            textures_destroyed: self.destroyed.load(Ordering::Relaxed),
            binds: self.binds.load(Ordering::Relaxed),
            vram_usage: self.memory.current(),
            vram_peak: self.memory.peak_usage(),
        }
    }
}

impl TextureBackend for HeadlessBackend {
    fn create_texture(&self, desc: &TextureDescriptor, data: &[u8]) -> RendererResult<TextureId> {
        let bytes = desc.byte_size();
        if bytes == 0 {
            return Err(RendererError::TextureCreation(format!(
                "empty texture {}x{}",
                desc.width, desc.height
            )));
        }
        if data.len() < bytes {
            return Err(RendererError::InvalidPixelData {
                expected: bytes,
                actual: data.len(),
            });
        }
        if let Some(limit) = self.vram_limit {
            if self.memory.current() + bytes > limit {
                return Err(RendererError::OutOfMemory);
            }
        }

        let raw = self.next_id.fetch_add(1, Ordering::Relaxed);
        let id = TextureId::new(raw)
            .ok_or_else(|| RendererError::TextureCreation("texture ids exhausted".into()))?;

        self.textures.lock().insert(id, Allocation { desc: *desc, bytes });
        self.memory.record_alloc(bytes);
        self.created.fetch_add(1, Ordering::Relaxed);
        Ok(id)
    }

    fn update_texture(
        &self,
        id: TextureId,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> RendererResult<()> {
        let textures = self.textures.lock();
        let allocation = textures
            .get(&id)
            .ok_or(RendererError::TextureNotFound(id))?;

        let desc = allocation.desc;
        if x + width > desc.width || y + height > desc.height {
            return Err(RendererError::TextureCreation(format!(
                "update region {}x{}+{}+{} outside {}x{} texture",
                width, height, x, y, desc.width, desc.height
            )));
        }
        let expected = width as usize * height as usize * desc.format.bytes_per_pixel();
        if data.len() < expected {
            return Err(RendererError::InvalidPixelData {
                expected,
                actual: data.len(),
            });
        }
        Ok(())
    }

    fn destroy_texture(&self, id: TextureId) {
        if let Some(allocation) = self.textures.lock().remove(&id) {
            self.memory.record_dealloc(allocation.bytes);
            self.destroyed.fetch_add(1, Ordering::Relaxed);
        }
        let mut bound = self.bound.lock();
        if *bound == Some(id) {
            *bound = None;
        }
    }

    fn bind_texture(&self, id: Option<TextureId>) {
        *self.bound.lock() = id;
        self.binds.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_destroy() {
        let backend = HeadlessBackend::new();
        let desc = TextureDescriptor::rgba(4, 4, true, false);

        let id = backend.create_texture(&desc, &[0u8; 64]).unwrap();
        assert!(backend.contains(id));
        assert_eq!(backend.stats().vram_usage, 64);

        backend.destroy_texture(id);
        assert!(!backend.contains(id));

        let stats = backend.stats();
        assert_eq!(stats.vram_usage, 0);
        assert_eq!(stats.vram_peak, 64);
        assert_eq!(stats.textures_created, 1);
        assert_eq!(stats.textures_destroyed, 1);
    }

    #[test]
    fn test_short_pixel_data_rejected() {
        let backend = HeadlessBackend::new();
        let desc = TextureDescriptor::rgba(4, 4, false, false);

        assert!(matches!(
            backend.create_texture(&desc, &[0u8; 10]),
            Err(RendererError::InvalidPixelData { expected: 64, actual: 10 })
        ));
    }

    #[test]
    fn test_vram_limit() {
        let backend = HeadlessBackend::with_vram_limit(100);
        let desc = TextureDescriptor::rgba(4, 4, false, false);

        backend.create_texture(&desc, &[0u8; 64]).unwrap();
        assert!(matches!(
            backend.create_texture(&desc, &[0u8; 64]),
            Err(RendererError::OutOfMemory)
        ));
    }

    #[test]
    fn test_bind_and_destroy_unbinds() {
        let backend = HeadlessBackend::new();
        let desc = TextureDescriptor::rgba(2, 2, false, false);
        let id = backend.create_texture(&desc, &[0u8; 16]).unwrap();

        backend.bind_texture(Some(id));
        assert_eq!(backend.bound(), Some(id));

        backend.destroy_texture(id);
        assert_eq!(backend.bound(), None);
        assert_eq!(backend.stats().binds, 1);
    }

    #[test]
    fn test_update_region_checked() {
        let backend = HeadlessBackend::new();
        let desc = TextureDescriptor::rgba(2, 2, false, false);
        let id = backend.create_texture(&desc, &[0u8; 16]).unwrap();

        assert!(backend.update_texture(id, 0, 0, 2, 2, &[1u8; 16]).is_ok());
        assert!(backend.update_texture(id, 1, 1, 2, 2, &[1u8; 16]).is_err());
    }

    #[test]
    fn test_zero_texture_id_rejected() {
        assert!(TextureId::new(0).is_none());
        assert_eq!(TextureId::new(7).map(|id| id.get()), Some(7));
    }
}

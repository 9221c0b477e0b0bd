//! # Marquee Renderer
//!
//! The GPU side of texture management, reduced to the four primitives the texture cache
//! needs: create, update, destroy and bind. The cache treats the GPU as an opaque
//! allocator and never assumes a particular graphics API.
//!
//! [`HeadlessBackend`] implements the primitives in memory, for tools and tests that run
//! without a window.

pub mod texture;

pub use texture::{
    HeadlessBackend, TextureBackend, TextureDescriptor, TextureFormat, TextureId,
};

use thiserror::Error;

/// Renderer errors
#[derive(Error, Debug)]
pub enum RendererError {
    #[error("Texture creation failed: {0}")]
    TextureCreation(String),

    #[error("Texture not found: {0}")]
    TextureNotFound(TextureId),

    #[error("Pixel data too small: expected {expected} bytes, got {actual}")]
    InvalidPixelData { expected: usize, actual: usize },

    #[error("Out of GPU memory")]
    OutOfMemory,
}

/// Result type for renderer operations
pub type RendererResult<T> = Result<T, RendererError>;

/// Renderer statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RendererStats {
    /// Live textures
    pub texture_count: usize,
    /// Textures created since startup
    pub textures_created: u64,
    /// Textures destroyed since startup
    pub textures_destroyed: u64,
    /// Bind calls since startup
    pub binds: u64,
    /// VRAM usage in bytes
    pub vram_usage: usize,
    /// Highest VRAM usage seen
    pub vram_peak: usize,
}

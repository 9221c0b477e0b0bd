//! # Marquee Assets
//!
//! Texture memory management for the Marquee frontend.
//!
//! ## Features
//! - `TextureData`: one decoded picture, its RAM buffer and its GPU handle
//! - `TextureLoader`: background decode pool with cancellable, most-recent-first queueing
//! - `TextureDataManager`: recency-ordered registry that keeps VRAM under budget
//! - `TextureCache` / `TextureResource`: interned handles shared by the UI
//! - Decoders for raster, vector, archive and thumbnail sources
//! - Persistent image size cache for header-only dimension probes

pub mod context;
pub mod decode;
pub mod image_io;
pub mod source;
pub mod texture_data;
pub mod texture_loader;
pub mod texture_manager;
pub mod texture_resource;

pub use context::TextureContext;
pub use decode::{
    ArchiveDecoder, DecodeRequest, DecodedImage, Decoder, DecoderRegistry, RasterDecoder,
    ThumbnailDecoder, ThumbnailExtractor, VectorDecoder,
};
pub use image_io::ImageSizeCache;
pub use source::SourceKind;
pub use texture_data::{TextureData, TextureDataId};
pub use texture_loader::TextureLoader;
pub use texture_manager::{LoadMode, ResourceId, TextureDataManager};
pub use texture_resource::{TextureCache, TextureKey, TextureOptions, TextureResource};

use marquee_platform::PlatformError;
use marquee_renderer::RendererError;
use thiserror::Error;

/// Asset errors
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("Image decode failed: {0}")]
    Decode(#[from] image::ImageError),

    #[error("SVG parse failed: {0}")]
    Svg(#[from] resvg::usvg::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Unsupported source: {0}")]
    UnsupportedSource(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Renderer(#[from] RendererError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Result type for asset operations
pub type AssetResult<T> = Result<T, AssetError>;

//! Source classification
//!
//! Decides which decoder handles a texture path, once, when the path is assigned.

use std::fmt;

use marquee_platform::filesystem::extension;

/// What kind of content a texture path points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SourceKind {
    /// Bitmap formats handled by the image decoder
    #[default]
    Raster,
    /// SVG, rasterized at a requested size
    Vector,
    /// Comic book archive; the first picture is the cover
    Archive,
    /// Video file; a frame is extracted as thumbnail
    Video,
    /// Paged document; the first page is rendered as thumbnail
    Document,
}

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "webm", "mov", "m4v", "mpg", "mpeg", "wmv", "flv",
];

impl SourceKind {
    /// Classify a path by its extension
    pub fn from_path(path: &str) -> Self {
        match extension(path).as_deref() {
            Some("svg") => Self::Vector,
            Some("cbz") => Self::Archive,
            Some("pdf") => Self::Document,
            Some(ext) if VIDEO_EXTENSIONS.contains(&ext) => Self::Video,
            _ => Self::Raster,
        }
    }

    /// True for sources that can be re-rasterized at any size
    pub fn is_scalable(&self) -> bool {
        matches!(self, Self::Vector)
    }

    /// True for sources decoded through an extracted thumbnail
    pub fn needs_thumbnail(&self) -> bool {
        matches!(self, Self::Video | Self::Document)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Raster => "raster",
            Self::Vector => "vector",
            Self::Archive => "archive",
            Self::Video => "video",
            Self::Document => "document",
        };
        f.write_str(name)
    }
}

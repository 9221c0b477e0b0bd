//! Decoding
//!
//! Turns a texture source into tightly packed RGBA pixels. Each [`SourceKind`] has a
//! [`Decoder`]; the [`DecoderRegistry`] picks one per texture so call sites never sniff
//! extensions themselves.
//!
//! Decoders run on loader threads and must not touch GPU state.

use std::collections::hash_map::DefaultHasher;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::imageops::FilterType;
use marquee_core::{MaxSizeInfo, Size2, math::adjust_picture_size};
use parking_lot::Mutex;
use resvg::{tiny_skia, usvg};

use crate::source::SourceKind;
use crate::{AssetError, AssetResult};

/// Everything a decoder needs to know about one texture
#[derive(Debug, Clone, Copy)]
pub struct DecodeRequest<'a> {
    /// Texture path as requested (used as cache key)
    pub path: &'a str,
    /// File on disk backing the path
    pub file: &'a Path,
    /// Largest display box, when known
    pub max_size: Option<MaxSizeInfo>,
    /// Whether pictures may be decoded smaller than their natural size
    pub optimize_vram: bool,
    /// Screen size, the fallback box for raster sources
    pub screen: Size2,
    /// Requested raster size for scalable sources; zero means natural size
    pub source_size: (f32, f32),
}

/// Result of a successful decode
#[derive(Debug, Clone, Default)]
pub struct DecodedImage {
    /// RGBA pixels, `width * height * 4` bytes
    pub pixels: Vec<u8>,
    /// Decoded width
    pub width: u32,
    /// Decoded height
    pub height: u32,
    /// Logical source width
    pub source_width: f32,
    /// Logical source height
    pub source_height: f32,
    /// Size before any downscale
    pub base_size: Size2,
    /// Size after downscale, zero when not downscaled
    pub packed_size: Size2,
    /// Source can be rasterized again at another size
    pub scalable: bool,
    /// Size of the source file, zero when unknown
    pub source_bytes: u64,
}

impl DecodedImage {
    /// Check that the pixel buffer matches the dimensions
    pub fn validate(&self) -> AssetResult<()> {
        let expected = self.width as usize * self.height as usize * 4;
        if self.width == 0 || self.height == 0 || self.pixels.len() != expected {
            return Err(AssetError::InvalidImage(format!(
                "{}x{} image with {} bytes of pixels",
                self.width,
                self.height,
                self.pixels.len()
            )));
        }
        Ok(())
    }
}

/// Decode strategy for one kind of source
pub trait Decoder: Send + Sync {
    /// Decode the source described by `request`
    fn decode(&self, request: &DecodeRequest<'_>) -> AssetResult<DecodedImage>;
}

/// Decode an encoded bitmap held in memory
///
/// Pictures larger than `max_size` (the screen when there is none) are downscaled to
/// fit, and never beyond the screen.
pub fn decode_raster_memory(
    data: &[u8],
    max_size: Option<MaxSizeInfo>,
    screen: Size2,
) -> AssetResult<DecodedImage> {
    let mut picture = image::load_from_memory(data)?;
    let base_size = Size2::new(picture.width(), picture.height());
    let mut packed_size = Size2::ZERO;

    let bounds = max_size
        .filter(|max| !max.is_empty())
        .unwrap_or_else(|| MaxSizeInfo::new(screen.width as f32, screen.height as f32, false));

    if !bounds.is_empty()
        && (base_size.width as f32 > bounds.width || base_size.height as f32 > bounds.height)
    {
        let mut target = adjust_picture_size(base_size, bounds.size(), bounds.external_zoom);
        if !screen.is_empty() && target.exceeds(screen) {
            target = adjust_picture_size(target, screen, false);
        }

        if !target.is_empty() && target != base_size {
            log::debug!(
                "Rescaling image from {}x{} to {}x{}",
                base_size.width,
                base_size.height,
                target.width,
                target.height
            );
            picture = picture.resize_exact(target.width, target.height, FilterType::Triangle);
            packed_size = target;
        }
    }

    let rgba = picture.into_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(DecodedImage {
        pixels: rgba.into_raw(),
        width,
        height,
        source_width: width as f32,
        source_height: height as f32,
        base_size,
        packed_size,
        scalable: false,
        source_bytes: data.len() as u64,
    })
}

/// Bitmap decoder backed by the `image` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterDecoder;

impl Decoder for RasterDecoder {
    fn decode(&self, request: &DecodeRequest<'_>) -> AssetResult<DecodedImage> {
        let data = std::fs::read(request.file)?;
        decode_raster_memory(&data, request.max_size, request.screen)
    }
}

/// SVG rasterizer backed by `resvg`
#[derive(Debug, Default, Clone, Copy)]
pub struct VectorDecoder;

impl VectorDecoder {
    /// Rasterize an SVG document held in memory
    pub fn decode_memory(
        &self,
        data: &[u8],
        request: &DecodeRequest<'_>,
    ) -> AssetResult<DecodedImage> {
        let tree = usvg::Tree::from_data(data, &usvg::Options::default())?;
        let svg_width = tree.size().width();
        let svg_height = tree.size().height();
        if svg_width <= 0.0 || svg_height <= 0.0 {
            return Err(AssetError::InvalidImage("SVG without a size".into()));
        }

        let max = request.max_size.filter(|max| !max.is_empty());

        let (mut source_width, mut source_height) = request.source_size;
        if source_width == 0.0 && source_height == 0.0 {
            source_width = svg_width;
            source_height = svg_height;

            if let Some(max) = max {
                if source_width < max.width && source_height < max.height {
                    let fitted = adjust_picture_size(
                        Size2::new(source_width as u32, source_height as u32),
                        max.size(),
                        false,
                    );
                    source_width = fitted.width as f32;
                    source_height = fitted.height as f32;
                }
            }
        } else {
            // Width always follows the document's aspect ratio
            source_width = source_height * svg_width / svg_height;
        }

        let mut width = source_width.round() as u32;
        let mut height = source_height.round() as u32;
        if width == 0 {
            width = (height as f32 / svg_height * svg_width).round() as u32;
        } else if height == 0 {
            height = (width as f32 / svg_width * svg_height).round() as u32;
        }

        let base_size = Size2::new(width, height);
        let mut packed_size = Size2::ZERO;

        if let Some(max) = max.filter(|_| request.optimize_vram) {
            if (height as f32) < max.height && (width as f32) < max.width {
                let fitted =
                    adjust_picture_size(Size2::new(width, height), max.size(), max.external_zoom);
                height = fitted.height;
                width = (height as f32 * svg_width / svg_height).round() as u32;
            }

            if width as f32 > max.width || height as f32 > max.height {
                let fitted =
                    adjust_picture_size(Size2::new(width, height), max.size(), max.external_zoom);
                height = fitted.height;
                width = (height as f32 * svg_width / svg_height).round() as u32;
                packed_size = Size2::new(width, height);
            }
        }

        if width == 0 || height == 0 {
            return Err(AssetError::InvalidImage(format!(
                "SVG rasterizes to {width}x{height}"
            )));
        }

        let mut pixmap = tiny_skia::Pixmap::new(width, height).ok_or_else(|| {
            AssetError::InvalidImage(format!("cannot allocate {width}x{height} pixmap"))
        })?;
        let scale = (height as f32 / svg_height).min(width as f32 / svg_width);
        resvg::render(
            &tree,
            tiny_skia::Transform::from_scale(scale, scale),
            &mut pixmap.as_mut(),
        );

        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for pixel in pixmap.pixels() {
            let color = pixel.demultiply();
            pixels.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
        }

        Ok(DecodedImage {
            pixels,
            width,
            height,
            source_width,
            source_height,
            base_size,
            packed_size,
            scalable: true,
            source_bytes: data.len() as u64,
        })
    }
}

impl Decoder for VectorDecoder {
    fn decode(&self, request: &DecodeRequest<'_>) -> AssetResult<DecodedImage> {
        let data = std::fs::read(request.file)?;
        self.decode_memory(&data, request)
    }
}

/// Cover reader for `.cbz` archives
///
/// The cover is the first `.jpg` entry in case-insensitive name order, ignoring entries
/// whose name starts with `__` (metadata folders written by archivers).
#[derive(Debug, Default)]
pub struct ArchiveDecoder {
    lock: Mutex<()>,
}

impl ArchiveDecoder {
    /// Create an archive decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the raw bytes of the cover entry
    pub fn read_cover(&self, file: &Path) -> AssetResult<Vec<u8>> {
        let _guard = self.lock.lock();
        let mut archive = zip::ZipArchive::new(File::open(file)?)?;

        let mut candidates: Vec<String> = archive
            .file_names()
            .filter(|name| !name.starts_with("__"))
            .filter(|name| name.to_lowercase().ends_with(".jpg"))
            .map(str::to_string)
            .collect();
        candidates.sort_by_key(|name| name.to_lowercase());

        let cover = candidates.first().ok_or_else(|| {
            AssetError::InvalidImage(format!("no cover picture in {}", file.display()))
        })?;

        let mut entry = archive.by_name(cover)?;
        if entry.size() == 0 {
            return Err(AssetError::InvalidImage(format!("empty cover entry {cover}")));
        }
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data)?;
        Ok(data)
    }
}

impl Decoder for ArchiveDecoder {
    fn decode(&self, request: &DecodeRequest<'_>) -> AssetResult<DecodedImage> {
        let cover = self.read_cover(request.file)?;
        let mut decoded = decode_raster_memory(&cover, request.max_size, request.screen)?;
        decoded.source_bytes = std::fs::metadata(request.file)?.len();
        Ok(decoded)
    }
}

/// Produces a still image for sources the frontend cannot decode itself
pub trait ThumbnailExtractor: Send + Sync {
    /// Write a picture representing `source` to `target`
    fn extract(&self, source: &Path, target: &Path) -> AssetResult<()>;
}

/// Decoder for video and document sources
///
/// Thumbnails are extracted once and kept in the cache directory, named after a hash
/// of the content path; later loads decode the cached picture.
pub struct ThumbnailDecoder {
    extractor: Arc<dyn ThumbnailExtractor>,
    cache_dir: PathBuf,
}

impl ThumbnailDecoder {
    /// Create a decoder caching thumbnails under `cache_dir`
    pub fn new(extractor: Arc<dyn ThumbnailExtractor>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            extractor,
            cache_dir: cache_dir.into(),
        }
    }

    /// Location of the cached thumbnail for `path`
    pub fn thumbnail_path(&self, path: &str) -> PathBuf {
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        self.cache_dir.join(format!("{:016x}.png", hasher.finish()))
    }
}

impl Decoder for ThumbnailDecoder {
    fn decode(&self, request: &DecodeRequest<'_>) -> AssetResult<DecodedImage> {
        let thumbnail = self.thumbnail_path(request.path);
        if !thumbnail.is_file() {
            std::fs::create_dir_all(&self.cache_dir)?;
            self.extractor.extract(request.file, &thumbnail)?;
            log::debug!("Extracted thumbnail for {}", request.path);
        }

        let data = std::fs::read(&thumbnail)?;
        let mut decoded = decode_raster_memory(&data, request.max_size, request.screen)?;
        decoded.source_bytes = 0;
        Ok(decoded)
    }
}

/// Placeholder for source kinds without a configured backend
struct UnsupportedDecoder(SourceKind);

impl Decoder for UnsupportedDecoder {
    fn decode(&self, request: &DecodeRequest<'_>) -> AssetResult<DecodedImage> {
        Err(AssetError::UnsupportedSource(format!(
            "no {} decoder for {}",
            self.0, request.path
        )))
    }
}

/// One decoder per source kind
#[derive(Clone)]
pub struct DecoderRegistry {
    raster: Arc<dyn Decoder>,
    vector: Arc<dyn Decoder>,
    archive: Arc<dyn Decoder>,
    video: Arc<dyn Decoder>,
    document: Arc<dyn Decoder>,
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self {
            raster: Arc::new(RasterDecoder),
            vector: Arc::new(VectorDecoder),
            archive: Arc::new(ArchiveDecoder::new()),
            video: Arc::new(UnsupportedDecoder(SourceKind::Video)),
            document: Arc::new(UnsupportedDecoder(SourceKind::Document)),
        }
    }
}

impl DecoderRegistry {
    /// Registry with the built-in decoders; video and documents are unsupported
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the decoder used for `kind`
    pub fn with_decoder(mut self, kind: SourceKind, decoder: Arc<dyn Decoder>) -> Self {
        match kind {
            SourceKind::Raster => self.raster = decoder,
            SourceKind::Vector => self.vector = decoder,
            SourceKind::Archive => self.archive = decoder,
            SourceKind::Video => self.video = decoder,
            SourceKind::Document => self.document = decoder,
        }
        self
    }

    /// Decode `kind` through thumbnails produced by `extractor`
    ///
    /// Only video and document sources take thumbnails; other kinds keep their decoder.
    pub fn with_thumbnails(
        self,
        kind: SourceKind,
        extractor: Arc<dyn ThumbnailExtractor>,
        cache_dir: impl Into<PathBuf>,
    ) -> Self {
        if !kind.needs_thumbnail() {
            log::warn!("Ignoring thumbnail extractor for {} sources", kind);
            return self;
        }
        self.with_decoder(kind, Arc::new(ThumbnailDecoder::new(extractor, cache_dir)))
    }

    /// Decoder responsible for `kind`
    pub fn for_kind(&self, kind: SourceKind) -> &Arc<dyn Decoder> {
        match kind {
            SourceKind::Raster => &self.raster,
            SourceKind::Vector => &self.vector,
            SourceKind::Archive => &self.archive,
            SourceKind::Video => &self.video,
            SourceKind::Document => &self.document,
        }
    }
}

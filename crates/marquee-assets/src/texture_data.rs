//! Texture data
//!
//! A [`TextureData`] is one picture as the texture system sees it: where it comes from,
//! its decoded RGBA pixels while they live in RAM, and its GPU texture once uploaded.
//! The object outlives eviction; only its buffers come and go.
//!
//! Decoding happens outside the object mutex and the result is published under it, so
//! readers never observe a half-written buffer and a loader thread never blocks the
//! render thread for the duration of a decode.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use marquee_core::{MaxSizeInfo, Size2, math::adjust_picture_size};
use marquee_renderer::{TextureDescriptor, TextureId};
use parking_lot::Mutex;

use crate::context::TextureContext;
use crate::decode::{DecodeRequest, DecodedImage, decode_raster_memory};
use crate::source::SourceKind;

static NEXT_TEXTURE_DATA_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a [`TextureData`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureDataId(u64);

impl TextureDataId {
    fn next() -> Self {
        Self(NEXT_TEXTURE_DATA_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// RGBA pixels held in RAM
#[derive(Default)]
enum PixelBuffer {
    #[default]
    Empty,
    /// Decoded by us, freed on release
    Owned(Vec<u8>),
    /// Supplied by a producer such as a video player; only the reference is dropped
    External(Arc<[u8]>),
}

impl PixelBuffer {
    fn as_slice(&self) -> Option<&[u8]> {
        match self {
            Self::Empty => None,
            Self::Owned(pixels) => Some(pixels),
            Self::External(pixels) => Some(pixels),
        }
    }

    fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Owned(pixels) => write!(f, "Owned({} bytes)", pixels.len()),
            Self::External(pixels) => write!(f, "External({} bytes)", pixels.len()),
        }
    }
}

#[derive(Debug, Default)]
struct TextureState {
    path: String,
    kind: SourceKind,
    texture: Option<TextureId>,
    pixels: PixelBuffer,
    width: u32,
    height: u32,
    source_width: f32,
    source_height: f32,
    scalable: bool,
    reloadable: bool,
    max_size: Option<MaxSizeInfo>,
    base_size: Size2,
    packed_size: Size2,
}

impl TextureState {
    fn is_loaded(&self) -> bool {
        !self.pixels.is_empty() || self.texture.is_some()
    }

    fn byte_size(&self) -> usize {
        Size2::new(self.width, self.height).rgba_bytes()
    }

    fn publish(&mut self, image: DecodedImage) {
        self.pixels = PixelBuffer::Owned(image.pixels);
        self.width = image.width;
        self.height = image.height;
        self.source_width = image.source_width;
        self.source_height = image.source_height;
        self.scalable = image.scalable;
        self.base_size = image.base_size;
        self.packed_size = image.packed_size;
    }
}

/// One texture's source, pixels and GPU handle
pub struct TextureData {
    id: TextureDataId,
    ctx: Arc<TextureContext>,
    tile: bool,
    linear: bool,
    required: AtomicBool,
    state: Mutex<TextureState>,
}

impl std::fmt::Debug for TextureData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureData")
            .field("id", &self.id)
            .field("tile", &self.tile)
            .field("linear", &self.linear)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl TextureData {
    /// Create an empty texture
    pub fn new(ctx: Arc<TextureContext>, tile: bool, linear: bool) -> Self {
        Self {
            id: TextureDataId::next(),
            ctx,
            tile,
            linear,
            required: AtomicBool::new(false),
            state: Mutex::new(TextureState::default()),
        }
    }

    /// Identity of this texture
    pub fn id(&self) -> TextureDataId {
        self.id
    }

    /// Repeat instead of clamping at the edges
    pub fn is_tiled(&self) -> bool {
        self.tile
    }

    /// Linear filtering
    pub fn is_linear(&self) -> bool {
        self.linear
    }

    /// Point this texture at a source path; it can then be reloaded after eviction
    pub fn init_from_path(&self, path: &str) {
        let kind = SourceKind::from_path(path);
        let mut state = self.state.lock();
        state.path = path.to_string();
        state.kind = kind;
        state.reloadable = true;
        state.scalable = kind.is_scalable();
    }

    /// Source path, empty for in-memory textures
    pub fn path(&self) -> String {
        self.state.lock().path.clone()
    }

    /// Source kind of the path
    pub fn kind(&self) -> SourceKind {
        self.state.lock().kind
    }

    /// Decode the source into RAM
    ///
    /// Returns true when pixels or a GPU texture exist afterwards. Failures are logged
    /// and leave the texture unloaded. With `update_cache` the natural size is recorded
    /// in the image size cache.
    pub fn load(&self, update_cache: bool) -> bool {
        let (path, kind, max_size, source_size) = {
            let state = self.state.lock();
            if state.is_loaded() {
                return true;
            }
            if state.path.is_empty() {
                return false;
            }
            (
                state.path.clone(),
                state.kind,
                state.max_size,
                (state.source_width, state.source_height),
            )
        };

        log::debug!("Loading texture {}", path);

        let file = match self.ctx.fs().resolve(&path) {
            Ok(file) => file,
            Err(e) => {
                log::warn!("Failed to load texture {}: {}", path, e);
                return false;
            }
        };
        let request = DecodeRequest {
            path: &path,
            file: &file,
            max_size,
            optimize_vram: self.ctx.settings().optimize_vram(),
            screen: self.ctx.screen(),
            source_size: if kind.is_scalable() {
                source_size
            } else {
                (0.0, 0.0)
            },
        };

        let decoded = self
            .ctx
            .decoders()
            .for_kind(kind)
            .decode(&request)
            .and_then(|image| image.validate().map(|_| image));

        let image = match decoded {
            Ok(image) => image,
            Err(e) => {
                log::warn!("Failed to load texture {}: {}", path, e);
                return false;
            }
        };

        let (source_bytes, base_size) = (image.source_bytes, image.base_size);
        {
            let mut state = self.state.lock();
            if state.is_loaded() {
                // Another thread published first
                return true;
            }
            if state.path != path {
                log::debug!("Discarding decode of {}, path changed", path);
                return false;
            }
            state.publish(image);
        }

        if update_cache && source_bytes > 0 {
            self.ctx.size_cache().update(&path, source_bytes, base_size);
        }
        true
    }

    /// True when pixels are in RAM or a GPU texture exists
    pub fn is_loaded(&self) -> bool {
        self.state.lock().is_loaded()
    }

    /// True when a GPU texture exists
    pub fn is_uploaded(&self) -> bool {
        self.state.lock().texture.is_some()
    }

    /// Bind the GPU texture, uploading the RAM pixels first if needed
    ///
    /// After a successful upload the RAM copy is released. Returns false when there is
    /// nothing to upload or the backend refuses the allocation.
    pub fn upload_and_bind(&self) -> bool {
        let backend = self.ctx.backend();
        let mut state = self.state.lock();

        if let Some(id) = state.texture {
            backend.bind_texture(Some(id));
            return true;
        }

        let desc = TextureDescriptor::rgba(state.width, state.height, self.linear, self.tile);
        let Some(pixels) = state.pixels.as_slice().filter(|_| desc.byte_size() > 0) else {
            backend.bind_texture(None);
            return false;
        };

        match backend.create_texture(&desc, pixels) {
            Ok(id) => {
                state.texture = Some(id);
                state.pixels = PixelBuffer::Empty;
                backend.bind_texture(Some(id));
                true
            }
            Err(e) => {
                log::warn!("Failed to upload texture {}: {}", state.path, e);
                false
            }
        }
    }

    /// Destroy the GPU texture, if any
    pub fn release_vram(&self) {
        let texture = self.state.lock().texture.take();
        if let Some(id) = texture {
            self.ctx.backend().destroy_texture(id);
        }
    }

    /// Drop the RAM pixels, if any
    pub fn release_ram(&self) {
        self.state.lock().pixels = PixelBuffer::Empty;
    }

    /// Take ownership of decoded RGBA pixels
    ///
    /// A previously attached external buffer is detached first. Owned pixels already
    /// present are kept.
    pub fn init_from_rgba(&self, pixels: Vec<u8>, width: u32, height: u32) -> bool {
        if pixels.len() != Size2::new(width, height).rgba_bytes() || pixels.is_empty() {
            log::warn!(
                "Rejected {}x{} texture with {} bytes of pixels",
                width,
                height,
                pixels.len()
            );
            return false;
        }

        let mut state = self.state.lock();
        if matches!(state.pixels, PixelBuffer::External(_)) {
            state.pixels = PixelBuffer::Empty;
        }
        if !state.pixels.is_empty() {
            return true;
        }

        state.pixels = PixelBuffer::Owned(pixels);
        state.width = width;
        state.height = height;
        true
    }

    /// Decode an encoded bitmap held in memory
    pub fn init_image_from_memory(&self, data: &[u8]) -> bool {
        let max_size = {
            let state = self.state.lock();
            if state.is_loaded() {
                return true;
            }
            state.max_size
        };

        let image = match decode_raster_memory(data, max_size, self.ctx.screen()) {
            Ok(image) => image,
            Err(e) => {
                log::warn!("Could not initialize texture from memory ({} bytes): {}", data.len(), e);
                return false;
            }
        };

        {
            let mut state = self.state.lock();
            state.source_width = image.source_width;
            state.source_height = image.source_height;
            state.scalable = false;
            state.base_size = image.base_size;
            state.packed_size = image.packed_size;
        }
        self.init_from_rgba(image.pixels, image.width, image.height)
    }

    /// Show a frame owned by someone else
    ///
    /// The GPU texture is updated in place when the frame size is unchanged. Otherwise,
    /// or when the update fails, it is destroyed and recreated by the next bind.
    pub fn update_from_external_rgba(&self, pixels: Arc<[u8]>, width: u32, height: u32) -> bool {
        if pixels.len() != Size2::new(width, height).rgba_bytes() || pixels.is_empty() {
            log::warn!(
                "Rejected {}x{} external frame with {} bytes of pixels",
                width,
                height,
                pixels.len()
            );
            return false;
        }

        let backend = self.ctx.backend();
        let mut state = self.state.lock();
        let resized = state.width != width || state.height != height;

        if let Some(id) = state.texture {
            let updated = !resized
                && match backend.update_texture(id, 0, 0, width, height, &pixels) {
                    Ok(()) => true,
                    Err(e) => {
                        log::warn!("Failed to update texture {}: {}", id, e);
                        false
                    }
                };
            if !updated {
                state.texture = None;
                backend.destroy_texture(id);
            }
        }

        state.width = width;
        state.height = height;
        state.pixels = PixelBuffer::External(pixels);
        true
    }

    /// Decoded size in pixels
    pub fn size(&self) -> Size2 {
        let state = self.state.lock();
        Size2::new(state.width, state.height)
    }

    /// Logical size of the source
    pub fn source_size(&self) -> (f32, f32) {
        let state = self.state.lock();
        (state.source_width, state.source_height)
    }

    /// Natural and downscaled size from the last decode
    pub fn base_and_packed_size(&self) -> (Size2, Size2) {
        let state = self.state.lock();
        (state.base_size, state.packed_size)
    }

    /// Provisional dimensions used until the decode finishes
    pub fn set_temporary_size(&self, width: u32, height: u32) {
        let mut state = self.state.lock();
        state.width = width;
        state.height = height;
        state.source_width = width as f32;
        state.source_height = height as f32;
    }

    /// Request a raster size for a scalable source
    ///
    /// The source is re-rasterized only when the new height is larger than the current
    /// one and the width differs; other requests are served from the existing pixels.
    pub fn set_source_size(&self, width: f32, height: f32) {
        {
            let mut state = self.state.lock();
            if !state.scalable {
                return;
            }
            if (state.source_height as i32) >= (height as i32)
                || (state.source_width as i32) == (width as i32)
            {
                return;
            }

            log::debug!(
                "Reloading {} from {}x{} to {}x{}",
                state.path,
                state.source_width,
                state.source_height,
                width,
                height
            );
            state.source_width = width;
            state.source_height = height;
        }

        self.release_vram();
        self.release_ram();
        self.load(false);
    }

    /// Largest box this texture is displayed in
    ///
    /// Ignored when VRAM optimisation is off. A new box replaces the current one only
    /// when it lets the picture be displayed larger.
    pub fn set_max_size(&self, max_size: MaxSizeInfo) {
        if !self.ctx.settings().optimize_vram() {
            return;
        }

        let mut state = self.state.lock();
        let Some(current) = state.max_size else {
            state.max_size = Some(max_size);
            return;
        };
        if state.source_width == 0.0 || state.source_height == 0.0 {
            state.max_size = Some(max_size);
            return;
        }

        let source = Size2::new(state.source_width as u32, state.source_height as u32);
        let value = adjust_picture_size(source, current.size(), current.external_zoom);
        let candidate = adjust_picture_size(source, max_size.size(), current.external_zoom);
        if candidate.width > value.width || candidate.height > value.height {
            state.max_size = Some(max_size);
        }
    }

    /// Current display box
    pub fn max_size(&self) -> Option<MaxSizeInfo> {
        self.state.lock().max_size
    }

    /// False when the loaded pixels were downscaled below what the display box now needs
    pub fn is_max_size_valid(&self) -> bool {
        if !self.ctx.settings().optimize_vram() {
            return true;
        }

        let state = self.state.lock();
        let Some(max) = state.max_size.filter(|max| !max.is_empty()) else {
            return true;
        };
        let (base, packed) = (state.base_size, state.packed_size);
        if packed.is_empty() || base.is_empty() {
            return true;
        }

        let max = max.size();
        if max.width <= packed.width || max.height <= packed.height {
            return true;
        }
        if base.width <= packed.width || base.height <= packed.height {
            return true;
        }
        false
    }

    /// Bytes currently held in RAM or VRAM
    pub fn vram_usage(&self) -> usize {
        let state = self.state.lock();
        if state.is_loaded() {
            state.byte_size()
        } else {
            0
        }
    }

    /// Bytes this texture occupies once loaded, from its known or provisional size
    pub fn estimated_size(&self) -> usize {
        self.state.lock().byte_size()
    }

    /// Pinned textures are never evicted
    pub fn is_required(&self) -> bool {
        self.required.load(Ordering::Relaxed)
    }

    /// Pin or unpin this texture
    pub fn set_required(&self, required: bool) {
        self.required.store(required, Ordering::Relaxed);
    }

    /// True when the texture can be decoded again from its path
    pub fn is_reloadable(&self) -> bool {
        self.state.lock().reloadable
    }

    /// True for sources that can be re-rasterized at any size
    pub fn is_scalable(&self) -> bool {
        self.state.lock().scalable
    }
}

impl Drop for TextureData {
    fn drop(&mut self) {
        if let Some(id) = self.state.get_mut().texture.take() {
            self.ctx.backend().destroy_texture(id);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::decode::{Decoder, DecoderRegistry};
    use crate::AssetResult;
    use marquee_core::{SettingsHandle, TextureSettings};
    use marquee_platform::FileSystem;
    use marquee_renderer::HeadlessBackend;

    /// Decoder producing solid pictures of a size encoded in the path, `name-WxH.png`
    pub(crate) struct SyntheticDecoder;

    impl Decoder for SyntheticDecoder {
        fn decode(&self, request: &DecodeRequest<'_>) -> AssetResult<DecodedImage> {
            let size = request
                .path
                .rsplit('-')
                .next()
                .and_then(|tail| tail.strip_suffix(".png"))
                .and_then(|dims| dims.split_once('x'))
                .and_then(|(w, h)| Some((w.parse::<u32>().ok()?, h.parse::<u32>().ok()?)));
            let Some((width, height)) = size else {
                return Err(crate::AssetError::InvalidImage(request.path.to_string()));
            };

            Ok(DecodedImage {
                pixels: vec![255; width as usize * height as usize * 4],
                width,
                height,
                source_width: width as f32,
                source_height: height as f32,
                base_size: Size2::new(width, height),
                packed_size: Size2::ZERO,
                scalable: false,
                source_bytes: 1,
            })
        }
    }

    pub(crate) fn synthetic_context(
        backend: Arc<HeadlessBackend>,
        settings: TextureSettings,
    ) -> Arc<TextureContext> {
        let dir = std::env::temp_dir();
        let decoders =
            DecoderRegistry::new().with_decoder(SourceKind::Raster, Arc::new(SyntheticDecoder));
        Arc::new(
            TextureContext::new(
                backend,
                SettingsHandle::new(settings),
                FileSystem::with_dirs(vec![dir.clone()], dir),
            )
            .with_decoders(decoders),
        )
    }

    fn context() -> (Arc<HeadlessBackend>, Arc<TextureContext>) {
        let backend = Arc::new(HeadlessBackend::new());
        let ctx = synthetic_context(backend.clone(), TextureSettings::default());
        (backend, ctx)
    }

    #[test]
    fn test_load_and_upload() {
        let (backend, ctx) = context();
        let data = TextureData::new(ctx, false, true);
        data.init_from_path("/roms/cover-16x8.png");

        assert!(!data.is_loaded());
        assert!(data.load(false));
        assert!(data.is_loaded());
        assert_eq!(data.size(), Size2::new(16, 8));
        assert_eq!(data.vram_usage(), 16 * 8 * 4);

        assert!(data.upload_and_bind());
        assert!(data.is_uploaded());
        assert_eq!(backend.stats().vram_usage, 16 * 8 * 4);
        assert_eq!(backend.bound(), data.state.lock().texture);

        let desc = backend.descriptor(backend.bound().unwrap()).unwrap();
        assert!(desc.linear);
        assert!(!desc.repeat);
    }

    #[test]
    fn test_upload_frees_ram() {
        let (_backend, ctx) = context();
        let data = TextureData::new(ctx, false, false);
        data.init_from_path("/roms/cover-4x4.png");
        data.load(false);

        assert!(data.upload_and_bind());
        assert!(data.state.lock().pixels.is_empty());
        assert!(data.is_loaded());
    }

    #[test]
    fn test_failed_load_leaves_no_state() {
        let (_backend, ctx) = context();
        let data = TextureData::new(ctx, false, false);
        data.init_from_path("/roms/corrupt.png");

        assert!(!data.load(true));
        assert!(!data.is_loaded());
        assert_eq!(data.size(), Size2::ZERO);
        assert!(!data.upload_and_bind());
    }

    #[test]
    fn test_load_without_path_fails() {
        let (_backend, ctx) = context();
        let data = TextureData::new(ctx, false, false);
        assert!(!data.load(false));
    }

    #[test]
    fn test_release_is_idempotent() {
        let (backend, ctx) = context();
        let data = TextureData::new(ctx, false, false);
        data.init_from_path("/roms/cover-4x4.png");
        data.load(false);
        data.upload_and_bind();

        data.release_vram();
        data.release_vram();
        data.release_ram();
        data.release_ram();

        assert!(!data.is_loaded());
        assert_eq!(backend.stats().vram_usage, 0);
        assert_eq!(backend.stats().textures_destroyed, 1);

        // Size survives eviction
        assert_eq!(data.estimated_size(), 64);
        assert_eq!(data.vram_usage(), 0);
    }

    #[test]
    fn test_round_trip_equivalence() {
        let (backend, ctx) = context();
        let data = TextureData::new(ctx, true, false);
        data.init_from_path("/roms/cover-32x16.png");

        data.load(false);
        data.upload_and_bind();
        let first = backend.descriptor(backend.bound().unwrap()).unwrap();

        data.release_vram();
        data.release_ram();

        assert!(data.load(false));
        assert!(data.upload_and_bind());
        let second = backend.descriptor(backend.bound().unwrap()).unwrap();

        assert_eq!(first, second);
        assert_eq!(second.width, 32);
        assert_eq!(second.height, 16);
        assert!(second.repeat);
    }

    #[test]
    fn test_evicted_texture_matches_fresh_load_state() {
        let (backend, ctx) = context();
        let fresh = TextureData::new(ctx.clone(), false, false);
        fresh.init_from_path("/roms/cover-4x4.png");

        let data = TextureData::new(ctx, false, false);
        data.init_from_path("/roms/cover-4x4.png");
        assert!(data.load(false));
        assert!(data.upload_and_bind());
        data.release_vram();
        data.release_ram();

        assert_eq!(data.is_loaded(), fresh.is_loaded());
        assert_eq!(data.is_uploaded(), fresh.is_uploaded());
        assert_eq!(data.vram_usage(), fresh.vram_usage());
        assert_eq!(data.path(), fresh.path());
        assert_eq!(data.is_reloadable(), fresh.is_reloadable());
        assert!(!data.upload_and_bind());
        assert!(!fresh.upload_and_bind());
        assert_eq!(backend.stats().texture_count, 0);

        // Dimensions survive eviction so the manager can still estimate the reload
        assert_eq!(data.estimated_size(), 64);
        assert_eq!(fresh.estimated_size(), 0);
    }

    #[test]
    fn test_drop_destroys_gpu_texture() {
        let (backend, ctx) = context();
        {
            let data = TextureData::new(ctx, false, false);
            data.init_from_path("/roms/cover-4x4.png");
            data.load(false);
            data.upload_and_bind();
            assert_eq!(backend.stats().texture_count, 1);
        }
        assert_eq!(backend.stats().texture_count, 0);
    }

    #[test]
    fn test_external_pixels_not_owned() {
        let (backend, ctx) = context();
        let data = TextureData::new(ctx, false, false);
        let frame: Arc<[u8]> = Arc::from(vec![7u8; 2 * 2 * 4]);

        assert!(data.update_from_external_rgba(frame.clone(), 2, 2));
        assert_eq!(Arc::strong_count(&frame), 2);
        assert!(data.upload_and_bind());
        assert_eq!(Arc::strong_count(&frame), 1);

        // Later frames update the existing texture
        assert!(data.update_from_external_rgba(frame.clone(), 2, 2));
        assert_eq!(backend.stats().textures_created, 1);

        // Owned pixels replace an external frame
        data.release_vram();
        assert!(data.init_from_rgba(vec![1u8; 16], 2, 2));
        assert_eq!(Arc::strong_count(&frame), 1);
    }

    #[test]
    fn test_external_frame_resize_recreates_texture() {
        let (backend, ctx) = context();
        let data = TextureData::new(ctx, false, false);

        assert!(data.update_from_external_rgba(Arc::from(vec![7u8; 2 * 2 * 4]), 2, 2));
        assert!(data.upload_and_bind());
        assert_eq!(backend.stats().vram_usage, 16);

        assert!(data.update_from_external_rgba(Arc::from(vec![9u8; 4 * 4 * 4]), 4, 4));
        assert!(!data.is_uploaded());
        assert_eq!(backend.stats().texture_count, 0);

        assert!(data.upload_and_bind());
        let desc = backend.descriptor(backend.bound().unwrap()).unwrap();
        assert_eq!((desc.width, desc.height), (4, 4));
        assert_eq!(data.size(), Size2::new(4, 4));
        assert_eq!(data.vram_usage(), 64);
        assert_eq!(backend.stats().vram_usage, 64);
        assert_eq!(backend.stats().textures_created, 2);
    }

    #[test]
    fn test_rejects_mismatched_pixels() {
        let (_backend, ctx) = context();
        let data = TextureData::new(ctx, false, false);

        assert!(!data.init_from_rgba(vec![0u8; 10], 2, 2));
        assert!(!data.update_from_external_rgba(Arc::from(vec![0u8; 3]), 2, 2));
        assert!(!data.is_loaded());
    }

    #[test]
    fn test_init_image_from_memory() {
        let (_backend, ctx) = context();
        let data = TextureData::new(ctx, false, false);

        let mut png = Vec::new();
        image::DynamicImage::ImageRgba8(image::RgbaImage::new(6, 3))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        assert!(data.init_image_from_memory(&png));
        assert_eq!(data.size(), Size2::new(6, 3));
        assert_eq!(data.source_size(), (6.0, 3.0));
        assert!(!data.is_reloadable());

        let other = TextureData::new(data.ctx.clone(), false, false);
        assert!(!other.init_image_from_memory(b"garbage"));
        assert!(!other.is_loaded());
    }

    #[test]
    fn test_set_max_size_only_grows() {
        let (_backend, ctx) = context();
        let data = TextureData::new(ctx, false, false);
        data.set_temporary_size(400, 200);

        data.set_max_size(MaxSizeInfo::new(100.0, 100.0, false));
        data.set_max_size(MaxSizeInfo::new(50.0, 50.0, false));
        assert_eq!(data.max_size(), Some(MaxSizeInfo::new(100.0, 100.0, false)));

        data.set_max_size(MaxSizeInfo::new(200.0, 200.0, false));
        assert_eq!(data.max_size(), Some(MaxSizeInfo::new(200.0, 200.0, false)));
    }

    #[test]
    fn test_set_max_size_ignored_without_optimize() {
        let backend = Arc::new(HeadlessBackend::new());
        let settings = TextureSettings {
            optimize_vram: false,
            ..TextureSettings::default()
        };
        let data = TextureData::new(synthetic_context(backend, settings), false, false);

        data.set_max_size(MaxSizeInfo::new(100.0, 100.0, false));
        assert_eq!(data.max_size(), None);
        assert!(data.is_max_size_valid());
    }

    #[test]
    fn test_max_size_validity() {
        let (_backend, ctx) = context();
        let data = TextureData::new(ctx, false, false);
        {
            let mut state = data.state.lock();
            state.base_size = Size2::new(400, 200);
            state.packed_size = Size2::new(100, 50);
            state.max_size = Some(MaxSizeInfo::new(100.0, 100.0, false));
        }
        assert!(data.is_max_size_valid());

        data.state.lock().max_size = Some(MaxSizeInfo::new(300.0, 300.0, false));
        assert!(!data.is_max_size_valid());
    }

    #[test]
    fn test_temporary_size_feeds_estimate() {
        let (_backend, ctx) = context();
        let data = TextureData::new(ctx, false, false);
        data.set_temporary_size(10, 10);

        assert_eq!(data.estimated_size(), 400);
        assert_eq!(data.vram_usage(), 0);
        assert_eq!(data.source_size(), (10.0, 10.0));
    }

    #[test]
    fn test_source_size_ignored_for_raster() {
        let (_backend, ctx) = context();
        let data = TextureData::new(ctx, false, false);
        data.init_from_path("/roms/cover-4x4.png");
        data.load(false);

        data.set_source_size(100.0, 100.0);
        assert_eq!(data.size(), Size2::new(4, 4));
    }

    #[test]
    fn test_vector_reload_on_larger_source_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logo.svg");
        std::fs::write(
            &path,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="20" height="10"><rect width="20" height="10"/></svg>"#,
        )
        .unwrap();

        let ctx = Arc::new(TextureContext::new(
            Arc::new(HeadlessBackend::new()),
            SettingsHandle::default(),
            FileSystem::with_dirs(vec![dir.path().to_path_buf()], dir.path().join("cache")),
        ));
        let data = TextureData::new(ctx, false, true);
        data.init_from_path(&path.to_string_lossy());
        assert!(data.is_scalable());

        assert!(data.load(false));
        assert_eq!(data.size(), Size2::new(20, 10));

        // Smaller request keeps the current raster
        data.set_source_size(10.0, 5.0);
        assert_eq!(data.size(), Size2::new(20, 10));

        data.set_source_size(80.0, 40.0);
        assert!(data.is_loaded());
        assert_eq!(data.size(), Size2::new(80, 40));
    }
}

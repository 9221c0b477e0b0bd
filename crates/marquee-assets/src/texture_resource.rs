//! Texture Resources
//!
//! [`TextureResource`] is the handle the UI holds. Handles are interned by
//! [`TextureCache`]: asking twice for the same path and options returns the same
//! instance for as long as someone holds it.
//!
//! Dynamic resources leave their pixels to the [`TextureDataManager`], which may evict
//! and reload them at will. Other resources (bundled artwork, in-memory pictures,
//! video frames) own a private [`TextureData`] that is only counted against the budget.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use ahash::AHashMap;
use marquee_core::{MaxSizeInfo, MemoryReport, Size2};
use marquee_platform::{canonical_path, is_bundled};
use parking_lot::Mutex;

use crate::context::TextureContext;
use crate::source::SourceKind;
use crate::texture_data::TextureData;
use crate::texture_loader::TextureLoader;
use crate::texture_manager::{LoadMode, ResourceId, TextureDataManager};

/// How a texture is requested
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureOptions {
    /// Repeat instead of clamping at the edges
    pub tile: bool,
    /// Linear filtering
    pub linear: bool,
    /// Decode before returning, and reload eagerly after rasterize requests
    pub force_load: bool,
    /// Let the manager evict and reload the pixels
    pub dynamic: bool,
    /// Intern the handle and include it in [`TextureCache::reload_all`]
    pub as_reloadable: bool,
    /// Largest box the texture will be displayed in
    pub max_size: Option<MaxSizeInfo>,
    /// Distinguishes otherwise identical requests that must not share a handle
    pub share_id: u32,
}

impl Default for TextureOptions {
    fn default() -> Self {
        Self {
            tile: false,
            linear: false,
            force_load: false,
            dynamic: true,
            as_reloadable: true,
            max_size: None,
            share_id: 0,
        }
    }
}

/// Interning key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureKey {
    /// Canonical path
    pub path: String,
    /// Tiling flag
    pub tile: bool,
    /// Filtering flag
    pub linear: bool,
    /// Sharing discriminator
    pub share_id: u32,
}

/// Shared handle to one texture
pub struct TextureResource {
    id: ResourceId,
    manager: Arc<TextureDataManager>,
    local: Option<Arc<TextureData>>,
    tile: bool,
    force_load: AtomicBool,
    size: Mutex<Size2>,
    source_size: Mutex<(f32, f32)>,
}

impl std::fmt::Debug for TextureResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureResource")
            .field("id", &self.id)
            .field("dynamic", &self.is_dynamic())
            .field("size", &*self.size.lock())
            .finish()
    }
}

impl TextureResource {
    fn new(
        id: ResourceId,
        manager: Arc<TextureDataManager>,
        local: Option<Arc<TextureData>>,
        tile: bool,
    ) -> Self {
        Self {
            id,
            manager,
            local,
            tile,
            force_load: AtomicBool::new(false),
            size: Mutex::new(Size2::ZERO),
            source_size: Mutex::new((0.0, 0.0)),
        }
    }

    fn cache_dimensions(&self, data: &TextureData) {
        *self.size.lock() = data.size();
        *self.source_size.lock() = data.source_size();
    }

    /// Owner identity in the manager
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// True when the manager owns the pixels
    pub fn is_dynamic(&self) -> bool {
        self.local.is_none()
    }

    /// The backing texture, without changing its recency
    pub fn data(&self) -> Option<Arc<TextureData>> {
        match &self.local {
            Some(local) => Some(local.clone()),
            None => self.manager.get(self.id, LoadMode::Disabled),
        }
    }

    /// Bind for drawing
    ///
    /// Dynamic textures that are not ready yet start loading. Returns false, with the
    /// blank texture bound, when nothing could be bound.
    pub fn bind(&self) -> bool {
        match &self.local {
            Some(local) => {
                let bound = local.upload_and_bind();
                if !bound {
                    self.manager.bind_blank();
                }
                bound
            }
            None => self.manager.bind(self.id),
        }
    }

    /// Mark the texture as about to be needed, without starting a decode
    pub fn prioritize(&self) {
        if self.is_dynamic() {
            self.manager.get(self.id, LoadMode::MoveToTopOnly);
        }
    }

    /// Pin the texture so eviction never releases it
    pub fn set_required(&self, required: bool) {
        if !self.is_dynamic() {
            return;
        }
        if let Some(data) = self.manager.get(self.id, LoadMode::Disabled) {
            data.set_required(required);
        }
    }

    /// Rasterize scalable sources at `width` x `height`
    pub fn rasterize_at(&self, width: u32, height: u32) {
        let Some(data) = self.data() else {
            return;
        };

        data.set_source_size(width as f32, height as f32);
        if (self.force_load.load(Ordering::Relaxed) || !self.is_dynamic()) && !data.is_loaded() {
            data.load(false);
        }
        if data.is_loaded() {
            self.cache_dimensions(&data);
        }
    }

    /// True when pixels are in RAM or on the GPU
    pub fn is_loaded(&self) -> bool {
        self.data().is_some_and(|data| data.is_loaded())
    }

    /// Release RAM and VRAM; returns false when nothing was loaded
    pub fn unload(&self) -> bool {
        match self.data() {
            Some(data) if data.is_loaded() => {
                data.release_vram();
                data.release_ram();
                true
            }
            _ => false,
        }
    }

    /// Load again after [`unload`](Self::unload)
    ///
    /// Private textures decode immediately; dynamic ones are handed to the manager.
    pub fn reload(&self) {
        match &self.local {
            Some(local) => {
                if !local.is_loaded() {
                    local.load(false);
                }
            }
            None => {
                self.manager.get(self.id, LoadMode::Enabled);
            }
        }
    }

    /// Cancel a queued decode
    pub fn cancel_async(&self) -> bool {
        self.is_dynamic() && self.manager.cancel_async(self.id)
    }

    /// Size in pixels, provisional until an async decode finishes
    pub fn size(&self) -> Size2 {
        if let Some(data) = self.data().filter(|data| data.is_loaded()) {
            self.cache_dimensions(&data);
        }
        *self.size.lock()
    }

    /// Logical size of the source
    pub fn source_size(&self) -> (f32, f32) {
        if let Some(data) = self.data().filter(|data| data.is_loaded()) {
            self.cache_dimensions(&data);
        }
        *self.source_size.lock()
    }

    /// Repeat instead of clamping at the edges
    pub fn is_tiled(&self) -> bool {
        self.tile
    }

    /// Replace the pixels of a private texture
    pub fn init_from_pixels(&self, pixels: &[u8], width: u32, height: u32) -> bool {
        let Some(local) = &self.local else {
            return false;
        };
        local.release_vram();
        local.release_ram();
        let ok = local.init_from_rgba(pixels.to_vec(), width, height);
        self.cache_dimensions(local);
        ok
    }

    /// Show a frame owned by someone else in a private texture
    pub fn init_from_external_pixels(&self, pixels: Arc<[u8]>, width: u32, height: u32) -> bool {
        let Some(local) = &self.local else {
            return false;
        };
        let ok = local.update_from_external_rgba(pixels, width, height);
        self.cache_dimensions(local);
        ok
    }

    /// Decode an encoded bitmap into a private texture
    pub fn init_from_memory(&self, data: &[u8]) -> bool {
        let Some(local) = &self.local else {
            return false;
        };
        local.release_vram();
        local.release_ram();
        let ok = local.init_image_from_memory(data);
        self.cache_dimensions(local);
        ok
    }
}

impl Drop for TextureResource {
    fn drop(&mut self) {
        if self.local.is_none() {
            self.manager.remove(self.id);
        }
    }
}

/// Smallest registry size at which dead handles are swept
const SWEEP_MIN: usize = 64;

/// Weak handles, swept of dead entries whenever the count doubles
struct InternMap {
    entries: AHashMap<TextureKey, Weak<TextureResource>>,
    sweep_at: usize,
}

impl InternMap {
    fn new() -> Self {
        Self {
            entries: AHashMap::new(),
            sweep_at: SWEEP_MIN,
        }
    }

    fn insert(&mut self, key: TextureKey, handle: Weak<TextureResource>) {
        if self.entries.len() >= self.sweep_at {
            self.sweep();
        }
        self.entries.insert(key, handle);
    }

    fn sweep(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, weak| weak.strong_count() > 0);
        self.sweep_at = (self.entries.len() * 2).max(SWEEP_MIN);
        before - self.entries.len()
    }
}

struct ReloadList {
    entries: Vec<Weak<TextureResource>>,
    sweep_at: usize,
}

impl ReloadList {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            sweep_at: SWEEP_MIN,
        }
    }

    fn push(&mut self, handle: Weak<TextureResource>) {
        if self.entries.len() >= self.sweep_at {
            self.sweep();
        }
        self.entries.push(handle);
    }

    fn sweep(&mut self) {
        self.entries.retain(|weak| weak.strong_count() > 0);
        self.sweep_at = (self.entries.len() * 2).max(SWEEP_MIN);
    }
}

/// Entry point for texture requests
///
/// Owns the manager and the intern map. Build one at startup and share it.
pub struct TextureCache {
    ctx: Arc<TextureContext>,
    manager: Arc<TextureDataManager>,
    interned: Mutex<InternMap>,
    reloadables: Mutex<ReloadList>,
}

impl TextureCache {
    /// Create a cache with the default number of loader threads
    pub fn new(ctx: Arc<TextureContext>) -> Self {
        Self::with_loader(ctx, TextureLoader::new())
    }

    /// Create a cache with `workers` loader threads
    pub fn with_workers(ctx: Arc<TextureContext>, workers: usize) -> Self {
        Self::with_loader(ctx, TextureLoader::with_workers(workers))
    }

    fn with_loader(ctx: Arc<TextureContext>, loader: TextureLoader) -> Self {
        let manager = Arc::new(TextureDataManager::with_loader(ctx.clone(), loader));
        Self {
            ctx,
            manager,
            interned: Mutex::new(InternMap::new()),
            reloadables: Mutex::new(ReloadList::new()),
        }
    }

    /// Shared services
    pub fn context(&self) -> &Arc<TextureContext> {
        &self.ctx
    }

    /// The texture manager
    pub fn manager(&self) -> &Arc<TextureDataManager> {
        &self.manager
    }

    /// Get the texture for `path`, creating it if no live handle exists
    ///
    /// An empty path yields an empty private texture. Bundled paths are never dynamic.
    /// A live handle requested with a larger display box is re-decoded when its pixels
    /// are now too small.
    pub fn get(&self, path: &str, options: TextureOptions) -> Arc<TextureResource> {
        let canonical = canonical_path(path);
        if canonical.is_empty() {
            let resource = self.create_private(options.tile, options.linear);
            self.reloadables.lock().push(Arc::downgrade(&resource));
            return resource;
        }

        let dynamic = options.dynamic && !is_bundled(&canonical);
        let key = TextureKey {
            path: canonical.clone(),
            tile: options.tile,
            linear: options.linear,
            share_id: options.share_id,
        };

        let mut interned = self.interned.lock();
        if let Some(existing) = interned.entries.get(&key).and_then(Weak::upgrade) {
            self.apply_max_size(&existing, options.max_size);
            return existing;
        }
        interned.entries.remove(&key);

        let resource = Arc::new(if dynamic {
            self.create_dynamic(&canonical, &options)
        } else {
            self.create_local(&canonical, &options)
        });

        if options.as_reloadable {
            interned.insert(key, Arc::downgrade(&resource));
            drop(interned);
            self.reloadables.lock().push(Arc::downgrade(&resource));
        }
        resource
    }

    /// Create an empty private texture for in-memory pixels
    pub fn create_private(&self, tile: bool, linear: bool) -> Arc<TextureResource> {
        let data = Arc::new(TextureData::new(self.ctx.clone(), tile, linear));
        self.manager.track_unmanaged(&data);
        Arc::new(TextureResource::new(
            ResourceId::next(),
            self.manager.clone(),
            Some(data),
            tile,
        ))
    }

    fn apply_max_size(&self, resource: &TextureResource, max_size: Option<MaxSizeInfo>) {
        let Some(max_size) = max_size.filter(|max| !max.is_empty()) else {
            return;
        };
        if !self.ctx.settings().optimize_vram() {
            return;
        }
        let Some(data) = resource.data() else {
            return;
        };

        data.set_max_size(max_size);
        if !data.is_loaded() || data.is_max_size_valid() {
            return;
        }
        if resource.is_dynamic() {
            self.manager.load(&data, true);
        } else {
            data.release_vram();
            data.release_ram();
            data.load(false);
        }
    }

    fn create_dynamic(&self, path: &str, options: &TextureOptions) -> TextureResource {
        let id = ResourceId::next();
        let data = self.manager.add(id, options.tile, options.linear);
        if let Some(max_size) = options.max_size {
            data.set_max_size(max_size);
        }
        data.init_from_path(path);

        let probed = if !options.force_load
            && self.ctx.settings().async_images()
            && data.kind() == SourceKind::Raster
        {
            self.ctx
                .fs()
                .resolve(path)
                .ok()
                .and_then(|file| self.ctx.size_cache().probe(path, &file))
        } else {
            None
        };

        if let Some(size) = probed {
            data.set_temporary_size(size.width, size.height);
        }
        self.manager.load(&data, probed.is_none());

        let resource = TextureResource::new(id, self.manager.clone(), None, options.tile);
        resource.cache_dimensions(&data);

        let mode = if options.force_load {
            LoadMode::Enabled
        } else {
            LoadMode::Disabled
        };
        self.manager.get(id, mode);

        if options.force_load {
            resource.force_load.store(true, Ordering::Relaxed);
            if !data.is_loaded() {
                data.load(false);
            }
        }
        resource
    }

    fn create_local(&self, path: &str, options: &TextureOptions) -> TextureResource {
        let data = Arc::new(TextureData::new(
            self.ctx.clone(),
            options.tile,
            options.linear,
        ));
        if let Some(max_size) = options.max_size {
            data.set_max_size(max_size);
        }
        data.init_from_path(path);
        data.load(false);
        self.manager.track_unmanaged(&data);

        let resource = TextureResource::new(
            ResourceId::next(),
            self.manager.clone(),
            Some(data.clone()),
            options.tile,
        );
        resource.cache_dimensions(&data);
        resource.force_load.store(options.force_load, Ordering::Relaxed);
        resource
    }

    /// Drop intern entries whose handles are gone
    ///
    /// Requests sweep on their own as the registries grow; this forces it.
    pub fn sweep_expired(&self) -> usize {
        let swept = self.interned.lock().sweep();
        self.reloadables.lock().sweep();
        swept
    }

    /// Number of live interned handles
    pub fn len(&self) -> usize {
        self.interned
            .lock()
            .entries
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// True when no interned handle is alive
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_reloadables(&self) -> Vec<Arc<TextureResource>> {
        let mut reloadables = self.reloadables.lock();
        reloadables.sweep();
        reloadables.entries.iter().filter_map(Weak::upgrade).collect()
    }

    /// Release every reloadable texture, e.g. before the theme changes
    pub fn unload_all(&self) {
        let resources = self.live_reloadables();
        let released = resources.iter().filter(|res| res.unload()).count();
        log::debug!("Unloaded {} textures", released);
    }

    /// Load every reloadable texture again
    pub fn reload_all(&self) {
        for resource in self.live_reloadables() {
            resource.reload();
        }
    }

    /// Resident, unmanaged and queued bytes together
    pub fn total_mem_usage(&self) -> usize {
        self.manager.total_mem_usage()
    }

    /// Estimated bytes of every texture once loaded
    pub fn total_texture_size(&self) -> usize {
        self.manager.total_texture_size()
    }

    /// Snapshot of memory usage
    pub fn report(&self) -> MemoryReport {
        self.manager.report()
    }

    /// Cancel every queued decode
    pub fn clear_queue(&self) {
        self.manager.clear_queue();
    }

    /// Wait for queued decodes to finish; false on timeout
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.manager.wait_idle(timeout)
    }

    /// Persist the image size cache under the cache directory
    pub fn save_size_cache(&self) -> crate::AssetResult<()> {
        self.ctx.fs().ensure_cache_dir()?;
        let path = self.ctx.fs().cache_path("image_sizes.json");
        self.ctx.size_cache().save(&path)
    }
}

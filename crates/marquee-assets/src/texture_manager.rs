//! Texture Data Manager
//!
//! Registry of every dynamically managed texture, ordered by how recently it was used,
//! and the owner of the [`TextureLoader`]. Before a texture is decoded the manager
//! evicts least recently used textures until the VRAM budget has room for it.
//!
//! Lock order is always manager, then loader, then texture.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use ahash::AHashMap;
use marquee_core::{MEGABYTE, MemoryBudget, MemoryReport};
use marquee_platform::is_bundled;
use parking_lot::{Mutex, ReentrantMutex};

use crate::context::TextureContext;
use crate::texture_data::TextureData;
use crate::texture_loader::TextureLoader;

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a texture's owner, usually a [`TextureResource`](crate::TextureResource)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    /// Allocate a fresh owner identity
    pub fn next() -> Self {
        Self(NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// What [`TextureDataManager::get`] does besides the lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Promote to most recently used and start loading if needed
    Enabled,
    /// Passive lookup; recency is unchanged
    Disabled,
    /// Promote to most recently used without loading
    MoveToTopOnly,
}

struct Entry {
    data: Arc<TextureData>,
    stamp: u64,
}

#[derive(Default)]
struct ManagerState {
    entries: AHashMap<ResourceId, Entry>,
    /// Recency stamp to owner; the first entry is the least recently used
    recency: BTreeMap<u64, ResourceId>,
    clock: u64,
}

impl ManagerState {
    fn insert(&mut self, owner: ResourceId, data: Arc<TextureData>) {
        self.remove(owner);
        self.clock += 1;
        self.recency.insert(self.clock, owner);
        self.entries.insert(
            owner,
            Entry {
                data,
                stamp: self.clock,
            },
        );
    }

    fn remove(&mut self, owner: ResourceId) -> Option<Arc<TextureData>> {
        let entry = self.entries.remove(&owner)?;
        self.recency.remove(&entry.stamp);
        Some(entry.data)
    }

    fn touch(&mut self, owner: ResourceId) {
        self.clock += 1;
        let stamp = self.clock;
        if let Some(entry) = self.entries.get_mut(&owner) {
            self.recency.remove(&entry.stamp);
            entry.stamp = stamp;
            self.recency.insert(stamp, owner);
        }
    }

    /// Textures in eviction order: least recently used first, bundled resources last
    fn eviction_order(&self) -> Vec<Arc<TextureData>> {
        let (bundled, regular): (Vec<_>, Vec<_>) = self
            .recency
            .values()
            .filter_map(|owner| self.entries.get(owner))
            .map(|entry| entry.data.clone())
            .partition(|data| is_bundled(&data.path()));
        regular.into_iter().chain(bundled).collect()
    }

    fn textures(&self) -> impl Iterator<Item = &Arc<TextureData>> {
        self.entries.values().map(|entry| &entry.data)
    }
}

fn megabytes(bytes: usize) -> f64 {
    bytes as f64 / MEGABYTE as f64
}

/// Recency-ordered texture registry with VRAM budget enforcement
pub struct TextureDataManager {
    ctx: Arc<TextureContext>,
    state: ReentrantMutex<RefCell<ManagerState>>,
    loader: TextureLoader,
    blank: Arc<TextureData>,
    unmanaged: Mutex<Vec<Weak<TextureData>>>,
}

impl TextureDataManager {
    /// Create a manager with the default number of loader threads
    pub fn new(ctx: Arc<TextureContext>) -> Self {
        Self::with_loader(ctx, TextureLoader::new())
    }

    /// Create a manager around an existing loader
    pub fn with_loader(ctx: Arc<TextureContext>, loader: TextureLoader) -> Self {
        let blank = Arc::new(TextureData::new(ctx.clone(), false, false));
        init_blank(&blank);

        Self {
            ctx,
            state: ReentrantMutex::new(RefCell::new(ManagerState::default())),
            loader,
            blank,
            unmanaged: Mutex::new(Vec::new()),
        }
    }

    /// Shared services
    pub fn context(&self) -> &Arc<TextureContext> {
        &self.ctx
    }

    /// The loader
    pub fn loader(&self) -> &TextureLoader {
        &self.loader
    }

    /// Register a new texture for `owner`, replacing any previous one
    ///
    /// The texture starts as the most recently used.
    pub fn add(&self, owner: ResourceId, tiled: bool, linear: bool) -> Arc<TextureData> {
        let data = Arc::new(TextureData::new(self.ctx.clone(), tiled, linear));
        let guard = self.state.lock();
        guard.borrow_mut().insert(owner, data.clone());
        data
    }

    /// Look up the texture of `owner`
    pub fn get(&self, owner: ResourceId, mode: LoadMode) -> Option<Arc<TextureData>> {
        let data = {
            let guard = self.state.lock();
            let mut state = guard.borrow_mut();
            let data = state.entries.get(&owner)?.data.clone();
            if mode != LoadMode::Disabled {
                state.touch(owner);
            }
            data
        };

        if mode == LoadMode::Enabled && !data.is_loaded() {
            self.load(&data, false);
        }
        Some(data)
    }

    /// Bind the texture of `owner`, or the blank texture when it is not ready
    pub fn bind(&self, owner: ResourceId) -> bool {
        let bound = self
            .get(owner, LoadMode::Enabled)
            .is_some_and(|data| data.upload_and_bind());
        if !bound {
            self.bind_blank();
        }
        bound
    }

    /// Bind the fully transparent placeholder
    pub fn bind_blank(&self) -> bool {
        if !self.blank.is_loaded() {
            init_blank(&self.blank);
        }
        self.blank.upload_and_bind()
    }

    /// Unregister the texture of `owner`, cancelling its pending load
    pub fn remove(&self, owner: ResourceId) {
        let guard = self.state.lock();
        let removed = guard.borrow_mut().remove(owner);
        if let Some(data) = removed {
            self.loader.remove(&data);
        }
    }

    /// Cancel the pending load of `owner`'s texture
    pub fn cancel_async(&self, owner: ResourceId) -> bool {
        let guard = self.state.lock();
        let data = guard
            .borrow()
            .entries
            .get(&owner)
            .map(|entry| entry.data.clone());
        data.is_some_and(|data| self.loader.remove(&data))
    }

    /// Make sure `tex` is loaded, or queued when `block` is false
    ///
    /// A loaded texture decoded too small for its current display box is reloaded
    /// synchronously. Room is made in the budget before the decode and, for blocking
    /// loads, again once the real size is known.
    pub fn load(&self, tex: &Arc<TextureData>, block: bool) {
        let mut block = block;

        if tex.is_loaded() {
            if tex.is_max_size_valid() {
                return;
            }
            tex.release_vram();
            tex.release_ram();
            self.loader.remove(tex);
            block = true;
        }

        self.cleanup_vram(Some(tex));

        if block {
            self.loader.remove(tex);
            tex.load(false);
            self.cleanup_vram(Some(tex));
        } else {
            self.loader.load(tex);
        }
    }

    /// Evict textures until the budget has room
    ///
    /// The first pass releases loaded textures, least recently used first, until the
    /// resident total plus the incoming texture fits. The second pass also counts the
    /// loader queue and additionally cancels queued textures. `exclude`, pinned and
    /// non-reloadable textures are never touched.
    pub fn cleanup_vram(&self, exclude: Option<&Arc<TextureData>>) {
        let budget = MemoryBudget::from_bytes(self.ctx.settings().max_vram_bytes());
        let guard = self.state.lock();
        let order = guard.borrow().eviction_order();

        let incoming = exclude
            .filter(|tex| !tex.is_loaded() && !self.loader.is_pending(tex))
            .map_or(0, |tex| tex.estimated_size());
        let resident: usize = order.iter().map(|tex| tex.vram_usage()).sum();
        let queued = self.loader.queue_size();
        let mut usage = resident + self.unmanaged_usage() + incoming;
        if !budget.is_exceeded(usage + queued) {
            return;
        }

        log::debug!(
            "Cleanup VRAM: {:.2} MB used, {:.2} MB queued, {:.2} MB budget",
            megabytes(usage),
            megabytes(queued),
            megabytes(budget.max_bytes)
        );

        let evictable = |tex: &&Arc<TextureData>| {
            !exclude.is_some_and(|excluded| Arc::ptr_eq(excluded, tex))
                && tex.is_reloadable()
                && !tex.is_required()
        };

        for tex in order.iter().filter(evictable) {
            if !budget.is_exceeded(usage) {
                break;
            }
            if !tex.is_loaded() {
                continue;
            }
            usage = usage.saturating_sub(release(tex));
        }

        usage += queued;

        for tex in order.iter().filter(evictable) {
            if !budget.is_exceeded(usage) {
                break;
            }
            if tex.is_loaded() {
                usage = usage.saturating_sub(release(tex));
            } else if self.loader.remove(tex) {
                log::debug!("Cleanup VRAM removed from queue: {}", tex.path());
                usage = usage.saturating_sub(tex.estimated_size());
            }
        }

        drop(guard);

        if budget.is_exceeded(usage) {
            log::warn!(
                "VRAM budget exceeded: {:.2} MB used, {:.2} MB budget, nothing left to evict",
                megabytes(usage),
                megabytes(budget.max_bytes)
            );
        }
    }

    /// Estimated bytes of every registered texture once loaded
    pub fn total_size(&self) -> usize {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.textures().map(|tex| tex.estimated_size()).sum()
    }

    /// Bytes held by registered textures right now
    pub fn committed_size(&self) -> usize {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.textures().map(|tex| tex.vram_usage()).sum()
    }

    /// Estimated bytes of queued and decoding textures
    pub fn queue_size(&self) -> usize {
        self.loader.queue_size()
    }

    /// Cancel every queued load
    pub fn clear_queue(&self) {
        self.loader.clear_queue();
    }

    /// Wait for the loader to drain; false on timeout
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.loader.wait_idle(timeout)
    }

    /// Number of registered textures
    pub fn len(&self) -> usize {
        self.state.lock().borrow().entries.len()
    }

    /// True when no texture is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered textures, most recently used first
    pub fn textures(&self) -> Vec<Arc<TextureData>> {
        let guard = self.state.lock();
        let state = guard.borrow();
        state
            .recency
            .values()
            .rev()
            .filter_map(|owner| state.entries.get(owner))
            .map(|entry| entry.data.clone())
            .collect()
    }

    /// Count a texture that manages its own storage towards the budget
    pub fn track_unmanaged(&self, data: &Arc<TextureData>) {
        let mut unmanaged = self.unmanaged.lock();
        unmanaged.retain(|weak| weak.strong_count() > 0);
        unmanaged.push(Arc::downgrade(data));
    }

    fn live_unmanaged(&self) -> Vec<Arc<TextureData>> {
        let mut unmanaged = self.unmanaged.lock();
        unmanaged.retain(|weak| weak.strong_count() > 0);
        unmanaged.iter().filter_map(Weak::upgrade).collect()
    }

    /// Bytes held by textures that manage their own storage
    pub fn unmanaged_usage(&self) -> usize {
        self.live_unmanaged()
            .iter()
            .map(|tex| tex.vram_usage())
            .sum()
    }

    /// Resident, unmanaged and queued bytes together
    pub fn total_mem_usage(&self) -> usize {
        self.committed_size() + self.unmanaged_usage() + self.queue_size()
    }

    /// Estimated bytes of every texture, managed or not, once loaded
    pub fn total_texture_size(&self) -> usize {
        let unmanaged: usize = self
            .live_unmanaged()
            .iter()
            .map(|tex| tex.estimated_size())
            .sum();
        self.total_size() + unmanaged
    }

    /// Snapshot of memory usage
    pub fn report(&self) -> MemoryReport {
        let unmanaged = self.live_unmanaged();
        MemoryReport {
            committed: self.committed_size(),
            queued: self.queue_size(),
            unmanaged: unmanaged.iter().map(|tex| tex.vram_usage()).sum(),
            total_estimated: self.total_size()
                + unmanaged.iter().map(|tex| tex.estimated_size()).sum::<usize>(),
            budget: self.ctx.settings().max_vram_bytes(),
        }
    }
}

fn init_blank(blank: &TextureData) {
    blank.init_from_rgba(vec![0; 5 * 5 * 4], 5, 5);
}

fn release(tex: &TextureData) -> usize {
    let freed = tex.vram_usage();
    tex.release_vram();
    tex.release_ram();
    log::debug!("Cleanup VRAM released: {}", tex.path());
    freed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture_data::tests::synthetic_context;
    use marquee_core::TextureSettings;
    use marquee_renderer::HeadlessBackend;

    const TIMEOUT: Duration = Duration::from_secs(10);
    const FRAME: usize = 1024 * 768 * 4;

    fn manager(max_vram_mb: u32) -> (Arc<HeadlessBackend>, TextureDataManager) {
        let backend = Arc::new(HeadlessBackend::new());
        let settings = TextureSettings {
            max_vram_mb,
            ..TextureSettings::default()
        };
        let ctx = synthetic_context(backend.clone(), settings);
        (backend, TextureDataManager::with_loader(ctx, TextureLoader::with_workers(2)))
    }

    fn register(manager: &TextureDataManager, path: &str) -> (ResourceId, Arc<TextureData>) {
        let owner = ResourceId::next();
        let data = manager.add(owner, false, false);
        data.init_from_path(path);
        (owner, data)
    }

    fn budget_holds(manager: &TextureDataManager) -> bool {
        manager.committed_size() <= manager.context().settings().max_vram_bytes()
    }

    #[test]
    fn test_ten_megabyte_scenario() {
        let (_backend, manager) = manager(10);
        let textures: Vec<_> = (1..=5)
            .map(|i| register(&manager, &format!("/roms/t{i}-1024x768.png")).1)
            .collect();

        for tex in &textures {
            manager.load(tex, true);
            assert!(budget_holds(&manager));
        }

        assert!(!textures[0].is_loaded());
        assert!(!textures[1].is_loaded());
        assert!(textures[2..].iter().all(|tex| tex.is_loaded()));
        assert_eq!(manager.committed_size(), 3 * FRAME);

        // Evicted textures stay registered and keep their size
        assert_eq!(manager.len(), 5);
        assert_eq!(textures[0].estimated_size(), FRAME);
        assert_eq!(manager.total_size(), 5 * FRAME);
    }

    #[test]
    fn test_pinned_and_non_reloadable_never_evicted() {
        let (_backend, manager) = manager(10);
        let (_, pinned) = register(&manager, "/roms/pinned-1024x768.png");
        pinned.set_required(true);

        let fixed = manager.add(ResourceId::next(), false, false);
        assert!(fixed.init_from_rgba(vec![0; FRAME], 1024, 768));

        for i in 0..4 {
            let (_, tex) = register(&manager, &format!("/roms/t{i}-1024x768.png"));
            manager.load(&tex, true);
        }
        manager.load(&pinned, true);

        assert!(pinned.is_loaded());
        assert!(fixed.is_loaded());
        assert!(budget_holds(&manager));
    }

    #[test]
    fn test_budget_overrun_when_nothing_evictable() {
        let (_backend, manager) = manager(1);
        let (_, a) = register(&manager, "/roms/a-1024x768.png");
        a.set_required(true);
        manager.load(&a, true);

        let (_, b) = register(&manager, "/roms/b-1024x768.png");
        manager.load(&b, true);

        // Both stay loaded; the overrun is only logged
        assert!(a.is_loaded());
        assert!(b.is_loaded());
    }

    #[test]
    fn test_bundled_entries_evicted_last() {
        let (_backend, manager) = manager(7);
        let bundled = manager.add(ResourceId::next(), false, false);
        bundled.init_from_path(":/frame-1024x768.png");
        // Bundled paths resolve through the resource roots; load the pixels directly
        assert!(bundled.init_from_rgba(vec![0; FRAME], 1024, 768));

        let (_, older) = register(&manager, "/roms/older-1024x768.png");
        manager.load(&older, true);

        let (_, newer) = register(&manager, "/roms/newer-1024x768.png");
        manager.load(&newer, true);

        assert!(bundled.is_loaded());
        assert!(!older.is_loaded());
        assert!(newer.is_loaded());
    }

    #[test]
    fn test_queued_entries_cancelled_in_second_pass() {
        let (_backend, manager) = manager(10);
        manager.loader().pause();

        let queued: Vec<_> = (0..3)
            .map(|i| {
                let (_, tex) = register(&manager, &format!("/roms/q{i}-1024x768.png"));
                tex.set_temporary_size(1024, 768);
                manager.load(&tex, false);
                tex
            })
            .collect();
        assert_eq!(manager.queue_size(), 3 * FRAME);

        let (_, urgent) = register(&manager, "/roms/urgent-1024x768.png");
        urgent.set_temporary_size(1024, 768);
        manager.load(&urgent, false);

        // The oldest request made room for the newest
        assert!(!manager.loader().is_pending(&queued[0]));
        assert!(manager.loader().is_pending(&queued[1]));
        assert!(manager.loader().is_pending(&queued[2]));
        assert!(manager.loader().is_pending(&urgent));

        manager.loader().resume();
        assert!(manager.wait_idle(TIMEOUT));
        assert!(!queued[0].is_loaded());
        assert!(urgent.is_loaded());
    }

    #[test]
    fn test_get_modes() {
        let (_backend, manager) = manager(100);
        manager.loader().pause();
        let (first, a) = register(&manager, "/roms/a-4x4.png");
        let (_, _b) = register(&manager, "/roms/b-4x4.png");

        assert!(manager.get(first, LoadMode::Disabled).is_some());
        assert!(!Arc::ptr_eq(&manager.textures()[0], &a));
        assert!(!manager.loader().is_pending(&a));

        manager.get(first, LoadMode::MoveToTopOnly);
        assert!(Arc::ptr_eq(&manager.textures()[0], &a));
        assert!(!manager.loader().is_pending(&a));

        manager.get(first, LoadMode::Enabled);
        assert!(manager.loader().is_pending(&a));

        assert!(manager.get(ResourceId::next(), LoadMode::Enabled).is_none());
    }

    #[test]
    fn test_bind_falls_back_to_blank() {
        let (backend, manager) = manager(100);
        let (owner, _) = register(&manager, "/roms/broken.png");

        assert!(!manager.bind(owner));
        let bound = backend.bound().unwrap();
        let desc = backend.descriptor(bound).unwrap();
        assert_eq!((desc.width, desc.height), (5, 5));

        assert!(!manager.bind(ResourceId::next()));
    }

    #[test]
    fn test_bind_uploads_loaded_texture() {
        let (backend, manager) = manager(100);
        let (owner, data) = register(&manager, "/roms/a-8x8.png");
        manager.load(&data, true);

        assert!(manager.bind(owner));
        let desc = backend.descriptor(backend.bound().unwrap()).unwrap();
        assert_eq!((desc.width, desc.height), (8, 8));
        assert_eq!(manager.committed_size(), 8 * 8 * 4);
    }

    #[test]
    fn test_remove_cancels_pending_load() {
        let (_backend, manager) = manager(100);
        manager.loader().pause();
        let (owner, data) = register(&manager, "/roms/a-4x4.png");
        manager.load(&data, false);
        assert!(manager.loader().is_pending(&data));

        manager.remove(owner);
        assert!(!manager.loader().is_pending(&data));
        assert!(manager.get(owner, LoadMode::Disabled).is_none());
        assert!(manager.is_empty());
    }

    #[test]
    fn test_cancel_async() {
        let (_backend, manager) = manager(100);
        manager.loader().pause();
        let (owner, data) = register(&manager, "/roms/a-4x4.png");
        manager.load(&data, false);

        assert!(manager.cancel_async(owner));
        assert!(!manager.cancel_async(owner));
        assert_eq!(manager.queue_size(), 0);
    }

    #[test]
    fn test_add_replaces_previous_texture() {
        let (_backend, manager) = manager(100);
        let owner = ResourceId::next();
        let first = manager.add(owner, false, false);
        let second = manager.add(owner, true, false);

        assert_eq!(manager.len(), 1);
        let current = manager.get(owner, LoadMode::Disabled).unwrap();
        assert!(Arc::ptr_eq(&current, &second));
        assert!(!Arc::ptr_eq(&current, &first));
    }

    #[test]
    fn test_unmanaged_usage_and_report() {
        let (_backend, manager) = manager(100);
        let private = Arc::new(TextureData::new(manager.context().clone(), false, false));
        private.init_from_rgba(vec![0; 64], 4, 4);
        manager.track_unmanaged(&private);

        let (_, data) = register(&manager, "/roms/a-8x8.png");
        manager.load(&data, true);

        let report = manager.report();
        assert_eq!(report.committed, 256);
        assert_eq!(report.unmanaged, 64);
        assert_eq!(report.total_estimated, 320);
        assert_eq!(report.budget, 100 * MEGABYTE);
        assert_eq!(manager.total_mem_usage(), 320);
        assert_eq!(manager.total_texture_size(), 320);

        drop(private);
        assert_eq!(manager.unmanaged_usage(), 0);
    }

    #[test]
    fn test_budget_read_live() {
        let (_backend, manager) = manager(100);
        let textures: Vec<_> = (0..3)
            .map(|i| {
                let (_, tex) = register(&manager, &format!("/roms/t{i}-1024x768.png"));
                manager.load(&tex, true);
                tex
            })
            .collect();
        assert!(textures.iter().all(|tex| tex.is_loaded()));

        manager
            .context()
            .settings()
            .update(|settings| settings.max_vram_mb = 4);
        manager.cleanup_vram(None);

        assert_eq!(manager.committed_size(), FRAME);
        assert!(textures[2].is_loaded());
    }

    #[test]
    fn test_valid_loaded_texture_left_alone() {
        let (_backend, manager) = manager(100);
        let (_, data) = register(&manager, "/roms/a-8x8.png");
        manager.load(&data, true);
        assert!(data.is_loaded());
        assert!(data.is_max_size_valid());

        // Valid textures are left alone
        manager.loader().pause();
        manager.load(&data, false);
        assert_eq!(manager.queue_size(), 0);
        assert!(data.is_loaded());
    }
}

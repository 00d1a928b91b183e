//! Render service - owns the cache, pool, layout, and in-flight work

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use flume::{Receiver, Sender};
use log::{debug, info, warn};

use crate::cache::{CacheStats, PageCache};
use crate::cancel::CancelToken;
use crate::config::RenderConfig;
use crate::layout::LayoutTable;
use crate::pool::{Surface, SurfacePool};
use crate::request::{RenderRequest, RenderResponse, RequestId};
use crate::source::{DocumentSource, RasterImage, RenderError, TargetResolution, TextLayout};
use crate::state::{Command, Effect, ViewState};
use crate::visibility::{PageRange, visible_pages};
use crate::worker::render_worker;

/// One in-flight render. At most one exists per page.
#[derive(Debug)]
struct PendingRender {
    id: RequestId,
    target: TargetResolution,
    cancel: CancelToken,
}

/// The single in-flight layout measurement
#[derive(Debug)]
struct PendingLayout {
    id: RequestId,
    layout_width: u32,
}

/// Notifications produced while draining worker responses
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewerEvent {
    /// A new layout table was installed; total height may have changed
    LayoutChanged,
    /// A page's raster became available
    PageReady(usize),
    /// A page failed to render and shows an error placeholder
    PageFailed(usize),
    /// The document is unusable; no further rendering will happen
    Fatal,
}

/// Display readiness of one visible page
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    /// A surface at the current target resolution is available
    Ready,
    /// A render is outstanding (or about to be scheduled)
    Pending,
    /// The last render attempt failed
    Failed,
}

/// Placement and readiness of one visible page
#[derive(Clone, Copy, Debug)]
pub struct PageSlot {
    pub page: usize,
    pub offset: u64,
    pub height: u32,
    pub state: SlotState,
}

/// Everything the display layer needs to draw the current scroll position
#[derive(Clone, Debug, Default)]
pub struct ViewSnapshot {
    pub total_height: u64,
    pub scroll_top: u64,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub slots: Vec<PageSlot>,
}

/// Manages rendering for one open document.
///
/// Owns the image cache, the surface pool, the layout table, and the
/// pending-request table. Render work happens on worker threads fed
/// through a shared queue, but every mutation of the shared tables is
/// serialized here: workers only hand results back over a channel, and
/// `pump` commits them after checking the request is still wanted. Drop
/// cancels all outstanding work and shuts the workers down.
pub struct RenderService {
    source: Arc<dyn DocumentSource>,
    config: RenderConfig,
    state: ViewState,
    layout: Option<LayoutTable>,
    cache: PageCache,
    pool: SurfacePool,
    display: HashMap<usize, Surface>,
    failed: HashSet<usize>,
    visible: Option<PageRange>,
    pending: HashMap<usize, PendingRender>,
    pending_layout: Option<PendingLayout>,
    request_tx: Sender<RenderRequest>,
    response_rx: Receiver<RenderResponse>,
    next_request_id: u64,
    fatal: Option<RenderError>,
    num_workers: usize,
}

impl RenderService {
    /// Open a document and spawn the render workers
    #[must_use]
    pub fn open(source: Arc<dyn DocumentSource>, config: RenderConfig) -> Self {
        let (request_tx, request_rx) = flume::unbounded();
        let (response_tx, response_rx) = flume::unbounded();

        // flume gives us the MPMC fan-out the worker pool needs: every
        // worker clones the receiver and pulls from the same queue.
        for _ in 0..config.workers {
            let src = Arc::clone(&source);
            let rx = request_rx.clone();
            let tx = response_tx.clone();
            std::thread::spawn(move || render_worker(src, rx, tx));
        }

        let page_count = source.page_count();
        info!("opened document with {page_count} pages, {} workers", config.workers);

        Self {
            state: ViewState::new(page_count, config.device_pixel_scale),
            layout: None,
            cache: PageCache::new(config.cache_budget_bytes),
            pool: SurfacePool::new(),
            display: HashMap::new(),
            failed: HashSet::new(),
            visible: None,
            pending: HashMap::new(),
            pending_layout: None,
            request_tx,
            response_rx,
            next_request_id: 1,
            fatal: None,
            num_workers: config.workers,
            source,
            config,
        }
    }

    /// Current view state
    #[must_use]
    pub fn state(&self) -> &ViewState {
        &self.state
    }

    /// Installed layout table, if any
    #[must_use]
    pub fn layout(&self) -> Option<&LayoutTable> {
        self.layout.as_ref()
    }

    /// Fatal document error, if one was reported
    #[must_use]
    pub fn fatal_error(&self) -> Option<&RenderError> {
        self.fatal.as_ref()
    }

    #[must_use]
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Apply a command to the view state and run the resulting effects
    pub fn apply(&mut self, cmd: Command) {
        let effects = self.state.apply(cmd);
        self.execute_effects(effects);
    }

    /// Drain completed worker responses, committing results that are still
    /// wanted. Call from the controlling thread, once per frame or event
    /// loop turn.
    pub fn pump(&mut self) -> Vec<ViewerEvent> {
        let mut events = Vec::new();
        while let Ok(response) = self.response_rx.try_recv() {
            if let Some(event) = self.handle_response(response) {
                events.push(event);
            }
        }
        events
    }

    /// Snapshot of the visible region for the display layer
    #[must_use]
    pub fn view(&self) -> ViewSnapshot {
        let mut snapshot = ViewSnapshot {
            total_height: self.layout.as_ref().map_or(0, LayoutTable::total_height),
            scroll_top: self.state.scroll_top,
            viewport_width: self.state.viewport_width,
            viewport_height: self.state.viewport_height,
            slots: Vec::new(),
        };

        if let (Some(layout), Some(range)) = (&self.layout, self.visible) {
            for page in range.iter() {
                let target = target_for(layout, self.state.device_pixel_scale, page);
                let ready = self
                    .display
                    .get(&page)
                    .is_some_and(|s| s.width() == target.width && s.height() == target.height);
                let state = if ready {
                    SlotState::Ready
                } else if self.failed.contains(&page) {
                    SlotState::Failed
                } else {
                    SlotState::Pending
                };
                snapshot.slots.push(PageSlot {
                    page,
                    offset: layout.offset_of(page),
                    height: layout.height_of(page),
                    state,
                });
            }
        }

        snapshot
    }

    /// Composed display surface for a page, if its raster has been committed
    #[must_use]
    pub fn page_surface(&self, page: usize) -> Option<&Surface> {
        self.display.get(&page)
    }

    /// Overlay text layout, straight from the source
    pub fn text_layout(&self, page: usize) -> Result<TextLayout, RenderError> {
        self.source.text_layout(page)
    }

    /// Give back every pooled surface. Call on low-memory signals.
    pub fn handle_memory_pressure(&mut self) {
        debug!("memory pressure: draining {} pooled surfaces", self.pool.len());
        self.pool.drain();
    }

    /// Cancel everything and shut the workers down
    pub fn close(&mut self) {
        self.cancel_all();
        for _ in 0..self.num_workers {
            let _ = self.request_tx.send(RenderRequest::Shutdown);
        }
        self.release_all_display();
        self.pool.drain();
        self.cache.clear();
    }

    fn execute_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::RebuildLayout => self.request_layout(),

                Effect::SyncVisible => self.sync_visible(),

                Effect::InvalidateCache => {
                    self.cancel_all();
                    self.cache.clear();
                    self.release_all_display();
                    self.failed.clear();
                }

                Effect::InvalidatePage(page) => {
                    if let Some(stale) = self.pending.remove(&page) {
                        stale.cancel.cancel();
                    }
                    self.cache.invalidate(page);
                    if let Some(surface) = self.display.remove(&page) {
                        self.pool.release(surface);
                    }
                    self.failed.remove(&page);
                }

                Effect::ScrollToPage(page) => {
                    let Some(offset) = self
                        .layout
                        .as_ref()
                        .map(|l| l.offset_of(page.min(l.page_count())))
                    else {
                        continue;
                    };
                    let follow_up = self.state.apply(Command::SetScroll(offset));
                    self.execute_effects(follow_up);
                }

                Effect::ReloadDocument => {
                    self.fatal = None;
                    self.failed.clear();
                    let count = self.source.page_count();
                    let _ = self.state.apply(Command::SetPageCount(count));
                }
            }
        }
    }

    /// Ask a worker to measure every page so a new layout table can be
    /// installed. Deduplicates against an in-flight measurement for the
    /// same width; a response for a superseded width is discarded by id.
    fn request_layout(&mut self) {
        if self.fatal.is_some() {
            return;
        }
        let layout_width = self.state.layout_width();
        if layout_width == 0 {
            // Invalid viewport; keep the previous table.
            return;
        }
        if self
            .pending_layout
            .as_ref()
            .is_some_and(|p| p.layout_width == layout_width)
        {
            return;
        }

        let id = self.next_id();
        self.pending_layout = Some(PendingLayout { id, layout_width });
        let _ = self
            .request_tx
            .send(RenderRequest::Measure { id, layout_width });
    }

    /// Reconcile render work with the current visible set: cancel tasks
    /// for pages that scrolled away, schedule pages that came in, dedupe
    /// in-flight work, and supersede stale target resolutions.
    fn sync_visible(&mut self) {
        if self.fatal.is_some() || self.state.viewport_invalid() {
            return;
        }
        let Some(layout) = self.layout.as_ref() else {
            return;
        };

        let new_range = visible_pages(
            self.state.scroll_top,
            self.state.viewport_height,
            layout,
            self.config.buffer_pages,
        );
        let dps = self.state.device_pixel_scale;
        let targets: Vec<(usize, TargetResolution)> = new_range
            .iter()
            .map(|page| (page, target_for(layout, dps, page)))
            .collect();

        if let Some(old_range) = self.visible.replace(new_range) {
            for page in old_range.iter() {
                if !new_range.contains(page) {
                    self.drop_page_work(page);
                }
            }
        }

        for (page, target) in targets {
            if target.is_degenerate() {
                continue;
            }
            self.failed.remove(&page);

            if let Some(image) = self.cache.get(page, target.width, target.height) {
                // Satisfied from cache. A leftover task for some other
                // resolution must not land on top of this entry.
                self.ensure_display(page, &image);
                if self.pending.get(&page).is_some_and(|p| p.target != target) {
                    if let Some(stale) = self.pending.remove(&page) {
                        stale.cancel.cancel();
                    }
                }
                continue;
            }

            match self.pending.get(&page) {
                Some(p) if p.target == target => {} // already in flight
                Some(_) => {
                    // Superseded resolution: the old result must never
                    // reach the cache.
                    if let Some(stale) = self.pending.remove(&page) {
                        stale.cancel.cancel();
                    }
                    self.start_render(page, target);
                }
                None => self.start_render(page, target),
            }
        }
    }

    fn start_render(&mut self, page: usize, target: TargetResolution) {
        let id = self.next_id();
        let cancel = CancelToken::new();
        debug!("scheduling page {page} at {}x{}", target.width, target.height);
        let _ = self.request_tx.send(RenderRequest::Page {
            id,
            page,
            target,
            cancel: cancel.clone(),
        });
        self.pending.insert(page, PendingRender { id, target, cancel });
    }

    /// Commit point for worker responses. A render result is installed
    /// only if its request is still registered and its page still wanted;
    /// anything else is a completed race and is dropped without touching
    /// the cache.
    fn handle_response(&mut self, response: RenderResponse) -> Option<ViewerEvent> {
        match response {
            RenderResponse::Page { id, page, image } => {
                let registered = self.pending.get(&page).is_some_and(|p| p.id == id);
                let wanted = self.visible.is_some_and(|v| v.contains(page));
                if !registered || !wanted {
                    debug!("discarding stale render of page {page}");
                    return None;
                }

                let pending = self.pending.remove(&page)?;
                if image.resolution() != pending.target {
                    warn!(
                        "page {page}: source returned {}x{}, wanted {}x{}",
                        image.width(),
                        image.height(),
                        pending.target.width,
                        pending.target.height
                    );
                    self.failed.insert(page);
                    return Some(ViewerEvent::PageFailed(page));
                }

                let image = self.cache.put(page, image);
                self.ensure_display(page, &image);
                self.failed.remove(&page);
                Some(ViewerEvent::PageReady(page))
            }

            RenderResponse::Cancelled(id) => {
                // Normally the entry is already gone; this only fires when
                // the worker noticed the cancellation first.
                if let Some(page) = self.page_for_request(id) {
                    self.pending.remove(&page);
                }
                None
            }

            RenderResponse::Error { id, page, error } => {
                if error.is_fatal() {
                    return self.enter_fatal(error);
                }
                match page {
                    Some(page) => {
                        if !self.pending.get(&page).is_some_and(|p| p.id == id) {
                            return None; // failure of a superseded request
                        }
                        self.pending.remove(&page);
                        self.failed.insert(page);
                        warn!("page {page} render failed: {error}");
                        Some(ViewerEvent::PageFailed(page))
                    }
                    None => {
                        if self.pending_layout.as_ref().is_some_and(|p| p.id == id) {
                            self.pending_layout = None;
                            warn!("layout measure failed, keeping previous layout: {error}");
                        }
                        None
                    }
                }
            }

            RenderResponse::Layout {
                id,
                layout_width,
                sizes,
            } => {
                if !self.pending_layout.as_ref().is_some_and(|p| p.id == id) {
                    return None;
                }
                self.pending_layout = None;

                if layout_width != self.state.layout_width() {
                    // The viewport moved on while we were measuring.
                    self.request_layout();
                    return None;
                }

                let table = LayoutTable::build(&sizes, layout_width)?;
                self.state.total_height = table.total_height();
                self.state.clamp_scroll();
                self.layout = Some(table);
                self.sync_visible();
                Some(ViewerEvent::LayoutChanged)
            }
        }
    }

    fn enter_fatal(&mut self, error: RenderError) -> Option<ViewerEvent> {
        if self.fatal.is_some() {
            return None; // already surfaced
        }
        warn!("document is unusable: {error}");
        self.cancel_all();
        self.release_all_display();
        self.fatal = Some(error);
        Some(ViewerEvent::Fatal)
    }

    /// Blit a committed raster onto this page's display surface, reusing
    /// a pooled surface.
    fn ensure_display(&mut self, page: usize, image: &RasterImage) {
        let current = self
            .display
            .get(&page)
            .is_some_and(|s| s.width() == image.width() && s.height() == image.height());
        if current {
            return;
        }
        let mut surface = self.pool.acquire();
        surface.copy_from(image);
        if let Some(old) = self.display.insert(page, surface) {
            self.pool.release(old);
        }
    }

    /// Cancel and forget everything in flight for one page
    fn drop_page_work(&mut self, page: usize) {
        if let Some(pending) = self.pending.remove(&page) {
            pending.cancel.cancel();
        }
        if let Some(surface) = self.display.remove(&page) {
            self.pool.release(surface);
        }
    }

    fn cancel_all(&mut self) {
        for (_, pending) in self.pending.drain() {
            pending.cancel.cancel();
        }
        self.pending_layout = None;
    }

    fn release_all_display(&mut self) {
        for (_, surface) in self.display.drain() {
            self.pool.release(surface);
        }
    }

    fn page_for_request(&self, id: RequestId) -> Option<usize> {
        self.pending
            .iter()
            .find(|(_, p)| p.id == id)
            .map(|(page, _)| *page)
    }

    fn next_id(&mut self) -> RequestId {
        let id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;
        id
    }
}

impl Drop for RenderService {
    fn drop(&mut self) {
        self.close();
    }
}

fn target_for(layout: &LayoutTable, device_pixel_scale: f32, page: usize) -> TargetResolution {
    TargetResolution::new(
        (layout.width() as f32 * device_pixel_scale).round() as u32,
        (layout.height_of(page) as f32 * device_pixel_scale).round() as u32,
    )
}

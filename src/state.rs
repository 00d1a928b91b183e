//! View state management

/// Zoom step multipliers and bounds
const ZOOM_IN_RATE: f32 = 1.1;
const ZOOM_OUT_RATE: f32 = 1.05;
const MIN_ZOOM: f32 = 0.1;
const MAX_ZOOM: f32 = 16.0;

/// Current view state for an open document
#[derive(Clone, Debug)]
pub struct ViewState {
    /// Viewport width in logical pixels
    pub viewport_width: u32,

    /// Viewport height in logical pixels
    pub viewport_height: u32,

    /// Scroll position from the top of the document, in layout pixels
    pub scroll_top: u64,

    /// User zoom factor (1.0 = fit width)
    pub zoom: f32,

    /// Device pixel density multiplier for target resolutions
    pub device_pixel_scale: f32,

    /// Total page count
    pub page_count: usize,

    /// Total scrollable height from the current layout table
    pub total_height: u64,
}

impl ViewState {
    #[must_use]
    pub fn new(page_count: usize, device_pixel_scale: f32) -> Self {
        Self {
            viewport_width: 0,
            viewport_height: 0,
            scroll_top: 0,
            zoom: 1.0,
            device_pixel_scale: sanitize_scale(device_pixel_scale),
            page_count,
            total_height: 0,
        }
    }

    /// Width pages are laid out at: viewport width times zoom
    #[must_use]
    pub fn layout_width(&self) -> u32 {
        (self.viewport_width as f32 * self.zoom).round() as u32
    }

    /// True when the viewport cannot display anything
    #[must_use]
    pub const fn viewport_invalid(&self) -> bool {
        self.viewport_width == 0 || self.viewport_height == 0
    }

    /// Greatest scroll offset that still shows a full viewport
    #[must_use]
    pub fn max_scroll(&self) -> u64 {
        self.total_height
            .saturating_sub(u64::from(self.viewport_height))
    }

    /// Re-clamp the scroll position after the layout or viewport changed
    pub fn clamp_scroll(&mut self) {
        self.scroll_top = self.scroll_top.min(self.max_scroll());
    }

    /// Apply a command and return the resulting effects
    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        match cmd {
            Command::SetViewport { width, height } => {
                if width == self.viewport_width && height == self.viewport_height {
                    return vec![];
                }
                let width_changed = width != self.viewport_width;
                self.viewport_width = width;
                self.viewport_height = height;
                self.clamp_scroll();
                if self.viewport_invalid() {
                    // Nothing to lay out or render; keep whatever we had.
                    vec![]
                } else if width_changed {
                    vec![Effect::RebuildLayout]
                } else {
                    vec![Effect::SyncVisible]
                }
            }

            Command::SetScroll(offset) => {
                let clamped = offset.min(self.max_scroll());
                if clamped == self.scroll_top {
                    return vec![];
                }
                self.scroll_top = clamped;
                vec![Effect::SyncVisible]
            }

            Command::ScrollBy(delta) => {
                let target = self.scroll_top.saturating_add_signed(delta);
                self.apply(Command::SetScroll(target))
            }

            Command::SetZoom(zoom) => {
                let clamped = clamp_zoom(zoom);
                if (self.zoom - clamped).abs() <= f32::EPSILON {
                    return vec![];
                }
                self.zoom = clamped;
                if self.viewport_invalid() {
                    vec![]
                } else {
                    vec![Effect::RebuildLayout]
                }
            }

            Command::ZoomIn => self.apply(Command::SetZoom(self.zoom * ZOOM_IN_RATE)),

            Command::ZoomOut => self.apply(Command::SetZoom(self.zoom / ZOOM_OUT_RATE)),

            Command::SetDevicePixelScale(scale) => {
                let sanitized = sanitize_scale(scale);
                if (self.device_pixel_scale - sanitized).abs() <= f32::EPSILON {
                    return vec![];
                }
                // Target resolutions change but the layout does not.
                self.device_pixel_scale = sanitized;
                vec![Effect::SyncVisible]
            }

            Command::Reload => {
                vec![
                    Effect::InvalidateCache,
                    Effect::ReloadDocument,
                    Effect::RebuildLayout,
                ]
            }

            Command::SetPageCount(count) => {
                self.page_count = count;
                vec![]
            }

            Command::ScrollToPage(page) => {
                if self.page_count == 0 {
                    return vec![];
                }
                vec![Effect::ScrollToPage(page.clamp(1, self.page_count))]
            }

            Command::PageDirty(page) => {
                vec![Effect::InvalidatePage(page), Effect::SyncVisible]
            }
        }
    }
}

fn clamp_zoom(zoom: f32) -> f32 {
    if zoom.is_finite() {
        zoom.clamp(MIN_ZOOM, MAX_ZOOM)
    } else {
        1.0
    }
}

fn sanitize_scale(scale: f32) -> f32 {
    if scale.is_finite() && scale > 0.0 {
        scale
    } else {
        1.0
    }
}

/// Commands that modify view state
#[derive(Clone, Copy, Debug)]
pub enum Command {
    /// Resize the viewport (logical pixels)
    SetViewport { width: u32, height: u32 },
    /// Jump to an absolute scroll offset
    SetScroll(u64),
    /// Scroll relative to the current position
    ScrollBy(i64),
    /// Set the zoom factor
    SetZoom(f32),
    /// Zoom in by one step
    ZoomIn,
    /// Zoom out by one step
    ZoomOut,
    /// Change the device pixel density multiplier
    SetDevicePixelScale(f32),
    /// Reload the document
    Reload,
    /// Update the page count
    SetPageCount(usize),
    /// Jump so the given page sits at the top of the viewport
    ScrollToPage(usize),
    /// Mark a page's content stale
    PageDirty(usize),
}

/// Effects produced by state changes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Measure pages and install a fresh layout table
    RebuildLayout,
    /// Recompute the visible set and reconcile render work
    SyncVisible,
    /// Invalidate the whole image cache
    InvalidateCache,
    /// Invalidate one page's cache entry
    InvalidatePage(usize),
    /// Scroll to a page's offset (resolved against the layout table)
    ScrollToPage(usize),
    /// Refresh document metadata from the source
    ReloadDocument,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> ViewState {
        let mut state = ViewState::new(10, 1.0);
        state.viewport_width = 800;
        state.viewport_height = 600;
        state.total_height = 10_000;
        state
    }

    #[test]
    fn resize_width_rebuilds_layout() {
        let mut state = test_state();
        let effects = state.apply(Command::SetViewport {
            width: 1000,
            height: 600,
        });
        assert_eq!(effects, vec![Effect::RebuildLayout]);
    }

    #[test]
    fn resize_height_only_resyncs() {
        let mut state = test_state();
        let effects = state.apply(Command::SetViewport {
            width: 800,
            height: 700,
        });
        assert_eq!(effects, vec![Effect::SyncVisible]);
    }

    #[test]
    fn resize_no_change_is_a_no_op() {
        let mut state = test_state();
        let effects = state.apply(Command::SetViewport {
            width: 800,
            height: 600,
        });
        assert!(effects.is_empty());
    }

    #[test]
    fn collapsed_viewport_produces_no_effects() {
        let mut state = test_state();
        let effects = state.apply(Command::SetViewport {
            width: 0,
            height: 600,
        });
        assert!(effects.is_empty());
        assert!(state.viewport_invalid());
    }

    #[test]
    fn scroll_clamps_to_document_end() {
        let mut state = test_state();
        let effects = state.apply(Command::SetScroll(u64::MAX));
        assert_eq!(state.scroll_top, 10_000 - 600);
        assert_eq!(effects, vec![Effect::SyncVisible]);
    }

    #[test]
    fn scroll_by_saturates_at_top() {
        let mut state = test_state();
        state.scroll_top = 100;
        let effects = state.apply(Command::ScrollBy(-500));
        assert_eq!(state.scroll_top, 0);
        assert_eq!(effects, vec![Effect::SyncVisible]);

        let again = state.apply(Command::ScrollBy(-500));
        assert!(again.is_empty());
    }

    #[test]
    fn zoom_changes_layout_width() {
        let mut state = test_state();
        let effects = state.apply(Command::SetZoom(2.0));
        assert_eq!(effects, vec![Effect::RebuildLayout]);
        assert_eq!(state.layout_width(), 1600);
    }

    #[test]
    fn zoom_rejects_non_finite_values() {
        let mut state = test_state();
        let _ = state.apply(Command::SetZoom(f32::NAN));
        assert_eq!(state.zoom, 1.0);
        let _ = state.apply(Command::SetZoom(f32::INFINITY));
        assert_eq!(state.zoom, 1.0);
    }

    #[test]
    fn zoom_steps_are_multiplicative() {
        let mut state = test_state();
        let _ = state.apply(Command::ZoomIn);
        assert!((state.zoom - 1.1).abs() < 1e-5);
        let _ = state.apply(Command::ZoomOut);
        assert!((state.zoom - 1.1 / 1.05).abs() < 1e-5);
    }

    #[test]
    fn device_pixel_scale_resyncs_without_rebuild() {
        let mut state = test_state();
        let effects = state.apply(Command::SetDevicePixelScale(2.0));
        assert_eq!(effects, vec![Effect::SyncVisible]);
        assert_eq!(state.layout_width(), 800);
    }

    #[test]
    fn reload_invalidates_and_rebuilds() {
        let mut state = test_state();
        let effects = state.apply(Command::Reload);
        assert_eq!(
            effects,
            vec![
                Effect::InvalidateCache,
                Effect::ReloadDocument,
                Effect::RebuildLayout,
            ]
        );
    }

    #[test]
    fn scroll_to_page_clamps_to_document() {
        let mut state = test_state();
        assert_eq!(
            state.apply(Command::ScrollToPage(99)),
            vec![Effect::ScrollToPage(10)]
        );
        assert_eq!(
            state.apply(Command::ScrollToPage(0)),
            vec![Effect::ScrollToPage(1)]
        );

        state.page_count = 0;
        assert!(state.apply(Command::ScrollToPage(5)).is_empty());
    }

    #[test]
    fn dirty_page_invalidates_and_resyncs() {
        let mut state = test_state();
        let effects = state.apply(Command::PageDirty(3));
        assert_eq!(
            effects,
            vec![Effect::InvalidatePage(3), Effect::SyncVisible]
        );
    }
}

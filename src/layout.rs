//! Per-document page layout table for continuous scrolling

use crate::source::PageSize;

/// Aspect ratio used when a source reports degenerate page dimensions.
/// ISO A-series paper, height over width.
const FALLBACK_ASPECT: f32 = std::f32::consts::SQRT_2;

/// One page's vertical placement: scaled height and cumulative offset
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutEntry {
    pub offset: u64,
    pub height: u32,
}

/// Ordered page heights scaled to a layout width, with cumulative offsets.
///
/// Heights are proportional to the layout width, so the table is rebuilt
/// wholesale whenever that width changes; patching a single entry would
/// shift every offset after it. Tables are immutable once built and
/// installed atomically by the scheduler.
#[derive(Clone, Debug)]
pub struct LayoutTable {
    entries: Vec<LayoutEntry>,
    total_height: u64,
    width: u32,
}

impl LayoutTable {
    /// Build a table from intrinsic page sizes at the given layout width.
    ///
    /// Returns `None` for a zero width or an empty document; the caller
    /// keeps whatever table it already has.
    #[must_use]
    pub fn build(sizes: &[PageSize], width: u32) -> Option<Self> {
        if width == 0 || sizes.is_empty() {
            return None;
        }

        let mut entries = Vec::with_capacity(sizes.len());
        let mut offset: u64 = 0;
        for size in sizes {
            let aspect = if size.width > 0.0 && size.height > 0.0 {
                size.height / size.width
            } else {
                FALLBACK_ASPECT
            };
            let height = ((width as f32 * aspect).round() as u32).max(1);
            entries.push(LayoutEntry { offset, height });
            offset += u64::from(height);
        }

        Some(Self {
            entries,
            total_height: offset,
            width,
        })
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.entries.len()
    }

    /// Layout width the heights were scaled to
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Sum of all page heights
    #[must_use]
    pub const fn total_height(&self) -> u64 {
        self.total_height
    }

    /// Vertical offset of a page (1-based)
    #[must_use]
    pub fn offset_of(&self, page: usize) -> u64 {
        self.entries[page - 1].offset
    }

    /// Scaled height of a page (1-based)
    #[must_use]
    pub fn height_of(&self, page: usize) -> u32 {
        self.entries[page - 1].height
    }

    /// Page whose vertical range contains `y`, clamped to the last page
    /// when `y` lies past the end of the document.
    #[must_use]
    pub fn page_at(&self, y: u64) -> usize {
        // First page whose range ends above y; every offset before it is <= y.
        let idx = self
            .entries
            .partition_point(|e| e.offset + u64::from(e.height) <= y);
        idx.min(self.entries.len() - 1) + 1
    }
}

//! Visible-set computation from scroll position and layout

use crate::layout::LayoutTable;

/// Contiguous run of visible pages, both ends inclusive, 1-based.
///
/// Pages stack vertically, so the visible set is always an interval.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRange {
    pub first: usize,
    pub last: usize,
}

impl PageRange {
    #[must_use]
    pub fn contains(self, page: usize) -> bool {
        page >= self.first && page <= self.last
    }

    /// Number of pages in the range
    #[must_use]
    pub fn count(self) -> usize {
        self.last - self.first + 1
    }

    pub fn iter(self) -> impl Iterator<Item = usize> {
        self.first..=self.last
    }
}

/// Compute the pages to consider visible for the current scroll position.
///
/// The band spans `buffer_pages` viewport heights above and below the
/// viewport itself; a page belongs to the set when its vertical range
/// meets the band. Pure: identical inputs give an identical range, and
/// growing `viewport_height` or `buffer_pages` never shrinks the result.
#[must_use]
pub fn visible_pages(
    scroll_top: u64,
    viewport_height: u32,
    layout: &LayoutTable,
    buffer_pages: u32,
) -> PageRange {
    let buffer = u64::from(buffer_pages) * u64::from(viewport_height);
    let start_y = scroll_top.saturating_sub(buffer);
    let end_y = scroll_top
        .saturating_add(u64::from(viewport_height))
        .saturating_add(buffer);

    PageRange {
        first: layout.page_at(start_y),
        last: layout.page_at(end_y),
    }
}

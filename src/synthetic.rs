//! Synthetic document source for tests and the simulation harness

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rayon::prelude::*;

use crate::cancel::CancelToken;
use crate::source::{
    BYTES_PER_PIXEL, DocumentSource, PageSize, RasterImage, RenderError, TargetResolution,
    TextLayout, TextLine,
};

/// In-memory document that renders procedurally generated pages.
///
/// Each page is a vertical gradient keyed by its page number, so tests can
/// tell rasters apart without a real decoder. Per-page render latency and
/// failure injection make scheduler races reproducible.
pub struct SyntheticSource {
    pages: Vec<PageSize>,
    delay: Option<Duration>,
    failing: HashSet<usize>,
    renders: Arc<AtomicUsize>,
}

impl SyntheticSource {
    /// Document of `count` identical pages
    #[must_use]
    pub fn uniform(count: usize, width: f32, height: f32) -> Self {
        Self::with_pages(vec![PageSize::new(width, height); count])
    }

    /// Document with explicit per-page intrinsic sizes
    #[must_use]
    pub fn with_pages(pages: Vec<PageSize>) -> Self {
        Self {
            pages,
            delay: None,
            failing: HashSet::new(),
            renders: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sleep this long inside every render, checking for cancellation
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make one page always fail to render
    #[must_use]
    pub fn with_failing_page(mut self, page: usize) -> Self {
        self.failing.insert(page);
        self
    }

    /// Counter of completed `render_page` calls, shared with clones
    #[must_use]
    pub fn render_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.renders)
    }

    fn sleep_cancellable(&self, cancel: &CancelToken) -> Result<(), RenderError> {
        let Some(total) = self.delay else {
            return Ok(());
        };
        let slice = Duration::from_millis(1);
        let mut slept = Duration::ZERO;
        while slept < total {
            if cancel.is_cancelled() {
                return Err(RenderError::Cancelled);
            }
            std::thread::sleep(slice);
            slept += slice;
        }
        Ok(())
    }
}

impl DocumentSource for SyntheticSource {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_size(&self, page: usize) -> Result<PageSize, RenderError> {
        self.pages
            .get(page - 1)
            .copied()
            .ok_or_else(|| RenderError::page(page, "page out of range"))
    }

    fn render_page(
        &self,
        page: usize,
        target: TargetResolution,
        cancel: &CancelToken,
    ) -> Result<RasterImage, RenderError> {
        if page == 0 || page > self.pages.len() {
            return Err(RenderError::page(page, "page out of range"));
        }
        if self.failing.contains(&page) {
            return Err(RenderError::page(page, "injected failure"));
        }

        self.sleep_cancellable(cancel)?;
        if cancel.is_cancelled() {
            return Err(RenderError::Cancelled);
        }

        let mut image = RasterImage::blank(target.width, target.height);
        if target.is_degenerate() {
            return Ok(image);
        }
        let width = target.width as usize;
        let height = target.height as usize;
        let base = (page * 29 % 256) as u8;

        image
            .pixels_mut()
            .par_chunks_mut(width * BYTES_PER_PIXEL)
            .enumerate()
            .for_each(|(row, chunk)| {
                let shade = (row * 255 / height) as u8;
                for px in chunk.chunks_exact_mut(BYTES_PER_PIXEL) {
                    px[0] = base;
                    px[1] = shade;
                    px[2] = base.wrapping_add(shade);
                    px[3] = 0xFF;
                }
            });

        self.renders.fetch_add(1, Ordering::SeqCst);
        Ok(image)
    }

    fn text_layout(&self, page: usize) -> Result<TextLayout, RenderError> {
        let size = self.page_size(page)?;
        Ok(TextLayout {
            lines: vec![TextLine {
                x0: 0.0,
                y0: 0.0,
                x1: size.width,
                y1: size.height / 10.0,
                text: format!("synthetic page {page}"),
            }],
        })
    }
}

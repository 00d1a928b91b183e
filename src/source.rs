//! Document source abstraction and core raster types

use crate::cancel::CancelToken;

/// Intrinsic (unscaled) page dimensions in document units
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Pixel dimensions a page is rasterized at for the current viewport/zoom
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TargetResolution {
    pub width: u32,
    pub height: u32,
}

impl TargetResolution {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True if either dimension is zero
    #[must_use]
    pub const fn is_degenerate(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Decoded RGBA page raster
#[derive(Clone)]
pub struct RasterImage {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

/// Bytes per RGBA pixel
pub const BYTES_PER_PIXEL: usize = 4;

impl RasterImage {
    /// Wrap an RGBA buffer. The buffer length must be `width * height * 4`.
    #[must_use]
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Self {
        debug_assert_eq!(
            pixels.len(),
            width as usize * height as usize * BYTES_PER_PIXEL
        );
        Self {
            pixels,
            width,
            height,
        }
    }

    /// Allocate a zeroed image
    #[must_use]
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            pixels: vec![0; width as usize * height as usize * BYTES_PER_PIXEL],
            width,
            height,
        }
    }

    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    #[must_use]
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub const fn resolution(&self) -> TargetResolution {
        TargetResolution::new(self.width, self.height)
    }

    /// Memory footprint of the pixel buffer
    #[must_use]
    pub const fn size_bytes(&self) -> usize {
        self.pixels.len()
    }
}

impl std::fmt::Debug for RasterImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("size_bytes", &self.size_bytes())
            .finish()
    }
}

/// One laid-out text line, positioned in page pixel coordinates
#[derive(Clone, Debug)]
pub struct TextLine {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
    pub text: String,
}

/// Text layout description for overlay text selection
#[derive(Clone, Debug, Default)]
pub struct TextLayout {
    pub lines: Vec<TextLine>,
}

/// Errors surfaced by document sources and render tasks
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The whole document is unusable. Fatal: reported once, no further
    /// rendering is attempted.
    #[error("document failed to load: {0}")]
    DocumentLoad(String),

    /// One page failed to decode or rasterize. Local: other pages are
    /// unaffected and the page may be retried later.
    #[error("page {page} failed to render: {detail}")]
    PageRender { page: usize, detail: String },

    /// The request was cancelled. Not a failure; never logged as one.
    #[error("render cancelled")]
    Cancelled,
}

impl RenderError {
    pub fn page(page: usize, detail: impl Into<String>) -> Self {
        Self::PageRender {
            page,
            detail: detail.into(),
        }
    }

    /// True for errors that poison the whole document
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::DocumentLoad(_))
    }
}

/// Supplier of page metadata and raster content.
///
/// Pages are numbered from 1. Implementations are called from multiple
/// worker threads and must be internally serialized or safely concurrent.
pub trait DocumentSource: Send + Sync {
    /// Number of pages in the document
    fn page_count(&self) -> usize;

    /// Intrinsic dimensions of a page, in document units
    fn page_size(&self, page: usize) -> Result<PageSize, RenderError>;

    /// Produce an RGBA raster of the page at exactly the target resolution.
    ///
    /// Long-running implementations should poll `cancel` and bail out with
    /// `RenderError::Cancelled` once it trips.
    fn render_page(
        &self,
        page: usize,
        target: TargetResolution,
        cancel: &CancelToken,
    ) -> Result<RasterImage, RenderError>;

    /// Text layout for overlay selection. Optional; defaults to empty.
    fn text_layout(&self, _page: usize) -> Result<TextLayout, RenderError> {
        Ok(TextLayout::default())
    }
}

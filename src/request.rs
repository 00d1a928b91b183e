//! Render request and response types

use crate::cancel::CancelToken;
use crate::source::{PageSize, RasterImage, RenderError, TargetResolution};

/// Unique identifier for render requests
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Request sent to render workers
#[derive(Debug)]
pub enum RenderRequest {
    /// Rasterize one page at one target resolution
    Page {
        id: RequestId,
        page: usize,
        target: TargetResolution,
        cancel: CancelToken,
    },

    /// Measure intrinsic sizes of every page for a layout rebuild
    Measure { id: RequestId, layout_width: u32 },

    /// Shut down the worker
    Shutdown,
}

/// Response from render workers
#[derive(Debug)]
pub enum RenderResponse {
    /// Rendered page raster
    Page {
        id: RequestId,
        page: usize,
        image: RasterImage,
    },

    /// Intrinsic sizes for a layout rebuild, echoing the width the
    /// measurement was requested for
    Layout {
        id: RequestId,
        layout_width: u32,
        sizes: Vec<PageSize>,
    },

    /// The request was cancelled before a result was produced
    Cancelled(RequestId),

    /// A genuine render or measure failure. `page` is `None` for
    /// document-level failures.
    Error {
        id: RequestId,
        page: Option<usize>,
        error: RenderError,
    },
}

//! Render worker - runs in separate thread(s)

use std::sync::Arc;

use flume::{Receiver, Sender};

use crate::request::{RenderRequest, RenderResponse};
use crate::source::{DocumentSource, RenderError};

/// Main worker function. Pulls requests from the shared queue until a
/// `Shutdown` arrives or the channel closes.
///
/// Workers only talk to the document source; the cache, pool, and pending
/// table are mutated exclusively by the service thread when it drains the
/// response channel.
pub fn render_worker(
    source: Arc<dyn DocumentSource>,
    requests: Receiver<RenderRequest>,
    responses: Sender<RenderResponse>,
) {
    for request in requests {
        match request {
            RenderRequest::Page {
                id,
                page,
                target,
                cancel,
            } => {
                if cancel.is_cancelled() {
                    let _ = responses.send(RenderResponse::Cancelled(id));
                    continue;
                }

                let response = match source.render_page(page, target, &cancel) {
                    Ok(_) if cancel.is_cancelled() => RenderResponse::Cancelled(id),
                    Ok(image) => RenderResponse::Page { id, page, image },
                    Err(RenderError::Cancelled) => RenderResponse::Cancelled(id),
                    Err(error) => RenderResponse::Error {
                        id,
                        page: Some(page),
                        error,
                    },
                };
                let _ = responses.send(response);
            }

            RenderRequest::Measure { id, layout_width } => {
                let _ = responses.send(measure_pages(source.as_ref(), id, layout_width));
            }

            RenderRequest::Shutdown => break,
        }
    }
}

fn measure_pages(
    source: &dyn DocumentSource,
    id: crate::request::RequestId,
    layout_width: u32,
) -> RenderResponse {
    let count = source.page_count();
    let mut sizes = Vec::with_capacity(count);
    for page in 1..=count {
        match source.page_size(page) {
            Ok(size) => sizes.push(size),
            Err(error) => {
                return RenderResponse::Error {
                    id,
                    page: None,
                    error,
                };
            }
        }
    }

    RenderResponse::Layout {
        id,
        layout_width,
        sizes,
    }
}

//! Scroll-linked parallax.
//!
//! Scroll events only request a frame. A pending flag owned by the
//! controller admits one request per frame; events arriving while a frame is
//! pending are dropped, not queued. The flag clears after the recompute runs.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::time::sleep;
use tracing::trace;

use super::attrs::parse_number;
use super::effects::FRAME_INTERVAL;
use super::page::{ElementId, Page, Selector};

const DEFAULT_SPEED: f64 = 0.5;

struct Inner<P: ?Sized> {
    page: Arc<P>,
    layers: Vec<(ElementId, f64)>,
    pending: AtomicBool,
    recomputes: AtomicUsize,
}

impl<P: Page + ?Sized> Inner<P> {
    fn recompute(&self) {
        let scroll_y = self.page.viewport().scroll_y;
        for &(element, speed) in &self.layers {
            self.page
                .set_style(element, "transform", &translate_y(-(scroll_y * speed)));
        }
        self.recomputes.fetch_add(1, Ordering::SeqCst);
        self.pending.store(false, Ordering::SeqCst);
        trace!(scroll_y, layers = self.layers.len(), "Parallax recomputed");
    }
}

pub struct ParallaxController<P: ?Sized> {
    inner: Arc<Inner<P>>,
}

impl<P: Page + ?Sized + 'static> ParallaxController<P> {
    /// Collect `.parallax` layers. Returns `None` when the page has none.
    pub fn attach(page: Arc<P>) -> Option<Self> {
        let layers: Vec<_> = page
            .query_all(Selector::Class("parallax"))
            .into_iter()
            .map(|el| {
                let speed = parse_number(page.data(el, "speed").as_deref(), DEFAULT_SPEED);
                (el, speed)
            })
            .collect();
        if layers.is_empty() {
            return None;
        }

        Some(Self {
            inner: Arc::new(Inner {
                page,
                layers,
                pending: AtomicBool::new(false),
                recomputes: AtomicUsize::new(0),
            }),
        })
    }

    /// Handle one scroll event. Returns whether a frame was requested.
    pub fn on_scroll(&self) -> bool {
        if self.inner.pending.swap(true, Ordering::SeqCst) {
            return false;
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            sleep(FRAME_INTERVAL).await;
            inner.recompute();
        });
        true
    }

    pub fn is_pending(&self) -> bool {
        self.inner.pending.load(Ordering::SeqCst)
    }

    pub fn recompute_count(&self) -> usize {
        self.inner.recomputes.load(Ordering::SeqCst)
    }

    pub fn layer_count(&self) -> usize {
        self.inner.layers.len()
    }
}

/// `translate3d(0, <y>px, 0)` with integral values printed without a fraction.
pub fn translate_y(y: f64) -> String {
    let y = if y == 0.0 { 0.0 } else { y };
    format!("translate3d(0, {}px, 0)", y)
}

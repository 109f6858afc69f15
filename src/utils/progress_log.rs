//! Progress-aware logging
//!
//! While a progress bar is drawn on stderr, log lines written to the same
//! stream would tear it apart. The CLI flips a global flag for the duration
//! of the bar and this layer drops events until it is cleared again.

use std::sync::atomic::{AtomicBool, Ordering};
use tracing::span;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

static PROGRESS_MODE: AtomicBool = AtomicBool::new(false);

/// Turn progress mode on or off
pub fn set_progress_mode(enabled: bool) {
    PROGRESS_MODE.store(enabled, Ordering::SeqCst);
}

pub fn is_progress_mode() -> bool {
    PROGRESS_MODE.load(Ordering::SeqCst)
}

/// Forwards to `inner` only while no progress bar is active
pub struct ProgressAwareLayer<L> {
    inner: L,
}

impl<L> ProgressAwareLayer<L> {
    pub fn new(inner: L) -> Self {
        Self { inner }
    }
}

impl<S, L> Layer<S> for ProgressAwareLayer<L>
where
    S: tracing::Subscriber,
    L: Layer<S>,
{
    // Span bookkeeping is never skipped
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        self.inner.on_new_span(attrs, id, ctx);
    }

    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        if !is_progress_mode() {
            self.inner.on_event(event, ctx);
        }
    }

    fn on_enter(&self, id: &span::Id, ctx: Context<'_, S>) {
        if !is_progress_mode() {
            self.inner.on_enter(id, ctx);
        }
    }

    fn on_exit(&self, id: &span::Id, ctx: Context<'_, S>) {
        if !is_progress_mode() {
            self.inner.on_exit(id, ctx);
        }
    }

    fn on_close(&self, id: span::Id, ctx: Context<'_, S>) {
        self.inner.on_close(id, ctx);
    }
}

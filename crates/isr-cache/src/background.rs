//! Background work tracking.
//!
//! Regeneration and purge work must complete independent of the response
//! that triggered it. Platforms that keep the process alive after the
//! response get the spawning tracker; platforms that terminate the process
//! once the response is delivered get the hold-open tracker, whose wrapped
//! response stream finishes only after tracked work settles.

use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture};
use futures::{FutureExt, Stream};
use isr_core::CacheError;
use tokio::task::JoinHandle;
use tracing::warn;

/// Tracks asynchronous effects that must outlive their triggering response.
#[async_trait]
pub trait BackgroundWork: Send + Sync {
    /// Hand off a unit of background work.
    fn track(&self, work: BoxFuture<'static, ()>);

    /// Wait for all tracked work to finish. Individual failures are logged,
    /// never propagated.
    async fn settle(&self);
}

/// Tracker for platforms with a "run after response" primitive: work is
/// spawned immediately and the handles are retained so shutdown can await
/// them.
#[derive(Default)]
pub struct PlatformBackgroundWork {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl PlatformBackgroundWork {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BackgroundWork for PlatformBackgroundWork {
    fn track(&self, work: BoxFuture<'static, ()>) {
        let handle = tokio::spawn(work);
        self.handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    async fn settle(&self) {
        let handles: Vec<_> = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            if let Err(err) = handle.await {
                let err = CacheError::BackgroundWork(err.to_string());
                warn!(error = %err, "background task panicked");
            }
        }
    }
}

/// Tracker for platforms that terminate the process once the response is
/// fully delivered: work is accumulated and driven while the wrapped
/// response stream is held open.
#[derive(Default)]
pub struct HoldOpenBackgroundWork {
    pending: Mutex<Vec<BoxFuture<'static, ()>>>,
}

impl HoldOpenBackgroundWork {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a response body stream so it completes only after all tracked
    /// work has settled.
    pub fn wrap_stream<S>(self: &Arc<Self>, inner: S) -> HoldOpenStream<S> {
        HoldOpenStream {
            inner,
            tracker: Arc::clone(self),
            settling: None,
            done: false,
        }
    }
}

#[async_trait]
impl BackgroundWork for HoldOpenBackgroundWork {
    fn track(&self, work: BoxFuture<'static, ()>) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(work);
    }

    async fn settle(&self) {
        // Work tracked while settling (e.g. fan-out scheduling more writes)
        // is picked up by the next pass.
        loop {
            let batch: Vec<_> = self
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .drain(..)
                .collect();
            if batch.is_empty() {
                return;
            }
            join_all(batch).await;
        }
    }
}

/// Response stream that is deliberately kept open until background work
/// settles.
pub struct HoldOpenStream<S> {
    inner: S,
    tracker: Arc<HoldOpenBackgroundWork>,
    settling: Option<BoxFuture<'static, ()>>,
    done: bool,
}

impl<S> Stream for HoldOpenStream<S>
where
    S: Stream + Unpin,
{
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.done {
            return Poll::Ready(None);
        }

        if this.settling.is_none() {
            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(None) => {
                    let tracker = Arc::clone(&this.tracker);
                    this.settling = Some(async move { tracker.settle().await }.boxed());
                }
                other => return other,
            }
        }

        if let Some(settling) = this.settling.as_mut() {
            match settling.poll_unpin(cx) {
                Poll::Ready(()) => {
                    this.settling = None;
                    this.done = true;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }

        Poll::Ready(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_platform_tracker_settles_spawned_work() {
        let tracker = PlatformBackgroundWork::new();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let counter = counter.clone();
            tracker.track(
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                .boxed(),
            );
        }
        tracker.settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_platform_tracker_survives_panicking_task() {
        let tracker = PlatformBackgroundWork::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let tracked = counter.clone();
        tracker.track(async { panic!("regeneration blew up") }.boxed());
        tracker.track(
            async move {
                tracked.fetch_add(1, Ordering::SeqCst);
            }
            .boxed(),
        );

        // The panic is logged, not propagated; later work still settles.
        tracker.settle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hold_open_stream_runs_work_after_body() {
        let tracker = Arc::new(HoldOpenBackgroundWork::new());
        let flag = Arc::new(AtomicUsize::new(0));
        let tracked = flag.clone();
        tracker.track(
            async move {
                tracked.fetch_add(1, Ordering::SeqCst);
            }
            .boxed(),
        );

        let body = futures::stream::iter(vec!["a", "b"]);
        let wrapped = tracker.wrap_stream(body);
        let chunks: Vec<_> = wrapped.collect().await;

        assert_eq!(chunks, vec!["a", "b"]);
        assert_eq!(flag.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hold_open_settle_picks_up_chained_work() {
        let tracker = Arc::new(HoldOpenBackgroundWork::new());
        let flag = Arc::new(AtomicUsize::new(0));
        let inner_flag = flag.clone();
        let chained = Arc::clone(&tracker);
        tracker.track(
            async move {
                let inner_flag = inner_flag.clone();
                chained.track(
                    async move {
                        inner_flag.fetch_add(1, Ordering::SeqCst);
                    }
                    .boxed(),
                );
            }
            .boxed(),
        );
        tracker.settle().await;
        assert_eq!(flag.load(Ordering::SeqCst), 1);
    }
}

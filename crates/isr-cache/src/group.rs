//! ISR group coordination.
//!
//! A group is a family of routes sharing one revalidation policy. When one
//! member is rendered, its response stream is duplicated so the client is
//! served immediately while a captured copy is persisted; every sibling is
//! then regenerated in the background so the whole group refreshes
//! together instead of a staggered herd of independent regenerations.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::join_all;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use isr_core::{CacheEntry, CacheError, CachePayload, CacheResult, Revalidate};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::background::BackgroundWork;
use crate::handler::CacheHandler;

/// Lifecycle of one request against a grouped route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupPhase {
    /// Nothing in flight.
    Idle,
    /// The requested member is being rendered.
    Rendering,
    /// The response body is being duplicated to client and capture sides.
    StreamSplit,
    /// Sibling members are being regenerated and persisted.
    BackgroundFanOut,
    /// All group writes settled.
    Done,
}

/// One member of an ISR group.
#[derive(Debug, Clone)]
pub struct GroupRoute {
    /// Pathname template of this member.
    pub pathname: String,
    /// Query parameter names that participate in this member's cache key.
    pub cache_query_params: Vec<String>,
}

impl GroupRoute {
    /// Create a member with no key-participating query parameters.
    pub fn new(pathname: impl Into<String>) -> Self {
        Self {
            pathname: pathname.into(),
            cache_query_params: Vec::new(),
        }
    }

    /// Declare the query parameters that participate in the cache key.
    pub fn with_query_params(mut self, params: Vec<String>) -> Self {
        self.cache_query_params = params;
        self
    }

    /// Derive this member's cache key from a request's query parameters,
    /// keeping only the declared ones.
    pub fn cache_key(&self, query: &BTreeMap<String, String>) -> String {
        let parts: Vec<String> = self
            .cache_query_params
            .iter()
            .filter_map(|name| query.get(name).map(|value| format!("{name}={value}")))
            .collect();

        if parts.is_empty() {
            self.pathname.clone()
        } else {
            format!("{}?{}", self.pathname, parts.join("&"))
        }
    }
}

/// A set of routes sharing one revalidation policy.
#[derive(Debug, Clone)]
pub struct IsrGroup {
    /// Shared soft TTL for every member.
    pub revalidate_secs: u64,
    /// The member routes.
    pub routes: Vec<GroupRoute>,
}

impl IsrGroup {
    /// Create a group with the shared revalidation policy.
    pub fn new(revalidate_secs: u64, routes: Vec<GroupRoute>) -> Self {
        Self {
            revalidate_secs,
            routes,
        }
    }

    /// The member matching `pathname`, if any.
    pub fn member(&self, pathname: &str) -> Option<&GroupRoute> {
        self.routes.iter().find(|r| r.pathname == pathname)
    }

    /// Every member other than `pathname`.
    pub fn siblings<'a>(&'a self, pathname: &'a str) -> impl Iterator<Item = &'a GroupRoute> {
        self.routes.iter().filter(move |r| r.pathname != pathname)
    }
}

/// A render produced by the origin render engine.
pub struct RenderedResponse {
    /// Response status code.
    pub status: u16,
    /// Response headers.
    pub headers: BTreeMap<String, String>,
    /// Content tags carried by this render.
    pub tags: Vec<String>,
    /// Response body stream.
    pub body: BoxStream<'static, Bytes>,
}

/// Seam to the origin render engine.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Render a pathname to a streaming response.
    async fn render(&self, pathname: &str) -> CacheResult<RenderedResponse>;
}

/// The response handed back to the dispatcher for the requested member.
pub struct GroupResponse {
    /// Response status code.
    pub status: u16,
    /// Response headers.
    pub headers: BTreeMap<String, String>,
    /// Client-facing body; never delayed by sibling regeneration.
    pub body: BoxStream<'static, Bytes>,
}

/// Coordinates rendering, capture, and sibling fan-out for ISR groups.
pub struct GroupCoordinator {
    handler: Arc<CacheHandler>,
    renderer: Arc<dyn Renderer>,
    background: Arc<dyn BackgroundWork>,
}

impl GroupCoordinator {
    /// Create a coordinator. Background fan-out is handed to `background`,
    /// which must outlive the response.
    pub fn new(
        handler: Arc<CacheHandler>,
        renderer: Arc<dyn Renderer>,
        background: Arc<dyn BackgroundWork>,
    ) -> Self {
        Self {
            handler,
            renderer,
            background,
        }
    }

    /// Serve `pathname` from its group.
    ///
    /// The requested member is rendered and its body teed: consuming the
    /// returned body drives the render stream and forwards every chunk to
    /// the capture side, which is persisted once the body completes. A body
    /// dropped before completion discards the capture. Sibling members are
    /// then regenerated with the same inputs and persisted; a failure in
    /// one sibling is logged and does not prevent persistence of the
    /// others.
    pub async fn serve(
        &self,
        group: &IsrGroup,
        pathname: &str,
        query: &BTreeMap<String, String>,
    ) -> CacheResult<GroupResponse> {
        let member = group.member(pathname).ok_or_else(|| {
            CacheError::Render(format!("pathname {pathname} is not a member of the group"))
        })?;

        debug!(phase = ?GroupPhase::Rendering, %pathname);
        let rendered = self.renderer.render(pathname).await?;

        let status = rendered.status;
        let headers = rendered.headers.clone();

        let key = member.cache_key(query);
        let siblings: Vec<(String, String)> = group
            .siblings(pathname)
            .map(|route| (route.pathname.clone(), route.cache_key(query)))
            .collect();

        let (tx, mut rx) = mpsc::unbounded_channel::<TeeFrame>();
        let handler = self.handler.clone();
        let renderer = self.renderer.clone();
        let revalidate_secs = group.revalidate_secs;

        // Client side of the tee. It stays on the request path: polling it
        // drives the render stream, mirroring each chunk to the capture
        // side. The end frame marks a fully delivered body.
        debug!(phase = ?GroupPhase::StreamSplit, key = %key);
        let body = futures::stream::unfold(
            (rendered.body, tx),
            |(mut inner, tx)| async move {
                match inner.next().await {
                    Some(chunk) => {
                        let _ = tx.send(TeeFrame::Chunk(chunk.clone()));
                        Some((chunk, (inner, tx)))
                    }
                    None => {
                        let _ = tx.send(TeeFrame::End);
                        None
                    }
                }
            },
        )
        .boxed();

        let capture_headers = rendered.headers;
        let tags = rendered.tags;

        // Only capture persistence and sibling fan-out are background work;
        // the capture channel is unbounded, so this never back-pressures
        // the client.
        let capture = async move {
            let mut captured = Vec::new();
            let mut complete = false;
            while let Some(frame) = rx.recv().await {
                match frame {
                    TeeFrame::Chunk(chunk) => captured.extend_from_slice(&chunk),
                    TeeFrame::End => complete = true,
                }
            }

            if complete {
                let entry = page_entry(
                    &key,
                    captured,
                    capture_headers,
                    status,
                    tags,
                    revalidate_secs,
                );
                handler.set(&key, async move { Ok(entry) }).await;
            } else {
                warn!(key = %key, "body dropped before completion; capture discarded");
            }

            debug!(phase = ?GroupPhase::BackgroundFanOut, siblings = siblings.len());
            let fanout = siblings.into_iter().map(|(sibling_path, sibling_key)| {
                let renderer = renderer.clone();
                let handler = handler.clone();
                async move {
                    match renderer.render(&sibling_path).await {
                        Ok(render) => {
                            let html = render.body.fold(Vec::new(), |mut acc, chunk| async move {
                                acc.extend_from_slice(&chunk);
                                acc
                            });
                            let entry = page_entry(
                                &sibling_key,
                                html.await,
                                render.headers,
                                render.status,
                                render.tags,
                                revalidate_secs,
                            );
                            handler.set(&sibling_key, async move { Ok(entry) }).await;
                        }
                        Err(err) => {
                            warn!(pathname = %sibling_path, error = %err, "sibling regeneration failed");
                        }
                    }
                }
            });
            join_all(fanout).await;
            debug!(phase = ?GroupPhase::Done);
        };
        self.background.track(capture.boxed());

        Ok(GroupResponse {
            status,
            headers,
            body,
        })
    }
}

/// One frame on the capture side of the tee. The end frame distinguishes a
/// fully delivered body from one the client dropped mid-stream.
enum TeeFrame {
    Chunk(Bytes),
    End,
}

fn page_entry(
    key: &str,
    body: Vec<u8>,
    headers: BTreeMap<String, String>,
    status: u16,
    tags: Vec<String>,
    revalidate_secs: u64,
) -> CacheEntry {
    CacheEntry::new(
        key,
        CachePayload::AppPage {
            html: String::from_utf8_lossy(&body).into_owned(),
            rsc_data: None,
            headers,
            status,
        },
    )
    .with_revalidate(Revalidate::After(revalidate_secs))
    .with_tags(tags)
}

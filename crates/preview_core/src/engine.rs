//! The render engine: regenerates the preview when the document changes and
//! publishes the latest result to any number of readers.
//!
//! Regenerations are cheap to trigger. The file is read and fingerprinted on
//! every call, but the converter only runs when the fingerprint differs from
//! the last successful render.

use crate::document::WatchedDocument;
use crate::fingerprint::fingerprint;
use crate::render::{ConversionError, Converter};
use crate::watcher::{ChangeWatcher, WatchError};
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

/// Upper bound for one conversion, whichever strategy is used.
pub const CONVERSION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Watch(#[from] WatchError),
}

/// Why a regeneration attempt did not produce new HTML.
#[derive(Debug, thiserror::Error)]
pub enum RegenerateError {
    #[error("could not read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

/// Snapshot of the preview: rendered HTML and the fingerprint of the source
/// it was rendered from.
///
/// When `failed` is set, `html` is an error notice and `hash` still belongs to
/// the last successful render, so pollers do not reload into a broken page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedState {
    pub html: String,
    pub hash: String,
    pub failed: bool,
}

impl RenderedState {
    fn error(err: &RegenerateError, hash: String) -> Self {
        Self {
            html: format!("<p>Error : {}</p>", html_escape::encode_text(&err.to_string())),
            hash,
            failed: true,
        }
    }
}

/// Outcome of [`RenderEngine::regenerate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regeneration {
    /// New content was converted and published.
    Rendered,
    /// Content matches the last successful render, nothing was converted.
    Unchanged,
    ReadFailed,
    ConversionFailed,
}

/// Invocation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Number of times the document was read from disk.
    pub reads: usize,
    /// Number of times the converter was invoked.
    pub conversions: usize,
}

struct Inner {
    document: WatchedDocument,
    converter: Converter,
    conversion_timeout: Duration,
    /// Published snapshot, replaced wholesale.
    state: RwLock<Arc<RenderedState>>,
    /// Held for the whole regeneration so there is a single writer. Guards the
    /// last successful render, which may differ from `state` after a failure.
    last_good: tokio::sync::Mutex<Arc<RenderedState>>,
    reads: AtomicUsize,
    conversions: AtomicUsize,
}

impl Inner {
    fn current_state(&self) -> Arc<RenderedState> {
        self.state.read().clone()
    }

    fn publish(&self, state: Arc<RenderedState>) {
        *self.state.write() = state;
    }

    async fn regenerate(&self) -> Regeneration {
        let mut last_good = self.last_good.lock().await;
        let path = self.document.path();

        self.reads.fetch_add(1, Ordering::Relaxed);
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(source) => {
                let err = RegenerateError::Read {
                    path: path.to_path_buf(),
                    source,
                };
                tracing::warn!(%err, "Failed to read document");
                self.publish(Arc::new(RenderedState::error(&err, last_good.hash.clone())));
                return Regeneration::ReadFailed;
            }
        };

        let hash = fingerprint(&bytes);
        if hash == last_good.hash {
            // Back to the last good content after a failure, e.g. the file was
            // deleted and restored.
            if self.current_state().failed {
                self.publish(last_good.clone());
            }
            return Regeneration::Unchanged;
        }

        let text = String::from_utf8_lossy(&bytes);
        let started_at = Instant::now();
        self.conversions.fetch_add(1, Ordering::Relaxed);

        let converted = match tokio::time::timeout(
            self.conversion_timeout,
            self.converter.convert(&text, self.document.context()),
        )
        .await
        {
            Ok(converted) => converted,
            Err(_) => Err(ConversionError::Timeout(self.conversion_timeout)),
        };

        match converted {
            Ok(html) => {
                tracing::debug!(
                    converter = self.converter.name(),
                    elapsed = ?started_at.elapsed(),
                    %hash,
                    "Rendered document"
                );
                let state = Arc::new(RenderedState {
                    html,
                    hash,
                    failed: false,
                });
                *last_good = state.clone();
                self.publish(state);
                Regeneration::Rendered
            }
            Err(err) => {
                let err = RegenerateError::from(err);
                tracing::warn!(converter = self.converter.name(), %err, "Failed to render document");
                self.publish(Arc::new(RenderedState::error(&err, last_good.hash.clone())));
                Regeneration::ConversionFailed
            }
        }
    }
}

/// Owns the watched document and its latest [`RenderedState`].
///
/// Readers call [`current_state`](Self::current_state) concurrently with an
/// in-flight regeneration and see either the old or the new state, never a
/// mix of both.
pub struct RenderEngine {
    inner: Arc<Inner>,
    watcher: Mutex<Option<ChangeWatcher>>,
}

impl std::fmt::Debug for RenderEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderEngine")
            .field("document", &self.inner.document)
            .field("converter", &self.inner.converter.name())
            .field("watching", &self.is_watching())
            .finish()
    }
}

impl RenderEngine {
    /// Start watching `document` and render it once before returning.
    ///
    /// Fails only if the filesystem watcher can not be set up.
    pub async fn new(document: WatchedDocument, converter: Converter) -> Result<Self, EngineError> {
        let inner = Self::new_inner(document, converter, CONVERSION_TIMEOUT);

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        let watcher = ChangeWatcher::spawn(inner.document.path(), move || {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    inner.regenerate().await;
                }
            }
        })?;

        let engine = Self {
            inner,
            watcher: Mutex::new(Some(watcher)),
        };
        engine.regenerate().await;

        Ok(engine)
    }

    /// An engine that regenerates only when [`regenerate`](Self::regenerate)
    /// is called.
    pub async fn detached(document: WatchedDocument, converter: Converter) -> Self {
        Self::detached_with_timeout(document, converter, CONVERSION_TIMEOUT).await
    }

    /// Like [`detached`](Self::detached), with conversions bounded by
    /// `conversion_timeout` instead of [`CONVERSION_TIMEOUT`].
    pub async fn detached_with_timeout(
        document: WatchedDocument,
        converter: Converter,
        conversion_timeout: Duration,
    ) -> Self {
        let engine = Self {
            inner: Self::new_inner(document, converter, conversion_timeout),
            watcher: Mutex::new(None),
        };
        engine.regenerate().await;
        engine
    }

    fn new_inner(
        document: WatchedDocument,
        converter: Converter,
        conversion_timeout: Duration,
    ) -> Arc<Inner> {
        tracing::info!(
            path = %document.path().display(),
            converter = converter.name(),
            "Initializing render engine"
        );
        Arc::new(Inner {
            document,
            converter,
            conversion_timeout,
            state: RwLock::new(Arc::new(RenderedState::default())),
            last_good: tokio::sync::Mutex::new(Arc::new(RenderedState::default())),
            reads: AtomicUsize::new(0),
            conversions: AtomicUsize::new(0),
        })
    }

    pub fn document(&self) -> &WatchedDocument {
        &self.inner.document
    }

    pub fn converter(&self) -> &Converter {
        &self.inner.converter
    }

    /// Re-read the document and convert it if its content changed.
    ///
    /// Concurrent calls are serialized.
    pub async fn regenerate(&self) -> Regeneration {
        self.inner.regenerate().await
    }

    /// The latest published state. Never touches the filesystem.
    pub fn current_state(&self) -> Arc<RenderedState> {
        self.inner.current_state()
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            reads: self.inner.reads.load(Ordering::Relaxed),
            conversions: self.inner.conversions.load(Ordering::Relaxed),
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.lock().is_some()
    }

    /// Stop the file watcher. Subsequent calls do nothing.
    pub fn shutdown(&self) {
        if let Some(mut watcher) = self.watcher.lock().take() {
            watcher.stop();
            tracing::info!(path = %self.inner.document.path().display(), "Render engine shut down");
        }
    }
}

impl Drop for RenderEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

//! Filesystem notifications for the previewed document.
//!
//! The parent directory is watched rather than the file itself: editors that
//! save by writing a temporary file and renaming it over the original would
//! otherwise detach a watch placed on the file.

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};

/// Failure to set up the OS notification subsystem.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("{} has no parent directory to watch", .0.display())]
    NoParent(PathBuf),
    #[error("failed to initialize file watcher: {0}")]
    Notify(#[from] notify::Error),
}

/// Returns `true` if `event` means `path` was created or written.
///
/// A rename counts when `path` is its destination, which is how editors that
/// save through a temporary file replace the document. Removals and renames
/// away from `path` are ignored, a later create on the same path triggers
/// again.
pub fn is_relevant(event: &Event, path: &Path) -> bool {
    let touches_path = || event.paths.iter().any(|p| p == path);
    match event.kind {
        EventKind::Create(_) | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => {
            touches_path()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Any)) => touches_path(),
        // Paths are `[from, to]`.
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.last().map(PathBuf::as_path) == Some(path)
        }
        _ => false,
    }
}

/// Discard whatever is queued, the callback about to run reads the latest
/// content anyway. Returns the number of dropped events.
fn drain_pending(event_rx: &mut mpsc::UnboundedReceiver<Result<Event, notify::Error>>) -> usize {
    let mut dropped = 0;
    while let Ok(res) = event_rx.try_recv() {
        if let Err(err) = res {
            tracing::error!(?err, "File watcher error");
        }
        dropped += 1;
    }
    dropped
}

/// Drives a callback from filesystem change notifications.
///
/// Relevant events are handled one at a time in arrival order: the callback
/// future is awaited to completion before the next event is looked at. Events
/// queued up by then are collapsed into a single call, so a burst of writes
/// during a slow conversion costs one more regeneration, not one per event.
pub struct ChangeWatcher {
    path: PathBuf,
    /// Holds the OS watch handle, dropping it releases the handle.
    watcher: Option<RecommendedWatcher>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl std::fmt::Debug for ChangeWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeWatcher")
            .field("path", &self.path)
            .field("running", &self.is_running())
            .finish()
    }
}

impl ChangeWatcher {
    /// Start watching `path` and call `on_change` for each create/write event.
    ///
    /// Must be called from within a tokio runtime, the event loop is spawned
    /// as a task on it.
    pub fn spawn<F, Fut>(path: &Path, mut on_change: F) -> Result<Self, WatchError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let directory = path
            .parent()
            .ok_or_else(|| WatchError::NoParent(path.to_path_buf()))?;

        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                let _ = event_tx.send(res);
            },
            notify::Config::default(),
        )?;
        watcher.watch(directory, RecursiveMode::NonRecursive)?;

        tracing::info!(directory = %directory.display(), "Started file watcher");

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let target = path.to_path_buf();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => break,
                    maybe_event = event_rx.recv() => match maybe_event {
                        Some(Ok(event)) => {
                            if is_relevant(&event, &target) {
                                let coalesced = drain_pending(&mut event_rx);
                                tracing::debug!(kind = ?event.kind, coalesced, path = %target.display(), "Document changed");
                                on_change().await;
                            }
                        }
                        Some(Err(err)) => {
                            tracing::error!(?err, "File watcher error");
                        }
                        None => break,
                    }
                }
            }
            tracing::debug!(path = %target.display(), "File watcher loop exited");
        });

        Ok(Self {
            path: path.to_path_buf(),
            watcher: Some(watcher),
            shutdown_tx: Some(shutdown_tx),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    /// Stop the event loop and release the OS watch. Calling it again is a no-op.
    ///
    /// A callback already in progress runs to completion.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if self.watcher.take().is_some() {
            tracing::debug!(path = %self.path.display(), "Stopped file watcher");
        }
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, RemoveKind};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    #[test]
    fn test_relevant_event_kinds() {
        let doc = Path::new("/docs/README.md");

        assert!(is_relevant(
            &event(EventKind::Create(CreateKind::File), "/docs/README.md"),
            doc
        ));
        assert!(is_relevant(
            &event(
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                "/docs/README.md"
            ),
            doc
        ));
        assert!(is_relevant(
            &event(EventKind::Modify(ModifyKind::Any), "/docs/README.md"),
            doc
        ));

        // Saved through a temporary file renamed over the document.
        assert!(is_relevant(
            &event(
                EventKind::Modify(ModifyKind::Name(RenameMode::To)),
                "/docs/README.md"
            ),
            doc
        ));
        assert!(is_relevant(
            &event(EventKind::Modify(ModifyKind::Name(RenameMode::Any)), "/docs/README.md"),
            doc
        ));
        let both = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/docs/.README.md.tmp"))
            .add_path(PathBuf::from("/docs/README.md"));
        assert!(is_relevant(&both, doc));
        let away = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/docs/README.md"))
            .add_path(PathBuf::from("/docs/README.md.bak"));
        assert!(!is_relevant(&away, doc));

        assert!(!is_relevant(
            &event(EventKind::Remove(RemoveKind::File), "/docs/README.md"),
            doc
        ));
        assert!(!is_relevant(
            &event(
                EventKind::Modify(ModifyKind::Name(RenameMode::From)),
                "/docs/README.md"
            ),
            doc
        ));
        assert!(!is_relevant(
            &event(
                EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
                "/docs/README.md"
            ),
            doc
        ));
    }

    #[test]
    fn test_other_files_are_ignored() {
        let doc = Path::new("/docs/README.md");
        assert!(!is_relevant(
            &event(EventKind::Create(CreateKind::File), "/docs/.README.md.swp"),
            doc
        ));
        assert!(!is_relevant(
            &event(EventKind::Create(CreateKind::File), "/other/README.md"),
            doc
        ));
    }

    #[tokio::test]
    async fn test_write_triggers_callback_and_stop_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().canonicalize().unwrap();
        let file = dir.join("doc.md");
        std::fs::write(&file, "one").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut watcher = ChangeWatcher::spawn(&file, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();
        assert!(watcher.is_running());

        std::fs::write(dir.join("unrelated.md"), "noise").unwrap();
        std::fs::write(&file, "two").unwrap();

        let mut waited = Duration::ZERO;
        while calls.load(Ordering::SeqCst) == 0 && waited < Duration::from_secs(5) {
            tokio::time::sleep(Duration::from_millis(50)).await;
            waited += Duration::from_millis(50);
        }
        assert!(calls.load(Ordering::SeqCst) > 0);

        watcher.stop();
        watcher.stop();
        assert!(!watcher.is_running());
    }

    async fn wait_for_calls(calls: &AtomicUsize) {
        let mut waited = Duration::ZERO;
        while calls.load(Ordering::SeqCst) == 0 && waited < Duration::from_secs(5) {
            tokio::time::sleep(Duration::from_millis(50)).await;
            waited += Duration::from_millis(50);
        }
    }

    #[tokio::test]
    async fn test_rename_over_document_triggers_callback() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().canonicalize().unwrap();
        let file = dir.join("doc.md");
        std::fs::write(&file, "# One").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let _watcher = ChangeWatcher::spawn(&file, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();

        let scratch = dir.join(".doc.md.tmp");
        std::fs::write(&scratch, "# Two").unwrap();
        std::fs::rename(&scratch, &file).unwrap();

        wait_for_calls(&calls).await;
        assert!(calls.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test]
    async fn test_burst_of_writes_is_coalesced() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().canonicalize().unwrap();
        let file = dir.join("doc.md");
        std::fs::write(&file, "0").unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let _watcher = ChangeWatcher::spawn(&file, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                // A slow conversion.
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        })
        .unwrap();

        for i in 0..30 {
            std::fs::write(&file, i.to_string()).unwrap();
        }

        wait_for_calls(&calls).await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        let calls = calls.load(Ordering::SeqCst);
        assert!(calls > 0);
        assert!(calls < 10, "{calls} callbacks for a single burst");
    }

    #[test]
    fn test_drain_pending() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        for _ in 0..3 {
            tx.send(Ok(event(EventKind::Any, "/docs/README.md"))).unwrap();
        }
        assert_eq!(drain_pending(&mut rx), 3);
        assert_eq!(drain_pending(&mut rx), 0);
    }

    #[tokio::test]
    async fn test_path_without_parent() {
        let err = ChangeWatcher::spawn(Path::new("/"), || async {}).unwrap_err();
        assert!(matches!(err, WatchError::NoParent(_)));
    }
}

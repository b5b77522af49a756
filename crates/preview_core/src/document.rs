//! The document being previewed.

use std::path::{Path, PathBuf};

/// The one file a [`RenderEngine`](crate::RenderEngine) watches and renders.
///
/// The path is absolute and never changes after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedDocument {
    path: PathBuf,
    /// Repository context (`owner/repo`) used by the GitHub renderer to
    /// resolve issue and commit references.
    context: Option<String>,
}

impl WatchedDocument {
    /// Creates a document for `path`, resolving relative paths against the
    /// current working directory.
    pub fn new(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let path = if path.is_absolute() {
            path
        } else {
            std::env::current_dir()?.join(path)
        };
        Ok(Self {
            path,
            context: None,
        })
    }

    /// Sets the rendering context. An empty string clears it.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let context = context.into();
        self.context = (!context.is_empty()).then_some(context);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Directory containing the document, watched for changes and served as
    /// the static file root.
    pub fn directory(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("/"))
    }

    /// Base name of the document, e.g. `README.md`.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

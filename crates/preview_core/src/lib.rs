//! Core library for the live markdown preview.
//!
//! This crate owns everything that has state: the watched document, the
//! conversion strategies that turn markdown into HTML, and the render engine
//! that keeps the latest rendered page together with its content fingerprint.
//!
//! # Modules
//!
//! - [`document`] - The single document being previewed
//! - [`fingerprint`] - Content hashing used for change detection
//! - [`render`] - Markdown to HTML conversion (local or GitHub API)
//! - [`engine`] - Regeneration and the shared rendered state
//! - [`watcher`] - Filesystem change notifications for the document
//! - [`assets`] - Embedded page shell and stylesheet

pub mod assets;
pub mod document;
pub mod engine;
pub mod fingerprint;
pub mod render;
pub mod watcher;

pub use document::WatchedDocument;
pub use engine::{
    EngineError, EngineStats, RegenerateError, Regeneration, RenderEngine, RenderedState,
    CONVERSION_TIMEOUT,
};
pub use fingerprint::fingerprint;
pub use render::{ConversionError, Converter, GitHubConverter, LocalConverter};
pub use watcher::{ChangeWatcher, WatchError};

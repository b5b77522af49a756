//! Embedded web assets for the preview page.
//!
//! The page shell embeds the fingerprint it was rendered with and polls
//! `/modified`, reloading itself once the server reports a different one.

use crate::engine::RenderedState;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// HTML page shell with `/*__NAME__*/` placeholders.
pub const HTML_TEMPLATE: &str = include_str!("../assets/preview.html");

/// Default stylesheet, served at `/css/github-markdown.css`.
pub const GITHUB_MARKDOWN_CSS: &str = include_str!("../assets/github-markdown.css");

/// Client side polling of the fingerprint endpoint.
pub const POLL_JS: &str = include_str!("../assets/poll.js");

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/\*__([A-Z_]+)__\*/").expect("placeholder regex is valid"));

/// Build the complete page for `state`.
///
/// Placeholders are substituted in a single pass, so placeholder-like text
/// inside the document is left alone.
pub fn render_page(title: &str, state: &RenderedState) -> String {
    let title = html_escape::encode_text(title);
    let hash = html_escape::encode_double_quoted_attribute(&state.hash);

    PLACEHOLDER
        .replace_all(HTML_TEMPLATE, |caps: &Captures| match &caps[1] {
            "TITLE" => title.to_string(),
            "HASH" => hash.to_string(),
            "CONTENT" => state.html.clone(),
            "POLL_JS" => POLL_JS.to_string(),
            _ => caps[0].to_string(),
        })
        .into_owned()
}

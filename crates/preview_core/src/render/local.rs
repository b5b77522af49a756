//! Offline rendering with pulldown-cmark.

use once_cell::sync::Lazy;
use pulldown_cmark::{CowStr, Event, LinkType, Options, Parser, Tag, TagEnd, TextMergeStream};
use regex::Regex;
use std::collections::HashMap;

/// Bare URLs that GitHub turns into links without `<...>` brackets.
static BARE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b(?:https?://|www\.)[^\s<>]*[^\s<>.,:;"')\]!?*_~]"#)
        .expect("bare URL regex is valid")
});

/// Generate a GitHub-style anchor from heading text.
///
/// # Example
///
/// ```
/// use preview_core::render::slugify;
///
/// assert_eq!(slugify("Hello World"), "hello-world");
/// assert_eq!(slugify("API Reference (v2)"), "api-reference-v2");
/// ```
pub fn slugify(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .filter_map(|c| match c {
            c if c.is_alphanumeric() || c == '_' => Some(c),
            ' ' | '-' => Some('-'),
            _ => None,
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Renders markdown in-process with the common GitHub extensions: tables,
/// strikethrough, task lists, footnotes and bare URL autolinks.
///
/// Any input is accepted; syntax that is not recognized is emitted as text.
#[derive(Debug, Clone)]
pub struct LocalConverter {
    options: Options,
}

impl Default for LocalConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalConverter {
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_FOOTNOTES);
        Self { options }
    }

    /// Render `text` to HTML.
    pub fn render(&self, text: &str) -> String {
        let events: Vec<Event> = TextMergeStream::new(Parser::new_ext(text, self.options)).collect();

        let mut processed = Vec::with_capacity(events.len());
        let mut slugs = HashMap::new();
        // Text inside links, images and code blocks must not be autolinked.
        let mut no_autolink_depth = 0usize;

        for (i, event) in events.iter().enumerate() {
            match event {
                Event::Start(Tag::Heading {
                    level,
                    classes,
                    attrs,
                    ..
                }) => {
                    let id = unique_slug(&heading_text(&events[i + 1..]), &mut slugs);
                    processed.push(Event::Start(Tag::Heading {
                        level: *level,
                        id: Some(id.into()),
                        classes: classes.clone(),
                        attrs: attrs.clone(),
                    }));
                }
                Event::Start(Tag::Link { .. } | Tag::Image { .. } | Tag::CodeBlock(_)) => {
                    no_autolink_depth += 1;
                    processed.push(event.clone());
                }
                Event::End(TagEnd::Link | TagEnd::Image | TagEnd::CodeBlock) => {
                    no_autolink_depth = no_autolink_depth.saturating_sub(1);
                    processed.push(event.clone());
                }
                Event::Text(text) if no_autolink_depth == 0 => {
                    push_autolinked(text.clone(), &mut processed);
                }
                _ => processed.push(event.clone()),
            }
        }

        let mut html = String::with_capacity(text.len() * 3 / 2);
        pulldown_cmark::html::push_html(&mut html, processed.into_iter());
        html
    }
}

/// Collect the plain text of the heading starting right after its `Start` event.
fn heading_text(events: &[Event]) -> String {
    let mut text = String::new();
    for event in events {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(t),
            Event::End(TagEnd::Heading(_)) => break,
            _ => {}
        }
    }
    text
}

fn unique_slug(text: &str, seen: &mut HashMap<String, usize>) -> String {
    let base = slugify(text);
    match seen.get_mut(&base) {
        Some(count) => {
            *count += 1;
            format!("{base}-{count}")
        }
        None => {
            seen.insert(base.clone(), 0);
            base
        }
    }
}

fn push_autolinked<'a>(text: CowStr<'a>, output: &mut Vec<Event<'a>>) {
    let mut last = 0;

    for m in BARE_URL.find_iter(&text) {
        if m.start() > last {
            output.push(Event::Text(text[last..m.start()].to_string().into()));
        }

        let url = m.as_str();
        let dest_url = if url.starts_with("www.") {
            format!("http://{url}")
        } else {
            url.to_string()
        };

        output.push(Event::Start(Tag::Link {
            link_type: LinkType::Autolink,
            dest_url: dest_url.into(),
            title: CowStr::Borrowed(""),
            id: CowStr::Borrowed(""),
        }));
        output.push(Event::Text(url.to_string().into()));
        output.push(Event::End(TagEnd::Link));

        last = m.end();
    }

    if last == 0 {
        output.push(Event::Text(text));
    } else if last < text.len() {
        output.push(Event::Text(text[last..].to_string().into()));
    }
}

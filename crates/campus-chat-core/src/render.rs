//! HTML rendering of the message list.
//!
//! All text goes through maud, so it is escaped by construction. The only
//! markup derived from message content is `<br>` for newlines and the
//! superscript links for citation markers.

use maud::{html, Markup, DOCTYPE};

use crate::citation::{segments, Segment};
use crate::state::{Entry, Message, ERROR_TEXT};

pub fn citation_anchor(n: usize) -> String {
    format!("citation-{n}")
}

fn content(text: &str, source_count: usize) -> Markup {
    html! {
        @for segment in segments(text, source_count) {
            @match segment {
                Segment::Text(run) => { (run) }
                Segment::LineBreak => { br; }
                Segment::Citation(n) => {
                    sup {
                        a class="citation" href=(format!("#{}", citation_anchor(n))) { "[" (n) "]" }
                    }
                }
            }
        }
    }
}

pub fn render_message(message: &Message) -> Markup {
    let sources = message.listed_sources();

    html! {
        div class=(format!("message {}", message.css_class())) data-follow-up-id=[message.follow_up_id.as_deref()] {
            div class="message-content" {
                p { (content(&message.content, sources.len())) }
                @if !sources.is_empty() {
                    div class="sources" {
                        p { "Sources:" }
                        ol {
                            @for (i, source) in sources.iter().enumerate() {
                                li id=(citation_anchor(i + 1)) {
                                    a href=(source) target="_blank" class="source-link" { (source) }
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

pub fn render_entry(entry: &Entry) -> Markup {
    match entry {
        Entry::Message(message) => render_message(message),
        Entry::Loading(request) => html! {
            div class="message assistant-message loading" id=(request.to_string()) {
                div class="message-content" {
                    p { "Thinking" }
                }
            }
        },
        Entry::Error => html! {
            div class="message assistant-message" {
                div class="message-content" {
                    p class="text-danger" { (ERROR_TEXT) }
                }
            }
        },
    }
}

/// The `#messages` container with every entry in order.
pub fn render_transcript(entries: &[Entry]) -> Markup {
    html! {
        div id="messages" {
            @for entry in entries {
                (render_entry(entry))
            }
        }
    }
}

/// A standalone page, used for transcript export.
pub fn render_document(title: &str, entries: &[Entry]) -> String {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                title { (title) }
            }
            body {
                (render_transcript(entries))
            }
        }
    }
    .into_string()
}

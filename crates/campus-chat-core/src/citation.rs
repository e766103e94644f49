//! Splits message text into plain runs, line breaks and `[n]` citation markers.

use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    LineBreak,
    /// 1-based index into the message's sources
    Citation(usize),
}

fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"\[(\d{1,4})\]").expect("citation marker regex"))
}

/// Markers only become citations when a source with that number exists;
/// anything else stays literal text.
pub fn segments(text: &str, source_count: usize) -> Vec<Segment<'_>> {
    let mut out = Vec::new();

    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            out.push(Segment::LineBreak);
        }

        let mut last = 0;
        for caps in marker_regex().captures_iter(line) {
            let whole = caps.get(0).expect("capture 0 always present");
            let n = caps[1].parse::<usize>().unwrap_or(0);
            if n == 0 || n > source_count {
                continue;
            }
            if whole.start() > last {
                out.push(Segment::Text(&line[last..whole.start()]));
            }
            out.push(Segment::Citation(n));
            last = whole.end();
        }
        if last < line.len() {
            out.push(Segment::Text(&line[last..]));
        }
    }

    out
}

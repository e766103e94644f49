use campus_chat_core::citation::{segments, Segment};
use campus_chat_core::{ChatRole, Entry, Message, View, Viewport, ERROR_TEXT};
use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};

use crate::app::App;

const SUPERSCRIPT_DIGITS: [char; 10] = ['⁰', '¹', '²', '³', '⁴', '⁵', '⁶', '⁷', '⁸', '⁹'];

const INDICATOR_TEXT: &str = " ↓ New messages below ";

fn superscript(n: usize) -> String {
    n.to_string()
        .chars()
        .map(|c| c.to_digit(10).map(|d| SUPERSCRIPT_DIGITS[d as usize]).unwrap_or(c))
        .collect()
}

fn is_superscript(c: char) -> bool {
    SUPERSCRIPT_DIGITS.contains(&c)
}

/// Word-wrap to `width` columns. Words longer than a line are split.
fn wrap_text_to_width(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    let mut current_line = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut word: String = word.to_string();
        let mut word_len = word.chars().count();

        // Break words that can never fit
        while word_len > width {
            if current_len > 0 {
                lines.push(std::mem::take(&mut current_line));
                current_len = 0;
            }
            let head: String = word.chars().take(width).collect();
            word = word.chars().skip(width).collect();
            word_len -= width;
            lines.push(head);
        }
        if word_len == 0 {
            continue;
        }

        if current_len == 0 {
            current_line = word;
            current_len = word_len;
        } else if current_len + 1 + word_len <= width {
            current_line.push(' ');
            current_line.push_str(&word);
            current_len += 1 + word_len;
        } else {
            lines.push(std::mem::take(&mut current_line));
            current_line = word;
            current_len = word_len;
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(String::new());
    }

    lines
}

/// Message text as display lines, citation markers turned into superscripts.
fn display_text(message: &Message) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for segment in segments(&message.content, message.listed_sources().len()) {
        match segment {
            Segment::Text(text) => current.push_str(text),
            Segment::LineBreak => lines.push(std::mem::take(&mut current)),
            Segment::Citation(n) => current.push_str(&superscript(n)),
        }
    }
    lines.push(current);
    lines
}

/// Styles a wrapped line, picking out superscript citation runs.
fn styled_line(text: String, base: Style) -> Line<'static> {
    let citation = base.fg(Color::Cyan);
    let mut spans = Vec::new();
    let mut run = String::new();
    let mut run_is_citation = false;

    for c in text.chars() {
        let sup = is_superscript(c);
        if sup != run_is_citation && !run.is_empty() {
            let style = if run_is_citation { citation } else { base };
            spans.push(Span::styled(std::mem::take(&mut run), style));
        }
        run_is_citation = sup;
        run.push(c);
    }
    if !run.is_empty() {
        let style = if run_is_citation { citation } else { base };
        spans.push(Span::styled(run, style));
    }

    Line::from(spans)
}

fn label(message: &Message) -> Span<'static> {
    let bold = Style::default().add_modifier(Modifier::BOLD);
    match (message.role, message.is_follow_up) {
        (ChatRole::User, _) => Span::styled("You:", bold.fg(Color::Cyan)),
        (ChatRole::Assistant, true) => Span::styled("Follow-up:", bold.fg(Color::Magenta)),
        (ChatRole::Assistant, false) => Span::styled("Assistant:", bold.fg(Color::Yellow)),
    }
}

/// Pre-wrapped transcript lines, so the line count is the content height.
fn transcript_lines(entries: &[Entry], width: usize, animation_frame: u8) -> Vec<Line<'static>> {
    let mut lines: Vec<Line<'static>> = Vec::new();

    for entry in entries {
        match entry {
            Entry::Message(message) => {
                lines.push(Line::from(label(message)));
                let base = if message.is_follow_up {
                    Style::default().add_modifier(Modifier::ITALIC)
                } else {
                    Style::default()
                };
                for text in display_text(message) {
                    for wrapped in wrap_text_to_width(&text, width) {
                        lines.push(styled_line(wrapped, base));
                    }
                }

                let sources = message.listed_sources();
                if !sources.is_empty() {
                    lines.push(Line::from(Span::styled(
                        "Sources:",
                        Style::default().fg(Color::DarkGray).add_modifier(Modifier::BOLD),
                    )));
                    for (i, source) in sources.iter().enumerate() {
                        let item = format!("{}. {}", i + 1, source);
                        for wrapped in wrap_text_to_width(&item, width) {
                            lines.push(Line::from(Span::styled(
                                wrapped,
                                Style::default().fg(Color::Blue).add_modifier(Modifier::UNDERLINED),
                            )));
                        }
                    }
                }
                lines.push(Line::default());
            }
            Entry::Loading(_) => {
                lines.push(Line::from(Span::styled(
                    "Assistant:",
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )));
                // Animated ellipsis: cycles through ".", "..", "..."
                let dots = ".".repeat((animation_frame as usize) + 1);
                lines.push(Line::from(Span::styled(
                    format!("Thinking{}", dots),
                    Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                )));
                lines.push(Line::default());
            }
            Entry::Error => {
                for wrapped in wrap_text_to_width(ERROR_TEXT, width) {
                    lines.push(Line::from(Span::styled(wrapped, Style::default().fg(Color::Red))));
                }
                lines.push(Line::default());
            }
        }
    }

    lines
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    let [main_area, input_area] =
        Layout::vertical([Constraint::Min(0), Constraint::Length(3)]).areas(body_area);

    match app.session.view() {
        View::Welcome => render_welcome(app, frame, main_area),
        View::Conversation => render_conversation(app, frame, main_area),
    }
    render_input(app, frame, input_area);

    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" Campus Assistant ", Style::default().fg(Color::Cyan).bold()),
        Span::styled(format!(" {} ", app.api_url), Style::default().fg(Color::Gray)),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::Gray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let (mode_text, mode_style) = match app.session.view() {
        View::Welcome => (" WELCOME ", Style::default().bg(Color::Blue).fg(Color::White)),
        View::Conversation => (" CHAT ", Style::default().bg(Color::Yellow).fg(Color::Black)),
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mut hints = match app.session.view() {
        View::Welcome => vec![
            Span::styled(" ↑/↓ ", key_style),
            Span::styled(" pick ", label_style),
            Span::styled(" M-1..9 ", key_style),
            Span::styled(" ask ", label_style),
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
        ],
        View::Conversation => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
            Span::styled(" PgUp/PgDn ", key_style),
            Span::styled(" scroll ", label_style),
            Span::styled(" C-End ", key_style),
            Span::styled(" bottom ", label_style),
            Span::styled(" C-n ", key_style),
            Span::styled(" new chat ", label_style),
            Span::styled(" C-s ", key_style),
            Span::styled(" save ", label_style),
        ],
    };
    hints.extend(vec![
        Span::styled(" Esc ", key_style),
        Span::styled(" quit ", label_style),
    ]);

    if let Some(status) = &app.status {
        hints.push(Span::styled(
            format!(" {} ", status),
            Style::default().bg(Color::Black).fg(Color::Yellow),
        ));
    }

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn render_welcome(app: &mut App, frame: &mut Frame, area: Rect) {
    app.chat_area = None;
    app.indicator_area = None;

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(" Welcome ");
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let [intro_area, list_area] =
        Layout::vertical([Constraint::Length(3), Constraint::Min(0)]).areas(inner);

    let intro = Paragraph::new(vec![
        Line::from(Span::styled(
            "Hi! I'm the campus assistant.",
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from("Ask me anything below, or pick one of these questions:"),
    ])
    .wrap(Wrap { trim: true });
    frame.render_widget(intro, intro_area);

    let items: Vec<ListItem> = app
        .presets
        .iter()
        .enumerate()
        .map(|(i, question)| ListItem::new(format!(" {}. {} ", i + 1, question)))
        .collect();

    let list = List::new(items)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("> ");

    frame.render_stateful_widget(list, list_area, &mut app.preset_state);
}

fn render_conversation(app: &mut App, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Conversation ");
    let inner = block.inner(area);

    let lines = transcript_lines(app.session.entries(), inner.width as usize, app.animation_frame);

    // Resolve the scroll position against this frame's geometry
    let viewport = Viewport {
        content_height: lines.len() as u32,
        offset: app.chat_viewport.offset,
        viewport_height: inner.height as u32,
    };
    let offset = app.session.scroll_mut().settle(viewport);
    app.chat_viewport = viewport.with_offset(offset);
    app.chat_area = Some(inner);

    let scroll = app.chat_viewport.offset.min(u16::MAX as u32) as u16;
    let chat = Paragraph::new(lines).block(block).scroll((scroll, 0));
    frame.render_widget(chat, area);

    app.indicator_area = None;
    if app.indicator_visible() && inner.height > 0 {
        let width = (INDICATOR_TEXT.chars().count() as u16).min(inner.width);
        let indicator_area = Rect {
            x: inner.x + (inner.width - width) / 2,
            y: inner.y + inner.height - 1,
            width,
            height: 1,
        };
        let indicator = Paragraph::new(INDICATOR_TEXT)
            .style(Style::default().bg(Color::Blue).fg(Color::White).add_modifier(Modifier::BOLD));
        frame.render_widget(Clear, indicator_area);
        frame.render_widget(indicator, indicator_area);
        app.indicator_area = Some(indicator_area);
    }
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let (title, border_color) = if app.session.is_waiting() {
        (" Waiting for an answer... ", Color::DarkGray)
    } else {
        (" Ask a question ", Color::Yellow)
    };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Calculate visible portion of input with horizontal scrolling
    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.cursor;

    // Calculate scroll offset to keep cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app
        .session
        .input()
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    // Use cyan text to match the "You:" style - visible in both light and dark terminals
    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    let cursor_x = (cursor_pos - scroll_offset) as u16;
    frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
}

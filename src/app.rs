use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use campus_chat_core::render::render_document;
use campus_chat_core::{ChatSession, SendOutcome, SessionEvent, View, Viewport};
use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use tracing::info;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub struct App {
    pub should_quit: bool,
    pub session: ChatSession,
    pub api_url: String,

    // Input state (text lives in the session)
    pub cursor: usize, // char index into the input

    // Welcome panel
    pub presets: Vec<String>,
    pub preset_state: ListState,

    // Message list geometry from the last frame
    pub chat_viewport: Viewport,
    pub chat_area: Option<Rect>,
    pub indicator_area: Option<Rect>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    pub status: Option<String>,
    pub export_dir: PathBuf,
}

impl App {
    pub fn new(session: ChatSession, api_url: String, presets: Vec<String>, export_dir: PathBuf) -> Self {
        let mut preset_state = ListState::default();
        if !presets.is_empty() {
            preset_state.select(Some(0));
        }

        Self {
            should_quit: false,
            session,
            api_url,
            cursor: 0,
            presets,
            preset_state,
            chat_viewport: Viewport::default(),
            chat_area: None,
            indicator_area: None,
            animation_frame: 0,
            status: None,
            export_dir,
        }
    }

    pub fn apply_session_event(&mut self, event: SessionEvent) {
        self.session.apply(event);
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.session.is_waiting() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Input editing
    pub fn insert_char(&mut self, c: char) {
        let byte_pos = char_to_byte_index(self.session.input(), self.cursor);
        self.session.input_mut().insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(self.session.input(), self.cursor);
            self.session.input_mut().remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.input_len() {
            let byte_pos = char_to_byte_index(self.session.input(), self.cursor);
            self.session.input_mut().remove(byte_pos);
        }
    }

    pub fn cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.input_len());
    }

    pub fn cursor_home(&mut self) {
        self.cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        self.cursor = self.input_len();
    }

    pub fn clear_input(&mut self) {
        self.session.input_mut().clear();
        self.cursor = 0;
    }

    fn input_len(&self) -> usize {
        self.session.input().chars().count()
    }

    pub fn submit(&mut self) {
        let outcome = self.session.submit_input();
        self.handle_outcome(outcome);
    }

    pub fn ask_preset(&mut self, index: usize) {
        if let Some(question) = self.presets.get(index).cloned() {
            let outcome = self.session.ask_question(&question);
            self.handle_outcome(outcome);
        }
    }

    pub fn ask_selected_preset(&mut self) {
        if let Some(i) = self.preset_state.selected() {
            self.ask_preset(i);
        }
    }

    fn handle_outcome(&mut self, outcome: SendOutcome) {
        match outcome {
            SendOutcome::Sent(_) => {
                self.cursor = 0;
                self.status = None;
            }
            SendOutcome::Busy => {
                self.status = Some("Still waiting for the previous answer".to_string());
                self.cursor = self.cursor.min(self.input_len());
            }
            SendOutcome::Ignored => {}
        }
    }

    // Welcome panel navigation
    pub fn preset_nav_down(&mut self) {
        let len = self.presets.len();
        if len > 0 {
            let i = self.preset_state.selected().unwrap_or(0);
            self.preset_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn preset_nav_up(&mut self) {
        let i = self.preset_state.selected().unwrap_or(0);
        self.preset_state.select(Some(i.saturating_sub(1)));
    }

    // Message list scrolling
    pub fn scroll_by(&mut self, delta: i32) {
        let viewport = self.chat_viewport;
        let offset = (viewport.offset as i64 + delta as i64).clamp(0, viewport.max_offset() as i64);
        self.chat_viewport = viewport.with_offset(offset as u32);
        self.session.scroll_mut().on_scroll(self.chat_viewport);
    }

    pub fn scroll_half_page_down(&mut self) {
        let half = (self.chat_viewport.viewport_height / 2).max(1) as i32;
        self.scroll_by(half);
    }

    pub fn scroll_half_page_up(&mut self) {
        let half = (self.chat_viewport.viewport_height / 2).max(1) as i32;
        self.scroll_by(-half);
    }

    pub fn jump_to_bottom(&mut self) {
        self.session.scroll_mut().jump_to_bottom();
    }

    pub fn indicator_visible(&self) -> bool {
        self.session.view() == View::Conversation
            && self.session.scroll().indicator_visible(self.chat_viewport)
    }

    /// New chat: back to the welcome panel.
    pub fn new_chat(&mut self) {
        self.session.show_welcome_screen();
        self.clear_input();
        self.chat_viewport = Viewport::default();
        self.indicator_area = None;
        self.animation_frame = 0;
        self.status = None;
        if !self.presets.is_empty() {
            self.preset_state.select(Some(0));
        }
    }

    pub fn export_html(&mut self) -> Result<PathBuf> {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let path = self.export_dir.join(format!("campus-chat-{stamp}.html"));
        write_transcript(&self.session, &path)?;
        info!(path = %path.display(), "transcript exported");
        self.status = Some(format!("Saved {}", path.display()));
        Ok(path)
    }
}

pub fn write_transcript(session: &ChatSession, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, render_document("Campus Assistant", session.entries()))?;
    Ok(())
}

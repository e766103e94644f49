use anyhow::Result;
use campus_chat_core::View;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use tracing::warn;

use crate::app::App;
use crate::tui::AppEvent;

/// Rows moved per mouse wheel notch
const WHEEL_STEP: i32 = 3;

pub fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize => {}
        AppEvent::Tick => {
            app.tick_animation();
        }
    }
    Ok(())
}

fn handle_key(app: &mut App, key: KeyEvent) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    // Global keys that work in any view
    match key.code {
        KeyCode::Char('c') if ctrl => {
            app.should_quit = true;
            return;
        }
        KeyCode::Esc => {
            app.should_quit = true;
            return;
        }
        KeyCode::Char('n') if ctrl => {
            app.new_chat();
            return;
        }
        KeyCode::Char('s') if ctrl => {
            if let Err(err) = app.export_html() {
                warn!(error = %err, "transcript export failed");
                app.status = Some(format!("Export failed: {err}"));
            }
            return;
        }
        _ => {}
    }

    match app.session.view() {
        View::Welcome => handle_welcome_key(app, key),
        View::Conversation => handle_conversation_key(app, key),
    }
}

fn handle_welcome_key(app: &mut App, key: KeyEvent) {
    // Alt+digit asks a preset; plain digits are typed text
    if let KeyCode::Char(c @ '1'..='9') = key.code {
        if key.modifiers.contains(KeyModifiers::ALT) {
            let index = c as usize - '1' as usize;
            if index < app.presets.len() {
                app.ask_preset(index);
            }
            return;
        }
    }

    // The preset list only takes keys while nothing has been typed
    if app.session.input().is_empty() {
        match key.code {
            KeyCode::Down => return app.preset_nav_down(),
            KeyCode::Up => return app.preset_nav_up(),
            KeyCode::Enter => return app.ask_selected_preset(),
            _ => {}
        }
    }
    handle_input_key(app, key);
}

fn handle_conversation_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::PageUp => app.scroll_half_page_up(),
        KeyCode::PageDown => app.scroll_half_page_down(),
        KeyCode::Up => app.scroll_by(-1),
        KeyCode::Down => app.scroll_by(1),
        KeyCode::End if key.modifiers.contains(KeyModifiers::CONTROL) => app.jump_to_bottom(),
        _ => handle_input_key(app, key),
    }
}

fn handle_input_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Enter => app.submit(),
        KeyCode::Char(c) => app.insert_char(c),
        KeyCode::Backspace => app.backspace(),
        KeyCode::Delete => app.delete(),
        KeyCode::Left => app.cursor_left(),
        KeyCode::Right => app.cursor_right(),
        KeyCode::Home => app.cursor_home(),
        KeyCode::End => app.cursor_end(),
        _ => {}
    }
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    let x = mouse.column;
    let y = mouse.row;

    let in_chat = app.chat_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);
    let on_indicator = app.indicator_area.map(|r| point_in_rect(x, y, r)).unwrap_or(false);

    match mouse.kind {
        MouseEventKind::ScrollDown if in_chat => app.scroll_by(WHEEL_STEP),
        MouseEventKind::ScrollUp if in_chat => app.scroll_by(-WHEEL_STEP),
        MouseEventKind::Down(MouseButton::Left) if on_indicator => app.jump_to_bottom(),
        _ => {}
    }
}

fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

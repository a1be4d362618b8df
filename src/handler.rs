use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::App;
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub async fn handle_event(app: &mut App, event: AppEvent) -> Result<()> {
    match event {
        AppEvent::Key(key) => handle_key(app, key).await?,
        AppEvent::Resize(_, _) => app.scroll_to_bottom(),
        AppEvent::Tick => app.on_tick().await,
    }
    Ok(())
}

async fn handle_key(app: &mut App, key: KeyEvent) -> Result<()> {
    // Interrupt works in any state and ends the whole session cleanly
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return Ok(());
    }

    // Scrolling works while waiting on a response too
    match key.code {
        KeyCode::PageUp => {
            app.scroll_up(10);
            return Ok(());
        }
        KeyCode::PageDown => {
            app.scroll_down(10);
            return Ok(());
        }
        _ => {}
    }

    // Everything below edits the input line, which is only live between
    // turns. While waiting, a bare q also ends the session.
    if app.is_busy() {
        if key.code == KeyCode::Char('q') {
            app.should_quit = true;
        }
        return Ok(());
    }

    match key.code {
        KeyCode::Enter => {
            let text = app.input.clone();
            app.input.clear();
            app.cursor = 0;
            app.history.reset_cursor();
            app.submit(&text).await?;
        }
        KeyCode::Up => app.recall_prev(),
        KeyCode::Down => app.recall_next(),
        KeyCode::Backspace => {
            if app.cursor > 0 {
                app.cursor -= 1;
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = app.input.chars().count();
            if app.cursor < char_count {
                let byte_pos = char_to_byte_index(&app.input, app.cursor);
                app.input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            app.cursor = app.cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = app.input.chars().count();
            app.cursor = (app.cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            app.cursor = 0;
        }
        KeyCode::End => {
            app.cursor = app.input.chars().count();
        }
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            // EOF on an empty line ends the session, like a line editor
            if app.input.is_empty() {
                app.should_quit = true;
            }
        }
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            let byte_pos = char_to_byte_index(&app.input, app.cursor);
            app.input.insert(byte_pos, c);
            app.cursor += 1;
        }
        _ => {}
    }
    Ok(())
}

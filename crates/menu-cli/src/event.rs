use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use std::time::Duration;

use crate::app::App;

/// Poll for keyboard events with timeout
pub fn poll_event(timeout_ms: u64) -> anyhow::Result<Option<Event>> {
    if event::poll(Duration::from_millis(timeout_ms))? {
        Ok(Some(event::read()?))
    } else {
        Ok(None)
    }
}

/// Handle keyboard input, returns true if an async action ran
pub async fn handle_event(app: &mut App, event: Event) -> anyhow::Result<bool> {
    let Event::Key(key) = event else {
        // Resize handled by ratatui automatically
        return Ok(false);
    };
    // Only handle key press events (not release)
    if key.kind != KeyEventKind::Press {
        return Ok(false);
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => {
            app.should_quit = true;
            Ok(false)
        }
        KeyCode::Char('r') => {
            app.reload().await;
            Ok(true)
        }
        KeyCode::Char('c') => {
            app.reconnect();
            Ok(false)
        }
        KeyCode::Right | KeyCode::Tab | KeyCode::Char('l') => {
            app.next_section();
            Ok(false)
        }
        KeyCode::Left | KeyCode::BackTab | KeyCode::Char('h') => {
            app.prev_section();
            Ok(false)
        }
        KeyCode::Up | KeyCode::Char('k') => {
            app.item_up();
            Ok(false)
        }
        KeyCode::Down | KeyCode::Char('j') => {
            app.item_down();
            Ok(false)
        }
        _ => Ok(false),
    }
}

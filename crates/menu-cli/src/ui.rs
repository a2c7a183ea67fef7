use menu_client::media::MediaStatus;
use menu_client::ConnectionState;
use menu_preview::PreviewStatus;
use menu_proto::{MediaKind, MenuItem};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Tabs, Wrap},
    Frame,
};

use crate::app::App;
use crate::theme::Theme;

pub fn render(frame: &mut Frame, app: &App) {
    let theme = match &app.document {
        Some(doc) => Theme::branded(&doc.palette),
        None => Theme::default(),
    };
    let area = frame.area();

    let title = match &app.document {
        Some(doc) => format!(" 🍽  {} ", doc.name),
        None => format!(" 🍽  Restaurant {} ", app.restaurant_id),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(theme.border)
        .title(title)
        .title_style(theme.title);
    frame.render_widget(block, area);

    let banner_height = if app.last_error.is_some() { 1 } else { 0 };
    let layout = Layout::default()
        .constraints([
            Constraint::Length(1),             // Viewer link
            Constraint::Length(banner_height), // Error banner
            Constraint::Length(2),             // Section tabs
            Constraint::Min(5),                // Items + detail
            Constraint::Length(1),             // Status line
            Constraint::Length(1),             // Footer
        ])
        .split(inner_rect(area, 1));

    let link = Paragraph::new(Line::from(vec![
        Span::styled("Viewer: ", theme.muted),
        Span::styled(app.viewer_url.as_str(), theme.accent),
    ]));
    frame.render_widget(link, layout[0]);

    if let Some(err) = &app.last_error {
        let banner = Paragraph::new(format!("⚠ Showing last loaded menu. {err}"))
            .style(theme.danger);
        frame.render_widget(banner, layout[1]);
    }

    render_tabs(frame, app, &theme, layout[2]);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(45), Constraint::Percentage(55)])
        .split(layout[3]);
    render_items(frame, app, &theme, body[0]);
    render_detail(frame, app, &theme, body[1]);

    render_status(frame, app, &theme, layout[4]);

    let footer = Paragraph::new(Line::from(vec![
        Span::styled(" ←/→ ", theme.key_hint),
        Span::styled("Section", theme.muted),
        Span::raw("  "),
        Span::styled(" ↑/↓ ", theme.key_hint),
        Span::styled("Item", theme.muted),
        Span::raw("  "),
        Span::styled(" r ", theme.key_hint),
        Span::styled("Reload", theme.muted),
        Span::raw("  "),
        Span::styled(" c ", theme.key_hint),
        Span::styled("Reconnect", theme.muted),
        Span::raw("  "),
        Span::styled(" q ", theme.key_hint),
        Span::styled("Quit", theme.muted),
    ]))
    .alignment(Alignment::Center);
    frame.render_widget(footer, layout[5]);
}

fn render_tabs(frame: &mut Frame, app: &App, theme: &Theme, area: Rect) {
    let names = app.section_names();
    if names.is_empty() {
        let msg = if app.is_loading {
            "Loading..."
        } else {
            "(No sections)"
        };
        frame.render_widget(Paragraph::new(msg).style(theme.muted), area);
        return;
    }
    let tabs = Tabs::new(names)
        .select(app.section_index)
        .style(theme.normal)
        .highlight_style(theme.selected)
        .block(Block::default().borders(Borders::BOTTOM).border_style(theme.border));
    frame.render_widget(tabs, area);
}

fn render_items(frame: &mut Frame, app: &App, theme: &Theme, area: Rect) {
    let block = Block::default()
        .borders(Borders::RIGHT)
        .border_style(theme.border);
    let items = app.current_items();

    if items.is_empty() {
        let msg = if app.document.is_none() && app.last_error.is_some() {
            "Menu could not be loaded"
        } else {
            "(No items in this section)"
        };
        let p = Paragraph::new(msg)
            .style(theme.muted)
            .alignment(Alignment::Center)
            .block(block);
        frame.render_widget(p, area);
        return;
    }

    let rows: Vec<ListItem> = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let prefix = if i == app.item_index { "▸ " } else { "  " };
            let marker = match item.media_kind() {
                Some(MediaKind::Model) => " [3D]",
                Some(MediaKind::Image) => " [img]",
                None => "",
            };
            let style = if i == app.item_index {
                theme.selected
            } else {
                theme.normal
            };
            ListItem::new(format!("{prefix}{}{marker}  {}", item.name, item.price)).style(style)
        })
        .collect();
    frame.render_widget(List::new(rows).block(block), area);
}

fn render_detail(frame: &mut Frame, app: &App, theme: &Theme, area: Rect) {
    let area = inner_rect(area, 1);
    let Some(item) = app.selected_item() else {
        return;
    };

    let mut lines = vec![
        Line::from(Span::styled(item.name.as_str(), theme.title)),
        Line::from(Span::styled(format!("$ {}", item.price), theme.accent)),
        Line::raw(""),
    ];
    if let Some(description) = &item.description {
        lines.push(Line::raw(description.as_str()));
        lines.push(Line::raw(""));
    }
    lines.extend(media_lines(app, item, theme));

    let p = Paragraph::new(lines).wrap(Wrap { trim: true });
    frame.render_widget(p, area);
}

fn media_lines<'a>(app: &App, item: &MenuItem, theme: &Theme) -> Vec<Line<'a>> {
    let Some((url, status)) = app.media_display(item) else {
        return Vec::new();
    };
    let mut lines = Vec::new();
    match status {
        Some(MediaStatus::Absent) => lines.push(Line::from(vec![
            Span::styled("Media: ", theme.muted),
            Span::styled(format!("unavailable, showing {url}"), theme.warning),
        ])),
        _ => lines.push(Line::from(vec![
            Span::styled("Media: ", theme.muted),
            Span::styled(url, theme.normal),
        ])),
    }

    if item.media_kind() == Some(MediaKind::Model) {
        let (text, style) = match (&app.media_error, &app.preview_status) {
            (Some(err), _) => (err.clone(), theme.danger),
            (None, Some(PreviewStatus::Loading)) => ("loading model...".to_string(), theme.muted),
            (
                None,
                Some(PreviewStatus::Ready {
                    bounds,
                    normalization,
                }),
            ) => (
                format!(
                    "ready, {:.2} units wide, scaled ×{:.3}",
                    bounds.max_dimension(),
                    normalization.scale
                ),
                theme.success,
            ),
            (None, Some(PreviewStatus::Failed(reason))) => {
                (format!("unavailable ({reason})"), theme.danger)
            }
            (None, Some(PreviewStatus::Unmounted) | None) => ("not loaded".to_string(), theme.muted),
        };
        lines.push(Line::from(vec![
            Span::styled("3D:    ", theme.muted),
            Span::styled(text, style),
        ]));
    }
    lines
}

fn render_status(frame: &mut Frame, app: &App, theme: &Theme, area: Rect) {
    let (label, style) = match app.connection {
        ConnectionState::Connected => ("● live".to_string(), theme.success),
        ConnectionState::Connecting { attempt } => {
            (format!("◌ connecting (attempt {attempt})"), theme.warning)
        }
        ConnectionState::Failed => ("✕ offline, press c to retry".to_string(), theme.danger),
        ConnectionState::Disconnected => ("○ disconnected".to_string(), theme.muted),
    };
    let refreshed = app
        .last_refresh
        .as_deref()
        .map(|at| format!("updated {at}"))
        .unwrap_or_else(|| "not loaded yet".to_string());

    let line = Line::from(vec![
        Span::styled(label, style),
        Span::raw("  "),
        Span::styled(refreshed, theme.muted),
        Span::raw("  "),
        Span::styled(
            format!("{} remote refreshes", app.remote_refreshes),
            theme.muted,
        ),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

// Helper: shrink rect by margin
fn inner_rect(area: Rect, margin: u16) -> Rect {
    Rect {
        x: area.x + margin,
        y: area.y + margin,
        width: area.width.saturating_sub(margin * 2),
        height: area.height.saturating_sub(margin * 2),
    }
}

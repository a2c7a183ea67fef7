use menu_proto::Palette;
use ratatui::style::{Color, Modifier, Style};

/// Theme tokens for consistent styling across the TUI.
///
/// Title, selection and accent follow the restaurant's palette; status
/// colors are fixed so errors look the same on every menu.
pub struct Theme {
    pub title: Style,
    pub border: Style,
    pub selected: Style,
    pub normal: Style,
    pub muted: Style,
    pub danger: Style,
    pub warning: Style,
    pub success: Style,
    pub key_hint: Style,
    pub accent: Style,
}

impl Theme {
    pub fn branded(palette: &Palette) -> Self {
        let primary = rgb(palette.primary.rgb());
        let secondary = rgb(palette.secondary.rgb());
        let bold = |color: Color| Style::default().fg(color).add_modifier(Modifier::BOLD);

        Self {
            title: bold(primary),
            border: Style::default().fg(Color::DarkGray),
            selected: bold(Color::Black).bg(primary),
            normal: Style::default().fg(Color::White),
            muted: Style::default().fg(Color::DarkGray),
            danger: bold(Color::Red),
            warning: bold(Color::Yellow),
            success: bold(Color::Green),
            key_hint: bold(secondary),
            accent: Style::default().fg(secondary),
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::branded(&Palette::default())
    }
}

fn rgb((r, g, b): (u8, u8, u8)) -> Color {
    Color::Rgb(r, g, b)
}

use owo_colors::Style;
use std::sync::OnceLock;

static THEME: OnceLock<Theme> = OnceLock::new();

/// Styles for catalog output
#[derive(Debug, Clone)]
pub struct Theme {
    pub header: Style,
    pub success: Style,
    pub error: Style,
    pub warn: Style,
    /// Key of a `key: value` info line
    pub label: Style,
    /// A part's designed-for model
    pub primary: Style,
    pub secondary: Style,
}

impl Theme {
    pub fn detect() -> Self {
        if colors_enabled() { Self::colored() } else { Self::plain() }
    }

    pub fn colored() -> Self {
        Self {
            header: Style::new().cyan().bold(),
            success: Style::new().green().bold(),
            error: Style::new().red().bold(),
            warn: Style::new().yellow().bold(),
            label: Style::new().blue(),
            primary: Style::new().yellow().bold(),
            secondary: Style::new().dimmed(),
        }
    }

    pub fn plain() -> Self {
        let none = Style::new();
        Self {
            header: none.clone(),
            success: none.clone(),
            error: none.clone(),
            warn: none.clone(),
            label: none.clone(),
            primary: none.clone(),
            secondary: none,
        }
    }
}

/// Colors only on a terminal, and never when `NO_COLOR` is set
fn colors_enabled() -> bool {
    console::Term::stdout().is_term() && std::env::var_os("NO_COLOR").is_none()
}

pub fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::detect)
}

use owo_colors::Style;
use std::sync::OnceLock;

static THEME: OnceLock<Theme> = OnceLock::new();

/// Console styles. Change counts reuse `success`, `warn` and `error`.
#[derive(Debug, Clone)]
pub struct Theme {
    pub header: Style,
    pub success: Style,
    pub error: Style,
    pub warn: Style,
    pub info: Style,
    pub dim: Style,
}

impl Theme {
    /// Colored when stdout is a terminal, plain otherwise
    pub fn detect() -> Self {
        Self::new(console::Term::stdout().is_term())
    }

    pub fn new(colored: bool) -> Self {
        let pick = |style: Style| if colored { style } else { Style::new() };
        Self {
            header: pick(Style::new().cyan().bold()),
            success: pick(Style::new().green()),
            error: pick(Style::new().red().bold()),
            warn: pick(Style::new().yellow()),
            info: pick(Style::new().magenta()),
            dim: pick(Style::new().dimmed()),
        }
    }
}

pub fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::detect)
}

/// Controls colored terminal output.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TerminalColor {
    /// Display colors if the output goes to an interactive terminal.
    #[default]
    Auto,

    /// Always display colors.
    Always,

    /// Never display colors.
    Never,
}

impl TerminalColor {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Always => "always",
            Self::Never => "never",
        }
    }
}

/// Applies the user's color choice to the global `colored` override.
pub fn set_colored_override(color: Option<TerminalColor>) {
    match color.unwrap_or_default() {
        TerminalColor::Auto => colored::control::unset_override(),
        TerminalColor::Always => colored::control::set_override(true),
        TerminalColor::Never => colored::control::set_override(false),
    }
}

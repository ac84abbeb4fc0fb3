//! Clap help styling, following the palette pattern used by other
//! clap-based CLIs in this corpus: a TTY check gates color, `NO_COLOR`
//! always wins.

use clap::builder::styling::{AnsiColor, Color, Style, Styles};
use std::io::IsTerminal;

pub fn should_colorize() -> bool {
    if std::env::var("NO_COLOR").is_ok_and(|v| !v.is_empty()) {
        return false;
    }
    std::io::stdout().is_terminal()
}

pub fn styles() -> Styles {
    if !should_colorize() {
        return Styles::plain();
    }
    Styles::styled()
        .header(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Cyan))).bold())
        .usage(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Cyan))).bold())
        .literal(Style::new().fg_color(Some(Color::Ansi(AnsiColor::Green))))
        .placeholder(Style::new().fg_color(Some(Color::Ansi(AnsiColor::BrightBlack))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn no_color_env_disables_colorization() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("NO_COLOR", "1");
        assert!(!should_colorize());
        std::env::remove_var("NO_COLOR");
    }
}

//! Terminal output styling.

use colored::Colorize;

pub(crate) struct Theme;

impl Theme {
    pub(crate) fn header(text: &str) -> String {
        format!("{}", text.bold().cyan())
    }

    pub(crate) fn success(text: &str) -> String {
        format!("{} {}", "✓".green(), text)
    }

    pub(crate) fn error(text: &str) -> String {
        format!("{} {}", "✗".red(), text.red())
    }

    pub(crate) fn info(text: &str) -> String {
        format!("{} {}", "i".blue(), text)
    }

    pub(crate) fn dimmed(text: &str) -> String {
        format!("{}", text.dimmed())
    }

    pub(crate) fn separator() -> String {
        "─".repeat(50).dimmed().to_string()
    }
}

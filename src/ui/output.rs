use crate::ui::theme;
use owo_colors::OwoColorize;

pub struct Icons;

impl Icons {
    pub const CAR: &str = "🚗";
    pub const CHECK: &str = "✅";
    pub const CROSS: &str = "❌";
    pub const WARN: &str = "⚠️";
    pub const INFO: &str = "ℹ️";
    pub const STAR: &str = "⭐";
}

pub fn header(text: &str) {
    println!("{} {}", Icons::CAR, text.style(theme().header.clone()));
}

pub fn success(label: &str) {
    println!("{} {}", Icons::CHECK, label.style(theme().success.clone()));
}

pub fn error(label: &str) {
    eprintln!("{} {}", Icons::CROSS, label.style(theme().error.clone()));
}

pub fn warn(label: &str) {
    eprintln!("{} {}", Icons::WARN, label.style(theme().warn.clone()));
}

pub fn info(label: &str, value: &str) {
    println!("{} {}: {}", Icons::INFO, label.style(theme().label.clone()), value);
}

pub fn section(title: &str) {
    println!();
    println!("━{}━", title.style(theme().header.clone()));
}

/// Cell text for a link's primary flag
pub fn primary_marker(is_primary: bool) -> String {
    if is_primary {
        format!("{} primary", Icons::STAR).style(theme().primary.clone()).to_string()
    } else {
        "secondary".style(theme().secondary.clone()).to_string()
    }
}

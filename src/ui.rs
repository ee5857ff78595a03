//! User-facing terminal output
//!
//! Diagnostics go through `tracing`; this module prints the handful of
//! colored status lines a build shows on the terminal.

use colored::{Color, Colorize};
use std::sync::atomic::{AtomicU8, Ordering};

/// Verbosity levels for output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    Quiet = 0,
    Normal = 1,
    Verbose = 2,
}

static VERBOSITY: AtomicU8 = AtomicU8::new(Verbosity::Normal as u8);

/// Set the process-wide output verbosity
pub fn set_verbosity(verbosity: Verbosity) {
    VERBOSITY.store(verbosity as u8, Ordering::Relaxed);
}

fn quiet() -> bool {
    VERBOSITY.load(Ordering::Relaxed) < Verbosity::Normal as u8
}

/// Style `msg` with a named color; names ending in `BG` (e.g., `blueBG`)
/// select a background color. Unknown names leave the text unstyled.
pub fn paint(color: &str, msg: &str) -> String {
    if let Some(base) = color.strip_suffix("BG") {
        match base.parse::<Color>() {
            Ok(bg) => msg.on_color(bg).to_string(),
            Err(_) => msg.to_string(),
        }
    } else {
        match color.parse::<Color>() {
            Ok(fg) => msg.color(fg).to_string(),
            Err(_) => msg.to_string(),
        }
    }
}

/// Print a colored status line
pub fn log_color(color: &str, msg: &str) {
    if !quiet() {
        println!("{}", paint(color, msg));
    }
}

/// Print an error and its causes in red
pub fn print_error(err: &(dyn std::error::Error + 'static)) {
    let mut shown = err.to_string();
    eprintln!("{} {}", "Error:".red().bold(), shown.red());

    // Wrapping variants already embed their source's message
    let mut source = err.source();
    while let Some(cause) = source {
        let message = cause.to_string();
        if !shown.contains(&message) {
            eprintln!("  {} {}", "caused by:".red(), message);
        }
        shown = message;
        source = cause.source();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paint_colors() {
        colored::control::set_override(true);
        assert_eq!(paint("cyan", "build start!"), "build start!".cyan().to_string());
        assert_eq!(
            paint("blueBG", "environment: dev"),
            "environment: dev".on_blue().to_string()
        );
        assert_eq!(paint("no-such-color", "plain"), "plain");
        colored::control::unset_override();
    }

    #[test]
    fn test_verbosity_levels() {
        assert!(Verbosity::Verbose > Verbosity::Normal);
        assert!(Verbosity::Normal > Verbosity::Quiet);
    }
}

//! Centralized color theming for consistent CLI output.
//!
//! # NO_COLOR Support
//!
//! Colors can be disabled globally via:
//! - The `--no-color` CLI flag
//! - The `NO_COLOR` environment variable
//!
//! When colors are disabled, all theming functions return unstyled output.
//!
//! # Usage
//!
//! ```ignore
//! use crate::theme::Themed;
//! println!("{} {}", "PASSED".passed(), report.item);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

/// Global color enable flag (respects NO_COLOR and --no-color).
static COLORS_ENABLED: AtomicBool = AtomicBool::new(true);

/// Disable all colors globally.
///
/// Call this early in main() when --no-color is set.
pub fn disable_colors() {
    COLORS_ENABLED.store(false, Ordering::Relaxed);
    owo_colors::set_override(false);
}

/// Check if colors are currently enabled.
pub fn colors_enabled() -> bool {
    COLORS_ENABLED.load(Ordering::Relaxed)
}

/// Extension trait for applying semantic colors with owo_colors.
///
/// All methods respect the global color enable state set by `disable_colors()`.
pub trait Themed: owo_colors::OwoColorize {
    /// Style for passing outcomes (green).
    fn passed(&self) -> String
    where
        Self: std::fmt::Display,
    {
        if colors_enabled() {
            format!("{}", owo_colors::OwoColorize::green(self))
        } else {
            self.to_string()
        }
    }

    /// Style for failing outcomes (red + bold).
    fn failed(&self) -> String
    where
        Self: std::fmt::Display,
    {
        if colors_enabled() {
            format!(
                "{}",
                owo_colors::OwoColorize::bold(&owo_colors::OwoColorize::red(self))
            )
        } else {
            self.to_string()
        }
    }

    /// Style for skipped outcomes and warnings (yellow).
    fn warning(&self) -> String
    where
        Self: std::fmt::Display,
    {
        if colors_enabled() {
            format!("{}", owo_colors::OwoColorize::yellow(self))
        } else {
            self.to_string()
        }
    }

    /// Style for secondary text (dimmed).
    fn muted(&self) -> String
    where
        Self: std::fmt::Display,
    {
        if colors_enabled() {
            format!("{}", owo_colors::OwoColorize::dimmed(self))
        } else {
            self.to_string()
        }
    }
}

impl Themed for String {}
impl Themed for &str {}
impl Themed for usize {}

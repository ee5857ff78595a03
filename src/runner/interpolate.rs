//! Variable interpolation for strings
//!
//! This module handles parsing and replacing variables in tool command
//! templates using the ${var} syntax.

use crate::error::{InterpolationError, InterpolationResult};
use regex::Regex;
use std::collections::HashMap;
use std::env;
use std::sync::OnceLock;

/// Maximum number of substitution passes before giving up
const MAX_PASSES: usize = 16;

fn var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("valid interpolation regex"))
}

/// Interpolate variables in a string
///
/// Supports:
/// - `${var}` - variable from the provided map
/// - Environment variables (when not found in the map)
///
/// Unknown variables are left in place.
pub fn interpolate(s: &str, vars: &HashMap<String, String>) -> InterpolationResult<String> {
    let re = var_pattern();
    let mut result = s.to_string();

    for _ in 0..MAX_PASSES {
        let mut changed = false;

        let next = re
            .replace_all(&result, |caps: &regex::Captures| {
                let var_name = &caps[1];

                if let Some(value) = vars.get(var_name) {
                    changed = true;
                    return value.clone();
                }

                if let Ok(value) = env::var(var_name) {
                    changed = true;
                    return value;
                }

                caps[0].to_string()
            })
            .into_owned();

        if !changed {
            return Ok(next);
        }
        result = next;
    }

    Err(InterpolationError::RecursiveInterpolation)
}

/// Quote a value for safe use inside a `sh -c` command line
pub fn shell_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '='));
    if plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

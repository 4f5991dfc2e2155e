//! Shared helper functions for CLI commands

use crate::core::ConfigError;

/// Turn a configuration error into a diagnostic with a hint on where to set it
pub fn bail_config(e: ConfigError) -> miette::Report {
    match &e {
        ConfigError::Missing(name) => miette::miette!(
            help = format!(
                "set `{}` in stm.yaml, the STM_{} environment variable or the matching flag",
                name,
                name.to_uppercase()
            ),
            "{}",
            e
        ),
        _ => miette::miette!("{}", e),
    }
}

/// Truncate a string to max_len characters, adding "..." if truncated
///
/// Counts characters rather than bytes, since sheet cells are free text.
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

//! Terminal capability checks and tracing setup.

pub(crate) fn is_dumb_terminal() -> bool {
    std::env::var("TERM")
        .map(|value| value.eq_ignore_ascii_case("dumb"))
        .unwrap_or(false)
}

pub(crate) fn should_use_progress_bar(
    stderr_is_terminal: bool,
    quiet: bool,
    dumb_terminal: bool,
) -> bool {
    stderr_is_terminal && !quiet && !dumb_terminal
}

/// Picks the default filter directive.
///
/// Priority: quiet flag > verbose flag > configured level.
pub(crate) fn default_log_level(quiet: bool, verbose: u8, configured: &'static str) -> &'static str {
    if quiet {
        return "error";
    }
    match verbose {
        0 => configured,
        1 => "debug",
        _ => "trace",
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over `default_level`.
pub(crate) fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_bar_only_on_interactive_non_quiet_terminal() {
        assert!(should_use_progress_bar(true, false, false));
        assert!(!should_use_progress_bar(false, false, false));
        assert!(!should_use_progress_bar(true, true, false));
        assert!(!should_use_progress_bar(true, false, true));
    }

    #[test]
    fn test_default_log_level_precedence() {
        assert_eq!(default_log_level(true, 2, "debug"), "error");
        assert_eq!(default_log_level(false, 0, "warn"), "warn");
        assert_eq!(default_log_level(false, 1, "warn"), "debug");
        assert_eq!(default_log_level(false, 3, "info"), "trace");
    }
}

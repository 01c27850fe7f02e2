use tracing_subscriber::EnvFilter;

const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Directive for the configured level; unknown levels fall back to `info`.
pub fn default_directive(level: &str) -> String {
    let level = level.trim().to_ascii_lowercase();
    let level = if LEVELS.contains(&level.as_str()) {
        level
    } else {
        "info".to_string()
    };
    format!("oxiwatch={level},warn")
}

/// Install the global subscriber. `RUST_LOG` takes precedence over `level`.
/// Calling this more than once is harmless.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_levels_pass_through() {
        assert_eq!(default_directive("debug"), "oxiwatch=debug,warn");
        assert_eq!(default_directive(" WARN "), "oxiwatch=warn,warn");
    }

    #[test]
    fn unknown_level_falls_back_to_info() {
        assert_eq!(default_directive("loud"), "oxiwatch=info,warn");
    }

    #[test]
    fn init_twice_does_not_panic() {
        init("info");
        init("debug");
    }
}

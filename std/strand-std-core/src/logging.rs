///
/// Logging bootstrap
///
/// The library only emits `tracing` events; applications decide whether to
/// install a subscriber. `init()` installs the stderr formatter with the
/// level and colouring taken from `LoggingConfig`.
///

use tracing_subscriber::fmt;

use crate::config::{ConfigError, LoggingConfig};

/// Install the stderr subscriber. Returns `Ok(false)` when another global
/// subscriber is already in place.
pub fn init(config: &LoggingConfig) -> Result<bool, ConfigError> {
    let level = config.max_level()?;
    let installed = fmt()
        .with_writer(std::io::stderr)
        .with_ansi(config.ansi)
        .with_max_level(level)
        .try_init()
        .is_ok();
    Ok(installed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice() {
        let config = LoggingConfig::default();
        init(&config).expect("valid level");
        assert!(!init(&config).expect("valid level"));
    }

    #[test]
    fn test_init_rejects_unknown_level() {
        let config = LoggingConfig {
            level: "chatty".to_string(),
            ansi: false,
        };
        assert!(init(&config).is_err());
    }
}

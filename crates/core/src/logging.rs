//! Tracing setup for the docstream binary.
//!
//! Logs go to stderr. `docstream ask` prints answer tokens on stdout as they
//! stream in, and log lines must never interleave with them.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{AppError, AppResult};

/// Filter used when neither `--log-level` nor `RUST_LOG` is set. The HTTP
/// stack logs every connection at info, so it is held at warn.
pub const DEFAULT_FILTER: &str = "info,hyper=warn,h2=warn";

/// Install the global subscriber.
///
/// `log_level` takes any `EnvFilter` directive string and wins over
/// `RUST_LOG`. Color is off when `no_color` is set or `NO_COLOR` exists.
/// Fails with [`AppError::Config`] on a bad directive or when a subscriber
/// is already installed.
///
/// ```no_run
/// docstream_core::logging::init_logging(Some("docstream_server=debug"), true)?;
/// # Ok::<(), docstream_core::AppError>(())
/// ```
pub fn init_logging(log_level: Option<&str>, no_color: bool) -> AppResult<()> {
    let from_env = std::env::var("RUST_LOG").ok();
    let env_filter = build_filter(log_level.or(from_env.as_deref()))?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(use_ansi(no_color, std::env::var_os("NO_COLOR").is_some()));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| AppError::Config(format!("Failed to init logging: {}", e)))
}

fn build_filter(directives: Option<&str>) -> AppResult<EnvFilter> {
    let directives = directives.unwrap_or(DEFAULT_FILTER);
    EnvFilter::try_new(directives)
        .map_err(|e| AppError::Config(format!("Invalid log filter '{}': {}", directives, e)))
}

fn use_ansi(no_color: bool, no_color_env: bool) -> bool {
    !(no_color || no_color_env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_is_config_error() {
        let result = init_logging(Some("docstream=loudest"), true);
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_filter_accepts_levels_and_targets() {
        assert!(build_filter(None).is_ok());
        assert!(build_filter(Some("debug")).is_ok());
        assert!(build_filter(Some("warn,docstream_server=trace")).is_ok());
    }

    #[test]
    fn test_bad_filter_error_names_directive() {
        match build_filter(Some("docstream=loudest")) {
            Err(AppError::Config(msg)) => assert!(msg.contains("docstream=loudest")),
            other => panic!("expected config error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_color_disabled_by_flag_or_env() {
        assert!(use_ansi(false, false));
        assert!(!use_ansi(true, false));
        assert!(!use_ansi(false, true));
    }
}

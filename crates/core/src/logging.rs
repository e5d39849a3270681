//! Logging and tracing initialization.
//!
//! Provides [`init_tracing`] to configure structured logging with two modes:
//! - **JSON mode** (`json = true`): machine-readable output with nanosecond
//!   timestamps, suitable for collecting backtest runs.
//! - **Pretty mode** (`json = false`): human-readable colored output for
//!   interactive use.
//!
//! Both modes respect the `RUST_LOG` environment variable for filtering
//! (e.g., `RUST_LOG=ssq_backtest=debug,ssq_ml=info`).

use std::fmt;

use anyhow::{Context, Result};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// # Arguments
///
/// * `json` - When `true`, emit structured JSON logs with nanosecond timestamps.
///   When `false`, emit pretty-printed logs with ANSI colors.
///
/// # Errors
///
/// Fails if a global subscriber has already been set.
///
/// # Examples
///
/// ```
/// ssq_core::logging::init_tracing(false).unwrap();
/// ```
pub fn init_tracing(json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_timer(NanosecondTimer)
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::CLOSE);

        registry
            .with(json_layer)
            .try_init()
            .context("tracing subscriber already installed")?;
    } else {
        let pretty_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(false)
            .with_span_events(FmtSpan::CLOSE);

        registry
            .with(pretty_layer)
            .try_init()
            .context("tracing subscriber already installed")?;
    }
    Ok(())
}

/// Custom timer that emits nanosecond-precision timestamps for JSON logs.
#[derive(Debug, Clone)]
struct NanosecondTimer;

impl NanosecondTimer {
    const FORMAT: &'static str = "%Y-%m-%dT%H:%M:%S%.9fZ";
}

impl tracing_subscriber::fmt::time::FormatTime for NanosecondTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> fmt::Result {
        let now = chrono::Utc::now();
        write!(w, "{}", now.format(Self::FORMAT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::fmt::time::FormatTime;

    #[test]
    fn test_nanosecond_timer_format() {
        let mut out = String::new();
        let mut writer = tracing_subscriber::fmt::format::Writer::new(&mut out);
        NanosecondTimer.format_time(&mut writer).unwrap();

        // 2024-01-02T03:04:05.123456789Z
        assert_eq!(out.len(), 30, "unexpected timestamp {out}");
        assert!(out.ends_with('Z'));
        let frac = out.split('.').nth(1).unwrap();
        assert_eq!(frac.len(), 10);
    }

    #[test]
    fn test_second_init_fails() {
        // The first call may race with other tests; only the second must fail.
        let _ = init_tracing(true);
        assert!(init_tracing(false).is_err());
    }
}

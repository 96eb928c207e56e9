// Tracing setup for binaries and integration harnesses built on the client

use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    EnvFilter, Registry,
};

//-----------------------------------------------------------------------------
// Tracing Initialization
//-----------------------------------------------------------------------------

/// `RUST_LOG` wins; otherwise `log_level`, then "info"
fn env_filter(log_level: Option<&str>) -> Result<EnvFilter> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level.unwrap_or("info")))?;
    Ok(filter)
}

/// Installs the global tracing subscriber.
///
/// # Arguments
///
/// * `log_level`: filter directives used when `RUST_LOG` is unset. Defaults
///   to "info"; module directives such as "wsapi_client=debug,info" work too.
/// * `json_output`: emit JSON lines instead of the pretty format. Defaults to
///   `false`.
///
/// Page requests log at `debug`, group retries at `warn` and query starts at
/// `info`.
pub fn init_tracing(log_level: Option<&str>, json_output: Option<bool>) -> Result<()> {
    let subscriber = Registry::default().with(env_filter(log_level)?);

    if json_output.unwrap_or(false) {
        let json_layer = fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_span_list(true);
        tracing::subscriber::set_global_default(subscriber.with(json_layer))?;
    } else {
        let fmt_layer = fmt::layer()
            .pretty()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_level(true);
        tracing::subscriber::set_global_default(subscriber.with(fmt_layer))?;
    }

    Ok(())
}

/// Installs a compact subscriber that writes through the test harness, so
/// output shows up only for failing tests.
pub fn init_test_tracing(log_level: Option<&str>) -> Result<()> {
    let test_layer = fmt::layer().compact().with_test_writer().with_target(true);
    let subscriber = Registry::default().with(env_filter(log_level)?).with(test_layer);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    static INIT: Once = Once::new();

    #[test]
    fn test_second_install_is_rejected() {
        INIT.call_once(|| {
            let _ = init_test_tracing(Some("wsapi_client=debug"));
        });
        tracing::debug!("tracing installed");
        assert!(init_tracing(Some("info"), Some(true)).is_err());
        assert!(init_test_tracing(None).is_err());
    }

    #[test]
    fn test_invalid_directive_is_reported() {
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(env_filter(Some("wsapi_client=notalevel")).is_err());
        }
    }
}

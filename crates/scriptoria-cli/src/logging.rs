//! Logger backend for the command-line host.
//!
//! The core only speaks the `log` facade; this is the one place where a backend is installed.

use anyhow::{Context, Result};
use flexi_logger::{Logger, LoggerHandle};

const DEFAULT_LEVEL: &str = "info";

/// Install a stderr logger.
///
/// An explicit `spec` (e.g. `debug` or `scriptoria_core=debug,info`) wins; otherwise `RUST_LOG`
/// is honored and the level falls back to `info`. The returned handle must stay alive for the
/// whole run.
pub fn init(spec: Option<&str>) -> Result<LoggerHandle> {
    let logger = match spec {
        Some(spec) => Logger::try_with_str(spec)
            .with_context(|| format!("invalid log level `{spec}`"))?,
        None => Logger::try_with_env_or_str(DEFAULT_LEVEL)
            .context("invalid log specification in RUST_LOG")?,
    };
    let handle = logger
        .log_to_stderr()
        .format(flexi_logger::default_format)
        .start()
        .context("failed to start logger")?;

    log::debug!(
        "event=app_start module=cli status=ok version={}",
        env!("CARGO_PKG_VERSION")
    );
    Ok(handle)
}

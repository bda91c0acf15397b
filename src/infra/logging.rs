// ============================================================
// Layer 6 — Logging
// ============================================================
// tracing-subscriber setup. `-v` raises the crate's level from
// warn; `-l FILE` redirects output to a file without colours.

use std::{fs::File, path::Path, sync::Mutex};

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

/// Crate log level for a `-v` count.
pub fn level_for(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber. `RUST_LOG` still applies to other
/// targets; output goes to `log_file` when given, stderr otherwise.
pub fn init(verbosity: u8, log_file: Option<&Path>) -> Result<()> {
    let directive = format!("{}={}", env!("CARGO_PKG_NAME"), level_for(verbosity));
    let filter = EnvFilter::from_default_env().add_directive(directive.parse()?);

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Cannot create log file '{}'", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    installed.map_err(|e| anyhow!("cannot install logger: {e}"))
}

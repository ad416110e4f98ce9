//! Logging and tracing configuration
//!
//! Logs go to stderr so that `--json` output on stdout stays machine readable.

use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("contract_scenario=debug,info")
        } else {
            EnvFilter::new("contract_scenario=info,warn")
        }
    })
}

fn stderr_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
}

/// Initialize tracing for the CLI (stderr logging)
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate (DEBUG with `verbose`), WARN for
/// dependencies.
pub fn init_cli(verbose: bool) {
    tracing_subscriber::registry()
        .with(filter(verbose))
        .with(stderr_layer())
        .init();
}

/// Initialize tracing with an additional file layer
///
/// Falls back to stderr-only logging if the file cannot be opened. Returns
/// the path actually logged to.
pub fn init_with_file(path: &Path, verbose: bool) -> Option<PathBuf> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && std::fs::create_dir_all(parent).is_err() {
            init_cli(verbose);
            return None;
        }
    }

    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
    {
        Ok(file) => {
            let file_layer = fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);

            tracing_subscriber::registry()
                .with(filter(verbose))
                .with(file_layer)
                .with(stderr_layer())
                .init();
            Some(path.to_path_buf())
        }
        Err(e) => {
            eprintln!("Warning: Could not open log file: {}", e);
            init_cli(verbose);
            None
        }
    }
}

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map a repeated `-v` count to an `EnvFilter` directive.
///
/// The default is `warn` so that a plain run only surfaces problems with the
/// input files; each `-v` lowers the threshold one step.
pub fn filter_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Initialise the global `tracing` subscriber.
///
/// All diagnostics go to stderr, keeping stdout clean for the printers.
pub fn setup_logging(verbosity: u8) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(filter_directive(verbosity))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let subscriber = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(subscriber)
        .init();

    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────────

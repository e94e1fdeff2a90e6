use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the tracing subscriber. `RUST_LOG` wins when set; otherwise
/// verbosity maps -v/-vv to debug/trace for our crates.
pub fn init_logging(verbosity: u8) {
    let default_filter = match verbosity {
        0 => "info,taskpay_ledger=info,taskpay_escrow=info",
        1 => "info,taskpay_ledger=debug,taskpay_escrow=debug,taskpay_gateway=debug",
        _ => "debug,taskpay_ledger=trace,taskpay_escrow=trace,taskpay_gateway=trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

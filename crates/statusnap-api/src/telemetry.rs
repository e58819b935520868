use tracing_subscriber::{
    fmt::format::Format, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

const DEFAULT_FILTER: &str = "statusnap=debug,statusnap_api=debug,statusnap_processing=debug,tower_http=debug";

/// Initialize console tracing. `RUST_LOG` overrides the default filter.
pub fn init_telemetry(environment: &str) -> Result<(), Box<dyn std::error::Error>> {
    // Console: compact format, no timestamps (the log collector adds its own).
    let console_fmt = tracing_subscriber::fmt::layer().event_format(
        Format::default()
            .compact()
            .with_target(false)
            .without_time(),
    );

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()))
        .with(console_fmt)
        .try_init()?;

    tracing::info!(environment, "Tracing initialized");
    Ok(())
}

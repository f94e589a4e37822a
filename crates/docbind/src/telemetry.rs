//! Tracing setup for binaries and tests embedding the store

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global tracing subscriber.
///
/// Defaults to `default_directive` (e.g. `"info"`), overridable with
/// `RUST_LOG`. Fails if a global subscriber is already set.
pub fn init_tracing(default_directive: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()?;

    Ok(())
}

//! Tracing subscriber setup for binaries, benches and tests.

use crate::{Error, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a global subscriber filtered by `RUST_LOG`.
///
/// `json` switches the formatter to one JSON object per event.
#[allow(clippy::result_large_err)]
pub fn init_tracing(default_filter: &str, json: bool) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .try_init()
        .map_err(|e| Error::Config {
            message: format!("failed to install tracing subscriber: {e}"),
        })
}

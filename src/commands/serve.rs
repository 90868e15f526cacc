use crate::config::Config;
use crate::error::Result;
use crate::http;
use crate::observability;

/// Start the HTTP server on a multi-threaded runtime and block until shutdown.
pub fn run(config: Config) -> Result<()> {
    observability::init_logging(config.log_format);
    tracing::debug!(?config, "starting");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(http::serve(config))
}

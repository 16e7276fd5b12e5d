use std::sync::Arc;

use anyhow::Context;

use feeledger_api::app::{self, services};
use feeledger_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ApiConfig::from_env()?;
    feeledger_observability::init_with(config.log_format);

    let services = Arc::new(services::build_services(&config).context("failed to build services")?);
    services::spawn_event_logger(&services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        lock_policy = services.ledger.lock_policy().as_str(),
        "listening"
    );

    let app = app::build_app(services);

    axum::serve(listener, app).await?;
    Ok(())
}

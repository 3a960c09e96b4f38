use anyhow::Context;

use vevurn_infra::PosConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    vevurn_observability::init();

    let config = PosConfig::from_env().context("invalid configuration")?;
    let bind_addr = config.bind_addr.clone();

    let app = vevurn_api::app::build_app(config)
        .await
        .context("failed to wire services")?;

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

#[path = "llm_relay/cli.rs"]
mod cli;

use clap::Parser;

use cli::Cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let env = cli.env()?;
    let registry = cli.registry()?;
    let config = cli.proxy_config(&env, &registry)?;
    llm_relay::init_tracing(config.json_logs)?;

    let state = llm_relay::ProxyState::new(config, registry)?;
    for provider in state.providers().iter() {
        tracing::info!(
            provider = provider.name,
            base_url = %provider.base_url,
            credential = provider.credential_key,
            configured = state.config().credentials.contains(provider.credential_key),
            "provider registered"
        );
    }

    let listen = state.config().listen;
    let app = llm_relay::router(state);

    let listener = tokio::net::TcpListener::bind(listen).await?;
    tracing::info!(addr = %listen, "llm-relay listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("llm-relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received; draining connections");
}

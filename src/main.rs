use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("cove — group chat over plain TCP");
    info!("connect with 'nc <host> 8080'");

    // Listen address: fixed well-known port, overridable via COVE_ADDR.
    let addr = std::env::var("COVE_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into());

    cove::chat::server::run(&[addr.as_str()]).await
}

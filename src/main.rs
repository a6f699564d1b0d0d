use podgate::bootstrap;
use podgate::config::{Settings, USAGE};
use podgate::podman::PodmanClient;
use podgate::sync::Reconciler;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("podgate=debug".parse().expect("valid log directive")),
        )
        .init();

    let settings = match Settings::from_args(std::env::args().skip(1)) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("{USAGE}");
            std::process::exit(2);
        }
    };

    info!(
        host = %settings.host_addr,
        proxy_port = settings.proxy_port,
        network = %settings.network,
        proxy = %settings.proxy_name,
        "starting podgate"
    );

    let client = PodmanClient::new();

    bootstrap::ensure_proxy(&client, &settings).await.map_err(|e| {
        error!(error = %e, "proxy bootstrap failed");
        e
    })?;

    let reconciler = Reconciler::new(client, settings);
    reconciler.run().await
}

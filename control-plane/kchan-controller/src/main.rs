use envconfig::Envconfig;
use kchan_controller::{config::ControllerConfig, init_tracing, runtime};
use kube::Client;
use tracing::info;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");

    // kube's rustls feature needs a process-wide crypto provider
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(
        rustls::crypto::aws_lc_rs::default_provider(),
    ) {
        tracing::debug!(?e, "crypto provider already installed; proceeding");
    }

    let cfg = ControllerConfig::init_from_env()?.apply_profile_defaults();
    info!(?cfg, backend = %cfg.backend(), "starting kafka-channel controller");

    let client = Client::try_default().await?;
    runtime::run_all(client, cfg).await
}

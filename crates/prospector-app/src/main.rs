//! Prospector command entry point.

use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = prospector_app::load_config()?;
    prospector_app::init_tracing(&config.logging);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping after the current cycle");
            on_signal.cancel();
        }
    });

    prospector_app::run(&config, cancel).await?;
    Ok(())
}

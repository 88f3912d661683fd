use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tip_engine::{
    client::{LocalWalletSigner, PaymentOrchestrator},
    config::Config,
    services::{ChainReader, HttpRelayClient, HttpTipRecorder, RpcChainReader},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!("Starting tip-engine v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {:?}", config.environment);

    let amount: f64 = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("TIP_AMOUNT").ok())
        .context("Usage: tip-engine <amount-usdc> (or set TIP_AMOUNT)")?
        .trim()
        .trim_start_matches('$')
        .parse()
        .context("Invalid tip amount")?;

    // Initialize collaborators
    let chain = Arc::new(RpcChainReader::new(
        &config.rpc_url,
        config.rpc_fallback_url.as_deref(),
        config.chain_reader_options(),
    )?);

    let mut orchestrator =
        PaymentOrchestrator::new(config.engine_config()).with_chain_reader(chain.clone());

    if let Some(key) = &config.wallet_private_key {
        let signer = Arc::new(LocalWalletSigner::new(&config.rpc_url, key, config.chain_id)?);
        tracing::info!("Wallet: {:?}", signer.address());

        if let Some(relay_url) = &config.relay_url {
            let relay =
                HttpRelayClient::new(relay_url.clone(), signer.clone(), config.http_timeout())?;
            orchestrator = orchestrator.with_relay(Arc::new(relay));
        }
        orchestrator = orchestrator.with_signer(signer);
    }

    if let Some(record_url) = &config.record_url {
        let recorder = HttpTipRecorder::new(record_url.clone(), config.http_timeout())?;
        orchestrator = orchestrator.with_recorder(Arc::new(recorder));
    }

    let result = orchestrator.send_payment(amount).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.success {
        bail!(
            "Payment failed: {}",
            result.error.as_deref().unwrap_or("unknown error")
        );
    }

    let Some(receipt) = result.receipt.clone() else {
        return Ok(());
    };
    println!("Tip id: {}", receipt.tip_id());

    match chain.get_block_height().await {
        Ok(head) => tracing::info!("Chain head {} (tip in block {})", head, receipt.block_number),
        Err(e) => tracing::warn!("Could not read chain head: {}", e),
    }

    let Some(tracker) = orchestrator.track_confirmations(&receipt, |state| {
        println!(
            "Confirmations: {} / {}",
            state.confirmations, state.finality_threshold
        );
    }) else {
        return Ok(());
    };

    tokio::select! {
        state = tracker.finished() => {
            tracing::info!("Tracking finished at {} confirmations", state.confirmations);
        }
        _ = shutdown_signal() => {
            tracker.cancel();
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl+c: {}", e);
        futures::future::pending::<()>().await;
    }
    tracing::info!("Stopped following confirmations");
}

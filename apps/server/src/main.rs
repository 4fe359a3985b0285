//! Headless Aurelay bridge server.
//!
//! Wires the core services together, logs bridge events, and tears every
//! renderer down cleanly on ctrl-c. Discovery callbacks and the controller
//! connection arrive from the surrounding protocol stacks; this binary owns
//! their shared state.

mod config;

use std::sync::Arc;

use clap::Parser;

use aurelay_core::renderer::gena::GenaClient;
use aurelay_core::{
    DeviceRegistry, EventBus, LocalIpDetector, NetworkContext, ReqwestTransport,
    SoapTransport, StreamCoordinator,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = config::Args::parse();

    env_logger::Builder::new()
        .parse_filters(&args.log)
        .format_timestamp_millis()
        .init();

    let file = config::FileConfig::load(args.config.as_ref())?;
    let settings = config::resolve(&args, file)?;

    let network = match settings.advertise_ip {
        Some(ip) => NetworkContext::explicit(ip),
        None => NetworkContext::auto_detect(LocalIpDetector::arc())
            .map_err(|e| anyhow::anyhow!("IP auto-detection failed: {e}"))?,
    };
    log::info!("advertising streams on {}", network.local_ip());

    let http = reqwest::Client::new();
    let soap: Arc<dyn SoapTransport> = Arc::new(ReqwestTransport::new(http.clone()));
    let gena = Arc::new(GenaClient::new(http.clone()));
    let registry = DeviceRegistry::new();
    let bus = Arc::new(EventBus::default());
    let coordinator = Arc::new(StreamCoordinator::new(
        network.clone(),
        settings.bridge.clone(),
    ));

    // Surface renderer state changes in the log, in the same JSON shape the
    // controller connection consumes off this bus.
    {
        let mut events = bus.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = events.recv().await {
                log::info!("event: {}", event.to_json());
            }
        });
    }

    log::info!(
        "bridge ready (codecs: {}), waiting for renderer callbacks",
        settings.bridge.codecs
    );

    tokio::signal::ctrl_c().await?;
    log::info!("shutting down");

    coordinator.shutdown().await;
    registry.flush_all(soap.as_ref(), &gena).await;

    Ok(())
}

//! Stream coordination: one virtual player per renderer.
//!
//! Owns the per-renderer [`StreamSlots`] pairs (at most one active stream
//! plus one shutting down during a track transition), starts servers, and
//! produces the URLs handed to `SetAVTransportURI`.

use std::sync::Arc;

use dashmap::DashMap;

use crate::context::NetworkContext;
use crate::error::{BridgeError, BridgeResult};
use crate::renderer::registry::DeviceSlot;
use crate::state::BridgeConfig;
use crate::stream::server;
use crate::stream::{StreamHandle, StreamPipeline, StreamSlots};

/// Starts and retires per-track stream servers, keyed by renderer UDN.
pub struct StreamCoordinator {
    network: NetworkContext,
    config: BridgeConfig,
    slots: DashMap<String, StreamSlots>,
}

impl StreamCoordinator {
    /// Creates a coordinator for the given network context and config.
    #[must_use]
    pub fn new(network: NetworkContext, config: BridgeConfig) -> Self {
        Self {
            network,
            config,
            slots: DashMap::new(),
        }
    }

    /// Starts a stream server for `index` on behalf of `device` and returns
    /// the URL the renderer must GET.
    ///
    /// Any previous active stream of this renderer is stopped and moved to
    /// the retiring slot; a handle displaced out of the retiring slot is
    /// joined here, outside the slot map locks.
    pub async fn start_stream(
        &self,
        device: &Arc<DeviceSlot>,
        index: u16,
        pipeline: Arc<StreamPipeline>,
    ) -> BridgeResult<String> {
        let udn = device
            .with_running(|state| state.udn.clone())
            .ok_or_else(|| BridgeError::RendererNotFound("device torn down".to_string()))?;

        let handle = server::start(index, pipeline, &self.config).await?;
        let url = self.network.url_builder(handle.port).stream_url(index);

        let displaced = self.slots.entry(udn).or_default().replace(handle);
        if let Some(old) = displaced {
            old.join().await;
        }

        Ok(url)
    }

    /// Asks the renderer's active stream server to exit; the loop notices
    /// within one poll tick.
    pub fn stop_stream(&self, device: &Arc<DeviceSlot>) {
        let Some(udn) = device.with_running(|state| state.udn.clone()) else {
            return;
        };
        if let Some(slots) = self.slots.get(&udn) {
            if let Some(active) = slots.active() {
                active.stop();
            }
        }
    }

    /// The active stream handle of a renderer, if any.
    #[must_use]
    pub fn active_stream(&self, udn: &str) -> Option<Arc<StreamHandle>> {
        self.slots
            .get(udn)
            .and_then(|slots| slots.active().cloned())
    }

    /// Stops every stream and joins the serving tasks.
    pub async fn shutdown(&self) {
        let mut handles = Vec::new();
        for mut entry in self.slots.iter_mut() {
            handles.extend(entry.value_mut().clear());
        }
        for handle in handles {
            handle.join().await;
        }
    }
}

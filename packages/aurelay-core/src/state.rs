//! Bridge configuration and controller-mirrored playback state.

use serde::{Deserialize, Serialize};

/// Playback state mirrored from the controller side per renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Configuration for the bridge core.
///
/// All fields have defaults suitable for a typical LAN deployment.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BridgeConfig {
    /// Codec tokens offered by the controller, in preference order
    /// (e.g. "flc,mp3,aac,ogg,wav,pcm").
    pub codecs: String,

    /// MIME types accepted regardless of what the renderer advertises.
    /// Useful for renderers with incomplete ProtocolInfo sinks.
    #[serde(default)]
    pub forced_mimetypes: Vec<String>,

    /// Insert ICY metadata blocks into live MP3/AAC streams when the
    /// renderer asks for them.
    pub send_icy: bool,

    /// First TCP port tried when binding a per-track stream server.
    /// Subsequent attempts use sequential ports.
    pub stream_port_base: u16,
}

impl BridgeConfig {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.codecs.trim().is_empty() {
            return Err("codecs must list at least one token".to_string());
        }
        if self.stream_port_base == 0 {
            return Err("stream_port_base must be >= 1".to_string());
        }
        Ok(())
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            codecs: "flc,mp3,aac,ogg,wav,pcm".to_string(),
            forced_mimetypes: Vec::new(),
            send_icy: true,
            stream_port_base: 8700,
        }
    }
}

//! Server configuration: CLI flags layered over an optional YAML file.

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde::Deserialize;

use aurelay_core::BridgeConfig;

/// Headless Aurelay bridge server.
#[derive(Parser, Debug)]
#[command(name = "aurelay-server", version, about)]
pub struct Args {
    /// Path to a YAML configuration file.
    #[arg(short, long, env = "AURELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// IP address renderers can reach this host at (auto-detected when
    /// omitted).
    #[arg(long, env = "AURELAY_ADVERTISE_IP")]
    pub advertise_ip: Option<IpAddr>,

    /// First TCP port tried for per-track stream servers.
    #[arg(long, env = "AURELAY_STREAM_PORT_BASE")]
    pub stream_port_base: Option<u16>,

    /// Disable ICY metadata insertion into live MP3/AAC streams.
    #[arg(long)]
    pub no_icy: bool,

    /// Log filter (same syntax as RUST_LOG).
    #[arg(long, default_value = "info", env = "AURELAY_LOG")]
    pub log: String,
}

/// YAML-file shape; every field optional, CLI wins.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FileConfig {
    pub codecs: Option<String>,
    pub forced_mimetypes: Option<Vec<String>>,
    pub send_icy: Option<bool>,
    pub stream_port_base: Option<u16>,
    pub advertise_ip: Option<IpAddr>,
}

impl FileConfig {
    /// Loads the file if a path was given; no path means all defaults.
    pub fn load(path: Option<&PathBuf>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))
    }
}

/// Resolved settings the server runs with.
pub struct Settings {
    pub bridge: BridgeConfig,
    pub advertise_ip: Option<IpAddr>,
}

/// Merges defaults, file values, and CLI flags (highest precedence last).
pub fn resolve(args: &Args, file: FileConfig) -> anyhow::Result<Settings> {
    let mut bridge = BridgeConfig::default();

    if let Some(codecs) = file.codecs {
        bridge.codecs = codecs;
    }
    if let Some(forced) = file.forced_mimetypes {
        bridge.forced_mimetypes = forced;
    }
    if let Some(send_icy) = file.send_icy {
        bridge.send_icy = send_icy;
    }
    if let Some(port) = file.stream_port_base {
        bridge.stream_port_base = port;
    }

    if let Some(port) = args.stream_port_base {
        bridge.stream_port_base = port;
    }
    if args.no_icy {
        bridge.send_icy = false;
    }

    bridge
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    Ok(Settings {
        bridge,
        advertise_ip: args.advertise_ip.or(file.advertise_ip),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["aurelay-server"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn defaults_are_valid() {
        let settings = resolve(&args(&[]), FileConfig::default()).unwrap();
        assert!(settings.bridge.send_icy);
        assert_eq!(settings.bridge.stream_port_base, 8700);
    }

    #[test]
    fn cli_overrides_file() {
        let file = FileConfig {
            stream_port_base: Some(9000),
            send_icy: Some(true),
            ..Default::default()
        };
        let settings = resolve(&args(&["--stream-port-base", "9100", "--no-icy"]), file).unwrap();
        assert_eq!(settings.bridge.stream_port_base, 9100);
        assert!(!settings.bridge.send_icy);
    }

    #[test]
    fn yaml_file_parses_kebab_case() {
        let file: FileConfig =
            serde_yaml::from_str("codecs: \"flc,mp3\"\nstream-port-base: 9200\n").unwrap();
        assert_eq!(file.codecs.as_deref(), Some("flc,mp3"));
        assert_eq!(file.stream_port_base, Some(9200));
    }
}

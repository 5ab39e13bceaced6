use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::Deserialize;
use strand::logger::LogSettings;
use strand_network::{ClientSettings, Protocol, ServerSettings};
use strand_timing::Millis;
use strand_utils::Label;
use tracing::Level;

use crate::ConfigError;

/// Whole-process configuration, one TOML section per concern:
///
/// ```toml
/// [network.server]
/// server_port = 4199
/// protocol = "tcp"
///
/// [debug]
/// suppress_threads = "CLIENT, FILE_READER"
/// ```
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub network: NetworkConfig,
    pub server: ServerSection,
    pub debug: DebugConfig,
    pub log: LogSection,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    pub server: ServerNet,
    pub client: ClientNet,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerNet {
    pub server_port: u16,
    pub protocol: String,
    pub backoff_max_seconds: i32,
    pub retry_limit: u32,
    pub thread_wait_timeout_ms: i32,
    pub io_timeout_ms: u64,
    pub enable_relay: bool,
    pub peer_queue_label: String,
}

impl Default for ServerNet {
    fn default() -> Self {
        Self {
            server_port: 4199,
            protocol: "tcp".to_string(),
            backoff_max_seconds: 32,
            retry_limit: 10,
            thread_wait_timeout_ms: 5000,
            io_timeout_ms: 1000,
            enable_relay: false,
            peer_queue_label: "CLIENT.SEND".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ClientNet {
    pub enabled: bool,
    pub server_hostname: String,
    pub server_port: u16,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub retry_limit: u32,
    pub io_timeout_ms: u64,
    pub enable_relay: bool,
    pub peer_queue_label: String,
}

impl Default for ClientNet {
    fn default() -> Self {
        Self {
            enabled: false,
            server_hostname: "localhost".to_string(),
            server_port: 4200,
            backoff_initial_ms: 1000,
            backoff_max_ms: 32_000,
            retry_limit: 0,
            io_timeout_ms: 1000,
            enable_relay: false,
            peer_queue_label: "SERVER.SEND".to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    /// When set, a FILE_READER thread seeds the server send queue with
    /// this file's contents.
    pub send_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DebugConfig {
    /// Comma-separated labels that must not be spawned.
    pub suppress_threads: String,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LogSection {
    pub screen: bool,
    pub file: Option<PathBuf>,
    pub level: String,
    pub force_location: bool,
    /// Per-label file sinks: `SERVER = "server.log"`.
    pub files: BTreeMap<String, PathBuf>,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            screen: true,
            file: None,
            level: "info".to_string(),
            force_location: false,
            files: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Loads a TOML config; `None` means run on the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        toml::from_str(&text)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
    }

    /// The suppression list: trimmed, empties discarded.
    pub fn suppress_list(&self) -> Vec<String> {
        self.debug
            .suppress_threads
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn log_settings(&self) -> Result<LogSettings, ConfigError> {
        let level = Level::from_str(&self.log.level)
            .map_err(|_| ConfigError::BadLevel(self.log.level.clone()))?;
        Ok(LogSettings {
            screen: self.log.screen,
            file: self.log.file.clone(),
            label_files: self
                .log
                .files
                .iter()
                .map(|(label, path)| (label.clone(), path.clone()))
                .collect(),
            level,
            force_location: self.log.force_location,
        })
    }

    pub fn server_settings(&self) -> Result<ServerSettings, ConfigError> {
        let net = &self.network.server;
        let protocol = match net.protocol.to_ascii_lowercase().as_str() {
            "tcp" => Protocol::Tcp,
            "udp" => Protocol::Udp,
            _ => return Err(ConfigError::BadProtocol(net.protocol.clone())),
        };
        if net.backoff_max_seconds <= 0 {
            return Err(ConfigError::BadValue("network.server.backoff_max_seconds"));
        }
        if net.thread_wait_timeout_ms <= 0 {
            return Err(ConfigError::BadValue("network.server.thread_wait_timeout_ms"));
        }
        Ok(ServerSettings {
            port: net.server_port,
            protocol,
            backoff_max: Millis::from_secs(net.backoff_max_seconds as u64),
            retry_limit: net.retry_limit,
            thread_wait: Millis(net.thread_wait_timeout_ms as u64),
            io_timeout: Millis(net.io_timeout_ms),
            relay_enabled: net.enable_relay,
            peer_queue: parse_peer_queue(net.enable_relay, &net.peer_queue_label)?,
        })
    }

    pub fn client_settings(&self) -> Result<ClientSettings, ConfigError> {
        let net = &self.network.client;
        Ok(ClientSettings {
            hostname: net.server_hostname.clone(),
            port: net.server_port,
            backoff_initial: Millis(net.backoff_initial_ms.max(1)),
            backoff_max: Millis(net.backoff_max_ms.max(net.backoff_initial_ms)),
            retry_limit: net.retry_limit,
            thread_wait: Millis(self.network.server.thread_wait_timeout_ms.max(1) as u64),
            io_timeout: Millis(net.io_timeout_ms),
            relay_enabled: net.enable_relay,
            peer_queue: parse_peer_queue(net.enable_relay, &net.peer_queue_label)?,
        })
    }
}

fn parse_peer_queue(enabled: bool, label: &str) -> Result<Option<Label>, ConfigError> {
    if !enabled {
        return Ok(None);
    }
    Label::new(label).map(Some).map_err(|_| ConfigError::BadValue("peer_queue_label"))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_match_the_documented_surface() {
        let cfg = Config::default();
        assert_eq!(cfg.network.server.server_port, 4199);
        assert_eq!(cfg.network.server.protocol, "tcp");
        assert_eq!(cfg.network.server.backoff_max_seconds, 32);
        assert_eq!(cfg.network.server.retry_limit, 10);
        assert_eq!(cfg.network.server.thread_wait_timeout_ms, 5000);
        assert!(!cfg.network.server.enable_relay);
        assert_eq!(cfg.network.client.server_hostname, "localhost");
        assert_eq!(cfg.network.client.server_port, 4200);
        assert!(!cfg.network.client.enabled);
        assert!(cfg.server.send_file.is_none());
        assert!(cfg.log.screen);
        assert_eq!(cfg.log.level, "info");
    }

    #[test]
    fn sections_parse() {
        let cfg: Config = toml::from_str(
            r#"
            [network.server]
            server_port = 5000
            protocol = "udp"
            enable_relay = true

            [network.client]
            enabled = true
            server_hostname = "relay.example"

            [server]
            send_file = "outbound.bin"

            [debug]
            suppress_threads = " client ,FILE_READER, "

            [log]
            level = "debug"
            screen = false
            [log.files]
            SERVER = "server.log"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.network.server.server_port, 5000);
        let server = cfg.server_settings().unwrap();
        assert_eq!(server.protocol, Protocol::Udp);
        assert_eq!(server.peer_queue.unwrap().as_str(), "CLIENT.SEND");
        assert_eq!(cfg.suppress_list(), vec!["client".to_string(), "FILE_READER".to_string()]);
        let log = cfg.log_settings().unwrap();
        assert_eq!(log.level, Level::DEBUG);
        assert!(!log.screen);
        assert_eq!(log.label_files.len(), 1);
        assert_eq!(cfg.server.send_file.as_deref(), Some(Path::new("outbound.bin")));
    }

    #[test]
    fn bad_values_are_rejected() {
        let cfg: Config =
            toml::from_str("[network.server]\nprotocol = \"sctp\"\n").unwrap();
        assert!(matches!(cfg.server_settings(), Err(ConfigError::BadProtocol(_))));

        let cfg: Config = toml::from_str("[log]\nlevel = \"noisy\"\n").unwrap();
        assert!(matches!(cfg.log_settings(), Err(ConfigError::BadLevel(_))));

        assert!(toml::from_str::<Config>("[network.server]\nbogus_key = 1\n").is_err());
    }

    #[test]
    fn missing_path_uses_defaults() {
        assert_eq!(Config::load(None).unwrap(), Config::default());
        assert!(matches!(
            Config::load(Some(Path::new("/nonexistent/strand.toml"))),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn loads_from_disk() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[network.server]\nserver_port = 6001").unwrap();
        file.flush().unwrap();
        let cfg = Config::load(Some(file.path())).unwrap();
        assert_eq!(cfg.network.server.server_port, 6001);
        // Untouched sections keep their defaults.
        assert_eq!(cfg.network.client.server_port, 4200);
    }
}

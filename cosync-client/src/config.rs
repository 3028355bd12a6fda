//! Client configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use cosync_core::SessionConfig;
use serde::{Deserialize, Serialize};

/// Top-level configuration for the console client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Where the relay lives and how to reach it.
    pub relay: RelayConfig,
    /// Who this client is.
    pub identity: IdentityConfig,
    /// Session timers.
    pub timing: TimingConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Relay connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub host: String,
    pub port: u16,
    /// Try TLS first, falling back to plain TCP on failure.
    pub tls: bool,
    /// PEM bundle to trust. Empty means the built-in web PKI roots.
    pub certificate: String,
    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

/// Identity announced to the relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub name: String,
    /// Catalog database host, echoed in the announcement.
    pub catalog_host: String,
    pub database: String,
    pub protocol_version: u32,
}

/// Validation and pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// First wait for the relay's validation frame, in seconds.
    pub validation_timeout_secs: u64,
    /// Wait between repeated validation warnings, in seconds.
    pub revalidation_interval_secs: u64,
    /// Pause after every outgoing frame, in milliseconds.
    pub send_pacing_ms: u64,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or `EnvFilter` directive.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: cosync_core::session::DEFAULT_RELAY_PORT,
            tls: true,
            certificate: String::new(),
            connect_timeout_ms: 10_000,
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            name: "analyst".into(),
            catalog_host: "localhost".into(),
            database: "catalog".into(),
            protocol_version: cosync_core::session::DEFAULT_PROTOCOL_VERSION,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            validation_timeout_secs: 10,
            revalidation_interval_secs: 60,
            send_pacing_ms: 50,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ClientConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write default config to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Convert into the core session parameters.
    pub fn to_session_config(&self) -> SessionConfig {
        let certificate = match self.relay.certificate.trim() {
            "" => None,
            path => Some(PathBuf::from(path)),
        };
        SessionConfig {
            identity: self.identity.name.clone(),
            relay_host: self.relay.host.clone(),
            relay_port: self.relay.port,
            use_tls: self.relay.tls,
            certificate,
            catalog_host: self.identity.catalog_host.clone(),
            database: self.identity.database.clone(),
            protocol_version: self.identity.protocol_version,
            connect_timeout: Duration::from_millis(self.relay.connect_timeout_ms.max(100)),
            validation_timeout: Duration::from_secs(self.timing.validation_timeout_secs.max(1)),
            revalidation_interval: Duration::from_secs(
                self.timing.revalidation_interval_secs.max(1),
            ),
            send_pacing: Duration::from_millis(self.timing.send_pacing_ms),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

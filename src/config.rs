//! Configuration types for cirrid.
//!
//! The file is INI by default (`/etc/cirrid.ini`), TOML also works. Top-level
//! keys describe the zone and which sources populate it; `[hosts]` lists
//! explicit entries in file order.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use crate::error::DnsError;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/cirrid.ini";

/// Written by `cirrid init-config` and used when no file exists.
pub const DEFAULT_CONFIG: &str = r#"zone = ona.im

# ask the workload container which stack domain it is serving
ask_workload = true

# also map <hostname>.<zone> to the auto-detected address
use_hostname = true

[hosts]
# host = address
# *.host.zone gets the same address as host.zone unless ".host = address" is also set.
# The address may be an IPv4 literal, a network interface name, or "magic"
# to use the container bridge gateway.
example = magic
"#;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Zone suffix appended to single-label host names (e.g. "ona.im").
    #[serde(default = "default_zone")]
    pub zone: String,

    /// Ask the workload container for its logical name.
    #[serde(default = "default_true", alias = "ask_cirri")]
    pub ask_workload: bool,

    /// Map the local hostname into the zone.
    #[serde(default = "default_true")]
    pub use_hostname: bool,

    /// Explicit host entries: label to address specifier, in file order.
    #[serde(default)]
    pub hosts: IndexMap<String, String>,

    /// DNS server configuration.
    #[serde(default)]
    pub dns: DnsConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// DNS server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// Address for the DNS server to listen on.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Also serve DNS over TCP on `listen_addr`.
    #[serde(default = "default_true")]
    pub tcp: bool,

    /// Seed the built-in `host.ona.im` entry.
    #[serde(default = "default_true")]
    pub bootstrap: bool,

    /// Rewrite the OS resolver configuration to point at this server.
    #[serde(default = "default_true")]
    pub manage_resolver: bool,

    /// Container asked for the workload identity.
    #[serde(default = "default_workload_container")]
    pub workload_container: String,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            tcp: true,
            bootstrap: true,
            manage_resolver: true,
            workload_container: default_workload_container(),
        }
    }
}

impl DnsConfig {
    /// The IP address the OS resolver should be pointed at.
    ///
    /// An unspecified listen address is reported as loopback.
    pub fn nameserver_ip(&self) -> IpAddr {
        match self.listen_addr.ip() {
            ip if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
            ip => ip,
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "cirrid=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus_addr: None,
        }
    }
}

/// Where the base document of a loaded [`Config`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// The file at the requested path.
    File,
    /// The file was missing; [`DEFAULT_CONFIG`] was used.
    BuiltIn,
}

impl Config {
    /// Load configuration from `path`, then `CIRRID_*` environment variables.
    ///
    /// When `path` does not exist, [`DEFAULT_CONFIG`] is used in its place.
    pub fn load(path: &Path) -> Result<Self, DnsError> {
        Self::load_with_source(path).map(|(config, _)| config)
    }

    /// Like [`Config::load`], also reporting which document was used.
    ///
    /// Nothing is logged here; this runs before telemetry is installed.
    pub fn load_with_source(path: &Path) -> Result<(Self, ConfigSource), DnsError> {
        let mut builder = config::Config::builder();

        let source = if path.exists() {
            builder = builder.add_source(config::File::from(path.to_path_buf()));
            ConfigSource::File
        } else {
            builder = builder.add_source(config::File::from_str(
                DEFAULT_CONFIG,
                config::FileFormat::Ini,
            ));
            ConfigSource::BuiltIn
        };

        let config: Config = builder
            .add_source(
                config::Environment::with_prefix("CIRRID")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| DnsError::ConfigurationUnreadable(e.to_string()))?
            .try_deserialize()?;

        Ok((config, source))
    }

    /// Parse configuration from a string in the given format.
    pub fn parse_str(text: &str, format: config::FileFormat) -> Result<Self, DnsError> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(text, format))
            .build()
            .map_err(|e| DnsError::ConfigurationUnreadable(e.to_string()))?
            .try_deserialize()?;
        Ok(config)
    }
}

/// Write [`DEFAULT_CONFIG`] to `path` unless a file is already there.
///
/// Returns `true` if the file was created.
pub fn write_default(path: &Path) -> Result<bool, DnsError> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, DEFAULT_CONFIG)?;
    Ok(true)
}

/// Default configuration path as a `PathBuf`.
pub fn default_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

fn default_zone() -> String {
    "ona.im".to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_workload_container() -> String {
    "cirri".to_string()
}

#[cfg(target_os = "linux")]
fn default_listen_addr() -> SocketAddr {
    // systemd-resolved owns 127.0.0.53; use a neighbouring loopback address.
    SocketAddr::from(([127, 0, 0, 98], 53))
}

#[cfg(not(target_os = "linux"))]
fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 53))
}

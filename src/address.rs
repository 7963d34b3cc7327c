//! Address specifiers and their resolution to concrete IPv4 addresses.

use async_trait::async_trait;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::DnsError;

/// Address used when an interface or the container bridge cannot be queried.
pub const DEFAULT_CONTAINER_ADDR: Ipv4Addr = Ipv4Addr::new(172, 17, 0, 1);

/// Configuration values that mean "work it out for me".
const AUTO_KEYWORDS: [&str; 2] = ["magic", "auto"];

/// How the address for a name table entry is obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressSpec {
    /// A literal IPv4 address, parsed at resolution time.
    Literal(String),
    /// The IPv4 address of a named network interface.
    Interface(String),
    /// Platform default: the container bridge gateway, or
    /// [`DEFAULT_CONTAINER_ADDR`].
    Auto,
}

impl AddressSpec {
    /// Classify a configured value.
    ///
    /// `magic`/`auto` and empty values become [`AddressSpec::Auto`], names found in
    /// `known_interfaces` become [`AddressSpec::Interface`], anything else is
    /// treated as a literal.
    pub fn classify(value: &str, known_interfaces: &[String]) -> Self {
        let value = value.trim();
        if value.is_empty()
            || AUTO_KEYWORDS
                .iter()
                .any(|keyword| value.eq_ignore_ascii_case(keyword))
        {
            return Self::Auto;
        }
        if known_interfaces.iter().any(|name| name == value) {
            return Self::Interface(value.to_string());
        }
        Self::Literal(value.to_string())
    }
}

impl fmt::Display for AddressSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(ip) => write!(f, "literal {ip}"),
            Self::Interface(name) => write!(f, "interface {name}"),
            Self::Auto => f.write_str("auto"),
        }
    }
}

/// Network introspection used to resolve interface and auto specifiers.
///
/// Implementations must bound every call with their own timeout.
#[async_trait]
pub trait NetworkProbe: Send + Sync {
    /// Names of the network interfaces present on this host.
    async fn interface_names(&self) -> Vec<String>;

    /// The first IPv4 address bound to `name`.
    async fn interface_addr(&self, name: &str) -> Result<Ipv4Addr, DnsError>;

    /// The gateway address of the local container bridge.
    async fn bridge_gateway(&self) -> Result<Ipv4Addr, DnsError>;
}

/// Turns [`AddressSpec`]s into addresses using a [`NetworkProbe`].
#[derive(Clone)]
pub struct AddressResolver {
    probe: Arc<dyn NetworkProbe>,
}

impl AddressResolver {
    /// Create a resolver backed by `probe`.
    pub fn new(probe: Arc<dyn NetworkProbe>) -> Self {
        Self { probe }
    }

    /// Interface names known to the probe, used by [`AddressSpec::classify`].
    pub async fn known_interfaces(&self) -> Vec<String> {
        self.probe.interface_names().await
    }

    /// Resolve a specifier.
    ///
    /// `Auto` never fails; it falls back to [`DEFAULT_CONTAINER_ADDR`].
    pub async fn resolve(&self, spec: &AddressSpec) -> Result<Ipv4Addr, DnsError> {
        match spec {
            AddressSpec::Literal(text) => text
                .trim()
                .parse::<Ipv4Addr>()
                .map_err(|_| DnsError::InvalidAddress(text.clone())),
            AddressSpec::Interface(name) => {
                let addr = self
                    .probe
                    .interface_addr(name)
                    .await
                    .map_err(|e| match e {
                        e @ DnsError::ResolutionUnavailable { .. } => e,
                        other => DnsError::unavailable(format!("interface {name}"), other),
                    })?;
                debug!(interface = %name, %addr, "resolved interface address");
                Ok(addr)
            }
            AddressSpec::Auto => match self.probe.bridge_gateway().await {
                Ok(addr) => {
                    debug!(%addr, "using container bridge gateway");
                    Ok(addr)
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        fallback = %DEFAULT_CONTAINER_ADDR,
                        "bridge gateway unavailable, using default address"
                    );
                    Ok(DEFAULT_CONTAINER_ADDR)
                }
            },
        }
    }

    /// Resolve, falling back to [`DEFAULT_CONTAINER_ADDR`] when the address is
    /// unavailable. Invalid literals are still reported.
    pub async fn resolve_or_default(&self, spec: &AddressSpec) -> Result<Ipv4Addr, DnsError> {
        match self.resolve(spec).await {
            Err(e @ DnsError::ResolutionUnavailable { .. }) => {
                warn!(
                    spec = %spec,
                    error = %e,
                    fallback = %DEFAULT_CONTAINER_ADDR,
                    "address unavailable, using default"
                );
                Ok(DEFAULT_CONTAINER_ADDR)
            }
            other => other,
        }
    }
}

/// A probe with fixed answers, for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    /// Interface name to address.
    pub interfaces: Vec<(String, Ipv4Addr)>,
    /// Bridge gateway, `None` when unavailable.
    pub gateway: Option<Ipv4Addr>,
}

#[async_trait]
impl NetworkProbe for StaticProbe {
    async fn interface_names(&self) -> Vec<String> {
        self.interfaces.iter().map(|(name, _)| name.clone()).collect()
    }

    async fn interface_addr(&self, name: &str) -> Result<Ipv4Addr, DnsError> {
        self.interfaces
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, addr)| *addr)
            .ok_or_else(|| DnsError::unavailable(format!("interface {name}"), "no such interface"))
    }

    async fn bridge_gateway(&self) -> Result<Ipv4Addr, DnsError> {
        self.gateway
            .ok_or_else(|| DnsError::unavailable("auto", "no bridge gateway"))
    }
}

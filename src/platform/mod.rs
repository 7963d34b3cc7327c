//! OS resolver reconciliation.
//!
//! Routes queries for the table's base names to this server, then resets the
//! host's resolver services so the change takes effect. The implementation
//! is picked at build time by [`system_reconciler`].

use async_trait::async_trait;
use std::net::SocketAddr;
use tracing::{debug, warn};

use crate::domain::DomainKey;
use crate::error::DnsError;

pub mod linux;
pub mod macos;

pub use linux::ResolvedReconciler;
pub use macos::ResolverDirReconciler;

/// Points the host resolver at this server.
#[async_trait]
pub trait ResolverReconciler: Send + Sync {
    /// Short name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Persist routing of `domains` (base names, no trailing dot) to
    /// `nameserver`. Must not rewrite anything that is already correct.
    async fn apply(&self, nameserver: SocketAddr, domains: &[String]) -> Result<(), DnsError>;

    /// Restart or flush the host resolver services.
    async fn reset_services(&self) -> Result<(), DnsError>;
}

/// Does nothing. Used where the host has no supported resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReconciler;

#[async_trait]
impl ResolverReconciler for NoopReconciler {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn apply(&self, nameserver: SocketAddr, domains: &[String]) -> Result<(), DnsError> {
        debug!(%nameserver, domains = domains.len(), "resolver reconciliation not supported here");
        Ok(())
    }

    async fn reset_services(&self) -> Result<(), DnsError> {
        Ok(())
    }
}

/// The reconciler for the platform this binary was built for.
#[cfg(target_os = "linux")]
pub fn system_reconciler() -> Box<dyn ResolverReconciler> {
    Box::new(ResolvedReconciler::default())
}

/// The reconciler for the platform this binary was built for.
#[cfg(target_os = "macos")]
pub fn system_reconciler() -> Box<dyn ResolverReconciler> {
    Box::new(ResolverDirReconciler::default())
}

/// The reconciler for the platform this binary was built for.
#[cfg(not(any(target_os = "linux", target_os = "macos")))]
pub fn system_reconciler() -> Box<dyn ResolverReconciler> {
    Box::new(NoopReconciler)
}

/// Valid base names in the order given, without duplicates.
pub(crate) fn dedup_domains(domains: &[String]) -> Vec<&str> {
    let mut seen = Vec::with_capacity(domains.len());
    for raw in domains {
        let domain = raw.trim_start_matches("*.").trim_matches('.');
        if domain.is_empty() || seen.contains(&domain) {
            continue;
        }
        if let Err(error) = DomainKey::exact(domain) {
            warn!(domain = %raw, %error, "not routing invalid domain");
            continue;
        }
        seen.push(domain);
    }
    seen
}

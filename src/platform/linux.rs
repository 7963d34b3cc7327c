//! systemd-resolved reconciliation.
//!
//! Sets `DNS=` and `Domains=~a ~b ..` in `resolved.conf`, which makes
//! systemd-resolved route those domains (and their subdomains) to us. The
//! file is assumed to hold only a `[Resolve]` section.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn};

use super::{dedup_domains, ResolverReconciler};
use crate::error::DnsError;
use crate::system::run_command;

/// Default systemd-resolved configuration file.
pub const RESOLVED_CONF: &str = "/etc/systemd/resolved.conf";

/// Reconciler for hosts running systemd-resolved.
#[derive(Debug, Clone)]
pub struct ResolvedReconciler {
    conf_path: PathBuf,
    restart_services: bool,
}

impl Default for ResolvedReconciler {
    fn default() -> Self {
        Self::new(RESOLVED_CONF)
    }
}

impl ResolvedReconciler {
    /// Reconcile the configuration file at `conf_path`.
    pub fn new(conf_path: impl Into<PathBuf>) -> Self {
        Self {
            conf_path: conf_path.into(),
            restart_services: true,
        }
    }

    /// Skip restarting systemd-resolved in [`ResolverReconciler::reset_services`].
    pub fn without_service_reset(mut self) -> Self {
        self.restart_services = false;
        self
    }
}

#[async_trait]
impl ResolverReconciler for ResolvedReconciler {
    fn name(&self) -> &'static str {
        "systemd-resolved"
    }

    async fn apply(&self, nameserver: SocketAddr, domains: &[String]) -> Result<(), DnsError> {
        let dns_line = dns_line(nameserver);
        let domains_line = domains_line(domains);

        let current = match tokio::fs::read_to_string(&self.conf_path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %self.conf_path.display(), "resolved.conf missing, creating it");
                "[Resolve]\n".to_string()
            }
            Err(e) => return Err(e.into()),
        };

        match patch_resolved_conf(&current, &dns_line, &domains_line) {
            Some(updated) => {
                info!(
                    path = %self.conf_path.display(),
                    dns = %dns_line,
                    domains = %domains_line,
                    "updating resolver configuration"
                );
                tokio::fs::write(&self.conf_path, updated).await?;
            }
            None => info!(path = %self.conf_path.display(), "resolver configuration up to date"),
        }
        Ok(())
    }

    async fn reset_services(&self) -> Result<(), DnsError> {
        if !self.restart_services {
            return Ok(());
        }
        run_command("systemctl", &["restart", "systemd-resolved"]).await?;
        run_command("resolvectl", &["flush-caches"]).await?;
        info!("systemd-resolved restarted and caches flushed");
        Ok(())
    }
}

/// `DNS=` line for `nameserver`. Port 53 is implied.
fn dns_line(nameserver: SocketAddr) -> String {
    if nameserver.port() == 53 {
        format!("DNS={}", nameserver.ip())
    } else {
        format!("DNS={nameserver}")
    }
}

/// `Domains=` line routing each base name to us.
fn domains_line(domains: &[String]) -> String {
    let routed: Vec<String> = dedup_domains(domains)
        .into_iter()
        .map(|d| format!("~{d}"))
        .collect();
    format!("Domains={}", routed.join(" "))
}

/// Replace the first `DNS=` and `Domains=` lines of `text`, appending them when
/// absent. Returns `None` if `text` already matches.
pub fn patch_resolved_conf(text: &str, dns_line: &str, domains_line: &str) -> Option<String> {
    let mut changed = false;
    let mut dns_written = false;
    let mut domains_written = false;
    let mut lines: Vec<&str> = Vec::new();

    for line in text.lines() {
        if line.starts_with("DNS=") && !dns_written {
            changed |= line != dns_line;
            lines.push(dns_line);
            dns_written = true;
        } else if line.starts_with("Domains=") && !domains_written {
            changed |= line != domains_line;
            lines.push(domains_line);
            domains_written = true;
        } else {
            lines.push(line);
        }
    }

    if !dns_written {
        changed = true;
        lines.push(dns_line);
    }
    if !domains_written {
        changed = true;
        lines.push(domains_line);
    }

    if !changed {
        return None;
    }

    let mut out = lines.join("\n");
    out.push('\n');
    Some(out)
}

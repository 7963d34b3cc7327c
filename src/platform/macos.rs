//! `/etc/resolver` reconciliation.
//!
//! macOS consults `/etc/resolver/<domain>` for queries under `<domain>`. One
//! file per base name points the system resolver at this server.

use async_trait::async_trait;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::{dedup_domains, ResolverReconciler};
use crate::address::DEFAULT_CONTAINER_ADDR;
use crate::error::DnsError;
use crate::system::run_command;

/// Default directory of per-domain resolver files.
pub const RESOLVER_DIR: &str = "/etc/resolver";

/// Reconciler for macOS hosts.
#[derive(Debug, Clone)]
pub struct ResolverDirReconciler {
    dir: PathBuf,
    loopback_alias: Option<Ipv4Addr>,
    restart_services: bool,
}

impl Default for ResolverDirReconciler {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(RESOLVER_DIR),
            loopback_alias: Some(DEFAULT_CONTAINER_ADDR),
            restart_services: true,
        }
    }
}

impl ResolverDirReconciler {
    /// Write resolver files into `dir`, leaving host services alone.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            loopback_alias: None,
            restart_services: false,
        }
    }
}

#[async_trait]
impl ResolverReconciler for ResolverDirReconciler {
    fn name(&self) -> &'static str {
        "resolver-dir"
    }

    /// Writes one file per base name. A file that cannot be read or written
    /// is logged and skipped; the first such error is returned once every
    /// other file has been handled.
    async fn apply(&self, nameserver: SocketAddr, domains: &[String]) -> Result<(), DnsError> {
        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            warn!(dir = %self.dir.display(), error = %e, "could not create resolver directory");
        }

        let mut first_error = None;
        for domain in dedup_domains(domains) {
            let path = self.dir.join(domain);
            if let Err(e) = update_resolver_file(&path, nameserver).await {
                warn!(path = %path.display(), error = %e, "could not update resolver file");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn reset_services(&self) -> Result<(), DnsError> {
        if self.restart_services {
            let commands: [(&str, &[&str]); 2] = [
                ("dscacheutil", &["-flushcache"]),
                ("killall", &["-HUP", "mDNSResponder"]),
            ];
            for (program, args) in commands {
                if let Err(e) = run_command(program, args).await {
                    warn!(error = %e, "resolver service reset step failed");
                }
            }
        }

        // Containers run in a VM; alias the bridge address onto loopback so
        // the workload's published ports answer on it.
        if let Some(alias) = self.loopback_alias {
            let alias = alias.to_string();
            if let Err(e) = run_command("ifconfig", &["lo0", "alias", &alias]).await {
                warn!(error = %e, %alias, "could not alias loopback address");
            }
        }
        Ok(())
    }
}

async fn update_resolver_file(path: &Path, nameserver: SocketAddr) -> Result<(), DnsError> {
    let current = match tokio::fs::read_to_string(path).await {
        Ok(text) => Some(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };

    match patch_resolver_file(current.as_deref(), nameserver) {
        Some(updated) => {
            info!(path = %path.display(), %nameserver, "updating resolver file");
            tokio::fs::write(path, updated).await?;
        }
        None => info!(path = %path.display(), "resolver file up to date"),
    }
    Ok(())
}

/// Ensure `existing` has `nameserver <ip>` (and `port <n>` for a non-standard
/// port). Returns `None` if nothing needs writing.
pub fn patch_resolver_file(existing: Option<&str>, nameserver: SocketAddr) -> Option<String> {
    let ns_line = format!("nameserver {}", nameserver.ip());
    let port_line = (nameserver.port() != 53).then(|| format!("port {}", nameserver.port()));

    let mut changed = existing.is_none();
    let mut ns_written = false;
    let mut port_written = false;
    let mut lines: Vec<String> = Vec::new();

    for line in existing.unwrap_or_default().lines() {
        if line.starts_with("nameserver ") && !ns_written {
            changed |= line != ns_line;
            lines.push(ns_line.clone());
            ns_written = true;
        } else if line.starts_with("port ") && !port_written {
            port_written = true;
            match &port_line {
                Some(port_line) => {
                    changed |= line != port_line;
                    lines.push(port_line.clone());
                }
                None => changed = true,
            }
        } else {
            lines.push(line.to_string());
        }
    }

    if !ns_written {
        changed = true;
        lines.push(ns_line);
    }
    if let (Some(port_line), false) = (port_line, port_written) {
        changed = true;
        lines.push(port_line);
    }

    if !changed {
        return None;
    }

    let mut out = lines.join("\n");
    out.push('\n');
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ns(addr: &str) -> SocketAddr {
        addr.parse().unwrap()
    }

    #[test]
    fn test_new_file() {
        assert_eq!(
            patch_resolver_file(None, ns("127.0.0.1:53")).unwrap(),
            "nameserver 127.0.0.1\n"
        );
        assert_eq!(
            patch_resolver_file(None, ns("127.0.0.1:5353")).unwrap(),
            "nameserver 127.0.0.1\nport 5353\n"
        );
    }

    #[test]
    fn test_existing_file_replaced_line() {
        let existing = "# managed\nnameserver 10.0.0.1\n";
        assert_eq!(
            patch_resolver_file(Some(existing), ns("127.0.0.1:53")).unwrap(),
            "# managed\nnameserver 127.0.0.1\n"
        );
    }

    #[test]
    fn test_up_to_date_file() {
        assert!(patch_resolver_file(Some("nameserver 127.0.0.1\n"), ns("127.0.0.1:53")).is_none());
        assert!(patch_resolver_file(
            Some("nameserver 127.0.0.1\nport 5353\n"),
            ns("127.0.0.1:5353")
        )
        .is_none());
    }

    #[test]
    fn test_stale_port_dropped() {
        assert_eq!(
            patch_resolver_file(Some("nameserver 127.0.0.1\nport 5353\n"), ns("127.0.0.1:53"))
                .unwrap(),
            "nameserver 127.0.0.1\n"
        );
    }

    #[tokio::test]
    async fn test_apply_one_file_per_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let resolver_dir = dir.path().join("resolver");
        let reconciler = ResolverDirReconciler::in_dir(&resolver_dir);

        let domains = vec![
            "host.ona.im".to_string(),
            "*.host.ona.im".to_string(),
            "box1.ona.im".to_string(),
        ];
        reconciler.apply(ns("127.0.0.1:53"), &domains).await.unwrap();

        let mut files: Vec<String> = std::fs::read_dir(&resolver_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        assert_eq!(files, vec!["box1.ona.im", "host.ona.im"]);
        assert_eq!(
            std::fs::read_to_string(resolver_dir.join("host.ona.im")).unwrap(),
            "nameserver 127.0.0.1\n"
        );

        reconciler.reset_services().await.unwrap();
    }

    #[tokio::test]
    async fn test_apply_continues_past_unwritable_file() {
        let dir = tempfile::tempdir().unwrap();
        let resolver_dir = dir.path().join("resolver");
        // A directory where the file should go makes that one write fail.
        std::fs::create_dir_all(resolver_dir.join("bad.ona.im")).unwrap();
        let reconciler = ResolverDirReconciler::in_dir(&resolver_dir);

        let domains = vec![
            "bad.ona.im".to_string(),
            "good.ona.im".to_string(),
            "host.ona.im".to_string(),
        ];
        let result = reconciler.apply(ns("127.0.0.1:53"), &domains).await;

        assert!(matches!(result, Err(DnsError::Io(_))));
        for name in ["good.ona.im", "host.ona.im"] {
            assert_eq!(
                std::fs::read_to_string(resolver_dir.join(name)).unwrap(),
                "nameserver 127.0.0.1\n"
            );
        }
    }

    #[tokio::test]
    async fn test_apply_never_leaves_resolver_dir() {
        let dir = tempfile::tempdir().unwrap();
        let resolver_dir = dir.path().join("resolver");
        let reconciler = ResolverDirReconciler::in_dir(&resolver_dir);

        let domains = vec!["../escape".to_string(), "host.ona.im".to_string()];
        reconciler.apply(ns("127.0.0.1:53"), &domains).await.unwrap();

        assert!(!dir.path().join("escape").exists());
        assert!(resolver_dir.join("host.ona.im").exists());
    }
}

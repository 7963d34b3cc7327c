//! Builds a name table from configuration and host identity.
//!
//! Sources are applied in a fixed order, later ones overriding earlier ones:
//!
//! 1. built-in bootstrap entry
//! 2. workload identity (`ask_workload`)
//! 3. local hostname (`use_hostname`)
//! 4. `[hosts]` entries, in file order
//!
//! followed by wildcard completion. A source that fails is logged and skipped.

use async_trait::async_trait;
use std::net::Ipv4Addr;
use tracing::{debug, info, warn};

use crate::address::{AddressResolver, AddressSpec};
use crate::config::Config;
use crate::error::DnsError;
use crate::metrics::{self, ReconcileResult};
use crate::table::NameTable;

/// Bootstrap entry used for self-tests (`dig @127.0.0.98 host.ona.im`).
pub const BOOTSTRAP_HOST: &str = "host.ona.im";

/// Address of [`BOOTSTRAP_HOST`].
pub const BOOTSTRAP_ADDR: Ipv4Addr = Ipv4Addr::new(104, 198, 14, 52);

/// Identity of this machine and the workload it hosts.
#[async_trait]
pub trait HostIdentity: Send + Sync {
    /// The machine hostname, without domain suffix.
    async fn hostname(&self) -> Result<String, DnsError>;

    /// The workload's logical base name. `Ok(None)` when it has none.
    async fn workload_name(&self) -> Result<Option<String>, DnsError>;
}

/// A source or entry that could not be applied.
#[derive(Debug)]
pub struct EntryFailure {
    /// Which source or host entry failed.
    pub name: String,
    /// The underlying error.
    pub error: DnsError,
}

/// Result of a successful reconciliation pass.
#[derive(Debug)]
pub struct Population {
    /// The completed table, ready to publish.
    pub table: NameTable,
    /// Entries that were skipped.
    pub failures: Vec<EntryFailure>,
}

/// Runs the population pipeline.
pub struct Reconciler<'a> {
    config: &'a Config,
    resolver: &'a AddressResolver,
    identity: &'a dyn HostIdentity,
}

impl<'a> Reconciler<'a> {
    /// Create a reconciler for one pass.
    pub fn new(
        config: &'a Config,
        resolver: &'a AddressResolver,
        identity: &'a dyn HostIdentity,
    ) -> Self {
        Self {
            config,
            resolver,
            identity,
        }
    }

    /// Build a fresh table.
    ///
    /// Fails with [`DnsError::ConfigurationUnreadable`] only when sources
    /// failed and nothing at all was added.
    pub async fn populate(&self) -> Result<Population, DnsError> {
        let zone = self.config.zone.as_str();
        let mut table = NameTable::new();
        let mut failures = Vec::new();

        if self.config.dns.bootstrap {
            table.put_host(BOOTSTRAP_HOST, BOOTSTRAP_ADDR)?;
        }

        if self.config.ask_workload {
            match self.identity.workload_name().await {
                Ok(Some(name)) if !name.trim().is_empty() => {
                    info!(workload = %name, "adding workload name");
                    self.add(&mut table, &mut failures, &name, &AddressSpec::Auto)
                        .await;
                }
                Ok(_) => debug!("workload reported no name"),
                Err(error) => {
                    warn!(error = %error, "could not query workload identity");
                    failures.push(EntryFailure {
                        name: "workload".to_string(),
                        error,
                    });
                }
            }
        }

        if self.config.use_hostname {
            match self.identity.hostname().await {
                Ok(hostname) => {
                    info!(hostname = %hostname, zone, "adding local hostname");
                    self.add(&mut table, &mut failures, &hostname, &AddressSpec::Auto)
                        .await;
                }
                Err(error) => {
                    warn!(error = %error, "could not determine hostname");
                    failures.push(EntryFailure {
                        name: "hostname".to_string(),
                        error,
                    });
                }
            }
        }

        if !self.config.hosts.is_empty() {
            let interfaces = self.resolver.known_interfaces().await;
            for (host, value) in &self.config.hosts {
                let spec = AddressSpec::classify(value, &interfaces);
                self.add(&mut table, &mut failures, host, &spec).await;
            }
        }

        table.complete_wildcards();

        let result = if !table.is_empty() {
            ReconcileResult::Populated
        } else if failures.is_empty() {
            ReconcileResult::Empty
        } else {
            ReconcileResult::Failed
        };
        metrics::record_reconcile(result, failures.len());

        match result {
            ReconcileResult::Populated => {
                info!(
                    entries = table.len(),
                    skipped = failures.len(),
                    "name table populated"
                );
                Ok(Population { table, failures })
            }
            ReconcileResult::Empty => {
                warn!(error = %DnsError::EmptyTable, "every query will get an empty answer");
                Ok(Population { table, failures })
            }
            ReconcileResult::Failed => {
                let causes: Vec<String> = failures
                    .iter()
                    .map(|f| format!("{}: {}", f.name, f.error))
                    .collect();
                Err(DnsError::ConfigurationUnreadable(causes.join("; ")))
            }
        }
    }

    /// Add one host, recording rather than propagating failures.
    async fn add(
        &self,
        table: &mut NameTable,
        failures: &mut Vec<EntryFailure>,
        host: &str,
        spec: &AddressSpec,
    ) {
        match table
            .put_with_zone(self.resolver, host, &self.config.zone, spec)
            .await
        {
            Ok(key) => debug!(host, key = %key, spec = %spec, "host entry added"),
            Err(error) => {
                warn!(host, spec = %spec, error = %error, "skipping host entry");
                failures.push(EntryFailure {
                    name: host.to_string(),
                    error,
                });
            }
        }
    }
}

/// A [`HostIdentity`] with fixed answers, for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    /// Reported hostname; `None` makes `hostname()` fail.
    pub hostname: Option<String>,
    /// Reported workload name.
    pub workload: Option<String>,
}

#[async_trait]
impl HostIdentity for StaticIdentity {
    async fn hostname(&self) -> Result<String, DnsError> {
        self.hostname
            .clone()
            .ok_or_else(|| DnsError::unavailable("hostname", "not set"))
    }

    async fn workload_name(&self) -> Result<Option<String>, DnsError> {
        Ok(self.workload.clone())
    }
}

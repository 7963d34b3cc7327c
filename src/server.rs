//! DNS server setup and lifecycle management.

use hickory_server::ServerFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::address::{AddressResolver, NetworkProbe};
use crate::config::Config;
use crate::error::DnsError;
use crate::metrics;
use crate::platform::{self, NoopReconciler, ResolverReconciler};
use crate::reconcile::{HostIdentity, Population, Reconciler};
use crate::responder::ZoneResponder;
use crate::state::DnsState;
use crate::system::{SystemIdentity, SystemProbe};

/// Interval for emitting state metrics.
const METRICS_INTERVAL: Duration = Duration::from_secs(10);

/// Interval between "still running" log lines.
const LIVENESS_INTERVAL: Duration = Duration::from_secs(6 * 60 * 60);

/// Idle timeout for DNS over TCP connections.
const TCP_TIMEOUT: Duration = Duration::from_secs(30);

/// Emit metrics, log liveness, and reload on SIGHUP until cancelled.
async fn housekeeping_loop(server: DnsServer, cancel: CancellationToken) {
    let mut metrics_interval = tokio::time::interval(METRICS_INTERVAL);
    let mut liveness_interval =
        tokio::time::interval_at(Instant::now() + LIVENESS_INTERVAL, LIVENESS_INTERVAL);
    let mut hangup = Hangup::new();
    let started = Instant::now();

    loop {
        tokio::select! {
            _ = metrics_interval.tick() => {
                server.state.emit_metrics();
                debug!(
                    entries = server.state.snapshot().len(),
                    generation = server.state.generation(),
                    "emitted state metrics"
                );
            }
            _ = liveness_interval.tick() => {
                info!(
                    uptime_hours = started.elapsed().as_secs() / 3600,
                    entries = server.state.snapshot().len(),
                    "cirrid still running"
                );
            }
            _ = hangup.recv() => {
                info!("SIGHUP received, rebuilding name table");
                match server.reload().await {
                    Ok(entries) => info!(entries, "name table reloaded"),
                    Err(e) => error!(error = %e, "reload failed, keeping previous table"),
                }
            }
            _ = cancel.cancelled() => {
                debug!("housekeeping loop shutting down");
                return;
            }
        }
    }
}

/// SIGHUP listener; never fires where signals are unsupported.
#[cfg(unix)]
struct Hangup(Option<tokio::signal::unix::Signal>);

#[cfg(unix)]
impl Hangup {
    fn new() -> Self {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::hangup()) {
            Ok(signal) => Self(Some(signal)),
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGHUP, reload disabled");
                Self(None)
            }
        }
    }

    async fn recv(&mut self) {
        match self.0.as_mut() {
            Some(signal) => {
                if signal.recv().await.is_none() {
                    self.0 = None;
                    std::future::pending::<()>().await;
                }
            }
            None => std::future::pending::<()>().await,
        }
    }
}

#[cfg(not(unix))]
struct Hangup;

#[cfg(not(unix))]
impl Hangup {
    fn new() -> Self {
        Self
    }

    async fn recv(&mut self) {
        std::future::pending::<()>().await
    }
}

/// Host DNS daemon: owns the configuration, the published table and the
/// collaborators used to rebuild it.
#[derive(Clone)]
pub struct DnsServer {
    config: Config,
    state: DnsState,
    resolver: AddressResolver,
    identity: Arc<dyn HostIdentity>,
    reconciler: Arc<dyn ResolverReconciler>,
}

impl DnsServer {
    /// Create a server using the host's own probes and resolver integration.
    pub fn new(config: Config) -> Self {
        let reconciler: Arc<dyn ResolverReconciler> = if config.dns.manage_resolver {
            Arc::from(platform::system_reconciler())
        } else {
            Arc::new(NoopReconciler)
        };
        let identity = Arc::new(SystemIdentity::new(config.dns.workload_container.clone()));

        Self::with_collaborators(config, Arc::new(SystemProbe), identity, reconciler)
    }

    /// Create a server with explicit collaborators.
    pub fn with_collaborators(
        config: Config,
        probe: Arc<dyn NetworkProbe>,
        identity: Arc<dyn HostIdentity>,
        reconciler: Arc<dyn ResolverReconciler>,
    ) -> Self {
        Self {
            config,
            state: DnsState::new(),
            resolver: AddressResolver::new(probe),
            identity,
            reconciler,
        }
    }

    /// Get a reference to the DNS state.
    pub fn state(&self) -> &DnsState {
        &self.state
    }

    /// Build a fresh table without publishing it.
    pub async fn populate(&self) -> Result<Population, DnsError> {
        Reconciler::new(&self.config, &self.resolver, self.identity.as_ref())
            .populate()
            .await
    }

    /// Rebuild and publish the table, then re-point the OS resolver.
    ///
    /// On failure the previously published table stays in place.
    pub async fn reload(&self) -> Result<usize, DnsError> {
        let population = self.populate().await?;
        let entries = population.table.len();
        self.state.publish(population.table);
        self.configure_resolver().await;
        self.reset_resolver_services().await;
        Ok(entries)
    }

    /// Route the table's base names to this server. Failures are logged.
    pub async fn configure_resolver(&self) {
        let nameserver = std::net::SocketAddr::new(
            self.config.dns.nameserver_ip(),
            self.config.dns.listen_addr.port(),
        );
        let domains: Vec<String> = self
            .state
            .snapshot()
            .base_names()
            .into_iter()
            .map(|(name, _)| name)
            .collect();

        if let Err(e) = self.reconciler.apply(nameserver, &domains).await {
            warn!(
                reconciler = self.reconciler.name(),
                error = %e,
                "could not configure OS resolver"
            );
            metrics::record_os_reconcile_failure("apply");
        }
    }

    /// Restart or flush the OS resolver. Failures are logged.
    pub async fn reset_resolver_services(&self) {
        if let Err(e) = self.reconciler.reset_services().await {
            warn!(
                reconciler = self.reconciler.name(),
                error = %e,
                "could not reset OS resolver services"
            );
            metrics::record_os_reconcile_failure("reset");
        }
    }

    /// Run the DNS server until `cancel` is triggered.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), DnsError> {
        info!(
            listen_addr = %self.config.dns.listen_addr,
            zone = %self.config.zone,
            reconciler = self.reconciler.name(),
            "Starting cirrid"
        );

        let population = self.populate().await?;
        for failure in &population.failures {
            debug!(entry = %failure.name, error = %failure.error, "entry skipped during population");
        }
        self.state.publish(population.table);

        if cancel.is_cancelled() {
            info!("Shutdown requested before the server started");
            return Ok(());
        }

        self.configure_resolver().await;

        let mut server = ServerFuture::new(ZoneResponder::new(self.state.clone()));

        // Bind UDP
        let listen_addr = self.config.dns.listen_addr;
        let udp_socket = UdpSocket::bind(listen_addr).await?;
        info!(addr = %listen_addr, "DNS UDP listening");
        server.register_socket(udp_socket);

        // Bind TCP
        if self.config.dns.tcp {
            let tcp_listener = TcpListener::bind(listen_addr).await?;
            info!(addr = %listen_addr, "DNS TCP listening");
            server.register_listener(tcp_listener, TCP_TIMEOUT);
        }

        self.reset_resolver_services().await;

        info!(
            zone = %self.config.zone,
            entries = self.state.snapshot().len(),
            "DNS server ready to serve queries"
        );

        // Emit initial metrics
        self.state.emit_metrics();

        let housekeeping = tokio::spawn(housekeeping_loop(self.clone(), cancel.clone()));

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("DNS server shutdown requested");
            }
            result = server.block_until_done() => {
                if let Err(e) = result {
                    error!("DNS server error: {}", e);
                }
                cancel.cancel();
            }
        }

        let _ = housekeeping.await;

        info!("DNS server stopped");
        Ok(())
    }
}

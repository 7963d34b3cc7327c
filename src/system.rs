//! Host introspection backed by local commands.
//!
//! Every external command is bounded by [`COMMAND_TIMEOUT`]; callers get a
//! [`DnsError::Command`] instead of blocking reconciliation.

use async_trait::async_trait;
use serde::Deserialize;
use std::net::Ipv4Addr;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, trace};

#[cfg(not(target_os = "linux"))]
use crate::address::DEFAULT_CONTAINER_ADDR;
use crate::address::NetworkProbe;
use crate::error::DnsError;
use crate::reconcile::HostIdentity;

/// Upper bound on any single external command.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Environment variable carrying the workload's stack domain.
const STACKDOMAIN_VAR: &str = "STACKDOMAIN";

/// Run `program args..` and return its stdout.
///
/// Non-zero exit, spawn failure and timeout are all reported as
/// [`DnsError::Command`].
pub async fn run_command(program: &str, args: &[&str]) -> Result<String, DnsError> {
    let command_line = std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ");
    debug!(command = %command_line, "exec");

    let fail = |reason: String| DnsError::Command {
        command: command_line.clone(),
        reason,
    };

    let output = tokio::time::timeout(
        COMMAND_TIMEOUT,
        Command::new(program).args(args).kill_on_drop(true).output(),
    )
    .await
    .map_err(|_| fail(format!("timed out after {:?}", COMMAND_TIMEOUT)))?
    .map_err(|e| fail(e.to_string()))?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        trace!(command = %command_line, stderr = %stderr.trim(), "command stderr");
    }

    if !output.status.success() {
        return Err(fail(format!("{}: {}", output.status, stderr.trim())));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// [`NetworkProbe`] using `ip`/`ifconfig` and the docker CLI.
#[derive(Debug, Clone, Default)]
pub struct SystemProbe;

#[async_trait]
impl NetworkProbe for SystemProbe {
    async fn interface_names(&self) -> Vec<String> {
        match list_interfaces().await {
            Ok(names) => names,
            Err(e) => {
                debug!(error = %e, "could not list network interfaces");
                Vec::new()
            }
        }
    }

    async fn interface_addr(&self, name: &str) -> Result<Ipv4Addr, DnsError> {
        let spec = format!("interface {name}");
        let addr = interface_ipv4(name)
            .await
            .map_err(|e| DnsError::unavailable(spec.clone(), e))?;
        addr.ok_or_else(|| DnsError::unavailable(spec, "no IPv4 address"))
    }

    async fn bridge_gateway(&self) -> Result<Ipv4Addr, DnsError> {
        bridge_gateway().await
    }
}

#[cfg(target_os = "linux")]
async fn list_interfaces() -> Result<Vec<String>, DnsError> {
    let mut dir = tokio::fs::read_dir("/sys/class/net").await?;
    let mut names = Vec::new();
    while let Some(entry) = dir.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

#[cfg(target_os = "macos")]
async fn list_interfaces() -> Result<Vec<String>, DnsError> {
    let out = run_command("ifconfig", &["-l"]).await?;
    Ok(out.split_whitespace().map(String::from).collect())
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
async fn list_interfaces() -> Result<Vec<String>, DnsError> {
    Ok(Vec::new())
}

#[cfg(target_os = "linux")]
async fn interface_ipv4(name: &str) -> Result<Option<Ipv4Addr>, DnsError> {
    let out = run_command("ip", &["-4", "-o", "addr", "show", "dev", name]).await?;
    Ok(parse_ip_addr_output(&out))
}

#[cfg(target_os = "macos")]
async fn interface_ipv4(name: &str) -> Result<Option<Ipv4Addr>, DnsError> {
    let out = run_command("ipconfig", &["getifaddr", name]).await?;
    Ok(out.trim().parse().ok())
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
async fn interface_ipv4(_name: &str) -> Result<Option<Ipv4Addr>, DnsError> {
    Ok(None)
}

/// On Linux the bridge gateway comes from docker; elsewhere containers run in
/// a VM and the fixed default address is used directly.
#[cfg(target_os = "linux")]
async fn bridge_gateway() -> Result<Ipv4Addr, DnsError> {
    let out = run_command("docker", &["network", "inspect", "bridge"])
        .await
        .map_err(|e| DnsError::unavailable("auto", e))?;
    parse_bridge_gateway(&out)
}

#[cfg(not(target_os = "linux"))]
async fn bridge_gateway() -> Result<Ipv4Addr, DnsError> {
    Ok(DEFAULT_CONTAINER_ADDR)
}

/// First `inet a.b.c.d/nn` in `ip -4 -o addr show` output.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_ip_addr_output(out: &str) -> Option<Ipv4Addr> {
    out.lines().find_map(|line| {
        let mut words = line.split_whitespace();
        words.find(|w| *w == "inet")?;
        let cidr = words.next()?;
        cidr.split('/').next()?.parse().ok()
    })
}

#[derive(Debug, Deserialize)]
struct NetworkInspect {
    #[serde(rename = "IPAM")]
    ipam: Ipam,
}

#[derive(Debug, Deserialize)]
struct Ipam {
    #[serde(rename = "Config", default)]
    config: Vec<IpamConfig>,
}

#[derive(Debug, Deserialize)]
struct IpamConfig {
    #[serde(rename = "Gateway", default)]
    gateway: Option<String>,
}

/// Gateway of the first IPAM config in `docker network inspect` output.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_bridge_gateway(json: &str) -> Result<Ipv4Addr, DnsError> {
    let networks: Vec<NetworkInspect> = serde_json::from_str(json)
        .map_err(|e| DnsError::unavailable("auto", format!("bad docker output: {e}")))?;

    let gateway = networks
        .iter()
        .flat_map(|n| n.ipam.config.iter())
        .find_map(|c| c.gateway.as_deref())
        .ok_or_else(|| DnsError::unavailable("auto", "bridge network has no gateway"))?;

    gateway
        .parse()
        .map_err(|_| DnsError::unavailable("auto", format!("bad gateway {gateway:?}")))
}

/// [`HostIdentity`] from the OS hostname and the workload container.
#[derive(Debug, Clone)]
pub struct SystemIdentity {
    container: String,
}

impl SystemIdentity {
    /// Ask `container` (via `docker inspect`) for its stack domain.
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
        }
    }
}

#[async_trait]
impl HostIdentity for SystemIdentity {
    async fn hostname(&self) -> Result<String, DnsError> {
        let raw = hostname::get()?;
        let raw = raw.to_string_lossy();
        short_hostname(&raw).ok_or_else(|| DnsError::InvalidName(raw.into_owned()))
    }

    async fn workload_name(&self) -> Result<Option<String>, DnsError> {
        let out = run_command("docker", &["inspect", &self.container]).await?;
        parse_stackdomain(&out)
    }
}

/// Strip any domain suffix from a hostname.
fn short_hostname(raw: &str) -> Option<String> {
    let short = raw.trim().split('.').next()?.trim();
    (!short.is_empty()).then(|| short.to_ascii_lowercase())
}

#[derive(Debug, Deserialize)]
struct ContainerInspect {
    #[serde(rename = "Config")]
    config: ContainerConfig,
}

#[derive(Debug, Deserialize)]
struct ContainerConfig {
    #[serde(rename = "Env", default)]
    env: Option<Vec<String>>,
}

/// Value of `STACKDOMAIN` in `docker inspect` output.
fn parse_stackdomain(json: &str) -> Result<Option<String>, DnsError> {
    let containers: Vec<ContainerInspect> = serde_json::from_str(json)
        .map_err(|e| DnsError::unavailable("workload", format!("bad docker output: {e}")))?;

    let value = containers
        .iter()
        .filter_map(|c| c.config.env.as_ref())
        .flatten()
        .find_map(|var| {
            let (key, value) = var.split_once('=')?;
            (key == STACKDOMAIN_VAR).then(|| value.trim().to_string())
        });

    Ok(value.filter(|v| !v.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ip_addr_output() {
        let out = "4: docker0    inet 172.17.0.1/16 brd 172.17.255.255 scope global docker0\\       valid_lft forever preferred_lft forever\n";
        assert_eq!(parse_ip_addr_output(out), Some(Ipv4Addr::new(172, 17, 0, 1)));
        assert_eq!(parse_ip_addr_output(""), None);
    }

    #[test]
    fn test_parse_bridge_gateway() {
        let json = r#"[{
            "Name": "bridge",
            "IPAM": {
                "Driver": "default",
                "Config": [{"Subnet": "172.17.0.0/16", "Gateway": "172.17.0.1"}]
            }
        }]"#;
        assert_eq!(
            parse_bridge_gateway(json).unwrap(),
            Ipv4Addr::new(172, 17, 0, 1)
        );
    }

    #[test]
    fn test_parse_bridge_gateway_missing() {
        let json = r#"[{"Name": "bridge", "IPAM": {"Config": []}}]"#;
        assert!(matches!(
            parse_bridge_gateway(json),
            Err(DnsError::ResolutionUnavailable { .. })
        ));
        assert!(parse_bridge_gateway("not json").is_err());
    }

    #[test]
    fn test_parse_stackdomain() {
        let json = r#"[{
            "Id": "abc",
            "Config": {"Env": ["PATH=/usr/bin", "STACKDOMAIN=data.example.org"]}
        }]"#;
        assert_eq!(
            parse_stackdomain(json).unwrap(),
            Some("data.example.org".to_string())
        );
    }

    #[test]
    fn test_parse_stackdomain_absent_or_empty() {
        let json = r#"[{"Config": {"Env": ["STACKDOMAIN="]}}]"#;
        assert_eq!(parse_stackdomain(json).unwrap(), None);

        let json = r#"[{"Config": {"Env": null}}]"#;
        assert_eq!(parse_stackdomain(json).unwrap(), None);
    }

    #[test]
    fn test_short_hostname() {
        assert_eq!(short_hostname("Box1.local\n"), Some("box1".to_string()));
        assert_eq!(short_hostname("box1"), Some("box1".to_string()));
        assert_eq!(short_hostname(""), None);
    }

    #[tokio::test]
    async fn test_run_command_missing_program() {
        let err = run_command("cirrid-no-such-program", &[]).await.unwrap_err();
        assert!(matches!(err, DnsError::Command { .. }));
    }
}

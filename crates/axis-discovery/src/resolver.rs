//! MAC <-> IP resolution over a host-discovery scan

use async_trait::async_trait;
use axis_core::{normalize_mac, ProvisionError, Result, Subnet};
use std::net::Ipv4Addr;
use tracing::{debug, info};

/// One host reported by a scan, with whichever addresses were seen
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScannedHost {
    pub mac: Option<String>,
    pub ipv4: Option<Ipv4Addr>,
}

impl ScannedHost {
    pub fn new(mac: &str, ipv4: Ipv4Addr) -> Self {
        Self {
            mac: Some(mac.to_string()),
            ipv4: Some(ipv4),
        }
    }
}

/// Read-only scan of a subnet. One bounded attempt, no retries.
#[async_trait]
pub trait HostScanner: Send + Sync {
    async fn scan(&self, subnet: &Subnet) -> Result<Vec<ScannedHost>>;
}

/// First host carrying both addresses whose MAC matches (case and colon insensitive)
pub fn find_ip_by_mac(hosts: &[ScannedHost], mac_address: &str) -> Option<Ipv4Addr> {
    let target = normalize_mac(mac_address);
    hosts.iter().find_map(|host| match (&host.mac, host.ipv4) {
        (Some(mac), Some(ip)) if normalize_mac(mac) == target => Some(ip),
        _ => None,
    })
}

/// MAC (normalized) of the first host whose IPv4 address matches
pub fn find_mac_by_ip(hosts: &[ScannedHost], ip_address: Ipv4Addr) -> Option<String> {
    hosts.iter().find_map(|host| match (&host.mac, host.ipv4) {
        (Some(mac), Some(ip)) if ip == ip_address => Some(normalize_mac(mac)),
        _ => None,
    })
}

pub async fn resolve_ip_address(
    scanner: &dyn HostScanner,
    mac_address: &str,
    subnet: &Subnet,
) -> Result<Ipv4Addr> {
    info!(mac = %mac_address, subnet = %subnet, "Resolving MAC address to IP address");
    let hosts = scanner.scan(subnet).await?;
    debug!(hosts = hosts.len(), "Scan complete");

    match find_ip_by_mac(&hosts, mac_address) {
        Some(ip) => {
            info!(mac = %mac_address, ip = %ip, "Resolved MAC address");
            Ok(ip)
        }
        None => Err(ProvisionError::NotFound(format!(
            "Could not resolve MAC address {} to IP address on subnet {}",
            mac_address, subnet
        ))),
    }
}

pub async fn resolve_mac_address(
    scanner: &dyn HostScanner,
    ip_address: Ipv4Addr,
    subnet: &Subnet,
) -> Result<String> {
    info!(ip = %ip_address, subnet = %subnet, "Resolving IP address to MAC address");
    let hosts = scanner.scan(subnet).await?;
    debug!(hosts = hosts.len(), "Scan complete");

    match find_mac_by_ip(&hosts, ip_address) {
        Some(mac) => {
            info!(ip = %ip_address, mac = %mac, "Resolved IP address");
            Ok(mac)
        }
        None => Err(ProvisionError::NotFound(format!(
            "Could not resolve IP address {} to MAC address on subnet {}",
            ip_address, subnet
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axis_core::ErrorKind;

    struct FixedScan(Vec<ScannedHost>);

    #[async_trait]
    impl HostScanner for FixedScan {
        async fn scan(&self, _subnet: &Subnet) -> Result<Vec<ScannedHost>> {
            Ok(self.0.clone())
        }
    }

    fn subnet() -> Subnet {
        "10.0.0.0/24".parse().unwrap()
    }

    fn hosts() -> Vec<ScannedHost> {
        vec![
            // Host without a MAC (the scanning machine itself)
            ScannedHost {
                mac: None,
                ipv4: Some(Ipv4Addr::new(10, 0, 0, 1)),
            },
            ScannedHost::new("00408c1a2b3c", Ipv4Addr::new(10, 0, 0, 23)),
            ScannedHost::new("AC:CC:8E:00:11:22", Ipv4Addr::new(10, 0, 0, 24)),
        ]
    }

    #[tokio::test]
    async fn test_resolve_mixed_case_mac() {
        let scanner = FixedScan(hosts());
        let ip = resolve_ip_address(&scanner, "00408C1A2B3C", &subnet())
            .await
            .unwrap();
        assert_eq!(ip, Ipv4Addr::new(10, 0, 0, 23));
    }

    #[tokio::test]
    async fn test_resolve_absent_mac_is_not_found() {
        let scanner = FixedScan(hosts());
        let err = resolve_ip_address(&scanner, "00408cffffff", &subnet())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_resolve_mac_from_ip() {
        let scanner = FixedScan(hosts());
        let mac = resolve_mac_address(&scanner, Ipv4Addr::new(10, 0, 0, 24), &subnet())
            .await
            .unwrap();
        assert_eq!(mac, "accc8e001122");

        let err = resolve_mac_address(&scanner, Ipv4Addr::new(10, 0, 0, 1), &subnet())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_colon_grouped_target() {
        assert_eq!(
            find_ip_by_mac(&hosts(), "00:40:8c:1a:2b:3c"),
            Some(Ipv4Addr::new(10, 0, 0, 23))
        );
    }
}

//! nmap host-discovery scans
//!
//! Runs `nmap -sn -oX -` against a subnet and reads the `<host>` elements of
//! the XML report. MAC addresses are only reported when the scan runs with
//! root privileges on the same layer 2 network as the cameras.

use async_trait::async_trait;
use axis_core::{ProvisionError, Result, Subnet};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, trace};

use crate::resolver::{HostScanner, ScannedHost};

/// nmap invocation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NmapConfig {
    /// nmap executable
    pub binary: String,
    /// Run through `sudo` (needed to see hardware addresses)
    pub use_sudo: bool,
    /// Per-host timeout in seconds
    pub host_timeout_secs: u64,
    /// Probe retransmissions
    pub max_retries: u32,
}

impl Default for NmapConfig {
    fn default() -> Self {
        Self {
            binary: "nmap".to_string(),
            use_sudo: true,
            host_timeout_secs: 30,
            max_retries: 0,
        }
    }
}

impl NmapConfig {
    /// Program and arguments for one scan of `subnet`
    pub fn command_line(&self, subnet: &Subnet) -> (String, Vec<String>) {
        let mut args = vec![
            "--host-timeout".to_string(),
            self.host_timeout_secs.to_string(),
            "--max-retries".to_string(),
            self.max_retries.to_string(),
            "-sn".to_string(),
            "-n".to_string(),
            "-oX".to_string(),
            "-".to_string(),
            subnet.to_string(),
        ];
        if self.use_sudo {
            args.insert(0, self.binary.clone());
            ("sudo".to_string(), args)
        } else {
            (self.binary.clone(), args)
        }
    }
}

/// [`HostScanner`] backed by the nmap executable
#[derive(Debug, Clone, Default)]
pub struct NmapScanner {
    config: NmapConfig,
}

impl NmapScanner {
    pub fn new(config: NmapConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl HostScanner for NmapScanner {
    async fn scan(&self, subnet: &Subnet) -> Result<Vec<ScannedHost>> {
        let (program, args) = self.config.command_line(subnet);
        info!(command = %format!("{} {}", program, args.join(" ")), "Running host discovery scan");

        let output = Command::new(&program).args(&args).output().await?;
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(ProvisionError::Transport(format!(
                "nmap scan of {} exited with {}: {}",
                subnet,
                output.status,
                stderr.trim()
            )));
        }
        if !stderr.trim().is_empty() {
            debug!(stderr = %stderr.trim(), "nmap wrote to stderr");
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        trace!(output = %stdout, "nmap output");
        let hosts = parse_nmap_xml(&stdout)?;
        debug!(subnet = %subnet, hosts = ?describe(&hosts), "Scan found hosts");
        Ok(hosts)
    }
}

fn attribute(element: &BytesStart<'_>, name: &str) -> Result<Option<String>> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| ProvisionError::Transport(format!("malformed nmap XML: {}", e)))?;
        if attr.key.as_ref() == name.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|e| ProvisionError::Transport(format!("malformed nmap XML: {}", e)))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Parse an nmap XML report into its hosts.
///
/// Only `<address>` elements directly inside `<host>` count; `<hosthint>`
/// blocks repeat addresses for hosts that may never have answered.
pub fn parse_nmap_xml(xml: &str) -> Result<Vec<ScannedHost>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut hosts = Vec::new();
    let mut current: Option<ScannedHost> = None;
    let mut depth_in_host = 0usize;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| ProvisionError::Transport(format!("malformed nmap XML: {}", e)))?;
        match event {
            Event::Start(e) => {
                if current.is_some() {
                    depth_in_host += 1;
                } else if e.name().as_ref() == b"host" {
                    current = Some(ScannedHost::default());
                    depth_in_host = 0;
                }
            }
            Event::Empty(e) => {
                if let Some(host) = current.as_mut() {
                    if depth_in_host == 0 && e.name().as_ref() == b"address" {
                        let addr = attribute(&e, "addr")?;
                        match (attribute(&e, "addrtype")?.as_deref(), addr) {
                            (Some("mac"), Some(mac)) if host.mac.is_none() => host.mac = Some(mac),
                            (Some("ipv4"), Some(ip)) if host.ipv4.is_none() => {
                                host.ipv4 = ip.parse().ok();
                            }
                            _ => {}
                        }
                    }
                }
            }
            Event::End(_) => {
                if current.is_some() {
                    if depth_in_host == 0 {
                        hosts.extend(current.take());
                    } else {
                        depth_in_host -= 1;
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(hosts)
}

/// Address list of a scan, for logging
fn describe(hosts: &[ScannedHost]) -> Vec<String> {
    hosts
        .iter()
        .map(|h| {
            format!(
                "{} {}",
                h.ipv4.map(|ip| ip.to_string()).unwrap_or_else(|| "-".to_string()),
                h.mac.as_deref().unwrap_or("-")
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const REPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE nmaprun>
<nmaprun scanner="nmap" args="nmap --host-timeout 30 --max-retries 0 -sn -n -oX - 10.0.0.0/24" start="1700000000" version="7.94" xmloutputversion="1.05">
<verbose level="0"/>
<debugging level="0"/>
<hosthint><status state="up" reason="unknown-response" reason_ttl="0"/>
<address addr="10.0.0.99" addrtype="ipv4"/>
<address addr="00:40:8C:99:99:99" addrtype="mac" vendor="Axis Communications AB"/>
<hostnames>
</hostnames>
</hosthint>
<host><status state="up" reason="arp-response" reason_ttl="0"/>
<address addr="10.0.0.23" addrtype="ipv4"/>
<address addr="00:40:8C:1A:2B:3C" addrtype="mac" vendor="Axis Communications AB"/>
<hostnames>
</hostnames>
<times srtt="1096" rttvar="5000" to="100000"/>
</host>
<host><status state="up" reason="localhost-response" reason_ttl="0"/>
<address addr="10.0.0.5" addrtype="ipv4"/>
<hostnames>
</hostnames>
</host>
<runstats><finished time="1700000003" timestr="Tue Nov 14 22:13:23 2023" summary="Nmap done at Tue Nov 14 22:13:23 2023; 256 IP addresses (2 hosts up) scanned in 3.10 seconds" elapsed="3.10" exit="success"/><hosts up="2" down="254" total="256"/>
</runstats>
</nmaprun>"#;

    #[test]
    fn test_parse_hosts() {
        let hosts = parse_nmap_xml(REPORT).unwrap();
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0].ipv4, Some(Ipv4Addr::new(10, 0, 0, 23)));
        assert_eq!(hosts[0].mac.as_deref(), Some("00:40:8C:1A:2B:3C"));
        assert_eq!(hosts[1].ipv4, Some(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(hosts[1].mac, None);
    }

    #[test]
    fn test_hosthint_addresses_ignored() {
        let hosts = parse_nmap_xml(REPORT).unwrap();
        assert!(hosts
            .iter()
            .all(|h| h.ipv4 != Some(Ipv4Addr::new(10, 0, 0, 99))));
    }

    #[test]
    fn test_command_line() {
        let subnet: Subnet = "10.0.0.0/24".parse().unwrap();
        let (program, args) = NmapConfig::default().command_line(&subnet);
        assert_eq!(program, "sudo");
        assert_eq!(
            args.join(" "),
            "nmap --host-timeout 30 --max-retries 0 -sn -n -oX - 10.0.0.0/24"
        );

        let config = NmapConfig {
            use_sudo: false,
            ..Default::default()
        };
        let (program, args) = config.command_line(&subnet);
        assert_eq!(program, "nmap");
        assert_eq!(args[0], "--host-timeout");
    }

    #[test]
    fn test_describe() {
        let hosts = parse_nmap_xml(REPORT).unwrap();
        assert_eq!(describe(&hosts), vec!["10.0.0.23 00:40:8C:1A:2B:3C", "10.0.0.5 -"]);
    }
}

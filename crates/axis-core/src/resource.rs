//! Declarative resource description handed to the workflow by the operator
//!
//! The raw document mirrors the custom resource schema. It is validated once at
//! ingress with [`Resource::network_intent`], which produces the typed
//! [`NetworkIntent`] that discovery and provisioning consume.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

use crate::error::{ProvisionError, Result};
use crate::identity::{validate_serial_number, Subnet};

/// Custom resource describing one camera to onboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub metadata: Metadata,
    pub spec: ResourceSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub network: NetworkSpec,
    pub workflow: WorkflowSpec,
    pub video: VideoSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkModeKind {
    Static,
    Dhcp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub mode: NetworkModeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_ip_address: Option<Ipv4Addr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub router_ip_address: Option<Ipv4Addr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnet: Option<Subnet>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dhcp_ip_address: Option<Ipv4Addr>,
}

/// How discovery locates the device on the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionStrategy {
    /// Known MAC, resolve its current IP
    ResolveMacAddress,
    /// Known DHCP-assigned IP, resolve its MAC for validation
    DhcpIpAddress,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSpec {
    pub provision_strategy: ProvisionStrategy,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay between configuration attempts, in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay: u64,
    #[serde(default)]
    pub ignore_firmware_version: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    30
}

/// Physical mounting of the camera
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    Ceiling,
    Wall,
    Desk,
}

impl Orientation {
    /// Value of `ImageSource.I0.CameraTiltOrientation`
    pub fn tilt_value(self) -> &'static str {
        match self {
            Orientation::Ceiling => "-90",
            Orientation::Wall => "0",
            Orientation::Desk => "90",
        }
    }

    pub fn from_tilt_value(value: &str) -> Option<Self> {
        match value.trim() {
            "-90" => Some(Orientation::Ceiling),
            "0" => Some(Orientation::Wall),
            "90" => Some(Orientation::Desk),
            _ => None,
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Orientation::Ceiling => "ceiling",
            Orientation::Wall => "wall",
            Orientation::Desk => "desk",
        };
        f.write_str(name)
    }
}

/// Zipstream strength: `off` or one of 10/20/30/40/50
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ZipstreamStrength {
    Level(u8),
    Named(StrengthOff),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrengthOff {
    Off,
}

impl ZipstreamStrength {
    pub const OFF: ZipstreamStrength = ZipstreamStrength::Named(StrengthOff::Off);

    pub fn validate(self) -> Result<Self> {
        match self {
            ZipstreamStrength::Level(10 | 20 | 30 | 40 | 50) | ZipstreamStrength::Named(_) => {
                Ok(self)
            }
            ZipstreamStrength::Level(other) => Err(ProvisionError::Validation(format!(
                "Zipstream strength {} is not one of off, 10, 20, 30, 40, 50",
                other
            ))),
        }
    }

    /// Value as the device reports and accepts it
    pub fn as_param(self) -> String {
        match self {
            ZipstreamStrength::Level(level) => level.to_string(),
            ZipstreamStrength::Named(_) => "off".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSpec {
    pub orientation: Orientation,
    pub zipstream_strength: ZipstreamStrength,
}

/// Validated network identity the device must end up with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkMode {
    Static { address: Ipv4Addr, router: Ipv4Addr },
    Dhcp { mac_address: String, subnet: Subnet },
}

/// Validated discovery locator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Mac { mac_address: String, subnet: Subnet },
    Ip { ip_address: Ipv4Addr, subnet: Subnet },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkIntent {
    pub mode: NetworkMode,
    pub locator: Locator,
}

impl Resource {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Validate the network section and video settings, producing the typed intent.
    pub fn network_intent(&self) -> Result<NetworkIntent> {
        let network = &self.spec.network;
        let missing = |what: &str| ProvisionError::Validation(what.to_string());

        let locator = match self.spec.workflow.provision_strategy {
            ProvisionStrategy::ResolveMacAddress => {
                let (mac, subnet) = network.mac_address.as_deref().zip(network.subnet).ok_or_else(
                    || missing("Must set mac_address and subnet if using 'resolve_mac_address' strategy"),
                )?;
                Locator::Mac {
                    mac_address: validate_serial_number(mac)?,
                    subnet,
                }
            }
            ProvisionStrategy::DhcpIpAddress => {
                let (ip_address, subnet) = network.dhcp_ip_address.zip(network.subnet).ok_or_else(
                    || missing("Must set dhcp_ip_address and subnet if using 'dhcp_ip_address' strategy"),
                )?;
                Locator::Ip { ip_address, subnet }
            }
        };

        let mode = match network.mode {
            NetworkModeKind::Static => {
                let address = network.static_ip_address.ok_or_else(|| {
                    missing("Must set static_ip_address if using 'static' network mode")
                })?;
                let router = network.router_ip_address.ok_or_else(|| {
                    missing("Must set router_ip_address if using 'static' network mode")
                })?;
                NetworkMode::Static { address, router }
            }
            NetworkModeKind::Dhcp => {
                let (mac, subnet) = network.mac_address.as_deref().zip(network.subnet).ok_or_else(
                    || missing("Must set mac_address and subnet if using DHCP mode, so the address assigned via DHCP can be resolved"),
                )?;
                NetworkMode::Dhcp {
                    mac_address: validate_serial_number(mac)?,
                    subnet,
                }
            }
        };

        if self.spec.workflow.max_retries == 0 {
            return Err(missing("workflow.max_retries must be at least 1"));
        }
        self.spec.video.zipstream_strength.validate()?;

        Ok(NetworkIntent { mode, locator })
    }
}

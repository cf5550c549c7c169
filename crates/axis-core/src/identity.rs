//! Device identity: hardware address validation, subnets, and credentials

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{ProvisionError, Result};

/// Vendor OUI prefixes an Axis serial number may start with
pub const AXIS_OUI_PREFIXES: [&str; 2] = ["00408c", "accc8e"];

/// Strip separators and lower-case a hardware address.
///
/// `00:40:8C:1A:2B:3C` and `00408c1a2b3c` normalize to the same value.
pub fn normalize_mac(mac: &str) -> String {
    mac.chars()
        .filter(|c| *c != ':')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Serial numbers are identical to the hardware address: one of the Axis OUI
/// prefixes followed by exactly six hex characters.
pub fn is_valid_serial_number(serial_number: &str) -> bool {
    let normalized = normalize_mac(serial_number);
    AXIS_OUI_PREFIXES.iter().any(|prefix| {
        normalized
            .strip_prefix(prefix)
            .map(|rest| rest.len() == 6 && rest.chars().all(|c| c.is_ascii_hexdigit()))
            .unwrap_or(false)
    })
}

/// Validate a serial number, returning its normalized form
pub fn validate_serial_number(serial_number: &str) -> Result<String> {
    if is_valid_serial_number(serial_number) {
        Ok(normalize_mac(serial_number))
    } else {
        Err(ProvisionError::Validation(format!(
            "MAC address '{}' is not a valid Axis serial number",
            serial_number
        )))
    }
}

/// IPv4 subnet in CIDR notation (e.g. `10.0.0.0/24`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Subnet {
    pub network: Ipv4Addr,
    pub prefix_len: u8,
}

impl FromStr for Subnet {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ProvisionError::Validation(format!("Invalid subnet '{}'", s));
        let (addr, prefix) = s.trim().split_once('/').ok_or_else(invalid)?;
        let network = addr.parse::<Ipv4Addr>().map_err(|_| invalid())?;
        let prefix_len = prefix.parse::<u8>().map_err(|_| invalid())?;
        if prefix_len > 32 {
            return Err(invalid());
        }
        Ok(Self { network, prefix_len })
    }
}

impl TryFrom<String> for Subnet {
    type Error = ProvisionError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Subnet> for String {
    fn from(subnet: Subnet) -> Self {
        subnet.to_string()
    }
}

impl fmt::Display for Subnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

/// Username/password pair used for digest authentication
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// The device a step is currently talking to.
///
/// `host` changes when a new network identity is assigned, and credentials may
/// be rotated during bootstrap.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    pub name: String,
    pub host: Ipv4Addr,
    pub credentials: Credentials,
    pub timeout: Option<Duration>,
}

impl DeviceIdentity {
    pub fn new(name: impl Into<String>, host: Ipv4Addr, credentials: Credentials) -> Self {
        Self {
            name: name.into(),
            host,
            credentials,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.host)
    }
}

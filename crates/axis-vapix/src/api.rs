//! Typed device operations built on the raw [`VapixClient`] wrappers

use axis_core::{Credentials, ProvisionError, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::Duration;
use tracing::{debug, info};

use crate::client::{rpc, VapixClient};
use crate::response::{
    check_param_update, decode_rpc, decode_rpc_data, decode_xml, find_attribute, parse_param_list,
    require, scan_xml,
};

/// Body of the 401 the device returns before the first admin account exists
pub const INITIAL_ADMIN_SIGNATURE: &str = "Error: initial admin user must be created first";

/// Privilege scope of the administrative account
pub const ADMIN_SECONDARY_GROUPS: &str = "admin:operator:viewer:ptz";

/// Outcome of the unauthenticated user-management probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountProbe {
    /// No administrative account exists yet
    MissingInitialAdmin,
    /// The supplied credentials grant administrative access
    Authorized,
    /// Any other answer (wrong credentials, no response, ...)
    Denied { status: Option<u16> },
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkInfo {
    #[serde(default)]
    pub devices: Vec<NetworkDevice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkDevice {
    pub name: String,
    #[serde(rename = "IPv4", default)]
    pub ipv4: Option<Ipv4Info>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ipv4Info {
    #[serde(default)]
    pub configuration_mode: Option<String>,
}

impl NetworkInfo {
    /// IPv4 configuration mode (`static`, `dhcp`, ...) of an interface
    pub fn configuration_mode(&self, device: &str) -> Option<&str> {
        self.devices
            .iter()
            .find(|d| d.name == device)
            .and_then(|d| d.ipv4.as_ref())
            .and_then(|ip| ip.configuration_mode.as_deref())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FirmwareStatusData {
    #[serde(default)]
    active_firmware_version: Option<String>,
}

/// NTP client settings as read from and written to `ntp.cgi`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NtpClientConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub servers_source: String,
    #[serde(default)]
    pub static_servers: Vec<String>,
}

impl NtpClientConfig {
    /// Enabled client synchronizing against one static server
    pub fn static_server(server: &str) -> Self {
        Self {
            enabled: true,
            servers_source: "static".to_string(),
            static_servers: vec![server.to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct NtpInfo {
    client: NtpClientConfig,
}

/// One physical disk from `disks/list.cgi`
#[derive(Debug, Clone, Deserialize)]
pub struct Disk {
    #[serde(rename = "@diskid")]
    pub disk_id: String,
    #[serde(rename = "@status", default)]
    pub status: String,
    #[serde(rename = "@filesystem", default)]
    pub filesystem: String,
    /// kB
    #[serde(rename = "@totalsize", default)]
    pub total_size: Option<u64>,
    /// kB
    #[serde(rename = "@freesize", default)]
    pub free_size: Option<u64>,
}

impl Disk {
    pub fn is_disconnected(&self) -> bool {
        self.status == "disconnected"
    }
}

#[derive(Debug, Deserialize)]
struct DiskListDocument {
    disks: DiskSet,
}

#[derive(Debug, Deserialize)]
struct DiskSet {
    #[serde(default)]
    disk: Vec<Disk>,
}

/// Asynchronous disk job (format, mount, unmount)
#[derive(Debug, Clone, Deserialize)]
pub struct DiskJob {
    #[serde(rename = "@jobid", default)]
    pub job_id: Option<String>,
    #[serde(rename = "@result", default)]
    pub result: Option<String>,
    #[serde(rename = "@progress", default)]
    pub progress: Option<String>,
}

impl DiskJob {
    pub fn is_ok(&self) -> bool {
        self.result.as_deref() == Some("OK")
    }

    pub fn is_error(&self) -> bool {
        self.result.as_deref() == Some("ERROR")
    }

    pub fn is_complete(&self) -> bool {
        self.is_ok() && self.progress.as_deref().map(str::trim) == Some("100")
    }
}

#[derive(Debug, Deserialize)]
struct JobDocument {
    #[serde(default)]
    job: Option<DiskJob>,
}

/// Answer to a format request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatOutcome {
    /// Format job accepted
    Started { job_id: String },
    /// Device refused because the disk is mounted or busy
    Busy,
}

/// Zipstream group-of-pictures settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GopSettings {
    pub mode: String,
    pub max_gop_length: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextOverlay {
    pub camera: u32,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OverlayList {
    #[serde(default)]
    text_overlays: Vec<TextOverlay>,
}

/// Text overlay to create on one channel
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTextOverlay {
    pub camera: u32,
    pub text: String,
    pub position: String,
    pub text_color: String,
}

impl VapixClient {
    fn context(&self, what: impl std::fmt::Display) -> String {
        format!("{} for {}", what, self.identity())
    }

    /// Read parameter groups as `Group.Name -> value`
    pub async fn get_params(&self, groups: &[&str]) -> Result<BTreeMap<String, String>> {
        let what = self.context(format_args!("listing parameters {}", groups.join(",")));
        let response = require(self.list_params(groups).await, &what)?;
        debug!(device = %self.identity(), body = %response.text(), "Parameter list response");
        parse_param_list(&response.text())
    }

    pub async fn set_params(&self, values: &[(&str, &str)]) -> Result<()> {
        let names: Vec<&str> = values.iter().map(|(k, _)| *k).collect();
        let what = self.context(format_args!("updating parameters {}", names.join(",")));
        let owned: Vec<(String, String)> = values
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let response = require(self.update_params(&owned).await, &what)?;
        check_param_update(&response.text(), &what)
    }

    /// Probe `pwdgrp.cgi?action=get` to learn the account state
    pub async fn probe_accounts(&self) -> AccountProbe {
        let response = self.user_management(&[("action", "get")]).await;
        match response {
            Some(r) if r.status == 401 && r.text().contains(INITIAL_ADMIN_SIGNATURE) => {
                AccountProbe::MissingInitialAdmin
            }
            Some(r) if r.is_success() => AccountProbe::Authorized,
            Some(r) => AccountProbe::Denied {
                status: Some(r.status),
            },
            None => AccountProbe::Denied { status: None },
        }
    }

    /// Create the administrative account. Only possible once per device.
    pub async fn create_admin_user(&self, credentials: &Credentials) -> Result<()> {
        let what = self.context(format_args!("creating user '{}'", credentials.username));
        let response = require(
            self.user_management(&[
                ("action", "add"),
                ("user", credentials.username.as_str()),
                ("pwd", credentials.password.as_str()),
                ("grp", "root"),
                ("sgrp", ADMIN_SECONDARY_GROUPS),
            ])
            .await,
            &what,
        )?;
        if !response.text().contains("Created") {
            return Err(ProvisionError::device_api(format!(
                "unexpected reply '{}' when {}",
                response.text().trim(),
                what
            )));
        }
        info!(device = %self.identity(), user = %credentials.username, "Created axis user");
        Ok(())
    }

    pub async fn network_info(&self) -> Result<NetworkInfo> {
        let what = self.context("getting network information");
        decode_rpc_data(
            self.network_settings(&rpc("getNetworkInfo", None)).await,
            &what,
        )
    }

    pub async fn set_static_hostname(&self, hostname: &str) -> Result<()> {
        let what = self.context(format_args!("assigning static hostname '{}'", hostname));
        let body = rpc(
            "setHostnameConfiguration",
            Some(json!({ "staticHostname": hostname })),
        );
        decode_rpc::<serde_json::Value>(self.network_settings(&body).await, &what)?;
        Ok(())
    }

    /// Request a static IPv4 configuration. The device validates and replies
    /// before applying it, so success does not mean the new address answers.
    pub async fn set_static_ipv4(
        &self,
        device: &str,
        address: Ipv4Addr,
        prefix_length: u8,
        router: Ipv4Addr,
    ) -> Result<()> {
        let what = self.context(format_args!("assigning static IPv4 address {}", address));
        let body = rpc(
            "setIPv4AddressConfiguration",
            Some(json!({
                "deviceName": device,
                "configurationMode": "static",
                "staticDefaultRouter": router.to_string(),
                "staticAddressConfigurations": [
                    { "address": address.to_string(), "prefixLength": prefix_length }
                ],
            })),
        );
        decode_rpc::<serde_json::Value>(self.network_settings(&body).await, &what)?;
        Ok(())
    }

    pub async fn enable_dhcp_hostname(&self) -> Result<()> {
        let what = self.context("enabling hostname configuration via DHCP");
        let body = rpc(
            "setHostnameConfiguration",
            Some(json!({ "useDhcpHostname": true })),
        );
        decode_rpc::<serde_json::Value>(self.network_settings(&body).await, &what)?;
        Ok(())
    }

    pub async fn enable_dhcp_ipv4(&self, device: &str) -> Result<()> {
        let what = self.context("enabling IPv4 address configuration via DHCP");
        let body = rpc(
            "setIPv4AddressConfiguration",
            Some(json!({ "deviceName": device, "configurationMode": "dhcp" })),
        );
        decode_rpc::<serde_json::Value>(self.network_settings(&body).await, &what)?;
        Ok(())
    }

    /// Active firmware version, `None` when the device does not report one
    pub async fn active_firmware_version(&self) -> Result<Option<String>> {
        let what = self.context("checking firmware status");
        let data: FirmwareStatusData =
            decode_rpc_data(self.firmware_management("status").await, &what)?;
        Ok(data.active_firmware_version)
    }

    /// Upload a firmware image; the device reboots afterwards
    pub async fn upload_firmware(&self, image: Vec<u8>, timeout: Option<Duration>) -> Result<()> {
        let what = self.context("upgrading firmware");
        let response = require(self.upgrade_firmware(image, timeout).await, &what)?;
        let text = response.text();
        debug!(device = %self.identity(), body = %text, "Firmware upgrade response");
        if text.contains("Error") {
            return Err(ProvisionError::device_api(format!(
                "{} when {}",
                text.trim(),
                what
            )));
        }
        Ok(())
    }

    pub async fn ntp_client(&self) -> Result<NtpClientConfig> {
        let what = self.context("reading NTP client configuration");
        let info: NtpInfo = decode_rpc_data(self.ntp(&rpc("getNTPInfo", None)).await, &what)?;
        Ok(info.client)
    }

    pub async fn set_ntp_client(&self, config: &NtpClientConfig) -> Result<()> {
        let what = self.context("configuring NTP client");
        let params = serde_json::to_value(config)?;
        decode_rpc::<serde_json::Value>(
            self.ntp(&rpc("setNTPClientConfiguration", Some(params))).await,
            &what,
        )?;
        Ok(())
    }

    pub async fn disks(&self) -> Result<Vec<Disk>> {
        let what = self.context("listing disks");
        let response = require(self.list_disks().await, &what)?;
        debug!(device = %self.identity(), body = %response.text(), "Disk list response");
        let document: DiskListDocument = decode_xml(&response.body, &what)?;
        Ok(document.disks.disk)
    }

    /// Submit a format job. HTTP 403 is reported as [`FormatOutcome::Busy`].
    pub async fn start_format(&self, disk_id: &str, filesystem: &str) -> Result<FormatOutcome> {
        let what = self.context(format_args!("formatting disk {} to {}", disk_id, filesystem));
        let response = self.format_disk(disk_id, filesystem).await;
        if response.as_ref().map(|r| r.status) == Some(403) {
            return Ok(FormatOutcome::Busy);
        }
        let response = require(response, &what)?;
        let job = Self::job_from(&response.body, &what)?;
        match (job.is_ok(), job.job_id) {
            (true, Some(job_id)) => Ok(FormatOutcome::Started { job_id }),
            _ => Err(ProvisionError::device_api(format!(
                "format job not accepted when {}",
                what
            ))),
        }
    }

    /// `action` is `mount` or `unmount`
    pub async fn set_disk_mounted(&self, action: &str, disk_id: &str) -> Result<()> {
        let what = self.context(format_args!("{} disk {}", action, disk_id));
        let response = require(self.mount_disk(action, disk_id).await, &what)?;
        let job = Self::job_from(&response.body, &what)?;
        if !job.is_ok() {
            return Err(ProvisionError::device_api(format!("failed {}", what)));
        }
        Ok(())
    }

    pub async fn disk_job(&self, job_id: &str, disk_id: &str) -> Result<DiskJob> {
        let what = self.context(format_args!("polling disk job {}", job_id));
        let response = require(self.job_progress(job_id, disk_id).await, &what)?;
        Self::job_from(&response.body, &what)
    }

    fn job_from(body: &[u8], what: &str) -> Result<DiskJob> {
        let document: JobDocument = decode_xml(body, what)?;
        document
            .job
            .ok_or_else(|| ProvisionError::device_api(format!("reply without job when {}", what)))
    }

    pub async fn gop(&self) -> Result<GopSettings> {
        let what = self.context("reading zipstream GOP");
        let response = require(self.get_gop().await, &what)?;
        let elements = scan_xml(&response.body, &what)?;
        let mode = find_attribute(&elements, &["gopmode", "mode"])
            .ok_or_else(|| ProvisionError::device_api(format!("no GOP mode when {}", what)))?;
        let max_gop_length = find_attribute(&elements, &["maxgoplength"])
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| ProvisionError::device_api(format!("no max GOP length when {}", what)))?;
        Ok(GopSettings {
            mode: mode.to_string(),
            max_gop_length,
        })
    }

    pub async fn set_gop_settings(&self, settings: &GopSettings) -> Result<()> {
        let what = self.context("updating zipstream GOP");
        let response = require(
            self.set_gop(&settings.mode, settings.max_gop_length).await,
            &what,
        )?;
        scan_xml(&response.body, &what)?;
        Ok(())
    }

    /// Current strength as the device reports it (`off`, `10`, ...)
    pub async fn strength(&self) -> Result<String> {
        let what = self.context("reading zipstream strength");
        let response = require(self.get_strength().await, &what)?;
        let elements = scan_xml(&response.body, &what)?;
        let strength = elements
            .iter()
            .find_map(|e| e.attributes.get("strength"))
            .or_else(|| {
                elements
                    .iter()
                    .filter(|e| e.tag.contains("Strength"))
                    .find_map(|e| e.attributes.get("value"))
            })
            .ok_or_else(|| ProvisionError::device_api(format!("no strength when {}", what)))?;
        Ok(strength.trim().to_string())
    }

    pub async fn set_strength_level(&self, strength: &str) -> Result<()> {
        let what = self.context(format_args!("setting zipstream strength to {}", strength));
        let response = require(self.set_strength(strength).await, &what)?;
        scan_xml(&response.body, &what)?;
        Ok(())
    }

    pub async fn text_overlays(&self) -> Result<Vec<TextOverlay>> {
        let what = self.context("listing text overlays");
        let list: Option<OverlayList> = decode_rpc(
            self.dynamic_overlay(&rpc("list", Some(json!({})))).await,
            &what,
        )?;
        Ok(list.map(|l| l.text_overlays).unwrap_or_default())
    }

    pub async fn add_text_overlay(&self, overlay: &NewTextOverlay) -> Result<()> {
        let what = self.context(format_args!(
            "adding text overlay to camera channel {}",
            overlay.camera
        ));
        let params = serde_json::to_value(overlay)?;
        decode_rpc::<serde_json::Value>(
            self.dynamic_overlay(&rpc("addText", Some(params))).await,
            &what,
        )?;
        Ok(())
    }
}

//! Configuration loading and environment overrides

use anyhow::{Context, Result};
use axis_core::state::DEFAULT_STATE_FILE;
use axis_core::{Credentials, FirmwarePin};
use axis_discovery::NmapConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub state: StateConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub discovery: NmapConfig,
    #[serde(default)]
    pub provision: ProvisionConfig,
    #[serde(default)]
    pub configure: ConfigureConfig,
    #[serde(default)]
    pub firmware: FirmwareConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Path of the state document shared between steps
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

fn default_state_path() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_FILE)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Administrative account created on (or used against) every camera
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_password")]
    pub password: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            username: default_username(),
            password: default_password(),
            timeout_secs: default_request_timeout(),
        }
    }
}

impl DeviceConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.username, &self.password)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_username() -> String {
    "root".to_string()
}

fn default_password() -> String {
    "admin".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionConfig {
    /// Interface the IPv4 configuration applies to
    #[serde(default = "default_interface")]
    pub interface: String,
    #[serde(default = "default_prefix_length")]
    pub prefix_length: u8,
    /// How long a newly assigned static address may take to answer pings
    #[serde(default = "default_reachability_timeout")]
    pub reachability_timeout_secs: u64,
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
    /// How long to wait for a DHCP lease to show up in scans
    #[serde(default = "default_dhcp_window")]
    pub dhcp_resolve_window_secs: u64,
    #[serde(default = "default_dhcp_poll")]
    pub dhcp_poll_interval_secs: u64,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            prefix_length: default_prefix_length(),
            reachability_timeout_secs: default_reachability_timeout(),
            ping_interval_secs: default_ping_interval(),
            dhcp_resolve_window_secs: default_dhcp_window(),
            dhcp_poll_interval_secs: default_dhcp_poll(),
        }
    }
}

impl ProvisionConfig {
    pub fn reachability_timeout(&self) -> Duration {
        Duration::from_secs(self.reachability_timeout_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn dhcp_resolve_window(&self) -> Duration {
        Duration::from_secs(self.dhcp_resolve_window_secs)
    }

    pub fn dhcp_poll_interval(&self) -> Duration {
        Duration::from_secs(self.dhcp_poll_interval_secs)
    }
}

fn default_interface() -> String {
    "eth0".to_string()
}

fn default_prefix_length() -> u8 {
    24
}

fn default_reachability_timeout() -> u64 {
    60
}

fn default_ping_interval() -> u64 {
    1
}

fn default_dhcp_window() -> u64 {
    120
}

fn default_dhcp_poll() -> u64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigureConfig {
    /// Pause before the checklist so network mode changes settle on device
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,
    /// `Storage.S0.CleanupMaxAge` in days
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default = "default_ntp_server")]
    pub ntp_server: String,
    #[serde(default = "default_filesystem")]
    pub filesystem: String,
    #[serde(default = "default_format_poll")]
    pub format_poll_secs: u64,
    #[serde(default = "default_format_timeout")]
    pub format_timeout_secs: u64,
    #[serde(default = "default_gop_mode")]
    pub gop_mode: String,
    #[serde(default = "default_max_gop_length")]
    pub max_gop_length: u32,
    #[serde(default)]
    pub overlay: OverlayConfig,
}

impl Default for ConfigureConfig {
    fn default() -> Self {
        Self {
            settle_delay_secs: default_settle_delay(),
            retention_days: default_retention_days(),
            ntp_server: default_ntp_server(),
            filesystem: default_filesystem(),
            format_poll_secs: default_format_poll(),
            format_timeout_secs: default_format_timeout(),
            gop_mode: default_gop_mode(),
            max_gop_length: default_max_gop_length(),
            overlay: OverlayConfig::default(),
        }
    }
}

impl ConfigureConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    pub fn format_poll(&self) -> Duration {
        Duration::from_secs(self.format_poll_secs)
    }

    pub fn format_timeout(&self) -> Duration {
        Duration::from_secs(self.format_timeout_secs)
    }
}

fn default_settle_delay() -> u64 {
    15
}

fn default_retention_days() -> u32 {
    365
}

fn default_ntp_server() -> String {
    "time.nist.gov".to_string()
}

fn default_filesystem() -> String {
    "ext4".to_string()
}

fn default_format_poll() -> u64 {
    5
}

fn default_format_timeout() -> u64 {
    30 * 60
}

fn default_gop_mode() -> String {
    "dynamic".to_string()
}

fn default_max_gop_length() -> u32 {
    15
}

/// Timestamp overlay every channel must carry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// `%D %X` renders date and time
    #[serde(default = "default_overlay_text")]
    pub text: String,
    #[serde(default = "default_overlay_position")]
    pub position: String,
    #[serde(default = "default_overlay_color")]
    pub text_color: String,
    /// Channels 1..=channels
    #[serde(default = "default_overlay_channels")]
    pub channels: u32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            text: default_overlay_text(),
            position: default_overlay_position(),
            text_color: default_overlay_color(),
            channels: default_overlay_channels(),
        }
    }
}

fn default_overlay_text() -> String {
    "%D %X".to_string()
}

fn default_overlay_position() -> String {
    "topLeft".to_string()
}

fn default_overlay_color() -> String {
    "white".to_string()
}

fn default_overlay_channels() -> u32 {
    12
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirmwareConfig {
    #[serde(flatten)]
    pub pin: FirmwarePin,
    /// Object store the artifact is fetched from (`{base_url}/{filename}`)
    #[serde(default = "default_firmware_base_url")]
    pub base_url: String,
    /// Local directory downloaded artifacts are kept in
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Consecutive ping replies required after the upgrade reboot
    #[serde(default = "default_reboot_threshold")]
    pub reboot_ping_threshold: u32,
    #[serde(default = "default_reboot_timeout")]
    pub reboot_timeout_secs: u64,
    #[serde(default = "default_ping_interval")]
    pub ping_interval_secs: u64,
    /// Limit for the image upload alone, replacing the device timeout. 0 disables it.
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,
}

impl Default for FirmwareConfig {
    fn default() -> Self {
        Self {
            pin: FirmwarePin::default(),
            base_url: default_firmware_base_url(),
            cache_dir: default_cache_dir(),
            reboot_ping_threshold: default_reboot_threshold(),
            reboot_timeout_secs: default_reboot_timeout(),
            ping_interval_secs: default_ping_interval(),
            upload_timeout_secs: default_upload_timeout(),
        }
    }
}

impl FirmwareConfig {
    pub fn reboot_timeout(&self) -> Duration {
        Duration::from_secs(self.reboot_timeout_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn upload_timeout(&self) -> Option<Duration> {
        (self.upload_timeout_secs > 0).then(|| Duration::from_secs(self.upload_timeout_secs))
    }
}

fn default_firmware_base_url() -> String {
    "https://aquakube-axis-firmware.s3.amazonaws.com".to_string()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_reboot_threshold() -> u32 {
    10
}

fn default_reboot_timeout() -> u64 {
    15 * 60
}

fn default_upload_timeout() -> u64 {
    30 * 60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub slack_webhook: Option<String>,
    #[serde(default)]
    pub google_webhook: Option<String>,
    /// Workflow status to report (Succeeded, Failed, Error)
    #[serde(default = "default_status")]
    pub status: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            slack_webhook: None,
            google_webhook: None,
            status: default_status(),
        }
    }
}

fn default_status() -> String {
    "Unknown".to_string()
}

impl Config {
    /// Apply environment overrides through `lookup` (normally `std::env::var`)
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(password) = lookup("AXIS_PASSWORD") {
            self.device.password = password;
        }
        if let Some(webhook) = lookup("SLACK_WEBHOOK") {
            self.notify.slack_webhook = Some(webhook);
        }
        if let Some(webhook) = lookup("GOOGLE_WEBHOOK") {
            self.notify.google_webhook = Some(webhook);
        }
        if let Some(status) = lookup("WORKFLOW_STATUS") {
            self.notify.status = status;
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration");
        config
    } else {
        info!(
            path = %path.display(),
            "Configuration file not found, using defaults"
        );
        Config::default()
    };

    config.apply_env(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
    Ok(config)
}

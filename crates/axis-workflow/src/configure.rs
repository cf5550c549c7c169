//! Configuration checklist with whole-pipeline retry
//!
//! Every item reads the current device value first and only writes on
//! divergence, so a failed attempt can restart from the first item.

use axis_core::{Orientation, ProvisionError, Resource, Result};
use axis_discovery::Pinger;
use axis_vapix::{GopSettings, NtpClientConfig, VapixClient};
use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::firmware::ensure_firmware;
use crate::firmware_fetch::FirmwareSource;
use crate::overlay::ensure_overlays;
use crate::storage::ensure_storage;

const VIEWER_PARAMS: [&str; 2] = ["System.BoaProtViewer", "Network.RTSP.ProtViewer"];
const TILT_PARAM: &str = "ImageSource.I0.CameraTiltOrientation";
const RETENTION_PARAM: &str = "Storage.S0.CleanupMaxAge";
const SNMP_SETTINGS: [(&str, &str); 5] = [
    ("SNMP.Enabled", "yes"),
    ("SNMP.V1", "yes"),
    ("SNMP.V2c", "yes"),
    ("SNMP.V3", "no"),
    ("SNMP.V1ReadCommunity", "public"),
];

/// Checklist items in the order they are applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecklistItem {
    AnonymousViewers,
    Orientation,
    Retention,
    Snmp,
    Firmware,
    Ntp,
    Storage,
    Gop,
    Strength,
    Overlays,
}

impl ChecklistItem {
    pub const ALL: [ChecklistItem; 10] = [
        ChecklistItem::AnonymousViewers,
        ChecklistItem::Orientation,
        ChecklistItem::Retention,
        ChecklistItem::Snmp,
        ChecklistItem::Firmware,
        ChecklistItem::Ntp,
        ChecklistItem::Storage,
        ChecklistItem::Gop,
        ChecklistItem::Strength,
        ChecklistItem::Overlays,
    ];
}

impl fmt::Display for ChecklistItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChecklistItem::AnonymousViewers => "anonymous viewers",
            ChecklistItem::Orientation => "orientation",
            ChecklistItem::Retention => "retention",
            ChecklistItem::Snmp => "snmp",
            ChecklistItem::Firmware => "firmware",
            ChecklistItem::Ntp => "ntp",
            ChecklistItem::Storage => "storage",
            ChecklistItem::Gop => "zipstream gop",
            ChecklistItem::Strength => "zipstream strength",
            ChecklistItem::Overlays => "overlays",
        };
        f.write_str(name)
    }
}

pub struct Configurator<'a> {
    client: &'a VapixClient,
    resource: &'a Resource,
    config: &'a Config,
    firmware: &'a dyn FirmwareSource,
    pinger: &'a dyn Pinger,
}

impl<'a> Configurator<'a> {
    pub fn new(
        client: &'a VapixClient,
        resource: &'a Resource,
        config: &'a Config,
        firmware: &'a dyn FirmwareSource,
        pinger: &'a dyn Pinger,
    ) -> Self {
        Self {
            client,
            resource,
            config,
            firmware,
            pinger,
        }
    }

    /// Run the checklist, retrying the whole of it on retryable failures
    pub async fn configure(&self) -> Result<()> {
        let workflow = &self.resource.spec.workflow;
        let max_attempts = workflow.max_retries.max(1);
        let delay = Duration::from_secs(workflow.retry_delay);

        let mut attempt = 1;
        loop {
            info!(device = %self.client.identity(), attempt, max_attempts, "Configuring AXIS camera");
            let error = match self.run_checklist().await {
                Ok(()) => {
                    info!(device = %self.client.identity(), "Successfully configured AXIS camera");
                    return Ok(());
                }
                Err(e) => e,
            };

            if !error.kind().is_retryable() {
                return Err(error);
            }
            if attempt >= max_attempts {
                error!(
                    device = %self.client.name(),
                    attempts = attempt,
                    error = %error,
                    "Configuration failed on every attempt"
                );
                return Err(ProvisionError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(error),
                });
            }

            warn!(
                device = %self.client.name(),
                attempt,
                max_attempts,
                retry_in_secs = delay.as_secs(),
                error = %error,
                "Configuration attempt failed"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }

    async fn run_checklist(&self) -> Result<()> {
        for item in ChecklistItem::ALL {
            debug!(device = %self.client.name(), item = %item, "Checking");
            self.apply(item).await?;
        }
        Ok(())
    }

    async fn apply(&self, item: ChecklistItem) -> Result<()> {
        match item {
            ChecklistItem::AnonymousViewers => self.enable_anonymous_viewers().await,
            ChecklistItem::Orientation => self.ensure_orientation().await,
            ChecklistItem::Retention => self.ensure_retention().await,
            ChecklistItem::Snmp => self.enable_snmp().await,
            ChecklistItem::Firmware => {
                if self.resource.spec.workflow.ignore_firmware_version {
                    info!(device = %self.client.name(), "Ignoring firmware version check");
                    return Ok(());
                }
                ensure_firmware(self.client, &self.config.firmware, self.firmware, self.pinger)
                    .await
            }
            ChecklistItem::Ntp => self.ensure_ntp().await,
            ChecklistItem::Storage => ensure_storage(self.client, &self.config.configure).await,
            ChecklistItem::Gop => self.ensure_gop().await,
            ChecklistItem::Strength => self.ensure_strength().await,
            ChecklistItem::Overlays => {
                ensure_overlays(self.client, &self.config.configure.overlay).await
            }
        }
    }

    /// Write `desired` only when any of the parameters differ
    async fn ensure_params(&self, groups: &[&str], desired: &[(&str, &str)]) -> Result<bool> {
        let current = self.client.get_params(groups).await?;
        let diverged = desired
            .iter()
            .any(|(name, value)| current.get(*name).map(String::as_str) != Some(*value));
        if diverged {
            self.client.set_params(desired).await?;
        }
        Ok(diverged)
    }

    async fn enable_anonymous_viewers(&self) -> Result<()> {
        let desired: Vec<(&str, &str)> = VIEWER_PARAMS.iter().map(|p| (*p, "anonymous")).collect();
        if self.ensure_params(&VIEWER_PARAMS, &desired).await? {
            info!(device = %self.client.name(), "Enabled anonymous viewers");
        }
        Ok(())
    }

    async fn ensure_orientation(&self) -> Result<()> {
        let desired = self.resource.spec.video.orientation;
        let current = self.client.get_params(&[TILT_PARAM]).await?;
        let current = current.get(TILT_PARAM).map(String::as_str);
        if current == Some(desired.tilt_value()) {
            debug!(device = %self.client.name(), orientation = %desired, "Orientation already set");
            return Ok(());
        }

        let from = current
            .and_then(Orientation::from_tilt_value)
            .map(|o| o.to_string())
            .unwrap_or_else(|| current.unwrap_or("unset").to_string());
        self.client
            .set_params(&[(TILT_PARAM, desired.tilt_value())])
            .await?;
        info!(device = %self.client.name(), from = %from, to = %desired, "Changed camera orientation");
        Ok(())
    }

    async fn ensure_retention(&self) -> Result<()> {
        let days = self.config.configure.retention_days.to_string();
        if self
            .ensure_params(&[RETENTION_PARAM], &[(RETENTION_PARAM, days.as_str())])
            .await?
        {
            info!(device = %self.client.name(), days = %days, "Extended recording retention");
        }
        Ok(())
    }

    async fn enable_snmp(&self) -> Result<()> {
        if self.ensure_params(&["SNMP"], &SNMP_SETTINGS).await? {
            info!(device = %self.client.name(), "Enabled SNMP");
        }
        Ok(())
    }

    async fn ensure_ntp(&self) -> Result<()> {
        let desired = NtpClientConfig::static_server(&self.config.configure.ntp_server);
        let current = self.client.ntp_client().await?;
        if current == desired {
            debug!(device = %self.client.name(), "NTP already configured");
            return Ok(());
        }
        self.client.set_ntp_client(&desired).await?;
        info!(device = %self.client.name(), server = %self.config.configure.ntp_server, "Configured NTP client");
        Ok(())
    }

    async fn ensure_gop(&self) -> Result<()> {
        let desired = GopSettings {
            mode: self.config.configure.gop_mode.clone(),
            max_gop_length: self.config.configure.max_gop_length,
        };
        let current = self.client.gop().await?;
        if current == desired {
            debug!(device = %self.client.name(), "Zipstream GOP already set");
            return Ok(());
        }
        self.client.set_gop_settings(&desired).await?;
        info!(
            device = %self.client.name(),
            mode = %desired.mode,
            max_gop_length = desired.max_gop_length,
            "Updated zipstream GOP"
        );
        Ok(())
    }

    async fn ensure_strength(&self) -> Result<()> {
        let desired = self.resource.spec.video.zipstream_strength.as_param();
        let current = self.client.strength().await?;
        if current == desired {
            debug!(device = %self.client.name(), strength = %desired, "Zipstream strength already set");
            return Ok(());
        }
        self.client.set_strength_level(&desired).await?;
        info!(device = %self.client.name(), from = %current, to = %desired, "Updated zipstream strength");
        Ok(())
    }
}

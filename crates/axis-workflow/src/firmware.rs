//! Firmware check and upgrade against the pinned release

use axis_core::{compare_firmware, FirmwareStatus, ProvisionError, Result};
use axis_discovery::{wait_for_consecutive_pings, Pinger};
use axis_vapix::VapixClient;
use tracing::{debug, info};

use crate::config::FirmwareConfig;
use crate::firmware_fetch::FirmwareSource;

/// Upgrade the device when its active firmware is not the pinned release.
///
/// The device reboots after the upload. It is considered back once it answers
/// `reboot_ping_threshold` pings in a row, and the version is checked again.
pub async fn ensure_firmware(
    client: &VapixClient,
    settings: &FirmwareConfig,
    source: &dyn FirmwareSource,
    pinger: &dyn Pinger,
) -> Result<()> {
    let active = client.active_firmware_version().await?;
    let status = compare_firmware(active.as_deref(), &settings.pin);
    if !status.needs_upgrade() {
        debug!(device = %client.name(), version = %settings.pin.release, "Firmware is up to date");
        return Ok(());
    }
    match &status {
        FirmwareStatus::Mismatch { active, target } => {
            info!(device = %client.name(), active = %active, target = %target, "Firmware needs upgrade");
        }
        _ => {
            info!(device = %client.name(), target = %settings.pin.release, "Device did not report a firmware version, upgrading");
        }
    }

    let image = source.fetch(&settings.pin).await?;
    info!(device = %client.name(), size = image.len(), "Uploading firmware image");
    client
        .upload_firmware(image, settings.upload_timeout())
        .await?;

    wait_for_consecutive_pings(
        pinger,
        client.host(),
        settings.reboot_ping_threshold,
        settings.reboot_timeout(),
        settings.ping_interval(),
    )
    .await?;

    let active = client.active_firmware_version().await?;
    if compare_firmware(active.as_deref(), &settings.pin).needs_upgrade() {
        return Err(ProvisionError::device_api(format!(
            "firmware on {} is {} after upgrade, expected {}",
            client.name(),
            active.as_deref().unwrap_or("unknown"),
            settings.pin.release
        )));
    }
    info!(device = %client.name(), version = %settings.pin.release, "Firmware upgraded");
    Ok(())
}

//! Local storage: bring every connected disk to the target filesystem

use axis_core::{ProvisionError, Result};
use axis_vapix::{Disk, FormatOutcome, VapixClient};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::ConfigureConfig;

/// Format any disk whose filesystem differs from the configured one
pub async fn ensure_storage(client: &VapixClient, settings: &ConfigureConfig) -> Result<()> {
    let disks = client.disks().await?;
    if disks.is_empty() {
        info!(device = %client.name(), "No disks reported, skipping storage check");
        return Ok(());
    }

    for disk in &disks {
        if disk.filesystem == settings.filesystem {
            debug!(device = %client.name(), disk = %disk.disk_id, filesystem = %disk.filesystem, "Disk already has target filesystem");
            continue;
        }
        if disk.is_disconnected() {
            warn!(device = %client.name(), disk = %disk.disk_id, "Disk is disconnected, not formatting");
            continue;
        }
        format_disk(client, disk, settings).await?;
    }
    Ok(())
}

async fn format_disk(client: &VapixClient, disk: &Disk, settings: &ConfigureConfig) -> Result<()> {
    info!(
        device = %client.name(),
        disk = %disk.disk_id,
        from = %disk.filesystem,
        to = %settings.filesystem,
        "Formatting disk"
    );

    let job_id = match client.start_format(&disk.disk_id, &settings.filesystem).await? {
        FormatOutcome::Started { job_id } => job_id,
        FormatOutcome::Busy => {
            info!(device = %client.name(), disk = %disk.disk_id, "Disk is mounted, unmounting before format");
            client.set_disk_mounted("unmount", &disk.disk_id).await?;
            match client.start_format(&disk.disk_id, &settings.filesystem).await? {
                FormatOutcome::Started { job_id } => job_id,
                FormatOutcome::Busy => {
                    return Err(ProvisionError::device_api(format!(
                        "disk {} on {} still busy after unmount",
                        disk.disk_id,
                        client.name()
                    )))
                }
            }
        }
    };

    wait_for_job(client, &job_id, &disk.disk_id, settings).await?;

    client.set_disk_mounted("mount", &disk.disk_id).await?;
    info!(device = %client.name(), disk = %disk.disk_id, "Disk formatted and mounted");
    Ok(())
}

async fn wait_for_job(
    client: &VapixClient,
    job_id: &str,
    disk_id: &str,
    settings: &ConfigureConfig,
) -> Result<()> {
    let timeout = settings.format_timeout();
    let start = Instant::now();
    loop {
        let job = client.disk_job(job_id, disk_id).await?;
        if job.is_error() {
            return Err(ProvisionError::device_api(format!(
                "format job {} on disk {} failed",
                job_id, disk_id
            )));
        }
        if job.is_complete() {
            debug!(device = %client.name(), job = %job_id, "Format job complete");
            return Ok(());
        }
        if !job.is_ok() {
            return Err(ProvisionError::device_api(format!(
                "unexpected result {:?} for format job {}",
                job.result, job_id
            )));
        }
        debug!(
            device = %client.name(),
            job = %job_id,
            progress = job.progress.as_deref().unwrap_or("?"),
            "Format in progress"
        );
        if start.elapsed() >= timeout {
            return Err(ProvisionError::device_api(format!(
                "format job {} did not complete within {}s",
                job_id,
                timeout.as_secs()
            )));
        }
        sleep(settings.format_poll()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{DeviceModel, FakeDevice};
    use axis_core::{Credentials, DeviceIdentity, ErrorKind};
    use axis_vapix::Endpoint;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn client(device: &Arc<FakeDevice>) -> VapixClient {
        VapixClient::new(
            DeviceIdentity::new(
                "camera-01",
                Ipv4Addr::new(10, 0, 1, 50),
                Credentials::new("root", "admin"),
            ),
            device.clone(),
        )
    }

    fn unmounts(device: &FakeDevice) -> usize {
        device
            .requests_to(Endpoint::DiskMount)
            .iter()
            .filter(|r| r.param("action") == Some("unmount"))
            .count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_disk_is_unmounted_once() {
        let device = Arc::new(FakeDevice::new(DeviceModel::bootstrapped()));
        ensure_storage(&client(&device), &ConfigureConfig::default())
            .await
            .unwrap();

        assert_eq!(unmounts(&device), 1);
        assert_eq!(device.requests_to(Endpoint::DiskFormat).len(), 2);
        let model = device.model();
        assert_eq!(model.disk_filesystem, "ext4");
        assert!(model.disk_mounted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmounted_disk_formats_directly() {
        let mut model = DeviceModel::bootstrapped();
        model.disk_mounted = false;
        let device = Arc::new(FakeDevice::new(model));
        ensure_storage(&client(&device), &ConfigureConfig::default())
            .await
            .unwrap();

        assert_eq!(unmounts(&device), 0);
        assert_eq!(device.requests_to(Endpoint::DiskFormat).len(), 1);
        assert_eq!(device.requests_to(Endpoint::DiskJob).len(), 2);
    }

    #[tokio::test]
    async fn test_matching_filesystem_is_left_alone() {
        let mut model = DeviceModel::bootstrapped();
        model.disk_filesystem = "ext4".to_string();
        let device = Arc::new(FakeDevice::new(model));
        ensure_storage(&client(&device), &ConfigureConfig::default())
            .await
            .unwrap();
        assert!(device.mutating_requests().is_empty());
    }

    #[tokio::test]
    async fn test_disconnected_disk_is_skipped() {
        let mut model = DeviceModel::bootstrapped();
        model.disk_status = "disconnected".to_string();
        let device = Arc::new(FakeDevice::new(model));
        ensure_storage(&client(&device), &ConfigureConfig::default())
            .await
            .unwrap();
        assert!(device.mutating_requests().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_format_job_times_out() {
        let mut model = DeviceModel::bootstrapped();
        model.disk_mounted = false;
        model.job_polls_until_done = u32::MAX;
        let device = Arc::new(FakeDevice::new(model));
        let settings = ConfigureConfig {
            format_timeout_secs: 60,
            ..ConfigureConfig::default()
        };

        let err = ensure_storage(&client(&device), &settings).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DeviceApi);
        // Polls at 0, 5, ..., 60 seconds
        assert_eq!(device.requests_to(Endpoint::DiskJob).len(), 13);
    }
}

//! ICMP reachability probing and bounded wait loops

use async_trait::async_trait;
use axis_core::{ProvisionError, Result};
use std::net::Ipv4Addr;
use std::process::Stdio;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, trace};

/// Single reachability probe
#[async_trait]
pub trait Pinger: Send + Sync {
    async fn ping(&self, ip: Ipv4Addr) -> bool;
}

/// Shells out to the system `ping` with one echo request
#[derive(Debug, Clone, Copy, Default)]
pub struct IcmpPinger;

#[async_trait]
impl Pinger for IcmpPinger {
    async fn ping(&self, ip: Ipv4Addr) -> bool {
        let result = tokio::process::Command::new("ping")
            .args(["-c", "1", "-W", "1", &ip.to_string()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match result {
            Ok(status) => status.success(),
            Err(e) => {
                debug!(ip = %ip, error = %e, "Failed to run ping");
                false
            }
        }
    }
}

/// Ping `ip` until it answers once or `timeout` elapses
pub async fn wait_until_reachable(
    pinger: &dyn Pinger,
    ip: Ipv4Addr,
    timeout: Duration,
    interval: Duration,
) -> Result<()> {
    info!(ip = %ip, timeout_secs = timeout.as_secs(), "Waiting for device to answer pings");
    let start = Instant::now();
    loop {
        if pinger.ping(ip).await {
            info!(ip = %ip, elapsed_ms = start.elapsed().as_millis() as u64, "Device is reachable");
            return Ok(());
        }
        if start.elapsed() >= timeout {
            return Err(ProvisionError::Unreachable {
                ip,
                message: format!("did not respond to pings within {}s", timeout.as_secs()),
            });
        }
        trace!(ip = %ip, "No ping reply yet");
        sleep(interval).await;
    }
}

/// Wait until `ip` answers `threshold` pings in a row.
///
/// A single reply right after an upgrade may come from the device before it
/// actually goes down for the reboot, so one success is not enough.
pub async fn wait_for_consecutive_pings(
    pinger: &dyn Pinger,
    ip: Ipv4Addr,
    threshold: u32,
    timeout: Duration,
    interval: Duration,
) -> Result<()> {
    info!(ip = %ip, threshold, timeout_secs = timeout.as_secs(), "Waiting for device to come back online");
    let start = Instant::now();
    let mut consecutive = 0u32;
    loop {
        if pinger.ping(ip).await {
            consecutive += 1;
            trace!(ip = %ip, consecutive, "Ping reply");
            if consecutive >= threshold {
                info!(ip = %ip, elapsed_secs = start.elapsed().as_secs(), "Device is back online");
                return Ok(());
            }
        } else {
            if consecutive > 0 {
                debug!(ip = %ip, after = consecutive, "Ping streak broken");
            }
            consecutive = 0;
        }
        if start.elapsed() >= timeout {
            return Err(ProvisionError::Unreachable {
                ip,
                message: format!(
                    "did not answer {} consecutive pings within {}s",
                    threshold,
                    timeout.as_secs()
                ),
            });
        }
        sleep(interval).await;
    }
}

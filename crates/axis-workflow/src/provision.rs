//! Provisioning: bootstrap admin access and assign the network identity
//!
//! The device's starting point is inferred from probe responses, never stored:
//!
//! ```text
//! Unbootstrapped -> Bootstrapped -> Authenticated -> NetworkAssigned -> Resolved
//! ```
//!
//! Creating the initial admin account is irreversible and only happens when the
//! probe reports that no account exists yet.

use axis_core::{
    ErrorKind, NetworkIntent, NetworkMode, ProvisionError, Result, Subnet, WorkflowState,
};
use axis_discovery::{resolve_ip_address, wait_until_reachable, HostScanner, Pinger};
use axis_vapix::{AccountProbe, VapixClient};
use std::net::Ipv4Addr;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::config::ProvisionConfig;

pub struct Provisioner<'a> {
    client: VapixClient,
    settings: &'a ProvisionConfig,
    scanner: &'a dyn HostScanner,
    pinger: &'a dyn Pinger,
}

impl<'a> Provisioner<'a> {
    pub fn new(
        client: VapixClient,
        settings: &'a ProvisionConfig,
        scanner: &'a dyn HostScanner,
        pinger: &'a dyn Pinger,
    ) -> Self {
        Self {
            client,
            settings,
            scanner,
            pinger,
        }
    }

    /// Host the device is currently addressed at
    pub fn host(&self) -> Ipv4Addr {
        self.client.host()
    }

    /// Run the state machine and return the state for the next step
    pub async fn provision(
        &mut self,
        intent: &NetworkIntent,
        mut state: WorkflowState,
    ) -> Result<WorkflowState> {
        state.set_credentials(self.client.credentials());
        info!(device = %self.client.identity(), "Provisioning AXIS camera");

        self.ensure_admin_access().await?;

        match &intent.mode {
            NetworkMode::Static { address, router } => {
                self.assign_static(*address, *router).await?;
            }
            NetworkMode::Dhcp {
                mac_address,
                subnet,
            } => {
                self.assign_dhcp(mac_address, subnet).await?;
            }
        }

        state.ip_address = Some(self.client.host());
        info!(device = %self.client.identity(), "Successfully provisioned AXIS camera");
        Ok(state)
    }

    /// Unbootstrapped -> Bootstrapped -> Authenticated
    async fn ensure_admin_access(&self) -> Result<()> {
        if self.client.probe_accounts().await == AccountProbe::MissingInitialAdmin {
            info!(device = %self.client.identity(), "Missing initial admin user, creating it");
            self.client.create_admin_user(self.client.credentials()).await?;
        }

        match self.client.probe_accounts().await {
            AccountProbe::Authorized => {
                debug!(device = %self.client.identity(), "Root access verified");
                Ok(())
            }
            other => Err(ProvisionError::Auth(format!(
                "could not achieve root access privileges on {} ({:?})",
                self.client.identity(),
                other
            ))),
        }
    }

    /// The new address is only adopted once it answers pings
    async fn assign_static(&mut self, address: Ipv4Addr, router: Ipv4Addr) -> Result<()> {
        let hostname = self.client.name().to_string();
        info!(device = %self.client.identity(), hostname = %hostname, "Setting static hostname");
        self.client.set_static_hostname(&hostname).await?;

        info!(device = %self.client.identity(), address = %address, router = %router, "Setting static IPv4 address");
        self.client
            .set_static_ipv4(
                &self.settings.interface,
                address,
                self.settings.prefix_length,
                router,
            )
            .await?;

        if self.client.host() != address {
            info!(device = %self.client.identity(), address = %address, "Waiting for camera at its new static address");
            wait_until_reachable(
                self.pinger,
                address,
                self.settings.reachability_timeout(),
                self.settings.ping_interval(),
            )
            .await?;
        }

        self.client.set_host(address);
        Ok(())
    }

    async fn assign_dhcp(&mut self, mac_address: &str, subnet: &Subnet) -> Result<()> {
        let info = self.client.network_info().await?;
        let was_dhcp = info.configuration_mode(&self.settings.interface) == Some("dhcp");

        self.client.enable_dhcp_hostname().await?;
        self.client.enable_dhcp_ipv4(&self.settings.interface).await?;
        info!(device = %self.client.identity(), "Enabled DHCP address and hostname configuration");

        let resolved = if was_dhcp {
            self.resolve_existing_lease(mac_address, subnet).await?
        } else {
            self.await_new_lease(mac_address, subnet).await?
        };

        self.client.set_host(resolved);
        Ok(())
    }

    /// Device was already on DHCP: re-resolve once and accept drift with a warning
    async fn resolve_existing_lease(&self, mac_address: &str, subnet: &Subnet) -> Result<Ipv4Addr> {
        info!(device = %self.client.identity(), "Camera was already on DHCP, resolving it again");
        let resolved = resolve_ip_address(self.scanner, mac_address, subnet).await?;
        if resolved != self.client.host() {
            warn!(
                device = %self.client.name(),
                from = %self.client.host(),
                to = %resolved,
                "Camera unexpectedly changed IP address"
            );
        }
        Ok(resolved)
    }

    /// Device just switched to DHCP: poll until its lease shows up at a new address
    async fn await_new_lease(&self, mac_address: &str, subnet: &Subnet) -> Result<Ipv4Addr> {
        let window = self.settings.dhcp_resolve_window();
        let previous = self.client.host();
        info!(
            device = %self.client.identity(),
            window_secs = window.as_secs(),
            "Resolving the new DHCP assigned address"
        );

        let start = Instant::now();
        loop {
            match resolve_ip_address(self.scanner, mac_address, subnet).await {
                Ok(ip) if ip != previous => {
                    info!(device = %self.client.name(), ip = %ip, "Resolved DHCP assigned address");
                    return Ok(ip);
                }
                Ok(_) => {
                    debug!(device = %self.client.name(), "Camera still answers at its previous address");
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(device = %self.client.name(), "Camera not visible in scan yet");
                }
                Err(e) => return Err(e),
            }

            if start.elapsed() >= window {
                return Err(ProvisionError::Unresolved(format!(
                    "no new DHCP address for {} ({}) within {}s",
                    self.client.name(),
                    mac_address,
                    window.as_secs()
                )));
            }
            sleep(self.settings.dhcp_poll_interval()).await;
        }
    }
}

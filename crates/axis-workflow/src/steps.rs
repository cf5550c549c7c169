//! Workflow steps and the runner that records their failures
//!
//! Each step is a separate process invocation. Steps share nothing but the
//! state document, which every step except notify reads or writes through the
//! injected [`StateStore`].

use anyhow::Context;
use axis_core::{
    record_failure, validate_serial_number, Credentials, DeviceIdentity, Locator, ProvisionError,
    Resource, Result, StateStore, StatusReport, WorkflowState,
};
use axis_discovery::{resolve_ip_address, resolve_mac_address, HostScanner, Pinger};
use axis_vapix::{AccountProbe, Transport, VapixClient};
use clap::ValueEnum;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::Config;
use crate::configure::Configurator;
use crate::firmware_fetch::FirmwareSource;
use crate::notify::Notifier;
use crate::provision::Provisioner;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Step {
    Discover,
    Provision,
    Configure,
    Verify,
    Notify,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Discover => "discover",
            Step::Provision => "provision",
            Step::Configure => "configure",
            Step::Verify => "verify",
            Step::Notify => "notify",
        };
        f.write_str(name)
    }
}

/// External collaborators of the workflow
pub struct Backends {
    pub store: Arc<dyn StateStore>,
    pub transport: Arc<dyn Transport>,
    pub scanner: Arc<dyn HostScanner>,
    pub pinger: Arc<dyn Pinger>,
    pub firmware: Arc<dyn FirmwareSource>,
}

pub struct Workflow {
    config: Config,
    resource: Resource,
    backends: Backends,
}

impl Workflow {
    pub fn new(config: Config, resource: Resource, backends: Backends) -> Self {
        Self {
            config,
            resource,
            backends,
        }
    }

    /// Run one step. Failures of every step but notify are merged into the
    /// state document before they propagate.
    pub async fn run(&self, step: Step) -> anyhow::Result<()> {
        info!(step = %step, resource = %self.resource.name(), "Running workflow step");

        if step == Step::Notify {
            self.notify().await;
            return Ok(());
        }

        let result = match step {
            Step::Discover => self.discover().await,
            Step::Provision => self.provision().await,
            Step::Configure => self.configure().await,
            Step::Verify => self.verify().await,
            Step::Notify => Ok(()),
        };

        if let Err(e) = &result {
            if let Err(save_err) = record_failure(self.backends.store.as_ref(), &step.to_string(), e)
            {
                warn!(error = %save_err, "Failed to record step failure in workflow state");
            }
        }
        result.with_context(|| format!("AXIS {} step failed", step))
    }

    fn client(&self, host: Ipv4Addr, credentials: Credentials) -> VapixClient {
        let identity = DeviceIdentity::new(self.resource.name(), host, credentials)
            .with_timeout(self.config.device.timeout());
        VapixClient::new(identity, self.backends.transport.clone())
    }

    /// Locate the camera and start a fresh state document with its address
    pub async fn discover(&self) -> Result<()> {
        let intent = self.resource.network_intent()?;
        let scanner = self.backends.scanner.as_ref();

        let ip_address = match &intent.locator {
            Locator::Mac {
                mac_address,
                subnet,
            } => {
                let ip = resolve_ip_address(scanner, mac_address, subnet).await?;
                validate_serial_number(mac_address)?;
                ip
            }
            Locator::Ip { ip_address, subnet } => {
                let mac = resolve_mac_address(scanner, *ip_address, subnet).await?;
                validate_serial_number(&mac).map_err(|_| {
                    ProvisionError::Validation(format!(
                        "MAC address {} at {} is not a valid Axis serial number",
                        mac, ip_address
                    ))
                })?;
                *ip_address
            }
        };

        info!(ip = %ip_address, resource = %self.resource.name(), "Discovered AXIS camera");
        self.backends.store.save(&WorkflowState::discovered(ip_address))
    }

    pub async fn provision(&self) -> Result<()> {
        let intent = self.resource.network_intent()?;
        let mut state = self.backends.store.load()?;
        let host = state.require_ip_address()?;

        let client = self.client(host, self.config.device.credentials());
        let mut provisioner = Provisioner::new(
            client,
            &self.config.provision,
            self.backends.scanner.as_ref(),
            self.backends.pinger.as_ref(),
        );
        let provisioned = provisioner.provision(&intent, state.clone()).await?;
        info!(ip = %provisioner.host(), "Camera provisioned, saving workflow state");

        state.merge(provisioned);
        self.backends.store.save(&state)
    }

    pub async fn configure(&self) -> Result<()> {
        let settle = self.config.configure.settle_delay();
        info!(seconds = settle.as_secs(), "Waiting for network changes to settle");
        sleep(settle).await;

        let state = self.backends.store.load()?;
        let client = self.client(state.require_ip_address()?, state.require_credentials()?);
        Configurator::new(
            &client,
            &self.resource,
            &self.config,
            self.backends.firmware.as_ref(),
            self.backends.pinger.as_ref(),
        )
        .configure()
        .await
    }

    /// Confirm the camera answers at its final address with the stored credentials
    pub async fn verify(&self) -> Result<()> {
        let state = self.backends.store.load()?;
        let ip = state.require_ip_address()?;

        if !self.backends.pinger.ping(ip).await {
            return Err(ProvisionError::Unreachable {
                ip,
                message: "did not answer ping during verification".to_string(),
            });
        }

        let client = self.client(ip, state.require_credentials()?);
        match client.probe_accounts().await {
            AccountProbe::Authorized => {
                info!(device = %client.identity(), "Verified AXIS camera");
                Ok(())
            }
            other => Err(ProvisionError::Auth(format!(
                "stored credentials do not grant access to {} ({:?})",
                client.identity(),
                other
            ))),
        }
    }

    /// Report the outcome. Never fails the workflow.
    pub async fn notify(&self) {
        let state = match self.backends.store.load() {
            Ok(state) => state,
            Err(e) => {
                warn!(error = %e, "No readable workflow state, reporting without it");
                WorkflowState::default()
            }
        };

        let report = StatusReport::new(
            self.resource.clone(),
            state,
            self.config.notify.status.clone(),
        );
        match Notifier::new(self.config.notify.clone()) {
            Ok(notifier) => notifier.send(&report).await,
            Err(e) => warn!(error = %e, "Failed to create notifier"),
        }
    }
}

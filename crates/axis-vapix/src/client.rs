//! Device API client: one generic `request` primitive plus named wrappers
//!
//! Every wrapper returns the raw `Option<VapixResponse>`; the typed operations
//! in [`crate::api`] interpret it.

use axis_core::{Credentials, DeviceIdentity};
use serde_json::Value;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::endpoint::Endpoint;
use crate::transport::{Method, Transport, VapixRequest, VapixResponse};

/// Default `context` member sent with JSON-RPC requests
pub const RPC_CONTEXT: &str = "Axis Provisioning Workflow";

/// Build a JSON-RPC style request body
pub fn rpc(method: &str, params: Option<Value>) -> Value {
    let mut body = serde_json::json!({
        "apiVersion": "1.0",
        "context": RPC_CONTEXT,
        "method": method,
    });
    if let Some(params) = params {
        body["params"] = params;
    }
    body
}

fn owned(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn json_headers() -> Vec<(String, String)> {
    vec![("Content-Type".to_string(), "application/json".to_string())]
}

/// Client bound to one device
#[derive(Clone)]
pub struct VapixClient {
    identity: DeviceIdentity,
    transport: Arc<dyn Transport>,
}

impl VapixClient {
    pub fn new(identity: DeviceIdentity, transport: Arc<dyn Transport>) -> Self {
        Self {
            identity,
            transport,
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn host(&self) -> Ipv4Addr {
        self.identity.host
    }

    /// Point the client at a newly assigned address
    pub fn set_host(&mut self, host: Ipv4Addr) {
        self.identity.host = host;
    }

    pub fn credentials(&self) -> &Credentials {
        &self.identity.credentials
    }

    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.identity.credentials = credentials;
    }

    /// Send one authenticated request. `None` means no response was received.
    pub async fn request(
        &self,
        method: Method,
        endpoint: Endpoint,
        headers: Vec<(String, String)>,
        params: Vec<(String, String)>,
        body: Option<Vec<u8>>,
    ) -> Option<VapixResponse> {
        let timeout = self.identity.timeout;
        self.send(method, endpoint, headers, params, body, timeout)
            .await
    }

    async fn send(
        &self,
        method: Method,
        endpoint: Endpoint,
        headers: Vec<(String, String)>,
        params: Vec<(String, String)>,
        body: Option<Vec<u8>>,
        timeout: Option<Duration>,
    ) -> Option<VapixResponse> {
        let request = VapixRequest {
            method,
            host: self.identity.host,
            endpoint,
            headers,
            params,
            body,
            credentials: self.identity.credentials.clone(),
            timeout,
        };
        self.transport.send(&request).await
    }

    async fn get(&self, endpoint: Endpoint, params: Vec<(String, String)>) -> Option<VapixResponse> {
        self.request(Method::Get, endpoint, json_headers(), params, None)
            .await
    }

    async fn post_json(&self, endpoint: Endpoint, payload: &Value) -> Option<VapixResponse> {
        self.request(
            Method::Post,
            endpoint,
            json_headers(),
            Vec::new(),
            Some(payload.to_string().into_bytes()),
        )
        .await
    }

    /// `param.cgi?action=list&group=...`
    pub async fn list_params(&self, groups: &[&str]) -> Option<VapixResponse> {
        debug!(device = %self.identity, groups = ?groups, "Listing parameters");
        self.get(
            Endpoint::Params,
            owned(&[("action", "list"), ("group", &groups.join(","))]),
        )
        .await
    }

    /// `param.cgi?action=update&Name=value...`
    pub async fn update_params(&self, values: &[(String, String)]) -> Option<VapixResponse> {
        debug!(device = %self.identity, count = values.len(), "Updating parameters");
        let mut params = vec![("action".to_string(), "update".to_string())];
        params.extend(values.iter().cloned());
        self.get(Endpoint::Params, params).await
    }

    /// `pwdgrp.cgi` with arbitrary parameters (add, update, get, remove)
    pub async fn user_management(&self, params: &[(&str, &str)]) -> Option<VapixResponse> {
        debug!(device = %self.identity, "User management");
        self.get(Endpoint::UserManagement, owned(params)).await
    }

    pub async fn network_settings(&self, payload: &Value) -> Option<VapixResponse> {
        debug!(device = %self.identity, "Network settings");
        self.post_json(Endpoint::NetworkSettings, payload).await
    }

    /// `firmwaremanagement.cgi` read-only calls (status)
    pub async fn firmware_management(&self, method: &str) -> Option<VapixResponse> {
        debug!(device = %self.identity, method = %method, "Firmware management");
        self.get(
            Endpoint::FirmwareManagement,
            owned(&[("apiVersion", "1.0"), ("context", RPC_CONTEXT), ("method", method)]),
        )
        .await
    }

    /// Upload a firmware image. The device reboots after accepting it.
    ///
    /// Uses `timeout` instead of the per-device timeout; `None` waits as long
    /// as the upload takes.
    pub async fn upgrade_firmware(
        &self,
        image: Vec<u8>,
        timeout: Option<Duration>,
    ) -> Option<VapixResponse> {
        debug!(device = %self.identity, size = image.len(), ?timeout, "Uploading firmware");
        self.send(
            Method::Post,
            Endpoint::FirmwareUpgrade,
            vec![(
                "Content-Type".to_string(),
                "application/octet-stream".to_string(),
            )],
            owned(&[("type", "normal")]),
            Some(image),
            timeout,
        )
        .await
    }

    pub async fn ntp(&self, payload: &Value) -> Option<VapixResponse> {
        debug!(device = %self.identity, "NTP client");
        self.post_json(Endpoint::Ntp, payload).await
    }

    pub async fn list_disks(&self) -> Option<VapixResponse> {
        debug!(device = %self.identity, "Listing disks");
        self.get(Endpoint::DiskList, owned(&[("diskid", "all")])).await
    }

    pub async fn format_disk(&self, disk_id: &str, filesystem: &str) -> Option<VapixResponse> {
        debug!(device = %self.identity, disk = %disk_id, filesystem = %filesystem, "Formatting disk");
        self.get(
            Endpoint::DiskFormat,
            owned(&[("diskid", disk_id), ("filesystem", filesystem)]),
        )
        .await
    }

    /// `action` is `mount` or `unmount`
    pub async fn mount_disk(&self, action: &str, disk_id: &str) -> Option<VapixResponse> {
        debug!(device = %self.identity, disk = %disk_id, action = %action, "Disk mount");
        self.get(
            Endpoint::DiskMount,
            owned(&[("action", action), ("diskid", disk_id)]),
        )
        .await
    }

    pub async fn job_progress(&self, job_id: &str, disk_id: &str) -> Option<VapixResponse> {
        self.get(
            Endpoint::DiskJob,
            owned(&[("jobid", job_id), ("diskid", disk_id)]),
        )
        .await
    }

    pub async fn get_gop(&self) -> Option<VapixResponse> {
        self.get(Endpoint::ZipstreamGetGop, owned(&[("schemaversion", "1")]))
            .await
    }

    /// New settings apply to new streams on all channels
    pub async fn set_gop(&self, mode: &str, max_gop_length: u32) -> Option<VapixResponse> {
        debug!(device = %self.identity, mode = %mode, max_gop_length, "Setting zipstream GOP");
        self.get(
            Endpoint::ZipstreamSetGop,
            owned(&[
                ("schemaversion", "1"),
                ("gopmode", mode),
                ("maxgoplength", &max_gop_length.to_string()),
            ]),
        )
        .await
    }

    pub async fn get_strength(&self) -> Option<VapixResponse> {
        self.get(
            Endpoint::ZipstreamGetStrength,
            owned(&[("schemaversion", "1")]),
        )
        .await
    }

    pub async fn set_strength(&self, strength: &str) -> Option<VapixResponse> {
        debug!(device = %self.identity, strength = %strength, "Setting zipstream strength");
        self.get(
            Endpoint::ZipstreamSetStrength,
            owned(&[("schemaversion", "1"), ("strength", strength)]),
        )
        .await
    }

    pub async fn dynamic_overlay(&self, payload: &Value) -> Option<VapixResponse> {
        debug!(device = %self.identity, "Text overlay operation");
        self.post_json(Endpoint::DynamicOverlay, payload).await
    }
}

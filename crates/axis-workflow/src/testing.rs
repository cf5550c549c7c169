//! In-memory doubles for the device, scanner, pinger and firmware store

use async_trait::async_trait;
use axis_core::{Credentials, FirmwarePin, Result, Subnet};
use axis_discovery::{HostScanner, Pinger, ScannedHost};
use axis_vapix::{Endpoint, NtpClientConfig, Transport, VapixRequest, VapixResponse};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::net::Ipv4Addr;
use std::sync::Mutex;

use crate::firmware_fetch::FirmwareSource;

/// Simulated device settings
#[derive(Debug, Clone)]
pub struct DeviceModel {
    pub admin_created: bool,
    pub credentials: Credentials,
    pub params: BTreeMap<String, String>,
    pub ipv4_mode: String,
    pub hostname: Option<String>,
    pub static_address: Option<Ipv4Addr>,
    pub firmware_version: Option<String>,
    /// Version reported once an image has been uploaded
    pub firmware_after_upgrade: String,
    pub ntp: NtpClientConfig,
    pub disk_filesystem: String,
    pub disk_status: String,
    pub disk_mounted: bool,
    /// Reject format with 403 while the disk is mounted
    pub format_busy_when_mounted: bool,
    pending_filesystem: Option<String>,
    /// Job polls before a format reports 100%
    pub job_polls_until_done: u32,
    job_polls: u32,
    pub gop_mode: String,
    pub max_gop_length: u32,
    pub strength: String,
    pub overlays: Vec<(u32, String)>,
}

impl DeviceModel {
    /// Device straight out of the box
    pub fn factory() -> Self {
        let params = [
            ("System.BoaProtViewer", "password"),
            ("Network.RTSP.ProtViewer", "password"),
            ("ImageSource.I0.CameraTiltOrientation", "0"),
            ("Storage.S0.CleanupMaxAge", "7"),
            ("SNMP.Enabled", "no"),
            ("SNMP.V1", "no"),
            ("SNMP.V2c", "no"),
            ("SNMP.V3", "no"),
            ("SNMP.V1ReadCommunity", ""),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            admin_created: false,
            credentials: Credentials::new("root", "admin"),
            params,
            ipv4_mode: "dhcp".to_string(),
            hostname: None,
            static_address: None,
            firmware_version: Some("10.5.1".to_string()),
            firmware_after_upgrade: "10.12.166".to_string(),
            ntp: NtpClientConfig {
                enabled: true,
                servers_source: "DHCP".to_string(),
                static_servers: Vec::new(),
            },
            disk_filesystem: "vfat".to_string(),
            disk_status: "OK".to_string(),
            disk_mounted: true,
            format_busy_when_mounted: true,
            pending_filesystem: None,
            job_polls_until_done: 2,
            job_polls: 0,
            gop_mode: "fixed".to_string(),
            max_gop_length: 32,
            strength: "10".to_string(),
            overlays: Vec::new(),
        }
    }

    /// Device with the admin account already created
    pub fn bootstrapped() -> Self {
        Self {
            admin_created: true,
            ..Self::factory()
        }
    }
}

/// Scripted device answering VAPIX requests from a [`DeviceModel`]
pub struct FakeDevice {
    model: Mutex<DeviceModel>,
    requests: Mutex<Vec<VapixRequest>>,
    /// Remaining forced "no response" answers per endpoint
    outages: Mutex<HashMap<Endpoint, u32>>,
}

impl FakeDevice {
    pub fn new(model: DeviceModel) -> Self {
        Self {
            model: Mutex::new(model),
            requests: Mutex::new(Vec::new()),
            outages: Mutex::new(HashMap::new()),
        }
    }

    /// Answer the next `times` requests to `endpoint` with no response
    pub fn fail_next(&self, endpoint: Endpoint, times: u32) {
        self.outages.lock().unwrap().insert(endpoint, times);
    }

    pub fn model(&self) -> DeviceModel {
        self.model.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<VapixRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn clear_requests(&self) {
        self.requests.lock().unwrap().clear();
    }

    pub fn requests_to(&self, endpoint: Endpoint) -> Vec<VapixRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.endpoint == endpoint)
            .collect()
    }

    /// Requests that change device state
    pub fn mutating_requests(&self) -> Vec<VapixRequest> {
        self.requests().into_iter().filter(is_mutating).collect()
    }

    /// Parameter list requests naming `group`
    pub fn param_reads(&self, group: &str) -> usize {
        self.requests_to(Endpoint::Params)
            .iter()
            .filter(|r| r.param("action") == Some("list"))
            .filter(|r| r.param("group").is_some_and(|g| g.split(',').any(|g| g == group)))
            .count()
    }

    fn handle(&self, request: &VapixRequest) -> VapixResponse {
        let mut model = self.model.lock().unwrap();

        if request.endpoint == Endpoint::UserManagement {
            return user_management(&mut model, request);
        }
        if !model.admin_created {
            return VapixResponse::new(401, "Error: initial admin user must be created first");
        }
        if request.credentials != model.credentials {
            return VapixResponse::new(401, "Unauthorized");
        }

        match request.endpoint {
            Endpoint::Params => params(&mut model, request),
            Endpoint::NetworkSettings => network_settings(&mut model, request),
            Endpoint::FirmwareManagement => rpc_data(json!({
                "activeFirmwareVersion": model.firmware_version,
            })),
            Endpoint::FirmwareUpgrade => {
                model.firmware_version = Some(model.firmware_after_upgrade.clone());
                VapixResponse::new(200, "OK")
            }
            Endpoint::Ntp => match request.rpc_method().as_deref() {
                Some("getNTPInfo") => rpc_data(json!({ "client": model.ntp })),
                Some("setNTPClientConfiguration") => {
                    if let Some(params) = request.json_body().and_then(|b| b.get("params").cloned()) {
                        if let Ok(config) = serde_json::from_value(params) {
                            model.ntp = config;
                        }
                    }
                    rpc_data(json!({}))
                }
                _ => rpc_error(1000, "unknown method"),
            },
            Endpoint::DiskList => VapixResponse::new(
                200,
                format!(
                    r#"<?xml version="1.0"?><root><disks numberofdisks="1"><disk diskid="SD_DISK" totalsize="31154688" freesize="31000000" status="{}" filesystem="{}" group="S0"/></disks></root>"#,
                    model.disk_status, model.disk_filesystem
                ),
            ),
            Endpoint::DiskFormat => {
                if model.disk_mounted && model.format_busy_when_mounted {
                    return VapixResponse::new(403, "Forbidden");
                }
                model.pending_filesystem = request.param("filesystem").map(str::to_string);
                model.job_polls = 0;
                job("1", "OK", "0")
            }
            Endpoint::DiskMount => {
                model.disk_mounted = request.param("action") == Some("mount");
                job("2", "OK", "100")
            }
            Endpoint::DiskJob => {
                model.job_polls += 1;
                if model.job_polls >= model.job_polls_until_done {
                    if let Some(filesystem) = model.pending_filesystem.take() {
                        model.disk_filesystem = filesystem;
                    }
                    job("1", "OK", "100")
                } else {
                    job("1", "OK", "50")
                }
            }
            Endpoint::ZipstreamGetGop => VapixResponse::new(
                200,
                format!(
                    r#"<ZipstreamResponse><GetGopSuccess><Gop mode="{}" maxgoplength="{}"/></GetGopSuccess></ZipstreamResponse>"#,
                    model.gop_mode, model.max_gop_length
                ),
            ),
            Endpoint::ZipstreamSetGop => {
                if let Some(mode) = request.param("gopmode") {
                    model.gop_mode = mode.to_string();
                }
                if let Some(length) = request.param("maxgoplength").and_then(|v| v.parse().ok()) {
                    model.max_gop_length = length;
                }
                VapixResponse::new(200, "<ZipstreamResponse><SetGopSuccess/></ZipstreamResponse>")
            }
            Endpoint::ZipstreamGetStrength => VapixResponse::new(
                200,
                format!(
                    r#"<ZipstreamResponse><GetStrengthSuccess><Strength strength="{}"/></GetStrengthSuccess></ZipstreamResponse>"#,
                    model.strength
                ),
            ),
            Endpoint::ZipstreamSetStrength => {
                if let Some(strength) = request.param("strength") {
                    model.strength = strength.to_string();
                }
                VapixResponse::new(200, "<ZipstreamResponse><SetStrengthSuccess/></ZipstreamResponse>")
            }
            Endpoint::DynamicOverlay => match request.rpc_method().as_deref() {
                Some("list") => {
                    let overlays: Vec<Value> = model
                        .overlays
                        .iter()
                        .enumerate()
                        .map(|(i, (camera, text))| {
                            json!({ "identity": i + 1, "camera": camera, "text": text })
                        })
                        .collect();
                    rpc_data(json!({ "textOverlays": overlays }))
                }
                Some("addText") => {
                    let params = request.json_body().and_then(|b| b.get("params").cloned());
                    let camera = params
                        .as_ref()
                        .and_then(|p| p["camera"].as_u64())
                        .unwrap_or_default() as u32;
                    let text = params
                        .as_ref()
                        .and_then(|p| p["text"].as_str().map(str::to_string))
                        .unwrap_or_default();
                    model.overlays.push((camera, text));
                    rpc_data(json!({ "camera": camera, "identity": model.overlays.len() }))
                }
                _ => rpc_error(1000, "unknown method"),
            },
            Endpoint::UserManagement => VapixResponse::new(500, ""),
        }
    }
}

#[async_trait]
impl Transport for FakeDevice {
    async fn send(&self, request: &VapixRequest) -> Option<VapixResponse> {
        self.requests.lock().unwrap().push(request.clone());

        {
            let mut outages = self.outages.lock().unwrap();
            if let Some(remaining) = outages.get_mut(&request.endpoint) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return None;
                }
            }
        }

        Some(self.handle(request))
    }
}

fn is_mutating(request: &VapixRequest) -> bool {
    match request.endpoint {
        Endpoint::Params => request.param("action") == Some("update"),
        Endpoint::UserManagement => request.param("action") == Some("add"),
        Endpoint::NetworkSettings | Endpoint::Ntp => request
            .rpc_method()
            .is_some_and(|m| m.starts_with("set")),
        Endpoint::DynamicOverlay => request.rpc_method().as_deref() == Some("addText"),
        Endpoint::FirmwareUpgrade
        | Endpoint::DiskFormat
        | Endpoint::DiskMount
        | Endpoint::ZipstreamSetGop
        | Endpoint::ZipstreamSetStrength => true,
        Endpoint::FirmwareManagement
        | Endpoint::DiskList
        | Endpoint::DiskJob
        | Endpoint::ZipstreamGetGop
        | Endpoint::ZipstreamGetStrength => false,
    }
}

fn rpc_data(data: Value) -> VapixResponse {
    VapixResponse::new(
        200,
        json!({ "apiVersion": "1.0", "data": data }).to_string(),
    )
}

fn rpc_error(code: i64, message: &str) -> VapixResponse {
    VapixResponse::new(
        200,
        json!({ "apiVersion": "1.0", "error": { "code": code, "message": message } }).to_string(),
    )
}

fn job(job_id: &str, result: &str, progress: &str) -> VapixResponse {
    VapixResponse::new(
        200,
        format!(
            r#"<?xml version="1.0"?><root><job jobid="{}" diskid="SD_DISK" result="{}" progress="{}"/></root>"#,
            job_id, result, progress
        ),
    )
}

fn user_management(model: &mut DeviceModel, request: &VapixRequest) -> VapixResponse {
    match request.param("action") {
        Some("add") if !model.admin_created => {
            if let (Some(user), Some(pwd)) = (request.param("user"), request.param("pwd")) {
                model.credentials = Credentials::new(user, pwd);
                model.admin_created = true;
                VapixResponse::new(200, format!("Created account {}.", user))
            } else {
                VapixResponse::new(400, "Error: missing user or pwd")
            }
        }
        _ if !model.admin_created => {
            VapixResponse::new(401, "Error: initial admin user must be created first")
        }
        _ if request.credentials != model.credentials => VapixResponse::new(401, "Unauthorized"),
        Some("get") => VapixResponse::new(200, "admin=\"root\"\nroot=\"root\"\n"),
        Some("add") => VapixResponse::new(200, "Error: this user name already exists"),
        _ => VapixResponse::new(400, "Error: unknown action"),
    }
}

fn params(model: &mut DeviceModel, request: &VapixRequest) -> VapixResponse {
    match request.param("action") {
        Some("list") => {
            let mut body = String::new();
            for group in request.param("group").unwrap_or_default().split(',') {
                let matching: Vec<_> = model
                    .params
                    .iter()
                    .filter(|(k, _)| *k == group || k.starts_with(&format!("{}.", group)))
                    .collect();
                if matching.is_empty() {
                    body.push_str(&format!(
                        "# Error: Error -1 getting param in group '{}'\n",
                        group
                    ));
                }
                for (k, v) in matching {
                    body.push_str(&format!("root.{}={}\n", k, v));
                }
            }
            VapixResponse::new(200, body)
        }
        Some("update") => {
            for (k, v) in &request.params {
                if k != "action" && k != "group" {
                    model.params.insert(k.clone(), v.clone());
                }
            }
            VapixResponse::new(200, "OK")
        }
        _ => VapixResponse::new(200, "# Error: unknown action"),
    }
}

fn network_settings(model: &mut DeviceModel, request: &VapixRequest) -> VapixResponse {
    let params = request
        .json_body()
        .and_then(|b| b.get("params").cloned())
        .unwrap_or(Value::Null);
    match request.rpc_method().as_deref() {
        Some("getNetworkInfo") => rpc_data(json!({
            "devices": [{ "name": "eth0", "IPv4": { "configurationMode": model.ipv4_mode } }]
        })),
        Some("setHostnameConfiguration") => {
            model.hostname = params["staticHostname"].as_str().map(str::to_string);
            rpc_data(json!({}))
        }
        Some("setIPv4AddressConfiguration") => {
            if let Some(mode) = params["configurationMode"].as_str() {
                model.ipv4_mode = mode.to_string();
            }
            model.static_address = params["staticAddressConfigurations"][0]["address"]
                .as_str()
                .and_then(|a| a.parse().ok());
            rpc_data(json!({}))
        }
        _ => rpc_error(1000, "unknown method"),
    }
}

/// Scanner replaying one scan result per call, repeating the last
pub struct FakeScanner {
    scans: Mutex<VecDeque<Vec<ScannedHost>>>,
    last: Mutex<Vec<ScannedHost>>,
    calls: Mutex<u32>,
}

impl FakeScanner {
    pub fn new(scans: Vec<Vec<ScannedHost>>) -> Self {
        Self {
            scans: Mutex::new(scans.into()),
            last: Mutex::new(Vec::new()),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl HostScanner for FakeScanner {
    async fn scan(&self, _subnet: &Subnet) -> Result<Vec<ScannedHost>> {
        *self.calls.lock().unwrap() += 1;
        let mut last = self.last.lock().unwrap();
        if let Some(next) = self.scans.lock().unwrap().pop_front() {
            *last = next;
        }
        Ok(last.clone())
    }
}

/// Pinger answering for a fixed set of addresses
#[derive(Default)]
pub struct FakePinger {
    reachable: Mutex<HashSet<Ipv4Addr>>,
    pings: Mutex<Vec<Ipv4Addr>>,
}

impl FakePinger {
    pub fn reachable(addresses: &[Ipv4Addr]) -> Self {
        Self {
            reachable: Mutex::new(addresses.iter().copied().collect()),
            pings: Mutex::new(Vec::new()),
        }
    }

    pub fn pings_to(&self, ip: Ipv4Addr) -> usize {
        self.pings.lock().unwrap().iter().filter(|p| **p == ip).count()
    }
}

#[async_trait]
impl Pinger for FakePinger {
    async fn ping(&self, ip: Ipv4Addr) -> bool {
        self.pings.lock().unwrap().push(ip);
        self.reachable.lock().unwrap().contains(&ip)
    }
}

/// Firmware source returning a fixed image
#[derive(Default)]
pub struct FakeFirmware {
    fetches: Mutex<u32>,
}

impl FakeFirmware {
    pub fn fetches(&self) -> u32 {
        *self.fetches.lock().unwrap()
    }
}

#[async_trait]
impl FirmwareSource for FakeFirmware {
    async fn fetch(&self, _pin: &FirmwarePin) -> Result<Vec<u8>> {
        *self.fetches.lock().unwrap() += 1;
        Ok(b"firmware image".to_vec())
    }
}


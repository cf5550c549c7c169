//! Fixed set of VAPIX CGI endpoints
//!
//! See https://www.axis.com/vapix-library/ for the full surface. Server side
//! errors end up in the device system log at `/axis-cgi/admin/systemlog.cgi`.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `param.cgi` - list/update parameters
    Params,
    /// `pwdgrp.cgi` - add/modify/list user accounts
    UserManagement,
    /// `network_settings.cgi` - JSON-RPC network configuration
    NetworkSettings,
    /// `firmwaremanagement.cgi` - JSON-RPC firmware status
    FirmwareManagement,
    /// `firmwareupgrade.cgi` - raw firmware upload
    FirmwareUpgrade,
    /// `ntp.cgi` - JSON-RPC NTP client configuration
    Ntp,
    /// `disks/list.cgi`
    DiskList,
    /// `disks/format.cgi`
    DiskFormat,
    /// `disks/mount.cgi`
    DiskMount,
    /// `disks/job.cgi`
    DiskJob,
    /// `zipstream/getgop.cgi`
    ZipstreamGetGop,
    /// `zipstream/setgop.cgi`
    ZipstreamSetGop,
    /// `zipstream/getstrength.cgi`
    ZipstreamGetStrength,
    /// `zipstream/setstrength.cgi`
    ZipstreamSetStrength,
    /// `dynamicoverlay/dynamicoverlay.cgi` - JSON-RPC text overlays
    DynamicOverlay,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Params => "/axis-cgi/param.cgi",
            Endpoint::UserManagement => "/axis-cgi/pwdgrp.cgi",
            Endpoint::NetworkSettings => "/axis-cgi/network_settings.cgi",
            Endpoint::FirmwareManagement => "/axis-cgi/firmwaremanagement.cgi",
            Endpoint::FirmwareUpgrade => "/axis-cgi/firmwareupgrade.cgi",
            Endpoint::Ntp => "/axis-cgi/ntp.cgi",
            Endpoint::DiskList => "/axis-cgi/disks/list.cgi",
            Endpoint::DiskFormat => "/axis-cgi/disks/format.cgi",
            Endpoint::DiskMount => "/axis-cgi/disks/mount.cgi",
            Endpoint::DiskJob => "/axis-cgi/disks/job.cgi",
            Endpoint::ZipstreamGetGop => "/axis-cgi/zipstream/getgop.cgi",
            Endpoint::ZipstreamSetGop => "/axis-cgi/zipstream/setgop.cgi",
            Endpoint::ZipstreamGetStrength => "/axis-cgi/zipstream/getstrength.cgi",
            Endpoint::ZipstreamSetStrength => "/axis-cgi/zipstream/setstrength.cgi",
            Endpoint::DynamicOverlay => "/axis-cgi/dynamicoverlay/dynamicoverlay.cgi",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

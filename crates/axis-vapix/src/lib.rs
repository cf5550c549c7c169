//! Axis VAPIX - Device API client for Axis cameras
//!
//! This crate wraps the fixed set of VAPIX CGI endpoints behind a
//! digest-authenticated transport. Raw wrappers return the device response or
//! nothing; typed operations turn those into [`axis_core::Result`] values.

pub mod api;
pub mod client;
pub mod endpoint;
pub mod response;
pub mod transport;

pub use api::{
    AccountProbe, Disk, DiskJob, FormatOutcome, GopSettings, NetworkInfo, NewTextOverlay,
    NtpClientConfig, TextOverlay, INITIAL_ADMIN_SIGNATURE,
};
pub use client::{rpc, VapixClient};
pub use endpoint::Endpoint;
pub use transport::{HttpTransport, Method, Transport, VapixRequest, VapixResponse};

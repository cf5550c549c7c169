//! Axis Discovery - Locating cameras on the local network
//!
//! This crate provides:
//! - nmap host-discovery scans parsed into MAC/IPv4 pairs
//! - MAC to IP and IP to MAC resolution over a scan
//! - ICMP reachability probing and bounded wait loops

pub mod nmap;
pub mod reachability;
pub mod resolver;

pub use nmap::{parse_nmap_xml, NmapConfig, NmapScanner};
pub use reachability::{wait_for_consecutive_pings, wait_until_reachable, IcmpPinger, Pinger};
pub use resolver::{
    find_ip_by_mac, find_mac_by_ip, resolve_ip_address, resolve_mac_address, HostScanner,
    ScannedHost,
};

//! Frame classification.
//!
//! Turns a raw Ethernet frame into a [`FrameSummary`]: IPv4 addresses,
//! transport protocol and a short info string. Anything that is not IPv4
//! over Ethernet is dropped.

use std::fmt;
use std::net::Ipv4Addr;

use chrono::{DateTime, Local};
use pnet::packet::Packet;
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::udp::UdpPacket;

/// Info text for IPv4 payloads that are neither TCP nor UDP.
pub const RAW_IP_INFO: &str = "Raw IP Data";

/// Transport protocol of a classified frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    Other,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
            Self::Other => "Other",
        })
    }
}

/// What classification extracts from one frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameSummary {
    pub source_ip: Ipv4Addr,
    pub dest_ip: Ipv4Addr,
    pub protocol: Protocol,
    pub info: String,
    /// Full captured frame length.
    pub length: usize,
}

impl FrameSummary {
    pub fn into_record(self, sequence: u64, timestamp: String, is_blocked: bool) -> PacketRecord {
        PacketRecord {
            sequence,
            timestamp,
            source_ip: self.source_ip.to_string(),
            dest_ip: self.dest_ip.to_string(),
            protocol: self.protocol,
            length: self.length,
            info: self.info,
            is_blocked,
        }
    }
}

/// One classified packet as handed to listeners.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PacketRecord {
    /// Per-session counter, first record is 1.
    pub sequence: u64,
    /// Local wall time, `HH:MM:SS.mmm`.
    pub timestamp: String,
    pub source_ip: String,
    pub dest_ip: String,
    pub protocol: Protocol,
    pub length: usize,
    pub info: String,
    /// Destination address is in the blacklist.
    pub is_blocked: bool,
}

impl fmt::Display for PacketRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} {} -> {} {} len={} {}",
            self.sequence,
            self.timestamp,
            self.source_ip,
            self.dest_ip,
            self.protocol,
            self.length,
            self.info
        )
    }
}

/// Format a capture time as `HH:MM:SS.mmm`.
#[must_use]
pub fn format_timestamp(time: &DateTime<Local>) -> String {
    time.format("%H:%M:%S%.3f").to_string()
}

/// Classify a raw Ethernet frame. Returns `None` for non-IPv4 frames.
#[must_use]
pub fn classify_frame(frame: &[u8]) -> Option<FrameSummary> {
    let ethernet = EthernetPacket::new(frame)?;
    if ethernet.get_ethertype() != EtherTypes::Ipv4 {
        return None;
    }
    let ipv4 = Ipv4Packet::new(ethernet.payload())?;

    let ports = match ipv4.get_next_level_protocol() {
        IpNextHeaderProtocols::Tcp => TcpPacket::new(ipv4.payload())
            .map(|tcp| (Protocol::Tcp, tcp.get_source(), tcp.get_destination())),
        IpNextHeaderProtocols::Udp => UdpPacket::new(ipv4.payload())
            .map(|udp| (Protocol::Udp, udp.get_source(), udp.get_destination())),
        _ => None,
    };

    let (protocol, info) = match ports {
        Some((protocol, src, dst)) => (protocol, format!("SrcPort: {src} -> DstPort: {dst}")),
        None => (Protocol::Other, RAW_IP_INFO.to_string()),
    };

    Some(FrameSummary {
        source_ip: ipv4.get_source(),
        dest_ip: ipv4.get_destination(),
        protocol,
        info,
        length: frame.len(),
    })
}

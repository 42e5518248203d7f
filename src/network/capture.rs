//! Packet capture abstraction.
//!
//! Provides a trait-based abstraction over packet capture to enable:
//! - Testing without real network interfaces
//! - Different capture backends

use std::io;

use pnet::datalink::{self, Channel, DataLinkReceiver, NetworkInterface};

use super::device::NetworkDevice;
use crate::config::CaptureSettings;
use crate::error::NetworkError;

/// Outcome of one read on a capture handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NextPacket {
    Frame(Vec<u8>),
    /// The read timeout elapsed without a frame.
    Timeout,
    /// The handle will not produce any more frames.
    Closed,
}

/// An open live capture handle.
pub trait PacketCapture: Send + 'static {
    /// Block for at most one read timeout waiting for the next frame.
    fn next_packet(&mut self) -> io::Result<NextPacket>;
}

/// Source of devices and capture handles.
pub trait CaptureBackend: Send + Sync + 'static {
    type Capture: PacketCapture;

    /// Every interface the backend can capture on.
    fn devices(&self) -> Vec<NetworkDevice>;

    /// Open a live handle on `device`.
    fn open(
        &self,
        device: &NetworkDevice,
        settings: &CaptureSettings,
    ) -> Result<Self::Capture, NetworkError>;
}

/// Production backend using pnet datalink channels.
#[derive(Debug, Default, Clone, Copy)]
pub struct PnetBackend;

impl PnetBackend {
    fn describe(iface: &NetworkInterface) -> NetworkDevice {
        NetworkDevice::new(
            iface.name.clone(),
            Some(iface.description.as_str()),
            iface.is_loopback(),
        )
    }

    /// Interfaces that are up, non-loopback ones first, otherwise in OS order.
    fn live_first(interfaces: &[NetworkInterface]) -> Vec<NetworkDevice> {
        let mut devices: Vec<NetworkDevice> = interfaces
            .iter()
            .filter(|iface| iface.is_up())
            .map(Self::describe)
            .collect();
        devices.sort_by_key(|d| d.is_loopback);
        devices
    }
}

impl CaptureBackend for PnetBackend {
    type Capture = PnetCapture;

    fn devices(&self) -> Vec<NetworkDevice> {
        Self::live_first(&datalink::interfaces())
    }

    fn open(
        &self,
        device: &NetworkDevice,
        settings: &CaptureSettings,
    ) -> Result<PnetCapture, NetworkError> {
        let interface = datalink::interfaces()
            .into_iter()
            .find(|iface| iface.name == device.name)
            .ok_or_else(|| NetworkError::UnknownDevice(device.name.clone()))?;

        let config = datalink::Config {
            read_buffer_size: settings.snapshot_len,
            read_timeout: Some(settings.read_timeout()),
            promiscuous: settings.promiscuous,
            ..datalink::Config::default()
        };

        match datalink::channel(&interface, config) {
            Ok(Channel::Ethernet(_tx, rx)) => Ok(PnetCapture { rx }),
            Ok(_) => Err(NetworkError::UnsupportedChannel),
            Err(e) => Err(NetworkError::ChannelOpen {
                device: device.name.clone(),
                reason: e.to_string(),
            }),
        }
    }
}

/// Live capture handle on a pnet datalink receiver.
///
/// The handle closes when dropped.
pub struct PnetCapture {
    rx: Box<dyn DataLinkReceiver>,
}

impl PacketCapture for PnetCapture {
    fn next_packet(&mut self) -> io::Result<NextPacket> {
        match self.rx.next() {
            Ok(frame) => Ok(NextPacket::Frame(frame.to_vec())),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                Ok(NextPacket::Timeout)
            }
            Err(e) => Err(e),
        }
    }
}

//! Live packet capture and classification.

mod capture;
mod classify;
mod device;
mod engine;
mod listener;

pub use capture::{CaptureBackend, NextPacket, PacketCapture, PnetBackend, PnetCapture};
pub use classify::{
    FrameSummary, PacketRecord, Protocol, RAW_IP_INFO, classify_frame, format_timestamp,
};
pub use device::{NetworkDevice, find_device, select_device};
pub use engine::{CaptureState, PacketCaptureEngine};
pub use listener::{LoggingListener, PacketListener};

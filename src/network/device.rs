//! Capture device selection.
//!
//! Devices are picked by an ordered list of rules over their descriptions,
//! first match wins. The rules only look at [`NetworkDevice`] values, so they
//! are testable without touching real interfaces.

use crate::error::NetworkError;

/// A capture-capable interface as reported by the OS.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkDevice {
    pub name: String,
    /// Human-readable description. Empty descriptions are stored as `None`.
    pub description: Option<String>,
    pub is_loopback: bool,
}

impl NetworkDevice {
    pub fn new(name: impl Into<String>, description: Option<&str>, is_loopback: bool) -> Self {
        Self {
            name: name.into(),
            description: description
                .filter(|d| !d.is_empty())
                .map(str::to_string),
            is_loopback,
        }
    }

    fn description_contains(&self, needle: &str) -> bool {
        self.description
            .as_deref()
            .is_some_and(|d| d.to_lowercase().contains(needle))
    }

    fn description_contains_any(&self, needles: &[&str]) -> bool {
        needles.iter().any(|n| self.description_contains(n))
    }
}

impl std::fmt::Display for NetworkDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.description {
            Some(desc) => write!(f, "{} ({desc})", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Description fragments of adapters that rarely carry user traffic.
const EXCLUDED_MARKERS: &[&str] = &["wan", "hyper-v", "virtual", "loopback"];

/// Description fragments of physical adapters.
const PHYSICAL_MARKERS: &[&str] = &["intel", "killer", "realtek", "wi-fi", "ethernet"];

/// Pick the device most likely to carry the host's traffic.
///
/// # Errors
///
/// Returns [`NetworkError::NoDevice`] if `devices` is empty.
pub fn select_device(devices: &[NetworkDevice]) -> Result<&NetworkDevice, NetworkError> {
    let candidates: Vec<&NetworkDevice> = devices
        .iter()
        .filter(|d| !d.is_loopback && d.description.is_some())
        .filter(|d| !d.description_contains_any(EXCLUDED_MARKERS))
        .collect();

    candidates
        .iter()
        .copied()
        .find(|d| d.description_contains_any(PHYSICAL_MARKERS))
        .or_else(|| candidates.first().copied())
        .or_else(|| {
            devices
                .iter()
                .find(|d| !d.is_loopback && d.description.is_some() && !d.description_contains("wan"))
        })
        .or_else(|| devices.iter().find(|d| !d.is_loopback))
        .or_else(|| devices.first())
        .ok_or(NetworkError::NoDevice)
}

/// Select by exact name when `name` is given, otherwise by [`select_device`].
///
/// # Errors
///
/// Returns [`NetworkError::UnknownDevice`] if no device has that name.
pub fn find_device<'a>(
    devices: &'a [NetworkDevice],
    name: Option<&str>,
) -> Result<&'a NetworkDevice, NetworkError> {
    match name {
        Some(name) => devices
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| NetworkError::UnknownDevice(name.to_string())),
        None => select_device(devices),
    }
}

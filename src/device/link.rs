//! Link-layer connectivity probes

use std::path::PathBuf;
use tracing::debug;

/// Reports whether the network link underneath the broker session is up
pub trait LinkLayer: Send {
    fn is_connected(&self) -> bool;
}

/// Link that is always considered up
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysConnected;

impl LinkLayer for AlwaysConnected {
    fn is_connected(&self) -> bool {
        true
    }
}

/// Link state of a network interface read from sysfs `operstate`
#[derive(Debug, Clone)]
pub struct InterfaceLink {
    operstate_path: PathBuf,
}

impl InterfaceLink {
    pub fn new(interface: &str) -> Self {
        Self::with_operstate_path(format!("/sys/class/net/{interface}/operstate"))
    }

    /// Read state from an explicit file instead of sysfs
    pub fn with_operstate_path(path: impl Into<PathBuf>) -> Self {
        Self {
            operstate_path: path.into(),
        }
    }
}

impl LinkLayer for InterfaceLink {
    fn is_connected(&self) -> bool {
        match std::fs::read_to_string(&self.operstate_path) {
            Ok(state) => state.trim() == "up",
            Err(e) => {
                debug!(
                    "Cannot read link state from {}: {}",
                    self.operstate_path.display(),
                    e
                );
                false
            }
        }
    }
}

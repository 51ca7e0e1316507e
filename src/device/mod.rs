//! Device-side collaborators of the adapter
//!
//! Link-layer probing, credential persistence, status indication and the hard
//! restart used by the publish watchdog. The adapter only sees the traits;
//! production implementations live in the submodules.

pub mod indicator;
pub mod link;
pub mod storage;

pub use indicator::{Blink, Glow, Indicator, LogIndicator};
pub use link::{AlwaysConnected, InterfaceLink, LinkLayer};
pub use storage::{CredentialStore, FileCredentialStore, NullCredentialStore, StorageError};

use tracing::error;

/// Unconditional device restart
pub trait Restart: Send {
    fn hard_reset(&mut self);
}

/// Restart by aborting the process so the supervisor brings it back
#[derive(Debug, Default)]
pub struct ProcessRestart;

impl Restart for ProcessRestart {
    fn hard_reset(&mut self) {
        error!("cloud watchdog reset");
        std::process::abort();
    }
}

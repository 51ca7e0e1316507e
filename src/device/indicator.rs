//! Status indication (status LED on hardware, log lines here)

use crate::adapter::ConnectionStatus;
use tracing::{debug, trace};

/// Steady indication of the connection phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Glow {
    ConnectingToNetwork,
    NotConnectedToCloud,
    ConnectingToCloud,
    ConnectedToCloud,
}

impl Glow {
    /// Pattern shown while the link layer is up
    pub fn for_status(status: ConnectionStatus) -> Self {
        match status {
            ConnectionStatus::Connected => Glow::ConnectedToCloud,
            ConnectionStatus::Connecting => Glow::ConnectingToCloud,
            ConnectionStatus::Disconnected | ConnectionStatus::Disconnecting => {
                Glow::NotConnectedToCloud
            }
        }
    }
}

/// One-shot indication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blink {
    Uploaded,
}

pub trait Indicator: Send {
    fn glow(&mut self, glow: Glow);
    fn blink(&mut self, blink: Blink);
}

/// Indicator that logs pattern changes
#[derive(Debug, Default)]
pub struct LogIndicator {
    current: Option<Glow>,
}

impl Indicator for LogIndicator {
    fn glow(&mut self, glow: Glow) {
        if self.current != Some(glow) {
            debug!(?glow, "indicator");
            self.current = Some(glow);
        }
    }

    fn blink(&mut self, blink: Blink) {
        trace!(?blink, "indicator blink");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glow_for_status() {
        assert_eq!(
            Glow::for_status(ConnectionStatus::Connected),
            Glow::ConnectedToCloud
        );
        assert_eq!(
            Glow::for_status(ConnectionStatus::Connecting),
            Glow::ConnectingToCloud
        );
        assert_eq!(
            Glow::for_status(ConnectionStatus::Disconnecting),
            Glow::NotConnectedToCloud
        );
    }

    #[test]
    fn test_log_indicator_tracks_current_pattern() {
        let mut indicator = LogIndicator::default();
        indicator.glow(Glow::ConnectingToNetwork);
        indicator.glow(Glow::ConnectingToNetwork);
        assert_eq!(indicator.current, Some(Glow::ConnectingToNetwork));
    }
}

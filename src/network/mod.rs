//! # Wireless Link
//!
//! The agent does not manage the radio itself. It only needs to know whether
//! the station is associated, how strong the signal is, and how to kick off a
//! new association when the watchdog finds the link down. [`associate`] wraps
//! that kick-off in the bounded poll-and-backoff loop the watchdog uses.

pub mod nmcli;
pub mod simulated;

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::scheduler::clock::Clock;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Failed to run network manager: {0}")]
    Command(#[from] std::io::Error),

    #[error("Association request rejected: {0}")]
    Rejected(String),

    #[error("Not associated after {attempts} status checks")]
    Timeout { attempts: u32 },
}

/// Station-side view of the wireless network
pub trait NetworkLink: Send {
    /// Network the link associates with, for logging
    fn network_name(&self) -> &str;

    /// Whether the station currently has a usable association
    fn is_associated(&self) -> bool;

    /// Signal strength in dBm, 0 when unknown or unassociated
    fn rssi(&mut self) -> i32;

    /// Start an association attempt without waiting for it to complete
    fn begin(&mut self) -> Result<(), LinkError>;
}

/// How long [`associate`] keeps polling after kicking off an attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            attempts: 40,
            backoff: Duration::from_millis(250),
        }
    }
}

/// Blocking, bounded association attempt.
///
/// Starts association, then checks the link status up to `attempts` times,
/// sleeping `backoff` between checks, followed by one final check. Returns the
/// RSSI on success. Blocks for at most `attempts * backoff` plus the time the
/// link backend needs to accept the request.
pub fn associate(
    link: &mut dyn NetworkLink,
    clock: &dyn Clock,
    policy: &ReconnectPolicy,
) -> Result<i32, LinkError> {
    info!("Connecting to network {}", link.network_name());
    link.begin()?;

    for attempt in 0..policy.attempts {
        if link.is_associated() {
            debug!("Associated after {} status checks", attempt);
            break;
        }
        clock.sleep(policy.backoff);
    }

    if link.is_associated() {
        let rssi = link.rssi();
        info!("Network {} connected, RSSI={} dBm", link.network_name(), rssi);
        Ok(rssi)
    } else {
        warn!("Network {} not reachable", link.network_name());
        Err(LinkError::Timeout {
            attempts: policy.attempts,
        })
    }
}

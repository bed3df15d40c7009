pub mod broadcast;
pub mod connection;
mod coordinator;
pub mod protocol;
pub mod registry;
pub mod room;
mod sweeper;

pub use coordinator::{CoordinatorStats, GameCoordinator, DEFAULT_POINTS};
pub use connection::Connection;
pub use protocol::{ClientEvent, ServerEvent};
pub use sweeper::DisconnectSweeper;

use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

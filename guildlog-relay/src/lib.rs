/*!
Guild event relay: correlates membership, voice, channel and invite events with
audit-log and invite data, and posts readable records to each guild's log channel.
*/

pub mod core;
pub mod error;

pub use crate::core::config::RelayConfig;
pub use crate::core::event_system::{EventSource, GatewayEvent};
pub use crate::core::settings::EventKind;
pub use crate::core::tracker::{EventCorrelator, RelayService, RelayStats, Stores};
pub use error::RelayError;

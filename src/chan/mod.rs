//! Multi-channel scheduler.
//!
//! Lets several virtual interfaces on different radio channels share one radio by
//! time-multiplexing it. Main pieces:
//! - [`pool`]: fixed arena of channel contexts (traffic, scan and remain-on-channel)
//! - [`vif`]: the interfaces sharing the radio
//! - `distribution`: periodic slot distribution between the scheduled channels
//! - `tbtt`: beacon-time scheduling with collision avoidance
//! - `switch`: the channel switch state machine
//! - `arbitration`: scan / remain-on-channel arbitration and P2P presence
//!
//! The scheduler is single-threaded and event driven: every entry point runs to
//! completion, and the world outside is reached through the [`platform`] traits.

mod arbitration;
pub mod config;
mod distribution;
pub mod platform;
pub mod pool;
mod scheduler;
mod switch;
mod tbtt;
pub mod types;
pub mod vif;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{Capabilities, SchedulerConfig};
pub use platform::Platform;
pub use scheduler::Scheduler;
pub use types::*;
pub use vif::{VifConfig, VifKind};

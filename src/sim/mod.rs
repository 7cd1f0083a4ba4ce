//! Simulation host for the channel scheduler.
//!
//! Runs the scheduler against a simulated radio on the virtual clock:
//! - `scenario`: JSON scenario loading and validation
//! - `platform`: the simulated radio implementing the scheduler's collaborator traits
//! - `engine`: discrete-event engine and the embassy tasks driving it
//! - `report`: run report written at the end
//!
//! `engine_task` and `feeder_task` should be spawned by the Embassy executor. The
//! feeder hands the scenario's host requests over a channel at their time; the engine
//! sends the finished report back through a standard channel.

pub mod engine;
pub mod platform;
pub mod report;
pub mod scenario;

pub use engine::{HostRequestChannel, engine_task, feeder_task};
pub use report::Report;
pub use scenario::{Scenario, load_scenario};

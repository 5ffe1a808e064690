//! Topology planning and execution
//!
//! - `planner`: desired vs. current diff into ordered steps
//! - `placement`: cell preference for new nodes (AZ spread, then load)
//! - `steps`: AddNode / RemoveNode / ReplaceMaster / ReplaceReplica
//! - `executor`: sequential execution with persisted progress

pub mod executor;
pub mod placement;
pub mod planner;
pub mod steps;

pub use executor::Scheduler;
pub use placement::Placement;
pub use planner::{plan, Transition};
pub use steps::{Step, StepEnv, StepType};

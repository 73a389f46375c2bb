pub mod command;
pub mod engine;
pub mod error;
pub mod monitor_launch;
pub mod spawn_state;
pub mod stagger;

pub use engine::{spawn, SpawnOptions, SpawnOutcome};
pub use error::SpawnError;
pub use monitor_launch::{FakeMonitorLauncher, MonitorLauncher, ProcessMonitorLauncher};
pub use spawn_state::{PromptStatus, SpawnState, SpawnStateData};
pub use stagger::{compute_schedule, dominant_provider, StaggerMode};

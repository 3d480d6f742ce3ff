mod executor;
mod run;
mod schedule;
mod vu;

pub use executor::RequestExecutor;
pub use run::{CONTROL_TICK, PROGRESS_TICK, run_plan};
pub use schedule::{PhaseSchedule, StageSnapshot};
pub use vu::StopSignal;

//! Stage orchestration.
//!
//! The orchestrator owns the run lifecycle: it binds the run context, walks
//! the fixed stage sequence, times every transition, guarantees cleanup on
//! success and failure alike, and applies best-effort retention after a
//! successful write.

mod orchestrator;
mod retention;
mod run;
mod traits;


pub use orchestrator::Orchestrator;
pub use retention::prune_releases;
pub use run::{PipelineRun, RunResult, RunStatus, StageName};
pub use traits::{Extract, Transform};

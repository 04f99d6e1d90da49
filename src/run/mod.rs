pub mod materialize;
pub mod model;
pub mod postprocess;
pub mod prepare;
pub mod snapshot;
pub mod worker;

pub use model::{ArtifactPaths, RunError};
pub use postprocess::{CommandPostprocessor, Postprocessor};
pub use prepare::prepare_run;
pub use worker::{LaunchOutcome, RunOutcome, RunWorker};

use crate::run::model::{ArtifactPaths, RunError};
use crate::run::worker::run_stage;
use async_trait::async_trait;
use log::debug;

/// Last stage of a run: turns engine output into result files.
#[async_trait]
pub trait Postprocessor: Send + Sync {
    async fn postprocess(&self, run_id: i32, paths: &ArtifactPaths) -> Result<(), RunError>;
}

/// Runs an external command with the run id as last argument. Without a
/// command there is nothing to do.
pub struct CommandPostprocessor {
    command: Option<Vec<String>>,
    timeout_secs: Option<u64>,
}

impl CommandPostprocessor {
    pub fn new(command: Option<Vec<String>>, timeout_secs: Option<u64>) -> Self {
        Self {
            command,
            timeout_secs,
        }
    }
}

#[async_trait]
impl Postprocessor for CommandPostprocessor {
    async fn postprocess(&self, run_id: i32, paths: &ArtifactPaths) -> Result<(), RunError> {
        let Some((program, args)) = self.command.as_ref().and_then(|c| c.split_first()) else {
            debug!("run {}: no postprocess command configured", run_id);
            return Ok(());
        };
        let mut args: Vec<String> = args.to_vec();
        args.push(run_id.to_string());
        run_stage(
            "postprocess",
            program,
            &args,
            &paths.stage_log,
            self.timeout_secs,
        )
        .await
    }
}

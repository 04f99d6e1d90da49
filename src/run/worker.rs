use crate::config::PipelineConfig;
use crate::run::model::{ArtifactPaths, RunError};
use crate::run::postprocess::{CommandPostprocessor, Postprocessor};
use crate::run::prepare::prepare_run;
use crate::storage::entity::RunStatus;
use crate::storage::repository::RunRepository;
use log::{error, info, warn};
use sea_orm::DatabaseConnection;
use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::{timeout, Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Finished,
    /// Stopped by the user while the engine ran; postprocessing skipped.
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    Started(i32),
    /// Another run of the simulation is still active.
    AlreadyActive(i32),
}

/// Drives runs through prepare, engine and postprocess.
#[derive(Clone)]
pub struct RunWorker {
    db: Arc<DatabaseConnection>,
    config: Arc<PipelineConfig>,
    postprocessor: Arc<dyn Postprocessor>,
}

impl RunWorker {
    pub fn new(db: Arc<DatabaseConnection>, config: Arc<PipelineConfig>) -> Self {
        let postprocessor = Arc::new(CommandPostprocessor::new(
            config.postprocess_command.clone(),
            config.engine_timeout_secs,
        ));
        Self {
            db,
            config,
            postprocessor,
        }
    }

    pub fn with_postprocessor(mut self, postprocessor: Arc<dyn Postprocessor>) -> Self {
        self.postprocessor = postprocessor;
        self
    }

    /// Creates a run and starts its chain in the background, unless the
    /// simulation already has an active run.
    pub async fn launch_run(&self, simulation_id: i32, name: &str) -> Result<LaunchOutcome, RunError> {
        if let Some(active) = RunRepository::active(&*self.db, simulation_id).await? {
            info!(
                "simulation {} already has active run {}",
                simulation_id, active.id
            );
            return Ok(LaunchOutcome::AlreadyActive(active.id));
        }
        let run = RunRepository::create(&*self.db, simulation_id, name).await?;
        let worker = self.clone();
        let run_id = run.id;
        tokio::spawn(async move {
            if let Err(e) = worker.execute(run_id).await {
                error!("run {} failed: {}", run_id, e);
            }
        });
        Ok(LaunchOutcome::Started(run_id))
    }

    /// Requests a cooperative stop: the engine polls the stop file. Only
    /// running runs can be stopped.
    pub async fn stop_run(&self, run_id: i32) -> Result<bool, RunError> {
        let run = RunRepository::find(&*self.db, run_id)
            .await?
            .ok_or(RunError::UnknownRun(run_id))?;
        if !RunRepository::transition(&*self.db, run.id, RunStatus::Running, RunStatus::Aborted)
            .await?
        {
            return Ok(false);
        }
        let paths = ArtifactPaths::new(&self.config, run.simulation_id, run.id);
        if let Some(dir) = paths.stop_file.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&paths.stop_file, b"").await?;
        info!("run {} aborted", run.id);
        Ok(true)
    }

    /// Runs the whole chain and waits for it. A failing stage stops the
    /// chain and leaves the run status where it was.
    pub async fn execute(&self, run_id: i32) -> Result<RunOutcome, RunError> {
        let run = RunRepository::find(&*self.db, run_id)
            .await?
            .ok_or(RunError::UnknownRun(run_id))?;
        let paths = ArtifactPaths::new(&self.config, run.simulation_id, run.id);
        write_arg_file(&self.config, &paths, run.simulation_id, run.id).await?;

        let result = self.stages(run_id, &paths).await;
        if let Err(e) = &result {
            warn!("run {} stopped: {}", run_id, e);
            if let Err(log_err) = append_log(&paths.stage_log, &format!("error: {}", e)).await {
                warn!(
                    "run {}: could not write {}: {}",
                    run_id,
                    paths.stage_log.display(),
                    log_err
                );
            }
        }
        result
    }

    async fn stages(&self, run_id: i32, paths: &ArtifactPaths) -> Result<RunOutcome, RunError> {
        append_log(&paths.stage_log, "== prepare ==").await?;
        prepare_run(&*self.db, &self.config, run_id).await?;

        let engine = self.config.engine_executable();
        run_stage(
            "engine",
            &engine,
            [paths.arg_file.as_os_str()],
            &paths.stage_log,
            self.config.engine_timeout_secs,
        )
        .await?;

        if !RunRepository::transition(&*self.db, run_id, RunStatus::Running, RunStatus::Ending)
            .await?
        {
            info!("run {} was aborted, skipping postprocess", run_id);
            return Ok(RunOutcome::Aborted);
        }

        self.postprocessor.postprocess(run_id, paths).await?;
        RunRepository::set_status(&*self.db, run_id, RunStatus::Finished).await?;
        info!("run {} finished", run_id);
        Ok(RunOutcome::Finished)
    }
}

/// Single-line `-flag "value"` file read by the engine.
pub fn arg_line(config: &PipelineConfig, paths: &ArtifactPaths, simulation_id: i32, run_id: i32) -> String {
    let db = &config.engine_db;
    format!(
        "-dbHost \"{}\" -dbName \"{}\" -dbUser \"{}\" -dbPass \"{}\" -logFile \"{}\" -tmpDir \"{}\" -stopFile \"{}\" -simId \"{}\" -runId \"{}\"",
        db.host,
        db.name,
        db.user,
        db.password,
        paths.engine_log.display(),
        paths.engine_tmp_dir.display(),
        paths.stop_file.display(),
        simulation_id,
        run_id
    )
}

async fn write_arg_file(
    config: &PipelineConfig,
    paths: &ArtifactPaths,
    simulation_id: i32,
    run_id: i32,
) -> Result<(), RunError> {
    for path in [&paths.arg_file, &paths.engine_log, &paths.stop_file, &paths.stage_log] {
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
    }
    tokio::fs::create_dir_all(&paths.engine_tmp_dir).await?;
    tokio::fs::write(&paths.arg_file, arg_line(config, paths, simulation_id, run_id)).await?;
    Ok(())
}

async fn append_log(path: &Path, line: &str) -> Result<(), RunError> {
    let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
    file.write_all(format!("{}\n", line).as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

/// Runs one external stage with stdout/stderr appended to `log` and fails
/// unless it exits successfully within `timeout_secs`.
pub async fn run_stage<I, S>(
    stage: &'static str,
    program: impl AsRef<OsStr>,
    args: I,
    log: &Path,
    timeout_secs: Option<u64>,
) -> Result<(), RunError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    append_log(log, &format!("== {} ==", stage)).await?;
    // child stdio needs an owned std handle
    let stdout = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log)
        .await?
        .into_std()
        .await;
    let stderr = stdout.try_clone()?;

    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| RunError::Spawn { stage, source })?;

    let status = match timeout_secs {
        Some(secs) => match timeout(Duration::from_secs(secs), child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                let _ = child.kill().await;
                append_log(log, &format!("{} killed after {}s", stage, secs)).await?;
                return Err(RunError::Timeout { stage, secs });
            }
        },
        None => child.wait().await?,
    };
    if !status.success() {
        return Err(RunError::StageFailed { stage, status });
    }
    Ok(())
}

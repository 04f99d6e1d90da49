use crate::config::PipelineConfig;
use sea_orm::DbErr;
use std::path::PathBuf;
use std::process::ExitStatus;

#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error("database error: {0}")]
    Db(#[from] DbErr),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("tsv error: {0}")]
    Tsv(#[from] csv::Error),
    #[error("unknown run {0}")]
    UnknownRun(i32),
    #[error("unknown simulation {0}")]
    UnknownSimulation(i32),
    #[error("unknown matrix {0}")]
    UnknownMatrix(i32),
    #[error("could not start {stage}: {source}")]
    Spawn {
        stage: &'static str,
        source: std::io::Error,
    },
    #[error("{stage} failed with {status}")]
    StageFailed {
        stage: &'static str,
        status: ExitStatus,
    },
    #[error("{stage} timed out after {secs}s")]
    Timeout { stage: &'static str, secs: u64 },
}

/// Files produced for one run of one simulation.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactPaths {
    pub arg_file: PathBuf,
    pub engine_log: PathBuf,
    pub engine_tmp_dir: PathBuf,
    pub stop_file: PathBuf,
    pub stage_log: PathBuf,
    pub simulation_network: PathBuf,
    pub run_network: PathBuf,
    pub parameters: PathBuf,
    pub results: PathBuf,
}

impl ArtifactPaths {
    pub fn new(config: &PipelineConfig, simulation_id: i32, run_id: i32) -> Self {
        let metrosim = config.metrosim_dir();
        let output = config.network_output_dir();
        Self {
            arg_file: metrosim
                .join("arg_files")
                .join(format!("simulation_{}_run_{}.txt", simulation_id, run_id)),
            engine_log: metrosim.join("logs").join(format!("run_{}.txt", run_id)),
            engine_tmp_dir: metrosim.join("output"),
            stop_file: metrosim.join("stop_files").join(format!("run_{}.stop", run_id)),
            stage_log: config.script_logs_dir().join(format!("run_{}.txt", run_id)),
            simulation_network: output.join(format!("network_{}.json", simulation_id)),
            run_network: output.join(format!("network_{}_{}.json", simulation_id, run_id)),
            parameters: output.join(format!("parameters_{}_{}.json", simulation_id, run_id)),
            results: output.join(format!("results_{}_{}.json", simulation_id, run_id)),
        }
    }

    /// Cleaned OD file loaded into the physical table of a matrix.
    pub fn clean_matrix(config: &PipelineConfig, matrices_id: i32) -> PathBuf {
        config
            .network_output_dir()
            .join(format!("od_matrix_clean_{}.tsv", matrices_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifacts_are_keyed_by_simulation_and_run() {
        let cfg = PipelineConfig::with_base_dir("/srv");
        let p = ArtifactPaths::new(&cfg, 3, 14);
        assert_eq!(
            p.arg_file,
            PathBuf::from("/srv/metrosim_files/arg_files/simulation_3_run_14.txt")
        );
        assert_eq!(
            p.stop_file,
            PathBuf::from("/srv/metrosim_files/stop_files/run_14.stop")
        );
        assert_eq!(
            p.run_network,
            PathBuf::from("/srv/website_files/network_output/network_3_14.json")
        );
        assert_eq!(
            p.stage_log,
            PathBuf::from("/srv/website_files/script_logs/run_14.txt")
        );
        assert_eq!(
            ArtifactPaths::clean_matrix(&cfg, 9),
            PathBuf::from("/srv/website_files/network_output/od_matrix_clean_9.tsv")
        );
    }
}

use crate::config::PipelineConfig;
use crate::run::materialize::materialize_matrix;
use crate::run::model::{ArtifactPaths, RunError};
use crate::run::snapshot::build_snapshot;
use crate::storage::entity::RunStatus;
use crate::storage::repository::{DemandRepository, RunRepository, SimulationRepository};
use log::info;
use sea_orm::ConnectionTrait;
use serde::Serialize;

/// Run-scoped copy of the simulation parameters handed to the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunParameters {
    pub start_time: i32,
    pub stop_time: i32,
    pub interval_time: i32,
    pub periods: f64,
}

/// Assembles the inputs of one run and moves it to `Running`. Each step can
/// be replayed for the same run id.
pub async fn prepare_run<C: ConnectionTrait>(
    db: &C,
    config: &PipelineConfig,
    run_id: i32,
) -> Result<ArtifactPaths, RunError> {
    let run = RunRepository::find(db, run_id)
        .await?
        .ok_or(RunError::UnknownRun(run_id))?;
    let sim = SimulationRepository::find(db, run.simulation_id)
        .await?
        .ok_or(RunError::UnknownSimulation(run.simulation_id))?;
    let paths = ArtifactPaths::new(config, sim.id, run.id);

    // 1. per-traveler output only for small populations
    let travelers = DemandRepository::total_travelers(db, sim.demand_id).await?;
    let per_user = travelers <= config.thresholds.travelers_threshold;
    SimulationRepository::set_output_users_times(db, sim.id, per_user).await?;
    if !per_user {
        info!(
            "run {}: {} travelers, per-user output disabled",
            run.id, travelers
        );
    }

    // 2. physical OD tables
    for m in DemandRepository::simulation_matrices(db, &sim).await? {
        materialize_matrix(db, config, m.id).await?;
    }

    // 3. network snapshot, cached per simulation
    tokio::fs::create_dir_all(config.network_output_dir()).await?;
    let cached = tokio::fs::try_exists(&paths.simulation_network).await?;
    if sim.has_changed || !cached {
        let snapshot = build_snapshot(db, &sim, config.thresholds.network_threshold).await?;
        tokio::fs::write(&paths.simulation_network, serde_json::to_vec(&snapshot)?).await?;
        SimulationRepository::set_has_changed(db, sim.id, false).await?;
        info!(
            "network snapshot regenerated for simulation {} (large: {})",
            sim.id, snapshot.large
        );
    }
    tokio::fs::copy(&paths.simulation_network, &paths.run_network).await?;

    // 4. parameters
    let periods = if sim.records_interval > 0 {
        f64::from(sim.last_record - sim.start_time) / f64::from(sim.records_interval)
    } else {
        0.0
    };
    let params = RunParameters {
        start_time: sim.start_time,
        stop_time: sim.last_record,
        interval_time: sim.records_interval,
        periods,
    };
    tokio::fs::write(&paths.parameters, serde_json::to_vec(&params)?).await?;

    // 5.
    RunRepository::set_status(db, run.id, RunStatus::Running).await?;
    info!("run {} of simulation {} prepared", run.id, sim.id);
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::testing::{test_db, test_simulation};
    use crate::storage::repository::MatrixRepository;
    use serde_json::Value;
    use tempfile::tempdir;

    #[tokio::test]
    async fn large_population_disables_per_user_output() {
        let (_dir, db) = test_db().await;
        let base = tempdir().unwrap();
        let config = PipelineConfig::with_base_dir(base.path());
        let sim = test_simulation(&db).await;

        let small = DemandRepository::add_segment(&db, sim.demand_id, "car", 1.0)
            .await
            .unwrap();
        let big = DemandRepository::add_segment(&db, sim.demand_id, "truck", 2.0)
            .await
            .unwrap();
        MatrixRepository::insert_cells(&db, small.matrices_id, vec![(1, 2, 1_000_000.0)], 10)
            .await
            .unwrap();
        MatrixRepository::refresh_total(&db, small.matrices_id, 1.0).await.unwrap();

        let run = RunRepository::create(&db, sim.id, "first").await.unwrap();
        prepare_run(&db, &config, run.id).await.unwrap();
        let s = SimulationRepository::find(&db, sim.id).await.unwrap().unwrap();
        assert!(s.output_users_times);

        MatrixRepository::insert_cells(&db, big.matrices_id, vec![(1, 2, 4_500_001.0)], 10)
            .await
            .unwrap();
        MatrixRepository::refresh_total(&db, big.matrices_id, 2.0).await.unwrap();

        let run = RunRepository::create(&db, sim.id, "second").await.unwrap();
        prepare_run(&db, &config, run.id).await.unwrap();
        let s = SimulationRepository::find(&db, sim.id).await.unwrap().unwrap();
        assert!(!s.output_users_times);
    }

    #[tokio::test]
    async fn prepare_writes_run_artifacts() {
        let (_dir, db) = test_db().await;
        let base = tempdir().unwrap();
        let config = PipelineConfig::with_base_dir(base.path());
        let sim = test_simulation(&db).await;
        let segment = DemandRepository::add_segment(&db, sim.demand_id, "car", 1.0)
            .await
            .unwrap();
        let run = RunRepository::create(&db, sim.id, "r").await.unwrap();

        let paths = prepare_run(&db, &config, run.id).await.unwrap();

        let run = RunRepository::find(&db, run.id).await.unwrap().unwrap();
        assert_eq!(run.run_status(), RunStatus::Running);
        let s = SimulationRepository::find(&db, sim.id).await.unwrap().unwrap();
        assert!(!s.has_changed);

        let params: Value =
            serde_json::from_slice(&std::fs::read(&paths.parameters).unwrap()).unwrap();
        assert_eq!(params["startTime"], 360);
        assert_eq!(params["stopTime"], 720);
        assert_eq!(params["intervalTime"], 15);
        assert_eq!(params["periods"], 24.0);

        let network: Value =
            serde_json::from_slice(&std::fs::read(&paths.run_network).unwrap()).unwrap();
        assert_eq!(network["large"], false);
        assert!(paths.simulation_network.exists());

        for id in [segment.matrices_id, sim.pttimes_id.unwrap()] {
            assert_eq!(MatrixRepository::count_physical_rows(&db, id).await.unwrap(), 0);
            assert!(ArtifactPaths::clean_matrix(&config, id).exists());
        }
    }

    #[tokio::test]
    async fn unchanged_simulation_reuses_cached_snapshot() {
        let (_dir, db) = test_db().await;
        let base = tempdir().unwrap();
        let config = PipelineConfig::with_base_dir(base.path());
        let sim = test_simulation(&db).await;

        let first = RunRepository::create(&db, sim.id, "a").await.unwrap();
        let paths = prepare_run(&db, &config, first.id).await.unwrap();
        std::fs::write(&paths.simulation_network, b"{\"cached\":true}").unwrap();

        let second = RunRepository::create(&db, sim.id, "b").await.unwrap();
        let paths = prepare_run(&db, &config, second.id).await.unwrap();
        assert_eq!(std::fs::read(&paths.run_network).unwrap(), b"{\"cached\":true}");
    }

    #[tokio::test]
    async fn unknown_run_is_fatal() {
        let (_dir, db) = test_db().await;
        let base = tempdir().unwrap();
        let config = PipelineConfig::with_base_dir(base.path());
        let err = prepare_run(&db, &config, 77).await.unwrap_err();
        assert!(matches!(err, RunError::UnknownRun(77)));
    }
}

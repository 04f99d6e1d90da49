use crate::batch::model::{BatchError, BatchReport, EntryOutcome};
use crate::config::PipelineConfig;
use crate::import::{ImportError, Importer, ObjectKind};
use crate::run::{RunOutcome, RunWorker};
use crate::storage::entity::{batch, batch_run, simulation};
use crate::storage::repository::{BatchRepository, RunRepository, SimulationRepository};
use crate::storage::FileStore;
use chrono::Utc;
use log::{error, info, warn};
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Drives the queue of a batch: imports then a synchronous run per entry,
/// one entry at a time.
pub struct BatchService {
    db: Arc<DatabaseConnection>,
    config: Arc<PipelineConfig>,
    store: Arc<dyn FileStore>,
    worker: RunWorker,
}

impl BatchService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<PipelineConfig>,
        store: Arc<dyn FileStore>,
    ) -> Self {
        let worker = RunWorker::new(db.clone(), config.clone());
        Self {
            db,
            config,
            store,
            worker,
        }
    }

    pub fn with_worker(mut self, worker: RunWorker) -> Self {
        self.worker = worker;
        self
    }

    pub async fn run_batch(&self, batch_id: i32) -> Result<BatchReport, BatchError> {
        let batch = BatchRepository::find(&*self.db, batch_id)
            .await?
            .ok_or(BatchError::NotFound(batch_id))?;
        let sim = SimulationRepository::find(&*self.db, batch.simulation_id)
            .await?
            .ok_or(BatchError::SimulationNotFound(batch.simulation_id))?;

        let start_time = Utc::now().timestamp();
        BatchRepository::mark_running(&*self.db, batch.id, start_time).await?;
        info!("batch {} ({}) started", batch.id, batch.name);

        let mut report = BatchReport {
            batch_id: batch.id,
            ..Default::default()
        };
        let queue = self.drain_queue(&batch, &sim, &mut report).await;

        let end_time = Utc::now().timestamp();
        report.running_time = end_time - start_time;
        BatchRepository::finish(&*self.db, batch.id, end_time, report.running_time).await?;
        queue?;
        info!(
            "batch {} finished in {}s: {} executed, {} failed",
            batch.id,
            report.running_time,
            report.executed(),
            report.failed()
        );
        Ok(report)
    }

    async fn drain_queue(
        &self,
        batch: &batch::Model,
        sim: &simulation::Model,
        report: &mut BatchReport,
    ) -> Result<(), BatchError> {
        for entry in BatchRepository::entries(&*self.db, batch.id).await? {
            let outcome = self.run_entry(batch, sim, entry.id).await?;
            report.entries.push((entry.id, outcome));
        }
        Ok(())
    }

    async fn run_entry(
        &self,
        batch: &batch::Model,
        sim: &simulation::Model,
        entry_id: i32,
    ) -> Result<EntryOutcome, BatchError> {
        // canceled is set concurrently, so read it fresh before and after imports
        let Some(entry) = self.fresh_entry(entry_id).await? else {
            return Ok(EntryOutcome::Canceled);
        };

        if let Err(e) = self.import_entry(sim, &entry).await {
            warn!("batch entry {} ({}): import failed: {}", entry.id, entry.name, e);
            BatchRepository::mark_failed(&*self.db, entry.id, &e.to_string()).await?;
            return Ok(EntryOutcome::ImportFailed);
        }

        if self.fresh_entry(entry_id).await?.is_none() {
            return Ok(EntryOutcome::Canceled);
        }

        let run_name = format!("{}{}", batch.name, entry.name);
        let run = RunRepository::create(&*self.db, sim.id, &run_name).await?;
        BatchRepository::link_run(&*self.db, entry.id, run.id).await?;
        info!("batch entry {}: run {} ({}) started", entry.id, run.id, run_name);

        match self.worker.execute(run.id).await {
            Ok(RunOutcome::Finished) => Ok(EntryOutcome::Executed { run_id: run.id }),
            Ok(RunOutcome::Aborted) => Ok(EntryOutcome::Aborted { run_id: run.id }),
            Err(e) => {
                error!("batch entry {}: run {} failed: {}", entry.id, run.id, e);
                BatchRepository::mark_failed(&*self.db, entry.id, &e.to_string()).await?;
                Ok(EntryOutcome::RunFailed { run_id: run.id })
            }
        }
    }

    /// The entry, unless it was canceled or removed meanwhile.
    async fn fresh_entry(&self, entry_id: i32) -> Result<Option<batch_run::Model>, BatchError> {
        let entry = BatchRepository::find_entry(&*self.db, entry_id).await?;
        match entry {
            Some(e) if !e.canceled => Ok(Some(e)),
            _ => {
                info!("batch entry {} canceled, skipping", entry_id);
                Ok(None)
            }
        }
    }

    /// Dependency order: nodes and functions before links, network before
    /// demand and tolls, the combined archive last.
    async fn import_entry(
        &self,
        sim: &simulation::Model,
        entry: &batch_run::Model,
    ) -> Result<(), ImportError> {
        let importer = Importer::new(&self.db, self.store.as_ref(), &self.config);

        let objects = [
            (ObjectKind::Centroid, &entry.centroid_file),
            (ObjectKind::Crossing, &entry.crossing_file),
            (ObjectKind::Function, &entry.function_file),
            (ObjectKind::Link, &entry.link_file),
        ];
        for (kind, key) in objects {
            if let Some(key) = key {
                let summary = importer.import_objects(sim, kind, key).await?;
                info!("entry {}: {} {}", entry.id, kind.as_str(), summary);
            }
        }
        if let Some(key) = &entry.public_transit_file {
            let summary = importer.import_public_transit(sim, key).await?;
            info!("entry {}: public transit {}", entry.id, summary);
        }
        if let Some(prefix) = &entry.traveler_file {
            for (user_type, summary) in importer.import_travelers(sim, prefix).await? {
                info!("entry {}: travelers {} {}", entry.id, user_type, summary);
            }
        }
        if let Some(key) = &entry.pricing_file {
            let summary = importer.import_pricing(sim, key).await?;
            info!("entry {}: pricing {}", entry.id, summary);
        }
        if let Some(prefix) = &entry.zip_file {
            importer.import_archive(sim, prefix).await?;
            info!("entry {}: archive {} imported", entry.id, prefix);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::testing::{test_db, test_simulation};
    use crate::storage::entity::BatchStatus;
    use crate::storage::repository::NewBatchEntry;
    use crate::storage::LocalFileStore;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _db_dir: TempDir,
        _base: TempDir,
        db: Arc<DatabaseConnection>,
        store: Arc<LocalFileStore>,
        service: BatchService,
        sim: simulation::Model,
    }

    async fn fixture(engine: &str) -> Fixture {
        let (db_dir, db) = test_db().await;
        let sim = test_simulation(&db).await;
        let base = tempdir().unwrap();
        let mut config = PipelineConfig::with_base_dir(base.path());
        config.engine_path = Some(engine.into());
        let db = Arc::new(db);
        let store = Arc::new(LocalFileStore::new(config.upload_dir.clone()));
        let service = BatchService::new(db.clone(), Arc::new(config), store.clone());
        Fixture {
            _db_dir: db_dir,
            _base: base,
            db,
            store,
            service,
            sim,
        }
    }

    fn entry(name: &str) -> NewBatchEntry {
        NewBatchEntry {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn unknown_batch_is_fatal() {
        let f = fixture("true").await;
        let err = f.service.run_batch(99).await.unwrap_err();
        assert!(matches!(err, BatchError::NotFound(99)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn canceled_entries_are_skipped_in_queue_order() {
        let f = fixture("true").await;
        let batch = BatchRepository::create(&*f.db, f.sim.id, "b1-").await.unwrap();
        let a = BatchRepository::add_entry(&*f.db, batch.id, entry("A")).await.unwrap();
        let b = BatchRepository::add_entry(&*f.db, batch.id, entry("B")).await.unwrap();
        let c = BatchRepository::add_entry(&*f.db, batch.id, entry("C")).await.unwrap();
        BatchRepository::set_canceled(&*f.db, b.id, true).await.unwrap();

        let report = f.service.run_batch(batch.id).await.unwrap();
        assert_eq!(report.executed(), 2);
        assert_eq!(report.entries[1], (b.id, EntryOutcome::Canceled));

        let names: Vec<String> = RunRepository::list(&*f.db, f.sim.id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["b1-A".to_string(), "b1-C".to_string()]);

        let entries = BatchRepository::entries(&*f.db, batch.id).await.unwrap();
        assert!(entries[0].run_id.is_some());
        assert!(entries[1].run_id.is_none());
        assert!(entries[2].run_id.is_some());
        assert_eq!(entries[0].id, a.id);
        assert_eq!(entries[2].id, c.id);

        let batch = BatchRepository::find(&*f.db, batch.id).await.unwrap().unwrap();
        assert_eq!(batch.status.parse::<BatchStatus>(), Ok(BatchStatus::Finished));
        assert!(batch.end_time.unwrap() >= batch.start_time.unwrap());
        assert_eq!(
            batch.running_time,
            Some(batch.end_time.unwrap() - batch.start_time.unwrap())
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_imports_do_not_stop_the_batch() {
        let f = fixture("true").await;
        let store = f.store.as_ref();
        store
            .write("base/centroids.tsv", b"id\tname\tx\ty\n1\tA\t0\t0\n2\tB\t1\t0\n")
            .await
            .unwrap();
        store
            .write("base/functions.tsv", b"id\tname\texpression\n1\tf\tlength/speed\n")
            .await
            .unwrap();
        store
            .write(
                "base/links.tsv",
                b"id\tname\torigin\tdestination\tfunction\tlanes\tlength\tspeed\tcapacity\n\
10\tL\t1\t2\t1\t1\t100\t50\t1000\n",
            )
            .await
            .unwrap();
        // updates link 10 to a function that does not exist
        store
            .write(
                "a/links.tsv",
                b"id\tname\torigin\tdestination\tfunction\tlanes\tlength\tspeed\tcapacity\n\
10\tL\t1\t2\t99\t2\t100\t50\t1000\n",
            )
            .await
            .unwrap();
        store
            .write("b/crossings.tsv", b"id\tname\tx\ty\n5\tX\tnope\t0\n")
            .await
            .unwrap();

        let batch = BatchRepository::create(&*f.db, f.sim.id, "b").await.unwrap();
        BatchRepository::add_entry(
            &*f.db,
            batch.id,
            NewBatchEntry {
                name: "base".to_string(),
                centroid_file: Some("base/centroids.tsv".to_string()),
                function_file: Some("base/functions.tsv".to_string()),
                link_file: Some("base/links.tsv".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        BatchRepository::add_entry(
            &*f.db,
            batch.id,
            NewBatchEntry {
                name: "A".to_string(),
                link_file: Some("a/links.tsv".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        BatchRepository::add_entry(
            &*f.db,
            batch.id,
            NewBatchEntry {
                name: "B".to_string(),
                crossing_file: Some("b/crossings.tsv".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        BatchRepository::add_entry(&*f.db, batch.id, entry("C")).await.unwrap();

        let report = f.service.run_batch(batch.id).await.unwrap();
        assert_eq!(report.executed(), 2);
        assert_eq!(report.failed(), 2);

        let entries = BatchRepository::entries(&*f.db, batch.id).await.unwrap();
        assert!(!entries[0].failed && entries[0].run_id.is_some());
        for failed in &entries[1..3] {
            assert!(failed.failed);
            assert!(failed.run_id.is_none());
            assert!(failed.error_message.is_some());
        }
        assert!(!entries[3].failed && entries[3].run_id.is_some());

        let runs = RunRepository::list(&*f.db, f.sim.id).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[1].name, "bC");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn engine_failure_marks_the_entry_failed() {
        let f = fixture("false").await;
        let batch = BatchRepository::create(&*f.db, f.sim.id, "b").await.unwrap();
        BatchRepository::add_entry(&*f.db, batch.id, entry("A")).await.unwrap();
        BatchRepository::add_entry(&*f.db, batch.id, entry("B")).await.unwrap();

        let report = f.service.run_batch(batch.id).await.unwrap();
        assert_eq!(report.executed(), 0);
        assert!(matches!(report.entries[0].1, EntryOutcome::RunFailed { .. }));
        assert!(matches!(report.entries[1].1, EntryOutcome::RunFailed { .. }));

        let entries = BatchRepository::entries(&*f.db, batch.id).await.unwrap();
        assert!(entries.iter().all(|e| e.failed && e.run_id.is_some()));
        let batch = BatchRepository::find(&*f.db, batch.id).await.unwrap().unwrap();
        assert_eq!(batch.status, BatchStatus::Finished.as_str());
    }
}

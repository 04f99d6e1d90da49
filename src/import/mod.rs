pub mod archive;
pub mod error;
pub mod export;
pub mod matrix;
pub mod pricing;
pub mod reconcile;
pub mod rows;

pub use archive::ArchiveSummary;
pub use error::ImportError;
pub use matrix::MatrixSummary;
pub use reconcile::ObjectKind;

use crate::config::{ImportMode, PipelineConfig};
use crate::storage::entity::{demand_segment, simulation};
use crate::storage::FileStore;
use rows::read_rows;
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::Serialize;
use std::fmt;

/// Outcome counts of one reconciled upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub rejected: usize,
}

impl fmt::Display for ImportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} skipped, {} rejected",
            self.created, self.updated, self.skipped, self.rejected
        )
    }
}

/// Runs `$body` against `$conn`, which is either the pool or, in atomic
/// mode, a transaction committed only when `$body` succeeds.
macro_rules! in_import_mode {
    ($importer:expr, |$conn:ident| $body:expr) => {{
        match $importer.config.import_mode {
            ImportMode::BestEffort => {
                let $conn = $importer.db;
                $body
            }
            ImportMode::Atomic => {
                let txn = $importer.db.begin().await?;
                let out = {
                    let $conn = &txn;
                    $body
                }?;
                txn.commit().await?;
                Ok(out)
            }
        }
    }};
}

/// Entry point for uploads: reads files from the store and applies them to
/// one simulation.
pub struct Importer<'a> {
    db: &'a DatabaseConnection,
    store: &'a dyn FileStore,
    config: &'a PipelineConfig,
}

impl<'a> Importer<'a> {
    pub fn new(
        db: &'a DatabaseConnection,
        store: &'a dyn FileStore,
        config: &'a PipelineConfig,
    ) -> Self {
        Self { db, store, config }
    }

    pub async fn import_objects(
        &self,
        sim: &simulation::Model,
        kind: ObjectKind,
        key: &str,
    ) -> Result<ImportSummary, ImportError> {
        let data = self.store.read(key).await?;
        let t = &self.config.thresholds;
        in_import_mode!(self, |conn| {
            archive::import_object_bytes(conn, t, sim, kind, &data).await
        })
    }

    pub async fn import_matrix(
        &self,
        sim: &simulation::Model,
        segment: &demand_segment::Model,
        key: &str,
    ) -> Result<MatrixSummary, ImportError> {
        let data = self.store.read(key).await?;
        let t = &self.config.thresholds;
        in_import_mode!(self, |conn| {
            let centroids = matrix::centroid_map(conn, sim).await?;
            matrix::import_matrix(
                conn,
                t,
                segment.matrices_id,
                segment.scale,
                &centroids,
                read_rows(&data)?,
            )
            .await
        })
    }

    pub async fn import_public_transit(
        &self,
        sim: &simulation::Model,
        key: &str,
    ) -> Result<MatrixSummary, ImportError> {
        let data = self.store.read(key).await?;
        let t = &self.config.thresholds;
        in_import_mode!(self, |conn| {
            matrix::import_public_transit(conn, t, sim, read_rows(&data)?).await
        })
    }

    pub async fn import_pricing(
        &self,
        sim: &simulation::Model,
        key: &str,
    ) -> Result<ImportSummary, ImportError> {
        let data = self.store.read(key).await?;
        let t = &self.config.thresholds;
        in_import_mode!(self, |conn| {
            pricing::import_pricing(conn, t, sim, read_rows(&data)?).await
        })
    }

    pub async fn import_travelers(
        &self,
        sim: &simulation::Model,
        prefix: &str,
    ) -> Result<Vec<(String, MatrixSummary)>, ImportError> {
        let t = &self.config.thresholds;
        in_import_mode!(self, |conn| {
            archive::import_travelers(conn, self.store, t, sim, prefix).await
        })
    }

    pub async fn import_archive(
        &self,
        sim: &simulation::Model,
        prefix: &str,
    ) -> Result<ArchiveSummary, ImportError> {
        let t = &self.config.thresholds;
        in_import_mode!(self, |conn| {
            archive::import_archive(conn, self.store, t, sim, prefix).await
        })
    }

    pub async fn delete_objects(
        &self,
        sim: &simulation::Model,
        kind: ObjectKind,
    ) -> Result<u64, ImportError> {
        reconcile::delete_objects(self.db, sim, kind).await
    }

    pub async fn export_objects(
        &self,
        sim: &simulation::Model,
        kind: ObjectKind,
    ) -> Result<Vec<u8>, ImportError> {
        export::export_objects(self.db, &self.config.exports_dir(), sim, kind).await
    }

    pub async fn export_matrix(
        &self,
        sim: &simulation::Model,
        segment: &demand_segment::Model,
    ) -> Result<Vec<u8>, ImportError> {
        export::export_matrix(self.db, &self.config.exports_dir(), sim, segment).await
    }

    pub async fn export_public_transit(
        &self,
        sim: &simulation::Model,
    ) -> Result<Vec<u8>, ImportError> {
        export::export_public_transit(self.db, &self.config.exports_dir(), sim).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use crate::storage::entity::simulation;
    use crate::storage::establish_connection;
    use crate::storage::repository::SimulationRepository;
    use sea_orm::DatabaseConnection;
    use tempfile::TempDir;

    /// Fresh SQLite database in a temporary directory; keep the `TempDir`
    /// alive for the duration of the test.
    pub async fn test_db() -> (TempDir, DatabaseConnection) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        let db = establish_connection(&url, 1).await.unwrap();
        (dir, db)
    }

    pub async fn test_simulation(db: &DatabaseConnection) -> simulation::Model {
        SimulationRepository::create(db, "test").await.unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{test_db, test_simulation};
    use super::*;
    use crate::storage::repository::NetworkRepository;
    use crate::storage::LocalFileStore;
    use crate::storage::entity::NodeKind;
    use tempfile::tempdir;

    async fn import_broken_archive(mode: ImportMode) -> usize {
        let (_dir, db) = test_db().await;
        let sim = test_simulation(&db).await;
        let files = tempdir().unwrap();
        let store = LocalFileStore::new(files.path());
        let mut config = PipelineConfig::with_base_dir(files.path());
        config.import_mode = mode;
        let importer = Importer::new(&db, &store, &config);

        store
            .write("bundle/centroids.tsv", b"id\tname\tx\ty\n1\tA\t0\t0\n2\tB\t1\t0\n")
            .await
            .unwrap();
        store
            .write("bundle/crossings.tsv", b"id\tname\tx\ty\n3\tC\t0\t0\n4\tD\tnope\t0\n")
            .await
            .unwrap();

        let err = importer.import_archive(&sim, "bundle").await.unwrap_err();
        assert!(matches!(err, ImportError::Malformed { column: "x", .. }));

        NetworkRepository::nodes(&db, sim.network_id, NodeKind::Centroid)
            .await
            .unwrap()
            .len()
    }

    #[tokio::test]
    async fn best_effort_keeps_members_imported_before_a_failure() {
        assert_eq!(import_broken_archive(ImportMode::BestEffort).await, 2);
    }

    #[tokio::test]
    async fn atomic_mode_rolls_back_the_whole_archive() {
        assert_eq!(import_broken_archive(ImportMode::Atomic).await, 0);
    }

    #[tokio::test]
    async fn missing_upload_is_an_import_error() {
        let (_dir, db) = test_db().await;
        let sim = test_simulation(&db).await;
        let files = tempdir().unwrap();
        let store = LocalFileStore::new(files.path());
        let config = PipelineConfig::with_base_dir(files.path());
        let importer = Importer::new(&db, &store, &config);

        let err = importer
            .import_pricing(&sim, "absent.tsv")
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Io(_)));
    }
}

use crate::config::Thresholds;
use crate::import::error::ImportError;
use crate::import::matrix::{self, MatrixSummary};
use crate::import::pricing;
use crate::import::reconcile::{self, ObjectKind};
use crate::import::rows::read_rows;
use crate::import::ImportSummary;
use crate::storage::entity::{simulation, NodeKind};
use crate::storage::repository::DemandRepository;
use crate::storage::FileStore;
use log::info;
use sea_orm::{ConnectionTrait, TransactionTrait};
use std::path::Path;

/// Reconciles one object file already loaded in memory.
pub async fn import_object_bytes<C: ConnectionTrait + TransactionTrait>(
    db: &C,
    thresholds: &Thresholds,
    sim: &simulation::Model,
    kind: ObjectKind,
    data: &[u8],
) -> Result<ImportSummary, ImportError> {
    match kind {
        ObjectKind::Centroid => {
            reconcile::reconcile_nodes(db, thresholds, sim, NodeKind::Centroid, read_rows(data)?)
                .await
        }
        ObjectKind::Crossing => {
            reconcile::reconcile_nodes(db, thresholds, sim, NodeKind::Crossing, read_rows(data)?)
                .await
        }
        ObjectKind::Function => {
            reconcile::reconcile_functions(db, thresholds, sim, read_rows(data)?).await
        }
        ObjectKind::Link => reconcile::reconcile_links(db, thresholds, sim, read_rows(data)?).await,
    }
}

/// Imports every `<user type name>.tsv` under `prefix` into the matching
/// demand segment.
pub async fn import_travelers<C: ConnectionTrait>(
    db: &C,
    store: &dyn FileStore,
    thresholds: &Thresholds,
    sim: &simulation::Model,
    prefix: &str,
) -> Result<Vec<(String, MatrixSummary)>, ImportError> {
    let centroids = matrix::centroid_map(db, sim).await?;
    let mut results = Vec::new();
    for key in store.list(prefix).await? {
        let user_type = Path::new(&key)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let segment = DemandRepository::segment_by_user_type(db, sim.demand_id, &user_type)
            .await?
            .ok_or_else(|| ImportError::UnknownUserType(user_type.clone()))?;
        let data = store.read(&key).await?;
        let summary = matrix::import_matrix(
            db,
            thresholds,
            segment.segment.matrices_id,
            segment.segment.scale,
            &centroids,
            read_rows(&data)?,
        )
        .await?;
        results.push((user_type, summary));
    }
    Ok(results)
}

#[derive(Debug, Default)]
pub struct ArchiveSummary {
    pub objects: Vec<(ObjectKind, ImportSummary)>,
    pub public_transit: Option<MatrixSummary>,
    pub pricing: Option<ImportSummary>,
    pub travelers: Vec<(String, MatrixSummary)>,
}

const ARCHIVE_OBJECTS: [(&str, ObjectKind); 4] = [
    ("centroids.tsv", ObjectKind::Centroid),
    ("crossings.tsv", ObjectKind::Crossing),
    ("functions.tsv", ObjectKind::Function),
    ("links.tsv", ObjectKind::Link),
];

/// Imports the members present in a combined archive, network objects
/// first, then public transit, pricing and travelers.
pub async fn import_archive<C: ConnectionTrait + TransactionTrait>(
    db: &C,
    store: &dyn FileStore,
    thresholds: &Thresholds,
    sim: &simulation::Model,
    prefix: &str,
) -> Result<ArchiveSummary, ImportError> {
    let prefix = prefix.trim_end_matches('/');
    let member = |name: &str| format!("{}/{}", prefix, name);
    let mut summary = ArchiveSummary::default();

    for (name, kind) in ARCHIVE_OBJECTS {
        let key = member(name);
        if store.exists(&key).await {
            let data = store.read(&key).await?;
            let s = import_object_bytes(db, thresholds, sim, kind, &data).await?;
            summary.objects.push((kind, s));
        }
    }

    let key = member("public_transit.tsv");
    if store.exists(&key).await {
        let data = store.read(&key).await?;
        summary.public_transit =
            Some(matrix::import_public_transit(db, thresholds, sim, read_rows(&data)?).await?);
    }

    let key = member("pricing.tsv");
    if store.exists(&key).await {
        let data = store.read(&key).await?;
        summary.pricing = Some(pricing::import_pricing(db, thresholds, sim, read_rows(&data)?).await?);
    }

    let key = member("travelers");
    if store.exists(&key).await {
        summary.travelers = import_travelers(db, store, thresholds, sim, &key).await?;
    }

    info!(
        "archive {} imported into simulation {}: {} object files",
        prefix,
        sim.id,
        summary.objects.len()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::testing::{test_db, test_simulation};
    use crate::storage::repository::{MatrixRepository, NetworkRepository, PricingRepository};
    use crate::storage::LocalFileStore;
    use tempfile::tempdir;

    #[tokio::test]
    async fn combined_archive_imports_in_dependency_order() {
        let (_dir, db) = test_db().await;
        let sim = test_simulation(&db).await;
        let segment = DemandRepository::add_segment(&db, sim.demand_id, "car", 1.5)
            .await
            .unwrap();
        let files = tempdir().unwrap();
        let store = LocalFileStore::new(files.path());

        store
            .write("bundle/links.tsv", b"id\tname\torigin\tdestination\tfunction\tlanes\tlength\tspeed\tcapacity\n1\tL\t1\t2\t1\t1\t10\t50\t1000\n")
            .await
            .unwrap();
        store
            .write("bundle/centroids.tsv", b"id\tname\tx\ty\n1\tA\t0\t0\n2\tB\t1\t0\n")
            .await
            .unwrap();
        store
            .write("bundle/functions.tsv", b"id\tname\texpression\n1\tf\tlength/speed\n")
            .await
            .unwrap();
        store
            .write("bundle/public_transit.tsv", b"origin\tdestination\ttravel time\n1\t2\t12\n")
            .await
            .unwrap();
        store
            .write("bundle/pricing.tsv", b"link\tvalue\n1\t3\n")
            .await
            .unwrap();
        store
            .write("bundle/travelers/car.tsv", b"origin\tdestination\tpopulation\n1\t2\t100\n2\t1\t50\n")
            .await
            .unwrap();

        let t = Thresholds::default();
        let s = import_archive(&db, &store, &t, &sim, "bundle").await.unwrap();

        let kinds: Vec<ObjectKind> = s.objects.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![ObjectKind::Centroid, ObjectKind::Function, ObjectKind::Link]
        );
        assert_eq!(s.objects[2].1.created, 1);
        assert_eq!(s.public_transit.unwrap().total, 12.0);
        assert_eq!(s.pricing.unwrap().created, 1);
        assert_eq!(s.travelers.len(), 1);
        assert_eq!(s.travelers[0].1.total, 225.0);

        assert_eq!(NetworkRepository::links(&db, sim.network_id).await.unwrap().len(), 1);
        assert_eq!(PricingRepository::list(&db, sim.id).await.unwrap().len(), 1);
        let m = MatrixRepository::find(&db, segment.matrices_id).await.unwrap().unwrap();
        assert_eq!(m.total, 225.0);
    }

    #[tokio::test]
    async fn traveler_file_for_unknown_user_type_fails() {
        let (_dir, db) = test_db().await;
        let sim = test_simulation(&db).await;
        let files = tempdir().unwrap();
        let store = LocalFileStore::new(files.path());
        store
            .write("travel/trucks.tsv", b"origin\tdestination\tpopulation\n")
            .await
            .unwrap();

        let err = import_travelers(&db, &store, &Thresholds::default(), &sim, "travel")
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::UnknownUserType(ref n) if n == "trucks"));
    }
}

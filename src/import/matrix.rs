use crate::config::Thresholds;
use crate::import::error::ImportError;
use crate::import::rows::{FloatKey, OdRow, TravelTimeRow};
use crate::storage::entity::{simulation, NodeKind};
use crate::storage::repository::{MatrixRepository, NetworkRepository};
use log::info;
use sea_orm::ConnectionTrait;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MatrixSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Self pairs and repeated pairs.
    pub rejected: usize,
    pub total: f64,
}

impl fmt::Display for MatrixSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} skipped, {} rejected, total {}",
            self.created, self.updated, self.skipped, self.rejected, self.total
        )
    }
}

/// Centroid natural id -> internal id for the simulation.
pub async fn centroid_map<C: ConnectionTrait>(
    db: &C,
    sim: &simulation::Model,
) -> Result<HashMap<i64, i32>, ImportError> {
    Ok(NetworkRepository::node_id_map(db, sim.network_id, Some(NodeKind::Centroid)).await?)
}

/// Merges `rows` into the matrix and refreshes its total as
/// `scale * sum(r)`. Unknown centroids abort the import.
pub async fn import_matrix<C, I>(
    db: &C,
    thresholds: &Thresholds,
    matrices_id: i32,
    scale: f64,
    centroids: &HashMap<i64, i32>,
    rows: I,
) -> Result<MatrixSummary, ImportError>
where
    C: ConnectionTrait,
    I: IntoIterator<Item = Result<OdRow, ImportError>>,
{
    let existing = MatrixRepository::pair_index(db, matrices_id).await?;

    let mut summary = MatrixSummary::default();
    let mut seen = HashSet::new();
    let mut replaced: Vec<i32> = Vec::new();
    let mut to_create: Vec<(i32, i32, f64)> = Vec::new();
    for row in rows {
        let row = row?;
        let p = centroid(centroids, row.origin)?;
        let q = centroid(centroids, row.destination)?;
        if p == q || !seen.insert((p, q)) {
            summary.rejected += 1;
            continue;
        }
        match existing.get(&(p, q)) {
            Some((_, r)) if FloatKey::from(*r) == FloatKey::from(row.value) => {
                summary.skipped += 1
            }
            Some((id, _)) => {
                replaced.push(*id);
                to_create.push((p, q, row.value));
            }
            None => to_create.push((p, q, row.value)),
        }
    }

    let chunk = thresholds.matrix_chunk_size;
    MatrixRepository::delete_cells(db, &replaced, chunk).await?;
    summary.updated = replaced.len();
    let written = MatrixRepository::insert_cells(db, matrices_id, to_create, chunk).await?;
    summary.created = written - summary.updated;

    summary.total = MatrixRepository::refresh_total(db, matrices_id, scale).await?;
    info!("matrix {} import: {}", matrices_id, summary);
    Ok(summary)
}

/// Travel times are stored unscaled in the simulation's public-transit matrix.
pub async fn import_public_transit<C, I>(
    db: &C,
    thresholds: &Thresholds,
    sim: &simulation::Model,
    rows: I,
) -> Result<MatrixSummary, ImportError>
where
    C: ConnectionTrait,
    I: IntoIterator<Item = Result<TravelTimeRow, ImportError>>,
{
    let matrices_id = sim
        .pttimes_id
        .ok_or(ImportError::MissingContainer(sim.id, "public-transit matrix"))?;
    let centroids = centroid_map(db, sim).await?;
    let rows = rows.into_iter().map(|r| r.map(|TravelTimeRow(od)| od));
    import_matrix(db, thresholds, matrices_id, 1.0, &centroids, rows).await
}

fn centroid(map: &HashMap<i64, i32>, id: i64) -> Result<i32, ImportError> {
    map.get(&id).copied().ok_or(ImportError::UnknownReference {
        kind: "centroid",
        id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::reconcile::reconcile_nodes;
    use crate::import::rows::read_rows;
    use crate::import::testing::{test_db, test_simulation};
    use crate::storage::repository::DemandRepository;

    const CENTROIDS: &[u8] = b"id\tname\tx\ty\n1\tA\t0\t0\n2\tB\t1\t0\n3\tC\t2\t0\n";

    #[tokio::test]
    async fn total_tracks_scaled_sum() {
        let (_dir, db) = test_db().await;
        let sim = test_simulation(&db).await;
        let t = Thresholds::default();
        reconcile_nodes(&db, &t, &sim, NodeKind::Centroid, read_rows(CENTROIDS).unwrap())
            .await
            .unwrap();
        let segment = DemandRepository::add_segment(&db, sim.demand_id, "commuters", 2.0)
            .await
            .unwrap();
        let map = centroid_map(&db, &sim).await.unwrap();

        let data = b"origin\tdestination\tpopulation\n1\t2\t10\n2\t1\t5\n1\t1\t99\n1\t2\t7\n";
        let s = import_matrix(&db, &t, segment.matrices_id, 2.0, &map, read_rows(data).unwrap())
            .await
            .unwrap();
        assert_eq!(s.created, 2);
        assert_eq!(s.rejected, 2);
        assert_eq!(s.total, 30.0);

        let update = b"origin\tdestination\tpopulation\n1\t2\t10\n2\t1\t6\n3\t1\t4\n";
        let s = import_matrix(&db, &t, segment.matrices_id, 2.0, &map, read_rows(update).unwrap())
            .await
            .unwrap();
        assert_eq!((s.created, s.updated, s.skipped), (1, 1, 1));
        assert_eq!(s.total, 40.0);

        let stored = MatrixRepository::find(&db, segment.matrices_id)
            .await
            .unwrap()
            .unwrap();
        let sum = MatrixRepository::sum(&db, segment.matrices_id).await.unwrap();
        assert_eq!(stored.total, 2.0 * sum);

        // One row per (p, q).
        let cells = MatrixRepository::cells(&db, segment.matrices_id).await.unwrap();
        let pairs: HashSet<(i32, i32)> = cells.iter().map(|c| (c.p, c.q)).collect();
        assert_eq!(pairs.len(), cells.len());
        assert_eq!(cells.len(), 3);
    }

    #[tokio::test]
    async fn unknown_centroid_aborts() {
        let (_dir, db) = test_db().await;
        let sim = test_simulation(&db).await;
        let t = Thresholds::default();
        reconcile_nodes(&db, &t, &sim, NodeKind::Centroid, read_rows(CENTROIDS).unwrap())
            .await
            .unwrap();
        let map = centroid_map(&db, &sim).await.unwrap();
        let pt = sim.pttimes_id.unwrap();

        let data = b"origin\tdestination\tpopulation\n1\t8\t3\n";
        let err = import_matrix(&db, &t, pt, 1.0, &map, read_rows(data).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ImportError::UnknownReference { kind: "centroid", id: 8 }
        ));
    }
}

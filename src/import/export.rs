use crate::import::error::ImportError;
use crate::import::reconcile::ObjectKind;
use crate::storage::entity::{demand_segment, simulation, NodeKind};
use crate::storage::repository::{MatrixRepository, NetworkRepository};
use csv::WriterBuilder;
use log::debug;
use rand::Rng;
use sea_orm::ConnectionTrait;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

const MAX_SEED_ATTEMPTS: usize = 16;

/// Writes `rows` as a tab-separated file named after a random seed in
/// `dir`, reads it back and removes it.
async fn export_rows(
    dir: &Path,
    header: &[&str],
    rows: Vec<Vec<String>>,
) -> Result<Vec<u8>, ImportError> {
    tokio::fs::create_dir_all(dir).await?;
    let (path, file) = open_seed_file(dir)?;
    {
        let mut writer = WriterBuilder::new().delimiter(b'\t').from_writer(file);
        writer.write_record(header)?;
        for row in &rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
    }
    let data = tokio::fs::read(&path).await?;
    tokio::fs::remove_file(&path).await?;
    debug!("exported {} rows via {}", rows.len(), path.display());
    Ok(data)
}

fn open_seed_file(dir: &Path) -> Result<(PathBuf, std::fs::File), ImportError> {
    let mut rng = rand::thread_rng();
    for _ in 0..MAX_SEED_ATTEMPTS {
        let seed: u32 = rng.gen_range(0..10000);
        let path = dir.join(format!("{}.tsv", seed));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(io::Error::new(io::ErrorKind::AlreadyExists, "no free export file name").into())
}

/// Exports the simulation's objects of `kind` in their import layout.
pub async fn export_objects<C: ConnectionTrait>(
    db: &C,
    exports_dir: &Path,
    sim: &simulation::Model,
    kind: ObjectKind,
) -> Result<Vec<u8>, ImportError> {
    match kind {
        ObjectKind::Centroid | ObjectKind::Crossing => {
            let node_kind = kind.node_kind().unwrap_or(NodeKind::Centroid);
            let rows = NetworkRepository::nodes(db, sim.network_id, node_kind)
                .await?
                .into_iter()
                .map(|n| {
                    vec![
                        n.user_id.to_string(),
                        n.name,
                        n.x.to_string(),
                        n.y.to_string(),
                        n.id.to_string(),
                    ]
                })
                .collect();
            export_rows(exports_dir, &["id", "name", "x", "y", "db_id"], rows).await
        }
        ObjectKind::Function => {
            let rows = NetworkRepository::functions(db, sim.function_set_id)
                .await?
                .into_iter()
                .map(|f| vec![f.user_id.to_string(), f.name, f.expression])
                .collect();
            export_rows(exports_dir, &["id", "name", "expression"], rows).await
        }
        ObjectKind::Link => {
            let nodes = invert(NetworkRepository::node_id_map(db, sim.network_id, None).await?);
            let functions =
                invert(NetworkRepository::function_id_map(db, sim.function_set_id).await?);
            let natural = |map: &HashMap<i32, i64>, id: i32| {
                map.get(&id).map(|v| v.to_string()).unwrap_or_default()
            };
            let rows = NetworkRepository::links(db, sim.network_id)
                .await?
                .into_iter()
                .map(|l| {
                    vec![
                        l.user_id.to_string(),
                        l.name.clone(),
                        natural(&nodes, l.origin),
                        natural(&nodes, l.destination),
                        natural(&functions, l.vdf_id),
                        l.lanes.to_string(),
                        l.length.to_string(),
                        l.speed.to_string(),
                        l.capacity.to_string(),
                    ]
                })
                .collect();
            export_rows(
                exports_dir,
                &[
                    "id",
                    "name",
                    "origin",
                    "destination",
                    "function",
                    "lanes",
                    "length",
                    "speed",
                    "capacity",
                ],
                rows,
            )
            .await
        }
    }
}

pub async fn export_matrix<C: ConnectionTrait>(
    db: &C,
    exports_dir: &Path,
    sim: &simulation::Model,
    segment: &demand_segment::Model,
) -> Result<Vec<u8>, ImportError> {
    let rows = od_rows(db, sim, segment.matrices_id).await?;
    export_rows(exports_dir, &["origin", "destination", "population"], rows).await
}

pub async fn export_public_transit<C: ConnectionTrait>(
    db: &C,
    exports_dir: &Path,
    sim: &simulation::Model,
) -> Result<Vec<u8>, ImportError> {
    let matrices_id = sim
        .pttimes_id
        .ok_or(ImportError::MissingContainer(sim.id, "public-transit matrix"))?;
    let rows = od_rows(db, sim, matrices_id).await?;
    export_rows(exports_dir, &["origin", "destination", "travel time"], rows).await
}

async fn od_rows<C: ConnectionTrait>(
    db: &C,
    sim: &simulation::Model,
    matrices_id: i32,
) -> Result<Vec<Vec<String>>, ImportError> {
    let centroids = invert(
        NetworkRepository::node_id_map(db, sim.network_id, Some(NodeKind::Centroid)).await?,
    );
    let mut rows = Vec::new();
    for cell in MatrixRepository::cells(db, matrices_id).await? {
        let (Some(p), Some(q)) = (centroids.get(&cell.p), centroids.get(&cell.q)) else {
            continue;
        };
        rows.push(vec![p.to_string(), q.to_string(), cell.r.to_string()]);
    }
    Ok(rows)
}

fn invert(map: HashMap<i64, i32>) -> HashMap<i32, i64> {
    map.into_iter().map(|(k, v)| (v, k)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Thresholds;
    use crate::import::archive::import_object_bytes;
    use crate::import::matrix::{centroid_map, import_matrix};
    use crate::import::rows::read_rows;
    use crate::import::testing::{test_db, test_simulation};
    use crate::storage::repository::DemandRepository;
    use tempfile::tempdir;

    const LINKS: &[u8] = b"id\tname\torigin\tdestination\tfunction\tlanes\tlength\tspeed\tcapacity\n\
10\tMain\t1\t2\t3\t1\t10\t50\t1000\n";

    #[tokio::test]
    async fn exported_links_reimport_as_no_ops() {
        let (_dir, db) = test_db().await;
        let sim = test_simulation(&db).await;
        let t = Thresholds::default();
        import_object_bytes(&db, &t, &sim, ObjectKind::Centroid, b"id\tname\tx\ty\n1\tA\t0\t0\n2\tB\t1.5\t0\n")
            .await
            .unwrap();
        import_object_bytes(&db, &t, &sim, ObjectKind::Function, b"id\tname\texpression\n3\tf\tlength/speed\n")
            .await
            .unwrap();
        import_object_bytes(&db, &t, &sim, ObjectKind::Link, LINKS).await.unwrap();

        let exports = tempdir().unwrap();
        let data = export_objects(&db, exports.path(), &sim, ObjectKind::Link)
            .await
            .unwrap();
        assert_eq!(data, LINKS);
        assert_eq!(std::fs::read_dir(exports.path()).unwrap().count(), 0);

        let s = import_object_bytes(&db, &t, &sim, ObjectKind::Link, &data).await.unwrap();
        assert_eq!((s.created, s.updated, s.skipped), (0, 0, 1));

        let centroids = export_objects(&db, exports.path(), &sim, ObjectKind::Centroid)
            .await
            .unwrap();
        let text = String::from_utf8(centroids).unwrap();
        assert!(text.starts_with("id\tname\tx\ty\tdb_id\n1\tA\t0\t0\t"));
        assert!(text.contains("\n2\tB\t1.5\t0\t"));
    }

    #[tokio::test]
    async fn matrix_export_uses_natural_ids() {
        let (_dir, db) = test_db().await;
        let sim = test_simulation(&db).await;
        let t = Thresholds::default();
        import_object_bytes(&db, &t, &sim, ObjectKind::Centroid, b"id\tname\tx\ty\n7\tA\t0\t0\n8\tB\t1\t0\n")
            .await
            .unwrap();
        let segment = DemandRepository::add_segment(&db, sim.demand_id, "car", 1.0)
            .await
            .unwrap();
        let map = centroid_map(&db, &sim).await.unwrap();
        import_matrix(
            &db,
            &t,
            segment.matrices_id,
            1.0,
            &map,
            read_rows(b"origin\tdestination\tpopulation\n7\t8\t2.5\n").unwrap(),
        )
        .await
        .unwrap();

        let exports = tempdir().unwrap();
        let data = export_matrix(&db, exports.path(), &sim, &segment).await.unwrap();
        assert_eq!(data, b"origin\tdestination\tpopulation\n7\t8\t2.5\n");

        let pt = export_public_transit(&db, exports.path(), &sim).await.unwrap();
        assert_eq!(pt, b"origin\tdestination\ttravel time\n");
    }
}

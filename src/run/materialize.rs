use crate::config::PipelineConfig;
use crate::run::model::{ArtifactPaths, RunError};
use crate::storage::repository::MatrixRepository;
use csv::{ReaderBuilder, WriterBuilder};
use log::info;
use sea_orm::ConnectionTrait;
use std::path::Path;

/// Writes the matrix cells to its cleaned file, then reloads the physical
/// `Matrix_<id>` table from that file.
pub async fn materialize_matrix<C: ConnectionTrait>(
    db: &C,
    config: &PipelineConfig,
    matrices_id: i32,
) -> Result<usize, RunError> {
    if MatrixRepository::find(db, matrices_id).await?.is_none() {
        return Err(RunError::UnknownMatrix(matrices_id));
    }
    let cells = MatrixRepository::cells(db, matrices_id).await?;
    let path = ArtifactPaths::clean_matrix(config, matrices_id);
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    write_clean_file(&path, cells.iter().map(|c| (c.p as i64, c.q as i64, c.r)))?;

    MatrixRepository::ensure_physical_table(db, matrices_id).await?;
    MatrixRepository::clear_physical_table(db, matrices_id).await?;
    let rows = read_clean_file(&path)?;
    let loaded = MatrixRepository::load_physical_rows(
        db,
        matrices_id,
        &rows,
        config.thresholds.matrix_chunk_size,
    )
    .await?;
    info!("materialized matrix {} ({} cells)", matrices_id, loaded);
    Ok(loaded)
}

fn write_clean_file(
    path: &Path,
    cells: impl Iterator<Item = (i64, i64, f64)>,
) -> Result<(), RunError> {
    let mut writer = WriterBuilder::new().delimiter(b'\t').from_path(path)?;
    writer.write_record(["p", "q", "r"])?;
    for (p, q, r) in cells {
        writer.write_record([p.to_string(), q.to_string(), r.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Bulk-load source: tab-separated, one header row skipped.
fn read_clean_file(path: &Path) -> Result<Vec<(i64, i64, f64)>, RunError> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::testing::test_db;
    use sea_orm::{ActiveModelTrait, NotSet, Set};
    use crate::storage::entity::matrices;
    use tempfile::tempdir;

    #[tokio::test]
    async fn reload_replaces_physical_rows() {
        let (_dir, db) = test_db().await;
        let base = tempdir().unwrap();
        let config = PipelineConfig::with_base_dir(base.path());
        let m = matrices::ActiveModel {
            id: NotSet,
            total: Set(0.0),
        }
        .insert(&db)
        .await
        .unwrap();
        MatrixRepository::insert_cells(&db, m.id, vec![(1, 2, 4.0), (2, 1, 0.5)], 100)
            .await
            .unwrap();

        assert_eq!(materialize_matrix(&db, &config, m.id).await.unwrap(), 2);
        assert_eq!(materialize_matrix(&db, &config, m.id).await.unwrap(), 2);
        assert_eq!(
            MatrixRepository::count_physical_rows(&db, m.id).await.unwrap(),
            2
        );
        let text = std::fs::read_to_string(ArtifactPaths::clean_matrix(&config, m.id)).unwrap();
        assert_eq!(text, "p\tq\tr\n1\t2\t4\n2\t1\t0.5\n");
    }

    #[tokio::test]
    async fn unknown_matrix_is_fatal() {
        let (_dir, db) = test_db().await;
        let base = tempdir().unwrap();
        let config = PipelineConfig::with_base_dir(base.path());
        let err = materialize_matrix(&db, &config, 404).await.unwrap_err();
        assert!(matches!(err, RunError::UnknownMatrix(404)));
    }
}

use crate::storage::entity::matrices::{self, Entity as Matrices};
use crate::storage::entity::od_pair::{self, Entity as OdPair};
use crate::storage::repository::rows_per_statement;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, NotSet, QueryFilter, QueryOrder,
    QuerySelect, Set, Statement, Value,
};
use std::collections::HashMap;

pub struct MatrixRepository;

impl MatrixRepository {
    pub async fn find<C: ConnectionTrait>(db: &C, id: i32) -> Result<Option<matrices::Model>, DbErr> {
        Matrices::find_by_id(id).one(db).await
    }

    /// (p, q) -> (row id, r) for every cell of the matrix.
    pub async fn pair_index<C: ConnectionTrait>(
        db: &C,
        matrices_id: i32,
    ) -> Result<HashMap<(i32, i32), (i32, f64)>, DbErr> {
        let rows = OdPair::find()
            .select_only()
            .column(od_pair::Column::P)
            .column(od_pair::Column::Q)
            .column(od_pair::Column::Id)
            .column(od_pair::Column::R)
            .filter(od_pair::Column::MatricesId.eq(matrices_id))
            .into_tuple::<(i32, i32, i32, f64)>()
            .all(db)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(p, q, id, r)| ((p, q), (id, r)))
            .collect())
    }

    pub async fn cells<C: ConnectionTrait>(
        db: &C,
        matrices_id: i32,
    ) -> Result<Vec<od_pair::Model>, DbErr> {
        OdPair::find()
            .filter(od_pair::Column::MatricesId.eq(matrices_id))
            .order_by_asc(od_pair::Column::P)
            .order_by_asc(od_pair::Column::Q)
            .all(db)
            .await
    }

    pub async fn insert_cells<C: ConnectionTrait>(
        db: &C,
        matrices_id: i32,
        cells: Vec<(i32, i32, f64)>,
        chunk_size: usize,
    ) -> Result<usize, DbErr> {
        let total = cells.len();
        let per_stmt = rows_per_statement(chunk_size, 4);
        let mut it = cells.into_iter().peekable();
        while it.peek().is_some() {
            let chunk: Vec<od_pair::ActiveModel> = it
                .by_ref()
                .take(per_stmt)
                .map(|(p, q, r)| od_pair::ActiveModel {
                    id: NotSet,
                    matrices_id: Set(matrices_id),
                    p: Set(p),
                    q: Set(q),
                    r: Set(r),
                })
                .collect();
            OdPair::insert_many(chunk).exec_without_returning(db).await?;
        }
        Ok(total)
    }

    pub async fn delete_cells<C: ConnectionTrait>(
        db: &C,
        ids: &[i32],
        chunk_size: usize,
    ) -> Result<u64, DbErr> {
        let mut deleted = 0;
        for chunk in ids.chunks(rows_per_statement(chunk_size, 1)) {
            deleted += OdPair::delete_many()
                .filter(od_pair::Column::Id.is_in(chunk.to_vec()))
                .exec(db)
                .await?
                .rows_affected;
        }
        Ok(deleted)
    }

    /// Removes every cell of the matrix and zeroes its total.
    pub async fn reset_matrix<C: ConnectionTrait>(db: &C, matrices_id: i32) -> Result<(), DbErr> {
        OdPair::delete_many()
            .filter(od_pair::Column::MatricesId.eq(matrices_id))
            .exec(db)
            .await?;
        Self::set_total(db, matrices_id, 0.0).await
    }

    pub async fn delete_public_transit<C: ConnectionTrait>(
        db: &C,
        pttimes_id: Option<i32>,
    ) -> Result<(), DbErr> {
        match pttimes_id {
            Some(id) => Self::reset_matrix(db, id).await,
            None => Ok(()),
        }
    }

    pub async fn sum<C: ConnectionTrait>(db: &C, matrices_id: i32) -> Result<f64, DbErr> {
        let sum = OdPair::find()
            .select_only()
            .column_as(Expr::col(od_pair::Column::R).sum(), "total")
            .filter(od_pair::Column::MatricesId.eq(matrices_id))
            .into_tuple::<Option<f64>>()
            .one(db)
            .await?;
        Ok(sum.flatten().unwrap_or(0.0))
    }

    pub async fn set_total<C: ConnectionTrait>(
        db: &C,
        matrices_id: i32,
        total: f64,
    ) -> Result<(), DbErr> {
        Matrices::update_many()
            .col_expr(matrices::Column::Total, Expr::value(total))
            .filter(matrices::Column::Id.eq(matrices_id))
            .exec(db)
            .await?;
        Ok(())
    }

    /// Recomputes `total = scale * sum(r)` from the stored cells.
    pub async fn refresh_total<C: ConnectionTrait>(
        db: &C,
        matrices_id: i32,
        scale: f64,
    ) -> Result<f64, DbErr> {
        let total = scale * Self::sum(db, matrices_id).await?;
        Self::set_total(db, matrices_id, total).await?;
        Ok(total)
    }

    // ----- physical per-matrix tables -----

    pub fn physical_table(matrices_id: i32) -> String {
        format!("Matrix_{}", matrices_id)
    }

    pub async fn ensure_physical_table<C: ConnectionTrait>(
        db: &C,
        matrices_id: i32,
    ) -> Result<(), DbErr> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (p BIGINT NOT NULL, q BIGINT NOT NULL, r DOUBLE DEFAULT 0);",
            Self::physical_table(matrices_id)
        );
        db.execute(Statement::from_string(db.get_database_backend(), sql))
            .await?;
        Ok(())
    }

    pub async fn clear_physical_table<C: ConnectionTrait>(
        db: &C,
        matrices_id: i32,
    ) -> Result<(), DbErr> {
        let sql = format!("DELETE FROM {};", Self::physical_table(matrices_id));
        db.execute(Statement::from_string(db.get_database_backend(), sql))
            .await?;
        Ok(())
    }

    pub async fn load_physical_rows<C: ConnectionTrait>(
        db: &C,
        matrices_id: i32,
        rows: &[(i64, i64, f64)],
        chunk_size: usize,
    ) -> Result<usize, DbErr> {
        let table = Self::physical_table(matrices_id);
        for chunk in rows.chunks(rows_per_statement(chunk_size, 3)) {
            let placeholders = vec!["(?, ?, ?)"; chunk.len()].join(", ");
            let sql = format!("INSERT INTO {} (p, q, r) VALUES {};", table, placeholders);
            let mut values: Vec<Value> = Vec::with_capacity(chunk.len() * 3);
            for (p, q, r) in chunk {
                values.push((*p).into());
                values.push((*q).into());
                values.push((*r).into());
            }
            db.execute(Statement::from_sql_and_values(
                db.get_database_backend(),
                sql,
                values,
            ))
            .await?;
        }
        Ok(rows.len())
    }

    pub async fn count_physical_rows<C: ConnectionTrait>(
        db: &C,
        matrices_id: i32,
    ) -> Result<i64, DbErr> {
        let sql = format!("SELECT COUNT(*) AS n FROM {};", Self::physical_table(matrices_id));
        let row = db
            .query_one(Statement::from_string(db.get_database_backend(), sql))
            .await?;
        match row {
            Some(r) => r.try_get::<i64>("", "n"),
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::establish_connection;
    use sea_orm::ActiveModelTrait;
    use tempfile::tempdir;

    #[tokio::test]
    async fn refresh_total_applies_scale() {
        let dir = tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("t.db").display());
        let db = establish_connection(&url, 1).await.unwrap();
        let m = matrices::ActiveModel {
            id: NotSet,
            total: Set(0.0),
        }
        .insert(&db)
        .await
        .unwrap();

        MatrixRepository::insert_cells(&db, m.id, vec![(1, 2, 3.0), (2, 1, 4.5)], 1)
            .await
            .unwrap();
        let total = MatrixRepository::refresh_total(&db, m.id, 2.0).await.unwrap();
        assert_eq!(total, 15.0);
        assert_eq!(MatrixRepository::find(&db, m.id).await.unwrap().unwrap().total, 15.0);

        MatrixRepository::reset_matrix(&db, m.id).await.unwrap();
        assert!(MatrixRepository::cells(&db, m.id).await.unwrap().is_empty());
        assert_eq!(MatrixRepository::sum(&db, m.id).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn physical_table_roundtrip() {
        let dir = tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("t.db").display());
        let db = establish_connection(&url, 1).await.unwrap();

        MatrixRepository::ensure_physical_table(&db, 7).await.unwrap();
        MatrixRepository::load_physical_rows(&db, 7, &[(1, 2, 1.0), (2, 1, 2.0)], 10)
            .await
            .unwrap();
        assert_eq!(MatrixRepository::count_physical_rows(&db, 7).await.unwrap(), 2);

        MatrixRepository::ensure_physical_table(&db, 7).await.unwrap();
        MatrixRepository::clear_physical_table(&db, 7).await.unwrap();
        assert_eq!(MatrixRepository::count_physical_rows(&db, 7).await.unwrap(), 0);
    }
}

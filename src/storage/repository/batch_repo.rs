use crate::storage::entity::batch::{self, BatchStatus, Entity as Batch};
use crate::storage::entity::batch_run::{self, Entity as BatchRun};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, NotSet, QueryFilter,
    QueryOrder, QuerySelect, Set,
};

/// Files of one queued entry; every field is an optional file-store key.
#[derive(Debug, Clone, Default)]
pub struct NewBatchEntry {
    pub name: String,
    pub centroid_file: Option<String>,
    pub crossing_file: Option<String>,
    pub function_file: Option<String>,
    pub link_file: Option<String>,
    pub public_transit_file: Option<String>,
    pub traveler_file: Option<String>,
    pub pricing_file: Option<String>,
    pub zip_file: Option<String>,
}

pub struct BatchRepository;

impl BatchRepository {
    pub async fn create<C: ConnectionTrait>(
        db: &C,
        simulation_id: i32,
        name: &str,
    ) -> Result<batch::Model, DbErr> {
        batch::ActiveModel {
            id: NotSet,
            simulation_id: Set(simulation_id),
            name: Set(name.to_string()),
            status: Set(BatchStatus::Pending.as_str().to_string()),
            start_time: Set(None),
            end_time: Set(None),
            running_time: Set(None),
            created_at: Set(Utc::now().timestamp()),
        }
        .insert(db)
        .await
    }

    pub async fn find<C: ConnectionTrait>(db: &C, id: i32) -> Result<Option<batch::Model>, DbErr> {
        Batch::find_by_id(id).one(db).await
    }

    /// Appends an entry at the end of the batch queue.
    pub async fn add_entry<C: ConnectionTrait>(
        db: &C,
        batch_id: i32,
        entry: NewBatchEntry,
    ) -> Result<batch_run::Model, DbErr> {
        let last = BatchRun::find()
            .select_only()
            .column(batch_run::Column::Position)
            .filter(batch_run::Column::BatchId.eq(batch_id))
            .order_by_desc(batch_run::Column::Position)
            .into_tuple::<i32>()
            .one(db)
            .await?;
        batch_run::ActiveModel {
            id: NotSet,
            batch_id: Set(batch_id),
            position: Set(last.map(|p| p + 1).unwrap_or(0)),
            name: Set(entry.name),
            centroid_file: Set(entry.centroid_file),
            crossing_file: Set(entry.crossing_file),
            function_file: Set(entry.function_file),
            link_file: Set(entry.link_file),
            public_transit_file: Set(entry.public_transit_file),
            traveler_file: Set(entry.traveler_file),
            pricing_file: Set(entry.pricing_file),
            zip_file: Set(entry.zip_file),
            canceled: Set(false),
            failed: Set(false),
            error_message: Set(None),
            run_id: Set(None),
        }
        .insert(db)
        .await
    }

    pub async fn entries<C: ConnectionTrait>(
        db: &C,
        batch_id: i32,
    ) -> Result<Vec<batch_run::Model>, DbErr> {
        BatchRun::find()
            .filter(batch_run::Column::BatchId.eq(batch_id))
            .order_by_asc(batch_run::Column::Position)
            .order_by_asc(batch_run::Column::Id)
            .all(db)
            .await
    }

    pub async fn find_entry<C: ConnectionTrait>(
        db: &C,
        id: i32,
    ) -> Result<Option<batch_run::Model>, DbErr> {
        BatchRun::find_by_id(id).one(db).await
    }

    pub async fn mark_running<C: ConnectionTrait>(
        db: &C,
        id: i32,
        start_time: i64,
    ) -> Result<(), DbErr> {
        Batch::update_many()
            .col_expr(batch::Column::Status, Expr::value(BatchStatus::Running.as_str()))
            .col_expr(batch::Column::StartTime, Expr::value(Some(start_time)))
            .filter(batch::Column::Id.eq(id))
            .exec(db)
            .await?;
        Ok(())
    }

    pub async fn finish<C: ConnectionTrait>(
        db: &C,
        id: i32,
        end_time: i64,
        running_time: i64,
    ) -> Result<(), DbErr> {
        Batch::update_many()
            .col_expr(batch::Column::Status, Expr::value(BatchStatus::Finished.as_str()))
            .col_expr(batch::Column::EndTime, Expr::value(Some(end_time)))
            .col_expr(batch::Column::RunningTime, Expr::value(Some(running_time)))
            .filter(batch::Column::Id.eq(id))
            .exec(db)
            .await?;
        Ok(())
    }

    pub async fn set_canceled<C: ConnectionTrait>(
        db: &C,
        entry_id: i32,
        canceled: bool,
    ) -> Result<(), DbErr> {
        BatchRun::update_many()
            .col_expr(batch_run::Column::Canceled, Expr::value(canceled))
            .filter(batch_run::Column::Id.eq(entry_id))
            .exec(db)
            .await?;
        Ok(())
    }

    pub async fn mark_failed<C: ConnectionTrait>(
        db: &C,
        entry_id: i32,
        message: &str,
    ) -> Result<(), DbErr> {
        BatchRun::update_many()
            .col_expr(batch_run::Column::Failed, Expr::value(true))
            .col_expr(
                batch_run::Column::ErrorMessage,
                Expr::value(Some(message.to_string())),
            )
            .filter(batch_run::Column::Id.eq(entry_id))
            .exec(db)
            .await?;
        Ok(())
    }

    pub async fn link_run<C: ConnectionTrait>(
        db: &C,
        entry_id: i32,
        run_id: i32,
    ) -> Result<(), DbErr> {
        BatchRun::update_many()
            .col_expr(batch_run::Column::RunId, Expr::value(Some(run_id)))
            .filter(batch_run::Column::Id.eq(entry_id))
            .exec(db)
            .await?;
        Ok(())
    }
}

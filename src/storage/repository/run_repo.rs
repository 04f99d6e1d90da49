use crate::storage::entity::simulation_run::{self, Entity as SimulationRun, RunStatus};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, NotSet, QueryFilter,
    QueryOrder, Set,
};

pub struct RunRepository;

impl RunRepository {
    /// New runs start in `Preparing`.
    pub async fn create<C: ConnectionTrait>(
        db: &C,
        simulation_id: i32,
        name: &str,
    ) -> Result<simulation_run::Model, DbErr> {
        let now = Utc::now().timestamp();
        simulation_run::ActiveModel {
            id: NotSet,
            simulation_id: Set(simulation_id),
            name: Set(name.to_string()),
            status: Set(RunStatus::Preparing.as_str().to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
    }

    pub async fn find<C: ConnectionTrait>(
        db: &C,
        id: i32,
    ) -> Result<Option<simulation_run::Model>, DbErr> {
        SimulationRun::find_by_id(id).one(db).await
    }

    pub async fn list<C: ConnectionTrait>(
        db: &C,
        simulation_id: i32,
    ) -> Result<Vec<simulation_run::Model>, DbErr> {
        SimulationRun::find()
            .filter(simulation_run::Column::SimulationId.eq(simulation_id))
            .order_by_asc(simulation_run::Column::Id)
            .all(db)
            .await
    }

    /// The run of the simulation currently in Preparing, Running or Ending.
    pub async fn active<C: ConnectionTrait>(
        db: &C,
        simulation_id: i32,
    ) -> Result<Option<simulation_run::Model>, DbErr> {
        let active: Vec<&str> = RunStatus::ACTIVE.iter().map(|s| s.as_str()).collect();
        SimulationRun::find()
            .filter(simulation_run::Column::SimulationId.eq(simulation_id))
            .filter(simulation_run::Column::Status.is_in(active))
            .order_by_desc(simulation_run::Column::Id)
            .one(db)
            .await
    }

    pub async fn set_status<C: ConnectionTrait>(
        db: &C,
        id: i32,
        status: RunStatus,
    ) -> Result<(), DbErr> {
        SimulationRun::update_many()
            .col_expr(simulation_run::Column::Status, Expr::value(status.as_str()))
            .col_expr(
                simulation_run::Column::UpdatedAt,
                Expr::value(Utc::now().timestamp()),
            )
            .filter(simulation_run::Column::Id.eq(id))
            .exec(db)
            .await?;
        Ok(())
    }

    /// Moves the run from `from` to `to` only if it is still in `from`.
    /// Returns false when another writer changed the status first.
    pub async fn transition<C: ConnectionTrait>(
        db: &C,
        id: i32,
        from: RunStatus,
        to: RunStatus,
    ) -> Result<bool, DbErr> {
        let res = SimulationRun::update_many()
            .col_expr(simulation_run::Column::Status, Expr::value(to.as_str()))
            .col_expr(
                simulation_run::Column::UpdatedAt,
                Expr::value(Utc::now().timestamp()),
            )
            .filter(simulation_run::Column::Id.eq(id))
            .filter(simulation_run::Column::Status.eq(from.as_str()))
            .exec(db)
            .await?;
        Ok(res.rows_affected > 0)
    }
}

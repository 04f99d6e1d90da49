use crate::storage::entity::policy::{self, Entity as Policy};
use crate::storage::repository::rows_per_statement;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, NotSet, QueryFilter, QueryOrder, Set,
};

#[derive(Debug, Clone, PartialEq)]
pub struct NewPolicy {
    pub link_id: i32,
    pub user_type_id: Option<i32>,
    pub value: f64,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
}

pub struct PricingRepository;

impl PricingRepository {
    pub async fn list<C: ConnectionTrait>(
        db: &C,
        simulation_id: i32,
    ) -> Result<Vec<policy::Model>, DbErr> {
        Policy::find()
            .filter(policy::Column::SimulationId.eq(simulation_id))
            .order_by_asc(policy::Column::Id)
            .all(db)
            .await
    }

    /// Drops every toll of the simulation and stores `rows` instead.
    pub async fn replace<C: ConnectionTrait>(
        db: &C,
        simulation_id: i32,
        rows: Vec<NewPolicy>,
        chunk_size: usize,
    ) -> Result<usize, DbErr> {
        Policy::delete_many()
            .filter(policy::Column::SimulationId.eq(simulation_id))
            .exec(db)
            .await?;

        let total = rows.len();
        let per_stmt = rows_per_statement(chunk_size, 6);
        let mut it = rows.into_iter().peekable();
        while it.peek().is_some() {
            let chunk: Vec<policy::ActiveModel> = it
                .by_ref()
                .take(per_stmt)
                .map(|p| policy::ActiveModel {
                    id: NotSet,
                    simulation_id: Set(simulation_id),
                    link_id: Set(p.link_id),
                    user_type_id: Set(p.user_type_id),
                    value: Set(p.value),
                    start_time: Set(p.start_time),
                    end_time: Set(p.end_time),
                })
                .collect();
            Policy::insert_many(chunk).exec_without_returning(db).await?;
        }
        Ok(total)
    }
}

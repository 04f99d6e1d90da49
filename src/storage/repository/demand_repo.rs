use crate::storage::entity::demand_segment::{self, Entity as DemandSegment};
use crate::storage::entity::matrices::{self, Entity as Matrices};
use crate::storage::entity::simulation;
use crate::storage::entity::user_type::{self, Entity as UserType};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, NotSet, QueryFilter,
    QueryOrder, Set,
};

/// A demand segment together with its user type.
#[derive(Debug, Clone)]
pub struct SegmentWithType {
    pub segment: demand_segment::Model,
    pub user_type: user_type::Model,
}

pub struct DemandRepository;

impl DemandRepository {
    /// Creates a user type with default behaviour and an empty matrix, and
    /// attaches both to the demand as a new segment.
    pub async fn add_segment<C: ConnectionTrait>(
        db: &C,
        demand_id: i32,
        user_type_name: &str,
        scale: f64,
    ) -> Result<demand_segment::Model, DbErr> {
        let user_type = user_type::ActiveModel {
            id: NotSet,
            name: Set(user_type_name.to_string()),
            comment: Set(String::new()),
            alpha_ti: Set(15.0),
            alpha_tp: Set(15.0),
            beta: Set(5.0),
            delta: Set(0.0),
            gamma: Set(20.0),
            t_star: Set(480.0),
            departure_mu: Set(5.0),
            route_mu: Set(5.0),
            mode_mu: Set(5.0),
            penalty_tp: Set(0.0),
        }
        .insert(db)
        .await?;
        let matrix = matrices::ActiveModel {
            id: NotSet,
            total: Set(0.0),
        }
        .insert(db)
        .await?;
        demand_segment::ActiveModel {
            id: NotSet,
            demand_id: Set(demand_id),
            user_type_id: Set(user_type.id),
            matrices_id: Set(matrix.id),
            scale: Set(scale),
        }
        .insert(db)
        .await
    }

    pub async fn segments<C: ConnectionTrait>(
        db: &C,
        demand_id: i32,
    ) -> Result<Vec<SegmentWithType>, DbErr> {
        let rows = DemandSegment::find()
            .filter(demand_segment::Column::DemandId.eq(demand_id))
            .order_by_asc(demand_segment::Column::Id)
            .all(db)
            .await?;
        let type_ids: Vec<i32> = rows.iter().map(|s| s.user_type_id).collect();
        let types = UserType::find()
            .filter(user_type::Column::Id.is_in(type_ids))
            .all(db)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for segment in rows {
            let Some(user_type) = types.iter().find(|t| t.id == segment.user_type_id) else {
                return Err(DbErr::RecordNotFound(format!(
                    "user type {} of segment {}",
                    segment.user_type_id, segment.id
                )));
            };
            out.push(SegmentWithType {
                segment,
                user_type: user_type.clone(),
            });
        }
        Ok(out)
    }

    pub async fn segment_by_user_type<C: ConnectionTrait>(
        db: &C,
        demand_id: i32,
        user_type_name: &str,
    ) -> Result<Option<SegmentWithType>, DbErr> {
        Ok(Self::segments(db, demand_id)
            .await?
            .into_iter()
            .find(|s| s.user_type.name == user_type_name))
    }

    pub async fn find_segment<C: ConnectionTrait>(
        db: &C,
        id: i32,
    ) -> Result<Option<demand_segment::Model>, DbErr> {
        DemandSegment::find_by_id(id).one(db).await
    }

    /// Matrices of every segment of the simulation's demand, followed by the
    /// public-transit matrix when there is one.
    pub async fn simulation_matrices<C: ConnectionTrait>(
        db: &C,
        sim: &simulation::Model,
    ) -> Result<Vec<matrices::Model>, DbErr> {
        let mut ids: Vec<i32> = DemandSegment::find()
            .filter(demand_segment::Column::DemandId.eq(sim.demand_id))
            .order_by_asc(demand_segment::Column::Id)
            .all(db)
            .await?
            .into_iter()
            .map(|s| s.matrices_id)
            .collect();
        ids.extend(sim.pttimes_id);
        let mut found = Matrices::find()
            .filter(matrices::Column::Id.is_in(ids.clone()))
            .all(db)
            .await?;
        found.sort_by_key(|m| ids.iter().position(|id| *id == m.id));
        Ok(found)
    }

    /// Sum of the (already scaled) totals of the demand's matrices.
    pub async fn total_travelers<C: ConnectionTrait>(db: &C, demand_id: i32) -> Result<f64, DbErr> {
        let matrix_ids: Vec<i32> = DemandSegment::find()
            .filter(demand_segment::Column::DemandId.eq(demand_id))
            .all(db)
            .await?
            .into_iter()
            .map(|s| s.matrices_id)
            .collect();
        let totals = Matrices::find()
            .filter(matrices::Column::Id.is_in(matrix_ids))
            .all(db)
            .await?;
        Ok(totals.iter().map(|m| m.total).sum())
    }
}

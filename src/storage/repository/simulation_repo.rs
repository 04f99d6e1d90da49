use crate::storage::entity::{
    demand, demand_segment, function, function_set, function_set_function, link, matrices,
    network, network_link, network_node, node, od_pair, policy, simulation, simulation_run,
    user_type,
};
use crate::storage::entity::simulation::{ActiveModel as SimulationActiveModel, Entity as Simulation};
use chrono::Utc;
use log::info;
use sea_orm::sea_query::{Expr, Query};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, NotSet, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};

/// Mutable run parameters of a simulation (times in minutes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationParameters {
    pub start_time: i32,
    pub last_record: i32,
    pub records_interval: i32,
    pub iterations: i32,
    pub stac_check: f64,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            start_time: 360,
            last_record: 720,
            records_interval: 15,
            iterations: 50,
            stac_check: 0.0,
        }
    }
}

pub struct SimulationRepository;

impl SimulationRepository {
    /// Creates a simulation with an empty network, function set and demand,
    /// plus its (empty) public-transit travel-time matrix.
    pub async fn create<C: ConnectionTrait>(
        db: &C,
        name: &str,
    ) -> Result<simulation::Model, DbErr> {
        let now = Utc::now().timestamp();
        let network = network::ActiveModel {
            id: NotSet,
            name: Set(format!("{} network", name)),
        }
        .insert(db)
        .await?;
        let function_set = function_set::ActiveModel {
            id: NotSet,
            name: Set(format!("{} functions", name)),
        }
        .insert(db)
        .await?;
        let demand = demand::ActiveModel {
            id: NotSet,
            name: Set(format!("{} demand", name)),
        }
        .insert(db)
        .await?;
        let pttimes = matrices::ActiveModel {
            id: NotSet,
            total: Set(0.0),
        }
        .insert(db)
        .await?;

        let params = SimulationParameters::default();
        SimulationActiveModel {
            name: Set(name.to_string()),
            network_id: Set(network.id),
            function_set_id: Set(function_set.id),
            demand_id: Set(demand.id),
            pttimes_id: Set(Some(pttimes.id)),
            has_changed: Set(true),
            start_time: Set(params.start_time),
            last_record: Set(params.last_record),
            records_interval: Set(params.records_interval),
            iterations: Set(params.iterations),
            stac_check: Set(params.stac_check),
            output_users_times: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await
    }

    pub async fn find<C: ConnectionTrait>(
        db: &C,
        id: i32,
    ) -> Result<Option<simulation::Model>, DbErr> {
        Simulation::find_by_id(id).one(db).await
    }

    pub async fn set_has_changed<C: ConnectionTrait>(
        db: &C,
        id: i32,
        changed: bool,
    ) -> Result<(), DbErr> {
        Simulation::update_many()
            .col_expr(simulation::Column::HasChanged, Expr::value(changed))
            .col_expr(simulation::Column::UpdatedAt, Expr::value(Utc::now().timestamp()))
            .filter(simulation::Column::Id.eq(id))
            .exec(db)
            .await?;
        Ok(())
    }

    pub async fn set_output_users_times<C: ConnectionTrait>(
        db: &C,
        id: i32,
        enabled: bool,
    ) -> Result<(), DbErr> {
        Simulation::update_many()
            .col_expr(simulation::Column::OutputUsersTimes, Expr::value(enabled))
            .filter(simulation::Column::Id.eq(id))
            .exec(db)
            .await?;
        Ok(())
    }

    pub async fn update_parameters<C: ConnectionTrait>(
        db: &C,
        id: i32,
        params: &SimulationParameters,
    ) -> Result<(), DbErr> {
        Simulation::update_many()
            .col_expr(simulation::Column::StartTime, Expr::value(params.start_time))
            .col_expr(simulation::Column::LastRecord, Expr::value(params.last_record))
            .col_expr(
                simulation::Column::RecordsInterval,
                Expr::value(params.records_interval),
            )
            .col_expr(simulation::Column::Iterations, Expr::value(params.iterations))
            .col_expr(simulation::Column::StacCheck, Expr::value(params.stac_check))
            .col_expr(simulation::Column::HasChanged, Expr::value(true))
            .col_expr(simulation::Column::UpdatedAt, Expr::value(Utc::now().timestamp()))
            .filter(simulation::Column::Id.eq(id))
            .exec(db)
            .await?;
        Ok(())
    }

    /// Deletes a simulation and everything it owns, in a fixed order: runs,
    /// tolls, links, nodes, functions, demand (cells, segments, user types,
    /// matrices), containers, and finally the simulation row.
    pub async fn delete<C: ConnectionTrait>(db: &C, id: i32) -> Result<bool, DbErr> {
        let Some(sim) = Simulation::find_by_id(id).one(db).await? else {
            return Ok(false);
        };

        simulation_run::Entity::delete_many()
            .filter(simulation_run::Column::SimulationId.eq(sim.id))
            .exec(db)
            .await?;
        policy::Entity::delete_many()
            .filter(policy::Column::SimulationId.eq(sim.id))
            .exec(db)
            .await?;

        let link_members = Query::select()
            .column(network_link::Column::LinkId)
            .from(network_link::Entity)
            .and_where(network_link::Column::NetworkId.eq(sim.network_id))
            .to_owned();
        link::Entity::delete_many()
            .filter(link::Column::Id.in_subquery(link_members))
            .exec(db)
            .await?;
        network_link::Entity::delete_many()
            .filter(network_link::Column::NetworkId.eq(sim.network_id))
            .exec(db)
            .await?;

        let node_members = Query::select()
            .column(network_node::Column::NodeId)
            .from(network_node::Entity)
            .and_where(network_node::Column::NetworkId.eq(sim.network_id))
            .to_owned();
        node::Entity::delete_many()
            .filter(node::Column::Id.in_subquery(node_members))
            .exec(db)
            .await?;
        network_node::Entity::delete_many()
            .filter(network_node::Column::NetworkId.eq(sim.network_id))
            .exec(db)
            .await?;

        let function_members = Query::select()
            .column(function_set_function::Column::FunctionId)
            .from(function_set_function::Entity)
            .and_where(function_set_function::Column::FunctionSetId.eq(sim.function_set_id))
            .to_owned();
        function::Entity::delete_many()
            .filter(function::Column::Id.in_subquery(function_members))
            .exec(db)
            .await?;
        function_set_function::Entity::delete_many()
            .filter(function_set_function::Column::FunctionSetId.eq(sim.function_set_id))
            .exec(db)
            .await?;

        let segments = demand_segment::Entity::find()
            .filter(demand_segment::Column::DemandId.eq(sim.demand_id))
            .all(db)
            .await?;
        let mut matrix_ids: Vec<i32> = segments.iter().map(|s| s.matrices_id).collect();
        matrix_ids.extend(sim.pttimes_id);
        let user_type_ids: Vec<i32> = segments.iter().map(|s| s.user_type_id).collect();

        od_pair::Entity::delete_many()
            .filter(od_pair::Column::MatricesId.is_in(matrix_ids.clone()))
            .exec(db)
            .await?;
        demand_segment::Entity::delete_many()
            .filter(demand_segment::Column::DemandId.eq(sim.demand_id))
            .exec(db)
            .await?;
        user_type::Entity::delete_many()
            .filter(user_type::Column::Id.is_in(user_type_ids))
            .exec(db)
            .await?;
        matrices::Entity::delete_many()
            .filter(matrices::Column::Id.is_in(matrix_ids))
            .exec(db)
            .await?;

        Simulation::delete_by_id(sim.id).exec(db).await?;
        demand::Entity::delete_by_id(sim.demand_id).exec(db).await?;
        function_set::Entity::delete_by_id(sim.function_set_id)
            .exec(db)
            .await?;
        network::Entity::delete_by_id(sim.network_id).exec(db).await?;

        info!("deleted simulation {}", sim.id);
        Ok(true)
    }
}

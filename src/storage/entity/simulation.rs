use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "simulations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub name: String,
    pub network_id: i32,
    pub function_set_id: i32,
    pub demand_id: i32,
    pub pttimes_id: Option<i32>, // public-transit travel-time matrix
    pub has_changed: bool,
    pub start_time: i32,
    pub last_record: i32,
    pub records_interval: i32,
    pub iterations: i32,
    pub stac_check: f64,
    pub output_users_times: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

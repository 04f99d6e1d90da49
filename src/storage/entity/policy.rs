use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Road toll on one link, optionally restricted to a user type and a time window.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "policies")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub simulation_id: i32,
    pub link_id: i32,
    pub user_type_id: Option<i32>,
    pub value: f64,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

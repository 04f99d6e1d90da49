use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "links")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i64,
    pub name: String,
    pub origin: i32,      // nodes.id
    pub destination: i32, // nodes.id
    pub vdf_id: i32,      // functions.id
    pub lanes: f64,
    pub length: f64,
    pub speed: f64,
    pub capacity: f64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

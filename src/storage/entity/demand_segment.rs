use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "demand_segments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub demand_id: i32,
    pub user_type_id: i32,
    pub matrices_id: i32,
    pub scale: f64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

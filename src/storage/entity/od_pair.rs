use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One (origin, destination, value) cell of a matrix; `p` and `q` are
/// internal centroid ids.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "od_pairs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub matrices_id: i32,
    pub p: i32,
    pub q: i32,
    pub r: f64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::matrices::Entity",
        from = "Column::MatricesId",
        to = "super::matrices::Column::Id"
    )]
    Matrices,
}

impl Related<super::matrices::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Matrices.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

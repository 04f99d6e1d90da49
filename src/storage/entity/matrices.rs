use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Logical OD matrix. `total` is the scaled sum of its `od_pairs` and must be
/// refreshed by every operation that writes them.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "matrices")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub total: f64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::od_pair::Entity")]
    OdPair,
}

impl Related<super::od_pair::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OdPair.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

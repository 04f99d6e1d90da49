use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One queued entry of a batch. File columns hold file-store keys of the
/// uploads to import before the run; archives are directory keys.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "batch_runs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub batch_id: i32,
    pub position: i32,
    pub name: String,
    pub centroid_file: Option<String>,
    pub crossing_file: Option<String>,
    pub function_file: Option<String>,
    pub link_file: Option<String>,
    pub public_transit_file: Option<String>,
    pub traveler_file: Option<String>,
    pub pricing_file: Option<String>,
    pub zip_file: Option<String>,
    pub canceled: bool,
    pub failed: bool,
    pub error_message: Option<String>,
    pub run_id: Option<i32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::batch::Entity",
        from = "Column::BatchId",
        to = "super::batch::Column::Id"
    )]
    Batch,
}

impl Related<super::batch::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Batch.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

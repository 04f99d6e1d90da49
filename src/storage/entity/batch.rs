use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "batches")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub simulation_id: i32,
    pub name: String,
    pub status: String, // Pending/Running/Finished
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
    pub running_time: Option<i64>, // seconds
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::batch_run::Entity")]
    BatchRun,
}

impl Related<super::batch_run::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BatchRun.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchStatus {
    Pending,
    Running,
    Finished,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Pending => "Pending",
            BatchStatus::Running => "Running",
            BatchStatus::Finished => "Finished",
        }
    }
}

impl std::str::FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(BatchStatus::Pending),
            "Running" => Ok(BatchStatus::Running),
            "Finished" => Ok(BatchStatus::Finished),
            other => Err(format!("unknown batch status: {}", other)),
        }
    }
}

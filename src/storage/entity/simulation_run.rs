use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "simulation_runs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub simulation_id: i32,
    pub name: String,
    pub status: String, // Preparing/Running/Ending/Finished/Aborted
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunStatus {
    Preparing,
    Running,
    Ending,
    Finished,
    Aborted,
}

impl RunStatus {
    pub const ACTIVE: [RunStatus; 3] = [RunStatus::Preparing, RunStatus::Running, RunStatus::Ending];

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Preparing => "Preparing",
            RunStatus::Running => "Running",
            RunStatus::Ending => "Ending",
            RunStatus::Finished => "Finished",
            RunStatus::Aborted => "Aborted",
        }
    }

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Preparing" => Ok(RunStatus::Preparing),
            "Running" => Ok(RunStatus::Running),
            "Ending" => Ok(RunStatus::Ending),
            "Finished" => Ok(RunStatus::Finished),
            "Aborted" => Ok(RunStatus::Aborted),
            other => Err(format!("unknown run status: {}", other)),
        }
    }
}

impl Model {
    /// Unknown strings read back as `Preparing`, the state runs are created in.
    pub fn run_status(&self) -> RunStatus {
        self.status.parse().unwrap_or(RunStatus::Preparing)
    }
}

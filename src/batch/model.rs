use sea_orm::DbErr;
use serde::Serialize;

#[derive(thiserror::Error, Debug)]
pub enum BatchError {
    #[error("batch {0} does not exist")]
    NotFound(i32),
    #[error("simulation {0} of the batch does not exist")]
    SimulationNotFound(i32),
    #[error("database error: {0}")]
    Db(#[from] DbErr),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EntryOutcome {
    Executed { run_id: i32 },
    Canceled,
    /// An import failed; the entry was not executed.
    ImportFailed,
    /// The run was created but a stage of its chain failed.
    RunFailed { run_id: i32 },
    /// Stopped by a user while the engine ran.
    Aborted { run_id: i32 },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub batch_id: i32,
    /// Entry id and outcome, in queue order.
    pub entries: Vec<(i32, EntryOutcome)>,
    pub running_time: i64,
}

impl BatchReport {
    pub fn executed(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, o)| matches!(o, EntryOutcome::Executed { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, o)| {
                matches!(o, EntryOutcome::ImportFailed | EntryOutcome::RunFailed { .. })
            })
            .count()
    }
}

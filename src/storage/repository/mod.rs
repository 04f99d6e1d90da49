pub mod batch_repo;
pub mod demand_repo;
pub mod matrix_repo;
pub mod network_repo;
pub mod pricing_repo;
pub mod run_repo;
pub mod simulation_repo;

pub use batch_repo::{BatchRepository, NewBatchEntry};
pub use demand_repo::{DemandRepository, SegmentWithType};
pub use matrix_repo::MatrixRepository;
pub use network_repo::{NetworkRepository, NewLink, NewNode};
pub use pricing_repo::{NewPolicy, PricingRepository};
pub use run_repo::RunRepository;
pub use simulation_repo::{SimulationParameters, SimulationRepository};

/// SQLite caps bound parameters per statement (32766 for the bundled build).
const MAX_BIND_PARAMS: usize = 32_000;

/// Rows per statement: the configured chunk, shrunk so that
/// `rows * columns` stays under the bind-parameter cap.
pub(crate) fn rows_per_statement(chunk_size: usize, columns: usize) -> usize {
    chunk_size.min(MAX_BIND_PARAMS / columns.max(1)).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_respects_bind_cap() {
        assert_eq!(rows_per_statement(10_000, 2), 10_000);
        assert_eq!(rows_per_statement(20_000, 4), 8_000);
        assert_eq!(rows_per_statement(0, 3), 1);
    }
}

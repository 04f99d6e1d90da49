pub mod batch;
pub mod batch_run;
pub mod demand;
pub mod demand_segment;
pub mod function;
pub mod function_set;
pub mod function_set_function;
pub mod link;
pub mod matrices;
pub mod network;
pub mod network_link;
pub mod network_node;
pub mod node;
pub mod od_pair;
pub mod policy;
pub mod simulation;
pub mod simulation_run;
pub mod user_type;

pub use batch::{BatchStatus, Entity as Batch};
pub use batch_run::Entity as BatchRun;
pub use demand_segment::Entity as DemandSegment;
pub use function::Entity as Function;
pub use link::Entity as Link;
pub use matrices::Entity as Matrices;
pub use node::{Entity as Node, NodeKind};
pub use od_pair::Entity as OdPair;
pub use simulation::Entity as Simulation;
pub use simulation_run::{Entity as SimulationRun, RunStatus};

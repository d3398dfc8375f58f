pub mod executor;
pub mod graphs;
pub mod ports;
pub mod runtime;
pub mod workers;

pub use executor::{ExecutorContext, GraphExecutor};
pub use graphs::GraphRegistry;
pub use ports::RuntimePorts;
pub use runtime::Runtime;
pub use workers::{PendingExecution, PendingStore, WorkerPool};

pub mod app;

pub use app::error::AppError;
pub use app::models::{WorkflowKind, WorkflowOutcome, WorkflowPayload, WorkflowResult};
pub use app::operation_lock::OperationLock;
pub use app::orchestrator::{Collaborators, Orchestrator, WorkflowSettings};

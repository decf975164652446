pub mod workflow;
pub mod visit;
pub mod queue;

pub use workflow::{VisitWorkflow, TransitionOutcome};
pub use visit::VisitService;
pub use queue::build_queue;

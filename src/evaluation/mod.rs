//! Evaluation sessions: what to pull, with which ambient values, and how
//! progress and cancellation flow back

pub mod context;
pub mod document;
pub mod evaluator;
pub mod reporter;

pub use context::{EvaluationContext, Rectangle, TimeSettings};
pub use document::{Document, EditingContext, EvaluationTarget};
pub use evaluator::{EvaluationReport, Evaluator};
pub use reporter::{LogReporter, NullReporter, ProgressTracker, Reporter};

//! Graph-wide analyses: ordering, pruning and static checks.
pub mod topology;
pub mod validation;

pub use validation::{Diagnostic, DiagnosticKind, Validator};

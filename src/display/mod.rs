//! Human-readable renderings of a computed graph.
pub mod trace;

pub use trace::format_trace;

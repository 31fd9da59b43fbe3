//! The fixed four-method rewrite protocol and its data model.

mod rewrite;
mod types;

pub use rewrite::{derive_gated, RewriteProtocol, CALLS_PER_EXAMPLE};
pub use types::{
    ClarificationDecision, Example, ExampleId, Method, MethodOutput, Record, UsageSummary,
};

//! # Erpeto Analyser
//!
//! Finds where the dynamic values of a recorded session come from.
//!
//! - [`classifier`] decides whether a value looks like an opaque token.
//! - [`context`] builds patterns that pull a value back out of a body.
//! - [`discovery`] searches earlier actions and attaches
//!   [`Target`](erpeto_core::Target)s to the requests that reuse them.

pub mod classifier;
pub mod context;
pub mod discovery;

pub use classifier::is_likely_random;
pub use context::{ContextError, ContextSynthesizer};
pub use discovery::{AnalysisReport, Analyser};

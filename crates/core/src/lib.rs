//! # Erpeto Core
//!
//! Domain types shared by the recorder, the analyser and the CLI: the
//! actions a session is rebuilt from, the sources and targets that bind
//! dynamic values between them, and the error definitions.
//!
//! Nothing in here talks to a browser or touches the filesystem.

pub mod action;
pub mod error;
pub mod history;
pub mod http;
pub mod json_path;
pub mod source;
pub mod target;

// Re-export key types at crate root for ergonomics
pub use action::{Action, InputAction, RequestAction, ResponseAction};
pub use error::{BrowserError, DecodeError, Error, ReassemblyError, ResolveError, Result};
pub use history::ActionHistory;
pub use http::{Cookie, Headers};
pub use json_path::{JsonField, PathSegment};
pub use source::DataSource;
pub use target::{JsonFieldTarget, QueryPart, Target};

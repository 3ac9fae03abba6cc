//! Structural-fingerprint test selection.
//!
//! Decides which tests a code change affects by diffing per-block
//! checksums against a stored baseline, rather than re-running everything.

pub mod block;
pub mod cache;
pub mod config;
pub mod coordinator;
pub mod detect;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod merge;
pub mod path;
pub mod remote;
pub mod resolve;
pub mod store;

pub use block::{parse_module, Block, BlockParser, SynBlockParser};
pub use detect::ChangeSet;
pub use engine::Engine;
pub use error::{EngineError, Result, Warning};
pub use fingerprint::{BlockChecksum, Fingerprint};
pub use store::Store;

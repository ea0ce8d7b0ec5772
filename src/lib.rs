//! Library crate for vdp-recon-rs: a queue-driven recon pipeline that chains
//! external discovery, probing and crawling tools into structured results.
pub mod analysis;
pub mod artifacts;
pub mod config;
pub mod control;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod queue;
pub mod report;
pub mod runner;
pub mod scope;
pub mod server;
pub mod transform;
pub mod types;

pub use error::{AgentError, Result};

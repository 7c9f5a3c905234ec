//! The tiered memory subsystem (§3, §4.9–§4.11).

pub mod context;
pub mod significance;
pub mod store;
pub mod summarization;
pub mod types;

//! complexity-quiz: a terminal quiz on computational complexity classes.
//!
//! Questions come from a language model, fronted by a tiered cache so the
//! player rarely waits:
//!   memory (per-key FIFO) → persistent store (JSON / gzip / zstd) → live generation
//!
//! Background workers keep each pool topped up ahead of demand.

pub mod cache;
pub mod config;
pub mod generation;
pub mod metrics;
pub mod quiz;

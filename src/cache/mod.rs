//! Tiered question cache.
//!
//! - [`item`]: Item, Key, Category and answer resolution
//! - [`memory`]: bounded per-key FIFO queues in RAM
//! - [`persistent`]: bounded per-key queues backed by one store file
//! - [`codec`]: store encoding (JSON, gzip, zstd)
//! - [`prefetcher`]: background replenishment worker pool
//! - [`facade`]: `QuestionCache`, the single lookup entry point

pub mod codec;
pub mod facade;
pub mod item;
mod lock;
pub mod memory;
pub mod persistent;
pub mod prefetcher;

pub use facade::{QuestionCache, TierHit};
pub use item::{Category, Item, Key};

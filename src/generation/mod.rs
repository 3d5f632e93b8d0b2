//! Question generation.
//!
//! - [`client`]: the `GenerationClient` trait the cache consumes
//! - [`anthropic`]: Messages API implementation
//! - [`prompt`]: prompt templates per category and difficulty
//! - [`response`]: cleaning and validating model output

pub mod anthropic;
pub mod client;
pub mod prompt;
pub mod response;

pub use client::{generate_within, GenerationClient, GenerationError};

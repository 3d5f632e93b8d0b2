//! Interactive terminal quiz on top of the question cache.

pub mod input;
pub mod session;

pub use input::{Input, InputReader};
pub use session::{Score, Session};

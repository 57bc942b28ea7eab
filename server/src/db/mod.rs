//! Document persistence: PostgreSQL, or process memory when no database is configured.

mod documents;
mod memory;
mod pool;

pub use documents::*;
pub use memory::*;
pub use pool::*;

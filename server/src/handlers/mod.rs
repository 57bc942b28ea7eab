//! Request handlers for document reads and writes.

mod documents;

pub use documents::*;

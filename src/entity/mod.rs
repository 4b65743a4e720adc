//! Entity Module
//!
//! Metadata entities (tags, domains, glossary, data products, contracts,
//! assertions, tests, structured properties) and the local store that owns
//! them.

mod models;
mod pg;
mod store;
mod urn;

pub use models::*;
pub use pg::PgEntityStore;
pub use store::{EntityStore, MemoryEntityStore};
pub use urn::Urn;

//! Operation Pipeline Module
//!
//! Routes logical operations (create, update, delete, relate) either to the
//! remote catalog as direct mutations or into the change-proposal buffer,
//! immediately or through the batch queue.

mod deferred;
mod direct;
mod result;
mod router;
mod types;

pub use result::{BatchOperationResult, BatchSummary, OperationResult};
pub use router::{OperationRouter, RouterConfig};
pub use types::*;

//! Proposal module - deferred, reviewable changes
//!
//! Builds change-proposal records and buffers them until they are staged
//! to a file or handed to a direct-emission collaborator.

mod builder;
mod emitter;

pub use builder::*;
pub use emitter::{OutputFormat, ProposalEmitter};

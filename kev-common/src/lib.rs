// kev-common - Shared types for the keyspace event monitor
//
// This crate defines the endpoint descriptor, the decoded key event and the
// inline-command argument rules shared by the client and the host binary.

pub mod endpoint;
pub mod event;
pub mod inline;

// Re-export for convenience
pub use endpoint::*;
pub use event::*;
pub use inline::*;

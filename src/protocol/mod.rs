//! Dispatch wire protocol
//!
//! Message types, the versioned schema table, the binary codec and typed
//! payload views shared by the agent and by any dispatch server built on
//! this crate.

pub mod codec;
pub mod messages;
pub mod payloads;
pub mod schema;

pub use codec::*;
pub use messages::*;
pub use payloads::*;
pub use schema::*;

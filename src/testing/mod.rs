//! Testing utilities and mock implementations
//!
//! Mocks for the agent's collaborators plus an in-process dispatch server,
//! so the agent can be tested without a real server or real time.

pub mod dispatch_server;
pub mod mocks;

pub use dispatch_server::*;
pub use mocks::*;

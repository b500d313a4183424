//! The field agent: dispatch client, navigation and lifecycle state machine
//!
//! Collaborators that touch the outside world (transport, sleeping, the
//! shutdown flag) are passed in, so the whole machine runs under test with
//! mocks and no real time.

pub mod client;
pub mod identity;
pub mod lifecycle;
pub mod navigation;
pub mod shutdown;
pub mod state;
pub mod timing;

pub use client::*;
pub use identity::*;
pub use lifecycle::*;
pub use navigation::*;
pub use shutdown::*;
pub use state::*;
pub use timing::*;

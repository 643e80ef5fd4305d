//! Services layer for the memory bridge
//!
//! External collaborators reached over the network.

pub mod search;

pub use search::{HttpSearchBackend, SearchBackend};

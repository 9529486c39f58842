//! Utilities for testing code built on the protocol engine: collaborator doubles that record what
//!  the engine does, and an in-memory link that injects faults. They are used for testing the
//!  engine itself, but they are also exported for application testing, which is why they are part
//!  of the crate's regular (non-#[cfg(test)]) code.

pub mod lossy_link;
pub mod tracking;

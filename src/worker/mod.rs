// src/worker/mod.rs

//! Isolated build execution.
//!
//! Each build runs on a dedicated worker thread so a slow or panicking
//! transform can't stall or kill the controller. The [`WorkerPool`] keeps
//! an idle standby next to the active worker for fast hot-swaps.

pub mod backend;
pub mod pool;
pub mod protocol;
pub mod slot;

pub use backend::BuildBackend;
pub use pool::WorkerPool;
pub use protocol::{SlotId, WorkerCommand, WorkerExit, WorkerMessage, WorkerMessageKind};
pub use slot::{SlotState, WorkerSlot};

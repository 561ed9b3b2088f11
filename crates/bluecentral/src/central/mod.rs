//! The central role
//!
//! Device slots move through `Init`, `Scanning`, `Connecting`, `Connected`,
//! `Discovering`, `Configured` and `Disconnecting`. Only one slot at a time
//! may be scanning, connecting or discovering; a configured device frees
//! the pipeline for the next one.

mod events;
mod manager;
mod observer;
mod state;


pub use self::events::{CentralEvent, PairingResult};
pub use self::manager::Central;
pub use self::observer::CentralObserver;
pub use self::state::{
    ConnectionState, DeviceRecord, DeviceTimers, ProcedureQueue, QueuedProcedure, TimerKind,
};

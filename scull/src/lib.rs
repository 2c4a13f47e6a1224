pub mod access;
pub mod caller;
pub mod config;
pub mod control;
pub mod devices;
pub mod error;
pub mod idgen;
pub mod interrupt;
pub mod io;
pub mod notification_queue;
pub mod pipe;
pub mod store;
mod sync;


// Re-export error types for convenience
pub use error::{Result, ScullError};

// Re-export caller types for convenience
pub use caller::{Caller, TtyKey, Uid};
pub use interrupt::Interrupt;

// Re-export I/O types for convenience
pub use io::{AccessMode, Fault, OpenFlags, UserBuf, UserBufMut};

// Re-export the devices
pub use store::{Geometry, Store, StoreDump, StoreFile};
pub use pipe::{Pipe, PipeFile, PipeStatus, Readiness};
pub use notification_queue::{NotificationQueue, PipeEvent};

// Re-export access policies and the registry
pub use access::{AccessPolicy, PrivateClone, SingleOpen, SingleUser, WaitingUser};
pub use config::ScullConfig;
pub use control::Command;
pub use devices::Devices;
pub use idgen::{Handle, IdGen};

//! I/O plumbing shared by the devices
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  Access policies / Devices          │
//! │  - pick a Store, gate entry         │
//! └─────────────────────────────────────┘
//!          │ open(flags, caller)
//!          ▼
//! ┌──────────────────┐   ┌──────────────────┐
//! │  StoreFile       │   │  PipeFile        │
//! │  - position      │   │  - read/write end│
//! │  - seek          │   │  - nonblocking   │
//! └──────────────────┘   └──────────────────┘
//!          │                      │
//!          ▼                      ▼
//! ┌──────────────────┐   ┌──────────────────┐
//! │  Store           │   │  Pipe            │
//! │  - quantum chain │   │  - ring buffer   │
//! └──────────────────┘   └──────────────────┘
//!          ▲                      ▲
//!          └──── UserBuf / UserBufMut ───┘
//!               (copy across the caller boundary)
//! ```

pub mod types;
pub mod user;

pub use types::{AccessMode, OpenFlags};
pub use user::{Fault, UserBuf, UserBufMut};

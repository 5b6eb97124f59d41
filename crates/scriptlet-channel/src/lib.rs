//! File-backed data channel for scriptlet runs.
//!
//! A run reads its inputs from a channel directory written by the host,
//! lets a script operate on them through a [`ChannelBridge`], and writes
//! its effects back to the same directory.
//!
//! # Data flow
//!
//! ```text
//! channel dir ──► SnapshotLoader ──► ChannelSnapshot (immutable)
//!                                          │
//!                                          ▼
//!                                    ChannelBridge ◄──► script
//!                                          │
//!                                          ▼
//!                                  OutputAccumulator
//!                                          │
//!                                          ▼
//! channel dir ◄── OutputSerializer::finalize
//! ```
//!
//! One snapshot/accumulator pair exists per run; nothing is shared
//! between runs.

mod accumulator;
mod bridge;
mod error;
mod layout;
mod serializer;
mod snapshot;
pub mod value;

pub use accumulator::OutputAccumulator;
pub use bridge::ChannelBridge;
pub use error::{ChannelError, FinalizeError, SnapshotError};
pub use layout::{ChannelFiles, ChannelLayout};
pub use serializer::OutputSerializer;
pub use snapshot::{ChannelSnapshot, SnapshotLoader, UNKNOWN_RUN_NUMBER};
pub use value::Value;

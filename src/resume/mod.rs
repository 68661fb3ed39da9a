//! Crash-recovery checkpoints for the batch writer
//!
//! A checkpoint records how many rows of the in-memory batch currently being
//! written have been durably appended to an output file. It exists only while
//! a write is incomplete; its absence means the output file is consistent.

pub mod checkpoint;

pub use checkpoint::{checkpoint_path_for, Checkpoint, ResumeError, ResumeResult};

//! Command tests for stackvault
//!
//! These tests drive the backup and restore pipelines end to end against the
//! mock runner and the mock snapshot store.

mod backup;
mod restore;

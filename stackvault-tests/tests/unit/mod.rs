//! Unit tests for stackvault building blocks

mod registry;
mod restic;
mod staging;

//! Integration tests for stackvault
//!
//! `local_volume` runs real `tar` against a temp directory. The Docker-backed
//! suites are ignored by default.
//! Run them with: `cargo test -p stackvault-tests --test integration -- --ignored`

mod common;
mod local_volume;
mod postgres;
mod redis;

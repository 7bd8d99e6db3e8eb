pub mod cancel;
pub mod command;
pub mod locker;
pub mod restic;
pub mod staging;

// Trait-based abstractions for testability
pub mod executor;
pub mod restic_ops;

// Re-export commonly used types and traits (used by test crate)
pub use cancel::CancelFlag;
pub use executor::{CommandRunner, RealRunner};
pub use restic::ResticStore;
pub use restic_ops::SnapshotStore;

pub mod compare;
pub mod service;

pub use compare::{compare_versions, ChangeKind, FieldDiff, VersionDiff};
pub use service::{ServiceLifecycle, TestOutcome, TestTarget};

//! Per-root classpath management.
//!
//! The [`ClasspathManager`] reads each root's build configuration, resolves it into
//! [`ClasspathEntry`] values and tracks a strictly increasing generation per root that advances
//! only when the resolved set actually changed.

mod entry;
mod manager;

pub use entry::ClasspathEntry;
pub use manager::{ClasspathManager, ClasspathSnapshot};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClasspathError {
    #[error("workspace root {0} is not registered")]
    NotRegistered(PathBuf),
    #[error("classpath manager is closed")]
    Closed,
    #[error(transparent)]
    Project(#[from] kite_project::ProjectError),
}

//! Virtual file system layer for Kite.
//!
//! - [`DocumentUri`] names either a plain file or an entry inside a dependency archive.
//! - [`ContentResolver`] turns a URI into text, extracting archive entries into a
//!   [`TemporaryDirectory`] that lives for the whole server lifetime.
//! - [`SourceRegistry`] is the authoritative set of known source files with their
//!   content buffers and version counters.

mod document;
mod registry;
mod resolver;
mod temp;
mod uri;

pub use document::{apply_content_changes, ContentChange, DocumentError};
pub use registry::{
    CloseOutcome, Origin, RegistryError, SourceDiscovery, SourceFileRecord, SourceRegistry,
};
pub use resolver::{ContentResolver, ResolveError, ResolvedContent};
pub use temp::TemporaryDirectory;
pub use uri::{ArchivePath, DocumentUri, UriError};

//! Operations shared by the CLI and library callers.
//!
//! Each takes its collaborators explicitly so callers decide which
//! database, version control and artifact store back a request.

pub mod aggregate;
pub mod closest;
pub mod diff_stat;
pub mod indexes;
pub mod repos;
pub mod translate;
pub mod uploads;

#[cfg(test)]
pub(crate) mod testing;

pub use aggregate::Aggregator;
pub use closest::find_closest_dumps;
pub use diff_stat::compute_diff_stat;
pub use indexes::{create_index, delete_index, get_index, list_indexes, mark_index};
pub use repos::{add_repository, resolve_commit};
pub use translate::{FileTranslation, LineMap, RequestCache};
pub use uploads::{create_upload, delete_upload, get_upload, head_tip, list_uploads, mark_upload};

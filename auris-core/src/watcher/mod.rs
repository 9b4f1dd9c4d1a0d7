//! Input-directory watcher: filesystem notifications plus a periodic
//! rescan, an archive predicate with magic-byte fallback, and a
//! lightweight stability prefilter before submission.

mod predicate;
mod watcher;

pub use predicate::is_archive_candidate;
pub use watcher::InputWatcher;

//! Scheduled cleanup sweepers: the password vault and the archived-source
//! pool each get a cron-driven sweep with dry-run preview and an audit
//! log.

mod archives;
mod passwords;
mod schedule;

pub use archives::{ArchiveSweepOutcome, ArchiveSweeper};
pub use passwords::{PasswordSweepOutcome, PasswordSweeper};
pub use schedule::parse_crontab;

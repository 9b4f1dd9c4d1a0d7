//! Archive extraction state machine.
//!
//! Per archive: wait for the file to stabilise, repair a wrong extension,
//! detect and wait for a multi-volume set, read the listing under a
//! candidate password, extract under the candidate waterfall, verify the
//! output against the listing, then recurse into nested archives.

mod extractor;
mod passwords;
mod repair;
mod stability;
mod volume;

pub use extractor::Extractor;
pub(crate) use extractor::output_stem;
pub use passwords::{gather_candidates, nested_candidates};
pub use repair::repair_extension;
pub use stability::{is_stable_quick, wait_stable};
pub use volume::{VolumeSet, detect_volume_set, is_non_first_volume, wait_for_complete_set};

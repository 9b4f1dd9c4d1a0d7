//! Thin driver over an external 7z-compatible CLI.
//!
//! The tool is invoked in two modes: bare listing (`l -ba`) and extraction
//! (`x -y -o<dir>`), always with an explicit password argument. Some tool
//! builds emit code-page 936 for non-ASCII filenames, so all output is
//! decoded as GBK best-effort before parsing.

mod driver;
mod magic;
mod parser;

pub use driver::SevenZip;
pub use magic::{ArchiveKind, detect_by_magic, probe_with_retries};
pub use parser::{ArchiveEntry, parse_bare_listing};

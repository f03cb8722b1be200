//! Engine for scanning a live process's memory: region enumeration, a
//! width-ambiguous tagged value model, a chunked match store, and the
//! scan/narrow passes that populate and shrink it.
//!
//! The command REPL, socket glue, debugger-primitive library (attach,
//! breakpoints, single-stepping), and write-back path are all external
//! collaborators; this crate only consumes a target pid, a memory-map
//! pseudo-file, and either `/proc/<pid>/mem` or a single-word debugger
//! peek.

pub mod error;
pub mod narrow;
pub mod predicate;
pub mod reader;
pub mod region;
pub mod scan;
pub mod store;
pub mod value;

#[cfg(any(test, feature = "testutil"))]
pub mod testutil;

pub use error::{Error, Result};
pub use narrow::{narrow, narrow_with_handle, NarrowConfig};
pub use predicate::{NarrowPredicate, RangeForm, ScanPredicate};
pub use reader::ReaderPreference;
pub use region::{CowKind, FilterKind, FilterView, Perms, Region, RegionSet};
pub use scan::{scan, scan_with_handle, Alignment, ScanConfig};
pub use store::{MatchEntry, MatchList};
pub use value::{parse_needle, Needle, Value, ValidityFlags};

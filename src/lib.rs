//! Thin facade re-exporting `memscan-core`'s engine. The command REPL,
//! socket server/client, and debugger-primitive library are assembled
//! elsewhere and depend on this crate; nothing in this crate knows about
//! them.

mod error;

pub use error::Error;
pub use memscan_core::{
    narrow, parse_needle, scan, Alignment, CowKind, FilterKind, FilterView, MatchEntry, MatchList,
    NarrowConfig, NarrowPredicate, Needle, Perms, RangeForm, ReaderPreference, Region, RegionSet,
    ScanConfig, ScanPredicate, Value, ValidityFlags,
};

pub type Result<T> = std::result::Result<T, Error>;

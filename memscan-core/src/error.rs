/// Errors the engine can surface from region parsing, needle parsing,
/// reader I/O, or chunk growth.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The target's memory map or memory pseudo-file could not be opened
    /// under our credentials (either `/proc/<pid>/maps` at region-parse
    /// time, or `/proc/<pid>/mem` when a caller forces the positional
    /// provider and it is not available).
    #[error("permission denied reading target {pid}")]
    PermissionDenied { pid: u32 },

    /// Reads started returning "no such process" mid-pass.
    #[error("target process {pid} is gone")]
    TargetGone { pid: u32 },

    /// A line of `/proc/<pid>/maps` did not have the expected field count.
    #[error("malformed memory map line: {0:?}")]
    MalformedMapLine(String),

    /// A needle string was neither a valid integer nor a valid float.
    #[error("could not parse {0:?} as a numeric needle")]
    NeedleParse(String),

    /// An unknown range boundary flag combination was requested.
    #[error("invalid range boundary flag")]
    InvalidRangeFlag,

    /// Allocation failure while growing the match store.
    #[error("out of memory growing the match store")]
    OutOfMemory,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

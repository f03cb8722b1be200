use std::fmt;

#[derive(Debug)]
pub enum Error {
    Core(memscan_core::Error),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Core(e) => Some(e),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Core(e) => write!(f, "engine error: {}", e),
        }
    }
}

impl From<memscan_core::Error> for Error {
    fn from(e: memscan_core::Error) -> Self {
        Self::Core(e)
    }
}

use std::fmt::Display;

use int_enum::IntEnum;

/// Error codes for dbt-pal.
///
/// Error codes define the general "semantic type" of a [crate::FsError]. Each
/// error code is a 4-digit number stored as a u16 type.
#[repr(u16)]
#[non_exhaustive]
#[derive(Debug, Copy, Clone, Eq, PartialEq, IntEnum)]
pub enum ErrorCode {
    // ----------------- User-facing errors [1000, 8999] ----------------------
    /// Default catch-all code for when you're too lazy to specify a proper code
    Generic = 1000,
    IoError = 1001,
    EncodingError = 1002,
    InvalidConfig = 1005,
    InvalidArgument = 1007,
    MissingArgument = 1008,
    SerializationError = 1013,
    RemoteError = 1014,
    ExecutionError = 1015,
    ArrowError = 1016,
    FileNotFound = 1024,
    UndefinedField = 1032,
    DependencyNotFound = 1048,
    FailedToWriteTable = 1054,

    // --------------------------------------------------------------------------------------------
    // Adapters
    UnsupportedAdapterType = 1300,
    MalformedPythonModel = 1301,

    // --------------------------------------------------------------------------------------------
    // Jinja
    JinjaError = 1501,
    MacroSyntaxError = 1502,
    MacroVarNotFound = 1503,
    MaterializationNotFound = 1506,

    // -----------------  ---------------------
    // Internal errors [9000, 9899]
    // Everything below this line is an internal error. They will be presented
    // as bugs if surfaced to the user.
    NotSupported = 9000,
    Unknown = 9001,
    Unexpected = 9002,
    NotImplemented = 9003,
}

impl std::hash::Hash for ErrorCode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (*self as u16).hash(state)
    }
}

impl Default for ErrorCode {
    fn default() -> Self {
        Self::Generic
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:04}", *self as u16)
    }
}

impl ErrorCode {
    pub fn is_bug(&self) -> bool {
        (*self as u16) >= (Self::NotSupported as u16)
    }
}

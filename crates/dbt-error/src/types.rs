use std::{
    backtrace::Backtrace,
    fmt::{self, Debug, Display, Formatter},
    io,
};

use super::ErrorCode;

pub type FsResult<T, E = Box<FsError>> = Result<T, E>;

pub struct FsError {
    pub code: ErrorCode,
    pub context: String,
    cause: Option<WrappedError>,
    backtrace: Backtrace,
}

impl Debug for FsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("FsError")
            .field("code", &self.code)
            .field("context", &self.context)
            .field("cause", &self.cause)
            .finish()
    }
}

impl Display for FsError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.context)?;
        if let Some(cause) = &self.cause {
            if !self.context.is_empty() {
                write!(f, ": ")?;
            }
            write!(f, "{cause}")?
        }
        Ok(())
    }
}

impl std::error::Error for FsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().map(|e| e as &dyn std::error::Error)
    }
}

impl FsError {
    pub fn new(code: ErrorCode, context: impl Into<String>) -> Self {
        FsError {
            code,
            context: context.into(),
            cause: None,
            backtrace: Backtrace::capture(),
        }
    }

    pub fn new_with_forced_backtrace(code: ErrorCode, context: impl Into<String>) -> Self {
        FsError {
            code,
            context: context.into(),
            cause: None,
            backtrace: Backtrace::force_capture(),
        }
    }

    pub fn from_jinja_err(err: minijinja::Error, context: impl Display) -> Self {
        let err_code = match err.kind() {
            minijinja::ErrorKind::SyntaxError => ErrorCode::MacroSyntaxError,
            minijinja::ErrorKind::UndefinedError => ErrorCode::MacroVarNotFound,
            _ => ErrorCode::JinjaError,
        };
        FsError::new(err_code, context.to_string()).with_cause(WrappedError::Jinja(err))
    }

    pub fn from_yaml_err(err: dbt_serde_yaml::Error, context: impl Display) -> Self {
        FsError::new(ErrorCode::InvalidConfig, context.to_string())
            .with_cause(WrappedError::SerdeYml(err))
    }

    /// True if this error contains a backtrace.
    pub fn has_backtrace(&self) -> bool {
        self.backtrace.status() == std::backtrace::BacktraceStatus::Captured
    }

    /// Returns the backtrace as a string, if available.
    pub fn get_backtrace(&self) -> Option<String> {
        if self.has_backtrace() {
            Some(self.backtrace.to_string())
        } else {
            None
        }
    }

    /// Returns a pretty-printed version of this error, including the error code
    /// as a prefix.
    pub fn pretty(&self) -> String {
        let mut s = format!("dbt{}: {}", self.code, self);
        if let Some(backtrace) = self.get_backtrace() {
            s.push_str(&format!("\n{backtrace}"));
        }
        s
    }

    /// The wrapped cause, if any.
    pub fn cause(&self) -> Option<&WrappedError> {
        self.cause.as_ref()
    }

    /// Adds a cause to this error, replacing the existing cause if any
    ///
    /// Note: if you attach a cause to an error, make sure you don't format the
    /// cause into the [Self::context] for this error, as then the cause would
    /// be double printed when formatting this error.
    pub fn with_cause(self, cause: impl Into<WrappedError>) -> Self {
        FsError {
            cause: Some(cause.into()),
            ..self
        }
    }

    pub fn with_context(self, context: impl Into<String>) -> Self {
        FsError {
            context: context.into(),
            ..self
        }
    }

    pub fn with_code(self, code: ErrorCode) -> Self {
        FsError { code, ..self }
    }
}

/// Dynamically typed wrapper to allow propagating structured error info
///
/// A wrapped error can be any type that may provide potentially useful
/// debugging information. These are generally error types from third-party
/// libraries, such as Arrow or minijinja. If not, then just use the
/// [WrappedError::Generic] variant.
#[derive(Debug)]
#[non_exhaustive]
pub enum WrappedError {
    Arrow(arrow::error::ArrowError),
    SerdeYml(dbt_serde_yaml::Error),
    SerdeJson(serde_json::Error),
    Jinja(minijinja::Error),
    Io(io::Error),
    Generic(String),
    /// An error this one adds context to
    Nested(Box<FsError>),
}

impl Display for WrappedError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            WrappedError::Arrow(e) => write!(f, "{e}"),
            WrappedError::SerdeYml(e) => write!(f, "{e}"),
            WrappedError::SerdeJson(e) => write!(f, "{e}"),
            WrappedError::Jinja(e) => write!(f, "{e}"),
            WrappedError::Io(e) => write!(f, "{e}"),
            WrappedError::Generic(e) => write!(f, "{e}"),
            WrappedError::Nested(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for WrappedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WrappedError::Arrow(e) => Some(e),
            WrappedError::Io(e) => Some(e),
            WrappedError::Nested(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<arrow::error::ArrowError> for FsError {
    fn from(e: arrow::error::ArrowError) -> Self {
        FsError::new(ErrorCode::ArrowError, "Arrow error").with_cause(WrappedError::Arrow(e))
    }
}

impl From<arrow::error::ArrowError> for Box<FsError> {
    fn from(e: arrow::error::ArrowError) -> Self {
        Box::new(e.into())
    }
}

impl From<arrow::error::ArrowError> for WrappedError {
    fn from(e: arrow::error::ArrowError) -> Self {
        WrappedError::Arrow(e)
    }
}

impl From<io::Error> for Box<FsError> {
    fn from(e: io::Error) -> Self {
        Box::new(FsError::new(ErrorCode::IoError, format!("{e}")).with_cause(WrappedError::Io(e)))
    }
}

impl From<io::Error> for WrappedError {
    fn from(e: io::Error) -> Self {
        WrappedError::Io(e)
    }
}

impl From<serde_json::Error> for FsError {
    fn from(e: serde_json::Error) -> Self {
        FsError::new(ErrorCode::SerializationError, "JSON serialization error")
            .with_cause(WrappedError::SerdeJson(e))
    }
}

impl From<serde_json::Error> for Box<FsError> {
    fn from(e: serde_json::Error) -> Self {
        Box::new(e.into())
    }
}

impl From<dbt_serde_yaml::Error> for WrappedError {
    fn from(e: dbt_serde_yaml::Error) -> Self {
        WrappedError::SerdeYml(e)
    }
}

impl From<minijinja::Error> for WrappedError {
    fn from(e: minijinja::Error) -> Self {
        WrappedError::Jinja(e)
    }
}

impl From<Box<FsError>> for WrappedError {
    fn from(e: Box<FsError>) -> Self {
        WrappedError::Nested(e)
    }
}

// --- Explicit conversions ---

#[derive(Debug, Clone)]
pub struct ErrContext {
    pub code: Option<ErrorCode>,
    pub context: Option<String>,
}

pub trait LiftableResult<T>: private::Sealed {
    fn lift(self, f: impl FnOnce() -> ErrContext) -> FsResult<T>;
}

// We cannot implement From<std::io::Error> for FsError because IO Error usually carries
// too little information.
impl<T> LiftableResult<T> for Result<T, io::Error> {
    fn lift(self, f: impl FnOnce() -> ErrContext) -> FsResult<T> {
        self.map_err(|e| {
            let e =
                FsError::new(ErrorCode::IoError, format!("{e}")).with_cause(WrappedError::Io(e));
            let ctx = f();
            let e = if let Some(code) = ctx.code {
                e.with_code(code)
            } else {
                e
            };
            let e = if let Some(context) = ctx.context {
                let msg = e.context.clone();
                e.with_context(format!("{context}: {msg}"))
            } else {
                e
            };
            e.into()
        })
    }
}

pub trait ContextableResult<T>: private::Sealed {
    fn with_context(self, f: impl FnOnce() -> ErrContext) -> FsResult<T>;
}

impl<T> ContextableResult<T> for FsResult<T> {
    fn with_context(self, f: impl FnOnce() -> ErrContext) -> FsResult<T> {
        self.map_err(|e| {
            let ErrContext { code, context } = f();
            let code = code.unwrap_or(e.code);
            match context {
                Some(context) => Box::new(FsError::new(code, context).with_cause(e)),
                None => Box::new((*e).with_code(code)),
            }
        })
    }
}

mod private {
    use super::*;

    pub trait Sealed {}

    impl<T> Sealed for FsResult<T> {}

    impl<T> Sealed for Result<T, io::Error> {}
}

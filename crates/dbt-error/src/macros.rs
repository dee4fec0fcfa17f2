#[doc(hidden)]
#[macro_export]
macro_rules! __boxed_fs_err {
    ($ctor:ident, $code:expr, $($arg:tt)*) => {
        Box::new($crate::FsError::$ctor($code, format!($($arg)*)))
    };
}

/// Boxed [FsError](crate::FsError) with a code and a formatted message, for
/// `.map_err(|_| fs_err!(..))` and `.ok_or_else(|| fs_err!(..))`.
#[macro_export]
macro_rules! fs_err {
    ($code:expr, $($arg:tt)*) => {
        $crate::__boxed_fs_err!(new, $code, $($arg)*)
    };
}

/// `Err(fs_err!(..))`
#[macro_export]
macro_rules! err {
    ($code:expr, $($arg:tt)*) => {
        Err($crate::fs_err!($code, $($arg)*))
    };
}

/// An internal error. Always carries a backtrace.
#[macro_export]
macro_rules! unexpected_fs_err {
    ($($arg:tt)*) => {
        $crate::__boxed_fs_err!(new_with_forced_backtrace, $crate::ErrorCode::Unexpected, $($arg)*)
    };
}

#[macro_export]
macro_rules! unexpected_err {
    ($($arg:tt)*) => {
        Err($crate::unexpected_fs_err!($($arg)*))
    };
}

#[macro_export]
macro_rules! not_implemented_fs_err {
    ($($arg:tt)*) => {
        $crate::__boxed_fs_err!(new, $crate::ErrorCode::NotImplemented, $($arg)*)
    };
}

#[macro_export]
macro_rules! not_implemented_err {
    ($($arg:tt)*) => {
        Err($crate::not_implemented_fs_err!($($arg)*))
    };
}

/// Builds the closure taken by [LiftableResult::lift](crate::LiftableResult)
/// and [ContextableResult::with_context](crate::ContextableResult):
///
/// - `ectx!(code => ErrorCode::X, "msg {}", arg)` replaces code and message
/// - `ectx!(code => ErrorCode::X)` replaces only the code
/// - `ectx!("msg {}", arg)` replaces only the message
#[macro_export]
macro_rules! ectx {
    (code => $code:expr, $($arg:tt)*) => {
        || $crate::ErrContext {
            code: Some($code),
            context: Some(format!($($arg)*)),
        }
    };
    (code => $code:expr) => {
        || $crate::ErrContext {
            code: Some($code),
            context: None,
        }
    };
    ($($arg:tt)*) => {
        || $crate::ErrContext {
            code: None,
            context: Some(format!($($arg)*)),
        }
    };
}

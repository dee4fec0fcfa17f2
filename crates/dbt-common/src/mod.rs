pub mod adapter;
pub mod constants;
pub mod stdfs;
#[macro_use]
pub extern crate dbt_error as error;
pub use dbt_error::{
    ContextableResult, ErrContext, ErrorCode, FsError, FsResult, LiftableResult, WrappedError,
    ectx, err, fs_err, not_implemented_err, not_implemented_fs_err, unexpected_err,
    unexpected_fs_err,
};

//! Leaf stores built on `mom-core`.
//!
//! Each store is a named factory published in the root scope under its
//! interface id:
//!
//! - [`COUNTER`] (`mom.examples.counter`): a headless counter
//! - [`COUNTER_LIST`] (`mom.examples.counterList`): a list of counter children
//! - [`COUNTDOWN`] (`mom.examples.countdown`): a timer driven by the scope's
//!   `TimeService`
//! - [`FOLDER`] (`mom.examples.Folder`): a folder tree whose sub-folders are
//!   mounted on first expansion
//!
//! # Example
//!
//! ```rust
//! use mom_core::{create, Value};
//! use mom_showcase::COUNTER;
//!
//! let counter = create(COUNTER.params().with("value", 42)).unwrap();
//! counter.call("increment", &[]).unwrap();
//! assert_eq!(counter.get("$value").unwrap(), Value::from(43));
//! assert_eq!(counter.get("changes").unwrap(), Value::from(1));
//! counter.dispose().unwrap();
//! ```

mod countdown;
mod counter;
mod counter_list;
mod folder;

pub use countdown::{COUNTDOWN, COUNTDOWN_ID};
pub use counter::{COUNTER, COUNTER_ID};
pub use counter_list::{COUNTER_LIST, COUNTER_LIST_ID};
pub use folder::{FOLDER, FOLDER_ID};

use mom_core::{BoxError, Value};

/// The first action argument as an integer, or `default` when absent.
pub(crate) fn int_arg(args: &[Value], default: i64) -> Result<i64, BoxError> {
    match args.first() {
        Some(value) if !value.is_null() => Ok(value.to_i64()?),
        _ => Ok(default),
    }
}

/// The first action argument as a boolean, or `default` when absent.
pub(crate) fn bool_arg(args: &[Value], default: bool) -> Result<bool, BoxError> {
    match args.first() {
        Some(value) if !value.is_null() => Ok(value.to_bool()?),
        _ => Ok(default),
    }
}

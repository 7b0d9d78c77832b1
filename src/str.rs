//! Some string type helpers.
//!
//! Moved into a separate module, so we could experiment with different representations.

use std::sync::Arc;

/// `Str` is a string that can be cloned cheaply and is used for flag/variation/allocation keys
/// that get copied into every evaluation result and log event.
pub type Str = faststr::FastStr;

/// `ArcStr` is a string that can be cloned cheaply. Used for values that flow into
/// [`crate::value::AssignedValue::String`].
pub type ArcStr = Arc<str>;

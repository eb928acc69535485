//! Type definitions and constants.

pub(crate) mod constants;

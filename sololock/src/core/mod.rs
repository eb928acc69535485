//! Core lock acquisition protocol.
//!
//! This module contains the internal implementation of checking, claiming,
//! and releasing the lock record, along with the deadline-bounded waits the
//! protocol relies on.

pub(crate) mod acquire;
pub(crate) mod check;
pub(crate) mod release;
pub(crate) mod state_wait;

//! Type-directed dispatch over [`dt_model`] variant tables.
//!
//! A [`Switch`] maps each tag of a table to at most one handler and resolves an instance by
//! walking from its dynamic tag towards the root. [`AdapterFactory`] memoizes switch results per
//! instance, and [`Validator`] uses a switch to check lexical values against inherited facets.

pub mod adapter;
pub mod error;
pub mod switch;
pub mod validator;

pub use adapter::{AdapterFactory, Subject};
pub use error::{HandlerError, SwitchError};
pub use switch::{HandlerResult, Outcome, Switch, SwitchBuilder};
pub use validator::{Diagnostic, Report, Validator};

//! Core types for binguard
//!
//! This module holds the error taxonomy shared by every layer of the crate.
//!
//! # Error Management
//!
//! - **Strongly-typed errors** ([`UpdateError`]) for precise handling in library code
//! - **Classification tags** ([`ErrorKind`]) that the recovery policy matches on
//! - **User-friendly contexts** ([`ErrorContext`]) with actionable suggestions for CLI users
//!
//! Library operations return `Result<_, UpdateError>`. The CLI layer works with
//! [`anyhow::Result`] and converts at the boundary with [`user_friendly_error`].

pub mod error;

pub use error::{ErrorContext, ErrorKind, UpdateError, user_friendly_error};

//! Core types for Simonia.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod money;
pub mod phone;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use money::{CURRENCY_CODE, Money, MoneyError};
pub use phone::{Phone, PhoneError};
pub use status::*;

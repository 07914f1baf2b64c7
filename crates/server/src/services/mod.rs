//! Business logic shared by the route handlers and the CLI.

pub mod auth;
pub mod cart;
pub mod email;
pub mod google;
pub mod orders;
pub mod outbox;
pub mod uploads;

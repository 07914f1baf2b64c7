//! Simonia shop server library.
//!
//! JSON API for the storefront SPA and the React-Admin back office, backed by
//! `PostgreSQL`. The binary in `main.rs` wires this library to a listener; the
//! CLI reuses the repositories and services for maintenance commands.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

/// Embedded SQL migrations for the shop schema.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

//! Library crate for raffle-back, exposing modules for binaries and integration tests.

/// Application configuration loaded at start.
pub mod config;
/// Persistence: entities, the raffle store capability and its backends.
pub mod dao;
/// Request and response payloads.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
/// Payment gateway client and webhook verification.
pub mod gateway;
/// Axum routers.
pub mod routes;
/// Raffle services: allocation, payments, aggregates and maintenance jobs.
pub mod services;
/// Shared application state and sale domain values.
pub mod state;

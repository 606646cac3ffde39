/// Database model definitions.
pub mod models;
/// Raffle storage capability and its backends.
pub mod raffle_store;
/// Storage abstraction layer for database operations.
pub mod storage;

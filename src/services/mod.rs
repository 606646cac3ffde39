/// Atomic counter maintenance.
pub mod accumulator;
/// Unique ticket-number reservation.
pub mod allocator;
/// Referral codes, resolution and bulk transfer.
pub mod attribution;
/// OpenAPI documentation generation.
pub mod documentation;
/// Administrative sale entry corrections.
pub mod entry_service;
/// Health check service.
pub mod health_service;
/// Sale entries and counters from succeeded intents.
pub mod materializer;
/// Purchase flow up to the gateway intent.
pub mod payment_service;
/// Full aggregate rebuild.
pub mod recalculation;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// Expired reservation reclamation.
pub mod sweeper;
/// Gateway webhook handling.
pub mod webhook_service;

// Application layer - Ingestion, projection and session orchestration
pub mod catalog_repository;
pub mod catalog_sync;
pub mod connection;
pub mod ingestion;
pub mod projection;
pub mod store;
pub mod transport;
pub mod unit_control;

// Live telemetry client - ingestion, projection and session management for unit telemetry feeds
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

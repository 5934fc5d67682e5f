// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod feed_url;
pub mod http_catalog;
pub mod wire;
pub mod ws_transport;

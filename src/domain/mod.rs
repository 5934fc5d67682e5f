// Domain layer - Pure telemetry types and algorithms
pub mod downsample;
pub mod normalize;
pub mod series_buffer;
pub mod session;
pub mod telemetry;
pub mod unit;
pub mod window;

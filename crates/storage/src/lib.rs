//! Storage abstractions for the Zephyr ingest services.
//!
//! Provides unified interfaces for:
//! - SQLite for per-sensor watermarks
//! - Redis Streams for publishing observations

pub mod bus;
pub mod watermark;

pub use bus::{EventPublisher, MemoryPublisher, PublishAck, RedisStreamPublisher};
pub use watermark::{MemoryWatermarkStore, SqliteWatermarkStore, WatermarkStore};

// Infrastructure layer - External dependencies and adapters
pub mod config;
pub mod memory_log;
pub mod modbus_source;
pub mod ndjson_stream;

// Application layer - Use cases, shared state and ports
pub mod error;
pub mod machine_service;
pub mod monitor_service;
pub mod reading_log;
pub mod register_source;
pub mod supervisor;
pub mod telemetry_store;

// Domain layer - Pure models and the rolling-window engine
pub mod alarm;
pub mod chart;
pub mod history;
pub mod machine;
pub mod register_map;
pub mod session;

pub mod command_models;
pub mod envelope;
pub mod event_types;
pub mod lifecycle_models;
pub mod telemetry_models;

pub mod command;
pub mod consumer;
pub mod dispatcher;
pub mod routes;
pub mod telemetry;

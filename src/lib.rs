pub mod configuration;
pub mod error;
pub mod handlers;
pub mod models;
pub mod queue;

pub use configuration::config::{load_config, Config, FailurePolicy};
pub use error::{CodecError, ConfigError, DispatchError, QueueError};
pub use handlers::command::interpreter::{interpret, CommandEffect};
pub use handlers::consumer::{run_consumer, ConsumerOptions, ConsumerStats};
pub use handlers::dispatcher::{DispatchOutcome, DispatchStatus, EventHandler, MessageDispatcher};
pub use handlers::routes::default_dispatcher;
pub use handlers::telemetry::emitter::{EmitterSettings, SessionStart, TelemetryEmitter};
pub use models::envelope::{decode, encode, extract_typed, Envelope, RawPayload};
pub use queue::{memory::InMemoryQueue, sqs::SqsQueue, QueueClient, RawMessage};

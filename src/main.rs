use std::path::Path;
use std::sync::Arc;

use log::LevelFilter;
use tokio_util::sync::CancellationToken;

use energy_fleet_dispatch::configuration::config::{load_config, DEFAULT_CONFIG_FILE};
use energy_fleet_dispatch::handlers::consumer::{run_consumer, ConsumerOptions};
use energy_fleet_dispatch::handlers::routes::default_dispatcher;
use energy_fleet_dispatch::handlers::telemetry::emitter::{EmitterSettings, TelemetryEmitter};
use energy_fleet_dispatch::queue::sqs::SqsQueue;
use energy_fleet_dispatch::queue::QueueClient;

// --------------------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
    let config = load_config(&config_path)?;

    // Initialise logger.
    if let Err(e) = env_logger::Builder::new()
        .filter_level(config.log_level.parse::<LevelFilter>().unwrap_or(LevelFilter::Info))
        .try_init()
    {
        eprintln!("Failed to initialise logger: {}", e);
        return Err(e.into());
    }

    log::info!("=== Energy fleet dispatch starting ===");
    if !Path::new(&config_path).exists() {
        log::warn!("'{}' not found, using built-in defaults", config_path);
    }
    log::info!("Endpoint:        {}", config.endpoint_url);
    log::info!("Commands queue:  {}", config.commands_queue_url);
    log::info!("Telemetry queue: {}", config.telemetry_queue_url);
    log::info!("Telemetry every {}s, failure policy {:?}", config.telemetry_interval_seconds, config.failure_policy);

    let queue: Arc<dyn QueueClient> = Arc::new(SqsQueue::from_config(&config).await);

    let emitter    = Arc::new(TelemetryEmitter::new(queue.clone(), EmitterSettings::from_config(&config)));
    let dispatcher = default_dispatcher(queue.clone(), config.failure_policy, emitter.clone());
    let options    = ConsumerOptions::from_config(&config);

    // ----------------------------------------------------------------------------------------------------------
    // Ctrl-C stops the consumer after the current batch; telemetry sessions are then
    // cancelled and joined.
    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::info!("[FleetDispatch] Shutdown requested");
                signal_token.cancel();
            }
            Err(e) => log::error!("[FleetDispatch] Cannot listen for Ctrl-C: {}", e),
        }
    });

    run_consumer(queue, &dispatcher, &options, shutdown).await;
    emitter.shutdown().await;

    log::info!("=== Energy fleet dispatch stopped ===");
    Ok(())
}

use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::configuration::config::FailurePolicy;
use crate::error::DispatchError;
use crate::handlers::command::interpreter::{interpret, CommandEffect, RealModeVariant};
use crate::handlers::dispatcher::{EventHandler, MessageDispatcher};
use crate::handlers::telemetry::emitter::TelemetryEmitter;
use crate::models::command_models::CommandV1Data;
use crate::models::envelope::{extract_typed, Envelope, RawPayload};
use crate::models::event_types::{
    BATTERY_COMMAND_V1, OFFBOARDING_REQUEST_V1, OFFBOARDING_RESPONSE_V1, ONBOARDING_REQUEST_V1,
    ONBOARDING_RESPONSE_V1, TELEMETRY_V1,
};
use crate::models::lifecycle_models::{
    OffboardingRequestV1Data, OffboardingResponseV1Data, OnboardingRequestV1Data, OnboardingResponseV1Data,
};
use crate::models::telemetry_models::TelemetryV1Data;
use crate::queue::QueueClient;

// --------------------------------------------------------------------------------------------------------------
// Routing table
//
//   onboarding-request.v1        -> response + start telemetry session
//   offboarding-request.v1       -> response + stop telemetry session
//   battery-inverter.command.v1  -> interpret command
//   onboarding-response.v1       -> log
//   offboarding-response.v1      -> log
//   telemetry.v1                 -> outbound only, logged and consumed if seen inbound
// --------------------------------------------------------------------------------------------------------------

/// Dispatcher with every known event type bound to its handler.
pub fn default_dispatcher(
    queue: Arc<dyn QueueClient>,
    failure_policy: FailurePolicy,
    emitter: Arc<TelemetryEmitter>,
) -> MessageDispatcher {
    let mut dispatcher = MessageDispatcher::new(queue, failure_policy);
    dispatcher
        .register(ONBOARDING_REQUEST_V1,   Arc::new(OnboardingRequestHandler { emitter: emitter.clone() }))
        .register(OFFBOARDING_REQUEST_V1,  Arc::new(OffboardingRequestHandler { emitter }))
        .register(BATTERY_COMMAND_V1,      Arc::new(BatteryCommandHandler))
        .register(ONBOARDING_RESPONSE_V1,  Arc::new(OnboardingResponseHandler))
        .register(OFFBOARDING_RESPONSE_V1, Arc::new(OffboardingResponseHandler))
        .register(TELEMETRY_V1,            Arc::new(InboundTelemetryHandler));
    dispatcher
}

// --------------------------------------------------------------------------------------------------------------
// Lifecycle requests

pub struct OnboardingRequestHandler {
    pub emitter: Arc<TelemetryEmitter>,
}

#[async_trait]
impl EventHandler for OnboardingRequestHandler {
    async fn handle(&self, envelope: Envelope<RawPayload>) -> Result<(), DispatchError> {
        let request: Envelope<OnboardingRequestV1Data> = envelope.into_typed()?;
        info!("[Lifecycle] OnboardingRequest for serial: {:?}", request.data.serial_number);

        self.emitter.on_onboarded(request.data.serial_number).await?;
        Ok(())
    }
}

pub struct OffboardingRequestHandler {
    pub emitter: Arc<TelemetryEmitter>,
}

#[async_trait]
impl EventHandler for OffboardingRequestHandler {
    async fn handle(&self, envelope: Envelope<RawPayload>) -> Result<(), DispatchError> {
        let request: Envelope<OffboardingRequestV1Data> = envelope.into_typed()?;
        info!("[Lifecycle] OffboardingRequest for serial: {:?}", request.data.serial_number);

        self.emitter.on_offboarded(request.data.serial_number).await?;
        Ok(())
    }
}

// --------------------------------------------------------------------------------------------------------------
// Battery commands

pub struct BatteryCommandHandler;

#[async_trait]
impl EventHandler for BatteryCommandHandler {
    async fn handle(&self, envelope: Envelope<RawPayload>) -> Result<(), DispatchError> {
        let command: Envelope<CommandV1Data> = envelope.into_typed()?;
        log_command_effect(&interpret(&command.data));
        Ok(())
    }
}

fn log_command_effect(effect: &CommandEffect) {
    info!("[Command] Handling BatteryCommand for device: {}", effect.device_id);

    match effect.real.variant {
        RealModeVariant::Missing => warn!("[Command] realMode is missing in the command."),
        RealModeVariant::Unknown => warn!("[Command] Unknown realMode command type."),
        _ => info!("[Command]     realMode: {}", effect.real),
    }
    if !effect.real.ignored.is_empty() {
        warn!("[Command] Several realMode variants set, ignored: {:?}", effect.real.ignored);
    }

    info!("[Command]     reactiveMode: {}", effect.reactive);
    if let Some(start_time) = &effect.start_time {
        info!("[Command]     startTime: {}", start_time);
    }
    if effect.is_actionable() {
        info!("[Command]     duration: {}", effect.duration);
    } else {
        warn!("[Command]     {} | not actionable", effect.duration);
    }
}

// --------------------------------------------------------------------------------------------------------------
// Responses and inbound telemetry: log only

/// Responses sometimes arrive with a whole response envelope nested in `data`; accept both.
fn response_payload<P: DeserializeOwned>(data: &Value) -> Result<P, DispatchError> {
    let nested = data.get("specversion").and(data.get("data"));
    Ok(extract_typed::<P, Value>(nested.unwrap_or(data))?)
}

pub struct OnboardingResponseHandler;

#[async_trait]
impl EventHandler for OnboardingResponseHandler {
    async fn handle(&self, envelope: Envelope<RawPayload>) -> Result<(), DispatchError> {
        let response: OnboardingResponseV1Data = response_payload(&envelope.data)?;
        info!(
            "[Lifecycle] OnboardingResponse received for serial: {}, status: {}",
            response.serial_number, response.connection_status
        );
        if let Some(reason) = &response.error_reason {
            warn!("[Lifecycle]     errorReason: {}", reason);
        }
        Ok(())
    }
}

pub struct OffboardingResponseHandler;

#[async_trait]
impl EventHandler for OffboardingResponseHandler {
    async fn handle(&self, envelope: Envelope<RawPayload>) -> Result<(), DispatchError> {
        let response: OffboardingResponseV1Data = response_payload(&envelope.data)?;
        info!(
            "[Lifecycle] OffboardingResponse received for serial: {}, status: {}",
            response.serial_number, response.connection_status
        );
        Ok(())
    }
}

pub struct InboundTelemetryHandler;

#[async_trait]
impl EventHandler for InboundTelemetryHandler {
    async fn handle(&self, envelope: Envelope<RawPayload>) -> Result<(), DispatchError> {
        let telemetry: Envelope<TelemetryV1Data> = envelope.into_typed()?;
        warn!(
            "[Dispatch] Telemetry is outbound only; ignoring inbound telemetry for site '{}' ({} device(s))",
            telemetry.data.site_id,
            telemetry.data.device_count()
        );
        Ok(())
    }
}

// --------------------------------------------------------------------------------------------------------------

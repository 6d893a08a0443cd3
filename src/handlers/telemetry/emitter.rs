use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::configuration::config::Config;
use crate::error::DispatchError;
use crate::models::envelope::{encode, Envelope};
use crate::models::event_types::{OFFBOARDING_RESPONSE_V1, ONBOARDING_RESPONSE_V1, TELEMETRY_V1};
use crate::models::lifecycle_models::{
    OffboardingResponseV1Data, OnboardingResponseV1Data, STATUS_CONNECTED, STATUS_NOT_CONNECTED,
};
use crate::models::telemetry_models::{BatteryInverterReading, TelemetryV1Data};
use crate::queue::QueueClient;

// --------------------------------------------------------------------------------------------------------------
// Telemetry sessions
//
// One session per serial number. A session is a supervised tokio task that emits a telemetry
// envelope, then waits one interval, until its cancellation token fires. The token is
// checked before every emission and raced against the wait; an emission already in progress
// always completes.
//
// Starting a session for a serial that already has a live one is a no-op.
// --------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EmitterSettings {
    pub outbound_queue:        String,
    pub interval:              Duration,
    pub event_source:          String,
    pub site_id:               String,
    pub device_id:             String,
    pub default_serial_number: String,
}

impl EmitterSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            outbound_queue:        config.telemetry_queue_url.clone(),
            interval:              config.telemetry_interval(),
            event_source:          config.event_source.clone(),
            site_id:               config.site_id.clone(),
            device_id:             config.device_id.clone(),
            default_serial_number: config.default_serial_number.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStart {
    Started,
    AlreadyActive,
}

struct Session {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

// --------------------------------------------------------------------------------------------------------------

/// Encodes and sends outbound envelopes. Cloned into every session task.
#[derive(Clone)]
struct Publisher {
    queue:    Arc<dyn QueueClient>,
    settings: Arc<EmitterSettings>,
}

impl Publisher {
    async fn publish<P: Serialize>(&self, event_type: &str, data: P) -> Result<String, DispatchError> {
        let envelope = Envelope::new(event_type, &self.settings.event_source, data);
        let body = encode(&envelope)?;
        self.queue.send(&self.settings.outbound_queue, body.clone()).await?;
        Ok(body)
    }

    /// Static demo readings for the configured device.
    fn current_readings(&self) -> TelemetryV1Data {
        TelemetryV1Data {
            site_id: self.settings.site_id.clone(),
            battery_inverters: vec![BatteryInverterReading {
                device_id:             self.settings.device_id.clone(),
                device_time:           Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                battery_power_w:       100,
                grid_voltage1_v:       230.0,
                grid_frequency_hz:     50.0,
                state_of_charge:       1.0,
                state_of_health:       1.0,
                max_charge_power_w:    100,
                max_discharge_power_w: 100,
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    async fn emit_telemetry(&self) -> Result<(), DispatchError> {
        let readings = self.current_readings();
        let devices  = readings.device_count();
        let body     = self.publish(TELEMETRY_V1, readings).await?;

        info!("[Telemetry] Sent telemetry for site '{}' ({} device(s))", self.settings.site_id, devices);
        debug!("[Telemetry] {}", body);
        Ok(())
    }
}

async fn run_session(publisher: Publisher, serial_number: String, cancel: CancellationToken) {
    let interval = publisher.settings.interval;
    info!("[Telemetry] Session '{}' started, emitting every {:?}", serial_number, interval);

    loop {
        if cancel.is_cancelled() {
            break;
        }

        // A failed emission is logged; the session keeps running.
        if let Err(e) = publisher.emit_telemetry().await {
            error!("[Telemetry] Session '{}' emission failed: {}", serial_number, e);
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(interval) => {}
        }
    }

    info!("[Telemetry] Session '{}' stopped", serial_number);
}

// --------------------------------------------------------------------------------------------------------------

pub struct TelemetryEmitter {
    publisher: Publisher,
    sessions:  Mutex<HashMap<String, Session>>,
}

impl TelemetryEmitter {
    pub fn new(queue: Arc<dyn QueueClient>, settings: EmitterSettings) -> Self {
        Self {
            publisher: Publisher { queue, settings: Arc::new(settings) },
            sessions:  Mutex::new(HashMap::new()),
        }
    }

    fn lock_sessions(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn serial_or_default(&self, serial_number: Option<String>) -> String {
        serial_number
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.publisher.settings.default_serial_number.clone())
    }

    /// Send the onboarding response, then start the device's telemetry session.
    /// Returns once the response is on the queue; the session runs in the background.
    pub async fn on_onboarded(&self, serial_number: Option<String>) -> Result<OnboardingResponseV1Data, DispatchError> {
        let serial_number = self.serial_or_default(serial_number);
        let response = OnboardingResponseV1Data {
            serial_number:     serial_number.clone(),
            device_id:         self.publisher.settings.device_id.clone(),
            connection_status: STATUS_CONNECTED.to_string(),
            ..Default::default()
        };

        self.publisher.publish(ONBOARDING_RESPONSE_V1, &response).await?;
        info!("[Lifecycle] Sent OnboardingResponse for serial '{}'", serial_number);

        self.start_session(&serial_number);
        Ok(response)
    }

    /// Send the offboarding response, then stop the device's session. A request without a
    /// serial number stops every active session.
    pub async fn on_offboarded(&self, serial_number: Option<String>) -> Result<OffboardingResponseV1Data, DispatchError> {
        let requested = serial_number.filter(|s| !s.trim().is_empty());
        let response = OffboardingResponseV1Data {
            serial_number:     self.serial_or_default(requested.clone()),
            device_id:         self.publisher.settings.device_id.clone(),
            connection_status: STATUS_NOT_CONNECTED.to_string(),
        };

        self.publisher.publish(OFFBOARDING_RESPONSE_V1, &response).await?;
        info!("[Lifecycle] Sent OffboardingResponse for serial '{}'", response.serial_number);

        match requested {
            Some(serial_number) => {
                self.stop_session(&serial_number).await;
            }
            None => {
                let stopped = self.stop_all_sessions().await;
                info!("[Telemetry] Offboarding without serial number stopped {} session(s)", stopped);
            }
        }
        Ok(response)
    }

    /// Spawn the periodic loop for `serial_number` unless one is already live.
    pub fn start_session(&self, serial_number: &str) -> SessionStart {
        let mut sessions = self.lock_sessions();

        if let Some(existing) = sessions.get(serial_number) {
            if !existing.handle.is_finished() {
                warn!("[Telemetry] Session '{}' already active, start ignored", serial_number);
                return SessionStart::AlreadyActive;
            }
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_session(self.publisher.clone(), serial_number.to_string(), cancel.clone()));
        sessions.insert(serial_number.to_string(), Session { cancel, handle });
        SessionStart::Started
    }

    /// Signal the session to stop and wait for it to wind down. Returns false when there
    /// was nothing to stop.
    pub async fn stop_session(&self, serial_number: &str) -> bool {
        let session = self.lock_sessions().remove(serial_number);

        match session {
            Some(session) => {
                session.cancel.cancel();
                if let Err(e) = session.handle.await {
                    error!("[Telemetry] Session '{}' ended abnormally: {}", serial_number, e);
                }
                true
            }
            None => {
                warn!("[Telemetry] No active session for '{}', nothing to stop", serial_number);
                false
            }
        }
    }

    /// Build and send one telemetry envelope outside any session.
    pub async fn emit_once(&self) -> Result<(), DispatchError> {
        self.publisher.emit_telemetry().await
    }

    pub fn active_sessions(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .lock_sessions()
            .iter()
            .filter(|(_, session)| !session.handle.is_finished())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Stop every session and wait for all of them.
    pub async fn shutdown(&self) {
        self.stop_all_sessions().await;
    }

    async fn stop_all_sessions(&self) -> usize {
        let sessions: Vec<(String, Session)> = self.lock_sessions().drain().collect();
        if sessions.is_empty() {
            return 0;
        }

        info!("[Telemetry] Stopping {} session(s)", sessions.len());
        for (_, session) in &sessions {
            session.cancel.cancel();
        }

        let count = sessions.len();
        let joins = sessions.into_iter().map(|(key, session)| async move {
            if let Err(e) = session.handle.await {
                error!("[Telemetry] Session '{}' ended abnormally: {}", key, e);
            }
        });
        futures::future::join_all(joins).await;
        count
    }
}

// --------------------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QueueError;
    use crate::models::envelope::decode;
    use crate::queue::memory::InMemoryQueue;
    use crate::queue::RawMessage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const OUT: &str = "telemetry-demo";

    fn emitter_with_queue() -> (TelemetryEmitter, Arc<InMemoryQueue>) {
        let queue = Arc::new(InMemoryQueue::new());
        (TelemetryEmitter::new(queue.clone(), test_settings()), queue)
    }

    fn test_settings() -> EmitterSettings {
        EmitterSettings {
            outbound_queue:        OUT.to_string(),
            interval:              Duration::from_secs(60),
            event_source:          "urn:example:oem".to_string(),
            site_id:               "SiteABC".to_string(),
            device_id:             "Device123".to_string(),
            default_serial_number: "SN123".to_string(),
        }
    }

    /// In-memory queue whose first `failures` sends are rejected.
    struct FlakySend {
        inner:    InMemoryQueue,
        failures: AtomicUsize,
    }

    #[async_trait]
    impl QueueClient for FlakySend {
        async fn receive(&self, queue_id: &str, max_messages: u32, wait: Duration) -> Result<Vec<RawMessage>, QueueError> {
            self.inner.receive(queue_id, max_messages, wait).await
        }

        async fn send(&self, queue_id: &str, body: String) -> Result<(), QueueError> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(QueueError::UnknownQueue(queue_id.to_string()));
            }
            self.inner.send(queue_id, body).await
        }

        async fn delete(&self, queue_id: &str, receipt_handle: &str) -> Result<(), QueueError> {
            self.inner.delete(queue_id, receipt_handle).await
        }
    }

    fn sent_types(queue: &InMemoryQueue) -> Vec<String> {
        queue
            .pending_bodies(OUT)
            .iter()
            .map(|body| decode(body).expect("outbound envelope decodes").event_type)
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn onboarding_response_precedes_first_telemetry() {
        let (emitter, queue) = emitter_with_queue();

        let response = emitter.on_onboarded(Some("SN-1".into())).await.expect("onboarded");
        assert_eq!(response.connection_status, "connected");
        assert_eq!(response.device_id, "Device123");
        assert_eq!(sent_types(&queue), [ONBOARDING_RESPONSE_V1]);

        sleep(Duration::from_secs(1)).await;
        assert_eq!(sent_types(&queue), [ONBOARDING_RESPONSE_V1, TELEMETRY_V1]);

        emitter.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn session_emits_once_per_interval() {
        let (emitter, queue) = emitter_with_queue();
        assert_eq!(emitter.start_session("SN-1"), SessionStart::Started);

        sleep(Duration::from_secs(125)).await;
        let telemetry = sent_types(&queue).iter().filter(|t| *t == TELEMETRY_V1).count();
        assert_eq!(telemetry, 3);

        emitter.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_for_same_serial_is_ignored() {
        let (emitter, queue) = emitter_with_queue();

        assert_eq!(emitter.start_session("SN-1"), SessionStart::Started);
        assert_eq!(emitter.start_session("SN-1"), SessionStart::AlreadyActive);
        assert_eq!(emitter.active_sessions(), ["SN-1"]);

        sleep(Duration::from_secs(1)).await;
        assert_eq!(sent_types(&queue).len(), 1);

        emitter.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn offboarding_stops_emission() {
        let (emitter, queue) = emitter_with_queue();
        emitter.on_onboarded(Some("SN-1".into())).await.expect("onboarded");
        sleep(Duration::from_secs(61)).await;

        let response = emitter.on_offboarded(Some("SN-1".into())).await.expect("offboarded");
        assert_eq!(response.connection_status, "not-connected");
        assert!(emitter.active_sessions().is_empty());

        let after_stop = sent_types(&queue).len();
        sleep(Duration::from_secs(600)).await;
        assert_eq!(sent_types(&queue).len(), after_stop);
        assert_eq!(sent_types(&queue).last().map(String::as_str), Some(OFFBOARDING_RESPONSE_V1));
    }

    #[tokio::test(start_paused = true)]
    async fn offboarding_without_serial_stops_the_running_session() {
        let (emitter, queue) = emitter_with_queue();
        emitter.on_onboarded(Some("SN-42".into())).await.expect("onboarded");
        sleep(Duration::from_secs(1)).await;

        let response = emitter.on_offboarded(None).await.expect("offboarded");
        assert_eq!(response.serial_number, "SN123");
        assert!(emitter.active_sessions().is_empty());

        sleep(Duration::from_secs(600)).await;
        assert_eq!(sent_types(&queue), [ONBOARDING_RESPONSE_V1, TELEMETRY_V1, OFFBOARDING_RESPONSE_V1]);
    }

    #[tokio::test(start_paused = true)]
    async fn offboarding_another_serial_leaves_the_session_alone() {
        let (emitter, queue) = emitter_with_queue();
        emitter.on_onboarded(Some("SN-42".into())).await.expect("onboarded");
        sleep(Duration::from_secs(1)).await;

        let response = emitter.on_offboarded(Some("SN-7".into())).await.expect("offboarded");
        assert_eq!(response.serial_number, "SN-7");
        assert_eq!(emitter.active_sessions(), ["SN-42"]);

        sleep(Duration::from_secs(60)).await;
        assert_eq!(sent_types(&queue).last().map(String::as_str), Some(TELEMETRY_V1));

        emitter.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn failed_emission_does_not_end_the_session() {
        let queue = Arc::new(FlakySend { inner: InMemoryQueue::new(), failures: AtomicUsize::new(1) });
        let emitter = TelemetryEmitter::new(queue.clone(), test_settings());

        assert_eq!(emitter.start_session("SN-1"), SessionStart::Started);
        sleep(Duration::from_secs(125)).await;

        assert_eq!(sent_types(&queue.inner), [TELEMETRY_V1, TELEMETRY_V1]);
        assert_eq!(emitter.active_sessions(), ["SN-1"]);

        emitter.shutdown().await;
    }

    #[tokio::test]
    async fn stop_without_session_is_a_no_op() {
        let (emitter, _queue) = emitter_with_queue();
        assert!(!emitter.stop_session("SN-404").await);
        assert!(!emitter.stop_session("SN-404").await);
    }

    #[tokio::test]
    async fn missing_serial_falls_back_to_default() {
        let (emitter, _queue) = emitter_with_queue();

        let response = emitter.on_offboarded(None).await.expect("offboarded");
        assert_eq!(response.serial_number, "SN123");
        let response = emitter.on_offboarded(Some("   ".into())).await.expect("offboarded");
        assert_eq!(response.serial_number, "SN123");
    }

    #[tokio::test]
    async fn emit_once_sends_demo_readings() {
        let (emitter, queue) = emitter_with_queue();
        emitter.emit_once().await.expect("emitted");

        let bodies = queue.pending_bodies(OUT);
        let envelope = decode(&bodies[0]).expect("decodes");
        let data: TelemetryV1Data = envelope.into_typed().expect("telemetry").data;

        assert_eq!(data.site_id, "SiteABC");
        assert_eq!(data.battery_inverters[0].device_id, "Device123");
        assert_eq!(data.battery_inverters[0].grid_voltage1_v, 230.0);
        assert_eq!(data.battery_inverters[0].solar_reactive_power_var, None);
    }
}

//! Per-connection event handler
//!
//! Owns the session, segmenter, and coordinator for one connection and
//! drives them from typed inbound events. The transport is an external
//! collaborator that feeds the inbound channel and drains the outbound
//! one; the handler itself never touches a socket.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use callstream_config::Settings;
use callstream_core::{
    AudioChunk, InboundEvent, LanguageModel, OutboundEvent, SpeechSynthesizer, SpeechToText,
};
use callstream_pipeline::{
    RequestCoordinator, RequestHandle, UtteranceSegmenter, VoiceActivityDetector,
};

use crate::metrics;
use crate::session::CallSession;
use crate::SessionError;

/// Drives one call session from inbound events until the call ends
pub struct SessionHandler {
    session: Arc<CallSession>,
    segmenter: UtteranceSegmenter,
    coordinator: Arc<RequestCoordinator>,
    outbound: mpsc::Sender<OutboundEvent>,
    heartbeat_interval: Duration,
    heartbeat_timeout: Duration,
}

impl SessionHandler {
    pub fn new(
        settings: &Settings,
        stt: Arc<dyn SpeechToText>,
        llm: Arc<dyn LanguageModel>,
        tts: Arc<dyn SpeechSynthesizer>,
        outbound: mpsc::Sender<OutboundEvent>,
    ) -> Self {
        let vad = VoiceActivityDetector::new(settings.vad.clone());
        Self {
            session: Arc::new(CallSession::new(settings.session.max_history_turns)),
            segmenter: UtteranceSegmenter::new(vad, settings.segmenter.clone()),
            coordinator: Arc::new(RequestCoordinator::new(stt, llm, tts)),
            outbound,
            heartbeat_interval: Duration::from_secs(settings.session.heartbeat_interval_secs),
            heartbeat_timeout: Duration::from_secs(settings.session.heartbeat_timeout_secs),
        }
    }

    pub fn session(&self) -> Arc<CallSession> {
        Arc::clone(&self.session)
    }

    /// Consume inbound events until the call ends, the transport drops
    /// the channel, or the heartbeat times out.
    ///
    /// A heartbeat timeout is the one exit the transport did not ask
    /// for, and is reported as [`SessionError::ConnectionLost`] so the
    /// caller can tear the connection down.
    pub async fn run(
        mut self,
        mut inbound: mpsc::Receiver<InboundEvent>,
    ) -> Result<(), SessionError> {
        let mut heartbeat = interval_at(
            Instant::now() + self.heartbeat_interval,
            self.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_ack = Instant::now();
        let mut connection_lost = None;

        loop {
            tokio::select! {
                event = inbound.recv() => {
                    match event {
                        Some(event) => {
                            if !self.dispatch(event, &mut last_ack).await {
                                break;
                            }
                        }
                        None => {
                            tracing::info!(session_id = %self.session.id, "transport closed");
                            break;
                        }
                    }
                }
                _ = heartbeat.tick() => {
                    if last_ack.elapsed() > self.heartbeat_timeout {
                        tracing::warn!(
                            session_id = %self.session.id,
                            silent_secs = last_ack.elapsed().as_secs(),
                            "heartbeat timeout, closing session"
                        );
                        metrics::record_heartbeat_timeout();
                        connection_lost = Some(SessionError::ConnectionLost(format!(
                            "no heartbeat ack for {}s",
                            last_ack.elapsed().as_secs()
                        )));
                        break;
                    }
                    self.emit(OutboundEvent::Heartbeat).await;
                }
            }
        }

        // Ending releases buffered audio and suppresses any in-flight
        // result still racing toward the channel.
        if self.session.end() {
            self.coordinator.interrupt();
            self.segmenter.reset();
            self.emit(OutboundEvent::CallEnded).await;
            metrics::record_session_ended(self.session.uptime());
        }

        match connection_lost {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Handle one event. Returns false when the loop should stop.
    async fn dispatch(&mut self, event: InboundEvent, last_ack: &mut Instant) -> bool {
        match event {
            InboundEvent::CallStart => {
                if self.session.start() {
                    metrics::record_session_started();
                    let session_id = self.session.id;
                    self.emit(OutboundEvent::CallStarted { session_id }).await;
                }
                true
            }
            InboundEvent::CallEnd => {
                tracing::info!(session_id = %self.session.id, "call end requested");
                false
            }
            InboundEvent::AudioChunk {
                data,
                sequence_number,
                timestamp,
            } => {
                if !self.session.is_active() {
                    tracing::debug!(
                        session_id = %self.session.id,
                        sequence = sequence_number,
                        "dropping audio chunk outside active call"
                    );
                    return true;
                }
                self.session.touch();

                let chunk = AudioChunk::new(data, sequence_number, timestamp);
                let outcome = self.segmenter.ingest(chunk);

                self.emit(OutboundEvent::VadStatus {
                    is_speaking: outcome.decision.is_speech,
                    energy_level: outcome.decision.energy,
                    threshold: outcome.decision.threshold,
                })
                .await;

                if let Some(utterance) = outcome.utterance {
                    let handle = self.coordinator.begin();
                    self.submit(handle, utterance).await;
                }
                true
            }
            InboundEvent::AudioComplete { data, request_id } => {
                if !self.session.is_active() {
                    tracing::debug!(
                        session_id = %self.session.id,
                        request_id = %request_id,
                        "dropping direct submission outside active call"
                    );
                    return true;
                }
                self.session.touch();
                let handle = self.coordinator.begin_with_id(request_id);
                self.submit(handle, data).await;
                true
            }
            InboundEvent::Interrupt => {
                if self.coordinator.interrupt() {
                    self.emit(OutboundEvent::AiInterrupted).await;
                }
                true
            }
            InboundEvent::HeartbeatAck => {
                *last_ack = Instant::now();
                self.session.touch();
                true
            }
        }
    }

    /// Hand one drained utterance to the pipeline as a spawned task so
    /// ingestion of the next utterance proceeds immediately.
    async fn submit(&self, handle: RequestHandle, utterance: Vec<u8>) {
        tracing::info!(
            session_id = %self.session.id,
            request_id = %handle.id,
            bytes = utterance.len(),
            "submitting utterance"
        );
        self.emit(OutboundEvent::ProcessingStarted {
            request_id: handle.id,
        })
        .await;

        let coordinator = Arc::clone(&self.coordinator);
        let history = self.session.history();
        let outbound = self.outbound.clone();
        tokio::spawn(async move {
            coordinator.run(handle, utterance, history, outbound).await;
        });
    }

    async fn emit(&self, event: OutboundEvent) {
        if self.outbound.send(event).await.is_err() {
            tracing::warn!(session_id = %self.session.id, "outbound channel closed");
        }
    }
}

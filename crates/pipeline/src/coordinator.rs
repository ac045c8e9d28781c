//! Request coordinator: the transcribe/complete/synthesize pipeline
//!
//! One utterance becomes one request. At most one request is considered
//! current at a time; submitting a new one supersedes and cancels the
//! previous (last writer wins). Cancellation is cooperative: each stage
//! is raced against the request's [`CancelToken`] and the token is
//! re-checked at every stage boundary, so a superseded request stops at
//! the next boundary without emitting a response.

use std::io::BufWriter;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

use callstream_config::constants::{audio, pipeline};
use callstream_core::{
    CancelToken, ConversationHistory, LanguageModel, OutboundEvent, SpeechSynthesizer,
    SpeechToText, Turn,
};

use crate::PipelineError;

/// Identity and cancellation token for one in-flight request
#[derive(Debug, Clone)]
pub struct RequestHandle {
    pub id: Uuid,
    pub token: CancelToken,
}

/// Terminal state of one request
#[derive(Debug)]
pub enum RequestOutcome {
    /// Response streamed with synthesized audio
    Completed,
    /// Response streamed text-only after a synthesis failure
    TextOnly,
    /// Nothing intelligible was transcribed; the fallback reply was streamed
    EmptyTranscript,
    /// Cancelled by an interrupt or a newer request
    Superseded,
    /// A stage failed; a stream_error event was emitted
    Failed(PipelineError),
}

struct CurrentRequest {
    id: Uuid,
    token: CancelToken,
}

/// Runs requests through the STT -> LLM -> TTS pipeline with
/// last-writer-wins supersession.
pub struct RequestCoordinator {
    stt: Arc<dyn SpeechToText>,
    llm: Arc<dyn LanguageModel>,
    tts: Arc<dyn SpeechSynthesizer>,
    current: Mutex<Option<CurrentRequest>>,
}

impl RequestCoordinator {
    pub fn new(
        stt: Arc<dyn SpeechToText>,
        llm: Arc<dyn LanguageModel>,
        tts: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            stt,
            llm,
            tts,
            current: Mutex::new(None),
        }
    }

    /// Register a new request, cancelling any request already in flight.
    pub fn begin(&self) -> RequestHandle {
        self.register(Uuid::new_v4())
    }

    /// Register a request under a caller-supplied id, cancelling any
    /// request already in flight.
    pub fn begin_with_id(&self, id: Uuid) -> RequestHandle {
        self.register(id)
    }

    // Supersede-and-insert must happen under one lock acquisition so a
    // concurrent registration cannot slip in between.
    fn register(&self, id: Uuid) -> RequestHandle {
        let handle = RequestHandle {
            id,
            token: CancelToken::new(),
        };

        let mut current = self.current.lock();
        if let Some(previous) = current.take() {
            tracing::info!(
                superseded = %previous.id,
                request_id = %handle.id,
                "superseding in-flight request"
            );
            metrics::counter!("callstream_requests_superseded_total").increment(1);
            previous.token.cancel();
        }
        *current = Some(CurrentRequest {
            id: handle.id,
            token: handle.token.clone(),
        });

        handle
    }

    /// Cancel the in-flight request, if any. Returns whether a request
    /// was actually interrupted.
    pub fn interrupt(&self) -> bool {
        let mut current = self.current.lock();
        match current.take() {
            Some(req) => {
                tracing::info!(request_id = %req.id, "interrupting in-flight request");
                metrics::counter!("callstream_requests_interrupted_total").increment(1);
                req.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a request is currently in flight
    pub fn has_in_flight(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Execute the pipeline for one utterance.
    ///
    /// Emits `stream_response` or `stream_error` on `events` unless the
    /// request is superseded first. The conversation history is updated
    /// as stages complete, so a supersession mid-pipeline leaves turns
    /// from completed stages in place.
    pub async fn run(
        &self,
        handle: RequestHandle,
        utterance: Vec<u8>,
        history: Arc<Mutex<ConversationHistory>>,
        events: mpsc::Sender<OutboundEvent>,
    ) -> RequestOutcome {
        let started = Instant::now();
        let outcome = self
            .run_stages(&handle, utterance, history, &events)
            .await;

        match &outcome {
            RequestOutcome::Superseded => {}
            RequestOutcome::Failed(err) => {
                tracing::warn!(request_id = %handle.id, error = %err, "request failed");
                self.clear_if_current(handle.id);
            }
            _ => {
                metrics::histogram!("callstream_request_duration_seconds")
                    .record(started.elapsed().as_secs_f64());
                self.clear_if_current(handle.id);
            }
        }
        outcome
    }

    async fn run_stages(
        &self,
        handle: &RequestHandle,
        utterance: Vec<u8>,
        history: Arc<Mutex<ConversationHistory>>,
        events: &mpsc::Sender<OutboundEvent>,
    ) -> RequestOutcome {
        let token = &handle.token;

        // Stage 1: persist the utterance as WAV and transcribe it
        let wav = match persist_wav(&utterance) {
            Ok(wav) => wav,
            Err(err) => return self.fail(handle, err, events).await,
        };
        let transcript = match race(token, self.stt.transcribe(&wav)).await {
            None => return RequestOutcome::Superseded,
            Some(Err(err)) => return self.fail(handle, err.into(), events).await,
            Some(Ok(text)) => text,
        };
        drop(wav);

        // Stage 2: boundary check, then branch on an empty transcript
        if token.is_cancelled() {
            return RequestOutcome::Superseded;
        }
        let transcript = transcript.trim().to_owned();
        if transcript.is_empty() {
            return self.run_fallback(handle, history, events).await;
        }
        tracing::debug!(
            request_id = %handle.id,
            model = self.stt.model_name(),
            chars = transcript.len(),
            "transcription complete"
        );

        // Stage 3: record the user turn and generate a reply
        history.lock().push(Turn::user(&transcript));
        let turns = history.lock().turns().to_vec();
        let reply = match race(token, self.llm.complete(&turns)).await {
            None => return RequestOutcome::Superseded,
            Some(Err(err)) => return self.fail(handle, err.into(), events).await,
            Some(Ok(text)) => text,
        };

        // Stage 4: boundary check, then record the assistant turn
        if token.is_cancelled() {
            return RequestOutcome::Superseded;
        }
        history.lock().push(Turn::assistant(&reply));
        tracing::debug!(
            request_id = %handle.id,
            model = self.llm.model_name(),
            chars = reply.len(),
            "completion complete"
        );

        // Stage 5: synthesize; a failure here degrades to text-only
        let (audio_out, degraded) = match race(token, self.tts.synthesize(&reply)).await {
            None => return RequestOutcome::Superseded,
            Some(Err(err)) => {
                tracing::warn!(
                    request_id = %handle.id,
                    error = %err,
                    "synthesis failed, degrading to text-only response"
                );
                metrics::counter!("callstream_synthesis_failures_total").increment(1);
                (None, true)
            }
            Some(Ok(bytes)) => (Some(bytes), false),
        };
        if token.is_cancelled() {
            return RequestOutcome::Superseded;
        }

        // Stage 6: stream the response
        self.emit(
            events,
            OutboundEvent::StreamResponse {
                request_id: handle.id,
                transcription: transcript,
                reply,
                audio: audio_out,
            },
        )
        .await;
        metrics::counter!("callstream_requests_completed_total").increment(1);

        if degraded {
            RequestOutcome::TextOnly
        } else {
            RequestOutcome::Completed
        }
    }

    /// Empty-transcript path: no user turn is recorded and no completion
    /// is requested. The canned fallback is spoken so the caller gets an
    /// audible prompt instead of dead air.
    async fn run_fallback(
        &self,
        handle: &RequestHandle,
        history: Arc<Mutex<ConversationHistory>>,
        events: &mpsc::Sender<OutboundEvent>,
    ) -> RequestOutcome {
        let token = &handle.token;
        let reply = pipeline::FALLBACK_REPLY.to_owned();
        history.lock().push(Turn::assistant(&reply));

        let audio_out = match race(token, self.tts.synthesize(&reply)).await {
            None => return RequestOutcome::Superseded,
            Some(Err(err)) => {
                tracing::warn!(request_id = %handle.id, error = %err, "fallback synthesis failed");
                None
            }
            Some(Ok(bytes)) => Some(bytes),
        };
        if token.is_cancelled() {
            return RequestOutcome::Superseded;
        }

        self.emit(
            events,
            OutboundEvent::StreamResponse {
                request_id: handle.id,
                transcription: String::new(),
                reply,
                audio: audio_out,
            },
        )
        .await;
        metrics::counter!("callstream_empty_transcripts_total").increment(1);
        RequestOutcome::EmptyTranscript
    }

    async fn fail(
        &self,
        handle: &RequestHandle,
        err: PipelineError,
        events: &mpsc::Sender<OutboundEvent>,
    ) -> RequestOutcome {
        if !handle.token.is_cancelled() {
            self.emit(
                events,
                OutboundEvent::StreamError {
                    request_id: handle.id,
                    message: err.to_string(),
                },
            )
            .await;
        }
        metrics::counter!("callstream_requests_failed_total").increment(1);
        RequestOutcome::Failed(err)
    }

    async fn emit(&self, events: &mpsc::Sender<OutboundEvent>, event: OutboundEvent) {
        if events.send(event).await.is_err() {
            tracing::warn!("event channel closed, dropping outbound event");
        }
    }

    fn clear_if_current(&self, id: Uuid) {
        let mut current = self.current.lock();
        if current.as_ref().is_some_and(|req| req.id == id) {
            *current = None;
        }
    }
}

/// Race a collaborator call against the request's cancellation token.
/// Returns `None` when the token wins.
async fn race<T>(
    token: &CancelToken,
    fut: impl std::future::Future<Output = callstream_core::Result<T>>,
) -> Option<callstream_core::Result<T>> {
    tokio::select! {
        _ = token.cancelled() => None,
        result = fut => Some(result),
    }
}

/// Encode raw little-endian PCM16 as an in-memory 16 kHz mono WAV.
///
/// Transcription backends take container formats rather than raw
/// frames, so the utterance is wrapped before transcription.
fn persist_wav(utterance: &[u8]) -> Result<Vec<u8>, PipelineError> {
    if utterance.len() % 2 != 0 {
        return Err(PipelineError::MalformedAudio(format!(
            "odd PCM16 payload length {}",
            utterance.len()
        )));
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: audio::SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let file = tempfile::NamedTempFile::new()
        .map_err(|e| PipelineError::Persistence(e.to_string()))?;
    let writer_file = file
        .reopen()
        .map_err(|e| PipelineError::Persistence(e.to_string()))?;

    let mut writer = hound::WavWriter::new(BufWriter::new(writer_file), spec)
        .map_err(|e| PipelineError::Persistence(e.to_string()))?;
    for sample in utterance.chunks_exact(2) {
        writer
            .write_sample(i16::from_le_bytes([sample[0], sample[1]]))
            .map_err(|e| PipelineError::Persistence(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| PipelineError::Persistence(e.to_string()))?;

    std::fs::read(file.path()).map_err(|e| PipelineError::Persistence(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use callstream_core::{Error, Result};
    use tokio::sync::Notify;

    /// Canned collaborator result; the error side is just the message,
    /// wrapped into the right `Error` variant by each mock.
    type Scripted<T> = std::result::Result<T, String>;

    struct ScriptedStt(Scripted<String>);

    #[async_trait]
    impl SpeechToText for ScriptedStt {
        async fn transcribe(&self, _audio: &[u8]) -> Result<String> {
            self.0
                .clone()
                .map_err(Error::Transcription)
        }
        fn model_name(&self) -> &str {
            "scripted-stt"
        }
    }

    /// Never resolves; used to hold a request mid-stage
    struct StalledStt(Arc<Notify>);

    #[async_trait]
    impl SpeechToText for StalledStt {
        async fn transcribe(&self, _audio: &[u8]) -> Result<String> {
            self.0.notified().await;
            Ok("unreachable".into())
        }
        fn model_name(&self) -> &str {
            "stalled-stt"
        }
    }

    struct ScriptedLlm(Scripted<String>);

    #[async_trait]
    impl LanguageModel for ScriptedLlm {
        async fn complete(&self, _history: &[Turn]) -> Result<String> {
            self.0.clone().map_err(Error::Completion)
        }
        fn model_name(&self) -> &str {
            "scripted-llm"
        }
    }

    struct ScriptedTts(Scripted<Vec<u8>>);

    #[async_trait]
    impl SpeechSynthesizer for ScriptedTts {
        async fn synthesize(&self, _text: &str) -> Result<Vec<u8>> {
            self.0.clone().map_err(Error::Synthesis)
        }
        fn model_name(&self) -> &str {
            "scripted-tts"
        }
    }

    fn coordinator(
        stt: Scripted<String>,
        llm: Scripted<String>,
        tts: Scripted<Vec<u8>>,
    ) -> RequestCoordinator {
        RequestCoordinator::new(
            Arc::new(ScriptedStt(stt)),
            Arc::new(ScriptedLlm(llm)),
            Arc::new(ScriptedTts(tts)),
        )
    }

    fn history() -> Arc<Mutex<ConversationHistory>> {
        Arc::new(Mutex::new(ConversationHistory::default()))
    }

    #[tokio::test]
    async fn test_happy_path_streams_response_and_records_turns() {
        let coord = coordinator(
            Ok("hello there".into()),
            Ok("hi, how can I help?".into()),
            Ok(vec![1, 2, 3]),
        );
        let history = history();
        let (tx, mut rx) = mpsc::channel(8);

        let handle = coord.begin();
        let outcome = coord
            .run(handle.clone(), vec![0u8; 320], history.clone(), tx)
            .await;

        assert!(matches!(outcome, RequestOutcome::Completed));
        match rx.recv().await.unwrap() {
            OutboundEvent::StreamResponse {
                request_id,
                transcription,
                reply,
                audio,
            } => {
                assert_eq!(request_id, handle.id);
                assert_eq!(transcription, "hello there");
                assert_eq!(reply, "hi, how can I help?");
                assert_eq!(audio, Some(vec![1, 2, 3]));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let history = history.lock();
        assert_eq!(history.turn_count(), 2);
        assert_eq!(history.turns()[0].content, "hello there");
        assert_eq!(history.turns()[1].content, "hi, how can I help?");
        assert!(!coord.has_in_flight());
    }

    #[tokio::test]
    async fn test_new_request_supersedes_in_flight_one() {
        let gate = Arc::new(Notify::new());
        let coord = Arc::new(RequestCoordinator::new(
            Arc::new(StalledStt(gate)),
            Arc::new(ScriptedLlm(Ok("reply".into()))),
            Arc::new(ScriptedTts(Ok(vec![]))),
        ));
        let history = history();
        let (tx, mut rx) = mpsc::channel(8);

        let first = coord.begin();
        let task = tokio::spawn({
            let coord = coord.clone();
            let history = history.clone();
            let tx = tx.clone();
            async move { coord.run(first, vec![0u8; 320], history, tx).await }
        });
        tokio::task::yield_now().await;

        let second = coord.begin();
        let outcome = task.await.unwrap();

        assert!(matches!(outcome, RequestOutcome::Superseded));
        assert!(coord.has_in_flight());

        // The superseded request emitted nothing
        drop(tx);
        drop(second);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_interrupt_cancels_and_suppresses_response() {
        let gate = Arc::new(Notify::new());
        let coord = Arc::new(RequestCoordinator::new(
            Arc::new(StalledStt(gate)),
            Arc::new(ScriptedLlm(Ok("reply".into()))),
            Arc::new(ScriptedTts(Ok(vec![]))),
        ));
        let history = history();
        let (tx, mut rx) = mpsc::channel(8);

        let handle = coord.begin();
        let task = tokio::spawn({
            let coord = coord.clone();
            let history = history.clone();
            let tx = tx.clone();
            async move { coord.run(handle, vec![0u8; 320], history, tx).await }
        });
        tokio::task::yield_now().await;

        assert!(coord.interrupt());
        assert!(!coord.has_in_flight());
        assert!(!coord.interrupt(), "second interrupt finds nothing");

        let outcome = task.await.unwrap();
        assert!(matches!(outcome, RequestOutcome::Superseded));

        drop(tx);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_transcript_streams_spoken_fallback() {
        let coord = coordinator(
            Ok("   ".into()),
            Err("must not be called".into()),
            Ok(vec![9, 9]),
        );
        let history = history();
        let (tx, mut rx) = mpsc::channel(8);

        let handle = coord.begin();
        let outcome = coord
            .run(handle, vec![0u8; 320], history.clone(), tx)
            .await;

        assert!(matches!(outcome, RequestOutcome::EmptyTranscript));
        match rx.recv().await.unwrap() {
            OutboundEvent::StreamResponse {
                transcription,
                reply,
                audio,
                ..
            } => {
                assert_eq!(transcription, "");
                assert_eq!(reply, pipeline::FALLBACK_REPLY);
                assert_eq!(audio, Some(vec![9, 9]));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        // Only the fallback assistant turn is recorded
        let history = history.lock();
        assert_eq!(history.turn_count(), 1);
        assert_eq!(history.turns()[0].content, pipeline::FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn test_synthesis_failure_degrades_to_text_only() {
        let coord = coordinator(
            Ok("question".into()),
            Ok("answer".into()),
            Err("voice backend down".into()),
        );
        let history = history();
        let (tx, mut rx) = mpsc::channel(8);

        let handle = coord.begin();
        let outcome = coord.run(handle, vec![0u8; 320], history, tx).await;

        assert!(matches!(outcome, RequestOutcome::TextOnly));
        match rx.recv().await.unwrap() {
            OutboundEvent::StreamResponse { reply, audio, .. } => {
                assert_eq!(reply, "answer");
                assert_eq!(audio, None);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transcription_failure_emits_stream_error() {
        let coord = coordinator(
            Err("backend timeout".into()),
            Ok("reply".into()),
            Ok(vec![]),
        );
        let history = history();
        let (tx, mut rx) = mpsc::channel(8);

        let handle = coord.begin();
        let outcome = coord
            .run(handle.clone(), vec![0u8; 320], history.clone(), tx)
            .await;

        assert!(matches!(outcome, RequestOutcome::Failed(_)));
        match rx.recv().await.unwrap() {
            OutboundEvent::StreamError {
                request_id,
                message,
            } => {
                assert_eq!(request_id, handle.id);
                assert!(message.contains("backend timeout"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(history.lock().is_empty());
        assert!(!coord.has_in_flight());
    }

    #[tokio::test]
    async fn test_odd_length_payload_is_rejected() {
        let coord = coordinator(Ok("text".into()), Ok("reply".into()), Ok(vec![]));
        let (tx, _rx) = mpsc::channel(8);

        let handle = coord.begin();
        let outcome = coord.run(handle, vec![0u8; 321], history(), tx).await;
        assert!(matches!(
            outcome,
            RequestOutcome::Failed(PipelineError::MalformedAudio(_))
        ));
    }

    #[test]
    fn test_persist_wav_produces_valid_container() {
        let wav = persist_wav(&[0u8, 0, 255, 127]).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
    }

    #[test]
    fn test_begin_with_id_preserves_caller_id() {
        let coord = coordinator(Ok("t".into()), Ok("r".into()), Ok(vec![]));
        let id = Uuid::new_v4();
        let handle = coord.begin_with_id(id);
        assert_eq!(handle.id, id);
        assert!(coord.has_in_flight());
    }

    #[test]
    fn test_begin_with_id_supersedes_in_flight_request() {
        let coord = coordinator(Ok("t".into()), Ok("r".into()), Ok(vec![]));
        let first = coord.begin();
        let id = Uuid::new_v4();
        let second = coord.begin_with_id(id);
        assert!(first.token.is_cancelled());
        assert!(!second.token.is_cancelled());
        assert_eq!(second.id, id);
        assert!(coord.has_in_flight());
    }
}

//! Drives a full call session against mock AI services.
//!
//! Run with `cargo run --example simulated_call`. Streams a burst of
//! synthetic speech followed by silence, prints every outbound event,
//! then interrupts a second reply mid-flight.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

use callstream_config::constants::pipeline::EVENT_CHANNEL_CAPACITY;
use callstream_config::Settings;
use callstream_core::{
    InboundEvent, LanguageModel, OutboundEvent, Result, SpeechSynthesizer, SpeechToText, Turn,
};
use callstream_session::{init_metrics, init_tracing, SessionHandler};

struct MockStt;

#[async_trait]
impl SpeechToText for MockStt {
    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        tokio::time::sleep(Duration::from_millis(120)).await;
        Ok(format!("(transcript of {} bytes)", audio.len()))
    }
    fn model_name(&self) -> &str {
        "mock-stt"
    }
}

struct MockLlm;

#[async_trait]
impl LanguageModel for MockLlm {
    async fn complete(&self, history: &[Turn]) -> Result<String> {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(format!("Reply after {} turns of context.", history.len()))
    }
    fn model_name(&self) -> &str {
        "mock-llm"
    }
}

struct MockTts;

#[async_trait]
impl SpeechSynthesizer for MockTts {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        tokio::time::sleep(Duration::from_millis(150)).await;
        Ok(vec![0u8; text.len() * 64])
    }
    fn model_name(&self) -> &str {
        "mock-tts"
    }
}

/// 20 ms of a loud square wave as PCM16
fn speech_frame() -> Vec<u8> {
    let samples: Vec<f32> = (0..320)
        .map(|i| if (i / 8) % 2 == 0 { 0.5 } else { -0.5 })
        .collect();
    callstream_core::audio::f32_to_pcm16(&samples)
}

#[tokio::main]
async fn main() {
    let settings = Settings::default();
    init_tracing(&settings);
    init_metrics();

    let (in_tx, in_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let (out_tx, mut out_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

    let handler = SessionHandler::new(
        &settings,
        Arc::new(MockStt),
        Arc::new(MockLlm),
        Arc::new(MockTts),
        out_tx,
    );
    let session = handler.session();
    let driver = tokio::spawn(handler.run(in_rx));

    let printer = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            match &event {
                OutboundEvent::StreamResponse {
                    transcription,
                    reply,
                    audio,
                    ..
                } => println!(
                    ">> response: {transcription:?} -> {reply:?} ({} audio bytes)",
                    audio.as_ref().map_or(0, Vec::len)
                ),
                other => println!(">> {other:?}"),
            }
        }
    });

    in_tx.send(InboundEvent::CallStart).await.unwrap();

    // One spoken utterance: speech frames then trailing silence
    let mut sequence = 0u64;
    for _ in 0..4 {
        in_tx
            .send(InboundEvent::AudioChunk {
                data: speech_frame(),
                sequence_number: sequence,
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        sequence += 1;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    for _ in 0..4 {
        in_tx
            .send(InboundEvent::AudioChunk {
                data: vec![0u8; 640],
                sequence_number: sequence,
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
        sequence += 1;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    tokio::time::sleep(Duration::from_millis(600)).await;

    // Second utterance submitted directly, then interrupted mid-reply
    in_tx
        .send(InboundEvent::AudioComplete {
            data: speech_frame(),
            request_id: uuid::Uuid::new_v4(),
        })
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    in_tx.send(InboundEvent::Interrupt).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    in_tx.send(InboundEvent::CallEnd).await.unwrap();

    driver
        .await
        .expect("handler task panicked")
        .expect("session ended abnormally");
    drop(in_tx);
    printer.await.unwrap();

    println!("session {} finished", session.id);
}

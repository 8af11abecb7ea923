//! Integration tests for the stemsplit request pipeline
//!
//! These tests drive whole requests through the handler with an in-process
//! separation model and an in-memory object store.

use base64::Engine;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stemsplit::audio::Transcoder;
use stemsplit::config::Settings;
use stemsplit::delivery::{DeliveryResult, ObjectStore, StorageBackend};
use stemsplit::pipeline::{Handler, Outcome, SeparationRequest};
use stemsplit::separation::{ModelLoader, SeparationContext, StemModel};
use stemsplit::{Bitrate, DeliveryMode, StemCount, StemsplitError, StereoBuffer, TranscodeError};
use tempfile::TempDir;

// =============================================================================
// Test doubles
// =============================================================================

/// Splits the mixture into equal-gain copies, one per stem
struct GainSplitModel {
    stems: usize,
}

impl StemModel for GainSplitModel {
    fn separate(&self, audio: &StereoBuffer) -> stemsplit::Result<Vec<StereoBuffer>> {
        let gain = 1.0 / self.stems as f32;
        Ok((0..self.stems).map(|_| audio.scaled(gain)).collect())
    }

    fn name(&self) -> &str {
        "gain-split"
    }
}

/// Counts how often a model is instantiated
#[derive(Clone, Default)]
struct CountingLoader {
    loads: Arc<AtomicUsize>,
}

impl ModelLoader for CountingLoader {
    fn load(&self, stems: StemCount) -> stemsplit::Result<Box<dyn StemModel>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(GainSplitModel {
            stems: stems.count() as usize,
        }))
    }
}

struct MissingWeightsLoader;

impl ModelLoader for MissingWeightsLoader {
    fn load(&self, stems: StemCount) -> stemsplit::Result<Box<dyn StemModel>> {
        Err(StemsplitError::model_load(stems.count(), "weights not found"))
    }
}

/// Emits one byte per kbps, failing for audio that contains a marker sample
struct FlakyTranscoder {
    fail_for_samples_scaled_by: Option<f32>,
}

impl Transcoder for FlakyTranscoder {
    fn transcode(
        &self,
        audio: &StereoBuffer,
        bitrate: Bitrate,
    ) -> Result<Vec<u8>, TranscodeError> {
        if let Some(marker) = self.fail_for_samples_scaled_by {
            if audio.left.iter().any(|s| (*s - marker).abs() < 1e-4) {
                return Err(TranscodeError::Encode("synthetic failure".to_string()));
            }
        }
        Ok(vec![0xFF; bitrate.kbps() as usize])
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

/// Object store that keeps uploads in memory
#[derive(Default)]
struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
    puts: AtomicUsize,
}

impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        "memory-bucket"
    }

    fn put(&self, key: &str, body: Vec<u8>, _content_type: &str) -> stemsplit::Result<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().insert(key.to_string(), body);
        Ok(())
    }

    fn presign_get(&self, key: &str, expires_in: Duration) -> stemsplit::Result<String> {
        Ok(format!(
            "https://memory-bucket.example/{}?expires={}",
            key,
            expires_in.as_secs()
        ))
    }
}

/// Store whose uploads always fail
struct RejectingStore {
    presigns: AtomicUsize,
}

impl ObjectStore for RejectingStore {
    fn bucket(&self) -> &str {
        "rejecting-bucket"
    }

    fn put(&self, key: &str, _body: Vec<u8>, _content_type: &str) -> stemsplit::Result<()> {
        Err(StemsplitError::upload(format!("AccessDenied writing {}", key)))
    }

    fn presign_get(&self, key: &str, _expires_in: Duration) -> stemsplit::Result<String> {
        self.presigns.fetch_add(1, Ordering::SeqCst);
        Ok(format!("https://rejecting-bucket.example/{}", key))
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Generate a mono 16-bit sine wave WAV file in memory
///
/// The period is a whole number of samples so the signal repeats exactly.
fn sine_wav_bytes(period_samples: usize, duration_secs: f32, sample_rate: u32) -> Vec<u8> {
    use std::f32::consts::PI;

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut bytes = Vec::new();
    {
        let mut writer =
            hound::WavWriter::new(Cursor::new(&mut bytes), spec).expect("Failed to create WAV");
        let num_samples = (duration_secs * sample_rate as f32) as usize;
        let amplitude = 0.5f32; // 50% amplitude to avoid clipping

        for i in 0..num_samples {
            let phase = (i % period_samples) as f32 / period_samples as f32;
            let sample = (2.0 * PI * phase).sin() * amplitude;
            writer
                .write_sample((sample * 32767.0) as i16)
                .expect("Failed to write sample");
        }
        writer.finalize().expect("Failed to finalize WAV");
    }
    bytes
}

/// Generate a WAV holding a single constant value, used as a stem marker
fn constant_wav_bytes(value: i16, frames: usize) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 44100,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut bytes = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
        for _ in 0..frames {
            writer.write_sample(value).unwrap();
        }
        writer.finalize().unwrap();
    }
    bytes
}

fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn short_clip() -> String {
    b64(&sine_wav_bytes(100, 0.5, 44100))
}

struct Harness {
    scratch: TempDir,
    loads: Arc<AtomicUsize>,
    store: Arc<MemoryStore>,
    handler: Handler,
}

impl Harness {
    fn new() -> Self {
        Self::build(
            |_| {},
            Box::new(FlakyTranscoder {
                fail_for_samples_scaled_by: None,
            }),
        )
    }

    fn build(tweak: impl FnOnce(&mut Settings), transcoder: Box<dyn Transcoder>) -> Self {
        let scratch = TempDir::new().unwrap();
        let mut settings = Settings {
            scratch_dir: scratch.path().join("work"),
            ..Settings::default()
        };
        tweak(&mut settings);

        let loader = CountingLoader::default();
        let loads = Arc::clone(&loader.loads);
        let store = Arc::new(MemoryStore::default());

        let handler = Handler::new(
            settings,
            SeparationContext::new(Box::new(loader)),
            transcoder,
            StorageBackend::Configured(store.clone() as Arc<dyn ObjectStore>),
        );

        Self {
            scratch,
            loads,
            store,
            handler,
        }
    }

    fn handle(&self, event: Value) -> Value {
        self.handler.handle(&event).to_json()
    }

    /// Assert no request left anything behind in the scratch root
    fn assert_scratch_empty(&self) {
        let work = self.scratch.path().join("work");
        if work.exists() {
            let leftovers: Vec<_> = fs::read_dir(&work)
                .unwrap()
                .map(|e| e.unwrap().path())
                .collect();
            assert!(leftovers.is_empty(), "leftover files: {:?}", leftovers);
        }
    }
}

fn file_names(response: &Value) -> Vec<String> {
    response["files"]
        .as_array()
        .expect("files array")
        .iter()
        .map(|f| f["name"].as_str().unwrap().to_string())
        .collect()
}

fn open_zip(response: &Value) -> zip::ZipArchive<Cursor<Vec<u8>>> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(response["zip_base64"].as_str().expect("zip_base64"))
        .unwrap();
    zip::ZipArchive::new(Cursor::new(bytes)).unwrap()
}

// =============================================================================
// Tests
// =============================================================================

#[test]
fn test_stem_names_for_each_count() {
    let harness = Harness::new();
    let expected: [(i64, &[&str]); 3] = [
        (2, &["vocals.wav", "accompaniment.wav"]),
        (4, &["vocals.wav", "drums.wav", "bass.wav", "other.wav"]),
        (5, &["vocals.wav", "drums.wav", "bass.wav", "piano.wav", "other.wav"]),
    ];

    for (stems, names) in expected {
        let response = harness.handle(json!({
            "audio_base64": short_clip(),
            "stems": stems,
            "format": "wav"
        }));
        assert!(response.get("error").is_none(), "{}", response);
        assert_eq!(file_names(&response), names);
        assert_eq!(response["stems"], stems);
    }

    // One model per stem count
    assert_eq!(harness.loads.load(Ordering::SeqCst), 3);
    harness.assert_scratch_empty();
}

#[test]
fn test_unsupported_stem_count_never_reaches_separator() {
    let harness = Harness::new();
    for stems in [json!(1), json!(3), json!(6), json!("all")] {
        let response = harness.handle(json!({
            "audio_base64": short_clip(),
            "stems": stems
        }));
        assert!(response["error"].as_str().unwrap().contains("stem count"));
    }
    assert_eq!(harness.loads.load(Ordering::SeqCst), 0);
    harness.assert_scratch_empty();
}

#[test]
fn test_model_loaded_once_across_requests() {
    let harness = Harness::new();
    for _ in 0..3 {
        let response = harness.handle(json!({ "audio_base64": short_clip(), "stems": 2 }));
        assert!(response.get("error").is_none(), "{}", response);
    }
    assert_eq!(harness.loads.load(Ordering::SeqCst), 1);
}

#[test]
fn test_manifest_matches_archive_contents() {
    let harness = Harness::new();
    let request = SeparationRequest::from_event(
        &json!({ "audio_base64": short_clip(), "stems": 4, "format": "wav" }),
        DeliveryMode::Inline,
    )
    .unwrap();

    let delivered = match harness.handler.process(&request) {
        Outcome::Delivered(d) => d,
        other => panic!("expected delivery, got {:?}", other),
    };
    assert_eq!(delivered.manifest.len(), 4);

    let payload = match &delivered.delivery {
        DeliveryResult::Inline { payload } => payload.clone(),
        other => panic!("expected inline, got {:?}", other),
    };
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .unwrap();
    assert_eq!(bytes.len() as u64, delivered.size_bytes);

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    assert_eq!(archive.len(), delivered.manifest.len());
    for entry in delivered.manifest.entries() {
        let mut file = archive.by_name(&entry.name).unwrap();
        let mut contents = Vec::new();
        file.read_to_end(&mut contents).unwrap();
        assert_eq!(contents.len() as u64, entry.size_bytes, "{}", entry.name);
        assert_eq!(&contents[0..4], b"RIFF");
    }
    harness.assert_scratch_empty();
}

#[test]
fn test_thirty_second_wav_two_stems() {
    let harness = Harness::new();
    let audio = sine_wav_bytes(100, 30.0, 44100);

    let response = harness.handle(json!({
        "input": {
            "audio_base64": b64(&audio),
            "stems": 2,
            "format": "wav"
        }
    }));

    assert!(response.get("error").is_none(), "{}", response);
    assert_eq!(file_names(&response), ["vocals.wav", "accompaniment.wav"]);
    assert_eq!(response["format"], "wav");
    assert!(response["size_mb"].as_f64().unwrap() < 10.0);

    let mut archive = open_zip(&response);
    let mut vocals = Vec::new();
    archive
        .by_name("vocals.wav")
        .unwrap()
        .read_to_end(&mut vocals)
        .unwrap();
    let reader = hound::WavReader::new(Cursor::new(vocals)).unwrap();
    assert_eq!(reader.spec().channels, 2);
    assert_eq!(reader.spec().sample_rate, 44100);
    assert_eq!(reader.duration(), 30 * 44100);

    harness.assert_scratch_empty();
}

#[test]
fn test_oversized_archive_is_rejected_with_suggestions() {
    let harness = Harness::build(
        |s| s.inline_limit_bytes = 64,
        Box::new(FlakyTranscoder {
            fail_for_samples_scaled_by: None,
        }),
    );

    let response = harness.handle(json!({
        "audio_base64": short_clip(),
        "stems": 5,
        "format": "wav"
    }));

    assert!(response["error"].as_str().unwrap().contains("limit"));
    assert!(response.get("zip_base64").is_none());
    assert!(response.get("download_url").is_none());
    let suggestions = response["suggestions"].as_array().unwrap();
    assert!(!suggestions.is_empty());
    assert_eq!(file_names(&response).len(), 5);
    assert!(response["size_mb"].as_f64().unwrap() > 0.0);

    harness.assert_scratch_empty();
}

#[test]
fn test_oversized_remote_archive_is_not_uploaded() {
    let harness = Harness::build(
        |s| s.remote_limit_bytes = 64,
        Box::new(FlakyTranscoder {
            fail_for_samples_scaled_by: None,
        }),
    );

    let response = harness.handle(json!({
        "audio_base64": short_clip(),
        "stems": 2,
        "format": "wav",
        "delivery": "s3"
    }));

    assert!(!response["suggestions"].as_array().unwrap().is_empty());
    assert_eq!(harness.store.puts.load(Ordering::SeqCst), 0);
    harness.assert_scratch_empty();
}

#[test]
fn test_failed_transcode_keeps_wav() {
    // 0.5 full scale, halved by the 2-stem gain, marks every stem
    let marker_i16 = 16384i16;
    let marker = (marker_i16 as f32 / 32768.0) * 0.5;
    let harness = Harness::build(
        |_| {},
        Box::new(FlakyTranscoder {
            fail_for_samples_scaled_by: Some(marker),
        }),
    );

    let response = harness.handle(json!({
        "audio_base64": b64(&constant_wav_bytes(marker_i16, 4410)),
        "stems": 2,
        "format": "mp3"
    }));

    assert!(response.get("error").is_none(), "{}", response);
    assert_eq!(file_names(&response), ["vocals.wav", "accompaniment.wav"]);
    assert_eq!(response["format"], "mp3");
    harness.assert_scratch_empty();
}

#[test]
fn test_mp3_entries_use_converted_names() {
    let harness = Harness::new();
    let response = harness.handle(json!({
        "audio_base64": short_clip(),
        "stems": 2,
        "format": "mp3",
        "bitrate": "320k"
    }));

    assert!(response.get("error").is_none(), "{}", response);
    assert_eq!(file_names(&response), ["vocals.mp3", "accompaniment.mp3"]);
    assert_eq!(response["bitrate"], "320k");

    let mut archive = open_zip(&response);
    let entry = archive.by_name("vocals.mp3").unwrap();
    assert_eq!(entry.size(), 320);
    assert_eq!(entry.compression(), zip::CompressionMethod::Stored);
}

#[test]
fn test_remote_delivery_uploads_and_signs() {
    let harness = Harness::new();
    let before = chrono::Utc::now();

    let response = harness.handle(json!({
        "audio_base64": short_clip(),
        "stems": 2,
        "delivery": "s3",
        "expire_hours": 1,
        "id": "job-7"
    }));

    assert!(response.get("error").is_none(), "{}", response);
    assert!(response.get("zip_base64").is_none());
    assert_eq!(response["s3_bucket"], "memory-bucket");

    let key = response["s3_key"].as_str().unwrap();
    assert!(key.starts_with("stems/") && key.ends_with("_job-7.zip"), "{}", key);
    assert!(response["download_url"].as_str().unwrap().contains("expires=3600"));

    let expires_at =
        chrono::DateTime::parse_from_rfc3339(response["expires_at"].as_str().unwrap()).unwrap();
    let delta = (expires_at.with_timezone(&chrono::Utc) - before).num_seconds();
    assert!((3595..=3660).contains(&delta), "expiry delta {}", delta);

    let objects = harness.store.objects.lock().unwrap();
    let uploaded = objects.get(key).expect("archive uploaded under key");
    let archive = zip::ZipArchive::new(Cursor::new(uploaded.clone())).unwrap();
    assert_eq!(archive.len(), 2);
    drop(objects);

    harness.assert_scratch_empty();
}

#[test]
fn test_remote_without_storage_is_config_error() {
    let scratch = TempDir::new().unwrap();
    let settings = Settings {
        scratch_dir: scratch.path().to_path_buf(),
        ..Settings::default()
    };
    let loader = CountingLoader::default();
    let loads = Arc::clone(&loader.loads);
    let handler = Handler::new(
        settings,
        SeparationContext::new(Box::new(loader)),
        Box::new(FlakyTranscoder {
            fail_for_samples_scaled_by: None,
        }),
        StorageBackend::Unavailable("No bucket configured".to_string()),
    );

    let response = handler
        .handle(&json!({ "audio_base64": short_clip(), "delivery": "s3" }))
        .to_json();

    let error = response["error"].as_str().unwrap();
    assert!(error.contains("not configured"), "{}", error);
    assert!(response.get("download_url").is_none());
    assert_eq!(loads.load(Ordering::SeqCst), 0);
    assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[test]
fn test_failed_upload_is_reported_and_cleaned_up() {
    let scratch = TempDir::new().unwrap();
    let store = Arc::new(RejectingStore {
        presigns: AtomicUsize::new(0),
    });
    let handler = Handler::new(
        Settings {
            scratch_dir: scratch.path().to_path_buf(),
            ..Settings::default()
        },
        SeparationContext::new(Box::new(CountingLoader::default())),
        Box::new(FlakyTranscoder {
            fail_for_samples_scaled_by: None,
        }),
        StorageBackend::Configured(Arc::clone(&store) as Arc<dyn ObjectStore>),
    );

    let response = handler
        .handle(&json!({ "audio_base64": short_clip(), "stems": 2, "delivery": "s3" }))
        .to_json();

    let error = response["error"].as_str().unwrap();
    assert!(error.starts_with("Upload failed"), "{}", error);
    assert!(error.contains("AccessDenied"), "{}", error);
    assert!(response.get("download_url").is_none());
    assert!(response.get("zip_base64").is_none());
    assert_eq!(store.presigns.load(Ordering::SeqCst), 0);
    assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[test]
fn test_model_load_failure_is_reported() {
    let scratch = TempDir::new().unwrap();
    let handler = Handler::new(
        Settings {
            scratch_dir: scratch.path().to_path_buf(),
            ..Settings::default()
        },
        SeparationContext::new(Box::new(MissingWeightsLoader)),
        Box::new(FlakyTranscoder {
            fail_for_samples_scaled_by: None,
        }),
        StorageBackend::Unavailable("unused".to_string()),
    );

    let response = handler
        .handle(&json!({ "audio_base64": short_clip(), "stems": 4 }))
        .to_json();

    assert!(response["error"].as_str().unwrap().contains("weights not found"));
    assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[test]
fn test_corrupt_audio_cleans_up() {
    let harness = Harness::new();
    let response = harness.handle(json!({
        "audio_base64": b64(b"definitely not an audio file"),
        "stems": 2
    }));

    assert!(response["error"].as_str().unwrap().contains("Separation failed"));
    harness.assert_scratch_empty();
}

#[test]
fn test_scratch_root_is_created_on_demand() {
    let harness = Harness::new();
    assert!(!harness.scratch.path().join("work").exists());

    let response = harness.handle(json!({ "audio_base64": short_clip(), "stems": 2 }));
    assert!(response.get("error").is_none(), "{}", response);
    assert!(harness.scratch.path().join("work").is_dir());
    harness.assert_scratch_empty();
}

//! Request parsing and validation

use crate::config::settings::{DEFAULT_EXPIRE_HOURS, MAX_EXPIRE_HOURS};
use crate::error::{Result, StemsplitError};
use crate::types::{Bitrate, DeliveryMode, OutputFormat, StemCount};
use base64::Engine;
use serde::Deserialize;
use serde_json::Value;

/// Stem count used when a request does not name one
pub const DEFAULT_STEMS: StemCount = StemCount::Five;

/// Output format used when a request does not name one
pub const DEFAULT_FORMAT: OutputFormat = OutputFormat::Mp3;

/// Longest accepted correlation id
const MAX_ID_LEN: usize = 64;

/// Request body as it arrives on the wire
///
/// Everything is loosely typed here so that bad values produce a
/// validation message instead of a serde error.
#[derive(Debug, Default, Deserialize)]
pub struct RawRequest {
    #[serde(default)]
    pub audio_base64: Option<String>,
    #[serde(default)]
    pub stems: Option<Value>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub bitrate: Option<String>,
    #[serde(default)]
    pub delivery: Option<String>,
    #[serde(default)]
    pub expire_hours: Option<Value>,
    #[serde(default)]
    pub id: Option<Value>,
}

impl RawRequest {
    /// Parse a request event, unwrapping a serverless `{"input": {...}}` envelope
    pub fn from_event(event: &Value) -> Result<Self> {
        let body = match event.get("input") {
            Some(inner) if inner.is_object() => inner,
            Some(_) => {
                return Err(StemsplitError::validation("'input' must be a JSON object"));
            }
            None => event,
        };

        if !body.is_object() {
            return Err(StemsplitError::validation("Request must be a JSON object"));
        }

        serde_json::from_value(body.clone())
            .map_err(|e| StemsplitError::validation(format!("Malformed request: {}", e)))
    }

    /// Validate every field and build an immutable [`SeparationRequest`]
    pub fn validate(self, default_delivery: DeliveryMode) -> Result<SeparationRequest> {
        let encoded = self
            .audio_base64
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| StemsplitError::validation("Missing required field 'audio_base64'"))?;

        let stems = match self.stems {
            None | Some(Value::Null) => DEFAULT_STEMS,
            Some(value) => parse_stems(&value)?,
        };

        let format = match self.format {
            None => DEFAULT_FORMAT,
            Some(f) => OutputFormat::parse(&f).ok_or_else(|| {
                StemsplitError::validation(format!(
                    "Unsupported format '{}', expected 'mp3' or 'wav'",
                    f
                ))
            })?,
        };

        let bitrate = match self.bitrate {
            None => Bitrate::default(),
            Some(b) => Bitrate::parse(&b).ok_or_else(|| {
                let allowed: Vec<_> = Bitrate::ALL.iter().map(|b| b.as_str()).collect();
                StemsplitError::validation(format!(
                    "Unsupported bitrate '{}', expected one of {}",
                    b,
                    allowed.join(", ")
                ))
            })?,
        };

        let delivery = match self.delivery {
            None => default_delivery,
            Some(d) => DeliveryMode::parse(&d).ok_or_else(|| {
                StemsplitError::validation(format!(
                    "Unsupported delivery '{}', expected 'inline' or 's3'",
                    d
                ))
            })?,
        };

        let expire_hours = match self.expire_hours {
            None | Some(Value::Null) => DEFAULT_EXPIRE_HOURS,
            Some(value) => parse_expire_hours(&value)?,
        };

        let id = match self.id {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(_) => {
                return Err(StemsplitError::validation("'id' must be a string"));
            }
        }
        .and_then(|raw| sanitize_id(&raw))
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let audio = decode_audio(&encoded)?;

        Ok(SeparationRequest {
            audio,
            stems,
            format,
            bitrate,
            delivery,
            expire_hours,
            id,
        })
    }
}

/// A validated separation request
#[derive(Debug, Clone)]
pub struct SeparationRequest {
    /// Raw encoded audio file bytes
    pub audio: Vec<u8>,
    pub stems: StemCount,
    pub format: OutputFormat,
    pub bitrate: Bitrate,
    pub delivery: DeliveryMode,
    /// Signed link lifetime; only used for remote delivery
    pub expire_hours: f64,
    /// Correlation id, safe to embed in a storage key
    pub id: String,
}

impl SeparationRequest {
    /// Parse and validate a request event
    pub fn from_event(event: &Value, default_delivery: DeliveryMode) -> Result<Self> {
        RawRequest::from_event(event)?.validate(default_delivery)
    }
}

fn parse_stems(value: &Value) -> Result<StemCount> {
    let count = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    count.and_then(StemCount::from_count).ok_or_else(|| {
        StemsplitError::validation(format!(
            "Unsupported stem count {}, expected 2, 4 or 5",
            value
        ))
    })
}

fn parse_expire_hours(value: &Value) -> Result<f64> {
    let hours = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| StemsplitError::validation("'expire_hours' must be a number"))?;

    if !(hours.is_finite() && hours > 0.0 && hours <= MAX_EXPIRE_HOURS) {
        return Err(StemsplitError::validation(format!(
            "'expire_hours' must be in (0, {}], got {}",
            MAX_EXPIRE_HOURS, hours
        )));
    }
    Ok(hours)
}

fn decode_audio(encoded: &str) -> Result<Vec<u8>> {
    // Tolerate data URLs and line-wrapped payloads
    let payload = encoded
        .split_once("base64,")
        .map(|(_, rest)| rest)
        .unwrap_or(encoded);
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();

    let audio = base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| StemsplitError::validation(format!("'audio_base64' is not valid base64: {}", e)))?;

    if audio.is_empty() {
        return Err(StemsplitError::validation("'audio_base64' decodes to no data"));
    }
    Ok(audio)
}

/// Keep only characters that are safe in an object key
fn sanitize_id(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .take(MAX_ID_LEN)
        .collect();
    let cleaned = cleaned.trim_matches('.').to_string();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

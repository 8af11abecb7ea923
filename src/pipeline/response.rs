//! Wire responses

use super::orchestrator::Outcome;
use crate::archive::{round2, ArchiveManifest};
use crate::delivery::DeliveryResult;
use crate::error::StemsplitError;
use serde::Serialize;

/// One archive entry in a response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub size_kb: f64,
}

fn files(manifest: &ArchiveManifest) -> Vec<FileEntry> {
    manifest
        .entries()
        .iter()
        .map(|e| FileEntry {
            name: e.name.clone(),
            size_kb: e.size_kb(),
        })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineResponse {
    pub zip_base64: String,
    pub format: String,
    pub bitrate: String,
    pub stems: u8,
    pub size_mb: f64,
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RemoteResponse {
    pub download_url: String,
    pub s3_key: String,
    pub s3_bucket: String,
    pub expires_at: String,
    pub format: String,
    pub bitrate: String,
    pub stems: u8,
    pub size_mb: f64,
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SizeExceededResponse {
    pub error: String,
    pub size_mb: f64,
    pub limit_mb: f64,
    pub files: Vec<FileEntry>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Response body returned to the caller
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Response {
    Inline(InlineResponse),
    Remote(RemoteResponse),
    SizeExceeded(SizeExceededResponse),
    Error(ErrorResponse),
}

impl Response {
    pub fn error(err: &StemsplitError) -> Self {
        Response::Error(ErrorResponse {
            error: err.to_string(),
        })
    }

    /// True if the archive was delivered
    pub fn is_success(&self) -> bool {
        matches!(self, Response::Inline(_) | Response::Remote(_))
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self)
            .unwrap_or_else(|e| serde_json::json!({ "error": format!("Failed to serialize response: {}", e) }))
    }
}

impl From<Outcome> for Response {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Delivered(d) => {
                let size_mb = round2(d.size_bytes as f64 / (1024.0 * 1024.0));
                let format = d.format.extension().to_string();
                let bitrate = d.bitrate.as_str().to_string();
                let stems = d.stems.count();
                let files = files(&d.manifest);
                let expires_at = d.delivery.expires_at_iso();

                match d.delivery {
                    DeliveryResult::Inline { payload } => Response::Inline(InlineResponse {
                        zip_base64: payload,
                        format,
                        bitrate,
                        stems,
                        size_mb,
                        files,
                    }),
                    DeliveryResult::Remote {
                        url, key, bucket, ..
                    } => Response::Remote(RemoteResponse {
                        download_url: url,
                        s3_key: key,
                        s3_bucket: bucket,
                        expires_at: expires_at.unwrap_or_default(),
                        format,
                        bitrate,
                        stems,
                        size_mb,
                        files,
                    }),
                }
            }
            Outcome::Rejected(r) => Response::SizeExceeded(SizeExceededResponse {
                error: format!(
                    "Archive is {:.2} MB, over the {:.2} MB limit for {} delivery",
                    r.rejection.actual_mb, r.rejection.limit_mb, r.delivery
                ),
                size_mb: r.rejection.actual_mb,
                limit_mb: r.rejection.limit_mb,
                files: files(&r.manifest),
                suggestions: r.rejection.suggestions,
            }),
            Outcome::Failed(err) => Response::error(&err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::orchestrator::{Delivered, Rejected};
    use crate::policy::SizeRejection;
    use crate::types::{Bitrate, DeliveryMode, OutputFormat, StemCount};
    use chrono::{TimeZone, Utc};

    fn manifest() -> ArchiveManifest {
        let dir = tempfile::TempDir::new().unwrap();
        let mut builder = crate::archive::ArchiveBuilder::create(&dir.path().join("a.zip")).unwrap();
        builder.add_entry("vocals.mp3", &[0u8; 2048]).unwrap();
        builder.finalize().unwrap().1
    }

    #[test]
    fn test_inline_shape() {
        let response = Response::from(Outcome::Delivered(Delivered {
            delivery: DeliveryResult::Inline {
                payload: "UEsDBA==".to_string(),
            },
            manifest: manifest(),
            size_bytes: 3 * 1024 * 1024 / 2,
            format: OutputFormat::Mp3,
            bitrate: Bitrate::Kbps192,
            stems: StemCount::Two,
        }));
        assert!(response.is_success());

        let json = response.to_json();
        assert_eq!(json["zip_base64"], "UEsDBA==");
        assert_eq!(json["format"], "mp3");
        assert_eq!(json["bitrate"], "192k");
        assert_eq!(json["stems"], 2);
        assert_eq!(json["size_mb"], 1.5);
        assert_eq!(json["files"][0]["name"], "vocals.mp3");
        assert_eq!(json["files"][0]["size_kb"], 2.0);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_remote_shape() {
        let response = Response::from(Outcome::Delivered(Delivered {
            delivery: DeliveryResult::Remote {
                url: "https://b.example/k".to_string(),
                key: "stems/k.zip".to_string(),
                bucket: "b".to_string(),
                expires_at: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            },
            manifest: manifest(),
            size_bytes: 1024,
            format: OutputFormat::Wav,
            bitrate: Bitrate::Kbps128,
            stems: StemCount::Four,
        }));

        let json = response.to_json();
        assert_eq!(json["download_url"], "https://b.example/k");
        assert_eq!(json["s3_key"], "stems/k.zip");
        assert_eq!(json["s3_bucket"], "b");
        assert_eq!(json["expires_at"], "2024-01-02T03:04:05Z");
        assert!(json.get("zip_base64").is_none());
    }

    #[test]
    fn test_size_exceeded_shape() {
        let response = Response::from(Outcome::Rejected(Rejected {
            rejection: SizeRejection {
                actual_mb: 12.5,
                limit_mb: 10.0,
                suggestions: vec!["Use a shorter audio clip".to_string()],
            },
            manifest: manifest(),
            delivery: DeliveryMode::Inline,
        }));
        assert!(!response.is_success());

        let json = response.to_json();
        assert!(json["error"].as_str().unwrap().contains("12.50 MB"));
        assert_eq!(json["size_mb"], 12.5);
        assert_eq!(json["suggestions"].as_array().unwrap().len(), 1);
        assert!(json.get("zip_base64").is_none());
        assert!(json.get("download_url").is_none());
    }

    #[test]
    fn test_error_shape() {
        let response = Response::from(Outcome::Failed(StemsplitError::validation("bad stems")));
        let json = response.to_json();
        assert_eq!(json.as_object().unwrap().len(), 1);
        assert!(json["error"].as_str().unwrap().contains("bad stems"));
    }
}

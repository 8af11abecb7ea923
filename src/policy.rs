//! Archive size gate
//!
//! An oversized archive is a business outcome, not an error: the caller
//! gets the manifest plus suggestions for making the next request fit.

use crate::archive::round2;
use crate::pipeline::SeparationRequest;
use crate::types::{Bitrate, DeliveryMode, OutputFormat, StemCount};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Result of checking an archive against the limit
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Accepted,
    Rejected(SizeRejection),
}

/// Diagnostic for an archive over the limit
#[derive(Debug, Clone, PartialEq)]
pub struct SizeRejection {
    pub actual_mb: f64,
    pub limit_mb: f64,
    /// Never empty
    pub suggestions: Vec<String>,
}

/// Maximum archive size for one delivery mode
#[derive(Debug, Clone, Copy)]
pub struct SizePolicy {
    limit_bytes: u64,
}

impl SizePolicy {
    pub fn new(limit_bytes: u64) -> Self {
        Self { limit_bytes }
    }

    pub fn limit_bytes(&self) -> u64 {
        self.limit_bytes
    }

    /// Check an archive size against the limit
    pub fn check(&self, size_bytes: u64, request: &SeparationRequest) -> GateDecision {
        if size_bytes <= self.limit_bytes {
            return GateDecision::Accepted;
        }

        GateDecision::Rejected(SizeRejection {
            actual_mb: round2(size_bytes as f64 / BYTES_PER_MB),
            limit_mb: round2(self.limit_bytes as f64 / BYTES_PER_MB),
            suggestions: suggestions_for(request),
        })
    }
}

/// Remediation hints that could make this request fit
fn suggestions_for(request: &SeparationRequest) -> Vec<String> {
    let mut suggestions = vec!["Use a shorter audio clip".to_string()];

    if request.format == OutputFormat::Wav {
        suggestions.push("Use format 'mp3' instead of 'wav'".to_string());
    } else if request.bitrate > Bitrate::Kbps128 {
        suggestions.push(format!(
            "Use a lower bitrate (current {}, try {})",
            request.bitrate.as_str(),
            Bitrate::Kbps128.as_str()
        ));
    }

    if request.stems != StemCount::Two {
        suggestions.push(format!(
            "Request fewer stems (current {}, try 2)",
            request.stems.count()
        ));
    }

    if request.delivery == DeliveryMode::Inline {
        suggestions.push("Use delivery 's3' to receive a download link instead".to_string());
    }

    suggestions
}

//! Duration estimates from transcript text.
//!
//! Producers that only have the raw transcript use this to fill in
//! `duration_estimate_minutes` before submitting.

use serde::{Deserialize, Serialize};

/// Typical speaking rate.
pub const DEFAULT_WORDS_PER_MINUTE: u32 = 150;

/// Durations above this are long-form.
pub const LONG_FORM_THRESHOLD_MINUTES: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TranscriptMetrics {
    pub word_count: usize,
    pub estimated_duration_minutes: f64,
    pub is_long_form: bool,
}

/// Minutes of speech for `text`, rounded to two decimals. A zero rate is
/// treated as the default.
pub fn estimate_duration_minutes(text: &str, words_per_minute: u32) -> f64 {
    transcript_metrics(text, words_per_minute).estimated_duration_minutes
}

pub fn transcript_metrics(text: &str, words_per_minute: u32) -> TranscriptMetrics {
    let wpm = if words_per_minute == 0 {
        DEFAULT_WORDS_PER_MINUTE
    } else {
        words_per_minute
    };
    let word_count = text.split_whitespace().count();
    let minutes = (word_count as f64 / wpm as f64 * 100.0).round() / 100.0;

    TranscriptMetrics {
        word_count,
        estimated_duration_minutes: minutes,
        is_long_form: minutes > LONG_FORM_THRESHOLD_MINUTES,
    }
}

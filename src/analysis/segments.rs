//! Speech segment bookkeeping and waveform slicing.

use crate::audio::Waveform;

/// A detected speech interval `[start_sec, end_sec)` on the source timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeechSegment {
    pub start_sec: f32,
    pub end_sec: f32,
}

impl SpeechSegment {
    pub fn new(start_sec: f32, end_sec: f32) -> Self {
        Self { start_sec, end_sec }
    }

    pub fn duration(&self) -> f32 {
        self.end_sec - self.start_sec
    }
}

/// Concatenate the speech-covered slices of `waveform` in chronological order.
///
/// An empty segment list yields an empty waveform rather than failing.
pub fn extract_speech_audio(waveform: &Waveform, segments: &[SpeechSegment]) -> Vec<f32> {
    let mut speech = Vec::new();
    for segment in segments {
        let start = sample_index(segment.start_sec, waveform.sample_rate, waveform.samples.len());
        let end = sample_index(segment.end_sec, waveform.sample_rate, waveform.samples.len());
        if end > start {
            speech.extend_from_slice(&waveform.samples[start..end]);
        }
    }
    speech
}

/// Slice out the non-speech gaps between segments, including before the first
/// and after the last. Gaps shorter than `min_gap_sec` are dropped; with no
/// segments at all the entire waveform is one gap.
pub fn extract_music_gaps(
    waveform: &Waveform,
    segments: &[SpeechSegment],
    min_gap_sec: f32,
) -> Vec<Vec<f32>> {
    if segments.is_empty() {
        return vec![waveform.samples.clone()];
    }

    let mut chunks = Vec::new();
    let mut last_end = 0.0_f32;
    for segment in segments {
        if segment.start_sec - last_end >= min_gap_sec {
            let start = sample_index(last_end, waveform.sample_rate, waveform.samples.len());
            let end = sample_index(segment.start_sec, waveform.sample_rate, waveform.samples.len());
            if end > start {
                chunks.push(waveform.samples[start..end].to_vec());
            }
        }
        last_end = segment.end_sec;
    }

    let audio_duration = waveform.duration_seconds();
    if audio_duration - last_end >= min_gap_sec {
        let start = sample_index(last_end, waveform.sample_rate, waveform.samples.len());
        if start < waveform.samples.len() {
            chunks.push(waveform.samples[start..].to_vec());
        }
    }

    chunks
}

fn sample_index(seconds: f32, sample_rate: u32, len: usize) -> usize {
    ((seconds * sample_rate as f32) as usize).min(len)
}

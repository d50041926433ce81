//! SRT export (SPEC_FULL.md §B.1, grounded on `app/utils/srt.py`).

use crate::db::models::Segment;

fn format_timestamp(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let hours = (seconds / 3600.0) as u64;
    let minutes = ((seconds % 3600.0) / 60.0) as u64;
    let secs = (seconds % 60.0) as u64;
    let millis = ((seconds.fract()) * 1000.0).round() as u64;
    format!("{hours:02}:{minutes:02}:{secs:02},{millis:03}")
}

/// Render a transcript's segments as SRT (§B.1).
pub fn to_srt(segments: &[Segment]) -> String {
    let mut lines = Vec::with_capacity(segments.len() * 4);
    for (i, segment) in segments.iter().enumerate() {
        lines.push((i + 1).to_string());
        lines.push(format!(
            "{} --> {}",
            format_timestamp(segment.start_s),
            format_timestamp(segment.end_s)
        ));
        lines.push(segment.text.trim().to_string());
        lines.push(String::new());
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(start: f64, end: f64, text: &str) -> Segment {
        Segment {
            start_s: start,
            end_s: end,
            text: text.to_string(),
            confidence: None,
        }
    }

    #[test]
    fn formats_timestamp_with_millis() {
        assert_eq!(format_timestamp(3661.25), "01:01:01,250");
    }

    #[test]
    fn renders_numbered_entries_with_blank_separators() {
        let segments = vec![segment(0.0, 1.5, "hello"), segment(1.5, 3.0, "world")];
        let srt = to_srt(&segments);
        assert_eq!(
            srt,
            "1\n00:00:00,000 --> 00:00:01,500\nhello\n\n2\n00:00:01,500 --> 00:00:03,000\nworld\n"
        );
    }

    #[test]
    fn empty_segments_yield_empty_output() {
        assert_eq!(to_srt(&[]), "");
    }
}

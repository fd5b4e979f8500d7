//! Integration tests for message parsing and timeline assembly
//!
//! These tests run parsed messages through the timeline engine with a
//! synthetic TTS renderer.

use crate::test_utils::ToneRenderer;
use r_chimetts::audio::scratch::write_wav;
use r_chimetts::audio::{AssemblyIssue, AudioBuffer, ScratchDir, TimelineEngine, Transcoder};
use r_chimetts::segment::{parse_message, Segment};
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn engine_in(dir: &Path) -> TimelineEngine {
    let scratch = Arc::new(ScratchDir::new(dir.join("scratch")).unwrap());
    let transcoder = Arc::new(Transcoder::new("/nonexistent/transcoder", scratch));
    TimelineEngine::new(transcoder).with_chimes_dir(Some(dir.to_path_buf()))
}

fn write_chime(dir: &Path, name: &str, millis: usize) {
    let samples = vec![0.25; millis];
    write_wav(&dir.join(name), &AudioBuffer::new(samples, 1000, 1).unwrap()).unwrap();
}

#[cfg(test)]
mod timeline_integration_tests {
    use super::*;

    #[tokio::test]
    async fn test_structured_message_renders_in_order() {
        let dir = tempdir().unwrap();
        write_chime(dir.path(), "bell.wav", 400);
        let engine = engine_in(dir.path());

        let (segments, issues) =
            parse_message("[{chime: 'bell.wav'}, {tts: 'Hello'}, {delay: 200}, {tts: 'Bye', repeat: 2}]")
                .into_parts();
        assert!(issues.is_empty());
        assert_eq!(segments.len(), 5);

        let outcome = engine
            .assemble(&segments, &ToneRenderer::default(), 100.0, 300.0)
            .await;
        assert!(!outcome.is_degraded(), "{:?}", outcome.diagnostics());
        let audio = outcome.into_value().unwrap();

        // bell 400 + offset 100 + "Hello" 50 + delay 200 + offset 100 + "Bye" 30
        // + offset 100 + "Bye" 30 + final delay 300
        assert_eq!(audio.sample_rate(), 1000);
        assert_eq!(audio.frames(), 400 + 100 + 50 + 200 + 100 + 30 + 100 + 30 + 300);
    }

    #[tokio::test]
    async fn test_negative_segment_offset_overlaps_chime() {
        let dir = tempdir().unwrap();
        write_chime(dir.path(), "bell.wav", 400);
        let engine = engine_in(dir.path());

        let segments = parse_message("[{chime: 'bell.wav'}, {tts: 'Hello there', offset: -100}]").into_value();
        let audio = engine
            .assemble(&segments, &ToneRenderer::default(), 450.0, 0.0)
            .await
            .into_value()
            .unwrap();

        // 110ms of speech, the first 100ms mixed under the end of the chime.
        assert_eq!(audio.frames(), 400 + 10);
        assert!((audio.samples()[350] - 0.75).abs() < 0.01);
        assert!((audio.samples()[200] - 0.25).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_start_and_end_chimes_wrap_plain_text() {
        let dir = tempdir().unwrap();
        write_chime(dir.path(), "start.wav", 200);
        write_chime(dir.path(), "end.wav", 100);
        let engine = engine_in(dir.path());

        let mut segments = vec![Segment::chime("start.wav")];
        segments.extend(parse_message("Dinner is ready").into_value());
        segments.push(Segment::chime("end.wav"));

        let audio = engine
            .assemble(&segments, &ToneRenderer::default(), 0.0, 0.0)
            .await
            .into_value()
            .unwrap();
        assert_eq!(audio.frames(), 200 + 150 + 100);
    }

    #[tokio::test]
    async fn test_failed_segments_are_reported_and_skipped() {
        let dir = tempdir().unwrap();
        let engine = engine_in(dir.path());

        let segments = parse_message("[{chime: 'missing'}, {tts: 'this will fail'}, {tts: 'ok'}]").into_value();
        let outcome = engine
            .assemble(&segments, &ToneRenderer::default(), 0.0, 0.0)
            .await;

        assert_eq!(outcome.diagnostics().len(), 2);
        match &outcome.diagnostics()[0] {
            AssemblyIssue::Chime { path, .. } => assert!(path.ends_with("missing.mp3")),
            other => panic!("unexpected diagnostic: {other:?}"),
        }
        assert!(matches!(outcome.diagnostics()[1], AssemblyIssue::Tts { .. }));
        assert_eq!(outcome.into_value().map(|a| a.frames()), Some(20));
    }

    #[tokio::test]
    async fn test_malformed_structure_is_spoken_verbatim() {
        let dir = tempdir().unwrap();
        let engine = engine_in(dir.path());

        let raw = "[{tts: 'a', chime: 'b'}]";
        let (segments, issues) = parse_message(raw).into_parts();
        assert_eq!(issues.len(), 1);
        assert_eq!(segments, vec![Segment::tts(raw)]);

        let audio = engine
            .assemble(&segments, &ToneRenderer::default(), 0.0, 0.0)
            .await
            .into_value()
            .unwrap();
        assert_eq!(audio.frames(), raw.chars().count() * 10);
    }
}

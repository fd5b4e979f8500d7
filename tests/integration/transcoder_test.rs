//! Integration tests for file conversion with a stand-in transcoder
//!
//! A shell script copies its input to its output so conversions can run
//! without a real transcoder installed.

#![cfg(unix)]

use r_chimetts::audio::scratch::write_wav;
use r_chimetts::audio::{parse_conversion_preset, AudioBuffer, ScratchDir, TranscodeError, Transcoder};
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn write_script(dir: &Path, name: &str, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut permissions = std::fs::metadata(&path).unwrap().permissions();
    permissions.set_mode(0o755);
    std::fs::set_permissions(&path, permissions).unwrap();
    path.display().to_string()
}

fn copying_transcoder(bin_dir: &Path, scratch_dir: &Path) -> Transcoder {
    let binary = write_script(bin_dir, "copy", "in=\"$2\"\nfor last; do :; done\ncp \"$in\" \"$last\"");
    Transcoder::new(binary, Arc::new(ScratchDir::new(scratch_dir).unwrap()))
}

fn rendered_file(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("announcement.wav");
    write_wav(&path, &AudioBuffer::new(vec![0.1; 500], 1000, 1).unwrap()).unwrap();
    path
}

#[cfg(test)]
mod transcoder_integration_tests {
    use super::*;

    #[tokio::test]
    async fn test_alexa_preset_writes_mp3_beside_input() {
        let bin_dir = tempdir().unwrap();
        let media_dir = tempdir().unwrap();
        let transcoder = copying_transcoder(bin_dir.path(), media_dir.path());
        let input = rendered_file(media_dir.path());

        let spec = parse_conversion_preset("alexa").unwrap();
        let output = transcoder.convert_file(&input, &spec).await.unwrap();

        assert_eq!(output, media_dir.path().join("announcement.mp3"));
        assert!(output.exists());
        assert!(input.exists());
    }

    #[tokio::test]
    async fn test_output_conversion_removes_original_wav() {
        let bin_dir = tempdir().unwrap();
        let media_dir = tempdir().unwrap();
        let transcoder = copying_transcoder(bin_dir.path(), media_dir.path());
        let input = rendered_file(media_dir.path());

        let spec = parse_conversion_preset("alexa").unwrap();
        let output = transcoder.convert_output(&input, &spec).await;

        assert_eq!(output, media_dir.path().join("announcement.mp3"));
        assert!(output.exists());
        assert!(!input.exists());
    }

    #[tokio::test]
    async fn test_failed_output_conversion_keeps_original_wav() {
        let bin_dir = tempdir().unwrap();
        let media_dir = tempdir().unwrap();
        let binary = write_script(bin_dir.path(), "broken", "exit 1");
        let transcoder = Transcoder::new(binary, Arc::new(ScratchDir::new(media_dir.path()).unwrap()));
        let input = rendered_file(media_dir.path());

        let spec = parse_conversion_preset("alexa").unwrap();
        let output = transcoder.convert_output(&input, &spec).await;

        assert_eq!(output, input);
        assert!(input.exists());
    }

    #[tokio::test]
    async fn test_same_format_conversion_replaces_input() {
        let bin_dir = tempdir().unwrap();
        let media_dir = tempdir().unwrap();
        let transcoder = copying_transcoder(bin_dir.path(), media_dir.path());
        let input = rendered_file(media_dir.path());

        let spec = parse_conversion_preset("volume 150%").unwrap();
        assert!(spec.as_str().contains("volume=1.5"));
        let output = transcoder.convert_file(&input, &spec).await.unwrap();

        assert_eq!(output, input);
        let names: Vec<String> = std::fs::read_dir(media_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["announcement.wav".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_conversion_keeps_input_and_cleans_output() {
        let bin_dir = tempdir().unwrap();
        let media_dir = tempdir().unwrap();
        let binary = write_script(
            bin_dir.path(),
            "broken",
            "for last; do :; done\necho partial > \"$last\"\necho 'Invalid argument' >&2\nexit 1",
        );
        let transcoder = Transcoder::new(binary, Arc::new(ScratchDir::new(media_dir.path()).unwrap()));
        let input = rendered_file(media_dir.path());

        let spec = parse_conversion_preset("alexa").unwrap();
        let err = transcoder.convert_file(&input, &spec).await.unwrap_err();

        match err {
            TranscodeError::Failed { command, code, stderr } => {
                assert_eq!(code, Some(1));
                assert!(stderr.contains("Invalid argument"));
                assert!(command.contains("libmp3lame"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(input.exists());
        assert!(!media_dir.path().join("announcement.mp3").exists());
    }

    #[tokio::test]
    async fn test_custom_preset_means_no_conversion() {
        assert!(parse_conversion_preset("custom").is_none());
        assert!(parse_conversion_preset("  ").is_none());
        assert_eq!(
            parse_conversion_preset("-af aecho=0.8:0.9:1000:0.3").map(|s| s.as_str().to_string()),
            Some("-af aecho=0.8:0.9:1000:0.3".to_string())
        );
    }
}

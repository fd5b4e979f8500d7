use r_chimetts::audio::scratch::{write_wav, SCRATCH_FILE_PREFIX};
use r_chimetts::audio::{parse_conversion_preset, AudioBuffer, ScratchDir, TimelineEngine, Transcoder};
use r_chimetts::config::Settings;
use r_chimetts::device::{media_content_id, DeviceControl, HomeAssistantClient, PlatformFamily};
use r_chimetts::init_app_dirs;
use r_chimetts::player::PlaybackOrchestrator;
use r_chimetts::segment::{parse_message, Segment};
use r_chimetts::ui::{Args, Cli};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LOG_TARGET: &str = "r_chimetts::main";

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Parses the message and wraps it in the start and end chimes.
fn build_segments(args: &Args) -> Vec<Segment> {
    let mut segments = Vec::new();
    if let Some(chime) = args.chime.as_deref().filter(|c| !c.trim().is_empty()) {
        segments.push(Segment::chime(chime));
    }
    if let Some(message) = &args.message {
        let (parsed, issues) = parse_message(message).into_parts();
        for issue in issues {
            warn!(target: LOG_TARGET, "{}", issue);
        }
        segments.extend(parsed);
    }
    if let Some(end_chime) = args.end_chime.as_deref().filter(|c| !c.trim().is_empty()) {
        segments.push(Segment::chime(end_chime));
    }
    segments
}

fn output_path(args: &Args, settings: &Settings) -> Result<PathBuf, Box<dyn Error>> {
    if let Some(output) = &args.output {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        return Ok(output.clone());
    }
    std::fs::create_dir_all(&settings.media_dir)?;
    Ok(settings
        .media_dir
        .join(format!("{}{}.wav", SCRATCH_FILE_PREFIX, uuid::Uuid::new_v4())))
}

async fn save_audio(path: &Path, audio: &AudioBuffer) -> Result<(), Box<dyn Error>> {
    let target = path.to_path_buf();
    let audio = audio.clone();
    tokio::task::spawn_blocking(move || write_wav(&target, &audio)).await??;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command-line arguments and initialize CLI
    let cli = Cli::new();
    init_tracing(cli.args.log_json);

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            cli.display_error(e.as_ref());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let args = &cli.args;

    // Load configuration from file, then apply command-line and environment overrides
    let config_path = args.config_path();
    let mut settings = Settings::load(&config_path)?;
    args.apply_overrides(&mut settings);
    settings.validate()?;
    init_app_dirs(&settings)?;

    let segments = build_segments(args);
    if segments.is_empty() {
        return Err("Nothing to play: give a message, a chime or both".into());
    }

    let mut client = HomeAssistantClient::new(&settings.server_url)
        .with_tts_platform(settings.tts_platform.clone())
        .with_platforms(settings.platforms.clone());
    if let Some(token) = &settings.access_token {
        client = client.with_access_token(token);
    }
    let client = Arc::new(client);

    let scratch = Arc::new(ScratchDir::new(&settings.temp_dir)?);
    let transcoder = Arc::new(Transcoder::new(settings.ffmpeg_path.clone(), scratch));
    let engine = TimelineEngine::new(transcoder.clone())
        .with_chimes_dir(settings.chimes_dir.clone())
        .with_tts_defaults(args.speed, args.pitch);

    let (audio, issues) = engine
        .assemble(&segments, client.as_ref(), settings.offset_ms, args.final_delay)
        .await
        .into_parts();
    for issue in &issues {
        warn!(target: LOG_TARGET, "{}", issue);
    }
    let Some(audio) = audio else {
        return Err("No audio was generated".into());
    };

    let path = output_path(args, &settings)?;
    save_audio(&path, &audio).await?;
    info!(target: LOG_TARGET, "Saved {:.0}ms of audio to {}", audio.duration_ms(), path.display());

    let control: Arc<dyn DeviceControl> = client.clone();
    let orchestrator = PlaybackOrchestrator::new(control, settings.fade_step(), settings.poll_interval());
    let devices = if args.entity_ids.is_empty() {
        Vec::new()
    } else {
        orchestrator.prepare(&args.entity_ids, &args.volume_target()).await
    };

    // An explicit preset wins; voice assistants otherwise need their own format.
    let conversion = match &args.audio_conversion {
        Some(preset) => parse_conversion_preset(preset),
        None if devices.iter().any(|d| d.platform == PlatformFamily::VoiceAssistant) => {
            parse_conversion_preset("alexa")
        }
        None => None,
    };
    let path = match conversion {
        Some(spec) => transcoder.convert_output(&path, &spec).await,
        None => path,
    };
    cli.display_output(&path, audio.duration_ms());

    if devices.is_empty() {
        if !args.entity_ids.is_empty() {
            warn!(target: LOG_TARGET, "None of the requested media players are available");
        }
        return Ok(());
    }

    let Some(content_id) = media_content_id(&path.to_string_lossy()) else {
        return Err(format!(
            "Audio at {} is outside a /media/ directory and cannot be played",
            path.display()
        )
        .into());
    };

    let report = orchestrator
        .play(
            &devices,
            &content_id,
            Duration::from_secs_f64(audio.duration_ms() / 1000.0),
            &args.playback_options(),
        )
        .await;
    cli.display_playback(&report);

    Ok(())
}

use anyhow::{Context, Result};
use clap::Parser;
use owo_colors::OwoColorize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use vitrans::cli::{Cli, Commands, ConfigAction};
use vitrans::config::{Config, TtsEngine};
use vitrans::history::{HistoryLog, HistoryRecord};
use vitrans::logging::init_logging;
use vitrans::models::ModelRegistry;
use vitrans::pipeline::{AudioInput, Pipeline, PipelineConfig, PipelineOutcome};
use vitrans::tts::{ArtifactLocation, SynthesisArtifact, build_synthesizer};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = load_config(cli.config.as_deref())?;

    match &cli.command {
        Commands::Config { action } => {
            return handle_config_command(action, &config, &config_path);
        }
        #[cfg(feature = "cpal-audio")]
        Commands::Devices => return list_audio_devices(),
        Commands::Serve {
            bind,
            base_url,
            workers,
        } => {
            // Only the cloud engine produces a file the API can link to.
            config.tts.engine = TtsEngine::Cloud;
            if let Some(bind) = bind {
                config.server.bind = bind.clone();
            }
            if let Some(url) = base_url {
                config.tts.base_url = url.clone();
            }
            if let Some(workers) = workers {
                config.server.workers = *workers;
            }
        }
        Commands::Record { device, seconds } => {
            if device.is_some() {
                config.audio.device = device.clone();
            }
            if let Some(seconds) = seconds {
                config.audio.record_seconds = *seconds;
            }
        }
        Commands::File { .. } | Commands::Translate { .. } => {}
    }

    config.validate().context("Invalid configuration")?;
    init_logging(&config.log, cli.verbosity());
    tracing::info!(version = %vitrans::version_string(), "vitrans starting");

    let pipeline = Arc::new(build_pipeline(&cli, &config)?);
    let history = config.history.path.as_ref().map(HistoryLog::new);

    match cli.command {
        Commands::Serve { .. } => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            runtime.block_on(vitrans::server::serve(pipeline, &config))?;
        }
        Commands::Record { .. } => {
            let input = capture_input(&config, cli.quiet)?;
            let outcome = pipeline.run(input);
            report_outcome(&outcome, history.as_ref(), cli.quiet, cli.verbose);
        }
        Commands::File { path } => {
            let outcome = pipeline.run(AudioInput::File(path));
            report_outcome(&outcome, history.as_ref(), cli.quiet, cli.verbose);
        }
        Commands::Translate { text, speak } => {
            translate_text(&pipeline, &text, speak && !cli.no_speak, history.as_ref(), cli.quiet)?;
        }
        Commands::Config { .. } => {}
        #[cfg(feature = "cpal-audio")]
        Commands::Devices => {}
    }

    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config), which must exist
/// 2. Default config path (~/.config/vitrans/config.toml)
/// 3. Built-in defaults
///
/// Environment variable overrides apply on top of either.
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load_or_default(&Config::default_path())?,
    };
    Ok(config.with_env_overrides())
}

/// Load the models the command needs and wire them into a pipeline.
/// A missing model is fatal. Text translation skips the speech model.
fn build_pipeline(cli: &Cli, config: &Config) -> Result<Pipeline> {
    let mut pipeline_config = PipelineConfig::from_config(config)?;
    if let Some(timeout) = cli.timeout {
        pipeline_config.timeout = timeout;
    }
    if cli.no_speak {
        pipeline_config.synthesize = false;
    }

    let registry = match cli.command {
        Commands::Translate { .. } => ModelRegistry::load_translation(config),
        _ => ModelRegistry::load(config),
    }
    .context("Failed to load models")?;
    let synthesizer = build_synthesizer(&config.tts);
    tracing::info!(
        registry = ?registry,
        tts = synthesizer.engine_name(),
        timeout = %humantime::format_duration(pipeline_config.timeout),
        "pipeline ready"
    );
    Ok(Pipeline::new(Arc::new(registry), synthesizer, pipeline_config))
}

#[cfg(feature = "cpal-audio")]
fn capture_input(config: &Config, quiet: bool) -> Result<AudioInput> {
    let source = vitrans::audio::capture::CpalAudioSource::new(config.audio.device.as_deref())?;
    let seconds = config.audio.record_seconds;
    if !quiet {
        eprintln!(
            "{} {}",
            "Recording".bold().red(),
            format!("for {}s, speak Vietnamese now...", seconds).dimmed()
        );
    }
    Ok(AudioInput::Capture(
        Box::new(source),
        Duration::from_secs(seconds),
    ))
}

#[cfg(not(feature = "cpal-audio"))]
fn capture_input(_config: &Config, _quiet: bool) -> Result<AudioInput> {
    anyhow::bail!("Microphone capture requires the 'cpal-audio' feature")
}

/// Print a run's results, record history, and exit non-zero on failure.
fn report_outcome(
    outcome: &PipelineOutcome,
    history: Option<&HistoryLog>,
    quiet: bool,
    verbose: u8,
) {
    if let Some(transcript) = &outcome.transcript
        && !quiet
    {
        println!("{} {}", "vi:".dimmed(), transcript.text);
    }
    if let Some(translation) = &outcome.translation {
        if quiet {
            println!("{}", translation.translated_text);
        } else {
            println!("{} {}", "en:".dimmed(), translation.translated_text.bold().green());
        }
    }
    if let Some(artifact) = &outcome.synthesis
        && !quiet
    {
        print_artifact(artifact);
    }
    if let Some(synthesis_error) = &outcome.synthesis_error {
        eprintln!("{} {}", "Warning:".yellow().bold(), synthesis_error);
    }

    if verbose > 0 && !quiet {
        eprintln!("{}", outcome.timings.summary().dimmed());
        if let Some(audio) = outcome.audio_duration {
            eprintln!(
                "{}",
                format!(
                    "audio {}, realtime factor {:.2}",
                    humantime::format_duration(Duration::from_millis(audio.as_millis() as u64)),
                    outcome.timings.realtime_factor(audio)
                )
                .dimmed()
            );
        }
    }

    if let (Some(log), Some(transcript), Some(translation)) =
        (history, &outcome.transcript, &outcome.translation)
    {
        let url = outcome
            .synthesis
            .as_ref()
            .and_then(|s| s.access_locator.clone());
        log.record(&HistoryRecord::new(
            &transcript.text,
            &translation.translated_text,
            url,
        ));
    }

    if let Some(failure) = &outcome.failure {
        eprintln!("{} {}", "Error:".red().bold(), failure);
        std::process::exit(1);
    }
}

fn translate_text(
    pipeline: &Pipeline,
    text: &str,
    speak: bool,
    history: Option<&HistoryLog>,
    quiet: bool,
) -> Result<()> {
    let translation = pipeline.translate_text(text)?;
    if quiet {
        println!("{}", translation.translated_text);
    } else {
        println!("{} {}", "en:".dimmed(), translation.translated_text.bold().green());
    }

    let mut url = None;
    if speak {
        match pipeline.synthesize_text(&translation.translated_text) {
            Ok(artifact) => {
                if !quiet {
                    print_artifact(&artifact);
                }
                url = artifact.access_locator;
            }
            Err(e) => eprintln!("{} {}", "Warning:".yellow().bold(), e),
        }
    }

    if let Some(log) = history {
        log.record(&HistoryRecord::new(text, &translation.translated_text, url));
    }
    Ok(())
}

fn print_artifact(artifact: &SynthesisArtifact) {
    match (&artifact.location, &artifact.access_locator) {
        (_, Some(url)) => println!("{} {}", "speech:".dimmed(), url),
        (ArtifactLocation::File(path), None) => {
            println!("{} {}", "speech:".dimmed(), path.display())
        }
        (ArtifactLocation::Played, None) => println!("{}", "(spoken)".dimmed()),
        (ArtifactLocation::Bytes(bytes), None) => println!(
            "{} {} bytes of {}",
            "speech:".dimmed(),
            bytes.len(),
            artifact.content_type.mime()
        ),
    }
}

/// Handle configuration commands.
fn handle_config_command(action: &ConfigAction, config: &Config, path: &Path) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let toml = toml::to_string_pretty(config).context("Failed to render configuration")?;
            print!("{}", toml);
        }
        ConfigAction::Path => {
            println!("{}", path.display());
            if !path.exists() {
                eprintln!("{}", "(file does not exist, using defaults)".dimmed());
            }
        }
    }
    Ok(())
}

/// List available audio input devices.
#[cfg(feature = "cpal-audio")]
fn list_audio_devices() -> Result<()> {
    let devices = vitrans::audio::capture::list_devices()?;

    if devices.is_empty() {
        eprintln!("No audio input devices found");
        std::process::exit(1);
    }

    println!("Available audio input devices:");
    for (idx, device) in devices.iter().enumerate() {
        println!("  [{}] {}", idx, device);
    }

    Ok(())
}

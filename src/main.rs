#![deny(missing_docs)]

//! CLI entry point: analyze one clip's audio and print the tag JSON.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use cliptagger::analysis;
use cliptagger::config::Config;
use cliptagger::logging;
use cliptagger::models::{ModelRegistry, ModelSetupOptions, ensure_models};

/// Containers routed through ffmpeg extraction before analysis.
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "webm", "avi", "m4v"];

struct CliArgs {
    input: Option<PathBuf>,
    config_path: Option<PathBuf>,
    pretty: bool,
    setup_models: bool,
    setup: ModelSetupOptions,
}

fn main() -> ExitCode {
    if let Err(err) = logging::init() {
        eprintln!("Logging disabled: {err}");
    }

    let args = match parse_args() {
        Ok(Some(args)) => args,
        Ok(None) => return ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{message}");
            print_help();
            return ExitCode::FAILURE;
        }
    };

    if args.setup_models {
        return match ensure_models(args.setup) {
            Ok(paths) => {
                for path in paths {
                    println!("Model ready: {}", path.display());
                }
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("Failed to prepare models: {err}");
                ExitCode::FAILURE
            }
        };
    }

    let Some(input) = args.input else {
        eprintln!("Missing input file");
        print_help();
        return ExitCode::FAILURE;
    };

    let config = match &args.config_path {
        Some(path) => match Config::load(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("{err}");
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };
    if !config.audio.enabled {
        eprintln!("Audio analysis is disabled in the config");
        return ExitCode::SUCCESS;
    }

    let models = match ModelRegistry::from_app_dirs() {
        Ok(models) => models,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let result = if is_video(&input) {
        match analysis::analyze_video_audio(&input, &config.audio, &models) {
            Ok(result) => result,
            Err(err) => {
                eprintln!("{err}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        analysis::analyze_audio(&input, &config.audio, &models)
    };

    for error in &result.errors {
        eprintln!("warning: {error}");
    }

    let value = result.to_json();
    let rendered = if args.pretty {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    };
    match rendered {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("Failed to serialize result: {err}");
            ExitCode::FAILURE
        }
    }
}

fn parse_args() -> Result<Option<CliArgs>, String> {
    let mut args = CliArgs {
        input: None,
        config_path: None,
        pretty: false,
        setup_models: false,
        setup: ModelSetupOptions::default(),
    };
    let mut raw = std::env::args().skip(1);
    while let Some(arg) = raw.next() {
        match arg.as_str() {
            "--config" => {
                args.config_path = Some(PathBuf::from(expect_value(&mut raw, "--config")?));
            }
            "--pretty" => args.pretty = true,
            "--setup-models" => args.setup_models = true,
            "--models-dir" => {
                args.setup.models_dir = Some(PathBuf::from(expect_value(&mut raw, "--models-dir")?));
            }
            "--vad-url" => args.setup.vad_url = Some(expect_value(&mut raw, "--vad-url")?),
            "--vad-sha256" => args.setup.vad_sha256 = Some(expect_value(&mut raw, "--vad-sha256")?),
            "--emotion-url" => {
                args.setup.emotion_url = Some(expect_value(&mut raw, "--emotion-url")?);
            }
            "--emotion-sha256" => {
                args.setup.emotion_sha256 = Some(expect_value(&mut raw, "--emotion-sha256")?);
            }
            "--force" => args.setup.force = true,
            "--help" | "-h" => {
                print_help();
                return Ok(None);
            }
            other if other.starts_with('-') => {
                return Err(format!("Unknown option: {other}"));
            }
            _ => {
                if args.input.is_some() {
                    return Err("More than one input file given".to_string());
                }
                args.input = Some(PathBuf::from(arg));
            }
        }
    }
    Ok(Some(args))
}

fn expect_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String, String> {
    args.next().ok_or_else(|| format!("{flag} needs a value"))
}

fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            VIDEO_EXTENSIONS.iter().any(|&v| v == ext)
        })
        .unwrap_or(false)
}

fn print_help() {
    println!(
        "Usage: cliptagger [--config <toml>] [--pretty] <media-file>\n\
         \n\
         Prints the audio analysis tag JSON for an audio file or video clip.\n\
         \n\
         Model setup:\n\
         cliptagger --setup-models [--models-dir <path>] [--force]\n\
         \x20                      [--vad-url <url>] [--vad-sha256 <hex>]\n\
         \x20                      [--emotion-url <url>] [--emotion-sha256 <hex>]"
    );
}

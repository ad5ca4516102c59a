mod actions;
mod capture;
mod renderers;

use std::{
    io::{self, BufRead, Write},
    ops::ControlFlow,
    path::PathBuf,
    thread,
    time::Instant,
};

use clap::{Parser, Subcommand, ValueEnum};
use crossbeam_channel::Receiver;
use spectra_core::{
    AnalyserOptions, AppConfig, AudioLevels, CaptureSession, CaptureSource, FileStore,
    FrameContext, IntervalScheduler, KeyValueStore, MemoryStore, PlaybackController,
    PlaybackEvent, PlaybackState, RenderLoop, SoftwareAudioBackend, Viewport, VisualPreset,
};
use tracing_subscriber::EnvFilter;

use crate::{
    actions::{Action, ActionDispatcher},
    capture::CpalCaptureBackend,
    renderers::Surface,
};

const APP_DIR: &str = "spectra";
/// Columns reserved for the status line outside fullscreen.
const HUD_COLUMNS: u32 = 48;

fn main() -> spectra_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Live(args) => run_live(args),
        Commands::Presets { state, json } => run_presets(state, json),
        Commands::Devices => run_devices(),
    }
}

fn run_live(args: LiveArgs) -> spectra_core::Result<()> {
    let config = match &args.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::live_defaults(),
    };
    config.audio.validate()?;
    let source = CaptureSource::from(args.source);
    tracing::info!(%source, preset = ?args.preset, "starting live mode");

    let surface = Surface::default();
    let mut controller = PlaybackController::new(open_store(args.state), &config.playback);
    for preset in renderers::catalog(&surface) {
        controller.register(preset);
    }
    if let Some(id) = &args.preset {
        controller.set_active_preset(id)?;
    }
    controller.ensure_active();
    let events = controller.subscribe();

    let backend = CpalCaptureBackend::new(config.audio.feed_capacity).with_device(args.device);
    let mut session = CaptureSession::new(
        Box::new(backend),
        Box::new(SoftwareAudioBackend::new(config.audio.fallback_sample_rate)),
        AnalyserOptions::from(&config.audio),
    );
    if session.start(source).is_err() {
        report(session.error_message().unwrap_or("capture failed"));
    }

    let mut render = RenderLoop::new(&config.render, config.audio.fallback_sample_rate as f32);
    render
        .resize_mut()
        .signal(Instant::now(), frame_viewport(terminal_columns(), false));
    let mut scheduler =
        IntervalScheduler::new(config.render.frame_interval()).with_max_frames(args.frames);

    let commands = spawn_stdin_reader();
    let mut dispatcher = ActionDispatcher::new();
    let mut fullscreen = false;
    let mut status = String::new();
    let mut out = io::stdout();

    let frames = render.run(&mut scheduler, &mut session, &mut controller, |cx| {
        for event in events.try_iter() {
            tracing::debug!(?event, "playback changed");
            if let PlaybackEvent::ActivePresetChanged(Some(id)) = event {
                status = format!("preset: {id}");
            }
        }
        for line in commands.try_iter() {
            match handle_command(&line, cx, &mut dispatcher) {
                Command::Quit => return ControlFlow::Break(()),
                Command::Status(message) => status = message,
                Command::Ignored => {}
            }
        }
        if dispatcher.is_fullscreen() != fullscreen {
            fullscreen = dispatcher.is_fullscreen();
            cx.resize
                .signal(cx.tick.instant, frame_viewport(terminal_columns(), fullscreen));
        }

        let frame = surface.take().unwrap_or_default();
        let hud = if dispatcher.shows_hud() {
            hud_line(cx, &status)
        } else {
            String::new()
        };
        let written = write!(out, "\r\x1b[2K{frame}{hud}").and_then(|()| out.flush());
        match written {
            Ok(()) => ControlFlow::Continue(()),
            Err(err) => {
                tracing::error!(%err, "terminal write failed");
                ControlFlow::Break(())
            }
        }
    });

    session.stop();
    println!();
    tracing::info!(frames, "live mode finished");
    Ok(())
}

enum Command {
    Quit,
    Status(String),
    Ignored,
}

fn handle_command(
    line: &str,
    cx: &mut FrameContext<'_>,
    dispatcher: &mut ActionDispatcher,
) -> Command {
    let mut words = line.split_whitespace();
    let status = match (words.next(), words.next()) {
        (Some("q" | "quit"), _) => return Command::Quit,
        (Some("resize"), Some(size)) => match parse_viewport(size) {
            Some(viewport) => {
                cx.resize.signal(cx.tick.instant, viewport);
                return Command::Ignored;
            }
            None => format!("bad size `{size}`, expected WxH"),
        },
        (Some(word @ ("mic" | "surface")), _) => {
            let source = if word == "mic" {
                CaptureSource::Microphone
            } else {
                CaptureSource::SharedSurface
            };
            match cx.session.start(source) {
                Ok(()) => format!("capturing {source}"),
                Err(_) => cx
                    .session
                    .error_message()
                    .unwrap_or("capture failed")
                    .to_string(),
            }
        }
        (Some("stop"), _) => {
            cx.session.stop();
            "capture stopped".to_string()
        }
        (Some("fav"), _) => match cx.controller.active_preset_id().map(str::to_string) {
            Some(id) => {
                let favorite = cx.controller.toggle_favorite(&id);
                format!("{id} {}", if favorite { "favorited" } else { "unfavorited" })
            }
            None => return Command::Ignored,
        },
        (Some("interval"), Some(ms)) => match ms.parse::<u64>() {
            Ok(ms) => match cx.controller.set_cycle_interval(ms) {
                Ok(()) => format!("cycle every {ms}ms"),
                Err(err) => err.to_string(),
            },
            Err(_) => format!("bad interval `{ms}`"),
        },
        _ => match Action::from_key(line) {
            Some(action) => match dispatcher.dispatch(action, cx.session, cx.controller) {
                Some(status) => status,
                None => return Command::Ignored,
            },
            None => format!("unknown command `{}`", line.trim()),
        },
    };
    Command::Status(status)
}

fn hud_line(cx: &FrameContext<'_>, status: &str) -> String {
    let AudioLevels {
        bass,
        mid,
        treble,
        rms,
    } = cx.levels;
    let name = cx
        .controller
        .active_preset()
        .map(|preset| preset.name())
        .unwrap_or("-");
    let state = if cx.controller.is_paused() {
        "paused"
    } else if cx.session.is_capturing() {
        "live"
    } else {
        "idle"
    };
    format!(
        "  | {name} [{state}] b{bass:.2} m{mid:.2} t{treble:.2} r{rms:.2} {status}"
    )
}

fn parse_viewport(size: &str) -> Option<Viewport> {
    let (width, height) = size.split_once(['x', 'X'])?;
    Some(Viewport::new(width.parse().ok()?, height.parse().ok()?))
}

fn terminal_columns() -> u32 {
    std::env::var("COLUMNS")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(80)
}

/// Drawing area for one terminal line; fullscreen gives the renderer the
/// columns the status line would otherwise take.
fn frame_viewport(columns: u32, fullscreen: bool) -> Viewport {
    let width = if fullscreen {
        columns
    } else {
        columns.saturating_sub(HUD_COLUMNS)
    };
    Viewport::new(width, 1)
}

/// Forwards stdin lines to the render thread.
fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    let spawned = thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(err) = spawned {
        tracing::warn!(%err, "keyboard input unavailable");
    }
    rx
}

fn report(message: &str) {
    tracing::warn!("{message}");
    eprintln!("{message}");
}

/// Lists the catalog against the saved state without writing it back.
fn run_presets(state: Option<PathBuf>, json: bool) -> spectra_core::Result<()> {
    let presets = renderers::catalog(&Surface::default());
    if json {
        let descriptors: Vec<_> = presets.iter().map(VisualPreset::descriptor).collect();
        println!("{}", serde_json::to_string_pretty(&descriptors)?);
        return Ok(());
    }

    let playback = AppConfig::live_defaults().playback;
    let store = open_store(state);
    let saved = PlaybackState::restore(
        store.as_ref(),
        &playback.storage_key,
        playback.default_cycle_interval_ms,
    );
    for line in preset_listing(&presets, &saved) {
        println!("{line}");
    }
    Ok(())
}

/// One line per preset; `>` marks the saved selection and `*` favorites.
fn preset_listing(presets: &[VisualPreset], saved: &PlaybackState) -> Vec<String> {
    presets
        .iter()
        .map(|preset| {
            let marker = if saved.active_preset_id.as_deref() == Some(preset.id()) {
                '>'
            } else {
                ' '
            };
            let favorite = if saved.favorites.contains(preset.id()) { '*' } else { ' ' };
            format!(
                "{marker}{favorite} {:<18} {:<7} {} - {}",
                preset.id(),
                preset.kind(),
                preset.name(),
                preset.description()
            )
        })
        .collect()
}

fn run_devices() -> spectra_core::Result<()> {
    for device in capture::list_input_devices()? {
        let mut notes = Vec::new();
        if device.is_default {
            notes.push("default");
        }
        if device.is_monitor {
            notes.push("monitor");
        }
        if notes.is_empty() {
            println!("{}", device.name);
        } else {
            println!("{} ({})", device.name, notes.join(", "));
        }
    }
    Ok(())
}

/// Durable store under `dir`, or the user config directory. Falls back to
/// memory when neither is available.
fn open_store(dir: Option<PathBuf>) -> Box<dyn KeyValueStore> {
    match dir.or_else(|| dirs::config_dir().map(|base| base.join(APP_DIR))) {
        Some(dir) => {
            tracing::debug!(?dir, "persisting playback state");
            Box::new(FileStore::new(dir))
        }
        None => {
            tracing::warn!("no config directory; playback state will not persist");
            Box::new(MemoryStore::new())
        }
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Audio-reactive terminal visualiser", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Capture audio and render the active preset until `q` is entered.
    Live(LiveArgs),
    /// List registered presets; `>` marks the active one, `*` favorites.
    Presets {
        /// Directory holding the persisted playback state.
        #[arg(long)]
        state: Option<PathBuf>,
        /// Print preset descriptors as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List audio input devices.
    Devices,
}

#[derive(clap::Args, Debug)]
struct LiveArgs {
    /// Where to capture audio from.
    #[arg(short, long, value_enum, default_value_t = SourceArg::Mic)]
    source: SourceArg,
    /// Preset id to activate on startup.
    #[arg(short, long)]
    preset: Option<String>,
    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Directory holding the persisted playback state.
    #[arg(long)]
    state: Option<PathBuf>,
    /// Stop after this many frames.
    #[arg(long)]
    frames: Option<u64>,
    /// Capture from the first input device whose name contains this text.
    #[arg(long)]
    device: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SourceArg {
    Mic,
    Surface,
}

impl From<SourceArg> for CaptureSource {
    fn from(value: SourceArg) -> Self {
        match value {
            SourceArg::Mic => Self::Microphone,
            SourceArg::Surface => Self::SharedSurface,
        }
    }
}

use std::{error::Error, process, sync::Arc, time::Duration};

use clap::{command, Parser, ValueHint};
use log::{debug, error, info, LevelFilter};
use tokio_util::sync::CancellationToken;

use scrobbler::{
    config::Config,
    error::ErrorKind,
    playback::{Monitor, SimulatedClock},
    scrobble,
    token::Secrets,
    track::{Song, TrackId},
    tracker::Registry,
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when not built release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Secrets file
    ///
    /// Holds the scrobble endpoint and the access token. Keep it private,
    /// as the token grants access to your scrobble history.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath, default_value_t = String::from("secrets.toml"))]
    secrets_file: String,

    /// Player's name
    ///
    /// Sent with every scrobble.
    ///
    /// [default: system hostname]
    #[arg(short, long, value_hint = ValueHint::Hostname)]
    name: Option<String>,

    /// Song ID
    ///
    /// [default: random]
    #[arg(long, value_name = "UUID")]
    song_id: Option<TrackId>,

    #[arg(long)]
    title: String,

    #[arg(long)]
    artist: String,

    #[arg(long)]
    album: Option<String>,

    /// Duration of the song in seconds
    #[arg(long, value_name = "SECS")]
    duration: u64,

    /// Start playing at this many seconds into the song
    #[arg(long, value_name = "SECS")]
    seek: Option<u64>,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
///
/// # Panics
///
/// Panics when a logger facade is already initialized.
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            // Quiet and verbose are mutually exclusive.
            0 => LevelFilter::Warn,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module("scrobbler", level);
    }

    logger.init();
}

/// Loads the secrets, pointing to the documentation when they are missing.
fn load_secrets(secrets_file: &str) -> scrobbler::error::Result<Secrets> {
    let secrets = Secrets::from_file(secrets_file);

    if let Err(ref e) = secrets {
        if e.kind == ErrorKind::NotFound {
            info!("read the documentation on how to set your endpoint and token in {secrets_file}");
        }
    }

    secrets
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|()| "Ctrl+C"),
            _ = sigterm.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|()| "Ctrl+C")
    }
}

/// Plays one song on a simulated player and scrobbles it.
///
/// Returns when the song has ended or a shutdown signal came in.
async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let secrets = load_secrets(&args.secrets_file)?;

    let player_name = args
        .name
        .or_else(sysinfo::System::host_name)
        .unwrap_or_else(|| String::from(env!("CARGO_PKG_NAME")));
    let mut config = Config::new(&player_name, secrets.endpoint);
    if let Some(token) = secrets.token {
        config = config.with_token(token);
    }

    let shutdown = CancellationToken::new();
    let client = scrobble::Client::new(&config, shutdown.child_token())?;
    let registry = Arc::new(Registry::new(&config, Arc::new(client)));

    let duration = Duration::from_secs(args.duration);
    let mut song = Song::new(
        args.song_id.unwrap_or_else(TrackId::fast_v4),
        &args.title,
        &args.artist,
        duration,
    );
    if let Some(ref album) = args.album {
        song = song.with_album(album);
    }
    let id = song.id;
    info!("playing {song} [{id}]");

    let clock = Arc::new(SimulatedClock::new(duration));
    if let Some(seek) = args.seek {
        clock.seek(Duration::from_secs(seek));
    }
    clock.resume();

    registry.start_tracking(song, duration);
    if !registry.is_tracking(id) {
        info!("nothing to scrobble");
        return Ok(());
    }
    let monitor = Monitor::spawn(Arc::clone(&registry), id, clock);

    let result = tokio::select! {
        // Prioritize shutdown signals.
        biased;

        signal = shutdown_signal() => {
            signal.map(|signal| info!("received {signal}, shutting down gracefully"))
        }

        () = monitor.join() => {
            debug!("song ended");
            Ok(())
        }
    };

    registry.destroy();
    shutdown.cancel();
    registry.wait().await;

    result.map_err(Into::into)
}

/// Main entry point of the application.
///
/// This function initializes the logger facade, parses the command line
/// arguments, and plays the song.
#[tokio::main]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {:#?}", args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    info!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}

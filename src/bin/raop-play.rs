//! Command-line front end: stream one M4A file to one AirPort Express.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use raop_client::mp4::M4aFile;
use raop_client::protocol::raop::RaopSession;

/// Stream Apple Lossless audio from a local M4A file to an AirTunes receiver.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Receiver hostname or IP address.
    host: String,

    /// M4A file to stream.
    file: PathBuf,

    /// RTSP control port.
    #[arg(short, long, default_value_t = 5000)]
    port: u16,

    /// Start position in seconds.
    #[arg(short, long, default_value_t = 0.0)]
    start: f64,

    /// Volume, 0.0 (muted) to 30.0 (full).
    #[arg(short, long, default_value_t = 30.0)]
    volume: f64,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "playback failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), raop_client::RaopError> {
    let file = M4aFile::open(&args.file)?;
    tracing::info!(path = %args.file.display(), descriptor = ?file.descriptor(), "opened file");

    let mut session = RaopSession::connect(&args.host, args.port, file).await?;
    session.set_volume(args.volume).await?;
    session.play(args.start).await?;
    session.wait().await;
    session.stop().await?;
    session.close().await;
    Ok(())
}

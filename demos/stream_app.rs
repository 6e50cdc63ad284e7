//! Stream one application's audio to an MP3 file.
//!
//! Follows the application across route changes (restart the player, switch
//! tracks in a browser tab) until Ctrl+C. Needs `pactl`, `parec` and `lame`.
//!
//! Run with: cargo run --example stream_app -- firefox [out.mp3]

use stream_app_audio::{StreamAppAudio, StreamEvent};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let Some(app) = args.next() else {
        eprintln!("usage: stream_app <application name> [output.mp3]");
        std::process::exit(2);
    };
    let output = args.next().unwrap_or_else(|| format!("{app}.mp3"));

    let session = StreamAppAudio::builder(&app)
        .on_event(|event| match event {
            StreamEvent::RouteChanged { previous, current } => {
                println!("Route changed: {previous:?} -> {current}");
            }
            StreamEvent::PipelineStartFailed { route_id, stage, error, .. } => {
                println!("Route {route_id}: {stage} failed: {error}");
            }
            _ => {}
        })
        .start()
        .await?;

    println!("Streaming '{app}' to {output}. Press Ctrl+C to stop.");

    let mut file = BufWriter::new(File::create(&output).await?);
    tokio::select! {
        copied = session.copy_to(&mut file) => {
            println!("Stream ended after {} bytes", copied?);
        }
        _ = tokio::signal::ctrl_c() => {
            println!("Stopping...");
        }
    }

    file.flush().await?;
    let stats = session.stats();
    session.stop().await;

    println!("Saved to {output}");
    println!("Stats: {stats:?}");

    Ok(())
}

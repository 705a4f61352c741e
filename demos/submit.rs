//! Submit one job and stream its output.
//!
//! ```text
//! cargo run --example submit -- reverse "hello world"
//! RUST_LOG=gearman_client=debug cargo run --example submit -- --addr localhost reverse hi
//! ```

use std::io::Write;

use clap::Parser;
use gearman_client::Client;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "submit", about = "Submit a job to a Gearman server")]
struct Cli {
    /// Job server address; the port defaults to 4730
    #[arg(long, default_value = "127.0.0.1:4730")]
    addr: String,

    /// Function name registered by a worker
    #[arg(default_value = "reverse")]
    function: String,

    /// Job payload
    #[arg(default_value = "")]
    payload: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    let client = Client::connect(&cli.addr).await?;
    let mut job = client.submit(&cli.function, cli.payload).await?;
    tracing::info!("Submitted {} as job {}", cli.function, job.handle());

    let mut stdout = std::io::stdout();
    while let Some(chunk) = job.next_data().await {
        stdout.write_all(&chunk)?;
        stdout.flush()?;
    }
    while let Some(warning) = job.try_next_warning() {
        tracing::warn!("{}", String::from_utf8_lossy(&warning));
    }

    job.wait().await;
    println!();
    println!("{}", serde_json::to_string_pretty(&job.status())?);

    client.close().await?;
    Ok(())
}

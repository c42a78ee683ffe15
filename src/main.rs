//! BandHub Server Binary
//!
//! Main entry point for the BandHub TCP server

use bandhub::{codec::DEFAULT_MAX_FRAME_LEN, console, BandServer, Result, ServerConfig};
use clap::Parser;
use std::path::PathBuf;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(author, version, about = "Shared music band collection server", long_about = None)]
struct Args {
    /// Socket address to listen on
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// SQLite database file
    #[arg(long, default_value = "bands.db")]
    db: PathBuf,

    /// Table holding the bands
    #[arg(long, default_value = "music_bands")]
    table: String,

    /// Table holding registered users
    #[arg(long, default_value = "users")]
    users_table: String,

    /// Largest accepted request body in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_LEN)]
    max_frame_len: usize,
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();

    let args = Args::parse();
    let config = ServerConfig {
        bind_addr: args.listen,
        db_path: args.db,
        table_name: args.table,
        users_table: args.users_table,
        max_frame_len: args.max_frame_len,
    };

    let server = BandServer::new(config).await?;

    std::thread::spawn(|| {
        if let Err(err) = console::watch_console(std::io::stdin().lock()) {
            warn!(error = %err, "console input closed");
        }
    });

    server
        .run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await
}

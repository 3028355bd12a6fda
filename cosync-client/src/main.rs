//! cosync console client — entry point.
//!
//! ```text
//! cosync-client                       Connect with defaults
//! cosync-client --config <path>      Use custom config TOML
//! cosync-client --gen-config         Dump default config and exit
//! cosync-client --dump-tree out.json Write the replica on exit
//! ```

use std::io::BufRead;
use std::path::PathBuf;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use cosync_core::{ReplicaTree, SessionHandle, SyncSession};

use cosync_client::config::ClientConfig;
use cosync_client::console::{ConsoleSink, Input, parse_input};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "cosync-client", about = "Collaborative catalog sync client")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "cosync-client.toml")]
    config: PathBuf,

    /// Identity to announce (overrides config).
    #[arg(short, long)]
    identity: Option<String>,

    /// Relay address (overrides config). Example: relay.local:8189
    #[arg(short, long)]
    relay: Option<String>,

    /// Connect over plain TCP only.
    #[arg(long)]
    no_tls: bool,

    /// Ring the terminal bell on incoming chat.
    #[arg(long)]
    bell: bool,

    /// Write the replica as JSON to this path (`-` for stdout) on exit.
    #[arg(long)]
    dump_tree: Option<String>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

fn apply_relay_override(config: &mut ClientConfig, addr: &str) -> Result<(), String> {
    match addr.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse()
                .map_err(|_| format!("invalid relay port in {addr:?}"))?;
            config.relay.host = host.to_string();
            config.relay.port = port;
        }
        None => config.relay.host = addr.to_string(),
    }
    Ok(())
}

/// Read stdin on a plain thread so a blocked read never holds up runtime
/// shutdown.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn forward(handle: &SessionHandle, input: Input) -> bool {
    let result = match input {
        Input::Chat(text) => handle.chat(text),
        Input::Local(op) => handle.submit(op),
        Input::Who => handle.who(),
        Input::Empty => Ok(()),
        Input::Quit => return false,
    };
    if let Err(e) = result {
        warn!("failed to queue input: {e}");
    }
    true
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ClientConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ClientConfig::load(&cli.config);
    if let Some(identity) = cli.identity {
        config.identity.name = identity;
    }
    if let Some(addr) = cli.relay.as_deref() {
        apply_relay_override(&mut config, addr)?;
    }
    if cli.no_tls {
        config.relay.tls = false;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("cosync-client v{}", env!("CARGO_PKG_VERSION"));

    // ── 1. Connect and announce ─────────────────────────────────

    let identity = config.identity.name.clone();
    let sink = ConsoleSink::new(std::io::stdout()).with_bell(cli.bell);
    let session = SyncSession::connect(config.to_session_config(), ReplicaTree::new(), sink).await?;
    let handle = session.handle();
    let mut running = tokio::spawn(session.run());

    // ── 2. Input loop ───────────────────────────────────────────

    let mut lines = spawn_stdin_reader();
    let mut stopping = false;
    let finished = loop {
        tokio::select! {
            finished = &mut running => break finished?,
            line = lines.recv(), if !stopping => {
                let keep_going = match line {
                    Some(line) => match parse_input(&line, &identity) {
                        Ok(input) => forward(&handle, input),
                        Err(e) => {
                            eprintln!("[error] {e}");
                            true
                        }
                    },
                    None => false,
                };
                if !keep_going {
                    stopping = true;
                    if let Err(e) = handle.disconnect() {
                        warn!("disconnect failed: {e}");
                    }
                }
            }
            _ = tokio::signal::ctrl_c(), if !stopping => {
                info!("interrupted");
                stopping = true;
                if let Err(e) = handle.disconnect() {
                    warn!("disconnect failed: {e}");
                }
            }
        }
    };

    // ── 3. Shutdown ─────────────────────────────────────────────

    if let Some(target) = cli.dump_tree.as_deref() {
        let json = serde_json::to_string_pretty(&finished.store.snapshot())?;
        if target == "-" {
            println!("{json}");
        } else {
            std::fs::write(target, json)?;
            info!("replica written to {target}");
        }
    }

    if finished.expected {
        info!("shutting down");
        Ok(())
    } else {
        error!("relay connection lost: {}", finished.reason);
        Err(finished.reason.into())
    }
}

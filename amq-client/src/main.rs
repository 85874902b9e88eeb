//! amq - command-line client for audio manager nodes
//!
//! Listens to node, brain and session streams, and sends node commands.
//!
//! ```text
//! amq listen node --source-name kitchen --wanted-info QUEUE,HEALTH
//! amq listen brain
//! amq listen --command "jq .QUEUE" node --source-name kitchen
//! amq send node --source-name kitchen move-queue-item --old-pos 2 --new-pos 0
//! amq --dry-run send node --source-name kitchen play-next
//! ```

use std::path::PathBuf;
use std::process::Stdio;

use amq_client::channel::{Command, CommandEnvelope, CommandTransport, HttpCommandChannel};
use amq_client::session::{ConnectionStatus, Session, SessionConfig};
use amq_client::{ClientConfig, HandlerTable};
use amq_common::config::{ConfigOverrides, TomlConfig};
use amq_common::protocol::{Capability, EventKey, LoopBounds, MoveQueueItemParams, StreamEvent};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "amq")]
#[command(about = "Listen to and command audio manager nodes")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    action: Action,

    /// Server address
    #[arg(long, global = true)]
    host: Option<String>,

    /// Server port
    #[arg(short, long, global = true)]
    port: Option<u16>,

    /// Use wss/https
    #[arg(long, global = true)]
    secure: bool,

    /// Config file (default: <config dir>/amq/config.toml)
    #[arg(short, long, global = true, env = "AMQ_CONFIG")]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is not set
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Only print url and body instead of performing network actions
    #[arg(short, long, global = true)]
    dry_run: bool,
}

#[derive(Debug, Clone, Subcommand)]
enum Action {
    /// Listen for stream updates
    Listen {
        /// Program to feed each received message on stdin, instead of printing events
        #[arg(short, long)]
        command: Option<String>,
        #[command(subcommand)]
        stream: ListenStream,
    },
    /// Send a command
    Send {
        #[command(subcommand)]
        target: SendTarget,
    },
}

#[derive(Debug, Clone, Subcommand)]
enum ListenStream {
    /// Updates from one audio node
    Node {
        /// Name of the node to connect to
        #[arg(short, long)]
        source_name: String,
        /// Information to listen for
        #[arg(short, long, value_delimiter = ',', default_value = "QUEUE,HEALTH,AUDIO_STATE_INFO")]
        wanted_info: Vec<Capability>,
    },
    /// Node list from the brain
    Brain {
        /// Information to listen for
        #[arg(short, long, value_delimiter = ',', default_value = "NODE_INFO")]
        wanted_info: Vec<Capability>,
    },
    /// Node-less session socket
    Session {
        #[arg(short, long, value_delimiter = ',', default_value = "QUEUE")]
        wanted_info: Vec<Capability>,
    },
}

#[derive(Debug, Clone, Subcommand)]
enum SendTarget {
    /// Send a command to an audio node
    Node {
        /// Name of the node to send to
        #[arg(short, long)]
        source_name: String,
        #[command(subcommand)]
        cmd: CliNodeCommand,
    },
}

#[derive(Debug, Clone, Subcommand)]
enum CliNodeCommand {
    AddQueueItem {
        #[arg(short, long)]
        title: String,
        #[arg(short, long)]
        url: String,
    },
    RemoveQueueItem {
        index: usize,
    },
    MoveQueueItem {
        #[arg(short, long)]
        old_pos: usize,
        #[arg(short, long)]
        new_pos: usize,
    },
    ShuffleQueue,
    SetAudioVolume {
        #[arg(short, long)]
        volume: f32,
    },
    SetAudioProgress {
        #[arg(long)]
        progress: f64,
    },
    PauseQueue,
    UnPauseQueue,
    PlayNext,
    PlayPrevious,
    PlaySelected {
        index: usize,
    },
    LoopQueue {
        #[arg(long, requires = "end")]
        start: Option<usize>,
        #[arg(long, requires = "start")]
        end: Option<usize>,
    },
}

impl From<CliNodeCommand> for Command {
    fn from(cmd: CliNodeCommand) -> Self {
        match cmd {
            CliNodeCommand::AddQueueItem { title, url } => Command::AddQueueItem {
                title,
                url,
                source_name: None,
            },
            CliNodeCommand::RemoveQueueItem { index } => Command::RemoveQueueItem { index },
            CliNodeCommand::MoveQueueItem { old_pos, new_pos } => {
                Command::MoveQueueItem(MoveQueueItemParams { old_pos, new_pos })
            }
            CliNodeCommand::ShuffleQueue => Command::ShuffleQueue,
            CliNodeCommand::SetAudioVolume { volume } => Command::SetAudioVolume { volume },
            CliNodeCommand::SetAudioProgress { progress } => Command::SetAudioProgress { progress },
            CliNodeCommand::PauseQueue => Command::Pause,
            CliNodeCommand::UnPauseQueue => Command::UnPause,
            CliNodeCommand::PlayNext => Command::PlayNext,
            CliNodeCommand::PlayPrevious => Command::PlayPrevious,
            CliNodeCommand::PlaySelected { index } => Command::PlaySelected { index },
            CliNodeCommand::LoopQueue { start, end } => Command::LoopQueue {
                bounds: start.zip(end).map(|(start, end)| LoopBounds { start, end }),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries stream output. The filter is swapped for the
    // configured level once the config file is read, unless RUST_LOG is set.
    let env_filter = EnvFilter::try_from_default_env().ok();
    let from_env = env_filter.is_some();
    let initial = env_filter
        .unwrap_or_else(|| EnvFilter::new(args.log_level.as_deref().unwrap_or("info")));
    let (filter, filter_handle) = reload::Layer::new(initial);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let toml_config = TomlConfig::load(&ConfigOverrides {
        config_path: args.config.clone(),
        host: args.host.clone(),
        port: args.port,
        secure: args.secure.then_some(true),
        log_level: args.log_level.clone(),
    })
    .context("Failed to load configuration")?;

    if !from_env {
        filter_handle
            .reload(EnvFilter::new(&toml_config.logging.level))
            .context("Failed to apply configured log level")?;
    }

    info!(
        "amq v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let config = ClientConfig::from(&toml_config);

    match args.action {
        Action::Listen { command, stream } => {
            let url = match &stream {
                ListenStream::Node {
                    source_name,
                    wanted_info,
                } => config.node_stream_url(source_name, wanted_info)?,
                ListenStream::Brain { wanted_info } => config.brain_stream_url(wanted_info)?,
                ListenStream::Session { wanted_info } => config.session_stream_url(wanted_info)?,
            };

            if args.dry_run {
                println!("{url}");
                return Ok(());
            }
            listen(&url, &config, command).await
        }
        Action::Send {
            target: SendTarget::Node { source_name, cmd },
        } => {
            let channel = HttpCommandChannel::new(config);
            let envelope = CommandEnvelope::new(cmd.into(), Some(source_name));

            if args.dry_run {
                let (url, body) = channel.describe(&envelope)?;
                println!("{url}");
                println!("{body}");
                return Ok(());
            }

            channel
                .send(envelope)
                .await
                .context("Failed to send command")?;
            info!("Command accepted");
            Ok(())
        }
    }
}

/// Print every decoded event, or pipe every message into `command`, until the stream ends
async fn listen(url: &str, config: &ClientConfig, command: Option<String>) -> Result<()> {
    let table = HandlerTable::new();
    match command {
        Some(command) => {
            let (frames, rx) = mpsc::unbounded_channel::<String>();
            table.on_frame(move |text| {
                let _ = frames.send(text.to_string());
            });
            tokio::spawn(run_hook(command, rx));
        }
        None => print_events(&table),
    }

    let mut session = Session::connect(
        url,
        table,
        SessionConfig {
            heartbeat: config.timeouts.heartbeat,
        },
    )
    .await
    .with_context(|| format!("Failed to connect to {url}"))?;

    let status = session.closed().await;
    if status == ConnectionStatus::Unknown {
        warn!("Stream ended");
    }
    Ok(())
}

/// Run `command` once per message, in arrival order, with the message on stdin
async fn run_hook(command: String, mut messages: mpsc::UnboundedReceiver<String>) {
    let mut parts = command.split_whitespace();
    let Some(program) = parts.next() else {
        warn!("Empty --command, messages are dropped");
        return;
    };
    let args: Vec<&str> = parts.collect();

    while let Some(text) = messages.recv().await {
        match pipe_through(program, &args, &text).await {
            Ok(output) => print!("{output}"),
            Err(e) => warn!("{} failed: {:#}", program, e),
        }
    }
}

async fn pipe_through(program: &str, args: &[&str], input: &str) -> Result<String> {
    let mut child = tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to start {program}"))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input.as_bytes()).await?;
    }

    let output = child.wait_with_output().await?;
    debug!("{} exited with {}", program, output.status);
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn print_events(table: &HandlerTable) {
    for key in [
        EventKey::Queue,
        EventKey::Health,
        EventKey::AudioState,
        EventKey::NodeInfo,
        EventKey::Downloads,
        EventKey::Sources,
        EventKey::ActiveSource,
        EventKey::DownloadFinished,
        EventKey::ServerError,
    ] {
        table.on(key, print_event);
    }
}

fn print_event(event: &StreamEvent) {
    match event {
        StreamEvent::Queue { items, .. } => {
            println!("queue ({} items)", items.len());
            for (index, item) in items.iter().enumerate() {
                println!("  {index}: {}", item.display_name());
            }
        }
        StreamEvent::Health(health) => println!("health: {health}"),
        StreamEvent::AudioState(state) => println!(
            "playback: {} at {} ({:.1}%)",
            state.processor_info.playback_state,
            state.playback_info.current_queue_index,
            state.processor_info.audio_progress * 100.0
        ),
        StreamEvent::NodeInfo(nodes) => {
            println!("nodes ({})", nodes.len());
            for node in nodes {
                println!(
                    "  {} [{}]: {}",
                    node.human_readable_name, node.source_name, node.health
                );
            }
        }
        StreamEvent::Downloads(downloads) => println!(
            "downloads: {} active, {} failed",
            downloads.active.len(),
            downloads.failed.len()
        ),
        StreamEvent::Sources(sources) => println!("sources: {}", sources.join(", ")),
        StreamEvent::ActiveSource(name) => println!("active source: {name}"),
        StreamEvent::DownloadFinished { error: None } => println!("download finished"),
        StreamEvent::DownloadFinished { error: Some(error) } => {
            println!("download failed: {error}")
        }
        StreamEvent::ServerError(message) => println!("server error: {message}"),
    }
}

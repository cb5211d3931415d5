use std::fmt;

use roadmap_core::aggregate;
use roadmap_core::model::{NodeId, RoadmapId, UserId};
use services::push::ChannelState;
use services::{Clock, ConfigError, SyncConfig, SyncServices};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingArgument { name: &'static str },
    UnknownArg(String),
    InvalidUserId { raw: String },
    InvalidRoadmapId { raw: String },
    InvalidSection { raw: String },
    InvalidNodeId { raw: String },
    InvalidCacheUrl { raw: String },
    NoUser { command: &'static str },
    Config(ConfigError),
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingArgument { name } => write!(f, "missing <{name}>"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidUserId { raw } => write!(f, "invalid --user value: {raw}"),
            ArgsError::InvalidRoadmapId { raw } => write!(f, "invalid roadmap id: {raw}"),
            ArgsError::InvalidSection { raw } => write!(f, "invalid section index: {raw}"),
            ArgsError::InvalidNodeId { raw } => write!(f, "invalid node id: {raw:?}"),
            ArgsError::InvalidCacheUrl { raw } => write!(f, "invalid --cache value: {raw}"),
            ArgsError::NoUser { command } => {
                write!(f, "{command} needs a user (--user or ROADMAP_USER_ID)")
            }
            ArgsError::Config(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for ArgsError {}

impl From<ConfigError> for ArgsError {
    fn from(err: ConfigError) -> Self {
        ArgsError::Config(err)
    }
}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  roadmap-sync watch    [flags]");
    eprintln!("  roadmap-sync toggle   <roadmap-id> <section-index> <node-id> [flags]");
    eprintln!("  roadmap-sync progress [<roadmap-id>] [flags]");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --api <url>      REST base (default http://localhost:5000)");
    eprintln!("  --ws <url>       push channel URL (default derived from --api)");
    eprintln!("  --user <id>      current user");
    eprintln!("  --cache <path>   SQLite progress cache (default: in memory)");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  ROADMAP_API_URL, ROADMAP_WS_URL, ROADMAP_API_TOKEN, ROADMAP_USER_ID,");
    eprintln!("  ROADMAP_CACHE_DB, ROADMAP_RECONNECT_BASE_MS, ROADMAP_RECONNECT_MAX_MS,");
    eprintln!("  ROADMAP_CONNECT_TIMEOUT_MS, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Watch,
    Toggle,
    Progress,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "watch" => Some(Self::Watch),
            "toggle" => Some(Self::Toggle),
            "progress" => Some(Self::Progress),
            _ => None,
        }
    }
}

#[derive(Debug)]
enum Target {
    Watch,
    Toggle {
        roadmap_id: RoadmapId,
        section: usize,
        node: NodeId,
    },
    Progress {
        roadmap_id: Option<RoadmapId>,
    },
}

struct Args {
    config: SyncConfig,
    target: Target,
}

impl Args {
    /// Flags override `ROADMAP_*` variables; positionals are collected in order.
    fn parse(
        cmd: Command,
        args: &mut impl Iterator<Item = String>,
        mut config: SyncConfig,
    ) -> Result<Self, ArgsError> {
        let mut positional = Vec::new();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--api" => config.set_api_url(&require_value(args, "--api")?)?,
                "--ws" => config.set_ws_url(&require_value(args, "--ws")?)?,
                "--user" => {
                    let value = require_value(args, "--user")?;
                    let user = value
                        .parse::<UserId>()
                        .map_err(|_| ArgsError::InvalidUserId { raw: value.clone() })?;
                    config.user_id = Some(user);
                }
                "--cache" => {
                    let value = require_value(args, "--cache")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidCacheUrl { raw: value });
                    }
                    config.cache_db = Some(normalize_sqlite_url(value));
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ if arg.starts_with("--") => return Err(ArgsError::UnknownArg(arg)),
                _ => positional.push(arg),
            }
        }

        let mut positional = positional.into_iter();
        let target = match cmd {
            Command::Watch => Target::Watch,
            Command::Progress => Target::Progress {
                roadmap_id: positional.next().map(parse_roadmap_id).transpose()?,
            },
            Command::Toggle => {
                let roadmap_id = parse_roadmap_id(
                    positional
                        .next()
                        .ok_or(ArgsError::MissingArgument { name: "roadmap-id" })?,
                )?;
                let raw = positional
                    .next()
                    .ok_or(ArgsError::MissingArgument { name: "section-index" })?;
                let section = raw
                    .parse::<usize>()
                    .map_err(|_| ArgsError::InvalidSection { raw })?;
                let raw = positional
                    .next()
                    .ok_or(ArgsError::MissingArgument { name: "node-id" })?;
                let node = NodeId::new(raw.clone()).map_err(|_| ArgsError::InvalidNodeId { raw })?;
                Target::Toggle {
                    roadmap_id,
                    section,
                    node,
                }
            }
        };
        if let Some(extra) = positional.next() {
            return Err(ArgsError::UnknownArg(extra));
        }

        if matches!(target, Target::Watch | Target::Toggle { .. }) && config.user_id.is_none() {
            return Err(ArgsError::NoUser {
                command: if cmd == Command::Watch { "watch" } else { "toggle" },
            });
        }

        Ok(Self { config, target })
    }
}

fn parse_roadmap_id(raw: String) -> Result<RoadmapId, ArgsError> {
    raw.parse::<RoadmapId>()
        .map_err(|_| ArgsError::InvalidRoadmapId { raw })
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}?mode=rwc", absolute.display())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    // No subcommand means `watch`.
    let cmd = match argv.first().map(String::as_str) {
        None => Command::Watch,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Watch,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };
    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let config = SyncConfig::from_env()?;
    let parsed = Args::parse(cmd, &mut argv.into_iter(), config).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let services = SyncServices::from_config(&parsed.config, Clock::system()).await?;
    match parsed.target {
        Target::Watch => watch(&services).await,
        Target::Toggle {
            roadmap_id,
            section,
            node,
        } => toggle(&services, roadmap_id, section, &node).await,
        Target::Progress { roadmap_id } => progress(&services, roadmap_id).await,
    }
}

async fn watch(services: &SyncServices) -> Result<(), Box<dyn std::error::Error>> {
    let mut notices = services.events().subscribe();
    let channel = services.spawn_push();
    let mut state = channel.watch_state();
    tracing::info!("watching progress events, ctrl-c to stop");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                if current == ChannelState::Reconnecting {
                    tracing::warn!("push channel lost, reconnecting");
                }
            }
            notice = notices.recv() => match notice {
                Ok(notice) => println!("{}: {}", notice.title, notice.message),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "notification consumer fell behind");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    channel.shutdown().await;
    Ok(())
}

async fn toggle(
    services: &SyncServices,
    roadmap_id: RoadmapId,
    section: usize,
    node: &NodeId,
) -> Result<(), Box<dyn std::error::Error>> {
    let mutator = services
        .mutator()
        .ok_or(ArgsError::NoUser { command: "toggle" })?;
    let outcome = mutator.toggle_node(roadmap_id, section, node).await?;
    if outcome.created {
        println!("started roadmap {roadmap_id}");
    }
    println!(
        "{node}: {:?} -> {:?} (sent {})",
        outcome.transition.from, outcome.transition.to, outcome.transition.action
    );
    println!(
        "section {section}: {}/{} completed ({}%)",
        outcome.section.completed_nodes, outcome.section.total_nodes, outcome.section.percentage
    );
    Ok(())
}

async fn progress(
    services: &SyncServices,
    roadmap_id: Option<RoadmapId>,
) -> Result<(), Box<dyn std::error::Error>> {
    let queries = services.queries();
    let Some(roadmap_id) = roadmap_id else {
        let records = queries.list().await?;
        if records.is_empty() {
            println!("no progress yet");
            return Ok(());
        }
        let recent = aggregate::most_recent(&records).map(|r| r.roadmap_id);
        for record in &records {
            let overview = aggregate::overview(&record.progress);
            let marker = if Some(record.roadmap_id) == recent { "*" } else { " " };
            println!(
                "{marker} roadmap {:>4}  {:>3}%  last accessed {}",
                record.roadmap_id,
                overview.overall.percentage,
                record.last_accessed_at.format("%Y-%m-%d %H:%M")
            );
        }
        return Ok(());
    };

    let Some(record) = queries.for_roadmap(roadmap_id).await? else {
        println!("roadmap {roadmap_id}: not started");
        return Ok(());
    };
    let overview = aggregate::overview(&record.progress);
    println!("roadmap {roadmap_id}: {}% overall", overview.overall.percentage);
    for (index, (section, stats)) in record
        .progress
        .sections()
        .iter()
        .zip(&overview.sections)
        .enumerate()
    {
        let marker = if overview.current_section == Some(index) { ">" } else { " " };
        println!(
            "{marker} {index:>2}. {:<32} {}/{} ({}%)",
            section.title(),
            stats.completed_nodes,
            stats.total_nodes,
            stats.percentage
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        // Binary glue prints once.
        eprintln!("{err}");
        std::process::exit(2);
    }
}

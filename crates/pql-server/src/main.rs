//! PQL server — entry point.

use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use pql::plan::META_COMMANDS;
use pql::token::VERBS;
use pql_server::config::{Backend, ServerConfig};
use pql_server::protocol::ProtocolHandler;
use pql_server::transport::StdioTransport;
use pql_server::types::error_codes;

#[derive(Parser)]
#[command(
    name = "pql",
    about = "PQL — query schema-described entities over stdio, WebSocket, or a local REPL",
    version
)]
struct Cli {
    /// Path to a registry JSON file.
    /// Falls back to PQL_REGISTRY, ./.pql/registry.json, ~/.pql/registry.json, then the sample registry.
    #[arg(short, long, global = true)]
    registry: Option<String>,

    /// Path to a seed data JSON file. Also reads PQL_DATA.
    #[arg(short, long, global = true)]
    data: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Session and execution tunables shared by the server commands.
#[derive(Args, Clone, Default)]
struct Tuning {
    /// Rows per `rows` frame.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Per-statement execution timeout, in seconds.
    #[arg(long)]
    exec_timeout: Option<u64>,

    /// Seconds a session may stay idle before it is evicted.
    #[arg(long)]
    idle_timeout: Option<u64>,

    /// Make every session read-only.
    #[arg(long)]
    read_only: bool,
}

impl Tuning {
    fn config(&self) -> ServerConfig {
        let mut config = ServerConfig::default();
        if let Some(n) = self.batch_size {
            config.batch_size = n.max(1);
        }
        if let Some(secs) = self.exec_timeout {
            config.execution_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = self.idle_timeout {
            config.idle_timeout = Duration::from_secs(secs);
        }
        config.read_only = self.read_only;
        config
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Serve one session over stdio, one JSON frame per line (default).
    Serve {
        #[command(flatten)]
        tuning: Tuning,
    },

    /// Serve WebSocket sessions over HTTP.
    #[cfg(feature = "http")]
    ServeHttp {
        /// Listen address (host:port).
        #[arg(long, default_value = "127.0.0.1:7878")]
        addr: String,

        /// Bearer token for authentication.
        /// Also reads from PQL_TOKEN env var.
        #[arg(long)]
        token: Option<String>,

        #[command(flatten)]
        tuning: Tuning,
    },

    /// Launch interactive REPL mode.
    Repl {
        /// Reject mutations.
        #[arg(long)]
        read_only: bool,
    },

    /// Print the registry (or one entity) as JSON.
    Schema {
        /// Entity to print.
        entity: Option<String>,
    },

    /// Validate the registry and seed data.
    Validate,

    /// Print server capabilities as JSON.
    Info,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   pql completions bash > ~/.local/share/bash-completion/completions/pql
    ///   pql completions zsh > ~/.zfunc/_pql
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let registry = cli.registry.as_deref();
    let data = cli.data.as_deref();

    match cli.command.unwrap_or(Commands::Serve {
        tuning: Tuning::default(),
    }) {
        Commands::Serve { tuning } => {
            let backend = Backend::open(registry, data)?;
            let handler = ProtocolHandler::new(backend, tuning.config());
            let transport = StdioTransport::new(handler);
            transport.run().await?;
        }

        #[cfg(feature = "http")]
        Commands::ServeHttp {
            addr,
            token,
            tuning,
        } => {
            use pql_server::config::resolve_token;
            use pql_server::transport::HttpTransport;

            let effective_token = resolve_token(token);
            let backend = Backend::open(registry, data)?;
            tracing::info!("PQL server ({})", backend.source);
            if effective_token.is_some() {
                tracing::info!("Auth: bearer token required");
            }

            let handler = ProtocolHandler::new(backend, tuning.config());
            let transport = HttpTransport::new(handler, effective_token);
            transport.run(&addr).await?;
        }

        Commands::Repl { read_only } => {
            let backend = Backend::open(registry, data)?;
            let config = ServerConfig {
                read_only,
                ..ServerConfig::default()
            };
            pql_server::repl::run(backend, config)?;
        }

        Commands::Schema { entity } => {
            let backend = Backend::open(registry, data)?;
            match entity {
                Some(name) => match backend.registry.entity(&name) {
                    Some(schema) => println!("{}", serde_json::to_string_pretty(schema)?),
                    None => {
                        eprintln!("Unknown entity: {name}");
                        std::process::exit(1);
                    }
                },
                None => println!("{}", backend.registry.to_json()?),
            }
        }

        Commands::Validate => match Backend::open(registry, data) {
            Ok(backend) => {
                println!("Valid registry: {}", backend.source);
                for entity in backend.registry.entities() {
                    println!(
                        "  {:<20} {} fields, {} edges{}",
                        entity.name,
                        entity.fields.len(),
                        entity.edges.len(),
                        if entity.immutable { ", immutable" } else { "" }
                    );
                }
                println!("  Adaptors: {}", backend.dispatch.len());
            }
            Err(e) => {
                eprintln!("Invalid registry: {e}");
                std::process::exit(1);
            }
        },

        Commands::Info => {
            let backend = Backend::open(registry, data)?;
            let info = serde_json::json!({
                "server": { "name": "pql", "version": env!("CARGO_PKG_VERSION") },
                "registry": backend.source.to_string(),
                "entities": backend.registry.entity_names().collect::<Vec<_>>(),
                "verbs": VERBS,
                "meta_commands": META_COMMANDS.iter().map(|(name, _)| format!(":{name}")).collect::<Vec<_>>(),
                "messages": {
                    "client": ["execute", "cancel", "autocomplete", "ping"],
                    "server": ["meta", "rows", "done", "error", "completions", "session", "pong"],
                },
                "error_codes": [
                    error_codes::LEX_ERROR,
                    error_codes::PARSE_ERROR,
                    error_codes::PLAN_ERROR,
                    error_codes::NOT_FOUND,
                    error_codes::EXECUTION_ERROR,
                    error_codes::CANCELLED,
                    error_codes::TIMEOUT,
                    error_codes::BUSY,
                    error_codes::READ_ONLY,
                    error_codes::INVALID_MESSAGE,
                    error_codes::SESSION_EXPIRED,
                    error_codes::INTERNAL,
                ],
                "transports": transports(),
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "pql", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn transports() -> Vec<&'static str> {
    let mut out = vec!["stdio"];
    if cfg!(feature = "http") {
        out.push("websocket");
    }
    out
}

use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::warn;

use satchel_core::config::{self, BackendOptions, SessionConfig};
use satchel_core::kv::InMemoryKvStore;
use satchel_core::manager::{self, DurableSessionManager, MemorySessionManager};
use satchel_core::{request, BackendKind, Session, SessionManager, SessionValue};

#[derive(Parser)]
#[command(
    name = "satchel",
    about = "satchel - pluggable session storage",
    version = satchel_core::VERSION,
)]
struct Cli {
    #[command(flatten)]
    backend: BackendArgs,
    #[command(subcommand)]
    command: Commands,
}

/// Overrides for the loaded configuration.
#[derive(Args)]
struct BackendArgs {
    /// Backend provider: memory or redis
    #[arg(long, global = true)]
    provider: Option<String>,
    /// Store address (host:port)
    #[arg(long, global = true)]
    address: Option<String>,
    /// Store credential
    #[arg(long, global = true)]
    password: Option<String>,
    /// Namespace (database) index
    #[arg(long, global = true)]
    db: Option<i64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the effective configuration
    Status,
    /// Connect to the configured backend and check it answers
    Probe,
    /// Create a session, optionally with initial KEY=VALUE pairs
    Create {
        pairs: Vec<String>,
        /// Expiration in seconds (defaults to the configured TTL)
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Print the stored values of a session
    Show { id: String },
    /// Set one value on a stored session
    Set {
        id: String,
        key: String,
        value: String,
    },
    /// Delete one value from a stored session
    Del { id: String, key: String },
    /// Walk through a login round trip on both backends, in process
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("satchel=info".parse().unwrap())
                .add_directive("satchel_core=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let cfg = effective_config(&cli.backend)?;

    match cli.command {
        Commands::Status => cmd_status(&cfg),
        Commands::Probe => cmd_probe(&cfg).await?,
        Commands::Create { pairs, ttl } => cmd_create(&cfg, pairs, ttl).await?,
        Commands::Show { id } => cmd_show(&cfg, &id).await?,
        Commands::Set { id, key, value } => cmd_set(&cfg, &id, &key, &value).await?,
        Commands::Del { id, key } => cmd_del(&cfg, &id, &key).await?,
        Commands::Demo => cmd_demo().await?,
    }

    Ok(())
}

fn effective_config(args: &BackendArgs) -> Result<SessionConfig> {
    let mut cfg = config::load_config_from_env()?;
    if let Some(v) = &args.provider {
        cfg.provider = v.clone();
    }
    if let Some(v) = &args.address {
        cfg.address = v.clone();
    }
    if let Some(v) = &args.password {
        cfg.password = v.clone();
    }
    if let Some(v) = args.db {
        cfg.db = v;
    }
    Ok(cfg)
}

async fn open(cfg: &SessionConfig) -> Result<Arc<dyn SessionManager>> {
    let manager = manager::create_from_config(cfg).await?;
    if manager.backend() == BackendKind::Memory {
        warn!("memory backend: sessions live only as long as this process");
    }
    Ok(manager)
}

// ====== Commands ======

fn cmd_status(cfg: &SessionConfig) {
    let config_path = config::get_config_path();
    println!("satchel {}\n", satchel_core::VERSION);
    println!(
        "Config: {} {}",
        config_path.display(),
        if config_path.exists() { "✓" } else { "✗" }
    );
    println!("Provider: {}", cfg.provider);
    println!("Address: {}", cfg.address);
    println!(
        "Password: {}",
        if cfg.password.is_empty() { "not set" } else { "✓" }
    );
    println!("Namespace: {}", cfg.db);
    if !cfg.key_prefix.is_empty() {
        println!("Key prefix: {}", cfg.key_prefix);
    }
    println!(
        "Default TTL: {}",
        match cfg.default_ttl_secs {
            0 => "none".to_string(),
            secs => format!("{}s", secs),
        }
    );
}

async fn cmd_probe(cfg: &SessionConfig) -> Result<()> {
    let manager = open(cfg).await?;
    println!("✓ {} backend ready", manager.backend());
    Ok(())
}

async fn cmd_create(cfg: &SessionConfig, pairs: Vec<String>, ttl: Option<u64>) -> Result<()> {
    let manager = open(cfg).await?;
    let session = manager.create_session();

    for pair in &pairs {
        let (key, raw) = pair
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("expected KEY=VALUE, got '{}'", pair))?;
        session.set(key, SessionValue::parse_literal(raw));
    }
    if let Some(secs) = ttl {
        session.set_expired(secs);
    }

    session.save().await?;
    println!("{}", session.id());
    Ok(())
}

async fn cmd_show(cfg: &SessionConfig, id: &str) -> Result<()> {
    let manager = open(cfg).await?;
    let session = manager.get_session(id).await?;

    let values: serde_json::Map<String, serde_json::Value> = session
        .snapshot()
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect();
    println!("{}", serde_json::to_string_pretty(&values)?);

    manager.clear(id).await?;
    Ok(())
}

async fn cmd_set(cfg: &SessionConfig, id: &str, key: &str, raw: &str) -> Result<()> {
    let manager = open(cfg).await?;
    let session = manager.get_session(id).await?;
    let value = SessionValue::parse_literal(raw);
    println!("{} = {} ({})", key, raw, value.type_name());
    session.set(key, value);
    manager.clear(id).await?;
    Ok(())
}

async fn cmd_del(cfg: &SessionConfig, id: &str, key: &str) -> Result<()> {
    let manager = open(cfg).await?;
    let session = manager.get_session(id).await?;
    session.del(key);
    manager.clear(id).await?;
    println!("✓ removed {}", key);
    Ok(())
}

/// Login round trip: mark a session logged in, end the request, then come
/// back with the same id.
async fn cmd_demo() -> Result<()> {
    let store = Arc::new(InMemoryKvStore::new());
    let durable: Arc<dyn SessionManager> = Arc::new(
        DurableSessionManager::with_store(store.clone(), BackendOptions::default()).await?,
    );
    let memory: Arc<dyn SessionManager> = Arc::new(MemorySessionManager::new());

    for manager in [memory, durable] {
        println!("== {} backend", manager.backend());

        let first = request::begin(manager.as_ref(), None, 3600).await;
        first.session.set("isLogin", true.into());
        let id = first.id().to_string();
        println!("  request 1: new session {}", id);
        request::finish(manager.as_ref(), first).await?;

        // A memory session survives requests but not an explicit clear.
        manager.clear(&id).await?;

        match manager.get_session(&id).await {
            Ok(session) => println!(
                "  after clear: isLogin = {}",
                session
                    .get("isLogin")
                    .map(|v| v.to_json().to_string())
                    .unwrap_or_else(|e| e.to_string())
            ),
            Err(e) => println!("  after clear: {}", e),
        }
    }

    println!("\nstore writes: {}, reads: {}", store.writes(), store.reads());
    Ok(())
}

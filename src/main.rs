use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use token_exchange::cli::{self, AuditCommands, Commands, TokenCommands};
use token_exchange::config::{self, Config};
use token_exchange::models::audit::{AuditEventType, AuditLogQuery};
use token_exchange::models::token::Token;
use token_exchange::session::JwtSessionIssuer;
use token_exchange::store::memory::MemoryStore;
use token_exchange::store::postgres::PgStore;
use token_exchange::store::{AuditLogPersister, TokenPersister};
use token_exchange::{api, jobs, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    init_tracing();

    let cfg = config::load()?;

    let result = match args.command {
        Some(Commands::Serve { port, in_memory }) => {
            let port = port.unwrap_or(cfg.port);
            run_server(cfg, port, in_memory).await
        }
        Some(Commands::Migrate) => {
            let db = PgStore::connect(&cfg.database_url).await?;
            db.migrate().await?;
            println!("Migrations applied.");
            Ok(())
        }
        Some(Commands::Token { command }) => {
            let db = PgStore::connect(&cfg.database_url).await?;
            handle_token_command(command, &db, &cfg).await
        }
        Some(Commands::Audit { command }) => {
            let db = PgStore::connect(&cfg.database_url).await?;
            handle_audit_command(command, &db).await
        }
        None => {
            let port = cfg.port;
            run_server(cfg, port, false).await
        }
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "token_exchange=debug,tower_http=debug".into()),
    );

    let json = std::env::var("EXCHANGE_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

async fn run_server(cfg: Config, port: u16, in_memory: bool) -> anyhow::Result<()> {
    cfg.ensure_session_secret()?;

    let (tokens, audit_logs, db): (
        Arc<dyn TokenPersister>,
        Arc<dyn AuditLogPersister>,
        Option<PgStore>,
    ) = if in_memory {
        tracing::warn!("Running with in-memory storage; nothing survives a restart");
        let store = Arc::new(MemoryStore::new());
        let tokens: Arc<dyn TokenPersister> = store.clone();
        let audit_logs: Arc<dyn AuditLogPersister> = store;
        (tokens, audit_logs, None)
    } else {
        tracing::info!("Connecting to database...");
        let db = PgStore::connect(&cfg.database_url).await?;

        tracing::info!("Running migrations...");
        db.migrate().await?;

        let store = Arc::new(db.clone());
        let tokens: Arc<dyn TokenPersister> = store.clone();
        let audit_logs: Arc<dyn AuditLogPersister> = store;
        (tokens, audit_logs, Some(db))
    };

    let issuer = Arc::new(
        JwtSessionIssuer::new(cfg.service_name.clone(), &cfg.session)
            .context("failed to initialise session issuer")?,
    );

    let cleanup_every = cfg.cleanup_interval_secs;
    let state = Arc::new(AppState::new(cfg, tokens.clone(), audit_logs, issuer, db));

    if cleanup_every > 0 {
        jobs::cleanup::spawn(tokens, Duration::from_secs(cleanup_every));
        tracing::info!("Background token cleanup started (every {}s)", cleanup_every);
    }

    let app = api::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Token exchange listening on {}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

async fn handle_token_command(
    cmd: TokenCommands,
    db: &PgStore,
    cfg: &Config,
) -> anyhow::Result<()> {
    match cmd {
        TokenCommands::Create { user_id, lifespan } => {
            let user_id = uuid::Uuid::parse_str(&user_id).context("Invalid user_id")?;
            let lifespan = chrono::Duration::seconds(lifespan.unwrap_or(cfg.token.lifespan_secs));
            let token = Token::new(user_id, lifespan);
            db.create(&token).await?;

            println!("Token created.");
            println!("  ID:         {}", token.id);
            println!("  User:       {}", token.user_id);
            println!("  Expires at: {}", token.expires_at);
            println!("  Value:      {}", token.value);
        }
        TokenCommands::Purge => {
            let removed = jobs::cleanup::purge_expired(db).await?;
            println!("Purged {} expired token(s).", removed);
        }
    }
    Ok(())
}

async fn handle_audit_command(cmd: AuditCommands, db: &PgStore) -> anyhow::Result<()> {
    match cmd {
        AuditCommands::List {
            event_types,
            actor,
            ip,
            limit,
            offset,
        } => {
            let event_types = event_types
                .unwrap_or_default()
                .iter()
                .map(|t| t.parse::<AuditEventType>())
                .collect::<anyhow::Result<Vec<_>>>()?;
            let actor_user_id = actor
                .map(|a| uuid::Uuid::parse_str(&a))
                .transpose()
                .context("Invalid actor")?;

            let query = AuditLogQuery {
                offset,
                limit,
                event_types,
                actor_user_id,
                ip,
                ..Default::default()
            };

            let entries = db.list(&query).await?;
            if entries.is_empty() {
                println!("No audit entries found.");
                return Ok(());
            }

            println!(
                "{:<38} {:<26} {:<26} {:<38} ERROR",
                "ID", "TIME", "EVENT", "ACTOR"
            );
            for e in entries {
                println!(
                    "{:<38} {:<26} {:<26} {:<38} {}",
                    e.id.to_string(),
                    e.created_at.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
                    e.event_type,
                    e.actor_user_id.map(|u| u.to_string()).unwrap_or_else(|| "-".into()),
                    e.error.unwrap_or_default()
                );
            }
        }
    }
    Ok(())
}

use clap::{Parser, Subcommand};

/// One-time token exchange service
#[derive(Parser)]
#[command(name = "token-exchange", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind (defaults to EXCHANGE_PORT)
        #[arg(short, long)]
        port: Option<u16>,
        /// Keep tokens and audit entries in memory instead of Postgres
        #[arg(long)]
        in_memory: bool,
    },

    /// Apply pending database migrations
    Migrate,

    /// Manage exchange tokens
    Token {
        #[command(subcommand)]
        command: TokenCommands,
    },

    /// Inspect the audit trail
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Store a new token for a user and print its value
    Create {
        #[arg(long)]
        user_id: String,
        /// Lifespan in seconds (defaults to EXCHANGE_TOKEN_LIFESPAN)
        #[arg(long)]
        lifespan: Option<i64>,
    },
    /// Delete expired tokens
    Purge,
}

#[derive(Subcommand)]
pub enum AuditCommands {
    /// List audit entries, oldest first
    List {
        /// Event types to include
        #[arg(long = "type", value_delimiter = ',')]
        event_types: Option<Vec<String>>,
        #[arg(long)]
        actor: Option<String>,
        #[arg(long)]
        ip: Option<String>,
        #[arg(long, default_value = "50")]
        limit: i64,
        #[arg(long, default_value = "0")]
        offset: i64,
    },
}

//! konbini-access - operator tool for the Konbini access core
//!
//! Hashes and checks passwords, mints token pairs and inspects tokens using
//! the same configuration the vault service reads.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::BufRead;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use konbini_access::{
    auth::{hash_password, verify_password, TokenKind},
    config::{AuthArgs, AuthConfig},
    session::SessionManager,
    store::MemoryStore,
    types::UserId,
};

#[derive(Parser, Debug)]
#[command(name = "konbini-access", version, about = "Konbini vault access tooling")]
struct Cli {
    #[command(flatten)]
    auth: AuthArgs,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the Argon2id hash of a password (read from stdin when omitted)
    HashPassword { password: Option<String> },

    /// Check a password against a stored hash
    VerifyPassword { hash: String, password: Option<String> },

    /// Start a session and print the access grant and refresh cookie
    Issue {
        /// User id to issue for; a new one is generated when omitted
        #[arg(long)]
        user: Option<String>,
    },

    /// Validate a token and print its claims
    Inspect {
        token: String,
        #[arg(long, value_enum, default_value = "access")]
        kind: KindArg,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Access,
    Refresh,
}

impl From<KindArg> for TokenKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Access => TokenKind::Access,
            KindArg::Refresh => TokenKind::Refresh,
        }
    }
}

fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("konbini_access={},info", level).into());

    let (plain, structured) = if json {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (Some(tracing_subscriber::fmt::layer()), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(structured)
        .init();
}

fn password_or_stdin(password: Option<String>) -> anyhow::Result<String> {
    if let Some(password) = password {
        return Ok(password);
    }
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read password from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    info!(
        "konbini-access {} ({} built {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_SHORT"),
        env!("BUILD_TIMESTAMP")
    );

    match cli.command {
        Command::HashPassword { password } => {
            let password = password_or_stdin(password)?;
            println!("{}", hash_password(&password)?);
        }
        Command::VerifyPassword { hash, password } => {
            let password = password_or_stdin(password)?;
            if !verify_password(&password, &hash)? {
                bail!("password does not match");
            }
            println!("ok");
        }
        Command::Issue { user } => {
            let config = load_config(cli.auth)?;
            let user_id = match user {
                Some(text) => text.parse::<UserId>()?,
                None => UserId::generate(),
            };

            let sessions = SessionManager::from_config(&config, Arc::new(MemoryStore::new()))?;
            let issued = sessions.login(user_id).await?;

            println!("{}", serde_json::to_string_pretty(&issued.grant)?);
            println!("Set-Cookie: {}", issued.refresh_cookie);
        }
        Command::Inspect { token, kind } => {
            let config = load_config(cli.auth)?;
            let sessions = SessionManager::from_config(&config, Arc::new(MemoryStore::new()))?;
            let claims = sessions.token_issuer().validate(&token, kind.into())?;

            println!("{}", serde_json::to_string_pretty(&claims)?);
            println!("expires in {}s", claims.time_remaining());
        }
    }

    Ok(())
}

fn load_config(args: AuthArgs) -> anyhow::Result<AuthConfig> {
    match AuthConfig::from_args(args) {
        Ok(config) => {
            info!("Environment: {}, issuer: {}", config.environment, config.issuer);
            Ok(config)
        }
        Err(e) => {
            error!("Configuration error: {}", e);
            Err(e.into())
        }
    }
}

//! `dspamc`: classify and train messages on a DSPAM server.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dspam_client::{Class, ClassificationRecord, ClientConfig, Session, Source};

#[derive(Parser)]
#[command(name = "dspamc")]
#[command(about = "Classify and train messages with a DSPAM server over DLMTP", long_about = None)]
#[command(version)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConnectionArgs {
    /// JSON file holding the client configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Socket specification, e.g. inet:24@localhost or unix:/var/run/dspam/dspam.sock
    #[arg(long, global = true, env = "DSPAM_SOCKET")]
    socket: Option<String>,

    /// DLMTP identity
    #[arg(long, global = true, env = "DSPAM_IDENT")]
    ident: Option<String>,

    /// DLMTP password
    #[arg(long, global = true, env = "DSPAM_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Name announced in LHLO when no identity is set
    #[arg(long, global = true)]
    helo_name: Option<String>,
}

impl ConnectionArgs {
    /// Loads the configuration file, if any, and applies flags on top.
    fn load(&self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("Failed to parse {}", path.display()))?
            }
            None => ClientConfig::default(),
        };

        if let Some(socket) = &self.socket {
            config.socket.clone_from(socket);
        }
        if self.ident.is_some() {
            config.ident.clone_from(&self.ident);
        }
        if self.password.is_some() {
            config.password.clone_from(&self.password);
        }
        if self.helo_name.is_some() {
            config.helo_name.clone_from(&self.helo_name);
        }

        // Fail before connecting if the socket is unusable.
        config.socket_spec()?;
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a message without training
    Classify {
        /// DSPAM user
        #[arg(long)]
        user: String,
        /// Message file, stdin if omitted
        message: Option<PathBuf>,
    },
    /// Classify a message and train on the result
    Process {
        /// DSPAM user
        #[arg(long)]
        user: String,
        /// Message file, stdin if omitted
        message: Option<PathBuf>,
    },
    /// Train a message of known class from a corpus
    Train {
        /// DSPAM user
        #[arg(long)]
        user: String,
        /// Class of the message (spam or innocent)
        #[arg(long)]
        class: Class,
        /// Message file, stdin if omitted
        message: Option<PathBuf>,
    },
    /// Correct an earlier classification
    Retrain {
        /// DSPAM user
        #[arg(long)]
        user: String,
        /// Correct class of the message (spam or innocent)
        #[arg(long)]
        class: Class,
        /// Why the message is retrained (error, corpus or inoculation)
        #[arg(long, default_value = "error")]
        source: Source,
        /// Retrain by stored signature instead of message content
        #[arg(long, conflicts_with = "message")]
        signature: Option<String>,
        /// Message file, stdin if omitted
        message: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dspamc=info,dspam_client=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.connection.load()?;
    debug!(?config, "Loaded configuration");

    let mut session = Session::new(config);
    let outcome = run(&mut session, cli.command).await;
    if let Err(e) = session.quit().await {
        warn!(error = %e, "Failed to close DSPAM session");
    }

    let record = outcome?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

async fn run(session: &mut Session, command: Commands) -> Result<ClassificationRecord> {
    let record = match command {
        Commands::Classify { user, message } => {
            let message = read_message(message.as_deref()).await?;
            session.classify(&message, &user).await?
        }
        Commands::Process { user, message } => {
            let message = read_message(message.as_deref()).await?;
            session.process(&message, &user).await?
        }
        Commands::Train {
            user,
            class,
            message,
        } => {
            let message = read_message(message.as_deref()).await?;
            session.train(&message, &user, class).await?
        }
        Commands::Retrain {
            user,
            class,
            source,
            signature: Some(signature),
            ..
        } => {
            session
                .retrain_signature(&signature, &user, class, source)
                .await?
        }
        Commands::Retrain {
            user,
            class,
            source,
            signature: None,
            message,
        } => {
            let message = read_message(message.as_deref()).await?;
            session
                .retrain_message(&message, &user, class, source)
                .await?
        }
    };
    Ok(record)
}

/// Reads the message from `path`, or from stdin when none is given.
async fn read_message(path: Option<&Path>) -> Result<Vec<u8>> {
    if let Some(path) = path {
        return tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read message from {}", path.display()));
    }

    let mut message = Vec::new();
    tokio::io::stdin()
        .read_to_end(&mut message)
        .await
        .context("Failed to read message from stdin")?;
    Ok(message)
}

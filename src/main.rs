use clap::{ArgAction, Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use notifier::config::NotifierConfig;
use notifier::logging::{init_logging, LoggingConfig};
use notifier::webhook::signature::{sign, SignatureAlgorithm};
use notifier::webhook::{create_webhook_router, AppState};

#[derive(Parser, Debug)]
#[command(name = "notifier")]
#[command(version)]
#[command(about = "Messenger webhook receiver that answers chat messages with keyword search results")]
struct Cli {
    /// Path to a TOML configuration file (default: ./notifier.toml if present)
    #[arg(long, short, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Suppress all output except errors
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Increase verbosity (-v, -vv)
    #[arg(long, short, action = ArgAction::Count, conflicts_with = "quiet", global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the webhook endpoint (default)
    Serve,

    /// Print the signature header the platform would send for a body
    Sign {
        /// HMAC algorithm
        #[arg(long, short, default_value = "sha1")]
        algorithm: SignatureAlgorithm,

        /// File containing the raw body, or - for stdin
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Validate configuration and print it with secrets masked
    CheckConfig,
}

/// Process exit codes
mod exit_codes {
    use std::process::ExitCode;

    /// Runtime failure (bind error, server error, unreadable input)
    pub fn failed() -> ExitCode {
        ExitCode::from(1)
    }

    /// Configuration missing or invalid (EX_CONFIG)
    pub fn config_error() -> ExitCode {
        ExitCode::from(78)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(LoggingConfig::from_flags(cli.verbose, cli.quiet));

    let config = match NotifierConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{}", e);
            return exit_codes::config_error();
        }
    };

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Sign { algorithm, file } => run_sign(&config, algorithm, &file),
        Commands::CheckConfig => check_config(&config),
    }
}

/// Run the webhook server until Ctrl+C
async fn serve(config: NotifierConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        tracing::error!("{}", e);
        return exit_codes::config_error();
    }

    let config = Arc::new(config);
    let state = match AppState::from_config(config.clone()) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create HTTP client");
            return exit_codes::failed();
        }
    };
    let app = create_webhook_router(state);

    let addr = config.socket_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to bind");
            return exit_codes::failed();
        }
    };

    tracing::info!(
        address = %addr,
        callback_url = %config.callback_url(),
        strict_signatures = config.strict_signatures,
        "Notifier is running"
    );

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        tracing::info!("Received shutdown signal");
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
    {
        tracing::error!(error = %e, "Server error");
        return exit_codes::failed();
    }

    tracing::info!("Server shutdown complete");
    ExitCode::SUCCESS
}

fn read_body(file: &Path) -> std::io::Result<Vec<u8>> {
    if file == Path::new("-") {
        let mut body = Vec::new();
        std::io::stdin().read_to_end(&mut body)?;
        Ok(body)
    } else {
        std::fs::read(file)
    }
}

/// Sign a body with the configured app secret
fn run_sign(config: &NotifierConfig, algorithm: SignatureAlgorithm, file: &Path) -> ExitCode {
    let secret = match config.require_app_secret() {
        Ok(secret) => secret,
        Err(e) => {
            tracing::error!("{}", e);
            return exit_codes::config_error();
        }
    };

    let body = match read_body(file) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(file = %file.display(), error = %e, "Failed to read body");
            return exit_codes::failed();
        }
    };

    println!("{}", sign(algorithm, secret, &body));
    ExitCode::SUCCESS
}

fn check_config(config: &NotifierConfig) -> ExitCode {
    if let Err(e) = config.validate() {
        tracing::error!("{}", e);
        return exit_codes::config_error();
    }
    println!("{}", config.redacted());
    ExitCode::SUCCESS
}

//! Tollgate CLI - run the gateway and manage its users.

mod commands;
mod ui;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "tollgate")]
#[command(about = "Tollgate - bearer-token authentication gateway")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Config file (defaults to ~/.tollgate/tollgate.json)
    #[arg(long, global = true, env = "TOLLGATE_CONFIG_PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Gateway operations
    Gateway {
        #[command(subcommand)]
        action: GatewayCommands,
    },

    /// User management
    Admin {
        #[command(subcommand)]
        action: AdminCommands,

        /// Data directory override
        #[arg(long, global = true)]
        data_dir: Option<PathBuf>,
    },

    /// Print encoded password hashes
    HashPassword {
        /// Passwords to hash (prompted when omitted)
        passwords: Vec<String>,

        /// Hash scheme
        #[arg(long, value_enum)]
        scheme: Option<commands::hash::SchemeArg>,

        /// PBKDF2 rounds
        #[arg(long)]
        iterations: Option<u32>,
    },

    /// Signing secret operations
    Secret {
        #[command(subcommand)]
        action: SecretCommands,
    },

    /// Token operations
    Token {
        #[command(subcommand)]
        action: TokenCommands,
    },

    /// Configuration inspection
    Config {
        #[command(subcommand)]
        action: Option<ConfigCommands>,
    },
}

#[derive(Subcommand)]
enum GatewayCommands {
    /// Start the gateway server
    Run {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Bind address
        #[arg(long)]
        bind: Option<String>,

        /// Start even if the port looks taken
        #[arg(long)]
        force: bool,
    },

    /// Check gateway status
    Status,
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Create a new user
    Create {
        /// Username for the new user
        #[arg(long)]
        username: String,

        /// Password (prompted when omitted)
        #[arg(long)]
        password: Option<String>,

        /// Role to grant; repeat for several
        #[arg(long = "role", default_value = "USER")]
        roles: Vec<String>,

        /// Generate a random password
        #[arg(long, conflicts_with = "password")]
        generate_password: bool,
    },

    /// List all users
    List,

    /// Set a new password for a user
    ResetPassword {
        /// Username of the user
        #[arg(long)]
        username: String,

        /// New password (prompted when omitted)
        #[arg(long)]
        password: Option<String>,

        /// Generate a random password
        #[arg(long, conflicts_with = "password")]
        generate_password: bool,
    },

    /// Enable a user account
    Enable {
        /// Username of the user
        #[arg(long)]
        username: String,
    },

    /// Disable a user account
    Disable {
        /// Username of the user
        #[arg(long)]
        username: String,
    },

    /// Delete a user
    Delete {
        /// Username of the user to delete
        #[arg(long)]
        username: String,

        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum SecretCommands {
    /// Print a random 256-bit signing secret
    Generate,
}

#[derive(Subcommand)]
enum TokenCommands {
    /// Decode a token and check it against the configured secret
    Inspect {
        /// The token, with or without the `Bearer ` prefix
        token: String,

        /// Print claims as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration, secret redacted
    Show,

    /// Validate configuration
    Validate,
}

fn init_logging(verbose: bool, format: LogFormat) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry.with(fmt::layer().with_target(false)).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_format);

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Gateway { action } => {
            let action = match action {
                GatewayCommands::Run { port, bind, force } => {
                    commands::gateway::GatewayAction::Run { port, bind, force }
                }
                GatewayCommands::Status => commands::gateway::GatewayAction::Status,
            };
            commands::run_gateway(config_path, action).await?;
        }

        Commands::Admin { action, data_dir } => {
            let action = match action {
                AdminCommands::Create {
                    username,
                    password,
                    roles,
                    generate_password,
                } => commands::admin::AdminAction::Create {
                    username,
                    password: commands::admin::PasswordSource::from_flags(
                        password,
                        generate_password,
                    ),
                    roles,
                },
                AdminCommands::List => commands::admin::AdminAction::List,
                AdminCommands::ResetPassword {
                    username,
                    password,
                    generate_password,
                } => commands::admin::AdminAction::ResetPassword {
                    username,
                    password: commands::admin::PasswordSource::from_flags(
                        password,
                        generate_password,
                    ),
                },
                AdminCommands::Enable { username } => {
                    commands::admin::AdminAction::Enable { username }
                }
                AdminCommands::Disable { username } => {
                    commands::admin::AdminAction::Disable { username }
                }
                AdminCommands::Delete { username, yes } => {
                    commands::admin::AdminAction::Delete { username, yes }
                }
            };
            commands::run_admin(config_path, data_dir, action)?;
        }

        Commands::HashPassword {
            passwords,
            scheme,
            iterations,
        } => {
            commands::run_hash_password(config_path, passwords, scheme, iterations)?;
        }

        Commands::Secret {
            action: SecretCommands::Generate,
        } => {
            commands::run_secret_generate();
        }

        Commands::Token {
            action: TokenCommands::Inspect { token, json },
        } => {
            commands::run_token_inspect(config_path, &token, json)?;
        }

        Commands::Config { action } => {
            let validate = matches!(action, Some(ConfigCommands::Validate));
            commands::run_config(config_path, validate)?;
        }
    }

    Ok(())
}

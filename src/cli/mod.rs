use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{error, warn};

use crate::application::{AccountService, FarmResult, LedgerError};
use crate::config::AppConfig;
use crate::domain::{Units, User, UserId};

mod responses;

pub use responses::*;

/// StocksBack - account ledger with farming and stock exchange
#[derive(Parser)]
#[command(name = "stocksback")]
#[command(about = "Sign up, farm solid currency and exchange it for stocks")]
#[command(version)]
pub struct Cli {
    /// Configuration file (YAML or TOML); defaults to ./stocksback.* if present
    #[arg(short, long, env = "STOCKSBACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database file path (overrides the configured one)
    #[arg(short, long)]
    pub database: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Credentials of the user a command acts on.
#[derive(Args, Debug, Clone)]
pub struct Credentials {
    /// User name
    #[arg(long)]
    pub name: String,

    /// Password
    #[arg(long, env = "STOCKSBACK_PASSWORD", hide_env_values = true)]
    pub password: String,
}

/// Administrative key required by block/unblock.
#[derive(Args, Debug, Clone)]
pub struct AdminKey {
    #[arg(long, env = "STOCKSBACK_ADMIN_KEY", hide_env_values = true, default_value = "")]
    pub key: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Register a new user
    SignUp { name: String, password: String },

    /// Check a name and password
    SignIn { name: String, password: String },

    /// Collect solid currency accrued since the last farm
    Farm {
        #[command(flatten)]
        auth: Credentials,
    },

    /// Exchange solid currency for stock units
    BuyStocks {
        /// Number of stock units to buy
        count: Units,

        #[command(flatten)]
        auth: Credentials,
    },

    /// Change the user name
    Rename {
        new_name: String,

        #[command(flatten)]
        auth: Credentials,
    },

    /// Change the password
    Passwd {
        new_password: String,

        #[command(flatten)]
        auth: Credentials,
    },

    /// Block a user (administrative)
    Block {
        id: UserId,

        #[command(flatten)]
        admin: AdminKey,
    },

    /// Unblock a user (administrative)
    Unblock {
        id: UserId,

        #[command(flatten)]
        admin: AdminKey,
    },

    /// Show a user
    Get { id: UserId },
}

impl Commands {
    fn action(&self) -> &'static str {
        match self {
            Commands::Init => "init",
            Commands::SignUp { .. } => "sign up",
            Commands::SignIn { .. } => "sign in",
            Commands::Farm { .. } => "farm",
            Commands::BuyStocks { .. } => "buy stocks",
            Commands::Rename { .. } => "update name",
            Commands::Passwd { .. } => "update password",
            Commands::Block { .. } => "block",
            Commands::Unblock { .. } => "unblock",
            Commands::Get { .. } => "get user",
        }
    }
}

/// Successful outcome of a command.
enum Reply {
    Initialized(String),
    User(User),
    Farm(FarmResult),
}

/// Why a command was turned down.
enum Rejection {
    Forbidden,
    Ledger(LedgerError),
}

impl From<LedgerError> for Rejection {
    fn from(err: LedgerError) -> Self {
        Rejection::Ledger(err)
    }
}

/// Exit status for a client fault (bad input, business rule).
const EXIT_CLIENT_FAULT: u8 = 1;
/// Exit status for a server fault (storage, deadline).
const EXIT_SERVER_FAULT: u8 = 2;

/// What a finished command prints and how the process exits.
#[derive(Debug)]
struct Response {
    status: u8,
    body: String,
}

impl Cli {
    pub async fn run(self) -> Result<ExitCode> {
        let mut config = AppConfig::load(self.config.as_deref())?;
        if let Some(database) = self.database {
            config.database.path = database;
        }

        let action = self.command.action();
        let opened = open(&config, &self.command).await;
        let outcome = match opened {
            Ok(service) => dispatch(&service, &config, self.command).await,
            Err(err) => Err(Rejection::Ledger(err)),
        };

        let response = respond(action, outcome)?;
        println!("{}", response.body);
        Ok(ExitCode::from(response.status))
    }
}

/// Build the service; only `init` may create the database.
async fn open(config: &AppConfig, command: &Commands) -> Result<AccountService, LedgerError> {
    match command {
        Commands::Init => AccountService::init(config).await,
        _ => AccountService::connect(config).await,
    }
}

/// Render an outcome and log rejections by fault class.
fn respond(action: &str, outcome: Result<Reply, Rejection>) -> Result<Response> {
    let response = match outcome {
        Ok(Reply::Initialized(database)) => Response {
            status: 0,
            body: to_json(&InitResponse { database })?,
        },
        Ok(Reply::User(user)) => Response {
            status: 0,
            body: to_json(&UserResponse::from(&user))?,
        },
        Ok(Reply::Farm(result)) => Response {
            status: 0,
            body: to_json(&FarmResponse::from(&result))?,
        },
        Err(Rejection::Forbidden) => {
            warn!(action, "rejected: administrative key missing or invalid");
            Response {
                status: EXIT_CLIENT_FAULT,
                body: to_json(&ErrorResponse::forbidden())?,
            }
        }
        Err(Rejection::Ledger(err)) => {
            let status = if err.is_server_error() {
                error!(action, kind = %err.kind(), error = ?err, "unable to {}", action);
                EXIT_SERVER_FAULT
            } else {
                warn!(action, kind = %err.kind(), reason = %err, "unable to {}", action);
                EXIT_CLIENT_FAULT
            };
            Response {
                status,
                body: to_json(&ErrorResponse::from_ledger(&err))?,
            }
        }
    };
    Ok(response)
}

async fn dispatch(
    service: &AccountService,
    config: &AppConfig,
    command: Commands,
) -> Result<Reply, Rejection> {
    let reply = match command {
        // The schema was created when the service was built.
        Commands::Init => Reply::Initialized(config.database.path.clone()),

        Commands::SignUp { name, password } => {
            Reply::User(service.sign_up(&name, &password).await?)
        }

        Commands::SignIn { name, password } => {
            Reply::User(service.sign_in(&name, &password).await?)
        }

        Commands::Farm { auth } => {
            let user = authenticate(service, &auth).await?;
            Reply::Farm(service.farm(user.id).await?)
        }

        Commands::BuyStocks { count, auth } => {
            let user = authenticate(service, &auth).await?;
            Reply::User(service.buy_stocks(user.id, count).await?)
        }

        Commands::Rename { new_name, auth } => {
            let user = authenticate(service, &auth).await?;
            Reply::User(service.update_name(user.id, &new_name).await?)
        }

        Commands::Passwd { new_password, auth } => {
            let user = authenticate(service, &auth).await?;
            Reply::User(service.update_password(user.id, &new_password).await?)
        }

        Commands::Block { id, admin } => {
            if !config.is_admin_key(&admin.key) {
                return Err(Rejection::Forbidden);
            }
            Reply::User(service.block(id).await?)
        }

        Commands::Unblock { id, admin } => {
            if !config.is_admin_key(&admin.key) {
                return Err(Rejection::Forbidden);
            }
            Reply::User(service.unblock(id).await?)
        }

        Commands::Get { id } => Reply::User(service.get(id).await?),
    };

    Ok(reply)
}

async fn authenticate(service: &AccountService, auth: &Credentials) -> Result<User, LedgerError> {
    service.sign_in(&auth.name, &auth.password).await
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

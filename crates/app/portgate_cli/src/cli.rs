use clap::{ArgAction, Parser, Subcommand};
use portgate_core::models::auth::Role;

#[derive(Parser, Debug)]
#[command(name = "portgate", version, about = "Portgate administration")]
pub struct Cli {
    /// SQLite connection URL (defaults to the platform data directory).
    #[arg(long, global = true, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print version information.
    Version,

    /// Create a portal user.
    CreateUser {
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "")]
        full_name: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long, default_value = "user")]
        role: Role,
        /// Comma-separated group names.
        #[arg(long, value_delimiter = ',')]
        groups: Vec<String>,
    },

    /// List users with their groups.
    ListUsers,

    /// Replace a user's groups.
    SetGroups {
        username: String,
        groups: Vec<String>,
    },

    /// Register (or re-register) the application on a port.
    RegisterApp {
        port: u16,
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        category: String,
        /// Comma-separated group names allowed to launch the app.
        #[arg(long, value_delimiter = ',')]
        groups: Option<Vec<String>>,
    },

    /// Replace the groups allowed to launch the application on a port.
    SetPermissions {
        port: u16,
        groups: Vec<String>,
    },

    /// Enable or disable the application on a port.
    SetAppActive {
        port: u16,
        #[arg(action = ArgAction::Set)]
        active: bool,
    },

    /// List registered applications.
    ListApps {
        /// Only the applications this user may launch.
        #[arg(long)]
        user: Option<String>,
    },

    /// Find running web services on unregistered local ports.
    Scan {
        #[arg(long, default_value_t = 8000)]
        start: u16,
        #[arg(long, default_value_t = 9000)]
        end: u16,
    },
}

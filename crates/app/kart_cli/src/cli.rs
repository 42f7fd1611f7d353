use clap::{Parser, Subcommand};

/// Default PostgreSQL connection URL.
pub const DEFAULT_DATABASE_URL: &str = "postgres://localhost:5432/kart";

#[derive(Parser, Debug)]
#[command(name = "kart")]
#[command(author, version, about = "Kart user and credential tools")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the version
    Version,

    /// Load token configuration from the environment and report problems
    CheckConfig,

    /// Run database migrations
    Migrate {
        /// PostgreSQL connection URL
        #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
        database_url: String,
    },

    /// Hash a password with bcrypt and print the hash
    HashPassword {
        /// Plaintext password
        password: String,
    },

    /// Verify a token against the configured secrets and print its claims
    DecodeToken {
        /// Compact JWT
        token: String,

        /// Treat the token as a refresh token
        #[arg(long)]
        refresh: bool,
    },

    /// Manage user accounts
    User {
        #[command(subcommand)]
        action: UserAction,

        /// PostgreSQL connection URL
        #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL, global = true)]
        database_url: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum UserAction {
    /// Register a new user
    Create {
        #[arg(short, long)]
        username: String,

        #[arg(short, long)]
        email: String,

        /// Full name
        #[arg(short, long)]
        name: String,

        /// Plaintext password
        #[arg(short, long, env = "KART_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Replace a user's password
    SetPassword {
        /// Username or email
        #[arg(short, long)]
        login: String,

        /// New plaintext password
        #[arg(short, long, env = "KART_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Delete a user
    Delete {
        /// Username or email
        #[arg(short, long)]
        login: String,
    },
}

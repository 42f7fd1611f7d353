// Import and re-export the `error` module
pub use self::error::{Error, Result};
mod error;

use std::time::Duration;

use clap::Parser;
use cli::{Cli, Commands, UserAction};
use kart_core::auth::jwt::TokenIssuer;
use kart_core::auth::password::hash_password_async;
use kart_core::config::KartConfig;
use kart_core::models::NewUser;
use kart_core::users::validation::validate_password;
use kart_core::users::{PgUserStore, UserError, UserService};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

mod cli;
mod logging;

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = run().await {
        log::error!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init()?;

    let args = Cli::parse();

    match args.command {
        Commands::Version => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        }
        Commands::CheckConfig => {
            let config = KartConfig::from_env()?;
            log::info!(
                "access tokens: {}s, refresh tokens: {}s, otp: {}s",
                config.tokens.access_expiry.num_seconds(),
                config.tokens.refresh_expiry.num_seconds(),
                config.otp_expiry.num_seconds()
            );
            println!("configuration ok");
        }
        Commands::Migrate { database_url } => {
            let store = PgUserStore::new(connect(&database_url).await?);
            log::info!("running database migrations");
            store.migrate().await?;
            store.pool().close().await;
            println!("migrations applied");
        }
        Commands::HashPassword { password } => {
            validate_password(&password).map_err(UserError::from)?;
            println!("{}", hash_password_async(password).await?);
        }
        Commands::DecodeToken { token, refresh } => {
            let config = KartConfig::from_env()?;
            let issuer = TokenIssuer::new(&config.tokens);
            let claims = if refresh {
                serde_json::to_string_pretty(&issuer.verify_refresh_token(&token)?)?
            } else {
                serde_json::to_string_pretty(&issuer.verify_access_token(&token)?)?
            };
            println!("{claims}");
        }
        Commands::User {
            action,
            database_url,
        } => {
            let config = KartConfig::from_env()?;
            let pool = connect(&database_url).await?;
            let service = UserService::new(PgUserStore::new(pool.clone()), &config);
            let result = run_user_action(&service, action).await;
            pool.close().await;
            result?;
        }
    }

    Ok(())
}

async fn run_user_action(service: &UserService<PgUserStore>, action: UserAction) -> Result<()> {
    match action {
        UserAction::Create {
            username,
            email,
            name,
            password,
        } => {
            let user = service
                .register(NewUser::new(username, email, name, password))
                .await?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        UserAction::SetPassword { login, password } => {
            let user = service
                .find_by_login(&login)
                .await?
                .ok_or_else(|| Error::Custom(format!("no user '{login}'")))?;
            service.set_password(user.id, &password).await?;
            println!("password updated for {}", user.username);
        }
        UserAction::Delete { login } => {
            let user = service
                .find_by_login(&login)
                .await?
                .ok_or_else(|| Error::Custom(format!("no user '{login}'")))?;
            service.delete(user.id).await?;
            println!("deleted {}", user.username);
        }
    }
    Ok(())
}

async fn connect(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .acquire_timeout(Duration::from_secs(30))
        .connect(database_url)
        .await?;
    Ok(pool)
}

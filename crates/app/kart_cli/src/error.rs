use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{}", .0)]
    Custom(String),

    #[error("FlexiLogger::{:?}: {}", .0, .0)]
    FlexiLogger(#[from] flexi_logger::FlexiLoggerError),

    #[error("{}", .0)]
    Auth(#[from] kart_core::auth::AuthError),

    #[error("{}", .0)]
    User(#[from] kart_core::users::UserError),

    #[error("Sql::{}", .0)]
    Sql(#[from] sqlx::Error),

    #[error("Migrate::{}", .0)]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Json::{}", .0)]
    Json(#[from] serde_json::Error),
}

use diesel::{
    r2d2::{ConnectionManager, Pool, PooledConnection},
    PgConnection,
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations};
use serde::Serialize;

pub mod contamination;
pub mod file_processed;
pub mod genomic_set;
pub mod incident;
pub mod job_run;
pub mod manifest;
pub mod member;
pub mod metrics;
pub mod participant;
pub mod stored_sample;

pub type PgConnectionManager = ConnectionManager<PgConnection>;
pub type PgConnectionPool = Pool<PgConnectionManager>;
pub type PgPooledConnection = PooledConnection<PgConnectionManager>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

#[derive(Debug, thiserror::Error, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Error {
    #[error("{message}")]
    DuplicateRecord { message: String },
    #[error("{message}")]
    RecordNotFound { message: String },
    #[error("{message}")]
    ManifestFile { message: String },
    #[error("{0}")]
    Other(String),
}

impl Error {
    fn from_other_error(err: impl std::error::Error) -> Self {
        Self::Other(format!("{err:#}"))
    }

    pub fn manifest_file(message: impl Into<String>) -> Self {
        Self::ManifestFile {
            message: message.into(),
        }
    }
}

impl From<diesel::result::Error> for Error {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind::*, Error::*};

        let DatabaseError(err_kind, err_info) = &err else {
            return Self::from_other_error(err);
        };
        let message = err_info
            .details()
            .unwrap_or_default()
            .to_string()
            .replace("\"", "\'")
            .replace("table ", "");

        match err_kind {
            UniqueViolation => Self::DuplicateRecord { message },
            ForeignKeyViolation => Self::RecordNotFound { message },
            _ => Self::from_other_error(err),
        }
    }
}

impl From<diesel::r2d2::PoolError> for Error {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        Self::from_other_error(err)
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Self::ManifestFile {
            message: format!("{err}"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::ManifestFile {
            message: format!("{err}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

use crate::config::AppConfig;
use crate::errors::AppError;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};
use sea_orm_migration::MigratorTrait;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

pub type DbPool = DatabaseConnection;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

fn is_retryable_error(err: &DbErr) -> bool {
    match err {
        DbErr::Conn(_) | DbErr::ConnectionAcquire(_) => true,
        DbErr::Query(msg) => {
            let lower = msg.to_string().to_lowercase();
            ["connection", "timeout", "broken pipe", "reset by peer", "deadlock"]
                .iter()
                .any(|s| lower.contains(s))
        }
        _ => false,
    }
}

/// Retries a fallible database operation with exponential backoff, only for
/// errors judged transient by `is_retryable_error`.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    operation_name: &str,
    mut f: F,
) -> Result<T, DbErr>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbErr>>,
{
    let mut attempts = 0u32;
    let mut delay = config.initial_delay;
    loop {
        match f().await {
            Ok(value) => {
                if attempts > 0 {
                    info!(operation = operation_name, attempts, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                attempts += 1;
                if attempts >= config.max_retries || !is_retryable_error(&err) {
                    error!(operation = operation_name, attempts, error = %err, "operation failed, giving up");
                    return Err(err);
                }
                warn!(operation = operation_name, attempts, error = %err, delay_ms = delay.as_millis() as u64, "operation failed, retrying");
                sleep(delay).await;
                delay = std::cmp::min(
                    Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier),
                    config.max_delay,
                );
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
}

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

/// Retries the initial connect on transient failures — the database may
/// still be coming up when this process starts (e.g. in a freshly created
/// container pair).
pub async fn establish_connection(config: &DbConfig) -> Result<DbPool, AppError> {
    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .sqlx_logging(true);

    let retry_config = RetryConfig::default();
    let db = with_retry(&retry_config, "establish_connection", || {
        let opt = opt.clone();
        async move { Database::connect(opt).await }
    })
    .await
    .map_err(AppError::DatabaseError)?;
    debug!("database connection pool established");
    Ok(db)
}

pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, AppError> {
    establish_connection(&DbConfig::from(cfg)).await
}

pub async fn run_migrations(db: &DbPool) -> Result<(), AppError> {
    migrations::Migrator::up(db, None)
        .await
        .map_err(AppError::DatabaseError)
}

pub async fn check_connection(db: &DbPool) -> Result<(), DbErr> {
    db.execute(Statement::from_string(db.get_database_backend(), "SELECT 1".to_owned()))
        .await
        .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_config_has_sane_defaults() {
        let cfg = RetryConfig::default();
        assert_eq!(cfg.max_retries, 3);
        assert_eq!(cfg.backoff_multiplier, 2.0);
    }

    #[tokio::test]
    async fn with_retry_returns_ok_immediately_on_success() {
        let cfg = RetryConfig::default();
        let result: Result<i32, DbErr> = with_retry(&cfg, "noop", || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn with_retry_stops_immediately_on_non_retryable_error() {
        let cfg = RetryConfig::default();
        let mut calls = 0;
        let result: Result<i32, DbErr> = with_retry(&cfg, "non-retryable", || {
            calls += 1;
            async { Err(DbErr::RecordNotFound("nope".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}

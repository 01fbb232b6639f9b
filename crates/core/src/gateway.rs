use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::StoreConfig;
use crate::records::{UserId, UserRecord};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    message: String,
}

impl BackendError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The only statement shapes ever sent to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    ListUsers,
    InsertUser { name: String },
    UpdateUserName { id: UserId, name: String },
    DeleteUser { id: UserId },
}

impl Statement {
    #[must_use]
    pub fn sql(&self) -> &'static str {
        match self {
            Self::ListUsers => "SELECT id, name FROM users",
            Self::InsertUser { .. } => "INSERT INTO users (name) VALUES (?)",
            Self::UpdateUserName { .. } => "UPDATE users SET name = ? WHERE id = ?",
            Self::DeleteUser { .. } => "DELETE FROM users WHERE id = ?",
        }
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::ListUsers => "list_users",
            Self::InsertUser { .. } => "insert_user",
            Self::UpdateUserName { .. } => "update_user_name",
            Self::DeleteUser { .. } => "delete_user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementOutcome {
    Rows(Vec<UserRecord>),
    Affected {
        rows: u64,
        last_insert_id: Option<UserId>,
    },
}

#[async_trait]
pub trait StoreBackend: Send + Sync {
    type Connection: Send;

    async fn connect(&self, config: &StoreConfig) -> Result<Self::Connection, BackendError>;
    async fn execute(
        &self,
        connection: &mut Self::Connection,
        statement: &Statement,
    ) -> Result<StatementOutcome, BackendError>;
    async fn release(&self, connection: Self::Connection) -> Result<(), BackendError>;
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("cannot reach the store: {0}")]
    Connectivity(#[source] BackendError),
    #[error("statement rejected by the store: {0}")]
    Query(#[source] BackendError),
}

impl GatewayError {
    #[must_use]
    pub fn backend(&self) -> &BackendError {
        match self {
            Self::Connectivity(source) | Self::Query(source) => source,
        }
    }
}

/// Opens one connection per statement and always hands it back to the
/// backend afterwards, whatever the statement outcome.
#[derive(Debug)]
pub struct ConnectionGateway<B: StoreBackend> {
    backend: B,
    config: StoreConfig,
}

impl<B: StoreBackend> ConnectionGateway<B> {
    #[must_use]
    pub fn new(backend: B, config: StoreConfig) -> Self {
        Self { backend, config }
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Opens and releases a connection without running anything.
    pub async fn check(&self) -> Result<(), GatewayError> {
        let connection = self
            .backend
            .connect(&self.config)
            .await
            .map_err(GatewayError::Connectivity)?;
        self.backend
            .release(connection)
            .await
            .map_err(GatewayError::Connectivity)
    }

    pub async fn run(&self, statement: &Statement) -> Result<StatementOutcome, GatewayError> {
        let started_at = Instant::now();
        let mut connection = self
            .backend
            .connect(&self.config)
            .await
            .map_err(GatewayError::Connectivity)?;

        let result = self.backend.execute(&mut connection, statement).await;

        if let Err(error) = self.backend.release(connection).await {
            tracing::warn!(statement = statement.label(), %error, "failed to release store connection");
        }

        let outcome = result.map_err(GatewayError::Query)?;
        tracing::debug!(
            statement = statement.label(),
            elapsed_ms = started_at.elapsed().as_millis(),
            "statement completed"
        );
        Ok(outcome)
    }
}

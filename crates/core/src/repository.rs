use thiserror::Error;

use crate::gateway::{ConnectionGateway, GatewayError, Statement, StatementOutcome, StoreBackend};
use crate::records::{UserId, UserRecord};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("{0}")]
    Connectivity(String),
    #[error("{0}")]
    Query(String),
    #[error("user name cannot be empty")]
    Validation,
}

impl From<GatewayError> for RepositoryError {
    fn from(error: GatewayError) -> Self {
        match error {
            GatewayError::Connectivity(source) => Self::Connectivity(source.to_string()),
            GatewayError::Query(source) => Self::Query(source.to_string()),
        }
    }
}

/// The sole issuer of statements against `users`. Each call is one
/// auto-committed statement on its own connection.
#[derive(Debug)]
pub struct UserRepository<B: StoreBackend> {
    gateway: ConnectionGateway<B>,
}

impl<B: StoreBackend> UserRepository<B> {
    #[must_use]
    pub fn new(gateway: ConnectionGateway<B>) -> Self {
        Self { gateway }
    }

    #[must_use]
    pub fn gateway(&self) -> &ConnectionGateway<B> {
        &self.gateway
    }

    pub async fn check_connection(&self) -> Result<(), RepositoryError> {
        self.gateway.check().await.map_err(RepositoryError::from)
    }

    pub async fn list_all(&self) -> Result<Vec<UserRecord>, RepositoryError> {
        match self.gateway.run(&Statement::ListUsers).await? {
            StatementOutcome::Rows(rows) => Ok(rows),
            StatementOutcome::Affected { .. } => Err(unexpected_outcome(&Statement::ListUsers)),
        }
    }

    /// Returns the store-assigned id when the backend reports one.
    pub async fn insert(&self, name: &str) -> Result<Option<UserId>, RepositoryError> {
        let name = validated_name(name)?;
        let statement = Statement::InsertUser {
            name: name.to_string(),
        };
        match self.gateway.run(&statement).await? {
            StatementOutcome::Affected { last_insert_id, .. } => Ok(last_insert_id),
            StatementOutcome::Rows(_) => Err(unexpected_outcome(&statement)),
        }
    }

    /// Zero affected rows (unknown id) is not an error.
    pub async fn update_name(&self, id: UserId, name: &str) -> Result<(), RepositoryError> {
        let name = validated_name(name)?;
        let statement = Statement::UpdateUserName {
            id,
            name: name.to_string(),
        };
        self.execute_mutation(&statement).await
    }

    /// Zero affected rows (unknown id) is not an error.
    pub async fn delete(&self, id: UserId) -> Result<(), RepositoryError> {
        self.execute_mutation(&Statement::DeleteUser { id }).await
    }

    async fn execute_mutation(&self, statement: &Statement) -> Result<(), RepositoryError> {
        match self.gateway.run(statement).await? {
            StatementOutcome::Affected { rows, .. } => {
                if rows == 0 {
                    tracing::debug!(statement = statement.label(), "no rows affected");
                }
                Ok(())
            }
            StatementOutcome::Rows(_) => Err(unexpected_outcome(statement)),
        }
    }
}

fn validated_name(name: &str) -> Result<&str, RepositoryError> {
    if name.trim().is_empty() {
        return Err(RepositoryError::Validation);
    }
    Ok(name)
}

fn unexpected_outcome(statement: &Statement) -> RepositoryError {
    RepositoryError::Query(format!(
        "unexpected result shape for `{}`",
        statement.sql()
    ))
}

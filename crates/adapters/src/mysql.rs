use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, OptsBuilder, Params, Row, SslOpts, Value};
use userdesk_core::config::{PasswordSource, StoreConfig, TlsMode};
use userdesk_core::gateway::{BackendError, Statement, StatementOutcome, StoreBackend};
use userdesk_core::records::UserRecord;

const PASSWORD_ENV_VAR: &str = "USERDESK_DB_PASSWORD";
const DEFAULT_KEYRING_SERVICE: &str = "userdesk";

/// Opens a dedicated `Conn` per statement; nothing is pooled.
#[derive(Debug, Clone, Default)]
pub struct MysqlStoreBackend;

#[async_trait]
impl StoreBackend for MysqlStoreBackend {
    type Connection = Conn;

    async fn connect(&self, config: &StoreConfig) -> Result<Self::Connection, BackendError> {
        Conn::new(opts_from_config(config))
            .await
            .map_err(to_backend_error)
    }

    async fn execute(
        &self,
        connection: &mut Self::Connection,
        statement: &Statement,
    ) -> Result<StatementOutcome, BackendError> {
        let sql = statement.sql();
        match statement {
            Statement::ListUsers => {
                let rows = connection
                    .exec_iter(sql, Params::Empty)
                    .await
                    .map_err(to_backend_error)?
                    .collect::<Row>()
                    .await
                    .map_err(to_backend_error)?;
                let records = rows
                    .into_iter()
                    .map(|row| user_record_from_values(row.unwrap()))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(StatementOutcome::Rows(records))
            }
            Statement::InsertUser { name } => {
                connection
                    .exec_drop(sql, (name.as_str(),))
                    .await
                    .map_err(to_backend_error)?;
                Ok(StatementOutcome::Affected {
                    rows: connection.affected_rows(),
                    last_insert_id: connection.last_insert_id(),
                })
            }
            Statement::UpdateUserName { id, name } => {
                connection
                    .exec_drop(sql, (name.as_str(), *id))
                    .await
                    .map_err(to_backend_error)?;
                Ok(affected(connection))
            }
            Statement::DeleteUser { id } => {
                connection
                    .exec_drop(sql, (*id,))
                    .await
                    .map_err(to_backend_error)?;
                Ok(affected(connection))
            }
        }
    }

    async fn release(&self, connection: Self::Connection) -> Result<(), BackendError> {
        connection.disconnect().await.map_err(to_backend_error)
    }
}

fn affected(connection: &Conn) -> StatementOutcome {
    StatementOutcome::Affected {
        rows: connection.affected_rows(),
        last_insert_id: None,
    }
}

/// `name` has no NOT NULL guarantee; NULL renders as an empty name and
/// non-UTF-8 bytes are replaced rather than rejected.
fn user_record_from_values(values: Vec<Value>) -> Result<UserRecord, BackendError> {
    let mut values = values.into_iter();
    let (Some(id), Some(name), None) = (values.next(), values.next(), values.next()) else {
        return Err(BackendError::new("expected exactly two columns (id, name)"));
    };
    Ok(UserRecord::new(user_id_from_value(id)?, name_from_value(name)))
}

fn user_id_from_value(value: Value) -> Result<u64, BackendError> {
    match value {
        Value::UInt(id) => Ok(id),
        Value::Int(id) => {
            u64::try_from(id).map_err(|_| BackendError::new(format!("negative user id `{id}`")))
        }
        Value::Bytes(bytes) => {
            let raw = String::from_utf8_lossy(&bytes);
            raw.trim()
                .parse::<u64>()
                .map_err(|_| BackendError::new(format!("invalid user id `{raw}`")))
        }
        other => Err(BackendError::new(format!("invalid user id {other:?}"))),
    }
}

fn name_from_value(value: Value) -> String {
    match value {
        Value::NULL => String::new(),
        Value::Bytes(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Value::Int(value) => value.to_string(),
        Value::UInt(value) => value.to_string(),
        Value::Float(value) => value.to_string(),
        Value::Double(value) => value.to_string(),
        other @ (Value::Date(..) | Value::Time(..)) => other.as_sql(true),
    }
}

fn opts_from_config(config: &StoreConfig) -> OptsBuilder {
    let mut builder = OptsBuilder::default()
        .ip_or_hostname(config.host.clone())
        .tcp_port(config.port)
        .user(Some(config.user.clone()))
        .db_name(Some(config.database.clone()));

    if let Some(password) = resolve_password(config) {
        builder = builder.pass(Some(password));
    }

    if let Some(ssl_opts) = ssl_opts_from_config(config) {
        builder = builder.ssl_opts(ssl_opts);
    }

    if matches!(config.tls_mode, TlsMode::Disabled) {
        builder = builder.prefer_socket(false);
    }

    builder
}

fn resolve_password(config: &StoreConfig) -> Option<String> {
    let env_password = std::env::var(PASSWORD_ENV_VAR)
        .ok()
        .filter(|pw| !pw.is_empty());

    match config.password_source {
        PasswordSource::EnvVar => env_password,
        PasswordSource::Keyring => {
            if let Some(password) = load_keyring_password(config) {
                return Some(password);
            }

            if let Some(password) = env_password {
                store_keyring_password(config, &password);
                return Some(password);
            }

            tracing::warn!("no password found in keyring or {PASSWORD_ENV_VAR}");
            None
        }
    }
}

fn ssl_opts_from_config(config: &StoreConfig) -> Option<SslOpts> {
    match config.tls_mode {
        TlsMode::Disabled | TlsMode::Prefer => None,
        TlsMode::Require => Some(SslOpts::default().with_danger_skip_domain_validation(true)),
        TlsMode::VerifyIdentity => Some(SslOpts::default()),
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.and_then(|raw| {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    })
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
fn load_keyring_password(config: &StoreConfig) -> Option<String> {
    let entry = keyring_entry(config)?;
    entry.get_password().ok().filter(|pw| !pw.is_empty())
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn load_keyring_password(_config: &StoreConfig) -> Option<String> {
    None
}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
fn store_keyring_password(config: &StoreConfig, password: &str) {
    if password.is_empty() {
        return;
    }
    if let Some(entry) = keyring_entry(config) {
        if let Err(error) = entry.set_password(password) {
            tracing::warn!(%error, "failed to seed keyring password");
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn store_keyring_password(_config: &StoreConfig, _password: &str) {}

#[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))]
fn keyring_entry(config: &StoreConfig) -> Option<keyring::Entry> {
    let service = non_empty(config.keyring_service.as_deref()).unwrap_or(DEFAULT_KEYRING_SERVICE);
    let account = non_empty(config.keyring_account.as_deref()).unwrap_or(config.user.as_str());
    keyring::Entry::new(service, account).ok()
}

fn to_backend_error(error: mysql_async::Error) -> BackendError {
    BackendError::new(error.to_string())
}

#[cfg(test)]
mod tests {
    use mysql_async::Value;
    use userdesk_core::config::{StoreConfig, TlsMode};
    use userdesk_core::records::UserRecord;

    use super::{non_empty, opts_from_config, ssl_opts_from_config, user_record_from_values};

    #[test]
    fn opts_builder_accepts_store_config() {
        let mut config = StoreConfig::new("127.0.0.1", "root", "user_db");
        config.port = 3307;

        let _opts = opts_from_config(&config);
        // Construction is the assertion here; mysql_async exposes limited stable introspection.
    }

    #[test]
    fn tls_is_only_configured_when_required() {
        let mut config = StoreConfig::default();
        assert!(ssl_opts_from_config(&config).is_none());

        config.tls_mode = TlsMode::Disabled;
        assert!(ssl_opts_from_config(&config).is_none());

        config.tls_mode = TlsMode::Require;
        assert!(ssl_opts_from_config(&config).is_some());

        config.tls_mode = TlsMode::VerifyIdentity;
        assert!(ssl_opts_from_config(&config).is_some());
    }

    #[test]
    fn blank_keyring_overrides_are_ignored() {
        assert_eq!(non_empty(Some("  ")), None);
        assert_eq!(non_empty(Some(" vault ")), Some("vault"));
        assert_eq!(non_empty(None), None);
    }

    #[test]
    fn rows_with_null_or_invalid_utf8_names_still_convert() {
        let null_name = user_record_from_values(vec![Value::UInt(1), Value::NULL])
            .expect("NULL name should convert");
        assert_eq!(null_name, UserRecord::new(1, ""));

        let lossy = user_record_from_values(vec![Value::Int(2), Value::Bytes(vec![b'A', 0xff])])
            .expect("invalid UTF-8 should convert lossily");
        assert_eq!(lossy.id, 2);
        assert!(lossy.name.starts_with('A'));
    }

    #[test]
    fn text_protocol_ids_are_parsed() {
        let record = user_record_from_values(vec![
            Value::Bytes(b"42".to_vec()),
            Value::Bytes(b"Alice".to_vec()),
        ])
        .expect("text id should parse");
        assert_eq!(record, UserRecord::new(42, "Alice"));
    }

    #[test]
    fn malformed_rows_are_errors_not_panics() {
        assert!(user_record_from_values(vec![Value::Int(-1), Value::NULL]).is_err());
        assert!(user_record_from_values(vec![Value::NULL, Value::NULL]).is_err());
        assert!(user_record_from_values(vec![Value::UInt(1)]).is_err());
        assert!(
            user_record_from_values(vec![Value::UInt(1), Value::NULL, Value::NULL]).is_err()
        );
    }
}

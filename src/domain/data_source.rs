// Data source connection settings and connection URL helpers
use super::error::{ConnectionUrlError, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Csv,
    Excel,
    Json,
    Parquet,
}

impl FileFormat {
    pub fn tag(&self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Excel => "excel",
            FileFormat::Json => "json",
            FileFormat::Parquet => "parquet",
        }
    }

    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let (_, ext) = file_name.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "csv" | "tsv" => Some(FileFormat::Csv),
            "xls" | "xlsx" => Some(FileFormat::Excel),
            "json" | "ndjson" => Some(FileFormat::Json),
            "parquet" => Some(FileFormat::Parquet),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    Postgresql,
    Mysql,
    Mariadb,
    Mssql,
    Oracle,
    Sqlite,
}

impl Dialect {
    pub const ALL: [Dialect; 6] = [
        Dialect::Postgresql,
        Dialect::Mysql,
        Dialect::Mariadb,
        Dialect::Mssql,
        Dialect::Oracle,
        Dialect::Sqlite,
    ];

    pub fn scheme(&self) -> &'static str {
        match self {
            Dialect::Postgresql => "postgresql",
            Dialect::Mysql => "mysql",
            Dialect::Mariadb => "mariadb",
            Dialect::Mssql => "mssql",
            Dialect::Oracle => "oracle",
            Dialect::Sqlite => "sqlite",
        }
    }

    pub fn driver(&self) -> Option<&'static str> {
        match self {
            Dialect::Postgresql => Some("psycopg2"),
            Dialect::Mysql | Dialect::Mariadb => Some("pymysql"),
            Dialect::Mssql => Some("pyodbc"),
            Dialect::Oracle => Some("cx_oracle"),
            Dialect::Sqlite => None,
        }
    }

    pub fn default_port(&self) -> Option<u16> {
        match self {
            Dialect::Postgresql => Some(5432),
            Dialect::Mysql | Dialect::Mariadb => Some(3306),
            Dialect::Mssql => Some(1433),
            Dialect::Oracle => Some(1521),
            Dialect::Sqlite => None,
        }
    }

    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "postgres" => Some(Dialect::Postgresql),
            "sqlserver" => Some(Dialect::Mssql),
            other => Dialect::ALL.iter().copied().find(|d| d.scheme() == other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseKind {
    Snowflake,
    Bigquery,
    Redshift,
    Databricks,
    Clickhouse,
}

impl WarehouseKind {
    pub fn tag(&self) -> &'static str {
        match self {
            WarehouseKind::Snowflake => "snowflake",
            WarehouseKind::Bigquery => "bigquery",
            WarehouseKind::Redshift => "redshift",
            WarehouseKind::Databricks => "databricks",
            WarehouseKind::Clickhouse => "clickhouse",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    S3,
    Azure,
    Gcs,
}

impl StorageProvider {
    pub fn tag(&self) -> &'static str {
        match self {
            StorageProvider::S3 => "s3",
            StorageProvider::Azure => "azure",
            StorageProvider::Gcs => "gcs",
        }
    }

    fn schemes(&self) -> &'static [&'static str] {
        match self {
            StorageProvider::S3 => &["s3://", "s3a://"],
            StorageProvider::Azure => &["azure://", "abfss://"],
            StorageProvider::Gcs => &["gs://", "gcs://"],
        }
    }

    pub fn check_uri(&self, uri: &str) -> Result<(), ConnectionUrlError> {
        let uri = uri.trim();
        let valid = self
            .schemes()
            .iter()
            .any(|scheme| uri.len() > scheme.len() && uri.starts_with(scheme));
        if valid {
            Ok(())
        } else {
            Err(ConnectionUrlError::InvalidStorageUri {
                uri: uri.to_string(),
                provider: self.tag(),
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    File(FileFormat),
    Database(Dialect),
    Warehouse(WarehouseKind),
    CloudStorage(StorageProvider),
    Api,
}

impl SourceType {
    pub fn from_tag(tag: &str) -> Option<Self> {
        let tag = tag.trim().to_ascii_lowercase();
        if let Some(dialect) = Dialect::from_scheme(&tag) {
            return Some(SourceType::Database(dialect));
        }
        let source = match tag.as_str() {
            "csv" => SourceType::File(FileFormat::Csv),
            "excel" | "xlsx" => SourceType::File(FileFormat::Excel),
            "json" => SourceType::File(FileFormat::Json),
            "parquet" => SourceType::File(FileFormat::Parquet),
            "snowflake" => SourceType::Warehouse(WarehouseKind::Snowflake),
            "bigquery" => SourceType::Warehouse(WarehouseKind::Bigquery),
            "redshift" => SourceType::Warehouse(WarehouseKind::Redshift),
            "databricks" => SourceType::Warehouse(WarehouseKind::Databricks),
            "clickhouse" => SourceType::Warehouse(WarehouseKind::Clickhouse),
            "s3" => SourceType::CloudStorage(StorageProvider::S3),
            "azure" => SourceType::CloudStorage(StorageProvider::Azure),
            "gcs" => SourceType::CloudStorage(StorageProvider::Gcs),
            "api" | "rest" => SourceType::Api,
            _ => return None,
        };
        Some(source)
    }

    /// Source type named by a connection URL scheme, e.g. `postgres` or `clickhousedb`.
    pub fn from_url_scheme(scheme: &str) -> Option<Self> {
        let scheme = scheme.trim().to_ascii_lowercase();
        let tag = match scheme.as_str() {
            "clickhousedb" => "clickhouse",
            other => other,
        };
        Self::from_tag(tag)
            .filter(|source| matches!(source, SourceType::Database(_) | SourceType::Warehouse(_)))
    }

    pub fn tag(&self) -> &'static str {
        match self {
            SourceType::File(format) => format.tag(),
            SourceType::Database(dialect) => dialect.scheme(),
            SourceType::Warehouse(kind) => kind.tag(),
            SourceType::CloudStorage(provider) => provider.tag(),
            SourceType::Api => "api",
        }
    }

    /// Fields that must be filled before test/save is enabled.
    pub fn required_fields(&self) -> Vec<&'static str> {
        let mut fields = vec!["name"];
        let specific: &[&'static str] = match self {
            SourceType::File(_) => &["file"],
            SourceType::Database(Dialect::Sqlite) => &["database"],
            SourceType::Database(_) => &["host", "database", "username", "password"],
            SourceType::Warehouse(WarehouseKind::Snowflake) => {
                &["account", "warehouse", "database", "username", "password"]
            }
            SourceType::Warehouse(WarehouseKind::Bigquery) => &["project_id", "credentials_json"],
            SourceType::Warehouse(WarehouseKind::Redshift) => {
                &["host", "database", "username", "password"]
            }
            SourceType::Warehouse(WarehouseKind::Databricks) => &["host", "http_path", "token"],
            SourceType::Warehouse(WarehouseKind::Clickhouse) => &["host", "database", "username"],
            SourceType::CloudStorage(StorageProvider::S3) => {
                &["storage_uri", "access_key_id", "secret_access_key"]
            }
            SourceType::CloudStorage(StorageProvider::Azure) => {
                &["storage_uri", "account_name", "account_key"]
            }
            SourceType::CloudStorage(StorageProvider::Gcs) => {
                &["storage_uri", "service_account_json"]
            }
            SourceType::Api => &["api_url"],
        };
        fields.extend_from_slice(specific);
        fields
    }
}

impl Serialize for SourceType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.tag())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Transient form state for the connection wizard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(skip)]
    pub file: Option<FileUpload>,
    #[serde(default)]
    pub storage_uri: Option<String>,
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Driver query parameters appended to a connection URL.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    /// Provider credentials and warehouse-specific fields.
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

fn filled(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

impl ConnectionConfig {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_extra(mut self, key: &str, value: &str) -> Self {
        self.extra.insert(key.to_string(), value.to_string());
        self
    }

    fn extra(&self, key: &str) -> Option<&str> {
        self.extra.get(key).map(String::as_str)
    }

    fn has_field(&self, field: &str) -> bool {
        match field {
            "name" => filled(Some(&self.name)),
            "host" => filled(self.host.as_deref()),
            "port" => self.port.is_some(),
            "database" => filled(self.database.as_deref()),
            "username" => filled(self.username.as_deref()),
            "password" => filled(self.password.as_deref()),
            "file" => self
                .file
                .as_ref()
                .is_some_and(|f| !f.file_name.is_empty() && !f.bytes.is_empty()),
            "storage_uri" => filled(self.storage_uri.as_deref()),
            "api_url" => filled(self.api_url.as_deref()),
            other => filled(self.extra(other)),
        }
    }

    /// Client-side required-field check for `source`.
    pub fn validate(&self, source: &SourceType) -> Result<(), ValidationError> {
        let missing = source
            .required_fields()
            .into_iter()
            .filter(|field| !self.has_field(field))
            .collect();
        ValidationError::check(missing)
    }

    /// Copy parsed URL fields back into the form.
    pub fn apply_parsed(&mut self, parsed: ParsedConnection) {
        self.host = parsed.host;
        self.port = parsed.port;
        self.database = parsed.database;
        self.username = parsed.username;
        self.password = parsed.password;
        self.params = parsed.params;
        self.extra.extend(parsed.extra);
    }

    /// JSON body for the test/connect endpoints.
    pub fn to_request_body(&self, source: &SourceType) -> Value {
        match source {
            SourceType::File(format) => json!({
                "name": self.name,
                "format": format.tag(),
                "file_name": self.file.as_ref().map(|f| f.file_name.clone()),
            }),
            SourceType::Database(dialect) => json!({
                "name": self.name,
                "db_type": dialect.scheme(),
                "connection_url": build_connection_url(*dialect, self),
                "host": self.host,
                "port": self.port.or(dialect.default_port()),
                "database": self.database,
                "username": self.username,
                "password": self.password,
                "params": self.params,
            }),
            SourceType::Warehouse(kind) => json!({
                "name": self.name,
                "warehouse_type": kind.tag(),
                "connection_url": warehouse_connection_url(*kind, self),
                "host": self.host,
                "port": self.port,
                "database": self.database,
                "username": self.username,
                "password": self.password,
                "config": self.extra,
            }),
            SourceType::CloudStorage(provider) => json!({
                "name": self.name,
                "provider": provider.tag(),
                "storage_uri": self.storage_uri,
                "credentials": self.extra,
            }),
            SourceType::Api => json!({
                "name": self.name,
                "base_url": self.api_url,
                "headers": self.headers,
            }),
        }
    }
}

fn encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

fn decode(value: &str) -> String {
    urlencoding::decode(value)
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

fn userinfo(username: Option<&str>, password: Option<&str>) -> String {
    match (username.filter(|u| !u.is_empty()), password.filter(|p| !p.is_empty())) {
        (Some(user), Some(pass)) => format!("{}:{}@", encode(user), encode(pass)),
        (Some(user), None) => format!("{}@", encode(user)),
        _ => String::new(),
    }
}

fn query_string(params: &BTreeMap<String, String>) -> String {
    if params.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = params
        .iter()
        .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
        .collect();
    format!("?{}", pairs.join("&"))
}

/// Build `{dialect}+{driver}://{user}:{pass}@{host}:{port}/{db}` from form fields.
pub fn build_connection_url(dialect: Dialect, cfg: &ConnectionConfig) -> String {
    let database = cfg.database.as_deref().unwrap_or_default();
    if dialect == Dialect::Sqlite {
        return format!("sqlite:///{}{}", database, query_string(&cfg.params));
    }

    let scheme = match dialect.driver() {
        Some(driver) => format!("{}+{}", dialect.scheme(), driver),
        None => dialect.scheme().to_string(),
    };
    let port = cfg
        .port
        .or(dialect.default_port())
        .map(|p| format!(":{}", p))
        .unwrap_or_default();

    format!(
        "{}://{}{}{}/{}{}",
        scheme,
        userinfo(cfg.username.as_deref(), cfg.password.as_deref()),
        cfg.host.as_deref().unwrap_or_default(),
        port,
        database,
        query_string(&cfg.params),
    )
}

/// Connection URL for warehouses that speak a SQLAlchemy-style URL.
pub fn warehouse_connection_url(kind: WarehouseKind, cfg: &ConnectionConfig) -> String {
    let host = cfg.host.as_deref().unwrap_or_default();
    let database = cfg.database.as_deref().unwrap_or_default();
    let auth = userinfo(cfg.username.as_deref(), cfg.password.as_deref());

    match kind {
        WarehouseKind::Snowflake => {
            let mut params = cfg.params.clone();
            if let Some(warehouse) = cfg.extra("warehouse") {
                params.insert("warehouse".to_string(), warehouse.to_string());
            }
            let schema = cfg
                .extra("schema")
                .map(|s| format!("/{}", s))
                .unwrap_or_default();
            format!(
                "snowflake://{}{}/{}{}{}",
                auth,
                cfg.extra("account").unwrap_or_default(),
                database,
                schema,
                query_string(&params)
            )
        }
        WarehouseKind::Bigquery => {
            format!("bigquery://{}", cfg.extra("project_id").unwrap_or_default())
        }
        WarehouseKind::Redshift => format!(
            "redshift+psycopg2://{}{}:{}/{}",
            auth,
            host,
            cfg.port.unwrap_or(5439),
            database
        ),
        WarehouseKind::Databricks => {
            let mut params = cfg.params.clone();
            if let Some(path) = cfg.extra("http_path") {
                params.insert("http_path".to_string(), path.to_string());
            }
            format!(
                "databricks://token:{}@{}{}",
                encode(cfg.extra("token").unwrap_or_default()),
                host,
                query_string(&params)
            )
        }
        WarehouseKind::Clickhouse => format!(
            "clickhousedb://{}{}:{}/{}",
            auth,
            host,
            cfg.port.unwrap_or(8123),
            database
        ),
    }
}

/// Fields recovered from a pasted connection URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedConnection {
    pub source: SourceType,
    pub driver: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub params: BTreeMap<String, String>,
    /// Warehouse fields that have no column of their own in the form.
    pub extra: BTreeMap<String, String>,
}

impl ParsedConnection {
    fn empty(source: SourceType, driver: Option<String>, params: BTreeMap<String, String>) -> Self {
        Self {
            source,
            driver,
            host: None,
            port: None,
            database: None,
            username: None,
            password: None,
            params,
            extra: BTreeMap::new(),
        }
    }

    /// Move warehouse-specific pieces out of the generic URL fields.
    fn settle_warehouse_fields(&mut self, kind: WarehouseKind) {
        match kind {
            WarehouseKind::Snowflake => {
                if let Some(account) = self.host.take() {
                    self.extra.insert("account".to_string(), account);
                }
                if let Some((database, schema)) = self
                    .database
                    .as_deref()
                    .and_then(|path| path.split_once('/'))
                    .map(|(db, schema)| (db.to_string(), schema.to_string()))
                {
                    self.database = Some(database).filter(|db| !db.is_empty());
                    if !schema.is_empty() {
                        self.extra.insert("schema".to_string(), schema);
                    }
                }
                if let Some(warehouse) = self.params.remove("warehouse") {
                    self.extra.insert("warehouse".to_string(), warehouse);
                }
            }
            WarehouseKind::Databricks => {
                if self.username.as_deref() == Some("token") {
                    self.username = None;
                }
                if let Some(token) = self.password.take() {
                    self.extra.insert("token".to_string(), token);
                }
                if let Some(path) = self.params.remove("http_path") {
                    self.extra.insert("http_path".to_string(), path);
                }
            }
            WarehouseKind::Bigquery | WarehouseKind::Redshift | WarehouseKind::Clickhouse => {}
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(decode(value))
    }
}

/// Best-effort inverse of [`build_connection_url`] and [`warehouse_connection_url`].
///
/// Query parameters come back as a map, so their original order is lost.
pub fn parse_connection_url(url: &str) -> Result<ParsedConnection, ConnectionUrlError> {
    let (scheme, rest) = url
        .trim()
        .split_once("://")
        .ok_or(ConnectionUrlError::MissingScheme)?;

    let (source_name, driver) = match scheme.split_once('+') {
        Some((source, driver)) => (source, Some(driver.to_string())),
        None => (scheme, None),
    };
    let source = SourceType::from_url_scheme(source_name)
        .ok_or_else(|| ConnectionUrlError::UnknownDialect(source_name.to_string()))?;

    let (rest, query) = match rest.split_once('?') {
        Some((rest, query)) => (rest, Some(query)),
        None => (rest, None),
    };
    let params = query
        .map(|q| {
            q.split('&')
                .filter(|pair| !pair.is_empty())
                .map(|pair| match pair.split_once('=') {
                    Some((k, v)) => (decode(k), decode(v)),
                    None => (decode(pair), String::new()),
                })
                .collect()
        })
        .unwrap_or_default();

    match source {
        SourceType::Database(Dialect::Sqlite) => {
            let mut parsed = ParsedConnection::empty(source, driver, params);
            parsed.database = non_empty(rest.strip_prefix('/').unwrap_or(rest));
            return Ok(parsed);
        }
        SourceType::Warehouse(WarehouseKind::Bigquery) => {
            let mut parsed = ParsedConnection::empty(source, driver, params);
            if let Some(project) = non_empty(rest.trim_matches('/')) {
                parsed.extra.insert("project_id".to_string(), project);
            }
            return Ok(parsed);
        }
        _ => {}
    }

    let (auth, location) = match rest.rsplit_once('@') {
        Some((auth, location)) => (Some(auth), location),
        None => (None, rest),
    };
    let (username, password) = match auth {
        Some(auth) => match auth.split_once(':') {
            Some((user, pass)) => (non_empty(user), non_empty(pass)),
            None => (non_empty(auth), None),
        },
        None => (None, None),
    };

    let (host_port, database) = match location.split_once('/') {
        Some((host_port, database)) => (host_port, non_empty(database)),
        None => (location, None),
    };
    let (host, port) = match host_port.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| ConnectionUrlError::InvalidPort(port.to_string()))?;
            (non_empty(host), Some(port))
        }
        None => (non_empty(host_port), None),
    };

    let mut parsed = ParsedConnection {
        host,
        port,
        database,
        username,
        password,
        ..ParsedConnection::empty(source, driver, params)
    };
    if let SourceType::Warehouse(kind) = source {
        parsed.settle_warehouse_fields(kind);
    }
    Ok(parsed)
}

/// A source created through the wizard, kept for the multi-source flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedSource {
    pub id: String,
    pub name: String,
    pub source_type: String,
    pub created_at: DateTime<Utc>,
}

impl CreatedSource {
    /// Read the new source id out of a `{success, data_source}` or flat response.
    pub fn from_response(name: &str, source: &SourceType, response: &Value) -> Self {
        let id = response
            .get("data_source")
            .and_then(|ds| ds.get("id"))
            .or_else(|| response.get("id"))
            .or_else(|| response.get("connection_id"))
            .and_then(|id| match id {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Self {
            id,
            name: name.to_string(),
            source_type: source.tag().to_string(),
            created_at: Utc::now(),
        }
    }
}

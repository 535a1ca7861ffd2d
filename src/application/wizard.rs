// Data source connection wizard - Type selection, test, save and multi-source deploy
use crate::application::error::ApiError;
use crate::application::feedback::FailureReporter;
use crate::application::ports::{
    DataSourceGateway, InMemorySources, NoopAnalyzer, SourceAnalyzer, SourceInsight, SourceStore,
};
use crate::domain::data_source::{
    build_connection_url, parse_connection_url, warehouse_connection_url, ConnectionConfig,
    CreatedSource, SourceType,
};
use crate::domain::error::{ConnectionUrlError, ValidationError};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardVariant {
    /// Select a type, then configure, test and save one source.
    Single,
    /// Save several sources, analyze them, then deploy.
    MultiSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    SelectType,
    Configure,
    Analyze,
    Deploy,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Untested,
    Testing,
    Succeeded(String),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct WizardState {
    pub step: WizardStep,
    pub source: Option<SourceType>,
    pub config: ConnectionConfig,
    pub status: ConnectionStatus,
    /// Inline alert shown above the form
    pub alert: Option<String>,
    pub busy: bool,
    pub insights: Vec<SourceInsight>,
}

impl Default for WizardState {
    fn default() -> Self {
        Self {
            step: WizardStep::SelectType,
            source: None,
            config: ConnectionConfig::default(),
            status: ConnectionStatus::Untested,
            alert: None,
            busy: false,
            insights: Vec::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum WizardError {
    #[error("choose a source type first")]
    NoSourceType,
    #[error("not available on the {0:?} step")]
    WrongStep(WizardStep),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    InvalidUrl(#[from] ConnectionUrlError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("a newer request replaced this one")]
    Superseded,
    #[error("no saved sources to analyze")]
    NothingSaved,
}

pub struct ConnectionWizard {
    variant: WizardVariant,
    state: Mutex<WizardState>,
    sequence: AtomicU64,
    gateway: Arc<dyn DataSourceGateway>,
    analyzer: Arc<dyn SourceAnalyzer>,
    store: Arc<dyn SourceStore>,
    reporter: FailureReporter,
}

fn response_message(response: &Value, fallback: &str) -> String {
    response
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or(fallback)
        .to_string()
}

impl ConnectionWizard {
    pub fn new(
        variant: WizardVariant,
        gateway: Arc<dyn DataSourceGateway>,
        reporter: FailureReporter,
    ) -> Self {
        Self {
            variant,
            state: Mutex::new(WizardState::default()),
            sequence: AtomicU64::new(0),
            gateway,
            analyzer: Arc::new(NoopAnalyzer),
            store: Arc::new(InMemorySources::default()),
            reporter,
        }
    }

    pub fn with_analyzer(mut self, analyzer: Arc<dyn SourceAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn SourceStore>) -> Self {
        self.store = store;
        self
    }

    pub fn state(&self) -> WizardState {
        self.state.lock().clone()
    }

    pub fn created_sources(&self) -> Vec<CreatedSource> {
        self.store.sources()
    }

    /// Invalidates every request currently in flight.
    fn next_ticket(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.sequence.load(Ordering::SeqCst) == ticket
    }

    fn expect_step(state: &WizardState, step: WizardStep) -> Result<(), WizardError> {
        if state.step == step {
            Ok(())
        } else {
            Err(WizardError::WrongStep(state.step))
        }
    }

    pub fn select_type(&self, source: SourceType) -> Result<(), WizardError> {
        let mut state = self.state.lock();
        Self::expect_step(&state, WizardStep::SelectType)?;
        self.next_ticket();
        state.source = Some(source);
        state.step = WizardStep::Configure;
        state.status = ConnectionStatus::Untested;
        state.alert = None;
        state.busy = false;
        Ok(())
    }

    /// Edit the form. Any edit makes the last test result, and any test still running, stale.
    pub fn update_config<F>(&self, edit: F) -> Result<(), WizardError>
    where
        F: FnOnce(&mut ConnectionConfig),
    {
        let mut state = self.state.lock();
        Self::expect_step(&state, WizardStep::Configure)?;
        self.next_ticket();
        edit(&mut state.config);
        state.status = ConnectionStatus::Untested;
        state.busy = false;
        Ok(())
    }

    /// Fill host/port/database/credentials from a pasted URL. The source type follows the URL.
    pub fn apply_connection_url(&self, url: &str) -> Result<(), WizardError> {
        let parsed = parse_connection_url(url)?;
        let mut state = self.state.lock();
        Self::expect_step(&state, WizardStep::Configure)?;
        self.next_ticket();
        state.source = Some(parsed.source);
        state.config.apply_parsed(parsed);
        state.status = ConnectionStatus::Untested;
        state.busy = false;
        Ok(())
    }

    pub fn connection_url(&self) -> Option<String> {
        let state = self.state.lock();
        match state.source? {
            SourceType::Database(dialect) => Some(build_connection_url(dialect, &state.config)),
            SourceType::Warehouse(kind) => Some(warehouse_connection_url(kind, &state.config)),
            _ => None,
        }
    }

    pub fn back(&self) {
        let mut state = self.state.lock();
        self.next_ticket();
        state.busy = false;
        state.step = match state.step {
            WizardStep::SelectType | WizardStep::Configure => WizardStep::SelectType,
            WizardStep::Analyze => WizardStep::Configure,
            WizardStep::Deploy => WizardStep::Analyze,
            WizardStep::Done => WizardStep::Done,
        };
    }

    fn check_form(state: &WizardState) -> Result<SourceType, WizardError> {
        let source = state.source.ok_or(WizardError::NoSourceType)?;
        state.config.validate(&source)?;
        if let SourceType::CloudStorage(provider) = source {
            provider.check_uri(state.config.storage_uri.as_deref().unwrap_or_default())?;
        }
        Ok(source)
    }

    /// Validate and mark a network action as started.
    fn begin(&self, status: ConnectionStatus) -> Result<(SourceType, ConnectionConfig, u64), WizardError> {
        let mut state = self.state.lock();
        Self::expect_step(&state, WizardStep::Configure)?;
        let source = match Self::check_form(&state) {
            Ok(source) => source,
            Err(e) => {
                state.alert = Some(e.to_string());
                return Err(e);
            }
        };
        let ticket = self.next_ticket();
        state.busy = true;
        state.alert = None;
        state.status = status;
        Ok((source, state.config.clone(), ticket))
    }

    pub async fn test_connection(&self) -> Result<(), WizardError> {
        let (source, config, ticket) = self.begin(ConnectionStatus::Testing)?;

        let result = match source {
            // Files are checked locally; the upload happens on save.
            SourceType::File(_) => Ok(json!({ "success": true, "message": "File is ready to upload" })),
            other => {
                self.gateway
                    .test_connection(&other, &config.to_request_body(&other))
                    .await
            }
        };

        let mut state = self.state.lock();
        if !self.is_current(ticket) {
            tracing::debug!("Discarding stale connection test result for {}", config.name);
            return Err(WizardError::Superseded);
        }
        state.busy = false;

        match result {
            Ok(response) => {
                let message = response_message(&response, "Connection successful");
                state.status = ConnectionStatus::Succeeded(message.clone());
                drop(state);
                self.reporter.success(&message);
                Ok(())
            }
            Err(e) => {
                state.status = ConnectionStatus::Failed(e.to_string());
                state.alert = Some(e.to_string());
                drop(state);
                self.reporter.report("test connection", &e);
                Err(e.into())
            }
        }
    }

    pub async fn save(&self) -> Result<CreatedSource, WizardError> {
        let (source, config, ticket) = self.begin(ConnectionStatus::Untested)?;

        let result = match source {
            SourceType::File(format) => match &config.file {
                Some(file) => self.gateway.upload_file(&config.name, format, file).await,
                None => Err(ApiError::Rejected("no file selected".to_string())),
            },
            other => {
                self.gateway
                    .create_connection(&other, &config.to_request_body(&other))
                    .await
            }
        };

        let created = {
            let mut state = self.state.lock();
            if !self.is_current(ticket) {
                tracing::debug!("Discarding stale save result for {}", config.name);
                return Err(WizardError::Superseded);
            }
            state.busy = false;

            match result {
                Ok(response) => {
                    let created = CreatedSource::from_response(&config.name, &source, &response);
                    // Single-source flows end here; the multi-source flow starts the next source.
                    let step = match self.variant {
                        WizardVariant::Single => WizardStep::Done,
                        WizardVariant::MultiSource => WizardStep::SelectType,
                    };
                    *state = WizardState {
                        step,
                        insights: std::mem::take(&mut state.insights),
                        ..WizardState::default()
                    };
                    created
                }
                Err(e) => {
                    state.alert = Some(e.to_string());
                    drop(state);
                    self.reporter.report("save data source", &e);
                    return Err(e.into());
                }
            }
        };

        if let Err(e) = self.store.insert(created.clone()) {
            tracing::warn!("Could not persist created source {}: {}", created.id, e);
        }
        tracing::info!("Created {} source {} ({})", created.source_type, created.name, created.id);
        self.reporter
            .success(&format!("Data source '{}' saved", created.name));
        Ok(created)
    }

    /// Multi-source only: run the analyzer over everything saved so far.
    pub async fn analyze(&self) -> Result<Vec<SourceInsight>, WizardError> {
        {
            let state = self.state.lock();
            let allowed = self.variant == WizardVariant::MultiSource
                && matches!(
                    state.step,
                    WizardStep::SelectType | WizardStep::Configure | WizardStep::Analyze
                );
            if !allowed {
                return Err(WizardError::WrongStep(state.step));
            }
        }

        let sources = self.created_sources();
        if sources.is_empty() {
            return Err(WizardError::NothingSaved);
        }

        let ticket = {
            let mut state = self.state.lock();
            state.step = WizardStep::Analyze;
            state.busy = true;
            self.next_ticket()
        };

        let result = self.analyzer.analyze(&sources).await;

        let mut state = self.state.lock();
        if !self.is_current(ticket) {
            return Err(WizardError::Superseded);
        }
        state.busy = false;
        match result {
            Ok(insights) => {
                state.insights = insights.clone();
                Ok(insights)
            }
            Err(e) => {
                state.alert = Some(e.to_string());
                drop(state);
                self.reporter.report("analyze data sources", &e);
                Err(e.into())
            }
        }
    }

    /// Multi-source only: hand over the saved sources and start over.
    pub fn deploy(&self) -> Result<Vec<CreatedSource>, WizardError> {
        {
            let mut state = self.state.lock();
            Self::expect_step(&state, WizardStep::Analyze)?;
            state.step = WizardStep::Deploy;
        }

        let deployed = self.created_sources();
        if let Err(e) = self.store.clear() {
            tracing::warn!("Could not clear saved sources: {}", e);
        }
        self.next_ticket();
        *self.state.lock() = WizardState::default();
        self.reporter
            .success(&format!("Deployed {} data sources", deployed.len()));
        Ok(deployed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::feedback::testing::RecordingFeedback;
    use crate::domain::data_source::{
        Dialect, FileFormat, FileUpload, StorageProvider, WarehouseKind,
    };
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeGateway {
        calls: AtomicUsize,
        forbid: bool,
    }

    #[async_trait]
    impl DataSourceGateway for FakeGateway {
        async fn upload_file(
            &self,
            name: &str,
            _format: FileFormat,
            _file: &FileUpload,
        ) -> Result<Value, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"success": true, "data_source": {"id": format!("file-{}", name)}}))
        }

        async fn test_connection(&self, _source: &SourceType, body: &Value) -> Result<Value, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.forbid {
                return Err(ApiError::Forbidden {
                    resource: "/api/data/database/test".to_string(),
                });
            }
            let name = body["name"].as_str().unwrap_or_default().to_string();
            let delay = if name == "slow" { 200 } else { 10 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(json!({"success": true, "message": name}))
        }

        async fn create_connection(&self, _source: &SourceType, body: &Value) -> Result<Value, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.forbid {
                return Err(ApiError::Forbidden {
                    resource: "/api/data/database/connect".to_string(),
                });
            }
            Ok(json!({"success": true, "id": format!("db-{}", body["name"].as_str().unwrap_or_default())}))
        }
    }

    struct CountingAnalyzer;

    #[async_trait]
    impl SourceAnalyzer for CountingAnalyzer {
        async fn analyze(&self, sources: &[CreatedSource]) -> Result<Vec<SourceInsight>, ApiError> {
            Ok(sources
                .iter()
                .map(|s| SourceInsight {
                    source_id: s.id.clone(),
                    summary: format!("{} looks healthy", s.name),
                })
                .collect())
        }
    }

    fn wizard(variant: WizardVariant, gateway: Arc<FakeGateway>) -> (ConnectionWizard, Arc<RecordingFeedback>) {
        let feedback = Arc::new(RecordingFeedback::default());
        (ConnectionWizard::new(variant, gateway, feedback.reporter()), feedback)
    }

    fn fill_postgres(config: &mut ConnectionConfig, name: &str) {
        config.name = name.to_string();
        config.host = Some("db.example.com".to_string());
        config.database = Some("sales".to_string());
        config.username = Some("u".to_string());
        config.password = Some("p".to_string());
    }

    #[tokio::test]
    async fn test_validation_blocks_network() {
        let gateway = Arc::new(FakeGateway::default());
        let (wizard, _) = wizard(WizardVariant::Single, gateway.clone());

        assert!(matches!(
            wizard.test_connection().await,
            Err(WizardError::WrongStep(WizardStep::SelectType))
        ));

        wizard.select_type(SourceType::Database(Dialect::Postgresql)).unwrap();
        let err = wizard.test_connection().await.unwrap_err();
        assert!(matches!(err, WizardError::Validation(_)));
        assert!(wizard.state().alert.unwrap().contains("host"));
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_storage_uri_must_match_provider() {
        let gateway = Arc::new(FakeGateway::default());
        let (wizard, _) = wizard(WizardVariant::Single, gateway.clone());
        wizard.select_type(SourceType::CloudStorage(StorageProvider::S3)).unwrap();
        wizard
            .update_config(|c| {
                c.name = "lake".to_string();
                c.storage_uri = Some("gs://bucket/tables".to_string());
                c.extra.insert("access_key_id".to_string(), "AKIA".to_string());
                c.extra.insert("secret_access_key".to_string(), "secret".to_string());
            })
            .unwrap();

        assert!(matches!(
            wizard.test_connection().await,
            Err(WizardError::InvalidUrl(_))
        ));
        assert_eq!(gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_single_flow() {
        let gateway = Arc::new(FakeGateway::default());
        let (wizard, feedback) = wizard(WizardVariant::Single, gateway.clone());

        wizard.select_type(SourceType::Database(Dialect::Postgresql)).unwrap();
        wizard.update_config(|c| fill_postgres(c, "sales")).unwrap();
        assert_eq!(
            wizard.connection_url().as_deref(),
            Some("postgresql+psycopg2://u:p@db.example.com:5432/sales")
        );

        wizard.test_connection().await.unwrap();
        assert_eq!(
            wizard.state().status,
            ConnectionStatus::Succeeded("sales".to_string())
        );

        let created = wizard.save().await.unwrap();
        assert_eq!(created.id, "db-sales");
        assert_eq!(wizard.state().step, WizardStep::Done);
        assert_eq!(feedback.successes.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_pasted_url_fills_the_form() {
        let gateway = Arc::new(FakeGateway::default());
        let (wizard, _) = wizard(WizardVariant::Single, gateway);
        wizard.select_type(SourceType::Database(Dialect::Postgresql)).unwrap();
        wizard
            .apply_connection_url("mysql+pymysql://admin:pw@10.0.0.5:3307/shop")
            .unwrap();

        let state = wizard.state();
        assert_eq!(state.source, Some(SourceType::Database(Dialect::Mysql)));
        assert_eq!(state.config.port, Some(3307));
        assert_eq!(state.config.username.as_deref(), Some("admin"));
        assert!(wizard.apply_connection_url("nonsense").is_err());
    }

    #[tokio::test]
    async fn test_pasted_warehouse_url_keeps_warehouse_source() {
        let gateway = Arc::new(FakeGateway::default());
        let (wizard, _) = wizard(WizardVariant::Single, gateway);
        wizard
            .select_type(SourceType::Warehouse(WarehouseKind::Redshift))
            .unwrap();
        wizard.update_config(|c| c.name = "rs".to_string()).unwrap();
        wizard
            .apply_connection_url("redshift+psycopg2://u:p@cluster.aws.com:5439/dev")
            .unwrap();

        let state = wizard.state();
        assert_eq!(state.source, Some(SourceType::Warehouse(WarehouseKind::Redshift)));
        assert_eq!(state.config.host.as_deref(), Some("cluster.aws.com"));
        assert!(state.config.validate(&SourceType::Warehouse(WarehouseKind::Redshift)).is_ok());
        assert_eq!(
            wizard.connection_url().as_deref(),
            Some("redshift+psycopg2://u:p@cluster.aws.com:5439/dev")
        );

        wizard
            .apply_connection_url("snowflake://svc:pw@xy12345/analytics?warehouse=COMPUTE_WH")
            .unwrap();
        let state = wizard.state();
        assert_eq!(state.source, Some(SourceType::Warehouse(WarehouseKind::Snowflake)));
        assert_eq!(state.config.extra.get("account").map(String::as_str), Some("xy12345"));
        assert_eq!(
            state.config.extra.get("warehouse").map(String::as_str),
            Some("COMPUTE_WH")
        );
    }

    #[tokio::test]
    async fn test_saved_sources_go_to_the_injected_store() {
        let gateway = Arc::new(FakeGateway::default());
        let store = Arc::new(InMemorySources::default());
        let (wizard, _) = wizard(WizardVariant::MultiSource, gateway);
        let wizard = wizard
            .with_store(store.clone())
            .with_analyzer(Arc::new(CountingAnalyzer));

        wizard.select_type(SourceType::Database(Dialect::Postgresql)).unwrap();
        wizard.update_config(|c| fill_postgres(c, "crm")).unwrap();
        wizard.save().await.unwrap();
        assert_eq!(store.sources().len(), 1);
        assert_eq!(store.sources()[0].id, "db-crm");

        wizard.analyze().await.unwrap();
        wizard.deploy().unwrap();
        assert!(store.sources().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_test_result_is_discarded() {
        let gateway = Arc::new(FakeGateway::default());
        let (wizard, _) = wizard(WizardVariant::Single, gateway);
        wizard.select_type(SourceType::Database(Dialect::Postgresql)).unwrap();
        wizard.update_config(|c| fill_postgres(c, "slow")).unwrap();

        let (first, second) = tokio::join!(wizard.test_connection(), async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            wizard.update_config(|c| c.name = "fast".to_string()).unwrap();
            wizard.test_connection().await
        });

        assert!(matches!(first, Err(WizardError::Superseded)));
        assert!(second.is_ok());
        assert_eq!(
            wizard.state().status,
            ConnectionStatus::Succeeded("fast".to_string())
        );
    }

    #[tokio::test]
    async fn test_forbidden_opens_permission_prompt() {
        let gateway = Arc::new(FakeGateway {
            forbid: true,
            ..FakeGateway::default()
        });
        let (wizard, feedback) = wizard(WizardVariant::Single, gateway);
        wizard.select_type(SourceType::Database(Dialect::Postgresql)).unwrap();
        wizard.update_config(|c| fill_postgres(c, "sales")).unwrap();

        assert!(wizard.test_connection().await.is_err());
        assert!(matches!(wizard.state().status, ConnectionStatus::Failed(_)));
        assert!(wizard.save().await.is_err());
        assert_eq!(feedback.prompt_count(), 2);
        assert_eq!(feedback.error_count(), 0);
        // A failed save leaves the form in place for another try.
        assert_eq!(wizard.state().step, WizardStep::Configure);
    }

    #[tokio::test]
    async fn test_multi_source_flow() {
        let gateway = Arc::new(FakeGateway::default());
        let (wizard, _) = wizard(WizardVariant::MultiSource, gateway);
        let wizard = wizard.with_analyzer(Arc::new(CountingAnalyzer));

        assert!(matches!(wizard.analyze().await, Err(WizardError::NothingSaved)));

        wizard.select_type(SourceType::File(FileFormat::Csv)).unwrap();
        wizard
            .update_config(|c| {
                c.name = "orders".to_string();
                c.file = Some(FileUpload {
                    file_name: "orders.csv".to_string(),
                    bytes: b"id,total\n1,10\n".to_vec(),
                });
            })
            .unwrap();
        wizard.test_connection().await.unwrap();
        wizard.save().await.unwrap();
        assert_eq!(wizard.state().step, WizardStep::SelectType);

        wizard.select_type(SourceType::Database(Dialect::Postgresql)).unwrap();
        wizard.update_config(|c| fill_postgres(c, "crm")).unwrap();
        wizard.save().await.unwrap();
        assert_eq!(wizard.created_sources().len(), 2);

        let insights = wizard.analyze().await.unwrap();
        assert_eq!(insights.len(), 2);
        assert_eq!(wizard.state().step, WizardStep::Analyze);

        let deployed = wizard.deploy().unwrap();
        let ids: Vec<_> = deployed.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["file-orders", "db-crm"]);
        assert!(wizard.created_sources().is_empty());
        assert_eq!(wizard.state().step, WizardStep::SelectType);
    }

    #[tokio::test]
    async fn test_back_navigation() {
        let gateway = Arc::new(FakeGateway::default());
        let (wizard, _) = wizard(WizardVariant::Single, gateway);
        wizard.select_type(SourceType::Api).unwrap();
        wizard.back();
        assert_eq!(wizard.state().step, WizardStep::SelectType);
        assert!(wizard.deploy().is_err());
    }
}

// Repository traits for backend access
use crate::application::error::ApiError;
use crate::domain::dashboard::Dashboard;
use crate::domain::data_source::{CreatedSource, FileFormat, FileUpload, SourceType};
use crate::domain::records::{
    ChartRecord, DashboardRecord, MemberRecord, Role, Snapshot, SnapshotRecord,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[async_trait]
pub trait ChartRepository: Send + Sync {
    /// List all charts visible to the current user
    async fn list_charts(&self) -> Result<Vec<ChartRecord>, ApiError>;

    async fn delete_chart(&self, id: &str) -> Result<(), ApiError>;

    /// Make a chart public or private
    async fn set_chart_visibility(&self, id: &str, is_public: bool) -> Result<(), ApiError>;

    /// Export a chart and return the download URL
    async fn export_chart(&self, id: &str) -> Result<String, ApiError>;

    async fn duplicate_chart(&self, id: &str, name: &str) -> Result<(), ApiError>;
}

#[async_trait]
pub trait DashboardRepository: Send + Sync {
    async fn list_dashboards(&self) -> Result<Vec<DashboardRecord>, ApiError>;

    async fn delete_dashboard(&self, id: &str) -> Result<(), ApiError>;

    /// Persist the full dashboard state
    async fn save_dashboard(&self, id: &str, dashboard: &Dashboard) -> Result<(), ApiError>;
}

#[async_trait]
pub trait DataSourceGateway: Send + Sync {
    /// Upload a file as a new data source (multipart)
    async fn upload_file(
        &self,
        name: &str,
        format: FileFormat,
        file: &FileUpload,
    ) -> Result<Value, ApiError>;

    /// Check that the backend can reach the source without creating it
    async fn test_connection(&self, source: &SourceType, body: &Value) -> Result<Value, ApiError>;

    /// Create the connection on the backend
    async fn create_connection(&self, source: &SourceType, body: &Value)
        -> Result<Value, ApiError>;
}

#[async_trait]
pub trait TeamRepository: Send + Sync {
    async fn list_members(&self, organization_id: &str) -> Result<Vec<MemberRecord>, ApiError>;

    async fn change_role(
        &self,
        organization_id: &str,
        user_id: &str,
        role: Role,
    ) -> Result<(), ApiError>;

    async fn invite(&self, email: &str, role: Role) -> Result<(), ApiError>;
}

#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    async fn list_snapshots(&self) -> Result<Vec<SnapshotRecord>, ApiError>;

    async fn get_snapshot(&self, id: &str) -> Result<Snapshot, ApiError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInsight {
    pub source_id: String,
    pub summary: String,
}

/// Optional analysis stage of the multi-source wizard.
#[async_trait]
pub trait SourceAnalyzer: Send + Sync {
    async fn analyze(&self, sources: &[CreatedSource]) -> Result<Vec<SourceInsight>, ApiError>;
}

/// Used when no analyzer is configured.
pub struct NoopAnalyzer;

#[async_trait]
impl SourceAnalyzer for NoopAnalyzer {
    async fn analyze(&self, _sources: &[CreatedSource]) -> Result<Vec<SourceInsight>, ApiError> {
        Ok(Vec::new())
    }
}

/// Keeps the sources the multi-source wizard has created until they are deployed.
pub trait SourceStore: Send + Sync {
    fn sources(&self) -> Vec<CreatedSource>;

    /// Add a source, replacing any entry with the same id
    fn insert(&self, source: CreatedSource) -> anyhow::Result<()>;

    fn clear(&self) -> anyhow::Result<()>;
}

/// Default store that forgets everything when the process exits.
#[derive(Default)]
pub struct InMemorySources {
    sources: Mutex<Vec<CreatedSource>>,
}

impl SourceStore for InMemorySources {
    fn sources(&self) -> Vec<CreatedSource> {
        self.sources.lock().clone()
    }

    fn insert(&self, source: CreatedSource) -> anyhow::Result<()> {
        let mut sources = self.sources.lock();
        sources.retain(|s| s.id != source.id);
        sources.push(source);
        Ok(())
    }

    fn clear(&self) -> anyhow::Result<()> {
        self.sources.lock().clear();
        Ok(())
    }
}

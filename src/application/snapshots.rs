// Snapshot library - Saved query results that widgets can bind to
use crate::application::error::ApiError;
use crate::application::feedback::FailureReporter;
use crate::application::ports::SnapshotRepository;
use crate::domain::records::{Snapshot, SnapshotRecord};
use std::sync::Arc;

pub struct SnapshotLibrary {
    repository: Arc<dyn SnapshotRepository>,
    reporter: FailureReporter,
}

impl SnapshotLibrary {
    pub fn new(repository: Arc<dyn SnapshotRepository>, reporter: FailureReporter) -> Self {
        Self { repository, reporter }
    }

    pub async fn list(&self) -> Result<Vec<SnapshotRecord>, ApiError> {
        self.repository
            .list_snapshots()
            .await
            .inspect_err(|e| self.reporter.report("load snapshots", e))
    }

    pub async fn load(&self, id: &str) -> Result<Snapshot, ApiError> {
        let snapshot = self
            .repository
            .get_snapshot(id)
            .await
            .inspect_err(|e| self.reporter.report("load snapshot", e))?;
        tracing::debug!("Loaded snapshot {} with {} rows", snapshot.id, snapshot.rows.len());
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::feedback::testing::RecordingFeedback;
    use crate::application::studio::{StudioSession, StudioSettings};
    use crate::application::ports::DashboardRepository;
    use crate::domain::dashboard::Dashboard;
    use crate::domain::records::DashboardRecord;
    use async_trait::async_trait;
    use serde_json::json;

    struct FakeSnapshots;

    #[async_trait]
    impl SnapshotRepository for FakeSnapshots {
        async fn list_snapshots(&self) -> Result<Vec<SnapshotRecord>, ApiError> {
            Ok(vec![SnapshotRecord {
                id: "s1".to_string(),
                name: "Q3 orders".to_string(),
                row_count: 2,
                columns: vec!["region".to_string(), "total".to_string()],
                created_at: None,
            }])
        }

        async fn get_snapshot(&self, id: &str) -> Result<Snapshot, ApiError> {
            if id != "s1" {
                return Err(ApiError::Forbidden {
                    resource: format!("/api/snapshots/{}", id),
                });
            }
            Ok(Snapshot {
                id: "s1".to_string(),
                name: "Q3 orders".to_string(),
                columns: vec!["region".to_string(), "total".to_string()],
                rows: vec![json!(["EU", 10]), json!(["US", 12])],
            })
        }
    }

    struct NoDashboards;

    #[async_trait]
    impl DashboardRepository for NoDashboards {
        async fn list_dashboards(&self) -> Result<Vec<DashboardRecord>, ApiError> {
            Ok(Vec::new())
        }

        async fn delete_dashboard(&self, _id: &str) -> Result<(), ApiError> {
            Ok(())
        }

        async fn save_dashboard(&self, _id: &str, _dashboard: &Dashboard) -> Result<(), ApiError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_load_and_bind() {
        let feedback = Arc::new(RecordingFeedback::default());
        let library = SnapshotLibrary::new(Arc::new(FakeSnapshots), feedback.reporter());
        assert_eq!(library.list().await.unwrap()[0].row_count, 2);

        let snapshot = library.load("s1").await.unwrap();
        let session = StudioSession::new(
            Arc::new(NoDashboards),
            feedback.reporter(),
            StudioSettings::default(),
        );
        let id = session.add_widget("table");
        session.bind_snapshot(&id, &snapshot).unwrap();

        let widget = session.widget(&id).unwrap();
        assert_eq!(widget.data["rows"][1], json!(["US", 12]));
        assert_eq!(
            widget.config["dataSource"],
            json!({"type": "snapshot", "snapshotId": "s1"})
        );
    }

    #[tokio::test]
    async fn test_forbidden_snapshot() {
        let feedback = Arc::new(RecordingFeedback::default());
        let library = SnapshotLibrary::new(Arc::new(FakeSnapshots), feedback.reporter());
        assert!(library.load("s2").await.is_err());
        assert_eq!(feedback.prompt_count(), 1);
    }
}

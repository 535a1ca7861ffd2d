// Catalog services - Use cases for the chart and dashboard list pages
use crate::application::error::ApiError;
use crate::application::feedback::FailureReporter;
use crate::application::ports::{ChartRepository, DashboardRepository};
use crate::domain::records::{ChartRecord, DashboardRecord, RecordFilter};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Loaded records plus the token of the refresh that produced them.
#[derive(Debug)]
struct Listing<T> {
    records: Mutex<Vec<T>>,
    sequence: AtomicU64,
}

impl<T: Clone> Listing<T> {
    fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            sequence: AtomicU64::new(0),
        }
    }

    fn begin(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Store a refresh result unless a newer refresh started meanwhile.
    fn finish(&self, ticket: u64, records: Vec<T>) -> bool {
        let mut current = self.records.lock();
        if self.sequence.load(Ordering::SeqCst) != ticket {
            return false;
        }
        *current = records;
        true
    }

    fn snapshot(&self) -> Vec<T> {
        self.records.lock().clone()
    }
}

pub struct ChartCatalog {
    repository: Arc<dyn ChartRepository>,
    reporter: FailureReporter,
    listing: Listing<ChartRecord>,
}

impl ChartCatalog {
    pub fn new(repository: Arc<dyn ChartRepository>, reporter: FailureReporter) -> Self {
        Self {
            repository,
            reporter,
            listing: Listing::new(),
        }
    }

    pub fn charts(&self) -> Vec<ChartRecord> {
        self.listing.snapshot()
    }

    pub fn visible(&self, filter: &RecordFilter) -> Vec<ChartRecord> {
        self.listing
            .records
            .lock()
            .iter()
            .filter(|c| filter.matches_chart(c))
            .cloned()
            .collect()
    }

    pub async fn refresh(&self) -> Result<Vec<ChartRecord>, ApiError> {
        let ticket = self.listing.begin();
        match self.repository.list_charts().await {
            Ok(charts) => {
                if !self.listing.finish(ticket, charts.clone()) {
                    tracing::debug!("Dropping stale chart list ({} records)", charts.len());
                }
                Ok(charts)
            }
            Err(e) => {
                self.reporter.report("load charts", &e);
                Err(e)
            }
        }
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        if let Err(e) = self.repository.delete_chart(id).await {
            self.reporter.report("delete chart", &e);
            return Err(e);
        }
        self.listing.records.lock().retain(|c| c.id != id);
        self.reporter.success("Chart deleted");
        Ok(())
    }

    fn set_public(&self, id: &str, is_public: bool) {
        if let Some(chart) = self.listing.records.lock().iter_mut().find(|c| c.id == id) {
            chart.is_public = is_public;
        }
    }

    /// Flip visibility locally first, and put it back if the backend refuses.
    pub async fn toggle_share(&self, id: &str) -> Result<bool, ApiError> {
        let current = self
            .listing
            .records
            .lock()
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.is_public)
            .unwrap_or(false);
        let next = !current;
        self.set_public(id, next);

        match self.repository.set_chart_visibility(id, next).await {
            Ok(()) => {
                let label = if next { "public" } else { "private" };
                self.reporter.success(&format!("Chart is now {}", label));
                Ok(next)
            }
            Err(e) => {
                self.set_public(id, current);
                self.reporter.report("change chart visibility", &e);
                Err(e)
            }
        }
    }

    pub async fn export(&self, id: &str) -> Result<String, ApiError> {
        self.repository.export_chart(id).await.inspect_err(|e| {
            self.reporter.report("export chart", e);
        })
    }

    pub async fn duplicate(&self, id: &str, name: Option<&str>) -> Result<(), ApiError> {
        let name = match name {
            Some(name) => name.to_string(),
            None => {
                let original = self
                    .listing
                    .records
                    .lock()
                    .iter()
                    .find(|c| c.id == id)
                    .map(|c| c.name.clone())
                    .unwrap_or_else(|| "Chart".to_string());
                format!("{} (Copy)", original)
            }
        };

        if let Err(e) = self.repository.duplicate_chart(id, &name).await {
            self.reporter.report("duplicate chart", &e);
            return Err(e);
        }
        self.reporter.success(&format!("Created '{}'", name));
        self.refresh().await.map(|_| ())
    }
}

pub struct DashboardCatalog {
    repository: Arc<dyn DashboardRepository>,
    reporter: FailureReporter,
    listing: Listing<DashboardRecord>,
}

impl DashboardCatalog {
    pub fn new(repository: Arc<dyn DashboardRepository>, reporter: FailureReporter) -> Self {
        Self {
            repository,
            reporter,
            listing: Listing::new(),
        }
    }

    pub fn dashboards(&self) -> Vec<DashboardRecord> {
        self.listing.snapshot()
    }

    pub fn visible(&self, filter: &RecordFilter) -> Vec<DashboardRecord> {
        self.listing
            .records
            .lock()
            .iter()
            .filter(|d| filter.matches_dashboard(d))
            .cloned()
            .collect()
    }

    pub async fn refresh(&self) -> Result<Vec<DashboardRecord>, ApiError> {
        let ticket = self.listing.begin();
        match self.repository.list_dashboards().await {
            Ok(dashboards) => {
                if !self.listing.finish(ticket, dashboards.clone()) {
                    tracing::debug!("Dropping stale dashboard list");
                }
                Ok(dashboards)
            }
            Err(e) => {
                self.reporter.report("load dashboards", &e);
                Err(e)
            }
        }
    }

    pub async fn delete(&self, id: &str) -> Result<(), ApiError> {
        if let Err(e) = self.repository.delete_dashboard(id).await {
            self.reporter.report("delete dashboard", &e);
            return Err(e);
        }
        self.listing.records.lock().retain(|d| d.id != id);
        self.reporter.success("Dashboard deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::feedback::testing::RecordingFeedback;
    use crate::domain::dashboard::Dashboard;
    use crate::domain::records::Visibility;
    use async_trait::async_trait;
    use std::time::Duration;

    fn forbidden(path: &str) -> ApiError {
        ApiError::Forbidden {
            resource: path.to_string(),
        }
    }

    fn chart(id: &str, name: &str, is_public: bool) -> ChartRecord {
        ChartRecord {
            id: id.to_string(),
            name: name.to_string(),
            chart_type: "bar".to_string(),
            status: "active".to_string(),
            is_public,
            last_modified: None,
            owner: None,
        }
    }

    #[derive(Default)]
    struct FakeCharts {
        charts: Mutex<Vec<ChartRecord>>,
        forbid: bool,
        duplicated: Mutex<Vec<String>>,
        list_calls: AtomicU64,
    }

    impl FakeCharts {
        fn with(charts: Vec<ChartRecord>) -> Self {
            Self {
                charts: Mutex::new(charts),
                ..Self::default()
            }
        }

        fn forbidden() -> Self {
            Self {
                charts: Mutex::new(vec![chart("c1", "Revenue", false)]),
                forbid: true,
                ..Self::default()
            }
        }

        fn guard(&self, path: &str) -> Result<(), ApiError> {
            if self.forbid { Err(forbidden(path)) } else { Ok(()) }
        }
    }

    #[async_trait]
    impl ChartRepository for FakeCharts {
        async fn list_charts(&self) -> Result<Vec<ChartRecord>, ApiError> {
            self.guard("/api/charts/")?;
            // The first listing is slow so a later refresh can overtake it.
            let call = self.list_calls.fetch_add(1, Ordering::SeqCst);
            let snapshot = self.charts.lock().clone();
            if call == 0 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            Ok(snapshot)
        }

        async fn delete_chart(&self, id: &str) -> Result<(), ApiError> {
            self.guard(&format!("/api/charts/{}", id))?;
            self.charts.lock().retain(|c| c.id != id);
            Ok(())
        }

        async fn set_chart_visibility(&self, id: &str, _is_public: bool) -> Result<(), ApiError> {
            self.guard(&format!("/api/charts/{}/share", id))
        }

        async fn export_chart(&self, id: &str) -> Result<String, ApiError> {
            self.guard(&format!("/api/charts/{}/export", id))?;
            Ok(format!("/downloads/{}.json", id))
        }

        async fn duplicate_chart(&self, id: &str, name: &str) -> Result<(), ApiError> {
            self.guard(&format!("/api/charts/{}/duplicate", id))?;
            self.duplicated.lock().push(name.to_string());
            let mut charts = self.charts.lock();
            let copy = chart(&format!("{}-copy", id), name, false);
            charts.push(copy);
            Ok(())
        }
    }

    fn catalog(repo: Arc<FakeCharts>) -> (ChartCatalog, Arc<RecordingFeedback>) {
        let feedback = Arc::new(RecordingFeedback::default());
        (ChartCatalog::new(repo, feedback.reporter()), feedback)
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_and_filter() {
        let repo = Arc::new(FakeCharts::with(vec![
            chart("c1", "Revenue by Region", true),
            chart("c2", "Churn", false),
        ]));
        let (catalog, _) = catalog(repo);
        catalog.refresh().await.unwrap();

        assert_eq!(catalog.visible(&RecordFilter::search("revenue")).len(), 1);
        let private = RecordFilter {
            visibility: Some(Visibility::Private),
            ..RecordFilter::default()
        };
        let names: Vec<_> = catalog.visible(&private).into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Churn"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_refresh_is_dropped() {
        let repo = Arc::new(FakeCharts::with(vec![chart("c1", "Old", false)]));
        let (catalog, _) = catalog(repo.clone());

        let (slow, fast) = tokio::join!(catalog.refresh(), async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            repo.charts.lock().push(chart("c2", "New", false));
            catalog.refresh().await
        });

        assert_eq!(slow.unwrap().len(), 1);
        assert_eq!(fast.unwrap().len(), 2);
        assert_eq!(catalog.charts().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_and_duplicate() {
        let repo = Arc::new(FakeCharts::with(vec![
            chart("c1", "Revenue", true),
            chart("c2", "Churn", false),
        ]));
        let (catalog, feedback) = catalog(repo.clone());
        catalog.refresh().await.unwrap();

        catalog.delete("c2").await.unwrap();
        assert_eq!(catalog.charts().len(), 1);

        catalog.duplicate("c1", None).await.unwrap();
        assert_eq!(repo.duplicated.lock().clone(), vec!["Revenue (Copy)"]);
        assert_eq!(catalog.charts().len(), 2);

        catalog.duplicate("c1", Some("Q3 Revenue")).await.unwrap();
        assert_eq!(repo.duplicated.lock()[1], "Q3 Revenue");
        assert_eq!(feedback.error_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_share_is_optimistic() {
        let repo = Arc::new(FakeCharts::with(vec![chart("c1", "Revenue", false)]));
        let (catalog, _) = catalog(repo);
        catalog.refresh().await.unwrap();

        assert!(catalog.toggle_share("c1").await.unwrap());
        assert!(catalog.charts()[0].is_public);
        assert!(!catalog.toggle_share("c1").await.unwrap());
        assert!(!catalog.charts()[0].is_public);
    }

    #[tokio::test]
    async fn test_toggle_share_rolls_back_on_failure() {
        let repo = Arc::new(FakeCharts::forbidden());
        let (catalog, feedback) = catalog(repo);
        catalog
            .listing
            .finish(catalog.listing.begin(), vec![chart("c1", "Revenue", false)]);

        assert!(catalog.toggle_share("c1").await.is_err());
        assert!(!catalog.charts()[0].is_public);
        assert_eq!(feedback.prompt_count(), 1);
    }

    #[tokio::test]
    async fn test_forbidden_at_every_call_site() {
        let repo = Arc::new(FakeCharts::forbidden());
        let (catalog, feedback) = catalog(repo);
        catalog
            .listing
            .finish(catalog.listing.begin(), vec![chart("c1", "Revenue", false)]);

        assert!(catalog.refresh().await.is_err());
        assert!(catalog.delete("c1").await.is_err());
        assert!(catalog.toggle_share("c1").await.is_err());
        assert!(catalog.export("c1").await.is_err());
        assert!(catalog.duplicate("c1", None).await.is_err());

        assert_eq!(feedback.prompt_count(), 5);
        assert_eq!(feedback.error_count(), 0);
        // Nothing was removed locally.
        assert_eq!(catalog.charts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_export_url() {
        let repo = Arc::new(FakeCharts::with(vec![chart("c1", "Revenue", false)]));
        let (catalog, _) = catalog(repo);
        assert_eq!(catalog.export("c1").await.unwrap(), "/downloads/c1.json");
    }

    struct FakeDashboards {
        forbid: bool,
    }

    #[async_trait]
    impl DashboardRepository for FakeDashboards {
        async fn list_dashboards(&self) -> Result<Vec<DashboardRecord>, ApiError> {
            if self.forbid {
                return Err(forbidden("/api/dashboards/"));
            }
            Ok(vec![
                DashboardRecord {
                    id: "d1".to_string(),
                    title: "Sales".to_string(),
                    widget_count: 4,
                    is_public: true,
                    last_modified: None,
                },
                DashboardRecord {
                    id: "d2".to_string(),
                    title: "Ops".to_string(),
                    widget_count: 2,
                    is_public: false,
                    last_modified: None,
                },
            ])
        }

        async fn delete_dashboard(&self, id: &str) -> Result<(), ApiError> {
            if self.forbid {
                return Err(forbidden(&format!("/api/dashboards/{}", id)));
            }
            Ok(())
        }

        async fn save_dashboard(&self, _id: &str, _dashboard: &Dashboard) -> Result<(), ApiError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_dashboard_catalog() {
        let feedback = Arc::new(RecordingFeedback::default());
        let catalog = DashboardCatalog::new(
            Arc::new(FakeDashboards { forbid: false }),
            feedback.reporter(),
        );
        catalog.refresh().await.unwrap();
        assert_eq!(catalog.visible(&RecordFilter::search("sal")).len(), 1);

        catalog.delete("d1").await.unwrap();
        let ids: Vec<_> = catalog.dashboards().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["d2"]);
    }

    #[tokio::test]
    async fn test_dashboard_catalog_forbidden() {
        let feedback = Arc::new(RecordingFeedback::default());
        let catalog = DashboardCatalog::new(
            Arc::new(FakeDashboards { forbid: true }),
            feedback.reporter(),
        );
        assert!(catalog.refresh().await.is_err());
        assert!(catalog.delete("d1").await.is_err());
        assert_eq!(feedback.prompt_count(), 2);
    }
}

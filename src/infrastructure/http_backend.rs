// REST backend implementation of the studio ports
use crate::application::error::ApiError;
use crate::application::ports::{
    ChartRepository, DashboardRepository, DataSourceGateway, SnapshotRepository, TeamRepository,
};
use crate::domain::dashboard::Dashboard;
use crate::domain::data_source::{FileFormat, FileUpload, SourceType};
use crate::domain::records::{
    ChartRecord, DashboardRecord, MemberRecord, Role, Snapshot, SnapshotRecord,
};
use crate::infrastructure::config::ApiSettings;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionAction {
    Test,
    Connect,
}

/// Endpoint for testing or creating a non-file source.
pub fn connection_endpoint(source: &SourceType, action: ConnectionAction) -> Option<&'static str> {
    use ConnectionAction::*;
    let path = match (source, action) {
        (SourceType::File(_), _) => return None,
        (SourceType::Database(_), Test) => "/api/data/database/test",
        (SourceType::Database(_), Connect) => "/api/data/database/connect",
        // Warehouses are tested through the generic database test with their built URL.
        (SourceType::Warehouse(_), Test) => "/api/data/database/test",
        (SourceType::Warehouse(_), Connect) => "/api/data/warehouses/connect",
        (SourceType::CloudStorage(_), Test) => "/api/data/delta-iceberg/test",
        (SourceType::CloudStorage(_), Connect) => "/api/data/delta-iceberg/connect",
        (SourceType::Api, Test) => "/api/data/api/test",
        (SourceType::Api, Connect) => "/api/data/api/connect",
    };
    Some(path)
}

fn segment(id: &str) -> String {
    urlencoding::encode(id).into_owned()
}

/// Pull `key` out of an envelope, or take the whole body if the backend sent a bare value.
fn extract<T: DeserializeOwned>(mut body: Value, key: &str) -> Result<T, ApiError> {
    let value = match body.get_mut(key).map(Value::take) {
        Some(inner) => inner,
        None => body,
    };
    serde_json::from_value(value).map_err(|e| ApiError::Decode(format!("{}: {}", key, e)))
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(settings: &ApiSettings) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            token: settings.token.clone().filter(|t| !t.is_empty()),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .header("Accept", "application/json");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn execute(&self, path: &str, request: RequestBuilder) -> Result<Value, ApiError> {
        let response = request.send().await.map_err(|e| {
            tracing::error!("Request to {} failed: {}", path, e);
            ApiError::Transport(e.to_string())
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            tracing::warn!("Permission denied for {}", path);
            return Err(ApiError::Forbidden {
                resource: path.to_string(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if !status.is_success() {
            tracing::error!("Request to {} failed with status {}", path, status);
            return Err(ApiError::Status {
                path: path.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        let data: Value =
            serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))?;

        if data.get("success") == Some(&Value::Bool(false)) {
            let reason = data
                .get("error")
                .or_else(|| data.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("request was not successful");
            return Err(ApiError::Rejected(reason.to_string()));
        }

        Ok(data)
    }

    async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.execute(path, self.request(Method::GET, path)).await
    }

    async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.execute(path, self.request(Method::DELETE, path)).await
    }

    async fn send_json(&self, method: Method, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.execute(path, self.request(method, path).json(body))
            .await
    }

    async fn connection(
        &self,
        source: &SourceType,
        action: ConnectionAction,
        body: &Value,
    ) -> Result<Value, ApiError> {
        let Some(path) = connection_endpoint(source, action) else {
            return Err(ApiError::Rejected(format!(
                "{} sources are uploaded, not connected",
                source.tag()
            )));
        };
        tracing::debug!("{:?} {} source via {}", action, source.tag(), path);
        self.send_json(Method::POST, path, body).await
    }
}

#[async_trait]
impl ChartRepository for HttpBackend {
    async fn list_charts(&self) -> Result<Vec<ChartRecord>, ApiError> {
        extract(self.get("/api/charts/").await?, "charts")
    }

    async fn delete_chart(&self, id: &str) -> Result<(), ApiError> {
        self.delete(&format!("/api/charts/{}", segment(id))).await?;
        Ok(())
    }

    async fn set_chart_visibility(&self, id: &str, is_public: bool) -> Result<(), ApiError> {
        let path = format!("/api/charts/{}/share", segment(id));
        self.send_json(Method::POST, &path, &json!({ "is_public": is_public }))
            .await?;
        Ok(())
    }

    async fn export_chart(&self, id: &str) -> Result<String, ApiError> {
        let response = self
            .get(&format!("/api/charts/{}/export", segment(id)))
            .await?;
        response
            .get("export_url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ApiError::Decode("response has no export_url".to_string()))
    }

    async fn duplicate_chart(&self, id: &str, name: &str) -> Result<(), ApiError> {
        let path = format!("/api/charts/{}/duplicate", segment(id));
        self.send_json(Method::POST, &path, &json!({ "name": name }))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DashboardRepository for HttpBackend {
    async fn list_dashboards(&self) -> Result<Vec<DashboardRecord>, ApiError> {
        extract(self.get("/api/dashboards/").await?, "dashboards")
    }

    async fn delete_dashboard(&self, id: &str) -> Result<(), ApiError> {
        self.delete(&format!("/api/dashboards/{}", segment(id)))
            .await?;
        Ok(())
    }

    async fn save_dashboard(&self, id: &str, dashboard: &Dashboard) -> Result<(), ApiError> {
        let body = serde_json::to_value(dashboard).map_err(|e| ApiError::Decode(e.to_string()))?;
        self.send_json(Method::PUT, &format!("/api/dashboards/{}", segment(id)), &body)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl DataSourceGateway for HttpBackend {
    async fn upload_file(
        &self,
        name: &str,
        format: FileFormat,
        file: &FileUpload,
    ) -> Result<Value, ApiError> {
        let part = reqwest::multipart::Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone());
        let form = reqwest::multipart::Form::new()
            .text("name", name.to_string())
            .text("file_type", format.tag())
            .part("file", part);

        let path = "/api/data/upload";
        tracing::info!("Uploading {} ({} bytes)", file.file_name, file.bytes.len());
        self.execute(path, self.request(Method::POST, path).multipart(form))
            .await
    }

    async fn test_connection(&self, source: &SourceType, body: &Value) -> Result<Value, ApiError> {
        self.connection(source, ConnectionAction::Test, body).await
    }

    async fn create_connection(&self, source: &SourceType, body: &Value) -> Result<Value, ApiError> {
        self.connection(source, ConnectionAction::Connect, body)
            .await
    }
}

#[async_trait]
impl TeamRepository for HttpBackend {
    async fn list_members(&self, organization_id: &str) -> Result<Vec<MemberRecord>, ApiError> {
        let path = format!("/api/rbac/organizations/{}/members", segment(organization_id));
        extract(self.get(&path).await?, "members")
    }

    async fn change_role(
        &self,
        organization_id: &str,
        user_id: &str,
        role: Role,
    ) -> Result<(), ApiError> {
        let path = format!(
            "/api/rbac/organizations/{}/members/{}/role",
            segment(organization_id),
            segment(user_id)
        );
        let request = self
            .request(Method::POST, &path)
            .query(&[("role", role.as_str())]);
        self.execute(&path, request).await?;
        Ok(())
    }

    async fn invite(&self, email: &str, role: Role) -> Result<(), ApiError> {
        self.send_json(
            Method::POST,
            "/api/organization/invite",
            &json!({ "email": email, "role": role.as_str() }),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotRepository for HttpBackend {
    async fn list_snapshots(&self) -> Result<Vec<SnapshotRecord>, ApiError> {
        extract(self.get("/api/queries/snapshots").await?, "items")
    }

    async fn get_snapshot(&self, id: &str) -> Result<Snapshot, ApiError> {
        let path = format!("/api/queries/snapshots/{}", segment(id));
        extract(self.get(&path).await?, "snapshot")
    }
}

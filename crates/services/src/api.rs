use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use roadmap_core::model::{NodeId, ProgressRecord, ProgressTree, Roadmap, RoadmapId, UserId};
use roadmap_core::state::NodeAction;

use crate::error::ApiError;

/// Body of `POST /api/progress`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertProgress {
    pub user_id: UserId,
    pub roadmap_id: RoadmapId,
    pub progress: ProgressTree,
}

/// REST surface used by the progress subsystem.
#[async_trait]
pub trait ProgressApi: Send + Sync {
    /// `POST /api/roadmaps/{roadmapId}/progress/{nodeId}/{action}`.
    ///
    /// The node-level response is not interpreted; it is returned as-is.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failures or non-success statuses.
    async fn set_node_progress(
        &self,
        roadmap_id: RoadmapId,
        node: &NodeId,
        action: NodeAction,
    ) -> Result<serde_json::Value, ApiError>;

    /// `POST /api/progress` with the full tree.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failures or non-success statuses.
    async fn upsert_progress(&self, body: &UpsertProgress) -> Result<ProgressRecord, ApiError>;

    /// `GET /api/progress`, optionally filtered by roadmap.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failures or non-success statuses.
    async fn list_progress(
        &self,
        roadmap_id: Option<RoadmapId>,
    ) -> Result<Vec<ProgressRecord>, ApiError>;

    /// `GET /api/roadmaps/{id}`, used to seed a record on first interaction.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` on transport failures or non-success statuses.
    async fn fetch_roadmap(&self, roadmap_id: RoadmapId) -> Result<Roadmap, ApiError>;
}

/// `reqwest`-backed client for the progress endpoints.
#[derive(Clone)]
pub struct HttpProgressApi {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl HttpProgressApi {
    #[must_use]
    pub fn new(base: Url, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base,
            token,
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|()| ApiError::BaseUrl(self.base.to_string()))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = self.authorize(request).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::HttpStatus(response.status()));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ProgressApi for HttpProgressApi {
    async fn set_node_progress(
        &self,
        roadmap_id: RoadmapId,
        node: &NodeId,
        action: NodeAction,
    ) -> Result<serde_json::Value, ApiError> {
        let roadmap = roadmap_id.to_string();
        let url = self.endpoint(&[
            "api",
            "roadmaps",
            &roadmap,
            "progress",
            node.as_str(),
            action.as_str(),
        ])?;

        let response = self.authorize(self.client.post(url)).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::HttpStatus(response.status()));
        }
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn upsert_progress(&self, body: &UpsertProgress) -> Result<ProgressRecord, ApiError> {
        let url = self.endpoint(&["api", "progress"])?;
        self.send_json(self.client.post(url).json(body)).await
    }

    async fn list_progress(
        &self,
        roadmap_id: Option<RoadmapId>,
    ) -> Result<Vec<ProgressRecord>, ApiError> {
        let url = self.endpoint(&["api", "progress"])?;
        let mut request = self.client.get(url);
        if let Some(id) = roadmap_id {
            request = request.query(&[("roadmapId", id.value())]);
        }
        self.send_json(request).await
    }

    async fn fetch_roadmap(&self, roadmap_id: RoadmapId) -> Result<Roadmap, ApiError> {
        let roadmap = roadmap_id.to_string();
        let url = self.endpoint(&["api", "roadmaps", &roadmap])?;
        self.send_json(self.client.get(url)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(base: &str) -> HttpProgressApi {
        HttpProgressApi::new(Url::parse(base).unwrap(), None)
    }

    #[test]
    fn node_endpoint_escapes_identifier() {
        let api = api("http://localhost:5000");
        let url = api
            .endpoint(&["api", "roadmaps", "5", "progress", "How DNS works", "complete"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:5000/api/roadmaps/5/progress/How%20DNS%20works/complete"
        );
    }

    #[test]
    fn endpoint_keeps_base_path_prefix() {
        let api = api("https://example.com/learn/");
        let url = api.endpoint(&["api", "progress"]).unwrap();
        assert_eq!(url.as_str(), "https://example.com/learn/api/progress");
    }

    #[test]
    fn upsert_body_is_camel_case() {
        let body = UpsertProgress {
            user_id: UserId::new(3),
            roadmap_id: RoadmapId::new(5),
            progress: ProgressTree::default(),
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            serde_json::json!({ "userId": 3, "roadmapId": 5, "progress": [] })
        );
    }
}

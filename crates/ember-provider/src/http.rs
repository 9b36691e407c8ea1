//! REST implementation of the compute provider capability.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use ember_core::ClusterIdentity;

use crate::client::ComputeProvider;
use crate::error::{ProviderError, ProviderResult};
use crate::types::{FirewallRule, Image, Instance, InstanceList, InstanceRequest, Operation};

/// Compute client speaking JSON over HTTP to a provider API.
#[derive(Clone)]
pub struct HttpCompute {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpCompute {
    pub fn new(base_url: &str) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(HttpCompute {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Attach a bearer token to every request.
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = &self.token {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                headers.insert(AUTHORIZATION, value);
            }
        }

        headers
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> ProviderResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).headers(self.headers()).send().await?;
        Self::handle_response(response, path).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> ProviderResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .headers(self.headers())
            .json(body)
            .send()
            .await?;
        Self::handle_response(response, path).await
    }

    async fn delete<T: DeserializeOwned>(&self, path: &str) -> ProviderResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .delete(&url)
            .headers(self.headers())
            .send()
            .await?;
        Self::handle_response(response, path).await
    }

    async fn handle_response<T: DeserializeOwned>(
        response: reqwest::Response,
        path: &str,
    ) -> ProviderResult<T> {
        let status = response.status();

        if status.is_success() {
            let body = response.text().await?;
            Ok(serde_json::from_str(&body)?)
        } else if status.as_u16() == 404 {
            Err(ProviderError::NotFound(path.to_string()))
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

#[async_trait]
impl ComputeProvider for HttpCompute {
    async fn insert_instance(
        &self,
        project: &str,
        zone: &str,
        request: &InstanceRequest,
    ) -> ProviderResult<Operation> {
        self.post(
            &format!("/projects/{}/zones/{}/instances", project, zone),
            request,
        )
        .await
    }

    async fn delete_instance(&self, identity: &ClusterIdentity) -> ProviderResult<Operation> {
        self.delete(&format!(
            "/projects/{}/zones/{}/instances/{}",
            identity.project, identity.zone, identity.name
        ))
        .await
    }

    async fn get_operation(
        &self,
        project: &str,
        zone: &str,
        id: &str,
    ) -> ProviderResult<Operation> {
        self.get(&format!(
            "/projects/{}/zones/{}/operations/{}",
            project, zone, id
        ))
        .await
    }

    async fn list_instances(&self, project: &str, zone: &str) -> ProviderResult<Vec<Instance>> {
        let list: InstanceList = self
            .get(&format!("/projects/{}/zones/{}/instances", project, zone))
            .await?;
        Ok(list.items)
    }

    async fn get_image_from_family(&self, project: &str, family: &str) -> ProviderResult<Image> {
        self.get(&format!(
            "/projects/{}/global/images/family/{}",
            project, family
        ))
        .await
    }

    async fn insert_firewall_rule(
        &self,
        project: &str,
        rule: &FirewallRule,
    ) -> ProviderResult<()> {
        let path = format!("/projects/{}/global/firewalls", project);
        match self.post::<serde_json::Value, _>(&path, rule).await {
            Ok(_) => Ok(()),
            Err(ProviderError::Api { status: 409, .. }) => {
                debug!(rule = %rule.name, "firewall rule already exists");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let client = HttpCompute::new("https://compute.example.test/v1/").unwrap();
        assert_eq!(client.base_url, "https://compute.example.test/v1");
        assert!(client.token.is_none());
    }

    #[test]
    fn with_token_sets_bearer() {
        let client = HttpCompute::new("https://compute.example.test/v1")
            .unwrap()
            .with_token("secret");
        assert_eq!(client.token.as_deref(), Some("secret"));
        let headers = client.headers();
        assert_eq!(
            headers.get(AUTHORIZATION).unwrap().to_str().unwrap(),
            "Bearer secret"
        );
    }
}

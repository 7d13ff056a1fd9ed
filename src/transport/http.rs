//! Default transport stub over the Pub/Sub JSON REST surface.
//!
//! Endpoints follow the service's documented v1 routes:
//!
//! - `PUT/GET/DELETE /v1/projects/{project}/topics/{topic}`
//! - `GET /v1/projects/{project}/topics`
//! - `POST /v1/projects/{project}/topics/{topic}:publish`
//! - `PUT/GET/DELETE /v1/projects/{project}/subscriptions/{subscription}`
//! - `GET /v1/projects/{project}/subscriptions`
//! - `POST /v1/projects/{project}/subscriptions/{subscription}:pull`
//! - `POST /v1/projects/{project}/subscriptions/{subscription}:acknowledge`
//! - `POST /v1/projects/{project}/subscriptions/{subscription}:modifyAckDeadline`

use super::{
    AcknowledgeRequest, ErrorResponse, ListSubscriptionsResponse, ListTopicsResponse,
    ModifyAckDeadlineRequest, PublishRequest, PublishResponse, PullRequest, PullResponse,
    PublisherStub, SubscriberStub, SubscriptionResource, TopicResource,
};
use crate::config::ConnectionOptions;
use crate::error::{Result, Status, StatusCode};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Environment variable redirecting the client at a local emulator.
///
/// When set, the endpoint becomes `http://$PUBSUB_EMULATOR_HOST` and
/// credentials are not attached.
pub const EMULATOR_ENV: &str = "PUBSUB_EMULATOR_HOST";

/// Transport stub speaking the JSON REST surface. Implements both
/// [`PublisherStub`] and [`SubscriberStub`].
#[derive(Debug, Clone)]
pub struct HttpStub {
    client: Client,
    base_url: String,
    credentials: Option<String>,
}

impl HttpStub {
    /// Build a stub from connection options, honoring the emulator
    /// override.
    pub fn new(options: &ConnectionOptions) -> Result<Self> {
        let (base_url, credentials) = resolve_endpoint(options);
        let client = Client::builder()
            .user_agent(options.user_agent())
            .build()
            .map_err(|e| Status::internal(format!("failed to build HTTP client: {e}")))?;
        debug!(%base_url, "constructed Pub/Sub transport stub");
        Ok(Self {
            client,
            base_url,
            credentials,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        let request = match &self.credentials {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request.send().await.map_err(transport_status)?;
        let http_code = response.status().as_u16();
        if response.status().is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(error_status(http_code, &body))
    }

    async fn execute_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.execute(request).await?;
        response
            .json()
            .await
            .map_err(|e| Status::unknown(format!("malformed response body: {e}")))
    }

    async fn execute_empty(&self, request: RequestBuilder) -> Result<()> {
        self.execute(request).await.map(|_| ())
    }
}

/// The base URL and credentials to use, after applying the emulator
/// override.
fn resolve_endpoint(options: &ConnectionOptions) -> (String, Option<String>) {
    match std::env::var(EMULATOR_ENV) {
        Ok(host) if !host.is_empty() => (format!("http://{host}/v1"), None),
        _ => (
            format!("https://{}/v1", options.endpoint),
            options.credentials.clone(),
        ),
    }
}

/// Map an error response to a [`Status`]: prefer the canonical status name
/// in the error payload, falling back to the HTTP status code.
fn error_status(http_code: u16, body: &str) -> Status {
    if let Ok(parsed) = serde_json::from_str::<ErrorResponse>(body) {
        if let Some(code) = StatusCode::from_name(&parsed.error.status) {
            return Status::new(code, parsed.error.message);
        }
        return Status::new(StatusCode::from_http(http_code), parsed.error.message);
    }
    Status::new(
        StatusCode::from_http(http_code),
        format!("HTTP status {http_code}"),
    )
}

/// Map a client-side transport failure to a [`Status`].
fn transport_status(error: reqwest::Error) -> Status {
    if error.is_timeout() {
        Status::deadline_exceeded(format!("request timed out: {error}"))
    } else if error.is_connect() {
        Status::unavailable(format!("connection failed: {error}"))
    } else {
        Status::unavailable(format!("transport error: {error}"))
    }
}

#[async_trait]
impl PublisherStub for HttpStub {
    async fn create_topic(&self, topic: TopicResource) -> Result<TopicResource> {
        let url = self.url(&topic.name);
        self.execute_json(self.client.put(url).json(&topic)).await
    }

    async fn get_topic(&self, name: &str) -> Result<TopicResource> {
        self.execute_json(self.client.get(self.url(name))).await
    }

    async fn list_topics(&self, project_id: &str) -> Result<Vec<TopicResource>> {
        let url = self.url(&format!("projects/{project_id}/topics"));
        let response: ListTopicsResponse = self.execute_json(self.client.get(url)).await?;
        Ok(response.topics)
    }

    async fn delete_topic(&self, name: &str) -> Result<()> {
        self.execute_empty(self.client.delete(self.url(name))).await
    }

    async fn publish(&self, request: PublishRequest) -> Result<PublishResponse> {
        let url = self.url(&format!("{}:publish", request.topic));
        self.execute_json(self.client.post(url).json(&request)).await
    }
}

#[async_trait]
impl SubscriberStub for HttpStub {
    async fn create_subscription(
        &self,
        subscription: SubscriptionResource,
    ) -> Result<SubscriptionResource> {
        let url = self.url(&subscription.name);
        self.execute_json(self.client.put(url).json(&subscription))
            .await
    }

    async fn get_subscription(&self, name: &str) -> Result<SubscriptionResource> {
        self.execute_json(self.client.get(self.url(name))).await
    }

    async fn list_subscriptions(&self, project_id: &str) -> Result<Vec<SubscriptionResource>> {
        let url = self.url(&format!("projects/{project_id}/subscriptions"));
        let response: ListSubscriptionsResponse = self.execute_json(self.client.get(url)).await?;
        Ok(response.subscriptions)
    }

    async fn delete_subscription(&self, name: &str) -> Result<()> {
        self.execute_empty(self.client.delete(self.url(name))).await
    }

    async fn pull(&self, request: PullRequest) -> Result<PullResponse> {
        let url = self.url(&format!("{}:pull", request.subscription));
        self.execute_json(self.client.post(url).json(&request)).await
    }

    async fn acknowledge(&self, request: AcknowledgeRequest) -> Result<()> {
        let url = self.url(&format!("{}:acknowledge", request.subscription));
        self.execute_empty(self.client.post(url).json(&request))
            .await
    }

    async fn modify_ack_deadline(&self, request: ModifyAckDeadlineRequest) -> Result<()> {
        let url = self.url(&format!("{}:modifyAckDeadline", request.subscription));
        self.execute_empty(self.client.post(url).json(&request))
            .await
    }
}

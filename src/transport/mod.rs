//! Transport stub traits and wire types for the Pub/Sub JSON API.
//!
//! The stub traits are the single seam between the pipelines and the
//! remote service: the default implementation ([`http::HttpStub`]) speaks
//! the JSON REST surface, and tests inject fakes (see [`crate::testing`]).

pub mod http;

use crate::error::Result;
use crate::message::Message;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A Pub/Sub message in wire form. The payload travels base64-encoded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PubsubMessage {
    /// Message data (base64-encoded on the wire).
    #[serde(with = "base64_bytes", default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<u8>,
    /// Message attributes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attributes: Option<BTreeMap<String, String>>,
    /// Message ID (set by server).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Publish timestamp (set by server), RFC 3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_time: Option<String>,
    /// Ordering key for ordered delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordering_key: Option<String>,
}

// Base64 encoding/decoding helpers
mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(serde::de::Error::custom)
    }
}

impl From<Message> for PubsubMessage {
    fn from(message: Message) -> Self {
        let attributes = if message.attributes().is_empty() {
            None
        } else {
            Some(message.attributes().clone())
        };
        let ordering_key = message.ordering_key().map(str::to_string);
        Self {
            data: message.data().to_vec(),
            attributes,
            message_id: message.message_id().map(str::to_string),
            publish_time: message.publish_time().map(|t| t.to_rfc3339()),
            ordering_key,
        }
    }
}

impl From<PubsubMessage> for Message {
    fn from(wire: PubsubMessage) -> Self {
        let publish_time = wire
            .publish_time
            .as_deref()
            .and_then(parse_publish_time);
        Message::from_parts(
            wire.data,
            wire.attributes.unwrap_or_default(),
            wire.message_id,
            publish_time,
            wire.ordering_key,
        )
    }
}

fn parse_publish_time(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Request for publishing a batch of messages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    /// Full topic name; carried in the request path, not the body.
    #[serde(skip)]
    pub topic: String,
    /// Messages to publish.
    pub messages: Vec<PubsubMessage>,
}

/// Response for publishing messages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishResponse {
    /// Message IDs assigned by the server, one per published message, in
    /// request order.
    #[serde(default)]
    pub message_ids: Vec<String>,
}

/// Request for pulling messages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    /// Full subscription name; carried in the request path, not the body.
    #[serde(skip)]
    pub subscription: String,
    /// Maximum number of messages to return.
    pub max_messages: i32,
    /// Whether to return immediately if no messages are available.
    pub return_immediately: bool,
}

/// Response for pulling messages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    /// Received messages; absent when the pull returned empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_messages: Option<Vec<ReceivedMessage>>,
}

impl PullResponse {
    /// The received messages, empty when the field was absent.
    pub fn into_messages(self) -> Vec<ReceivedMessage> {
        self.received_messages.unwrap_or_default()
    }
}

/// A single delivery: the message plus the ack id identifying it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedMessage {
    /// Acknowledgment ID for this delivery.
    pub ack_id: String,
    /// The message.
    pub message: PubsubMessage,
    /// Delivery attempt counter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_attempt: Option<i32>,
}

/// Request for acknowledging messages.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgeRequest {
    /// Full subscription name; carried in the request path, not the body.
    #[serde(skip)]
    pub subscription: String,
    /// Acknowledgment IDs.
    pub ack_ids: Vec<String>,
}

/// Request for modifying the acknowledgment deadline. A deadline of zero
/// makes the messages immediately eligible for redelivery (nack).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyAckDeadlineRequest {
    /// Full subscription name; carried in the request path, not the body.
    #[serde(skip)]
    pub subscription: String,
    /// Acknowledgment IDs.
    pub ack_ids: Vec<String>,
    /// New acknowledgment deadline in seconds.
    pub ack_deadline_seconds: i32,
}

/// Topic resource representation on the admin surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicResource {
    /// Full topic name (projects/{project}/topics/{topic}).
    pub name: String,
    /// Labels for the topic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
    /// Message retention duration (e.g. "604800s").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_retention_duration: Option<String>,
}

/// Subscription resource representation on the admin surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResource {
    /// Full subscription name (projects/{project}/subscriptions/{sub}).
    pub name: String,
    /// Full name of the topic the subscription consumes.
    pub topic: String,
    /// Acknowledgment deadline in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_deadline_seconds: Option<i32>,
    /// Message retention duration (e.g. "604800s").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_retention_duration: Option<String>,
    /// Labels for the subscription.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
    /// Whether message ordering is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_message_ordering: Option<bool>,
    /// Message filter expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

/// Response for listing topics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTopicsResponse {
    /// Topics in the project.
    #[serde(default)]
    pub topics: Vec<TopicResource>,
    /// Token for retrieving the next page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Response for listing subscriptions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSubscriptionsResponse {
    /// Subscriptions in the project.
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionResource>,
    /// Token for retrieving the next page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Error response format for Google Cloud APIs.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    /// Error details.
    pub error: ErrorDetail,
}

/// Error detail information.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    /// HTTP status code.
    #[serde(default)]
    pub code: u16,
    /// Error message.
    #[serde(default)]
    pub message: String,
    /// Canonical status name (e.g. "NOT_FOUND").
    #[serde(default)]
    pub status: String,
}

/// Publisher side of the service: topic administration and the publish
/// data-plane call.
#[async_trait]
pub trait PublisherStub: Send + Sync {
    /// Create a topic.
    async fn create_topic(&self, topic: TopicResource) -> Result<TopicResource>;

    /// Get a topic by full name.
    async fn get_topic(&self, name: &str) -> Result<TopicResource>;

    /// List the topics of a project.
    async fn list_topics(&self, project_id: &str) -> Result<Vec<TopicResource>>;

    /// Delete a topic by full name.
    async fn delete_topic(&self, name: &str) -> Result<()>;

    /// Publish a batch of messages, returning one server-assigned id per
    /// message, in order.
    async fn publish(&self, request: PublishRequest) -> Result<PublishResponse>;
}

/// Subscriber side of the service: subscription administration and the
/// pull / acknowledge data-plane calls.
#[async_trait]
pub trait SubscriberStub: Send + Sync {
    /// Create a subscription.
    async fn create_subscription(
        &self,
        subscription: SubscriptionResource,
    ) -> Result<SubscriptionResource>;

    /// Get a subscription by full name.
    async fn get_subscription(&self, name: &str) -> Result<SubscriptionResource>;

    /// List the subscriptions of a project.
    async fn list_subscriptions(&self, project_id: &str) -> Result<Vec<SubscriptionResource>>;

    /// Delete a subscription by full name.
    async fn delete_subscription(&self, name: &str) -> Result<()>;

    /// Pull a batch of messages.
    async fn pull(&self, request: PullRequest) -> Result<PullResponse>;

    /// Acknowledge delivered messages.
    async fn acknowledge(&self, request: AcknowledgeRequest) -> Result<()>;

    /// Modify the acknowledgment deadline of delivered messages.
    async fn modify_ack_deadline(&self, request: ModifyAckDeadlineRequest) -> Result<()>;
}

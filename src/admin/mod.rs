//! Topic and subscription administration clients.
//!
//! Thin request/response wrappers over the transport stubs. They carry no
//! state beyond the stub and perform no batching or retries; resource ids
//! are validated locally before any transport call.

use crate::config::ConnectionOptions;
use crate::error::Result;
use crate::transport::http::HttpStub;
use crate::transport::{PublisherStub, SubscriberStub, SubscriptionResource, TopicResource};
use crate::types::{self, Subscription, Topic};
use std::sync::Arc;

/// Administers topics: create, get, list, delete.
#[derive(Clone)]
pub struct TopicAdminClient {
    stub: Arc<dyn PublisherStub>,
}

impl TopicAdminClient {
    /// Wrap an existing stub.
    pub fn new(stub: Arc<dyn PublisherStub>) -> Self {
        Self { stub }
    }

    /// Build a client against the real service.
    pub fn make(options: &ConnectionOptions) -> Result<Self> {
        Ok(Self::new(Arc::new(HttpStub::new(options)?)))
    }

    /// Create the topic. Fails with INVALID_ARGUMENT before calling the
    /// transport when the topic id is malformed.
    pub async fn create_topic(&self, topic: &Topic) -> Result<TopicResource> {
        types::validate_topic_id(topic.topic_id())?;
        self.stub
            .create_topic(TopicResource {
                name: topic.full_name(),
                ..Default::default()
            })
            .await
    }

    /// Fetch the topic's resource representation.
    pub async fn get_topic(&self, topic: &Topic) -> Result<TopicResource> {
        self.stub.get_topic(&topic.full_name()).await
    }

    /// List the topics of a project.
    pub async fn list_topics(&self, project_id: &str) -> Result<Vec<TopicResource>> {
        self.stub.list_topics(project_id).await
    }

    /// Delete the topic.
    pub async fn delete_topic(&self, topic: &Topic) -> Result<()> {
        self.stub.delete_topic(&topic.full_name()).await
    }
}

/// Administers subscriptions: create, get, list, delete.
#[derive(Clone)]
pub struct SubscriptionAdminClient {
    stub: Arc<dyn SubscriberStub>,
}

impl SubscriptionAdminClient {
    /// Wrap an existing stub.
    pub fn new(stub: Arc<dyn SubscriberStub>) -> Self {
        Self { stub }
    }

    /// Build a client against the real service.
    pub fn make(options: &ConnectionOptions) -> Result<Self> {
        Ok(Self::new(Arc::new(HttpStub::new(options)?)))
    }

    /// Create a subscription attached to `topic`. Fails with
    /// INVALID_ARGUMENT before calling the transport when the subscription
    /// id is malformed.
    pub async fn create_subscription(
        &self,
        subscription: &Subscription,
        topic: &Topic,
    ) -> Result<SubscriptionResource> {
        types::validate_subscription_id(subscription.subscription_id())?;
        self.stub
            .create_subscription(SubscriptionResource {
                name: subscription.full_name(),
                topic: topic.full_name(),
                ..Default::default()
            })
            .await
    }

    /// Fetch the subscription's resource representation.
    pub async fn get_subscription(
        &self,
        subscription: &Subscription,
    ) -> Result<SubscriptionResource> {
        self.stub.get_subscription(&subscription.full_name()).await
    }

    /// List the subscriptions of a project.
    pub async fn list_subscriptions(&self, project_id: &str) -> Result<Vec<SubscriptionResource>> {
        self.stub.list_subscriptions(project_id).await
    }

    /// Delete the subscription.
    pub async fn delete_subscription(&self, subscription: &Subscription) -> Result<()> {
        self.stub
            .delete_subscription(&subscription.full_name())
            .await
    }
}

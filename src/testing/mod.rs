//! Injectable fake transport stubs.
//!
//! The stub traits in [`crate::transport`] are the single seam for unit
//! testing the pipelines. The fakes here record every request, serve
//! scripted responses, and keep a small in-memory resource store for the
//! admin surface, so tests never touch the network.

use crate::error::{Result, Status, StatusCode};
use crate::transport::{
    AcknowledgeRequest, ModifyAckDeadlineRequest, PublishRequest, PublishResponse, PublisherStub,
    PubsubMessage, PullRequest, PullResponse, ReceivedMessage, SubscriberStub,
    SubscriptionResource, TopicResource,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::watch;

/// Build a [`ReceivedMessage`] with the given ack id, message id, and
/// payload.
pub fn received(ack_id: &str, message_id: &str, data: &str) -> ReceivedMessage {
    ReceivedMessage {
        ack_id: ack_id.to_string(),
        message: PubsubMessage {
            data: data.as_bytes().to_vec(),
            message_id: Some(message_id.to_string()),
            ..Default::default()
        },
        delivery_attempt: None,
    }
}

/// Build a [`PullResponse`] carrying the given deliveries.
pub fn pull_response(messages: Vec<ReceivedMessage>) -> PullResponse {
    PullResponse {
        received_messages: Some(messages),
    }
}

/// Fake [`PublisherStub`].
///
/// `publish` serves scripted responses in FIFO order; once the script is
/// exhausted it assigns sequential ids of the form `test-message-id-{n}`.
/// The admin calls operate on an in-memory topic store.
#[derive(Default)]
pub struct FakePublisherStub {
    topics: Mutex<Vec<TopicResource>>,
    publish_responses: Mutex<VecDeque<Result<PublishResponse>>>,
    requests: Mutex<Vec<PublishRequest>>,
    next_id: AtomicUsize,
}

impl FakePublisherStub {
    /// Create a fake with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a scripted response for the next publish call.
    pub fn push_response(&self, response: Result<PublishResponse>) {
        self.publish_responses.lock().unwrap().push_back(response);
    }

    /// The publish requests observed so far.
    pub fn requests(&self) -> Vec<PublishRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// The number of publish calls observed so far.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl PublisherStub for FakePublisherStub {
    async fn create_topic(&self, topic: TopicResource) -> Result<TopicResource> {
        let mut topics = self.topics.lock().unwrap();
        if topics.iter().any(|t| t.name == topic.name) {
            return Err(Status::new(
                StatusCode::AlreadyExists,
                format!("topic already exists: {}", topic.name),
            ));
        }
        topics.push(topic.clone());
        Ok(topic)
    }

    async fn get_topic(&self, name: &str) -> Result<TopicResource> {
        self.topics
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.name == name)
            .cloned()
            .ok_or_else(|| Status::new(StatusCode::NotFound, format!("topic not found: {name}")))
    }

    async fn list_topics(&self, project_id: &str) -> Result<Vec<TopicResource>> {
        let prefix = format!("projects/{project_id}/");
        Ok(self
            .topics
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.name.starts_with(&prefix))
            .cloned()
            .collect())
    }

    async fn delete_topic(&self, name: &str) -> Result<()> {
        let mut topics = self.topics.lock().unwrap();
        let before = topics.len();
        topics.retain(|t| t.name != name);
        if topics.len() == before {
            return Err(Status::new(
                StatusCode::NotFound,
                format!("topic not found: {name}"),
            ));
        }
        Ok(())
    }

    async fn publish(&self, request: PublishRequest) -> Result<PublishResponse> {
        let message_count = request.messages.len();
        self.requests.lock().unwrap().push(request);
        if let Some(scripted) = self.publish_responses.lock().unwrap().pop_front() {
            return scripted;
        }
        let message_ids = (0..message_count)
            .map(|_| {
                let n = self.next_id.fetch_add(1, Ordering::SeqCst);
                format!("test-message-id-{n}")
            })
            .collect();
        Ok(PublishResponse { message_ids })
    }
}

/// Fake [`SubscriberStub`].
///
/// `pull` serves scripted responses in FIFO order; once the script is
/// exhausted it blocks until the caller is cancelled, like a long poll
/// against an idle subscription. Acknowledge and modify-deadline calls are
/// recorded and counted, so tests can wait for them.
#[derive(Default)]
pub struct FakeSubscriberStub {
    subscriptions: Mutex<Vec<SubscriptionResource>>,
    pull_responses: Mutex<VecDeque<Result<PullResponse>>>,
    pulls: Mutex<Vec<PullRequest>>,
    acknowledges: Mutex<Vec<AcknowledgeRequest>>,
    modify_deadlines: Mutex<Vec<ModifyAckDeadlineRequest>>,
    ack_count: CountSignal,
    modify_count: CountSignal,
}

struct CountSignal {
    tx: watch::Sender<usize>,
}

impl Default for CountSignal {
    fn default() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx }
    }
}

impl CountSignal {
    fn increment(&self) {
        self.tx.send_modify(|n| *n += 1);
    }

    async fn wait_for(&self, count: usize) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|n| *n >= count).await;
    }
}

impl FakeSubscriberStub {
    /// Create a fake with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a scripted response for the next pull call.
    pub fn push_pull(&self, response: Result<PullResponse>) {
        self.pull_responses.lock().unwrap().push_back(response);
    }

    /// The pull requests observed so far.
    pub fn pulls(&self) -> Vec<PullRequest> {
        self.pulls.lock().unwrap().clone()
    }

    /// The acknowledge requests observed so far.
    pub fn acknowledges(&self) -> Vec<AcknowledgeRequest> {
        self.acknowledges.lock().unwrap().clone()
    }

    /// The modify-deadline requests observed so far.
    pub fn modify_deadlines(&self) -> Vec<ModifyAckDeadlineRequest> {
        self.modify_deadlines.lock().unwrap().clone()
    }

    /// Wait until at least `count` acknowledge calls have been observed.
    pub async fn wait_for_acknowledges(&self, count: usize) {
        self.ack_count.wait_for(count).await;
    }

    /// Wait until at least `count` modify-deadline calls have been
    /// observed.
    pub async fn wait_for_modify_deadlines(&self, count: usize) {
        self.modify_count.wait_for(count).await;
    }
}

#[async_trait]
impl SubscriberStub for FakeSubscriberStub {
    async fn create_subscription(
        &self,
        subscription: SubscriptionResource,
    ) -> Result<SubscriptionResource> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        if subscriptions.iter().any(|s| s.name == subscription.name) {
            return Err(Status::new(
                StatusCode::AlreadyExists,
                format!("subscription already exists: {}", subscription.name),
            ));
        }
        subscriptions.push(subscription.clone());
        Ok(subscription)
    }

    async fn get_subscription(&self, name: &str) -> Result<SubscriptionResource> {
        self.subscriptions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.name == name)
            .cloned()
            .ok_or_else(|| {
                Status::new(
                    StatusCode::NotFound,
                    format!("subscription not found: {name}"),
                )
            })
    }

    async fn list_subscriptions(&self, project_id: &str) -> Result<Vec<SubscriptionResource>> {
        let prefix = format!("projects/{project_id}/");
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.name.starts_with(&prefix))
            .cloned()
            .collect())
    }

    async fn delete_subscription(&self, name: &str) -> Result<()> {
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.name != name);
        if subscriptions.len() == before {
            return Err(Status::new(
                StatusCode::NotFound,
                format!("subscription not found: {name}"),
            ));
        }
        Ok(())
    }

    async fn pull(&self, request: PullRequest) -> Result<PullResponse> {
        self.pulls.lock().unwrap().push(request);
        let scripted = self.pull_responses.lock().unwrap().pop_front();
        match scripted {
            Some(response) => response,
            // Script exhausted: behave like a long poll against an idle
            // subscription until the caller cancels.
            None => std::future::pending().await,
        }
    }

    async fn acknowledge(&self, request: AcknowledgeRequest) -> Result<()> {
        self.acknowledges.lock().unwrap().push(request);
        self.ack_count.increment();
        Ok(())
    }

    async fn modify_ack_deadline(&self, request: ModifyAckDeadlineRequest) -> Result<()> {
        self.modify_deadlines.lock().unwrap().push(request);
        self.modify_count.increment();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publisher_fake_assigns_sequential_ids() {
        let stub = FakePublisherStub::new();
        let response = stub
            .publish(PublishRequest {
                topic: "projects/p/topics/t".to_string(),
                messages: vec![PubsubMessage::default(), PubsubMessage::default()],
            })
            .await
            .unwrap();
        assert_eq!(
            response.message_ids,
            vec!["test-message-id-0", "test-message-id-1"]
        );
        assert_eq!(stub.call_count(), 1);
    }

    #[tokio::test]
    async fn test_publisher_fake_scripted_response_wins() {
        let stub = FakePublisherStub::new();
        stub.push_response(Err(Status::new(StatusCode::PermissionDenied, "uh-oh")));
        let status = stub
            .publish(PublishRequest::default())
            .await
            .unwrap_err();
        assert_eq!(status.code(), StatusCode::PermissionDenied);
    }

    #[tokio::test]
    async fn test_subscriber_fake_scripts_and_records() {
        let stub = FakeSubscriberStub::new();
        stub.push_pull(Ok(pull_response(vec![received("a0", "m0", "data")])));

        let response = stub
            .pull(PullRequest {
                subscription: "projects/p/subscriptions/s".to_string(),
                max_messages: 10,
                return_immediately: false,
            })
            .await
            .unwrap();
        assert_eq!(response.into_messages().len(), 1);

        stub.acknowledge(AcknowledgeRequest {
            subscription: "projects/p/subscriptions/s".to_string(),
            ack_ids: vec!["a0".to_string()],
        })
        .await
        .unwrap();
        stub.wait_for_acknowledges(1).await;
        assert_eq!(stub.acknowledges().len(), 1);
    }

    #[tokio::test]
    async fn test_topic_store_roundtrip() {
        let stub = FakePublisherStub::new();
        let topic = TopicResource {
            name: "projects/test-project/topics/test-topic".to_string(),
            ..Default::default()
        };
        stub.create_topic(topic.clone()).await.unwrap();
        assert_eq!(
            stub.create_topic(topic.clone()).await.unwrap_err().code(),
            StatusCode::AlreadyExists
        );
        assert_eq!(stub.list_topics("test-project").await.unwrap().len(), 1);
        assert_eq!(stub.list_topics("other-project").await.unwrap().len(), 0);
        stub.delete_topic(&topic.name).await.unwrap();
        assert_eq!(
            stub.get_topic(&topic.name).await.unwrap_err().code(),
            StatusCode::NotFound
        );
    }
}

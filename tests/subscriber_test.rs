//! End-to-end tests for the subscriber pull/dispatch pipeline, driven
//! through injected transport stubs and executors.

use async_trait::async_trait;
use cloudq::config::{PullOptions, PullRetryConfig};
use cloudq::error::Result;
use cloudq::executor::Executor;
use cloudq::subscriber::{Subscriber, SubscriberConnection};
use cloudq::testing::{pull_response, received, FakeSubscriberStub};
use cloudq::transport::{
    AcknowledgeRequest, ModifyAckDeadlineRequest, PullRequest, PullResponse, SubscriberStub,
    SubscriptionResource,
};
use cloudq::types::Subscription;
use cloudq::{Status, StatusCode};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};

fn test_subscription() -> Subscription {
    Subscription::new("test-project", "test-subscription")
}

fn new_subscriber(stub: Arc<FakeSubscriberStub>, workers: usize) -> (Subscriber, Executor) {
    let executor = Executor::new(workers).unwrap();
    let connection = SubscriberConnection::new(stub, executor.clone(), PullOptions::default());
    (Subscriber::new(connection), executor)
}

#[tokio::test]
async fn test_subscribe_and_ack() {
    let stub = Arc::new(FakeSubscriberStub::new());
    stub.push_pull(Ok(pull_response(vec![received(
        "test-ack-id-0",
        "test-message-id-0",
        "test-data-0",
    )])));
    let (subscriber, executor) = new_subscriber(stub.clone(), 2);

    let (tx, rx) = oneshot::channel();
    let tx = Mutex::new(Some(tx));
    let handle = subscriber
        .subscribe(&test_subscription(), move |message, ack| {
            let observed = (
                message.message_id().map(str::to_string),
                ack.ack_id().to_string(),
                std::thread::current().id(),
            );
            ack.ack();
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(observed);
            }
        })
        .unwrap();

    let (message_id, ack_id, handler_thread) = rx.await.unwrap();
    assert_eq!(message_id.as_deref(), Some("test-message-id-0"));
    assert_eq!(ack_id, "test-ack-id-0");
    assert_ne!(handler_thread, std::thread::current().id());

    stub.wait_for_acknowledges(1).await;
    let acks = stub.acknowledges();
    assert_eq!(acks.len(), 1);
    assert_eq!(
        acks[0].subscription,
        "projects/test-project/subscriptions/test-subscription"
    );
    assert_eq!(acks[0].ack_ids, vec!["test-ack-id-0".to_string()]);

    let pulls = stub.pulls();
    assert!(!pulls.is_empty());
    assert_eq!(
        pulls[0].subscription,
        "projects/test-project/subscriptions/test-subscription"
    );
    assert!(!pulls[0].return_immediately);

    handle.cancel();
    assert!(handle.await.is_ok());
    executor.shutdown();
}

#[tokio::test]
async fn test_nack_modifies_deadline_to_zero() {
    let stub = Arc::new(FakeSubscriberStub::new());
    stub.push_pull(Ok(pull_response(vec![received(
        "test-ack-id-0",
        "test-message-id-0",
        "test-data-0",
    )])));
    let (subscriber, executor) = new_subscriber(stub.clone(), 2);

    let handle = subscriber
        .subscribe(&test_subscription(), |_message, ack| ack.nack())
        .unwrap();

    stub.wait_for_modify_deadlines(1).await;
    let modifies = stub.modify_deadlines();
    assert_eq!(modifies.len(), 1);
    assert_eq!(modifies[0].ack_ids, vec!["test-ack-id-0".to_string()]);
    assert_eq!(modifies[0].ack_deadline_seconds, 0);
    assert!(stub.acknowledges().is_empty());

    handle.cancel();
    assert!(handle.await.is_ok());
    executor.shutdown();
}

#[tokio::test]
async fn test_pull_failure_terminates_session_without_handler() {
    let stub = Arc::new(FakeSubscriberStub::new());
    let expected = Status::new(StatusCode::PermissionDenied, "uh-oh");
    stub.push_pull(Err(expected.clone()));
    let (subscriber, executor) = new_subscriber(stub, 2);

    let invoked = Arc::new(AtomicBool::new(false));
    let observer = invoked.clone();
    let handle = subscriber
        .subscribe(&test_subscription(), move |_message, _ack| {
            observer.store(true, Ordering::SeqCst);
        })
        .unwrap();

    assert_eq!(handle.await.unwrap_err(), expected);
    assert!(!invoked.load(Ordering::SeqCst));
    executor.shutdown();
}

#[tokio::test]
async fn test_empty_subscription_rejected_synchronously() {
    let stub = Arc::new(FakeSubscriberStub::new());
    let (subscriber, executor) = new_subscriber(stub.clone(), 1);

    let status = subscriber
        .subscribe(&Subscription::new("", "test-subscription"), |_m, _a| {})
        .err()
        .unwrap();
    assert_eq!(status.code(), StatusCode::InvalidArgument);
    assert!(stub.pulls().is_empty());
    executor.shutdown();
}

#[tokio::test]
async fn test_transient_pull_errors_retry_with_backoff() {
    let stub = Arc::new(FakeSubscriberStub::new());
    stub.push_pull(Err(Status::unavailable("down")));
    stub.push_pull(Err(Status::new(StatusCode::Aborted, "conflict")));
    stub.push_pull(Ok(pull_response(vec![received(
        "test-ack-id-0",
        "test-message-id-0",
        "test-data-0",
    )])));

    let executor = Executor::new(2).unwrap();
    let connection = SubscriberConnection::new(
        stub.clone(),
        executor.clone(),
        PullOptions {
            max_messages: 10,
            retry: PullRetryConfig {
                max_attempts: 3,
                min_backoff: Duration::from_millis(5),
                max_backoff: Duration::from_millis(20),
            },
        },
    );
    let subscriber = Subscriber::new(connection);

    let handle = subscriber
        .subscribe(&test_subscription(), |_message, ack| ack.ack())
        .unwrap();

    stub.wait_for_acknowledges(1).await;
    // The two failures, the successful pull, and possibly the next
    // long poll already in flight.
    assert!(stub.pulls().len() >= 3);

    handle.cancel();
    assert!(handle.await.is_ok());
    executor.shutdown();
}

#[tokio::test]
async fn test_exhausted_retries_surface_the_status() {
    let stub = Arc::new(FakeSubscriberStub::new());
    for _ in 0..3 {
        stub.push_pull(Err(Status::unavailable("down")));
    }

    let executor = Executor::new(2).unwrap();
    let connection = SubscriberConnection::new(
        stub.clone(),
        executor.clone(),
        PullOptions {
            max_messages: 10,
            retry: PullRetryConfig {
                max_attempts: 2,
                min_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(4),
            },
        },
    );
    let subscriber = Subscriber::new(connection);

    let handle = subscriber
        .subscribe(&test_subscription(), |_message, _ack| {})
        .unwrap();

    let status = handle.await.unwrap_err();
    assert_eq!(status.code(), StatusCode::Unavailable);
    // The initial pull plus two retries.
    assert_eq!(stub.pulls().len(), 3);
    executor.shutdown();
}

#[tokio::test]
async fn test_handler_panic_does_not_terminate_session() {
    let stub = Arc::new(FakeSubscriberStub::new());
    stub.push_pull(Ok(pull_response(vec![received(
        "test-ack-id-0",
        "test-message-id-0",
        "test-data-0",
    )])));
    stub.push_pull(Ok(pull_response(vec![received(
        "test-ack-id-1",
        "test-message-id-1",
        "test-data-1",
    )])));
    let (subscriber, executor) = new_subscriber(stub.clone(), 2);

    let (tx, rx) = oneshot::channel();
    let tx = Mutex::new(Some(tx));
    let handle = subscriber
        .subscribe(&test_subscription(), move |message, ack| {
            if message.message_id() == Some("test-message-id-0") {
                panic!("boom");
            }
            ack.ack();
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(message.message_id().map(str::to_string));
            }
        })
        .unwrap();

    // The second message is handled even though the first handler panicked.
    let delivered = rx.await.unwrap();
    assert_eq!(delivered.as_deref(), Some("test-message-id-1"));
    stub.wait_for_acknowledges(1).await;
    assert_eq!(stub.acknowledges().len(), 1);

    handle.cancel();
    assert!(handle.await.is_ok());
    executor.shutdown();
}

#[tokio::test]
async fn test_handlers_for_distinct_messages_run_concurrently() {
    let stub = Arc::new(FakeSubscriberStub::new());
    stub.push_pull(Ok(pull_response(vec![
        received("test-ack-id-0", "test-message-id-0", "test-data-0"),
        received("test-ack-id-1", "test-message-id-1", "test-data-1"),
    ])));
    let (subscriber, executor) = new_subscriber(stub.clone(), 4);

    // Both handlers must reach the barrier for either to proceed; a serial
    // dispatcher would deadlock here instead of acking.
    let barrier = Arc::new(std::sync::Barrier::new(2));
    let handle = subscriber
        .subscribe(&test_subscription(), move |_message, ack| {
            barrier.wait();
            ack.ack();
        })
        .unwrap();

    tokio::time::timeout(Duration::from_secs(10), stub.wait_for_acknowledges(2))
        .await
        .expect("handlers did not run concurrently");

    handle.cancel();
    assert!(handle.await.is_ok());
    executor.shutdown();
}

/// Parks the first pull until released, then delivers one message and
/// long-polls forever.
struct ReleasedPullStub {
    release: Notify,
    pulls: AtomicUsize,
}

impl ReleasedPullStub {
    fn new() -> Self {
        Self {
            release: Notify::new(),
            pulls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SubscriberStub for ReleasedPullStub {
    async fn create_subscription(
        &self,
        _subscription: SubscriptionResource,
    ) -> Result<SubscriptionResource> {
        Err(Status::unimplemented("not used in this test"))
    }

    async fn get_subscription(&self, _name: &str) -> Result<SubscriptionResource> {
        Err(Status::unimplemented("not used in this test"))
    }

    async fn list_subscriptions(&self, _project_id: &str) -> Result<Vec<SubscriptionResource>> {
        Err(Status::unimplemented("not used in this test"))
    }

    async fn delete_subscription(&self, _name: &str) -> Result<()> {
        Err(Status::unimplemented("not used in this test"))
    }

    async fn pull(&self, _request: PullRequest) -> Result<PullResponse> {
        let n = self.pulls.fetch_add(1, Ordering::SeqCst);
        if n == 0 {
            self.release.notified().await;
            return Ok(pull_response(vec![received(
                "test-ack-id-0",
                "test-message-id-0",
                "test-data-0",
            )]));
        }
        std::future::pending().await
    }

    async fn acknowledge(&self, _request: AcknowledgeRequest) -> Result<()> {
        Ok(())
    }

    async fn modify_ack_deadline(&self, _request: ModifyAckDeadlineRequest) -> Result<()> {
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dispatch_after_executor_shutdown_is_dropped() {
    let stub = Arc::new(ReleasedPullStub::new());
    // A caller-owned runtime keeps the session alive across shutdown, so
    // the loop itself still runs and only the dispatch seam is closed.
    let executor = Executor::from_handle(tokio::runtime::Handle::current());
    let connection =
        SubscriberConnection::new(stub.clone(), executor.clone(), PullOptions::default());
    let subscriber = Subscriber::new(connection);

    let invoked = Arc::new(AtomicBool::new(false));
    let observer = invoked.clone();
    let handle = subscriber
        .subscribe(&test_subscription(), move |_message, _ack| {
            observer.store(true, Ordering::SeqCst);
        })
        .unwrap();

    // Shut down while the pull is parked, then let it deliver.
    executor.shutdown();
    stub.release.notify_one();

    // The loop only issues the next pull after dispatching the delivery.
    tokio::time::timeout(Duration::from_secs(10), async {
        while stub.pulls.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("pull loop did not advance");

    assert!(!invoked.load(Ordering::SeqCst));
    handle.cancel();
    assert!(handle.await.is_ok());
}

#[tokio::test]
async fn test_ack_after_executor_shutdown_is_dropped() {
    let stub = Arc::new(FakeSubscriberStub::new());
    stub.push_pull(Ok(pull_response(vec![received(
        "test-ack-id-0",
        "test-message-id-0",
        "test-data-0",
    )])));
    let (subscriber, executor) = new_subscriber(stub.clone(), 2);

    // Hand the un-settled ack handler out of the handler callback.
    let (tx, rx) = oneshot::channel();
    let tx = Mutex::new(Some(tx));
    let handle = subscriber
        .subscribe(&test_subscription(), move |_message, ack| {
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(ack);
            }
        })
        .unwrap();

    let ack = rx.await.unwrap();
    executor.shutdown();
    ack.ack();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(stub.acknowledges().is_empty());
    drop(handle);
}

/// Serves one message per pull, refusing to hand out the next message
/// until everything already delivered has been acked. With that gate in
/// place the ack stream observed by the server must be strictly ordered.
struct GatedStub {
    total: usize,
    delivered: AtomicUsize,
    acked: AtomicUsize,
    acks: Mutex<Vec<String>>,
}

impl GatedStub {
    fn new(total: usize) -> Self {
        Self {
            total,
            delivered: AtomicUsize::new(0),
            acked: AtomicUsize::new(0),
            acks: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SubscriberStub for GatedStub {
    async fn create_subscription(
        &self,
        _subscription: SubscriptionResource,
    ) -> Result<SubscriptionResource> {
        Err(Status::unimplemented("not used in this test"))
    }

    async fn get_subscription(&self, _name: &str) -> Result<SubscriptionResource> {
        Err(Status::unimplemented("not used in this test"))
    }

    async fn list_subscriptions(&self, _project_id: &str) -> Result<Vec<SubscriptionResource>> {
        Err(Status::unimplemented("not used in this test"))
    }

    async fn delete_subscription(&self, _name: &str) -> Result<()> {
        Err(Status::unimplemented("not used in this test"))
    }

    async fn pull(&self, _request: PullRequest) -> Result<PullResponse> {
        while self.acked.load(Ordering::SeqCst) < self.delivered.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let next = self.delivered.load(Ordering::SeqCst);
        if next >= self.total {
            // Long poll forever; the session exits via cancellation.
            return std::future::pending().await;
        }
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(pull_response(vec![received(
            &format!("test-ack-id-{next}"),
            &format!("test-message-id-{next}"),
            "test-data",
        )]))
    }

    async fn acknowledge(&self, request: AcknowledgeRequest) -> Result<()> {
        let mut acks = self.acks.lock().unwrap();
        let count = request.ack_ids.len();
        acks.extend(request.ack_ids);
        drop(acks);
        self.acked.fetch_add(count, Ordering::SeqCst);
        Ok(())
    }

    async fn modify_ack_deadline(&self, _request: ModifyAckDeadlineRequest) -> Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_dispatch_uses_worker_pool_and_preserves_ack_order() {
    const TOTAL: usize = 20;
    let stub = Arc::new(GatedStub::new(TOTAL));
    let executor = Executor::new(4).unwrap();
    let connection =
        SubscriberConnection::new(stub.clone(), executor.clone(), PullOptions::default());
    let subscriber = Subscriber::new(connection);

    let handler_threads: Arc<Mutex<HashSet<ThreadId>>> = Arc::new(Mutex::new(HashSet::new()));
    let threads = handler_threads.clone();
    let handle = subscriber
        .subscribe(&test_subscription(), move |_message, ack| {
            threads.lock().unwrap().insert(std::thread::current().id());
            ack.ack();
        })
        .unwrap();

    // Wait for the full gated sequence to drain.
    tokio::time::timeout(Duration::from_secs(30), async {
        while stub.acked.load(Ordering::SeqCst) < TOTAL {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("acks did not drain");

    handle.cancel();
    assert!(handle.await.is_ok());

    let expected: Vec<String> = (0..TOTAL).map(|i| format!("test-ack-id-{i}")).collect();
    assert_eq!(*stub.acks.lock().unwrap(), expected);

    let threads = handler_threads.lock().unwrap();
    assert!(!threads.is_empty());
    assert!(!threads.contains(&std::thread::current().id()));
    executor.shutdown();
}

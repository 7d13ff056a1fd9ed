//! Pull loop and subscription session lifecycle.
//!
//! Each call to subscribe starts a session task on the executor. The task
//! repeatedly pulls, fans each delivery out to its own handler task, and
//! terminates on a permanent failure or when the caller cancels. The next
//! pull may be issued before earlier handlers complete.

use crate::config::PullOptions;
use crate::error::{Result, Status};
use crate::executor::Executor;
use crate::message::Message;
use crate::subscriber::AckHandler;
use crate::transport::{PullRequest, ReceivedMessage, SubscriberStub};
use crate::types::Subscription;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{oneshot, Notify};
use tracing::{debug, error, warn};

/// Handler invoked once per delivery. Runs on executor workers, never on
/// the thread that called subscribe; handlers for distinct deliveries may
/// run concurrently.
pub type MessageHandler = Arc<dyn Fn(Message, AckHandler) + Send + Sync>;

/// The subscriber data-plane connection: starts pull sessions against the
/// injected stub.
pub struct SubscriberConnection {
    stub: Arc<dyn SubscriberStub>,
    executor: Executor,
    pull: PullOptions,
}

impl SubscriberConnection {
    /// Create a connection from a transport stub, an executor, and pull
    /// options.
    pub fn new(
        stub: Arc<dyn SubscriberStub>,
        executor: Executor,
        pull: PullOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            stub,
            executor,
            pull,
        })
    }

    /// Start a pull session. The returned handle resolves with the
    /// session's terminal status and supports cooperative cancellation.
    ///
    /// Fails synchronously with INVALID_ARGUMENT when the subscription name
    /// is empty; the transport is not called.
    pub fn subscribe(
        &self,
        subscription: &Subscription,
        handler: MessageHandler,
    ) -> Result<SubscriptionHandle> {
        if subscription.project_id().is_empty() || subscription.subscription_id().is_empty() {
            return Err(Status::invalid_argument("empty subscription name"));
        }

        let cancelled = Arc::new(AtomicBool::new(false));
        let wakeup = Arc::new(Notify::new());
        let (done_tx, done_rx) = oneshot::channel();

        let session = SubscriptionSession {
            subscription: subscription.full_name(),
            handler,
            cancelled: cancelled.clone(),
            wakeup: wakeup.clone(),
            stub: self.stub.clone(),
            executor: self.executor.clone(),
            pull: self.pull.clone(),
        };
        self.executor.spawn(async move {
            let result = session.run().await;
            let _ = done_tx.send(result);
        });

        Ok(SubscriptionHandle {
            cancelled,
            wakeup,
            done: done_rx,
        })
    }
}

/// Handle to a running pull session.
///
/// Awaiting the handle yields the session's terminal status. After
/// [`cancel`], the session stops at its next safe point and the handle
/// resolves `Ok(())`: routine shutdown is not an error.
///
/// [`cancel`]: SubscriptionHandle::cancel
#[derive(Debug)]
pub struct SubscriptionHandle {
    cancelled: Arc<AtomicBool>,
    wakeup: Arc<Notify>,
    done: oneshot::Receiver<Result<()>>,
}

impl SubscriptionHandle {
    /// Request cooperative cancellation. Takes effect at the loop head, or
    /// once the in-flight pull returns.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // notify_one leaves a permit, so a wakeup registered later still
        // observes the cancellation.
        self.wakeup.notify_one();
    }
}

impl Future for SubscriptionHandle {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.done).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Status::cancelled(
                "subscriber connection shut down",
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

struct SubscriptionSession {
    subscription: String,
    handler: MessageHandler,
    cancelled: Arc<AtomicBool>,
    wakeup: Arc<Notify>,
    stub: Arc<dyn SubscriberStub>,
    executor: Executor,
    pull: PullOptions,
}

impl SubscriptionSession {
    async fn run(self) -> Result<()> {
        let mut attempt = 0u32;
        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                debug!(subscription = %self.subscription, "session cancelled");
                return Ok(());
            }

            let request = PullRequest {
                subscription: self.subscription.clone(),
                max_messages: self.pull.max_messages,
                return_immediately: false,
            };
            let pulled = tokio::select! {
                response = self.stub.pull(request) => response,
                _ = self.wakeup.notified() => return Ok(()),
            };
            if self.cancelled.load(Ordering::SeqCst) {
                return Ok(());
            }

            match pulled {
                Ok(response) => {
                    attempt = 0;
                    for received in response.into_messages() {
                        self.dispatch(received);
                    }
                }
                Err(status)
                    if status.is_transient() && attempt < self.pull.retry.max_attempts =>
                {
                    let backoff = self.pull.retry.backoff(attempt);
                    attempt += 1;
                    warn!(
                        %status,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        "transient pull failure, backing off"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = self.wakeup.notified() => return Ok(()),
                    }
                }
                Err(status) => {
                    debug!(%status, subscription = %self.subscription, "pull failed, terminating session");
                    return Err(status);
                }
            }
        }
    }

    /// Schedule one handler task for a delivery on the executor; after
    /// executor shutdown the task is dropped. A panic in the handler is
    /// contained: the message simply goes un-acked and the server
    /// redelivers it.
    fn dispatch(&self, received: ReceivedMessage) {
        let handler = self.handler.clone();
        let message = Message::from(received.message);
        let ack = AckHandler::new(
            self.subscription.clone(),
            received.ack_id,
            self.stub.clone(),
            self.executor.clone(),
        );
        self.executor.spawn(async move {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| handler(message, ack)));
            if outcome.is_err() {
                error!("message handler panicked; the message will be redelivered");
            }
        });
    }
}

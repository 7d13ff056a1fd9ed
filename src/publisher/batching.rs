//! Batching engine for the publish pipeline.
//!
//! Messages accumulate in a pending batch guarded by a short-held lock.
//! A batch is flushed when it reaches the configured message count or byte
//! size, or when the hold timer armed by its first message expires. Each
//! flush detaches the batch, bumps a generation counter so a stale timer
//! observes the change and no-ops, and submits a single publish RPC on the
//! executor. Promises are satisfied on executor threads, never under the
//! engine lock.

use crate::config::BatchingConfig;
use crate::error::{Result, Status};
use crate::executor::Executor;
use crate::message::Message;
use crate::transport::{PublishRequest, PublisherStub};
use crate::types::Topic;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tracing::{debug, warn};

type MessageIdSender = oneshot::Sender<Result<String>>;

/// Resolves to the server-assigned message id, or the status of the failed
/// batch. Returned by [`BatchingPublisherConnection::publish`].
///
/// Dropping the future does not cancel the publish.
#[derive(Debug)]
pub struct PublishFuture {
    rx: oneshot::Receiver<Result<String>>,
}

impl Future for PublishFuture {
    type Output = Result<String>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(Status::cancelled(
                "publisher connection shut down",
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// The publisher data-plane connection: owns the pending batch and submits
/// publish RPCs through the injected stub.
pub struct BatchingPublisherConnection {
    topic: Topic,
    config: BatchingConfig,
    stub: Arc<dyn PublisherStub>,
    executor: Executor,
    state: Mutex<BatchState>,
    // Handed to hold-timer tasks so an armed timer cannot keep the
    // connection alive past its last user handle.
    weak: Weak<BatchingPublisherConnection>,
}

#[derive(Default)]
struct BatchState {
    entries: Vec<(Message, MessageIdSender)>,
    bytes: usize,
    generation: u64,
}

/// What `publish` decided while holding the lock; acted on after release.
enum Action {
    None,
    Flush(Vec<(Message, MessageIdSender)>),
    ArmTimer(u64),
}

impl BatchingPublisherConnection {
    /// Create a connection for `topic` using the given batching policy,
    /// transport stub, and executor.
    pub fn new(
        topic: Topic,
        config: BatchingConfig,
        stub: Arc<dyn PublisherStub>,
        executor: Executor,
    ) -> Result<Arc<Self>> {
        if topic.project_id().is_empty() || topic.topic_id().is_empty() {
            return Err(Status::invalid_argument("empty topic name"));
        }
        Ok(Arc::new_cyclic(|weak| Self {
            topic,
            config: config.normalized(),
            stub,
            executor,
            state: Mutex::new(BatchState::default()),
            weak: weak.clone(),
        }))
    }

    /// The topic this connection publishes to.
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Append a message to the pending batch and return a future for its
    /// server-assigned id.
    ///
    /// Messages larger than `maximum_batch_bytes` (and empty messages) fail
    /// immediately with INVALID_ARGUMENT without touching the transport; a
    /// single message is never split across batches.
    pub fn publish(&self, message: Message) -> PublishFuture {
        let (tx, rx) = oneshot::channel();
        let size = message.size();
        if size == 0 {
            let _ = tx.send(Err(Status::invalid_argument(
                "message has no payload and no attributes",
            )));
            return PublishFuture { rx };
        }
        if size > self.config.maximum_batch_bytes {
            let _ = tx.send(Err(Status::invalid_argument(format!(
                "message of {size} bytes exceeds the maximum batch size of {} bytes",
                self.config.maximum_batch_bytes
            ))));
            return PublishFuture { rx };
        }

        let action = {
            let mut state = self.lock_state();
            state.bytes += size;
            state.entries.push((message, tx));
            if state.entries.len() >= self.config.maximum_message_count {
                Action::Flush(detach(&mut state))
            } else if state.bytes >= self.config.maximum_batch_bytes {
                Action::Flush(detach(&mut state))
            } else if state.entries.len() == 1 {
                Action::ArmTimer(state.generation)
            } else {
                Action::None
            }
        };

        match action {
            Action::Flush(batch) => self.submit(batch),
            Action::ArmTimer(generation) => self.arm_hold_timer(generation),
            Action::None => {}
        }
        PublishFuture { rx }
    }

    /// Submit whatever is pending, regardless of the flush triggers.
    pub fn flush(&self) {
        let batch = {
            let mut state = self.lock_state();
            if state.entries.is_empty() {
                return;
            }
            detach(&mut state)
        };
        self.submit(batch);
    }

    /// Arm the hold timer for the batch identified by `generation`.
    ///
    /// The timer task holds only a weak reference: an armed timer must not
    /// keep the connection alive past its last user handle.
    fn arm_hold_timer(&self, generation: u64) {
        let weak = self.weak.clone();
        let executor = self.executor.clone();
        let delay = self.config.maximum_hold_time;
        self.executor.spawn(async move {
            if executor.timer(delay).await.is_err() {
                return;
            }
            if let Some(connection) = weak.upgrade() {
                connection.flush_generation(generation);
            }
        });
    }

    /// Flush iff the pending batch is still the one the timer was armed
    /// for. A size- or count-triggered flush bumps the generation, so the
    /// stale timer no-ops here.
    fn flush_generation(&self, generation: u64) {
        let batch = {
            let mut state = self.lock_state();
            if state.generation != generation || state.entries.is_empty() {
                return;
            }
            detach(&mut state)
        };
        self.submit(batch);
    }

    /// Issue one publish RPC for the detached batch and satisfy its
    /// promises from the response. Runs entirely on the executor.
    fn submit(&self, batch: Vec<(Message, MessageIdSender)>) {
        let (messages, promises): (Vec<Message>, Vec<MessageIdSender>) =
            batch.into_iter().unzip();
        let request = PublishRequest {
            topic: self.topic.full_name(),
            messages: messages.into_iter().map(Into::into).collect(),
        };
        let stub = self.stub.clone();
        self.executor.spawn(async move {
            match stub.publish(request).await {
                Ok(response) if response.message_ids.len() == promises.len() => {
                    for (promise, id) in promises.into_iter().zip(response.message_ids) {
                        let _ = promise.send(Ok(id));
                    }
                }
                Ok(response) => {
                    warn!(
                        expected = promises.len(),
                        received = response.message_ids.len(),
                        "publish response with mismatched message id count"
                    );
                    let status = Status::unknown("mismatched message id count");
                    for promise in promises {
                        let _ = promise.send(Err(status.clone()));
                    }
                }
                Err(status) => {
                    debug!(%status, "publish batch failed");
                    for promise in promises {
                        let _ = promise.send(Err(status.clone()));
                    }
                }
            }
        });
    }

    fn lock_state(&self) -> MutexGuard<'_, BatchState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for BatchingPublisherConnection {
    fn drop(&mut self) {
        let entries = match self.state.get_mut() {
            Ok(state) => std::mem::take(&mut state.entries),
            Err(poisoned) => std::mem::take(&mut poisoned.into_inner().entries),
        };
        if entries.is_empty() {
            return;
        }
        debug!(
            pending = entries.len(),
            topic = %self.topic,
            "cancelling pending messages on publisher shutdown"
        );
        for (_, promise) in entries {
            let _ = promise.send(Err(Status::cancelled("publisher connection shut down")));
        }
    }
}

/// Detach the pending batch and invalidate any armed timer.
fn detach(state: &mut BatchState) -> Vec<(Message, MessageIdSender)> {
    state.generation += 1;
    state.bytes = 0;
    std::mem::take(&mut state.entries)
}

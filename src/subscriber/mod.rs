//! Subscriber facade, ack handler, and connection factory.

pub mod session;

pub use session::{MessageHandler, SubscriberConnection, SubscriptionHandle};

use crate::config::SubscriberOptions;
use crate::error::Result;
use crate::executor::Executor;
use crate::message::Message;
use crate::transport::http::HttpStub;
use crate::transport::{AcknowledgeRequest, ModifyAckDeadlineRequest, SubscriberStub};
use crate::types::Subscription;
use std::sync::Arc;
use tracing::warn;

/// One-shot capability for settling a single delivery.
///
/// Handed to the message handler alongside each message. Exactly one of
/// [`ack`] or [`nack`] may be invoked; both consume the handler, so a
/// second terminal action is unrepresentable. Dropping the handler without
/// acting leaves the delivery to time out and be redelivered.
///
/// [`ack`]: AckHandler::ack
/// [`nack`]: AckHandler::nack
pub struct AckHandler {
    subscription: String,
    ack_id: String,
    stub: Arc<dyn SubscriberStub>,
    executor: Executor,
}

impl AckHandler {
    pub(crate) fn new(
        subscription: String,
        ack_id: String,
        stub: Arc<dyn SubscriberStub>,
        executor: Executor,
    ) -> Self {
        Self {
            subscription,
            ack_id,
            stub,
            executor,
        }
    }

    /// The ack id of this delivery, for tests and observability.
    pub fn ack_id(&self) -> &str {
        &self.ack_id
    }

    /// Acknowledge the delivery. Best-effort and non-blocking: the RPC runs
    /// as a detached executor task and failures are logged, not surfaced —
    /// the server redelivers un-acked messages.
    pub fn ack(self) {
        self.settle(SettleAction::Ack)
    }

    /// Reject the delivery, making it immediately eligible for redelivery.
    /// Implemented as a modify-ack-deadline with a zero deadline; the same
    /// best-effort rules as [`ack`] apply.
    ///
    /// [`ack`]: AckHandler::ack
    pub fn nack(self) {
        self.settle(SettleAction::Nack)
    }

    fn settle(self, action: SettleAction) {
        let Self {
            subscription,
            ack_id,
            stub,
            executor,
        } = self;
        executor.spawn(async move {
            let outcome = match action {
                SettleAction::Ack => {
                    stub.acknowledge(AcknowledgeRequest {
                        subscription,
                        ack_ids: vec![ack_id.clone()],
                    })
                    .await
                }
                SettleAction::Nack => {
                    stub.modify_ack_deadline(ModifyAckDeadlineRequest {
                        subscription,
                        ack_ids: vec![ack_id.clone()],
                        ack_deadline_seconds: 0,
                    })
                    .await
                }
            };
            if let Err(status) = outcome {
                warn!(%status, ack_id = %ack_id, "ack delivery failed; the server will redeliver");
            }
        });
    }
}

impl std::fmt::Debug for AckHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckHandler")
            .field("subscription", &self.subscription)
            .field("ack_id", &self.ack_id)
            .finish()
    }
}

enum SettleAction {
    Ack,
    Nack,
}

/// Receives messages from subscriptions through a shared pull connection.
///
/// Cloning is cheap; all clones share the stub and executor.
#[derive(Clone)]
pub struct Subscriber {
    connection: Arc<SubscriberConnection>,
}

impl Subscriber {
    /// Wrap an existing connection, typically one built with an injected
    /// stub and executor.
    pub fn new(connection: Arc<SubscriberConnection>) -> Self {
        Self { connection }
    }

    /// Start pulling from `subscription`, invoking `handler` once per
    /// delivery on executor workers. The returned handle resolves with the
    /// session's terminal status and supports [`cancel`].
    ///
    /// [`cancel`]: SubscriptionHandle::cancel
    pub fn subscribe<F>(
        &self,
        subscription: &Subscription,
        handler: F,
    ) -> Result<SubscriptionHandle>
    where
        F: Fn(Message, AckHandler) + Send + Sync + 'static,
    {
        self.connection.subscribe(subscription, Arc::new(handler))
    }
}

/// Build a subscriber against the real service, wiring the default HTTP
/// transport and the executor from the connection options.
pub fn make_subscriber(options: SubscriberOptions) -> Result<Subscriber> {
    let stub = Arc::new(HttpStub::new(&options.connection)?);
    let executor = options.connection.build_executor()?;
    let connection = SubscriberConnection::new(stub, executor, options.pull);
    Ok(Subscriber::new(connection))
}

//! Publisher facade and connection factory.

pub mod batching;

pub use batching::{BatchingPublisherConnection, PublishFuture};

use crate::config::PublisherOptions;
use crate::error::Result;
use crate::message::Message;
use crate::transport::http::HttpStub;
use crate::types::Topic;
use std::sync::Arc;

/// Publishes messages to a single topic through a shared batching
/// connection.
///
/// Cloning is cheap; all clones feed the same pending batch. When the last
/// clone is dropped, messages still pending are failed with CANCELLED.
#[derive(Clone)]
pub struct Publisher {
    connection: Arc<BatchingPublisherConnection>,
}

impl Publisher {
    /// Wrap an existing connection, typically one built with an injected
    /// stub and executor.
    pub fn new(connection: Arc<BatchingPublisherConnection>) -> Self {
        Self { connection }
    }

    /// The topic this publisher sends to.
    pub fn topic(&self) -> &Topic {
        self.connection.topic()
    }

    /// Schedule a message for publication. The returned future resolves
    /// with the server-assigned message id once the batch containing the
    /// message completes.
    pub fn publish(&self, message: Message) -> PublishFuture {
        self.connection.publish(message)
    }

    /// Submit the pending batch without waiting for a flush trigger.
    pub fn flush(&self) {
        self.connection.flush()
    }
}

/// Build a publisher for `topic` against the real service, wiring the
/// default HTTP transport and the executor from the connection options.
pub fn make_publisher(topic: Topic, options: PublisherOptions) -> Result<Publisher> {
    let stub = Arc::new(HttpStub::new(&options.connection)?);
    let executor = options.connection.build_executor()?;
    let connection =
        BatchingPublisherConnection::new(topic, options.batching, stub, executor)?;
    Ok(Publisher::new(connection))
}

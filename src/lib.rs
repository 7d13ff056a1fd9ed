//! # cloudq - Cloud Pub/Sub client
//!
//! A client library for Google Cloud Pub/Sub built around two data-plane
//! pipelines:
//!
//! - a **publisher** that batches messages by count, byte size, and hold
//!   time, issues one publish RPC per batch, and resolves each caller's
//!   future with the server-assigned message id;
//! - a **subscriber** that pulls messages in a background loop, dispatches
//!   each one to a user handler on a worker pool, and settles deliveries
//!   through a one-shot [`subscriber::AckHandler`].
//!
//! Both pipelines run on an injectable [`executor::Executor`] and talk to
//! the service through injectable transport stubs, with fakes provided in
//! [`testing`]. The default transport speaks the JSON REST surface and
//! honors the `PUBSUB_EMULATOR_HOST` environment variable.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod admin;
pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod message;
pub mod publisher;
pub mod subscriber;
pub mod testing;
pub mod transport;
pub mod types;

pub use error::{Result, Status, StatusCode};
pub use message::{Message, MessageBuilder};
pub use publisher::{make_publisher, Publisher};
pub use subscriber::{make_subscriber, AckHandler, Subscriber};
pub use types::{Subscription, Topic};

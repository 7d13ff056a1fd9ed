//! Resource identifiers for Pub/Sub topics and subscriptions.

use crate::error::{Result, Status};
use std::fmt;

/// Identifies a Pub/Sub topic within a project.
///
/// The wire form is `projects/{project_id}/topics/{topic_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    project_id: String,
    topic_id: String,
}

impl Topic {
    /// Create a topic identifier from its project and topic ids.
    pub fn new(project_id: impl Into<String>, topic_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            topic_id: topic_id.into(),
        }
    }

    /// The GCP project id.
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// The topic id within the project.
    pub fn topic_id(&self) -> &str {
        &self.topic_id
    }

    /// The fully-qualified resource name.
    pub fn full_name(&self) -> String {
        format!("projects/{}/topics/{}", self.project_id, self.topic_id)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "projects/{}/topics/{}", self.project_id, self.topic_id)
    }
}

/// Identifies a Pub/Sub subscription within a project.
///
/// The wire form is `projects/{project_id}/subscriptions/{subscription_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    project_id: String,
    subscription_id: String,
}

impl Subscription {
    /// Create a subscription identifier from its project and subscription ids.
    pub fn new(project_id: impl Into<String>, subscription_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            subscription_id: subscription_id.into(),
        }
    }

    /// The GCP project id.
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// The subscription id within the project.
    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    /// The fully-qualified resource name.
    pub fn full_name(&self) -> String {
        format!(
            "projects/{}/subscriptions/{}",
            self.project_id, self.subscription_id
        )
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "projects/{}/subscriptions/{}",
            self.project_id, self.subscription_id
        )
    }
}

/// Validates a Pub/Sub topic ID.
///
/// Topic IDs must:
/// - Be 3-255 characters
/// - Start with a letter
/// - Contain only letters, numbers, hyphens, underscores, periods, tildes, plus, and percent
pub fn validate_topic_id(topic_id: &str) -> Result<()> {
    validate_resource_id("topic ID", topic_id)
}

/// Validates a Pub/Sub subscription ID.
///
/// Subscription IDs follow the same rules as topic IDs.
pub fn validate_subscription_id(subscription_id: &str) -> Result<()> {
    validate_resource_id("subscription ID", subscription_id)
}

fn validate_resource_id(kind: &str, id: &str) -> Result<()> {
    if id.len() < 3 || id.len() > 255 {
        return Err(Status::invalid_argument(format!(
            "{kind} must be 3-255 characters"
        )));
    }

    let first_char = id
        .chars()
        .next()
        .expect("id is guaranteed to be non-empty by length check above");
    if !first_char.is_ascii_alphabetic() {
        return Err(Status::invalid_argument(format!(
            "{kind} must start with a letter"
        )));
    }

    for ch in id.chars() {
        if !matches!(ch, 'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' | '~' | '+' | '%') {
            return Err(Status::invalid_argument(format!(
                "{kind} contains invalid character: {ch}"
            )));
        }
    }

    Ok(())
}

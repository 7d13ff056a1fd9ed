//! Pub/Sub message type and builder.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// A Pub/Sub message.
///
/// On the publish side only the payload, attributes, and ordering key are
/// meaningful; the message id and publish time are assigned by the server
/// and populated on received messages.
///
/// Attribute keys are unique. They are held in a deterministic
/// (lexicographic) order; the JSON wire form is an object and carries no
/// insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    data: Vec<u8>,
    attributes: BTreeMap<String, String>,
    message_id: Option<String>,
    publish_time: Option<DateTime<Utc>>,
    ordering_key: Option<String>,
}

impl Message {
    /// The message payload.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The message attributes.
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// The server-assigned message id; `None` before the message has been
    /// published.
    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    /// The server-assigned publish time; `None` before the message has been
    /// published.
    pub fn publish_time(&self) -> Option<DateTime<Utc>> {
        self.publish_time
    }

    /// The ordering key, if any.
    pub fn ordering_key(&self) -> Option<&str> {
        self.ordering_key.as_deref()
    }

    /// The size the message contributes towards batch byte limits: payload
    /// plus attribute keys and values plus the ordering key.
    pub fn size(&self) -> usize {
        self.data.len()
            + self
                .attributes
                .iter()
                .map(|(k, v)| k.len() + v.len())
                .sum::<usize>()
            + self.ordering_key.as_ref().map_or(0, |k| k.len())
    }

    pub(crate) fn from_parts(
        data: Vec<u8>,
        attributes: BTreeMap<String, String>,
        message_id: Option<String>,
        publish_time: Option<DateTime<Utc>>,
        ordering_key: Option<String>,
    ) -> Self {
        Self {
            data,
            attributes,
            message_id,
            publish_time,
            ordering_key,
        }
    }
}

/// Builder for [`Message`].
///
/// ```
/// use cloudq::message::MessageBuilder;
///
/// let message = MessageBuilder::new()
///     .set_data("Hello World!")
///     .insert_attribute("origin", "docs")
///     .build();
/// assert_eq!(message.data(), b"Hello World!");
/// ```
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    message: Message,
}

impl MessageBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the message payload.
    pub fn set_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.message.data = data.into();
        self
    }

    /// Insert an attribute, replacing any previous value for the key.
    pub fn insert_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.message.attributes.insert(key.into(), value.into());
        self
    }

    /// Set the ordering key.
    pub fn set_ordering_key(mut self, key: impl Into<String>) -> Self {
        self.message.ordering_key = Some(key.into());
        self
    }

    /// Build the message.
    pub fn build(self) -> Message {
        self.message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_sets_fields() {
        let message = MessageBuilder::new()
            .set_data("test-data-0")
            .insert_attribute("a", "1")
            .insert_attribute("b", "2")
            .set_ordering_key("order")
            .build();

        assert_eq!(message.data(), b"test-data-0");
        assert_eq!(message.attributes().len(), 2);
        assert_eq!(message.attributes()["a"], "1");
        assert_eq!(message.attributes()["b"], "2");
        assert_eq!(message.ordering_key(), Some("order"));
        assert_eq!(message.message_id(), None);
        assert!(message.publish_time().is_none());
    }

    #[test]
    fn test_attribute_keys_are_unique() {
        let message = MessageBuilder::new()
            .insert_attribute("key", "first")
            .insert_attribute("key", "second")
            .build();
        assert_eq!(message.attributes().len(), 1);
        assert_eq!(message.attributes()["key"], "second");
    }

    #[test]
    fn test_size_counts_payload_attributes_and_ordering_key() {
        let message = MessageBuilder::new()
            .set_data("12345")
            .insert_attribute("ab", "cd")
            .set_ordering_key("xyz")
            .build();
        // 5 payload bytes + 4 attribute bytes + 3 ordering-key bytes.
        assert_eq!(message.size(), 12);
    }

    #[test]
    fn test_empty_message_has_zero_size() {
        assert_eq!(Message::default().size(), 0);
    }
}

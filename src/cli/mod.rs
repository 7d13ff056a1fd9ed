// CLI module for cloudq
/// Command execution handlers
pub mod commands;
/// Output formatting utilities
pub mod output;

use clap::{Parser, Subcommand};

/// Command-line interface for cloudq
#[derive(Parser)]
#[command(name = "cloudq")]
#[command(author, version, about = "Cloud Pub/Sub client - publish, subscribe, and administer topics", long_about = None)]
pub struct Cli {
    /// Service endpoint (PUBSUB_EMULATOR_HOST overrides it)
    #[arg(
        long,
        global = true,
        env = "CLOUDQ_ENDPOINT",
        default_value = "pubsub.googleapis.com"
    )]
    pub endpoint: String,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Create a new topic
    CreateTopic {
        /// GCP project id
        project_id: String,
        /// Topic id within the project
        topic_id: String,
    },

    /// List the topics of a project
    ListTopics {
        /// GCP project id
        project_id: String,
    },

    /// Delete a topic
    DeleteTopic {
        /// GCP project id
        project_id: String,
        /// Topic id within the project
        topic_id: String,
    },

    /// Create a subscription attached to a topic
    CreateSubscription {
        /// GCP project id
        project_id: String,
        /// Topic id within the project
        topic_id: String,
        /// Subscription id within the project
        subscription_id: String,
    },

    /// List the subscriptions of a project
    ListSubscriptions {
        /// GCP project id
        project_id: String,
    },

    /// Delete a subscription
    DeleteSubscription {
        /// GCP project id
        project_id: String,
        /// Subscription id within the project
        subscription_id: String,
    },

    /// Publish a message to a topic
    Publish {
        /// GCP project id
        project_id: String,
        /// Topic id within the project
        topic_id: String,
        /// Message payload
        #[arg(default_value = "Hello World!")]
        data: String,
    },

    /// Pull messages from a subscription and print them
    Subscribe {
        /// GCP project id
        project_id: String,
        /// Subscription id within the project
        subscription_id: String,
        /// Give up after this many seconds without a message
        #[arg(long, default_value = "60")]
        wait_seconds: u64,
    },

    /// Run the full sample flow against a randomly-named topic and
    /// subscription: create, publish, subscribe, delete
    Demo {
        /// GCP project id
        project_id: String,
    },
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

//! Command execution handlers for the CLI.

use crate::admin::{SubscriptionAdminClient, TopicAdminClient};
use crate::cli::{output, Commands};
use crate::config::{BatchingConfig, ConnectionOptions, PublisherOptions, SubscriberOptions};
use crate::publisher::make_publisher;
use crate::subscriber::make_subscriber;
use crate::types::{Subscription, Topic};
use anyhow::Context;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Execute a parsed CLI command against the given endpoint.
pub async fn execute_command(endpoint: String, command: Commands) -> anyhow::Result<()> {
    let connection = ConnectionOptions {
        endpoint,
        ..Default::default()
    };

    match command {
        Commands::CreateTopic {
            project_id,
            topic_id,
        } => {
            let client = TopicAdminClient::make(&connection)?;
            let topic = client
                .create_topic(&Topic::new(project_id, topic_id))
                .await
                .context("failed to create topic")?;
            output::print_success(&format!(
                "The topic was successfully created: {}",
                topic.name
            ));
        }

        Commands::ListTopics { project_id } => {
            let client = TopicAdminClient::make(&connection)?;
            let topics = client
                .list_topics(&project_id)
                .await
                .context("failed to list topics")?;
            output::print_topics(&project_id, &topics);
        }

        Commands::DeleteTopic {
            project_id,
            topic_id,
        } => {
            let client = TopicAdminClient::make(&connection)?;
            client
                .delete_topic(&Topic::new(project_id, topic_id))
                .await
                .context("failed to delete topic")?;
            output::print_success("The topic was successfully deleted");
        }

        Commands::CreateSubscription {
            project_id,
            topic_id,
            subscription_id,
        } => {
            let client = SubscriptionAdminClient::make(&connection)?;
            let subscription = client
                .create_subscription(
                    &Subscription::new(project_id.clone(), subscription_id),
                    &Topic::new(project_id, topic_id),
                )
                .await
                .context("failed to create subscription")?;
            output::print_success(&format!(
                "The subscription was successfully created: {}",
                subscription.name
            ));
        }

        Commands::ListSubscriptions { project_id } => {
            let client = SubscriptionAdminClient::make(&connection)?;
            let subscriptions = client
                .list_subscriptions(&project_id)
                .await
                .context("failed to list subscriptions")?;
            output::print_subscriptions(&project_id, &subscriptions);
        }

        Commands::DeleteSubscription {
            project_id,
            subscription_id,
        } => {
            let client = SubscriptionAdminClient::make(&connection)?;
            client
                .delete_subscription(&Subscription::new(project_id, subscription_id))
                .await
                .context("failed to delete subscription")?;
            output::print_success("The subscription was successfully deleted");
        }

        Commands::Publish {
            project_id,
            topic_id,
            data,
        } => {
            publish_one(connection, Topic::new(project_id, topic_id), data).await?;
        }

        Commands::Subscribe {
            project_id,
            subscription_id,
            wait_seconds,
        } => {
            subscribe_and_print(
                connection,
                Subscription::new(project_id, subscription_id),
                wait_seconds,
            )
            .await?;
        }

        Commands::Demo { project_id } => {
            run_demo(connection, project_id).await?;
        }
    }

    Ok(())
}

async fn publish_one(
    connection: ConnectionOptions,
    topic: Topic,
    data: String,
) -> anyhow::Result<()> {
    let publisher = make_publisher(
        topic,
        PublisherOptions {
            batching: BatchingConfig {
                maximum_message_count: 1,
                ..Default::default()
            },
            connection,
        },
    )?;
    let message = crate::message::MessageBuilder::new().set_data(data).build();
    let id = publisher
        .publish(message)
        .await
        .context("failed to publish message")?;
    output::print_success(&format!("Message published with id={id}"));
    Ok(())
}

async fn subscribe_and_print(
    connection: ConnectionOptions,
    subscription: Subscription,
    wait_seconds: u64,
) -> anyhow::Result<()> {
    let subscriber = make_subscriber(SubscriberOptions {
        connection,
        ..Default::default()
    })?;

    let count = Arc::new(AtomicU64::new(0));
    let counter = count.clone();
    let mut handle = subscriber.subscribe(&subscription, move |message, ack| {
        output::print_info(&format!(
            "Received message {} [{}]",
            String::from_utf8_lossy(message.data()),
            message.message_id().unwrap_or("-")
        ));
        ack.ack();
        counter.fetch_add(1, Ordering::SeqCst);
    })?;

    // Wait for an unrecoverable error, at least one message, or the
    // timeout, whichever happens first.
    for _ in 0..wait_seconds.max(1) {
        match tokio::time::timeout(Duration::from_secs(1), &mut handle).await {
            Ok(result) => {
                report_session(count.load(Ordering::SeqCst), result);
                return Ok(());
            }
            Err(_) => {
                if count.load(Ordering::SeqCst) != 0 {
                    break;
                }
            }
        }
    }

    if count.load(Ordering::SeqCst) == 0 {
        output::print_warning("No messages received before the timeout");
    }
    handle.cancel();
    let result = handle.await;
    report_session(count.load(Ordering::SeqCst), result);
    Ok(())
}

fn report_session(count: u64, result: crate::error::Result<()>) {
    match result {
        Ok(()) => output::print_success(&format!("Message count = {count}, status = OK")),
        Err(status) => output::print_error(&format!("Message count = {count}, status = {status}")),
    }
}

/// The full sample flow from the service quickstart: create a
/// randomly-named topic and subscription, publish one message, receive it,
/// and clean up.
async fn run_demo(connection: ConnectionOptions, project_id: String) -> anyhow::Result<()> {
    let suffix = Uuid::new_v4().simple().to_string();
    let topic = Topic::new(project_id.clone(), format!("cloudq-demo-{}", &suffix[..12]));
    let subscription = Subscription::new(
        project_id.clone(),
        format!("cloudq-demo-sub-{}", &suffix[..12]),
    );

    let topics = TopicAdminClient::make(&connection)?;
    let subscriptions = SubscriptionAdminClient::make(&connection)?;

    output::print_info(&format!("Creating topic {topic}"));
    topics.create_topic(&topic).await.context("create topic")?;

    output::print_info(&format!("Creating subscription {subscription}"));
    subscriptions
        .create_subscription(&subscription, &topic)
        .await
        .context("create subscription")?;

    output::print_info("Publishing a message");
    publish_one(connection.clone(), topic.clone(), "Hello World!".to_string()).await?;

    output::print_info("Receiving");
    subscribe_and_print(connection.clone(), subscription.clone(), 30).await?;

    output::print_info("Cleaning up");
    subscriptions
        .delete_subscription(&subscription)
        .await
        .context("delete subscription")?;
    topics.delete_topic(&topic).await.context("delete topic")?;

    Ok(())
}

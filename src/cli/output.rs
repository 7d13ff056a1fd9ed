//! Output formatting utilities for the CLI.

use crate::transport::{SubscriptionResource, TopicResource};
use colored::*;
use tabled::{Table, Tabled};

/// A topic row for table output.
#[derive(Tabled)]
pub struct TopicRow {
    /// Full topic name.
    pub name: String,
    /// Retention duration, or "-" when unset.
    pub retention: String,
}

/// A subscription row for table output.
#[derive(Tabled)]
pub struct SubscriptionRow {
    /// Full subscription name.
    pub name: String,
    /// Full name of the attached topic.
    pub topic: String,
    /// Ack deadline in seconds, or "-" when unset.
    pub ack_deadline: String,
}

/// Print topics as a table, or a friendly message when there are none.
pub fn print_topics(project_id: &str, topics: &[TopicResource]) {
    if topics.is_empty() {
        println!("{}", format!("No topics found in project {project_id}").yellow());
        return;
    }
    let rows: Vec<TopicRow> = topics
        .iter()
        .map(|t| TopicRow {
            name: t.name.clone(),
            retention: display_option(&t.message_retention_duration),
        })
        .collect();
    println!("{}", Table::new(rows));
}

/// Print subscriptions as a table, or a friendly message when there are
/// none.
pub fn print_subscriptions(project_id: &str, subscriptions: &[SubscriptionResource]) {
    if subscriptions.is_empty() {
        println!(
            "{}",
            format!("No subscriptions found in project {project_id}").yellow()
        );
        return;
    }
    let rows: Vec<SubscriptionRow> = subscriptions
        .iter()
        .map(|s| SubscriptionRow {
            name: s.name.clone(),
            topic: s.topic.clone(),
            ack_deadline: display_option(&s.ack_deadline_seconds),
        })
        .collect();
    println!("{}", Table::new(rows));
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message.green());
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message.red());
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message.yellow());
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Display function for Option types in tables
fn display_option<T: std::fmt::Display>(option: &Option<T>) -> String {
    option
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string())
}

/********************************************************************************
 * Copyright (c) 2026 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

mod config;

use crate::config::{ConfigError, WatchConfig};
use clap::Parser;
use futures::{Stream, StreamExt};
use issue_feed::{FeedError, IssueFeed, StateStream};
use issue_feed_stomp::StompTransport;
use serde::Serialize;
use std::fmt::{self, Display, Formatter};
use std::pin::pin;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Print live issue tracker events as JSON lines")]
struct WatchArgs {
    /// json5 configuration file; flags below override its values
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,
    #[arg(short, long, value_name = "URL")]
    endpoint: Option<String>,
    /// Print the global issue feed
    #[arg(long)]
    issues: bool,
    #[arg(long, value_name = "ISSUE_ID", num_args = 1..)]
    comments: Vec<i64>,
    #[arg(long, value_name = "ISSUE_ID", num_args = 1..)]
    activities: Vec<i64>,
}

impl WatchArgs {
    fn apply(self, config: &mut WatchConfig) {
        if let Some(endpoint) = self.endpoint {
            config.feed.endpoint = endpoint;
        }
        config.watch.issues |= self.issues;
        merge_ids(&mut config.watch.comments, self.comments);
        merge_ids(&mut config.watch.activities, self.activities);
    }
}

fn merge_ids(into: &mut Vec<i64>, extra: Vec<i64>) {
    for id in extra {
        if !into.contains(&id) {
            into.push(id);
        }
    }
}

#[derive(Debug)]
enum WatchError {
    Config(ConfigError),
    Feed(FeedError),
    Signal(std::io::Error),
}

impl Display for WatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            WatchError::Config(err) => write!(f, "{err}"),
            WatchError::Feed(err) => write!(f, "{err}"),
            WatchError::Signal(err) => write!(f, "unable to listen for ctrl-c: {err}"),
        }
    }
}

impl From<ConfigError> for WatchError {
    fn from(err: ConfigError) -> Self {
        WatchError::Config(err)
    }
}

impl From<FeedError> for WatchError {
    fn from(err: FeedError) -> Self {
        WatchError::Feed(err)
    }
}

#[tokio::main]
async fn main() -> Result<(), WatchError> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();

    let args = WatchArgs::parse();
    let mut config = match &args.config {
        Some(path) => WatchConfig::load(path)?,
        None => WatchConfig::default(),
    };
    args.apply(&mut config);
    if config.watches_nothing() {
        config.watch.issues = true;
    }

    info!(
        endpoint = config.feed.endpoint.as_str(),
        issues = config.watch.issues,
        comments = ?config.watch.comments,
        activities = ?config.watch.activities,
        "Started issue-feed-watch"
    );

    let feed = IssueFeed::new(config.feed_config(), Arc::new(StompTransport::default()))?;

    let mut printers: Vec<JoinHandle<()>> =
        vec![tokio::spawn(print_status(feed.observe_connection_state()))];
    if config.watch.issues {
        let issues = feed.observe_issue_updates().await?;
        printers.push(tokio::spawn(print_events(
            "issues".to_string(),
            issues.into_stream(),
        )));
    }
    for issue_id in &config.watch.comments {
        let comments = feed.observe_comment_updates(*issue_id).await?;
        printers.push(tokio::spawn(print_events(
            format!("comments:{issue_id}"),
            comments.into_stream(),
        )));
    }
    for issue_id in &config.watch.activities {
        let activities = feed.observe_activity_updates(*issue_id).await?;
        printers.push(tokio::spawn(print_events(
            format!("activities:{issue_id}"),
            activities.into_stream(),
        )));
    }

    feed.connect().await;

    tokio::signal::ctrl_c().await.map_err(WatchError::Signal)?;
    info!("Shutting down issue-feed-watch");
    feed.shutdown().await;
    for printer in printers {
        printer.abort();
    }
    Ok(())
}

async fn print_status(mut states: StateStream) {
    while let Some(state) = states.recv().await {
        println!("status {state}");
    }
}

async fn print_events<T>(label: String, events: impl Stream<Item = T> + Send + 'static)
where
    T: Serialize + Send + 'static,
{
    let mut events = pin!(events);
    while let Some(event) = events.next().await {
        match serde_json::to_string(&event) {
            Ok(line) => println!("{label} {line}"),
            Err(err) => warn!(label = label.as_str(), err = %err, "unable to print event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{WatchArgs, WatchConfig};
    use clap::Parser;

    #[test]
    fn flags_override_and_extend_config() {
        let mut config = WatchConfig::parse(r#"{ watch: { comments: [1, 2] } }"#).unwrap();
        let args = WatchArgs::parse_from([
            "issue-feed-watch",
            "--endpoint",
            "ws://tracker:9000/ws",
            "--comments",
            "2",
            "3",
            "--activities",
            "9",
        ]);

        args.apply(&mut config);

        assert_eq!(config.feed.endpoint, "ws://tracker:9000/ws");
        assert_eq!(config.watch.comments, vec![1, 2, 3]);
        assert_eq!(config.watch.activities, vec![9]);
        assert!(!config.watch.issues);
    }

    #[test]
    fn issues_flag_enables_global_feed() {
        let mut config = WatchConfig::default();
        WatchArgs::parse_from(["issue-feed-watch", "--issues"]).apply(&mut config);

        assert!(config.watch.issues);
    }
}

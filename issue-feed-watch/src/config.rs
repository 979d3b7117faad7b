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

use issue_feed::FeedConfig;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::fs;
use std::time::Duration;

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WatchConfig {
    #[serde(default)]
    pub(crate) feed: FeedSection,
    #[serde(default)]
    pub(crate) watch: WatchSection,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FeedSection {
    pub(crate) endpoint: String,
    #[serde(default = "default_max_reconnect_attempts")]
    pub(crate) max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_delay_ms")]
    pub(crate) reconnect_delay_ms: u64,
    #[serde(default = "default_heartbeat_ms")]
    pub(crate) heartbeat_ms: u64,
}

impl Default for FeedSection {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:8080/ws".to_string(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            heartbeat_ms: default_heartbeat_ms(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WatchSection {
    #[serde(default)]
    pub(crate) issues: bool,
    #[serde(default)]
    pub(crate) comments: Vec<i64>,
    #[serde(default)]
    pub(crate) activities: Vec<i64>,
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_delay_ms() -> u64 {
    3000
}

fn default_heartbeat_ms() -> u64 {
    10_000
}

#[derive(Debug)]
pub enum ConfigError {
    Read(String, std::io::Error),
    Parse(String, json5::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read(path, err) => write!(f, "unable to read config file {path}: {err}"),
            ConfigError::Parse(path, err) => {
                write!(f, "unable to parse config file {path}: {err}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl WatchConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let contents =
            fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_string(), e))?;
        Self::parse(&contents).map_err(|e| ConfigError::Parse(path.to_string(), e))
    }

    pub fn parse(contents: &str) -> Result<Self, json5::Error> {
        json5::from_str(contents)
    }

    pub fn feed_config(&self) -> FeedConfig {
        FeedConfig::new(&self.feed.endpoint)
            .with_reconnect(
                self.feed.max_reconnect_attempts,
                Duration::from_millis(self.feed.reconnect_delay_ms),
            )
            .with_heartbeat(Duration::from_millis(self.feed.heartbeat_ms))
    }

    /// True when nothing at all would be printed besides status changes.
    pub fn watches_nothing(&self) -> bool {
        !self.watch.issues && self.watch.comments.is_empty() && self.watch.activities.is_empty()
    }
}

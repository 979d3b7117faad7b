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

//! STOMP 1.2 frame encoding and decoding.

use std::error::Error;
use std::fmt::{self, Display, Formatter};

pub const CONNECT: &str = "CONNECT";
pub const CONNECTED: &str = "CONNECTED";
pub const SUBSCRIBE: &str = "SUBSCRIBE";
pub const UNSUBSCRIBE: &str = "UNSUBSCRIBE";
pub const SEND: &str = "SEND";
pub const DISCONNECT: &str = "DISCONNECT";
pub const MESSAGE: &str = "MESSAGE";
pub const RECEIPT: &str = "RECEIPT";
pub const ERROR: &str = "ERROR";

/// A single heart-beat on the wire.
pub const HEARTBEAT: &str = "\n";

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FrameError {
    MissingCommand,
    MalformedHeader(String),
    InvalidEscape(String),
    MissingTerminator,
}

impl Display for FrameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::MissingCommand => write!(f, "frame has no command"),
            FrameError::MalformedHeader(line) => write!(f, "malformed header line: {line}"),
            FrameError::InvalidEscape(value) => write!(f, "invalid escape sequence in: {value}"),
            FrameError::MissingTerminator => write!(f, "frame is not NUL terminated"),
        }
    }
}

impl Error for FrameError {}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StompFrame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl StompFrame {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }

    /// First value of `name`; repeated headers are ignored as STOMP 1.2 requires.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(header, _)| header == name)
            .map(|(_, value)| value.as_str())
    }

    // CONNECT and CONNECTED frames carry their headers unescaped.
    fn escapes_headers(command: &str) -> bool {
        command != CONNECT && command != CONNECTED
    }

    pub fn encode(&self) -> String {
        let escape = Self::escapes_headers(&self.command);
        let mut out = String::with_capacity(self.command.len() + self.body.len() + 64);
        out.push_str(&self.command);
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Decodes one frame. Returns `Ok(None)` for a heart-beat (only EOLs).
    pub fn decode(raw: &str) -> Result<Option<Self>, FrameError> {
        let raw = raw.trim_start_matches(['\r', '\n']);
        if raw.is_empty() {
            return Ok(None);
        }

        let mut rest = raw;
        let command = take_line(&mut rest).ok_or(FrameError::MissingCommand)?;
        if command.is_empty() {
            return Err(FrameError::MissingCommand);
        }
        let escape = Self::escapes_headers(command);

        let mut headers = Vec::new();
        loop {
            let line = take_line(&mut rest).ok_or(FrameError::MissingTerminator)?;
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
            if escape {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let frame = StompFrame {
            command: command.to_string(),
            headers,
            body: String::new(),
        };
        let body = match frame
            .header("content-length")
            .and_then(|length| length.parse::<usize>().ok())
        {
            Some(length) if rest.len() > length && rest.as_bytes()[length] == 0 => {
                rest.get(..length).ok_or(FrameError::MissingTerminator)?
            }
            _ => {
                let end = rest.find('\0').ok_or(FrameError::MissingTerminator)?;
                &rest[..end]
            }
        };

        Ok(Some(StompFrame {
            body: body.to_string(),
            ..frame
        }))
    }
}

fn take_line<'a>(rest: &mut &'a str) -> Option<&'a str> {
    let end = rest.find('\n')?;
    let line = &rest[..end];
    *rest = &rest[end + 1..];
    Some(line.strip_suffix('\r').unwrap_or(line))
}

fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(value: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(value.to_string())),
        }
    }
    Ok(out)
}

//! Request/response definitions for the BandHub protocol
//!
//! Messages travel as JSON bodies inside length-prefixed frames (see `codec`).

use crate::model::{Band, BandDraft};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Username/password pair attached to a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// Commands supported by the BandHub protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum Command {
    Load,
    Info,
    Add { band: BandDraft },
    InsertAt { index: i64, band: BandDraft },
    Remove { id: i64 },
    Update { id: i64, band: BandDraft },
    Clear,
    AddIfMin { band: BandDraft },
    AddIfMax { band: BandDraft },
    CountLesserGenre { genre: String },
    ExecuteScript { requests: Vec<Request> },
    Login,
    Register,
}

impl Command {
    /// Wire name of the command
    pub fn name(&self) -> &'static str {
        match self {
            Command::Load => "load",
            Command::Info => "info",
            Command::Add { .. } => "add",
            Command::InsertAt { .. } => "insert_at",
            Command::Remove { .. } => "remove",
            Command::Update { .. } => "update",
            Command::Clear => "clear",
            Command::AddIfMin { .. } => "add_if_min",
            Command::AddIfMax { .. } => "add_if_max",
            Command::CountLesserGenre { .. } => "count_lesser_genre",
            Command::ExecuteScript { .. } => "execute_script",
            Command::Login => "login",
            Command::Register => "register",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub credentials: Option<Credentials>,
    pub command: Command,
}

impl Request {
    pub fn new(command: Command) -> Self {
        Self {
            credentials: None,
            command,
        }
    }

    pub fn authenticated(command: Command, credentials: Credentials) -> Self {
        Self {
            credentials: Some(credentials),
            command,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Success,
    Fail,
}

/// Collection metadata returned by `info`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub element_type: String,
    pub size: usize,
    pub initialized_at: DateTime<Utc>,
    pub last_modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Payload {
    Collection(Vec<Band>),
    Count(u64),
    Id(i64),
    Info(CollectionInfo),
    Script(Vec<Response>),
}

/// Response sent back for every request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: ResponseStatus,
    pub message: String,
    #[serde(default)]
    pub payload: Option<Payload>,
}

impl Response {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: message.into(),
            payload: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Fail,
            message: message.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

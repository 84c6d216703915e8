use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix used when rendering placeholder ids, so they never collide with
/// anything the backend hands out.
pub const LOCAL_ID_PREFIX: &str = "temp-";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageId {
    /// Assigned by the backend.
    Server(String),
    /// Client-generated, only valid until the backend confirms the message.
    Local(Uuid),
}

impl MessageId {
    pub fn new_local() -> Self {
        MessageId::Local(Uuid::new_v4())
    }

    pub fn is_local(&self) -> bool {
        matches!(self, MessageId::Local(_))
    }

    pub fn as_server(&self) -> Option<&str> {
        match self {
            MessageId::Server(id) => Some(id),
            MessageId::Local(_) => None,
        }
    }

    /// Parses user input: `temp-<uuid>` is a placeholder, anything else a server id.
    pub fn parse(raw: &str) -> Self {
        raw.strip_prefix(LOCAL_ID_PREFIX)
            .and_then(|rest| Uuid::parse_str(rest).ok())
            .map(MessageId::Local)
            .unwrap_or_else(|| MessageId::Server(raw.to_string()))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Server(id) => f.write_str(id),
            MessageId::Local(uuid) => write!(f, "{}{}", LOCAL_ID_PREFIX, uuid),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    Confirmed,
    Pending,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub author: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub status: MessageStatus,
}

impl Message {
    pub fn pending(author: impl Into<String>, content: impl Into<String>) -> Self {
        Message {
            id: MessageId::new_local(),
            author: author.into(),
            content: content.into(),
            created_at: Utc::now(),
            status: MessageStatus::Pending,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == MessageStatus::Confirmed
    }

    /// Only the author of a message is offered the delete action.
    pub fn is_authored_by(&self, author: &str) -> bool {
        self.author == author
    }
}

impl From<ServerMessage> for Message {
    fn from(msg: ServerMessage) -> Self {
        Message {
            id: MessageId::Server(msg.id),
            author: msg.author,
            content: msg.content,
            created_at: msg.created_at,
            status: MessageStatus::Confirmed,
        }
    }
}

/// A message as the backend returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    pub id: String,
    pub author: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Body of the creation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub author: String,
    pub content: String,
}

/// What the backend answers to a creation request. Some deployments echo the
/// whole message, others only hand back the new id.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CreatedReply {
    Message(ServerMessage),
    #[serde(rename_all = "camelCase")]
    Id { message_id: String },
}

impl CreatedReply {
    /// Fills an id-only reply in from the request. The timestamp is the
    /// client's until the next load brings the server's.
    pub fn into_server_message(self, sent: &NewMessage) -> ServerMessage {
        match self {
            CreatedReply::Message(message) => message,
            CreatedReply::Id { message_id } => ServerMessage {
                id: message_id,
                author: sent.author.clone(),
                content: sent.content.clone(),
                created_at: Utc::now(),
            },
        }
    }
}

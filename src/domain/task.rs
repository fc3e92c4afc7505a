//! Tasks accepted for deployment.
//!
//! A task is immutable once accepted. Only `brief` and `attachments`
//! participate in the deployment key; `meta` is echoed back to the
//! evaluation endpoint and otherwise ignored.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Submission phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Round {
    /// Original submission (round 1)
    Initial,

    /// Revision of a previously deployed task (round 2)
    Revision,
}

impl Round {
    pub fn number(self) -> u8 {
        match self {
            Self::Initial => 1,
            Self::Revision => 2,
        }
    }
}

impl TryFrom<u8> for Round {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Initial),
            2 => Ok(Self::Revision),
            other => Err(format!("round must be 1 or 2, got {}", other)),
        }
    }
}

impl From<Round> for u8 {
    fn from(round: Round) -> Self {
        round.number()
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// A decoded attachment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// File name inside the published repository
    pub name: String,

    /// Raw content
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Transport metadata carried alongside a task (never hashed)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMeta {
    pub email: String,
    pub nonce: String,
}

/// A validated deployment task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Logical task lineage identifier
    pub task_id: String,

    /// Submission phase
    pub round: Round,

    /// Free-text description of the site
    pub brief: String,

    /// Where the deployment result is reported
    pub evaluation_url: String,

    /// Decoded attachments, in submission order
    #[serde(default)]
    pub attachments: Vec<Attachment>,

    /// Echoed transport metadata
    #[serde(default)]
    pub meta: TaskMeta,
}

impl Task {
    /// Create a task without attachments or metadata
    pub fn new(
        task_id: impl Into<String>,
        round: Round,
        brief: impl Into<String>,
        evaluation_url: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            round,
            brief: brief.into(),
            evaluation_url: evaluation_url.into(),
            attachments: Vec::new(),
            meta: TaskMeta::default(),
        }
    }

    /// Add an attachment
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Attach transport metadata
    pub fn with_meta(mut self, email: impl Into<String>, nonce: impl Into<String>) -> Self {
        self.meta = TaskMeta {
            email: email.into(),
            nonce: nonce.into(),
        };
        self
    }
}

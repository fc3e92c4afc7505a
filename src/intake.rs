//! Request intake: turn a wire submission into a validated task.
//!
//! Checks the shared secret, validates required fields, and decodes
//! attachments. Nothing here touches the provider; the caller hands the
//! resulting task to the orchestrator and returns the ack right away.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Round, Task, TaskMeta};
use crate::site::{decode_attachment, DecodeError};

/// Attachment as submitted (`url` is a `data:` URI)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireAttachment {
    #[serde(default)]
    pub name: Option<String>,
    pub url: String,
}

/// Submission as received from the task issuer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub email: String,
    pub secret: String,
    pub task: String,
    pub round: u8,
    pub nonce: String,
    pub brief: String,
    pub evaluation_url: String,
    #[serde(default)]
    pub attachments: Vec<WireAttachment>,
}

/// Immediate acknowledgment returned to the issuer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub status: String,
    pub task: String,
    pub round: u8,
}

/// Reasons a submission is rejected
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("Server misconfigured: no project secret set")]
    SecretNotConfigured,

    #[error("Invalid secret")]
    InvalidSecret,

    #[error("Missing {0}")]
    MissingField(&'static str),

    #[error("Invalid round: {0}")]
    InvalidRound(u8),

    #[error("Invalid evaluation_url: {0}")]
    InvalidEvaluationUrl(String),

    #[error("Attachment {index}: {source}")]
    Attachment {
        index: usize,
        #[source]
        source: DecodeError,
    },
}

/// Validate a submission against the configured secret
pub fn accept(submission: Submission, expected_secret: Option<&str>) -> Result<(Task, Ack), IntakeError> {
    let expected = expected_secret
        .filter(|s| !s.is_empty())
        .ok_or(IntakeError::SecretNotConfigured)?;

    if !constant_time_eq(submission.secret.as_bytes(), expected.as_bytes()) {
        return Err(IntakeError::InvalidSecret);
    }

    if submission.task.trim().is_empty() {
        return Err(IntakeError::MissingField("task"));
    }
    if submission.evaluation_url.trim().is_empty() {
        return Err(IntakeError::MissingField("evaluation_url"));
    }
    let url = submission.evaluation_url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(IntakeError::InvalidEvaluationUrl(url.to_string()));
    }

    let round =
        Round::try_from(submission.round).map_err(|_| IntakeError::InvalidRound(submission.round))?;

    let attachments = submission
        .attachments
        .iter()
        .enumerate()
        .map(|(index, a)| {
            decode_attachment(a.name.as_deref(), &a.url)
                .map_err(|source| IntakeError::Attachment { index, source })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let ack = Ack {
        status: "ok".to_string(),
        task: submission.task.clone(),
        round: round.number(),
    };

    let task = Task {
        task_id: submission.task,
        round,
        brief: submission.brief,
        evaluation_url: url.to_string(),
        attachments,
        meta: TaskMeta {
            email: submission.email,
            nonce: submission.nonce,
        },
    };

    Ok((task, ack))
}

/// Compare secrets without short-circuiting on the first mismatch
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

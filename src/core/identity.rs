//! Content-derived deployment identity.
//!
//! The key is a SHA-256 over a canonical serialization of the brief and the
//! attachment set. Field framing is length-prefixed (big-endian u64) so no
//! two distinct inputs share a byte stream, and attachments are sorted so
//! submission order does not matter.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::{Attachment, Task};

/// Domain separation tag, bumped if the serialization ever changes
const KEY_DOMAIN: &[u8] = b"pagewright/deployment-key/v1";

/// Hex chars of the key used in repository names
const SHORT_LEN: usize = 10;

/// Maximum slug length taken from the task id
const MAX_SLUG_LEN: usize = 40;

/// Content fingerprint of a task (64 lowercase hex chars)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeploymentKey(String);

impl DeploymentKey {
    /// Wrap an existing hex digest
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix used in repository names
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(SHORT_LEN) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

impl fmt::Display for DeploymentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derive the deployment key for a task
pub fn derive(task: &Task) -> DeploymentKey {
    derive_from_parts(&task.brief, &task.attachments)
}

/// Derive a key from the hashed fields directly
pub fn derive_from_parts(brief: &str, attachments: &[Attachment]) -> DeploymentKey {
    let mut hasher = Sha256::new();
    write_field(&mut hasher, KEY_DOMAIN);
    write_field(&mut hasher, canonical_brief(brief).as_bytes());

    let mut sorted: Vec<&Attachment> = attachments.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.bytes.cmp(&b.bytes)));

    hasher.update((sorted.len() as u64).to_be_bytes());
    for attachment in sorted {
        write_field(&mut hasher, attachment.name.as_bytes());
        write_field(&mut hasher, &attachment.bytes);
    }

    DeploymentKey(hex::encode(hasher.finalize()))
}

/// Normalize line endings and surrounding whitespace
fn canonical_brief(brief: &str) -> String {
    brief.replace("\r\n", "\n").trim().to_string()
}

fn write_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}

/// Repository name for a task's first deployment
pub fn repository_name(task_id: &str, key: &DeploymentKey) -> String {
    format!("task-{}-{}", slug(task_id), key.short())
}

/// Collapse characters outside `[A-Za-z0-9_-]` into `-` and cap the length
fn slug(task_id: &str) -> String {
    let mut out = String::with_capacity(task_id.len());
    let mut in_run = false;

    for c in task_id.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('-');
            in_run = true;
        }
    }

    out.chars().take(MAX_SLUG_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Round;

    fn task(brief: &str) -> Task {
        Task::new("captcha-solver", Round::Initial, brief, "http://eval")
    }

    #[test]
    fn test_key_is_stable() {
        let t = task("Build a page").with_attachment(Attachment::new("a.png", vec![1, 2, 3]));
        assert_eq!(derive(&t), derive(&t.clone()));
        assert_eq!(derive(&t).as_str().len(), 64);
    }

    #[test]
    fn test_metadata_does_not_change_key() {
        let a = task("Build a page").with_meta("a@example.com", "nonce-1");
        let b = task("Build a page").with_meta("b@example.com", "nonce-2");
        assert_eq!(derive(&a), derive(&b));
    }

    #[test]
    fn test_brief_whitespace_normalization() {
        assert_eq!(
            derive(&task("line one\r\nline two\n")),
            derive(&task("  line one\nline two"))
        );
        // Interior whitespace is significant
        assert_ne!(derive(&task("a  b")), derive(&task("a b")));
    }

    #[test]
    fn test_field_boundaries_are_unambiguous() {
        let a = task("ab").with_attachment(Attachment::new("c", b"d".to_vec()));
        let b = task("a").with_attachment(Attachment::new("bc", b"d".to_vec()));
        let c = task("ab").with_attachment(Attachment::new("cd", Vec::new()));
        assert_ne!(derive(&a), derive(&b));
        assert_ne!(derive(&a), derive(&c));
    }

    #[test]
    fn test_attachment_content_changes_key() {
        let a = task("x").with_attachment(Attachment::new("data.csv", b"1,2".to_vec()));
        let b = task("x").with_attachment(Attachment::new("data.csv", b"1,3".to_vec()));
        assert_ne!(derive(&a), derive(&b));
    }

    #[test]
    fn test_repository_name() {
        let key = DeploymentKey::from_hex("0123456789abcdef".repeat(4));
        assert_eq!(
            repository_name("Sum of Sales!", &key),
            "task-Sum-of-Sales--0123456789"
        );
        assert_eq!(repository_name("a//b", &key), "task-a-b-0123456789");

        let long = "x".repeat(100);
        let name = repository_name(&long, &key);
        assert_eq!(name, format!("task-{}-0123456789", "x".repeat(40)));
    }

    #[test]
    fn test_short_key_respects_char_boundaries() {
        let key = DeploymentKey::from_hex("ééééééééééééé");
        assert_eq!(key.short(), "éééééééééé");

        let key = DeploymentKey::from_hex("abc");
        assert_eq!(key.short(), "abc");
    }
}

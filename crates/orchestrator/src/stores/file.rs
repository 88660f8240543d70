//! Markdown plan files with append-only version blocks.
//!
//! Each session owns `<base>/<sanitized-session>-<digest>.md`, where the
//! digest is taken over the raw id so distinct ids never share a file.
//! A write appends
//!
//! ```text
//! <!-- plan-version: 3 | 2026-01-01T10:00:00+00:00 -->
//! - [x] 1. Search tickets
//! - [ ] 2. Reply
//! <!-- end-plan-version -->
//! ```
//!
//! and the latest plan is the block with the highest version.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};
use taskflow_core::PlanVersion;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::PlanStore;
use crate::error::{OrchestratorError, Result};

const END_MARKER: &str = "<!-- end-plan-version -->";

static VERSION_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!-- plan-version: ([0-9]+) \| (\S+) -->\n(.*?)\n?<!-- end-plan-version -->")
        .expect("valid version block regex")
});

#[derive(Debug, Clone)]
pub struct FilePlanStore {
    base_dir: PathBuf,
}

impl FilePlanStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// File holding the session's versions.
    pub fn plan_path(&self, session_id: &str) -> Result<PathBuf> {
        Ok(self
            .base_dir
            .join(format!("{}.md", session_file_stem(session_id)?)))
    }

    pub async fn ensure_directory(&self) -> Result<()> {
        fs::create_dir_all(&self.base_dir).await?;
        Ok(())
    }

    async fn read_versions(&self, session_id: &str) -> Result<Vec<PlanVersion>> {
        let path = self.plan_path(session_id)?;
        match fs::read_to_string(&path).await {
            Ok(text) => Ok(parse_versions(session_id, &text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Map a session id onto `[A-Za-z0-9_-]`.
pub fn sanitize_session_id(session_id: &str) -> Result<String> {
    let sanitized: String = session_id
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.is_empty() {
        return Err(OrchestratorError::InvalidInput(
            "session id must not be empty".to_string(),
        ));
    }
    Ok(sanitized)
}

/// Readable, collision-free file stem for a session id.
pub fn session_file_stem(session_id: &str) -> Result<String> {
    let sanitized = sanitize_session_id(session_id)?;
    let digest = Sha256::digest(session_id.trim().as_bytes());
    Ok(format!("{}-{}", sanitized, hex::encode(&digest[..4])))
}

fn parse_versions(session_id: &str, text: &str) -> Vec<PlanVersion> {
    let mut versions: Vec<PlanVersion> = VERSION_BLOCK
        .captures_iter(text)
        .filter_map(|caps| {
            let version = caps[1].parse::<u32>().ok()?;
            let written_at = match DateTime::parse_from_rfc3339(&caps[2]) {
                Ok(ts) => ts.with_timezone(&Utc),
                Err(e) => {
                    warn!(session_id, version, error = %e, "Skipping plan block with bad timestamp");
                    return None;
                }
            };
            Some(PlanVersion {
                session_id: session_id.to_string(),
                version,
                content: caps[3].to_string(),
                written_at,
            })
        })
        .collect();

    versions.sort_by_key(|v| v.version);
    versions
}

fn render_block(version: &PlanVersion) -> String {
    format!(
        "<!-- plan-version: {} | {} -->\n{}\n{}\n\n",
        version.version,
        version.written_at.to_rfc3339(),
        version.content.trim_end(),
        END_MARKER
    )
}

#[async_trait]
impl PlanStore for FilePlanStore {
    async fn get_latest(&self, session_id: &str) -> Result<PlanVersion> {
        let path = self.plan_path(session_id)?;
        debug!(session_id = %session_id, path = %path.display(), "Reading latest plan");

        self.read_versions(session_id)
            .await?
            .into_iter()
            .max_by_key(|v| v.version)
            .ok_or_else(|| OrchestratorError::PlanNotFound(session_id.to_string()))
    }

    async fn append_version(&self, session_id: &str, content: &str) -> Result<u32> {
        let path = self.plan_path(session_id)?;
        let version = self
            .read_versions(session_id)
            .await
            .map_err(|e| OrchestratorError::plan_write(session_id, e))?
            .last()
            .map(|v| v.version)
            .unwrap_or(0)
            + 1;
        let block = render_block(&PlanVersion::new(session_id, version, content));

        let write = async {
            fs::create_dir_all(&self.base_dir).await?;
            let mut file = fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            file.write_all(block.as_bytes()).await?;
            file.flush().await
        };
        write
            .await
            .map_err(|e| OrchestratorError::plan_write(session_id, e))?;

        info!(session_id = %session_id, version, path = %path.display(), "Appended plan version");
        Ok(version)
    }

    async fn history(&self, session_id: &str) -> Result<Vec<PlanVersion>> {
        self.read_versions(session_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_append_and_read_latest() {
        let dir = TempDir::new().unwrap();
        let store = FilePlanStore::new(dir.path().join("plans"));

        assert!(matches!(
            store.get_latest("s1").await,
            Err(OrchestratorError::PlanNotFound(_))
        ));

        let v1 = store
            .append_version("s1", "- [ ] 1. Search\n- [ ] 2. Reply")
            .await
            .unwrap();
        let v2 = store
            .append_version("s1", "- [x] 1. Search\n- [ ] 2. Reply")
            .await
            .unwrap();
        assert_eq!((v1, v2), (1, 2));

        let latest = store.get_latest("s1").await.unwrap();
        assert_eq!(latest.version, 2);
        assert_eq!(latest.content, "- [x] 1. Search\n- [ ] 2. Reply");

        let history = store.history("s1").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "- [ ] 1. Search\n- [ ] 2. Reply");
        assert!(history[0].written_at <= history[1].written_at);
    }

    #[tokio::test]
    async fn test_file_format() {
        let dir = TempDir::new().unwrap();
        let store = FilePlanStore::new(dir.path());
        store.append_version("chat-7", "- [ ] 1. a").await.unwrap();

        let path = store.plan_path("chat-7").unwrap();
        assert!(path.starts_with(dir.path()));
        assert!(path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("chat-7-") && n.ends_with(".md")));

        let text = fs::read_to_string(path)
            .await
            .unwrap();
        assert!(text.starts_with("<!-- plan-version: 1 | "));
        assert!(text.contains("\n- [ ] 1. a\n<!-- end-plan-version -->\n"));
    }

    #[tokio::test]
    async fn test_latest_is_highest_version_not_last_block() {
        let dir = TempDir::new().unwrap();
        let store = FilePlanStore::new(dir.path());
        let text = "<!-- plan-version: 5 | 2026-01-01T00:00:00+00:00 -->\n- [x] 1. five\n<!-- end-plan-version -->\n\n\
                    <!-- plan-version: 3 | 2026-01-02T00:00:00+00:00 -->\n- [ ] 1. three\n<!-- end-plan-version -->\n";
        fs::write(store.plan_path("s1").unwrap(), text).await.unwrap();

        let latest = store.get_latest("s1").await.unwrap();
        assert_eq!(latest.version, 5);
        assert_eq!(store.append_version("s1", "- [x] 1. six").await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_session_ids_are_sanitized() {
        let dir = TempDir::new().unwrap();
        let store = FilePlanStore::new(dir.path());

        store.append_version("../escape me", "- [ ] 1. a").await.unwrap();
        let path = store.plan_path("../escape me").unwrap();
        assert_eq!(path.parent(), Some(dir.path()));
        assert!(path.exists());
        assert_eq!(store.get_latest("../escape me").await.unwrap().version, 1);

        assert!(matches!(
            store.append_version("  ", "x").await,
            Err(OrchestratorError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let dir = TempDir::new().unwrap();
        let store = FilePlanStore::new(dir.path());

        store.append_version("a", "- [ ] 1. a").await.unwrap();
        store.append_version("a", "- [x] 1. a").await.unwrap();
        assert_eq!(store.append_version("b", "- [ ] 1. b").await.unwrap(), 1);
        assert!(store.history("c").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ids_with_same_sanitized_form_stay_apart() {
        let dir = TempDir::new().unwrap();
        let store = FilePlanStore::new(dir.path());

        assert_eq!(store.append_version("team/a", "- [ ] 1. a").await.unwrap(), 1);
        assert_eq!(store.append_version("team_a", "- [ ] 1. b").await.unwrap(), 1);

        assert_eq!(store.get_latest("team/a").await.unwrap().content, "- [ ] 1. a");
        assert_eq!(store.get_latest("team_a").await.unwrap().content, "- [ ] 1. b");
        assert_ne!(
            store.plan_path("team/a").unwrap(),
            store.plan_path("team_a").unwrap()
        );
    }
}

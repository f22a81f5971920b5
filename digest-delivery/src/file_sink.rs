use crate::render::render_markdown;
use async_trait::async_trait;
use interfaces::defs::{Digest, DigestSink};
use interfaces::error::SinkError;
use std::path::{Path, PathBuf};
use tracing::info;

/// Writes `<dir>/digest-<date>.md`, replacing an earlier file for the same date.
pub struct MarkdownFileSink {
    dir: PathBuf,
}

impl MarkdownFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, digest: &Digest) -> PathBuf {
        self.dir.join(format!("digest-{}.md", digest.date.format("%Y-%m-%d")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl DigestSink for MarkdownFileSink {
    fn sink_name(&self) -> String {
        format!("markdown file ({})", self.dir.display())
    }

    async fn deliver(&self, digest: &Digest) -> Result<(), SinkError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(digest);
        tokio::fs::write(&path, render_markdown(digest)).await?;
        info!("Wrote digest to {}", path.display());
        Ok(())
    }
}

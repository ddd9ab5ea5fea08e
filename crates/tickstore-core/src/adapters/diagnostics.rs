use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{Symbol, UtcDateTime};

const MAX_ARTIFACT_BYTES: usize = 2_048;

/// Writes truncated provider responses under `<root>/debug/`.
///
/// Artifacts are never read back. Every failure is logged and swallowed so a
/// broken debug directory cannot turn into a fetch failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugArtifacts {
    dir: PathBuf,
}

impl DebugArtifacts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store `body` as `<tier>_<SYMBOL>_<unix>.txt`, returning the path on success.
    pub fn capture(&self, tier: &str, symbol: &Symbol, status: u16, body: &str) -> Option<PathBuf> {
        let path = self.dir.join(format!(
            "{tier}_{symbol}_{}.txt",
            UtcDateTime::now().unix_timestamp()
        ));
        let contents = format!("status: {status}\n\n{}", truncate(body, MAX_ARTIFACT_BYTES));

        let written = fs::create_dir_all(&self.dir).and_then(|()| fs::write(&path, contents));
        match written {
            Ok(()) => {
                debug!(tier, symbol = %symbol, path = %path.display(), "saved provider response");
                Some(path)
            }
            Err(error) => {
                warn!(tier, symbol = %symbol, %error, "could not save provider response");
                None
            }
        }
    }
}

fn truncate(body: &str, max_bytes: usize) -> &str {
    if body.len() <= max_bytes {
        return body;
    }
    let mut end = max_bytes;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

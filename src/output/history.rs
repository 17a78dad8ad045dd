//! output/history: provenance record stamped on the label raster.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::consts::HISTORY_EXT;
use crate::util::{now_secs, write_file_atomic};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct History {
    pub map_name: String,
    pub map_type: String,
    pub title: String,
    pub creator: String,
    /// Unix seconds.
    pub created: u64,
    pub command_line: String,
    #[serde(default)]
    pub comments: Vec<String>,
}

impl History {
    /// Short record: name, type, creator and creation time; title defaults to the name.
    pub fn short(map_name: &str, map_type: &str) -> Self {
        let creator = std::env::var("USER")
            .or_else(|_| std::env::var("LOGNAME"))
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());
        Self {
            map_name: map_name.to_string(),
            map_type: map_type.to_string(),
            title: map_name.to_string(),
            creator,
            created: now_secs(),
            command_line: String::new(),
            comments: Vec::new(),
        }
    }

    /// Record the invoking command line. Arguments with whitespace or quotes are quoted.
    pub fn command(&mut self, args: &[String]) {
        self.command_line = args
            .iter()
            .map(|a| {
                if a.is_empty() || a.chars().any(|c| c.is_whitespace() || c == '"') {
                    format!("\"{}\"", a.replace('"', "\\\""))
                } else {
                    a.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ");
    }

    pub fn add_comment(&mut self, line: impl Into<String>) {
        self.comments.push(line.into());
    }

    pub fn path_for(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("{}.{}", name, HISTORY_EXT))
    }

    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = Self::path_for(dir, &self.map_name);
        let body = serde_json::to_vec_pretty(self)?;
        write_file_atomic(&path, &body)
            .with_context(|| format!("write history for <{}>", self.map_name))?;
        Ok(path)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let body = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
        let h: History = serde_json::from_slice(&body)
            .with_context(|| format!("parse history {}", path.display()))?;
        Ok(h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_quotes_when_needed() {
        let mut h = History::short("seg", "raster");
        h.command(&[
            "segstore".to_string(),
            "materialize".to_string(),
            "--output".to_string(),
            "seg".to_string(),
            "--out-dir".to_string(),
            "/tmp/my maps".to_string(),
        ]);
        assert_eq!(
            h.command_line,
            "segstore materialize --output seg --out-dir \"/tmp/my maps\""
        );
        assert_eq!(h.title, "seg");
        assert_eq!(h.map_type, "raster");
    }
}

//! Notes corpus index.
//!
//! The corpus is a read-only tree of subjects, topics and content units.
//! [`NotesDirectory`] maps it onto a directory layout:
//!
//! ```text
//! notes/
//! ├── Math/                 <- subject
//! │   └── Algebra/          <- topic
//! │       ├── linear.md     <- content unit
//! │       └── state.md      <- reserved, never a unit
//! └── Bio/
//!     └── Cells/
//!         └── membranes.markdown
//! ```
//!
//! Subjects without topics and topics without qualifying units are left out
//! before the quiz engine ever sees them.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::config::CorpusConfig;
use crate::error::Result;

/// A study subject with at least one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subject {
    /// Unique, human-readable name.
    pub name: String,

    /// Location of the subject in the backing store.
    #[serde(skip)]
    pub path: PathBuf,

    /// Topics ordered by name.
    pub topics: Vec<Topic>,
}

/// A topic with at least one qualifying content unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Topic {
    /// Name, unique within its subject.
    pub name: String,

    /// Name of the owning subject.
    pub subject: String,

    /// Location of the topic in the backing store.
    #[serde(skip)]
    pub path: PathBuf,

    /// Locators of the content units, ordered by file name.
    #[serde(skip)]
    pub units: Vec<PathBuf>,
}

/// Read-only access to the notes corpus.
pub trait CorpusIndex: Send + Sync {
    /// Scans the backing store and returns every subject, ordered by name.
    fn list_subjects(&self) -> Result<Vec<Subject>>;

    /// Reads the text of one content unit.
    fn read_unit(&self, unit: &Path) -> Result<String>;

    /// Returns the topics of `subject`, or an empty list if it is unknown.
    fn list_topics(&self, subject: &str) -> Result<Vec<Topic>> {
        Ok(self
            .list_subjects()?
            .into_iter()
            .find(|s| s.name == subject)
            .map(|s| s.topics)
            .unwrap_or_default())
    }

    /// Looks up a single topic.
    fn find_topic(&self, subject: &str, topic: &str) -> Result<Option<Topic>> {
        Ok(self
            .list_topics(subject)?
            .into_iter()
            .find(|t| t.name == topic))
    }
}

/// Corpus backed by a notes directory on disk.
#[derive(Debug, Clone)]
pub struct NotesDirectory {
    root: PathBuf,
    rules: CorpusConfig,
}

impl NotesDirectory {
    /// Creates an index over `root` using the given qualification rules.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, rules: CorpusConfig) -> Self {
        Self {
            root: root.into(),
            rules,
        }
    }

    /// Returns the corpus root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns `true` if `path` is a content unit under the configured rules.
    #[must_use]
    pub fn is_content_unit(&self, path: &Path) -> bool {
        if !path.is_file() {
            return false;
        }
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        if file_name == self.rules.reserved_file {
            return false;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.rules
                    .extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
    }

    fn scan_topics(&self, subject_dir: &Path, subject_name: &str) -> Result<Vec<Topic>> {
        let mut topics = Vec::new();
        for (name, topic_dir) in visible_dirs(subject_dir)? {
            let units = self.scan_units(&topic_dir)?;
            if units.is_empty() {
                debug!(subject = %subject_name, topic = %name, "Skipping topic without notes");
                continue;
            }
            topics.push(Topic {
                name,
                subject: subject_name.to_string(),
                path: topic_dir,
                units,
            });
        }
        Ok(topics)
    }

    fn scan_units(&self, topic_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut units = Vec::new();
        for entry in std::fs::read_dir(topic_dir)? {
            let path = entry?.path();
            if self.is_content_unit(&path) {
                units.push(path);
            }
        }
        units.sort();
        Ok(units)
    }
}

impl CorpusIndex for NotesDirectory {
    fn list_subjects(&self) -> Result<Vec<Subject>> {
        if !self.root.is_dir() {
            debug!(root = %self.root.display(), "Notes directory does not exist");
            return Ok(Vec::new());
        }

        let mut subjects = Vec::new();
        for (name, subject_dir) in visible_dirs(&self.root)? {
            let topics = self.scan_topics(&subject_dir, &name)?;
            if topics.is_empty() {
                debug!(subject = %name, "Skipping subject without topics");
                continue;
            }
            subjects.push(Subject {
                name,
                path: subject_dir,
                topics,
            });
        }
        Ok(subjects)
    }

    fn read_unit(&self, unit: &Path) -> Result<String> {
        Ok(std::fs::read_to_string(unit)?)
    }
}

/// Lists non-hidden subdirectories of `dir` as `(name, path)`, sorted by name.
fn visible_dirs(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with('.') {
            continue;
        }
        dirs.push((name.to_string(), path.clone()));
    }
    dirs.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(dirs)
}

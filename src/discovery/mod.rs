pub mod namespace;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

pub use namespace::{namespace_from_descriptor, resolve_namespace};

pub const DEFAULT_CLASS_EXTENSION: &str = "cls";

// @AuraEnabled, marker args, stacked annotations, comments, an optional
// modifier, a type expression and finally `name()` with an empty parameter list.
const AURA_ENABLED_NO_PARAM_PATTERN: &str = concat!(
    r"(?i)@AuraEnabled(?:\s*\([^)]*\))?",
    r"(?:\s*@\w+(?:\s*\([^)]*\))?)*",
    r"(?:\s*(?://[^\n]*|/\*[\s\S]*?\*/))*",
    r"\s*(?:public|private|protected|global|static|virtual|override|",
    r"abstract|final|transient)?",
    r"(?:\s+|[\r\n]+)",
    r"[\w<>\[\],\s]+",
    r"\b(\w+)\s*\(\s*\)",
);

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Candidate {
    pub class_name: String,
    pub method_name: String,
}

/// Class name to the zero-argument methods found in it, in source order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Discovery {
    classes: BTreeMap<String, Vec<String>>,
}

impl Discovery {
    pub fn insert(&mut self, class_name: impl Into<String>, methods: Vec<String>) {
        if methods.is_empty() {
            return;
        }
        self.classes.insert(class_name.into(), methods);
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn candidate_count(&self) -> usize {
        self.classes.values().map(Vec::len).sum()
    }

    pub fn methods(&self, class_name: &str) -> Option<&[String]> {
        self.classes.get(class_name).map(Vec::as_slice)
    }

    pub fn classes(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.classes
            .iter()
            .map(|(class, methods)| (class.as_str(), methods.as_slice()))
    }

    pub fn candidates(&self) -> Vec<Candidate> {
        self.classes()
            .flat_map(|(class, methods)| {
                methods.iter().map(move |method| Candidate {
                    class_name: class.to_string(),
                    method_name: method.clone(),
                })
            })
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("class directory not found: {path}")]
    RootNotFound { path: PathBuf },

    #[error("failed to list directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read class file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid discovery pattern: {source}")]
    Pattern {
        #[source]
        source: regex::Error,
    },
}

/// Finds remotely invocable, zero-argument methods below a source root.
pub trait Discoverer {
    fn discover(&self, root: &Path) -> Result<Discovery, DiscoveryError>;
}

/// Regex-backed discoverer. It does not parse Apex, so a marker inside an
/// unrelated comment can still produce a match.
#[derive(Clone, Debug)]
pub struct PatternDiscoverer {
    pattern: Regex,
    extension: String,
}

impl PatternDiscoverer {
    pub fn new(extension: &str) -> Result<Self, DiscoveryError> {
        let pattern = Regex::new(AURA_ENABLED_NO_PARAM_PATTERN)
            .map_err(|source| DiscoveryError::Pattern { source })?;
        Ok(Self {
            pattern,
            extension: extension.trim_start_matches('.').to_string(),
        })
    }

    pub fn methods_in(&self, source: &str) -> Vec<String> {
        self.pattern
            .captures_iter(source)
            .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
            .collect()
    }

    fn class_name<'a>(&self, path: &'a Path) -> Option<&'a str> {
        let ext = path.extension()?.to_str()?;
        if ext != self.extension {
            return None;
        }
        path.file_stem()?.to_str()
    }
}

impl Discoverer for PatternDiscoverer {
    fn discover(&self, root: &Path) -> Result<Discovery, DiscoveryError> {
        if !root.is_dir() {
            return Err(DiscoveryError::RootNotFound {
                path: root.to_path_buf(),
            });
        }

        let mut files = Vec::new();
        collect_files(root, &mut files)?;

        let mut discovery = Discovery::default();
        for path in files.iter() {
            let class_name = match self.class_name(path) {
                Some(class_name) => class_name,
                None => continue,
            };
            let bytes = std::fs::read(path).map_err(|source| DiscoveryError::ReadFile {
                path: path.clone(),
                source,
            })?;
            let methods = self.methods_in(&String::from_utf8_lossy(&bytes));
            discovery.insert(class_name, methods);
        }
        Ok(discovery)
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), DiscoveryError> {
    let read_dir = std::fs::read_dir(dir).map_err(|source| DiscoveryError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut entries = Vec::new();
    for entry in read_dir {
        let entry = entry.map_err(|source| DiscoveryError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?;
        entries.push(entry.path());
    }
    entries.sort();

    for path in entries {
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

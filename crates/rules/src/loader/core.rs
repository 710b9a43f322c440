//! Core [`RuleLoader`] struct: a directory of rule-group YAML documents.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{info, warn};

use crate::schema::RuleGroup;
use crate::validation::validate_document;

use super::document::RuleGroupDocument;
use super::error::{LoadResult, LoadStatus, Result, RuleError};

/// Filesystem-backed rule-group loader.
///
/// Scans a directory (recursively) for `*.yml` / `*.yaml` files, parses and
/// validates each as a [`RuleGroupDocument`], and keeps the resulting groups
/// in memory keyed by group name.
pub struct RuleLoader {
    rules_dir: PathBuf,
    groups: Arc<RwLock<BTreeMap<String, RuleGroup>>>,
}

impl RuleLoader {
    /// Create a new loader for the given directory.
    ///
    /// Creates the directory (and parents) if it does not exist.
    pub fn new(rules_dir: PathBuf) -> Self {
        if !rules_dir.exists() {
            if let Err(e) = fs::create_dir_all(&rules_dir) {
                warn!(path = %rules_dir.display(), error = %e, "failed to create rules directory");
            }
        }
        Self {
            rules_dir,
            groups: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Recursively scan the rules directory and load all YAML files.
    ///
    /// Dotfiles and non-YAML files are skipped. Parse and validation errors
    /// are reported per file but do not abort the scan.
    pub fn load_all(&self) -> Result<Vec<LoadResult>> {
        let mut results = Vec::new();
        self.scan_dir_recursive(&self.rules_dir, &mut results)?;
        Ok(results)
    }

    fn scan_dir_recursive(&self, dir: &Path, results: &mut Vec<LoadResult>) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "failed to read directory");
                return Ok(());
            }
        };

        let mut paths = entries
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        paths.sort();

        for path in paths {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with('.') {
                    if path.is_file() {
                        results.push(LoadResult {
                            path,
                            status: LoadStatus::Skipped {
                                reason: "dotfile".to_string(),
                            },
                        });
                    }
                    continue;
                }
            }

            if path.is_dir() {
                self.scan_dir_recursive(&path, results)?;
                continue;
            }

            if !is_yaml(&path) {
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Skipped {
                        reason: "not a YAML file".to_string(),
                    },
                });
                continue;
            }

            match self.load_file(&path) {
                Ok(group) => {
                    info!(rule_group = %group.name, rules = group.rules.len(), path = %path.display(), "loaded rule group");
                    let status = LoadStatus::Loaded {
                        name: group.name.clone(),
                        rules: group.rules.len(),
                    };
                    self.insert(group);
                    results.push(LoadResult { path, status });
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to load rule group file");
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Failed {
                            error: e.to_string(),
                        },
                    });
                }
            }
        }

        Ok(())
    }

    /// Parse and validate a single YAML file.
    pub fn load_file(&self, path: &Path) -> Result<RuleGroup> {
        let contents = fs::read_to_string(path)?;
        let doc = RuleGroupDocument::from_yaml(&contents)?;

        let validation = validate_document(&doc);
        if !validation.valid {
            return Err(RuleError::Validation(validation.summary()));
        }
        doc.into_group()
    }

    fn insert(&self, group: RuleGroup) {
        self.groups
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(group.name.clone(), group);
    }

    /// Atomically write a group to `<slug>.yml`.
    ///
    /// Writes to a `.tmp` file first, then renames to the final path.
    pub fn write_group(&self, group: &RuleGroup) -> Result<PathBuf> {
        let slug = file_slug(&group.name);
        let final_path = self.rules_dir.join(format!("{}.yml", slug));
        let tmp_path = self.rules_dir.join(format!(".{}.tmp", slug));

        let yaml = RuleGroupDocument::from_group(group).to_yaml()?;
        fs::write(&tmp_path, yaml)?;
        fs::rename(&tmp_path, &final_path)?;

        info!(rule_group = %group.name, path = %final_path.display(), "wrote rule group file");
        self.insert(group.clone());
        Ok(final_path)
    }

    /// Delete a group's file and in-memory entry.
    pub fn delete_group(&self, name: &str) -> Result<()> {
        let slug = file_slug(name);
        let candidates = [
            self.rules_dir.join(format!("{}.yml", slug)),
            self.rules_dir.join(format!("{}.yaml", slug)),
        ];
        let Some(path) = candidates.iter().find(|p| p.exists()) else {
            return Err(RuleError::Validation(format!(
                "no rule group file found for '{}'",
                name
            )));
        };
        fs::remove_file(path)?;
        self.groups
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        info!(rule_group = %name, "deleted rule group file");
        Ok(())
    }

    pub fn rules_dir(&self) -> &Path {
        &self.rules_dir
    }

    /// Snapshot of every loaded group, ordered by name.
    pub fn groups(&self) -> Vec<RuleGroup> {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<RuleGroup> {
        self.groups
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e == "yml" || e == "yaml")
        .unwrap_or(false)
}

/// Lowercase kebab-case file stem for a group name.
pub(crate) fn file_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("rule-group");
    }
    slug
}

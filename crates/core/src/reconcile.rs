//! Mapping reconciliation.
//!
//! Applies a [`ChangeSet`] to a mapping list: deleted sources drop their
//! entry, renamed sources follow the rename and carry the new basename into
//! the destination.

use tracing::{info, warn};

use crate::changes::{ChangeRecord, ChangeSet};
use crate::mapping::{MappingEntry, MappingList};

/// Result of reconciling a mapping list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub entries: MappingList,
    /// Sources whose entries were dropped.
    pub removed: Vec<String>,
    /// `(old source, new source)` pairs that were rewritten.
    pub renamed: Vec<(String, String)>,
}

impl Reconciliation {
    pub fn changed(&self) -> bool {
        !self.removed.is_empty() || !self.renamed.is_empty()
    }
}

/// Rewrite `list` against `changes`, keeping order and key style.
pub fn reconcile(list: &MappingList, changes: &ChangeSet) -> Reconciliation {
    let mut entries = Vec::with_capacity(list.len());
    let mut removed = Vec::new();
    let mut renamed = Vec::new();

    for entry in &list.entries {
        match changes.get(&entry.source) {
            None => entries.push(entry.clone()),
            Some(ChangeRecord::Deleted { path }) => {
                info!(source = %path, "removing mapping for deleted file");
                removed.push(path.clone());
            }
            Some(ChangeRecord::Renamed { from, to }) => {
                if to.trim().is_empty() {
                    warn!(source = %from, "rename has no target path; dropping mapping");
                    removed.push(from.clone());
                    continue;
                }
                let destination = derive_destination(&entry.destination, from, to);
                info!(from = %from, to = %to, destination = %destination, "updating renamed mapping");
                entries.push(MappingEntry {
                    source: to.clone(),
                    destination,
                    exclude: entry.exclude.clone(),
                });
                renamed.push((from.clone(), to.clone()));
            }
        }
    }

    Reconciliation {
        entries: MappingList::new(entries, list.style),
        removed,
        renamed,
    }
}

/// Carry a source rename into the destination path.
///
/// Only a destination whose last segment is the old file name is touched; a
/// destination that names a directory or a different file is kept.
fn derive_destination(destination: &str, old_source: &str, new_source: &str) -> String {
    let old_name = basename(old_source);
    let new_name = basename(new_source);
    match destination.rsplit_once('/') {
        Some((dir, last)) if last == old_name => format!("{}/{}", dir, new_name),
        None if destination == old_name => new_name.to_string(),
        _ => destination.to_string(),
    }
}

fn basename(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::KeyStyle;

    fn list(entries: Vec<MappingEntry>) -> MappingList {
        MappingList::new(entries, KeyStyle::SourceDestination)
    }

    fn renamed(from: &str, to: &str) -> ChangeRecord {
        ChangeRecord::Renamed {
            from: from.into(),
            to: to.into(),
        }
    }

    #[test]
    fn test_empty_change_set_is_identity() {
        let input = list(vec![
            MappingEntry::new("a.yml", "fern/a.yml"),
            MappingEntry::new("docs", "fern/docs").with_exclude(&["drafts/**"]),
        ]);
        let result = reconcile(&input, &ChangeSet::new());
        assert_eq!(result.entries, input);
        assert!(!result.changed());
    }

    #[test]
    fn test_basename_substitution() {
        let input = list(vec![MappingEntry::new("specs/old.yml", "fern/old.yml")]);
        let changes: ChangeSet = [renamed("specs/old.yml", "specs/new.yml")].into_iter().collect();
        let result = reconcile(&input, &changes);
        assert_eq!(
            result.entries.entries,
            vec![MappingEntry::new("specs/new.yml", "fern/new.yml")]
        );
        assert_eq!(
            result.renamed,
            vec![("specs/old.yml".to_string(), "specs/new.yml".to_string())]
        );
    }

    #[test]
    fn test_destination_with_other_name_kept() {
        let input = list(vec![MappingEntry::new("specs/old.yml", "fern/openapi.yml")]);
        let changes: ChangeSet = [renamed("specs/old.yml", "api/new.yml")].into_iter().collect();
        let result = reconcile(&input, &changes);
        assert_eq!(result.entries.entries[0].source, "api/new.yml");
        assert_eq!(result.entries.entries[0].destination, "fern/openapi.yml");
    }

    #[test]
    fn test_bare_destination_substituted() {
        let input = list(vec![MappingEntry::new("old.yml", "old.yml")]);
        let changes: ChangeSet = [renamed("old.yml", "new.yml")].into_iter().collect();
        let result = reconcile(&input, &changes);
        assert_eq!(result.entries.entries[0].destination, "new.yml");
    }

    #[test]
    fn test_deletion_drops_entry_and_keeps_order() {
        let input = list(vec![
            MappingEntry::new("a.yml", "fern/a.yml"),
            MappingEntry::new("b.yml", "fern/b.yml"),
            MappingEntry::new("c.yml", "fern/c.yml"),
        ]);
        let changes: ChangeSet = [ChangeRecord::Deleted { path: "b.yml".into() }]
            .into_iter()
            .collect();
        let result = reconcile(&input, &changes);
        let sources: Vec<&str> = result.entries.tracked_paths();
        assert_eq!(sources, vec!["a.yml", "c.yml"]);
        assert_eq!(result.removed, vec!["b.yml".to_string()]);
    }

    #[test]
    fn test_exclude_carried_through_rename() {
        let input = list(vec![MappingEntry::new("docs", "fern/docs").with_exclude(&["tmp/**"])]);
        let changes: ChangeSet = [renamed("docs", "guides")].into_iter().collect();
        let result = reconcile(&input, &changes);
        let entry = &result.entries.entries[0];
        assert_eq!(entry.source, "guides");
        assert_eq!(entry.destination, "fern/docs");
        assert_eq!(entry.exclude, vec!["tmp/**".to_string()]);
    }

    #[test]
    fn test_empty_rename_target_drops_entry() {
        let input = list(vec![MappingEntry::new("a.yml", "fern/a.yml")]);
        let changes: ChangeSet = [renamed("a.yml", "")].into_iter().collect();
        let result = reconcile(&input, &changes);
        assert!(result.entries.is_empty());
        assert_eq!(result.removed, vec!["a.yml".to_string()]);
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let input = list(vec![MappingEntry::new("specs/old.yml", "fern/old.yml")]);
        let changes: ChangeSet = [renamed("specs/old.yml", "specs/new.yml")].into_iter().collect();
        let once = reconcile(&input, &changes);
        let twice = reconcile(&once.entries, &changes);
        assert_eq!(once.entries, twice.entries);
        assert!(!twice.changed());
    }
}

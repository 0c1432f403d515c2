//! Mapping native notifications onto add / change / unlink.

use std::path::{Path, PathBuf};

use notify::EventKind;
use notify::event::ModifyKind;

use foldex_core::{ChangeKind, ExclusionPolicy};

/// Coarse class of a native notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    /// Something appeared, disappeared or moved; existence decides which.
    Rename,
    /// File content or metadata changed in place.
    Change,
}

impl RawKind {
    /// Classify a notify event kind. Access notifications are dropped.
    pub fn from_event_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Access(_) => None,
            EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Metadata(_)) => Some(Self::Change),
            EventKind::Create(_)
            | EventKind::Remove(_)
            | EventKind::Modify(_)
            | EventKind::Any
            | EventKind::Other => Some(Self::Rename),
        }
    }
}

/// Turn a raw notification for `path` into a change kind.
pub fn normalize(raw: RawKind, path: &Path) -> ChangeKind {
    match raw {
        RawKind::Rename if path.exists() => ChangeKind::Add,
        RawKind::Rename => ChangeKind::Unlink,
        RawKind::Change => ChangeKind::Change,
    }
}

/// Re-check a pending kind once its quiet window has passed.
pub(crate) fn settle(kind: ChangeKind, path: &Path) -> ChangeKind {
    match (kind, path.exists()) {
        (ChangeKind::Unlink, true) => ChangeKind::Add,
        (ChangeKind::Add | ChangeKind::Change, false) => ChangeKind::Unlink,
        (kind, _) => kind,
    }
}

/// Map a notified path back onto the configured root.
///
/// Backends may report paths below the canonical root, so both spellings
/// are accepted. Returns `None` for excluded paths and paths outside the root.
pub fn watched_path(
    policy: &ExclusionPolicy,
    root: &Path,
    canonical_root: &Path,
    path: &Path,
) -> Option<PathBuf> {
    let relative = path
        .strip_prefix(root)
        .or_else(|_| path.strip_prefix(canonical_root))
        .ok()?;
    if policy.is_excluded_path(relative) {
        return None;
    }
    Some(root.join(relative))
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, RemoveKind, RenameMode};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_classification() {
        assert_eq!(RawKind::from_event_kind(&EventKind::Access(AccessKind::Any)), None);
        assert_eq!(
            RawKind::from_event_kind(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            Some(RawKind::Change)
        );
        assert_eq!(
            RawKind::from_event_kind(&EventKind::Modify(ModifyKind::Name(RenameMode::Both))),
            Some(RawKind::Rename)
        );
        assert_eq!(
            RawKind::from_event_kind(&EventKind::Create(CreateKind::File)),
            Some(RawKind::Rename)
        );
        assert_eq!(
            RawKind::from_event_kind(&EventKind::Remove(RemoveKind::File)),
            Some(RawKind::Rename)
        );
    }

    #[test]
    fn test_rename_disambiguated_by_existence() {
        let temp = TempDir::new().unwrap();
        let present = temp.path().join("here.txt");
        fs::write(&present, "x").unwrap();
        let gone = temp.path().join("gone.txt");

        assert_eq!(normalize(RawKind::Rename, &present), ChangeKind::Add);
        assert_eq!(normalize(RawKind::Rename, &gone), ChangeKind::Unlink);
        assert_eq!(normalize(RawKind::Change, &present), ChangeKind::Change);
    }

    #[test]
    fn test_settle_rechecks_existence() {
        let temp = TempDir::new().unwrap();
        let present = temp.path().join("back.txt");
        fs::write(&present, "x").unwrap();
        let gone = temp.path().join("gone.txt");

        assert_eq!(settle(ChangeKind::Unlink, &present), ChangeKind::Add);
        assert_eq!(settle(ChangeKind::Change, &gone), ChangeKind::Unlink);
        assert_eq!(settle(ChangeKind::Add, &gone), ChangeKind::Unlink);
        assert_eq!(settle(ChangeKind::Change, &present), ChangeKind::Change);
        assert_eq!(settle(ChangeKind::Unlink, &gone), ChangeKind::Unlink);
    }

    #[test]
    fn test_watched_path_filters_segments() {
        let policy = ExclusionPolicy::default();
        let root = Path::new("/data");
        let canonical = Path::new("/private/data");
        let watched = |p: &str| watched_path(&policy, root, canonical, Path::new(p));

        assert_eq!(watched("/data/project/.git/config"), None);
        assert_eq!(watched("/data/.hidden"), None);
        assert_eq!(watched("/elsewhere/a.txt"), None);
        assert_eq!(
            watched("/data/project/src/main.rs"),
            Some(PathBuf::from("/data/project/src/main.rs"))
        );
        assert_eq!(
            watched("/private/data/a.txt"),
            Some(PathBuf::from("/data/a.txt"))
        );
    }
}

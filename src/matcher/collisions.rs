//! Identifier-collision detection between a target and a control folder.
//!
//! A collision is two distinct source items resolving to the same
//! destination filename under the naming rule. Resolution is advisory: the
//! target item keeps the name, the control item gets a deterministic
//! `{stem}_{n}{ext}` suffix (n from 2). Nothing is executed here; the
//! proposals are meant to be staged.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// A source file plus the destination filename the naming rule gives it.
#[derive(Debug, Clone)]
pub struct NamedSource {
    pub source: PathBuf,
    pub dest_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Collision {
    /// The contested destination filename.
    pub dest_name: String,
    /// The item that keeps the name.
    pub target_source: PathBuf,
    /// The item queued for renaming.
    pub control_source: PathBuf,
    /// Deterministic rename proposal for the control item.
    pub proposed_control_name: String,
}

/// Extract the `idNNN` prefix of a harmonized filename, if present.
pub fn id_prefix(filename: &str) -> Option<&str> {
    if !filename.starts_with("id") {
        return None;
    }
    let underscore = filename.find('_')?;
    let digits = &filename[2..underscore];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(&filename[..underscore])
}

/// Map `idNNN` prefixes to the filenames carrying them, collision-aware.
pub fn id_mapping(files: &[String]) -> BTreeMap<String, Vec<String>> {
    let mut mapping: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for f in files {
        if let Some(prefix) = id_prefix(f) {
            mapping.entry(prefix.to_string()).or_default().push(f.clone());
        }
    }
    mapping
}

/// Suffix scheme for contested names: `photo.jpg` -> `photo_2.jpg`.
pub fn suffixed_name(name: &str, n: u32) -> String {
    let path = Path::new(name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| name.to_string());
    match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, n, ext.to_string_lossy()),
        None => format!("{}_{}", stem, n),
    }
}

/// First free suffixed variant of `name` given the names already taken.
fn free_suffix(name: &str, taken: &HashSet<String>) -> String {
    let mut n = 2;
    loop {
        let candidate = suffixed_name(name, n);
        if !taken.contains(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Detect destination-name collisions between the two folders.
///
/// Returned collisions are ordered by destination name; each proposal picks
/// the first free suffix given every destination name in play, so proposals
/// never collide with each other either.
pub fn detect_collisions(target: &[NamedSource], control: &[NamedSource]) -> Vec<Collision> {
    let target_by_dest: BTreeMap<&str, &NamedSource> = target
        .iter()
        .map(|ns| (ns.dest_name.as_str(), ns))
        .collect();

    let mut taken: HashSet<String> = target
        .iter()
        .chain(control.iter())
        .map(|ns| ns.dest_name.clone())
        .collect();

    let mut colliding: Vec<&NamedSource> = control
        .iter()
        .filter(|c| {
            target_by_dest
                .get(c.dest_name.as_str())
                .map(|t| t.source != c.source)
                .unwrap_or(false)
        })
        .collect();
    colliding.sort_by(|a, b| {
        a.dest_name
            .cmp(&b.dest_name)
            .then_with(|| a.source.cmp(&b.source))
    });

    let mut collisions = Vec::with_capacity(colliding.len());
    for c in colliding {
        let proposal = free_suffix(&c.dest_name, &taken);
        taken.insert(proposal.clone());
        collisions.push(Collision {
            dest_name: c.dest_name.clone(),
            target_source: target_by_dest[c.dest_name.as_str()].source.clone(),
            control_source: c.source.clone(),
            proposed_control_name: proposal,
        });
    }
    collisions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(source: &str, dest: &str) -> NamedSource {
        NamedSource {
            source: PathBuf::from(source),
            dest_name: dest.to_string(),
        }
    }

    #[test]
    fn id_prefix_parsing() {
        assert_eq!(id_prefix("id001_x.jpg"), Some("id001"));
        assert_eq!(id_prefix("id17_x.jpg"), Some("id17"));
        assert_eq!(id_prefix("idx_x.jpg"), None);
        assert_eq!(id_prefix("photo.jpg"), None);
        assert_eq!(id_prefix("id001.jpg"), None);
    }

    #[test]
    fn one_collision_target_untouched() {
        let target = vec![named("/t/id001_x.jpg", "id001_x.jpg")];
        let control = vec![named("/c/raw_x.jpg", "id001_x.jpg")];

        let collisions = detect_collisions(&target, &control);
        assert_eq!(collisions.len(), 1);
        let c = &collisions[0];
        assert_eq!(c.target_source, PathBuf::from("/t/id001_x.jpg"));
        assert_eq!(c.control_source, PathBuf::from("/c/raw_x.jpg"));
        assert_eq!(c.proposed_control_name, "id001_x_2.jpg");
    }

    #[test]
    fn no_collision_without_shared_dest() {
        let target = vec![named("/t/a.jpg", "id001_a.jpg")];
        let control = vec![named("/c/b.jpg", "id002_b.jpg")];
        assert!(detect_collisions(&target, &control).is_empty());
    }

    #[test]
    fn proposals_skip_taken_suffixes() {
        let target = vec![
            named("/t/x.jpg", "id001_x.jpg"),
            named("/t/x2.jpg", "id001_x_2.jpg"),
        ];
        let control = vec![named("/c/x.jpg", "id001_x.jpg")];

        let collisions = detect_collisions(&target, &control);
        assert_eq!(collisions[0].proposed_control_name, "id001_x_3.jpg");
    }

    #[test]
    fn proposals_do_not_collide_with_each_other() {
        let target = vec![named("/t/x.jpg", "id001_x.jpg")];
        let control = vec![
            named("/c/one/x.jpg", "id001_x.jpg"),
            named("/c/two/x.jpg", "id001_x.jpg"),
        ];

        let collisions = detect_collisions(&target, &control);
        assert_eq!(collisions.len(), 2);
        assert_ne!(
            collisions[0].proposed_control_name,
            collisions[1].proposed_control_name
        );
    }

    #[test]
    fn id_mapping_groups_collisions() {
        let files = vec![
            "id001_a.jpg".to_string(),
            "id001_b.jpg".to_string(),
            "id002_c.jpg".to_string(),
            "loose.jpg".to_string(),
        ];
        let mapping = id_mapping(&files);
        assert_eq!(mapping.get("id001").map(Vec::len), Some(2));
        assert_eq!(mapping.get("id002").map(Vec::len), Some(1));
        assert_eq!(mapping.len(), 2);
    }
}

//! Path and depth derivation
//!
//! Pure functions over [`Materialized`] values. A node's path is its parent's
//! lineage, where the lineage of a root is `/` + key + `/` and the lineage of
//! any other node is its path + key + `/`:
//!
//! ```text
//! R   path ""        depth 0   lineage "/R/"
//! C   path "/R/"     depth 1   lineage "/R/C/"
//! G   path "/R/C/"   depth 2   lineage "/R/C/G/"
//! ```

use crate::models::{Materialized, NodeKey, PATH_SEPARATOR};

/// Prefix shared by every descendant of `node`
pub fn lineage<T: Materialized + ?Sized>(node: &T) -> String {
    let path = node.path();
    let mut lineage = String::with_capacity(path.len() + node.key().len() + 2);

    if path.is_empty() {
        lineage.push(PATH_SEPARATOR);
    } else {
        lineage.push_str(path);
    }
    lineage.push_str(node.key());
    lineage.push(PATH_SEPARATOR);
    lineage
}

/// Path a child of `parent` must store (`""` for roots)
///
/// The parent's own path must already be correct.
pub fn derive_path<T: Materialized>(parent: Option<&T>) -> String {
    parent.map(lineage).unwrap_or_default()
}

/// Depth of a child of `parent` (`0` for roots)
pub fn derive_depth<T: Materialized>(parent: Option<&T>) -> u32 {
    parent.map_or(0, |p| p.depth() + 1)
}

/// Depth encoded in a path: one level per non-empty segment
pub fn depth_from_path(path: &str) -> u32 {
    path.split(PATH_SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .count() as u32
}

/// Ancestor keys encoded in a path, root first
pub fn ancestor_keys(path: &str) -> Vec<NodeKey> {
    path.split(PATH_SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Write the derived path and depth onto `node`
///
/// Returns true when either value changed.
pub fn apply<T: Materialized>(node: &mut T, parent: Option<&T>) -> bool {
    let path = derive_path(parent);
    let depth = derive_depth(parent);
    let changed = node.path() != path || node.depth() != depth;

    node.set_path(path);
    node.set_depth(depth);
    changed
}

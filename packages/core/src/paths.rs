//! Materialized Path Codec
//!
//! Pure functions for deriving and parsing materialized paths. A path is the
//! separator-joined chain of ancestor names, always beginning with the
//! separator: root entities live at `/name`, descendants at
//! `parent_path + "/" + name`.
//!
//! Nothing in this module touches the database; path persistence and cascade
//! semantics live in [`crate::db`].

/// Path separator character. Entity names must never contain it.
pub const SEPARATOR: char = '/';

/// Derive an entity's materialized path from its name and its parent's path.
///
/// With no parent the entity is a root and lives at `/name`.
///
/// # Examples
///
/// ```
/// use entitytree_core::paths::derive_path;
///
/// assert_eq!(derive_path("Rocket", None), "/Rocket");
/// assert_eq!(derive_path("Stage1", Some("/Rocket")), "/Rocket/Stage1");
/// ```
pub fn derive_path(name: &str, parent_path: Option<&str>) -> String {
    match parent_path {
        Some(parent) => format!("{parent}{SEPARATOR}{name}"),
        None => format!("{SEPARATOR}{name}"),
    }
}

/// Return the path with its last segment removed, or `None` for a
/// single-segment (root) path.
///
/// Inverse of [`derive_path`]: `parent_path_of(derive_path(name, Some(p)))`
/// is always `Some(p)`.
pub fn parent_path_of(path: &str) -> Option<&str> {
    let idx = path.rfind(SEPARATOR)?;
    if idx == 0 {
        return None;
    }
    Some(&path[..idx])
}

/// Normalize a caller-supplied path reference into canonical form: stray
/// leading/trailing separators stripped, then exactly one leading separator.
///
/// `"Rocket/Stage1/"` and `"//Rocket/Stage1"` both normalize to
/// `"/Rocket/Stage1"`.
pub fn normalize(raw: &str) -> String {
    format!("{SEPARATOR}{}", raw.trim_matches(SEPARATOR))
}

/// True when `candidate` is `ancestor` itself or lies inside its subtree.
///
/// Segment-exact: `/Rocket1` is not within `/Rocket`.
pub fn is_self_or_descendant(candidate: &str, ancestor: &str) -> bool {
    candidate == ancestor
        || (candidate.len() > ancestor.len()
            && candidate.starts_with(ancestor)
            && candidate.as_bytes()[ancestor.len()] == SEPARATOR as u8)
}

/// Escape SQL `LIKE` metacharacters in a path so it can be used as a literal
/// prefix in a `LIKE ? ESCAPE '\'` pattern. Names may legally contain `%`
/// and `_`, which would otherwise widen the scan.
pub fn like_escape(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `LIKE` pattern matching strict descendants of `path` (never `path` itself,
/// never sibling paths that merely share a textual prefix).
pub fn descendant_like_pattern(path: &str) -> String {
    format!("{}{SEPARATOR}%", like_escape(path))
}

//! Lexical path cleaning.

use std::path::{Component, Path, PathBuf};

/// Returns the shortest path equivalent to `path` by purely lexical processing.
///
/// `.` components are dropped, `..` removes the preceding normal component,
/// and a `..` that would climb above the root of an absolute path is dropped.
/// Leading `..` components of a relative path are kept. An empty result
/// becomes `.`. The filesystem is never consulted, so symlinks are not
/// resolved.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }

    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().map(|c| c.as_os_str()).collect()
}

/// Reports whether `path` stays inside `root` once both are cleaned.
///
/// A root of `.` (or `./`, or empty) contains every relative path that does
/// not start with `..`.
pub fn is_within(path: &Path, root: &Path) -> bool {
    let path = clean_path(path);
    let root = clean_path(root);
    if root == Path::new(".") {
        return path.is_relative()
            && !matches!(path.components().next(), Some(Component::ParentDir));
    }
    path.starts_with(&root)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean(s: &str) -> String {
        clean_path(Path::new(s)).to_string_lossy().into_owned()
    }

    #[test]
    fn drops_cur_dir_and_duplicate_separators() {
        assert_eq!(clean("a/./b//c/"), "a/b/c");
        assert_eq!(clean("./a"), "a");
    }

    #[test]
    fn parent_dir_pops_normal_component() {
        assert_eq!(clean("charts/net/../dns/fig.svg"), "charts/dns/fig.svg");
        assert_eq!(clean("a/b/../../c"), "c");
    }

    #[test]
    fn parent_dir_cannot_climb_above_root() {
        assert_eq!(clean("/../etc"), "/etc");
        assert_eq!(clean("/a/../../b"), "/b");
    }

    #[test]
    fn relative_leading_parent_dirs_are_kept() {
        assert_eq!(clean("../a/../../b"), "../../b");
    }

    #[test]
    fn empty_results_become_dot() {
        assert_eq!(clean("a/.."), ".");
        assert_eq!(clean(""), ".");
    }

    #[test]
    fn root_stays_root() {
        assert_eq!(clean("/"), "/");
        assert_eq!(clean("/./"), "/");
    }

    #[test]
    fn within_absolute_root() {
        let root = Path::new("/srv/charts");
        assert!(is_within(Path::new("/srv/charts/net/fig.svg"), root));
        assert!(is_within(Path::new("/srv/charts/net/../fig.svg"), root));
        assert!(!is_within(Path::new("/srv/charts/../secret.svg"), root));
        assert!(!is_within(Path::new("/srv/chartsx/fig.svg"), root));
    }

    #[test]
    fn within_dot_root() {
        for root in [".", "./", ""] {
            let root = Path::new(root);
            assert!(is_within(Path::new("./net/fig.svg"), root));
            assert!(is_within(Path::new("fig.svg"), root));
            assert!(!is_within(Path::new("../fig.svg"), root));
            assert!(!is_within(Path::new("net/../../fig.svg"), root));
            assert!(!is_within(Path::new("/etc/fig.svg"), root));
        }
    }

    #[test]
    fn within_relative_root() {
        let root = Path::new("./charts");
        assert!(is_within(Path::new("charts/a/fig.svg"), root));
        assert!(!is_within(Path::new("charts/../fig.svg"), root));
    }
}

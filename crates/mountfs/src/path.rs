//! Lexical path helpers.
//!
//! All routing works on forward-slash strings. These helpers never touch
//! the filesystem.

use std::borrow::Cow;
use std::path::{MAIN_SEPARATOR, Path};

/// Shortest equivalent path by purely lexical processing.
///
/// Collapses repeated separators, drops `.` elements, resolves `..` against
/// the preceding element and removes trailing separators. `..` above the
/// root of an absolute path is dropped. An empty result becomes `"."`.
pub fn clean(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let rooted = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.last().is_some_and(|last| *last != "..") {
                    parts.pop();
                } else if !rooted {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if rooted {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Replace the platform separator with `/`.
pub fn to_slash(path: &str) -> Cow<'_, str> {
    if MAIN_SEPARATOR == '/' {
        Cow::Borrowed(path)
    } else {
        Cow::Owned(path.replace(MAIN_SEPARATOR, "/"))
    }
}

/// Clean, slash-separated form of a path as used for routing.
pub fn normalize(path: &Path) -> String {
    let lossy = path.to_string_lossy();
    clean(&to_slash(&lossy))
}

/// Like [`normalize`], but relative paths are taken from the root, so the
/// result always starts with `/`.
pub fn rooted(path: &Path) -> String {
    let lossy = path.to_string_lossy();
    let slashed = to_slash(&lossy);
    if slashed.starts_with('/') {
        clean(&slashed)
    } else {
        clean(&format!("/{slashed}"))
    }
}

/// Join a rooted `child` below a mount `prefix`. Both must be cleaned and
/// start with `/`.
pub fn join_rooted(prefix: &str, child: &str) -> String {
    match (prefix, child) {
        (_, "/") => prefix.to_string(),
        ("/", _) => child.to_string(),
        _ => format!("{prefix}{child}"),
    }
}

/// True if rooted `ancestor` is `path` or one of its parents.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    ancestor == "/"
        || path
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}

/// Last element of a slash-separated path.
///
/// Trailing separators are ignored; `""` gives `"."` and a path of only
/// separators gives `"/"`.
pub fn base_name(path: &str) -> &str {
    if path.is_empty() {
        return ".";
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/";
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean() {
        assert_eq!(clean(""), ".");
        assert_eq!(clean("/"), "/");
        assert_eq!(clean("//a//b/"), "/a/b");
        assert_eq!(clean("/a/./b/../c"), "/a/c");
        assert_eq!(clean("/../a"), "/a");
        assert_eq!(clean("a/../.."), "..");
        assert_eq!(clean("a/b/.."), "a");
        assert_eq!(clean("./"), ".");
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/data//x.txt")), "/data/x.txt");
        assert_eq!(normalize(Path::new("")), ".");
    }

    #[test]
    fn test_rooted() {
        assert_eq!(rooted(Path::new("")), "/");
        assert_eq!(rooted(Path::new("a/b")), "/a/b");
        assert_eq!(rooted(Path::new("/a/../..")), "/");
    }

    #[test]
    fn test_join_rooted() {
        assert_eq!(join_rooted("/data", "/x/y"), "/data/x/y");
        assert_eq!(join_rooted("/", "/x"), "/x");
        assert_eq!(join_rooted("/data", "/"), "/data");
        assert_eq!(join_rooted("/", "/"), "/");
    }

    #[test]
    fn test_is_within() {
        assert!(is_within("/a/b", "/a"));
        assert!(is_within("/a/b", "/a/b"));
        assert!(is_within("/a/b", "/"));
        assert!(!is_within("/ab", "/a"));
        assert!(!is_within("/a", "/a/b"));
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("/a/b.txt"), "b.txt");
        assert_eq!(base_name("a/b/"), "b");
        assert_eq!(base_name("x"), "x");
        assert_eq!(base_name("///"), "/");
        assert_eq!(base_name(""), ".");
    }
}

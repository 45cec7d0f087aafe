//! Translation between share-relative paths and store paths.

use crate::context::MountContext;

/// Separator used inside store paths.
pub const STORE_SEPARATOR: char = '/';

/// Separator used by the protocol layer.
pub const PROTOCOL_SEPARATOR: char = '\\';

/// Build the full store path for a share-relative path.
///
/// The result is not validated; the store rejects paths it cannot resolve.
///
/// # Examples
/// ```
/// use avmfs_core::{build_store_path, MountContext, VERSION_HEAD};
/// let ctx = MountContext::new("main:/www", VERSION_HEAD);
/// assert_eq!(build_store_path(&ctx, ""), "main:/www/");
/// assert_eq!(build_store_path(&ctx, "docs\\a.txt"), "main:/www/docs/a.txt");
/// assert_eq!(build_store_path(&ctx, "\\docs"), "main:/www/docs");
/// ```
pub fn build_store_path(ctx: &MountContext, path: &str) -> String {
    let mut store_path = String::with_capacity(ctx.store_path().len() + path.len() + 1);
    store_path.push_str(ctx.store_path());

    if path.is_empty() {
        store_path.push(STORE_SEPARATOR);
    } else {
        if !path.starts_with(PROTOCOL_SEPARATOR) {
            store_path.push(STORE_SEPARATOR);
        }
        store_path.extend(path.chars().map(|c| {
            if c == PROTOCOL_SEPARATOR {
                STORE_SEPARATOR
            } else {
                c
            }
        }));
    }
    store_path
}

/// Split a share-relative path into its parent path and final name.
///
/// Either separator is accepted. A name directly under the root gets the
/// parent `"\"`; a bare name gets an empty parent.
pub fn split_path(path: &str) -> (String, String) {
    let is_sep = |c: char| c == PROTOCOL_SEPARATOR || c == STORE_SEPARATOR;
    let trimmed = path.trim_end_matches(is_sep);

    if trimmed.is_empty() {
        // Root, or nothing at all
        let parent = if path.is_empty() {
            String::new()
        } else {
            PROTOCOL_SEPARATOR.to_string()
        };
        return (parent, String::new());
    }

    match trimmed.rfind(is_sep) {
        Some(0) => (PROTOCOL_SEPARATOR.to_string(), trimmed[1..].to_string()),
        Some(pos) => (trimmed[..pos].to_string(), trimmed[pos + 1..].to_string()),
        None => (String::new(), trimmed.to_string()),
    }
}

/// Join a store root such as `main:/` with a `/`-separated relative path.
pub fn join_store_path(base: &str, relative: &str) -> String {
    let relative = relative.trim_matches(STORE_SEPARATOR);
    if relative.is_empty() {
        if base.ends_with(STORE_SEPARATOR) {
            base.to_string()
        } else {
            format!("{}{}", base, STORE_SEPARATOR)
        }
    } else {
        format!(
            "{}{}{}",
            base.trim_end_matches(STORE_SEPARATOR),
            STORE_SEPARATOR,
            relative
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::VERSION_HEAD;

    fn ctx() -> MountContext {
        MountContext::new("main:/", VERSION_HEAD)
    }

    #[test]
    fn test_build_empty_path() {
        assert_eq!(build_store_path(&ctx(), ""), "main://");
        let www = MountContext::new("main:/www", VERSION_HEAD);
        assert_eq!(build_store_path(&www, ""), "main:/www/");
    }

    #[test]
    fn test_build_adds_separator() {
        let www = MountContext::new("main:/www", VERSION_HEAD);
        for rel in ["a", "docs\\a.txt", "x\\y\\z", "docs/a.txt"] {
            let expected = format!("main:/www/{}", rel.replace('\\', "/"));
            assert_eq!(build_store_path(&www, rel), expected);
        }
    }

    #[test]
    fn test_build_no_extra_separator() {
        let www = MountContext::new("main:/www", VERSION_HEAD);
        assert_eq!(build_store_path(&www, "\\docs\\a.txt"), "main:/www/docs/a.txt");
        assert_eq!(build_store_path(&www, "\\"), "main:/www/");
    }

    #[test]
    fn test_split_path() {
        assert_eq!(
            split_path("\\docs\\readme.txt"),
            ("\\docs".to_string(), "readme.txt".to_string())
        );
        assert_eq!(
            split_path("\\readme.txt"),
            ("\\".to_string(), "readme.txt".to_string())
        );
        assert_eq!(
            split_path("readme.txt"),
            (String::new(), "readme.txt".to_string())
        );
        assert_eq!(
            split_path("docs/*.txt"),
            ("docs".to_string(), "*.txt".to_string())
        );
        assert_eq!(
            split_path("\\docs\\sub\\"),
            ("\\docs".to_string(), "sub".to_string())
        );
        assert_eq!(split_path("\\"), ("\\".to_string(), String::new()));
        assert_eq!(split_path(""), (String::new(), String::new()));
    }

    #[test]
    fn test_join_store_path() {
        assert_eq!(join_store_path("main:/", ""), "main:/");
        assert_eq!(join_store_path("main:/", "docs/a.txt"), "main:/docs/a.txt");
        assert_eq!(join_store_path("main:/www", "/docs/"), "main:/www/docs");
        assert_eq!(join_store_path("main:/www", ""), "main:/www/");
    }
}

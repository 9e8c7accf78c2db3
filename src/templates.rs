//! Template lookup
//!
//! Rendering is left to the caller: this module only answers *which file*
//! a template name refers to. A query such as `posts/index` is resolved by
//! asking each [`Finder`] in turn, the first answer wins.
//!
//! # Examples
//!
//! ```
//! use maker_conn::templates::{find_template, Finder, PathFinder};
//! use std::sync::Arc;
//!
//! let dir = tempfile::tempdir().unwrap();
//! std::fs::create_dir(dir.path().join("posts")).unwrap();
//! std::fs::write(dir.path().join("posts/index.html"), "<ul></ul>").unwrap();
//!
//! let finders: Vec<Arc<dyn Finder>> = vec![Arc::new(PathFinder::new(dir.path()))];
//!
//! let template = find_template(&finders, "posts/index").unwrap();
//! assert_eq!(template.format.as_deref(), Some("html"));
//!
//! assert!(find_template(&finders, "posts/show").is_err());
//! ```

use crate::errors::TemplateNotFound;
use std::{
    fs,
    path::{Component, Path, PathBuf},
    sync::Arc,
};

/// A template located by a [`Finder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    /// The query that found it.
    pub key: String,
    pub path: PathBuf,
    /// Everything after the first dot of the file name, `html.tera` for
    /// `index.html.tera`.
    pub format: Option<String>,
}

/// Knows where some templates live.
pub trait Finder: Send + Sync {
    fn find(&self, query: &str) -> Option<Template>;

    /// Where this finder looks, for error messages.
    fn root(&self) -> String;
}

/// Finds templates in a directory.
///
/// `posts/index` matches `posts/index` or `posts/index.<anything>` under
/// the root. When several files match, the first one in byte order of
/// their names is used. Queries leaving the root are never matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathFinder {
    root: PathBuf,
}

impl PathFinder {
    #[inline]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Finder for PathFinder {
    fn find(&self, query: &str) -> Option<Template> {
        let relative = Path::new(query);
        if !relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
        {
            return None;
        }

        let stem = relative.file_name()?.to_str()?;
        let dir = match relative.parent() {
            Some(parent) => self.root.join(parent),
            None => self.root.clone(),
        };

        let mut matches: Vec<(String, PathBuf)> = fs::read_dir(dir)
            .ok()?
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|kind| kind.is_file()))
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let is_match = name == stem
                    || name
                        .strip_prefix(stem)
                        .is_some_and(|rest| rest.starts_with('.'));
                is_match.then(|| (name, entry.path()))
            })
            .collect();
        matches.sort();

        let (name, path) = matches.into_iter().next()?;
        Some(Template {
            key: query.to_owned(),
            path,
            format: name.split_once('.').map(|(_, format)| format.to_owned()),
        })
    }

    fn root(&self) -> String {
        self.root.to_string_lossy().into_owned()
    }
}

/// Asks every finder for `query`, in order.
///
/// # Errors
/// [`TemplateNotFound`] listing the roots of every finder when none of
/// them knows the template.
pub fn find_template(finders: &[Arc<dyn Finder>], query: &str) -> Result<Template, TemplateNotFound> {
    finders
        .iter()
        .find_map(|finder| finder.find(query))
        .ok_or_else(|| TemplateNotFound {
            query: query.to_owned(),
            paths: finders.iter().map(|finder| finder.root()).collect(),
        })
}

#[cfg(test)]
mod templates_tests {
    use super::*;
    use tempfile::TempDir;

    fn tree(files: &[&str]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, file).unwrap();
        }
        dir
    }

    #[test]
    fn path_finder() {
        let dir = tree(&[
            "index.html",
            "layout",
            "posts/show.json",
            "posts/show.html.tera",
            "posts/showcase.html",
            "posts/edit/form.html",
        ]);
        let finder = PathFinder::new(dir.path());

        let cases = [
            ("index", Some(("index.html", Some("html")))),
            ("layout", Some(("layout", None))),
            ("posts/show", Some(("posts/show.html.tera", Some("html.tera")))),
            ("posts/showcase", Some(("posts/showcase.html", Some("html")))),
            ("posts/edit", None),
            ("posts/sho", None),
            ("missing/index", None),
            ("../index", None),
            ("posts/../index", None),
            ("", None),
        ];

        for (query, expected) in cases {
            let found = finder.find(query);
            let found = found
                .as_ref()
                .map(|t| (t.path.strip_prefix(dir.path()).unwrap(), t.format.as_deref()));
            let expected = expected.map(|(path, format)| (Path::new(path), format));

            assert_eq!(found, expected, "{query:?}");
        }
    }

    #[test]
    fn first_finder_wins() {
        let app = tree(&["index.html"]);
        let lib = tree(&["index.html", "shared.html"]);
        let finders: Vec<Arc<dyn Finder>> = vec![
            Arc::new(PathFinder::new(app.path())),
            Arc::new(PathFinder::new(lib.path())),
        ];

        assert!(find_template(&finders, "index").unwrap().path.starts_with(app.path()));
        assert!(find_template(&finders, "shared").unwrap().path.starts_with(lib.path()));

        let err = find_template(&finders, "nope").unwrap_err();
        assert_eq!(err.query, "nope");
        assert_eq!(err.paths, [finders[0].root(), finders[1].root()]);
    }
}

//! Safe filesystem resolution.
//!
//! Turns a matched location's root (or alias) plus the remaining request
//! path into an absolute filesystem path that is provably contained inside
//! the root, or an index-file fallback for directories. The containment
//! check compares whole path segments, so a root of `/var/www` is never
//! satisfied by `/var/wwwx`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::http::status::HttpStatus;
use crate::routing::path;

pub const DEFAULT_INDEX_FILE: &str = "index.html";

/// Tried in order when a directory is requested, after the configured index.
const INDEX_FALLBACKS: [&str; 3] = ["index.htm", "index.php", "default.html"];

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    // config-class: the server must refuse to start with such a root
    #[error("root directory must be absolute: {0}")]
    RootNotAbsolute(PathBuf),

    #[error("root directory does not exist: {0}")]
    RootNotFound(PathBuf),

    #[error("root must be a directory: {0}")]
    RootNotDirectory(PathBuf),

    // request-class: recoverable, mapped to an HTTP status per request
    #[error("invalid request path: {0}")]
    InvalidRequest(String),

    #[error("path traversal outside root directory: {0}")]
    Traversal(String),

    #[error("path does not exist: {0}")]
    NotFound(PathBuf),
}

impl ResolveError {
    /// Fatal configuration errors versus recoverable per-request errors.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ResolveError::RootNotAbsolute(_)
                | ResolveError::RootNotFound(_)
                | ResolveError::RootNotDirectory(_)
        )
    }

    pub fn status(&self) -> HttpStatus {
        match self {
            ResolveError::RootNotAbsolute(_)
            | ResolveError::RootNotFound(_)
            | ResolveError::RootNotDirectory(_) => HttpStatus::InternalServerError,
            ResolveError::InvalidRequest(_) => HttpStatus::BadRequest,
            ResolveError::Traversal(_) => HttpStatus::Forbidden,
            ResolveError::NotFound(_) => HttpStatus::NotFound,
        }
    }
}

/// Stateless resolution algorithm; every call stands alone.
pub struct PathResolver;

impl PathResolver {
    /// Resolves a request path against a root directory.
    ///
    /// Steps: validate the root, normalize the request, join and normalize
    /// the candidate, check containment, check existence, and for
    /// directories try the index candidates before settling on the
    /// directory itself.
    pub fn resolve(
        requested: &str,
        root: &Path,
        index_file: &str,
    ) -> Result<PathBuf, ResolveError> {
        Self::validate_root(root)?;

        if requested.contains('\0') {
            return Err(ResolveError::InvalidRequest(requested.to_string()));
        }
        let request = path::normalize_request(requested);
        if path::has_traversal(&request) {
            return Err(ResolveError::Traversal(requested.to_string()));
        }

        let normalized_root = path::normalize_lexical(root);
        let candidate = path::normalize_lexical(&path::join_under_root(&normalized_root, &request));
        if !path::is_contained(&normalized_root, &candidate) {
            return Err(ResolveError::Traversal(requested.to_string()));
        }

        let metadata =
            fs::metadata(&candidate).map_err(|_| ResolveError::NotFound(candidate.clone()))?;
        if metadata.is_dir() {
            Ok(Self::resolve_directory(candidate, index_file))
        } else {
            Ok(candidate)
        }
    }

    /// Resolves against a list of `(location prefix, location root)` pairs,
    /// picking the longest matching prefix and stripping it before
    /// delegating — the same precedence rule the location lookup uses.
    pub fn resolve_with_locations(
        requested: &str,
        server_root: &Path,
        mappings: &[(String, PathBuf)],
    ) -> Result<PathBuf, ResolveError> {
        let best = mappings
            .iter()
            .filter(|(prefix, _)| requested.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len());

        match best {
            Some((prefix, location_root)) => {
                let mut remainder = &requested[prefix.len()..];
                if remainder.is_empty() {
                    remainder = "/";
                }
                Self::resolve(remainder, location_root, DEFAULT_INDEX_FILE)
            }
            None => Self::resolve(requested, server_root, DEFAULT_INDEX_FILE),
        }
    }

    /// Fatal at startup when violated; also re-checked on every call since
    /// resolution is stateless.
    pub fn validate_root(root: &Path) -> Result<(), ResolveError> {
        if !root.is_absolute() {
            return Err(ResolveError::RootNotAbsolute(root.to_path_buf()));
        }
        let metadata =
            fs::metadata(root).map_err(|_| ResolveError::RootNotFound(root.to_path_buf()))?;
        if !metadata.is_dir() {
            return Err(ResolveError::RootNotDirectory(root.to_path_buf()));
        }
        Ok(())
    }

    fn resolve_directory(directory: PathBuf, index_file: &str) -> PathBuf {
        for candidate in std::iter::once(index_file).chain(INDEX_FALLBACKS) {
            let indexed = directory.join(candidate);
            if indexed.is_file() {
                return indexed;
            }
        }
        directory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    fn site() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("images")).unwrap();
        let mut file = File::create(dir.path().join("images/cat.png")).unwrap();
        file.write_all(b"png").unwrap();
        File::create(dir.path().join("index.html")).unwrap();
        dir
    }

    #[test]
    fn resolves_plain_file() {
        let dir = site();
        let resolved =
            PathResolver::resolve("/images/cat.png", dir.path(), DEFAULT_INDEX_FILE).unwrap();
        assert_eq!(resolved, dir.path().join("images/cat.png"));
    }

    #[test]
    fn traversal_is_rejected() {
        let dir = site();
        let err =
            PathResolver::resolve("/../../etc/passwd", dir.path(), DEFAULT_INDEX_FILE).unwrap_err();
        assert!(matches!(err, ResolveError::Traversal(_)));
        assert!(!err.is_config_error());
        assert_eq!(err.status(), HttpStatus::Forbidden);
    }

    #[test]
    fn dotdot_inside_root_is_fine() {
        let dir = site();
        let resolved =
            PathResolver::resolve("/images/../index.html", dir.path(), DEFAULT_INDEX_FILE)
                .unwrap();
        assert_eq!(resolved, dir.path().join("index.html"));
    }

    #[test]
    fn missing_target_is_not_found() {
        let dir = site();
        let err = PathResolver::resolve("/nope.html", dir.path(), DEFAULT_INDEX_FILE).unwrap_err();
        assert!(matches!(err, ResolveError::NotFound(_)));
        assert_eq!(err.status(), HttpStatus::NotFound);
    }

    #[test]
    fn directory_falls_back_to_index() {
        let dir = site();
        let resolved = PathResolver::resolve("/", dir.path(), DEFAULT_INDEX_FILE).unwrap();
        assert_eq!(resolved, dir.path().join("index.html"));
    }

    #[test]
    fn directory_without_configured_index_tries_fallbacks() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("index.htm")).unwrap();
        let resolved = PathResolver::resolve("/", dir.path(), DEFAULT_INDEX_FILE).unwrap();
        assert_eq!(resolved, dir.path().join("index.htm"));
    }

    #[test]
    fn directory_without_any_index_resolves_to_itself() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let resolved = PathResolver::resolve("/sub", dir.path(), DEFAULT_INDEX_FILE).unwrap();
        assert_eq!(resolved, dir.path().join("sub"));
    }

    #[test]
    fn empty_request_means_root() {
        let dir = site();
        let resolved = PathResolver::resolve("", dir.path(), DEFAULT_INDEX_FILE).unwrap();
        assert_eq!(resolved, dir.path().join("index.html"));
    }

    #[test]
    fn relative_root_is_a_config_error() {
        let err =
            PathResolver::resolve("/x", Path::new("relative/root"), DEFAULT_INDEX_FILE)
                .unwrap_err();
        assert!(matches!(err, ResolveError::RootNotAbsolute(_)));
        assert!(err.is_config_error());
    }

    #[test]
    fn missing_root_is_a_config_error() {
        let err = PathResolver::resolve("/x", Path::new("/no/such/root"), DEFAULT_INDEX_FILE)
            .unwrap_err();
        assert!(matches!(err, ResolveError::RootNotFound(_)));
        assert!(err.is_config_error());
    }

    #[test]
    fn containment_survives_sibling_roots() {
        // /tmp/xyz must not leak into /tmp/xyzbackup via a string-prefix test
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("www");
        fs::create_dir(&root).unwrap();
        let sibling = dir.path().join("wwwbackup");
        fs::create_dir(&sibling).unwrap();
        File::create(sibling.join("secret.txt")).unwrap();

        let err = PathResolver::resolve("/../wwwbackup/secret.txt", &root, DEFAULT_INDEX_FILE)
            .unwrap_err();
        assert!(matches!(err, ResolveError::Traversal(_)));
    }

    #[test]
    fn resolve_with_locations_prefers_longest_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let general = dir.path().join("www");
        let media = dir.path().join("media");
        fs::create_dir(&general).unwrap();
        fs::create_dir(&media).unwrap();
        File::create(general.join("page.html")).unwrap();
        File::create(media.join("cat.png")).unwrap();

        let mappings = vec![
            ("/".to_string(), general.clone()),
            ("/images/".to_string(), media.clone()),
        ];

        let resolved =
            PathResolver::resolve_with_locations("/images/cat.png", &general, &mappings).unwrap();
        assert_eq!(resolved, media.join("cat.png"));

        let resolved =
            PathResolver::resolve_with_locations("/page.html", &general, &mappings).unwrap();
        assert_eq!(resolved, general.join("page.html"));
    }
}

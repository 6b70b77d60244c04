//! Location blocks.
//!
//! A [`LocationConfig`] is the finest-grained routing unit inside a virtual
//! server, analogous to an nginx `location {}` block. It owns how a URI
//! pattern is matched ([`LocationMatch`]), which methods are allowed, how the
//! matched path maps to disk (`root` vs `alias`), and the per-location
//! sub-configs for uploads, CGI and redirects.

use std::path::{Path, PathBuf};

use indexmap::{IndexMap, IndexSet};
use regex::{Regex, RegexBuilder};

use crate::config::error::ConfigError;
use crate::config::size::Size;
use crate::http::HttpMethod;
use crate::routing::route::HandlerType;

/// Hard ceiling for any body-size directive.
pub const MAX_CLIENT_BODY_SIZE: Size = Size::from_gigabytes(1);
const MAX_BODY_BUFFER_SIZE: Size = Size::from_megabytes(16);
const DEFAULT_CLIENT_BODY_SIZE: Size = Size::from_megabytes(1);
const MAX_UPLOAD_FILENAME_LEN: usize = 255;

/// How a location pattern is matched against a request path.
///
/// Built from nginx modifier syntax: `= /path` exact, `/path` prefix,
/// `~ pat` case-sensitive regex, `~* pat` case-insensitive regex, `@name`
/// named (exact, only reachable internally). Regex patterns are compiled
/// right here, once; a location carries no lazily-built state afterwards.
#[derive(Debug, Clone)]
pub enum LocationMatch {
    Exact(String),
    Prefix(String),
    Regex {
        source: String,
        case_insensitive: bool,
        compiled: Regex,
    },
}

impl LocationMatch {
    pub fn parse(pattern: &str) -> Result<Self, ConfigError> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::EmptyLocationPath);
        }

        if let Some(name) = trimmed.strip_prefix('@') {
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(ConfigError::InvalidLocationPath(trimmed.to_string()));
            }
            return Ok(LocationMatch::Exact(trimmed.to_string()));
        }

        if let Some(rest) = trimmed.strip_prefix("~*") {
            return Self::compile(rest.trim(), true);
        }
        if let Some(rest) = trimmed.strip_prefix('~') {
            return Self::compile(rest.trim(), false);
        }
        if let Some(rest) = trimmed.strip_prefix('=') {
            let path = rest.trim();
            if !path.starts_with('/') {
                return Err(ConfigError::InvalidLocationPath(trimmed.to_string()));
            }
            return Ok(LocationMatch::Exact(path.to_string()));
        }
        // "^~" disables regex checking for a prefix in nginx; the prefix
        // semantics themselves are unchanged.
        let path = trimmed.strip_prefix("^~").map(str::trim).unwrap_or(trimmed);
        if !path.starts_with('/') {
            return Err(ConfigError::InvalidLocationPath(trimmed.to_string()));
        }
        Ok(LocationMatch::Prefix(path.to_string()))
    }

    fn compile(source: &str, case_insensitive: bool) -> Result<Self, ConfigError> {
        if source.is_empty() {
            return Err(ConfigError::EmptyLocationPath);
        }
        let compiled = RegexBuilder::new(source)
            .case_insensitive(case_insensitive)
            .build()
            .map_err(|e| ConfigError::InvalidRegexPattern {
                pattern: source.to_string(),
                source: e,
            })?;
        Ok(LocationMatch::Regex {
            source: source.to_string(),
            case_insensitive,
            compiled,
        })
    }

    pub fn matches(&self, request_path: &str) -> bool {
        match self {
            LocationMatch::Exact(path) => request_path == path,
            LocationMatch::Prefix(prefix) => request_path.starts_with(prefix),
            LocationMatch::Regex { compiled, .. } => compiled.is_match(request_path),
        }
    }

    /// The pattern text, modifier stripped.
    pub fn pattern(&self) -> &str {
        match self {
            LocationMatch::Exact(path) | LocationMatch::Prefix(path) => path,
            LocationMatch::Regex { source, .. } => source,
        }
    }

    pub fn is_named(&self) -> bool {
        matches!(self, LocationMatch::Exact(path) if path.starts_with('@'))
    }
}

/// Two matchers collide when they would claim the same `(pattern, type)`.
impl PartialEq for LocationMatch {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (LocationMatch::Exact(a), LocationMatch::Exact(b)) => a == b,
            (LocationMatch::Prefix(a), LocationMatch::Prefix(b)) => a == b,
            (
                LocationMatch::Regex {
                    source: a,
                    case_insensitive: ai,
                    ..
                },
                LocationMatch::Regex {
                    source: b,
                    case_insensitive: bi,
                    ..
                },
            ) => a == b && ai == bi,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    directory: PathBuf,
    max_file_size: Option<Size>,
    max_total_size: Option<Size>,
    allowed_extensions: Vec<String>,
}

impl UploadConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            max_file_size: None,
            max_total_size: None,
            allowed_extensions: Vec::new(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn set_max_file_size(&mut self, size: Size) {
        self.max_file_size = Some(size);
    }

    pub fn set_max_total_size(&mut self, size: Size) {
        self.max_total_size = Some(size);
    }

    pub fn allow_extension(&mut self, extension: impl Into<String>) {
        self.allowed_extensions.push(extension.into());
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.directory.as_os_str().is_empty() {
            return Err(ConfigError::InvalidUploadConfig(
                "upload directory cannot be empty".to_string(),
            ));
        }
        if !self.directory.is_absolute() {
            return Err(ConfigError::InvalidUploadConfig(format!(
                "upload directory must be absolute: {}",
                self.directory.display()
            )));
        }
        Ok(())
    }

    pub fn is_size_allowed(&self, size: u64) -> bool {
        self.max_file_size.map_or(true, |max| size <= max.bytes())
    }

    pub fn is_filename_allowed(&self, filename: &str) -> bool {
        !filename.is_empty()
            && filename.len() <= MAX_UPLOAD_FILENAME_LEN
            && filename != "."
            && filename != ".."
            && !filename
                .chars()
                .any(|c| c == '/' || c == '\\' || c == '\0' || c.is_control())
    }

    pub fn is_extension_allowed(&self, filename: &str) -> bool {
        if self.allowed_extensions.is_empty() {
            return true;
        }
        let extension = match filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => format!(".{}", ext),
            _ => return false,
        };
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&extension))
    }
}

#[derive(Debug, Clone, Default)]
pub struct CgiConfig {
    interpreters: IndexMap<String, PathBuf>,
    working_directory: Option<PathBuf>,
}

impl CgiConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_interpreter(
        &mut self,
        extension: impl Into<String>,
        interpreter: impl Into<PathBuf>,
    ) -> Result<(), ConfigError> {
        let extension = extension.into();
        let interpreter = interpreter.into();
        if !extension.starts_with('.') || extension.len() < 2 {
            return Err(ConfigError::InvalidCgiConfig(format!(
                "extension must start with '.': '{}'",
                extension
            )));
        }
        if !interpreter.is_absolute() {
            return Err(ConfigError::InvalidCgiConfig(format!(
                "interpreter must be an absolute path: {}",
                interpreter.display()
            )));
        }
        self.interpreters.insert(extension, interpreter);
        Ok(())
    }

    pub fn set_working_directory(&mut self, dir: impl Into<PathBuf>) {
        self.working_directory = Some(dir.into());
    }

    pub fn working_directory(&self) -> Option<&Path> {
        self.working_directory.as_deref()
    }

    /// Interpreter registered for the extension of `path`, if any.
    pub fn interpreter_for(&self, path: &str) -> Option<&Path> {
        let extension = path.rsplit_once('.').map(|(_, ext)| format!(".{}", ext))?;
        self.interpreters.get(&extension).map(PathBuf::as_path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interpreters.is_empty() {
            return Err(ConfigError::InvalidCgiConfig(
                "at least one extension/interpreter pair is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// A `return <code> <target>;` directive.
#[derive(Debug, Clone)]
pub struct ReturnRedirect {
    target: String,
    code: u16,
}

impl ReturnRedirect {
    pub fn new(target: impl Into<String>, code: u16) -> Result<Self, ConfigError> {
        let target = target.into();
        if target.trim().is_empty() {
            return Err(ConfigError::EmptyRedirectTarget);
        }
        if !(300..400).contains(&code) {
            return Err(ConfigError::InvalidRedirectCode(code));
        }
        Ok(Self {
            target: target.trim().to_string(),
            code,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn code(&self) -> u16 {
        self.code
    }
}

#[derive(Debug)]
pub struct LocationConfig {
    matcher: LocationMatch,
    allowed_methods: IndexSet<HttpMethod>,
    root: Option<PathBuf>,
    alias: Option<PathBuf>,
    index_files: Vec<String>,
    try_files: Vec<String>,
    autoindex: bool,
    upload: Option<UploadConfig>,
    cgi: Option<CgiConfig>,
    redirect: Option<ReturnRedirect>,
    error_pages: IndexMap<u16, String>,
    client_max_body_size: Size,
    client_body_buffer_size: Option<Size>,
    custom_headers: IndexMap<String, String>,
}

impl LocationConfig {
    /// Parses the pattern (with its nginx modifier, if any) and builds an
    /// otherwise-empty location. Regex patterns compile here, so an invalid
    /// pattern is rejected before the location ever exists.
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            matcher: LocationMatch::parse(pattern)?,
            allowed_methods: IndexSet::new(),
            root: None,
            alias: None,
            index_files: Vec::new(),
            try_files: Vec::new(),
            autoindex: false,
            upload: None,
            cgi: None,
            redirect: None,
            error_pages: IndexMap::new(),
            client_max_body_size: DEFAULT_CLIENT_BODY_SIZE,
            client_body_buffer_size: None,
            custom_headers: IndexMap::new(),
        })
    }

    pub fn matcher(&self) -> &LocationMatch {
        &self.matcher
    }

    pub fn pattern(&self) -> &str {
        self.matcher.pattern()
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn alias(&self) -> Option<&Path> {
        self.alias.as_deref()
    }

    pub fn index_files(&self) -> &[String] {
        &self.index_files
    }

    pub fn try_files(&self) -> &[String] {
        &self.try_files
    }

    pub fn autoindex(&self) -> bool {
        self.autoindex
    }

    pub fn upload(&self) -> Option<&UploadConfig> {
        self.upload.as_ref()
    }

    pub fn cgi(&self) -> Option<&CgiConfig> {
        self.cgi.as_ref()
    }

    pub fn redirect(&self) -> Option<&ReturnRedirect> {
        self.redirect.as_ref()
    }

    pub fn error_page(&self, code: u16) -> Option<&str> {
        self.error_pages.get(&code).map(String::as_str)
    }

    pub fn client_max_body_size(&self) -> Size {
        self.client_max_body_size
    }

    pub fn client_body_buffer_size(&self) -> Option<Size> {
        self.client_body_buffer_size
    }

    pub fn custom_headers(&self) -> &IndexMap<String, String> {
        &self.custom_headers
    }

    // -- builder surface -------------------------------------------------

    pub fn allow_method(&mut self, method: HttpMethod) {
        self.allowed_methods.insert(method);
    }

    pub fn set_root(&mut self, root: impl Into<PathBuf>) {
        self.root = Some(root.into());
    }

    pub fn set_alias(&mut self, alias: impl Into<PathBuf>) {
        self.alias = Some(alias.into());
    }

    pub fn add_index_file(&mut self, index: &str) -> Result<(), ConfigError> {
        let trimmed = index.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::EmptyIndexFile);
        }
        if self.index_files.iter().any(|existing| existing == trimmed) {
            return Err(ConfigError::DuplicateIndexFile(trimmed.to_string()));
        }
        self.index_files.push(trimmed.to_string());
        Ok(())
    }

    pub fn add_try_file(&mut self, entry: &str) -> Result<(), ConfigError> {
        if entry.trim().is_empty() {
            return Err(ConfigError::EmptyTryFile);
        }
        self.try_files.push(entry.trim().to_string());
        Ok(())
    }

    pub fn set_autoindex(&mut self, enabled: bool) {
        self.autoindex = enabled;
    }

    pub fn enable_upload(&mut self, upload: UploadConfig) -> Result<(), ConfigError> {
        upload.validate()?;
        self.upload = Some(upload);
        Ok(())
    }

    pub fn set_cgi(&mut self, cgi: CgiConfig) -> Result<(), ConfigError> {
        cgi.validate()?;
        self.cgi = Some(cgi);
        Ok(())
    }

    pub fn set_return_redirect(&mut self, target: &str, code: u16) -> Result<(), ConfigError> {
        self.redirect = Some(ReturnRedirect::new(target, code)?);
        Ok(())
    }

    pub fn add_error_page(&mut self, code: u16, uri: &str) -> Result<(), ConfigError> {
        if !(400..600).contains(&code) {
            return Err(ConfigError::InvalidErrorCode(code));
        }
        let trimmed = uri.trim();
        if trimmed.is_empty() || !trimmed.starts_with('/') {
            return Err(ConfigError::InvalidErrorPageUri(uri.to_string()));
        }
        self.error_pages.insert(code, trimmed.to_string());
        Ok(())
    }

    pub fn set_client_max_body_size(&mut self, size: Size) -> Result<(), ConfigError> {
        if size > MAX_CLIENT_BODY_SIZE {
            return Err(ConfigError::BodySizeTooLarge {
                got: size,
                limit: MAX_CLIENT_BODY_SIZE,
            });
        }
        self.client_max_body_size = size;
        Ok(())
    }

    pub fn set_client_body_buffer_size(&mut self, size: Size) -> Result<(), ConfigError> {
        if size > MAX_BODY_BUFFER_SIZE {
            return Err(ConfigError::BodySizeTooLarge {
                got: size,
                limit: MAX_BODY_BUFFER_SIZE,
            });
        }
        self.client_body_buffer_size = Some(size);
        Ok(())
    }

    pub fn add_custom_header(&mut self, name: &str, value: &str) -> Result<(), ConfigError> {
        if name.is_empty() || value.is_empty() {
            return Err(ConfigError::InvalidCustomHeader(name.to_string()));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConfigError::InvalidCustomHeader(name.to_string()));
        }
        let lowered = name.to_ascii_lowercase();
        if matches!(
            lowered.as_str(),
            "content-length" | "transfer-encoding" | "connection" | "host"
        ) {
            return Err(ConfigError::ReservedHeader(name.to_string()));
        }
        self.custom_headers
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    // -- matching and resolution ----------------------------------------

    pub fn matches_path(&self, request_path: &str) -> bool {
        self.matcher.matches(request_path)
    }

    /// GET and HEAD are allowed when no `methods` directive was given.
    pub fn is_method_allowed(&self, method: HttpMethod) -> bool {
        if self.allowed_methods.is_empty() {
            matches!(method, HttpMethod::Get | HttpMethod::Head)
        } else {
            self.allowed_methods.contains(&method)
        }
    }

    /// The effective allowed set, for `Allow:` headers and error messages.
    pub fn allowed_methods(&self) -> Vec<HttpMethod> {
        if self.allowed_methods.is_empty() {
            vec![HttpMethod::Get, HttpMethod::Head]
        } else {
            self.allowed_methods.iter().copied().collect()
        }
    }

    pub fn uses_alias(&self) -> bool {
        self.alias.is_some()
    }

    /// Maps the request path to a filesystem path, before any existence
    /// check. With `alias` the matched location prefix is stripped and the
    /// remainder appended to the alias; with `root` the full request path is
    /// appended. Whether the matched prefix survives into the final path is
    /// the entire difference between the two.
    pub fn resolve_path(&self, request_path: &str) -> Option<PathBuf> {
        if let Some(alias) = &self.alias {
            let remainder = request_path.strip_prefix(self.matcher.pattern())?;
            let relative = remainder.trim_start_matches('/');
            return Some(if relative.is_empty() {
                alias.clone()
            } else {
                alias.join(relative)
            });
        }
        let root = self.root.as_ref()?;
        Some(root.join(request_path.trim_start_matches('/')))
    }

    /// The single primary behavior of this location.
    pub fn handler_type(&self) -> HandlerType {
        if self.cgi.is_some() {
            HandlerType::Cgi
        } else if self.upload.is_some() {
            HandlerType::Upload
        } else if self.redirect.is_some() {
            HandlerType::Redirect
        } else {
            HandlerType::Static
        }
    }

    // -- validation ------------------------------------------------------

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_path()?;
        self.validate_allowed_methods()?;
        self.validate_try_files()?;
        self.validate_return_redirect()?;
        if let Some(upload) = &self.upload {
            upload.validate()?;
        }
        if let Some(cgi) = &self.cgi {
            cgi.validate()?;
        }
        self.validate_error_pages()?;
        self.validate_client_max_body_size()?;
        self.validate_alias()?;
        self.validate_client_body_buffer_size()?;

        if self.upload.is_some() && !self.is_method_allowed(HttpMethod::Post) {
            return Err(ConfigError::ConflictingDirectives(format!(
                "location '{}' enables uploads but does not allow POST",
                self.pattern()
            )));
        }
        Ok(())
    }

    fn validate_path(&self) -> Result<(), ConfigError> {
        // `LocationMatch::parse` already rejected malformed patterns; named
        // locations additionally may not carry a match-dependent alias.
        if self.matcher.is_named() && self.alias.is_some() {
            return Err(ConfigError::ConflictingDirectives(format!(
                "named location '{}' cannot use alias",
                self.pattern()
            )));
        }
        Ok(())
    }

    fn validate_allowed_methods(&self) -> Result<(), ConfigError> {
        if self.allowed_methods().is_empty() {
            return Err(ConfigError::NoAllowedMethods);
        }
        Ok(())
    }

    fn validate_try_files(&self) -> Result<(), ConfigError> {
        if self.try_files.iter().any(|entry| entry.is_empty()) {
            return Err(ConfigError::EmptyTryFile);
        }
        Ok(())
    }

    fn validate_return_redirect(&self) -> Result<(), ConfigError> {
        if let Some(redirect) = &self.redirect {
            if !(300..400).contains(&redirect.code()) {
                return Err(ConfigError::InvalidRedirectCode(redirect.code()));
            }
        }
        Ok(())
    }

    fn validate_error_pages(&self) -> Result<(), ConfigError> {
        for uri in self.error_pages.values() {
            if uri.is_empty() || !uri.starts_with('/') {
                return Err(ConfigError::InvalidErrorPageUri(uri.clone()));
            }
        }
        Ok(())
    }

    fn validate_client_max_body_size(&self) -> Result<(), ConfigError> {
        if self.client_max_body_size > MAX_CLIENT_BODY_SIZE {
            return Err(ConfigError::BodySizeTooLarge {
                got: self.client_max_body_size,
                limit: MAX_CLIENT_BODY_SIZE,
            });
        }
        Ok(())
    }

    fn validate_alias(&self) -> Result<(), ConfigError> {
        let Some(alias) = &self.alias else {
            return Ok(());
        };
        if self.root.is_some() {
            return Err(ConfigError::ConflictingDirectives(format!(
                "location '{}' sets both root and alias",
                self.pattern()
            )));
        }
        if !alias.is_absolute() {
            return Err(ConfigError::AliasNotAbsolute(
                alias.display().to_string(),
            ));
        }
        if !matches!(
            self.matcher,
            LocationMatch::Exact(_) | LocationMatch::Prefix(_)
        ) {
            return Err(ConfigError::ConflictingDirectives(format!(
                "alias requires an exact or prefix location, got regex '{}'",
                self.pattern()
            )));
        }
        Ok(())
    }

    fn validate_client_body_buffer_size(&self) -> Result<(), ConfigError> {
        if let Some(size) = self.client_body_buffer_size {
            if size > MAX_BODY_BUFFER_SIZE {
                return Err(ConfigError::BodySizeTooLarge {
                    got: size,
                    limit: MAX_BODY_BUFFER_SIZE,
                });
            }
        }
        Ok(())
    }
}

//! Configuration errors.
//!
//! Everything here is fatal: a [`ConfigError`] means the configuration is
//! ambiguous or unsafe and the server must refuse to start. Per-request
//! errors live in [`crate::routing`] instead.

use std::io;
use std::path::PathBuf;

use crate::config::size::Size;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    ParseFile {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("configuration must contain at least one server")]
    NoServers,

    #[error("invalid listen directive '{0}'")]
    InvalidListenDirective(String),

    #[error("duplicate listen directive '{0}'")]
    DuplicateListen(String),

    #[error("server must have at least one listen directive")]
    MissingListenDirective,

    #[error("invalid server name '{0}'")]
    InvalidServerName(String),

    #[error("duplicate server name '{0}'")]
    DuplicateServerName(String),

    #[error("index file name cannot be empty")]
    EmptyIndexFile,

    #[error("duplicate index file '{0}'")]
    DuplicateIndexFile(String),

    #[error("error page code {0} is not an error status (must be 400-599)")]
    InvalidErrorCode(u16),

    #[error("error page URI '{0}' must start with '/'")]
    InvalidErrorPageUri(String),

    #[error("location path cannot be empty")]
    EmptyLocationPath,

    #[error("invalid location path '{0}'")]
    InvalidLocationPath(String),

    #[error("invalid regex pattern '{pattern}': {source}")]
    InvalidRegexPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("duplicate location '{0}'")]
    DuplicateLocation(String),

    #[error("location must allow at least one HTTP method")]
    NoAllowedMethods,

    #[error("try_files entry cannot be empty")]
    EmptyTryFile,

    #[error("redirect target cannot be empty")]
    EmptyRedirectTarget,

    #[error("return code {0} is not a redirection status (must be 300-399)")]
    InvalidRedirectCode(u16),

    #[error("invalid upload config: {0}")]
    InvalidUploadConfig(String),

    #[error("invalid CGI config: {0}")]
    InvalidCgiConfig(String),

    #[error("alias path '{0}' must be absolute")]
    AliasNotAbsolute(String),

    #[error("conflicting directives: {0}")]
    ConflictingDirectives(String),

    #[error("invalid custom header '{0}'")]
    InvalidCustomHeader(String),

    #[error("cannot override reserved header '{0}'")]
    ReservedHeader(String),

    #[error("server has no locations, no root and no return directive")]
    MissingConfiguration,

    #[error("server root must be set when a location has no root of its own")]
    MissingRoot,

    #[error("body size {got} exceeds the maximum of {limit}")]
    BodySizeTooLarge { got: Size, limit: Size },

    #[error("invalid size '{0}'")]
    InvalidSize(String),

    #[error("listen binding {0} is claimed by two servers that share no distinguishing server name")]
    PortConflict(String),

    #[error("server name '{0}' is claimed by two servers on the same port")]
    AddressConflict(String),

    #[error("more than one default server for binding {0}")]
    MultipleDefaultServers(String),
}

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum JgiError {
    #[error("invalid organism: {0}")]
    InvalidOrganism(String),

    #[error("no organism specified")]
    MissingOrganism,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error(
        "config file present ({0}), but user and/or password not found; \
         re-run with --configure to set credentials"
    )]
    ConfigIncomplete(PathBuf),

    #[error("failed to write config file: {0}")]
    ConfigWrite(String),

    #[error("unable to resolve configuration directory")]
    ConfigDir,

    #[error("couldn't connect with server ({0}); check the internet connection and retry")]
    Connection(String),

    #[error(
        "invalid username/password combination; re-run with --configure to reconfigure credentials"
    )]
    InvalidCredentials,

    #[error(
        "cannot parse XML file or no organism match found ({message}); \
         ensure the manifest exists and has content at: {source_address}"
    )]
    ManifestParse {
        source_address: String,
        message: String,
    },

    #[error("no results found for '{organism}' in any of the following categories: {categories}")]
    NoResults {
        organism: String,
        categories: String,
    },

    #[error("can't parse desired input ?-->'{fragment}': {reason}")]
    Selection { fragment: String, reason: String },

    #[error("category {0} not found in the listing")]
    CategoryNotFound(u32),

    #[error("index {index} not found in category {category}")]
    IndexNotFound { category: u32, index: u32 },

    #[error("transfer of '{filename}' failed: {message}")]
    Transfer { filename: String, message: String },

    #[error("skipped decompression for '{0}': unsupported file suffix")]
    UnsupportedArchive(String),

    #[error("failed to decompress '{path}': {message}")]
    Decompress { path: String, message: String },

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("terminal i/o failed: {0}")]
    Terminal(String),

    #[error("aborted by user")]
    Aborted,
}

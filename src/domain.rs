use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::JgiError;

static PORTAL_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\.jgi.+\.(?:gov|org)/(.+)/").expect("portal url pattern is valid")
});

/// JGI organism abbreviation, e.g. `Nemve1`.
///
/// Parses either the bare abbreviation or a portal URL such as
/// `https://genome.jgi.doe.gov/Nemve1/Nemve1.info.html`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Organism(String);

impl Organism {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Default name of the manifest file fetched for this organism.
    pub fn manifest_filename(&self) -> String {
        format!("{}_jgi_index.xml", self.0)
    }
}

impl fmt::Display for Organism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Organism {
    type Err = JgiError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let name = PORTAL_URL
            .captures(trimmed)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .unwrap_or(trimmed);
        let is_valid = !name.is_empty() && !name.chars().any(char::is_whitespace);
        if !is_valid {
            return Err(JgiError::InvalidOrganism(value.to_string()));
        }
        Ok(Self(name.to_string()))
    }
}

/// What to do with downloaded archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DecompressChoice {
    /// Decompress and remove the compressed originals.
    Yes,
    /// Leave files as downloaded.
    No,
    /// Decompress and keep the compressed originals.
    Keep,
}

impl DecompressChoice {
    /// Maps an interactive answer (`y`, `n`, `k`); anything but `n`/`k`
    /// decompresses.
    pub fn from_answer(answer: &str) -> Self {
        match answer.trim().to_lowercase().as_str() {
            "n" | "no" => DecompressChoice::No,
            "k" | "keep" => DecompressChoice::Keep,
            _ => DecompressChoice::Yes,
        }
    }

    pub fn keep_original(self) -> bool {
        matches!(self, DecompressChoice::Keep)
    }
}

/// Remote addresses used for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub signon_url: String,
    pub directory_url: String,
    pub download_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            signon_url: "https://signon.jgi.doe.gov/signon/create".to_string(),
            directory_url: "https://genome.jgi.doe.gov/portal/ext-api/downloads/get-directory"
                .to_string(),
            download_base: "https://genome.jgi.doe.gov".to_string(),
        }
    }
}

impl Endpoints {
    pub fn manifest_url(&self, organism: &Organism) -> String {
        format!("{}?organism={}", self.directory_url, organism.as_str())
    }

    /// Full download address for a manifest `url` attribute.
    ///
    /// Some listings prefix the portal path with a tape-retrieval wrapper
    /// ending in `url=`; only the part after it is a usable path.
    pub fn download_url(&self, raw: &str) -> String {
        let path = raw.rsplit_once("url=").map(|(_, rest)| rest).unwrap_or(raw);
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!("{}{}", self.download_base, path)
    }
}

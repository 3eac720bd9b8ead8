use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info, warn};

use crate::app::{ProgressEvent, ProgressSink};
use crate::catalog::CatalogEntry;
use crate::config::UserConfig;
use crate::domain::Endpoints;
use crate::error::JgiError;

pub const DEFAULT_RETRIES: u32 = 4;

/// Moves bytes between the portal and local files.
pub trait Transport {
    /// Signs in and stores the session cookie in `cookie_path`.
    fn login(
        &self,
        endpoints: &Endpoints,
        config: &UserConfig,
        cookie_path: &Utf8Path,
    ) -> Result<(), JgiError>;

    /// Writes the manifest body to `destination`; an empty body is not an error here.
    fn fetch_manifest(
        &self,
        url: &str,
        cookie_path: &Utf8Path,
        destination: &Utf8Path,
    ) -> Result<(), JgiError>;

    fn download(
        &self,
        url: &str,
        cookie_path: &Utf8Path,
        destination: &Utf8Path,
    ) -> Result<(), JgiError>;
}

/// Runs the system `curl` binary.
#[derive(Debug, Clone)]
pub struct CurlTransport {
    curl: Option<PathBuf>,
}

impl Default for CurlTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl CurlTransport {
    pub fn new() -> Self {
        Self {
            curl: find_in_path("curl"),
        }
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            curl: Some(program.into()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.curl.is_some()
    }

    fn require_curl(&self) -> Result<&Path, JgiError> {
        self.curl
            .as_deref()
            .ok_or_else(|| JgiError::MissingTool("curl".to_string()))
    }

    fn run_quiet(&self, args: &[String]) -> Result<(), String> {
        let curl = self.require_curl().map_err(|err| err.to_string())?;
        let output = Command::new(curl)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| err.to_string())?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(if stderr.is_empty() {
            format!("curl exited with status {:?}", output.status.code())
        } else {
            stderr
        })
    }
}

impl Transport for CurlTransport {
    fn login(
        &self,
        endpoints: &Endpoints,
        config: &UserConfig,
        cookie_path: &Utf8Path,
    ) -> Result<(), JgiError> {
        self.require_curl()?;
        let args = vec![
            endpoints.signon_url.clone(),
            "--silent".to_string(),
            "--show-error".to_string(),
            "--data-urlencode".to_string(),
            format!("login={}", config.user),
            "--data-urlencode".to_string(),
            format!("password={}", config.password),
            "--cookie-jar".to_string(),
            cookie_path.to_string(),
        ];
        debug!(url = %endpoints.signon_url, "signing in");
        self.run_quiet(&args).map_err(JgiError::Connection)
    }

    fn fetch_manifest(
        &self,
        url: &str,
        cookie_path: &Utf8Path,
        destination: &Utf8Path,
    ) -> Result<(), JgiError> {
        self.require_curl()?;
        let args = vec![
            url.to_string(),
            "--silent".to_string(),
            "--show-error".to_string(),
            "--cookie".to_string(),
            cookie_path.to_string(),
            "--output".to_string(),
            destination.to_string(),
        ];
        debug!(%url, %destination, "fetching manifest");
        self.run_quiet(&args).map_err(JgiError::Connection)
    }

    fn download(
        &self,
        url: &str,
        cookie_path: &Utf8Path,
        destination: &Utf8Path,
    ) -> Result<(), JgiError> {
        let curl = self.require_curl()?;
        let filename = destination.file_name().unwrap_or(destination.as_str());
        // curl draws its progress meter on stderr, so leave it attached.
        let status = Command::new(curl)
            .arg(url)
            .args(["--location", "--fail"])
            .arg("--cookie")
            .arg(cookie_path.as_std_path())
            .arg("--cookie-jar")
            .arg(cookie_path.as_std_path())
            .arg("--output")
            .arg(destination.as_std_path())
            .stdin(Stdio::null())
            .status()
            .map_err(|err| JgiError::Transfer {
                filename: filename.to_string(),
                message: err.to_string(),
            })?;
        if status.success() {
            return Ok(());
        }
        Err(JgiError::Transfer {
            filename: filename.to_string(),
            message: format!("curl exited with status {:?}", status.code()),
        })
    }
}

#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Extra attempts after the first one fails.
    pub retries: u32,
    pub destination: Utf8PathBuf,
}

/// Outcome of a batch: what landed on disk and what gave up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub downloaded: Vec<Utf8PathBuf>,
    pub failed: Vec<String>,
}

impl TransferReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct TransferOrchestrator<'a, T: Transport> {
    transport: &'a T,
    endpoints: &'a Endpoints,
    cookie_path: &'a Utf8Path,
    options: TransferOptions,
}

impl<'a, T: Transport> TransferOrchestrator<'a, T> {
    pub fn new(
        transport: &'a T,
        endpoints: &'a Endpoints,
        cookie_path: &'a Utf8Path,
        options: TransferOptions,
    ) -> Self {
        Self {
            transport,
            endpoints,
            cookie_path,
            options,
        }
    }

    /// Fetches every entry in order; a file that keeps failing is recorded
    /// and the batch moves on.
    pub fn run(&self, entries: &[&CatalogEntry], sink: &dyn ProgressSink) -> TransferReport {
        let mut report = TransferReport::default();
        let attempts = self.options.retries.saturating_add(1);

        for entry in entries {
            let url = self.endpoints.download_url(&entry.url);
            let mut filename = local_filename(&url, &entry.filename);
            if report
                .downloaded
                .contains(&self.options.destination.join(&filename))
            {
                let renamed = distinct_filename(&entry.group_name, &filename, |name| {
                    report
                        .downloaded
                        .contains(&self.options.destination.join(name))
                });
                info!(%filename, %renamed, "local name already taken in this batch");
                filename = renamed;
            }
            let destination = self.options.destination.join(&filename);
            let start = Instant::now();

            let mut outcome = Err(JgiError::Transfer {
                filename: filename.clone(),
                message: "no attempt made".to_string(),
            });
            for attempt in 1..=attempts {
                sink.event(ProgressEvent {
                    message: format!("Downloading '{filename}' (attempt {attempt}/{attempts})"),
                    elapsed: None,
                });
                outcome = self.attempt(&url, &destination, &filename);
                match &outcome {
                    Ok(()) => break,
                    Err(err) => warn!(%filename, attempt, error = %err, "download attempt failed"),
                }
            }

            match outcome {
                Ok(()) => {
                    sink.event(ProgressEvent {
                        message: format!("Downloaded '{filename}'"),
                        elapsed: Some(start.elapsed()),
                    });
                    report.downloaded.push(destination);
                }
                Err(err) => {
                    sink.event(ProgressEvent {
                        message: format!("Giving up on '{filename}': {err}"),
                        elapsed: Some(start.elapsed()),
                    });
                    remove_partial(&destination);
                    report.failed.push(filename);
                }
            }
        }

        info!(
            downloaded = report.downloaded.len(),
            failed = report.failed.len(),
            "transfers finished"
        );
        report
    }

    fn attempt(&self, url: &str, destination: &Utf8Path, filename: &str) -> Result<(), JgiError> {
        self.transport.download(url, self.cookie_path, destination)?;
        if is_hidden_error_document(destination, filename) {
            return Err(JgiError::Transfer {
                filename: filename.to_string(),
                message: "server returned an XML error document".to_string(),
            });
        }
        Ok(())
    }
}

/// Local name for a download: last URL path segment, else the manifest filename.
pub fn local_filename(url: &str, fallback: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.rsplit('/').next().unwrap_or_default();
    let candidate = if segment.is_empty() || segment == "." || segment == ".." {
        fallback
    } else {
        segment
    };
    Utf8Path::new(candidate)
        .file_name()
        .unwrap_or("download")
        .to_string()
}

/// Local name for an entry whose plain name an earlier download already took:
/// `<group>_<filename>`, then numbered until `taken` reports it free.
pub fn distinct_filename(group: &str, filename: &str, taken: impl Fn(&str) -> bool) -> String {
    let prefix: String = group
        .chars()
        .map(|c| if c.is_whitespace() || c == '/' || c == '\\' { '_' } else { c })
        .collect();
    let candidate = format!("{prefix}_{filename}");
    if !taken(&candidate) {
        return candidate;
    }
    (2u32..)
        .map(|n| format!("{prefix}_{n}_{filename}"))
        .find(|name| !taken(name))
        .unwrap_or(candidate)
}

fn remove_partial(path: &Utf8Path) {
    match fs::remove_file(path.as_std_path()) {
        Ok(()) => debug!(%path, "removed partial download"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(%path, error = %err, "failed to remove partial download"),
    }
}

/// A failed tape retrieval answers with an XML error body under the
/// requested name; such files start with `<`.
pub fn is_hidden_error_document(path: &Utf8Path, filename: &str) -> bool {
    if filename.to_lowercase().ends_with("xml") {
        return false;
    }
    let mut first = [0u8; 1];
    fs::File::open(path.as_std_path())
        .and_then(|mut file| file.read(&mut first))
        .map(|read| read == 1 && first[0] == b'<')
        .unwrap_or(false)
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for path in std::env::split_paths(&path_var) {
        let exe = path.join(format!("{name}.exe"));
        if exe.is_file() {
            return Some(exe);
        }
        let plain = path.join(name);
        if plain.is_file() {
            return Some(plain);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_filename_uses_last_segment() {
        assert_eq!(
            local_filename("https://genome.jgi.doe.gov/Nemve1/download/a.fasta.gz", "x"),
            "a.fasta.gz"
        );
        assert_eq!(local_filename("https://host/path/", "fallback.gz"), "fallback.gz");
        assert_eq!(local_filename("https://host/f.gz?token=1", "x"), "f.gz");
    }

    #[test]
    fn distinct_filename_prefixes_the_group() {
        assert_eq!(
            distinct_filename("Genes v2/raw", "same.gz", |_| false),
            "Genes_v2_raw_same.gz"
        );
        assert_eq!(
            distinct_filename("Genes", "same.gz", |name| name == "Genes_same.gz"),
            "Genes_2_same.gz"
        );
    }

    #[test]
    fn detects_xml_error_bodies() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let bad = dir.join("genome.fasta.gz");
        fs::write(&bad, b"<?xml version=\"1.0\"?><error/>").unwrap();
        assert!(is_hidden_error_document(&bad, "genome.fasta.gz"));

        let xml = dir.join("listing.xml");
        fs::write(&xml, b"<root/>").unwrap();
        assert!(!is_hidden_error_document(&xml, "listing.xml"));

        let good = dir.join("ok.gz");
        fs::write(&good, [0x1f, 0x8b, 0x08]).unwrap();
        assert!(!is_hidden_error_document(&good, "ok.gz"));
    }

    #[test]
    fn missing_curl_is_reported() {
        let transport = CurlTransport { curl: None };
        let err = transport
            .download("https://x/y", Utf8Path::new("c"), Utf8Path::new("y"))
            .unwrap_err();
        assert!(matches!(err, JgiError::MissingTool(_)));
    }
}

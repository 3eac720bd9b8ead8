use std::fs;
use std::io;
use std::time::{Duration, Instant};

use camino::Utf8Path;
use serde::Serialize;
use tracing::{debug, info};

use crate::catalog::{Catalog, CatalogEntry, CategoryMode, total_size};
use crate::error::JgiError;
use crate::extract::{DecompressReport, decompress_all};
use crate::manifest::Manifest;
use crate::selection::SelectionSet;
use crate::session::Session;
use crate::transfer::{TransferOptions, TransferOrchestrator, TransferReport, Transport};

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Summary of a finished run, also printed as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub organism: String,
    pub requested: usize,
    pub total_bytes: u64,
    pub downloaded: Vec<String>,
    pub failed: Vec<String>,
    pub decompressed: Vec<String>,
    pub skipped_decompression: Vec<String>,
    pub decompression_errors: Vec<String>,
}

impl RunSummary {
    pub fn new(
        session: &Session,
        selected: &[&CatalogEntry],
        transfer: &TransferReport,
        decompress: Option<&DecompressReport>,
    ) -> Self {
        Self {
            organism: session.organism.to_string(),
            requested: selected.len(),
            total_bytes: total_size(selected.iter().copied()),
            downloaded: transfer.downloaded.iter().map(ToString::to_string).collect(),
            failed: transfer.failed.clone(),
            decompressed: decompress
                .map(|report| report.extracted.iter().map(ToString::to_string).collect())
                .unwrap_or_default(),
            skipped_decompression: decompress
                .map(|report| report.skipped.iter().map(ToString::to_string).collect())
                .unwrap_or_default(),
            decompression_errors: decompress
                .map(|report| report.failed.iter().map(ToString::to_string).collect())
                .unwrap_or_default(),
        }
    }
}

/// The query pipeline over one transport.
pub struct App<T: Transport> {
    transport: T,
}

impl<T: Transport> App<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Signs in and fetches the manifest, or reads the user's local copy.
    pub fn acquire_manifest(
        &self,
        session: &Session,
        sink: &dyn ProgressSink,
    ) -> Result<Manifest, JgiError> {
        let start = Instant::now();
        let files = session.working_files();
        if !files.manifest_is_local() {
            sink.event(ProgressEvent {
                message: "Logging in to the JGI portal".to_string(),
                elapsed: None,
            });
            self.transport
                .login(&session.endpoints, &session.config, files.cookie_path())?;

            let url = session.manifest_url();
            sink.event(ProgressEvent {
                message: format!("Retrieving file list for {}", session.organism),
                elapsed: None,
            });
            self.transport
                .fetch_manifest(&url, files.cookie_path(), files.manifest_path())?;
        }

        let manifest = load_manifest(
            files.manifest_path(),
            &session.manifest_source_address(),
            files.manifest_is_local(),
        )?;
        sink.event(ProgressEvent {
            message: format!("Manifest lists {} files", manifest.file_count()),
            elapsed: Some(start.elapsed()),
        });
        Ok(manifest)
    }

    /// Builds the catalog; an empty one ends the run with no download.
    pub fn build_catalog(
        &self,
        session: &Session,
        manifest: &Manifest,
        mode: &CategoryMode,
    ) -> Result<Catalog, JgiError> {
        let catalog = Catalog::extract(manifest.root(), mode);
        if catalog.is_empty() {
            let categories = match mode {
                CategoryMode::All => "all categories".to_string(),
                CategoryMode::Named(names) => names.join(", "),
            };
            return Err(JgiError::NoResults {
                organism: session.organism.to_string(),
                categories,
            });
        }
        info!(
            categories = catalog.categories().len(),
            files = catalog.entries().len(),
            "catalog built"
        );
        Ok(catalog)
    }

    /// Resolves a selection against the catalog, rejecting empty selections.
    pub fn resolve<'c>(
        &self,
        catalog: &'c Catalog,
        selection: &SelectionSet,
    ) -> Result<Vec<&'c CatalogEntry>, JgiError> {
        if selection.is_empty() {
            return Err(JgiError::Selection {
                fragment: selection.to_string(),
                reason: "no files selected".to_string(),
            });
        }
        catalog.resolve(selection)
    }

    pub fn download(
        &self,
        session: &Session,
        entries: &[&CatalogEntry],
        retries: u32,
        sink: &dyn ProgressSink,
    ) -> Result<TransferReport, JgiError> {
        fs::create_dir_all(session.output_dir.as_std_path())
            .map_err(|err| JgiError::Filesystem(format!("{}: {err}", session.output_dir)))?;
        let orchestrator = TransferOrchestrator::new(
            &self.transport,
            &session.endpoints,
            session.working_files().cookie_path(),
            TransferOptions {
                retries,
                destination: session.output_dir.clone(),
            },
        );
        Ok(orchestrator.run(entries, sink))
    }

    /// Decompresses only what actually arrived.
    pub fn decompress(
        &self,
        transfer: &TransferReport,
        keep_original: bool,
        sink: &dyn ProgressSink,
    ) -> DecompressReport {
        decompress_all(&transfer.downloaded, keep_original, sink)
    }
}

/// Reads and parses a manifest file.
///
/// A fetched manifest that comes back empty means the portal rejected the
/// credentials.
pub fn load_manifest(
    path: &Utf8Path,
    source_address: &str,
    is_local: bool,
) -> Result<Manifest, JgiError> {
    let text = match fs::read_to_string(path.as_std_path()) {
        Ok(text) => text,
        // curl leaves no file behind when the body is empty.
        Err(err) if err.kind() == io::ErrorKind::NotFound && !is_local => String::new(),
        Err(err) => {
            return Err(JgiError::ManifestParse {
                source_address: source_address.to_string(),
                message: err.to_string(),
            });
        }
    };
    if text.trim().is_empty() && !is_local {
        return Err(JgiError::InvalidCredentials);
    }
    debug!(%path, bytes = text.len(), "parsing manifest");
    Manifest::parse(&text, source_address)
}

use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, warn};

use crate::config::UserConfig;
use crate::domain::{Endpoints, Organism};

pub const COOKIE_FILENAME: &str = "cookies";

/// Where the manifest comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestSource {
    /// Fetched into the output directory for this run.
    Remote,
    /// Supplied by the user; never deleted.
    Local(Utf8PathBuf),
}

impl ManifestSource {
    /// Reads the `--xml` flag: absent fetches, an empty value reuses the
    /// manifest a kept run left in `output_dir`.
    pub fn from_xml_flag(xml: Option<&str>, organism: &Organism, output_dir: &Utf8Path) -> Self {
        match xml {
            None => ManifestSource::Remote,
            Some("") => ManifestSource::Local(output_dir.join(organism.manifest_filename())),
            Some(path) => ManifestSource::Local(Utf8PathBuf::from(path)),
        }
    }
}

/// Transient files of one run, removed when dropped unless retained.
#[derive(Debug)]
pub struct WorkingFiles {
    cookie_path: Utf8PathBuf,
    manifest_path: Utf8PathBuf,
    manifest_is_local: bool,
    armed: bool,
}

impl WorkingFiles {
    pub fn new(dir: &Utf8Path, organism: &Organism, source: &ManifestSource) -> Self {
        let (manifest_path, manifest_is_local) = match source {
            ManifestSource::Remote => (dir.join(organism.manifest_filename()), false),
            ManifestSource::Local(path) => (path.clone(), true),
        };
        Self {
            cookie_path: dir.join(COOKIE_FILENAME),
            manifest_path,
            manifest_is_local,
            armed: true,
        }
    }

    pub fn cookie_path(&self) -> &Utf8Path {
        &self.cookie_path
    }

    pub fn manifest_path(&self) -> &Utf8Path {
        &self.manifest_path
    }

    pub fn manifest_is_local(&self) -> bool {
        self.manifest_is_local
    }

    /// Files this registry would delete.
    pub fn removable(&self) -> Vec<&Utf8Path> {
        let mut paths = vec![self.cookie_path.as_path()];
        if !self.manifest_is_local {
            paths.push(self.manifest_path.as_path());
        }
        paths
    }

    /// Keeps the files on disk past the end of the run.
    pub fn retain(&mut self) {
        self.armed = false;
    }

    pub fn cleanup(&mut self) {
        if !self.armed {
            return;
        }
        self.armed = false;
        for path in self.removable() {
            match fs::remove_file(path.as_std_path()) {
                Ok(()) => debug!(%path, "removed working file"),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => warn!(%path, error = %err, "failed to remove working file"),
            }
        }
    }
}

impl Drop for WorkingFiles {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// Everything one query run needs, built once at startup.
#[derive(Debug)]
pub struct Session {
    pub config: UserConfig,
    pub organism: Organism,
    pub endpoints: Endpoints,
    pub output_dir: Utf8PathBuf,
    working: WorkingFiles,
}

impl Session {
    pub fn new(
        config: UserConfig,
        organism: Organism,
        endpoints: Endpoints,
        output_dir: Utf8PathBuf,
        source: ManifestSource,
    ) -> Self {
        let working = WorkingFiles::new(&output_dir, &organism, &source);
        Self {
            config,
            organism,
            endpoints,
            output_dir,
            working,
        }
    }

    pub fn working_files(&self) -> &WorkingFiles {
        &self.working
    }

    pub fn keep_working_files(&mut self) {
        self.working.retain();
    }

    pub fn cleanup(&mut self) {
        self.working.cleanup();
    }

    pub fn manifest_url(&self) -> String {
        self.endpoints.manifest_url(&self.organism)
    }

    /// Address reported when the manifest cannot be used.
    pub fn manifest_source_address(&self) -> String {
        if self.working.manifest_is_local() {
            self.working.manifest_path().to_string()
        } else {
            self.manifest_url()
        }
    }
}

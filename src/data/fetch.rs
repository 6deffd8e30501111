//! Remote file retrieval and pretrained bundle extraction
//!
//! Files are only downloaded when missing locally. Bodies are streamed into a
//! `.part` sibling which is renamed into place once complete, so an
//! interrupted download never looks like a finished one.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{FetchConfig, Result, SvhnError};

/// Name of the training log every pretrained bundle must contain
pub const TRAINING_LOG_NAME: &str = "training_log.csv";
/// Prefix shared by checkpoint files
pub const CHECKPOINT_PREFIX: &str = "ckpt";

/// Moves the bytes behind a URL into a writer
pub trait Transport {
    /// Stream the body of `url` into `sink`, returning the byte count
    fn fetch(&self, url: &str, sink: &mut dyn Write) -> Result<u64>;
}

/// Blocking HTTP transport
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(HttpTransport { client })
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, url: &str, sink: &mut dyn Write) -> Result<u64> {
        let network_error = |message: String| SvhnError::Network {
            url: url.to_string(),
            message,
        };

        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| network_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(network_error(format!("server returned {}", status)));
        }

        response
            .copy_to(sink)
            .map_err(|e| network_error(e.to_string()))
    }
}

/// Ensures remote files exist locally
pub struct DataFetcher<T: Transport> {
    transport: T,
}

impl DataFetcher<HttpTransport> {
    /// Fetcher backed by a real HTTP client
    pub fn http(config: &FetchConfig) -> Result<Self> {
        Ok(DataFetcher::new(HttpTransport::new(config)?))
    }
}

impl<T: Transport> DataFetcher<T> {
    pub fn new(transport: T) -> Self {
        DataFetcher { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Download `url` to `dest` unless `dest` already exists
    pub fn download(&self, url: &str, dest: &Path) -> Result<PathBuf> {
        if dest.exists() {
            log::info!("{} already present, skipping download", dest.display());
            return Ok(dest.to_path_buf());
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(SvhnError::file_system(parent))?;
        }

        let partial = partial_path(dest);
        log::info!("Downloading {} -> {}", url, dest.display());

        let result = File::create(&partial)
            .map_err(SvhnError::file_system(&partial))
            .and_then(|file| {
                let mut writer = BufWriter::new(file);
                let bytes = self.transport.fetch(url, &mut writer)?;
                writer.flush().map_err(SvhnError::file_system(&partial))?;
                Ok(bytes)
            });

        match result {
            Ok(bytes) => {
                std::fs::rename(&partial, dest).map_err(SvhnError::file_system(dest))?;
                log::debug!("Wrote {} bytes to {}", bytes, dest.display());
                Ok(dest.to_path_buf())
            }
            Err(e) => {
                let _ = std::fs::remove_file(&partial);
                Err(e)
            }
        }
    }

    /// Download the `<name>.zip` pretrained bundle into `dir`
    pub fn download_pretrained(&self, url_prefix: &str, name: &str, dir: &Path) -> Result<PathBuf> {
        let url = format!("{}/{}.zip", url_prefix.trim_end_matches('/'), name);
        self.download(&url, &dir.join(format!("{}.zip", name)))
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

/// Unpack the bundle `name` from `archive` into `dest`
///
/// A leading `<name>/` directory inside the archive is stripped so both flat
/// and nested bundles land in the same place. The extracted directory must
/// hold a checkpoint and a training log.
pub fn extract_bundle(archive: &Path, dest: &Path, name: &str) -> Result<Vec<PathBuf>> {
    let file = File::open(archive).map_err(SvhnError::file_system(archive))?;
    let mut zip = zip::ZipArchive::new(file)?;

    std::fs::create_dir_all(dest).map_err(SvhnError::file_system(dest))?;

    let mut extracted = Vec::new();
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;

        let Some(entry_path) = entry.enclosed_name() else {
            return Err(SvhnError::Archive(format!(
                "{} contains an unsafe path: {}",
                archive.display(),
                entry.name()
            )));
        };
        if entry_path.starts_with("__MACOSX") {
            continue;
        }

        let relative = entry_path.strip_prefix(name).unwrap_or(&entry_path);
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&target).map_err(SvhnError::file_system(&target))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(SvhnError::file_system(parent))?;
        }
        let mut out = File::create(&target).map_err(SvhnError::file_system(&target))?;
        std::io::copy(&mut entry, &mut out)
            .map_err(|e| SvhnError::Archive(format!("Failed to extract {}: {}", entry.name(), e)))?;

        log::debug!("Extracted {}", target.display());
        extracted.push(target);
    }

    verify_bundle(dest, name)?;
    Ok(extracted)
}

fn verify_bundle(dir: &Path, name: &str) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(SvhnError::file_system(dir))?;
    let mut has_checkpoint = false;
    let mut has_log = false;

    for entry in entries {
        let file_name = entry.map_err(SvhnError::file_system(dir))?.file_name();
        let file_name = file_name.to_string_lossy();
        has_checkpoint |= file_name.starts_with(CHECKPOINT_PREFIX);
        has_log |= file_name == TRAINING_LOG_NAME;
    }

    if !has_checkpoint {
        return Err(SvhnError::Archive(format!(
            "bundle '{}' does not contain a checkpoint",
            name
        )));
    }
    if !has_log {
        return Err(SvhnError::Archive(format!(
            "bundle '{}' does not contain {}",
            name, TRAINING_LOG_NAME
        )));
    }
    Ok(())
}

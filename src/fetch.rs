use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, info};

use crate::app::{ProgressEvent, ProgressSink};
use crate::error::SizeError;

const PROGRESS_STEP_BYTES: u64 = 8 * 1024 * 1024;
const COPY_BUFFER_BYTES: usize = 64 * 1024;

pub trait RemoteClient: Send + Sync {
    /// GETs `url` and writes the whole body to `destination`, returning the
    /// number of bytes written.
    fn download(
        &self,
        url: &str,
        destination: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<u64, SizeError>;
}

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self, SizeError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("sizemeup/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SizeError::Filesystem(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| SizeError::FetchHttp(err.to_string()))?;
        Ok(Self { client })
    }
}

impl RemoteClient for HttpClient {
    fn download(
        &self,
        url: &str,
        destination: &Path,
        sink: &dyn ProgressSink,
    ) -> Result<u64, SizeError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|err| SizeError::FetchHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "download failed".to_string());
            return Err(SizeError::FetchStatus {
                url: url.to_string(),
                status,
                message,
            });
        }

        let total = response.content_length();
        let mut reader = ProgressReader::new(response, total, sink);
        write_stream(&mut reader, destination)
    }
}

/// Returns `destination` untouched when it already exists and `force` is
/// off; otherwise downloads `url` into it.
pub fn fetch<C: RemoteClient + ?Sized>(
    client: &C,
    url: &str,
    destination: &Path,
    force: bool,
    sink: &dyn ProgressSink,
) -> Result<PathBuf, SizeError> {
    if destination.exists() && !force {
        info!("Using existing file: {}", destination.display());
        sink.event(ProgressEvent {
            message: format!("phase=Fetch; cached {}", destination.display()),
            elapsed: None,
        });
        return Ok(destination.to_path_buf());
    }

    info!("Downloading {url} to {}", destination.display());
    sink.event(ProgressEvent {
        message: format!("phase=Fetch; downloading {url}"),
        elapsed: None,
    });
    let started = Instant::now();
    let bytes = client.download(url, destination, sink)?;
    debug!("Downloaded {bytes} bytes in {:?}", started.elapsed());
    sink.event(ProgressEvent {
        message: format!("phase=Fetch; saved {}", destination.display()),
        elapsed: Some(started.elapsed()),
    });
    Ok(destination.to_path_buf())
}

/// Copies `reader` into a temp file beside `destination`, then renames it
/// into place. A failed transfer never leaves a file that would later be
/// mistaken for a finished download.
pub fn write_stream<R: Read>(reader: &mut R, destination: &Path) -> Result<u64, SizeError> {
    let parent = destination
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|err| SizeError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix(".sizemeup-download-")
        .tempfile_in(parent)
        .map_err(|err| SizeError::Filesystem(err.to_string()))?;
    let bytes = copy_body(reader, &mut temp)?;
    temp.flush()
        .map_err(|err| SizeError::Filesystem(err.to_string()))?;
    temp.persist(destination)
        .map_err(|err| SizeError::Filesystem(err.to_string()))?;
    Ok(bytes)
}

/// Like `io::copy`, but read failures are transfer errors and write
/// failures are filesystem errors.
fn copy_body<R: Read, W: Write>(reader: &mut R, writer: &mut W) -> Result<u64, SizeError> {
    let mut buffer = vec![0u8; COPY_BUFFER_BYTES];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buffer) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(SizeError::FetchHttp(err.to_string())),
        };
        writer
            .write_all(&buffer[..n])
            .map_err(|err| SizeError::Filesystem(err.to_string()))?;
        total += n as u64;
    }
}

struct ProgressReader<'a, R> {
    inner: R,
    total: Option<u64>,
    read: u64,
    next_report: u64,
    started: Instant,
    sink: &'a dyn ProgressSink,
}

impl<'a, R: Read> ProgressReader<'a, R> {
    fn new(inner: R, total: Option<u64>, sink: &'a dyn ProgressSink) -> Self {
        Self {
            inner,
            total,
            read: 0,
            next_report: PROGRESS_STEP_BYTES,
            started: Instant::now(),
            sink,
        }
    }
}

impl<R: Read> Read for ProgressReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.read += n as u64;
        if self.read >= self.next_report {
            self.next_report = self.read + PROGRESS_STEP_BYTES;
            let message = match self.total {
                Some(total) if total > 0 => format!(
                    "phase=Fetch; {} / {} ({}%)",
                    bytes_to_human(self.read),
                    bytes_to_human(total),
                    self.read * 100 / total
                ),
                _ => format!("phase=Fetch; {}", bytes_to_human(self.read)),
            };
            self.sink.event(ProgressEvent {
                message,
                elapsed: Some(self.started.elapsed()),
            });
        }
        Ok(n)
    }
}

pub fn bytes_to_human(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

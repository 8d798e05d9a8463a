//! Sending responses and files.

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;

use chrono::{Duration, Utc};
use tracing::debug;

use super::Kernel;
use crate::error::Fault;
use crate::events::Outcome;
use crate::http::date::{http_date, http_date_from_system, parse_http_date, unix_seconds};
use crate::http::{ByteRange, Headers, permits_body};
use crate::transport::{Head, throttle};

/// Seconds a served file may be cached.
const FILE_MAX_AGE: i64 = 604_800;

/// How a served file is presented to the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Disposition {
    /// No `Content-Disposition` header.
    #[default]
    Inline,
    /// `attachment`.
    Attachment,
    /// `attachment; filename="…"`.
    Named(String),
}

impl Disposition {
    fn header(&self) -> Option<String> {
        match self {
            Self::Inline => None,
            Self::Attachment => Some("attachment".to_owned()),
            Self::Named(name) => Some(format!("attachment; filename=\"{}\"", name.replace('"', "\\\""))),
        }
    }
}

/// Options for [`Kernel::send_file`].
#[derive(Debug, Clone, Default)]
pub struct FileOptions {
    /// Extra headers, applied last.
    pub headers: Headers,
    pub disposition: Disposition,
    /// Honour `Range` and advertise `Accept-Ranges: bytes`.
    pub ranges: bool,
    /// MIME type; derived from the extension when unset.
    pub mime: Option<String>,
    /// Throttle rate in kilobits per second.
    pub rate: Option<u32>,
}

impl FileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn ranges(mut self, ranges: bool) -> Self {
        self.ranges = ranges;
        self
    }

    #[must_use]
    pub fn download(mut self, filename: Option<&str>) -> Self {
        self.disposition = match filename {
            Some(name) => Disposition::Named(name.to_owned()),
            None => Disposition::Attachment,
        };
        self
    }

    #[must_use]
    pub fn mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    #[must_use]
    pub fn rate(mut self, kbps: u32) -> Self {
        self.rate = Some(kbps);
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Built-in MIME type for a file extension.
pub fn mime_for_extension(extension: &str) -> Option<&'static str> {
    let mime = match extension.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "text/javascript",
        "json" => "application/json",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "xml" => "application/xml",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "wasm" => "application/wasm",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        _ => return None,
    };
    Some(mime)
}

impl Kernel<'_> {
    /// Sends the response. Only the first call has any effect.
    ///
    /// The status is taken from `outcome.code`, or kept if one was set, or
    /// defaults to `200`. `Content-Type` and `Content-Length` are added when
    /// absent. The body is skipped in quiet mode and for `HEAD`.
    ///
    /// # Errors
    ///
    /// - [`Fault::Status`]: the code is unknown and `strict_status` is on.
    /// - [`Fault::Json`]: a JSON body failed to serialize.
    /// - [`Fault::Io`]: the transport failed.
    pub fn send(&mut self, outcome: Outcome) -> Result<(), Fault> {
        if self.is_sent() {
            debug!("response already sent");
            return Ok(());
        }

        let Outcome {
            output,
            code,
            headers,
            mime,
            rate,
        } = outcome;

        if code.is_some() || !self.response.has_status() {
            self.status(code.unwrap_or(200))?;
        }

        for (name, values) in headers.grouped() {
            for (i, value) in values.into_iter().enumerate() {
                self.response.add_header(name.as_str(), value, i == 0);
            }
        }

        let implied = match output {
            Some(body) => {
                let (bytes, implied) = body.into_parts()?;
                self.response.set_output(bytes);
                implied
            }
            None => None,
        };
        if let Some(mime) = mime.or_else(|| self.response.mime().map(str::to_owned)).or(implied.map(str::to_owned)) {
            self.response.set_mime(mime);
        }
        if let Some(rate) = rate {
            self.response.set_rate(rate);
        }

        let output = self.response.output().cloned().unwrap_or_default();
        let config = self.config();

        if self.response.header("content-type").is_none() {
            if let Some(mime) = self.response.mime().map(str::to_owned) {
                let value = format!("{mime};charset={}", config.charset);
                self.response.add_header("Content-Type", value, true);
            }
        }
        if self.response.header("content-length").is_none() && permits_body(self.response.code()) {
            self.response.add_header("Content-Length", output.len().to_string(), true);
        }
        if self.is_verb(&["GET", "HEAD"]) {
            self.remember_back_url()?;
        }

        self.send_head()?;

        let shout = !output.is_empty() && self.has_body();
        if shout {
            throttle::stream_bytes(&mut *self.transport, &output, self.response.rate())?;
        } else {
            self.transport.flush()?;
        }
        Ok(())
    }

    /// Sends a file, honouring `If-Modified-Since` and, when enabled, `Range`.
    ///
    /// # Errors
    ///
    /// [`Fault::Io`] when the file cannot be read or the transport fails.
    pub fn send_file(&mut self, path: &Path, options: FileOptions) -> Result<(), Fault> {
        if self.is_sent() {
            return Ok(());
        }

        let metadata = std::fs::metadata(path)?;
        let modified = metadata.modified()?;
        let size = metadata.len();

        self.add_header("Last-Modified", http_date_from_system(modified), true);
        if options.ranges {
            self.add_header("Accept-Ranges", "bytes", true);
        }

        let since = self
            .request
            .header("if-modified-since")
            .and_then(parse_http_date)
            .map(|date| date.timestamp());
        if since == Some(unix_seconds(modified)) {
            debug!(path = %path.display(), "not modified");
            return self.send(Outcome::new().with_code(304));
        }

        let range = if options.ranges {
            ByteRange::parse(self.request.header("range"), size)
        } else {
            ByteRange::Full
        };

        let (code, offset, length) = match range {
            ByteRange::Full => (200, 0, size),
            ByteRange::Partial { offset, length, .. } => (206, offset, length),
            ByteRange::Unsatisfiable { .. } => {
                let mut outcome = Outcome::new().with_code(416);
                if let Some(content_range) = range.content_range() {
                    outcome = outcome.with_header("Content-Range", content_range);
                }
                return self.send(outcome);
            }
        };
        if let Some(content_range) = range.content_range() {
            self.add_header("Content-Range", content_range, true);
        }
        if let Some(disposition) = options.disposition.header() {
            self.add_header("Content-Disposition", disposition, true);
        }

        self.add_header("Content-Length", length.to_string(), true);
        self.add_header("Cache-Control", format!("public, max-age={FILE_MAX_AGE}"), true);
        self.add_header("Expires", http_date(Utc::now() + Duration::seconds(FILE_MAX_AGE)), true);

        let mime = options.mime.unwrap_or_else(|| self.mime_for(path));
        let mut outcome = Outcome::new().with_code(code).with_mime(mime);
        outcome.headers = options.headers;
        self.send(outcome)?;

        if !self.has_body() {
            return Ok(());
        }
        let mut file = File::open(path)?;
        if offset > 0 {
            file.seek(SeekFrom::Start(offset))?;
        }
        let rate = options.rate.unwrap_or_else(|| self.response.rate());
        let sent = throttle::stream_reader(&mut *self.transport, file, length, rate)?;
        debug!(path = %path.display(), code, sent, "file sent");
        Ok(())
    }

    /// MIME type for `path`: configured table, then built-in table, then
    /// `application/octet-stream`.
    pub fn mime_for(&self, path: &Path) -> String {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        self.config()
            .mime_types
            .get(&extension)
            .cloned()
            .or_else(|| mime_for_extension(&extension).map(str::to_owned))
            .unwrap_or_else(|| "application/octet-stream".to_owned())
    }

    fn has_body(&self) -> bool {
        !self.config().quiet && !self.is_verb(&["HEAD"])
    }

    fn send_head(&mut self) -> Result<(), Fault> {
        let head = Head {
            protocol: self.request.protocol().to_owned(),
            code: self.response.code(),
            text: self.response.text().to_owned(),
            headers: self
                .response
                .headers()
                .grouped()
                .into_iter()
                .map(|(name, values)| (name, values.into_iter().map(str::to_owned).collect()))
                .collect(),
        };
        self.transport.send_head(&head)?;
        self.response.mark_sent();
        debug!(code = head.code, "head sent");
        Ok(())
    }
}

//! Streaming `multipart/form-data` bodies.
//!
//! Every part is named `entity`. File parts carry their field name as the
//! `filename` and are streamed from disk while the body is read; the
//! payload part comes last. With files the payload is base64 text,
//! otherwise it is raw binary.

use crate::listener::ProgressListener;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{self, Cursor, Read};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

const PART_NAME: &str = "entity";

/// A file attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    /// Field name the server uses to identify the file.
    pub field_name: String,
    /// Location of the file on disk.
    pub path: PathBuf,
}

impl FilePart {
    /// Creates a file part.
    pub fn new(field_name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            field_name: field_name.into(),
            path: path.into(),
        }
    }
}

enum Segment {
    Bytes(Vec<u8>),
    File { path: PathBuf, len: u64 },
}

/// A multipart body ready to be streamed.
pub struct MultipartBody {
    boundary: String,
    segments: Vec<Segment>,
    content_length: u64,
    part_count: usize,
}

impl MultipartBody {
    /// Builds a body from the payload and the attached files.
    ///
    /// Fails if a file cannot be inspected.
    pub fn new(payload: &[u8], files: &[FilePart]) -> io::Result<Self> {
        Self::with_boundary(Uuid::new_v4().to_string(), payload, files)
    }

    fn with_boundary(boundary: String, payload: &[u8], files: &[FilePart]) -> io::Result<Self> {
        let mut segments = Vec::with_capacity(files.len() * 3 + 2);

        for file in files {
            let len = fs::metadata(&file.path)?.len();
            let head = format!(
                "--{boundary}\r\n\
                 Content-Disposition: form-data; name=\"{PART_NAME}\"; filename=\"{}\"\r\n\
                 Content-Type: application/octet-stream\r\n\
                 Content-Transfer-Encoding: binary\r\n\r\n",
                escape_quotes(&file.field_name)
            );
            segments.push(Segment::Bytes(head.into_bytes()));
            segments.push(Segment::File {
                path: file.path.clone(),
                len,
            });
            segments.push(Segment::Bytes(b"\r\n".to_vec()));
        }

        let mut payload_part = if files.is_empty() {
            let mut part = format!(
                "--{boundary}\r\n\
                 Content-Disposition: form-data; name=\"{PART_NAME}\"\r\n\
                 Content-Type: application/octet-stream\r\n\
                 Content-Transfer-Encoding: binary\r\n\r\n"
            )
            .into_bytes();
            part.extend_from_slice(payload);
            part
        } else {
            format!(
                "--{boundary}\r\n\
                 Content-Disposition: form-data; name=\"{PART_NAME}\"\r\n\
                 Content-Type: text/plain; charset=UTF-8\r\n\r\n{}",
                STANDARD.encode(payload)
            )
            .into_bytes()
        };
        payload_part.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
        segments.push(Segment::Bytes(payload_part));

        let content_length = segments
            .iter()
            .map(|s| match s {
                Segment::Bytes(b) => b.len() as u64,
                Segment::File { len, .. } => *len,
            })
            .sum();

        Ok(Self {
            boundary,
            segments,
            content_length,
            part_count: files.len() + 1,
        })
    }

    /// Returns the boundary.
    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Returns the value of the `Content-Type` header.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Returns the total body length in bytes.
    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    /// Returns the number of parts.
    pub fn part_count(&self) -> usize {
        self.part_count
    }

    /// Turns the body into a reader, reporting progress as bytes are read.
    pub fn into_reader(self, progress: Option<Arc<dyn ProgressListener>>) -> MultipartReader {
        MultipartReader {
            pending: self.segments.into(),
            current: None,
            written: 0,
            total: self.content_length,
            progress,
        }
    }
}

impl std::fmt::Debug for MultipartBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultipartBody")
            .field("boundary", &self.boundary)
            .field("parts", &self.part_count)
            .field("content_length", &self.content_length)
            .finish()
    }
}

fn escape_quotes(value: &str) -> String {
    value.replace('"', "%22")
}

/// Streams a [`MultipartBody`].
pub struct MultipartReader {
    pending: VecDeque<Segment>,
    current: Option<Box<dyn Read + Send>>,
    written: u64,
    total: u64,
    progress: Option<Arc<dyn ProgressListener>>,
}

impl Read for MultipartReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if let Some(reader) = self.current.as_mut() {
                let n = reader.read(buf)?;
                if n > 0 {
                    self.written += n as u64;
                    if let Some(progress) = &self.progress {
                        progress.on_progress(self.written, self.total);
                    }
                    return Ok(n);
                }
                self.current = None;
            }

            match self.pending.pop_front() {
                Some(Segment::Bytes(bytes)) => self.current = Some(Box::new(Cursor::new(bytes))),
                Some(Segment::File { path, len }) => {
                    let file = File::open(&path)?;
                    self.current = Some(Box::new(file.take(len)));
                }
                None => return Ok(0),
            }
        }
    }
}

//! Streamed attachment responses with guaranteed artifact cleanup.
//!
//! Output files are forwarded in fixed-size chunks rather than buffered, so
//! peak memory stays bounded regardless of file size. The response body owns
//! an [`ArtifactGuard`]; when the body is dropped — the client read it to
//! completion or disconnected mid-transfer — the guarded artifacts are
//! released.

use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use futures::Stream;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use tf_av::ArtifactStore;

/// Chunk size for streamed downloads.
const CHUNK_SIZE: usize = 8 * 1024;

/// Releases a set of artifacts when dropped.
pub struct ArtifactGuard {
    store: ArtifactStore,
    paths: Vec<PathBuf>,
}

impl ArtifactGuard {
    pub fn new(store: ArtifactStore, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            store,
            paths: paths.into_iter().collect(),
        }
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        self.store.release(&self.paths);
    }
}

/// A byte stream that keeps an [`ArtifactGuard`] alive for its lifetime.
struct GuardedStream<S> {
    inner: S,
    _guard: ArtifactGuard,
}

impl<S> Stream for GuardedStream<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Stream `path` to the client as an attachment named `filename`.
///
/// The artifacts in `guard` are released when the transfer ends, whether or
/// not the client read the whole body.
pub async fn stream_attachment(
    path: &Path,
    filename: &str,
    guard: ArtifactGuard,
) -> tf_core::Result<Response> {
    let file = match File::open(path).await {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(tf_core::Error::not_found("result", filename));
        }
        Err(e) => return Err(e.into()),
    };
    let len = file.metadata().await?.len();

    let stream = GuardedStream {
        inner: ReaderStream::with_capacity(file, CHUNK_SIZE),
        _guard: guard,
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(filename))
        .header(header::CONTENT_LENGTH, len.to_string())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )
        .body(Body::from_stream(stream))
        .map_err(|e| tf_core::Error::Internal(format!("failed to build response: {e}")))
}

/// MIME type from the delivered filename's extension.
pub fn content_type_for(filename: &str) -> &'static str {
    let extension = Path::new(filename)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    match extension.as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("ogg") => "audio/ogg",
        Some("flac") => "audio/flac",
        Some("m4a") | Some("aac") => "audio/mp4",
        _ => "application/octet-stream",
    }
}

/// Reduce a client-supplied filename to a header-safe form.
pub fn sanitize_filename(filename: &str) -> String {
    let name = Path::new(filename)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

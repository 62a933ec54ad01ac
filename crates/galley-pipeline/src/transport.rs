use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use galley_core::GenerationRequest;

/// Trait for opening generation streams. Implemented by HttpTransport
/// (real backend), ReplayTransport (recorded files), and
/// ScriptedTransport (tests).
#[async_trait::async_trait]
pub trait GenerationTransport: Send + Sync {
    async fn open(&self, request: &GenerationRequest) -> Result<Box<dyn ChunkStream>>;
}

/// One open stream. Chunks are raw bytes; frame boundaries are the
/// parser's problem, not the transport's.
#[async_trait::async_trait]
pub trait ChunkStream: Send {
    /// Next chunk, or Ok(None) when the backend closed the stream
    /// cleanly.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>>;
}

// ── Replay transport ──

/// Streams a recorded event file, sliced into fixed-size chunks and
/// optionally paced, so the full pipeline can run without a backend.
pub struct ReplayTransport {
    path: PathBuf,
    chunk_size: usize,
    delay: Option<Duration>,
}

impl ReplayTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            chunk_size: 256,
            delay: None,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Pause this long before each chunk, simulating generation pace.
    pub fn with_delay(mut self, delay: Option<Duration>) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait::async_trait]
impl GenerationTransport for ReplayTransport {
    async fn open(&self, _request: &GenerationRequest) -> Result<Box<dyn ChunkStream>> {
        let data = std::fs::read(&self.path)
            .with_context(|| format!("reading replay file {}", self.path.display()))?;
        Ok(Box::new(ReplayStream {
            data,
            offset: 0,
            chunk_size: self.chunk_size,
            delay: self.delay,
        }))
    }
}

struct ReplayStream {
    data: Vec<u8>,
    offset: usize,
    chunk_size: usize,
    delay: Option<Duration>,
}

#[async_trait::async_trait]
impl ChunkStream for ReplayStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.offset >= self.data.len() {
            return Ok(None);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let end = (self.offset + self.chunk_size).min(self.data.len());
        let chunk = self.data[self.offset..end].to_vec();
        self.offset = end;
        Ok(Some(chunk))
    }
}

// ── Scripted transport (tests) ──

/// One step of a scripted stream.
#[derive(Debug, Clone)]
pub enum ScriptedItem {
    Chunk(Vec<u8>),
    /// Pause before the next item is served.
    Delay(Duration),
    /// Mid-stream read failure.
    ReadError(String),
}

impl ScriptedItem {
    /// A chunk holding one newline-terminated frame.
    pub fn frame(json: &str) -> Self {
        ScriptedItem::Chunk(format!("{json}\n").into_bytes())
    }
}

/// Scripted transport for tests. Each `open` consumes the next queued
/// script; an unqueued open yields an immediately-closed stream.
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Vec<ScriptedItem>>>,
    open_error: Mutex<Option<String>>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            open_error: Mutex::new(None),
        }
    }

    pub fn push_script(&self, items: Vec<ScriptedItem>) {
        self.scripts.lock().unwrap().push_back(items);
    }

    /// Make every `open` fail with this message until cleared.
    pub fn set_open_error(&self, message: Option<&str>) {
        *self.open_error.lock().unwrap() = message.map(|s| s.to_string());
    }
}

#[async_trait::async_trait]
impl GenerationTransport for ScriptedTransport {
    async fn open(&self, _request: &GenerationRequest) -> Result<Box<dyn ChunkStream>> {
        if let Some(msg) = self.open_error.lock().unwrap().clone() {
            bail!(msg);
        }
        let items = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        Ok(Box::new(ScriptedStream {
            items: items.into(),
        }))
    }
}

struct ScriptedStream {
    items: VecDeque<ScriptedItem>,
}

#[async_trait::async_trait]
impl ChunkStream for ScriptedStream {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        while let Some(item) = self.items.pop_front() {
            match item {
                ScriptedItem::Chunk(bytes) => return Ok(Some(bytes)),
                ScriptedItem::Delay(duration) => tokio::time::sleep(duration).await,
                ScriptedItem::ReadError(message) => bail!(message),
            }
        }
        Ok(None)
    }
}

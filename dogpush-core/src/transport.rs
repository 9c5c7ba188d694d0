use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Produces one request per reporting pass.
pub trait Transport: Send + Sync {
    type Request: Request;

    fn prepare(&self) -> Result<Self::Request>;
}

/// A payload being written; consumed by [`Request::send`].
pub trait Request: Send {
    type Writer: Write + Send;

    fn body_writer(&mut self) -> &mut Self::Writer;

    /// Delivers the finished body. This is the only await point of a pass.
    fn send(self) -> impl Future<Output = Result<()>> + Send;
}

type Sink = dyn Fn(Vec<u8>) -> std::io::Result<()> + Send + Sync;

/// Transport that buffers each payload and hands it to a sink on send.
#[derive(Clone)]
pub struct WriterTransport {
    sink: Arc<Sink>,
}

impl std::fmt::Debug for WriterTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterTransport").finish_non_exhaustive()
    }
}

impl WriterTransport {
    pub fn new(sink: impl Fn(Vec<u8>) -> std::io::Result<()> + Send + Sync + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }

    /// Writes each payload to stdout followed by a newline.
    pub fn stdout() -> Self {
        Self::new(|body| {
            let mut out = std::io::stdout().lock();
            out.write_all(&body)?;
            out.write_all(b"\n")?;
            out.flush()
        })
    }
}

impl Transport for WriterTransport {
    type Request = WriterRequest;

    fn prepare(&self) -> Result<WriterRequest> {
        Ok(WriterRequest {
            body: Vec::with_capacity(4096),
            sink: self.sink.clone(),
        })
    }
}

pub struct WriterRequest {
    body: Vec<u8>,
    sink: Arc<Sink>,
}

impl Request for WriterRequest {
    type Writer = Vec<u8>;

    fn body_writer(&mut self) -> &mut Vec<u8> {
        &mut self.body
    }

    async fn send(self) -> Result<()> {
        (self.sink)(self.body).map_err(Error::transport)
    }
}

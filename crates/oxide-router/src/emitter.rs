//! Writes a [`Response`] onto a byte sink.

use std::io::{self, Write};

use tracing::debug;

use crate::response::Response;

/// Default size of body write blocks.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Serializes responses as HTTP/1.1 messages.
#[derive(Debug, Clone, Copy)]
pub struct ResponseEmitter {
    chunk_size: usize,
}

impl Default for ResponseEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseEmitter {
    /// Creates an emitter writing 4096-byte blocks.
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Sets the block size.
    #[must_use]
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Writes the status line, the headers and the body.
    pub fn emit<W: Write>(&self, res: &Response, out: &mut W) -> io::Result<()> {
        self.emit_head(res, out)?;
        self.emit_body(res, out)?;
        out.flush()
    }

    /// Writes the status line and the headers in name order.
    pub fn emit_head<W: Write>(&self, res: &Response, out: &mut W) -> io::Result<()> {
        write!(out, "HTTP/1.1 {} {}\r\n", res.status, res.status_text())?;

        let mut headers: Vec<(&String, &String)> = res.headers.iter().collect();
        headers.sort();
        for (name, value) in headers {
            write!(out, "{name}: {value}\r\n")?;
        }
        out.write_all(b"\r\n")
    }

    /// Writes the body, bounded by `Content-Length` when present.
    ///
    /// Nothing is written for 204, 205 and 304 responses.
    pub fn emit_body<W: Write>(&self, res: &Response, out: &mut W) -> io::Result<()> {
        if is_empty_response(res.status) {
            return Ok(());
        }

        let len = res
            .get_header("Content-Length")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .map_or(res.body.len(), |n| n.min(res.body.len()));

        debug!(status = res.status, len, "emitting body");
        for block in res.body[..len].chunks(self.chunk_size) {
            out.write_all(block)?;
        }
        Ok(())
    }
}

fn is_empty_response(status: u16) -> bool {
    matches!(status, 204 | 205 | 304)
}

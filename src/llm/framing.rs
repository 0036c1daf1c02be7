//! Incremental decoders for the two streaming framings used by local servers:
//! server-sent events (`data: {...}\n\n`, ending with `data: [DONE]`) and
//! newline-delimited JSON.
//!
//! Decoders buffer raw bytes so that frames and multi-byte characters split
//! across network chunks are reassembled before decoding.

use crate::error::ClassifiedError;
use futures::{Stream, StreamExt};
use std::pin::Pin;

/// One decoded unit of a streaming response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(String),
    /// End-of-stream sentinel (`data: [DONE]`)
    Done,
}

pub trait FrameDecoder: Send {
    /// Feeds raw bytes and returns every frame completed by them.
    fn push(&mut self, chunk: &[u8]) -> Vec<Frame>;

    /// Flushes a trailing frame the server did not terminate.
    fn finish(&mut self) -> Vec<Frame>;
}

pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, ClassifiedError>> + Send>>;

fn take_line(buffer: &mut Vec<u8>) -> Option<String> {
    let pos = buffer.iter().position(|b| *b == b'\n')?;
    let raw: Vec<u8> = buffer.drain(..=pos).collect();
    let line = String::from_utf8_lossy(&raw);
    Some(line.trim_end_matches(['\n', '\r']).to_string())
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data_lines: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn dispatch(&mut self) -> Option<Frame> {
        if self.data_lines.is_empty() {
            return None;
        }
        let data = self.data_lines.join("\n");
        self.data_lines.clear();
        if data.trim() == "[DONE]" {
            Some(Frame::Done)
        } else {
            Some(Frame::Data(data))
        }
    }

    fn process_line(&mut self, line: &str) -> Option<Frame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            let value = rest.strip_prefix(' ').unwrap_or(rest);
            self.data_lines.push(value.to_string());
        }
        None
    }
}

impl FrameDecoder for SseDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(line) = take_line(&mut self.buffer) {
            if let Some(frame) = self.process_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn finish(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        if !self.buffer.is_empty() {
            let rest = String::from_utf8_lossy(&std::mem::take(&mut self.buffer)).to_string();
            let rest = rest.trim_end_matches('\r').to_string();
            if let Some(frame) = self.process_line(&rest) {
                frames.push(frame);
            }
        }
        frames.extend(self.dispatch());
        frames
    }
}

#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameDecoder for NdjsonDecoder {
    fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(line) = take_line(&mut self.buffer) {
            let line = line.trim();
            if !line.is_empty() {
                frames.push(Frame::Data(line.to_string()));
            }
        }
        frames
    }

    fn finish(&mut self) -> Vec<Frame> {
        let rest = String::from_utf8_lossy(&std::mem::take(&mut self.buffer)).to_string();
        let rest = rest.trim();
        if rest.is_empty() {
            Vec::new()
        } else {
            vec![Frame::Data(rest.to_string())]
        }
    }
}

/// Decodes a raw byte stream into frames.
///
/// A transport failure mid-stream is yielded once as a classified error and
/// ends the frame stream.
pub fn decode_frames<S, B, D>(bytes: S, mut decoder: D) -> FrameStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    D: FrameDecoder + 'static,
{
    Box::pin(async_stream::stream! {
        let mut bytes = Box::pin(bytes);
        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    for frame in decoder.push(chunk.as_ref()) {
                        yield Ok(frame);
                    }
                }
                Err(e) => {
                    yield Err(ClassifiedError::from(e));
                    return;
                }
            }
        }
        for frame in decoder.finish() {
            yield Ok(frame);
        }
    })
}

//! SSE parser for crawl job event streams.
//!
//! Converts the raw `reqwest` byte stream of `GET /crawl/{jobId}/stream` into
//! typed [`SmbCrawlEvent`] values. Events are framed by blank lines; each frame
//! carries an `event:` name and one or more `data:` lines.

use bytes::Bytes;
use futures::stream::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::SmbCrawlerError;
use crate::types::{SmbCrawlComplete, SmbCrawlEvent, SmbCrawlProgress, SmbFileMetadata};

type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Stream adapter yielding crawl events until `complete` or `error` arrives.
pub struct SmbEventStream {
    inner: ByteStream,
    buffer: String,
    event: Option<String>,
    data: Vec<String>,
    finished: bool,
}

impl SmbEventStream {
    pub fn new(
        byte_stream: impl Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
    ) -> Self {
        Self {
            inner: Box::pin(byte_stream),
            buffer: String::new(),
            event: None,
            data: Vec::new(),
            finished: false,
        }
    }

    /// Consume complete lines from the buffer, returning the first dispatched event.
    fn drain_lines(&mut self) -> Option<Result<SmbCrawlEvent, SmbCrawlerError>> {
        while let Some(newline_pos) = self.buffer.find('\n') {
            let line = self.buffer[..newline_pos].trim_end_matches('\r').to_string();
            self.buffer.drain(..=newline_pos);

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    return Some(event);
                }
                continue;
            }

            if line.starts_with(':') {
                continue;
            }
            if let Some(name) = line.strip_prefix("event:") {
                self.event = Some(name.trim().to_string());
            } else if let Some(data) = line.strip_prefix("data:") {
                self.data.push(data.trim_start().to_string());
            }
            // "id:" and "retry:" carry nothing we need
        }
        None
    }

    fn dispatch(&mut self) -> Option<Result<SmbCrawlEvent, SmbCrawlerError>> {
        let name = self.event.take();
        let data = std::mem::take(&mut self.data).join("\n");
        let name = name?;
        if data.is_empty() {
            return None;
        }
        let event = parse_event(&name, &data)?;
        if matches!(
            event,
            Ok(SmbCrawlEvent::Complete(_)) | Ok(SmbCrawlEvent::Error { .. })
        ) {
            self.finished = true;
        }
        Some(event)
    }
}

impl Stream for SmbEventStream {
    type Item = Result<SmbCrawlEvent, SmbCrawlerError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if this.finished {
                return Poll::Ready(None);
            }

            if let Some(event) = this.drain_lines() {
                return Poll::Ready(Some(event));
            }

            match Pin::new(&mut this.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => this.buffer.push_str(text),
                    Err(e) => {
                        this.finished = true;
                        return Poll::Ready(Some(Err(SmbCrawlerError::Parse(format!(
                            "Invalid UTF-8 in event stream: {}",
                            e
                        )))));
                    }
                },
                Poll::Ready(Some(Err(e))) => {
                    this.finished = true;
                    return Poll::Ready(Some(Err(SmbCrawlerError::Http(e))));
                }
                Poll::Ready(None) => {
                    // Flush a trailing frame that was not followed by a blank line
                    if !this.buffer.is_empty() {
                        this.buffer.push('\n');
                    }
                    this.buffer.push('\n');
                    let last = this.drain_lines();
                    this.finished = true;
                    return Poll::Ready(last);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Parse one SSE frame. Unknown event names are ignored.
fn parse_event(name: &str, data: &str) -> Option<Result<SmbCrawlEvent, SmbCrawlerError>> {
    let parsed = match name {
        "file-found" => serde_json::from_str::<SmbFileMetadata>(data).map(SmbCrawlEvent::FileFound),
        "progress" => serde_json::from_str::<SmbCrawlProgress>(data).map(SmbCrawlEvent::Progress),
        "complete" => serde_json::from_str::<SmbCrawlComplete>(data).map(SmbCrawlEvent::Complete),
        "error" => {
            #[derive(serde::Deserialize)]
            struct ErrorData {
                message: String,
            }
            serde_json::from_str::<ErrorData>(data)
                .map(|e| SmbCrawlEvent::Error { message: e.message })
        }
        _ => return None,
    };

    Some(parsed.map_err(|e| {
        SmbCrawlerError::Parse(format!(
            "Failed to parse '{}' event: {} (data: {})",
            name,
            e,
            &data[..data.len().min(200)]
        ))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn stream_of(chunks: Vec<&'static str>) -> SmbEventStream {
        let items: Vec<Result<Bytes, reqwest::Error>> =
            chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect();
        SmbEventStream::new(futures::stream::iter(items))
    }

    #[tokio::test]
    async fn test_parses_file_found_and_complete() {
        let mut stream = stream_of(vec![
            "event: file-found\n",
            "data: {\"fileId\":\"YS50eHQ\",\"name\":\"a.txt\",\"relativePath\":\"docs/a.txt\",\"size\":12,\"mimeType\":\"text/plain\",\"lastModified\":\"2024-05-01T10:00:00Z\",\"hash\":\"abc\",\"downloadUrl\":\"/files/j1/YS50eHQ\"}\n\n",
            "event: complete\ndata: {\"totalFiles\":1,\"totalMatched\":1,\"totalBytes\":12,\"durationMs\":40}\n\n",
        ]);

        match stream.next().await {
            Some(Ok(SmbCrawlEvent::FileFound(file))) => {
                assert_eq!(file.name, "a.txt");
                assert_eq!(file.relative_path, "docs/a.txt");
                assert_eq!(file.size, 12);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(
            stream.next().await,
            Some(Ok(SmbCrawlEvent::Complete(SmbCrawlComplete { total_files: 1, .. })))
        ));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_frames_split_across_chunks() {
        let mut stream = stream_of(vec![
            "event: prog",
            "ress\ndata: {\"filesFound\":3,\"files",
            "Matched\":2,\"totalBytes\":99}\n",
            "\n",
        ]);

        match stream.next().await {
            Some(Ok(SmbCrawlEvent::Progress(p))) => {
                assert_eq!(p.files_found, 3);
                assert_eq!(p.files_matched, 2);
                assert!(p.current_directory.is_none());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_event_ends_stream() {
        let mut stream = stream_of(vec![
            ": keep-alive\n\n",
            "event: error\r\ndata: {\"message\":\"mount failed\"}\r\n\r\n",
            "event: progress\ndata: {\"filesFound\":1,\"filesMatched\":1,\"totalBytes\":1}\n\n",
        ]);

        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            SmbCrawlEvent::Error {
                message: "mount failed".into()
            }
        );
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn test_unknown_events_are_skipped() {
        let mut stream = stream_of(vec![
            "event: heartbeat\ndata: {}\n\n",
            "event: complete\ndata: {\"totalFiles\":0,\"totalMatched\":0,\"totalBytes\":0,\"durationMs\":1}",
        ]);

        assert!(matches!(
            tokio_test::block_on(stream.next()),
            Some(Ok(SmbCrawlEvent::Complete(_)))
        ));
    }

    #[tokio::test]
    async fn test_malformed_payload_is_parse_error() {
        let mut stream = stream_of(vec!["event: file-found\ndata: {not json}\n\n"]);
        assert!(matches!(
            stream.next().await,
            Some(Err(SmbCrawlerError::Parse(_)))
        ));
    }
}

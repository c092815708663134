use anyhow::{anyhow, Result};
use futures_util::{pin_mut, Stream, StreamExt, TryStreamExt};
use regex::Regex;
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::ollama::OllamaClient;
use crate::session::Message;

/// One line of the NDJSON stream from /api/chat.
#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

/// Updates sent from a streaming worker to the UI loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamUpdate {
    /// One filtered content increment.
    Delta(String),
    /// Stream finished; carries the full assembled response.
    Done(String),
    /// Stream failed; carries the user-visible error string. No partial
    /// content should remain on screen alongside it.
    Failed(String),
}

/// Strips `<think>`/`</think>` markers from each delta. Filtering is local
/// to a delta, so a marker split across two chunks is not removed.
#[derive(Clone)]
pub struct ThinkFilter {
    re: Regex,
}

impl ThinkFilter {
    pub fn new() -> Result<Self> {
        Ok(Self {
            re: Regex::new(r"</?think>")?,
        })
    }

    pub fn apply(&self, delta: &str) -> String {
        self.re.replace_all(delta, "").into_owned()
    }
}

/// Parses one buffered line, forwards its filtered delta, and reports
/// whether the line carried the `done` flag. Blank and malformed lines are
/// skipped; a server-side `error` field aborts.
async fn consume_line<F>(
    line_bytes: &[u8],
    filter: &F,
    tx: &mpsc::Sender<StreamUpdate>,
    full_response: &mut String,
) -> Result<bool>
where
    F: Fn(&str) -> String,
{
    let line = String::from_utf8_lossy(line_bytes);
    let line = line.trim();
    if line.is_empty() {
        return Ok(false);
    }

    let parsed: ChatChunk = match serde_json::from_str(line) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!("skipping malformed stream line: {}", e);
            return Ok(false);
        }
    };

    if let Some(error) = parsed.error {
        return Err(anyhow!(error));
    }

    let delta = parsed.message.map(|m| m.content).unwrap_or_default();
    let delta = filter(&delta);
    if !delta.is_empty() {
        full_response.push_str(&delta);
        tx.send(StreamUpdate::Delta(delta)).await?;
    }

    Ok(parsed.done)
}

/// Consumes a stream of raw byte chunks carrying NDJSON partial messages,
/// applies `filter` to each delta, forwards every non-empty increment over
/// `tx`, and returns the assembled response text.
///
/// Lines may be split across chunks; bytes are buffered until a newline
/// arrives. A chunk carrying an `error` field or a transport failure aborts
/// with `Err`.
pub async fn pump<S, F>(chunks: S, filter: F, tx: &mpsc::Sender<StreamUpdate>) -> Result<String>
where
    S: Stream<Item = Result<Vec<u8>>>,
    F: Fn(&str) -> String,
{
    pin_mut!(chunks);

    let mut buffer: Vec<u8> = Vec::new();
    let mut full_response = String::new();

    while let Some(chunk) = chunks.next().await {
        let bytes = chunk?;
        buffer.extend_from_slice(&bytes);

        while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = buffer.drain(..=pos).collect();
            if consume_line(&line_bytes, &filter, tx, &mut full_response).await? {
                return Ok(full_response);
            }
        }
    }

    // A server closing the stream without a trailing newline still
    // delivered a final line
    consume_line(&buffer, &filter, tx, &mut full_response).await?;

    Ok(full_response)
}

/// Worker entry point: opens the streaming chat call, pumps it, and reports
/// the terminal outcome over the channel. Every exit path sends exactly one
/// `Done` or `Failed`.
pub async fn run_chat_stream<F>(
    client: OllamaClient,
    model: String,
    messages: Vec<Message>,
    filter: F,
    tx: mpsc::Sender<StreamUpdate>,
) where
    F: Fn(&str) -> String,
{
    let result = async {
        let response = client.chat_stream(&model, &messages).await?;
        let chunks = response
            .bytes_stream()
            .map_ok(|bytes| bytes.to_vec())
            .map_err(anyhow::Error::from);
        pump(chunks, filter, &tx).await
    }
    .await;

    match result {
        Ok(full) => {
            let _ = tx.send(StreamUpdate::Done(full)).await;
        }
        Err(e) => {
            let _ = tx.send(StreamUpdate::Failed(format!("Error: {}", e))).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    fn chunk(content: &str, done: bool) -> Result<Vec<u8>> {
        Ok(format!(
            "{}\n",
            serde_json::json!({"message": {"content": content}, "done": done})
        )
        .into_bytes())
    }

    fn no_filter(delta: &str) -> String {
        delta.to_string()
    }

    #[tokio::test]
    async fn deltas_are_accumulated_and_forwarded_in_arrival_order() {
        let (tx, mut rx) = mpsc::channel(16);
        let chunks = stream::iter(vec![
            chunk("Hel", false),
            chunk("lo", false),
            chunk(" world", true),
        ]);

        let full = pump(chunks, no_filter, &tx).await.unwrap();
        assert_eq!(full, "Hello world");

        let mut seen = Vec::new();
        while let Ok(update) = rx.try_recv() {
            seen.push(update);
        }
        assert_eq!(
            seen,
            vec![
                StreamUpdate::Delta("Hel".into()),
                StreamUpdate::Delta("lo".into()),
                StreamUpdate::Delta(" world".into()),
            ]
        );
    }

    #[tokio::test]
    async fn think_markers_are_stripped_per_delta() {
        let filter = ThinkFilter::new().unwrap();
        let (tx, mut rx) = mpsc::channel(16);
        let chunks = stream::iter(vec![
            chunk("<think>pondering</think>", false),
            chunk("answer", true),
        ]);

        let full = pump(chunks, |d| filter.apply(d), &tx).await.unwrap();
        assert_eq!(full, "ponderinganswer");

        // The fully-stripped markers never reach the sink as empty deltas
        assert_eq!(rx.try_recv().unwrap(), StreamUpdate::Delta("pondering".into()));
        assert_eq!(rx.try_recv().unwrap(), StreamUpdate::Delta("answer".into()));
    }

    #[tokio::test]
    async fn marker_split_across_chunks_is_not_removed() {
        let filter = ThinkFilter::new().unwrap();
        let (tx, _rx) = mpsc::channel(16);
        let chunks = stream::iter(vec![chunk("<thi", false), chunk("nk>hi", true)]);

        // Documented edge case: filtering is per delta only
        let full = pump(chunks, |d| filter.apply(d), &tx).await.unwrap();
        assert_eq!(full, "<think>hi");
    }

    #[tokio::test]
    async fn final_line_without_trailing_newline_is_consumed() {
        let (tx, mut rx) = mpsc::channel(16);
        let bytes = serde_json::json!({"message": {"content": "tail"}, "done": true})
            .to_string()
            .into_bytes();
        let chunks = stream::iter(vec![Ok(bytes)]);

        let full = pump(chunks, no_filter, &tx).await.unwrap();
        assert_eq!(full, "tail");
        assert_eq!(rx.try_recv().unwrap(), StreamUpdate::Delta("tail".into()));
    }

    #[tokio::test]
    async fn lines_split_across_byte_chunks_are_reassembled() {
        let (tx, _rx) = mpsc::channel(16);
        let line = format!(
            "{}\n",
            serde_json::json!({"message": {"content": "xy"}, "done": true})
        );
        let bytes = line.into_bytes();
        let (head, tail) = bytes.split_at(7);
        let chunks = stream::iter(vec![Ok(head.to_vec()), Ok(tail.to_vec())]);

        let full = pump(chunks, no_filter, &tx).await.unwrap();
        assert_eq!(full, "xy");
    }

    #[tokio::test]
    async fn transport_failure_mid_stream_aborts_with_error() {
        let (tx, mut rx) = mpsc::channel(16);
        let chunks = stream::iter(vec![
            chunk("partial", false),
            Err(anyhow!("connection reset")),
        ]);

        let result = pump(chunks, no_filter, &tx).await;
        assert!(result.is_err());

        // The partial delta was forwarded before the failure
        assert_eq!(rx.try_recv().unwrap(), StreamUpdate::Delta("partial".into()));
    }

    #[tokio::test]
    async fn error_line_from_the_server_aborts_with_its_message() {
        let (tx, _rx) = mpsc::channel(16);
        let chunks = stream::iter(vec![Ok(
            b"{\"error\":\"model not found\"}\n".to_vec()
        )]);

        let err = pump(chunks, no_filter, &tx).await.unwrap_err();
        assert_eq!(err.to_string(), "model not found");
    }

    #[tokio::test]
    async fn missing_message_field_defaults_to_empty_delta() {
        let (tx, mut rx) = mpsc::channel(16);
        let chunks = stream::iter(vec![
            Ok(b"{\"done\":false}\n".to_vec()),
            chunk("tail", true),
        ]);

        let full = pump(chunks, no_filter, &tx).await.unwrap();
        assert_eq!(full, "tail");
        assert_eq!(rx.try_recv().unwrap(), StreamUpdate::Delta("tail".into()));
    }
}

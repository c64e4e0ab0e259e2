//! `storymap parse` command: run model output through the stream parser and
//! print one JSON event per line.

use std::path::Path;

use anyhow::{Context, Result};
use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncReadExt};
use uuid::Uuid;

use storymap_core::{ParserOptions, StreamEvent, parse_action_stream};

const CHUNK_SIZE: usize = 4096;

/// Turn an async reader into a stream of byte chunks.
fn chunks<R>(reader: R) -> impl futures::Stream<Item = std::io::Result<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    futures::stream::unfold(Some(reader), |state| async move {
        let mut reader = state?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        match reader.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(buf), Some(reader)))
            }
            Err(e) => Some((Err(e), None)),
        }
    })
}

/// Run the parse command over `file`, or stdin when `None`.
pub async fn run_parse(
    file: Option<&Path>,
    project: Option<&str>,
    whole_document: bool,
) -> Result<()> {
    let project_id = project
        .map(|p| Uuid::parse_str(p).with_context(|| format!("invalid project ID: {p}")))
        .transpose()?;
    let options = ParserOptions {
        project_id,
        ndjson: !whole_document,
    };

    let count = match file {
        Some(path) => {
            let f = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("failed to open {}", path.display()))?;
            print_events(parse_action_stream(chunks(f), options)).await?
        }
        None => print_events(parse_action_stream(chunks(tokio::io::stdin()), options)).await?,
    };

    tracing::debug!(events = count, "parse finished");
    Ok(())
}

async fn print_events(events: impl futures::Stream<Item = StreamEvent>) -> Result<usize> {
    let mut events = std::pin::pin!(events);
    let mut count = 0;
    while let Some(event) = events.next().await {
        let line = serde_json::to_string(&event).context("failed to serialize event")?;
        println!("{line}");
        count += 1;
    }
    Ok(count)
}

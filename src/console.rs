//! Line-oriented chat loop over any async reader/writer.

use futures::StreamExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::{RunConfig, StreamingMode};
use crate::error::Result;
use crate::runner::Runner;
use crate::types::Content;

/// Run one turn per input line until EOF.
///
/// In SSE mode only the streamed fragments are printed, so the consolidated
/// final reply is not repeated. Turn errors are printed and the loop goes on.
pub async fn run_console<R, W>(
    runner: &Runner,
    user_id: &str,
    session_id: &str,
    streaming_mode: StreamingMode,
    input: R,
    mut output: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    loop {
        output.write_all(b"\nUser -> ").await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        output.write_all(b"\nAgent -> ").await?;
        let run_config = RunConfig::default().with_streaming_mode(streaming_mode);
        let mut events = runner.run(user_id, session_id, Some(Content::user_text(line)), run_config);
        while let Some(item) = events.next().await {
            match item {
                Ok(event) => {
                    if streaming_mode != StreamingMode::Sse || event.is_partial() {
                        output.write_all(event.text().as_bytes()).await?;
                    }
                }
                Err(e) => {
                    output
                        .write_all(format!("\nAGENT_ERROR: {e}\n").as_bytes())
                        .await?;
                }
            }
            output.flush().await?;
        }
    }
    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(())
}

//! Console presentation layer.
//!
//! Each non-empty stdin line is one outbound message; each inbound message
//! is printed on its own line. Ends when stdin closes or the network loop
//! stops delivering.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;

use super::OutboundSender;
use crate::error::SendError;

/// Run the console on the process's stdin and stdout.
pub async fn run_console(outbound: OutboundSender, inbound: UnboundedReceiver<Vec<u8>>) {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    if let Err(err) = run_with(stdin, &mut stdout, outbound, inbound).await {
        tracing::warn!(error = %err, "Console stopped");
    }
}

/// Console loop over arbitrary line input and text output.
pub async fn run_with<R, W>(
    input: R,
    output: &mut W,
    outbound: OutboundSender,
    mut inbound: UnboundedReceiver<Vec<u8>>,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(());
                };
                let line = line.trim_end_matches('\r');
                if line.is_empty() {
                    continue;
                }
                match outbound.send(line) {
                    Ok(()) => {}
                    Err(SendError::TooLarge(err)) => {
                        tracing::warn!(error = %err, "Message not sent");
                    }
                    Err(SendError::Closed) => return Ok(()),
                }
            }
            message = inbound.recv() => {
                let Some(payload) = message else {
                    return Ok(());
                };
                output.write_all(&payload).await?;
                output.write_all(b"\n").await?;
                output.flush().await?;
            }
        }
    }
}

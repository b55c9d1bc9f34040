//! Terminal front-end that chats with one peer.
//!
//! A `Conversation` owns a connected [`RelayClient`] and the name of the
//! peer every typed line goes to. Incoming messages are printed as
//! `sender>>body`, followed by a fresh `name>>` prompt.

use std::io::BufRead;
use std::thread;

use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use relay_core::ClientName;

use crate::client::RelayClient;
use crate::error::Result;

/// Lines read ahead of the conversation loop.
const INPUT_BUFFER: usize = 16;

type InputLines = mpsc::Receiver<std::io::Result<String>>;

/// Typing a line that starts with this word (any case) sends it and leaves.
pub const GOODBYE: &str = "goodbye";

/// A chat session between the client and a single peer.
pub struct Conversation {
    client: RelayClient,
    peer: ClientName,
}

impl Conversation {
    pub fn new(client: RelayClient, peer: impl Into<ClientName>) -> Self {
        Self {
            client,
            peer: peer.into(),
        }
    }

    pub fn peer(&self) -> &ClientName {
        &self.peer
    }

    /// Runs the conversation on the process's stdin and stdout.
    ///
    /// Stdin is read on its own thread: a blocking terminal read cannot be
    /// cancelled, and the conversation has to end as soon as the relay
    /// goes away.
    pub async fn run_stdio(self) -> Result<()> {
        let lines = read_lines_on_thread(std::io::BufReader::new(std::io::stdin()))?;
        self.run_lines(lines, io::stdout()).await
    }

    /// Runs until the input ends, a goodbye line is sent, or the relay
    /// closes the stream.
    ///
    /// Empty lines are ignored.
    ///
    /// # Errors
    ///
    /// A failed send or a failed write to `output`. Lines the relay would
    /// refuse to frame are reported on `output` and skipped.
    pub async fn run<I, O>(self, input: I, output: O) -> Result<()>
    where
        I: AsyncBufRead + Unpin + Send + 'static,
        O: AsyncWrite + Unpin,
    {
        let (tx, rx) = mpsc::channel(INPUT_BUFFER);
        let reader = tokio::spawn(async move {
            let mut lines = input.lines();
            loop {
                let line = lines.next_line().await.transpose();
                let Some(line) = line else { break };
                let failed = line.is_err();
                if tx.send(line).await.is_err() || failed {
                    break;
                }
            }
        });

        let result = self.run_lines(rx, output).await;
        reader.abort();
        result
    }

    async fn run_lines<O>(self, mut lines: InputLines, mut output: O) -> Result<()>
    where
        O: AsyncWrite + Unpin,
    {
        let Self { client, peer } = self;
        let name = client.name().clone();
        let (mut sender, mut receiver) = client.into_split();

        info!(client = %name, peer = %peer, "Conversation started");
        prompt(&mut output, &name).await?;

        loop {
            tokio::select! {
                incoming = receiver.receive() => {
                    let Some(envelope) = incoming else {
                        output.write_all(b"\nRelay closed the connection.\n").await?;
                        output.flush().await?;
                        info!(client = %name, peer = %peer, "Relay closed the conversation");
                        return Ok(());
                    };
                    let text = format!("\n{}>>{}\n", envelope.peer, envelope.body);
                    output.write_all(text.as_bytes()).await?;
                    prompt(&mut output, &name).await?;
                }

                line = lines.recv() => {
                    let Some(line) = line.transpose()? else {
                        debug!(client = %name, "Input closed");
                        break;
                    };
                    if line.is_empty() {
                        prompt(&mut output, &name).await?;
                        continue;
                    }

                    match sender.send(peer.as_str(), &line).await {
                        Ok(()) => {}
                        Err(e) if e.is_invalid_input() => {
                            output.write_all(format!("Not sent: {e}\n").as_bytes()).await?;
                        }
                        Err(e) => return Err(e),
                    }

                    if is_goodbye(&line) {
                        break;
                    }
                    prompt(&mut output, &name).await?;
                }
            }
        }

        info!(client = %name, peer = %peer, "Conversation ended");
        sender.close().await
    }
}

/// Reads lines from a blocking source on a detached thread.
///
/// The thread stops at end of input, on the first read error, or once the
/// receiver is dropped and the next line arrives.
fn read_lines_on_thread<R>(input: R) -> Result<InputLines>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(INPUT_BUFFER);
    thread::Builder::new()
        .name("relay-input".to_string())
        .spawn(move || {
            for line in input.lines() {
                let failed = line.is_err();
                if tx.blocking_send(line).is_err() || failed {
                    break;
                }
            }
        })?;
    Ok(rx)
}

async fn prompt<O>(output: &mut O, name: &ClientName) -> Result<()>
where
    O: AsyncWrite + Unpin,
{
    output.write_all(format!("{name}>>").as_bytes()).await?;
    output.flush().await?;
    Ok(())
}

fn is_goodbye(line: &str) -> bool {
    line.get(..GOODBYE.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(GOODBYE))
}

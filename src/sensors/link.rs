// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/quakewatch

//! Hardware link transports

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{Command, CommandSink, LineSource};
use crate::error::{Error, Result};

/// Line source over any buffered async reader (stdin, TCP, test fixtures)
pub struct ReaderSource<R> {
    name: String,
    reader: R,
    buf: String,
}

impl<R> ReaderSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(name: &str, reader: R) -> Self {
        Self {
            name: name.to_string(),
            reader,
            buf: String::new(),
        }
    }
}

#[async_trait]
impl<R> LineSource for ReaderSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_line(&mut self) -> Option<std::io::Result<String>> {
        self.buf.clear();
        match self.reader.read_line(&mut self.buf).await {
            Ok(0) => None,
            Ok(_) => Some(Ok(self.buf.trim_end_matches(['\r', '\n']).to_string())),
            Err(e) => Some(Err(e)),
        }
    }
}

/// Bounded, non-blocking command queue in front of a transport writer
#[derive(Clone)]
pub struct ChannelCommandSink {
    tx: mpsc::Sender<Command>,
}

impl ChannelCommandSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Command>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl CommandSink for ChannelCommandSink {
    fn submit(&self, command: Command) -> Result<()> {
        self.tx.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => Error::Transport("command queue full".to_string()),
            mpsc::error::TrySendError::Closed(_) => Error::Transport("transport closed".to_string()),
        })
    }
}

/// Drain `commands` into `writer`, one JSON object per line
pub async fn write_commands<W>(mut writer: W, mut commands: mpsc::Receiver<Command>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = commands.recv().await {
        let line = command.to_line()?;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        debug!("Sent command: {}", line.trim_end());
    }
    info!("Command writer finished");
    Ok(())
}

#[cfg(feature = "serial")]
pub use serial::{open_serial, SerialSource};

#[cfg(feature = "serial")]
mod serial {
    use std::io::{BufRead, BufReader, ErrorKind, Write};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use tracing::{info, warn};

    use super::ChannelCommandSink;
    use crate::error::{Error, Result};
    use crate::sensors::LineSource;

    const READ_TIMEOUT: Duration = Duration::from_millis(200);
    const LINE_QUEUE: usize = 256;

    /// Lines read off a serial port by a blocking reader thread
    pub struct SerialSource {
        name: String,
        lines: mpsc::Receiver<std::io::Result<String>>,
    }

    #[async_trait]
    impl LineSource for SerialSource {
        fn name(&self) -> &str {
            &self.name
        }

        async fn next_line(&mut self) -> Option<std::io::Result<String>> {
            self.lines.recv().await
        }
    }

    /// Open `path` and start its reader and writer threads
    pub fn open_serial(path: &str, baud_rate: u32, command_queue: usize) -> Result<(SerialSource, ChannelCommandSink)> {
        let port = serialport::new(path, baud_rate)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| Error::Transport(format!("{}: {}", path, e)))?;
        let mut writer = port
            .try_clone()
            .map_err(|e| Error::Transport(format!("{}: {}", path, e)))?;

        info!("Opened serial port {} at {} baud", path, baud_rate);

        let (line_tx, line_rx) = mpsc::channel(LINE_QUEUE);
        std::thread::spawn(move || {
            let mut reader = BufReader::new(port);
            let mut line = String::new();
            loop {
                match reader.read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) => {
                        let text = line.trim_end_matches(['\r', '\n']).to_string();
                        line.clear();
                        if line_tx.blocking_send(Ok(text)).is_err() {
                            break;
                        }
                    }
                    // Partial input stays in `line` until the rest arrives
                    Err(e) if e.kind() == ErrorKind::TimedOut => {
                        if line_tx.is_closed() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Serial read failed: {}", e);
                        let _ = line_tx.blocking_send(Err(e));
                        break;
                    }
                }
            }
        });

        let (sink, mut commands) = ChannelCommandSink::channel(command_queue);
        std::thread::spawn(move || {
            while let Some(command) = commands.blocking_recv() {
                let written = command
                    .to_line()
                    .map_err(|e| std::io::Error::new(ErrorKind::InvalidData, e))
                    .and_then(|line| writer.write_all(line.as_bytes()))
                    .and_then(|_| writer.flush());
                if let Err(e) = written {
                    warn!("Serial write failed: {}", e);
                    break;
                }
            }
        });

        Ok((
            SerialSource {
                name: path.to_string(),
                lines: line_rx,
            },
            sink,
        ))
    }
}

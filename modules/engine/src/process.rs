use async_trait::async_trait;
use log::{debug, info, warn};
use std::io;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::parser::{AdvertisedOption, UciMessage, parse_uci_line};
use crate::{EngineChannel, EngineConfig, EngineError};

const QUIT_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Normal,
    Crashed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Running,
    Terminated(Exit),
}

/// What the engine announced between `uci` and `uciok`.
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    pub name: Option<String>,
    pub author: Option<String>,
    pub options: Vec<AdvertisedOption>,
}

/// Sends `uci` and collects identification and options until `uciok`.
pub async fn handshake(
    channel: &mut dyn EngineChannel,
    config: &EngineConfig,
) -> Result<Handshake, EngineError> {
    let limit = config.handshake_line_limit;
    let wait = async {
        channel.send_line("uci").await?;
        let mut handshake = Handshake::default();
        for _ in 0..limit {
            let Some(line) = channel.read_line(None).await? else {
                return Err(EngineError::StartFailed(
                    "engine exited before uciok".to_string(),
                ));
            };
            match parse_uci_line(&line) {
                Some(UciMessage::UciOk) => return Ok(handshake),
                Some(UciMessage::IdName(name)) => handshake.name = Some(name),
                Some(UciMessage::IdAuthor(author)) => handshake.author = Some(author),
                Some(UciMessage::Option(option)) => handshake.options.push(option),
                _ => {}
            }
        }
        Err(EngineError::StartFailed(format!(
            "no uciok within {} lines",
            limit
        )))
    };

    tokio::time::timeout(config.handshake_timeout(), wait)
        .await
        .map_err(|_| EngineError::StartFailed("timed out waiting for uciok".to_string()))?
        .map_err(|e| match e {
            EngineError::StartFailed(_) => e,
            other => EngineError::StartFailed(other.to_string()),
        })
}

/// Forwards every line of `reader` into `lines` until the pipe closes.
fn forward_lines<R>(reader: R, lines: mpsc::UnboundedSender<io::Result<String>>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader).lines();
        loop {
            match reader.next_line().await {
                Ok(Some(line)) => {
                    if lines.send(Ok(line)).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = lines.send(Err(e));
                    break;
                }
            }
        }
    })
}

/// A running engine process. Stdout and stderr are merged into one line
/// stream; some Stockfish commands (`bench`) report on stderr.
pub struct ProcessChannel {
    config: EngineConfig,
    child: Child,
    stdin: ChildStdin,
    lines: mpsc::UnboundedReceiver<io::Result<String>>,
    readers: [JoinHandle<()>; 2],
    state: ChannelState,
    quit_sent: bool,
}

impl ProcessChannel {
    /// Spawns the engine and completes the `uci` handshake.
    pub async fn start(config: &EngineConfig) -> Result<(Self, Handshake), EngineError> {
        let mut child = Command::new(&config.path)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::StartFailed(format!("{}: {}", config.path, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::StartFailed("stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::StartFailed("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::StartFailed("stderr not captured".to_string()))?;

        let (tx, lines) = mpsc::unbounded_channel();
        let readers = [forward_lines(stdout, tx.clone()), forward_lines(stderr, tx)];

        let mut channel = Self {
            config: config.clone(),
            child,
            stdin,
            lines,
            readers,
            state: ChannelState::Running,
            quit_sent: false,
        };

        match handshake(&mut channel, config).await {
            Ok(handshake) => {
                info!(
                    "Started engine {} ({})",
                    config.path,
                    handshake.name.as_deref().unwrap_or("unnamed")
                );
                Ok((channel, handshake))
            }
            Err(e) => {
                let _ = channel.terminate().await;
                Err(e)
            }
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    fn mark_exited(&mut self) {
        if self.state == ChannelState::Running {
            let exit = if self.quit_sent {
                Exit::Normal
            } else {
                warn!("Engine {} exited unexpectedly", self.config.path);
                Exit::Crashed
            };
            self.state = ChannelState::Terminated(exit);
        }
    }

    fn exit_description(&mut self) -> String {
        match self.child.try_wait() {
            Ok(Some(status)) => format!("engine exited with {}", status),
            _ => "engine closed its pipes".to_string(),
        }
    }
}

#[async_trait]
impl EngineChannel for ProcessChannel {
    async fn send_line(&mut self, line: &str) -> Result<(), EngineError> {
        if let ChannelState::Terminated(_) = self.state {
            return Err(EngineError::Unavailable);
        }
        let written = async {
            self.stdin.write_all(format!("{}\n", line).as_bytes()).await?;
            self.stdin.flush().await
        }
        .await;

        match written {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe || !self.is_alive() => {
                self.mark_exited();
                Err(EngineError::Crashed(self.exit_description()))
            }
            Err(e) => Err(EngineError::Io(e)),
        }
    }

    async fn read_line(&mut self, timeout: Option<Duration>) -> Result<Option<String>, EngineError> {
        let next = self.lines.recv();
        let received = match timeout {
            Some(limit) => tokio::time::timeout(limit, next)
                .await
                .map_err(|_| EngineError::Timeout)?,
            None => next.await,
        };
        match received {
            Some(Ok(line)) => Ok(Some(line.trim_end().to_string())),
            Some(Err(e)) => Err(EngineError::Io(e)),
            // Both pipes closed.
            None => {
                self.mark_exited();
                Ok(None)
            }
        }
    }

    fn is_alive(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(_)) | Err(_) => {
                self.mark_exited();
                false
            }
        }
    }

    async fn terminate(&mut self) -> Result<(), EngineError> {
        if self.is_alive() {
            if self.send_line("quit").await.is_ok() {
                self.quit_sent = true;
            }
            if tokio::time::timeout(QUIT_GRACE, self.child.wait())
                .await
                .is_err()
            {
                warn!("Engine {} ignored quit, killing it", self.config.path);
                self.child.kill().await?;
            }
        }
        self.state = match self.state {
            ChannelState::Running => ChannelState::Terminated(Exit::Normal),
            terminated => terminated,
        };
        debug!("Engine {} terminated ({:?})", self.config.path, self.state);
        Ok(())
    }

    async fn spawn_probe(&mut self) -> Result<Box<dyn EngineChannel>, EngineError> {
        let (channel, _) = ProcessChannel::start(&self.config).await?;
        Ok(Box::new(channel))
    }
}

impl Drop for ProcessChannel {
    fn drop(&mut self) {
        // Best effort to kill the child process
        if self.state == ChannelState::Running {
            let _ = self.child.start_kill();
        }
        for reader in &self.readers {
            reader.abort();
        }
    }
}

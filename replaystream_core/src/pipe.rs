//! Pipe bridge: a producer task writes, the caller reads
//!
//! The producer closure runs on its own worker (a dedicated OS thread or the
//! tokio blocking pool) and writes into a [`PipeWriter`]. The caller reads the
//! same bytes, in order, through the [`ByteSource`] side. The two ends meet at
//! a bounded tokio channel of `Bytes` chunks, so a fast producer blocks once
//! the channel is full.
//!
//! Both ends use the blocking channel API and must not be driven from inside
//! an async executor thread.

use crate::error::{IoError, ProducerError, ProtocolError, ValidationError};
use crate::source::{ByteSink, ByteSource, DEFAULT_CHUNK_SIZE};
use crate::{Error, Result};
use bytes::{Buf, Bytes};
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use std::io::Read;
use tokio::sync::{mpsc, oneshot};

/// Default bytes in flight between producer and consumer (1MB)
pub const DEFAULT_PIPE_BUFFER: usize = 1024 * 1024;

/// Where producer tasks run
#[derive(Debug, Clone)]
pub enum ExecutionStrategy {
    /// One OS thread per bridge
    Dedicated,
    /// The blocking pool of a tokio runtime
    Pool(tokio::runtime::Handle),
}

/// Serializable strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Dedicated,
    Pool,
}

/// Pipe bridge configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipeConfig {
    /// Bytes that may be in flight before the producer blocks
    pub buffer_size: usize,
    /// Largest chunk handed through the channel
    pub chunk_size: usize,
    /// Worker selection
    pub strategy: StrategyKind,
    /// Whether `close` waits for the producer to finish
    pub join_on_close: bool,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_PIPE_BUFFER,
            chunk_size: DEFAULT_CHUNK_SIZE,
            strategy: StrategyKind::Dedicated,
            join_on_close: false,
        }
    }
}

impl PipeConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(ValidationError::invalid_parameter(
                "chunk_size",
                "must be greater than zero",
            )
            .into());
        }
        if self.buffer_size == 0 {
            return Err(ValidationError::invalid_parameter(
                "buffer_size",
                "must be greater than zero",
            )
            .into());
        }
        Ok(())
    }

    /// Channel capacity in chunks
    pub fn capacity(&self) -> usize {
        (self.buffer_size / self.chunk_size.max(1)).max(1)
    }

    /// Resolve the strategy, picking up the ambient tokio runtime for `Pool`
    pub fn execution_strategy(&self) -> Result<ExecutionStrategy> {
        match self.strategy {
            StrategyKind::Dedicated => Ok(ExecutionStrategy::Dedicated),
            StrategyKind::Pool => tokio::runtime::Handle::try_current()
                .map(ExecutionStrategy::Pool)
                .map_err(|_| {
                    ValidationError::invalid_configuration(
                        "pool strategy requires a tokio runtime context",
                    )
                    .into()
                }),
        }
    }
}

/// Producer end of a pipe
///
/// Writes block while the channel is full and fail with a broken-pipe error
/// once the consumer has closed its end.
pub struct PipeWriter {
    tx: Option<mpsc::Sender<Bytes>>,
    chunk_size: usize,
    written: u64,
}

impl PipeWriter {
    fn new(tx: mpsc::Sender<Bytes>, chunk_size: usize) -> Self {
        Self {
            tx: Some(tx),
            chunk_size,
            written: 0,
        }
    }

    /// Bytes accepted so far
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Whether the consumer has gone away
    pub fn is_disconnected(&self) -> bool {
        self.tx.as_ref().is_none_or(|tx| tx.is_closed())
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        let tx = self.tx.as_ref().ok_or(ProtocolError::closed("pipe writer"))?;
        for chunk in data.chunks(self.chunk_size) {
            tx.blocking_send(Bytes::copy_from_slice(chunk))
                .map_err(|_| IoError::broken_pipe("pipe"))?;
            self.written += chunk.len() as u64;
        }
        Ok(())
    }
}

impl ByteSink for PipeWriter {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.send(data)
    }

    /// Signal end-of-data to the consumer early
    fn close(&mut self) -> Result<()> {
        self.tx.take();
        Ok(())
    }
}

impl std::io::Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.send(buf).map_err(std::io::Error::from)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Producer closure plus everything it needs, built before it is scheduled
struct PendingTask<T, F> {
    producer: F,
    writer: PipeWriter,
    outcome: oneshot::Sender<std::result::Result<T, ProducerError>>,
}

impl<T, F> PendingTask<T, F>
where
    F: FnOnce(&mut PipeWriter) -> Result<T>,
{
    fn run(self) {
        let PendingTask {
            producer,
            mut writer,
            outcome,
        } = self;

        let result = producer(&mut writer).map_err(ProducerError::failed);
        match &result {
            Ok(_) => debug!("Producer finished after {} bytes", writer.bytes_written()),
            Err(e) => debug!("Producer failed after {} bytes: {e}", writer.bytes_written()),
        }

        // Outcome before end-of-data: a consumer that sees end-of-data can
        // always observe a failure.
        let _ = outcome.send(result);
        drop(writer);
    }
}

enum TaskHandle {
    Thread(std::thread::JoinHandle<()>),
    Pool {
        runtime: tokio::runtime::Handle,
        task: tokio::task::JoinHandle<()>,
    },
}

enum Outcome<T> {
    Value(T),
    Failed(ProducerError),
    Taken,
}

/// Consumer end of a pipe: a [`ByteSource`] fed by a producer task
pub struct PipeBridge<T> {
    rx: Option<mpsc::Receiver<Bytes>>,
    current: Bytes,
    outcome_rx: Option<oneshot::Receiver<std::result::Result<T, ProducerError>>>,
    outcome: Option<Outcome<T>>,
    task: Option<TaskHandle>,
    join_on_close: bool,
    end_of_data: bool,
    closed: bool,
}

impl<T: Send + 'static> PipeBridge<T> {
    /// Start `producer` using the strategy named in `config`
    pub fn spawn<F>(config: &PipeConfig, producer: F) -> Result<Self>
    where
        F: FnOnce(&mut PipeWriter) -> Result<T> + Send + 'static,
    {
        let strategy = config.execution_strategy()?;
        Self::spawn_with(config, strategy, producer)
    }

    /// Start `producer` on an explicit worker
    pub fn spawn_with<F>(
        config: &PipeConfig,
        strategy: ExecutionStrategy,
        producer: F,
    ) -> Result<Self>
    where
        F: FnOnce(&mut PipeWriter) -> Result<T> + Send + 'static,
    {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.capacity());
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let task = PendingTask {
            producer,
            writer: PipeWriter::new(tx, config.chunk_size),
            outcome: outcome_tx,
        };

        let handle = match strategy {
            ExecutionStrategy::Dedicated => {
                let thread = std::thread::Builder::new()
                    .name("replaystream-pipe".to_string())
                    .spawn(move || task.run())
                    .map_err(|e| IoError::from_std(e).with_layer("pipe"))?;
                TaskHandle::Thread(thread)
            }
            ExecutionStrategy::Pool(runtime) => {
                let join = runtime.spawn_blocking(move || task.run());
                TaskHandle::Pool {
                    runtime,
                    task: join,
                }
            }
        };
        debug!(
            "Pipe started ({} chunks of up to {} bytes)",
            config.capacity(),
            config.chunk_size
        );

        Ok(Self {
            rx: Some(rx),
            current: Bytes::new(),
            outcome_rx: Some(outcome_rx),
            outcome: None,
            task: Some(handle),
            join_on_close: config.join_on_close,
            end_of_data: false,
            closed: false,
        })
    }

    /// The producer's result
    ///
    /// Only available after `close`; waits for the producer if it is still
    /// running. A failure is reported on every call, a value only once.
    pub fn result(&mut self) -> Result<T> {
        if !self.closed {
            return Err(ProtocolError::ResultBeforeClose.into());
        }
        self.wait_for_outcome();

        match self.outcome.take() {
            Some(Outcome::Value(value)) => {
                self.outcome = Some(Outcome::Taken);
                Ok(value)
            }
            Some(Outcome::Failed(err)) => {
                self.outcome = Some(Outcome::Failed(err.clone()));
                Err(Error::Producer(err))
            }
            Some(Outcome::Taken) | None => {
                self.outcome = Some(Outcome::Taken);
                Err(ProtocolError::ResultAlreadyTaken.into())
            }
        }
    }

    /// Whether the producer has reported its outcome
    pub fn is_finished(&mut self) -> bool {
        self.poll_outcome();
        self.outcome.is_some()
    }

    fn store_outcome(
        &mut self,
        received: std::result::Result<std::result::Result<T, ProducerError>, ()>,
    ) {
        self.outcome_rx = None;
        self.outcome = Some(match received {
            Ok(Ok(value)) => Outcome::Value(value),
            Ok(Err(err)) => Outcome::Failed(err),
            Err(()) => Outcome::Failed(ProducerError::Vanished),
        });
    }

    fn poll_outcome(&mut self) {
        let Some(rx) = self.outcome_rx.as_mut() else {
            return;
        };
        match rx.try_recv() {
            Ok(outcome) => self.store_outcome(Ok(outcome)),
            Err(oneshot::error::TryRecvError::Empty) => {}
            Err(oneshot::error::TryRecvError::Closed) => self.store_outcome(Err(())),
        }
    }

    fn wait_for_outcome(&mut self) {
        let Some(rx) = self.outcome_rx.take() else {
            return;
        };
        let received = rx.blocking_recv().map_err(|_| ());
        self.store_outcome(received);
    }

    fn join_task(&mut self) {
        match self.task.take() {
            Some(TaskHandle::Thread(thread)) => {
                if thread.join().is_err() {
                    warn!("Pipe producer thread panicked");
                }
            }
            Some(TaskHandle::Pool { runtime, task }) => {
                if runtime.block_on(task).is_err() {
                    warn!("Pipe producer task panicked");
                }
            }
            None => {}
        }
    }

    fn end_of_stream(&mut self) -> Result<usize> {
        self.poll_outcome();
        match &self.outcome {
            Some(Outcome::Failed(err)) => Err(Error::Producer(err.clone())),
            _ => Ok(0),
        }
    }
}

impl<T: Send + 'static> ByteSource for PipeBridge<T> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.closed {
            return Err(ProtocolError::closed("pipe").into());
        }
        if buf.is_empty() {
            return Ok(0);
        }

        loop {
            if !self.current.is_empty() {
                let n = buf.len().min(self.current.len());
                buf[..n].copy_from_slice(&self.current[..n]);
                self.current.advance(n);
                return Ok(n);
            }
            if self.end_of_data {
                return self.end_of_stream();
            }

            let received = match self.rx.as_mut() {
                Some(rx) => rx.blocking_recv(),
                None => None,
            };
            match received {
                Some(chunk) => {
                    trace!("Pipe received {} bytes", chunk.len());
                    self.current = chunk;
                }
                None => self.end_of_data = true,
            }
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.current = Bytes::new();

        if let Some(mut rx) = self.rx.take() {
            // Pending and future producer writes now fail.
            rx.close();
        }

        if self.join_on_close {
            self.wait_for_outcome();
            self.join_task();
            debug!("Pipe closed after producer finished");
        } else {
            debug!("Pipe closed");
        }
        Ok(())
    }

    fn layer(&self) -> &'static str {
        "pipe"
    }
}

impl PipeBridge<u64> {
    /// Pipe the contents of `reader`, produced on a worker
    ///
    /// The producer's result is the number of bytes copied.
    pub fn from_reader<R>(config: &PipeConfig, reader: R) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        Self::spawn(config, move |writer| {
            let mut reader = reader;
            std::io::copy(&mut reader, writer).map_err(|e| {
                if e.kind() == std::io::ErrorKind::BrokenPipe {
                    IoError::broken_pipe("pipe").into()
                } else {
                    IoError::read_failed("pipe", e).into()
                }
            })
        })
    }
}

use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use hanalink_frame::{Frame, FrameConfig, FrameError, FrameStream, MessageWriter, ReaderStats};
use hanalink_transport::DeviceStream;
use tracing::{debug, info, warn};

use crate::error::{DecodeError, Result};
use crate::tracker::{PendingRequest, RequestTracker, TrackerConfig, TrackerStats};

/// Configuration for a [`Connection`].
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Framing options. `read_timeout` is replaced by `poll_interval` for
    /// the reader thread.
    pub frame: FrameConfig,
    /// Request tracking options.
    pub tracker: TrackerConfig,
    /// How often unanswered requests are checked for resending. Default: 2 s.
    pub sweep_interval: Duration,
    /// How long the reader thread blocks before re-checking for shutdown.
    /// Default: 100 ms.
    pub poll_interval: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            tracker: TrackerConfig::default(),
            sweep_interval: Duration::from_secs(2),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// A live link to one controller.
///
/// Owns a reader thread that feeds incoming frames to the tracker and a
/// sweep thread that resends overdue requests. Dropping the connection
/// closes it.
pub struct Connection {
    tracker: Arc<RequestTracker<DeviceStream>>,
    control: DeviceStream,
    peer: String,
    running: Arc<AtomicBool>,
    stop_sweep: Option<mpsc::Sender<()>>,
    reader: Option<JoinHandle<ReaderStats>>,
    sweeper: Option<JoinHandle<()>>,
}

impl Connection {
    /// Start driving `stream`.
    pub fn open(stream: DeviceStream, config: ConnectionConfig) -> Result<Self> {
        let peer = stream.peer().to_string();
        let reader_stream = stream.try_clone()?;
        let control = stream.try_clone()?;

        let reader_config = FrameConfig {
            read_timeout: Some(config.poll_interval),
            ..config.frame.clone()
        };
        let frames = FrameStream::with_config_device(reader_stream, &reader_config)?;
        let writer = MessageWriter::with_config_device(stream, &config.frame)?;

        let tracker = Arc::new(RequestTracker::new(writer, config.tracker.clone()));
        let running = Arc::new(AtomicBool::new(true));

        let reader = thread::Builder::new()
            .name(format!("hanalink-reader {peer}"))
            .spawn({
                let tracker = Arc::clone(&tracker);
                let running = Arc::clone(&running);
                move || read_loop(frames, &tracker, &running)
            })
            .map_err(FrameError::Io)?;

        let (stop_sweep, stop_rx) = mpsc::channel();
        let sweeper = thread::Builder::new()
            .name(format!("hanalink-sweep {peer}"))
            .spawn({
                let tracker = Arc::clone(&tracker);
                let interval = config.sweep_interval;
                move || sweep_loop(&tracker, &stop_rx, interval)
            });
        let sweeper = match sweeper {
            Ok(handle) => handle,
            Err(err) => {
                running.store(false, Ordering::SeqCst);
                tracker.shutdown();
                let _ = control.shutdown();
                return Err(FrameError::Io(err).into());
            }
        };

        info!(peer = %peer, "connection opened");
        Ok(Self {
            tracker,
            control,
            peer,
            running,
            stop_sweep: Some(stop_sweep),
            reader: Some(reader),
            sweeper: Some(sweeper),
        })
    }

    /// Send `body` (`type | len | payload`) and return a handle to the reply.
    pub fn request<T, D>(&self, body: &[u8], decoder: D) -> Result<PendingRequest<T>>
    where
        T: Send + 'static,
        D: FnOnce(&Frame) -> std::result::Result<T, DecodeError> + Send + 'static,
    {
        self.tracker.request(body, decoder)
    }

    /// The request tracker driven by this connection.
    pub fn tracker(&self) -> &Arc<RequestTracker<DeviceStream>> {
        &self.tracker
    }

    /// Whether the link is up and accepting requests.
    pub fn is_connected(&self) -> bool {
        self.tracker.is_open()
    }

    /// Remote address or port path.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Request counters so far.
    pub fn stats(&self) -> TrackerStats {
        self.tracker.stats()
    }

    /// Shut down gracefully.
    ///
    /// Outstanding requests fail with `ShutDown`. Returns the frame reader's
    /// counters.
    pub fn close(mut self) -> ReaderStats {
        self.stop()
    }

    fn stop(&mut self) -> ReaderStats {
        if !self.running.swap(false, Ordering::SeqCst) {
            return ReaderStats::default();
        }

        let failed = self.tracker.shutdown();
        if let Err(err) = self.control.shutdown() {
            debug!(error = %err, "stream shutdown failed");
        }
        drop(self.stop_sweep.take());

        if let Some(handle) = self.sweeper.take() {
            if handle.join().is_err() {
                warn!("sweep thread panicked");
            }
        }
        let stats = match self.reader.take().map(JoinHandle::join) {
            Some(Ok(stats)) => stats,
            Some(Err(_)) => {
                warn!("reader thread panicked");
                ReaderStats::default()
            }
            None => ReaderStats::default(),
        };

        info!(
            peer = %self.peer,
            failed,
            frames = stats.frames,
            checksum_errors = stats.checksum_errors,
            "connection closed"
        );
        stats
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

fn read_loop(
    mut frames: FrameStream<DeviceStream>,
    tracker: &RequestTracker<DeviceStream>,
    running: &AtomicBool,
) -> ReaderStats {
    loop {
        match frames.read_frame() {
            Ok(frame) => {
                tracker.on_frame(frame);
            }
            Err(FrameError::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
            }
            Err(err) => {
                if running.load(Ordering::SeqCst) {
                    info!(error = %err, "device link lost");
                    tracker.on_disconnect();
                }
                break;
            }
        }
    }
    frames.reader().stats()
}

fn sweep_loop(
    tracker: &RequestTracker<DeviceStream>,
    stop: &mpsc::Receiver<()>,
    interval: Duration,
) {
    loop {
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => {}
            // Sender dropped: the connection is closing.
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
        if !tracker.is_open() {
            return;
        }
        if let Err(err) = tracker.sweep_timeouts(Instant::now()) {
            warn!(error = %err, "resend failed");
            tracker.on_disconnect();
            return;
        }
    }
}

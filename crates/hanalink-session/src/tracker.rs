use std::collections::HashMap;
use std::future::Future;
use std::io::Write;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use hanalink_frame::{encode_message, type_name, Frame, MessageWriter};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::{DecodeError, Result, SessionError};

/// Usable sequence numbers: the full byte range minus the header value.
pub const SEQUENCE_SPACE: usize = 255;

/// Configuration for request tracking.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Age after which an unanswered request is resent. Default: 2 s.
    pub timeout: Duration,
    /// Give up after this many resends. `None` (default) resends until the
    /// reply arrives or the connection goes away.
    pub max_resends: Option<u32>,
    /// Upper bound on concurrently outstanding requests. Default: 255.
    pub max_in_flight: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            max_resends: None,
            max_in_flight: SEQUENCE_SPACE,
        }
    }
}

/// Lifecycle of a request. Everything but `Sent` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Sent,
    Succeeded,
    TimedOut,
    ShutDown,
    Disconnected,
}

/// Counters for everything the tracker has done since it was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    pub submitted: u64,
    pub succeeded: u64,
    pub resent: u64,
    pub timed_out: u64,
    pub disconnected: u64,
    pub shut_down: u64,
    /// Replies whose sequence number matched no outstanding request.
    pub orphaned: u64,
}

enum Resolution {
    Frame(Frame),
    TimedOut(Duration),
    ShutDown,
    Disconnected,
}

type Completer = Box<dyn FnOnce(Resolution) + Send>;

struct InFlight {
    request_type: u8,
    encoded: Bytes,
    created_at: Instant,
    resends: u32,
    complete: Completer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Link {
    Open,
    Disconnected,
    ShutDown,
}

struct Inner<W> {
    writer: MessageWriter<W>,
    next_sequence_number: u8,
    in_flight: HashMap<u8, InFlight>,
    link: Link,
    stats: TrackerStats,
}

impl<W> Inner<W> {
    fn ensure_open(&self) -> Result<()> {
        match self.link {
            Link::Open => Ok(()),
            Link::Disconnected => Err(SessionError::NotConnected),
            Link::ShutDown => Err(SessionError::ShutDown),
        }
    }

    fn allocate(&mut self, header: u8, max_in_flight: usize) -> Result<u8> {
        if self.in_flight.len() >= max_in_flight.min(SEQUENCE_SPACE) {
            return Err(SessionError::TooManyInFlight(max_in_flight));
        }
        // At most 256 candidates; one is free since fewer than 255 are taken.
        for _ in 0..=u8::MAX {
            let candidate = self.next_sequence_number;
            self.next_sequence_number = self.next_sequence_number.wrapping_add(1);
            if candidate != header && !self.in_flight.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        Err(SessionError::TooManyInFlight(max_in_flight))
    }

    fn drain(&mut self) -> Vec<InFlight> {
        self.in_flight.drain().map(|(_, request)| request).collect()
    }
}

/// Owns the in-flight requests of one connection.
///
/// Sequence numbering, the in-flight map and the writer share one mutex,
/// so submission, frame delivery and timeout sweeps never interleave.
/// Completions (including caller decoders) run after the lock is released.
pub struct RequestTracker<W> {
    inner: Mutex<Inner<W>>,
    header: u8,
    config: TrackerConfig,
}

impl<W: Write> RequestTracker<W> {
    /// Create a tracker writing through `writer`.
    pub fn new(writer: MessageWriter<W>, config: TrackerConfig) -> Self {
        let header = writer.header();
        Self {
            inner: Mutex::new(Inner {
                writer,
                next_sequence_number: 0,
                in_flight: HashMap::new(),
                link: Link::Open,
                stats: TrackerStats::default(),
            }),
            header,
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<W>> {
        // A panicking decoder never runs under the lock, so the state is intact.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the next free sequence number.
    ///
    /// Numbers are handed out round-robin from 0, skipping the header value
    /// and any number still awaiting a reply.
    pub fn next_sequence_number(&self) -> Result<u8> {
        self.lock().allocate(self.header, self.config.max_in_flight)
    }

    /// Register a request under `sequence_number` and write `encoded`.
    ///
    /// `decoder` turns the matching reply into the handle's value.
    pub fn submit<T, D>(
        &self,
        sequence_number: u8,
        request_type: u8,
        decoder: D,
        encoded: Bytes,
    ) -> Result<PendingRequest<T>>
    where
        T: Send + 'static,
        D: FnOnce(&Frame) -> std::result::Result<T, DecodeError> + Send + 'static,
    {
        let mut inner = self.lock();
        inner.ensure_open()?;
        if inner.in_flight.contains_key(&sequence_number) {
            return Err(SessionError::SequenceInUse(sequence_number));
        }
        if inner.in_flight.len() >= self.config.max_in_flight {
            return Err(SessionError::TooManyInFlight(self.config.max_in_flight));
        }
        self.register_and_send(&mut inner, sequence_number, request_type, decoder, encoded)
    }

    /// Number, encode, register and send `body` (`type | len | payload`).
    pub fn request<T, D>(&self, body: &[u8], decoder: D) -> Result<PendingRequest<T>>
    where
        T: Send + 'static,
        D: FnOnce(&Frame) -> std::result::Result<T, DecodeError> + Send + 'static,
    {
        let mut inner = self.lock();
        inner.ensure_open()?;
        let sequence_number = inner.allocate(self.header, self.config.max_in_flight)?;

        let mut buf = BytesMut::new();
        encode_message(self.header, sequence_number, body, &mut buf)?;
        // The encoder has checked that the body carries a type byte.
        let request_type = body[0];

        self.register_and_send(
            &mut inner,
            sequence_number,
            request_type,
            decoder,
            buf.freeze(),
        )
    }

    fn register_and_send<T, D>(
        &self,
        inner: &mut Inner<W>,
        sequence_number: u8,
        request_type: u8,
        decoder: D,
        encoded: Bytes,
    ) -> Result<PendingRequest<T>>
    where
        T: Send + 'static,
        D: FnOnce(&Frame) -> std::result::Result<T, DecodeError> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        inner.in_flight.insert(
            sequence_number,
            InFlight {
                request_type,
                encoded: encoded.clone(),
                created_at: Instant::now(),
                resends: 0,
                complete: completer(sequence_number, decoder, tx),
            },
        );

        if let Err(err) = inner.writer.write_encoded(&encoded) {
            inner.in_flight.remove(&sequence_number);
            return Err(err.into());
        }

        inner.stats.submitted += 1;
        debug!(
            seq = sequence_number,
            request_type = type_name(request_type),
            in_flight = inner.in_flight.len(),
            "request sent"
        );
        Ok(PendingRequest { sequence_number, rx })
    }

    /// Deliver a reply. Returns false if no request was waiting for it.
    pub fn on_frame(&self, frame: Frame) -> bool {
        let request = {
            let mut inner = self.lock();
            match inner.in_flight.remove(&frame.sequence_number) {
                Some(request) => {
                    inner.stats.succeeded += 1;
                    request
                }
                None => {
                    inner.stats.orphaned += 1;
                    warn!(
                        seq = frame.sequence_number,
                        frame_type = type_name(frame.frame_type),
                        pending = ?pending_numbers(&inner.in_flight),
                        "reply matches no pending request"
                    );
                    return false;
                }
            }
        };

        debug!(
            seq = frame.sequence_number,
            request_type = type_name(request.request_type),
            elapsed = ?request.created_at.elapsed(),
            "reply matched"
        );
        (request.complete)(Resolution::Frame(frame));
        true
    }

    /// Resend every request older than the configured timeout.
    ///
    /// Age is measured from the first send and never reset, so a request
    /// that keeps going unanswered is resent on every sweep. With
    /// `max_resends` set, requests past the limit fail with
    /// [`SessionError::RequestTimeout`] instead.
    ///
    /// Returns the number of requests resent. A write failure aborts the
    /// sweep and is returned; the caller decides whether the link is gone.
    pub fn sweep_timeouts(&self, now: Instant) -> Result<usize> {
        let mut expired = Vec::new();
        let mut resent = 0usize;
        let result = {
            let mut inner = self.lock();
            let inner = &mut *inner;
            let mut due: Vec<u8> = inner
                .in_flight
                .iter()
                .filter(|(_, request)| now.duration_since(request.created_at) > self.config.timeout)
                .map(|(&seq, _)| seq)
                .collect();
            due.sort_unstable();

            let mut outcome = Ok(());
            for seq in due {
                let Some(request) = inner.in_flight.get_mut(&seq) else {
                    continue;
                };
                let age = now.duration_since(request.created_at);

                if self
                    .config
                    .max_resends
                    .is_some_and(|limit| request.resends >= limit)
                {
                    if let Some(request) = inner.in_flight.remove(&seq) {
                        inner.stats.timed_out += 1;
                        warn!(
                            seq,
                            request_type = type_name(request.request_type),
                            resends = request.resends,
                            ?age,
                            "request timed out"
                        );
                        expired.push((request, age));
                    }
                    continue;
                }

                request.resends += 1;
                let encoded = request.encoded.clone();
                warn!(
                    seq,
                    request_type = type_name(request.request_type),
                    attempt = request.resends,
                    ?age,
                    "no reply; resending"
                );
                if let Err(err) = inner.writer.write_encoded(&encoded) {
                    outcome = Err(err.into());
                    break;
                }
                inner.stats.resent += 1;
                resent += 1;
            }
            outcome
        };

        for (request, age) in expired {
            (request.complete)(Resolution::TimedOut(age));
        }
        result.map(|()| resent)
    }

    /// The link is gone: fail everything in flight with
    /// [`SessionError::NotConnected`] and refuse new requests.
    ///
    /// Returns the number of requests failed.
    pub fn on_disconnect(&self) -> usize {
        let requests = {
            let mut inner = self.lock();
            if inner.link == Link::Open {
                inner.link = Link::Disconnected;
            }
            let requests = inner.drain();
            inner.stats.disconnected += requests.len() as u64;
            requests
        };

        info!(failed = requests.len(), "device disconnected");
        let count = requests.len();
        for request in requests {
            (request.complete)(Resolution::Disconnected);
        }
        count
    }

    /// Graceful teardown: fail everything in flight with
    /// [`SessionError::ShutDown`] and refuse new requests.
    ///
    /// Returns the number of requests failed.
    pub fn shutdown(&self) -> usize {
        let requests = {
            let mut inner = self.lock();
            inner.link = Link::ShutDown;
            let requests = inner.drain();
            inner.stats.shut_down += requests.len() as u64;
            requests
        };

        debug!(failed = requests.len(), "tracker shut down");
        let count = requests.len();
        for request in requests {
            (request.complete)(Resolution::ShutDown);
        }
        count
    }

    /// Whether new requests are accepted.
    pub fn is_open(&self) -> bool {
        self.lock().link == Link::Open
    }

    /// Sequence numbers still awaiting a reply, ascending.
    pub fn pending_sequence_numbers(&self) -> Vec<u8> {
        pending_numbers(&self.lock().in_flight)
    }

    /// Number of requests awaiting a reply.
    pub fn in_flight_count(&self) -> usize {
        self.lock().in_flight.len()
    }

    /// Counters since creation.
    pub fn stats(&self) -> TrackerStats {
        self.lock().stats
    }

    /// Tracker configuration.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }
}

fn pending_numbers(in_flight: &HashMap<u8, InFlight>) -> Vec<u8> {
    let mut numbers: Vec<u8> = in_flight.keys().copied().collect();
    numbers.sort_unstable();
    numbers
}

fn completer<T, D>(
    sequence_number: u8,
    decoder: D,
    tx: oneshot::Sender<(RequestState, Result<T>)>,
) -> Completer
where
    T: Send + 'static,
    D: FnOnce(&Frame) -> std::result::Result<T, DecodeError> + Send + 'static,
{
    Box::new(move |resolution| {
        let outcome = match resolution {
            Resolution::Frame(frame) => (
                RequestState::Succeeded,
                decoder(&frame).map_err(|source| SessionError::Decode {
                    sequence_number,
                    source,
                }),
            ),
            Resolution::TimedOut(elapsed) => (
                RequestState::TimedOut,
                Err(SessionError::RequestTimeout {
                    sequence_number,
                    elapsed,
                }),
            ),
            Resolution::ShutDown => (RequestState::ShutDown, Err(SessionError::ShutDown)),
            Resolution::Disconnected => {
                (RequestState::Disconnected, Err(SessionError::NotConnected))
            }
        };
        // The caller may have dropped its handle; the outcome is then unwanted.
        let _ = tx.send(outcome);
    })
}

/// Handle to a submitted request, resolved exactly once.
///
/// Block on it with [`wait`](PendingRequest::wait) from plain threads, or
/// `.await` it from async code. Dropping it does not cancel the request.
#[derive(Debug)]
pub struct PendingRequest<T> {
    sequence_number: u8,
    rx: oneshot::Receiver<(RequestState, Result<T>)>,
}

impl<T> PendingRequest<T> {
    /// Sequence number the request went out under.
    pub fn sequence_number(&self) -> u8 {
        self.sequence_number
    }

    /// Block the current thread until the request resolves.
    ///
    /// Must not be called from within an async runtime; `.await` instead.
    pub fn wait(self) -> Result<T> {
        resolve(self.rx.blocking_recv()).1
    }

    /// Block until resolved, returning the terminal state alongside the result.
    pub fn wait_with_state(self) -> (RequestState, Result<T>) {
        resolve(self.rx.blocking_recv())
    }

    /// Take the outcome if the request has already resolved.
    ///
    /// Returns `None` while the request is still `Sent`.
    pub fn try_take(&mut self) -> Option<(RequestState, Result<T>)> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                Some((RequestState::ShutDown, Err(SessionError::ShutDown)))
            }
        }
    }
}

fn resolve<T>(
    received: std::result::Result<(RequestState, Result<T>), oneshot::error::RecvError>,
) -> (RequestState, Result<T>) {
    // A closed channel means the tracker itself was dropped.
    received.unwrap_or((RequestState::ShutDown, Err(SessionError::ShutDown)))
}

impl<T> Future for PendingRequest<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| resolve(received).1)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use bytes::BytesMut;
    use hanalink_frame::{encode_request, FrameReader, HEADER, RESPONSE};

    use super::*;

    /// Write sink the test can inspect while the tracker owns it.
    #[derive(Clone, Default)]
    struct Wire(Arc<Mutex<Vec<u8>>>);

    impl Wire {
        fn take(&self) -> Vec<u8> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    impl Write for Wire {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct BrokenWire;

    impl Write for BrokenWire {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Accepts writes until stalled, then reports an expired write timeout.
    #[derive(Clone, Default)]
    struct StallingWire(Arc<AtomicBool>);

    impl Write for StallingWire {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.0.load(Ordering::SeqCst) {
                return Err(std::io::Error::from(std::io::ErrorKind::WouldBlock));
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn tracker(config: TrackerConfig) -> (RequestTracker<Wire>, Wire) {
        let wire = Wire::default();
        let tracker = RequestTracker::new(MessageWriter::new(wire.clone()), config);
        (tracker, wire)
    }

    fn payload(frame: &Frame) -> std::result::Result<Vec<u8>, DecodeError> {
        Ok(frame.payload.to_vec())
    }

    fn reply(seq: u8, payload: &[u8]) -> Frame {
        Frame::new(seq, RESPONSE, payload.to_vec())
    }

    #[test]
    fn request_encodes_and_writes() {
        let (tracker, wire) = tracker(TrackerConfig::default());

        let pending = tracker.request(&[0x01, 0x00], payload).unwrap();
        assert_eq!(pending.sequence_number(), 0);
        assert_eq!(wire.take(), [0xEE, 0x00, 0x01, 0x00, 0xC4]);
        assert_eq!(tracker.pending_sequence_numbers(), vec![0]);
    }

    #[test]
    fn reply_resolves_matching_request() {
        let (tracker, _wire) = tracker(TrackerConfig::default());
        let pending = tracker.request(&[0x04, 0x01, 0x00], payload).unwrap();

        assert!(tracker.on_frame(reply(0, &[0x55, 0x01])));
        let (state, result) = pending.wait_with_state();
        assert_eq!(state, RequestState::Succeeded);
        assert_eq!(result.unwrap(), vec![0x55, 0x01]);
        assert_eq!(tracker.in_flight_count(), 0);
        assert_eq!(tracker.stats().succeeded, 1);
    }

    #[test]
    fn replies_match_by_number_not_order() {
        let (tracker, _wire) = tracker(TrackerConfig::default());
        let first = tracker.request(&[0x04, 0x01, 0x00], payload).unwrap();
        let second = tracker.request(&[0x04, 0x01, 0x01], payload).unwrap();

        assert!(tracker.on_frame(reply(1, &[0x02])));
        assert!(tracker.on_frame(reply(0, &[0x01])));

        assert_eq!(first.wait().unwrap(), vec![0x01]);
        assert_eq!(second.wait().unwrap(), vec![0x02]);
    }

    #[test]
    fn orphan_reply_is_counted_not_fatal() {
        let (tracker, _wire) = tracker(TrackerConfig::default());
        let mut pending = tracker.request(&[0x01, 0x00], payload).unwrap();

        assert!(!tracker.on_frame(reply(9, &[])));
        assert_eq!(tracker.stats().orphaned, 1);
        assert!(pending.try_take().is_none());
        assert!(tracker.is_open());
    }

    #[test]
    fn duplicate_reply_is_an_orphan() {
        let (tracker, _wire) = tracker(TrackerConfig::default());
        let pending = tracker.request(&[0x01, 0x00], payload).unwrap();

        assert!(tracker.on_frame(reply(0, &[0x01])));
        assert!(!tracker.on_frame(reply(0, &[0x01])));
        assert_eq!(pending.wait().unwrap(), vec![0x01]);
        assert_eq!(tracker.stats().orphaned, 1);
    }

    #[test]
    fn sequence_numbers_skip_header_and_wrap() {
        let (tracker, _wire) = tracker(TrackerConfig::default());
        let numbers: Vec<u8> = (0..256)
            .map(|_| tracker.next_sequence_number().unwrap())
            .collect();

        assert!(!numbers.contains(&HEADER));
        assert_eq!(numbers[0], 0);
        assert_eq!(numbers[HEADER as usize - 1], HEADER - 1);
        assert_eq!(numbers[HEADER as usize], HEADER + 1);
        // 255 usable numbers, so the 256th wraps back to 0.
        assert_eq!(numbers[255], 0);
    }

    #[test]
    fn sequence_numbers_skip_in_flight() {
        let (tracker, _wire) = tracker(TrackerConfig::default());
        let stuck = tracker.request(&[0x01, 0x00], payload).unwrap();
        assert_eq!(stuck.sequence_number(), 0);

        // Cycle the counter all the way round; 0 must not be handed out again.
        for _ in 0..SEQUENCE_SPACE {
            assert_ne!(tracker.next_sequence_number().unwrap(), 0);
        }
    }

    #[test]
    fn submit_rejects_number_in_flight() {
        let (tracker, wire) = tracker(TrackerConfig::default());
        let seq = tracker.next_sequence_number().unwrap();

        let mut buf = BytesMut::new();
        encode_request(HEADER, seq, 0x04, &[0x00], &mut buf).unwrap();
        let encoded = buf.freeze();

        let _first = tracker
            .submit(seq, 0x04, payload, encoded.clone())
            .unwrap();
        let err = tracker.submit(seq, 0x04, payload, encoded).unwrap_err();
        assert!(matches!(err, SessionError::SequenceInUse(s) if s == seq));
        assert_eq!(wire.take().len(), 6);
    }

    #[test]
    fn in_flight_limit_is_enforced() {
        let (tracker, _wire) = tracker(TrackerConfig {
            max_in_flight: 2,
            ..TrackerConfig::default()
        });
        let _a = tracker.request(&[0x01, 0x00], payload).unwrap();
        let _b = tracker.request(&[0x01, 0x00], payload).unwrap();
        let err = tracker.request(&[0x01, 0x00], payload).unwrap_err();
        assert!(matches!(err, SessionError::TooManyInFlight(2)));
    }

    #[test]
    fn malformed_body_registers_nothing() {
        let (tracker, wire) = tracker(TrackerConfig::default());
        let err = tracker.request(&[0x04], payload).unwrap_err();
        assert!(matches!(err, SessionError::Frame(_)));
        assert_eq!(tracker.in_flight_count(), 0);
        assert!(wire.take().is_empty());
    }

    #[test]
    fn write_failure_unregisters_request() {
        let tracker = RequestTracker::new(
            MessageWriter::new(BrokenWire),
            TrackerConfig::default(),
        );
        let err = tracker.request(&[0x01, 0x00], payload).unwrap_err();
        assert!(matches!(err, SessionError::Frame(_)));
        assert_eq!(tracker.in_flight_count(), 0);
    }

    #[test]
    fn stalled_resend_fails_the_sweep_and_releases_the_lock() {
        let wire = StallingWire::default();
        let tracker = RequestTracker::new(
            MessageWriter::new(wire.clone()),
            TrackerConfig {
                timeout: Duration::from_millis(10),
                ..TrackerConfig::default()
            },
        );
        let pending = tracker.request(&[0x01, 0x00], payload).unwrap();

        wire.0.store(true, Ordering::SeqCst);
        let err = tracker
            .sweep_timeouts(Instant::now() + Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(err, SessionError::Frame(_)));
        assert_eq!(tracker.stats().resent, 0);

        // The tracker is still usable: a stalled write did not wedge it.
        assert_eq!(tracker.on_disconnect(), 1);
        assert!(matches!(pending.wait(), Err(SessionError::NotConnected)));
    }

    #[test]
    fn decoder_error_is_reported_with_sequence_number() {
        let (tracker, _wire) = tracker(TrackerConfig::default());
        let pending = tracker
            .request(&[0x01, 0x00], |_frame: &Frame| -> std::result::Result<(), DecodeError> {
                Err(DecodeError::Invalid("nope".into()))
            })
            .unwrap();

        tracker.on_frame(reply(0, &[]));
        let err = pending.wait().unwrap_err();
        assert!(matches!(err, SessionError::Decode { sequence_number: 0, .. }));
    }

    #[test]
    fn sweep_resends_identical_bytes_until_answered() {
        let (tracker, wire) = tracker(TrackerConfig {
            timeout: Duration::from_millis(100),
            ..TrackerConfig::default()
        });
        let mut pending = tracker.request(&[0x04, 0x01, 0x05], payload).unwrap();
        let original = wire.take();

        // Not yet due.
        assert_eq!(tracker.sweep_timeouts(Instant::now()).unwrap(), 0);
        assert!(wire.take().is_empty());

        let later = Instant::now() + Duration::from_millis(150);
        assert_eq!(tracker.sweep_timeouts(later).unwrap(), 1);
        assert_eq!(wire.take(), original);

        // Age is measured from the first send, so the next sweep resends again.
        assert_eq!(tracker.sweep_timeouts(later).unwrap(), 1);
        assert_eq!(wire.take(), original);
        assert!(pending.try_take().is_none());

        assert!(tracker.on_frame(reply(0, &[0x55, 0x01])));
        let (state, result) = pending.try_take().unwrap();
        assert_eq!(state, RequestState::Succeeded);
        assert_eq!(result.unwrap(), vec![0x55, 0x01]);
        assert_eq!(tracker.stats().resent, 2);
    }

    #[test]
    fn resent_request_decodes_on_wire() {
        let (tracker, wire) = tracker(TrackerConfig {
            timeout: Duration::ZERO,
            ..TrackerConfig::default()
        });
        let _pending = tracker.request(&[0x13, 0x01, 0x02], payload).unwrap();
        tracker
            .sweep_timeouts(Instant::now() + Duration::from_millis(1))
            .unwrap();

        let mut reader = FrameReader::accepting_all();
        let frames = reader.push_slice(&wire.take());
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], frames[1]);
        assert_eq!(frames[1].frame_type, 0x13);
    }

    #[test]
    fn give_up_policy_times_out() {
        let (tracker, _wire) = tracker(TrackerConfig {
            timeout: Duration::from_millis(10),
            max_resends: Some(1),
            ..TrackerConfig::default()
        });
        let mut pending = tracker.request(&[0x01, 0x00], payload).unwrap();
        let later = Instant::now() + Duration::from_millis(50);

        assert_eq!(tracker.sweep_timeouts(later).unwrap(), 1);
        assert!(pending.try_take().is_none());

        assert_eq!(tracker.sweep_timeouts(later).unwrap(), 0);
        let (state, result) = pending.try_take().unwrap();
        assert_eq!(state, RequestState::TimedOut);
        assert!(matches!(
            result,
            Err(SessionError::RequestTimeout { sequence_number: 0, .. })
        ));
        assert_eq!(tracker.in_flight_count(), 0);
        assert_eq!(tracker.stats().timed_out, 1);
    }

    #[test]
    fn disconnect_fails_every_request_once() {
        let (tracker, _wire) = tracker(TrackerConfig::default());
        let pending: Vec<_> = (0..3)
            .map(|_| tracker.request(&[0x01, 0x00], payload).unwrap())
            .collect();

        assert_eq!(tracker.on_disconnect(), 3);
        assert_eq!(tracker.on_disconnect(), 0);

        for request in pending {
            let (state, result) = request.wait_with_state();
            assert_eq!(state, RequestState::Disconnected);
            assert!(matches!(result, Err(SessionError::NotConnected)));
        }
        assert!(!tracker.is_open());
        assert!(matches!(
            tracker.request(&[0x01, 0x00], payload),
            Err(SessionError::NotConnected)
        ));
        assert_eq!(tracker.stats().disconnected, 3);
    }

    #[test]
    fn shutdown_is_distinct_from_disconnect() {
        let (tracker, _wire) = tracker(TrackerConfig::default());
        let pending = tracker.request(&[0x01, 0x00], payload).unwrap();

        assert_eq!(tracker.shutdown(), 1);
        let (state, result) = pending.wait_with_state();
        assert_eq!(state, RequestState::ShutDown);
        assert!(matches!(result, Err(SessionError::ShutDown)));

        // A later link loss does not relabel the shutdown.
        tracker.on_disconnect();
        assert!(matches!(
            tracker.request(&[0x01, 0x00], payload),
            Err(SessionError::ShutDown)
        ));
    }

    #[test]
    fn dropped_tracker_resolves_waiters() {
        let (tracker, _wire) = tracker(TrackerConfig::default());
        let pending = tracker.request(&[0x01, 0x00], payload).unwrap();
        drop(tracker);
        assert!(matches!(pending.wait(), Err(SessionError::ShutDown)));
    }

    #[test]
    fn dropped_handle_does_not_disturb_tracker() {
        let (tracker, _wire) = tracker(TrackerConfig::default());
        drop(tracker.request(&[0x01, 0x00], payload).unwrap());
        assert!(tracker.on_frame(reply(0, &[])));
    }

    #[tokio::test]
    async fn pending_request_can_be_awaited() {
        let (tracker, _wire) = tracker(TrackerConfig::default());
        let tracker = Arc::new(tracker);
        let pending = tracker.request(&[0x04, 0x01, 0x00], payload).unwrap();

        let delivery = {
            let tracker = Arc::clone(&tracker);
            tokio::task::spawn_blocking(move || tracker.on_frame(reply(0, &[0x38, 0x00])))
        };

        assert_eq!(pending.await.unwrap(), vec![0x38, 0x00]);
        assert!(delivery.await.unwrap());
    }

    #[test]
    fn concurrent_requests_get_distinct_numbers() {
        let (tracker, _wire) = tracker(TrackerConfig::default());
        let tracker = Arc::new(tracker);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || {
                    (0..16)
                        .map(|_| {
                            tracker
                                .request(&[0x01, 0x00], payload)
                                .unwrap()
                                .sequence_number()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all: Vec<u8> = handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 128);
    }
}

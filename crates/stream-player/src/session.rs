//! Playback session orchestrator.
//!
//! Wires the chunk stream, playback sink, transport state, control listener,
//! and progress reporter together for one track:
//! `Idle → FetchingMetadata → Streaming → (Draining → Completed) | Erred |
//! TimedOut`. The caller blocks until the completion gate fires exactly once
//! or the stall bound elapses.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use stream_types::{PcmFormat, SessionEnd, TrackMetadata};

use crate::config::SessionConfig;
use crate::control::{self, CommandInput};
use crate::gate::CompletionGate;
use crate::progress::ProgressReporter;
use crate::sink::AudioSink;
use crate::source::{StreamEvent, TrackService};
use crate::transport::Transport;

/// Input and output endpoints for one session.
pub struct SessionIo {
    /// User command source polled by the control listener.
    pub input: Box<dyn CommandInput>,
    /// Sink for the progress line.
    pub progress_out: Box<dyn Write + Send>,
    /// Sink for pause/resume status lines.
    pub status_out: Box<dyn Write + Send>,
}

/// Play one track to completion, error, stop, or timeout.
///
/// Blocks the calling thread. The sink is constructed lazily on the worker
/// thread via `make_sink` (the CPAL stream is not `Send`), receiving the
/// session transport so its output callback can observe pause state.
///
/// Returns `Err` only for failures before streaming starts (metadata fetch,
/// stream open); once streaming begins every outcome is a [`SessionEnd`].
pub fn play_track<S, K, F>(
    service: &S,
    track: &str,
    config: &SessionConfig,
    io: SessionIo,
    make_sink: F,
) -> Result<SessionEnd>
where
    S: TrackService,
    K: AudioSink,
    F: FnOnce(Arc<Transport>) -> K + Send + 'static,
{
    let metadata = service
        .get_metadata(track)
        .with_context(|| format!("fetch metadata for {track}"))?
        .ok_or_else(|| anyhow!("track not found: {track}"))?;

    let estimated_total = metadata.estimated_pcm_bytes();
    let pcm = metadata.pcm_format();
    tracing::info!(
        track,
        duration_s = metadata.duration_seconds,
        rate_hz = pcm.sample_rate,
        channels = pcm.channels,
        estimated_bytes = estimated_total,
        "starting playback session"
    );

    let transport = Arc::new(Transport::new());
    let gate = Arc::new(CompletionGate::new());
    transport.start();

    let listener = control::spawn_listener(
        transport.clone(),
        gate.clone(),
        io.input,
        io.status_out,
        config.poll_interval,
    );

    let events = match service.open_chunk_stream(track) {
        Ok(events) => events,
        Err(e) => {
            transport.stop();
            let _ = listener.join();
            return Err(e).with_context(|| format!("open chunk stream for {track}"));
        }
    };

    let worker = {
        let transport = transport.clone();
        let gate = gate.clone();
        let poll_interval = config.poll_interval;
        let mut progress = ProgressReporter::new(estimated_total, io.progress_out);
        std::thread::spawn(move || {
            let mut sink = make_sink(transport.clone());
            run_receive_loop(
                &events,
                &mut sink,
                &transport,
                &gate,
                &mut progress,
                pcm,
                poll_interval,
            );
        })
    };

    let end = match gate.wait(config.stall_timeout) {
        Some(end) => end,
        None => {
            tracing::warn!(track, timeout = ?config.stall_timeout, "session stalled");
            SessionEnd::TimedOut
        }
    };

    // Idempotent; releases the listener and the receive worker in every
    // terminal path, including timeout.
    transport.stop();
    let _ = worker.join();
    let _ = listener.join();

    tracing::info!(track, end = ?end, "playback session ended");
    Ok(end)
}

/// Consume chunk-stream events until a terminal condition.
///
/// Per chunk: open the sink lazily, block while paused without discarding the
/// chunk, drop it only when the session stopped during the wait, otherwise
/// write and update progress. `recv_timeout` keeps the loop responsive to an
/// external stop even when the source stalls.
fn run_receive_loop<K: AudioSink>(
    events: &Receiver<StreamEvent>,
    sink: &mut K,
    transport: &Transport,
    gate: &CompletionGate,
    progress: &mut ProgressReporter,
    pcm: PcmFormat,
    poll_interval: Duration,
) {
    let mut opened = false;
    loop {
        if !transport.is_playing() {
            break;
        }
        let event = match events.recv_timeout(poll_interval) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                sink.abandon();
                transport.stop();
                gate.fire(SessionEnd::StreamError {
                    message: "chunk source hung up without completing".to_string(),
                });
                break;
            }
        };

        match event {
            StreamEvent::Chunk(bytes) => {
                if !opened {
                    if let Err(e) = sink.open(pcm) {
                        tracing::warn!("audio output unavailable: {e:#}");
                        transport.stop();
                        gate.fire(SessionEnd::DeviceUnavailable {
                            message: format!("{e:#}"),
                        });
                        break;
                    }
                    opened = true;
                }

                if !transport.wait_while_paused() {
                    // Stopped while paused: the pending chunk is dropped.
                    break;
                }

                if let Err(e) = sink.write(&bytes) {
                    tracing::warn!("sink write failed: {e:#}");
                    sink.abandon();
                    transport.stop();
                    gate.fire(SessionEnd::StreamError {
                        message: format!("{e:#}"),
                    });
                    break;
                }
                progress.update(bytes.len(), transport.is_paused());
            }
            StreamEvent::Completed => {
                if opened {
                    if let Err(e) = sink.drain() {
                        tracing::warn!("sink drain failed: {e:#}");
                    }
                }
                transport.stop();
                gate.fire(SessionEnd::Completed);
                break;
            }
            StreamEvent::Error(message) => {
                tracing::warn!(%message, "chunk stream erred");
                // The sink's state is unreliable; do not drain.
                sink.abandon();
                transport.stop();
                gate.fire(SessionEnd::StreamError { message });
                break;
            }
        }
    }
}

/// Metadata accessor used by callers that display track details before
/// starting playback.
pub fn describe_track<S: TrackService>(service: &S, track: &str) -> Result<Option<TrackMetadata>> {
    service.get_metadata(track)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::CompletionGate;
    use crossbeam_channel::{Sender, unbounded};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::thread;

    #[derive(Default)]
    struct SinkLog {
        opened: Vec<PcmFormat>,
        writes: Vec<Vec<u8>>,
        drained: bool,
        abandoned: bool,
        fail_open: bool,
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        log: Arc<Mutex<SinkLog>>,
    }

    impl RecordingSink {
        fn failing() -> Self {
            let sink = Self::default();
            sink.log.lock().unwrap().fail_open = true;
            sink
        }
    }

    impl AudioSink for RecordingSink {
        fn open(&mut self, format: PcmFormat) -> Result<()> {
            let mut log = self.log.lock().unwrap();
            if log.fail_open {
                return Err(anyhow!("no output device"));
            }
            log.opened.push(format);
            Ok(())
        }

        fn write(&mut self, pcm: &[u8]) -> Result<()> {
            self.log.lock().unwrap().writes.push(pcm.to_vec());
            Ok(())
        }

        fn drain(&mut self) -> Result<()> {
            self.log.lock().unwrap().drained = true;
            Ok(())
        }

        fn abandon(&mut self) {
            self.log.lock().unwrap().abandoned = true;
        }
    }

    struct ScriptedInput {
        chars: VecDeque<char>,
    }

    impl ScriptedInput {
        fn boxed(chars: &str) -> Box<Self> {
            Box::new(Self {
                chars: chars.chars().collect(),
            })
        }
    }

    impl CommandInput for ScriptedInput {
        fn poll(&mut self, timeout: Duration) -> Option<char> {
            match self.chars.pop_front() {
                Some(c) => Some(c),
                None => {
                    thread::sleep(timeout);
                    None
                }
            }
        }
    }

    /// Service with one known track and a caller-controlled chunk stream.
    struct FakeService {
        metadata: TrackMetadata,
        stream: Mutex<Option<Receiver<StreamEvent>>>,
    }

    impl FakeService {
        fn new() -> (Self, Sender<StreamEvent>) {
            let (tx, rx) = unbounded();
            let service = Self {
                metadata: TrackMetadata {
                    file_name: "song.pcm".to_string(),
                    duration_seconds: 10,
                    sample_rate: 44_100,
                    channels: 2,
                    codec: "pcm".to_string(),
                },
                stream: Mutex::new(Some(rx)),
            };
            (service, tx)
        }
    }

    impl TrackService for FakeService {
        fn list_tracks(&self) -> Result<Vec<String>> {
            Ok(vec![self.metadata.file_name.clone()])
        }

        fn get_metadata(&self, track: &str) -> Result<Option<TrackMetadata>> {
            if track == self.metadata.file_name {
                Ok(Some(self.metadata.clone()))
            } else {
                Ok(None)
            }
        }

        fn open_chunk_stream(&self, _track: &str) -> Result<Receiver<StreamEvent>> {
            self.stream
                .lock()
                .unwrap()
                .take()
                .ok_or_else(|| anyhow!("stream already opened"))
        }
    }

    fn test_config() -> SessionConfig {
        SessionConfig {
            poll_interval: Duration::from_millis(10),
            stall_timeout: Duration::from_millis(500),
            ..SessionConfig::default()
        }
    }

    fn quiet_io(input: Box<dyn CommandInput>) -> SessionIo {
        SessionIo {
            input,
            progress_out: Box::new(std::io::sink()),
            status_out: Box::new(std::io::sink()),
        }
    }

    fn started() -> (Arc<Transport>, CompletionGate) {
        let transport = Arc::new(Transport::new());
        transport.start();
        (transport, CompletionGate::new())
    }

    fn loop_fixture(
        events: Receiver<StreamEvent>,
        transport: Arc<Transport>,
        gate: Arc<CompletionGate>,
        sink: RecordingSink,
    ) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            let mut sink = sink;
            let mut progress = ProgressReporter::new(1_764_000, Box::new(std::io::sink()));
            run_receive_loop(
                &events,
                &mut sink,
                &transport,
                &gate,
                &mut progress,
                PcmFormat::default(),
                Duration::from_millis(10),
            );
        })
    }

    #[test]
    fn completion_drains_sink_and_fires_gate_once() {
        let (transport, gate) = started();
        let gate = Arc::new(gate);
        let (tx, rx) = unbounded();
        let sink = RecordingSink::default();

        tx.send(StreamEvent::Chunk(vec![1, 2, 3, 4])).unwrap();
        tx.send(StreamEvent::Chunk(vec![5, 6])).unwrap();
        tx.send(StreamEvent::Completed).unwrap();

        let handle = loop_fixture(rx, transport.clone(), gate.clone(), sink.clone());
        handle.join().unwrap();

        let log = sink.log.lock().unwrap();
        assert_eq!(log.opened, vec![PcmFormat::default()]);
        assert_eq!(log.writes, vec![vec![1, 2, 3, 4], vec![5, 6]]);
        assert!(log.drained);
        assert!(!log.abandoned);
        assert!(!transport.is_playing());
        assert_eq!(
            gate.wait(Duration::from_millis(50)),
            Some(SessionEnd::Completed)
        );
    }

    #[test]
    fn stream_error_abandons_sink_without_drain() {
        let (transport, gate) = started();
        let gate = Arc::new(gate);
        let (tx, rx) = unbounded();
        let sink = RecordingSink::default();

        tx.send(StreamEvent::Chunk(vec![1, 2])).unwrap();
        tx.send(StreamEvent::Error("connection reset".to_string()))
            .unwrap();

        let handle = loop_fixture(rx, transport.clone(), gate.clone(), sink.clone());
        handle.join().unwrap();

        let log = sink.log.lock().unwrap();
        assert!(log.abandoned);
        assert!(!log.drained);
        assert_eq!(
            gate.wait(Duration::from_millis(50)),
            Some(SessionEnd::StreamError {
                message: "connection reset".to_string()
            })
        );
    }

    #[test]
    fn completion_after_error_does_not_double_signal() {
        let (transport, gate) = started();
        let gate = Arc::new(gate);
        let (tx, rx) = unbounded();
        let sink = RecordingSink::default();

        tx.send(StreamEvent::Error("boom".to_string())).unwrap();
        tx.send(StreamEvent::Completed).unwrap();

        let handle = loop_fixture(rx, transport, gate.clone(), sink);
        handle.join().unwrap();

        assert_eq!(
            gate.wait(Duration::from_millis(50)),
            Some(SessionEnd::StreamError {
                message: "boom".to_string()
            })
        );
        assert_eq!(gate.wait(Duration::from_millis(20)), None);
    }

    #[test]
    fn paused_chunk_is_written_exactly_once_after_resume() {
        let (transport, gate) = started();
        let gate = Arc::new(gate);
        let (tx, rx) = unbounded();
        let sink = RecordingSink::default();

        assert!(transport.toggle_pause());
        tx.send(StreamEvent::Chunk(vec![9, 9, 9, 9])).unwrap();

        let handle = loop_fixture(rx, transport.clone(), gate, sink.clone());

        thread::sleep(Duration::from_millis(60));
        assert!(sink.log.lock().unwrap().writes.is_empty());

        assert!(!transport.toggle_pause());
        tx.send(StreamEvent::Completed).unwrap();
        handle.join().unwrap();

        let log = sink.log.lock().unwrap();
        assert_eq!(log.writes, vec![vec![9, 9, 9, 9]]);
        assert!(log.drained);
    }

    #[test]
    fn stop_while_paused_drops_pending_chunk() {
        let (transport, gate) = started();
        let gate = Arc::new(gate);
        let (tx, rx) = unbounded();
        let sink = RecordingSink::default();

        transport.toggle_pause();
        tx.send(StreamEvent::Chunk(vec![7, 7])).unwrap();

        let handle = loop_fixture(rx, transport.clone(), gate, sink.clone());

        thread::sleep(Duration::from_millis(60));
        transport.stop();
        handle.join().unwrap();

        let log = sink.log.lock().unwrap();
        assert!(log.writes.is_empty());
        assert!(!log.drained);
    }

    #[test]
    fn failed_sink_open_ends_session_as_device_unavailable() {
        let (transport, gate) = started();
        let gate = Arc::new(gate);
        let (tx, rx) = unbounded();
        let sink = RecordingSink::failing();

        tx.send(StreamEvent::Chunk(vec![1, 2])).unwrap();

        let handle = loop_fixture(rx, transport.clone(), gate.clone(), sink.clone());
        handle.join().unwrap();

        assert!(!transport.is_playing());
        assert!(matches!(
            gate.wait(Duration::from_millis(50)),
            Some(SessionEnd::DeviceUnavailable { .. })
        ));
        assert!(sink.log.lock().unwrap().writes.is_empty());
    }

    #[test]
    fn source_hangup_counts_as_stream_error() {
        let (transport, gate) = started();
        let gate = Arc::new(gate);
        let (tx, rx) = unbounded();
        drop(tx);

        let handle = loop_fixture(rx, transport.clone(), gate.clone(), RecordingSink::default());
        handle.join().unwrap();

        assert!(!transport.is_playing());
        assert!(matches!(
            gate.wait(Duration::from_millis(50)),
            Some(SessionEnd::StreamError { .. })
        ));
    }

    #[test]
    fn play_track_times_out_when_source_never_completes() {
        let (service, _tx) = FakeService::new();
        let sink = RecordingSink::default();
        let sink_for_factory = sink.clone();
        let config = SessionConfig {
            stall_timeout: Duration::from_millis(200),
            ..test_config()
        };

        let end = play_track(
            &service,
            "song.pcm",
            &config,
            quiet_io(ScriptedInput::boxed("")),
            move |_| sink_for_factory,
        )
        .unwrap();

        assert_eq!(end, SessionEnd::TimedOut);
    }

    #[test]
    fn play_track_completes_and_reports_writes_in_order() {
        let (service, tx) = FakeService::new();
        let sink = RecordingSink::default();
        let sink_for_factory = sink.clone();

        tx.send(StreamEvent::Chunk(vec![1; 882_000])).unwrap();
        tx.send(StreamEvent::Completed).unwrap();

        let end = play_track(
            &service,
            "song.pcm",
            &test_config(),
            quiet_io(ScriptedInput::boxed("")),
            move |_| sink_for_factory,
        )
        .unwrap();

        assert_eq!(end, SessionEnd::Completed);
        let log = sink.log.lock().unwrap();
        assert_eq!(log.writes.len(), 1);
        assert_eq!(log.writes[0].len(), 882_000);
        assert!(log.drained);
        // Format derives from metadata, not from a hardcoded default.
        assert_eq!(
            log.opened,
            vec![PcmFormat {
                sample_rate: 44_100,
                channels: 2
            }]
        );
    }

    #[test]
    fn user_stop_ends_session_as_stopped() {
        let (service, tx) = FakeService::new();
        let sink = RecordingSink::default();
        let sink_for_factory = sink.clone();

        // A stream that never terminates on its own.
        tx.send(StreamEvent::Chunk(vec![1, 2, 3, 4])).unwrap();

        let end = play_track(
            &service,
            "song.pcm",
            &test_config(),
            quiet_io(ScriptedInput::boxed("x q")),
            move |_| sink_for_factory,
        )
        .unwrap();

        assert_eq!(end, SessionEnd::Stopped);
        // No terminal source event was consumed; the sink was never drained.
        assert!(!sink.log.lock().unwrap().drained);
    }

    #[test]
    fn unknown_track_is_an_error_before_streaming() {
        let (service, _tx) = FakeService::new();
        let result = play_track(
            &service,
            "missing.pcm",
            &test_config(),
            quiet_io(ScriptedInput::boxed("")),
            |_| RecordingSink::default(),
        );
        assert!(result.is_err());
    }
}

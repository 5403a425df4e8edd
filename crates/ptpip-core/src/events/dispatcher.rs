//! Event connection reader and listener dispatch.
//!
//! Two threads per session: the reader owns the event connection and pushes
//! decoded events onto a bounded channel; the dispatcher drains the channel
//! and runs listener callbacks. A slow listener backs up the queue, never
//! the socket.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, trace, warn};

use super::{deliver, Event, ListenerSet};
use crate::error::PtpError;
use crate::protocol::{
    EventPacket, Packet, PacketType, Payload, ProbeRequest, ProbeResponse, ProtocolError,
};
use crate::transport::PtpStream;

pub const READER_THREAD_NAME: &str = "ptpip-event-reader";
pub const DISPATCH_THREAD_NAME: &str = "ptpip-event-dispatch";

enum Task {
    Event(Event),
    Error(PtpError),
}

/// Background reader and dispatcher for one event connection.
pub struct EventDispatcher<S: PtpStream> {
    /// Second handle to the event connection, used to unblock the reader.
    control: S,
    closing: Arc<AtomicBool>,
    listeners: Arc<ListenerSet>,
    reader: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl<S: PtpStream> EventDispatcher<S> {
    /// Take ownership of the event connection and start both threads.
    ///
    /// `session_id` is read at delivery time and stamped onto each event.
    pub fn start(
        stream: S,
        listeners: Arc<ListenerSet>,
        session_id: Arc<AtomicU32>,
        queue_depth: usize,
    ) -> Result<Self, PtpError> {
        let control = stream.try_clone()?;
        let closing = Arc::new(AtomicBool::new(false));
        let (tasks, queue) = mpsc::sync_channel(queue_depth.max(1));

        let dispatcher = {
            let listeners = Arc::clone(&listeners);
            thread::Builder::new()
                .name(DISPATCH_THREAD_NAME.to_string())
                .spawn(move || dispatch_loop(queue, &listeners))?
        };

        let reader = {
            let closing = Arc::clone(&closing);
            thread::Builder::new()
                .name(READER_THREAD_NAME.to_string())
                .spawn(move || read_loop(stream, &tasks, &closing, &session_id))
        };
        let reader = match reader {
            Ok(handle) => handle,
            Err(err) => {
                // The queue sender died with the failed closure, so the
                // dispatcher sees a closed channel and exits.
                let _ = dispatcher.join();
                return Err(err.into());
            }
        };

        debug!(peer = %control.peer(), queue_depth, "Event dispatcher started");
        Ok(Self {
            control,
            closing,
            listeners,
            reader: Some(reader),
            dispatcher: Some(dispatcher),
        })
    }

    pub fn listeners(&self) -> &Arc<ListenerSet> {
        &self.listeners
    }

    /// Whether the reader thread has exited.
    pub fn is_finished(&self) -> bool {
        self.reader.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Mark the session as closing and shut down the event connection.
    ///
    /// Read failures after this point are expected and not reported.
    pub fn close_stream(&self) {
        self.closing.store(true, Ordering::Release);
        if let Err(err) = self.control.shutdown() {
            debug!(error = %err, "Event connection shutdown failed");
        }
    }

    /// Wait for the reader to exit and for queued events to be delivered.
    pub fn join(&mut self) {
        if let Some(reader) = self.reader.take()
            && reader.join().is_err()
        {
            warn!("Event reader thread panicked");
        }
        if let Some(dispatcher) = self.dispatcher.take()
            && dispatcher.join().is_err()
        {
            warn!("Event dispatch thread panicked");
        }
    }

    /// `close_stream` followed by `join`. Idempotent.
    pub fn shutdown(&mut self) {
        if self.reader.is_none() && self.dispatcher.is_none() {
            return;
        }
        self.close_stream();
        self.join();
        debug!("Event dispatcher stopped");
    }
}

impl<S: PtpStream> Drop for EventDispatcher<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn read_loop<S: PtpStream>(
    mut stream: S,
    tasks: &SyncSender<Task>,
    closing: &AtomicBool,
    session_id: &AtomicU32,
) {
    loop {
        let result = Packet::read_from(&mut stream)
            .and_then(|packet| handle_packet(&mut stream, &packet, session_id));

        let task = match result {
            Ok(Some(event)) => Task::Event(event),
            Ok(None) => continue,
            Err(_) if closing.load(Ordering::Acquire) => {
                debug!("Event reader stopping");
                return;
            }
            Err(err) => {
                let fatal = err.is_fatal_to_stream();
                warn!(error = %err, fatal, "Event connection error");
                if tasks.send(Task::Error(err)).is_err() || fatal {
                    return;
                }
                continue;
            }
        };
        if tasks.send(task).is_err() {
            return;
        }
    }
}

fn handle_packet<S: PtpStream>(
    stream: &mut S,
    packet: &Packet,
    session_id: &AtomicU32,
) -> Result<Option<Event>, PtpError> {
    match packet.packet_type() {
        PacketType::Event => {
            let event = EventPacket::from_packet(packet)?;
            trace!(code = %event.code, tx_id = event.transaction_id, "Event received");
            Ok(Some(Event::from_packet(
                event,
                session_id.load(Ordering::Acquire),
            )))
        }
        PacketType::ProbeRequest => {
            ProbeRequest::from_packet(packet)?;
            trace!("Probe on event connection");
            ProbeResponse.to_packet().write_to(stream)?;
            Ok(None)
        }
        other => Err(ProtocolError::UnexpectedPacket {
            expected: "Event",
            actual: other,
        }
        .into()),
    }
}

fn dispatch_loop(queue: Receiver<Task>, listeners: &ListenerSet) {
    for task in queue {
        for listener in &listeners.snapshot() {
            // A panicking listener loses this task only.
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| match &task {
                Task::Event(event) => {
                    if let Err(err) = deliver(listener.as_ref(), event) {
                        listener.on_error(&err.into());
                    }
                }
                Task::Error(err) => listener.on_error(err),
            }));
            if outcome.is_err() {
                warn!("Event listener panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventListener;
    use crate::protocol::{EventCode, EventParams, OperationResponse, ResponseCode};
    use crate::transport::MockStream;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, PartialEq)]
    enum Call {
        Added { handle: u32, thread: Option<String> },
        Error(String),
    }

    struct Recorder {
        calls: Mutex<mpsc::Sender<Call>>,
    }

    impl Recorder {
        fn new() -> (Arc<Self>, Receiver<Call>) {
            let (tx, rx) = mpsc::channel();
            (
                Arc::new(Self {
                    calls: Mutex::new(tx),
                }),
                rx,
            )
        }

        fn record(&self, call: Call) {
            let _ = self.calls.lock().unwrap().send(call);
        }
    }

    impl EventListener for Recorder {
        fn on_object_added(&self, object_handle: u32) {
            self.record(Call::Added {
                handle: object_handle,
                thread: thread::current().name().map(str::to_string),
            });
        }

        fn on_error(&self, error: &PtpError) {
            self.record(Call::Error(error.to_string()));
        }
    }

    fn start(listener: Arc<Recorder>) -> (EventDispatcher<MockStream>, MockStream) {
        let (ours, theirs) = MockStream::pair();
        let listeners = Arc::new(ListenerSet::new());
        listeners.add(listener);
        let dispatcher =
            EventDispatcher::start(ours, listeners, Arc::new(AtomicU32::new(1)), 8).unwrap();
        (dispatcher, theirs)
    }

    fn send_event(peer: &mut MockStream, code: EventCode, params: &[u32]) {
        EventPacket {
            code,
            transaction_id: 0,
            params: EventParams::new(params).unwrap(),
        }
        .to_packet()
        .write_to(peer)
        .unwrap();
    }

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn test_object_added_fires_once_on_dispatch_thread() {
        let (recorder, calls) = Recorder::new();
        let (mut dispatcher, mut peer) = start(recorder);

        send_event(&mut peer, EventCode::ObjectAdded, &[42]);
        assert_eq!(
            calls.recv_timeout(WAIT).unwrap(),
            Call::Added {
                handle: 42,
                thread: Some(DISPATCH_THREAD_NAME.to_string()),
            }
        );

        dispatcher.shutdown();
        assert!(calls.try_recv().is_err());
    }

    #[test]
    fn test_close_while_blocked_reports_nothing() {
        let (recorder, calls) = Recorder::new();
        let (mut dispatcher, _peer) = start(recorder);

        thread::sleep(Duration::from_millis(20));
        assert!(!dispatcher.is_finished());
        dispatcher.shutdown();
        assert!(dispatcher.is_finished());
        assert!(calls.try_recv().is_err());
    }

    #[test]
    fn test_peer_disconnect_reports_error_once() {
        let (recorder, calls) = Recorder::new();
        let (mut dispatcher, peer) = start(recorder);

        peer.shutdown().unwrap();
        assert!(matches!(calls.recv_timeout(WAIT).unwrap(), Call::Error(_)));
        dispatcher.join();
        assert!(calls.try_recv().is_err());
    }

    #[test]
    fn test_unexpected_packet_does_not_stop_reader() {
        let (recorder, calls) = Recorder::new();
        let (mut dispatcher, mut peer) = start(recorder);

        OperationResponse {
            code: ResponseCode::Ok,
            transaction_id: 1,
            params: Default::default(),
        }
        .to_packet()
        .write_to(&mut peer)
        .unwrap();
        send_event(&mut peer, EventCode::ObjectAdded, &[7]);

        assert!(matches!(calls.recv_timeout(WAIT).unwrap(), Call::Error(_)));
        assert!(matches!(
            calls.recv_timeout(WAIT).unwrap(),
            Call::Added { handle: 7, .. }
        ));
        dispatcher.shutdown();
    }

    #[test]
    fn test_missing_parameter_goes_to_on_error() {
        let (recorder, calls) = Recorder::new();
        let (mut dispatcher, mut peer) = start(recorder);

        send_event(&mut peer, EventCode::ObjectAdded, &[]);
        match calls.recv_timeout(WAIT).unwrap() {
            Call::Error(text) => assert!(text.contains("parameter"), "{}", text),
            other => panic!("unexpected call {:?}", other),
        }
        dispatcher.shutdown();
    }

    #[test]
    fn test_probe_is_answered() {
        let (recorder, _calls) = Recorder::new();
        let (mut dispatcher, mut peer) = start(recorder);

        ProbeRequest.to_packet().write_to(&mut peer).unwrap();
        let reply = Packet::read_from(&mut peer).unwrap();
        assert_eq!(reply.packet_type(), PacketType::ProbeResponse);
        dispatcher.shutdown();
    }

    #[test]
    fn test_events_with_no_listeners_are_dropped() {
        let (ours, mut peer) = MockStream::pair();
        let mut dispatcher = EventDispatcher::start(
            ours,
            Arc::new(ListenerSet::new()),
            Arc::new(AtomicU32::new(0)),
            1,
        )
        .unwrap();
        for handle in 0..4 {
            send_event(&mut peer, EventCode::ObjectAdded, &[handle]);
        }
        dispatcher.shutdown();
        assert!(dispatcher.is_finished());
    }

    struct Panicking;

    impl EventListener for Panicking {
        fn on_object_added(&self, _object_handle: u32) {
            panic!("listener failure");
        }
    }

    #[test]
    fn test_panicking_listener_does_not_stop_others() {
        let (recorder, calls) = Recorder::new();
        let (mut dispatcher, mut peer) = start(recorder);
        dispatcher.listeners().add(Arc::new(Panicking));

        send_event(&mut peer, EventCode::ObjectAdded, &[1]);
        send_event(&mut peer, EventCode::ObjectAdded, &[2]);
        for handle in [1, 2] {
            assert!(matches!(
                calls.recv_timeout(WAIT).unwrap(),
                Call::Added { handle: h, .. } if h == handle
            ));
        }

        dispatcher.shutdown();
        assert!(dispatcher.is_finished());
    }
}

//! Integration tests for glucometer-link.
//!
//! These drive full exchanges through the public API only.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use glucometer_link::protocol::{
    CommandKind, DeviceInfoRecord, FrameCodec, MeasurementRecord, Packet, Timestamp, TimingRecord,
};
use glucometer_link::transport::{channel_sink, BlockingTransport, SimulatedMeter};
use glucometer_link::{
    AsyncSession, Communication, ErrorKind, FixedClock, LinkError, ProtocolError,
    ProtocolVersion, SessionBuilder, SessionListener, SessionState,
};

const V1_INFO: [u8; 16] = [
    0x55, 0x10, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x11, 0x22, 0x33, 0x92, 0x22, 0x33,
];
const V1_RESULT: [u8; 14] = [
    0x55, 0x0E, 0x03, 0x01, 0x02, 0x03, 0x04, 0x05, 0x00, 0x11, 0x22, 0x86, 0x22, 0x00,
];
const V1_END: [u8; 6] = [0x55, 0x06, 0x04, 0x5F, 0x00, 0x00];

fn clock() -> FixedClock {
    FixedClock(Timestamp::new(2024, 6, 18, 9, 30).with_second(12))
}

/// Answers each command with the next scripted frame, whatever it asked.
struct ScriptedLink {
    script: VecDeque<Bytes>,
    inbox: VecDeque<Bytes>,
    sent: Vec<Bytes>,
}

impl ScriptedLink {
    fn new(frames: &[&[u8]]) -> Self {
        Self {
            script: frames.iter().map(|f| Bytes::copy_from_slice(f)).collect(),
            inbox: VecDeque::new(),
            sent: Vec::new(),
        }
    }
}

impl BlockingTransport for ScriptedLink {
    fn send_frame(&mut self, frame: Bytes) -> glucometer_link::Result<()> {
        self.sent.push(frame);
        if let Some(reply) = self.script.pop_front() {
            self.inbox.push_back(reply);
        }
        Ok(())
    }

    fn receive_frame(&mut self, _timeout: Duration) -> glucometer_link::Result<Option<Bytes>> {
        Ok(self.inbox.pop_front())
    }
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl SessionListener for Recorder {
    fn on_device_info(&self, info: &DeviceInfoRecord) {
        self.events
            .lock()
            .push(format!("info battery={}", info.battery_percent));
    }

    fn on_measurements(&self, records: &[MeasurementRecord]) {
        self.events.lock().push(format!("measurements {}", records.len()));
    }

    fn on_protocol_error(&self, kind: ErrorKind, _message: &str) {
        self.events.lock().push(format!("error {}", kind));
    }

    fn on_finished(&self, communication: &Communication) {
        self.events
            .lock()
            .push(format!("finished valid={}", communication.is_valid()));
    }
}

/// Spawn a task that answers the session's commands from `meter`.
fn serve(session: AsyncSession, mut meter: SimulatedMeter, mut rx: mpsc::UnboundedReceiver<Bytes>) {
    tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            if let Some(reply) = meter.handle_command(&command) {
                session.on_frame_received(&reply);
            }
        }
    });
}

/// Test the captured V1 exchange end to end.
#[test]
fn test_v1_captured_exchange() {
    let mut link = ScriptedLink::new(&[&V1_INFO, &V1_RESULT, &V1_RESULT, &V1_RESULT, &V1_END]);
    let recorder = Arc::new(Recorder::default());
    let mut session = SessionBuilder::new(ProtocolVersion::V1)
        .clock(clock())
        .shared_listener(recorder.clone())
        .build_blocking()
        .unwrap();

    let comm = session.communicate(&mut link).unwrap();

    assert!(comm.info().is_some());
    assert_eq!(comm.measurements().unwrap().len(), 3);
    assert!(comm.end().is_some());
    assert!(comm.error().is_none());
    assert!(comm.is_valid());
    assert_eq!(session.state(), SessionState::Done);

    let record = &comm.measurements().unwrap()[0];
    assert_eq!(record.timestamp, Timestamp::new(2001, 2, 3, 4, 5));
    assert_eq!(record.glucose_raw, 0x1100);

    // Every command is a well-formed V1 host frame.
    let codec = FrameCodec::new(ProtocolVersion::V1);
    let kinds: Vec<CommandKind> = link
        .sent
        .iter()
        .map(|f| codec.decode_command(f).unwrap().kind)
        .collect();
    assert_eq!(kinds[0], CommandKind::InfoRequest);
    assert!(kinds[1..].iter().all(|k| *k == CommandKind::DataRequest));
    assert_eq!(kinds.len(), 5);

    assert_eq!(
        *recorder.events.lock(),
        vec![
            "info battery=5".to_string(),
            "measurements 3".to_string(),
            "finished valid=true".to_string(),
        ]
    );
}

/// Test the same V1 capture fed to the asynchronous driver.
#[tokio::test(start_paused = true)]
async fn test_v1_captured_exchange_async() {
    let (sink, mut rx) = channel_sink();
    let session = SessionBuilder::new(ProtocolVersion::V1)
        .clock(clock())
        .build_async(sink)
        .unwrap();

    session.connect();
    for frame in [&V1_INFO[..], &V1_RESULT[..], &V1_RESULT[..], &V1_RESULT[..], &V1_END[..]] {
        assert!(rx.recv().await.is_some());
        session.on_frame_received(frame);
    }

    let comm = session.wait_for_outcome().await.unwrap();
    assert!(comm.is_valid());
    assert_eq!(comm.measurements().unwrap().len(), 3);
}

/// Test eight results for every later revision.
#[test]
fn test_eight_results_every_revision() {
    for version in [ProtocolVersion::V2, ProtocolVersion::V3_1, ProtocolVersion::V3_2] {
        let mut meter = SimulatedMeter::sample(version, 8);
        let mut session = SessionBuilder::new(version)
            .clock(clock())
            .build_blocking()
            .unwrap();

        let comm = session.communicate(&mut meter).unwrap();
        assert_eq!(comm.measurements().unwrap().len(), 8, "{}", version);
        assert_eq!(session.state(), SessionState::Done, "{}", version);

        // Opening command per revision.
        let opening = FrameCodec::new(version).descriptor().open_code;
        let first = FrameCodec::new(version)
            .encode_command(CommandKind::InfoRequest, &Timestamp::new(2024, 1, 1, 0, 0))
            .unwrap();
        assert_eq!(first[2], opening);
    }
}

/// Test that five lapsed deadlines yield one timeout and no sixth send.
#[tokio::test(start_paused = true)]
async fn test_timeout_after_five_deadlines() {
    let (sink, mut rx) = channel_sink();
    let recorder = Arc::new(Recorder::default());
    let session = SessionBuilder::new(ProtocolVersion::V3_2)
        .clock(clock())
        .shared_listener(recorder.clone())
        .build_async(sink)
        .unwrap();

    session.connect();
    let comm = session.wait_for_outcome().await.unwrap();
    assert_eq!(
        comm.error(),
        Some(&ProtocolError::Timeout {
            retries_exhausted: 5
        })
    );
    assert_eq!(session.state(), SessionState::Error);

    tokio::time::sleep(Duration::from_secs(5)).await;
    let mut sends = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        sends.push(frame);
    }
    assert_eq!(sends.len(), 5);
    assert!(sends.windows(2).all(|w| w[0] == w[1]));

    let errors = recorder
        .events
        .lock()
        .iter()
        .filter(|e| e.starts_with("error"))
        .count();
    assert_eq!(errors, 1);
}

/// Test that lost replies are recovered by resending.
#[tokio::test(start_paused = true)]
async fn test_lost_replies_recovered() {
    let (sink, rx) = channel_sink();
    let session = SessionBuilder::new(ProtocolVersion::V2)
        .clock(clock())
        .build_async(sink)
        .unwrap();

    // Four lost replies still fit in a budget of five sends.
    let mut meter = SimulatedMeter::sample(ProtocolVersion::V2, 3);
    meter.drop_next(4);
    serve(session.clone(), meter, rx);

    session.connect();
    let comm = session.wait_for_outcome().await.unwrap();
    assert!(comm.is_valid());
    assert_eq!(comm.measurements().unwrap().len(), 3);
}

/// Test disconnect idempotence and that late frames are ignored.
#[tokio::test(start_paused = true)]
async fn test_disconnect_idempotent() {
    let (sink, _rx) = channel_sink();
    let session = SessionBuilder::new(ProtocolVersion::V1)
        .clock(clock())
        .build_async(sink)
        .unwrap();

    session.connect();
    session.on_frame_received(&V1_INFO);
    assert_eq!(session.state(), SessionState::AwaitingResultOrEnd);

    session.disconnect();
    let once = session.communication();
    session.disconnect();
    assert_eq!(session.communication(), once);
    assert_eq!(session.state(), SessionState::Disconnected);

    session.on_frame_received(&V1_RESULT);
    session.on_frame_received(&V1_END);
    assert_eq!(session.state(), SessionState::Disconnected);
    assert_eq!(session.communication(), Communication::new());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(session.state(), SessionState::Disconnected);
}

/// Test that both drivers agree on the same frame sequence.
#[tokio::test(start_paused = true)]
async fn test_blocking_and_async_agree() {
    for version in ProtocolVersion::ALL {
        let mut meter = SimulatedMeter::sample(version, 5);
        let mut blocking = SessionBuilder::new(version)
            .clock(clock())
            .build_blocking()
            .unwrap();
        let from_blocking = blocking.communicate(&mut meter).unwrap();

        let (sink, rx) = channel_sink();
        let session = SessionBuilder::new(version)
            .clock(clock())
            .build_async(sink)
            .unwrap();
        serve(session.clone(), SimulatedMeter::sample(version, 5), rx);
        session.connect();
        let from_async = session.wait_for_outcome().await.unwrap();

        assert_eq!(from_blocking, from_async, "{}", version);
        assert!(from_async.is_valid());
    }
}

/// Test that a corrupted reply ends the exchange with a content error.
#[test]
fn test_corrupted_reply_is_terminal() {
    let mut meter = SimulatedMeter::sample(ProtocolVersion::V2, 4);
    meter.corrupt_next(1);
    let mut session = SessionBuilder::new(ProtocolVersion::V2)
        .clock(clock())
        .build_blocking()
        .unwrap();

    let comm = session.communicate(&mut meter).unwrap();
    assert_eq!(session.state(), SessionState::Error);
    assert_eq!(comm.error().map(ProtocolError::kind), Some(ErrorKind::Content));
    assert!(comm.info().is_none());
    assert!(!comm.is_valid());
}

/// Test the V3.1 timing packet round.
#[test]
fn test_v3_1_timing_round() {
    let mut meter = SimulatedMeter::sample(ProtocolVersion::V3_1, 2)
        .with_timing(TimingRecord { code: 0x0102 });
    let mut session = SessionBuilder::new(ProtocolVersion::V3_1)
        .clock(clock())
        .build_blocking()
        .unwrap();

    let comm = session.communicate(&mut meter).unwrap();
    assert!(comm.is_valid());
    assert_eq!(comm.timing(), Some(&TimingRecord { code: 0x0102 }));
    assert_eq!(comm.measurements().unwrap().len(), 2);

    let kinds: Vec<CommandKind> = meter.commands().iter().map(|c| c.kind).collect();
    assert_eq!(
        kinds,
        vec![
            CommandKind::InfoRequest,
            CommandKind::DataRequest,
            CommandKind::TimeSync,
            CommandKind::DataRequest,
            CommandKind::DataRequest,
        ]
    );
}

/// Test that an end marker with no results finishes without measurements.
#[test]
fn test_end_without_results() {
    for version in [ProtocolVersion::V2, ProtocolVersion::V3_2] {
        let mut meter = SimulatedMeter::sample(version, 0);
        let mut session = SessionBuilder::new(version)
            .clock(clock())
            .build_blocking()
            .unwrap();

        let comm = session.communicate(&mut meter).unwrap();
        assert_eq!(session.state(), SessionState::Done, "{}", version);
        assert!(comm.end().is_some());
        assert!(comm.error().is_none());
        assert_eq!(comm.measurements(), None);
        assert!(!comm.is_valid());
    }
}

/// Test that a frame from another revision is rejected by length.
#[test]
fn test_foreign_revision_frame() {
    let v2_info = FrameCodec::new(ProtocolVersion::V2)
        .encode_packet(&Packet::Info(DeviceInfoRecord {
            protocol_code: 2,
            client_code: 0,
            model_code: 0,
            type_code: 0,
            battery_percent: 50,
            code: vec![0; 6],
        }))
        .unwrap();
    let mut link = ScriptedLink::new(&[&v2_info]);
    let mut session = SessionBuilder::new(ProtocolVersion::V1)
        .clock(clock())
        .build_blocking()
        .unwrap();

    let comm = session.communicate(&mut link).unwrap();
    assert_eq!(comm.error().map(ProtocolError::kind), Some(ErrorKind::Length));
}

/// Test the JSON hand-off of a finished exchange.
#[test]
fn test_communication_json() {
    let mut link = ScriptedLink::new(&[&V1_INFO, &V1_RESULT, &V1_END]);
    let mut session = SessionBuilder::new(ProtocolVersion::V1)
        .clock(clock())
        .build_blocking()
        .unwrap();
    let comm = session.communicate(&mut link).unwrap();

    let value: serde_json::Value = serde_json::from_str(&comm.to_json().unwrap()).unwrap();
    assert_eq!(value["measurements"][0]["glucose_raw"], 0x1100);
    assert_eq!(value["measurements"][0]["timestamp"]["year"], 2001);
    assert!(value["error"].is_null());
}

/// Test that a closed channel sink is survived and ends in a timeout.
#[tokio::test(start_paused = true)]
async fn test_closed_sink_times_out() {
    let (sink, rx) = channel_sink();
    drop(rx);
    let session = SessionBuilder::new(ProtocolVersion::V2)
        .clock(clock())
        .build_async(sink)
        .unwrap();

    session.connect();
    let comm = session.wait_for_outcome().await.unwrap();
    assert_eq!(comm.error().map(ProtocolError::kind), Some(ErrorKind::Timeout));
}

/// Test config loading feeding the builder.
#[test]
fn test_config_from_json() {
    let config = glucometer_link::SessionConfig::from_json(
        r#"{"version":"v3.1","retry_interval_ms":150,"max_retries":3}"#,
    )
    .unwrap();
    let session = SessionBuilder::from_config(config).build_blocking().unwrap();
    assert_eq!(session.config().version, ProtocolVersion::V3_1);
    assert_eq!(session.config().retry_interval, Duration::from_millis(150));

    let err = glucometer_link::SessionConfig::from_json(r#"{"version":"v4"}"#).unwrap_err();
    assert!(matches!(err, LinkError::Json(_)));
}

//! Replay - run an exchange against a simulated meter.
//!
//! This example demonstrates:
//! - Building an asynchronous session with the builder pattern
//! - Wiring a channel sink to a transport task
//! - Receiving results through a `SessionListener`
//! - Handing the finished `Communication` off as JSON
//!
//! # Running
//!
//! ```sh
//! RUST_LOG=glucometer_link=debug cargo run --example replay -- v3.1 6
//! ```

use glucometer_link::protocol::{DeviceInfoRecord, MeasurementRecord, TimingRecord};
use glucometer_link::transport::{channel_sink, SimulatedMeter};
use glucometer_link::{
    Communication, ErrorKind, ProtocolVersion, SessionBuilder, SessionListener,
};
use tracing_subscriber::EnvFilter;

/// Prints every session event.
struct Printer;

impl SessionListener for Printer {
    fn on_device_info(&self, info: &DeviceInfoRecord) {
        println!(
            "meter model={:#04x} battery={}% code={:02x?}",
            info.model_code, info.battery_percent, info.code
        );
    }

    fn on_measurements(&self, records: &[MeasurementRecord]) {
        for record in records {
            let ts = &record.timestamp;
            println!(
                "{:04}-{:02}-{:02} {:02}:{:02}  raw={}{}",
                ts.year,
                ts.month,
                ts.day,
                ts.hour,
                ts.minute,
                record.glucose_raw,
                if record.is_retained() { " (retained)" } else { "" }
            );
        }
    }

    fn on_protocol_error(&self, kind: ErrorKind, message: &str) {
        eprintln!("{}: {}", kind, message);
    }

    fn on_finished(&self, communication: &Communication) {
        println!("finished, valid={}", communication.is_valid());
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let version: ProtocolVersion = args.next().as_deref().unwrap_or("v2").parse()?;
    let count: usize = args.next().as_deref().unwrap_or("4").parse()?;

    let mut meter = SimulatedMeter::sample(version, count);
    if version == ProtocolVersion::V3_1 {
        meter = meter.with_timing(TimingRecord { code: 0x0001 });
    }
    // Lose one reply to show a resend.
    meter.drop_next(1);

    let (sink, mut outbound) = channel_sink();
    let session = SessionBuilder::new(version)
        .listener(Printer)
        .build_async(sink)?;

    // Transport task: deliver each command to the meter, feed replies back
    let transport = {
        let session = session.clone();
        tokio::spawn(async move {
            while let Some(command) = outbound.recv().await {
                if let Some(reply) = meter.handle_command(&command) {
                    session.on_frame_received(&reply);
                }
            }
        })
    };

    session.connect();
    if let Some(communication) = session.wait_for_outcome().await {
        println!("{}", communication.to_json()?);
    }

    session.disconnect();
    transport.abort();
    Ok(())
}

//! Serial link to the touch controller.
//!
//! A dedicated reader thread polls the device and forwards completed
//! command lines over a channel; the UI loop drains that channel on its
//! tick. The thread makes no decisions beyond byte-to-line assembly.

use std::io::Read;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};
use serialport::{DataBits, FlowControl, Parity, StopBits};

use crate::protocol::LineAssembler;

/// Interval between drains of the device buffer
pub const POLL_INTERVAL: Duration = Duration::from_millis(15);

/// Errors surfaced by the serial layer. Both are terminal: there is no
/// reconnect or retry anywhere in the system.
#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },
    #[error("serial read failed: {0}")]
    Read(#[from] std::io::Error),
}

/// Events delivered from the reader thread to the UI loop
#[derive(Debug)]
pub enum SerialEvent {
    /// One completed, normalized command line
    Line(String),
    /// The link is gone; no further lines will arrive
    Disconnected(SerialError),
}

/// Settings for the controller link: 8N1, no flow control, and a read
/// timeout short enough that a timed-out read just means "no data yet".
#[derive(Debug, Clone)]
pub struct PortSettings {
    pub path: String,
    pub baud_rate: u32,
    pub timeout: Duration,
}

impl PortSettings {
    pub fn new(path: &str, baud_rate: u32) -> Self {
        Self {
            path: path.to_string(),
            baud_rate,
            timeout: Duration::from_millis(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Handle to the background reader thread.
pub struct SerialReader {
    pub events: Receiver<SerialEvent>,
}

impl SerialReader {
    /// Open the device and start the poll loop on its own thread.
    ///
    /// An open failure is delivered as a single `Disconnected` event and
    /// no thread is spawned.
    pub fn spawn(settings: PortSettings) -> Self {
        let (tx, rx) = unbounded();
        let result = serialport::new(&settings.path, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(settings.timeout)
            .open();
        match result {
            Ok(port) => {
                log::info!("Listening on {} at {} baud", settings.path, settings.baud_rate);
                thread::spawn(move || read_loop(port, tx));
            }
            Err(source) => {
                let err = SerialError::Open {
                    port: settings.path,
                    source,
                };
                log::error!("{}", err);
                let _ = tx.send(SerialEvent::Disconnected(err));
            }
        }
        Self { events: rx }
    }
}

fn read_loop(mut port: Box<dyn serialport::SerialPort>, tx: Sender<SerialEvent>) {
    let mut assembler = LineAssembler::new();
    let mut buf = [0u8; 1024];
    loop {
        match port.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                for line in assembler.push(&buf[..n]) {
                    if tx.send(SerialEvent::Line(line)).is_err() {
                        // Receiver dropped, the app is going away
                        return;
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                log::error!("Serial read failed: {}", e);
                let _ = tx.send(SerialEvent::Disconnected(SerialError::Read(e)));
                return;
            }
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Log the serial devices visible on this machine, to help pick the right
/// `--port` value.
pub fn log_available_ports() {
    match serialport::available_ports() {
        Ok(ports) if ports.is_empty() => log::info!("No serial ports detected"),
        Ok(ports) => {
            for port in ports {
                log::info!("Serial port available: {}", port.port_name);
            }
        }
        Err(e) => log::warn!("Could not enumerate serial ports: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = PortSettings::new("/dev/ttyUSB0", 115_200);
        assert_eq!(settings.path, "/dev/ttyUSB0");
        assert_eq!(settings.baud_rate, 115_200);
        assert_eq!(settings.timeout, Duration::from_millis(5));
    }

    #[test]
    fn test_settings_builder() {
        let settings =
            PortSettings::new("/dev/ttyACM0", 9600).with_timeout(Duration::from_millis(50));
        assert_eq!(settings.timeout, Duration::from_millis(50));
    }

    #[test]
    fn test_open_failure_reports_once() {
        let reader = SerialReader::spawn(PortSettings::new("/dev/does-not-exist", 115_200));
        match reader.events.recv() {
            Ok(SerialEvent::Disconnected(SerialError::Open { port, .. })) => {
                assert_eq!(port, "/dev/does-not-exist");
            }
            other => panic!("expected open failure, got {:?}", other),
        }
        // Channel is closed afterwards; polling never started
        assert!(reader.events.try_recv().is_err());
    }
}

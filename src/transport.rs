//! SCPI over a serial line.

use crate::error::{DiscoveryError, TransportError};
use crate::instrument::Instrument;
use serialport::{ClearBuffer, SerialPort, SerialPortInfo, SerialPortType};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

/// Finds the one serial port whose name or USB description contains `filter`.
pub fn discover(filter: &str) -> Result<String, DiscoveryError> {
    let ports = serialport::available_ports().map_err(DiscoveryError::Enumerate)?;
    select_port(&ports, filter)
}

fn select_port(ports: &[SerialPortInfo], filter: &str) -> Result<String, DiscoveryError> {
    let needle = filter.to_ascii_lowercase();
    let matches: Vec<&SerialPortInfo> = ports.iter().filter(|p| port_matches(p, &needle)).collect();
    match matches.as_slice() {
        [one] => Ok(one.port_name.clone()),
        [] => Err(DiscoveryError::NoneFound {
            filter: filter.to_string(),
        }),
        many => Err(DiscoveryError::Ambiguous {
            filter: filter.to_string(),
            count: many.len(),
        }),
    }
}

fn port_matches(port: &SerialPortInfo, needle: &str) -> bool {
    let contains = |s: &str| s.to_ascii_lowercase().contains(needle);
    if contains(&port.port_name) {
        return true;
    }
    match &port.port_type {
        SerialPortType::UsbPort(usb) => {
            usb.product.as_deref().map_or(false, contains)
                || usb.manufacturer.as_deref().map_or(false, contains)
                || usb.serial_number.as_deref().map_or(false, contains)
        }
        _ => false,
    }
}

/// Byte stream to an instrument that can drop unread input.
pub trait Link: Read + Write {
    fn clear_input(&mut self) -> io::Result<()>;
}

impl Link for Box<dyn SerialPort> {
    fn clear_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

/// An instrument on a serial port. Commands are terminated with `\n` and each
/// reply is one line.
pub struct SerialInstrument<P: Link = Box<dyn SerialPort>> {
    port: P,
    port_name: String,
    timeout: Duration,
}

impl SerialInstrument {
    /// Opens `port_name`. Every query or write fails once `timeout` passes.
    pub fn open(port_name: &str, baud_rate: u32, timeout: Duration) -> Result<Self, TransportError> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|source| TransportError::Open {
                port: port_name.to_string(),
                source,
            })?;
        log::info!("opened {} at {} baud", port_name, baud_rate);
        Ok(Self::with_link(port, port_name, timeout))
    }
}

impl<P: Link> SerialInstrument<P> {
    pub fn with_link(port: P, port_name: &str, timeout: Duration) -> Self {
        Self {
            port,
            port_name: port_name.to_string(),
            timeout,
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    // A reply that arrived after its query timed out is still in the input
    // buffer and would be read as the answer to the next query.
    fn discard_stale_input(&mut self, command: &str) -> Result<(), TransportError> {
        self.port.clear_input().map_err(|e| io_error(command, e))
    }

    fn send(&mut self, command: &str) -> Result<(), TransportError> {
        log::trace!("{} <- {}", self.port_name, command);
        let line = format!("{}\n", command);
        self.port
            .write_all(line.as_bytes())
            .and_then(|_| self.port.flush())
            .map_err(|e| io_error(command, e))
    }

    fn read_line(&mut self, command: &str) -> Result<String, TransportError> {
        let deadline = Instant::now() + self.timeout;
        let mut reply = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            if Instant::now() >= deadline {
                return Err(TransportError::Timeout {
                    command: command.to_string(),
                });
            }
            match self.port.read(&mut byte) {
                Ok(0) => {
                    return Err(TransportError::Disconnected {
                        command: command.to_string(),
                    })
                }
                Ok(_) if byte[0] == b'\n' => break,
                Ok(_) => reply.push(byte[0]),
                Err(ref e) if e.kind() == io::ErrorKind::TimedOut => {
                    return Err(TransportError::Timeout {
                        command: command.to_string(),
                    })
                }
                Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(io_error(command, e)),
            }
        }
        let text = String::from_utf8_lossy(&reply).trim_end_matches('\r').to_string();
        log::trace!("{} -> {}", self.port_name, text);
        Ok(text)
    }
}

impl<P: Link> Instrument for SerialInstrument<P> {
    fn query(&mut self, command: &str) -> Result<String, TransportError> {
        self.discard_stale_input(command)?;
        self.send(command)?;
        self.read_line(command)
    }

    fn write(&mut self, command: &str) -> Result<(), TransportError> {
        self.send(command)
    }
}

fn io_error(command: &str, source: io::Error) -> TransportError {
    match source.kind() {
        io::ErrorKind::TimedOut => TransportError::Timeout {
            command: command.to_string(),
        },
        io::ErrorKind::BrokenPipe | io::ErrorKind::NotConnected | io::ErrorKind::UnexpectedEof => {
            TransportError::Disconnected {
                command: command.to_string(),
            }
        }
        _ => TransportError::Io {
            command: command.to_string(),
            source,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::UsbPortInfo;
    use std::collections::VecDeque;

    fn usb(name: &str, product: Option<&str>) -> SerialPortInfo {
        SerialPortInfo {
            port_name: name.to_string(),
            port_type: SerialPortType::UsbPort(UsbPortInfo {
                vid: 0x1ab1,
                pid: 0x0960,
                serial_number: None,
                manufacturer: Some("Rigol Technologies".to_string()),
                product: product.map(str::to_string),
            }),
        }
    }

    fn plain(name: &str) -> SerialPortInfo {
        SerialPortInfo {
            port_name: name.to_string(),
            port_type: SerialPortType::Unknown,
        }
    }

    #[test]
    fn single_match_is_selected() {
        let ports = vec![plain("/dev/ttyS0"), usb("/dev/ttyUSB0", Some("DSA815"))];
        assert_eq!(select_port(&ports, "DSA").unwrap(), "/dev/ttyUSB0");
    }

    #[test]
    fn match_is_case_insensitive() {
        let ports = vec![usb("COM4", Some("dsa815-tg"))];
        assert_eq!(select_port(&ports, "DSA").unwrap(), "COM4");
    }

    #[test]
    fn port_name_can_match() {
        let ports = vec![plain("/dev/serial/by-id/usb-Rigol_DSA815"), plain("/dev/ttyS0")];
        assert_eq!(select_port(&ports, "dsa").unwrap(), "/dev/serial/by-id/usb-Rigol_DSA815");
    }

    #[test]
    fn no_match() {
        let ports = vec![plain("/dev/ttyS0")];
        assert!(matches!(select_port(&ports, "DSA"), Err(DiscoveryError::NoneFound { .. })));
        assert!(matches!(select_port(&[], "DSA"), Err(DiscoveryError::NoneFound { .. })));
    }

    #[test]
    fn two_matches_are_ambiguous() {
        let ports = vec![usb("/dev/ttyUSB0", Some("DSA815")), usb("/dev/ttyUSB1", Some("DSA832"))];
        assert!(matches!(
            select_port(&ports, "DSA"),
            Err(DiscoveryError::Ambiguous { count: 2, .. })
        ));
    }

    // Serial line whose instrument answers each command with the next scripted
    // reply, or stays silent for `None`.
    #[derive(Default)]
    struct ScriptedLink {
        replies: VecDeque<Option<&'static str>>,
        incoming: VecDeque<u8>,
        written: Vec<u8>,
        clears: usize,
    }

    impl Read for ScriptedLink {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.incoming.pop_front() {
                Some(byte) if !buf.is_empty() => {
                    buf[0] = byte;
                    Ok(1)
                }
                _ => Err(io::Error::new(io::ErrorKind::TimedOut, "no data")),
            }
        }
    }

    impl Write for ScriptedLink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            if buf.contains(&b'\n') {
                if let Some(Some(reply)) = self.replies.pop_front() {
                    self.incoming.extend(reply.bytes());
                }
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Link for ScriptedLink {
        fn clear_input(&mut self) -> io::Result<()> {
            self.clears += 1;
            self.incoming.clear();
            Ok(())
        }
    }

    fn scripted(replies: &[Option<&'static str>]) -> SerialInstrument<ScriptedLink> {
        let link = ScriptedLink {
            replies: replies.iter().copied().collect(),
            ..Default::default()
        };
        SerialInstrument::with_link(link, "/dev/ttyUSB0", Duration::from_secs(1))
    }

    #[test]
    fn query_reads_one_line() {
        let mut inst = scripted(&[Some("Rigol Technologies,DSA815\r\n")]);
        assert_eq!(inst.query("*IDN?").unwrap(), "Rigol Technologies,DSA815");
        assert_eq!(inst.port.written, b"*IDN?\n");
        assert_eq!(inst.port_name(), "/dev/ttyUSB0");
    }

    #[test]
    fn late_reply_is_not_taken_for_next_answer() {
        let mut inst = scripted(&[None, Some("1.0E+07\n")]);
        let first = inst.query(":CALCulate:BANDwidth:RESult?");
        assert!(matches!(first, Err(TransportError::Timeout { .. })));

        // The bandwidth reply shows up after the query gave up on it.
        inst.port.incoming.extend(b"2.0E+03\n");

        let counter = inst.query(":CALCulate:MARKer:FCOunt:X?").unwrap();
        assert_eq!(counter, "1.0E+07");
        assert_eq!(inst.port.clears, 2);
    }

    #[test]
    fn write_expects_no_reply() {
        let mut inst = scripted(&[]);
        inst.write(":CALCulate:MARKer1:STATe ON").unwrap();
        assert_eq!(inst.port.written, b":CALCulate:MARKer1:STATe ON\n");
        assert_eq!(inst.port.clears, 0);
    }

    #[test]
    fn timeout_kind_maps_to_timeout() {
        let e = io_error("*IDN?", io::Error::new(io::ErrorKind::TimedOut, "slow"));
        assert!(matches!(e, TransportError::Timeout { .. }));
        let e = io_error("*IDN?", io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert!(matches!(e, TransportError::Disconnected { .. }));
    }
}

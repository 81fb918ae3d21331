//! In-memory link that plays the part of an EBB.
//!
//! Every command written to the link is recorded and handed to a responder,
//! whose reply lines are queued for reading. Tests script the device by
//! swapping the responder or pushing raw bytes.

use super::serial::SerialLink;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

/// Produces the reply lines for one command (without terminators).
pub type Responder = Box<dyn FnMut(&str) -> Vec<String> + Send>;

/// Replies the way EBB firmware 2.5.3 does for an idle machine.
pub fn default_response(command: &str) -> Vec<String> {
    let name = command.split(',').next().unwrap_or_default();
    match name {
        "V" => vec!["EBBv13_and_above EB Firmware Version 2.5.3".to_string()],
        "QM" => vec!["QM,0,0,0,0".to_string()],
        "QC" => vec!["0394,0300".to_string(), "OK".to_string()],
        "QB" => vec!["0".to_string(), "OK".to_string()],
        _ => vec!["OK".to_string()],
    }
}

struct MockState {
    name: String,
    partial: String,
    commands: Vec<String>,
    inbound: VecDeque<u8>,
    responder: Responder,
    disconnected: bool,
    closed: bool,
}

/// The link end given to the driver.
pub struct MockSerialLink {
    state: Arc<Mutex<MockState>>,
}

/// The test's end of a [`MockSerialLink`].
#[derive(Clone)]
pub struct MockLinkHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockSerialLink {
    /// A link answering with [`default_response`].
    pub fn new(name: impl Into<String>) -> (Self, MockLinkHandle) {
        Self::with_responder(name, Box::new(default_response))
    }

    /// A link answering with `responder`.
    pub fn with_responder(name: impl Into<String>, responder: Responder) -> (Self, MockLinkHandle) {
        let state = Arc::new(Mutex::new(MockState {
            name: name.into(),
            partial: String::new(),
            commands: Vec::new(),
            inbound: VecDeque::new(),
            responder,
            disconnected: false,
            closed: false,
        }));
        (
            Self {
                state: state.clone(),
            },
            MockLinkHandle { state },
        )
    }
}

impl SerialLink for MockSerialLink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if state.disconnected || state.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "link disconnected"));
        }
        state.partial.push_str(&String::from_utf8_lossy(data));
        while let Some(pos) = state.partial.find('\r') {
            let command: String = state.partial.drain(..=pos).collect();
            let command = command.trim_end_matches('\r').to_string();
            let replies = (state.responder)(&command);
            state.commands.push(command);
            for line in replies {
                state.inbound.extend(line.bytes());
                state.inbound.extend(b"\r\n");
            }
        }
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if state.disconnected || state.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "link disconnected"));
        }
        if state.inbound.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(state.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn name(&self) -> String {
        self.state.lock().name.clone()
    }

    fn close(&mut self) -> io::Result<()> {
        self.state.lock().closed = true;
        Ok(())
    }
}

impl MockLinkHandle {
    /// Every command written so far, without the trailing `\r`.
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().commands.clone()
    }

    /// Drain and return the recorded commands.
    pub fn take_commands(&self) -> Vec<String> {
        std::mem::take(&mut self.state.lock().commands)
    }

    /// Queue raw bytes for the driver to read, as if sent unprompted.
    pub fn push_bytes(&self, data: &[u8]) {
        self.state.lock().inbound.extend(data);
    }

    /// Swap the responder used for subsequent commands.
    pub fn set_responder(&self, responder: Responder) {
        self.state.lock().responder = responder;
    }

    /// Make every further read and write fail, like an unplugged cable.
    pub fn disconnect(&self) {
        self.state.lock().disconnected = true;
    }

    /// Whether the driver closed its end.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(link: &mut MockSerialLink) -> String {
        let mut out = Vec::new();
        let mut buf = [0u8; 4];
        while let Ok(n) = link.read(&mut buf) {
            out.extend_from_slice(&buf[..n]);
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_records_commands_split_on_cr() {
        let (mut link, handle) = MockSerialLink::new("mock");
        link.write(b"EM,2,2\rS2,").unwrap();
        link.write(b"17750,4,0,120\r").unwrap();
        assert_eq!(handle.commands(), vec!["EM,2,2", "S2,17750,4,0,120"]);
        assert_eq!(read_all(&mut link), "OK\r\nOK\r\n");
    }

    #[test]
    fn test_default_multi_line_replies() {
        let (mut link, _handle) = MockSerialLink::new("mock");
        link.write(b"QC\r").unwrap();
        assert_eq!(read_all(&mut link), "0394,0300\r\nOK\r\n");
    }

    #[test]
    fn test_read_times_out_when_empty() {
        let (mut link, _handle) = MockSerialLink::new("mock");
        let err = link.read(&mut [0u8; 8]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_disconnect_breaks_link() {
        let (mut link, handle) = MockSerialLink::new("mock");
        handle.disconnect();
        assert_eq!(
            link.read(&mut [0u8; 8]).unwrap_err().kind(),
            io::ErrorKind::BrokenPipe
        );
        assert!(link.write(b"V\r").is_err());
    }
}

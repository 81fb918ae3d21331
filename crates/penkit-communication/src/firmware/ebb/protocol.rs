//! EBB command/response framing.
//!
//! Commands are `\r`-terminated lines. Replies come back as CR/LF separated
//! lines in the order commands were sent, so each incoming line belongs to
//! the oldest request that is still waiting.

use penkit_core::{ConnectionError, Error, ProtocolError};
use std::collections::VecDeque;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// What a command's reply looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// A single value line, no `OK`.
    Line,
    /// Any number of value lines, then `OK`.
    LinesUntilOk,
    /// A bare `OK`.
    Ok,
}

/// A completed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Line(String),
    Lines(Vec<String>),
    Ok,
}

/// A command waiting for (the rest of) its reply.
pub struct PendingRequest {
    command: String,
    expect: Expect,
    lines: Vec<String>,
    reply: oneshot::Sender<Result<Reply, Error>>,
}

impl PendingRequest {
    pub fn new(
        command: impl Into<String>,
        expect: Expect,
    ) -> (Self, oneshot::Receiver<Result<Reply, Error>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                command: command.into(),
                expect,
                lines: Vec::new(),
                reply: tx,
            },
            rx,
        )
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Feed one reply line. Returns the outcome once the request is done,
    /// `None` while it needs more lines.
    fn on_line(&mut self, line: &str) -> Option<Result<Reply, Error>> {
        if line.starts_with('!') {
            return Some(Err(ProtocolError::DeviceReported {
                message: line.to_string(),
            }
            .into()));
        }
        match self.expect {
            Expect::Line => Some(Ok(Reply::Line(line.to_string()))),
            Expect::LinesUntilOk => {
                if line == "OK" {
                    Some(Ok(Reply::Lines(std::mem::take(&mut self.lines))))
                } else {
                    self.lines.push(line.to_string());
                    None
                }
            }
            Expect::Ok => {
                if line == "OK" {
                    Some(Ok(Reply::Ok))
                } else {
                    Some(Err(ProtocolError::UnexpectedResponse {
                        expected: "OK".to_string(),
                        actual: line.to_string(),
                    }
                    .into()))
                }
            }
        }
    }

    fn complete(self, result: Result<Reply, Error>) {
        // the caller may have stopped waiting
        let _ = self.reply.send(result);
    }
}

/// FIFO of requests in flight.
#[derive(Default)]
pub struct CommandQueue {
    pending: VecDeque<PendingRequest>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, request: PendingRequest) {
        self.pending.push_back(request);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Route one line to the oldest request.
    pub fn dispatch(&mut self, line: &str) {
        let Some(front) = self.pending.front_mut() else {
            warn!("Unexpected data from device: {}", line);
            return;
        };
        if let Some(result) = front.on_line(line) {
            if let Some(request) = self.pending.pop_front() {
                if let Err(e) = &result {
                    debug!("{} failed: {}", request.command, e);
                }
                request.complete(result);
            }
        }
    }

    /// Fail every pending request, oldest first.
    pub fn fail_all(&mut self, error: ConnectionError) {
        for request in self.pending.drain(..) {
            request.complete(Err(error.clone().into()));
        }
    }
}

/// Splits an incoming byte stream into non-empty lines.
#[derive(Debug, Default)]
pub struct LineAssembler {
    buffer: String,
}

impl LineAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return every line completed by them.
    pub fn push(&mut self, data: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(data));
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.find(['\r', '\n']) {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\r', '\n']);
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued(expect: Expect) -> (CommandQueue, oneshot::Receiver<Result<Reply, Error>>) {
        let mut queue = CommandQueue::new();
        let (request, rx) = PendingRequest::new("X", expect);
        queue.push(request);
        (queue, rx)
    }

    #[test]
    fn test_line_assembler_splits_on_cr_and_lf() {
        let mut assembler = LineAssembler::new();
        assert_eq!(assembler.push(b"OK\r\n0394,"), vec!["OK"]);
        assert_eq!(assembler.push(b"0300\r\n\r\nOK\n"), vec!["0394,0300", "OK"]);
        assert!(assembler.push(b"\r\n").is_empty());
    }

    #[test]
    fn test_single_line_reply() {
        let (mut queue, mut rx) = queued(Expect::Line);
        queue.dispatch("QM,0,0,0,0");
        assert!(queue.is_empty());
        assert_eq!(
            rx.try_recv().unwrap().unwrap(),
            Reply::Line("QM,0,0,0,0".into())
        );
    }

    #[test]
    fn test_multi_line_reply_waits_for_ok() {
        let (mut queue, mut rx) = queued(Expect::LinesUntilOk);
        queue.dispatch("0394,0300");
        assert_eq!(queue.len(), 1);
        queue.dispatch("OK");
        assert_eq!(
            rx.try_recv().unwrap().unwrap(),
            Reply::Lines(vec!["0394,0300".into()])
        );
    }

    #[test]
    fn test_unexpected_ack_carries_content() {
        let (mut queue, mut rx) = queued(Expect::Ok);
        queue.dispatch("Huh?");
        let err = rx.try_recv().unwrap().unwrap_err();
        assert_eq!(err.to_string(), "Expected OK, got Huh?");
    }

    #[test]
    fn test_error_line_fails_any_request() {
        for expect in [Expect::Line, Expect::LinesUntilOk, Expect::Ok] {
            let (mut queue, mut rx) = queued(expect);
            queue.dispatch("!8 Err: Unknown command");
            match rx.try_recv().unwrap() {
                Err(Error::Protocol(ProtocolError::DeviceReported { message })) => {
                    assert_eq!(message, "!8 Err: Unknown command")
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_lines_route_in_order() {
        let mut queue = CommandQueue::new();
        let (first, mut rx1) = PendingRequest::new("QB", Expect::LinesUntilOk);
        let (second, mut rx2) = PendingRequest::new("SM", Expect::Ok);
        queue.push(first);
        queue.push(second);
        for line in ["1", "OK", "OK"] {
            queue.dispatch(line);
        }
        assert_eq!(rx1.try_recv().unwrap().unwrap(), Reply::Lines(vec!["1".into()]));
        assert_eq!(rx2.try_recv().unwrap().unwrap(), Reply::Ok);
    }

    #[test]
    fn test_stray_lines_are_dropped() {
        let mut queue = CommandQueue::new();
        queue.dispatch("OK");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_fail_all() {
        let mut queue = CommandQueue::new();
        let (a, mut rx1) = PendingRequest::new("V", Expect::Line);
        let (b, mut rx2) = PendingRequest::new("QM", Expect::Line);
        queue.push(a);
        queue.push(b);
        queue.fail_all(ConnectionError::ConnectionLost {
            reason: "unplugged".into(),
        });
        assert!(queue.is_empty());
        assert!(rx1.try_recv().unwrap().unwrap_err().is_connection_error());
        assert!(rx2.try_recv().unwrap().unwrap_err().is_connection_error());
    }
}

//! A `poll(2)`-driven dispatcher for the control channel's Unix socket.
//!
//! Grounded in `xtr::detail::command_dispatcher`: there, a single
//! `poll(2)`-based event loop is driven cooperatively from the consumer
//! thread's own loop via `process_commands(timeout)`, rather than owning a
//! dedicated thread. This dispatcher keeps that shape — [`process_commands`]
//! is meant to be called once per consumer pass — but registers handler
//! methods on a trait object instead of the original's generic
//! `register_callback<Payload>`/`frame_id` map, since this protocol only
//! ever carries three request shapes.

use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::CtlError;
use crate::matcher::make_matcher;
use crate::wire::{self, Pattern, Request, Response, SinkInfo};

/// Implemented by whatever owns the logger's sinks; bridges decoded
/// [`Request`]s to the consumer's actual state without `xtr-ctl` needing to
/// know what a sink is.
pub trait CommandHandler {
    fn status(&mut self, pattern: &Pattern) -> Result<Vec<SinkInfo>, CtlError>;
    fn set_level(&mut self, level: u8, pattern: &Pattern) -> Result<(), CtlError>;
    fn reopen(&mut self) -> Result<(), CtlError>;
}

struct Client {
    stream: UnixStream,
    read_buf: Vec<u8>,
    write_buf: Vec<u8>,
    write_pos: usize,
    /// Set once the peer's read side is gone or errored; a client is only
    /// dropped once this is set *and* its write buffer has fully drained,
    /// so a response to the client's last request isn't discarded
    /// unsent just because it also half-closed its write side.
    read_closed: bool,
}

impl Client {
    fn wants_write(&self) -> bool {
        self.write_pos < self.write_buf.len()
    }

    fn done(&self) -> bool {
        self.read_closed && !self.wants_write()
    }
}

pub struct CommandDispatcher {
    listener: UnixListener,
    path: PathBuf,
    clients: Vec<Client>,
}

impl CommandDispatcher {
    /// Binds a new command socket at `path`, mirroring
    /// `command_dispatcher::command_dispatcher(const char*)`.
    pub fn bind(path: impl Into<PathBuf>) -> Result<Self, CtlError> {
        let path = path.into();
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path)
            .map_err(|source| CtlError::Bind { path: path.clone(), source })?;
        listener.set_nonblocking(true).map_err(|source| CtlError::Bind { path: path.clone(), source })?;
        Ok(Self { listener, path, clients: Vec::new() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accepts any pending connections, services readable/writable clients,
    /// and dispatches any fully-received requests to `handler`. Blocks for
    /// at most `timeout` waiting for activity, mirroring
    /// `command_dispatcher::process_commands(timeout)`.
    pub fn process_commands(
        &mut self,
        timeout: Duration,
        handler: &mut dyn CommandHandler,
    ) -> Result<(), CtlError> {
        let mut pollfds = Vec::with_capacity(self.clients.len() + 1);
        pollfds.push(libc::pollfd { fd: self.listener.as_raw_fd(), events: libc::POLLIN, revents: 0 });
        for client in &self.clients {
            let mut events = libc::POLLIN;
            if client.wants_write() {
                events |= libc::POLLOUT;
            }
            pollfds.push(libc::pollfd { fd: client.stream.as_raw_fd(), events, revents: 0 });
        }

        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        // SAFETY: `pollfds` is a valid, correctly-sized array of `pollfd`
        // for the duration of the call.
        let ready = unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, timeout_ms) };
        if ready < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(CtlError::Poll(err));
        }

        if pollfds[0].revents & libc::POLLIN != 0 {
            self.accept_pending();
        }

        for (client, pfd) in self.clients.iter_mut().zip(pollfds.iter().skip(1)) {
            if pfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
                // The socket itself is gone; no response can be delivered,
                // so there's nothing left to drain before dropping it.
                client.read_closed = true;
                client.write_buf.clear();
                client.write_pos = 0;
                continue;
            }
            if pfd.revents & libc::POLLIN != 0 {
                read_available(client);
            }
            if pfd.revents & libc::POLLOUT != 0 {
                flush_pending(client);
            }
        }

        // Requests are decoded and dispatched after the poll pass completes
        // so a handler mutation (e.g. set_level) can't be observed
        // half-applied by a response encoded earlier in the same pass.
        for client in &mut self.clients {
            dispatch_ready_requests(client, handler)?;
        }

        self.clients.retain(|c| !c.done());
        Ok(())
    }

    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, _addr)) => {
                    if stream.set_nonblocking(true).is_err() {
                        continue;
                    }
                    self.clients.push(Client {
                        stream,
                        read_buf: Vec::new(),
                        write_buf: Vec::new(),
                        write_pos: 0,
                        read_closed: false,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    tracing::warn!(error = %e, "accept on control socket failed");
                    break;
                }
            }
        }
    }
}

impl Drop for CommandDispatcher {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn read_available(client: &mut Client) {
    let mut chunk = [0u8; 4096];
    loop {
        match client.stream.read(&mut chunk) {
            Ok(0) => {
                client.read_closed = true;
                break;
            }
            Ok(n) => client.read_buf.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => {
                client.read_closed = true;
                break;
            }
        }
    }
}

fn flush_pending(client: &mut Client) {
    while client.write_pos < client.write_buf.len() {
        match client.stream.write(&client.write_buf[client.write_pos..]) {
            Ok(0) => {
                client.read_closed = true;
                client.write_buf.clear();
                client.write_pos = 0;
                return;
            }
            Ok(n) => client.write_pos += n,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => {
                client.read_closed = true;
                client.write_buf.clear();
                client.write_pos = 0;
                return;
            }
        }
    }
    client.write_buf.clear();
    client.write_pos = 0;
}

fn dispatch_ready_requests(client: &mut Client, handler: &mut dyn CommandHandler) -> Result<(), CtlError> {
    loop {
        let decoded: Option<(Request, usize)> = match wire::try_decode_frame(&client.read_buf) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!(error = %e, "malformed frame on control socket, dropping client");
                client.read_closed = true;
                return Ok(());
            }
        };
        let Some((request, consumed)) = decoded else { break };
        client.read_buf.drain(..consumed);

        let response = handle_request(request, handler);
        if let Err(e) = wire::encode_frame(&response, &mut client.write_buf) {
            tracing::warn!(error = %e, "failed to encode control channel response");
        }
    }
    // Opportunistically drain what we can without a further poll() pass;
    // anything that would block is picked up next time POLLOUT fires.
    flush_pending(client);
    Ok(())
}

fn handle_request(request: Request, handler: &mut dyn CommandHandler) -> Response {
    let result = match request {
        Request::Status(pattern) => {
            match make_matcher(&pattern) {
                Ok(_) => handler.status(&pattern).map(Response::Status),
                Err(e) => Err(CtlError::Matcher(e)),
            }
        }
        Request::SetLevel { level, pattern } => {
            handler.set_level(level, &pattern).map(|()| Response::Success)
        }
        Request::Reopen => handler.reopen().map(|()| Response::Success),
    };
    result.unwrap_or_else(|e| Response::Error { reason: e.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::PatternKind;

    struct FakeHandler {
        sinks: Vec<SinkInfo>,
        last_level: Option<u8>,
        reopened: bool,
    }

    impl CommandHandler for FakeHandler {
        fn status(&mut self, _pattern: &Pattern) -> Result<Vec<SinkInfo>, CtlError> {
            Ok(self.sinks.clone())
        }
        fn set_level(&mut self, level: u8, _pattern: &Pattern) -> Result<(), CtlError> {
            self.last_level = Some(level);
            Ok(())
        }
        fn reopen(&mut self) -> Result<(), CtlError> {
            self.reopened = true;
            Ok(())
        }
    }

    #[test]
    fn status_round_trips_over_a_real_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xtrctl.sock");
        let mut dispatcher = CommandDispatcher::bind(&path).unwrap();
        let mut handler = FakeHandler {
            sinks: vec![SinkInfo::new(2, 1 << 16, 128, 0, "main").unwrap()],
            last_level: None,
            reopened: false,
        };

        let mut conn = UnixStream::connect(&path).unwrap();
        let mut buf = Vec::new();
        wire::encode_frame(&Request::Status(Pattern::any()), &mut buf).unwrap();
        conn.write_all(&buf).unwrap();

        // Drive a couple of passes: one to accept, one to read+respond.
        for _ in 0..4 {
            dispatcher.process_commands(Duration::from_millis(50), &mut handler).unwrap();
        }

        let mut response_buf = vec![0u8; 4096];
        conn.set_nonblocking(false).unwrap();
        conn.set_read_timeout(Some(Duration::from_millis(500))).unwrap();
        let n = conn.read(&mut response_buf).unwrap();
        let (response, _): (Response, usize) = wire::try_decode_frame(&response_buf[..n]).unwrap().unwrap();
        match response {
            Response::Status(sinks) => assert_eq!(sinks.len(), 1),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn set_level_and_reopen_reach_the_handler() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xtrctl.sock");
        let mut dispatcher = CommandDispatcher::bind(&path).unwrap();
        let mut handler = FakeHandler { sinks: vec![], last_level: None, reopened: false };

        let mut conn = UnixStream::connect(&path).unwrap();
        let mut buf = Vec::new();
        wire::encode_frame(
            &Request::SetLevel { level: 1, pattern: Pattern::new(PatternKind::None, false, "").unwrap() },
            &mut buf,
        )
        .unwrap();
        wire::encode_frame(&Request::Reopen, &mut buf).unwrap();
        conn.write_all(&buf).unwrap();

        for _ in 0..4 {
            dispatcher.process_commands(Duration::from_millis(50), &mut handler).unwrap();
        }

        assert_eq!(handler.last_level, Some(1));
        assert!(handler.reopened);
    }
}

// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

extern crate libc;
extern crate nix;

use std::collections::HashMap;
use std::fmt::Debug;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{SocketAddr, ToSocketAddrs};
use std::os::unix::io::AsRawFd;
use std::time::{Duration, Instant};

use log::{debug, info};
use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token};

use nix::sys::socket::setsockopt;
use nix::sys::socket::sockopt::{KeepAlive, TcpKeepCount, TcpKeepIdle, TcpKeepInterval};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::exception::{network_exception, ClientException, ClientResult};
use crate::interrupt::InterruptFlag;
use crate::messages::{Command, CommandHeader, HEADER_SIZE};

const CLIENT: Token = Token(1);
const POLL_INTERVAL: Duration = Duration::from_millis(10);
const READ_CHUNK_SIZE: usize = 1 << 16;
const CONNECT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Network {
    tcp_socket: TcpStream,
    command_id: u32,
    pending_bytes: Vec<u8>,
    received_responses: HashMap<(Command, u32), Vec<u8>>,
    closed_by_server: bool,
    interrupt: InterruptFlag,
    poll_read: Poll,
    events: Events,
}

impl Network {
    /// Connects to the bridge, retrying every `retry_interval` for as long as the bridge
    /// cannot be resolved, reached or connected to. There is no deadline.
    ///
    /// # Errors
    /// * [`Interrupted`](`crate::exception::ClientException::Interrupted`) if the interrupt flag is raised while waiting.
    /// * [`NetworkException`](`crate::exception::ClientException::NetworkException`) if the
    /// connection fails for another reason than the bridge not being up.
    pub fn new(
        bridge_address: &str,
        bridge_port: u16,
        retry_interval: Duration,
        interrupt: InterruptFlag,
    ) -> ClientResult<Network> {
        let mut tcp_socket =
            wait_for_server(bridge_address, bridge_port, retry_interval, &interrupt)?;
        tcp_socket.set_nodelay(true).map_err(network_exception)?;
        let fd = tcp_socket.as_raw_fd();

        setsockopt(fd, KeepAlive, &true).map_err(network_exception)?;
        setsockopt(fd, TcpKeepIdle, &1).map_err(network_exception)?;
        setsockopt(fd, TcpKeepCount, &3).map_err(network_exception)?;
        setsockopt(fd, TcpKeepInterval, &1).map_err(network_exception)?;

        let poll_read = Poll::new().map_err(network_exception)?;
        poll_read
            .registry()
            .register(&mut tcp_socket, CLIENT, Interest::READABLE)
            .map_err(network_exception)?;
        Ok(Network {
            tcp_socket,
            command_id: 0,
            pending_bytes: Vec::new(),
            received_responses: HashMap::new(),
            closed_by_server: false,
            interrupt,
            poll_read,
            events: Events::with_capacity(128),
        })
    }

    fn create_header(&mut self, command: Command, size: usize) -> CommandHeader {
        let header = CommandHeader::new(command, self.command_id, size as u32);
        self.command_id += 1;
        header
    }

    /// Sends `request` as the body of a new frame and returns the command ID the
    /// response will carry.
    pub fn tcp_send_request<T: Serialize + Debug>(
        &mut self,
        command: Command,
        request: &T,
    ) -> ClientResult<u32> {
        let body = serialize(request)?;
        let header = self.create_header(command, HEADER_SIZE + body.len());
        let mut frame = serialize(&header)?;
        frame.extend_from_slice(&body);
        self.tcp_write_all(&frame)?;
        debug!("sent {:?} with id {}", command, header.command_id);
        Ok(header.command_id)
    }

    /// Blocks until a Response message with the given command and command ID has been received
    /// and returns this response. There is no timeout; only the interrupt flag ends the wait early.
    ///
    /// # Arguments
    /// * `command` - Command the response answers.
    /// * `command_id` - Expected command ID of the Response.
    pub fn tcp_blocking_receive_response<T: DeserializeOwned + Debug + 'static>(
        &mut self,
        command: Command,
        command_id: u32,
    ) -> ClientResult<T> {
        let response_bytes = self.wait_for_response_to_arrive(command, command_id)?;
        deserialize(&response_bytes)
    }

    fn wait_for_response_to_arrive(
        &mut self,
        command: Command,
        command_id: u32,
    ) -> ClientResult<Vec<u8>> {
        loop {
            if let Some(bytes) = self.received_responses.remove(&(command, command_id)) {
                return Ok(bytes);
            }
            if self.closed_by_server {
                return Err(ClientException::NetworkException {
                    message: format!(
                        "height-client: connection closed while waiting for {:?} {}",
                        command, command_id
                    ),
                });
            }
            self.interrupt.check()?;
            self.tcp_read_from_buffer(POLL_INTERVAL)?;
        }
    }

    fn tcp_write_all(&mut self, frame: &[u8]) -> ClientResult<()> {
        let mut written = 0;
        while written < frame.len() {
            match self.tcp_socket.write(&frame[written..]) {
                Ok(0) => {
                    return Err(ClientException::NetworkException {
                        message: "height-client: connection closed while sending".to_string(),
                    });
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    self.interrupt.check()?;
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(network_exception(e)),
            }
        }
        Ok(())
    }

    fn tcp_read_from_buffer(&mut self, timeout: Duration) -> ClientResult<()> {
        match self.poll_read.poll(&mut self.events, Some(timeout)) {
            Ok(()) => {}
            // a signal arrived, the caller looks at the interrupt flag next
            Err(e) if e.kind() == ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(network_exception(e)),
        }
        let readable = self
            .events
            .iter()
            .any(|event| event.token() == CLIENT && event.is_readable());
        if !readable {
            return Ok(());
        }
        let mut buffer = vec![0_u8; READ_CHUNK_SIZE];
        loop {
            match self.tcp_socket.read(&mut buffer) {
                Ok(0) => {
                    self.closed_by_server = true;
                    break;
                }
                Ok(n) => self.pending_bytes.extend_from_slice(&buffer[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(network_exception(e)),
            }
        }
        self.split_frames()
    }

    /// Moves every complete frame out of the pending bytes into the received responses.
    fn split_frames(&mut self) -> ClientResult<()> {
        while self.pending_bytes.len() >= HEADER_SIZE {
            let header: CommandHeader = deserialize(&self.pending_bytes[..HEADER_SIZE])?;
            let frame_size = header.size as usize;
            if frame_size < HEADER_SIZE {
                return Err(ClientException::ProtocolException {
                    message: format!(
                        "height-client: frame size {} is smaller than its header",
                        frame_size
                    ),
                });
            }
            if self.pending_bytes.len() < frame_size {
                break;
            }
            let body = self.pending_bytes[HEADER_SIZE..frame_size].to_vec();
            self.pending_bytes.drain(..frame_size);
            self.received_responses
                .insert((header.command, header.command_id), body);
        }
        Ok(())
    }
}

/// Resolves the bridge address. `None` while the name does not resolve (yet).
fn resolve(address_str: &str) -> Option<SocketAddr> {
    match address_str.to_socket_addrs() {
        Ok(mut addresses) => addresses.next(),
        Err(e) => {
            debug!("could not resolve {}: {}", address_str, e);
            None
        }
    }
}

fn wait_for_server(
    bridge_address: &str,
    bridge_port: u16,
    retry_interval: Duration,
    interrupt: &InterruptFlag,
) -> ClientResult<TcpStream> {
    let address_str: String = format!("{}:{}", bridge_address, bridge_port);
    let mut announced = false;
    loop {
        interrupt.check()?;
        // re-resolved on every attempt, the name may show up later
        if let Some(sock_address) = resolve(&address_str) {
            if let Some(socket) = try_connect(sock_address, interrupt)? {
                return Ok(socket);
            }
        }
        if !announced {
            info!("waiting for server at {}", address_str);
            announced = true;
        }
        sleep_interruptible(retry_interval, interrupt)?;
    }
}

/// One non-blocking connection attempt, polled in `POLL_INTERVAL` steps so the interrupt
/// flag is seen even while the peer drops our SYNs.
///
/// # Return
/// * `Some` - connected socket
/// * `None` - the bridge is not up, try again later
fn try_connect(
    sock_address: SocketAddr,
    interrupt: &InterruptFlag,
) -> ClientResult<Option<TcpStream>> {
    let mut socket = match TcpStream::connect(sock_address) {
        Ok(socket) => socket,
        Err(e) if server_not_up(&e) => return Ok(None),
        Err(e) => return Err(network_exception(e)),
    };
    let mut poll = Poll::new().map_err(network_exception)?;
    poll.registry()
        .register(&mut socket, CLIENT, Interest::WRITABLE)
        .map_err(network_exception)?;
    let mut events = Events::with_capacity(4);
    let deadline = Instant::now() + CONNECT_ATTEMPT_TIMEOUT;
    loop {
        interrupt.check()?;
        match poll.poll(&mut events, Some(POLL_INTERVAL)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(network_exception(e)),
        }
        if events.iter().any(|event| event.token() == CLIENT) {
            match socket.take_error() {
                Ok(None) => {}
                Ok(Some(e)) | Err(e) if server_not_up(&e) => return Ok(None),
                Ok(Some(e)) | Err(e) => return Err(network_exception(e)),
            }
            match socket.peer_addr() {
                Ok(_) => {
                    poll.registry()
                        .deregister(&mut socket)
                        .map_err(network_exception)?;
                    return Ok(Some(socket));
                }
                // spurious wakeup, the handshake is still running
                Err(e) if e.kind() == ErrorKind::NotConnected => {}
                Err(e) if server_not_up(&e) => return Ok(None),
                Err(e) => return Err(network_exception(e)),
            }
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
    }
}

fn server_not_up(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::TimedOut
    ) || matches!(
        error.raw_os_error(),
        Some(libc::EHOSTUNREACH)
            | Some(libc::ENETUNREACH)
            | Some(libc::EHOSTDOWN)
            | Some(libc::ENETDOWN)
            | Some(libc::EADDRNOTAVAIL)
    )
}

fn sleep_interruptible(duration: Duration, interrupt: &InterruptFlag) -> ClientResult<()> {
    let mut remaining = duration;
    while !remaining.is_zero() {
        interrupt.check()?;
        let step = remaining.min(POLL_INTERVAL);
        std::thread::sleep(step);
        remaining -= step;
    }
    Ok(())
}

pub(crate) fn serialize<T: Serialize>(s: &T) -> ClientResult<Vec<u8>> {
    bincode::serialize(s).map_err(|e| ClientException::ProtocolException {
        message: e.to_string(),
    })
}

pub(crate) fn deserialize<T: DeserializeOwned>(encoded: &[u8]) -> ClientResult<T> {
    bincode::deserialize(encoded).map_err(|e| ClientException::ProtocolException {
        message: e.to_string(),
    })
}

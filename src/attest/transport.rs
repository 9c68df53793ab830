// Copyright 2023 Contributors to the Veraison project.
// SPDX-License-Identifier: Apache-2.0

use super::config::TransportConfig;
use super::errors::Error;
use crate::wire::{CommandHeader, HEADER_LEN};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

/// Largest response accepted from a device
pub const MAX_RESPONSE_LEN: usize = 32 * 1024;

/// Carries framed mailbox commands to a device and returns its framed
/// responses
pub trait Transport {
    fn send(&mut self, command: &[u8]) -> Result<Vec<u8>, Error>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(&mut self, command: &[u8]) -> Result<Vec<u8>, Error> {
        (**self).send(command)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, command: &[u8]) -> Result<Vec<u8>, Error> {
        (**self).send(command)
    }
}

/// Opens a fresh transport for each verifier operation
pub trait Connect {
    type Transport: Transport;

    fn connect(&self, config: &TransportConfig) -> Result<Self::Transport, Error>;
}

/// Blocking TCP connection to a mailbox proxy.  A response is read as one
/// header word followed by the payload it announces.
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, Error> {
        let addrs = (host, port)
            .to_socket_addrs()
            .map_err(|e| Error::Transport(format!("{host}:{port}: {e}")))?;

        let mut last = Error::Transport(format!("{host}:{port}: no address"));

        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream
                        .set_read_timeout(Some(timeout))
                        .and_then(|_| stream.set_write_timeout(Some(timeout)))
                        .map_err(|e| Error::Transport(e.to_string()))?;

                    tracing::debug!("connected to {addr}");

                    return Ok(Self { stream });
                }
                Err(e) => last = Error::Transport(format!("{addr}: {e}")),
            }
        }

        Err(last)
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, command: &[u8]) -> Result<Vec<u8>, Error> {
        self.stream
            .write_all(command)
            .map_err(|e| Error::Transport(format!("write: {e}")))?;

        let mut response = vec![0u8; HEADER_LEN];
        self.stream
            .read_exact(&mut response)
            .map_err(|e| Error::Transport(format!("read header: {e}")))?;

        let header = CommandHeader::parse_from_fw(&response)?;
        let len = header.length as usize * 4;

        if HEADER_LEN + len > MAX_RESPONSE_LEN {
            return Err(Error::Transport(format!(
                "response of {} bytes exceeds {MAX_RESPONSE_LEN}",
                HEADER_LEN + len
            )));
        }

        response.resize(HEADER_LEN + len, 0);
        self.stream
            .read_exact(&mut response[HEADER_LEN..])
            .map_err(|e| Error::Transport(format!("read payload: {e}")))?;

        Ok(response)
    }
}

/// Connects over TCP using the configured host, port and timeout
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

impl Connect for TcpConnector {
    type Transport = TcpTransport;

    fn connect(&self, config: &TransportConfig) -> Result<TcpTransport, Error> {
        TcpTransport::connect(
            &config.host,
            config.port,
            Duration::from_millis(config.timeout_ms),
        )
    }
}

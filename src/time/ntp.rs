//! Minimal SNTP client (RFC 4330) used to learn the offset of the local clock.

use chrono::{DateTime, Utc};
use std::net::{ToSocketAddrs, UdpSocket};
use std::time::Duration;

use crate::common::constants::{NTP_PORT, NTP_UNIX_OFFSET};
use crate::error::TimeSyncFailure;

const PACKET_LEN: usize = 48;

/// LI = 0, version 3, mode 3 (client).
const CLIENT_REQUEST: u8 = 0x1B;

const MODE_SERVER: u8 = 4;

/// One round trip to a network time authority.
#[cfg_attr(test, mockall::automock)]
pub trait NtpQuery: Send {
    fn query(&mut self) -> Result<DateTime<Utc>, TimeSyncFailure>;

    /// Name of the authority for log lines.
    fn server(&self) -> String;
}

/// SNTP over UDP with a bounded socket timeout.
#[derive(Debug, Clone)]
pub struct SntpClient {
    server: String,
    port: u16,
    timeout: Duration,
}

impl SntpClient {
    pub fn new(server: impl Into<String>, timeout: Duration) -> Self {
        Self {
            server: server.into(),
            port: NTP_PORT,
            timeout,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

impl NtpQuery for SntpClient {
    fn query(&mut self) -> Result<DateTime<Utc>, TimeSyncFailure> {
        let addr = (self.server.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| TimeSyncFailure::Resolve {
                server: self.server.clone(),
                message: e.to_string(),
            })?
            .next()
            .ok_or_else(|| TimeSyncFailure::Resolve {
                server: self.server.clone(),
                message: "no addresses".to_owned(),
            })?;

        let bind_addr = if addr.is_ipv6() { "[::]:0" } else { "0.0.0.0:0" };
        let socket = UdpSocket::bind(bind_addr).map_err(|e| TimeSyncFailure::Io(e.to_string()))?;
        socket
            .set_read_timeout(Some(self.timeout))
            .and_then(|_| socket.set_write_timeout(Some(self.timeout)))
            .map_err(|e| TimeSyncFailure::Io(e.to_string()))?;

        let mut request = [0u8; PACKET_LEN];
        request[0] = CLIENT_REQUEST;
        socket
            .send_to(&request, addr)
            .map_err(|e| TimeSyncFailure::Io(e.to_string()))?;

        let mut reply = [0u8; PACKET_LEN];
        let len = match socket.recv_from(&mut reply) {
            Ok((len, _)) => len,
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                return Err(TimeSyncFailure::Timeout {
                    server: self.server.clone(),
                    timeout_ms: self.timeout_ms(),
                });
            }
            Err(e) => return Err(TimeSyncFailure::Io(e.to_string())),
        };

        parse_reply(&reply[..len])
    }

    fn server(&self) -> String {
        self.server.clone()
    }
}

/// Extract the server transmit timestamp from an SNTP reply.
pub fn parse_reply(packet: &[u8]) -> Result<DateTime<Utc>, TimeSyncFailure> {
    if packet.len() < PACKET_LEN {
        return Err(TimeSyncFailure::InvalidReply(format!(
            "{} bytes, expected {PACKET_LEN}",
            packet.len()
        )));
    }

    let mode = packet[0] & 0x07;
    if mode != MODE_SERVER {
        return Err(TimeSyncFailure::InvalidReply(format!(
            "mode {mode}, expected {MODE_SERVER}"
        )));
    }
    if packet[1] == 0 {
        return Err(TimeSyncFailure::InvalidReply(
            "stratum 0 (kiss-of-death)".to_owned(),
        ));
    }

    let seconds = u32::from_be_bytes([packet[40], packet[41], packet[42], packet[43]]);
    let fraction = u32::from_be_bytes([packet[44], packet[45], packet[46], packet[47]]);
    if seconds == 0 && fraction == 0 {
        return Err(TimeSyncFailure::InvalidReply(
            "zero transmit timestamp".to_owned(),
        ));
    }

    from_ntp_timestamp(seconds, fraction)
        .ok_or_else(|| TimeSyncFailure::InvalidReply("timestamp out of range".to_owned()))
}

/// Convert a 32.32 fixed-point NTP timestamp into UTC.
///
/// Seconds below the Unix offset belong to NTP era 1 (after February 2036).
pub fn from_ntp_timestamp(seconds: u32, fraction: u32) -> Option<DateTime<Utc>> {
    let seconds = u64::from(seconds);
    let unix = if seconds >= NTP_UNIX_OFFSET {
        seconds - NTP_UNIX_OFFSET
    } else {
        seconds + (1u64 << 32) - NTP_UNIX_OFFSET
    };
    let nanos = ((u64::from(fraction) * 1_000_000_000) >> 32) as u32;
    DateTime::from_timestamp(unix as i64, nanos)
}

//! Editor control channel
//!
//! Each editor instance listens on a msgpack-RPC socket (a Unix socket path or
//! a TCP `host:port`). The relay issues one `nvim_exec_lua` request per routed
//! event and blocks until the matching response arrives, skipping any
//! notifications the editor interleaves.
//!
//! The [`Connector`] / [`ControlChannel`] pair is the seam the router talks
//! through, so routing can be exercised without a live editor.

use serde::de::IgnoredAny;
use serde_json::Value;
use std::fmt::Display;
use std::io::{self, BufReader, BufWriter, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::os::unix::net::UnixStream;
use std::time::Duration;
use tracing::trace;

use super::error::{ChannelError, ChannelResult};

/// Lua evaluated in the editor for every forwarded payload.
pub const LISTENER_LUA: &str = r#"return require("nvim-claude.agent_provider.providers.codex.otel_listener").process_payload(...)"#;

const EXEC_LUA_METHOD: &str = "nvim_exec_lua";

const MSG_REQUEST: u64 = 0;
const MSG_RESPONSE: u64 = 1;

/// An established channel to one editor.
pub trait ControlChannel: Send {
    /// Deliver one payload, returning once the editor has acknowledged it.
    fn deliver(&mut self, payload: &Value) -> ChannelResult<()>;
}

/// Opens control channels from rendezvous addresses.
pub trait Connector: Send + Sync {
    /// Connect to `address` as read from a rendezvous file.
    fn connect(&self, address: &str) -> ChannelResult<Box<dyn ControlChannel>>;
}

/// Connector for real editor instances.
#[derive(Debug, Clone)]
pub struct NvimConnector {
    timeout: Duration,
}

impl NvimConnector {
    /// Connector whose channels use `timeout` for connect, read and write.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Connector for NvimConnector {
    fn connect(&self, address: &str) -> ChannelResult<Box<dyn ControlChannel>> {
        Ok(Box::new(NvimChannel::connect(address, self.timeout)?))
    }
}

enum Transport {
    Unix {
        reader: BufReader<UnixStream>,
        writer: BufWriter<UnixStream>,
    },
    Tcp {
        reader: BufReader<TcpStream>,
        writer: BufWriter<TcpStream>,
    },
}

/// Synchronous msgpack-RPC client for one editor.
pub struct NvimChannel {
    transport: Transport,
    next_msgid: u32,
}

impl NvimChannel {
    /// Connect to a Unix socket path or a TCP `host:port`.
    pub fn connect(address: &str, timeout: Duration) -> ChannelResult<Self> {
        let connect_err = |source| ChannelError::Connect {
            address: address.to_string(),
            source,
        };
        let transport = if is_tcp_address(address) {
            let stream = connect_tcp(address, timeout).map_err(connect_err)?;
            stream.set_nodelay(true).ok();
            stream.set_read_timeout(Some(timeout))?;
            stream.set_write_timeout(Some(timeout))?;
            Transport::Tcp {
                reader: BufReader::new(stream.try_clone()?),
                writer: BufWriter::new(stream),
            }
        } else {
            let stream = UnixStream::connect(address).map_err(connect_err)?;
            stream.set_read_timeout(Some(timeout))?;
            stream.set_write_timeout(Some(timeout))?;
            Transport::Unix {
                reader: BufReader::new(stream.try_clone()?),
                writer: BufWriter::new(stream),
            }
        };

        Ok(Self {
            transport,
            next_msgid: 1,
        })
    }

    /// Evaluate Lua in the editor with `args` and wait for the answer.
    pub fn exec_lua(&mut self, code: &str, args: &[&Value]) -> ChannelResult<()> {
        let msgid = self.next_msgid;
        self.next_msgid = self.next_msgid.wrapping_add(1);

        let request = (MSG_REQUEST, msgid, EXEC_LUA_METHOD, (code, args));
        self.transport.send(&request)?;
        self.transport.await_response(msgid)
    }
}

impl ControlChannel for NvimChannel {
    fn deliver(&mut self, payload: &Value) -> ChannelResult<()> {
        self.exec_lua(LISTENER_LUA, &[payload])
    }
}

impl Transport {
    fn send<T: serde::Serialize>(&mut self, message: &T) -> ChannelResult<()> {
        match self {
            Transport::Unix { writer, .. } => {
                rmp_serde::encode::write(writer, message)?;
                writer.flush()?;
            }
            Transport::Tcp { writer, .. } => {
                rmp_serde::encode::write(writer, message)?;
                writer.flush()?;
            }
        }
        Ok(())
    }

    fn await_response(&mut self, msgid: u32) -> ChannelResult<()> {
        match self {
            Transport::Unix { reader, .. } => read_response(reader, msgid),
            Transport::Tcp { reader, .. } => read_response(reader, msgid),
        }
    }
}

/// Read messages until the response to `msgid` arrives.
fn read_response<R: io::Read>(reader: &mut R, msgid: u32) -> ChannelResult<()> {
    loop {
        let len = rmp::decode::read_array_len(reader).map_err(malformed)?;
        if len == 0 {
            return Err(ChannelError::MalformedResponse("empty message".into()));
        }
        let kind: u64 = rmp::decode::read_int(reader).map_err(malformed)?;

        if kind != MSG_RESPONSE || len != 4 {
            trace!(kind, len, "skipping non-response message");
            for _ in 1..len {
                skip_value(reader)?;
            }
            continue;
        }

        let id: u32 = rmp::decode::read_int(reader).map_err(malformed)?;
        let error: Value = rmp_serde::decode::from_read(&mut *reader).map_err(malformed)?;
        skip_value(reader)?;

        if id != msgid {
            trace!(id, expected = msgid, "skipping stale response");
            continue;
        }
        if error.is_null() {
            return Ok(());
        }
        return Err(ChannelError::Rpc(rpc_error_message(&error)));
    }
}

fn skip_value<R: io::Read>(reader: &mut R) -> ChannelResult<()> {
    rmp_serde::decode::from_read::<_, IgnoredAny>(&mut *reader).map_err(malformed)?;
    Ok(())
}

/// Editors report errors as `[code, message]`.
fn rpc_error_message(error: &Value) -> String {
    error
        .get(1)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| error.to_string())
}

fn malformed(err: impl Display) -> ChannelError {
    ChannelError::MalformedResponse(err.to_string())
}

/// `host:port` addresses go over TCP; anything else is a socket path.
fn is_tcp_address(address: &str) -> bool {
    !address.contains('/')
        && address
            .rsplit_once(':')
            .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok())
}

fn connect_tcp(address: &str, timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for candidate in address.to_socket_addrs()? {
        match TcpStream::connect_timeout(&candidate, timeout) {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address resolved")))
}

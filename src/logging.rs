// ============================================================================
// File: packages/adles/src/logging.rs
// ----------------------------------------------------------------------------
// Logger setup for the command line: env_logger on stderr, optionally teed
// to a remote syslog server over UDP.
// ============================================================================

use std::io::{self, Write};
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use env_logger::{Builder, Target, WriteStyle};
use log::LevelFilter;

use crate::error::{AdlesError, AdlesResult};

/// Default syslog port
pub const SYSLOG_PORT: u16 = 514;

/// Syslog priority of forwarded lines (facility user, severity info)
const SYSLOG_PRIORITY: u8 = 14;

/// Logging options taken from the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Log at debug instead of info
    pub verbose: bool,

    /// Disable ANSI styles
    pub no_color: bool,

    /// Syslog server, `host[:port]`
    pub syslog: Option<String>,
}

impl LogOptions {
    pub fn level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }

    /// Styles are off with `--no-color` or a non-empty `NO_COLOR`
    pub fn write_style(&self) -> WriteStyle {
        let no_color_env = std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty());
        if self.no_color || no_color_env {
            WriteStyle::Never
        } else {
            WriteStyle::Auto
        }
    }
}

/// Install the global logger
///
/// `RUST_LOG` is applied on top of the level chosen by `verbose`.
///
/// # Arguments
/// * `options` - Verbosity, color and syslog settings
///
/// # Returns
/// Error when the syslog server cannot be resolved or a logger is already
/// installed
pub fn init(options: &LogOptions) -> AdlesResult<()> {
    let mut builder = Builder::new();
    builder
        .filter_level(options.level())
        .parse_default_env()
        .format_timestamp_secs();

    if let Some(server) = &options.syslog {
        let tee = SyslogTee::connect(server, io::stderr())?;
        builder.target(Target::Pipe(Box::new(tee)));
        builder.write_style(WriteStyle::Never);
    } else {
        builder.write_style(options.write_style());
    }

    builder
        .try_init()
        .map_err(|e| AdlesError::internal(format!("logger already initialised: {e}")))?;
    if let Some(server) = &options.syslog {
        log::debug!("forwarding log lines to syslog at {server}");
    }
    Ok(())
}

/// Resolve `host[:port]`, defaulting the port to 514
pub fn syslog_address(server: &str) -> AdlesResult<SocketAddr> {
    let with_port = if server.rsplit_once(':').is_some_and(|(_, p)| p.parse::<u16>().is_ok()) {
        server.to_string()
    } else {
        format!("{server}:{SYSLOG_PORT}")
    };
    with_port
        .to_socket_addrs()
        .map_err(|e| AdlesError::config(format!("syslog server '{server}': {e}")))?
        .next()
        .ok_or_else(|| AdlesError::config(format!("syslog server '{server}' did not resolve")))
}

/// Writes log output to `inner` and forwards each complete line to syslog
#[derive(Debug)]
pub struct SyslogTee<W: Write> {
    inner: W,
    socket: UdpSocket,
    line: Vec<u8>,
}

impl<W: Write> SyslogTee<W> {
    pub fn connect(server: &str, inner: W) -> AdlesResult<Self> {
        let address = syslog_address(server)?;
        let local = if address.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local)
            .map_err(|e| AdlesError::config(format!("syslog socket: {e}")))?;
        socket
            .connect(address)
            .map_err(|e| AdlesError::config(format!("syslog server {address}: {e}")))?;
        Ok(Self {
            inner,
            socket,
            line: Vec::new(),
        })
    }

    fn forward(&self, line: &[u8]) {
        let line = String::from_utf8_lossy(line);
        let datagram = format!("<{SYSLOG_PRIORITY}>adles: {}", line.trim_end());
        // send errors are ignored
        let _ = self.socket.send(datagram.as_bytes());
    }
}

impl<W: Write> Write for SyslogTee<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        for byte in &buf[..written] {
            if *byte == b'\n' {
                let line = std::mem::take(&mut self.line);
                self.forward(&line);
            } else {
                self.line.push(*byte);
            }
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

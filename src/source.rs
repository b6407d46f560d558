use std::io::{ErrorKind, Read};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::settings::AppSettings;
use crate::simulate::SimulatedSource;

/// Errors raised by a byte source. Any of these ends acquisition.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },
    #[error("Byte source I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No serial port configured")]
    NoPortConfigured,
}

/// Provider of raw bytes for the frame decoder.
///
/// `read_available` fills as much of `buf` as arrives before the source's
/// own timeout and returns the count. `Ok(0)` means nothing is ready yet,
/// not end of stream.
pub trait ByteSource: Send {
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, SourceError>;

    fn describe(&self) -> String;
}

/// Adapts any `io::Read` (capture files, sockets, cursors).
pub struct ReaderSource<R> {
    reader: R,
    label: String,
}

impl<R: Read + Send> ReaderSource<R> {
    pub fn new(reader: R, label: impl Into<String>) -> Self {
        Self {
            reader,
            label: label.into(),
        }
    }
}

impl<R: Read + Send> ByteSource for ReaderSource<R> {
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        loop {
            match self.reader.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(0);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}

pub struct SerialSource {
    port: Box<dyn serialport::SerialPort>,
    name: String,
    baud_rate: u32,
}

impl SerialSource {
    pub fn open(name: &str, baud_rate: u32, timeout: Duration) -> Result<Self, SourceError> {
        let port = serialport::new(name, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|source| SourceError::Open {
                port: name.to_string(),
                source,
            })?;
        Ok(Self {
            port,
            name: name.to_string(),
            baud_rate,
        })
    }
}

impl ByteSource for SerialSource {
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, SourceError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.port.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.name, self.baud_rate)
    }
}

pub fn list_port_names() -> Vec<String> {
    match serialport::available_ports() {
        Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
        Err(err) => {
            log::warn!("Could not enumerate serial ports: {err}");
            Vec::new()
        }
    }
}

/// Where acquisition reads its bytes from.
#[derive(Clone, Debug, PartialEq)]
pub enum SourceChoice {
    Serial,
    Replay(PathBuf),
    Simulated,
}

pub fn open_source(
    choice: &SourceChoice,
    settings: &AppSettings,
) -> Result<Box<dyn ByteSource>, SourceError> {
    match choice {
        SourceChoice::Serial => {
            let port = settings
                .port
                .as_deref()
                .ok_or(SourceError::NoPortConfigured)?;
            let source = SerialSource::open(port, settings.baud_rate, settings.read_timeout())?;
            Ok(Box::new(source))
        }
        SourceChoice::Replay(path) => {
            let file = std::fs::File::open(path)?;
            Ok(Box::new(ReaderSource::new(
                file,
                format!("replay {}", path.display()),
            )))
        }
        SourceChoice::Simulated => Ok(Box::new(SimulatedSource::new(
            settings.frame_format(),
            settings.read_timeout(),
        ))),
    }
}

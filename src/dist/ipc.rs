//! Buffered IPC primitives for worker communication.
//!
//! Provides line-based I/O over pipes with EINTR handling. The reader is
//! split into a single-syscall `fill` and a non-blocking `next_line` so the
//! multiplexer can drain exactly what a readiness wait reported.

use std::io::{self, BufWriter, Read, Write};
use std::os::unix::io::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

/// Default buffer size for IPC (64KB).
const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// A file descriptor wrapper that implements Read/Write with EINTR handling.
#[derive(Debug)]
pub struct PipeFd {
    fd: OwnedFd,
}

impl PipeFd {
    /// Create from an owned file descriptor.
    pub fn new(fd: OwnedFd) -> Self {
        Self { fd }
    }

    /// Create from a raw file descriptor (takes ownership).
    ///
    /// # Safety
    /// The caller must ensure `fd` is a valid file descriptor that can be owned.
    pub unsafe fn from_raw(fd: RawFd) -> Self {
        Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        }
    }
}

impl AsFd for PipeFd {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl AsRawFd for PipeFd {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl Read for PipeFd {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match nix::unistd::read(&self.fd, buf) {
                Ok(n) => return Ok(n),
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(io::Error::from_raw_os_error(e as i32)),
            }
        }
    }
}

impl Write for PipeFd {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        loop {
            match nix::unistd::write(&self.fd, buf) {
                Ok(n) => return Ok(n),
                Err(nix::errno::Errno::EINTR) => continue,
                Err(e) => return Err(io::Error::from_raw_os_error(e as i32)),
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(()) // Pipes don't need flushing at the fd level
    }
}

/// Buffered line reader for IPC.
///
/// Bytes are pulled in with [`fill`](Self::fill) (one `read` syscall) and
/// handed out line by line with [`next_line`](Self::next_line), which never
/// touches the file descriptor. A trailing partial line stays buffered until
/// the rest of it arrives.
#[derive(Debug)]
pub struct LineReader {
    fd: PipeFd,
    buffer: Vec<u8>,
    /// Start of the unconsumed region of `buffer`.
    cursor: usize,
    eof: bool,
}

impl LineReader {
    /// Create a new line reader from a file descriptor.
    pub fn new(fd: PipeFd) -> Self {
        Self {
            fd,
            buffer: Vec::with_capacity(DEFAULT_BUFFER_SIZE),
            cursor: 0,
            eof: false,
        }
    }

    /// Perform a single read from the pipe into the internal buffer.
    ///
    /// Returns the number of bytes read; `0` means the writer closed its end.
    /// Blocks only if the pipe is empty and still open.
    pub fn fill(&mut self) -> io::Result<usize> {
        if self.eof {
            return Ok(0);
        }
        // Compact consumed bytes before growing
        if self.cursor > 0 {
            self.buffer.drain(..self.cursor);
            self.cursor = 0;
        }
        let start = self.buffer.len();
        self.buffer.resize(start + DEFAULT_BUFFER_SIZE, 0);
        let result = self.fd.read(&mut self.buffer[start..]);
        let n = *result.as_ref().unwrap_or(&0);
        self.buffer.truncate(start + n);
        let n = result?;
        if n == 0 {
            self.eof = true;
        }
        Ok(n)
    }

    /// Pop the next complete line from the buffer without reading.
    ///
    /// The trailing `\n` (and `\r`) is stripped. Invalid UTF-8 is replaced
    /// rather than rejected so one garbled line cannot wedge the channel.
    pub fn next_line(&mut self) -> Option<String> {
        let pending = &self.buffer[self.cursor..];
        let newline = pending.iter().position(|&b| b == b'\n')?;
        let mut line = &pending[..newline];
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }
        let line = String::from_utf8_lossy(line).into_owned();
        self.cursor += newline + 1;
        Some(line)
    }

    /// Read a line, blocking until one is complete.
    ///
    /// Returns `None` on EOF. An unterminated final line is returned as-is.
    #[cfg(test)]
    pub fn read_line(&mut self) -> io::Result<Option<String>> {
        loop {
            if let Some(line) = self.next_line() {
                return Ok(Some(line));
            }
            if self.fill()? == 0 {
                return Ok(self.take_remainder());
            }
        }
    }

    /// Whether the writer side has been observed closed.
    #[cfg(test)]
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Number of buffered bytes not yet returned as lines.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    /// Take any unterminated bytes left after EOF.
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.pending_bytes() == 0 {
            return None;
        }
        let rest = String::from_utf8_lossy(&self.buffer[self.cursor..]).into_owned();
        self.cursor = self.buffer.len();
        Some(rest)
    }
}

impl AsFd for LineReader {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

/// Buffered line writer for IPC.
pub struct LineWriter {
    writer: BufWriter<PipeFd>,
}

impl LineWriter {
    /// Create a new line writer from a file descriptor.
    pub fn new(fd: PipeFd) -> Self {
        Self {
            writer: BufWriter::with_capacity(DEFAULT_BUFFER_SIZE, fd),
        }
    }

    /// Write a line (appends newline if not present) and flush.
    pub fn write_line(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes())?;
        if !line.ends_with('\n') {
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()
    }

    /// Write raw bytes and flush.
    #[cfg(test)]
    pub fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.writer.write_all(data)?;
        self.writer.flush()
    }
}

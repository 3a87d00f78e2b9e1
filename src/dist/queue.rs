//! Shared work queue between the distributor and every worker.
//!
//! The queue is a single OS pipe. The distributor is the only writer; every
//! worker holds a duplicate of the read end as its stdin. Items travel in
//! fixed-size frames of [`FRAME_SIZE`] bytes:
//!
//! ```text
//! ┌─────┬──────────┬──────────────┬─────────────┐
//! │ tag │ len (BE) │ payload      │ zero pad    │
//! │ 1 B │ 2 B      │ len bytes    │ to 512 B    │
//! └─────┴──────────┴──────────────┴─────────────┘
//! ```
//!
//! 512 bytes is `_POSIX_PIPE_BUF`, the smallest atomic pipe write POSIX
//! allows, so frames are never interleaved and a 512-byte `read` by any
//! worker dequeues exactly one whole frame. That is the single-item
//! dequeue guarantee the shared channel needs with many readers.
//!
//! Closing the write end does not discard buffered frames: readers drain
//! everything already queued and only then see EOF.

use super::ipc::PipeFd;
use crate::error::{ParunError, Result};
use std::io::{self, Read, Write};
use std::os::unix::io::{AsFd, OwnedFd};
use std::process::Stdio;

/// Size of one frame on the work queue.
pub const FRAME_SIZE: usize = 512;

/// Tag byte plus big-endian `u16` length.
const HEADER_SIZE: usize = 3;

/// Longest work item id (in bytes) that fits in a frame.
pub const MAX_ITEM_LEN: usize = FRAME_SIZE - HEADER_SIZE;

const TAG_ITEM: u8 = b'I';
const TAG_SENTINEL: u8 = b'S';

/// One entry on the work queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkFrame {
    /// A work item id to execute.
    Item(String),
    /// End of work for whichever worker reads it.
    Sentinel,
}

impl WorkFrame {
    /// Encode into a fixed-size frame.
    pub fn encode(&self) -> Result<[u8; FRAME_SIZE]> {
        let mut frame = [0u8; FRAME_SIZE];
        match self {
            Self::Item(id) => {
                check_item(id)?;
                let bytes = id.as_bytes();
                frame[0] = TAG_ITEM;
                frame[1..HEADER_SIZE].copy_from_slice(&(bytes.len() as u16).to_be_bytes());
                frame[HEADER_SIZE..HEADER_SIZE + bytes.len()].copy_from_slice(bytes);
            }
            Self::Sentinel => frame[0] = TAG_SENTINEL,
        }
        Ok(frame)
    }

    /// Decode a frame read from the queue.
    pub fn decode(frame: &[u8; FRAME_SIZE]) -> Result<Self> {
        match frame[0] {
            TAG_SENTINEL => Ok(Self::Sentinel),
            TAG_ITEM => {
                let len = u16::from_be_bytes([frame[1], frame[2]]) as usize;
                if len > MAX_ITEM_LEN {
                    return Err(ParunError::Worker(format!(
                        "Corrupt work frame: length {} exceeds {}",
                        len, MAX_ITEM_LEN
                    )));
                }
                let payload = &frame[HEADER_SIZE..HEADER_SIZE + len];
                let id = std::str::from_utf8(payload).map_err(|e| {
                    ParunError::Worker(format!("Corrupt work frame: item is not UTF-8: {}", e))
                })?;
                Ok(Self::Item(id.to_string()))
            }
            other => Err(ParunError::Worker(format!(
                "Corrupt work frame: unknown tag 0x{:02x}",
                other
            ))),
        }
    }
}

/// Check that a work item id fits in one frame.
pub fn check_item(id: &str) -> Result<()> {
    if id.len() > MAX_ITEM_LEN {
        return Err(ParunError::ItemTooLong {
            len: id.len(),
            max: MAX_ITEM_LEN,
        });
    }
    Ok(())
}

/// Create a new work queue.
///
/// Both ends are close-on-exec; workers receive the read end explicitly as
/// their stdin via [`QueueReader::to_stdio`].
pub fn work_queue() -> Result<(QueueWriter, QueueReader)> {
    let (reader, writer) = std::io::pipe()?;
    Ok((
        QueueWriter {
            fd: PipeFd::new(OwnedFd::from(writer)),
            frames_written: 0,
        },
        QueueReader {
            fd: PipeFd::new(OwnedFd::from(reader)),
        },
    ))
}

/// Write side of the work queue. Dropping it closes the channel.
pub struct QueueWriter {
    fd: PipeFd,
    frames_written: usize,
}

impl QueueWriter {
    /// Push one frame, blocking while the pipe is full.
    pub fn push(&mut self, frame: &WorkFrame) -> Result<()> {
        let bytes = frame.encode()?;
        self.fd.write_all(&bytes).map_err(|e| match e.kind() {
            io::ErrorKind::BrokenPipe => {
                ParunError::Distribution("work queue has no readers left".into())
            }
            _ => ParunError::Distribution(e.to_string()),
        })?;
        self.frames_written += 1;
        Ok(())
    }

    /// Close the write side, returning the number of frames pushed.
    pub fn close(self) -> usize {
        self.frames_written
    }
}

/// Read side of the work queue.
pub struct QueueReader {
    fd: PipeFd,
}

impl QueueReader {
    /// Wrap this process's stdin, which a worker inherits as the queue.
    pub fn stdin() -> Self {
        // Safety: file descriptor 0 is always open in a spawned worker
        Self {
            fd: unsafe { PipeFd::from_raw(0) },
        }
    }

    /// Duplicate the read end.
    #[cfg(test)]
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            fd: PipeFd::new(self.fd.as_fd().try_clone_to_owned()?),
        })
    }

    /// Duplicate the read end for use as a child's stdin.
    pub fn to_stdio(&self) -> Result<Stdio> {
        Ok(Stdio::from(self.fd.as_fd().try_clone_to_owned()?))
    }

    /// Dequeue one frame. Returns `None` once the queue is closed and empty.
    pub fn recv(&mut self) -> Result<Option<WorkFrame>> {
        let mut frame = [0u8; FRAME_SIZE];
        let mut filled = 0;
        while filled < FRAME_SIZE {
            let n = self.fd.read(&mut frame[filled..])?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(ParunError::Worker(format!(
                    "Work queue closed mid-frame after {} of {} bytes",
                    filled, FRAME_SIZE
                )));
            }
            filled += n;
        }
        WorkFrame::decode(&frame).map(Some)
    }
}

//! Readiness multiplexing over worker result channels.
//!
//! One blocking `poll(2)` over every live channel, then each ready channel
//! is drained of whatever the kernel already holds for it. Lines from one
//! channel keep their arrival order; no order is implied across channels.

use super::ipc::LineReader;
use crate::error::Result;
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use std::os::unix::io::AsFd;
use tracing::{trace, warn};

/// Upper bound on reads per channel per batch, so one chatty worker cannot
/// hold up the rest.
const MAX_FILLS_PER_BATCH: usize = 16;

/// Something that happened on a result channel.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// One complete message line.
    Line(String),
    /// The writer side closed; nothing more will arrive.
    Closed,
}

fn ready_flags() -> PollFlags {
    PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL
}

/// `poll` that retries on EINTR.
fn poll_retry(fds: &mut [PollFd<'_>], timeout: PollTimeout) -> Result<usize> {
    loop {
        match poll(fds, timeout) {
            Ok(n) => return Ok(n.max(0) as usize),
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Whether `channel` can be read without blocking.
fn still_readable(channel: &LineReader) -> Result<bool> {
    let mut fds = [PollFd::new(channel.as_fd(), PollFlags::POLLIN)];
    poll_retry(&mut fds, PollTimeout::ZERO)?;
    Ok(fds[0].revents().is_some_and(|r| r.intersects(ready_flags())))
}

/// Block until at least one channel is ready, then return every event the
/// ready channels produced.
///
/// Events are grouped per channel in arrival order. A `Closed` event is
/// always the last one for its channel. An empty input returns an empty
/// batch immediately.
pub fn next_batch(mut channels: Vec<(usize, &mut LineReader)>) -> Result<Vec<(usize, Event)>> {
    if channels.is_empty() {
        return Ok(Vec::new());
    }

    let ready: Vec<bool> = {
        let mut fds: Vec<PollFd<'_>> = channels
            .iter()
            .map(|(_, channel)| PollFd::new(channel.as_fd(), PollFlags::POLLIN))
            .collect();
        poll_retry(&mut fds, PollTimeout::NONE)?;
        fds.iter()
            .map(|fd| fd.revents().is_some_and(|r| r.intersects(ready_flags())))
            .collect()
    };

    let mut events = Vec::new();
    for ((slot, channel), ready) in channels.iter_mut().zip(ready) {
        if ready {
            drain(*slot, channel, &mut events)?;
        }
    }
    trace!(events = events.len(), "Multiplexer batch");
    Ok(events)
}

/// Read what is available on one ready channel and append its events.
fn drain(slot: usize, channel: &mut LineReader, events: &mut Vec<(usize, Event)>) -> Result<()> {
    let mut closed = false;
    for _ in 0..MAX_FILLS_PER_BATCH {
        match channel.fill() {
            Ok(0) => {
                closed = true;
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(worker_id = slot, error = %e, "Result channel read failed");
                closed = true;
                break;
            }
        }
        while let Some(line) = channel.next_line() {
            events.push((slot, Event::Line(line)));
        }
        if !still_readable(channel)? {
            break;
        }
    }

    if closed {
        while let Some(line) = channel.next_line() {
            events.push((slot, Event::Line(line)));
        }
        if let Some(rest) = channel.take_remainder() {
            events.push((slot, Event::Line(rest)));
        }
        events.push((slot, Event::Closed));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dist::ipc::LineWriter;
    use crate::dist::ipc::tests::create_pipe;
    use std::thread;
    use std::time::Duration;

    fn lines_for(events: &[(usize, Event)], slot: usize) -> Vec<Event> {
        events
            .iter()
            .filter(|(s, _)| *s == slot)
            .map(|(_, e)| e.clone())
            .collect()
    }

    #[test]
    fn test_empty_input_returns_immediately() {
        assert!(next_batch(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_only_ready_channels_are_drained() {
        let (r0, _w0) = create_pipe();
        let (r1, w1) = create_pipe();
        let mut c0 = LineReader::new(r0);
        let mut c1 = LineReader::new(r1);
        let mut writer = LineWriter::new(w1);
        writer.write_line("first").unwrap();
        writer.write_line("second").unwrap();

        let events = next_batch(vec![(0, &mut c0), (1, &mut c1)]).unwrap();
        assert_eq!(
            events,
            vec![
                (1, Event::Line("first".into())),
                (1, Event::Line("second".into())),
            ]
        );
    }

    #[test]
    fn test_close_yields_remaining_lines_then_closed() {
        let (r, w) = create_pipe();
        let mut channel = LineReader::new(r);
        let mut writer = LineWriter::new(w);
        writer.write_line("last words").unwrap();
        writer.write_all(b"unterminated").unwrap();
        drop(writer);

        let mut seen = Vec::new();
        while !seen.contains(&Event::Closed) {
            let batch = next_batch(vec![(3, &mut channel)]).unwrap();
            seen.extend(lines_for(&batch, 3));
        }
        assert_eq!(
            seen,
            vec![
                Event::Line("last words".into()),
                Event::Line("unterminated".into()),
                Event::Closed,
            ]
        );
    }

    #[test]
    fn test_blocks_until_a_writer_speaks() {
        let (r, w) = create_pipe();
        let mut channel = LineReader::new(r);
        let speaker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            let mut writer = LineWriter::new(w);
            writer.write_line("late").unwrap();
            // Hand the write end back so the channel stays open
            writer
        });

        let events = next_batch(vec![(0, &mut channel)]).unwrap();
        let writer = speaker.join().unwrap();
        assert_eq!(events, vec![(0, Event::Line("late".into()))]);
        drop(writer);
    }

    #[test]
    fn test_per_channel_order_preserved_across_batches() {
        let (r0, w0) = create_pipe();
        let (r1, w1) = create_pipe();
        let mut c0 = LineReader::new(r0);
        let mut c1 = LineReader::new(r1);
        let mut a = LineWriter::new(w0);
        let mut b = LineWriter::new(w1);
        for i in 0..50 {
            a.write_line(&format!("a{i}")).unwrap();
            b.write_line(&format!("b{i}")).unwrap();
        }
        drop(a);
        drop(b);

        let mut from_a = Vec::new();
        let mut from_b = Vec::new();
        let mut closed = 0;
        while closed < 2 {
            let mut channels: Vec<(usize, &mut LineReader)> = Vec::new();
            if !c0.is_eof() {
                channels.push((0, &mut c0));
            }
            if !c1.is_eof() {
                channels.push((1, &mut c1));
            }
            for (slot, event) in next_batch(channels).unwrap() {
                match event {
                    Event::Line(l) if slot == 0 => from_a.push(l),
                    Event::Line(l) => from_b.push(l),
                    Event::Closed => closed += 1,
                }
            }
        }
        let expected_a: Vec<String> = (0..50).map(|i| format!("a{i}")).collect();
        let expected_b: Vec<String> = (0..50).map(|i| format!("b{i}")).collect();
        assert_eq!(from_a, expected_a);
        assert_eq!(from_b, expected_b);
    }
}

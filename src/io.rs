//! Byte-level input and output for running programs.
//!
//! Output is any `std::io::Write`. Input goes through [`ByteSource`],
//! which additionally says whether the stream supports looking ahead
//! without consuming. Sources that do are polled: if nothing is ready
//! yet we sleep for [`POLL_INTERVAL`] and look again, rather than
//! blocking in a read. Sources that don't are read directly and left to
//! block on their own.

use crate::diagnostics::Position;
use crate::error::RunError;
use std::io::{self, BufRead, Cursor, Write};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::thread;
use std::time::Duration;
use tracing::trace;

/// How long to wait before looking at a pollable source again.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What a look-ahead at the input found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// A byte can be read without waiting.
    Ready,
    /// Nothing yet, but more may arrive.
    Pending,
    /// The stream has ended.
    Closed,
}

pub trait ByteSource {
    /// Whether `available` can be used to look ahead without consuming.
    fn can_seek(&self) -> bool;

    /// Look at the stream without consuming anything.
    fn available(&mut self) -> io::Result<Availability>;

    /// Consume one byte, or `None` at end of stream.
    fn next_byte(&mut self) -> io::Result<Option<u8>>;
}

impl<'a, S: ByteSource + ?Sized> ByteSource for &'a mut S {
    fn can_seek(&self) -> bool {
        (**self).can_seek()
    }

    fn available(&mut self) -> io::Result<Availability> {
        (**self).available()
    }

    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        (**self).next_byte()
    }
}

/// In-memory input. Always knows whether another byte exists.
impl<T: AsRef<[u8]>> ByteSource for Cursor<T> {
    fn can_seek(&self) -> bool {
        true
    }

    fn available(&mut self) -> io::Result<Availability> {
        let len = self.get_ref().as_ref().len() as u64;
        if self.position() < len {
            Ok(Availability::Ready)
        } else {
            Ok(Availability::Closed)
        }
    }

    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        let position = self.position();
        let byte = self.get_ref().as_ref().get(position as usize).copied();
        if byte.is_some() {
            self.set_position(position + 1);
        }
        Ok(byte)
    }
}

/// A raw stream such as a pipe or a terminal. Reads block until the
/// underlying reader produces data.
#[derive(Debug)]
pub struct StreamInput<R> {
    reader: R,
}

impl<R: BufRead> StreamInput<R> {
    pub fn new(reader: R) -> Self {
        StreamInput { reader }
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: BufRead> ByteSource for StreamInput<R> {
    fn can_seek(&self) -> bool {
        false
    }

    fn available(&mut self) -> io::Result<Availability> {
        if self.reader.fill_buf()?.is_empty() {
            Ok(Availability::Closed)
        } else {
            Ok(Availability::Ready)
        }
    }

    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        let byte = self.reader.fill_buf()?.first().copied();
        if byte.is_some() {
            self.reader.consume(1);
        }
        Ok(byte)
    }
}

/// Bytes arriving from another thread. Input is closed once every sender
/// has been dropped.
#[derive(Debug)]
pub struct ChannelInput {
    receiver: Receiver<u8>,
    peeked: Option<u8>,
}

impl ChannelInput {
    pub fn new(receiver: Receiver<u8>) -> Self {
        ChannelInput {
            receiver,
            peeked: None,
        }
    }
}

impl ByteSource for ChannelInput {
    fn can_seek(&self) -> bool {
        true
    }

    fn available(&mut self) -> io::Result<Availability> {
        if self.peeked.is_some() {
            return Ok(Availability::Ready);
        }
        match self.receiver.try_recv() {
            Ok(byte) => {
                self.peeked = Some(byte);
                Ok(Availability::Ready)
            }
            Err(TryRecvError::Empty) => Ok(Availability::Pending),
            Err(TryRecvError::Disconnected) => Ok(Availability::Closed),
        }
    }

    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        match self.peeked.take() {
            Some(byte) => Ok(Some(byte)),
            None => Ok(self.receiver.recv().ok()),
        }
    }
}

/// Read one byte for the `,` at `position`.
///
/// With `can_seek` set, waits in [`POLL_INTERVAL`] steps until the source
/// reports data (or its end) before reading. Running out of input is an
/// error; it is never retried.
pub fn read_byte<S: ByteSource + ?Sized>(
    input: &mut S,
    can_seek: bool,
    position: Option<Position>,
) -> Result<u8, RunError> {
    if can_seek {
        while input.available()? == Availability::Pending {
            trace!("no input available yet, sleeping");
            thread::sleep(POLL_INTERVAL);
        }
    }

    match input.next_byte()? {
        Some(byte) => Ok(byte),
        None => Err(RunError::InputExhausted { position }),
    }
}

/// Write one cell to the output, unbuffered by us.
pub fn write_byte<W: Write + ?Sized>(output: &mut W, byte: u8) -> Result<(), RunError> {
    output.write_all(&[byte])?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Instant;

    #[test]
    fn cursor_reads_then_exhausts() {
        let mut input = Cursor::new(vec![0x41]);
        assert_eq!(read_byte(&mut input, true, None).unwrap(), 0x41);
        assert!(matches!(
            read_byte(&mut input, true, Some(Position::at(3))),
            Err(RunError::InputExhausted {
                position: Some(Position { start: 3, end: 3 })
            })
        ));
    }

    #[test]
    fn stream_input_is_not_seekable() {
        let mut input = StreamInput::new(&b"ab"[..]);
        assert!(!input.can_seek());
        assert_eq!(input.available().unwrap(), Availability::Ready);
        assert_eq!(read_byte(&mut input, false, None).unwrap(), b'a');
        assert_eq!(read_byte(&mut input, false, None).unwrap(), b'b');
        assert_eq!(input.available().unwrap(), Availability::Closed);
        assert!(read_byte(&mut input, false, None).is_err());
    }

    #[test]
    fn channel_input_reports_pending() {
        let (sender, receiver) = mpsc::channel();
        let mut input = ChannelInput::new(receiver);
        assert_eq!(input.available().unwrap(), Availability::Pending);
        sender.send(7).unwrap();
        assert_eq!(input.available().unwrap(), Availability::Ready);
        assert_eq!(input.next_byte().unwrap(), Some(7));
        drop(sender);
        assert_eq!(input.available().unwrap(), Availability::Closed);
        assert_eq!(input.next_byte().unwrap(), None);
    }

    #[test]
    fn polling_waits_for_late_input() {
        let (sender, receiver) = mpsc::channel();
        let mut input = ChannelInput::new(receiver);
        let started = Instant::now();
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(150));
            sender.send(b'x').unwrap();
        });

        assert_eq!(read_byte(&mut input, true, None).unwrap(), b'x');
        assert!(started.elapsed() >= Duration::from_millis(150));
        producer.join().unwrap();
    }

    #[test]
    fn write_byte_appends() {
        let mut output = vec![];
        write_byte(&mut output, 0).unwrap();
        write_byte(&mut output, 255).unwrap();
        assert_eq!(output, [0, 255]);
    }
}

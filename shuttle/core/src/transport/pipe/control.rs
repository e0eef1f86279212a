//! Control Channel Messages
//!
//! Fixed-size command records sent from the parent to the pipe worker.
//!
//! ```text
//! +---------+----------------------+
//! | Tag (1) | Argument (4)         |
//! | ASCII   | host-order u32 edge  |
//! +---------+----------------------+
//! ```
//!
//! Records are 5 bytes, well under `PIPE_BUF`, so each write is atomic.

use std::io::{Read, Write};

use crate::transport::stream::{read_exact, write_full};
use crate::transport::TransportError;

/// Size of one encoded control record
pub const RECORD_SIZE: usize = 5;

const TAG_PROCESS: u8 = b'P';
const TAG_WAIT: u8 = b'W';
const TAG_EXIT: u8 = b'E';
const TAG_ANNOUNCE: u8 = b'A';

/// A command on the control channel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlMessage {
    /// Read one matrix from the inbound data channel, transform, reply
    Process,
    /// Stay idle
    Wait,
    /// Leave the command loop and exit
    Exit,
    /// The next request will carry a matrix of this edge length
    Announce {
        /// Edge length of upcoming matrices
        edge: u32,
    },
}

impl ControlMessage {
    /// Encode to a fixed-size record
    #[must_use]
    pub fn encode(self) -> [u8; RECORD_SIZE] {
        let (tag, arg) = match self {
            Self::Process => (TAG_PROCESS, 0),
            Self::Wait => (TAG_WAIT, 0),
            Self::Exit => (TAG_EXIT, 0),
            Self::Announce { edge } => (TAG_ANNOUNCE, edge),
        };
        let mut record = [0u8; RECORD_SIZE];
        record[0] = tag;
        record[1..].copy_from_slice(&arg.to_ne_bytes());
        record
    }

    /// Decode a record
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Protocol` for an unknown tag.
    pub fn decode(record: [u8; RECORD_SIZE]) -> Result<Self, TransportError> {
        let arg = u32::from_ne_bytes([record[1], record[2], record[3], record[4]]);
        match record[0] {
            TAG_PROCESS => Ok(Self::Process),
            TAG_WAIT => Ok(Self::Wait),
            TAG_EXIT => Ok(Self::Exit),
            TAG_ANNOUNCE => Ok(Self::Announce { edge: arg }),
            other => Err(TransportError::Protocol(format!(
                "Unknown control tag {other:#04x}"
            ))),
        }
    }

    /// Write this message as one record
    pub fn write_to<W: Write + ?Sized>(self, writer: &mut W) -> Result<(), TransportError> {
        write_full(writer, &self.encode())?;
        writer.flush()?;
        Ok(())
    }

    /// Block until the next record arrives
    pub fn read_from<R: Read + ?Sized>(reader: &mut R) -> Result<Self, TransportError> {
        let mut record = [0u8; RECORD_SIZE];
        read_exact(reader, &mut record)?;
        Self::decode(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_records_are_fixed_size_and_tagged() {
        assert_eq!(ControlMessage::Process.encode()[0], b'P');
        assert_eq!(ControlMessage::Exit.encode()[0], b'E');

        let announce = ControlMessage::Announce { edge: 1024 }.encode();
        assert_eq!(announce[0], b'A');
        assert_eq!(
            u32::from_ne_bytes([announce[1], announce[2], announce[3], announce[4]]),
            1024
        );
    }

    #[test]
    fn test_command_sequence_over_stream() {
        let mut wire = Vec::new();
        for msg in [
            ControlMessage::Announce { edge: 7 },
            ControlMessage::Process,
            ControlMessage::Wait,
            ControlMessage::Exit,
        ] {
            msg.write_to(&mut wire).unwrap();
        }
        assert_eq!(wire.len(), 4 * RECORD_SIZE);

        let mut cursor = Cursor::new(wire);
        assert_eq!(
            ControlMessage::read_from(&mut cursor).unwrap(),
            ControlMessage::Announce { edge: 7 }
        );
        assert_eq!(
            ControlMessage::read_from(&mut cursor).unwrap(),
            ControlMessage::Process
        );
        assert_eq!(
            ControlMessage::read_from(&mut cursor).unwrap(),
            ControlMessage::Wait
        );
        assert_eq!(
            ControlMessage::read_from(&mut cursor).unwrap(),
            ControlMessage::Exit
        );
    }

    #[test]
    fn test_unknown_tag_rejected() {
        let result = ControlMessage::decode([b'Z', 0, 0, 0, 0]);
        assert!(matches!(result, Err(TransportError::Protocol(_))));
    }

    #[test]
    fn test_closed_control_channel_is_incomplete() {
        let result = ControlMessage::read_from(&mut Cursor::new(vec![b'P', 0]));
        assert!(matches!(
            result,
            Err(TransportError::IncompleteTransfer { .. })
        ));
    }
}

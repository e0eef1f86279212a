//! Reliable Byte-Stream Primitives
//!
//! Short-read and short-write safe loops over any blocking `Read`/`Write`
//! (pipe ends, TCP streams). Interrupted system calls are retried here and
//! never reach the caller.

use std::io::{self, ErrorKind, Read, Write};

use super::TransportError;

/// Read until `buf` is full or the peer closes
///
/// Returns the number of bytes read. A count below `buf.len()` means the peer
/// closed early; callers treat that as a failed transfer.
///
/// # Errors
///
/// Any read error other than `Interrupted`.
pub fn read_full<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

/// Read exactly `buf.len()` bytes
///
/// # Errors
///
/// - `TransportError::IncompleteTransfer` if the peer closed first
/// - `TransportError::Io` on any other read failure
pub fn read_exact<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<(), TransportError> {
    let received = read_full(reader, buf)?;
    if received != buf.len() {
        return Err(TransportError::IncompleteTransfer {
            expected: buf.len(),
            received,
        });
    }
    Ok(())
}

/// Write all of `buf`, retrying short writes and interruptions
///
/// # Errors
///
/// Any write error other than `Interrupted`, or `WriteZero` if the channel
/// stops accepting bytes.
pub fn write_full<W: Write + ?Sized>(writer: &mut W, buf: &[u8]) -> io::Result<()> {
    let mut written = 0;
    while written < buf.len() {
        match writer.write(&buf[written..]) {
            Ok(0) => {
                return Err(io::Error::new(
                    ErrorKind::WriteZero,
                    format!("channel accepted 0 of {} bytes", buf.len() - written),
                ));
            }
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Write all of `buf`, issuing at most `chunk_size` bytes per call
///
/// Used on pipes so that each call stays within the atomic-write limit.
///
/// # Errors
///
/// Same as [`write_full`].
pub fn write_chunked<W: Write + ?Sized>(
    writer: &mut W,
    buf: &[u8],
    chunk_size: usize,
) -> io::Result<()> {
    for chunk in buf.chunks(chunk_size.max(1)) {
        write_full(writer, chunk)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Reader that yields one byte per call and is interrupted every other call
    struct Trickle {
        data: Vec<u8>,
        pos: usize,
        interrupt_next: bool,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.interrupt_next {
                self.interrupt_next = false;
                return Err(io::Error::new(ErrorKind::Interrupted, "EINTR"));
            }
            self.interrupt_next = true;
            if self.pos >= self.data.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.data[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    /// Writer that accepts at most `limit` bytes per call and records call sizes
    struct Narrow {
        out: Vec<u8>,
        limit: usize,
        calls: Vec<usize>,
    }

    impl Write for Narrow {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = buf.len().min(self.limit);
            self.out.extend_from_slice(&buf[..n]);
            self.calls.push(buf.len());
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_read_full_handles_short_reads_and_eintr() {
        let mut reader = Trickle {
            data: vec![1, 2, 3, 4, 5],
            pos: 0,
            interrupt_next: true,
        };
        let mut buf = [0u8; 5];
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 5);
        assert_eq!(buf, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_read_full_returns_partial_on_eof() {
        let mut reader = Cursor::new(vec![9u8; 3]);
        let mut buf = [0u8; 8];
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 3);
    }

    #[test]
    fn test_read_exact_reports_incomplete_transfer() {
        let mut reader = Cursor::new(vec![0u8; 3]);
        let mut buf = [0u8; 8];
        let result = read_exact(&mut reader, &mut buf);
        assert!(matches!(
            result,
            Err(TransportError::IncompleteTransfer {
                expected: 8,
                received: 3
            })
        ));
    }

    #[test]
    fn test_write_full_loops_over_short_writes() {
        let mut writer = Narrow {
            out: Vec::new(),
            limit: 3,
            calls: Vec::new(),
        };
        let data: Vec<u8> = (0..10).collect();
        write_full(&mut writer, &data).unwrap();
        assert_eq!(writer.out, data);
        assert_eq!(writer.calls.len(), 4);
    }

    #[test]
    fn test_write_chunked_respects_chunk_size() {
        let mut writer = Narrow {
            out: Vec::new(),
            limit: usize::MAX,
            calls: Vec::new(),
        };
        let data = vec![7u8; 10];
        write_chunked(&mut writer, &data, 4).unwrap();
        assert_eq!(writer.out, data);
        assert_eq!(writer.calls, vec![4, 4, 2]);
    }

    #[test]
    fn test_write_full_zero_write_is_error() {
        let mut writer = Narrow {
            out: Vec::new(),
            limit: 0,
            calls: Vec::new(),
        };
        let err = write_full(&mut writer, &[1, 2]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WriteZero);
    }
}

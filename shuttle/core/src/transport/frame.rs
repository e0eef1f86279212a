//! Frame Protocol
//!
//! Wire format for matrices on stream channels (socket connection and the
//! pipe data channels): an edge-length header followed by the raw payload.
//!
//! # Frame Format
//!
//! ```text
//! +----------------+------------------------------------------+
//! | Edge (4)       | Payload (edge² × 4 bytes)                |
//! | host-order i32 | row-major f32 elements                   |
//! +----------------+------------------------------------------+
//! ```
//!
//! The header is the matrix edge length, not a byte count. The reserved
//! value [`SHUTDOWN_SENTINEL`] carries no payload and ends the session.
//!
//! # Limits
//!
//! - Edge lengths above [`MAX_EDGE_LENGTH`] are rejected before allocating
//! - Negative edge lengths other than the sentinel are protocol errors

use std::io::{Read, Write};

use super::stream::{read_exact, write_chunked};
use super::TransportError;
use crate::matrix::{self, Matrix};

/// Header value that tells the worker to close and exit
pub const SHUTDOWN_SENTINEL: i32 = -25;

/// Header size in bytes
pub const HEADER_SIZE: usize = 4;

/// Largest edge length accepted from the wire (1 GiB payload)
pub const MAX_EDGE_LENGTH: usize = 16 * 1024;

/// One decoded unit from a stream channel
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A matrix payload
    Matrix(Matrix),
    /// The shutdown sentinel
    Shutdown,
}

/// Interpretation of a raw header value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    /// Payload of `edge² × 4` bytes follows
    Edge(usize),
    /// Sentinel, nothing follows
    Shutdown,
}

/// Reject an edge length no transport will carry
///
/// # Errors
///
/// Returns `TransportError::Protocol` if the edge exceeds [`MAX_EDGE_LENGTH`].
pub fn check_edge(edge: usize) -> Result<(), TransportError> {
    if edge > MAX_EDGE_LENGTH {
        return Err(TransportError::Protocol(format!(
            "Edge length {edge} exceeds maximum {MAX_EDGE_LENGTH}"
        )));
    }
    Ok(())
}

/// Encode an edge length as a header
///
/// # Errors
///
/// Returns `TransportError::Protocol` if the edge does not fit the header or
/// exceeds [`MAX_EDGE_LENGTH`].
pub fn encode_header(edge: usize) -> Result<[u8; HEADER_SIZE], TransportError> {
    check_edge(edge)?;
    let value = i32::try_from(edge)
        .map_err(|_| TransportError::Protocol(format!("Edge length {edge} does not fit header")))?;
    Ok(value.to_ne_bytes())
}

/// Decode a raw header
///
/// # Errors
///
/// Returns `TransportError::Protocol` for negative values other than the
/// sentinel and for edges above [`MAX_EDGE_LENGTH`].
pub fn decode_header(bytes: [u8; HEADER_SIZE]) -> Result<Header, TransportError> {
    let value = i32::from_ne_bytes(bytes);
    if value == SHUTDOWN_SENTINEL {
        return Ok(Header::Shutdown);
    }
    let edge = usize::try_from(value)
        .map_err(|_| TransportError::Protocol(format!("Negative edge length {value}")))?;
    if edge > MAX_EDGE_LENGTH {
        return Err(TransportError::Protocol(format!(
            "Edge length {edge} exceeds maximum {MAX_EDGE_LENGTH}"
        )));
    }
    Ok(Header::Edge(edge))
}

/// Encode a matrix frame into one buffer
///
/// # Errors
///
/// See [`encode_header`].
pub fn encode(matrix: &Matrix) -> Result<Vec<u8>, TransportError> {
    let header = encode_header(matrix.edge())?;
    let mut buf = Vec::with_capacity(HEADER_SIZE + matrix.byte_len());
    buf.extend_from_slice(&header);
    buf.extend_from_slice(&matrix::serialize(matrix));
    Ok(buf)
}

/// Encode the shutdown frame (header only)
#[must_use]
pub fn encode_shutdown() -> [u8; HEADER_SIZE] {
    SHUTDOWN_SENTINEL.to_ne_bytes()
}

/// Write a matrix frame, at most `chunk_size` bytes per write call
pub fn write_matrix<W: Write + ?Sized>(
    writer: &mut W,
    matrix: &Matrix,
    chunk_size: usize,
) -> Result<(), TransportError> {
    let buf = encode(matrix)?;
    write_chunked(writer, &buf, chunk_size)?;
    writer.flush()?;
    Ok(())
}

/// Write the shutdown frame
pub fn write_shutdown<W: Write + ?Sized>(writer: &mut W) -> Result<(), TransportError> {
    write_chunked(writer, &encode_shutdown(), HEADER_SIZE)?;
    writer.flush()?;
    Ok(())
}

/// Read just the header of the next frame
pub fn read_header<R: Read + ?Sized>(reader: &mut R) -> Result<Header, TransportError> {
    let mut header = [0u8; HEADER_SIZE];
    read_exact(reader, &mut header)?;
    decode_header(header)
}

/// Read the payload that follows a `Header::Edge(edge)`
pub fn read_payload<R: Read + ?Sized>(
    reader: &mut R,
    edge: usize,
    scratch: &mut Vec<u8>,
) -> Result<Matrix, TransportError> {
    scratch.clear();
    scratch.resize(matrix::payload_len(edge), 0);
    read_exact(reader, scratch)?;
    matrix::deserialize(scratch, edge)
}

/// Read one complete frame
pub fn read_frame<R: Read + ?Sized>(reader: &mut R) -> Result<Frame, TransportError> {
    match read_header(reader)? {
        Header::Shutdown => Ok(Frame::Shutdown),
        Header::Edge(edge) => {
            let mut scratch = Vec::new();
            Ok(Frame::Matrix(read_payload(reader, edge, &mut scratch)?))
        }
    }
}

/// Read a frame that must carry a matrix
///
/// # Errors
///
/// Returns `TransportError::Protocol` if the sentinel arrives instead.
pub fn read_matrix<R: Read + ?Sized>(reader: &mut R) -> Result<Matrix, TransportError> {
    match read_frame(reader)? {
        Frame::Matrix(m) => Ok(m),
        Frame::Shutdown => Err(TransportError::Protocol(
            "Unexpected shutdown frame where a matrix was expected".into(),
        )),
    }
}

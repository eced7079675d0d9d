use std::io;

use bytes::{BufMut, BytesMut};
use hexplay::HexViewBuilder;

const MAX_LENGTH_BYTES: usize = 4;

/// Reassembles complete control packets from a byte stream.
///
/// One `read_frame` call performs the reads the framing contract requires:
/// the type octet, the remaining-length varint, then exactly the advertised
/// number of body bytes. The parser downstream can therefore assume one
/// complete packet per invocation.
pub struct FrameReader<R> {
    inner: R,
    buffer: BytesMut,
}

impl<R> FrameReader<R> {
    /// Wraps a blocking byte source.
    pub fn new(inner: R) -> Self {
        FrameReader {
            inner,
            buffer: BytesMut::new(),
        }
    }

    /// Gives the transport back to the caller.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R> FrameReader<R>
where
    R: io::Read,
{
    /// Reads exactly one framed packet and returns its bytes.
    ///
    /// The returned slice stays valid until the next call.
    pub fn read_frame(&mut self) -> io::Result<&[u8]> {
        self.buffer.clear();

        let mut byte = [0u8; 1];
        self.inner.read_exact(&mut byte)?;
        self.buffer.put_u8(byte[0]);

        let mut remaining = 0;
        let mut shift = 0;
        loop {
            self.inner.read_exact(&mut byte)?;
            self.buffer.put_u8(byte[0]);
            remaining += usize::from(byte[0] & 0x7F) << shift;
            if byte[0] & 0x80 == 0 {
                break;
            }
            shift += 7;
            if shift >= 7 * MAX_LENGTH_BYTES {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "remaining length field overflows four bytes",
                ));
            }
        }

        let header = self.buffer.len();
        self.buffer.resize(header + remaining, 0);
        self.inner.read_exact(&mut self.buffer[header..])?;

        trace!(
            "framed {} byte packet:\n{}",
            self.buffer.len(),
            HexViewBuilder::new(&self.buffer).finish()
        );

        Ok(&self.buffer)
    }
}

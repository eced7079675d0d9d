use std::io;

use hexplay::HexViewBuilder;

use crate::status::Status;

/// Caller-supplied sink the session pushes finished packets into.
///
/// Each packet arrives in a single contiguous buffer, exactly once, in the
/// order it was produced. A short write must be reported as an error.
pub trait Sink {
    /// Writes one complete packet to the transport.
    fn write_packet(&mut self, packet: &[u8]) -> io::Result<()>;
}

impl<W> Sink for W
where
    W: io::Write,
{
    fn write_packet(&mut self, packet: &[u8]) -> io::Result<()> {
        self.write_all(packet)?;
        trace!(
            "write packet of {} bytes:\n{}",
            packet.len(),
            HexViewBuilder::new(packet).finish()
        );
        Ok(())
    }
}

/// Caller-supplied callbacks the input-stream parser drives.
///
/// Both fire synchronously while a `ParseInputStream` action runs; the slices
/// borrow the inbound buffer and must be consumed before returning. Neither
/// may dispatch `Connect` or another `ParseInputStream` on the same session.
pub trait Events {
    /// A CONNACK arrived; `status` carries its return code.
    fn on_connected(&mut self, status: Status);

    /// A PUBLISH or SUBACK arrived.
    ///
    /// For a PUBLISH, `payload` and `topic` view the received frame. For a
    /// SUBACK (and for a PUBLISH that failed to decode) both slices are empty
    /// and `status` tells the outcome.
    fn on_subscribe(&mut self, status: Status, payload: &[u8], topic: &[u8]);
}

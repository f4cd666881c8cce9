//! The presence sink seam.

use crate::error::SinkError;
use crate::presentation::SinkPayload;

/// Something that renders the user's activity to other viewers.
///
/// Implementations track their own connection: a failed call drops the
/// connection and [`PresenceSink::is_connected`] turns false until the next
/// successful [`PresenceSink::connect`].
pub trait PresenceSink {
    fn connect(&mut self) -> Result<(), SinkError>;
    fn is_connected(&self) -> bool;
    fn update(&mut self, payload: &SinkPayload) -> Result<(), SinkError>;
    fn clear(&mut self) -> Result<(), SinkError>;
    fn close(&mut self) -> Result<(), SinkError>;
}

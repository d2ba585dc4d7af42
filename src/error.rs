
use crate::packet::Packet;

/// MAC layer errors, generic over the underlying radio driver error.
#[derive(Debug, Clone, PartialEq)]
pub enum CoreError<E> {
    /// Transmit queue full, the rejected frame is handed back
    QueueFull(Packet),

    /// Sleep interval bounds are not an exact power-of-two ladder
    InvalidConfig,

    /// Option not recognized by the MAC or the driver
    Unsupported,

    /// Wrapper for unhandled / underlying radio errors
    Radio(E),
}

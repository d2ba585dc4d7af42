//! Duty-cycled MAC adaptation layer for battery-powered leaf nodes.
//! Sits between an IEEE 802.15.4 radio driver and the network layer and
//! decides when the radio is on: sleep most of the time, wake to beacon,
//! drain pending transmissions and solicited receptions, sleep again.

#![no_std]

use core::fmt::Debug;

use ieee802154::mac::{PanId, ShortAddress};

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod timer;

pub mod error;

pub mod packet;

pub mod duty;

pub mod prelude;

#[cfg(any(test, feature = "mocks"))]
pub mod mock;

use packet::Packet;

/// Radio power states the MAC steers the driver through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioState {
    /// Radio powered down
    Sleep,
    /// Radio on, not actively receiving
    Idle,
    /// Radio receiving a frame
    Rx,
    /// Radio transmitting a frame
    Tx,
}

/// Events reported by the radio driver through its event callback.
///
/// `Isr` and `RxPending` are raised from interrupt context; the remaining
/// completion events may be raised from the driver's soft-IRQ context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RadioEvent {
    /// Interrupt needs service, run [`RadioDriver::isr`]
    Isr,
    /// Peer indicated further frames are queued for us
    RxPending,
    /// Frame reception finished, fetch it with [`RadioDriver::recv`]
    RxComplete,
    /// Transmission acknowledged (or no ack requested)
    TxComplete,
    /// Transmission acknowledged, peer holds more data for us
    TxCompletePending,
    /// Clear channel assessment failed
    TxMediumBusy,
    /// No acknowledgment after the driver's own attempts
    TxNoAck,
}

/// Options understood by the MAC configuration surface.
///
/// [`NetOpt::DutyCycling`] is handled by the MAC itself; everything else
/// passes through to the radio driver transparently.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NetOpt {
    /// Leaf duty cycling on or off
    DutyCycling(bool),
    /// Radio power state
    State(RadioState),
    /// Source address length in octets
    SrcAddrLen(u16),
    /// Channel index
    Channel(u8),
    /// Transmit power in dBm
    TxPower(i8),
    /// PAN identifier
    PanId(PanId),
    /// Short (16-bit) address
    ShortAddr(ShortAddress),
}

/// Value-less option tags for [`RadioDriver::get_option`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NetOptKind {
    DutyCycling,
    State,
    SrcAddrLen,
    Channel,
    TxPower,
    PanId,
    ShortAddr,
}

impl NetOpt {
    /// Tag for this option value.
    pub fn kind(&self) -> NetOptKind {
        match self {
            NetOpt::DutyCycling(_) => NetOptKind::DutyCycling,
            NetOpt::State(_) => NetOptKind::State,
            NetOpt::SrcAddrLen(_) => NetOptKind::SrcAddrLen,
            NetOpt::Channel(_) => NetOptKind::Channel,
            NetOpt::TxPower(_) => NetOptKind::TxPower,
            NetOpt::PanId(_) => NetOptKind::PanId,
            NetOpt::ShortAddr(_) => NetOptKind::ShortAddr,
        }
    }
}

/// Interface the MAC requires from an 802.15.4-class radio driver.
///
/// All calls return synchronously; completion of `send`, `resend` and
/// `send_beacon` is reported later through the driver's event callback
/// (see [`duty::mailbox::RadioHook`]). `resend` retransmits a frame the
/// driver has already seen, preserving link-layer sequencing.
pub trait RadioDriver {
    type Error: Debug;

    /// Bring the radio up. Called once from MAC construction.
    fn init(&mut self) -> Result<(), Self::Error>;

    /// Current radio power state.
    fn state(&mut self) -> Result<RadioState, Self::Error>;

    /// Move the radio to the given power state.
    fn set_state(&mut self, state: RadioState) -> Result<(), Self::Error>;

    /// Write a driver option.
    fn set_option(&mut self, opt: &NetOpt) -> Result<(), Self::Error>;

    /// Read a driver option.
    fn get_option(&mut self, kind: NetOptKind) -> Result<NetOpt, Self::Error>;

    /// Run the interrupt service body in thread context.
    fn isr(&mut self);

    /// Start transmission of a frame. The frame stays owned by the caller.
    fn send(&mut self, frame: &Packet) -> Result<(), Self::Error>;

    /// Retransmit a previously sent frame.
    fn resend(&mut self, frame: &Packet) -> Result<(), Self::Error>;

    /// Transmit a wake-up beacon frame.
    fn send_beacon(&mut self) -> Result<(), Self::Error>;

    /// Fetch the frame behind an [`RadioEvent::RxComplete`] event.
    fn recv(&mut self) -> Option<Packet>;
}

// Wrap log macros to support switching between defmt and standard logging

#[cfg(feature = "defmt")]
mod log {
    pub use defmt::{debug, error, info, trace, warn};
}

#[cfg(not(feature = "defmt"))]
mod log {
    pub use log::{debug, error, info, trace, warn};
}

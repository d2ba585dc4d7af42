//! Duty-cycled MAC crate prelude

pub use crate::{NetOpt, NetOptKind, RadioDriver, RadioEvent, RadioState};

pub use crate::error::CoreError;

pub use crate::packet::{Packet, MAX_PAYLOAD_LEN};

pub use crate::timer::Timer as MacTimer;

pub use crate::duty::{Config, DutyMac, DutyState, DutyStats, LeafMac, Reply};

pub use crate::duty::mailbox::{IsrFlags, Mailbox, Msg, RadioHook};

pub use ieee802154::mac::{
    Address as MacAddress, AddressMode, ExtendedAddress, PanId, ShortAddress,
};

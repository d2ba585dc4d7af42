
use core::sync::atomic::{AtomicBool, Ordering};

use heapless::mpmc::MpMcQueue;

use crate::log::error;
use crate::packet::Packet;
use crate::{NetOpt, NetOptKind, RadioEvent};

/// Message kinds serialized through the MAC mailbox.
#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// Duty-cycle timer expired
    Timer,
    /// Radio interrupt needs service
    Irq,
    /// Completion event from the radio driver
    Radio(RadioEvent),
    /// Duty-cycle state advance
    Event,
    /// Probe the transmit queue for work
    CheckQueue,
    /// Drop the transmitted head frame and continue draining
    RemoveQueue,
    /// (Re)issue the in-flight transmission
    Retransmit,
    /// Outbound frame from the network layer
    Send(Packet),
    /// Option write
    Set(NetOpt),
    /// Option read
    Get(NetOptKind),
}

/// Bounded multi-producer mailbox feeding the MAC worker.
///
/// Posting is lock-free and interrupt-safe; the worker is the single
/// consumer. Messages from the same producer are observed FIFO.
pub struct Mailbox<const N: usize> {
    queue: MpMcQueue<Msg, N>,
}

impl<const N: usize> Mailbox<N> {
    pub const fn new() -> Self {
        Self {
            queue: MpMcQueue::new(),
        }
    }

    /// Post a message, handing it back when the mailbox is full.
    pub fn post(&self, msg: Msg) -> Result<(), Msg> {
        self.queue.enqueue(msg)
    }

    /// Take the oldest message, if any.
    pub fn try_recv(&self) -> Option<Msg> {
        self.queue.dequeue()
    }
}

/// Flags shared between interrupt context and the worker.
pub struct IsrFlags {
    irq_pending: AtomicBool,
    additional_wakeup: AtomicBool,
}

impl IsrFlags {
    pub const fn new() -> Self {
        Self {
            irq_pending: AtomicBool::new(false),
            additional_wakeup: AtomicBool::new(false),
        }
    }

    pub(crate) fn set_irq_pending(&self) {
        self.irq_pending.store(true, Ordering::SeqCst);
    }

    pub(crate) fn clear_irq_pending(&self) {
        self.irq_pending.store(false, Ordering::SeqCst);
    }

    /// True while an interrupt awaits service; gates transmit launches.
    pub fn irq_pending(&self) -> bool {
        self.irq_pending.load(Ordering::SeqCst)
    }

    pub(crate) fn set_additional_wakeup(&self) {
        self.additional_wakeup.store(true, Ordering::SeqCst);
    }

    pub(crate) fn take_additional_wakeup(&self) -> bool {
        self.additional_wakeup.swap(false, Ordering::SeqCst)
    }
}

/// Radio event callback context.
///
/// Handed to the driver at bring-up in place of a callback function
/// pointer. [`on_event`](RadioHook::on_event) is the whole permitted
/// interrupt-side behavior: set a flag or post a message, nothing else.
pub struct RadioHook<'a, const N: usize> {
    mbox: &'a Mailbox<N>,
    flags: &'a IsrFlags,
}

impl<'a, const N: usize> RadioHook<'a, N> {
    pub fn new(mbox: &'a Mailbox<N>, flags: &'a IsrFlags) -> Self {
        Self { mbox, flags }
    }

    /// Driver event callback body. Safe from interrupt context.
    pub fn on_event(&self, event: RadioEvent) {
        match event {
            RadioEvent::Isr => {
                self.flags.set_irq_pending();
                if self.mbox.post(Msg::Irq).is_err() {
                    error!("mailbox full, possibly lost interrupt");
                }
            }
            RadioEvent::RxPending => self.flags.set_additional_wakeup(),
            event => {
                if self.mbox.post(Msg::Radio(event)).is_err() {
                    error!("mailbox full, dropped radio event {:?}", event);
                }
            }
        }
    }
}

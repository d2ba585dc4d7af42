//! Duty-cycled MAC for battery-powered leaf nodes.
//!
//! The radio sleeps between wakes. Each wake transmits either a beacon
//! (queue empty) or the queued data followed by a beacon; a beacon
//! answered with a pending-data indication extends into an idle listen
//! window. Idle cycles double the sleep interval, productive cycles reset
//! it, so idle nodes wake rarely and busy nodes stay responsive.
//!
//! All mutable state lives in [`DutyMac`], owned by the worker that drains
//! the [`Mailbox`]. The timer and the radio event callback only post
//! messages (see [`RadioHook`]); within a message the worker runs to
//! completion.

pub mod config;
pub mod interval;
pub mod mailbox;
pub mod queue;
pub mod retry;

pub use config::Config;
pub use mailbox::{IsrFlags, Mailbox, Msg, RadioHook};

use heapless::Deque;
use rand_core::RngCore;

use crate::error::CoreError;
use crate::log::{debug, error, info, trace, warn};
use crate::packet::Packet;
use crate::timer::Timer;
use crate::{NetOpt, NetOptKind, RadioDriver, RadioEvent, RadioState};

use config::{REXMIT_DEFER_MAX, SHORT_ADDR_LEN};
use interval::SleepInterval;
use queue::TxQueue;
use retry::AttemptLayer;

/// Position in the duty cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DutyState {
    /// Duty cycling not running; frames pass straight through
    Init,
    /// Radio off, waiting for the wake timer
    Sleep,
    /// Waking to announce availability
    TxBeacon,
    /// Draining the transmit queue mid-interval
    TxData,
    /// Draining the transmit queue ahead of the wake beacon
    TxDataBeforeBeacon,
    /// Radio idle-listening for solicited traffic
    Listen,
}

/// Replies produced by [`Msg::Set`] / [`Msg::Get`] dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ack,
    Value(NetOpt),
}

/// Link-layer counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DutyStats {
    pub tx_success: u32,
    pub tx_failed: u32,
    pub rx_frames: u32,
    pub queue_drops: u32,
}

/// [`DutyMac`] with the default queue and mailbox depths.
pub type LeafMac<'a, R, T, G> =
    DutyMac<'a, R, T, G, { config::PKT_QUEUE_SIZE }, { config::MSG_QUEUE_SIZE }>;

/// Duty-cycled leaf MAC.
///
/// Generic over a radio driver (R), timer (T) and RNG (G), with the
/// transmit queue depth (Q) and mailbox depth (M) fixed at build time.
/// The mailbox and interrupt flags live outside so the timer and radio
/// callbacks can hold references to them; everything else is owned here.
pub struct DutyMac<'a, R, T, G, const Q: usize, const M: usize> {
    radio: R,
    timer: T,
    rng: G,

    mbox: &'a Mailbox<M>,
    flags: &'a IsrFlags,

    config: Config,
    interval: SleepInterval,

    state: DutyState,
    dutycycling: bool,

    queue: TxQueue<Q>,
    rx_queue: Deque<Packet, { config::RX_QUEUE_SIZE }>,

    // A transmission may be launched only while this is clear
    radio_busy: bool,
    // A beacon was wanted while the radio was unavailable
    beacon_pending: bool,
    // The in-flight transmission is a beacon, not the queue head
    sending_beacon: bool,
    // The in-flight transmission is a retransmission
    retry_rexmit: bool,
    rexmit_deferrals: u8,

    csma: AttemptLayer,
    retry: AttemptLayer,

    stats: DutyStats,
}

impl<'a, R, T, G, const Q: usize, const M: usize> DutyMac<'a, R, T, G, Q, M>
where
    R: RadioDriver,
    T: Timer,
    G: RngCore,
{
    /// Create a new MAC over the provided radio, initializing the driver.
    pub fn new(
        mut radio: R,
        timer: T,
        rng: G,
        mbox: &'a Mailbox<M>,
        flags: &'a IsrFlags,
        config: Config,
    ) -> Result<Self, CoreError<R::Error>> {
        if !config.valid() {
            return Err(CoreError::InvalidConfig);
        }

        radio.init().map_err(CoreError::Radio)?;

        let interval = SleepInterval::new(config.sleep_interval_min, config.sleep_interval_max);
        let csma = AttemptLayer::new(config.csma_max_backoffs);
        let retry = AttemptLayer::new(config.max_retries);

        debug!("MAC init, sleep interval {} us", config.sleep_interval_min);

        Ok(Self {
            radio,
            timer,
            rng,
            mbox,
            flags,
            config,
            interval,
            state: DutyState::Init,
            dutycycling: false,
            queue: TxQueue::new(),
            rx_queue: Deque::new(),
            radio_busy: false,
            beacon_pending: false,
            sending_beacon: false,
            retry_rexmit: false,
            rexmit_deferrals: 0,
            csma,
            retry,
            stats: DutyStats::default(),
        })
    }

    /// Queue a frame for transmission.
    ///
    /// While asleep with an otherwise empty queue the frame is transmitted
    /// immediately; otherwise it waits for the next wake. A full queue
    /// hands the frame back as [`CoreError::QueueFull`].
    pub fn send(&mut self, frame: Packet) -> Result<(), CoreError<R::Error>> {
        self.dispatch(Msg::Send(frame)).map(|_| ())
    }

    /// Write a MAC or driver option. The `Ok` return is the ack.
    pub fn set_option(&mut self, opt: NetOpt) -> Result<(), CoreError<R::Error>> {
        self.dispatch(Msg::Set(opt)).map(|_| ())
    }

    /// Read a MAC or driver option.
    pub fn get_option(&mut self, kind: NetOptKind) -> Result<NetOpt, CoreError<R::Error>> {
        match self.dispatch(Msg::Get(kind))? {
            Some(Reply::Value(v)) => Ok(v),
            _ => Err(CoreError::Unsupported),
        }
    }

    /// Take the oldest received frame, if any.
    pub fn receive(&mut self) -> Option<Packet> {
        self.rx_queue.pop_front()
    }

    /// Current duty-cycle state.
    pub fn state(&self) -> DutyState {
        self.state
    }

    /// Link-layer counters.
    pub fn stats(&self) -> DutyStats {
        self.stats.clone()
    }

    /// Drain the mailbox, dispatching every pending message. The worker
    /// loop body: call whenever the mailbox may hold work, then sleep.
    pub fn poll(&mut self) -> Result<(), CoreError<R::Error>> {
        while let Some(msg) = self.mbox.try_recv() {
            self.dispatch(msg)?;
        }
        Ok(())
    }

    /// Dispatch a single message. Runs to completion without yielding.
    pub fn dispatch(&mut self, msg: Msg) -> Result<Option<Reply>, CoreError<R::Error>> {
        trace!("dispatch {:?} in {:?}", msg, self.state);

        match msg {
            Msg::Timer => self.handle_timer().map(|_| None),
            Msg::Event => self.handle_event().map(|_| None),
            Msg::Irq => self.handle_irq().map(|_| None),
            Msg::Radio(event) => self.handle_radio_event(event).map(|_| None),
            Msg::CheckQueue => self.handle_check_queue().map(|_| None),
            Msg::RemoveQueue => self.handle_remove_queue().map(|_| None),
            Msg::Retransmit => self.handle_retransmit().map(|_| None),
            Msg::Send(frame) => self.handle_send(frame).map(|_| None),
            Msg::Set(opt) => self.handle_set(opt).map(|_| Some(Reply::Ack)),
            Msg::Get(kind) => self.handle_get(kind).map(|v| Some(Reply::Value(v))),
        }
    }

    /// Post an internal message back to our own mailbox.
    fn post(&mut self, msg: Msg) {
        if self.mbox.post(msg).is_err() {
            error!("mailbox full, dropped internal message");
        }
    }

    /// Safe-transmit gate: no send in flight, no unserviced interrupt,
    /// radio not mid-reception.
    fn transmit_ready(&mut self) -> Result<bool, CoreError<R::Error>> {
        Ok(!self.radio_busy
            && !self.flags.irq_pending()
            && self.radio.state().map_err(CoreError::Radio)? != RadioState::Rx)
    }

    /// Mark the radio busy and route the attempt through the retransmit
    /// path, where the gate is re-checked at the moment of the driver call.
    fn launch(&mut self, beacon: bool) {
        self.radio_busy = true;
        self.sending_beacon = beacon;
        self.retry_rexmit = false;
        self.rexmit_deferrals = 0;
        self.csma.begin();
        self.retry.begin();
        self.post(Msg::Retransmit);
    }

    /// Launch transmission of the queue head.
    fn transmit_head(&mut self) {
        if self.queue.is_empty() {
            warn!("transmit requested with empty queue");
            return;
        }
        self.launch(false);
    }

    /// Transmit a beacon, or defer it while the radio is unavailable.
    fn send_beacon_safely(&mut self) -> Result<(), CoreError<R::Error>> {
        if !self.transmit_ready()? {
            debug!("beacon deferred");
            self.beacon_pending = true;
        } else {
            self.launch(true);
        }
        Ok(())
    }

    /// Send a beacon deferred by the gate, once the radio is free again.
    fn drain_pending_beacon(&mut self) {
        if self.beacon_pending && !self.radio_busy {
            debug!("sending deferred beacon");
            self.beacon_pending = false;
            self.launch(true);
        }
    }

    /// Wake timer expired.
    fn handle_timer(&mut self) -> Result<(), CoreError<R::Error>> {
        match self.state {
            DutyState::Sleep => {
                self.state = if self.queue.is_empty() {
                    DutyState::TxBeacon
                } else {
                    DutyState::TxDataBeforeBeacon
                };
                self.post(Msg::Event);
            }
            DutyState::Listen => {
                if !self.queue.is_empty() {
                    self.timer.arm(self.interval.current());
                    self.state = DutyState::TxData;
                    self.post(Msg::CheckQueue);
                } else {
                    self.state = DutyState::Sleep;
                    self.post(Msg::Event);
                }
            }
            // Sleep interval ended while draining data: pure state change
            DutyState::TxData => self.state = DutyState::TxDataBeforeBeacon,
            _ => (),
        }
        Ok(())
    }

    /// Advance the duty cycle out of the current state.
    fn handle_event(&mut self) -> Result<(), CoreError<R::Error>> {
        if !self.dutycycling {
            warn!("duty event while duty cycling disabled");
            return Ok(());
        }

        match self.state {
            DutyState::Init => self.start_dutycycling()?,
            DutyState::TxBeacon => {
                self.timer.cancel();
                self.send_beacon_safely()?;
            }
            DutyState::TxData => {
                // Queue drained mid-interval: radio off, wake timer keeps
                // running towards the next beacon
                self.state = DutyState::Sleep;
                self.radio.set_state(RadioState::Sleep).map_err(CoreError::Radio)?;
                debug!("radio off");
            }
            DutyState::TxDataBeforeBeacon => {
                self.timer.cancel();
                if self.transmit_ready()? {
                    self.transmit_head();
                }
            }
            DutyState::Listen => {
                self.radio.set_state(RadioState::Idle).map_err(CoreError::Radio)?;
                self.timer.arm(self.config.wakeup_interval);
                debug!("radio idle listening for {} us", self.config.wakeup_interval);
            }
            DutyState::Sleep => {
                self.radio.set_state(RadioState::Sleep).map_err(CoreError::Radio)?;
                self.timer.arm(self.interval.current());
                debug!("radio off for {} us", self.interval.current());
            }
        }
        Ok(())
    }

    /// Enter the duty cycle: radio parked, short addressing forced, first
    /// wake at a uniform random point to spread neighboring leaves out.
    fn start_dutycycling(&mut self) -> Result<(), CoreError<R::Error>> {
        self.state = DutyState::Sleep;
        self.radio.set_state(RadioState::Sleep).map_err(CoreError::Radio)?;
        self.radio
            .set_option(&NetOpt::SrcAddrLen(SHORT_ADDR_LEN))
            .map_err(CoreError::Radio)?;

        let first = self.rng.next_u32() % self.config.sleep_interval_max;
        self.timer.arm(first);

        info!("duty cycling started, first wake in {} us", first);
        Ok(())
    }

    /// Service a radio interrupt in worker context.
    fn handle_irq(&mut self) -> Result<(), CoreError<R::Error>> {
        self.flags.clear_irq_pending();
        self.radio.isr();

        self.drain_pending_beacon();
        self.post(Msg::CheckQueue);
        Ok(())
    }

    /// Probe the transmit queue for deferred work.
    fn handle_check_queue(&mut self) -> Result<(), CoreError<R::Error>> {
        if self.state != DutyState::Listen && !self.queue.is_empty() && self.transmit_ready()? {
            if self.state == DutyState::Sleep {
                self.state = DutyState::TxData;
            }
            self.transmit_head();
        }
        Ok(())
    }

    /// Drop the transmitted head frame and continue draining the queue.
    fn handle_remove_queue(&mut self) -> Result<(), CoreError<R::Error>> {
        if self.queue.pop_head().is_none() {
            warn!("remove with empty queue");
        }

        if !self.queue.is_empty() {
            if self.transmit_ready()? {
                self.transmit_head();
            }
        } else if self.state == DutyState::TxDataBeforeBeacon {
            debug!("queue drained, beacon next");
            self.state = DutyState::TxBeacon;
            self.send_beacon_safely()?;
        } else if self.state == DutyState::TxData {
            debug!("queue drained, radio off");
            self.state = DutyState::Sleep;
            self.radio.set_state(RadioState::Sleep).map_err(CoreError::Radio)?;
        }
        Ok(())
    }

    /// Issue the in-flight transmission through the driver.
    ///
    /// All transmissions funnel through here so the gate holds at the
    /// moment of the driver call. While the radio is momentarily
    /// unavailable the message tail-reposts itself, bounded so a flood of
    /// deferrals cannot saturate the mailbox.
    fn handle_retransmit(&mut self) -> Result<(), CoreError<R::Error>> {
        if self.flags.irq_pending()
            || self.radio.state().map_err(CoreError::Radio)? == RadioState::Rx
        {
            if self.rexmit_deferrals < REXMIT_DEFER_MAX {
                self.rexmit_deferrals += 1;
                self.post(Msg::Retransmit);
            } else {
                warn!("retransmit deferral budget spent, treating as busy medium");
                self.post(Msg::Radio(RadioEvent::TxMediumBusy));
            }
            return Ok(());
        }
        self.rexmit_deferrals = 0;

        let res = if self.sending_beacon {
            self.radio.send_beacon()
        } else {
            let frame = match self.queue.head() {
                Some(frame) => frame,
                None => {
                    warn!("retransmit with empty queue");
                    self.radio_busy = false;
                    return Ok(());
                }
            };
            if self.retry_rexmit {
                self.radio.resend(frame)
            } else {
                self.radio.send(frame)
            }
        };

        // A driver refusal feeds the normal busy-medium path
        if res.is_err() {
            self.post(Msg::Radio(RadioEvent::TxMediumBusy));
        }
        Ok(())
    }

    /// Completion and reception events, serialized through the mailbox.
    fn handle_radio_event(&mut self, event: RadioEvent) -> Result<(), CoreError<R::Error>> {
        match event {
            RadioEvent::RxComplete => self.handle_rx_complete(),
            RadioEvent::TxCompletePending => self.handle_tx_complete(true),
            RadioEvent::TxComplete => self.handle_tx_complete(false),
            RadioEvent::TxMediumBusy => self.handle_tx_failed(true),
            RadioEvent::TxNoAck => self.handle_tx_failed(false),
            RadioEvent::Isr | RadioEvent::RxPending => {
                // Interrupt-context events; tolerate a driver posting them
                warn!("unexpected {:?} through the mailbox", event);
                Ok(())
            }
        }
    }

    fn handle_rx_complete(&mut self) -> Result<(), CoreError<R::Error>> {
        let frame = self.radio.recv();

        if self.state == DutyState::Init {
            // Pass-through mode: deliver only, and discard a pending bit
            // so it cannot leak into a later duty cycle
            self.flags.take_additional_wakeup();
        } else {
            self.timer.cancel();

            if self.flags.take_additional_wakeup() {
                // Peer flagged further frames: hold the listen window open
                self.state = DutyState::Listen;
                self.post(Msg::Event);
            } else if self.queue.is_empty() {
                self.state = DutyState::Sleep;
                self.post(Msg::Event);
            } else {
                self.timer.arm(self.interval.current());
                self.state = DutyState::TxData;
                self.post(Msg::CheckQueue);
            }
        }

        if let Some(frame) = frame {
            debug!("received {} byte frame", frame.payload().len());
            self.stats.rx_frames = self.stats.rx_frames.saturating_add(1);
            if self.rx_queue.push_back(frame).is_err() {
                error!("receive queue full, dropping frame");
            }
        }
        Ok(())
    }

    fn handle_tx_complete(&mut self, peer_pending: bool) -> Result<(), CoreError<R::Error>> {
        self.csma.send_succeeded();
        self.retry.send_succeeded();

        self.radio_busy = false;
        self.stats.tx_success = self.stats.tx_success.saturating_add(1);

        if peer_pending {
            // Beacon answered: data waits at the parent, listen for it
            self.interval.reset();

            if self.state != DutyState::Init {
                if self.state != DutyState::TxBeacon {
                    warn!("pending-data response outside beacon tx");
                }
                self.timer.cancel();
                self.state = DutyState::Listen;
                self.post(Msg::Event);
            }
            return Ok(());
        }

        if self.state == DutyState::Init {
            // Pass-through mode: drop the completed head, keep draining
            if !self.queue.is_empty() {
                self.post(Msg::RemoveQueue);
            }
        } else if self.state == DutyState::TxBeacon {
            // No data moved this interval, back off
            self.timer.cancel();
            self.interval.backoff();
            self.state = DutyState::Sleep;
            self.post(Msg::Event);
        } else if !self.queue.is_empty() {
            self.interval.reset();
            if self.state != DutyState::TxData {
                debug_assert!(self.state != DutyState::Sleep);
                self.timer.cancel();
            }
            self.post(Msg::RemoveQueue);
        } else if self.state == DutyState::TxData {
            self.post(Msg::Event);
        }

        self.drain_pending_beacon();
        Ok(())
    }

    fn handle_tx_failed(&mut self, medium_busy: bool) -> Result<(), CoreError<R::Error>> {
        if medium_busy {
            if self.csma.send_failed() {
                // Another backoff attempt granted; radio stays busy
                self.post(Msg::Retransmit);
                return Ok(());
            }
        } else {
            // The medium was won, the acknowledgment never came
            self.csma.send_succeeded();
        }

        if self.retry.send_failed() {
            // Retransmission granted, with fresh medium contention
            self.csma.begin();
            self.retry_rexmit = true;
            self.post(Msg::Retransmit);
            return Ok(());
        }

        // Budgets spent: give up on this transmission
        self.radio_busy = false;
        self.stats.tx_failed = self.stats.tx_failed.saturating_add(1);
        debug!("transmission abandoned after retry exhaustion");

        if self.state == DutyState::Init {
            if !self.queue.is_empty() {
                self.post(Msg::RemoveQueue);
            }
        } else if self.state == DutyState::TxBeacon {
            self.timer.cancel();
            self.state = DutyState::Sleep;
            self.post(Msg::Event);
        } else if !self.queue.is_empty() {
            if self.state != DutyState::TxData {
                debug_assert!(self.state != DutyState::Sleep);
                self.timer.cancel();
            }
            self.post(Msg::RemoveQueue);
        } else if self.state == DutyState::TxData {
            self.post(Msg::Event);
        }

        self.drain_pending_beacon();
        Ok(())
    }

    /// Outbound frame from the network layer.
    fn handle_send(&mut self, frame: Packet) -> Result<(), CoreError<R::Error>> {
        // Queue it no matter what
        if let Err(frame) = self.queue.enqueue(frame) {
            warn!("transmit queue full, dropping frame");
            self.stats.queue_drops = self.stats.queue_drops.saturating_add(1);
            return Err(CoreError::QueueFull(frame));
        }

        if self.state == DutyState::Init {
            // Pass-through: transmit immediately
            self.transmit_head();
        } else if self.queue.len() > 1 || self.radio_busy {
            trace!("frame queued, {} pending", self.queue.len());
        } else if self.state == DutyState::Sleep && self.transmit_ready()? {
            self.state = DutyState::TxData;
            self.transmit_head();
        }
        Ok(())
    }

    /// Option write; the duty-cycling switch is ours, the rest forwards.
    fn handle_set(&mut self, opt: NetOpt) -> Result<(), CoreError<R::Error>> {
        match opt {
            NetOpt::DutyCycling(enable) => {
                self.timer.cancel();
                self.dutycycling = enable;

                if enable {
                    self.start_dutycycling()?;
                } else {
                    // Back to pass-through: radio parked, governor fresh
                    // for the next enable
                    info!("duty cycling stopped");
                    self.state = DutyState::Init;
                    self.interval.reset();
                    self.radio.set_state(RadioState::Sleep).map_err(CoreError::Radio)?;
                    self.radio
                        .set_option(&NetOpt::SrcAddrLen(SHORT_ADDR_LEN))
                        .map_err(CoreError::Radio)?;
                }
                Ok(())
            }
            opt => self.radio.set_option(&opt).map_err(CoreError::Radio),
        }
    }

    /// Option read; the duty-cycling flag is ours, the rest forwards.
    fn handle_get(&mut self, kind: NetOptKind) -> Result<NetOpt, CoreError<R::Error>> {
        match kind {
            NetOptKind::DutyCycling => Ok(NetOpt::DutyCycling(self.dutycycling)),
            kind => self.radio.get_option(kind).map_err(CoreError::Radio),
        }
    }
}

#[cfg(test)]
mod test {
    use std::vec::Vec;

    use ieee802154::mac::{Address, PanId, ShortAddress};

    use super::*;
    use crate::mock::{MockOp, MockRadio, MockRng};
    use crate::timer::mock::MockTimer;

    fn init_log() {
        let _ = simplelog::SimpleLogger::init(
            log::LevelFilter::Trace,
            simplelog::Config::default(),
        );
    }

    fn frame(seq: u8) -> Packet {
        Packet::data(
            Address::Short(PanId(1), ShortAddress(2)),
            Address::Short(PanId(1), ShortAddress(3)),
            seq,
            &[seq],
            false,
        )
    }

    struct Fixture {
        mbox: Mailbox<16>,
        flags: IsrFlags,
        radio: MockRadio,
        timer: MockTimer,
    }

    impl Fixture {
        fn new() -> Self {
            init_log();
            Self {
                mbox: Mailbox::new(),
                flags: IsrFlags::new(),
                radio: MockRadio::new(),
                timer: MockTimer::new(),
            }
        }

        fn mac<const Q: usize>(&self) -> DutyMac<'_, MockRadio, MockTimer, MockRng, Q, 16> {
            DutyMac::new(
                self.radio.clone(),
                self.timer.clone(),
                MockRng::new(0x1234_5678),
                &self.mbox,
                &self.flags,
                Config::default(),
            )
            .unwrap()
        }

        fn hook(&self) -> RadioHook<'_, 16> {
            RadioHook::new(&self.mbox, &self.flags)
        }

        fn sends(&self) -> Vec<MockOp> {
            self.radio
                .ops()
                .into_iter()
                .filter(|op| {
                    matches!(op, MockOp::Send(_) | MockOp::Resend(_) | MockOp::Beacon)
                })
                .collect()
        }
    }

    #[test]
    fn invalid_interval_ladder_rejected() {
        let f = Fixture::new();
        let mut config = Config::default();
        config.sleep_interval_max = config.sleep_interval_min * 3;

        let res: Result<DutyMac<_, _, _, 4, 16>, _> = DutyMac::new(
            f.radio.clone(),
            f.timer.clone(),
            MockRng::new(1),
            &f.mbox,
            &f.flags,
            config,
        );
        assert_eq!(res.err(), Some(CoreError::InvalidConfig));
    }

    #[test]
    fn cold_start_idle_node() {
        let f = Fixture::new();
        let mut mac = f.mac::<4>();

        // Enable duty cycling: radio parked, short addressing, random wake
        mac.set_option(NetOpt::DutyCycling(true)).unwrap();
        assert_eq!(mac.state(), DutyState::Sleep);

        let ops = f.radio.take_ops();
        assert!(ops.contains(&MockOp::SetState(RadioState::Sleep)));
        assert!(ops.contains(&MockOp::SetOption(NetOpt::SrcAddrLen(2))));

        let first = f.timer.armed().unwrap();
        assert!(first < mac.config.sleep_interval_max);

        // Wake with an empty queue: beacon cycle
        f.mbox.post(Msg::Timer).unwrap();
        mac.poll().unwrap();
        assert_eq!(mac.state(), DutyState::TxBeacon);
        assert_eq!(f.sends(), std::vec![MockOp::Beacon]);

        // Nothing pending at the parent: sleep again, interval doubled
        f.hook().on_event(RadioEvent::TxComplete);
        mac.poll().unwrap();

        assert_eq!(mac.state(), DutyState::Sleep);
        assert_eq!(mac.interval.shift(), 1);
        assert_eq!(f.timer.armed(), Some(mac.config.sleep_interval_min << 1));
        assert_eq!(mac.stats().tx_success, 1);
    }

    #[test]
    fn send_before_enable_passes_through() {
        let f = Fixture::new();
        let mut mac = f.mac::<4>();

        // Frame sent while duty cycling is off: immediate transmission
        mac.send(frame(1)).unwrap();
        mac.poll().unwrap();
        assert_eq!(mac.state(), DutyState::Init);
        assert_eq!(f.sends(), std::vec![MockOp::Send(1)]);

        // Completion pops the head; the governor is untouched
        f.hook().on_event(RadioEvent::TxComplete);
        mac.poll().unwrap();

        assert_eq!(mac.state(), DutyState::Init);
        assert!(mac.queue.is_empty());
        assert_eq!(mac.interval.shift(), 0);
        assert!(f.timer.history().is_empty());
    }

    #[test]
    fn beacon_answered_with_pending_data_listens() {
        let f = Fixture::new();
        let mut mac = f.mac::<4>();

        mac.set_option(NetOpt::DutyCycling(true)).unwrap();
        mac.interval.backoff();
        f.mbox.post(Msg::Timer).unwrap();
        mac.poll().unwrap();
        assert_eq!(f.sends(), std::vec![MockOp::Beacon]);

        // Parent holds data for us: reset interval, idle listen
        f.hook().on_event(RadioEvent::TxCompletePending);
        mac.poll().unwrap();

        assert_eq!(mac.state(), DutyState::Listen);
        assert_eq!(mac.interval.shift(), 0);
        assert_eq!(f.timer.armed(), Some(mac.config.wakeup_interval));
        assert_eq!(
            f.radio.ops().last(),
            Some(&MockOp::SetState(RadioState::Idle))
        );
    }

    #[test]
    fn rx_with_pending_bit_extends_listen() {
        let f = Fixture::new();
        let mut mac = f.mac::<4>();

        // Into the listen window
        mac.set_option(NetOpt::DutyCycling(true)).unwrap();
        f.mbox.post(Msg::Timer).unwrap();
        mac.poll().unwrap();
        f.hook().on_event(RadioEvent::TxCompletePending);
        mac.poll().unwrap();
        assert_eq!(mac.state(), DutyState::Listen);

        // Reception with the frame-pending bit observed mid-frame
        f.hook().on_event(RadioEvent::RxPending);
        f.radio.inject_rx(frame(9));
        f.hook().on_event(RadioEvent::RxComplete);
        mac.poll().unwrap();

        // Still listening, window re-extended, frame delivered upward
        assert_eq!(mac.state(), DutyState::Listen);
        assert_eq!(f.timer.armed(), Some(mac.config.wakeup_interval));
        assert_eq!(mac.receive(), Some(frame(9)));
        assert_eq!(mac.receive(), None);

        // Listen window expires with nothing queued: back to sleep
        f.mbox.post(Msg::Timer).unwrap();
        mac.poll().unwrap();
        assert_eq!(mac.state(), DutyState::Sleep);
        assert_eq!(f.timer.armed(), Some(mac.config.sleep_interval_min));
    }

    #[test]
    fn queue_overflow_drops_fifth_send() {
        let f = Fixture::new();
        let mut mac = f.mac::<4>();

        mac.set_option(NetOpt::DutyCycling(true)).unwrap();

        // First frame goes straight out and stays at the head in flight
        mac.send(frame(0)).unwrap();
        mac.poll().unwrap();
        assert_eq!(mac.state(), DutyState::TxData);
        assert_eq!(f.sends(), std::vec![MockOp::Send(0)]);

        // Radio busy: the rest queue up behind it
        for seq in 1..4 {
            mac.send(frame(seq)).unwrap();
        }
        assert_eq!(mac.queue.len(), 4);

        // Queue full: the fifth send fails observably
        match mac.send(frame(4)) {
            Err(CoreError::QueueFull(rejected)) => assert_eq!(rejected.header.seq, 4),
            other => panic!("expected queue overflow, got {:?}", other),
        }
        assert_eq!(mac.stats().queue_drops, 1);

        // Drain: each completion pops the head and sends the next
        for _ in 0..4 {
            f.hook().on_event(RadioEvent::TxComplete);
            mac.poll().unwrap();
        }

        let sends = f.sends();
        assert_eq!(
            sends,
            std::vec![
                MockOp::Send(0),
                MockOp::Send(1),
                MockOp::Send(2),
                MockOp::Send(3)
            ]
        );

        // Last completion found the queue empty in TxData: radio off
        assert_eq!(mac.state(), DutyState::Sleep);
        assert!(mac.queue.is_empty());
        assert_eq!(
            f.radio.ops().last(),
            Some(&MockOp::SetState(RadioState::Sleep))
        );
    }

    #[test]
    fn retry_exhaustion_pops_head_and_sleeps() {
        let f = Fixture::new();
        let mut mac = f.mac::<4>();

        mac.set_option(NetOpt::DutyCycling(true)).unwrap();
        mac.send(frame(7)).unwrap();
        mac.poll().unwrap();
        assert_eq!(mac.state(), DutyState::TxData);

        // Budget of 3 retransmissions, all unacknowledged
        for _ in 0..4 {
            f.hook().on_event(RadioEvent::TxNoAck);
            mac.poll().unwrap();
        }

        assert_eq!(
            f.sends(),
            std::vec![
                MockOp::Send(7),
                MockOp::Resend(7),
                MockOp::Resend(7),
                MockOp::Resend(7)
            ]
        );

        // Head dropped, queue empty, radio off; governor not reset
        assert!(mac.queue.is_empty());
        assert_eq!(mac.state(), DutyState::Sleep);
        assert_eq!(mac.stats().tx_failed, 1);
        assert_eq!(mac.interval.shift(), 0);
    }

    #[test]
    fn retry_exhaustion_attempts_next_head() {
        let f = Fixture::new();
        let mut mac = f.mac::<4>();

        mac.set_option(NetOpt::DutyCycling(true)).unwrap();
        mac.send(frame(1)).unwrap();
        mac.poll().unwrap();
        mac.send(frame(2)).unwrap();
        assert_eq!(mac.queue.len(), 2);

        for _ in 0..4 {
            f.hook().on_event(RadioEvent::TxNoAck);
            mac.poll().unwrap();
        }

        // First head abandoned, second attempted fresh
        assert_eq!(mac.queue.len(), 1);
        assert_eq!(mac.state(), DutyState::TxData);
        assert_eq!(f.sends().last(), Some(&MockOp::Send(2)));
    }

    #[test]
    fn driver_refusal_feeds_csma_path() {
        let f = Fixture::new();
        let mut mac = f.mac::<4>();

        mac.set_option(NetOpt::DutyCycling(true)).unwrap();
        f.radio.fail_sends(true);
        mac.send(frame(3)).unwrap();
        mac.poll().unwrap();

        // Every attempt refused: (csma budget + 1) attempts per round,
        // (retry budget + 1) rounds, then the head is shed
        assert_eq!(f.sends().len(), 20);
        assert!(mac.queue.is_empty());
        assert_eq!(mac.state(), DutyState::Sleep);
        assert_eq!(mac.stats().tx_failed, 1);
    }

    #[test]
    fn beacon_deferred_while_receiving_sent_once_after_irq() {
        let f = Fixture::new();
        let mut mac = f.mac::<4>();

        mac.set_option(NetOpt::DutyCycling(true)).unwrap();

        // Reception in progress when the beacon is wanted
        f.radio.set_radio_state(RadioState::Rx);
        f.mbox.post(Msg::Timer).unwrap();
        mac.poll().unwrap();

        assert_eq!(mac.state(), DutyState::TxBeacon);
        assert!(mac.beacon_pending);
        assert!(f.sends().is_empty());

        // Interrupt serviced with the radio free again: beacon drains once
        f.hook().on_event(RadioEvent::Isr);
        f.radio.set_radio_state(RadioState::Idle);
        mac.poll().unwrap();

        assert!(!mac.beacon_pending);
        assert_eq!(f.sends(), std::vec![MockOp::Beacon]);
    }

    #[test]
    fn send_during_sleep_transmits_immediately() {
        let f = Fixture::new();
        let mut mac = f.mac::<4>();

        mac.set_option(NetOpt::DutyCycling(true)).unwrap();
        mac.send(frame(5)).unwrap();
        mac.poll().unwrap();

        assert_eq!(mac.state(), DutyState::TxData);
        assert_eq!(f.sends(), std::vec![MockOp::Send(5)]);

        // Completion drains the queue: radio back off, the wake timer
        // armed at enable still counting towards the next beacon
        f.hook().on_event(RadioEvent::TxComplete);
        mac.poll().unwrap();
        assert_eq!(mac.state(), DutyState::Sleep);
    }

    #[test]
    fn wake_with_queued_data_sends_before_beacon() {
        let f = Fixture::new();
        let mut mac = f.mac::<4>();

        mac.set_option(NetOpt::DutyCycling(true)).unwrap();

        // Queue two frames while the radio is busy with the first
        mac.send(frame(1)).unwrap();
        mac.poll().unwrap();
        mac.send(frame(2)).unwrap();

        // Wake mid-drain: data continues ahead of the beacon
        f.mbox.post(Msg::Timer).unwrap();
        mac.poll().unwrap();
        assert_eq!(mac.state(), DutyState::TxDataBeforeBeacon);

        f.hook().on_event(RadioEvent::TxComplete);
        mac.poll().unwrap();
        assert_eq!(f.sends().last(), Some(&MockOp::Send(2)));

        // Final completion drains the queue and the beacon follows
        f.hook().on_event(RadioEvent::TxComplete);
        mac.poll().unwrap();

        assert_eq!(mac.state(), DutyState::TxBeacon);
        assert_eq!(f.sends().last(), Some(&MockOp::Beacon));
        assert!(mac.queue.is_empty());
    }

    #[test]
    fn toggle_roundtrip_returns_to_sleep_with_min_interval() {
        let f = Fixture::new();
        let mut mac = f.mac::<4>();

        mac.set_option(NetOpt::DutyCycling(true)).unwrap();
        mac.interval.backoff();
        mac.interval.backoff();
        assert_eq!(mac.interval.shift(), 2);

        mac.set_option(NetOpt::DutyCycling(false)).unwrap();
        assert_eq!(mac.state(), DutyState::Init);
        assert_eq!(mac.interval.shift(), 0);
        assert_eq!(f.timer.armed(), None);
        assert_eq!(
            mac.get_option(NetOptKind::DutyCycling).unwrap(),
            NetOpt::DutyCycling(false)
        );

        mac.set_option(NetOpt::DutyCycling(true)).unwrap();
        assert_eq!(mac.state(), DutyState::Sleep);
        assert_eq!(mac.interval.shift(), 0);
        assert!(f.timer.armed().is_some());
    }

    #[test]
    fn check_queue_on_empty_queue_is_noop() {
        let f = Fixture::new();
        let mut mac = f.mac::<4>();

        mac.set_option(NetOpt::DutyCycling(true)).unwrap();
        let before = f.radio.ops();
        let state = mac.state();

        f.mbox.post(Msg::CheckQueue).unwrap();
        f.mbox.post(Msg::CheckQueue).unwrap();
        mac.poll().unwrap();

        assert_eq!(f.radio.ops(), before);
        assert_eq!(mac.state(), state);
    }

    #[test]
    fn options_pass_through_to_driver() {
        let f = Fixture::new();
        let mut mac = f.mac::<4>();

        mac.set_option(NetOpt::Channel(15)).unwrap();
        assert!(f
            .radio
            .ops()
            .contains(&MockOp::SetOption(NetOpt::Channel(15))));

        f.radio.set_get_response(NetOpt::Channel(15));
        assert_eq!(
            mac.get_option(NetOptKind::Channel).unwrap(),
            NetOpt::Channel(15)
        );
    }

    #[test]
    fn rx_while_disabled_stays_inert() {
        let f = Fixture::new();
        let mut mac = f.mac::<4>();

        f.radio.inject_rx(frame(3));
        f.hook().on_event(RadioEvent::RxComplete);
        mac.poll().unwrap();

        // Frame delivered, no duty-cycle transitions while disabled
        assert_eq!(mac.state(), DutyState::Init);
        assert_eq!(mac.receive(), Some(frame(3)));
        assert!(f.timer.history().is_empty());
    }
}

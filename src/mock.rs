//! Test doubles for the radio driver seam.

use std::sync::{Arc, Mutex};
use std::vec::Vec;

use rand_core::{Error, RngCore};

use crate::packet::Packet;
use crate::{NetOpt, NetOptKind, RadioDriver, RadioState};

/// Operations recorded by [`MockRadio`]. Send variants carry the frame
/// sequence number for compact assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum MockOp {
    Init,
    SetState(RadioState),
    SetOption(NetOpt),
    Isr,
    Send(u8),
    Resend(u8),
    Beacon,
}

/// Error returned by a scripted driver refusal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockRadioError;

#[derive(Debug)]
struct Inner {
    ops: Vec<MockOp>,
    state: RadioState,
    rx: Option<Packet>,
    fail_sends: bool,
    get_response: Option<NetOpt>,
}

/// Radio driver double recording every call, with scriptable state,
/// send results and received frames.
#[derive(Clone, Debug)]
pub struct MockRadio(Arc<Mutex<Inner>>);

impl MockRadio {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Inner {
            ops: Vec::new(),
            state: RadioState::Idle,
            rx: None,
            fail_sends: false,
            get_response: None,
        })))
    }

    /// All recorded operations, oldest first.
    pub fn ops(&self) -> Vec<MockOp> {
        self.0.lock().unwrap().ops.clone()
    }

    /// Drain the recorded operations.
    pub fn take_ops(&self) -> Vec<MockOp> {
        core::mem::take(&mut self.0.lock().unwrap().ops)
    }

    /// Script the state reported to the MAC, e.g. a reception in progress.
    pub fn set_radio_state(&self, state: RadioState) {
        self.0.lock().unwrap().state = state;
    }

    /// Make `send`/`resend`/`send_beacon` return an error.
    pub fn fail_sends(&self, fail: bool) {
        self.0.lock().unwrap().fail_sends = fail;
    }

    /// Park a frame for the next `recv` call.
    pub fn inject_rx(&self, frame: Packet) {
        self.0.lock().unwrap().rx = Some(frame);
    }

    /// Script the answer for `get_option`.
    pub fn set_get_response(&self, opt: NetOpt) {
        self.0.lock().unwrap().get_response = Some(opt);
    }

    fn send_result(&self, op: MockOp) -> Result<(), MockRadioError> {
        let mut inner = self.0.lock().unwrap();
        inner.ops.push(op);
        if inner.fail_sends {
            Err(MockRadioError)
        } else {
            Ok(())
        }
    }
}

impl RadioDriver for MockRadio {
    type Error = MockRadioError;

    fn init(&mut self) -> Result<(), Self::Error> {
        self.0.lock().unwrap().ops.push(MockOp::Init);
        Ok(())
    }

    fn state(&mut self) -> Result<RadioState, Self::Error> {
        Ok(self.0.lock().unwrap().state)
    }

    fn set_state(&mut self, state: RadioState) -> Result<(), Self::Error> {
        let mut inner = self.0.lock().unwrap();
        inner.ops.push(MockOp::SetState(state));
        inner.state = state;
        Ok(())
    }

    fn set_option(&mut self, opt: &NetOpt) -> Result<(), Self::Error> {
        self.0.lock().unwrap().ops.push(MockOp::SetOption(*opt));
        Ok(())
    }

    fn get_option(&mut self, _kind: NetOptKind) -> Result<NetOpt, Self::Error> {
        self.0.lock().unwrap().get_response.ok_or(MockRadioError)
    }

    fn isr(&mut self) {
        self.0.lock().unwrap().ops.push(MockOp::Isr);
    }

    fn send(&mut self, frame: &Packet) -> Result<(), Self::Error> {
        self.send_result(MockOp::Send(frame.header.seq))
    }

    fn resend(&mut self, frame: &Packet) -> Result<(), Self::Error> {
        self.send_result(MockOp::Resend(frame.header.seq))
    }

    fn send_beacon(&mut self) -> Result<(), Self::Error> {
        self.send_result(MockOp::Beacon)
    }

    fn recv(&mut self) -> Option<Packet> {
        self.0.lock().unwrap().rx.take()
    }
}

/// Deterministic xorshift RNG for tests.
pub struct MockRng(u32);

impl MockRng {
    pub fn new(seed: u32) -> Self {
        Self(if seed == 0 { 1 } else { seed })
    }
}

impl RngCore for MockRng {
    fn next_u32(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        x
    }

    fn next_u64(&mut self) -> u64 {
        ((self.next_u32() as u64) << 32) | self.next_u32() as u64
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.next_u32().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

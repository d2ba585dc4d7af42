

/// One-shot duty-cycle timer seam.
///
/// The platform implementation owns a single hardware or software timer.
/// On expiry it must post [`Msg::Timer`](crate::duty::mailbox::Msg) to the
/// mailbox the MAC was built over; all state transitions then happen on
/// the worker. The callback itself must do nothing else.
pub trait Timer {
    /// Arm (or rearm) the timer `duration_us` microseconds out, replacing
    /// any armed deadline.
    fn arm(&mut self, duration_us: u32);

    /// Cancel any armed deadline. Idempotent.
    fn cancel(&mut self);
}

#[cfg(any(test, feature = "mocks"))]
pub mod mock {
    use std::sync::{Arc, Mutex};
    use std::vec::Vec;

    #[derive(Debug)]
    struct Inner {
        armed: Option<u32>,
        history: Vec<u32>,
        cancels: u32,
    }

    /// Timer double recording arm/cancel calls.
    #[derive(Clone, Debug)]
    pub struct MockTimer(Arc<Mutex<Inner>>);

    impl MockTimer {
        pub fn new() -> Self {
            Self(Arc::new(Mutex::new(Inner {
                armed: None,
                history: Vec::new(),
                cancels: 0,
            })))
        }

        /// Currently armed duration, if any.
        pub fn armed(&self) -> Option<u32> {
            self.0.lock().unwrap().armed
        }

        /// Every duration ever armed, oldest first.
        pub fn history(&self) -> Vec<u32> {
            self.0.lock().unwrap().history.clone()
        }

        /// Number of cancel calls observed.
        pub fn cancels(&self) -> u32 {
            self.0.lock().unwrap().cancels
        }
    }

    impl super::Timer for MockTimer {
        fn arm(&mut self, duration_us: u32) {
            let mut inner = self.0.lock().unwrap();
            inner.armed = Some(duration_us);
            inner.history.push(duration_us);
        }

        fn cancel(&mut self) {
            let mut inner = self.0.lock().unwrap();
            inner.armed = None;
            inner.cancels += 1;
        }
    }
}

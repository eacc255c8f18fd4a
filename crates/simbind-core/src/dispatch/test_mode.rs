// Simbind Test Mode
// Cycles a test frame through the active outputs to check the wiring

use std::time::Instant;

use super::{Dispatcher, EngineNotice, EngineState, DispatchError};
use crate::output::SinkError;

/// Progress of a running test mode
#[derive(Debug, Clone)]
pub(super) struct TestModeRun {
    entered_from: EngineState,
    /// Output index to light next
    next: usize,
    /// Output currently showing the test frame
    lit: Option<usize>,
    due: Option<Instant>,
}

impl TestModeRun {
    fn new(entered_from: EngineState) -> Self {
        Self {
            entered_from,
            next: 0,
            lit: None,
            due: None,
        }
    }
}

impl Dispatcher {
    /// Enter test mode. Needs the device link; the simulator is not used.
    pub fn start_test_mode(&mut self) -> Result<(), DispatchError> {
        if self.state == EngineState::TestMode {
            return Ok(());
        }
        if !self.device_link.is_connected() {
            return Err(DispatchError::DeviceLinkDown);
        }
        self.test_mode = Some(TestModeRun::new(self.state));
        self.transition(EngineState::TestMode);
        Ok(())
    }

    /// Leave test mode, blanking the output it was showing
    pub fn stop_test_mode(&mut self) -> Result<(), DispatchError> {
        if self.state != EngineState::TestMode {
            return Err(DispatchError::NotInTestMode);
        }
        self.exit_test_mode();
        Ok(())
    }

    pub(super) fn exit_test_mode(&mut self) {
        let Some(run) = self.test_mode.take() else {
            return;
        };
        if let Some(binding) = run.lit.and_then(|i| self.output_bindings.get(i)) {
            let blank = binding.config.blank_frame();
            if let Err(e) = binding.config.display.send(&blank, self.outputs.as_mut()) {
                log::debug!("Could not blank '{}': {}", binding.description, e);
            }
        }
        // outputs are resent from scratch afterwards
        self.display_cache.clear();

        let target = match run.entered_from {
            EngineState::Armed if self.links_up() => EngineState::Armed,
            EngineState::Idle => EngineState::Idle,
            _ => EngineState::Stopped,
        };
        self.transition(target);
    }

    /// Blank the previous output and light the next one when the interval
    /// has elapsed
    pub(super) fn advance_test_mode(&mut self, now: Instant) {
        let interval = self.settings.test_mode_interval;
        let count = self.output_bindings.len();
        let Some(run) = self.test_mode.as_mut() else {
            return;
        };
        if run.due.is_some_and(|due| now < due) {
            return;
        }
        run.due = Some(now + interval);
        if count == 0 {
            return;
        }

        let previous = run.lit.take();
        let current = run.next % count;
        run.next = current + 1;
        run.lit = Some(current);

        if let Some(previous) = previous.filter(|&p| p != current) {
            if let Err(e) = self.send_test(previous, false) {
                self.fail_test_mode(previous, e);
                return;
            }
        }
        if let Err(e) = self.send_test(current, true) {
            self.fail_test_mode(current, e);
        }
    }

    fn send_test(&mut self, index: usize, lit: bool) -> Result<(), SinkError> {
        let Some(binding) = self.output_bindings.get(index) else {
            return Ok(());
        };
        let frame = if lit {
            binding.config.test_frame()
        } else {
            binding.config.blank_frame()
        };
        log::debug!(
            "Test mode: '{}' {}",
            binding.description,
            if lit { "on" } else { "off" }
        );
        binding.config.display.send(&frame, self.outputs.as_mut())
    }

    fn fail_test_mode(&mut self, index: usize, error: SinkError) {
        let Some(binding) = self.output_bindings.get(index) else {
            return;
        };
        let id = binding.id;
        log::error!("Test mode stopped on '{}': {}", binding.description, error);
        self.notices.publish(EngineNotice::TestModeFailed {
            id,
            reason: error.to_string(),
        });
        if let Some(run) = self.test_mode.as_mut() {
            // the failing output is not showing anything to blank
            run.lit = None;
        }
        self.exit_test_mode();
    }
}

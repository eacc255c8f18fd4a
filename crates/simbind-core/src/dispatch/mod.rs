// Simbind Execution Dispatcher
// Engine state machine: routes device events to bindings and refreshes outputs

mod batch;
mod notice;
mod runner;
mod test_mode;

pub use batch::{batch_config, EventBatch};
pub use notice::{EngineNotice, NoticeBus};
pub use runner::EngineInput;

use std::collections::HashMap;
use std::fmt;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::time::{Duration, Instant};

use smallvec::SmallVec;
use strum_macros::Display;

use crate::action::{ActionContext, ActionError, EventCatalog};
use crate::binding::{InputBinding, InputTrigger, OutputBinding, Slot};
use crate::document::{BindingId, Document};
use crate::output::{DisplayCache, OutputSink};
use crate::sim::{ConnectionStatus, SimulatorState};
use crate::synth::KeySink;
use crate::DeviceEvent;

use test_mode::TestModeRun;

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum EngineState {
    Idle,
    Armed,
    TestMode,
    Stopped,
}

/// Runtime knobs, taken from `Settings` and changed through `reconfigure`
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchSettings {
    /// Treat Repeat edges as additional presses
    pub auto_repeat: bool,
    pub poll_interval: Duration,
    pub test_mode_interval: Duration,
    pub events: EventCatalog,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            auto_repeat: false,
            poll_interval: Duration::from_millis(50),
            test_mode_interval: Duration::from_millis(500),
            events: EventCatalog::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("Cannot arm: device or simulator link is not connected")]
    NotConnected,

    #[error("Device link is not connected")]
    DeviceLinkDown,

    #[error("Test mode is not running")]
    NotInTestMode,
}

/// Why an event was not dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    NotArmed(EngineState),
    DeviceLinkDown,
    SimulatorLinkDown,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::NotArmed(state) => write!(f, "engine is {}", state),
            DropReason::DeviceLinkDown => write!(f, "device link down"),
            DropReason::SimulatorLinkDown => write!(f, "simulator link down"),
        }
    }
}

/// Counts for one dispatched event
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Bindings listening on the event's pin
    pub matched: usize,
    pub executed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Dropped(DropReason),
    Handled(DispatchSummary),
}

/// A slot cleared at bind time
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Input {id} {slot} disabled: {error}")]
pub struct BindWarning {
    pub id: BindingId,
    pub slot: Slot,
    pub error: ActionError,
}

/// The execution engine
pub struct Dispatcher {
    sim: Arc<dyn SimulatorState>,
    keys: Box<dyn KeySink>,
    outputs: Box<dyn OutputSink>,
    settings: DispatchSettings,
    state: EngineState,
    device_link: ConnectionStatus,
    sim_link: ConnectionStatus,
    /// Bound document, kept so a reconfigure can rebind
    document: Document,
    inputs: Vec<InputBinding>,
    index: HashMap<InputTrigger, SmallVec<[usize; 4]>>,
    output_bindings: Vec<OutputBinding>,
    display_cache: DisplayCache,
    test_mode: Option<TestModeRun>,
    notices: NoticeBus,
}

impl Dispatcher {
    pub fn new(
        sim: Arc<dyn SimulatorState>,
        keys: Box<dyn KeySink>,
        outputs: Box<dyn OutputSink>,
        settings: DispatchSettings,
    ) -> Self {
        let sim_link = sim.status();
        Self {
            sim,
            keys,
            outputs,
            settings,
            state: EngineState::Idle,
            device_link: ConnectionStatus::Closed,
            sim_link,
            document: Document::new(),
            inputs: Vec::new(),
            index: HashMap::new(),
            output_bindings: Vec::new(),
            display_cache: DisplayCache::new(),
            test_mode: None,
            notices: NoticeBus::new(),
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub fn device_link(&self) -> ConnectionStatus {
        self.device_link
    }

    pub fn simulator_link(&self) -> ConnectionStatus {
        self.sim_link
    }

    /// Number of active input bindings
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Number of active output bindings
    pub fn output_count(&self) -> usize {
        self.output_bindings.len()
    }

    /// Last value sent to an output
    pub fn last_output_value(&self, id: &BindingId) -> Option<&str> {
        self.display_cache.get(id)
    }

    pub fn subscribe(&mut self) -> Receiver<EngineNotice> {
        self.notices.subscribe()
    }

    /// Take the bindings of `document`. Inactive bindings are skipped and
    /// slots naming unknown events are cleared.
    pub fn bind(&mut self, document: &Document) -> Vec<BindWarning> {
        self.document = document.clone();
        self.rebind()
    }

    fn rebind(&mut self) -> Vec<BindWarning> {
        let mut warnings = Vec::new();
        self.inputs.clear();
        self.index.clear();

        for binding in self.document.inputs().filter(|b| b.is_runnable()) {
            let mut binding = binding.clone();
            for (slot, error) in binding.button.validate(&self.settings.events) {
                let warning = BindWarning {
                    id: binding.id,
                    slot,
                    error,
                };
                log::warn!("{}", warning);
                warnings.push(warning);
            }
            self.index
                .entry(binding.trigger.clone())
                .or_default()
                .push(self.inputs.len());
            self.inputs.push(binding);
        }

        self.output_bindings = self
            .document
            .outputs()
            .filter(|b| b.is_runnable())
            .cloned()
            .collect();
        self.display_cache.clear();

        log::info!(
            "Bound {} inputs and {} outputs",
            self.inputs.len(),
            self.output_bindings.len()
        );
        warnings
    }

    /// Replace runtime settings; bindings are revalidated against the new
    /// event catalog
    pub fn reconfigure(&mut self, settings: DispatchSettings) -> Vec<BindWarning> {
        log::info!(
            "Reconfigured: auto_repeat={} poll={:?} test_interval={:?}",
            settings.auto_repeat,
            settings.poll_interval,
            settings.test_mode_interval
        );
        self.settings = settings;
        self.rebind()
    }

    /// Record the device link status. Takes effect at the next tick.
    pub fn notify_devices(&mut self, status: ConnectionStatus) {
        log::debug!("Device link {}", status);
        self.device_link = status;
    }

    /// Record the simulator link status. Takes effect at the next tick.
    pub fn notify_simulator(&mut self, status: ConnectionStatus) {
        log::debug!("Simulator link {}", status);
        self.sim_link = status;
    }

    fn links_up(&self) -> bool {
        self.device_link.is_connected() && self.sim_link.is_connected() && self.sim.is_connected()
    }

    fn drop_reason(&self) -> Option<DropReason> {
        if self.state != EngineState::Armed {
            return Some(DropReason::NotArmed(self.state));
        }
        if !self.device_link.is_connected() {
            return Some(DropReason::DeviceLinkDown);
        }
        if !self.sim_link.is_connected() || !self.sim.is_connected() {
            return Some(DropReason::SimulatorLinkDown);
        }
        None
    }

    fn transition(&mut self, to: EngineState) {
        let from = self.state;
        if from == to {
            return;
        }
        log::info!("Engine {} -> {}", from, to);
        self.state = to;
        if to == EngineState::Stopped {
            self.display_cache.clear();
        }
        self.notices.publish(EngineNotice::StateChanged { from, to });
    }

    /// Arm the engine. Leaves test mode first when it is running.
    pub fn start(&mut self) -> Result<(), DispatchError> {
        if self.state == EngineState::TestMode {
            self.exit_test_mode();
        }
        if !self.links_up() {
            return Err(DispatchError::NotConnected);
        }
        self.transition(EngineState::Armed);
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.state == EngineState::TestMode {
            self.exit_test_mode();
        }
        self.transition(EngineState::Stopped);
    }

    /// Run the bindings listening on the event's pin, in document order
    pub fn dispatch(&mut self, event: &DeviceEvent) -> DispatchOutcome {
        if let Some(reason) = self.drop_reason() {
            log::debug!(
                "Dropped {} {}@{}: {}",
                event.transition,
                event.pin_id,
                event.module_serial,
                reason
            );
            return DispatchOutcome::Dropped(reason);
        }

        let trigger = InputTrigger::new(event.module_serial.as_str(), event.pin_id);
        let Some(indices) = self.index.get(&trigger) else {
            return DispatchOutcome::Handled(DispatchSummary::default());
        };

        let snapshot = self.sim.snapshot();
        let mut summary = DispatchSummary {
            matched: indices.len(),
            ..DispatchSummary::default()
        };
        let mut ctx = ActionContext {
            sim: self.sim.as_ref(),
            snapshot: &snapshot,
            keys: self.keys.as_mut(),
            catalog: &self.settings.events,
        };

        for &i in indices {
            let binding = &self.inputs[i];
            match binding
                .button
                .dispatch(event.transition, self.settings.auto_repeat, &mut ctx)
            {
                None => {}
                Some((slot, Ok(()))) => {
                    log::debug!("Executed {} {} of '{}'", binding.id, slot, binding.description);
                    summary.executed += 1;
                    self.notices.publish(EngineNotice::ActionExecuted {
                        id: binding.id,
                        slot,
                    });
                }
                Some((slot, Err(error))) => {
                    log::warn!(
                        "Action {} of '{}' failed: {}",
                        slot,
                        binding.description,
                        error
                    );
                    summary.failed += 1;
                    self.notices.publish(EngineNotice::ActionFailed {
                        id: binding.id,
                        slot,
                        error,
                    });
                }
            }
        }

        DispatchOutcome::Handled(summary)
    }

    /// Health check, then output refresh (Armed) or test-mode step
    pub fn tick(&mut self, now: Instant) {
        self.health_check();
        match self.state {
            EngineState::Armed => self.refresh_outputs(),
            EngineState::TestMode => self.advance_test_mode(now),
            EngineState::Idle | EngineState::Stopped => {}
        }
    }

    fn health_check(&mut self) {
        let state = self.state;
        match state {
            EngineState::Idle if self.links_up() => self.transition(EngineState::Armed),
            EngineState::Armed if !self.links_up() => {
                log::warn!(
                    "Link lost (devices {}, simulator {})",
                    self.device_link,
                    self.sim.status()
                );
                self.transition(EngineState::Stopped);
            }
            EngineState::TestMode if !self.device_link.is_connected() => {
                log::warn!("Device link lost during test mode");
                self.exit_test_mode();
            }
            _ => {}
        }
    }

    /// Evaluate every output on one snapshot and send changed values
    fn refresh_outputs(&mut self) {
        let snapshot = self.sim.snapshot();
        for binding in &self.output_bindings {
            let value = match binding.config.evaluate(&snapshot) {
                Ok(value) => value,
                Err(e) => {
                    log::warn!("Output '{}' read failed: {}", binding.description, e);
                    self.notices.publish(EngineNotice::OutputFailed {
                        id: binding.id,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            if !self.display_cache.is_changed(&binding.id, &value) {
                continue;
            }

            let frame = binding.config.frame(&value);
            match binding.config.display.send(&frame, self.outputs.as_mut()) {
                Ok(()) => {
                    self.display_cache.record(binding.id, value.clone());
                    self.notices.publish(EngineNotice::OutputChanged {
                        id: binding.id,
                        value,
                    });
                }
                Err(e) => {
                    log::warn!("Output '{}' send failed: {}", binding.description, e);
                    self.notices.publish(EngineNotice::OutputFailed {
                        id: binding.id,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::RecordingOutputSink;
    use crate::sim::OffsetCache;
    use crate::synth::RecordingKeySink;

    fn dispatcher(sim: Arc<OffsetCache>) -> Dispatcher {
        Dispatcher::new(
            sim,
            Box::new(RecordingKeySink::new()),
            Box::new(RecordingOutputSink::new()),
            DispatchSettings::default(),
        )
    }

    #[test]
    fn test_idle_arms_on_tick_once_links_up() {
        let sim = Arc::new(OffsetCache::connected());
        let mut engine = dispatcher(sim);
        engine.tick(Instant::now());
        assert_eq!(engine.state(), EngineState::Idle);

        engine.notify_devices(ConnectionStatus::Connected);
        assert_eq!(engine.state(), EngineState::Idle);
        engine.tick(Instant::now());
        assert_eq!(engine.state(), EngineState::Armed);
    }

    #[test]
    fn test_link_loss_stops_at_next_tick() {
        let sim = Arc::new(OffsetCache::connected());
        let mut engine = dispatcher(sim);
        engine.notify_devices(ConnectionStatus::Connected);
        engine.start().unwrap();

        engine.notify_simulator(ConnectionStatus::Lost);
        assert_eq!(engine.state(), EngineState::Armed);
        engine.tick(Instant::now());
        assert_eq!(engine.state(), EngineState::Stopped);

        // restored links do not re-arm by themselves
        engine.notify_simulator(ConnectionStatus::Connected);
        engine.tick(Instant::now());
        assert_eq!(engine.state(), EngineState::Stopped);
        engine.start().unwrap();
        assert_eq!(engine.state(), EngineState::Armed);
    }

    #[test]
    fn test_start_requires_links() {
        let sim = Arc::new(OffsetCache::connected());
        let mut engine = dispatcher(sim);
        assert_eq!(engine.start(), Err(DispatchError::NotConnected));
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn test_dispatch_dropped_when_not_armed() {
        let sim = Arc::new(OffsetCache::connected());
        let mut engine = dispatcher(sim);
        let event = DeviceEvent::new("ABC123", 3, crate::Transition::Press);
        assert_eq!(
            engine.dispatch(&event),
            DispatchOutcome::Dropped(DropReason::NotArmed(EngineState::Idle))
        );
    }

    #[test]
    fn test_state_notices() {
        let sim = Arc::new(OffsetCache::connected());
        let mut engine = dispatcher(sim);
        let rx = engine.subscribe();
        engine.notify_devices(ConnectionStatus::Connected);
        engine.start().unwrap();
        engine.stop();
        let notices: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            notices,
            vec![
                EngineNotice::StateChanged {
                    from: EngineState::Idle,
                    to: EngineState::Armed
                },
                EngineNotice::StateChanged {
                    from: EngineState::Armed,
                    to: EngineState::Stopped
                },
            ]
        );
    }
}

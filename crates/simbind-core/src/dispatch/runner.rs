// Simbind Engine Runner
// Single-threaded engine loop fed by one input channel

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Instant;

use super::{batch_config, DispatchError, DispatchOutcome, DispatchSettings, Dispatcher, EventBatch};
use crate::document::Document;
use crate::sim::ConnectionStatus;
use crate::DeviceEvent;

/// Everything that can reach the engine, serialized through one channel
#[derive(Debug, Clone)]
pub enum EngineInput {
    Device(DeviceEvent),
    DeviceLink(ConnectionStatus),
    SimulatorLink(ConnectionStatus),
    Start,
    Stop,
    StartTestMode,
    StopTestMode,
    Reconfigure(DispatchSettings),
    Bind(Box<Document>),
}

impl Dispatcher {
    /// Apply one input
    pub fn handle(&mut self, input: EngineInput) -> Result<(), DispatchError> {
        match input {
            EngineInput::Device(event) => {
                if let DispatchOutcome::Handled(summary) = self.dispatch(&event) {
                    if summary.matched == 0 {
                        log::trace!("No binding for {}@{}", event.pin_id, event.module_serial);
                    }
                }
            }
            EngineInput::DeviceLink(status) => self.notify_devices(status),
            EngineInput::SimulatorLink(status) => self.notify_simulator(status),
            EngineInput::Start => self.start()?,
            EngineInput::Stop => self.stop(),
            EngineInput::StartTestMode => self.start_test_mode()?,
            EngineInput::StopTestMode => self.stop_test_mode()?,
            EngineInput::Reconfigure(settings) => {
                self.reconfigure(settings);
            }
            EngineInput::Bind(document) => {
                self.bind(&document);
            }
        }
        Ok(())
    }

    /// Apply a batch in arrival order. Device events are dropped by
    /// `dispatch` while the engine is not armed.
    pub fn process_batch(&mut self, batch: &mut EventBatch<EngineInput>) {
        for input in batch.drain() {
            if let Err(e) = self.handle(input) {
                log::warn!("{}", e);
            }
        }
    }

    /// Run until `running` is cleared or every sender is gone, ticking every
    /// poll interval
    pub fn run(&mut self, rx: Receiver<EngineInput>, running: &AtomicBool) {
        let mut batch = EventBatch::with_capacity(batch_config::DEFAULT_READ_BATCH);
        let mut next_tick = Instant::now();

        while running.load(Ordering::SeqCst) {
            let timeout = next_tick.saturating_duration_since(Instant::now());
            let disconnected = match rx.recv_timeout(timeout) {
                Ok(input) => {
                    batch.push(input);
                    batch.extend(rx.try_iter());
                    false
                }
                Err(RecvTimeoutError::Timeout) => false,
                Err(RecvTimeoutError::Disconnected) => true,
            };

            self.process_batch(&mut batch);

            let now = Instant::now();
            if now >= next_tick {
                self.tick(now);
                next_tick = now + self.settings.poll_interval;
            }
            if disconnected {
                log::info!("Engine input channel closed");
                break;
            }
        }
        self.stop();
    }
}

// Simbind Core Library
// Binding engine that maps hardware module events to flight simulator actions

pub mod action;
pub mod binding;
pub mod dispatch;
pub mod document;
pub mod key;
pub mod migrate;
pub mod modifier;
pub mod output;
pub mod settings;
pub mod sim;
pub mod synth;
pub mod transition;

pub use action::{
    ActionContext, ActionError, ActionKind, CompareOp, EventCatalog, EventIdAction, ExprError,
    InputAction, KeyAction, LegacyDeviceAction, OffsetAction, ValueExpr,
};
pub use binding::{ButtonBinding, InputBinding, InputTrigger, OutputBinding, Slot};
pub use dispatch::{
    BindWarning, DispatchError, DispatchOutcome, DispatchSettings, DispatchSummary, Dispatcher,
    DropReason, EngineInput, EngineNotice, EngineState, NoticeBus,
};
pub use document::{
    BindingId, Document, DocumentError, EnvelopeError, LoadReport, LoadWarning, OrphanedSerial,
    CURRENT_VERSION,
};
pub use key::Key;
pub use migrate::{MigrationError, MigrationStep};
pub use modifier::{KeyModifier, ModifierError, ModifierSet};
pub use output::{
    Comparison, DisplayCache, DisplayTarget, LcdDisplay, LogOutputSink, OffsetSource, OutputConfig,
    OutputDisplay, OutputFrame, OutputSink, RecordingOutputSink, SinkCall, SinkError,
};
pub use settings::{Settings, SettingsError};
pub use sim::{
    ConnectionStatus, OffsetCache, OffsetWidth, OffsetWrite, SimError, SimEvent, SimulatorState,
    Snapshot,
};
pub use synth::{KeySink, RecordingKeySink, SynthError};
pub use transition::{DeviceEvent, Transition};

#[cfg(feature = "uinput")]
pub use synth::VirtualKeyboard;

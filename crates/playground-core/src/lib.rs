//! LiveKit Playground core logic.
//!
//! View-models for the connect and conference screens, built on the
//! LiveKit Rust SDK. No UI dependencies: shells render the published
//! state and forward user actions.

pub mod audio;
pub mod conference;
pub mod connect;
pub mod controls;
pub mod errors;
pub mod events;
pub mod options;
pub mod participants;
pub mod settings;
pub mod token;

pub use audio::AudioPlayoutBuffer;
pub use conference::{ConferenceState, ConferenceViewModel, JoinPreferences};
pub use connect::{ConnectState, ConnectViewModel, ConnectedRoom};
pub use controls::{CaptureBackend, CaptureHandle, MediaControls, MediaToggle};
pub use errors::PlaygroundError;
pub use events::{
    ConnectionState, EventEmitter, MediaKind, PlaygroundEvent, PlaygroundEventListener,
};
pub use options::SessionOptions;
pub use participants::{ParticipantInfo, ParticipantRoster};
pub use settings::{Settings, SettingsStore};
pub use token::{DevTokenConfig, normalize_server_url};

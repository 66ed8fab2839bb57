pub mod cache;
pub mod config;
pub mod coordinator;
pub mod detector;
pub mod error;
pub mod input;
pub mod key;
pub mod layout;
pub mod layout_text;
pub mod listener;
pub mod more_key_spec;
pub mod more_keys;
pub mod panel;
pub mod proximity;
pub mod session;
pub mod types;
pub mod typing;

pub use cache::{KeyboardElement, KeyboardId, KeyboardMode, LayoutCache};
pub use config::{CachePolicy, MoreKeysParams, NoiseHacks, TrackerParams};
pub use detector::{DetectorPolicy, KeyDetector};
pub use error::{KeySpecError, LayoutError};
pub use input::{GestureEnabler, InputSession};
pub use key::{KeyFlags, KeyGeometry, KeyKind};
pub use layout::{KeyRef, KeyboardLayout, LayoutBuilder, LayoutHandle, LayoutParams};
pub use listener::{
    ChannelListener, ChannelTimer, DrawingProxy, GestureArbiter, GesturePoint, KeyAction, KeyboardActionListener,
    NoGesture, NullDrawing, NullListener, TimerRequest, TimerScheduler,
};
pub use more_key_spec::{parse_more_keys, MoreKeySpec, MoreKeysConfig, ParsedMoreKeys};
pub use more_keys::{build_more_keys_keyboard, MoreKeysGeometry, MoreKeysKeyboard};
pub use panel::MoreKeysPanel;
pub use session::PointerSession;
pub use types::*;

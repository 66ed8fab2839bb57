use thiserror::Error;

/// A more-key spec that cannot be turned into a key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeySpecError {
    #[error("empty more-key spec")]
    Empty,
    #[error("empty label in more-key spec {0:?}")]
    EmptyLabel(String),
    #[error("multiple '|' in more-key spec {0:?}")]
    MultipleBars(String),
    #[error("empty output text in more-key spec {0:?}")]
    EmptyOutput(String),
    #[error("control token {token:?} expects a number, got {value:?}")]
    BadControlValue { token: String, value: String },
    #[error("unknown key code name {0:?}")]
    UnknownCodeName(String),
    #[error("bad hexadecimal code {0:?}")]
    BadHexCode(String),
}

/// Failures while constructing a keyboard or a more-keys panel.
///
/// These point at an authoring bug in the layout, so callers surface them
/// instead of retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error(
        "keyboard is too narrow for more keys: keyboard_width={keyboard_width} \
         key_width={key_width} num_keys={num_keys} max_columns={max_columns}"
    )]
    MoreKeysTooWide {
        keyboard_width: i32,
        key_width: i32,
        num_keys: usize,
        max_columns: usize,
    },
    #[error("key width must be positive, got {0}")]
    ZeroKeyWidth(i32),
    #[error("key {0} has no more keys")]
    NoMoreKeys(usize),
    #[error("keyboard has no keys")]
    NoKeys,
    #[error(transparent)]
    Spec(#[from] KeySpecError),
}

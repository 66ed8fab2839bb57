//! The more-keys mini-grammar.
//!
//! A key's more keys come as one comma separated string such as
//! `"!fixedColumnOrder!3,à,á,â|a\\,"`. Each entry is `label`, `label|output`,
//! `label|!code/key_name` or `label|0xHEX`. Entries of the form `!name!` or
//! `!name!N` are control tokens that configure the popup panel instead of
//! producing a key.

use crate::error::KeySpecError;
use crate::key::KeyGeometry;
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

const COMMA: char = ',';
const BACKSLASH: char = '\\';
const VERTICAL_BAR: char = '|';
const ADDITIONAL_MORE_KEY_MARKER: &str = "%";

const PREFIX_CODE: &str = "!code/";
const PREFIX_HEX: &str = "0x";
const PREFIX_ICON: &str = "!icon/";

const AUTO_COLUMN_ORDER: &str = "!autoColumnOrder!";
const FIXED_COLUMN_ORDER: &str = "!fixedColumnOrder!";
const HAS_LABELS: &str = "!hasLabels!";
const NEEDS_DIVIDERS: &str = "!needsDividers!";
const NO_PANEL_AUTO_MORE_KEY: &str = "!noPanelAutoMoreKey!";

lazy_static::lazy_static! {
    static ref NAMED_CODES: HashMap<&'static str, i32> = {
        let mut m = HashMap::new();
        m.insert("key_tab", CODE_TAB);
        m.insert("key_enter", CODE_ENTER);
        m.insert("key_space", CODE_SPACE);
        m.insert("key_shift", CODE_SHIFT);
        m.insert("key_capslock", CODE_CAPSLOCK);
        m.insert("key_switch_alpha_symbol", CODE_SWITCH_ALPHA_SYMBOL);
        m.insert("key_output_text", CODE_OUTPUT_TEXT);
        m.insert("key_delete", CODE_DELETE);
        m.insert("key_settings", CODE_SETTINGS);
        m.insert("key_shortcut", CODE_SHORTCUT);
        m.insert("key_action_next", CODE_ACTION_NEXT);
        m.insert("key_action_previous", CODE_ACTION_PREVIOUS);
        m.insert("key_shift_enter", CODE_SHIFT_ENTER);
        m.insert("key_language_switch", CODE_LANGUAGE_SWITCH);
        m.insert("key_emoji", CODE_EMOJI);
        m.insert("key_clipboard", CODE_CLIPBOARD);
        m.insert("key_symbol_shift", CODE_SYMBOL_SHIFT);
        m.insert("key_unspecified", CODE_UNSPECIFIED);
        m
    };
}

/// Look up a `!code/` key name.
pub fn named_code(name: &str) -> Option<i32> {
    NAMED_CODES.get(name).copied()
}

/// One parsed auxiliary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MoreKeySpec {
    pub code: i32,
    pub label: Option<String>,
    /// Set only when `code == CODE_OUTPUT_TEXT`.
    pub output_text: Option<String>,
    pub icon: Option<String>,
}

impl MoreKeySpec {
    /// A plain single-character more key.
    pub fn from_char(c: char) -> Self {
        Self {
            code: c as i32,
            label: Some(c.to_string()),
            output_text: None,
            icon: None,
        }
    }

    pub fn parse(spec: &str) -> Result<Self, KeySpecError> {
        if spec.is_empty() {
            return Err(KeySpecError::Empty);
        }
        let label_end = index_of_label_end(spec)?;
        let before = label_end.map_or(spec, |end| &spec[..end]);

        let (label, icon) = match before.strip_prefix(PREFIX_ICON) {
            Some(name) => (None, Some(name.to_string())),
            None => {
                let label = parse_escape(before);
                if label.is_empty() {
                    return Err(KeySpecError::EmptyLabel(spec.to_string()));
                }
                (Some(label), None)
            }
        };

        let (code, output_text) = if has_code(spec, label_end) {
            let end = label_end.unwrap_or_default();
            check_double_label_end(spec, end)?;
            (parse_code(&spec[end + 1..])?, None)
        } else if let Some(end) = label_end.filter(|&end| end > 0) {
            check_double_label_end(spec, end)?;
            let output = parse_escape(&spec[end + 1..]);
            let mut chars = output.chars();
            match (chars.next(), chars.next()) {
                (None, _) => return Err(KeySpecError::EmptyOutput(spec.to_string())),
                // One code point of output is a code.
                (Some(c), None) => (c as i32, None),
                _ => (CODE_OUTPUT_TEXT, Some(output)),
            }
        } else {
            let label = label
                .as_deref()
                .ok_or_else(|| KeySpecError::EmptyLabel(spec.to_string()))?;
            let mut chars = label.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => (c as i32, None),
                _ => (CODE_OUTPUT_TEXT, Some(label.to_string())),
            }
        };

        if code == CODE_UNSPECIFIED {
            return Ok(Self {
                code: CODE_OUTPUT_TEXT,
                output_text: label.clone(),
                label,
                icon,
            });
        }
        Ok(Self {
            code,
            label,
            output_text,
            icon,
        })
    }
}

impl FromStr for MoreKeySpec {
    type Err = KeySpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for MoreKeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match (&self.icon, &self.label) {
            (Some(icon), _) => format!("{PREFIX_ICON}{icon}"),
            (None, Some(label)) => label.clone(),
            (None, None) => String::new(),
        };
        let output = if self.code == CODE_OUTPUT_TEXT {
            self.output_text.clone().unwrap_or_default()
        } else {
            printable_code(self.code)
        };
        let mut chars = label.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if c as i32 == self.code {
                return f.write_str(&output);
            }
        }
        write!(f, "{label}|{output}")
    }
}

fn printable_code(code: i32) -> String {
    if let Some(name) = NAMED_CODES
        .iter()
        .find_map(|(name, &c)| (c == code && code < 0).then_some(*name))
    {
        return format!("{PREFIX_CODE}{name}");
    }
    match u32::try_from(code).ok().and_then(char::from_u32) {
        Some(c) if !c.is_control() => c.to_string(),
        _ => format!("{PREFIX_HEX}{code:04x}"),
    }
}

fn parse_escape(text: &str) -> String {
    if !text.contains(BACKSLASH) {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == BACKSLASH {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Byte offset of the unescaped `|` separating label from output.
fn index_of_label_end(spec: &str) -> Result<Option<usize>, KeySpecError> {
    if !spec.contains(BACKSLASH) {
        return match spec.find(VERTICAL_BAR) {
            // A sole vertical bar is a label.
            Some(0) if spec.len() == 1 => Ok(None),
            Some(0) => Err(KeySpecError::EmptyLabel(spec.to_string())),
            other => Ok(other),
        };
    }
    let mut chars = spec.char_indices().peekable();
    while let Some((pos, c)) = chars.next() {
        if c == BACKSLASH && chars.peek().is_some() {
            chars.next();
        } else if c == VERTICAL_BAR {
            return Ok(Some(pos));
        }
    }
    Ok(None)
}

fn check_double_label_end(spec: &str, label_end: usize) -> Result<(), KeySpecError> {
    match index_of_label_end(&spec[label_end + 1..]) {
        Ok(None) => Ok(()),
        _ => Err(KeySpecError::MultipleBars(spec.to_string())),
    }
}

fn has_code(spec: &str, label_end: Option<usize>) -> bool {
    match label_end {
        Some(end) if end > 0 && end + 1 < spec.len() => {
            let after = &spec[end + 1..];
            after.starts_with(PREFIX_CODE) || after.starts_with(PREFIX_HEX)
        }
        _ => false,
    }
}

fn parse_code(text: &str) -> Result<i32, KeySpecError> {
    if let Some(name) = text.strip_prefix(PREFIX_CODE) {
        return named_code(name).ok_or_else(|| KeySpecError::UnknownCodeName(name.to_string()));
    }
    if let Some(hex) = text.strip_prefix(PREFIX_HEX) {
        return i32::from_str_radix(hex, 16).map_err(|_| KeySpecError::BadHexCode(text.to_string()));
    }
    Ok(CODE_UNSPECIFIED)
}

/// Split a comma separated list of key specs, honouring backslash escapes.
/// Empty entries are dropped.
pub fn split_key_specs(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            COMMA => {
                if !current.is_empty() {
                    out.push(std::mem::take(&mut current));
                }
            }
            BACKSLASH => {
                // Escapes are kept here; MoreKeySpec::parse strips them.
                current.push(c);
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// Merge additional more keys into `more_keys`.
///
/// Each `%` marker is replaced by the next additional key, surplus markers
/// are dropped and leftover additional keys are appended. When `more_keys`
/// has no marker at all, the additional keys go first.
pub fn insert_additional_more_keys(more_keys: Vec<String>, additional: Vec<String>) -> Vec<String> {
    let more_keys: Vec<String> = more_keys.into_iter().filter(|s| !s.is_empty()).collect();
    let additional: Vec<String> = additional.into_iter().filter(|s| !s.is_empty()).collect();

    let has_marker = more_keys.iter().any(|s| s == ADDITIONAL_MORE_KEY_MARKER);
    if !has_marker {
        let mut out = additional;
        out.extend(more_keys);
        return out;
    }

    let mut pending = additional.into_iter();
    let mut out: Vec<String> = more_keys
        .into_iter()
        .filter_map(|spec| {
            if spec == ADDITIONAL_MORE_KEY_MARKER {
                pending.next()
            } else {
                Some(spec)
            }
        })
        .collect();
    out.extend(pending);
    out
}

/// Popup panel settings carried by control tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MoreKeysConfig {
    /// Maximum (or exact, when `fixed_column`) number of columns.
    pub column: usize,
    pub fixed_column: bool,
    pub fixed_order: bool,
    pub has_labels: bool,
    pub needs_dividers: bool,
    pub no_panel_auto_more_key: bool,
}

impl MoreKeysConfig {
    pub fn with_max_column(column: usize) -> Self {
        Self {
            column,
            ..Self::default()
        }
    }
}

/// Result of parsing a key's more-keys attribute.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedMoreKeys {
    /// `None` when nothing usable is left after control tokens are removed.
    pub specs: Option<Vec<MoreKeySpec>>,
    pub config: MoreKeysConfig,
}

/// Parse a more-keys string plus optional additional more keys.
pub fn parse_more_keys(
    more_keys: &str,
    additional: Option<&str>,
    default_column: usize,
) -> Result<ParsedMoreKeys, KeySpecError> {
    let mut entries: Vec<Option<String>> = split_key_specs(more_keys).into_iter().map(Some).collect();

    let mut config = MoreKeysConfig::with_max_column(default_column);
    if let Some(value) = take_int_value(&mut entries, AUTO_COLUMN_ORDER)?.filter(|&v| v > 0) {
        config.column = (value & 0xff) as usize;
        config.fixed_column = true;
        config.fixed_order = false;
    }
    if let Some(value) = take_int_value(&mut entries, FIXED_COLUMN_ORDER)?.filter(|&v| v > 0) {
        config.column = (value & 0xff) as usize;
        config.fixed_column = true;
        config.fixed_order = true;
    }
    config.has_labels = take_flag(&mut entries, HAS_LABELS);
    config.needs_dividers = take_flag(&mut entries, NEEDS_DIVIDERS);
    config.no_panel_auto_more_key = take_flag(&mut entries, NO_PANEL_AUTO_MORE_KEY);

    let remaining: Vec<String> = entries.into_iter().flatten().collect();
    let additional = additional.map(split_key_specs).unwrap_or_default();
    let merged = insert_additional_more_keys(remaining, additional);

    let specs = merged
        .iter()
        .map(|s| MoreKeySpec::parse(s))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ParsedMoreKeys {
        specs: (!specs.is_empty()).then_some(specs),
        config,
    })
}

/// Remove every entry starting with `prefix`; the first one's suffix is the value.
fn take_int_value(entries: &mut [Option<String>], prefix: &str) -> Result<Option<i32>, KeySpecError> {
    let mut value = None;
    for entry in entries.iter_mut() {
        let Some(spec) = entry.as_deref() else { continue };
        let Some(rest) = spec.strip_prefix(prefix) else { continue };
        if value.is_none() {
            let parsed = rest.parse::<i32>().map_err(|_| KeySpecError::BadControlValue {
                token: prefix.to_string(),
                value: rest.to_string(),
            })?;
            value = Some(parsed);
        }
        *entry = None;
    }
    Ok(value)
}

fn take_flag(entries: &mut [Option<String>], token: &str) -> bool {
    let mut found = false;
    for entry in entries.iter_mut() {
        if entry.as_deref() == Some(token) {
            *entry = None;
            found = true;
        }
    }
    found
}

/// Letters already reachable on the base layout.
#[derive(Debug, Clone, Default)]
pub struct LettersOnBaseLayout {
    codes: HashSet<i32>,
    texts: HashSet<String>,
}

impl LettersOnBaseLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_key(&mut self, key: &KeyGeometry) {
        if is_alphabetic_code(key.code) {
            self.codes.insert(key.code);
        } else if key.code == CODE_OUTPUT_TEXT {
            if let Some(text) = &key.output_text {
                self.texts.insert(text.clone());
            }
        }
    }

    pub fn contains(&self, spec: &MoreKeySpec) -> bool {
        if is_alphabetic_code(spec.code) {
            return self.codes.contains(&spec.code);
        }
        spec.code == CODE_OUTPUT_TEXT
            && spec
                .output_text
                .as_ref()
                .map_or(false, |text| self.texts.contains(text))
    }
}

/// Drop more keys that duplicate letters already on the base layout.
pub fn remove_redundant_more_keys(
    more_keys: Option<Vec<MoreKeySpec>>,
    letters: &LettersOnBaseLayout,
) -> Option<Vec<MoreKeySpec>> {
    let filtered: Vec<MoreKeySpec> = more_keys?
        .into_iter()
        .filter(|spec| !letters.contains(spec))
        .collect();
    (!filtered.is_empty()).then_some(filtered)
}

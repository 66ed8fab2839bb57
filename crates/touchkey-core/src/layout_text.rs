//! Row-based text format for keyboard layouts.
//!
//! ```text
//! ; English (first comment line names the layout)
//! #width 1000
//! #key 100 120          default key width and row height
//! q w e[é,è,ê,ë] r t y u i o p
//! !gap*0.5 a s d f g h j k l
//! !shift*1.5 z x c v b n m !delete*1.5
//! !symbol*1.5 !lang ,[!autoColumnOrder!2,;,:] !space*4 .^?*1.0 !enter*1.5
//! ```
//!
//! A key is `HEAD[MORE]^ALT*WIDTH`, every part after `HEAD` optional:
//! `HEAD` is a label (one character types it, longer labels output text) or
//! `!name` for a special key, `MORE` is a more-keys spec without spaces,
//! `ALT` is the character typed instead while typing, `WIDTH` is a factor of
//! the default key width.

use crate::cache::KeyboardElement;
use crate::key::KeyGeometry;
use crate::layout::{KeyboardLayout, LayoutBuilder, LayoutParams};
use crate::more_key_spec::parse_more_keys;
use crate::types::*;
use anyhow::{anyhow, bail, Context, Result};
use std::path::Path;
use tracing::debug;

pub fn load_layout<P: AsRef<Path>>(path: P) -> Result<KeyboardLayout> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_layout(&text).with_context(|| format!("parsing {}", path.display()))
}

pub fn parse_layout(content: &str) -> Result<KeyboardLayout> {
    let mut params = LayoutParams::default();
    let mut rows: Vec<Vec<KeyToken>> = Vec::new();

    for (index, raw) in content.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(comment) = line.strip_prefix(';') {
            let name = comment.trim();
            if params.name.is_none() && rows.is_empty() && !name.is_empty() {
                params.name = Some(name.to_string());
            }
            continue;
        }
        if let Some(directive) = line.strip_prefix('#') {
            apply_directive(&mut params, directive).with_context(|| format!("line {line_no}"))?;
            continue;
        }
        let row = line
            .split_whitespace()
            .map(parse_key_token)
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("line {line_no}"))?;
        rows.push(row);
    }
    if rows.is_empty() {
        bail!("layout has no rows");
    }

    let mut builder = LayoutBuilder::new(params.clone());
    for row in rows {
        builder.start_row(None);
        for token in row {
            let width = (params.default_key_width as f32 * token.width).round() as i32;
            if let TokenHead::Gap = token.head {
                builder.add_gap(width);
                continue;
            }
            let (x, y, w, h) = builder.next_cell(width);
            builder.add_key(token.into_key(x, y, w, h, &params)?);
        }
    }
    let layout = builder.build().context("building layout")?;
    debug!(
        name = layout.name().unwrap_or("unnamed"),
        keys = layout.len(),
        "layout parsed"
    );
    Ok(layout)
}

fn apply_directive(params: &mut LayoutParams, directive: &str) -> Result<()> {
    let mut parts = directive.split_whitespace();
    let name = parts.next().ok_or_else(|| anyhow!("empty directive"))?;
    let values: Vec<&str> = parts.collect();
    let int = |i: usize| -> Result<i32> {
        let raw = values
            .get(i)
            .ok_or_else(|| anyhow!("#{name} needs {} value(s)", i + 1))?;
        raw.parse::<i32>()
            .with_context(|| format!("#{name}: `{raw}` is not a number"))
    };
    match name {
        "width" => params.width = int(0)?,
        "height" => params.height = int(0)?,
        "key" => {
            params.default_key_width = int(0)?;
            params.default_row_height = int(1)?;
        }
        "gap" => {
            params.horizontal_gap = int(0)?;
            params.vertical_gap = int(1)?;
        }
        "padding" => {
            params.top_padding = int(0)?;
            params.bottom_padding = int(1)?;
            params.left_padding = int(2)?;
            params.right_padding = int(3)?;
        }
        "columns" => params.max_more_keys_column = usize::try_from(int(0)?).context("#columns must not be negative")?,
        "element" => {
            let raw = values.first().ok_or_else(|| anyhow!("#element needs a name"))?;
            params.element = parse_element(raw)?;
        }
        "no_proximity" => params.proximity_chars_correction = false,
        _ => bail!("unknown directive `#{name}`"),
    }
    Ok(())
}

fn parse_element(raw: &str) -> Result<KeyboardElement> {
    Ok(match raw {
        "alphabet" => KeyboardElement::Alphabet,
        "alphabet_manual_shifted" => KeyboardElement::AlphabetManualShifted,
        "alphabet_automatic_shifted" => KeyboardElement::AlphabetAutomaticShifted,
        "alphabet_shift_locked" => KeyboardElement::AlphabetShiftLocked,
        "alphabet_shift_lock_shifted" => KeyboardElement::AlphabetShiftLockShifted,
        "symbols" => KeyboardElement::Symbols,
        "symbols_shifted" => KeyboardElement::SymbolsShifted,
        "phone" => KeyboardElement::Phone,
        "phone_symbols" => KeyboardElement::PhoneSymbols,
        "number" => KeyboardElement::Number,
        "emoji" => KeyboardElement::Emoji,
        _ => bail!("unknown keyboard element `{raw}`"),
    })
}

#[derive(Debug, PartialEq)]
enum TokenHead {
    Label(String),
    Special(i32),
    Gap,
}

#[derive(Debug)]
struct KeyToken {
    head: TokenHead,
    more_keys: Option<String>,
    alt: Option<char>,
    width: f32,
}

impl KeyToken {
    fn into_key(self, x: i32, y: i32, w: i32, h: i32, params: &LayoutParams) -> Result<KeyGeometry> {
        let (hg, vg) = (params.horizontal_gap, params.vertical_gap);
        let mut key = match self.head {
            TokenHead::Label(label) => {
                let mut chars = label.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => KeyGeometry::new(c as i32, Some(label), x, y, w, h, hg, vg),
                    _ => KeyGeometry::new(CODE_OUTPUT_TEXT, Some(label.clone()), x, y, w, h, hg, vg)
                        .with_output_text(label),
                }
            }
            TokenHead::Special(code) => {
                let mut key = KeyGeometry::new(code, None, x, y, w, h, hg, vg);
                match code {
                    CODE_DELETE => key.flags.repeatable = true,
                    // Long press opens the input method picker.
                    CODE_LANGUAGE_SWITCH | CODE_SPACE => key.flags.long_press_enabled = true,
                    CODE_SHIFT => key.flags.long_press_enabled = true,
                    _ => {}
                }
                key
            }
            TokenHead::Gap => bail!("a gap is not a key"),
        };
        if let Some(more) = self.more_keys.as_deref() {
            let parsed = parse_more_keys(more, None, params.max_more_keys_column)
                .with_context(|| format!("more keys `{more}`"))?;
            key = key.with_more_keys(parsed);
        }
        if let Some(alt) = self.alt {
            key = key.with_alt_code(alt as i32);
        }
        Ok(key)
    }
}

fn parse_key_token(raw: &str) -> Result<KeyToken> {
    let (rest, width) = match raw.rsplit_once('*') {
        Some((head, factor)) if !head.is_empty() => {
            let width: f32 = factor
                .parse()
                .with_context(|| format!("bad width factor in `{raw}`"))?;
            if width <= 0.0 {
                bail!("width factor must be positive in `{raw}`");
            }
            (head, width)
        }
        _ => (raw, 1.0),
    };

    let (rest, alt) = match rest.rsplit_once('^') {
        Some((head, alt)) if !head.is_empty() && alt.chars().count() == 1 => (head, alt.chars().next()),
        _ => (rest, None),
    };

    let (head, more_keys) = match rest.find('[') {
        Some(open) if open > 0 && rest.ends_with(']') => (&rest[..open], Some(rest[open + 1..rest.len() - 1].to_string())),
        _ => (rest, None),
    };

    let head = match head.strip_prefix('!').filter(|name| !name.is_empty()) {
        Some(name) => special_key(name)?,
        None => TokenHead::Label(head.to_string()),
    };
    Ok(KeyToken {
        head,
        more_keys,
        alt,
        width,
    })
}

fn special_key(name: &str) -> Result<TokenHead> {
    Ok(match name {
        "gap" => TokenHead::Gap,
        "shift" => TokenHead::Special(CODE_SHIFT),
        "delete" => TokenHead::Special(CODE_DELETE),
        "space" => TokenHead::Special(CODE_SPACE),
        "enter" => TokenHead::Special(CODE_ENTER),
        "tab" => TokenHead::Special(CODE_TAB),
        "symbol" => TokenHead::Special(CODE_SWITCH_ALPHA_SYMBOL),
        "lang" => TokenHead::Special(CODE_LANGUAGE_SWITCH),
        "emoji" => TokenHead::Special(CODE_EMOJI),
        "settings" => TokenHead::Special(CODE_SETTINGS),
        _ => bail!("unknown special key `!{name}`"),
    })
}

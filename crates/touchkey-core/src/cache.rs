use crate::config::CachePolicy;
use crate::layout::KeyboardLayout;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, trace};

/// Which sheet of a keyboard family a layout is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum KeyboardElement {
    #[default]
    Alphabet,
    AlphabetManualShifted,
    AlphabetAutomaticShifted,
    AlphabetShiftLocked,
    AlphabetShiftLockShifted,
    Symbols,
    SymbolsShifted,
    Phone,
    PhoneSymbols,
    Number,
    Emoji,
}

impl KeyboardElement {
    pub fn is_alphabet(self) -> bool {
        matches!(
            self,
            Self::Alphabet
                | Self::AlphabetManualShifted
                | Self::AlphabetAutomaticShifted
                | Self::AlphabetShiftLocked
                | Self::AlphabetShiftLockShifted
        )
    }

    /// Sheets whose every key is known to the proximity corrector.
    pub fn has_proximity_info(self) -> bool {
        matches!(self, Self::Alphabet | Self::AlphabetAutomaticShifted)
    }
}

/// Kind of text field the keyboard is shown for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum KeyboardMode {
    #[default]
    Text,
    Url,
    Email,
    Im,
    Phone,
    Number,
    Date,
    Time,
    DateTime,
}

/// Value key of a built layout. Equal ids must yield layouts that behave the
/// same.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct KeyboardId {
    /// Locale plus layout name, e.g. `en_US:qwerty`.
    pub subtype: String,
    pub mode: KeyboardMode,
    pub element: KeyboardElement,
    pub width: i32,
    pub height: i32,
    /// Editor option bits (action, password, no-microphone ...).
    pub editor_flags: u32,
}

impl KeyboardId {
    pub fn is_alphabet(&self) -> bool {
        self.element.is_alphabet()
    }
}

/// Bounded LRU of built layouts.
///
/// Eviction removes the least recently used entry that is not pinned. The
/// `pinned_alphabet_layouts` most recently used alphabetic layouts are
/// pinned, so switching back to the letters sheet never rebuilds it.
#[derive(Debug)]
pub struct LayoutCache {
    policy: CachePolicy,
    entries: HashMap<KeyboardId, Arc<KeyboardLayout>>,
    // Front is most recent.
    recency: VecDeque<KeyboardId>,
    pinned: VecDeque<KeyboardId>,
}

impl Default for LayoutCache {
    fn default() -> Self {
        Self::new(CachePolicy::default())
    }
}

impl LayoutCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            entries: HashMap::new(),
            recency: VecDeque::new(),
            pinned: VecDeque::new(),
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &KeyboardId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn is_pinned(&self, id: &KeyboardId) -> bool {
        self.pinned.contains(id)
    }

    pub fn get(&mut self, id: &KeyboardId) -> Option<Arc<KeyboardLayout>> {
        let layout = self.entries.get(id).cloned()?;
        self.touch(id);
        trace!(?id, "layout cache hit");
        Some(layout)
    }

    /// Cached layout for `id`, building it on a miss.
    pub fn get_or_build<E>(
        &mut self,
        id: &KeyboardId,
        build: impl FnOnce(&KeyboardId) -> Result<KeyboardLayout, E>,
    ) -> Result<Arc<KeyboardLayout>, E> {
        if let Some(layout) = self.get(id) {
            return Ok(layout);
        }
        debug!(?id, "layout cache miss");
        let layout = Arc::new(build(id)?);
        self.insert(id.clone(), layout.clone());
        Ok(layout)
    }

    pub fn insert(&mut self, id: KeyboardId, layout: Arc<KeyboardLayout>) {
        self.entries.insert(id.clone(), layout);
        self.touch(&id);
        self.evict();
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
        self.pinned.clear();
    }

    fn touch(&mut self, id: &KeyboardId) {
        self.recency.retain(|other| other != id);
        self.recency.push_front(id.clone());
        if id.is_alphabet() && self.policy.pinned_alphabet_layouts > 0 {
            self.pinned.retain(|other| other != id);
            self.pinned.push_front(id.clone());
            self.pinned.truncate(self.policy.pinned_alphabet_layouts);
        }
    }

    fn evict(&mut self) {
        while self.entries.len() > self.policy.capacity {
            let victim = self
                .recency
                .iter()
                .rposition(|id| !self.pinned.contains(id));
            let Some(pos) = victim else {
                // Everything left is pinned.
                break;
            };
            if let Some(id) = self.recency.remove(pos) {
                debug!(?id, "layout cache eviction");
                self.entries.remove(&id);
            }
        }
    }
}

//! Voice identifiers and the fixed per-voice table.
//!
//! Every rhythmic channel is one of five closed [`VoiceId`] variants. Data
//! that exists once per voice lives in a [`VoiceTable`], so adding a voice is
//! a compile error everywhere it matters instead of a silent missing key.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

/// One rhythmic/instrumental channel driven by a piece of game state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceId {
    /// Ball count.
    Balls,
    /// Strike count.
    Strikes,
    /// Out count.
    Outs,
    /// Occupied bases.
    Runners,
    /// Inning number (keeps ticking between innings).
    Inning,
}

impl VoiceId {
    /// Number of voices.
    pub const COUNT: usize = 5;

    /// All voices in table order.
    pub const ALL: [VoiceId; Self::COUNT] = [
        VoiceId::Balls,
        VoiceId::Strikes,
        VoiceId::Outs,
        VoiceId::Runners,
        VoiceId::Inning,
    ];

    /// Scale-degree offset used when picking pitches, so simultaneous voices
    /// land on different degrees instead of in unison.
    pub fn scale_offset(self) -> usize {
        match self {
            VoiceId::Balls => 0,
            VoiceId::Strikes => 2,
            VoiceId::Outs => 4,
            VoiceId::Runners => 1,
            VoiceId::Inning => 3,
        }
    }

    /// Whether this voice is silenced while the game is between innings.
    pub fn rests_between_innings(self) -> bool {
        !matches!(self, VoiceId::Inning)
    }

    /// Lowercase name, as used in config files and logs.
    pub fn name(self) -> &'static str {
        match self {
            VoiceId::Balls => "balls",
            VoiceId::Strikes => "strikes",
            VoiceId::Outs => "outs",
            VoiceId::Runners => "runners",
            VoiceId::Inning => "inning",
        }
    }

    fn index(self) -> usize {
        match self {
            VoiceId::Balls => 0,
            VoiceId::Strikes => 1,
            VoiceId::Outs => 2,
            VoiceId::Runners => 3,
            VoiceId::Inning => 4,
        }
    }
}

impl fmt::Display for VoiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed-size map from every [`VoiceId`] to a value.
#[derive(Clone, Debug, PartialEq)]
pub struct VoiceTable<T> {
    slots: [T; VoiceId::COUNT],
}

impl<T> VoiceTable<T> {
    /// Build a table by evaluating `f` for each voice.
    pub fn from_fn(mut f: impl FnMut(VoiceId) -> T) -> Self {
        Self {
            slots: VoiceId::ALL.map(&mut f),
        }
    }

    /// Iterate over `(voice, value)` pairs in table order.
    pub fn iter(&self) -> impl Iterator<Item = (VoiceId, &T)> {
        VoiceId::ALL.into_iter().zip(self.slots.iter())
    }

    /// Iterate mutably over `(voice, value)` pairs in table order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (VoiceId, &mut T)> {
        VoiceId::ALL.into_iter().zip(self.slots.iter_mut())
    }

    /// Map every value into a new table.
    pub fn map<U>(&self, mut f: impl FnMut(VoiceId, &T) -> U) -> VoiceTable<U> {
        VoiceTable::from_fn(|voice| f(voice, &self[voice]))
    }
}

impl<T: Default> Default for VoiceTable<T> {
    fn default() -> Self {
        Self::from_fn(|_| T::default())
    }
}

impl<T> Index<VoiceId> for VoiceTable<T> {
    type Output = T;

    fn index(&self, voice: VoiceId) -> &T {
        &self.slots[voice.index()]
    }
}

impl<T> IndexMut<VoiceId> for VoiceTable<T> {
    fn index_mut(&mut self, voice: VoiceId) -> &mut T {
        &mut self.slots[voice.index()]
    }
}

impl<T: Serialize> Serialize for VoiceTable<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(VoiceId::COUNT))?;
        for (voice, value) in self.iter() {
            map.serialize_entry(voice.name(), value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_offsets_are_distinct() {
        let mut offsets: Vec<usize> = VoiceId::ALL.iter().map(|v| v.scale_offset()).collect();
        offsets.sort_unstable();
        assert_eq!(offsets, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_voice_table_indexing() {
        let mut table = VoiceTable::from_fn(|voice| voice.scale_offset());
        assert_eq!(table[VoiceId::Strikes], 2);
        table[VoiceId::Strikes] = 9;
        assert_eq!(table[VoiceId::Strikes], 9);
        assert_eq!(table.iter().count(), VoiceId::COUNT);
    }

    #[test]
    fn test_only_inning_plays_between_innings() {
        let playing: Vec<VoiceId> = VoiceId::ALL
            .into_iter()
            .filter(|v| !v.rests_between_innings())
            .collect();
        assert_eq!(playing, vec![VoiceId::Inning]);
    }

    #[test]
    fn test_voice_table_serializes_by_name() {
        let table = VoiceTable::from_fn(|voice| voice.scale_offset());
        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json["outs"], 4);
        assert_eq!(json["runners"], 1);
    }
}

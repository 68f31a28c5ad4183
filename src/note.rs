//! Frequency → note mapping, the typed note, and the published tuner reading.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Default reference pitch for A4. Deliberately 442 Hz, not concert 440.
pub const DEFAULT_REFERENCE_HZ: f64 = 442.0;

// ─── Note spelling ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NoteLetter {
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl NoteLetter {
    /// Semitones above C within the octave.
    pub fn semitone(self) -> i32 {
        match self {
            NoteLetter::C => 0,
            NoteLetter::D => 2,
            NoteLetter::E => 4,
            NoteLetter::F => 5,
            NoteLetter::G => 7,
            NoteLetter::A => 9,
            NoteLetter::B => 11,
        }
    }

    fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'C' => Some(NoteLetter::C),
            'D' => Some(NoteLetter::D),
            'E' => Some(NoteLetter::E),
            'F' => Some(NoteLetter::F),
            'G' => Some(NoteLetter::G),
            'A' => Some(NoteLetter::A),
            'B' => Some(NoteLetter::B),
            _ => None,
        }
    }

    fn as_char(self) -> char {
        match self {
            NoteLetter::C => 'C',
            NoteLetter::D => 'D',
            NoteLetter::E => 'E',
            NoteLetter::F => 'F',
            NoteLetter::G => 'G',
            NoteLetter::A => 'A',
            NoteLetter::B => 'B',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Accidental {
    Natural,
    Sharp,
    Flat,
}

impl Accidental {
    pub fn offset(self) -> i32 {
        match self {
            Accidental::Natural => 0,
            Accidental::Sharp => 1,
            Accidental::Flat => -1,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            Accidental::Natural => "",
            Accidental::Sharp => "#",
            Accidental::Flat => "b",
        }
    }
}

use Accidental::{Flat, Natural, Sharp};
use NoteLetter::*;

/// Pitch class → spelling used for every detected note.
/// Fixed sharp spelling so the same frequency always yields the same name.
const SHARP_SPELLING: [(NoteLetter, Accidental); 12] = [
    (C, Natural),
    (C, Sharp),
    (D, Natural),
    (D, Sharp),
    (E, Natural),
    (F, Natural),
    (F, Sharp),
    (G, Natural),
    (G, Sharp),
    (A, Natural),
    (A, Sharp),
    (B, Natural),
];

/// Flat counterpart of [`SHARP_SPELLING`] for the five black keys.
const FLAT_SPELLING: [(NoteLetter, Accidental); 12] = [
    (C, Natural),
    (D, Flat),
    (D, Natural),
    (E, Flat),
    (E, Natural),
    (F, Natural),
    (G, Flat),
    (G, Natural),
    (A, Flat),
    (A, Natural),
    (B, Flat),
    (B, Natural),
];

/// A spelled note with octave, e.g. `C#4` or `Db4`. Octave numbering follows
/// scientific pitch notation (C4 = MIDI 60, A4 = MIDI 69).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Note {
    pub letter: NoteLetter,
    pub accidental: Accidental,
    pub octave: i32,
}

impl Note {
    pub fn new(letter: NoteLetter, accidental: Accidental, octave: i32) -> Self {
        Self {
            letter,
            accidental,
            octave,
        }
    }

    /// Canonical (sharp) spelling of a MIDI note number.
    pub fn from_midi(midi: i32) -> Self {
        let (letter, accidental) = SHARP_SPELLING[midi.rem_euclid(12) as usize];
        Self {
            letter,
            accidental,
            octave: midi.div_euclid(12) - 1,
        }
    }

    /// MIDI note number this spelling sounds as.
    pub fn midi(&self) -> i32 {
        (self.octave + 1) * 12 + self.letter.semitone() + self.accidental.offset()
    }

    /// Pitch class 0–11 (C = 0).
    pub fn pitch_class(&self) -> usize {
        self.midi().rem_euclid(12) as usize
    }

    /// The other common spelling of a black-key note (C# ↔ Db).
    /// Returns None for naturals.
    pub fn enharmonic(&self) -> Option<Note> {
        let midi = self.midi();
        let pc = midi.rem_euclid(12) as usize;
        let (letter, accidental) = match self.accidental {
            Sharp => FLAT_SPELLING[pc],
            Flat => SHARP_SPELLING[pc],
            Natural => return None,
        };
        if accidental == Natural {
            return None;
        }
        let mut alt = Note::new(letter, accidental, 0);
        // Solve the octave so the alternate spelling sounds at the same MIDI number
        alt.octave = (midi - alt.midi()).div_euclid(12);
        Some(alt)
    }

    /// Same sounding pitch: exact match, or enharmonic spelling in the same octave.
    ///
    /// The octave is part of the comparison: C#4 and Db4 match, C#4 and Db5
    /// do not, so an octave leap restarts a hold. Spellings that cross an
    /// octave label (B#3 and C4) still match because they share a MIDI number.
    pub fn is_tolerant_with(&self, other: &Note) -> bool {
        self == other || self.midi() == other.midi()
    }

    /// Exact equal-tempered frequency of this note at the given A4 reference.
    pub fn frequency(&self, reference_hz: f64) -> f64 {
        midi_to_hz(self.midi() as f64, reference_hz)
    }
}

/// Tolerance check used by the hold accumulator. Silence (None) never
/// matches anything, not even another silence.
pub fn is_within_tolerance(a: Option<&Note>, b: Option<&Note>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.is_tolerant_with(b),
        _ => false,
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            self.letter.as_char(),
            self.accidental.symbol(),
            self.octave
        )
    }
}

impl FromStr for Note {
    type Err = String;

    /// Parses `A4`, `C#5`, `Db3`, `B-1`. Also accepts ♯/♭.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        let letter = chars
            .next()
            .and_then(NoteLetter::from_char)
            .ok_or_else(|| format!("invalid note letter in {:?}", s))?;
        let rest = chars.as_str();
        let (accidental, octave_str) = if let Some(r) = rest.strip_prefix('#') {
            (Sharp, r)
        } else if let Some(r) = rest.strip_prefix('♯') {
            (Sharp, r)
        } else if let Some(r) = rest.strip_prefix('♭') {
            (Flat, r)
        } else if let Some(r) = rest.strip_prefix('b') {
            (Flat, r)
        } else {
            (Natural, rest)
        };
        let octave = octave_str
            .parse::<i32>()
            .map_err(|_| format!("invalid octave in {:?}", s))?;
        Ok(Note::new(letter, accidental, octave))
    }
}

impl Serialize for Note {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Note {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ─── Conversions ────────────────────────────────────────────────────────────

/// Convert MIDI note number (fractional) to Hz, A4 = MIDI 69 = `reference_hz`.
pub fn midi_to_hz(midi: f64, reference_hz: f64) -> f64 {
    reference_hz * 2.0_f64.powf((midi - 69.0) / 12.0)
}

/// Convert Hz to MIDI note number (fractional), A4 = `reference_hz`.
pub fn hz_to_midi(hz: f64, reference_hz: f64) -> f64 {
    69.0 + 12.0 * (hz / reference_hz).log2()
}

// ─── Mapper ─────────────────────────────────────────────────────────────────

/// Pure frequency → (note, cents) mapping against a configurable A4.
#[derive(Debug, Clone, Copy)]
pub struct NoteMapper {
    reference_hz: f64,
}

impl NoteMapper {
    pub fn new(reference_hz: f64) -> Self {
        Self { reference_hz }
    }

    pub fn reference_hz(&self) -> f64 {
        self.reference_hz
    }

    /// Nearest equal-tempered note and the deviation from it in cents
    /// (-50..+50). None for zero, negative, or non-finite input.
    pub fn map(&self, frequency_hz: f64) -> Option<(Note, f64)> {
        if !(frequency_hz > 0.0) || !frequency_hz.is_finite() {
            return None;
        }
        let midi = hz_to_midi(frequency_hz, self.reference_hz);
        let rounded = midi.round();
        let cents = 100.0 * (midi - rounded);
        Some((Note::from_midi(rounded as i32), cents))
    }

    /// Active reading for a frequency, or the inactive reading when the
    /// frequency cannot be mapped.
    pub fn reading(&self, frequency_hz: f64) -> TunerReading {
        match self.map(frequency_hz) {
            Some((note, cents)) => TunerReading {
                note: Some(note),
                frequency_hz,
                deviation_cents: cents,
                is_active: true,
            },
            None => TunerReading::inactive(),
        }
    }
}

impl Default for NoteMapper {
    fn default() -> Self {
        Self::new(DEFAULT_REFERENCE_HZ)
    }
}

// ─── Reading ────────────────────────────────────────────────────────────────

/// Live tuner output. Inactive readings carry no note and zero deviation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TunerReading {
    pub note: Option<Note>,
    pub frequency_hz: f64,
    pub deviation_cents: f64,
    pub is_active: bool,
}

impl TunerReading {
    pub fn inactive() -> Self {
        Self {
            note: None,
            frequency_hz: 0.0,
            deviation_cents: 0.0,
            is_active: false,
        }
    }

    /// Note name for display; "-" when there is no note.
    pub fn note_name(&self) -> String {
        match self.note {
            Some(n) => n.to_string(),
            None => "-".to_string(),
        }
    }
}

impl fmt::Display for TunerReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_active {
            return write!(f, "{:>4}", "-");
        }
        write!(
            f,
            "{:>4} {:>7.1} Hz {:>+6.1}¢",
            self.note_name(),
            self.frequency_hz,
            self.deviation_cents
        )
    }
}

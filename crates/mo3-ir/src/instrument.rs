//! Instrument and envelope types.

use alloc::vec::Vec;
use arrayvec::ArrayString;

use crate::clip_name;
use crate::sample::AutoVibrato;

/// An instrument decoded from the container.
#[derive(Clone, Debug)]
pub struct Instrument {
    /// Instrument name
    pub name: ArrayString<32>,
    /// Original file name (stored by container revision 5 and later)
    pub filename: ArrayString<32>,
    /// Note remapping: incoming note (0-119) -> played note
    pub note_map: [u8; 120],
    /// Sample mapping: note (0-119) -> 1-based sample number, 0 = none
    pub keyboard: [u16; 120],
    /// Volume envelope
    pub volume_envelope: Envelope,
    /// Panning envelope
    pub panning_envelope: Envelope,
    /// Pitch envelope, doubling as filter envelope when its `filter`
    /// flag is set
    pub pitch_envelope: Envelope,
    /// Fadeout speed (0 = no fade)
    pub fadeout: u16,
    /// MIDI or plugin routing
    pub midi: MidiTarget,
    /// MIDI bank
    pub midi_bank: u8,
    /// MIDI program
    pub midi_program: u8,
    /// MIDI pitch wheel depth
    pub midi_bend_range: u8,
    /// Global volume (0-128, IT)
    pub global_volume: u8,
    /// Default panning (0-256) if enabled
    pub panning: Option<u16>,
    /// What happens when a new note is played on a busy channel
    pub new_note_action: NewNoteAction,
    /// Pitch-pan separation (-32..32)
    pub pitch_pan_separation: i8,
    /// Pitch-pan center note
    pub pitch_pan_center: u8,
    /// Duplicate note checking mode
    pub duplicate_check: DuplicateCheck,
    /// Action on a duplicate check hit
    pub duplicate_action: DuplicateCheckAction,
    /// Random volume variation (0-100)
    pub volume_swing: u8,
    /// Random panning variation (0-64)
    pub pan_swing: u8,
    /// Filter cutoff (0-127) if enabled
    pub cutoff: Option<u8>,
    /// Filter resonance (0-127) if enabled
    pub resonance: Option<u8>,
    /// Per-instrument auto-vibrato (XM; propagated onto samples)
    pub vibrato: AutoVibrato,
    /// Channel mute flag
    pub muted: bool,
}

impl Default for Instrument {
    fn default() -> Self {
        let mut note_map = [0u8; 120];
        for (i, entry) in note_map.iter_mut().enumerate() {
            *entry = i as u8;
        }
        Self {
            name: ArrayString::new(),
            filename: ArrayString::new(),
            note_map,
            keyboard: [0; 120],
            volume_envelope: Envelope::default(),
            panning_envelope: Envelope::default(),
            pitch_envelope: Envelope::default(),
            fadeout: 0,
            midi: MidiTarget::None,
            midi_bank: 0,
            midi_program: 0,
            midi_bend_range: 0,
            global_volume: 128,
            panning: None,
            new_note_action: NewNoteAction::Cut,
            pitch_pan_separation: 0,
            pitch_pan_center: 60,
            duplicate_check: DuplicateCheck::Off,
            duplicate_action: DuplicateCheckAction::Cut,
            volume_swing: 0,
            pan_swing: 0,
            cutoff: None,
            resonance: None,
            vibrato: AutoVibrato::default(),
            muted: false,
        }
    }
}

impl Instrument {
    /// Create a new instrument with default settings.
    pub fn new(name: &str) -> Self {
        Self {
            name: clip_name(name),
            ..Self::default()
        }
    }

    /// Set the instrument name (truncating to capacity).
    pub fn set_name(&mut self, name: &str) {
        self.name = clip_name(name);
    }

    /// Set the instrument file name (truncating to capacity).
    pub fn set_filename(&mut self, filename: &str) {
        self.filename = clip_name(filename);
    }
}

/// MIDI or plugin routing for an instrument.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MidiTarget {
    /// Not routed
    #[default]
    None,
    /// MIDI channel (1-16)
    Channel(u8),
    /// Plugin slot (1-based)
    Plugin(u8),
}

/// Action when a new note triggers on a channel already playing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NewNoteAction {
    /// Cut the previous note immediately
    #[default]
    Cut,
    /// Continue the previous note in the background
    Continue,
    /// Send note-off to the previous note
    Off,
    /// Fade out the previous note
    Fade,
}

/// Duplicate note checking mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DuplicateCheck {
    /// No duplicate checking
    #[default]
    Off,
    /// Check for duplicate notes
    Note,
    /// Check for duplicate samples
    Sample,
    /// Check for duplicate instruments
    Instrument,
}

/// Action taken when a duplicate check hits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DuplicateCheckAction {
    /// Cut the duplicate
    #[default]
    Cut,
    /// Send note-off to the duplicate
    Off,
    /// Fade out the duplicate
    Fade,
}

/// An envelope (volume, panning, or pitch/filter).
#[derive(Clone, Debug, Default)]
pub struct Envelope {
    /// Is the envelope enabled?
    pub enabled: bool,
    /// Is the sustain loop active?
    pub sustain: bool,
    /// Is the regular loop active?
    pub looped: bool,
    /// Pitch envelope acts on the filter instead
    pub filter: bool,
    /// Envelope carries over between notes
    pub carry: bool,
    /// Envelope points; tick values are non-decreasing
    pub points: Vec<EnvelopePoint>,
    /// Sustain loop start point index
    pub sustain_start: u8,
    /// Sustain loop end point index
    pub sustain_end: u8,
    /// Regular loop start point index
    pub loop_start: u8,
    /// Regular loop end point index
    pub loop_end: u8,
}

impl Envelope {
    /// Get the interpolated value at a given tick.
    pub fn value_at(&self, tick: u16) -> u8 {
        if self.points.is_empty() {
            return 0;
        }

        let mut prev = &self.points[0];
        for point in &self.points {
            if point.tick > tick {
                if point.tick == prev.tick {
                    return point.value;
                }
                let t = (tick.saturating_sub(prev.tick)) as i32;
                let d = (point.tick - prev.tick) as i32;
                let v = prev.value as i32 + (point.value as i32 - prev.value as i32) * t / d;
                return v as u8;
            }
            prev = point;
        }

        prev.value
    }
}

/// A point in an envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EnvelopePoint {
    /// Tick position
    pub tick: u16,
    /// Value (0-64)
    pub value: u8,
}

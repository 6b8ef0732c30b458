//! The assembled module: everything one decoded container yields.

use alloc::string::String;
use alloc::vec::Vec;

use crate::instrument::Instrument;
use crate::pattern::Pattern;
use crate::sample::Sample;

/// A complete decoded module.
#[derive(Clone, Debug)]
pub struct Module {
    /// Song title
    pub title: String,
    /// Song message
    pub message: String,
    /// Source dialect the pattern commands were written for
    pub dialect: Dialect,
    /// Feature toggles carried over from the source dialect
    pub flags: ModuleFlags,
    /// Restart order position after the song ends
    pub restart_pos: u16,
    /// Initial speed (ticks per row)
    pub default_speed: u8,
    /// Initial tempo in BPM
    pub default_tempo: u8,
    /// Global volume (0-128 in IT, 0-64 elsewhere)
    pub global_volume: u8,
    /// Stereo separation (0-128, IT)
    pub pan_separation: u8,
    /// Sample pre-amplification derived from the header volume byte
    pub sample_preamp: u32,
    /// Per-channel settings
    pub channels: Vec<ChannelSettings>,
    /// Order list
    pub order: Vec<OrderEntry>,
    /// Patterns
    pub patterns: Vec<Pattern>,
    /// Instruments (empty when the module runs in sample mode)
    pub instruments: Vec<Instrument>,
    /// Samples
    pub samples: Vec<Sample>,
    /// Embedded MIDI macro configuration, when any slot is set
    pub midi_macros: Option<MidiMacros>,
    /// Default plugin per channel (0 = none); empty when the container
    /// carries no plugin section
    pub channel_plugins: Vec<u32>,
    /// Opaque plugin state blobs by plugin slot
    pub plugin_chunks: Vec<PluginChunk>,
}

impl Default for Module {
    fn default() -> Self {
        Self {
            title: String::new(),
            message: String::new(),
            dialect: Dialect::default(),
            flags: ModuleFlags::default(),
            restart_pos: 0,
            default_speed: 6,
            default_tempo: 125,
            global_volume: 128,
            pan_separation: 128,
            sample_preamp: 48,
            channels: Vec::new(),
            order: Vec::new(),
            patterns: Vec::new(),
            instruments: Vec::new(),
            samples: Vec::new(),
            midi_macros: None,
            channel_plugins: Vec::new(),
            plugin_chunks: Vec::new(),
        }
    }
}

/// The legacy module dialect a container was converted from. Pattern
/// command semantics and note numbering follow the source dialect.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Dialect {
    It,
    S3m,
    /// XM is the fallback when no dialect flag is set
    #[default]
    Xm,
    Mod,
    Mtm,
}

/// Feature toggles from the file header flag word.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModuleFlags {
    /// Linear (rather than Amiga) frequency slides
    pub linear_slides: bool,
    /// S3M fast volume slides
    pub fast_slides: bool,
    /// S3M Amiga frequency limits
    pub amiga_limits: bool,
    /// IT old effect semantics
    pub it_old_effects: bool,
    /// IT Gxx compatibility
    pub it_compat_gxx: bool,
    /// Extended filter range
    pub extended_filter_range: bool,
    /// ModPlug compatibility quirks
    pub modplug_mode: bool,
    /// Instruments (not just samples) are in use
    pub instrument_mode: bool,
}

/// Per-channel settings.
#[derive(Clone, Copy, Debug)]
pub struct ChannelSettings {
    /// Initial volume (0-64)
    pub volume: u8,
    /// Initial panning (0-256, 128 = center)
    pub pan: u16,
    /// Surround channel
    pub surround: bool,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            volume: 64,
            pan: 128,
            surround: false,
        }
    }
}

/// An entry in the order list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderEntry {
    /// Play pattern with this index
    Pattern(u8),
    /// Skip marker (+++), continue to next
    Skip,
    /// End of song marker (---)
    End,
}

/// Embedded MIDI macro slots, raw as stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MidiMacros {
    /// Parametered macro slots (SF0-SFF)
    pub sfx: [u8; 16],
    /// Fixed macro slots (Z00-Z7F): (data, command) pairs
    pub fixed: [[u8; 2]; 128],
}

/// An opaque plugin state blob.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PluginChunk {
    /// 1-based plugin slot
    pub slot: u8,
    /// Raw chunk contents
    pub data: Vec<u8>,
}

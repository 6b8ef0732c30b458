//! Module model for the MO3 container decoder.
//!
//! The decoder in `mo3-format` fills these types; playback and editing
//! layers consume them. Designed to be `no_std` compatible with the
//! `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod effects;
mod instrument;
mod module;
mod pattern;
mod sample;

pub use effects::{Effect, VolumeCommand};
pub use instrument::{
    DuplicateCheck, DuplicateCheckAction, Envelope, EnvelopePoint, Instrument, MidiTarget,
    NewNoteAction,
};
pub use module::{
    ChannelSettings, Dialect, MidiMacros, Module, ModuleFlags, OrderEntry, PluginChunk,
};
pub use pattern::{Cell, Note, Pattern};
pub use sample::{AutoVibrato, ExternalCodec, LoopType, Sample, SampleData, VibratoWaveform};

use arrayvec::ArrayString;

/// Build a fixed-capacity name string, dropping anything past capacity.
pub(crate) fn clip_name<const CAP: usize>(name: &str) -> ArrayString<CAP> {
    let mut out = ArrayString::new();
    for c in name.chars() {
        if out.try_push(c).is_err() {
            break;
        }
    }
    out
}

//! Fixed-layout records of the music chunk.
//!
//! All records are byte-exact packed little-endian structures; `binrw`
//! derives handle the endianness normalization. Conversion methods
//! translate them into the IR, applying the dialect- and revision-
//! dependent semantics.

use binrw::BinRead;
use mo3_ir::{
    AutoVibrato, Dialect, DuplicateCheck, DuplicateCheckAction, Envelope, EnvelopePoint,
    Instrument, LoopType, MidiTarget, Module, ModuleFlags, NewNoteAction, Sample,
    VibratoWaveform,
};

use crate::FormatError;

/// On-disk size of [`FileHeader`]; the declared music chunk must be
/// larger than this to possibly be valid.
pub(crate) const FILE_HEADER_SIZE: usize = 422;

pub(crate) mod header_flags {
    pub const LINEAR_SLIDES: u32 = 0x0001;
    pub const IS_S3M: u32 = 0x0002;
    pub const S3M_FAST_SLIDES: u32 = 0x0004;
    /// Really "not XM": a file with none of the S3M/MOD/IT flags and
    /// this bit is an MTM.
    pub const IS_MTM: u32 = 0x0008;
    pub const S3M_AMIGA_LIMITS: u32 = 0x0010;
    pub const IS_MOD: u32 = 0x0080;
    pub const IS_IT: u32 = 0x0100;
    pub const INSTRUMENT_MODE: u32 = 0x0200;
    pub const IT_OLD_FX: u32 = 0x0400;
    pub const IT_COMPAT_GXX: u32 = 0x0800;
    pub const MODPLUG_MODE: u32 = 0x1_0000;
    pub const EXT_FILTER_RANGE: u32 = 0x20_0000;
}

pub(crate) mod sample_flags {
    pub const SIXTEEN_BIT: u16 = 0x01;
    pub const LOOP: u16 = 0x10;
    pub const PINGPONG_LOOP: u16 = 0x20;
    pub const SUSTAIN: u16 = 0x100;
    pub const SUSTAIN_PINGPONG: u16 = 0x200;
    pub const STEREO: u16 = 0x400;
    pub const COMPRESSION_MP3: u16 = 0x1000;
    pub const COMPRESSION_DELTA: u16 = 0x2000;
    pub const COMPRESSION_OGG: u16 = 0x1000 | 0x2000;
    pub const COMPRESSION_PREDICTION: u16 = 0x4000;
    pub const COMPRESSION_SHARED_OGG: u16 = 0x1000 | 0x2000 | 0x4000;
    pub const COMPRESSION_MASK: u16 = 0x7000;
}

mod instrument_flags {
    pub const PLAY_ON_MIDI: u32 = 0x01;
    pub const MUTE: u32 = 0x02;
}

/// File header: 422 bytes following the title and message strings.
#[derive(BinRead, Debug, Clone)]
#[br(little)]
pub(crate) struct FileHeader {
    pub num_channels: u8,
    pub num_orders: u16,
    pub restart_pos: u16,
    pub num_patterns: u16,
    pub num_tracks: u16,
    pub num_instruments: u16,
    pub num_samples: u16,
    pub default_speed: u8,
    pub default_tempo: u8,
    pub flags: u32,
    pub global_vol: u8,
    pub pan_separation: u8,
    pub sample_volume: i8,
    pub chn_volume: [u8; 64],
    pub chn_pan: [u8; 64],
    pub sfx_macros: [u8; 16],
    pub fixed_macros: [[u8; 2]; 128],
}

impl FileHeader {
    pub fn validate(&self) -> Result<(), FormatError> {
        if self.num_channels == 0 || self.num_channels > 64 {
            return Err(FormatError::Corrupted("channel count out of range"));
        }
        if self.num_instruments >= 256 {
            return Err(FormatError::Corrupted("instrument count out of range"));
        }
        if self.num_samples >= 4096 {
            return Err(FormatError::Corrupted("sample count out of range"));
        }
        Ok(())
    }

    pub fn dialect(&self) -> Dialect {
        if self.flags & header_flags::IS_IT != 0 {
            Dialect::It
        } else if self.flags & header_flags::IS_S3M != 0 {
            Dialect::S3m
        } else if self.flags & header_flags::IS_MOD != 0 {
            Dialect::Mod
        } else if self.flags & header_flags::IS_MTM != 0 {
            Dialect::Mtm
        } else {
            Dialect::Xm
        }
    }

    pub fn module_flags(&self) -> ModuleFlags {
        use header_flags as f;
        ModuleFlags {
            linear_slides: self.flags & f::LINEAR_SLIDES != 0,
            fast_slides: self.flags & f::S3M_FAST_SLIDES != 0,
            amiga_limits: self.flags & f::S3M_AMIGA_LIMITS != 0,
            it_old_effects: self.flags & f::IT_OLD_FX != 0,
            it_compat_gxx: self.flags & f::IT_COMPAT_GXX != 0,
            extended_filter_range: self.flags & f::EXT_FILTER_RANGE != 0,
            modplug_mode: self.flags & f::MODPLUG_MODE != 0,
            instrument_mode: self.flags & f::INSTRUMENT_MODE != 0,
        }
    }
}

/// Header volume byte to sample pre-amplification.
pub(crate) fn sample_preamp(volume: i8) -> u32 {
    if volume < 0 {
        (i32::from(volume) + 52).max(0) as u32
    } else {
        (f64::from(volume) * 3.1 / 20.0).exp().round() as u32 + 51
    }
}

mod envelope_flags {
    pub const ENABLED: u8 = 0x01;
    pub const SUSTAIN: u8 = 0x02;
    pub const LOOP: u8 = 0x04;
    pub const FILTER: u8 = 0x10;
    pub const CARRY: u8 = 0x20;
}

/// Envelope record: 106 bytes, embedded three times per instrument.
#[derive(BinRead, Debug, Clone)]
#[br(little)]
pub(crate) struct EnvelopeRecord {
    pub flags: u8,
    pub num_nodes: u8,
    pub sustain_start: u8,
    pub sustain_end: u8,
    pub loop_start: u8,
    pub loop_end: u8,
    pub points: [[i16; 2]; 25],
}

impl EnvelopeRecord {
    /// Convert into an IR envelope. `value_shift` scales the raw node
    /// values down (5 for pitch envelopes); ticks are clamped to be
    /// non-decreasing.
    pub fn to_envelope(&self, value_shift: u8) -> Envelope {
        use envelope_flags as f;
        let mut env = Envelope {
            enabled: self.flags & f::ENABLED != 0,
            sustain: self.flags & f::SUSTAIN != 0,
            looped: self.flags & f::LOOP != 0,
            filter: self.flags & f::FILTER != 0,
            carry: self.flags & f::CARRY != 0,
            sustain_start: self.sustain_start,
            sustain_end: self.sustain_end,
            loop_start: self.loop_start,
            loop_end: self.loop_end,
            ..Envelope::default()
        };

        let nodes = usize::from(self.num_nodes.min(25));
        let mut last_tick = 0u16;
        for (i, point) in self.points[..nodes].iter().enumerate() {
            let mut tick = point[0] as u16;
            if i > 0 && tick < last_tick {
                tick = last_tick.saturating_add(1);
            }
            last_tick = tick;
            let value = (point[1] >> value_shift).clamp(0, 64) as u8;
            env.points.push(EnvelopePoint { tick, value });
        }
        env
    }
}

/// XM-style auto-vibrato quad inside the instrument record.
#[derive(BinRead, Debug, Clone, Copy)]
#[br(little)]
pub(crate) struct VibratoRecord {
    pub waveform: u8,
    pub sweep: u8,
    pub depth: u8,
    pub rate: u8,
}

/// Instrument record: 826 bytes following the name string(s).
#[derive(BinRead, Debug, Clone)]
#[br(little)]
pub(crate) struct InstrumentRecord {
    pub flags: u32,
    pub sample_map: [[u16; 2]; 120],
    pub vol_env: EnvelopeRecord,
    pub pan_env: EnvelopeRecord,
    pub pitch_env: EnvelopeRecord,
    pub vibrato: VibratoRecord,
    pub fade_out: u16,
    pub midi_channel: u8,
    pub midi_bank: u8,
    pub midi_patch: u8,
    pub midi_bend: u8,
    pub global_vol: u8,
    pub panning: u16,
    pub nna: u8,
    pub pps: u8,
    pub ppc: u8,
    pub dct: u8,
    pub dca: u8,
    pub vol_swing: u16,
    pub pan_swing: u16,
    pub cutoff: u8,
    pub resonance: u8,
}

impl InstrumentRecord {
    pub fn to_instrument(&self, dialect: Dialect) -> Instrument {
        let mut inst = Instrument::default();

        for (i, entry) in self.sample_map.iter().enumerate() {
            inst.note_map[i] = entry[0] as u8;
            inst.keyboard[i] = entry[1].wrapping_add(1);
        }

        inst.volume_envelope = self.vol_env.to_envelope(0);
        inst.panning_envelope = self.pan_env.to_envelope(0);
        inst.pitch_envelope = self.pitch_env.to_envelope(5);

        inst.fadeout = self.fade_out;
        // Values past 127 select a plugin slot. The play-on-MIDI flag
        // marks an XM-style 0-based channel; otherwise the channel is
        // 1-based with 0 meaning none.
        inst.midi = if self.midi_channel >= 128 {
            MidiTarget::Plugin(self.midi_channel - 127)
        } else if self.midi_channel < 17 && self.flags & instrument_flags::PLAY_ON_MIDI != 0 {
            MidiTarget::Channel(self.midi_channel + 1)
        } else if (1..17).contains(&self.midi_channel) {
            MidiTarget::Channel(self.midi_channel)
        } else {
            MidiTarget::None
        };
        inst.midi_bank = self.midi_bank;
        inst.midi_program = self.midi_patch;
        inst.midi_bend_range = self.midi_bend;

        if dialect == Dialect::It {
            inst.global_volume = self.global_vol.min(128);
        }
        if self.panning <= 256 {
            inst.panning = Some(self.panning);
        }

        inst.new_note_action = match self.nna {
            1 => NewNoteAction::Continue,
            2 => NewNoteAction::Off,
            3 => NewNoteAction::Fade,
            _ => NewNoteAction::Cut,
        };
        inst.pitch_pan_separation = self.pps as i8;
        inst.pitch_pan_center = self.ppc;
        inst.duplicate_check = match self.dct {
            1 => DuplicateCheck::Note,
            2 => DuplicateCheck::Sample,
            3 => DuplicateCheck::Instrument,
            _ => DuplicateCheck::Off,
        };
        inst.duplicate_action = match self.dca {
            1 => DuplicateCheckAction::Off,
            2 => DuplicateCheckAction::Fade,
            _ => DuplicateCheckAction::Cut,
        };

        inst.volume_swing = self.vol_swing.min(100) as u8;
        inst.pan_swing = self.pan_swing.min(64) as u8;
        inst.cutoff = (self.cutoff & 0x80 != 0).then_some(self.cutoff & 0x7F);
        inst.resonance = (self.resonance & 0x80 != 0).then_some(self.resonance & 0x7F);

        inst.vibrato = AutoVibrato {
            waveform: xm_vibrato_waveform(self.vibrato.waveform),
            sweep: self.vibrato.sweep,
            depth: self.vibrato.depth,
            rate: self.vibrato.rate,
        };
        inst.muted = self.flags & instrument_flags::MUTE != 0;

        inst
    }
}

/// Sample record: 41 bytes following the name string(s).
#[derive(BinRead, Debug, Clone)]
#[br(little)]
pub(crate) struct SampleRecord {
    /// Frequency in the IT/S3M dialects, finetune elsewhere
    pub freq_finetune: i32,
    pub transpose: i8,
    pub default_volume: u8,
    pub panning: u16,
    pub length: u32,
    pub loop_start: u32,
    pub loop_end: u32,
    pub flags: u16,
    pub vib_type: u8,
    pub vib_sweep: u8,
    pub vib_depth: u8,
    pub vib_rate: u8,
    pub global_vol: u8,
    pub sustain_start: u32,
    pub sustain_end: u32,
    pub compressed_size: i32,
    pub encoder_delay: u16,
}

impl SampleRecord {
    pub fn to_sample(&self, dialect: Dialect, version: u8) -> Sample {
        use sample_flags as f;
        let mut sample = Sample::default();

        match dialect {
            Dialect::It | Dialect::S3m => {
                // Revision 5 stores the rate directly; older revisions
                // store an exponential finetune around 15787 Hz.
                sample.rate = if version >= 5 {
                    self.freq_finetune as u32
                } else {
                    (15787.0 * (f64::from(self.freq_finetune) / 1536.0).exp2()).round() as u32
                };
            }
            Dialect::Mtm => {}
            Dialect::Xm | Dialect::Mod => {
                sample.finetune = (self.freq_finetune - 128) as i8;
                sample.transpose = self.transpose;
            }
        }

        sample.default_volume = self.default_volume.min(64);
        if self.panning <= 256 {
            sample.panning = Some(self.panning);
        }
        sample.length = self.length;
        sample.loop_start = self.loop_start;
        sample.loop_end = self.loop_end;
        sample.loop_type = if self.flags & f::LOOP != 0 {
            if self.flags & f::PINGPONG_LOOP != 0 {
                LoopType::PingPong
            } else {
                LoopType::Forward
            }
        } else {
            LoopType::None
        };
        sample.sustain_start = self.sustain_start;
        sample.sustain_end = self.sustain_end;
        sample.sustain_type = if self.flags & f::SUSTAIN != 0 {
            if self.flags & f::SUSTAIN_PINGPONG != 0 {
                LoopType::PingPong
            } else {
                LoopType::Forward
            }
        } else {
            LoopType::None
        };

        sample.vibrato = AutoVibrato {
            waveform: it_vibrato_waveform(self.vib_type),
            sweep: self.vib_sweep,
            depth: self.vib_depth,
            rate: self.vib_rate,
        };
        if dialect == Dialect::It {
            sample.global_volume = self.global_vol.min(64);
        }
        sample.encoder_delay = self.encoder_delay;

        sample
    }
}

/// IT-coded auto-vibrato waveform byte (sample records).
fn it_vibrato_waveform(value: u8) -> VibratoWaveform {
    match value & 7 {
        1 => VibratoWaveform::RampDown,
        2 => VibratoWaveform::Square,
        3 => VibratoWaveform::Random,
        4 => VibratoWaveform::RampUp,
        _ => VibratoWaveform::Sine,
    }
}

/// XM-coded auto-vibrato waveform byte (instrument records).
fn xm_vibrato_waveform(value: u8) -> VibratoWaveform {
    match value & 3 {
        1 => VibratoWaveform::Square,
        2 => VibratoWaveform::RampUp,
        3 => VibratoWaveform::RampDown,
        _ => VibratoWaveform::Sine,
    }
}

/// Populate a module's scalar fields and channel settings from the
/// header.
pub(crate) fn apply_header(module: &mut Module, header: &FileHeader) {
    module.restart_pos = header.restart_pos;
    module.default_speed = if header.default_speed != 0 { header.default_speed } else { 6 };
    module.default_tempo = if header.default_tempo != 0 { header.default_tempo } else { 125 };
    module.global_volume = header.global_vol;
    module.pan_separation = header.pan_separation;
    module.sample_preamp = sample_preamp(header.sample_volume);

    let it = module.dialect == Dialect::It;
    for chn in 0..usize::from(header.num_channels) {
        let mut settings = mo3_ir::ChannelSettings::default();
        if it {
            settings.volume = header.chn_volume[chn].min(64);
        }
        // Pan byte 127 marks a surround channel.
        if header.chn_pan[chn] == 127 {
            settings.pan = 128;
            settings.surround = true;
        } else {
            settings.pan = u16::from(header.chn_pan[chn]);
        }
        module.channels.push(settings);
    }

    let any_macros = header.sfx_macros.iter().any(|&m| m != 0)
        || header.fixed_macros.iter().any(|m| m[1] != 0);
    if any_macros {
        module.midi_macros = Some(mo3_ir::MidiMacros {
            sfx: header.sfx_macros,
            fixed: header.fixed_macros,
        });
    }
}

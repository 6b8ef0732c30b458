//! Container loader: sequences decompression, record parsing, track
//! translation and sample payload decoding into a finished module.

use mo3_ir::{
    Dialect, ExternalCodec, Module, OrderEntry, Pattern, PluginChunk, Sample, SampleData,
};

use crate::delta::{self, Delta16, Delta8};
use crate::lz;
use crate::reader::ByteReader;
use crate::records::{
    self, sample_flags, FileHeader, InstrumentRecord, SampleRecord, FILE_HEADER_SIZE,
};
use crate::tracks;
use crate::FormatError;

const MAGIC: &[u8] = b"MO3";
const MAX_VERSION: u8 = 5;
const MAX_PATTERN_ROWS: u16 = 1024;

/// What to decode from a container.
#[derive(Clone, Copy, Debug)]
pub struct LoadOptions {
    /// Decode pattern data (otherwise patterns stay empty shells)
    pub load_patterns: bool,
    /// Decode sample payloads (otherwise samples stay empty; the
    /// payload region of the file is never touched)
    pub load_samples: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            load_patterns: true,
            load_samples: true,
        }
    }
}

/// Cheap header check: magic bytes, readable size field and a declared
/// chunk large enough to hold a file header. Used to route a file to
/// this loader without decoding anything.
pub fn probe(data: &[u8]) -> bool {
    let mut file = ByteReader::new(data);
    if !file.can_read(12) {
        return false;
    }
    match (file.read_bytes(3), file.read_u8(), file.read_u32_le()) {
        (Ok(magic), Ok(_version), Ok(music_size)) => {
            magic == MAGIC && music_size as usize > FILE_HEADER_SIZE
        }
        _ => false,
    }
}

/// Decode a whole container into a module.
///
/// On any structural error no partial module escapes; the caller is
/// expected to hand the file to its next candidate loader when the
/// error is [`FormatError::InvalidHeader`].
pub fn load(data: &[u8], options: LoadOptions) -> Result<Module, FormatError> {
    let mut file = ByteReader::new(data);

    if !file.can_read(12) || file.read_bytes(3)? != MAGIC {
        return Err(FormatError::InvalidHeader);
    }
    let version = file.read_u8()?;
    let music_size = file.read_u32_le()? as usize;
    if music_size <= FILE_HEADER_SIZE {
        return Err(FormatError::InvalidHeader);
    }
    if version > MAX_VERSION {
        return Err(FormatError::UnsupportedVersion(version));
    }
    // Revision 5 records the compressed chunk size so the payload
    // region can be located without trusting the decompressor's final
    // position.
    let compressed_size = if version >= 5 {
        Some(file.read_u32_le()? as usize)
    } else {
        None
    };

    let music = lz::decompress(&mut file, music_size)?;
    if let Some(size) = compressed_size {
        file.seek(12 + size);
    }

    let mut chunk = ByteReader::new(&music);
    let mut module = Module {
        title: chunk.read_null_string(),
        message: chunk.read_null_string(),
        ..Module::default()
    };

    let header: FileHeader = chunk.record()?;
    header.validate()?;
    module.dialect = header.dialect();
    module.flags = header.module_flags();
    records::apply_header(&mut module, &header);

    log::debug!(
        "[MO3] rev {} {:?} module \"{}\": {} channels, {} patterns, {} tracks, {} instruments, {} samples",
        version,
        module.dialect,
        module.title,
        header.num_channels,
        header.num_patterns,
        header.num_tracks,
        header.num_instruments,
        header.num_samples,
    );

    read_order(&mut chunk, &header, &mut module)?;
    read_patterns(&mut chunk, &header, &mut module, options)?;
    read_instruments(&mut chunk, &header, version, &mut module)?;
    read_samples(&mut chunk, &mut file, &header, version, options, &mut module)?;

    if module.dialect == Dialect::Xm {
        propagate_instrument_vibrato(&mut module);
    }

    read_plugin_section(&mut chunk, &header, &mut module)?;

    Ok(module)
}

fn read_order(
    chunk: &mut ByteReader<'_>,
    header: &FileHeader,
    module: &mut Module,
) -> Result<(), FormatError> {
    for _ in 0..header.num_orders {
        module.order.push(match chunk.read_u8()? {
            0xFF => OrderEntry::End,
            0xFE => OrderEntry::Skip,
            pat => OrderEntry::Pattern(pat),
        });
    }
    Ok(())
}

fn read_patterns(
    chunk: &mut ByteReader<'_>,
    header: &FileHeader,
    module: &mut Module,
    options: LoadOptions,
) -> Result<(), FormatError> {
    let num_patterns = usize::from(header.num_patterns);
    let num_channels = usize::from(header.num_channels);

    // Track assignments and row counts sit in front of the track pool;
    // read them whole so pattern decoding can never desynchronize them.
    let mut assignments = Vec::with_capacity(num_patterns * num_channels);
    for _ in 0..num_patterns * num_channels {
        assignments.push(chunk.read_u16_le()?);
    }
    let mut row_counts = Vec::with_capacity(num_patterns);
    for _ in 0..num_patterns {
        row_counts.push(chunk.read_u16_le()?);
    }

    let mut track_data = Vec::with_capacity(usize::from(header.num_tracks));
    for _ in 0..header.num_tracks {
        let len = chunk.read_u32_le()? as usize;
        track_data.push(chunk.read_bytes(len)?);
    }

    for (pat, &rows) in row_counts.iter().enumerate() {
        if rows > MAX_PATTERN_ROWS {
            return Err(FormatError::Corrupted("pattern row count out of range"));
        }
        let mut pattern = Pattern::new(rows, header.num_channels);
        if options.load_patterns {
            for chn in 0..num_channels {
                let track = usize::from(assignments[pat * num_channels + chn]);
                let data = track_data
                    .get(track)
                    .ok_or(FormatError::Corrupted("track index out of range"))?;
                tracks::decode_track(data, &mut pattern, chn as u8, module.dialect);
            }
        }
        module.patterns.push(pattern);
    }
    Ok(())
}

fn read_instruments(
    chunk: &mut ByteReader<'_>,
    header: &FileHeader,
    version: u8,
    module: &mut Module,
) -> Result<(), FormatError> {
    // IT in sample mode still stores full instrument headers; they are
    // parsed to keep the stream position and then dropped.
    let sample_mode = module.dialect == Dialect::It && !module.flags.instrument_mode;

    for _ in 0..header.num_instruments {
        let name = chunk.read_null_string();
        let filename = if version >= 5 {
            chunk.read_null_string()
        } else {
            String::new()
        };
        let record: InstrumentRecord = chunk.record()?;
        if sample_mode {
            continue;
        }
        let mut instrument = record.to_instrument(module.dialect);
        instrument.set_name(&name);
        instrument.set_filename(&filename);
        module.instruments.push(instrument);
    }
    Ok(())
}

fn read_samples(
    chunk: &mut ByteReader<'_>,
    file: &mut ByteReader<'_>,
    header: &FileHeader,
    version: u8,
    options: LoadOptions,
    module: &mut Module,
) -> Result<(), FormatError> {
    for index in 0..usize::from(header.num_samples) {
        let name = chunk.read_null_string();
        let filename = if version >= 5 {
            chunk.read_null_string()
        } else {
            String::new()
        };
        let record: SampleRecord = chunk.record()?;
        let mut sample = record.to_sample(module.dialect, version);
        sample.set_name(&name);
        sample.set_filename(&filename);

        let compression = record.flags & sample_flags::COMPRESSION_MASK;
        let shared_header = if version >= 5 && compression == sample_flags::COMPRESSION_SHARED_OGG
        {
            chunk.read_u16_le()?
        } else {
            0
        };

        if options.load_samples {
            read_sample_payload(file, &record, &mut sample, shared_header, &module.samples, index);
        }
        module.samples.push(sample);
    }
    Ok(())
}

/// Read and decode one sample's payload from the container tail.
///
/// Failures here are per-sample: the slot is left empty with a warning
/// and decoding continues, but the payload bytes are always consumed so
/// later samples stay aligned.
fn read_sample_payload(
    file: &mut ByteReader<'_>,
    record: &SampleRecord,
    sample: &mut Sample,
    shared_header: u16,
    decoded: &[Sample],
    index: usize,
) {
    use sample_flags as f;

    if record.compressed_size > 0 {
        let Ok(payload) = file.read_bytes(record.compressed_size as usize) else {
            log::warn!("[MO3] sample {}: payload extends past end of container", index + 1);
            return;
        };
        let stereo = record.flags & f::STEREO != 0;
        let wide = record.flags & f::SIXTEEN_BIT != 0;
        let frames = record.length as usize;

        match record.flags & f::COMPRESSION_MASK {
            0 => sample.data = read_pcm(payload, frames, wide, stereo, index),
            f::COMPRESSION_DELTA => {
                if let Some(data) = read_delta(payload, frames, wide, stereo, false, index) {
                    sample.data = data;
                }
            }
            f::COMPRESSION_PREDICTION => {
                if let Some(data) = read_delta(payload, frames, wide, stereo, true, index) {
                    sample.data = data;
                }
            }
            f::COMPRESSION_MP3 => {
                sample.data = SampleData::External {
                    codec: ExternalCodec::Mp3,
                    data: payload.to_vec(),
                };
            }
            f::COMPRESSION_OGG => {
                sample.data = SampleData::External {
                    codec: ExternalCodec::OggVorbis,
                    data: payload.to_vec(),
                };
            }
            f::COMPRESSION_SHARED_OGG => {
                sample.data = SampleData::External {
                    codec: ExternalCodec::SharedOggVorbis { shared_header },
                    data: payload.to_vec(),
                };
            }
            kind => {
                log::warn!(
                    "[MO3] sample {}: unsupported compression kind {:#06x}, leaving it empty",
                    index + 1,
                    kind
                );
            }
        }
    } else if record.compressed_size < 0 {
        // Negative size: alias of the sample that many slots back.
        let back = record.compressed_size.unsigned_abs() as usize;
        let Some(source) = index.checked_sub(back).and_then(|i| decoded.get(i)) else {
            log::warn!("[MO3] sample {}: alias reaches before the sample table", index + 1);
            return;
        };
        sample.length = sample.length.min(source.length);
        sample.data = source.data.cloned_prefix(sample.length as usize);
    }
}

/// Uncompressed signed little-endian PCM; stereo is stored planar (all
/// left frames, then all right frames).
fn read_pcm(payload: &[u8], frames: usize, wide: bool, stereo: bool, index: usize) -> SampleData {
    let frame_bytes = if wide { 2 } else { 1 };
    let channels = if stereo { 2 } else { 1 };
    let available = payload.len() / (frame_bytes * channels);
    if available < frames {
        log::warn!(
            "[MO3] sample {}: PCM payload holds {} of {} frames",
            index + 1,
            available,
            frames
        );
    }
    let frames = frames.min(available);

    let plane8 = |plane: usize| -> Vec<i8> {
        payload[plane * frames..(plane + 1) * frames]
            .iter()
            .map(|&b| b as i8)
            .collect()
    };
    let plane16 = |plane: usize| -> Vec<i16> {
        payload[plane * frames * 2..(plane + 1) * frames * 2]
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect()
    };

    match (wide, stereo) {
        (false, false) => SampleData::Mono8(plane8(0)),
        (false, true) => SampleData::Stereo8(plane8(0), plane8(1)),
        (true, false) => SampleData::Mono16(plane16(0)),
        (true, true) => SampleData::Stereo16(plane16(0), plane16(1)),
    }
}

/// Delta-compressed PCM, plain or predictive.
fn read_delta(
    payload: &[u8],
    frames: usize,
    wide: bool,
    stereo: bool,
    predictive: bool,
    index: usize,
) -> Option<SampleData> {
    let channels = if stereo { 2 } else { 1 };
    // Every sample costs at least three control bits; anything claiming
    // more is corrupt, and rejecting it early keeps allocations sane.
    if frames.saturating_mul(channels) > payload.len().saturating_mul(3) {
        log::warn!("[MO3] sample {}: delta payload too short for its length", index + 1);
        return None;
    }

    let mut src = ByteReader::new(payload);
    let result = if wide {
        if predictive {
            delta::unpack_delta_prediction::<Delta16>(&mut src, frames, channels)
        } else {
            delta::unpack_delta::<Delta16>(&mut src, frames, channels)
        }
    } else if predictive {
        delta::unpack_delta_prediction::<Delta8>(&mut src, frames, channels)
    } else {
        delta::unpack_delta::<Delta8>(&mut src, frames, channels)
    };

    let planes = match result {
        Ok(planes) => planes,
        Err(_) => {
            log::warn!("[MO3] sample {}: delta payload ended early, leaving it empty", index + 1);
            return None;
        }
    };

    Some(match (wide, stereo) {
        (false, false) => SampleData::Mono8(narrow8(&planes[0])),
        (false, true) => SampleData::Stereo8(narrow8(&planes[0]), narrow8(&planes[1])),
        (true, false) => SampleData::Mono16(narrow16(&planes[0])),
        (true, true) => SampleData::Stereo16(narrow16(&planes[0]), narrow16(&planes[1])),
    })
}

fn narrow8(plane: &[i32]) -> Vec<i8> {
    plane.iter().map(|&v| v as i8).collect()
}

fn narrow16(plane: &[i32]) -> Vec<i16> {
    plane.iter().map(|&v| v as i16).collect()
}

/// XM keeps auto-vibrato on the instrument; push it down onto every
/// sample the instrument's keyboard references.
fn propagate_instrument_vibrato(module: &mut Module) {
    for instrument in &module.instruments {
        for &key in &instrument.keyboard {
            if key == 0 {
                continue;
            }
            if let Some(sample) = module.samples.get_mut(usize::from(key) - 1) {
                sample.vibrato = instrument.vibrato;
            }
        }
    }
}

/// Optional trailing plugin section: a flag byte, per-channel default
/// plugins, then (slot, length-prefixed opaque chunk) pairs until a
/// zero slot.
fn read_plugin_section(
    chunk: &mut ByteReader<'_>,
    header: &FileHeader,
    module: &mut Module,
) -> Result<(), FormatError> {
    if !chunk.can_read(1) {
        return Ok(());
    }
    let plugin_flags = chunk.read_u8()?;
    if plugin_flags & 1 != 0 {
        for _ in 0..header.num_channels {
            module.channel_plugins.push(chunk.read_u32_le()?);
        }
    }
    while chunk.can_read(1) {
        let slot = chunk.read_u8()?;
        if slot == 0 {
            break;
        }
        let len = chunk.read_u32_le()? as usize;
        let data = chunk.read_bytes(len)?.to_vec();
        module.plugin_chunks.push(PluginChunk { slot, data });
    }
    Ok(())
}

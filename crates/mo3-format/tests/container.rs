//! Integration tests decoding whole synthetic containers.
//!
//! The containers are assembled in memory: a music chunk is built
//! record by record, wrapped in an all-literal compressed stream, and
//! followed by the sample payload region.

use mo3_format::{load, probe, FormatError, LoadOptions};
use mo3_ir::{Dialect, Effect, Note, OrderEntry, SampleData};

// --- byte builders ---

fn push_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn push_i32(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn push_cstr(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    out.push(0);
}

/// Wrap a payload in an all-literal compressed stream: the seed byte,
/// then one zero control byte in front of every group of eight
/// literals.
fn lz_literals(data: &[u8]) -> Vec<u8> {
    let mut out = vec![data[0]];
    for group in data[1..].chunks(8) {
        out.push(0x00);
        out.extend_from_slice(group);
    }
    out
}

struct TestHeader {
    channels: u8,
    orders: u16,
    patterns: u16,
    tracks: u16,
    instruments: u16,
    samples: u16,
    speed: u8,
    tempo: u8,
    flags: u32,
}

fn file_header(fields: &TestHeader, chn_pan: &[u8]) -> Vec<u8> {
    let mut h = Vec::new();
    h.push(fields.channels);
    push_u16(&mut h, fields.orders);
    push_u16(&mut h, 0); // restart position
    push_u16(&mut h, fields.patterns);
    push_u16(&mut h, fields.tracks);
    push_u16(&mut h, fields.instruments);
    push_u16(&mut h, fields.samples);
    h.push(fields.speed);
    h.push(fields.tempo);
    push_u32(&mut h, fields.flags);
    h.push(128); // global volume
    h.push(128); // pan separation
    h.push(0); // sample volume
    h.extend_from_slice(&[64u8; 64]); // channel volumes
    let mut pan = [128u8; 64];
    pan[..chn_pan.len()].copy_from_slice(chn_pan);
    h.extend_from_slice(&pan);
    h.extend_from_slice(&[0u8; 16]); // sfx macros
    h.extend_from_slice(&[0u8; 256]); // fixed macros
    assert_eq!(h.len(), 422);
    h
}

fn instrument_record() -> Vec<u8> {
    let mut r = Vec::new();
    push_u32(&mut r, 0); // flags
    for note in 0u16..120 {
        push_u16(&mut r, note); // note map entry
        push_u16(&mut r, 0); // sample map entry
    }
    r.extend_from_slice(&[0u8; 106 * 3]); // three disabled envelopes
    r.extend_from_slice(&[0u8; 4]); // vibrato
    push_u16(&mut r, 256); // fadeout
    r.extend_from_slice(&[0u8; 4]); // midi channel/bank/patch/bend
    r.push(128); // global volume
    push_u16(&mut r, 0xFFFF); // panning disabled
    r.extend_from_slice(&[0u8; 5]); // nna/pps/ppc/dct/dca
    push_u16(&mut r, 0); // volume swing
    push_u16(&mut r, 0); // pan swing
    r.push(0); // cutoff
    r.push(0); // resonance
    assert_eq!(r.len(), 826);
    r
}

fn sample_record(length: u32, flags: u16, compressed_size: i32, freq: i32) -> Vec<u8> {
    let mut r = Vec::new();
    push_i32(&mut r, freq);
    r.push(0); // transpose
    r.push(64); // default volume
    push_u16(&mut r, 0xFFFF); // panning disabled
    push_u32(&mut r, length);
    push_u32(&mut r, 0); // loop start
    push_u32(&mut r, 0); // loop end
    push_u16(&mut r, flags);
    r.extend_from_slice(&[0u8; 4]); // auto-vibrato
    r.push(64); // global volume
    push_u32(&mut r, 0); // sustain start
    push_u32(&mut r, 0); // sustain end
    push_i32(&mut r, compressed_size);
    push_u16(&mut r, 0); // encoder delay
    assert_eq!(r.len(), 41);
    r
}

fn container(version: u8, music: &[u8], payloads: &[u8]) -> Vec<u8> {
    let packed = lz_literals(music);
    let mut out = Vec::new();
    out.extend_from_slice(b"MO3");
    out.push(version);
    push_u32(&mut out, music.len() as u32);
    if version >= 5 {
        push_u32(&mut out, packed.len() as u32);
    }
    out.extend_from_slice(&packed);
    out.extend_from_slice(payloads);
    out
}

// --- a full revision 5 IT module ---

const IS_IT: u32 = 0x0100;
const INSTRUMENT_MODE: u32 = 0x0200;
const DELTA: u16 = 0x2000;

fn it_module_bytes() -> Vec<u8> {
    let mut music = Vec::new();
    push_cstr(&mut music, "synthetic");
    push_cstr(&mut music, "listen to this");
    music.extend_from_slice(&file_header(
        &TestHeader {
            channels: 2,
            orders: 2,
            patterns: 1,
            tracks: 2,
            instruments: 1,
            samples: 4,
            speed: 0,
            tempo: 0,
            flags: IS_IT | INSTRUMENT_MODE,
        },
        &[10, 127],
    ));

    music.extend_from_slice(&[0x00, 0xFE]); // order list
    push_u16(&mut music, 0); // pattern 0, channel 0 -> track 0
    push_u16(&mut music, 1); // pattern 0, channel 1 -> track 1
    push_u16(&mut music, 4); // pattern 0 row count

    let track0 = [0x11, 0x01, 0x3C, 0x00];
    push_u32(&mut music, track0.len() as u32);
    music.extend_from_slice(&track0);
    push_u32(&mut music, 1);
    music.push(0x00); // empty track

    push_cstr(&mut music, "piano");
    push_cstr(&mut music, "piano.iti");
    music.extend_from_slice(&instrument_record());

    push_cstr(&mut music, "kick");
    push_cstr(&mut music, "kick.wav");
    music.extend_from_slice(&sample_record(4, 0, 4, 22050));
    push_cstr(&mut music, "alias");
    push_cstr(&mut music, "");
    music.extend_from_slice(&sample_record(8, 0, -1, 22050));
    push_cstr(&mut music, "silent");
    push_cstr(&mut music, "");
    music.extend_from_slice(&sample_record(0, 0, 0, 22050));
    push_cstr(&mut music, "pad");
    push_cstr(&mut music, "");
    music.extend_from_slice(&sample_record(4, DELTA, 3, 22050));

    // Plugin section
    music.push(0x01);
    push_u32(&mut music, 2); // channel 0 default plugin
    push_u32(&mut music, 0); // channel 1: none
    music.push(1); // plugin slot 1
    push_u32(&mut music, 3);
    music.extend_from_slice(&[0xAA, 0xBB, 0xCC]);
    music.push(0); // terminator

    let mut payloads = Vec::new();
    payloads.extend_from_slice(&[0x01, 0x02, 0xFD, 0x04]); // kick PCM
    payloads.extend_from_slice(&[0b00011100, 0b00100010, 0b01000000]); // pad deltas

    container(5, &music, &payloads)
}

#[test]
fn it_module_structure() {
    let module = load(&it_module_bytes(), LoadOptions::default()).unwrap();

    assert_eq!(module.title, "synthetic");
    assert_eq!(module.message, "listen to this");
    assert_eq!(module.dialect, Dialect::It);
    assert!(module.flags.instrument_mode);
    assert_eq!(module.default_speed, 6); // zero falls back to defaults
    assert_eq!(module.default_tempo, 125);
    assert_eq!(module.sample_preamp, 52);

    assert_eq!(module.channels.len(), 2);
    assert_eq!(module.channels[0].pan, 10);
    assert!(!module.channels[0].surround);
    assert_eq!(module.channels[1].pan, 128);
    assert!(module.channels[1].surround);

    assert_eq!(
        module.order,
        vec![OrderEntry::Pattern(0), OrderEntry::Skip]
    );
    assert!(module.midi_macros.is_none());
}

#[test]
fn it_module_patterns() {
    let module = load(&it_module_bytes(), LoadOptions::default()).unwrap();

    assert_eq!(module.patterns.len(), 1);
    let pattern = &module.patterns[0];
    assert_eq!(pattern.rows, 4);
    assert_eq!(pattern.channels, 2);

    // The track event replicates its cell onto the following row.
    assert_eq!(pattern.cell(0, 0).note, Note::On(0x3C));
    assert_eq!(pattern.cell(1, 0).note, Note::On(0x3C));
    assert!(pattern.cell(2, 0).is_empty());
    for row in 0..4 {
        assert!(pattern.cell(row, 1).is_empty());
    }
}

#[test]
fn it_module_instruments() {
    let module = load(&it_module_bytes(), LoadOptions::default()).unwrap();

    assert_eq!(module.instruments.len(), 1);
    let inst = &module.instruments[0];
    assert_eq!(inst.name.as_str(), "piano");
    assert_eq!(inst.filename.as_str(), "piano.iti");
    assert_eq!(inst.fadeout, 256);
    assert_eq!(inst.keyboard[0], 1);
    assert_eq!(inst.note_map[60], 60);
    assert_eq!(inst.panning, None);
    assert!(!inst.volume_envelope.enabled);
}

#[test]
fn it_module_samples() {
    let module = load(&it_module_bytes(), LoadOptions::default()).unwrap();
    assert_eq!(module.samples.len(), 4);

    let kick = &module.samples[0];
    assert_eq!(kick.name.as_str(), "kick");
    assert_eq!(kick.filename.as_str(), "kick.wav");
    assert_eq!(kick.rate, 22050);
    assert_eq!(kick.data, SampleData::Mono8(vec![1, 2, -3, 4]));

    // The alias sample back-references the kick one slot earlier and is
    // limited to its length.
    let alias = &module.samples[1];
    assert_eq!(alias.name.as_str(), "alias");
    assert_eq!(alias.length, 4);
    assert_eq!(alias.data, kick.data);

    assert!(module.samples[2].is_empty());

    let pad = &module.samples[3];
    assert_eq!(pad.data, SampleData::Mono8(vec![3, 3, 3, 3]));
}

#[test]
fn it_module_plugins() {
    let module = load(&it_module_bytes(), LoadOptions::default()).unwrap();

    assert_eq!(module.channel_plugins, vec![2, 0]);
    assert_eq!(module.plugin_chunks.len(), 1);
    assert_eq!(module.plugin_chunks[0].slot, 1);
    assert_eq!(module.plugin_chunks[0].data, vec![0xAA, 0xBB, 0xCC]);
}

#[test]
fn skipping_sample_data_leaves_samples_empty() {
    let options = LoadOptions {
        load_samples: false,
        ..LoadOptions::default()
    };
    let module = load(&it_module_bytes(), options).unwrap();

    assert_eq!(module.samples.len(), 4);
    assert!(module.samples[0].is_empty());
    assert_eq!(module.samples[0].length, 4); // record fields survive
    assert_eq!(module.patterns[0].cell(0, 0).note, Note::On(0x3C));
}

#[test]
fn skipping_pattern_data_keeps_shape() {
    let options = LoadOptions {
        load_patterns: false,
        ..LoadOptions::default()
    };
    let module = load(&it_module_bytes(), options).unwrap();

    assert_eq!(module.patterns.len(), 1);
    assert_eq!(module.patterns[0].rows, 4);
    assert!(module.patterns[0].cell(0, 0).is_empty());
    // Sample decoding is unaffected.
    assert_eq!(module.samples[0].data, SampleData::Mono8(vec![1, 2, -3, 4]));
}

// --- a minimal revision 4 XM module ---

fn xm_module_bytes() -> Vec<u8> {
    let mut music = Vec::new();
    push_cstr(&mut music, "four");
    push_cstr(&mut music, "");
    music.extend_from_slice(&file_header(
        &TestHeader {
            channels: 1,
            orders: 1,
            patterns: 1,
            tracks: 1,
            instruments: 0,
            samples: 1,
            speed: 4,
            tempo: 140,
            flags: 0, // no dialect flag: XM
        },
        &[],
    ));

    music.push(0x00); // order list
    push_u16(&mut music, 0); // track assignment
    push_u16(&mut music, 2); // rows

    let track = [0x02, 0x10, 0x21, 0x12, 0x30, 0x00];
    push_u32(&mut music, track.len() as u32);
    music.extend_from_slice(&track);

    // Revision 4: no filename strings.
    push_cstr(&mut music, "wave");
    music.extend_from_slice(&sample_record(2, 0, 2, 131));

    let payloads = [0x7F, 0x80];
    container(4, &music, &payloads)
}

#[test]
fn xm_module_decodes_without_filenames() {
    let module = load(&xm_module_bytes(), LoadOptions::default()).unwrap();

    assert_eq!(module.title, "four");
    assert_eq!(module.dialect, Dialect::Xm);
    assert_eq!(module.default_speed, 4);
    assert_eq!(module.default_tempo, 140);

    let cell = module.patterns[0].cell(0, 0);
    // The second command pair overwrites the first one's effect.
    assert_eq!(cell.effect, Effect::SetTempo(0x30));
    assert!(module.patterns[0].cell(1, 0).is_empty());

    let sample = &module.samples[0];
    assert_eq!(sample.name.as_str(), "wave");
    assert_eq!(sample.filename.as_str(), "");
    assert_eq!(sample.finetune, 3); // 131 - 128
    assert_eq!(sample.data, SampleData::Mono8(vec![127, -128]));
}

#[test]
fn xm_pattern_break_is_bcd() {
    // Same module, but the cell carries only the pattern break.
    let mut music = Vec::new();
    push_cstr(&mut music, "bcd");
    push_cstr(&mut music, "");
    music.extend_from_slice(&file_header(
        &TestHeader {
            channels: 1,
            orders: 0,
            patterns: 1,
            tracks: 1,
            instruments: 0,
            samples: 0,
            speed: 6,
            tempo: 125,
            flags: 0,
        },
        &[],
    ));
    push_u16(&mut music, 0);
    push_u16(&mut music, 1);
    let track = [0x01, 0x10, 0x21, 0x00];
    push_u32(&mut music, track.len() as u32);
    music.extend_from_slice(&track);

    let module = load(&container(4, &music, &[]), LoadOptions::default()).unwrap();
    assert_eq!(
        module.patterns[0].cell(0, 0).effect,
        Effect::PatternBreak(21)
    );
}

// --- error handling ---

#[test]
fn rejects_bad_magic() {
    assert!(matches!(
        load(b"MOD4aaaaaaaaaaaaaaaa", LoadOptions::default()),
        Err(FormatError::InvalidHeader)
    ));
}

#[test]
fn rejects_short_input() {
    assert!(matches!(
        load(b"MO3", LoadOptions::default()),
        Err(FormatError::InvalidHeader)
    ));
}

#[test]
fn rejects_undersized_music_chunk() {
    let mut data = Vec::new();
    data.extend_from_slice(b"MO3");
    data.push(4);
    push_u32(&mut data, 100); // smaller than the file header
    data.extend_from_slice(&[0; 16]);
    assert!(matches!(
        load(&data, LoadOptions::default()),
        Err(FormatError::InvalidHeader)
    ));
}

#[test]
fn rejects_future_revisions() {
    let mut data = Vec::new();
    data.extend_from_slice(b"MO3");
    data.push(6);
    push_u32(&mut data, 1000);
    data.extend_from_slice(&[0; 16]);
    assert!(matches!(
        load(&data, LoadOptions::default()),
        Err(FormatError::UnsupportedVersion(6))
    ));
}

#[test]
fn truncated_music_chunk_fails() {
    // The declared chunk is large enough to pass the size check but
    // ends inside the file header record.
    let mut music = Vec::new();
    push_cstr(&mut music, "a long title here!");
    push_cstr(&mut music, "");
    music.extend_from_slice(&[0u8; 410]);
    assert!(music.len() > 422);

    assert!(matches!(
        load(&container(4, &music, &[]), LoadOptions::default()),
        Err(FormatError::UnexpectedEof)
    ));
}

#[test]
fn zero_channels_is_corruption() {
    let mut music = Vec::new();
    push_cstr(&mut music, "");
    push_cstr(&mut music, "");
    music.extend_from_slice(&file_header(
        &TestHeader {
            channels: 0,
            orders: 0,
            patterns: 0,
            tracks: 0,
            instruments: 0,
            samples: 0,
            speed: 6,
            tempo: 125,
            flags: 0,
        },
        &[],
    ));

    assert!(matches!(
        load(&container(4, &music, &[]), LoadOptions::default()),
        Err(FormatError::Corrupted(_))
    ));
}

#[test]
fn out_of_range_track_reference_is_corruption() {
    let mut music = Vec::new();
    push_cstr(&mut music, "");
    push_cstr(&mut music, "");
    music.extend_from_slice(&file_header(
        &TestHeader {
            channels: 1,
            orders: 0,
            patterns: 1,
            tracks: 0,
            instruments: 0,
            samples: 0,
            speed: 6,
            tempo: 125,
            flags: 0,
        },
        &[],
    ));
    push_u16(&mut music, 7); // refers to a track that does not exist
    push_u16(&mut music, 4);

    assert!(matches!(
        load(&container(4, &music, &[]), LoadOptions::default()),
        Err(FormatError::Corrupted(_))
    ));
}

#[test]
fn lost_sample_payload_degrades_to_an_empty_sample() {
    // A payload that claims more bytes than the file holds: the sample
    // stays empty but the module still loads.
    let mut music = Vec::new();
    push_cstr(&mut music, "");
    push_cstr(&mut music, "");
    music.extend_from_slice(&file_header(
        &TestHeader {
            channels: 1,
            orders: 0,
            patterns: 0,
            tracks: 0,
            instruments: 0,
            samples: 1,
            speed: 6,
            tempo: 125,
            flags: IS_IT,
        },
        &[],
    ));
    push_cstr(&mut music, "gone");
    push_cstr(&mut music, "");
    music.extend_from_slice(&sample_record(64, 0, 1024, 8363));

    let module = load(&container(5, &music, &[]), LoadOptions::default()).unwrap();
    assert!(module.samples[0].is_empty());
}

// --- probe ---

#[test]
fn probe_accepts_real_containers_only() {
    assert!(probe(&it_module_bytes()));
    assert!(probe(&xm_module_bytes()));
    assert!(!probe(b"MO3"));
    assert!(!probe(b"MOD4aaaaaaaaaaaaaaaa"));

    let mut tiny_chunk = Vec::new();
    tiny_chunk.extend_from_slice(b"MO3");
    tiny_chunk.push(4);
    push_u32(&mut tiny_chunk, 100);
    tiny_chunk.extend_from_slice(&[0; 8]);
    assert!(!probe(&tiny_chunk));
}

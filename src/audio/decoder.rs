//! Stem decoding using symphonia
//!
//! Stems come out of source separation as WAV files at the separator's
//! sample rate. They are decoded at that native rate and folded to mono;
//! the spectrogram chain derives its hop size from the rate it is given.

use crate::error::{Result, StemrhythmError};
use crate::types::AudioBuffer;
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, trace};

/// Largest stem we will load into memory
const MAX_STEM_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// An opened stem: container reader plus the decoder for its audio track
struct OpenedStem {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
}

/// Decode a stem file to a mono AudioBuffer at its native sample rate
pub fn decode_mono(path: &Path) -> Result<AudioBuffer> {
    let fail = |reason: String| StemrhythmError::decode_error(path, reason);

    let size = std::fs::metadata(path)
        .map_err(|e| fail(format!("Cannot stat stem: {}", e)))?
        .len();
    if size > MAX_STEM_BYTES {
        return Err(fail(format!(
            "Stem is {:.1} GB, larger than the 2 GB limit",
            size as f64 / (1024.0 * 1024.0 * 1024.0)
        )));
    }

    let mut stem = open_stem(path)?;
    let samples = read_mono(&mut stem, path)?;
    if samples.is_empty() {
        return Err(fail("Stem contains no audio samples".to_string()));
    }

    debug!(
        "Decoded {}: {} samples @ {}Hz ({:.2}s)",
        path.display(),
        samples.len(),
        stem.sample_rate,
        samples.len() as f64 / stem.sample_rate as f64
    );
    Ok(AudioBuffer::new(samples, stem.sample_rate))
}

fn open_stem(path: &Path) -> Result<OpenedStem> {
    let fail = |reason: String| StemrhythmError::decode_error(path, reason);

    let file = File::open(path).map_err(|e| fail(format!("Cannot open stem: {}", e)))?;
    let source = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let reader = symphonia::default::get_probe()
        .format(&hint, source, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| fail(format!("Unrecognized container: {}", e)))?
        .format;

    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| fail("No audio track".to_string()))?;
    let params = track.codec_params.clone();
    let track_id = track.id;

    let sample_rate = params
        .sample_rate
        .ok_or_else(|| fail("Sample rate missing from header".to_string()))?;

    let decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| fail(format!("Unsupported codec: {}", e)))?;

    trace!(
        "Opened {} ({} channels)",
        path.display(),
        params.channels.map(|c| c.count()).unwrap_or(1)
    );

    Ok(OpenedStem {
        reader,
        decoder,
        track_id,
        sample_rate,
    })
}

/// Read every packet of the stem's track, averaging channels per frame
fn read_mono(stem: &mut OpenedStem, path: &Path) -> Result<Vec<f32>> {
    let mut mono = Vec::new();

    loop {
        let packet = match stem.reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(e) => return Err(StemrhythmError::decode_error(path, format!("Bad packet: {}", e))),
        };
        if packet.track_id() != stem.track_id {
            continue;
        }

        let decoded = match stem.decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                trace!("Dropping undecodable packet in {}: {}", path.display(), e);
                continue;
            }
            Err(e) => return Err(StemrhythmError::decode_error(path, e.to_string())),
        };

        let spec = *decoded.spec();
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        fold_to_mono(buffer.samples(), spec.channels.count(), &mut mono);
    }

    Ok(mono)
}

/// Append the per-frame channel average of interleaved `samples` to `out`
fn fold_to_mono(samples: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels <= 1 {
        out.extend_from_slice(samples);
        return;
    }
    let scale = 1.0 / channels as f32;
    out.extend(
        samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * scale),
    );
}

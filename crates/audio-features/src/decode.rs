//! Audio decoding to a mono buffer at a fixed analysis rate.
//!
//! WAV goes through hound; everything else is probed with symphonia.
//! Multichannel audio is averaged down to mono, then band-limited sinc
//! resampled with rubato.

use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::io::MediaSource;
use tracing::debug;

use crate::{AudioBuffer, Error, Result};

/// Interleaved samples straight out of a decoder.
struct Interleaved {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: usize,
}

/// Samples fed to the resampler per call.
const RESAMPLE_CHUNK: usize = 1024;

/// Decode an audio file from disk.
///
/// The file is streamed into the decoder rather than read up front. Its
/// extension is passed to the format probe as a hint.
pub fn decode_file(path: &Path, target_rate: u32) -> Result<AudioBuffer> {
    let mut file = File::open(path)?;
    let mut header = Vec::with_capacity(12);
    (&mut file).take(12).read_to_end(&mut header)?;
    file.seek(SeekFrom::Start(0))?;

    let extension = path.extension().and_then(|e| e.to_str());
    let decoded = if is_wav(&header) {
        decode_wav(std::io::BufReader::new(file))?
    } else {
        decode_symphonia(Box::new(file), extension)?
    };
    finish(decoded, target_rate)
}

/// Decode in-memory audio bytes to mono at `target_rate`.
pub fn decode_bytes(data: &[u8], extension: Option<&str>, target_rate: u32) -> Result<AudioBuffer> {
    let decoded = if is_wav(data) {
        decode_wav(Cursor::new(data))?
    } else {
        decode_symphonia(Box::new(Cursor::new(data.to_vec())), extension)?
    };
    finish(decoded, target_rate)
}

fn finish(decoded: Interleaved, target_rate: u32) -> Result<AudioBuffer> {
    if decoded.sample_rate == 0 {
        return Err(Error::UnsupportedFormat("stream reports a zero sample rate".into()));
    }

    let mono = downmix(&decoded.samples, decoded.channels);
    if mono.is_empty() {
        return Err(Error::UnsupportedFormat("no audio samples decoded".into()));
    }

    debug!(
        source_rate = decoded.sample_rate,
        channels = decoded.channels,
        frames = mono.len(),
        target_rate,
        "decoded audio"
    );

    let samples = resample(&mono, decoded.sample_rate, target_rate)?;
    Ok(AudioBuffer::new(samples, target_rate))
}

fn is_wav(data: &[u8]) -> bool {
    data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WAVE"
}

fn decode_wav<R: Read>(source: R) -> Result<Interleaved> {
    let reader = hound::WavReader::new(source)
        .map_err(|e| Error::UnsupportedFormat(format!("invalid WAV: {e}")))?;

    let spec = reader.spec();
    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::UnsupportedFormat(format!("bad float samples: {e}")))?,
        hound::SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(Error::UnsupportedFormat(format!(
                    "unsupported bit depth {}",
                    spec.bits_per_sample
                )));
            }
            let max_val = (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| Error::UnsupportedFormat(format!("bad int samples: {e}")))?
        }
    };

    Ok(Interleaved {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels.max(1) as usize,
    })
}

fn decode_symphonia(source: Box<dyn MediaSource>, extension: Option<&str>) -> Result<Interleaved> {
    use symphonia::core::audio::SampleBuffer;
    use symphonia::core::codecs::DecoderOptions;
    use symphonia::core::errors::Error as SymphoniaError;
    use symphonia::core::formats::FormatOptions;
    use symphonia::core::io::MediaSourceStream;
    use symphonia::core::meta::MetadataOptions;
    use symphonia::core::probe::Hint;

    let mss = MediaSourceStream::new(source, Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::UnsupportedFormat(format!("unrecognised container: {e}")))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| Error::UnsupportedFormat("no audio track".into()))?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| Error::UnsupportedFormat(format!("no decoder for codec: {e}")))?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(Error::UnsupportedFormat(format!("failed to read packet: {e}"))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            // A corrupt frame is skipped, the rest of the stream is still usable
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(error = e, "skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(Error::UnsupportedFormat(format!("decode failed: {e}"))),
        };

        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count();

        let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }

    Ok(Interleaved {
        samples,
        sample_rate,
        channels: channels.max(1),
    })
}

/// Average interleaved channels into one.
fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Resample mono audio with a windowed-sinc low-pass, so content above the
/// target Nyquist is removed instead of folding back into the analysis band.
///
/// The output is aligned with the input (the filter delay is trimmed) and has
/// `round(len * to_rate / from_rate)` samples.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    if from_rate == 0 || to_rate == 0 {
        return Err(Error::Resample(format!("cannot resample {from_rate} Hz to {to_rate} Hz")));
    }

    let params = SincInterpolationParameters {
        sinc_len: 128,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 128,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = to_rate as f64 / from_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLE_CHUNK, 1)
        .map_err(|e| Error::Resample(e.to_string()))?;

    let expected = (samples.len() as f64 * ratio).round() as usize;
    let delay = resampler.output_delay();
    let mut out = Vec::with_capacity(expected + delay + RESAMPLE_CHUNK);

    let mut pos = 0;
    while samples.len() - pos >= resampler.input_frames_next() {
        let n = resampler.input_frames_next();
        let block: [&[f32]; 1] = [&samples[pos..pos + n]];
        let chunk = resampler
            .process(&block[..], None)
            .map_err(|e| Error::Resample(e.to_string()))?;
        out.extend(chunk.into_iter().flatten());
        pos += n;
    }
    if pos < samples.len() {
        let tail: [&[f32]; 1] = [&samples[pos..]];
        let chunk = resampler
            .process_partial(Some(&tail[..]), None)
            .map_err(|e| Error::Resample(e.to_string()))?;
        out.extend(chunk.into_iter().flatten());
    }
    // Flush the filter tail
    while out.len() < expected + delay {
        let chunk = resampler
            .process_partial(None::<&[&[f32]]>, None)
            .map_err(|e| Error::Resample(e.to_string()))?;
        let before = out.len();
        out.extend(chunk.into_iter().flatten());
        if out.len() == before {
            break;
        }
    }

    out.drain(..delay.min(out.len()));
    out.truncate(expected);
    Ok(out)
}

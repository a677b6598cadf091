//! Client for the remote note transcription service.
//!
//! The service takes a mono 16-bit WAV at `POST {endpoint}/transcribe` and
//! answers `{"notes": [{"pitch", "onset", "offset", "confidence"}]}`.

use std::io::Cursor;
use std::time::Duration;

use audio_features::AudioBuffer;
use chord_analysis::{BackendError, RawNote};
use serde::Deserialize;
use tracing::{debug, instrument};

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    notes: Vec<RawNote>,
}

#[derive(Debug, Clone)]
pub struct RemoteTranscriber {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl RemoteTranscriber {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            url: format!("{}/transcribe", endpoint.trim_end_matches('/')),
            timeout,
        })
    }

    /// Transcribe `audio` into raw note detections.
    #[instrument(skip_all, fields(url = %self.url, samples = audio.samples.len()))]
    pub async fn transcribe(&self, audio: &AudioBuffer) -> Result<Vec<RawNote>, BackendError> {
        let wav = encode_wav(audio)?;

        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .header(reqwest::header::CONTENT_TYPE, "audio/wav")
            .body(wav)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Processing(format!(
                "transcriber answered {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: TranscribeResponse = response
            .json()
            .await
            .map_err(|e| match self.classify(e) {
                BackendError::Timeout(d) => BackendError::Timeout(d),
                other => BackendError::Processing(format!("malformed transcription: {other}")),
            })?;

        debug!(notes = parsed.notes.len(), "transcription received");
        Ok(parsed.notes)
    }

    fn classify(&self, err: reqwest::Error) -> BackendError {
        if err.is_timeout() {
            BackendError::Timeout(self.timeout)
        } else if err.is_connect() {
            BackendError::Unavailable(err.to_string())
        } else {
            BackendError::Processing(err.to_string())
        }
    }
}

/// Mono 16-bit PCM WAV bytes.
pub fn encode_wav(audio: &AudioBuffer) -> Result<Vec<u8>, BackendError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let encode_err = |e: hound::Error| BackendError::Processing(format!("WAV encoding failed: {e}"));

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(encode_err)?;
        for &sample in &audio.samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(value).map_err(encode_err)?;
        }
        writer.finalize().map_err(encode_err)?;
    }
    Ok(cursor.into_inner())
}

use std::fs::File;
use std::io::Cursor;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecRegistry, DecoderOptions};
use symphonia::core::errors::Error;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::{Hint, Probe};
use symphonia::default;
use tracing::{debug, warn};

use crate::error::DecodeError;

/// Mono PCM at the clip's native sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

pub struct AudioProcessor {
    codec_registry: &'static CodecRegistry,
    format_options: FormatOptions,
    metadata_options: MetadataOptions,
    probe: &'static Probe,
}

impl Default for AudioProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioProcessor {
    pub fn new() -> Self {
        Self {
            codec_registry: default::get_codecs(),
            format_options: FormatOptions::default(),
            metadata_options: MetadataOptions::default(),
            probe: default::get_probe(),
        }
    }

    pub fn get_decoded_audio(&self, path: impl AsRef<Path>) -> Result<DecodedAudio, DecodeError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let extension = path.extension().and_then(|e| e.to_str());
        self.decode(Box::new(file), extension)
    }

    /// Decodes an in-memory upload; `extension` helps the prober when given.
    pub fn decode_bytes(
        &self,
        bytes: Vec<u8>,
        extension: Option<&str>,
    ) -> Result<DecodedAudio, DecodeError> {
        self.decode(Box::new(Cursor::new(bytes)), extension)
    }

    fn decode(
        &self,
        source: Box<dyn MediaSource>,
        extension: Option<&str>,
    ) -> Result<DecodedAudio, DecodeError> {
        let stream = MediaSourceStream::new(source, Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = extension {
            hint.with_extension(extension);
        }

        let probed = self
            .probe
            .format(&hint, stream, &self.format_options, &self.metadata_options)?;
        let mut format = probed.format;

        let track = format.default_track().ok_or(DecodeError::NoTrack)?;
        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or(DecodeError::MissingSampleRate)?;

        let mut decoder = self
            .codec_registry
            .make(&track.codec_params, &DecoderOptions::default())?;

        let mut samples = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                // EOF
                Err(Error::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(Error::ResetRequired) => break,
                Err(e) => return Err(e.into()),
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(Error::DecodeError(reason)) => {
                    warn!(reason, "skipping corrupt packet");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count().max(1);

            let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buffer.copy_interleaved_ref(decoded);

            samples.extend(
                buffer
                    .samples()
                    .chunks_exact(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32),
            );
        }

        debug!(samples = samples.len(), sample_rate, "decoded audio");
        Ok(DecodedAudio {
            samples,
            sample_rate,
        })
    }
}

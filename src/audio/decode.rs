use std::io::{Cursor, Read};
use std::path::Path;
use std::time::Duration;

use reqwest::Url;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{friendly_network_error, PipelineError};

/// Decoded mono audio. Immutable once loaded.
#[derive(Clone, Debug)]
pub struct Track {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Track {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn duration(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f32 / self.sample_rate as f32
    }
}

/// Fetches and decodes the audio behind a URL.
pub trait AudioSource {
    fn load(&self, url: &Url) -> Result<Track, PipelineError>;
}

/// Downloads the whole payload over HTTP and decodes it in memory.
pub struct HttpAudioSource {
    client: reqwest::blocking::Client,
}

impl HttpAudioSource {
    pub fn new(timeout: Duration) -> Result<Self, PipelineError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Config(friendly_network_error(&e)))?;
        Ok(Self { client })
    }

    fn fetch(&self, url: &Url) -> Result<Vec<u8>, PipelineError> {
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| PipelineError::Fetch(friendly_network_error(&e)))?;

        let mut bytes = Vec::new();
        response
            .read_to_end(&mut bytes)
            .map_err(|e| PipelineError::Fetch(format!("Failed to read response body: {e}")))?;

        log::info!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(bytes)
    }
}

impl AudioSource for HttpAudioSource {
    fn load(&self, url: &Url) -> Result<Track, PipelineError> {
        let bytes = self.fetch(url)?;
        let extension = Path::new(url.path())
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_owned);
        decode_bytes(bytes, extension.as_deref())
    }
}

/// Decode an in-memory audio payload to mono samples at the native rate.
pub fn decode_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<Track, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::Decode("Empty audio payload".into()));
    }

    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| PipelineError::Decode(format!("Failed to probe audio format: {e}")))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| PipelineError::Decode("No audio tracks found".into()))?;

    let track_id = track.id;
    let channels = track.codec_params.channels.map_or(1, |c| c.count());
    let sample_rate = track
        .codec_params
        .sample_rate
        .filter(|&sr| sr > 0)
        .ok_or_else(|| PipelineError::Decode("Unknown sample rate".into()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| PipelineError::Decode(format!("Failed to create audio decoder: {e}")))?;

    let mut all_samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(PipelineError::Decode(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(_)) => continue,
            Err(e) => return Err(PipelineError::Decode(e.to_string())),
        };

        let spec = *decoded.spec();
        let num_frames = decoded.frames();

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        let samples = sample_buf.samples();

        // Downmix to mono
        if channels <= 1 {
            all_samples.extend_from_slice(samples);
        } else {
            for frame_samples in samples.chunks(channels) {
                let mono: f32 = frame_samples.iter().sum::<f32>() / channels as f32;
                all_samples.push(mono);
            }
        }
    }

    log::info!(
        "Decoded audio: {} samples, {}Hz, {:.1}s",
        all_samples.len(),
        sample_rate,
        all_samples.len() as f32 / sample_rate as f32
    );

    Ok(Track::new(all_samples, sample_rate))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;

    /// Minimal 16-bit PCM WAV container.
    pub(crate) fn wav_bytes(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let block_align = channels * 2;
        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
        out.extend_from_slice(&block_align.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }

    /// Serve exactly one HTTP response on a random local port.
    fn serve_once(status_line: &'static str, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 4096];
                let mut request = Vec::new();
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let head = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status_line,
                    body.len()
                );
                let _ = stream.write_all(head.as_bytes());
                let _ = stream.write_all(&body);
                let _ = stream.flush();
            }
        });
        format!("http://{}", addr)
    }

    #[test]
    fn decodes_mono_wav() {
        let samples: Vec<i16> = (0..8000).map(|i| if i % 2 == 0 { 16384 } else { -16384 }).collect();
        let track = decode_bytes(wav_bytes(&samples, 8000, 1), Some("wav")).unwrap();
        assert_eq!(track.sample_rate, 8000);
        assert_eq!(track.samples.len(), 8000);
        assert!((track.samples[0] - 0.5).abs() < 1e-3);
        assert!((track.duration() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn downmixes_stereo_to_mono() {
        let mut samples = Vec::new();
        for _ in 0..4000 {
            samples.push(16384i16);
            samples.push(-16384i16);
        }
        let track = decode_bytes(wav_bytes(&samples, 16000, 2), None).unwrap();
        assert_eq!(track.samples.len(), 4000);
        assert!(track.samples.iter().all(|s| s.abs() < 1e-3));
    }

    #[test]
    fn garbage_payload_is_decode_error() {
        let err = decode_bytes(vec![0x13; 2048], Some("mp3")).unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
    }

    #[test]
    fn empty_payload_is_decode_error() {
        let err = decode_bytes(Vec::new(), None).unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
    }

    #[test]
    fn http_404_is_fetch_error() {
        let base = serve_once("404 Not Found", Vec::new());
        let source = HttpAudioSource::new(Duration::from_secs(5)).unwrap();
        let url = Url::parse(&format!("{base}/missing.mp3")).unwrap();
        match source.load(&url) {
            Err(PipelineError::Fetch(msg)) => assert!(msg.contains("404"), "{msg}"),
            other => panic!("expected fetch error, got {other:?}"),
        }
    }

    #[test]
    fn http_source_decodes_payload() {
        let samples = vec![8192i16; 2205];
        let base = serve_once("200 OK", wav_bytes(&samples, 22050, 1));
        let source = HttpAudioSource::new(Duration::from_secs(5)).unwrap();
        let url = Url::parse(&format!("{base}/clip.wav")).unwrap();
        let track = source.load(&url).unwrap();
        assert_eq!(track.sample_rate, 22050);
        assert_eq!(track.samples.len(), 2205);
    }
}

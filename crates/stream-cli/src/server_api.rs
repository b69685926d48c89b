//! HTTP client for the track server.
//!
//! Endpoints:
//! - `GET /tracks` — JSON list of track names
//! - `GET /tracks/{name}/metadata` — JSON metadata, 404 when unknown
//! - `GET /tracks/{name}/stream` — raw PCM chunk body
//!
//! The stream body is read on a feeder thread and re-published as
//! [`StreamEvent`]s; the bounded channel keeps the feeder from racing far
//! ahead of playback.

use std::io::Read;

use anyhow::{Context, Result};
use crossbeam_channel::Receiver;
use serde::{Deserialize, de::DeserializeOwned};
use stream_player::source::{StreamEvent, TrackService};
use stream_types::TrackMetadata;

/// Bytes read from the HTTP body per chunk event.
const CHUNK_BYTES: usize = 4096;

/// Events buffered between the feeder thread and the playback session.
const EVENT_QUEUE_DEPTH: usize = 64;

#[derive(Clone, Debug, Deserialize)]
struct TracksResponse {
    tracks: Vec<String>,
}

#[derive(Clone, Debug, Deserialize)]
struct MetadataResponse {
    file_name: String,
    duration_seconds: u32,
    sample_rate: u32,
    channels: u16,
    codec: String,
}

/// [`TrackService`] over the server's HTTP API.
pub struct HttpTrackService {
    base: String,
}

impl HttpTrackService {
    pub fn new(server: &str) -> Self {
        Self {
            base: server.trim_end_matches('/').to_string(),
        }
    }

    fn track_url(&self, track: &str, tail: &str) -> String {
        format!("{}/tracks/{}/{tail}", self.base, urlencoding::encode(track))
    }
}

impl TrackService for HttpTrackService {
    fn list_tracks(&self) -> Result<Vec<String>> {
        let url = format!("{}/tracks", self.base);
        let resp: TracksResponse =
            read_json(ureq::get(&url).call().context("request /tracks")?, "tracks")?;
        Ok(resp.tracks)
    }

    fn get_metadata(&self, track: &str) -> Result<Option<TrackMetadata>> {
        let url = self.track_url(track, "metadata");
        let resp = match ureq::get(&url).call() {
            Ok(resp) => resp,
            Err(ureq::Error::StatusCode(404)) => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("request metadata for {track}")),
        };
        let m: MetadataResponse = read_json(resp, "metadata")?;
        Ok(Some(TrackMetadata {
            file_name: m.file_name,
            duration_seconds: m.duration_seconds,
            sample_rate: m.sample_rate,
            channels: m.channels,
            codec: m.codec,
        }))
    }

    fn open_chunk_stream(&self, track: &str) -> Result<Receiver<StreamEvent>> {
        let url = self.track_url(track, "stream");
        let resp = ureq::get(&url)
            .call()
            .with_context(|| format!("open stream for {track}"))?;
        let (_, body) = resp.into_parts();
        let mut reader = body.into_reader();

        let (tx, rx) = crossbeam_channel::bounded(EVENT_QUEUE_DEPTH);
        std::thread::Builder::new()
            .name("chunk-feeder".to_string())
            .spawn(move || {
                let mut buf = vec![0u8; CHUNK_BYTES];
                loop {
                    match reader.read(&mut buf) {
                        Ok(0) => {
                            let _ = tx.send(StreamEvent::Completed);
                            break;
                        }
                        Ok(n) => {
                            // Send blocks when the session is behind; a
                            // dropped receiver ends the feeder.
                            if tx.send(StreamEvent::Chunk(buf[..n].to_vec())).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            let _ = tx.send(StreamEvent::Error(format!("stream read: {e}")));
                            break;
                        }
                    }
                }
            })
            .context("spawn chunk feeder thread")?;

        Ok(rx)
    }
}

fn read_json<T: DeserializeOwned>(
    mut resp: ureq::http::Response<ureq::Body>,
    label: &str,
) -> Result<T> {
    let body = resp
        .body_mut()
        .read_to_string()
        .with_context(|| format!("read /{label} response body"))?;
    serde_json::from_str(&body).with_context(|| format!("decode /{label} response"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_url_encodes_name() {
        let svc = HttpTrackService::new("http://localhost:8080/");
        assert_eq!(
            svc.track_url("my song.pcm", "metadata"),
            "http://localhost:8080/tracks/my%20song.pcm/metadata"
        );
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let svc = HttpTrackService::new("http://host:1/");
        assert_eq!(svc.base, "http://host:1");
    }

    #[test]
    fn metadata_response_decodes() {
        let json = r#"{
            "file_name": "song.pcm",
            "duration_seconds": 185,
            "sample_rate": 44100,
            "channels": 2,
            "codec": "pcm"
        }"#;
        let m: MetadataResponse = serde_json::from_str(json).unwrap();
        assert_eq!(m.file_name, "song.pcm");
        assert_eq!(m.duration_seconds, 185);
        assert_eq!(m.sample_rate, 44_100);
        assert_eq!(m.channels, 2);
        assert_eq!(m.codec, "pcm");
    }

    #[test]
    fn tracks_response_decodes_empty_list() {
        let resp: TracksResponse = serde_json::from_str(r#"{"tracks": []}"#).unwrap();
        assert!(resp.tracks.is_empty());
    }
}

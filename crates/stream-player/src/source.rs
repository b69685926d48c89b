//! Interfaces to the remote track-serving collaborator.
//!
//! Transport and schema live behind [`TrackService`]; the player only sees an
//! ordered, finite event sequence per track.

use anyhow::Result;
use crossbeam_channel::Receiver;
use stream_types::TrackMetadata;

/// One event pushed by a chunk source.
///
/// A well-behaved source delivers zero or more `Chunk`s followed by exactly
/// one terminal `Completed` or `Error`. A source that hangs up without a
/// terminal event is treated as erred.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    /// Raw PCM payload, ownership transfers to the sink write.
    Chunk(Vec<u8>),
    /// Normal end of stream.
    Completed,
    /// The source failed mid-stream.
    Error(String),
}

/// Remote collaborator serving track names, metadata, and chunk streams.
pub trait TrackService {
    /// All track names the server offers; may be empty.
    fn list_tracks(&self) -> Result<Vec<String>>;

    /// Metadata for one track, or `None` when the server does not know it.
    fn get_metadata(&self, track: &str) -> Result<Option<TrackMetadata>>;

    /// Open the chunk stream for `track`. Events arrive asynchronously on the
    /// returned channel, pushed by the service's own worker.
    fn open_chunk_stream(&self, track: &str) -> Result<Receiver<StreamEvent>>;
}

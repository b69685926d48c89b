pub mod config;
pub mod control;
pub mod device;
pub mod gate;
pub mod playback;
pub mod progress;
pub mod queue;
pub mod session;
pub mod sink;
pub mod source;
pub mod transport;

pub mod canonical;
pub(crate) mod codec;
mod error;
pub mod messages;
pub mod sink;
pub mod source;

pub use canonical::{CanonicalEvent, EventBuffer, EventKind, EventPayload, EventRef};
pub use codec::{decode_short, encode_short, message_len};
pub use error::{MidiError, Result};
pub use messages::MidiMessage;
pub use sink::{list_output_devices, MidiOutDeviceInfo, MidiPortSink, MidiSink};
pub use source::{MidiSource, Song, SongFormat, SongSource};

pub const NUM_CHANNELS: u8 = 16;

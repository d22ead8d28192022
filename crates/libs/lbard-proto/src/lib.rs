//! Wire types shared by every component that sends or receives LBARD
//! packets: field records, packet framing, SID prefix handling and the
//! stratum-tagged clock carried by the `T` field.

pub mod error;
pub mod fields;
pub mod packet;
pub mod sid;
pub mod time;

pub use error::ProtoError;
pub use fields::{
    AckRecord, BarRecord, BitmapRecord, Field, FragmentRecord, FragmentStream, LengthRecord,
    RequestRecord, SyncRecord,
};
pub use packet::{decode_packet, encode_packet, DecodedPacket, PacketHeader};
pub use time::LbardTime;

use crate::error::SocketError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

pub mod message;

/// Wire header size: u16 len + u8 type + u8 flags + u32 correlation id, network byte order.
pub const HEADER_LEN: usize = 8;

/// Initial capacity of a session's inbound decode buffer.
pub const DECODE_BUF_INITIAL: usize = 1_000;

/// Hard cap on a session's inbound decode buffer. A single frame larger than this is a
/// fatal session error.
pub const DECODE_BUF_MAX: usize = 1_000_000;

/// Header flags. Bit 0 selects the proto3 payload serialiser.
pub mod flags {
    pub const PROTO3: u8 = 1 << 0;
}

/// Message type discriminator carried in the frame header, a single ASCII char.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum MsgType {
    Null = b'0',
    Subscribe = b'S',
    SubscribeAccount = b's',
    NewOrder = b'D',
    CancelOrder = b'F',
    Trade = b't',
    TickTop = b'p',
    AccountUpdate = b'u',
    Error = b'e',
    OrderFill = b'f',
    OmLogon = b'l',
    OrderExec = b'x',
}

impl MsgType {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            b'0' => Some(MsgType::Null),
            b'S' => Some(MsgType::Subscribe),
            b's' => Some(MsgType::SubscribeAccount),
            b'D' => Some(MsgType::NewOrder),
            b'F' => Some(MsgType::CancelOrder),
            b't' => Some(MsgType::Trade),
            b'p' => Some(MsgType::TickTop),
            b'u' => Some(MsgType::AccountUpdate),
            b'e' => Some(MsgType::Error),
            b'f' => Some(MsgType::OrderFill),
            b'l' => Some(MsgType::OmLogon),
            b'x' => Some(MsgType::OrderExec),
            _ => None,
        }
    }
}

/// Decoded frame header. `len` is the full frame length including the header itself.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FrameHeader {
    pub len: u16,
    pub msg_type: u8,
    pub flags: u8,
    pub req_id: u32,
}

impl FrameHeader {
    pub fn msg_type(&self) -> Option<MsgType> {
        MsgType::from_u8(self.msg_type)
    }
}

/// Encode one frame: header plus proto3 payload.
pub fn encode_frame<M: prost::Message>(msg_type: MsgType, req_id: u32, payload: &M) -> Bytes {
    let payload_len = payload.encoded_len();
    let frame_len = HEADER_LEN + payload_len;

    let mut buf = BytesMut::with_capacity(frame_len);
    buf.put_u16(frame_len as u16);
    buf.put_u8(msg_type as u8);
    buf.put_u8(flags::PROTO3);
    buf.put_u32(req_id);
    payload
        .encode(&mut buf)
        .expect("BytesMut encode cannot fail with reserved capacity");

    buf.freeze()
}

/// Stream reassembly buffer for inbound frames.
///
/// Bytes are appended with [`consume`](Self::consume); complete frames are drained with
/// [`next_frame`](Self::next_frame). Unread bytes are shifted to the front as frames are
/// taken. The buffer is bounded: overflow is fatal to the session.
#[derive(Debug)]
pub struct FrameCodec {
    buf: BytesMut,
    max_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DECODE_BUF_INITIAL, DECODE_BUF_MAX)
    }
}

impl FrameCodec {
    pub fn new(initial: usize, max_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(initial),
            max_size,
        }
    }

    /// Append raw socket bytes. Errors if buffering them would exceed the bound.
    pub fn consume(&mut self, data: &[u8]) -> Result<(), SocketError> {
        if self.buf.len() + data.len() > self.max_size {
            return Err(SocketError::DecodeBufferOverflow {
                frame_len: self.buf.len() + data.len(),
                max_size: self.max_size,
            });
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    /// Drain the next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> Result<Option<(FrameHeader, Bytes)>, SocketError> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut peek = &self.buf[..HEADER_LEN];
        let len = peek.get_u16() as usize;
        let msg_type = peek.get_u8();
        let flags = peek.get_u8();
        let req_id = peek.get_u32();

        if len < HEADER_LEN {
            return Err(SocketError::BadFrame(format!(
                "frame len {len} shorter than header"
            )));
        }
        if len > self.max_size {
            return Err(SocketError::DecodeBufferOverflow {
                frame_len: len,
                max_size: self.max_size,
            });
        }
        if self.buf.len() < len {
            return Ok(None);
        }

        let frame = self.buf.split_to(len).freeze();
        let payload = frame.slice(HEADER_LEN..);

        Ok(Some((
            FrameHeader {
                len: len as u16,
                msg_type,
                flags,
                req_id,
            },
            payload,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::{message::*, *};
    use prost::Message;

    #[test]
    fn test_frame_round_trip_is_identity() {
        let order = NewOrder {
            symbol: "BTCUSDT".into(),
            exchange: "binance".into(),
            side: WireSide::Buy as i32,
            price: 42_000.5,
            size: 0.25,
            tif: WireTimeInForce::Gtc as i32,
            order_id: "DEMO1650000000000000001".into(),
        };

        let frame = encode_frame(MsgType::NewOrder, 77, &order);

        let mut codec = FrameCodec::default();
        codec.consume(&frame).unwrap();
        let (header, payload) = codec.next_frame().unwrap().unwrap();

        assert_eq!(header.len as usize, frame.len());
        assert_eq!(header.msg_type(), Some(MsgType::NewOrder));
        assert_eq!(header.flags, flags::PROTO3);
        assert_eq!(header.req_id, 77);

        let decoded = NewOrder::decode(payload).unwrap();
        assert_eq!(decoded, order);

        // re-encoding yields the identical byte stream
        assert_eq!(encode_frame(MsgType::NewOrder, 77, &decoded), frame);
    }

    #[test]
    fn test_codec_reassembles_partial_and_back_to_back_frames() {
        let tick = TopTick {
            symbol: "ETHUSDT".into(),
            exchange: "binance".into(),
            bid_price: 3000.1,
            ask_price: 3000.2,
        };
        let frame_a = encode_frame(MsgType::TickTop, 1, &tick);
        let frame_b = encode_frame(MsgType::TickTop, 2, &tick);

        let mut stream = Vec::new();
        stream.extend_from_slice(&frame_a);
        stream.extend_from_slice(&frame_b);

        let mut codec = FrameCodec::default();

        // feed in awkward chunk sizes
        for chunk in stream.chunks(5) {
            codec.consume(chunk).unwrap();
        }

        let (header_a, _) = codec.next_frame().unwrap().unwrap();
        let (header_b, _) = codec.next_frame().unwrap().unwrap();
        assert_eq!(header_a.req_id, 1);
        assert_eq!(header_b.req_id, 2);
        assert!(codec.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_oversized_frame_is_fatal() {
        let mut codec = FrameCodec::new(16, 64);

        // a header declaring a frame larger than the bounded buffer
        let mut bad = BytesMut::new();
        bad.put_u16(1000);
        bad.put_u8(MsgType::Trade as u8);
        bad.put_u8(flags::PROTO3);
        bad.put_u32(9);

        codec.consume(&bad).unwrap();
        assert!(matches!(
            codec.next_frame(),
            Err(SocketError::DecodeBufferOverflow { .. })
        ));
    }

    #[test]
    fn test_buffer_overflow_on_consume_is_fatal() {
        let mut codec = FrameCodec::new(8, 32);
        assert!(matches!(
            codec.consume(&[0u8; 64]),
            Err(SocketError::DecodeBufferOverflow { .. })
        ));
    }

    #[test]
    fn test_unknown_msg_type_is_surfaced_raw() {
        let reply = OmLogonReply::default();
        let mut frame = BytesMut::from(&encode_frame(MsgType::OmLogon, 3, &reply)[..]);
        frame[2] = b'Z'; // unknown discriminator

        let mut codec = FrameCodec::default();
        codec.consume(&frame).unwrap();
        let (header, _) = codec.next_frame().unwrap().unwrap();
        assert_eq!(header.msg_type(), None);
        assert_eq!(header.msg_type, b'Z');
    }
}

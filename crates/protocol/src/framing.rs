//! Length-delimited framing over the raw byte stream, built on
//! `tokio_util::codec` so envelopes can ride a plain
//! [`tokio::io::AsyncRead`]/[`AsyncWrite`] stream.

use crate::envelope::Envelope;
use crate::value::{CodecError, decode, encode};
use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// `Decoder`/`Encoder` pair that frames [`Envelope`]s as
/// 4-byte-length-prefixed, codec-encoded bodies.
pub struct EnvelopeCodec {
    inner: LengthDelimitedCodec,
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        EnvelopeCodec {
            inner: LengthDelimitedCodec::builder()
                .length_field_type::<u32>()
                .max_frame_length(64 * 1024 * 1024)
                .new_codec(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl Decoder for EnvelopeCodec {
    type Item = Envelope;
    type Error = FramingError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(frame) = self.inner.decode(src)? else {
            return Ok(None);
        };
        let value = decode(&frame)?;
        Ok(Some(Envelope::from_value(value)?))
    }
}

impl Encoder<Envelope> for EnvelopeCodec {
    type Error = FramingError;

    fn encode(&mut self, item: Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = encode(&item.to_value());
        self.inner.encode(body, dst)?;
        Ok(())
    }
}

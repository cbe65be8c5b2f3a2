//! Wire codec for scalar frames and image replies.
//!
//! Encodes [`ScalarFrame`]s into [`WirePayload`]s for submission and decodes
//! the service's JSON reply into an [`ImageBuffer`]. Two request encodings
//! are supported behind one [`FrameCodec`]:
//!
//! - **JSON**: `{"width": W, "height": H, "data": [f32, ...]}`. Floats use
//!   the shortest representation that reparses to the same `f32`.
//! - **Binary**: `W * H` little-endian `f32` values, no header. Width and
//!   height travel out-of-band as `?width=W&height=H`.
//!
//! Formatting a megapixel field as JSON text dominates the cost of an
//! exchange; binary is ~4× smaller and skips text conversion entirely.
//!
//! Reply wire format:
//!
//! ```text
//! HTTP 200, Content-Type: application/json
//! {"image": "<base64 of a PNG or JPEG>"}
//! ```

use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ExchangeError;
use crate::exchange::types::{ImageBuffer, ScalarFrame};

// ── Constants ────────────────────────────────────────────────────

/// Reply field holding the base64 image blob.
pub const IMAGE_FIELD: &str = "image";

/// `Content-Type` for JSON request bodies.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// `Content-Type` for binary request bodies.
pub const BINARY_CONTENT_TYPE: &str = "application/octet-stream";

const BYTES_PER_SCALAR: usize = 4;

// ── WireEncoding ─────────────────────────────────────────────────

/// Request body encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireEncoding {
    /// Self-describing JSON object.
    #[default]
    Json,
    /// Raw little-endian `f32` array.
    Binary,
}

impl WireEncoding {
    /// The `Content-Type` header value for this encoding.
    pub const fn content_type(self) -> &'static str {
        match self {
            WireEncoding::Json => JSON_CONTENT_TYPE,
            WireEncoding::Binary => BINARY_CONTENT_TYPE,
        }
    }
}

impl fmt::Display for WireEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireEncoding::Json => f.write_str("json"),
            WireEncoding::Binary => f.write_str("binary"),
        }
    }
}

// ── WirePayload ──────────────────────────────────────────────────

/// An encoded scalar frame ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WirePayload {
    pub encoding: WireEncoding,
    /// Frame width, carried out-of-band for binary bodies.
    pub width: u32,
    /// Frame height, carried out-of-band for binary bodies.
    pub height: u32,
    pub body: Bytes,
}

impl WirePayload {
    /// Query parameters the request URL must carry, if any.
    pub fn query_pairs(&self) -> Option<[(&'static str, String); 2]> {
        match self.encoding {
            WireEncoding::Json => None,
            WireEncoding::Binary => Some([
                ("width", self.width.to_string()),
                ("height", self.height.to_string()),
            ]),
        }
    }

    /// Body length in bytes.
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Whether the body is empty.
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

// ── JSON shapes ──────────────────────────────────────────────────

#[derive(Serialize)]
struct JsonFrameRef<'a> {
    width: u32,
    height: u32,
    data: &'a [f32],
}

#[derive(Deserialize)]
struct JsonFrame {
    width: u32,
    height: u32,
    // Non-finite values are written as `null` by serde_json.
    data: Vec<Option<f32>>,
}

// ── FrameCodec ───────────────────────────────────────────────────

/// Encoder/decoder for one configured [`WireEncoding`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameCodec {
    encoding: WireEncoding,
}

impl FrameCodec {
    pub fn new(encoding: WireEncoding) -> Self {
        Self { encoding }
    }

    /// Encode a scalar frame.
    ///
    /// Fails with [`ExchangeError::InvalidFrame`] if the buffer length does
    /// not equal `width * height`.
    pub fn encode(&self, frame: &ScalarFrame) -> Result<WirePayload, ExchangeError> {
        frame.validate()?;

        let body = match self.encoding {
            WireEncoding::Json => Self::encode_json(frame)?,
            WireEncoding::Binary => Self::encode_binary(frame),
        };

        Ok(WirePayload {
            encoding: self.encoding,
            width: frame.width,
            height: frame.height,
            body,
        })
    }

    /// Inverse of [`encode`](Self::encode) for either encoding.
    ///
    /// Binary bodies round-trip bit-for-bit.
    pub fn decode_scalar(payload: &WirePayload) -> Result<ScalarFrame, ExchangeError> {
        match payload.encoding {
            WireEncoding::Json => {
                let parsed: JsonFrame = serde_json::from_slice(&payload.body)?;
                let data = parsed
                    .data
                    .into_iter()
                    .map(|v| v.unwrap_or(f32::NAN))
                    .collect();
                ScalarFrame::new(parsed.width, parsed.height, data)
            }
            WireEncoding::Binary => {
                let expected = payload.width as usize * payload.height as usize;
                if payload.body.len() != expected * BYTES_PER_SCALAR {
                    return Err(ExchangeError::InvalidFrame {
                        width: payload.width,
                        height: payload.height,
                        expected,
                        actual: payload.body.len() / BYTES_PER_SCALAR,
                    });
                }

                let mut body = payload.body.clone();
                let mut data = Vec::with_capacity(expected);
                while body.has_remaining() {
                    data.push(body.get_f32_le());
                }
                ScalarFrame::new(payload.width, payload.height, data)
            }
        }
    }

    /// Decode a reply body into an RGBA raster.
    ///
    /// All-or-nothing: any deviation from the reply contract yields
    /// [`ExchangeError::MalformedResponse`] and no partial image.
    pub fn decode_reply(
        body: &[u8],
        content_type: Option<&str>,
    ) -> Result<ImageBuffer, ExchangeError> {
        if let Some(ct) = content_type {
            if !is_json_media_type(ct) {
                return Err(ExchangeError::MalformedResponse(format!(
                    "unexpected content type {ct:?}"
                )));
            }
        }

        let value: Value = serde_json::from_slice(body)?;
        let object = value.as_object().ok_or_else(|| {
            ExchangeError::MalformedResponse("reply is not a JSON object".into())
        })?;

        let encoded = match object.get(IMAGE_FIELD) {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim(),
            Some(Value::String(_)) => {
                return Err(ExchangeError::MalformedResponse(format!(
                    "`{IMAGE_FIELD}` field is empty"
                )));
            }
            Some(_) => {
                return Err(ExchangeError::MalformedResponse(format!(
                    "`{IMAGE_FIELD}` field is not a string"
                )));
            }
            None => {
                return Err(ExchangeError::MalformedResponse(format!(
                    "`{IMAGE_FIELD}` field not found in reply"
                )));
            }
        };

        let blob = decode_base64(strip_data_url(encoded))?;

        let format = image::guess_format(&blob)?;
        if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg) {
            return Err(ExchangeError::MalformedResponse(format!(
                "unsupported image format {format:?}"
            )));
        }

        let raster = image::load_from_memory_with_format(&blob, format)?.to_rgba8();
        let (width, height) = raster.dimensions();
        if width == 0 || height == 0 {
            return Err(ExchangeError::MalformedResponse("image has no pixels".into()));
        }

        Ok(ImageBuffer {
            width,
            height,
            rgba: raster.into_raw(),
        })
    }

    // ── Internal encoding helpers ────────────────────────────────

    fn encode_json(frame: &ScalarFrame) -> Result<Bytes, ExchangeError> {
        let shape = JsonFrameRef {
            width: frame.width,
            height: frame.height,
            data: &frame.data,
        };
        let mut writer = BytesMut::with_capacity(frame.data.len() * 12 + 48).writer();
        serde_json::to_writer(&mut writer, &shape).map_err(|_| ExchangeError::InvalidFrame {
            width: frame.width,
            height: frame.height,
            expected: frame.texel_count(),
            actual: frame.data.len(),
        })?;
        Ok(writer.into_inner().freeze())
    }

    fn encode_binary(frame: &ScalarFrame) -> Bytes {
        let mut out = BytesMut::with_capacity(frame.data.len() * BYTES_PER_SCALAR);
        for &value in &frame.data {
            out.put_f32_le(value);
        }
        out.freeze()
    }
}

// ── Reply helpers ────────────────────────────────────────────────

fn is_json_media_type(content_type: &str) -> bool {
    let media = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    media == "application/json" || media == "text/json" || media.ends_with("+json")
}

/// Accept `data:image/png;base64,<blob>` as well as a bare blob.
fn strip_data_url(encoded: &str) -> &str {
    if encoded.starts_with("data:") {
        if let Some((_, blob)) = encoded.split_once(";base64,") {
            return blob;
        }
    }
    encoded
}

fn decode_base64(encoded: &str) -> Result<Vec<u8>, ExchangeError> {
    if encoded.bytes().any(|b| b.is_ascii_whitespace()) {
        let compact: String = encoded.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        return Ok(STANDARD.decode(compact)?);
    }
    Ok(STANDARD.decode(encoded)?)
}

// ── Tests ────────────────────────────────────────────────────────

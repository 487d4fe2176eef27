use std::io::Write;

use flate2::write::GzDecoder;

use crate::*;

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("decompress: {0}")]
	Io(#[from] std::io::Error),
	#[error("compressed stream ended mid-member")]
	Truncated,
}

/// Decompresses response-body events as they arrive. The proxy hands us
/// discrete chunks, so state must persist between calls; the write-side gzip
/// decoder is feedable a chunk at a time. Unknown encodings pass through raw.
pub enum BodyDecoder {
	Identity,
	Gzip(Box<GzDecoder<Vec<u8>>>),
}

impl BodyDecoder {
	pub fn new(content_encoding: Option<&str>) -> BodyDecoder {
		match content_encoding {
			Some(ce) if ce.eq_ignore_ascii_case("gzip") => {
				BodyDecoder::Gzip(Box::new(GzDecoder::new(Vec::new())))
			},
			_ => BodyDecoder::Identity,
		}
	}

	pub fn decode(&mut self, data: &[u8], end_of_stream: bool) -> Result<Bytes, Error> {
		match self {
			BodyDecoder::Identity => Ok(Bytes::copy_from_slice(data)),
			BodyDecoder::Gzip(decoder) => {
				decoder.write_all(data)?;
				decoder.flush()?;
				if end_of_stream {
					decoder.try_finish().map_err(|_| Error::Truncated)?;
				}
				let out = std::mem::take(decoder.get_mut());
				Ok(Bytes::from(out))
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use flate2::Compression;
	use flate2::write::GzEncoder;

	use super::*;

	fn gzip(data: &[u8]) -> Vec<u8> {
		let mut enc = GzEncoder::new(Vec::new(), Compression::default());
		enc.write_all(data).unwrap();
		enc.finish().unwrap()
	}

	#[test]
	fn identity_passthrough() {
		let mut d = BodyDecoder::new(None);
		assert_eq!(d.decode(b"hello", true).unwrap().as_ref(), b"hello");
	}

	#[test]
	fn unknown_encoding_passthrough() {
		let mut d = BodyDecoder::new(Some("br"));
		assert_eq!(d.decode(b"raw", true).unwrap().as_ref(), b"raw");
	}

	#[test]
	fn gzip_chunked() {
		let payload = b"the quick brown fox jumps over the lazy dog".repeat(100);
		let compressed = gzip(&payload);
		let mut d = BodyDecoder::new(Some("gzip"));
		let mut out = Vec::new();
		let mid = compressed.len() / 2;
		out.extend_from_slice(&d.decode(&compressed[..mid], false).unwrap());
		out.extend_from_slice(&d.decode(&compressed[mid..], true).unwrap());
		assert_eq!(out, payload);
	}

	#[test]
	fn truncated_gzip_fails_at_end_of_stream() {
		let compressed = gzip(b"some payload that will be cut short");
		let mut d = BodyDecoder::new(Some("gzip"));
		let cut = &compressed[..compressed.len() - 6];
		// mid-stream chunks are fine
		let _ = d.decode(cut, false).unwrap();
		// the final event must notice the stream never finished
		assert!(d.decode(&[], true).is_err());
	}
}

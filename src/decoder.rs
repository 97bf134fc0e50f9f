use futures_util::{stream, Stream, StreamExt};

/// Incremental UTF-8 decoder for a response body delivered in arbitrary chunks.
///
/// A multi-byte character split across two chunks is held back until the rest
/// of it arrives. Bytes that can never form valid UTF-8 become U+FFFD.
#[derive(Debug, Default)]
pub struct ByteDecoder {
    pending: Vec<u8>,
}

impl ByteDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut out = String::with_capacity(self.pending.len());
        let mut consumed = 0;
        loop {
            let rest = &self.pending[consumed..];
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    consumed = self.pending.len();
                    break;
                }
                Err(err) => {
                    let valid_up_to = err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&rest[..valid_up_to]));
                    match err.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            consumed += valid_up_to + len;
                        }
                        // Truncated sequence at the end: wait for the next chunk.
                        None => {
                            consumed += valid_up_to;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..consumed);
        out
    }

    /// Flush at end of stream. A sequence that never completed becomes U+FFFD.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        self.pending.clear();
        char::REPLACEMENT_CHARACTER.to_string()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Lazily decode a stream of byte chunks into text fragments.
///
/// The returned stream ends with the input; a transport error is passed
/// through once and ends it as well.
pub fn decode_stream<S, B, E>(chunks: S) -> impl Stream<Item = Result<String, E>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    stream::unfold(
        (Box::pin(chunks), Some(ByteDecoder::new())),
        |(mut chunks, decoder)| async move {
            let mut decoder = decoder?;
            match chunks.next().await {
                Some(Ok(bytes)) => {
                    let text = decoder.decode(bytes.as_ref());
                    Some((Ok(text), (chunks, Some(decoder))))
                }
                Some(Err(err)) => Some((Err(err), (chunks, None))),
                None => {
                    let tail = decoder.finish();
                    if tail.is_empty() {
                        None
                    } else {
                        Some((Ok(tail), (chunks, None)))
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn holds_back_split_multibyte_character() {
        let bytes = "naïve €".as_bytes();
        // 'ï' is two bytes, '€' is three.
        let split = bytes.len() - 2;

        let mut decoder = ByteDecoder::new();
        let first = decoder.decode(&bytes[..split]);
        assert_eq!(first, "naïve ");
        assert!(decoder.has_pending());

        let second = decoder.decode(&bytes[split..]);
        assert_eq!(second, "€");
        assert!(!decoder.has_pending());
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn every_single_byte_split_decodes_cleanly() {
        let text = "über 😀 data";
        let mut decoder = ByteDecoder::new();
        let mut out = String::new();
        for byte in text.as_bytes() {
            out.push_str(&decoder.decode(std::slice::from_ref(byte)));
        }
        out.push_str(&decoder.finish());
        assert_eq!(out, text);
        assert!(!out.contains(char::REPLACEMENT_CHARACTER));
    }

    #[test]
    fn invalid_bytes_become_replacement_characters() {
        let mut decoder = ByteDecoder::new();
        let out = decoder.decode(b"ok\xffok");
        assert_eq!(out, "ok\u{FFFD}ok");
    }

    #[test]
    fn dangling_sequence_is_flushed_on_finish() {
        let mut decoder = ByteDecoder::new();
        assert_eq!(decoder.decode(&[b'a', 0xE2, 0x82]), "a");
        assert_eq!(decoder.finish(), "\u{FFFD}");
        assert!(!decoder.has_pending());
    }

    #[tokio::test]
    async fn decode_stream_passes_errors_through_and_stops() {
        let chunks = stream::iter(vec![
            Ok::<_, String>(vec![0xC3]),
            Ok(vec![0xA9, b'!']),
            Err("connection reset".to_string()),
            Ok(b"never".to_vec()),
        ]);
        let items: Vec<Result<String, String>> = decode_stream(chunks).collect().await;
        assert_eq!(
            items,
            vec![
                Ok(String::new()),
                Ok("é!".to_string()),
                Err("connection reset".to_string()),
            ]
        );
    }
}

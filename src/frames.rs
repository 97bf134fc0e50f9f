const FRAME_SEPARATOR: &str = "\n\n";
const EVENT_MARKER: &str = "event:";

/// Reassembles `event:`/`data:` frames from decoded text fragments.
///
/// Text after the last blank-line separator is retained and prepended to the
/// next fragment, so a frame split across network chunks is never lost.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buffer: String,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return every frame it completes.
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.buffer.push_str(text);
        if self.buffer.contains("\r\n") {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.find(FRAME_SEPARATOR) {
            let block: String = self.buffer.drain(..pos + FRAME_SEPARATOR.len()).collect();
            match frame_candidate(&block[..pos]) {
                Some(frame) => frames.push(frame.to_string()),
                None => {
                    if !block.trim().is_empty() {
                        tracing::trace!(len = block.len(), "discarding text without an event line");
                    }
                }
            }
        }
        frames
    }

    /// Flush the retained tail once the stream has ended. Returns the last
    /// frame if the upstream closed without a trailing blank line.
    pub fn finish(&mut self) -> Option<String> {
        let tail = std::mem::take(&mut self.buffer);
        let tail = tail.trim_end_matches(['\r', '\n']);
        frame_candidate(tail).map(str::to_string)
    }

    /// Bytes of text waiting for a separator.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

/// The part of a block starting at its first `event:` line.
fn frame_candidate(block: &str) -> Option<&str> {
    if block.starts_with(EVENT_MARKER) {
        return Some(block);
    }
    block.find("\nevent:").map(|pos| &block[pos + 1..])
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_FRAMES: &str = concat!(
        "event: update\ndata: {\"researcher\": {\"research_data\": [\"a\"]}}\n\n",
        "event: error\ndata: {\"error\": \"boom\"}\n\n"
    );

    fn assemble_in_pieces(text: &str, split: usize) -> Vec<String> {
        let mut assembler = FrameAssembler::new();
        let mut frames = assembler.push(&text[..split]);
        frames.extend(assembler.push(&text[split..]));
        frames.extend(assembler.finish());
        frames
    }

    #[test]
    fn emits_complete_frames_and_retains_remainder() {
        let mut assembler = FrameAssembler::new();
        let frames = assembler.push("event: update\ndata: {}\n\nevent: err");
        assert_eq!(frames, vec!["event: update\ndata: {}".to_string()]);
        assert_eq!(assembler.pending_len(), "event: err".len());

        let frames = assembler.push("or\ndata: {\"error\": \"x\"}\n\n");
        assert_eq!(frames, vec!["event: error\ndata: {\"error\": \"x\"}".to_string()]);
        assert_eq!(assembler.pending_len(), 0);
    }

    #[test]
    fn any_split_point_yields_the_same_frames() {
        let whole = assemble_in_pieces(TWO_FRAMES, TWO_FRAMES.len());
        assert_eq!(whole.len(), 2);
        for split in 0..=TWO_FRAMES.len() {
            assert_eq!(assemble_in_pieces(TWO_FRAMES, split), whole, "split at {split}");
        }
    }

    #[test]
    fn crlf_separators_are_normalized() {
        let mut assembler = FrameAssembler::new();
        let mut frames = assembler.push("event: update\r\ndata: {}\r");
        frames.extend(assembler.push("\n\r\n"));
        assert_eq!(frames, vec!["event: update\ndata: {}".to_string()]);
    }

    #[test]
    fn leading_noise_and_comment_blocks_are_dropped() {
        let mut assembler = FrameAssembler::new();
        let frames = assembler.push(": keep-alive\n\ngarbage\nevent: update\ndata: {}\n\n");
        assert_eq!(frames, vec!["event: update\ndata: {}".to_string()]);
    }

    #[test]
    fn unterminated_last_frame_is_flushed() {
        let mut assembler = FrameAssembler::new();
        assert!(assembler.push("event: end\ndata: {\"report\": \"r\"}\n").is_empty());
        assert_eq!(
            assembler.finish(),
            Some("event: end\ndata: {\"report\": \"r\"}".to_string())
        );
        assert_eq!(assembler.finish(), None);
    }
}

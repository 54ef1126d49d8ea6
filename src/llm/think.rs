//! Removal of `<think>...</think>` reasoning from streamed text.
//!
//! Local reasoning models interleave hidden thoughts with the answer. Tags
//! may be split across fragments, so the filter holds back just enough of
//! the tail to recognise a tag that completes in the next fragment.

const OPEN: &str = "<think>";
const CLOSE: &str = "</think>";

#[derive(Debug, Default)]
pub(crate) struct ThinkFilter {
    hidden: bool,
    pending: String,
}

impl ThinkFilter {
    /// Feed a fragment, returning the text now known to be visible.
    pub(crate) fn push(&mut self, fragment: &str) -> String {
        self.pending.push_str(fragment);
        let mut visible = String::new();
        loop {
            let tag = if self.hidden { CLOSE } else { OPEN };
            if let Some(at) = self.pending.find(tag) {
                if !self.hidden {
                    visible.push_str(&self.pending[..at]);
                }
                self.pending.drain(..at + tag.len());
                self.hidden = !self.hidden;
                continue;
            }
            let keep = partial_tag_len(&self.pending, tag);
            let cut = self.pending.len() - keep;
            if !self.hidden {
                visible.push_str(&self.pending[..cut]);
            }
            self.pending.drain(..cut);
            return visible;
        }
    }

    /// Release whatever is held back once the stream ends.
    ///
    /// An unterminated reasoning block is discarded.
    pub(crate) fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        if self.hidden { String::new() } else { rest }
    }
}

/// Length of the longest suffix of `text` that is a proper prefix of `tag`.
fn partial_tag_len(text: &str, tag: &str) -> usize {
    (1..tag.len())
        .rev()
        .find(|&n| text.ends_with(&tag[..n]))
        .unwrap_or(0)
}

//! Speakable text extraction and sentence segmentation.

/// Markers that open and close a code fence.
const FENCES: [&str; 2] = ["```", "'''"];

/// The speakable form of a text snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Speakable {
    /// Fence-free, backtick-free, whitespace-collapsed text.
    pub text: String,
    /// A fence was opened but not closed.
    pub open_fence: bool,
}

/// What happens to text after an unclosed fence or an unpaired backtick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unclosed {
    /// Leave it out; a later fragment may still close it.
    Withhold,
    /// Keep it as literal text.
    Keep,
}

/// Speakable form of a snapshot of a still-growing stream.
///
/// Complete fenced blocks are removed, inline `` `code` `` is unwrapped, and
/// whitespace runs collapse to single spaces. Text from an unclosed fence or
/// an unpaired backtick onwards is withheld, as is a trailing partial fence
/// marker, so the result for a longer snapshot always extends the result for
/// a shorter one.
pub fn speakable(raw: &str) -> Speakable {
    render(
        strip_partial_marker(raw),
        Unclosed::Withhold,
        Unclosed::Withhold,
    )
}

/// Speakable form of the final stream text.
///
/// An unclosed fence is still withheld; a backtick that never found its
/// pair is spoken as is.
pub fn speakable_final(raw: &str) -> Speakable {
    render(raw, Unclosed::Withhold, Unclosed::Keep)
}

/// Speakable form of a finished text such as a tool result.
///
/// Unmatched fences and backticks are kept.
pub fn sanitize_for_speech(raw: &str) -> String {
    render(raw, Unclosed::Keep, Unclosed::Keep).text
}

fn render(raw: &str, fences: Unclosed, backticks: Unclosed) -> Speakable {
    let mut kept = String::with_capacity(raw.len());
    let mut literal_tail = "";
    let mut rest = raw;
    let mut open_fence = false;

    loop {
        let opener = FENCES
            .iter()
            .filter_map(|fence| rest.find(fence).map(|at| (at, *fence)))
            .min_by_key(|(at, _)| *at);
        let Some((at, fence)) = opener else {
            kept.push_str(rest);
            break;
        };
        kept.push_str(&rest[..at]);
        let after_open = &rest[at + fence.len()..];
        match after_open.find(fence) {
            Some(close) => {
                kept.push(' ');
                rest = &after_open[close + fence.len()..];
            }
            None => {
                open_fence = true;
                if fences == Unclosed::Keep {
                    literal_tail = &rest[at..];
                }
                break;
            }
        }
    }

    let mut text = unwrap_inline_code(&kept, backticks);
    text.push_str(literal_tail);
    Speakable {
        text: collapse_whitespace(&text),
        open_fence,
    }
}

/// Drop a trailing run of one or two fence characters, which the next
/// fragment could still turn into a fence opener.
fn strip_partial_marker(raw: &str) -> &str {
    for marker in ['`', '\''] {
        let trimmed = raw.trim_end_matches(marker);
        if (1..=2).contains(&(raw.len() - trimmed.len())) {
            return trimmed;
        }
    }
    raw
}

/// Replace each `` `x` `` pair with `x`, pairing backticks left to right.
fn unwrap_inline_code(text: &str, unpaired: Unclosed) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('`') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('`') else {
            if unpaired == Unclosed::Keep {
                out.push_str(&rest[open..]);
            }
            return out;
        };
        out.push_str(&after[..close]);
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    out
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split `text` at terminal punctuation (`.`, `!`, `?`) followed by
/// whitespace.
///
/// Returns the complete sentences and the byte offset where the unfinished
/// tail begins. The tail is never returned as a sentence.
pub fn split_sentences(text: &str) -> (Vec<String>, usize) {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let Some(&(_, next)) = chars.peek() else {
            break;
        };
        if !next.is_whitespace() {
            continue;
        }
        let sentence = text[start..i + c.len_utf8()].trim();
        if !sentence.is_empty() {
            sentences.push(sentence.to_owned());
        }
        start = text.len();
        while let Some(&(j, ws)) = chars.peek() {
            if ws.is_whitespace() {
                chars.next();
            } else {
                start = j;
                break;
            }
        }
    }

    (sentences, start)
}

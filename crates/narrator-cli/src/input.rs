//! Stdin line protocol.

use narrator_core::SpeechRequest;

/// What one input line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Speak(SpeechRequest),
    ListAvatars,
}

/// Parse one line.
///
/// `!` (interrupt) and `>` (direct) may be combined as `!>`. Blank lines
/// yield `None`.
pub fn parse_line(line: &str) -> Option<Input> {
    let line = line.trim();
    if line == "/avatars" {
        return Some(Input::ListAvatars);
    }

    let (interrupt, rest) = line
        .strip_prefix('!')
        .map_or((false, line), |rest| (true, rest.trim_start()));
    let (direct, text) = rest
        .strip_prefix('>')
        .map_or((false, rest), |text| (true, text.trim_start()));
    if text.is_empty() {
        return None;
    }

    let mut request = if direct {
        SpeechRequest::direct(text)
    } else {
        SpeechRequest::generate(text)
    };
    request.interrupt = interrupt;
    Some(Input::Speak(request))
}

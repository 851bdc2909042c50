//! Re-encoding of model output into the transport's markup dialect.
//!
//! The generator writes CommonMark-ish text (`**bold**`, `*italic*`, fenced
//! code, links). The transport understands a stricter dialect where bold is a
//! single `*`, italic is `_`, and every other significant symbol must be
//! escaped with a backslash. [`sanitize`] translates between the two in one
//! pass and always closes whatever the input left open, so its output can be
//! handed to the transport without risking a parse error.

use crate::models::SanitizedText;

/// Symbols the renderer treats as markup outside of an entity.
pub const SPECIAL_CHARS: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

pub const CODE_FENCE: &str = "```";
pub const BOLD: char = '*';
pub const ITALIC: char = '_';
const ESCAPE: char = '\\';

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Link {
    #[default]
    Outside,
    Label,
    Target,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ScanState {
    code: bool,
    bold: bool,
    italic: bool,
    link: Link,
    // Output offset and source symbol of the delimiter that opened the span.
    bold_opener: Option<(usize, char)>,
    italic_opener: Option<(usize, char)>,
    // Delimiter emitted by the last toggle and the output length right after it.
    last_toggle: Option<(char, usize)>,
}

impl ScanState {
    fn in_entity(&self) -> bool {
        self.bold || self.italic || self.link != Link::Outside
    }
}

#[derive(Debug, Clone, Copy)]
struct LinkCheckpoint {
    pos: usize,
    out_len: usize,
    state: ScanState,
}

/// Contexts still open at the end of a piece of dialect text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenContexts {
    pub code: bool,
    pub bold: bool,
    pub italic: bool,
    pub link: bool,
}

impl OpenContexts {
    pub fn is_empty(&self) -> bool {
        !(self.code || self.bold || self.italic || self.link)
    }

    /// Delimiters that close the open contexts, innermost first.
    pub fn closing(&self) -> String {
        let mut out = String::new();
        if self.code {
            out.push('\n');
            out.push_str(CODE_FENCE);
        }
        if self.italic {
            out.push(ITALIC);
        }
        if self.bold {
            out.push(BOLD);
        }
        out
    }

    /// Delimiters that reopen the same contexts, outermost first.
    pub fn reopening(&self) -> String {
        let mut out = String::new();
        if self.bold {
            out.push(BOLD);
        }
        if self.italic {
            out.push(ITALIC);
        }
        if self.code {
            out.push_str(CODE_FENCE);
            out.push('\n');
        }
        out
    }
}

struct Scanner<'a> {
    input: &'a [char],
    out: String,
    pos: usize,
    state: ScanState,
    pending_link: Option<LinkCheckpoint>,
    // `[` before this index belongs to a label that never became a link.
    literal_brackets_until: usize,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a [char]) -> Self {
        Self {
            input,
            out: String::with_capacity(input.len() + input.len() / 8),
            pos: 0,
            state: ScanState::default(),
            pending_link: None,
            literal_brackets_until: 0,
        }
    }

    fn peek(&self, offset: usize) -> Option<char> {
        self.input.get(self.pos + offset).copied()
    }

    fn at_fence(&self) -> bool {
        self.input[self.pos..].starts_with(&['`', '`', '`'])
    }

    fn links_allowed(&self) -> bool {
        self.pos >= self.literal_brackets_until
    }

    fn run(mut self) -> String {
        loop {
            while self.pos < self.input.len() {
                self.step();
            }
            if !self.rewind_label(self.input.len()) {
                break;
            }
        }

        self.close_open_contexts();
        self.out
    }

    /// Replays a label that turned out not to be a link as plain text, with
    /// every `[` up to `until` escaped. Each position is replayed at most once.
    fn rewind_label(&mut self, until: usize) -> bool {
        let Some(checkpoint) = self.pending_link.take() else {
            return false;
        };
        self.out.truncate(checkpoint.out_len);
        self.state = checkpoint.state;
        self.pos = checkpoint.pos;
        self.literal_brackets_until = until;
        true
    }

    fn step(&mut self) {
        let c = self.input[self.pos];

        // Link targets run verbatim up to `)`, fences included.
        if self.state.link == Link::Target {
            self.out.push(c);
            if c == ')' {
                self.state.link = Link::Outside;
            }
            self.pos += 1;
            return;
        }

        if self.at_fence() {
            self.state.code = !self.state.code;
            self.out.push_str(CODE_FENCE);
            self.pos += CODE_FENCE.len();
            return;
        }

        if self.state.code {
            self.out.push(c);
            self.pos += 1;
            return;
        }

        if c == ESCAPE {
            match self.peek(1) {
                Some(next) if next == ESCAPE || SPECIAL_CHARS.contains(&next) => {
                    self.out.push(ESCAPE);
                    self.out.push(next);
                    self.pos += 2;
                }
                _ => {
                    self.out.push(ESCAPE);
                    self.out.push(ESCAPE);
                    self.pos += 1;
                }
            }
            return;
        }

        if (c == '*' || c == '_') && self.peek(1) == Some(c) {
            self.toggle_bold(c);
            self.pos += 2;
            return;
        }

        if c == '_' || c == '*' {
            self.toggle_italic(c);
            self.pos += 1;
            return;
        }

        if c == '[' && self.state.link == Link::Outside && self.links_allowed() {
            self.pending_link = Some(LinkCheckpoint {
                pos: self.pos,
                out_len: self.out.len(),
                state: self.state,
            });
            self.state.link = Link::Label;
            self.out.push(c);
            self.pos += 1;
            return;
        }

        if c == ']' && self.state.link == Link::Label {
            if self.peek(1) == Some('(') {
                self.pending_link = None;
                self.state.link = Link::Target;
                self.out.push_str("](");
                self.pos += 2;
            } else {
                self.rewind_label(self.pos + 1);
            }
            return;
        }

        let literal_bracket = c == '[' && !self.links_allowed();
        if SPECIAL_CHARS.contains(&c) && (literal_bracket || !self.state.in_entity()) {
            self.out.push(ESCAPE);
        }
        self.out.push(c);
        self.pos += 1;
    }

    // Two toggles of the same delimiter back to back would print a doubled
    // delimiter, which the renderer reads as a different entity. They cancel
    // out instead.
    fn cancels_previous_toggle(&mut self, delimiter: char) -> bool {
        if self.state.last_toggle != Some((delimiter, self.out.len())) {
            return false;
        }
        self.out.pop();
        self.state.last_toggle = None;
        true
    }

    fn toggle_italic(&mut self, source: char) {
        if !self.cancels_previous_toggle(ITALIC) {
            if !self.state.italic {
                self.state.italic_opener = Some((self.out.len(), source));
            }
            self.out.push(ITALIC);
            self.state.last_toggle = Some((ITALIC, self.out.len()));
        }
        self.state.italic = !self.state.italic;
    }

    fn toggle_bold(&mut self, source: char) {
        if !self.cancels_previous_toggle(BOLD) {
            if !self.state.bold {
                self.state.bold_opener = Some((self.out.len(), source));
            }
            self.out.push(BOLD);
            self.state.last_toggle = Some((BOLD, self.out.len()));
        }
        self.state.bold = !self.state.bold;
    }

    /// Closes `delimiter`'s span, or turns its opener back into escaped text
    /// when nothing follows it.
    fn close_span(&mut self, delimiter: char, opener: Option<(usize, char)>, width: usize) {
        match opener {
            Some((at, source)) if at + 1 == self.out.len() => {
                self.out.truncate(at);
                for _ in 0..width {
                    self.out.push(ESCAPE);
                    self.out.push(source);
                }
            }
            _ => self.out.push(delimiter),
        }
    }

    fn close_open_contexts(&mut self) {
        if self.state.link == Link::Target {
            self.out.push(')');
        }
        if self.state.code {
            self.out.push('\n');
            self.out.push_str(CODE_FENCE);
        }
        if self.state.italic {
            self.close_span(ITALIC, self.state.italic_opener, 1);
        }
        if self.state.bold {
            self.close_span(BOLD, self.state.bold_opener, 2);
        }
        self.state = ScanState::default();
    }
}

/// Re-encodes arbitrary text into balanced, escaped dialect text. Never fails.
pub fn sanitize(text: &str) -> SanitizedText {
    let chars: Vec<char> = text.chars().collect();
    SanitizedText::new(Scanner::new(&chars).run())
}

/// Parses dialect text and reports which contexts remain open at its end.
pub fn open_contexts(text: &str) -> OpenContexts {
    let chars: Vec<char> = text.chars().collect();
    let mut state = ScanState::default();
    let mut pos = 0;

    while pos < chars.len() {
        if state.link == Link::Target {
            if chars[pos] == ')' {
                state.link = Link::Outside;
            }
            pos += 1;
            continue;
        }
        if chars[pos..].starts_with(&['`', '`', '`']) {
            state.code = !state.code;
            pos += CODE_FENCE.len();
            continue;
        }
        let c = chars[pos];
        pos += 1;

        if state.code {
            continue;
        }
        match (c, state.link) {
            (ESCAPE, _) => pos += 1,
            (BOLD, _) => state.bold = !state.bold,
            (ITALIC, _) => state.italic = !state.italic,
            ('[', Link::Outside) => state.link = Link::Label,
            (']', Link::Label) if chars.get(pos) == Some(&'(') => {
                state.link = Link::Target;
                pos += 1;
            }
            _ => {}
        }
    }

    OpenContexts {
        code: state.code,
        bold: state.bold,
        italic: state.italic,
        link: state.link != Link::Outside,
    }
}

/// Visible characters of dialect text: markup delimiters and escape markers
/// removed, escaped symbols kept.
pub fn visible_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_code = false;
    let mut fence_run = 0;

    while let Some(c) = chars.next() {
        if c == '`' {
            fence_run += 1;
            if fence_run == 3 {
                in_code = !in_code;
                fence_run = 0;
            }
            continue;
        }
        for _ in 0..fence_run {
            out.push('`');
        }
        fence_run = 0;

        if in_code {
            out.push(c);
            continue;
        }
        match c {
            ESCAPE => {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            BOLD | ITALIC => {}
            _ => out.push(c),
        }
    }
    for _ in 0..fence_run {
        out.push('`');
    }
    out
}

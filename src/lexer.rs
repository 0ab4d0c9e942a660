//! Lexical analysis of one input line.
//!
//! The lexer is pure: it resolves quotes and backslash escapes, splits the line into
//! `;`-separated groups and `|`-separated segments, and detects a trailing `&`. Expansion of
//! `$NAME` and `$(...)` happens later, in [`crate::parser`], because running a substitution
//! must wait until the previous group has finished.

/// A word with its quoting resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawWord {
    text: String,
    /// Some part of the word was quoted or escaped.
    quoted: bool,
    /// Byte offsets of `$` characters that came from single quotes or a backslash escape.
    literal_dollars: Vec<usize>,
    /// The last character is an `&` that was neither quoted nor escaped.
    trailing_amp: bool,
}

impl RawWord {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_quoted(&self) -> bool {
        self.quoted
    }

    /// Whether this word is exactly the operator `op`. Quoting a word disables operators.
    pub fn is_operator(&self, op: &str) -> bool {
        !self.quoted && self.text == op
    }

    /// Whether the `$` at byte offset `idx` may start an expansion.
    pub fn is_live_dollar(&self, idx: usize) -> bool {
        self.text[idx..].starts_with('$') && !self.literal_dollars.contains(&idx)
    }
}

/// The words of one `;`-separated group, split into pipeline segments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawGroup {
    pub segments: Vec<Vec<RawWord>>,
    /// The group ended with an unquoted `&`.
    pub background: bool,
}

impl RawGroup {
    fn is_blank(&self) -> bool {
        !self.background && self.segments.len() <= 1 && self.segments.iter().all(Vec::is_empty)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LexingState {
    Start,
    ReadingWord,
    ReadingSingleQuote,
    ReadingDoubleQuote,
}

struct LexingFSM {
    input: Vec<char>,
    pos: usize,
    state: LexingState,
    word: RawWord,
    segment: Vec<RawWord>,
    group: RawGroup,
    groups: Vec<RawGroup>,
}

impl LexingFSM {
    fn new(line: &str) -> Self {
        LexingFSM {
            input: line.chars().collect(),
            pos: 0,
            state: LexingState::Start,
            word: RawWord::default(),
            segment: Vec::new(),
            group: RawGroup::default(),
            groups: Vec::new(),
        }
    }

    fn make_groups(mut self) -> Vec<RawGroup> {
        while let Some(ch) = self.read_char() {
            match self.state {
                LexingState::Start | LexingState::ReadingWord => self.handle_unquoted(ch),
                LexingState::ReadingSingleQuote => self.handle_single_quote(ch),
                LexingState::ReadingDoubleQuote => self.handle_double_quote(ch),
            }
        }
        // An unterminated quote runs to the end of the line.
        self.finish_group();
        self.groups
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn handle_unquoted(&mut self, ch: char) {
        match ch {
            ' ' | '\t' | '\r' | '\n' => self.finish_word(),
            ';' => self.finish_group(),
            '|' => self.finish_segment(),
            '\'' => {
                self.begin_word(true);
                self.state = LexingState::ReadingSingleQuote;
            }
            '"' => {
                self.begin_word(true);
                self.state = LexingState::ReadingDoubleQuote;
            }
            '\\' => match self.read_char() {
                Some(escaped) => {
                    self.begin_word(true);
                    self.push_literal(escaped);
                }
                None => self.push(ch),
            },
            '$' if self.peek_char() == Some('(') => self.push_dollar_or_substitution(),
            '&' => {
                self.push(ch);
                self.word.trailing_amp = true;
            }
            c => self.push(c),
        }
    }

    fn handle_single_quote(&mut self, ch: char) {
        match ch {
            '\'' => self.state = LexingState::ReadingWord,
            c => self.push_literal(c),
        }
    }

    fn handle_double_quote(&mut self, ch: char) {
        match ch {
            '"' => self.state = LexingState::ReadingWord,
            '$' if self.peek_char() == Some('(') => self.push_dollar_or_substitution(),
            c => self.push(c),
        }
    }

    /// Called with `$` consumed and `(` next. Copies a balanced `$(...)` span verbatim so its
    /// body is not split; without a matching `)` only the `$` is taken.
    fn push_dollar_or_substitution(&mut self) {
        match self.matching_paren(self.pos) {
            Some(close) => {
                self.push('$');
                while self.pos <= close {
                    let c = self.input[self.pos];
                    self.pos += 1;
                    self.push(c);
                }
            }
            None => self.push('$'),
        }
    }

    /// Index of the `)` closing the `(` at `open`, tracking nesting depth.
    fn matching_paren(&self, open: usize) -> Option<usize> {
        let mut depth = 0usize;
        for (i, &c) in self.input.iter().enumerate().skip(open) {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        None
    }

    fn begin_word(&mut self, quoted: bool) {
        if self.state == LexingState::Start {
            self.state = LexingState::ReadingWord;
        }
        self.word.quoted |= quoted;
        self.word.trailing_amp = false;
    }

    fn push(&mut self, c: char) {
        self.begin_word(false);
        self.word.text.push(c);
    }

    /// Push a character that came from single quotes or a backslash escape.
    fn push_literal(&mut self, c: char) {
        self.begin_word(true);
        if c == '$' {
            self.word.literal_dollars.push(self.word.text.len());
        }
        self.word.text.push(c);
    }

    fn finish_word(&mut self) {
        if self.state != LexingState::Start {
            self.segment.push(std::mem::take(&mut self.word));
        }
        self.state = LexingState::Start;
    }

    fn finish_segment(&mut self) {
        self.finish_word();
        self.group.segments.push(std::mem::take(&mut self.segment));
    }

    fn finish_group(&mut self) {
        self.finish_segment();
        let mut group = std::mem::take(&mut self.group);

        if let Some(segment) = group.segments.last_mut() {
            if let Some(last) = segment.last_mut().filter(|w| w.trailing_amp) {
                last.text.pop();
                last.trailing_amp = false;
                group.background = true;
                if last.text.is_empty() && !last.quoted {
                    segment.pop();
                }
            }
        }

        if !group.is_blank() {
            self.groups.push(group);
        }
    }
}

/// Split `line` into `;`-separated groups of `|`-separated segments of resolved words.
///
/// Groups consisting only of whitespace are dropped.
pub fn split_into_groups(line: &str) -> Vec<RawGroup> {
    LexingFSM::new(line).make_groups()
}

use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

#[derive(Debug)]
pub struct File {
    name: String,
    contents: String,
    lines: Vec<usize>,
}

impl File {
    pub fn new(name: impl Into<String>, contents: impl Into<String>) -> Self {
        let name = name.into();
        let contents = contents.into();
        let mut lines = vec![0];
        for (idx, ch) in contents.char_indices() {
            if ch == '\n' {
                lines.push(idx + ch.len_utf8());
            }
        }
        Self {
            name,
            contents,
            lines,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn contents(&self) -> &str {
        &self.contents
    }

    pub fn len(&self) -> usize {
        self.contents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    pub fn line_column_at(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.contents.len());
        let line_index = match self.lines.binary_search(&offset) {
            Ok(index) => index,
            Err(index) => index.saturating_sub(1),
        };
        let line_start = self.lines[line_index];
        let column = self.contents[line_start..offset].chars().count() + 1;
        (line_index + 1, column)
    }

    pub fn line(&self, line: usize) -> &str {
        if line == 0 || line > self.lines.len() {
            return "";
        }
        let start = self.lines[line - 1];
        let end = if let Some(next_start) = self.lines.get(line) {
            let mut end = *next_start;
            if end > start && self.contents.as_bytes()[end - 1] == b'\n' {
                end -= 1;
            }
            end
        } else {
            self.contents.len()
        };
        &self.contents[start..end]
    }
}

#[derive(Debug, Clone)]
pub struct SourceInfo {
    range: Range<usize>,
    file: Arc<File>,
}

impl SourceInfo {
    pub fn new(file: Arc<File>, range: Range<usize>) -> Self {
        Self { range, file }
    }

    pub fn eof(file: Arc<File>) -> Self {
        let len = file.len();
        let start = len.saturating_sub(1);
        Self::new(file, start..len)
    }

    pub fn as_str(&self) -> &str {
        self.file
            .contents()
            .get(self.range.clone())
            .expect("invalid token position")
    }

    pub fn line_column(&self) -> (usize, usize) {
        self.file.line_column_at(self.range.start)
    }
}

impl std::fmt::Display for SourceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let (line, column) = self.line_column();
        writeln!(f, "{}:{}:{}\n", self.file.name(), line, column)?;
        let line_text = self.file.line(line);
        writeln!(f, "{}", line_text)?;
        writeln!(
            f,
            "{}{}",
            " ".repeat(column - 1),
            "^".repeat(std::cmp::max(1, self.as_str().chars().count()))
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,  // e.g. "foo", "h1"
    Symbol, // a separator matched by the trie, e.g. ":=", "=>"
    NumLit, // e.g. "0", "42"
    StrLit, // e.g. "\"Prop\"", quotes included
}

#[derive(Debug, Clone)]
pub struct Token {
    pub kind: TokenKind,
    pub source_info: SourceInfo,
}

impl Token {
    pub fn is_ident(&self) -> bool {
        self.kind == TokenKind::Ident
    }

    pub fn is_symbol(&self) -> bool {
        self.kind == TokenKind::Symbol
    }

    pub fn is_num_lit(&self) -> bool {
        self.kind == TokenKind::NumLit
    }

    pub fn is_str_lit(&self) -> bool {
        self.kind == TokenKind::StrLit
    }

    pub fn as_str(&self) -> &str {
        self.source_info.as_str()
    }
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?} {}\n{}", self.kind, self.as_str(), self.source_info)
    }
}

/// A trie over separator strings. A node is marked when a whole separator
/// ends there.
#[derive(Debug, Clone, Default)]
pub struct SepTrie {
    children: HashMap<char, SepTrie>,
    word: bool,
}

impl SepTrie {
    pub fn insert(&mut self, word: &str) {
        if word.is_empty() {
            return;
        }
        let mut node = self;
        for ch in word.chars() {
            node = node.children.entry(ch).or_default();
        }
        node.word = true;
    }

    pub fn has(&self, word: &str) -> bool {
        if word.is_empty() {
            return false;
        }
        let mut node = self;
        for ch in word.chars() {
            match node.children.get(&ch) {
                Some(next) => node = next,
                None => return false,
            }
        }
        node.word
    }

    /// Returns the byte length of the longest inserted word that is a prefix
    /// of `text[start..]`, or 0 when no word matches.
    pub fn match_longest(&self, text: &str, start: usize) -> usize {
        let mut node = self;
        let mut matched = 0;
        for (idx, ch) in text[start..].char_indices() {
            match node.children.get(&ch) {
                Some(next) => node = next,
                None => break,
            }
            if node.word {
                matched = idx + ch.len_utf8();
            }
        }
        matched
    }
}

fn is_space(ch: char) -> bool {
    matches!(ch, ' ' | '\t' | '\r' | '\n')
}

/// A cursor over the input text. Tokens are recomputed on demand against the
/// current separator trie, so freshly installed notation keywords take
/// effect on the very next token.
#[derive(Debug, Clone)]
pub struct Lex {
    file: Arc<File>,
    position: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LexState {
    position: usize,
}

impl LexState {
    pub fn position(&self) -> usize {
        self.position
    }
}

impl Lex {
    pub fn new(file: Arc<File>) -> Self {
        Self { file, position: 0 }
    }

    pub fn input(&self) -> &Arc<File> {
        &self.file
    }

    pub fn save(&self) -> LexState {
        LexState {
            position: self.position,
        }
    }

    pub fn restore(&mut self, state: LexState) {
        self.position = state.position;
    }

    pub fn eof_source_info(&self) -> SourceInfo {
        SourceInfo::eof(Arc::clone(&self.file))
    }

    pub fn peek(&self, trie: &SepTrie) -> Option<Token> {
        self.scan(trie).map(|(token, _)| token)
    }

    pub fn next(&mut self, trie: &SepTrie) -> Option<Token> {
        let (token, end) = self.scan(trie)?;
        self.position = end;
        Some(token)
    }

    pub fn is_eof(&self, trie: &SepTrie) -> bool {
        self.peek(trie).is_none()
    }

    fn token(&self, kind: TokenKind, start: usize, end: usize) -> (Token, usize) {
        let source_info = SourceInfo::new(Arc::clone(&self.file), start..end);
        (Token { kind, source_info }, end)
    }

    fn scan(&self, trie: &SepTrie) -> Option<(Token, usize)> {
        let text = self.file.contents();
        let mut start = self.position;
        while let Some(ch) = text[start..].chars().next() {
            if !is_space(ch) {
                break;
            }
            start += ch.len_utf8();
        }
        let rest = &text[start..];
        let head = rest.chars().next()?;

        // string literal, quotes kept; a backslash skips the next character
        if head == '"' {
            let mut chars = rest.char_indices().skip(1);
            let mut end = start + rest.len();
            while let Some((idx, ch)) = chars.next() {
                if ch == '\\' {
                    chars.next();
                } else if ch == '"' {
                    end = start + idx + 1;
                    break;
                }
            }
            return Some(self.token(TokenKind::StrLit, start, end));
        }

        // numeric literal: a maximal run of decimal digits
        if head.is_ascii_digit() {
            let len = rest
                .find(|ch: char| !ch.is_ascii_digit())
                .unwrap_or(rest.len());
            return Some(self.token(TokenKind::NumLit, start, start + len));
        }

        // longest separator match
        let sep = trie.match_longest(text, start);
        if sep > 0 {
            return Some(self.token(TokenKind::Symbol, start, start + sep));
        }

        // identifier: everything up to whitespace or the start of a separator
        let mut end = start + head.len_utf8();
        while let Some(ch) = text[end..].chars().next() {
            if is_space(ch) || trie.match_longest(text, end) > 0 {
                break;
            }
            end += ch.len_utf8();
        }
        Some(self.token(TokenKind::Ident, start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn trie(words: &[&str]) -> SepTrie {
        let mut trie = SepTrie::default();
        for word in words {
            trie.insert(word);
        }
        trie
    }

    fn tokenize(input: &str, trie: &SepTrie) -> Vec<(TokenKind, String)> {
        let mut lex = Lex::new(Arc::new(File::new("<test>", input)));
        let mut tokens = vec![];
        while let Some(token) = lex.next(trie) {
            tokens.push((token.kind, token.as_str().to_owned()));
        }
        tokens
    }

    #[test]
    fn trie_prefers_longest_match() {
        let trie = trie(&[":", ":=", "(", ")"]);
        assert_eq!(trie.match_longest(":= x", 0), 2);
        assert_eq!(trie.match_longest(": x", 0), 1);
        assert_eq!(trie.match_longest("x :=", 0), 0);
    }

    #[test]
    fn trie_has_exact_words_only() {
        let mut trie = trie(&[":="]);
        assert!(trie.has(":="));
        assert!(!trie.has(":"));
        assert!(!trie.has(""));
        trie.insert(":=");
        assert!(trie.has(":="));
    }

    #[test]
    fn empty_word_matches_nothing() {
        let mut trie = SepTrie::default();
        trie.insert("");
        assert!(!trie.has(""));
        assert_eq!(trie.match_longest("abc", 0), 0);
    }

    #[test]
    fn ident_stops_at_separator_start() {
        let trie = trie(&[":", ":="]);
        let tokens = tokenize("foo:=bar", &trie);
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Ident, "foo".to_owned()),
                (TokenKind::Symbol, ":=".to_owned()),
                (TokenKind::Ident, "bar".to_owned()),
            ]
        );
    }

    #[test]
    fn keyword_separator_wins_over_ident() {
        let trie = trie(&["Prop"]);
        let tokens = tokenize("Prop xProp", &trie);
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Symbol, "Prop".to_owned()),
                (TokenKind::Ident, "x".to_owned()),
                (TokenKind::Symbol, "Prop".to_owned()),
            ]
        );
    }

    #[test]
    fn digits_form_a_numeral_run() {
        let trie = trie(&[":"]);
        let tokens = tokenize("1024:7x", &trie);
        assert_eq!(
            tokens,
            vec![
                (TokenKind::NumLit, "1024".to_owned()),
                (TokenKind::Symbol, ":".to_owned()),
                (TokenKind::NumLit, "7".to_owned()),
                (TokenKind::Ident, "x".to_owned()),
            ]
        );
    }

    #[test]
    fn string_literal_keeps_quotes_and_escapes() {
        let trie = trie(&[":"]);
        let tokens = tokenize(r#""a\"b" x"#, &trie);
        assert_eq!(
            tokens,
            vec![
                (TokenKind::StrLit, r#""a\"b""#.to_owned()),
                (TokenKind::Ident, "x".to_owned()),
            ]
        );
    }

    #[test]
    fn unterminated_string_runs_to_eof() {
        let trie = trie(&[":"]);
        let tokens = tokenize(r#""abc"#, &trie);
        assert_eq!(tokens, vec![(TokenKind::StrLit, r#""abc"#.to_owned())]);
    }

    #[test]
    fn peek_does_not_advance() {
        let trie = trie(&[":"]);
        let lex = Lex::new(Arc::new(File::new("<test>", "a b")));
        assert_eq!(lex.peek(&trie).unwrap().as_str(), "a");
        assert_eq!(lex.peek(&trie).unwrap().as_str(), "a");
    }

    #[test]
    fn save_restore_rewinds() {
        let trie = trie(&[":"]);
        let mut lex = Lex::new(Arc::new(File::new("<test>", "a b")));
        let state = lex.save();
        assert_eq!(lex.next(&trie).unwrap().as_str(), "a");
        lex.restore(state);
        assert_eq!(lex.next(&trie).unwrap().as_str(), "a");
    }

    proptest! {
        #[test]
        fn match_longest_agrees_with_brute_force(
            words in proptest::collection::vec("[:=()!a-c]{1,3}", 0..8),
            text in "[:=()!a-c ]{0,12}",
        ) {
            let mut trie = SepTrie::default();
            for word in &words {
                trie.insert(word);
            }
            let expected = words
                .iter()
                .filter(|word| text.starts_with(word.as_str()))
                .map(|word| word.len())
                .max()
                .unwrap_or(0);
            prop_assert_eq!(trie.match_longest(&text, 0), expected);
        }
    }
}

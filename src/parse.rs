use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use thiserror::Error;

use crate::lex::{Lex, SepTrie, SourceInfo, Token};
use crate::tt::Name;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Syntax {
    Ident(String),
    Atom(String),
    Str(String),
    Num(usize),
    Node(Arc<SyntaxNode>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyntaxNode {
    pub kind: Name,
    pub args: Vec<Syntax>,
}

#[inline]
pub fn mk_node(kind: Name, args: Vec<Syntax>) -> Syntax {
    Syntax::Node(Arc::new(SyntaxNode { kind, args }))
}

impl Syntax {
    pub fn as_node(&self) -> Option<&SyntaxNode> {
        match self {
            Syntax::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Syntax::Ident(value) => Some(value),
            _ => None,
        }
    }
}

impl std::fmt::Display for Syntax {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Syntax::Ident(value) => write!(f, "{}", value),
            Syntax::Atom(value) => write!(f, "'{}'", value),
            Syntax::Str(value) => write!(f, "{:?}", value),
            Syntax::Num(value) => write!(f, "{}", value),
            Syntax::Node(node) => {
                write!(f, "({}", node.kind)?;
                for arg in &node.args {
                    write!(f, " {}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Nonterminals of the initial grammar. User notations extend `term` and
/// `ty` at runtime.
macro_rules! nonterminal {
    ($fn_name:ident, $text:literal) => {
        pub fn $fn_name() -> Name {
            static NAME: LazyLock<Name> = LazyLock::new(|| Name::intern($text).unwrap());
            *NAME
        }
    };
}

nonterminal!(nt_command, "command");
nonterminal!(nt_rule, "rule");
nonterminal!(nt_term, "term");
nonterminal!(nt_ty, "ty");
nonterminal!(nt_tactic, "tactic");
nonterminal!(nt_apply_arg, "apply_arg");
nonterminal!(nt_notation, "notation");
nonterminal!(many_kind, "many");

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParserDescr {
    /// Parse the given nonterminal with the given minimum precedence.
    Recurse(Name, usize),
    Ident,
    Str,
    Num,
    Symbol(String),
    Many(Arc<ParserDescr>),
    Many1(Arc<ParserDescr>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParserRule {
    pub prec: usize,
    pub descrs: Vec<ParserDescr>,
}

impl ParserRule {
    pub fn new(prec: usize, descrs: Vec<ParserDescr>) -> Self {
        Self { prec, descrs }
    }

    fn is_infix(&self, nt: Name) -> bool {
        matches!(self.descrs.first(), Some(ParserDescr::Recurse(target, _)) if *target == nt)
    }

    /// Single-token lookahead for infix selection: a symbol wants literal
    /// equality, an identifier or recursion slot accepts anything
    /// (application style).
    fn infix_matches(&self, token: &Token) -> bool {
        match self.descrs.get(1) {
            Some(ParserDescr::Symbol(lit)) => token.as_str() == lit,
            Some(ParserDescr::Ident) | Some(ParserDescr::Recurse(..)) => true,
            _ => false,
        }
    }
}

/// The parser table: rules per nonterminal, kept sorted by descending
/// precedence; insertion order is preserved among rules of equal
/// precedence, so earlier rules win ties.
#[derive(Debug, Clone, Default)]
pub struct Grammar {
    rules: HashMap<Name, Vec<ParserRule>>,
}

impl Grammar {
    pub fn add_rule(&mut self, nt: Name, rule: ParserRule) {
        let list = self.rules.entry(nt).or_default();
        let pos = list
            .iter()
            .position(|existing| existing.prec < rule.prec)
            .unwrap_or(list.len());
        list.insert(pos, rule);
    }

    pub fn rules(&self, nt: Name) -> &[ParserRule] {
        self.rules.get(&nt).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Error)]
#[error("{message} at {source_info}")]
pub struct ParseError {
    pub message: String,
    pub source_info: SourceInfo,
    pub fatal: bool,
}

/// Decodes a string literal (quotes included). `\n`, `\t`, `\r`, `\"` and
/// `\\` have their usual meaning; any other escaped character passes
/// through. Returns `None` when the closing quote is missing.
pub fn decode_string(text: &str) -> Option<String> {
    let inner = text.strip_prefix('"')?;
    let mut out = String::new();
    let mut chars = inner.chars();
    loop {
        match chars.next() {
            None => return None,
            Some('"') => return chars.next().is_none().then_some(out),
            Some('\\') => match chars.next() {
                None => return None,
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some(other) => out.push(other),
            },
            Some(ch) => out.push(ch),
        }
    }
}

pub struct Parser<'a> {
    lex: &'a mut Lex,
    grammar: &'a Grammar,
    trie: &'a SepTrie,
}

impl<'a> Parser<'a> {
    pub fn new(lex: &'a mut Lex, grammar: &'a Grammar, trie: &'a SepTrie) -> Self {
        Self { lex, grammar, trie }
    }

    fn peek(&self) -> Option<Token> {
        self.lex.peek(self.trie)
    }

    fn advance(&mut self) {
        self.lex.next(self.trie).expect("unchecked advance");
    }

    fn here(&self) -> SourceInfo {
        match self.peek() {
            Some(token) => token.source_info,
            None => self.lex.eof_source_info(),
        }
    }

    fn fail<R>(&self, message: impl Into<String>) -> Result<R, ParseError> {
        Err(ParseError {
            message: message.into(),
            source_info: self.here(),
            fatal: false,
        })
    }

    /// Parses the nonterminal `nt`: the first matching prefix rule, then
    /// any number of infix steps at precedence `min_prec` or above.
    pub fn parse(&mut self, nt: Name, min_prec: usize) -> Result<Syntax, ParseError> {
        let grammar = self.grammar;
        let mut left = self.parse_prefix(nt)?;
        loop {
            let Some(token) = self.peek() else {
                break;
            };
            let Some(rule) = grammar
                .rules(nt)
                .iter()
                .find(|rule| rule.prec >= min_prec && rule.is_infix(nt) && rule.infix_matches(&token))
            else {
                break;
            };
            let state = self.lex.save();
            match self.parse_rule(nt, rule, Some(left.clone())) {
                Ok(node) => left = node,
                Err(err) if err.fatal => return Err(err),
                Err(_) => {
                    self.lex.restore(state);
                    break;
                }
            }
        }
        Ok(left)
    }

    fn parse_prefix(&mut self, nt: Name) -> Result<Syntax, ParseError> {
        let grammar = self.grammar;
        for rule in grammar.rules(nt) {
            if rule.is_infix(nt) {
                continue;
            }
            let state = self.lex.save();
            match self.parse_rule(nt, rule, None) {
                Ok(node) => return Ok(node),
                Err(err) if err.fatal => return Err(err),
                Err(_) => self.lex.restore(state),
            }
        }
        self.fail(format!("expected {}", nt))
    }

    /// Walks a rule body. Once the rule has consumed input, any failure
    /// turns fatal: a rule that has begun is never backtracked.
    fn parse_rule(
        &mut self,
        nt: Name,
        rule: &ParserRule,
        left: Option<Syntax>,
    ) -> Result<Syntax, ParseError> {
        let start = self.lex.save();
        let skip = usize::from(left.is_some());
        let mut args: Vec<Syntax> = left.into_iter().collect();
        for descr in &rule.descrs[skip..] {
            match self.parse_arg(descr) {
                Ok(arg) => args.push(arg),
                Err(mut err) => {
                    if self.lex.save().position() > start.position() {
                        err.fatal = true;
                    }
                    return Err(err);
                }
            }
        }
        Ok(mk_node(nt, args))
    }

    fn parse_arg(&mut self, descr: &ParserDescr) -> Result<Syntax, ParseError> {
        match descr {
            ParserDescr::Symbol(lit) => match self.peek() {
                Some(token) if token.as_str() == lit => {
                    self.advance();
                    Ok(Syntax::Atom(lit.clone()))
                }
                _ => self.fail(format!("expected `{}`", lit)),
            },
            ParserDescr::Ident => match self.peek() {
                Some(token) if token.is_ident() => {
                    let value = token.as_str().to_owned();
                    self.advance();
                    Ok(Syntax::Ident(value))
                }
                _ => self.fail("expected identifier"),
            },
            ParserDescr::Str => match self.peek() {
                Some(token) if token.is_str_lit() => {
                    let text = token.as_str().to_owned();
                    let source_info = token.source_info.clone();
                    self.advance();
                    match decode_string(&text) {
                        Some(decoded) => Ok(Syntax::Str(decoded)),
                        None => Err(ParseError {
                            message: "unterminated string literal".to_owned(),
                            source_info,
                            fatal: true,
                        }),
                    }
                }
                _ => self.fail("expected string literal"),
            },
            ParserDescr::Num => match self.peek() {
                Some(token) if token.is_num_lit() => {
                    let text = token.as_str().to_owned();
                    let source_info = token.source_info.clone();
                    self.advance();
                    match text.parse::<usize>() {
                        Ok(value) => Ok(Syntax::Num(value)),
                        Err(_) => Err(ParseError {
                            message: "numeral out of range".to_owned(),
                            source_info,
                            fatal: true,
                        }),
                    }
                }
                _ => self.fail("expected numeral"),
            },
            ParserDescr::Recurse(nt, min_prec) => self.parse(*nt, *min_prec),
            ParserDescr::Many(inner) => {
                let mut items = vec![];
                self.parse_many(inner, &mut items)?;
                Ok(mk_node(many_kind(), items))
            }
            ParserDescr::Many1(inner) => {
                let first = self.parse_arg(inner)?;
                let mut items = vec![first];
                self.parse_many(inner, &mut items)?;
                Ok(mk_node(many_kind(), items))
            }
        }
    }

    fn parse_many(
        &mut self,
        inner: &ParserDescr,
        items: &mut Vec<Syntax>,
    ) -> Result<(), ParseError> {
        loop {
            let state = self.lex.save();
            match self.parse_arg(inner) {
                Ok(item) => items.push(item),
                Err(err) if err.fatal => return Err(err),
                Err(_) => {
                    self.lex.restore(state);
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lex::File;

    fn sym(lit: &str) -> ParserDescr {
        ParserDescr::Symbol(lit.to_owned())
    }

    fn recurse(nt: Name, min_prec: usize) -> ParserDescr {
        ParserDescr::Recurse(nt, min_prec)
    }

    // A slice of the default grammar: parenthesized and identifier terms,
    // juxtaposition application, and a right-associative arrow on rules.
    fn fixture() -> (Grammar, SepTrie) {
        let mut grammar = Grammar::default();
        grammar.add_rule(
            nt_term(),
            ParserRule::new(1024, vec![sym("("), recurse(nt_term(), 0), sym(")")]),
        );
        grammar.add_rule(nt_term(), ParserRule::new(1024, vec![ParserDescr::Ident]));
        grammar.add_rule(
            nt_term(),
            ParserRule::new(0, vec![recurse(nt_term(), 0), recurse(nt_term(), 1)]),
        );
        grammar.add_rule(
            nt_rule(),
            ParserRule::new(1024, vec![sym("("), recurse(nt_rule(), 0), sym(")")]),
        );
        grammar.add_rule(
            nt_rule(),
            ParserRule::new(1024, vec![recurse(nt_term(), 0)]),
        );
        grammar.add_rule(
            nt_rule(),
            ParserRule::new(
                30,
                vec![recurse(nt_rule(), 31), sym("=>"), recurse(nt_rule(), 30)],
            ),
        );
        let mut trie = SepTrie::default();
        for word in ["(", ")", "=>"] {
            trie.insert(word);
        }
        (grammar, trie)
    }

    fn parse_nt(input: &str, nt: Name) -> Result<Syntax, ParseError> {
        let (grammar, trie) = fixture();
        let mut lex = Lex::new(Arc::new(File::new("<test>", input)));
        Parser::new(&mut lex, &grammar, &trie).parse(nt, 0)
    }

    #[test]
    fn application_is_left_associative() {
        let stx = parse_nt("f a b", nt_term()).unwrap();
        insta::assert_snapshot!(stx.to_string(), @"(term (term (term f) (term a)) (term b))");
    }

    #[test]
    fn arrow_is_right_associative() {
        let stx = parse_nt("p => q => r", nt_rule()).unwrap();
        insta::assert_snapshot!(
            stx.to_string(),
            @"(rule (rule (term p)) '=>' (rule (rule (term q)) '=>' (rule (term r))))"
        );
    }

    #[test]
    fn parentheses_group() {
        let stx = parse_nt("(p => q) => r", nt_rule()).unwrap();
        insta::assert_snapshot!(
            stx.to_string(),
            @"(rule (rule '(' (rule (rule (term p)) '=>' (rule (term q))) ')') '=>' (rule (term r)))"
        );
    }

    #[test]
    fn min_prec_excludes_low_precedence_infix_rules() {
        let (grammar, trie) = fixture();
        let mut lex = Lex::new(Arc::new(File::new("<test>", "f a")));
        let stx = Parser::new(&mut lex, &grammar, &trie)
            .parse(nt_term(), 1)
            .unwrap();
        // application has precedence 0, so only `f` is consumed
        insta::assert_snapshot!(stx.to_string(), @"(term f)");
        assert_eq!(lex.peek(&trie).unwrap().as_str(), "a");
    }

    #[test]
    fn consumed_input_makes_failures_fatal() {
        let mut grammar = Grammar::default();
        grammar.add_rule(
            nt_command(),
            ParserRule::new(
                1024,
                vec![sym("axiom"), ParserDescr::Ident, sym(":"), ParserDescr::Ident],
            ),
        );
        let mut trie = SepTrie::default();
        trie.insert("axiom");
        trie.insert(":");
        let mut lex = Lex::new(Arc::new(File::new("<test>", "axiom : x")));
        let err = Parser::new(&mut lex, &grammar, &trie)
            .parse(nt_command(), 0)
            .unwrap_err();
        assert!(err.fatal);
        assert!(err.message.contains("expected identifier"));
    }

    #[test]
    fn unmatched_prefix_fails_without_consuming() {
        let (grammar, trie) = fixture();
        let mut lex = Lex::new(Arc::new(File::new("<test>", "=> x")));
        let state = lex.save();
        let err = Parser::new(&mut lex, &grammar, &trie)
            .parse(nt_term(), 0)
            .unwrap_err();
        assert!(!err.fatal);
        assert_eq!(lex.save(), state);
    }

    #[test]
    fn many1_requires_at_least_one_item() {
        let mut grammar = Grammar::default();
        grammar.add_rule(
            nt_tactic(),
            ParserRule::new(
                1024,
                vec![sym("intro"), ParserDescr::Many1(Arc::new(ParserDescr::Ident))],
            ),
        );
        let mut trie = SepTrie::default();
        trie.insert("intro");
        trie.insert("apply");

        let mut lex = Lex::new(Arc::new(File::new("<test>", "intro x y apply")));
        let stx = Parser::new(&mut lex, &grammar, &trie)
            .parse(nt_tactic(), 0)
            .unwrap();
        insta::assert_snapshot!(stx.to_string(), @"(tactic 'intro' (many x y))");

        let mut lex = Lex::new(Arc::new(File::new("<test>", "intro apply")));
        let err = Parser::new(&mut lex, &grammar, &trie)
            .parse(nt_tactic(), 0)
            .unwrap_err();
        assert!(err.fatal);
    }

    #[test]
    fn parsing_is_deterministic() {
        let input = "f (a b) c => d";
        let first = parse_nt(input, nt_rule()).unwrap();
        let second = parse_nt(input, nt_rule()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn string_decoding() {
        assert_eq!(decode_string(r#""a\nb""#).unwrap(), "a\nb");
        assert_eq!(decode_string(r#""a\"b""#).unwrap(), "a\"b");
        assert_eq!(decode_string(r#""a\\b""#).unwrap(), "a\\b");
        assert_eq!(decode_string(r#""a\xb""#).unwrap(), "axb");
        assert_eq!(decode_string(r#""""#).unwrap(), "");
        assert!(decode_string(r#""abc"#).is_none());
        assert!(decode_string(r#""abc\"#).is_none());
    }
}

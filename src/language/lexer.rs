use crate::language::{
    span::Span,
    token::{Token, TokenKind},
};

#[derive(Debug)]
pub struct LexError {
    pub message: String,
    pub span: Span,
}

pub fn lex(source: &str) -> Result<Vec<Token>, Vec<LexError>> {
    let lexer = Lexer::new(source);
    lexer.run()
}

struct Lexer<'a> {
    src: &'a str,
    chars: std::str::Chars<'a>,
    current: Option<char>,
    offset: usize,
    tokens: Vec<Token>,
    errors: Vec<LexError>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        let mut chars = src.chars();
        let current = chars.next();
        Self {
            src,
            chars,
            current,
            offset: 0,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn run(mut self) -> Result<Vec<Token>, Vec<LexError>> {
        while let Some(ch) = self.current {
            match ch {
                '#' => self.eat_line_comment(),
                ch if ch.is_whitespace() => {
                    self.bump();
                }
                ch if ch.is_ascii_alphabetic() || ch == '_' => self.lex_identifier(),
                ch if ch.is_ascii_digit() => self.lex_number(false),
                '"' => self.lex_string(),
                '`' => self.lex_quoted_method(),
                '@' => self.lex_variable(),
                '$' => self.lex_global(),
                ':' => self.lex_colon(),
                '%' => self.lex_percent(),
                _ => self.lex_symbolic(),
            }
        }
        self.push_token(TokenKind::Eof, self.offset, self.offset);

        if self.errors.is_empty() {
            Ok(self.tokens)
        } else {
            Err(self.errors)
        }
    }

    fn bump(&mut self) -> Option<char> {
        if let Some(ch) = self.current {
            self.offset += ch.len_utf8();
        }
        self.current = self.chars.next();
        self.current
    }

    fn peek(&self) -> Option<char> {
        self.chars.clone().next()
    }

    fn peek2(&self) -> Option<char> {
        self.chars.clone().nth(1)
    }

    fn push_token(&mut self, kind: TokenKind, start: usize, end: usize) {
        self.tokens.push(Token {
            kind,
            span: Span::new(start, end),
        });
    }

    fn error(&mut self, start: usize, end: usize, message: impl Into<String>) {
        self.errors.push(LexError {
            message: message.into(),
            span: Span::new(start, end),
        });
    }

    fn eat_line_comment(&mut self) {
        while let Some(ch) = self.current {
            if ch == '\n' {
                break;
            }
            self.bump();
        }
    }

    fn eat_ident_chars(&mut self) {
        while let Some(ch) = self.current {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn lex_identifier(&mut self) {
        let start = self.offset;
        self.eat_ident_chars();
        let end = self.offset;
        let slice = &self.src[start..end];

        if let Some(kind) = reserved_word(slice) {
            self.push_token(kind, start, end);
            return;
        }

        // An identifier fused with a single trailing colon is a keyword token,
        // used for method definitions, keyword params, record fields and
        // constant declarations alike.
        if !is_interface_name(slice) && self.current == Some(':') && self.peek() != Some(':') {
            let name = slice.to_string();
            self.bump();
            self.push_token(TokenKind::Keyword(name), start, self.offset);
            return;
        }

        let kind = if is_interface_name(slice) {
            TokenKind::InterfaceIdent(slice.to_string())
        } else if slice.starts_with(|c: char| c.is_ascii_uppercase()) {
            TokenKind::ConstIdent(slice.to_string())
        } else {
            TokenKind::Ident(slice.to_string())
        };
        self.push_token(kind, start, end);
    }

    fn lex_number(&mut self, negative: bool) {
        let start = if negative {
            self.offset - 1
        } else {
            self.offset
        };
        while let Some(ch) = self.current {
            if ch.is_ascii_digit() || ch == '_' {
                self.bump();
            } else {
                break;
            }
        }
        let end = self.offset;
        let text: String = self.src[start..end].chars().filter(|c| *c != '_').collect();
        match text.parse::<i64>() {
            Ok(value) => self.push_token(TokenKind::Integer(value), start, end),
            Err(_) => self.error(start, end, "Invalid integer literal"),
        }
    }

    fn lex_string(&mut self) {
        let start = self.offset;
        self.bump();
        match self.read_string_body('"') {
            Some(value) => {
                let end = self.offset;
                self.push_token(TokenKind::Str(value), start, end);
            }
            None => self.error(start, self.offset, "Unterminated string literal"),
        }
    }

    fn read_string_body(&mut self, terminator: char) -> Option<String> {
        let mut value = String::new();
        while let Some(ch) = self.current {
            if ch == terminator {
                self.bump();
                return Some(value);
            }
            if ch == '\\' {
                self.bump();
                let escaped = self.current?;
                value.push(match escaped {
                    'n' => '\n',
                    'r' => '\r',
                    't' => '\t',
                    other => other,
                });
                self.bump();
            } else {
                value.push(ch);
                self.bump();
            }
        }
        None
    }

    fn lex_quoted_method(&mut self) {
        let start = self.offset;
        self.bump();
        match self.read_string_body('`') {
            Some(value) => {
                let end = self.offset;
                self.push_token(TokenKind::QuotedMethod(value), start, end);
            }
            None => self.error(start, self.offset, "Unterminated quoted method name"),
        }
    }

    fn lex_variable(&mut self) {
        let start = self.offset;
        self.bump();
        let class_var = if self.current == Some('@') {
            self.bump();
            true
        } else {
            false
        };
        let name_start = self.offset;
        self.eat_ident_chars();
        if self.offset == name_start {
            self.error(start, self.offset, "Expected variable name after '@'");
            return;
        }
        let end = self.offset;
        let text = self.src[start..end].to_string();
        let kind = if class_var {
            TokenKind::ClassVarIdent(text)
        } else {
            TokenKind::IvarIdent(text)
        };
        self.push_token(kind, start, end);
    }

    fn lex_global(&mut self) {
        let start = self.offset;
        self.bump();
        let name_start = self.offset;
        self.eat_ident_chars();
        if self.offset == name_start {
            self.error(start, self.offset, "Expected global name after '$'");
            return;
        }
        let end = self.offset;
        self.push_token(TokenKind::GlobalIdent(self.src[start..end].to_string()), start, end);
    }

    fn lex_colon(&mut self) {
        let start = self.offset;
        self.bump();
        match self.current {
            Some(':') => {
                self.bump();
                self.push_token(TokenKind::ColonColon, start, self.offset);
            }
            Some(ch) if ch.is_ascii_alphabetic() || ch == '_' => {
                let name_start = self.offset;
                self.eat_ident_chars();
                if matches!(self.current, Some('?') | Some('!')) {
                    self.bump();
                }
                let name = self.src[name_start..self.offset].to_string();
                self.push_token(TokenKind::Symbol(name), start, self.offset);
            }
            Some('"') => {
                self.bump();
                match self.read_string_body('"') {
                    Some(value) => self.push_token(TokenKind::Symbol(value), start, self.offset),
                    None => self.error(start, self.offset, "Unterminated symbol literal"),
                }
            }
            _ => self.push_token(TokenKind::Colon, start, self.offset),
        }
    }

    fn lex_percent(&mut self) {
        let start = self.offset;
        if self.peek() == Some('a') {
            if let Some(open) = self.peek2() {
                if !open.is_ascii_alphanumeric() && !open.is_whitespace() {
                    self.bump(); // %
                    self.bump(); // a
                    self.bump(); // open delimiter
                    let close = matching_delimiter(open);
                    let content_start = self.offset;
                    while let Some(ch) = self.current {
                        if ch == close {
                            let content = self.src[content_start..self.offset].to_string();
                            self.bump();
                            self.push_token(TokenKind::Annotation(content), start, self.offset);
                            return;
                        }
                        self.bump();
                    }
                    self.error(start, self.offset, "Unterminated annotation");
                    return;
                }
            }
        }
        self.bump();
        self.push_token(TokenKind::Operator("%".to_string()), start, self.offset);
    }

    fn lex_symbolic(&mut self) {
        let start = self.offset;
        let Some(ch) = self.current else { return };
        match ch {
            '(' => self.single(TokenKind::LParen),
            ')' => self.single(TokenKind::RParen),
            '[' => self.single(TokenKind::LBracket),
            ']' => self.single(TokenKind::RBracket),
            '{' => self.single(TokenKind::LBrace),
            '}' => self.single(TokenKind::RBrace),
            ',' => self.single(TokenKind::Comma),
            '.' => self.single(TokenKind::Dot),
            '?' => self.single(TokenKind::Question),
            '&' => self.single(TokenKind::Amp),
            '|' => self.single(TokenKind::Bar),
            '*' => {
                self.bump();
                if self.current == Some('*') {
                    self.bump();
                    self.push_token(TokenKind::StarStar, start, self.offset);
                } else {
                    self.push_token(TokenKind::Star, start, self.offset);
                }
            }
            '<' => {
                self.bump();
                if self.current == Some('=') && self.peek() == Some('>') {
                    self.bump();
                    self.bump();
                    self.push_operator("<=>", start);
                } else if self.current == Some('=') {
                    self.bump();
                    self.push_operator("<=", start);
                } else if self.current == Some('<') {
                    self.bump();
                    self.push_operator("<<", start);
                } else {
                    self.push_token(TokenKind::Lt, start, self.offset);
                }
            }
            '>' => {
                self.bump();
                if self.current == Some('=') {
                    self.bump();
                    self.push_operator(">=", start);
                } else if self.current == Some('>') {
                    self.bump();
                    self.push_operator(">>", start);
                } else {
                    self.push_token(TokenKind::Gt, start, self.offset);
                }
            }
            '=' => {
                self.bump();
                if self.current == Some('=') {
                    self.bump();
                    self.push_operator("==", start);
                } else {
                    self.push_token(TokenKind::Eq, start, self.offset);
                }
            }
            '+' => {
                self.bump();
                if self.current == Some('@') {
                    self.bump();
                    self.push_operator("+@", start);
                } else {
                    self.push_operator("+", start);
                }
            }
            '-' => {
                self.bump();
                if self.current == Some('>') {
                    self.bump();
                    self.push_token(TokenKind::Arrow, start, self.offset);
                } else if matches!(self.current, Some(c) if c.is_ascii_digit()) {
                    self.lex_number(true);
                } else if self.current == Some('@') {
                    self.bump();
                    self.push_operator("-@", start);
                } else {
                    self.push_operator("-", start);
                }
            }
            '/' | '^' | '~' | '!' => {
                self.bump();
                let op = ch.to_string();
                self.push_token(TokenKind::Operator(op), start, self.offset);
            }
            other => {
                self.bump();
                self.error(start, self.offset, format!("Unexpected character '{}'", other));
            }
        }
    }

    fn push_operator(&mut self, op: &str, start: usize) {
        self.push_token(TokenKind::Operator(op.to_string()), start, self.offset);
    }

    fn single(&mut self, kind: TokenKind) {
        let start = self.offset;
        self.bump();
        self.push_token(kind, start, self.offset);
    }
}

fn is_interface_name(slice: &str) -> bool {
    let mut chars = slice.chars();
    chars.next() == Some('_') && matches!(chars.next(), Some(c) if c.is_ascii_uppercase())
}

fn matching_delimiter(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        '{' => '}',
        '<' => '>',
        other => other,
    }
}

fn reserved_word(slice: &str) -> Option<TokenKind> {
    let kind = match slice {
        "class" => TokenKind::KClass,
        "module" => TokenKind::KModule,
        "interface" => TokenKind::KInterface,
        "type" => TokenKind::KType,
        "include" => TokenKind::KInclude,
        "extend" => TokenKind::KExtend,
        "prepend" => TokenKind::KPrepend,
        "extension" => TokenKind::KExtension,
        "def" => TokenKind::KDef,
        "self" => TokenKind::KSelf,
        "super" => TokenKind::KSuper,
        "public" => TokenKind::KPublic,
        "private" => TokenKind::KPrivate,
        "attr_reader" => TokenKind::KAttrReader,
        "attr_writer" => TokenKind::KAttrWriter,
        "attr_accessor" => TokenKind::KAttrAccessor,
        "alias" => TokenKind::KAlias,
        "any" => TokenKind::KAny,
        "void" => TokenKind::KVoid,
        "bool" => TokenKind::KBool,
        "top" => TokenKind::KTop,
        "bot" => TokenKind::KBot,
        "nil" => TokenKind::KNil,
        "instance" => TokenKind::KInstance,
        "end" => TokenKind::KEnd,
        "true" => TokenKind::KTrue,
        "false" => TokenKind::KFalse,
        _ => return None,
    };
    Some(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        lex(source)
            .expect("lex")
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn classifies_identifiers() {
        assert_eq!(
            kinds("Foo foo _Each $stdout @name @@count"),
            vec![
                TokenKind::ConstIdent("Foo".into()),
                TokenKind::Ident("foo".into()),
                TokenKind::InterfaceIdent("_Each".into()),
                TokenKind::GlobalIdent("$stdout".into()),
                TokenKind::IvarIdent("@name".into()),
                TokenKind::ClassVarIdent("@@count".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn fuses_trailing_colon_into_keyword_token() {
        assert_eq!(
            kinds("foo: BAR: baz :: qux"),
            vec![
                TokenKind::Keyword("foo".into()),
                TokenKind::Keyword("BAR".into()),
                TokenKind::Ident("baz".into()),
                TokenKind::ColonColon,
                TokenKind::Ident("qux".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn double_colon_does_not_fuse() {
        assert_eq!(
            kinds("Foo::Bar"),
            vec![
                TokenKind::ConstIdent("Foo".into()),
                TokenKind::ColonColon,
                TokenKind::ConstIdent("Bar".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn lexes_operator_method_names() {
        assert_eq!(
            kinds("== <=> <= << >= >> +@ -@ ~ !"),
            vec![
                TokenKind::Operator("==".into()),
                TokenKind::Operator("<=>".into()),
                TokenKind::Operator("<=".into()),
                TokenKind::Operator("<<".into()),
                TokenKind::Operator(">=".into()),
                TokenKind::Operator(">>".into()),
                TokenKind::Operator("+@".into()),
                TokenKind::Operator("-@".into()),
                TokenKind::Operator("~".into()),
                TokenKind::Operator("!".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn arrow_and_negative_integers() {
        assert_eq!(
            kinds("-> -12 - 3"),
            vec![
                TokenKind::Arrow,
                TokenKind::Integer(-12),
                TokenKind::Operator("-".into()),
                TokenKind::Integer(3),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn symbols_and_strings() {
        assert_eq!(
            kinds(":ok :empty? \"hi\\n\""),
            vec![
                TokenKind::Symbol("ok".into()),
                TokenKind::Symbol("empty?".into()),
                TokenKind::Str("hi\n".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn annotations_with_various_delimiters() {
        assert_eq!(
            kinds("%a{pure} %a(reads memo) %a|no-defined-return|"),
            vec![
                TokenKind::Annotation("pure".into()),
                TokenKind::Annotation("reads memo".into()),
                TokenKind::Annotation("no-defined-return".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn quoted_method_names() {
        assert_eq!(
            kinds("`class` `self?`"),
            vec![
                TokenKind::QuotedMethod("class".into()),
                TokenKind::QuotedMethod("self?".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("foo # trailing comment\nbar"),
            vec![
                TokenKind::Ident("foo".into()),
                TokenKind::Ident("bar".into()),
                TokenKind::Eof,
            ]
        );
    }
}

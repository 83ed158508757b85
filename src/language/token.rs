use crate::language::span::Span;

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum TokenKind {
    ConstIdent(String),     // Foo
    Ident(String),          // foo
    InterfaceIdent(String), // _Foo
    GlobalIdent(String),    // $foo
    IvarIdent(String),      // @foo, value keeps the sigil
    ClassVarIdent(String),  // @@foo
    Keyword(String),        // foo:  (identifier fused with a single trailing colon)
    QuotedMethod(String),   // `foo`
    Symbol(String),         // :foo
    Integer(i64),
    Str(String),
    Annotation(String), // %a{...}, value is the delimited content
    Operator(String),   // ==, <=>, <=, >=, <<, >>, ==, +, -, /, %, ^, ~, !, +@, -@

    KClass,
    KModule,
    KInterface,
    KType,
    KInclude,
    KExtend,
    KPrepend,
    KExtension,
    KDef,
    KSelf,
    KSuper,
    KPublic,
    KPrivate,
    KAttrReader,
    KAttrWriter,
    KAttrAccessor,
    KAlias,
    KAny,
    KVoid,
    KBool,
    KTop,
    KBot,
    KNil,
    KInstance,
    KEnd,
    KTrue,
    KFalse,

    ColonColon,
    Colon,
    Question,
    Star,
    StarStar,
    Arrow,
    Bar,
    Amp,
    Lt,
    Gt,
    Eq,
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,

    Eof,
}

impl TokenKind {
    pub fn describe(&self) -> String {
        match self {
            TokenKind::ConstIdent(name)
            | TokenKind::Ident(name)
            | TokenKind::InterfaceIdent(name)
            | TokenKind::GlobalIdent(name)
            | TokenKind::IvarIdent(name)
            | TokenKind::ClassVarIdent(name) => format!("`{}`", name),
            TokenKind::Keyword(name) => format!("`{}:`", name),
            TokenKind::QuotedMethod(name) => format!("quoted method name `{}`", name),
            TokenKind::Symbol(name) => format!("`:{}`", name),
            TokenKind::Integer(value) => format!("`{}`", value),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Annotation(_) => "annotation".to_string(),
            TokenKind::Operator(op) => format!("`{}`", op),
            TokenKind::Eof => "end of input".to_string(),
            other => format!("{:?}", other),
        }
    }
}

use crate::language::{
    ast::*,
    errors::{ParseError, ParseErrors},
    lexer::lex,
    names::{Namespace, TypeName},
    span::Span,
    token::{Token, TokenKind},
    types::{Block, FunctionType, LiteralValue, MethodType, Param, Type},
};

pub fn parse_signature(source: &str) -> Result<Vec<Declaration>, ParseErrors> {
    let tokens = match lex(source) {
        Ok(tokens) => tokens,
        Err(errors) => {
            let errs = errors
                .into_iter()
                .map(|err| ParseError::syntax(err.message, err.span))
                .collect();
            return Err(ParseErrors::new(errs));
        }
    };
    Parser::new(tokens).parse()
}

pub fn parse_type(source: &str) -> Result<Type, ParseErrors> {
    let tokens = match lex(source) {
        Ok(tokens) => tokens,
        Err(errors) => {
            let errs = errors
                .into_iter()
                .map(|err| ParseError::syntax(err.message, err.span))
                .collect();
            return Err(ParseErrors::new(errs));
        }
    };
    let mut parser = Parser::new(tokens);
    let ty = parser
        .parse_type()
        .map_err(|err| ParseErrors::new(vec![err]))?;
    if !parser.is_eof() {
        return Err(ParseErrors::new(vec![
            parser.error_here("Expected end of input"),
        ]));
    }
    Ok(ty)
}

#[derive(Clone, Copy, PartialEq)]
enum MemberContext {
    Class,
    Interface,
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<ParseError>,
    decl_type_params: Vec<String>,
    method_type_params: Vec<Vec<String>>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
            decl_type_params: Vec::new(),
            method_type_params: Vec::new(),
        }
    }

    fn parse(mut self) -> Result<Vec<Declaration>, ParseErrors> {
        let mut decls = Vec::new();
        while !self.is_eof() {
            let before = self.pos;
            match self.parse_declaration() {
                Ok(decl) => decls.push(decl),
                Err(err) => {
                    self.report(err);
                    if self.pos == before {
                        self.advance();
                    }
                    self.synchronize_declaration();
                }
            }
        }
        if self.errors.is_empty() {
            Ok(decls)
        } else {
            Err(ParseErrors::new(self.errors))
        }
    }

    fn parse_declaration(&mut self) -> Result<Declaration, ParseError> {
        let annotations = self.parse_annotations();
        self.parse_declaration_with(annotations)
    }

    fn parse_declaration_with(
        &mut self,
        annotations: Vec<Annotation>,
    ) -> Result<Declaration, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::KClass) => {
                self.advance();
                self.parse_class(annotations).map(Declaration::Class)
            }
            Some(TokenKind::KModule) => {
                self.advance();
                self.parse_module(annotations).map(Declaration::Module)
            }
            Some(TokenKind::KInterface) => {
                self.advance();
                self.parse_interface(annotations).map(Declaration::Interface)
            }
            Some(TokenKind::KExtension) => {
                self.advance();
                self.parse_extension(annotations).map(Declaration::Extension)
            }
            Some(TokenKind::KType) => {
                self.advance();
                self.parse_type_alias(annotations).map(Declaration::Alias)
            }
            Some(TokenKind::GlobalIdent(_)) => {
                self.parse_global(annotations).map(Declaration::Global)
            }
            Some(TokenKind::ColonColon) | Some(TokenKind::ConstIdent(_)) => {
                self.parse_constant(annotations).map(Declaration::Constant)
            }
            Some(TokenKind::Keyword(name)) if starts_uppercase(&name) => {
                self.parse_constant(annotations).map(Declaration::Constant)
            }
            _ => Err(self.error_here("Expected declaration")),
        }
    }

    fn parse_class(&mut self, annotations: Vec<Annotation>) -> Result<ClassDecl, ParseError> {
        let start = self.previous_start();
        let (name, fused) = self.parse_declared_name(NameShape::Class)?;
        if fused {
            return Err(self.error_here("Unexpected ':' after class name"));
        }
        let type_params = self.parse_type_param_list()?;
        let saved = std::mem::replace(&mut self.decl_type_params, type_params.clone());

        let superclass = if self.matches(TokenKind::Lt) {
            let sup_name = self.parse_type_name_ref()?;
            if !sup_name.is_class() {
                self.decl_type_params = saved;
                return Err(self.error_here("Superclass must be a class name"));
            }
            let args = self.parse_type_args()?;
            Some(Superclass {
                name: sup_name,
                args,
            })
        } else {
            None
        };

        let members = self.parse_members(MemberContext::Class);
        let end = self.expect_end(&saved)?;
        self.decl_type_params = saved;

        Ok(ClassDecl {
            name,
            type_params,
            superclass,
            members,
            annotations,
            span: Span::new(start, end),
        })
    }

    fn parse_module(&mut self, annotations: Vec<Annotation>) -> Result<ModuleDecl, ParseError> {
        let start = self.previous_start();
        let (name, fused) = self.parse_declared_name(NameShape::Class)?;
        let type_params = if fused {
            Vec::new()
        } else {
            self.parse_type_param_list()?
        };
        let saved = std::mem::replace(&mut self.decl_type_params, type_params.clone());

        let mut self_types = Vec::new();
        if fused || self.matches(TokenKind::Colon) {
            loop {
                match self.parse_type() {
                    Ok(ty) => self_types.push(ty),
                    Err(err) => {
                        self.decl_type_params = saved;
                        return Err(err);
                    }
                }
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }

        let members = self.parse_members(MemberContext::Class);
        let end = self.expect_end(&saved)?;
        self.decl_type_params = saved;

        Ok(ModuleDecl {
            name,
            type_params,
            self_types,
            members,
            annotations,
            span: Span::new(start, end),
        })
    }

    fn parse_interface(
        &mut self,
        annotations: Vec<Annotation>,
    ) -> Result<InterfaceDecl, ParseError> {
        let start = self.previous_start();
        let (name, fused) = self.parse_declared_name(NameShape::Interface)?;
        if fused {
            return Err(self.error_here("Unexpected ':' after interface name"));
        }
        let type_params = self.parse_type_param_list()?;
        let saved = std::mem::replace(&mut self.decl_type_params, type_params.clone());

        let members = self.parse_members(MemberContext::Interface);
        let end = self.expect_end(&saved)?;
        self.decl_type_params = saved;

        Ok(InterfaceDecl {
            name,
            type_params,
            members,
            annotations,
            span: Span::new(start, end),
        })
    }

    fn parse_extension(
        &mut self,
        annotations: Vec<Annotation>,
    ) -> Result<ExtensionDecl, ParseError> {
        let start = self.previous_start();
        let (name, fused) = self.parse_declared_name(NameShape::Class)?;
        if fused {
            return Err(self.error_here("Unexpected ':' after extension target"));
        }
        let type_params = self.parse_type_param_list()?;
        let saved = std::mem::replace(&mut self.decl_type_params, type_params.clone());

        self.expect(TokenKind::LParen)?;
        let extension_name = match self.peek_kind() {
            Some(TokenKind::ConstIdent(tag)) => {
                self.advance();
                tag
            }
            _ => {
                self.decl_type_params = saved;
                return Err(self.error_here("Expected extension name"));
            }
        };
        self.expect(TokenKind::RParen)?;

        let members = self.parse_members(MemberContext::Class);
        let end = self.expect_end(&saved)?;
        self.decl_type_params = saved;

        Ok(ExtensionDecl {
            name,
            type_params,
            extension_name,
            members,
            annotations,
            span: Span::new(start, end),
        })
    }

    fn parse_type_alias(&mut self, annotations: Vec<Annotation>) -> Result<AliasDecl, ParseError> {
        let start = self.previous_start();
        let (name, _) = self.parse_declared_name(NameShape::Alias)?;
        self.expect(TokenKind::Eq)?;
        let ty = self.parse_type()?;
        let end = self.last_end(start);
        Ok(AliasDecl {
            name,
            ty,
            annotations,
            span: Span::new(start, end),
        })
    }

    fn parse_constant(
        &mut self,
        annotations: Vec<Annotation>,
    ) -> Result<ConstantDecl, ParseError> {
        let start = self.current_span_start();
        let absolute = self.matches(TokenKind::ColonColon);
        let mut path = Vec::new();
        let name = loop {
            match self.peek_kind() {
                Some(TokenKind::ConstIdent(segment))
                    if self.peek_kind_n(1) == Some(TokenKind::ColonColon) =>
                {
                    self.advance();
                    self.advance();
                    path.push(segment);
                }
                Some(TokenKind::Keyword(name)) if starts_uppercase(&name) => {
                    self.advance();
                    break name;
                }
                Some(TokenKind::ConstIdent(name)) => {
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    break name;
                }
                _ => return Err(self.error_here("Expected constant name")),
            }
        };
        let ty = self.parse_type()?;
        let end = self.last_end(start);
        Ok(ConstantDecl {
            name: TypeName::new(Namespace::new(path, absolute), name),
            ty,
            annotations,
            span: Span::new(start, end),
        })
    }

    fn parse_global(&mut self, annotations: Vec<Annotation>) -> Result<GlobalDecl, ParseError> {
        let start = self.current_span_start();
        let name = match self.peek_kind() {
            Some(TokenKind::GlobalIdent(name)) => {
                self.advance();
                name
            }
            _ => return Err(self.error_here("Expected global name")),
        };
        self.expect(TokenKind::Colon)?;
        let ty = self.parse_type()?;
        let end = self.last_end(start);
        Ok(GlobalDecl {
            name,
            ty,
            annotations,
            span: Span::new(start, end),
        })
    }

    fn parse_members(&mut self, ctx: MemberContext) -> Vec<Member> {
        let mut members = Vec::new();
        while !self.check(TokenKind::KEnd) && !self.is_eof() {
            let before = self.pos;
            match self.parse_member(ctx) {
                Ok(member) => members.push(member),
                Err(err) => {
                    self.report(err);
                    // Recovery must make progress even when the offending
                    // token itself starts a member.
                    if self.pos == before {
                        self.advance();
                    }
                    self.synchronize_member();
                }
            }
        }
        members
    }

    fn parse_member(&mut self, ctx: MemberContext) -> Result<Member, ParseError> {
        let annotations = self.parse_annotations();
        match self.peek_kind() {
            Some(TokenKind::KDef) => {
                self.advance();
                self.parse_method(ctx, annotations).map(Member::Method)
            }
            Some(TokenKind::KInclude) => {
                self.advance();
                let mixin = self.parse_mixin(annotations)?;
                if ctx == MemberContext::Interface && !mixin.name.is_interface() {
                    return Err(ParseError::semantics(
                        format!("Interface cannot include `{}`", mixin.name),
                        mixin.span,
                    ));
                }
                Ok(Member::Include(mixin))
            }
            Some(TokenKind::KExtend) if ctx == MemberContext::Class => {
                self.advance();
                self.parse_mixin(annotations).map(Member::Extend)
            }
            Some(TokenKind::KPrepend) if ctx == MemberContext::Class => {
                self.advance();
                self.parse_mixin(annotations).map(Member::Prepend)
            }
            Some(TokenKind::KAttrReader) if ctx == MemberContext::Class => {
                self.advance();
                self.parse_attribute(AttributeKind::Reader, annotations)
                    .map(Member::Attribute)
            }
            Some(TokenKind::KAttrWriter) if ctx == MemberContext::Class => {
                self.advance();
                self.parse_attribute(AttributeKind::Writer, annotations)
                    .map(Member::Attribute)
            }
            Some(TokenKind::KAttrAccessor) if ctx == MemberContext::Class => {
                self.advance();
                self.parse_attribute(AttributeKind::Accessor, annotations)
                    .map(Member::Attribute)
            }
            Some(TokenKind::IvarIdent(name)) if ctx == MemberContext::Class => {
                let span = self.advance().span;
                self.expect(TokenKind::Colon)?;
                let ty = self.parse_type()?;
                let end = self.last_end(span.start);
                Ok(Member::InstanceVariable(VariableDefinition {
                    name,
                    ty,
                    span: Span::new(span.start, end),
                }))
            }
            Some(TokenKind::ClassVarIdent(name)) if ctx == MemberContext::Class => {
                let span = self.advance().span;
                self.expect(TokenKind::Colon)?;
                let ty = self.parse_type()?;
                let end = self.last_end(span.start);
                Ok(Member::ClassVariable(VariableDefinition {
                    name,
                    ty,
                    span: Span::new(span.start, end),
                }))
            }
            Some(TokenKind::KSelf) if ctx == MemberContext::Class => {
                let span = self.advance().span;
                self.expect(TokenKind::Dot)?;
                let name = match self.peek_kind() {
                    Some(TokenKind::IvarIdent(name)) => {
                        self.advance();
                        name
                    }
                    _ => return Err(self.error_here("Expected instance variable after `self.`")),
                };
                self.expect(TokenKind::Colon)?;
                let ty = self.parse_type()?;
                let end = self.last_end(span.start);
                Ok(Member::ClassInstanceVariable(VariableDefinition {
                    name,
                    ty,
                    span: Span::new(span.start, end),
                }))
            }
            Some(TokenKind::KAlias) if ctx == MemberContext::Class => {
                self.advance();
                self.parse_alias_member(annotations).map(Member::Alias)
            }
            Some(TokenKind::KPublic) if ctx == MemberContext::Class => {
                let span = self.advance().span;
                Ok(Member::Public(span))
            }
            Some(TokenKind::KPrivate) if ctx == MemberContext::Class => {
                let span = self.advance().span;
                Ok(Member::Private(span))
            }
            Some(
                TokenKind::KClass
                | TokenKind::KModule
                | TokenKind::KInterface
                | TokenKind::KType
                | TokenKind::KExtension
                | TokenKind::ColonColon
                | TokenKind::ConstIdent(_),
            ) if ctx == MemberContext::Class => {
                self.parse_declaration_with(annotations).map(Member::Decl)
            }
            Some(TokenKind::Keyword(name))
                if ctx == MemberContext::Class && starts_uppercase(&name) =>
            {
                self.parse_declaration_with(annotations).map(Member::Decl)
            }
            _ if ctx == MemberContext::Interface => {
                Err(self.semantics_error_here("Interface members are method definitions and interface includes only"))
            }
            _ => Err(self.error_here("Expected member")),
        }
    }

    fn parse_mixin(&mut self, annotations: Vec<Annotation>) -> Result<Mixin, ParseError> {
        let start = self.previous_start();
        let name = self.parse_type_name_ref()?;
        if name.is_alias() {
            return Err(self.error_here("Expected class, module or interface name"));
        }
        let args = self.parse_type_args()?;
        let end = self.last_end(start);
        Ok(Mixin {
            name,
            args,
            annotations,
            span: Span::new(start, end),
        })
    }

    fn parse_method(
        &mut self,
        ctx: MemberContext,
        annotations: Vec<Annotation>,
    ) -> Result<MethodDefinition, ParseError> {
        let start = self.previous_start();
        let kind = if self.check(TokenKind::KSelf) {
            let self_span = self.advance().span;
            let kind = if self.matches(TokenKind::Question) {
                MethodKind::SingletonInstance
            } else {
                MethodKind::Singleton
            };
            self.expect(TokenKind::Dot)?;
            if ctx == MemberContext::Interface {
                return Err(ParseError::semantics(
                    "Interface cannot declare singleton methods",
                    self_span,
                ));
            }
            kind
        } else {
            MethodKind::Instance
        };

        let (name, colon_consumed) = self.parse_method_name()?;
        if !colon_consumed {
            self.expect(TokenKind::Colon)?;
        }

        let mut overloads = Vec::new();
        let mut super_count = 0;
        loop {
            if self.matches(TokenKind::KSuper) {
                super_count += 1;
                overloads.push(Overload::Super);
            } else {
                overloads.push(Overload::MethodType(self.parse_method_type()?));
            }
            if !self.matches(TokenKind::Bar) {
                break;
            }
        }
        let end = self.last_end(start);
        let span = Span::new(start, end);
        if super_count > 1 {
            return Err(ParseError::semantics(
                format!("Method `{}` lists `super` more than once", name),
                span,
            ));
        }

        Ok(MethodDefinition {
            name,
            kind,
            overloads,
            annotations,
            span,
        })
    }

    fn parse_method_name(&mut self) -> Result<(String, bool), ParseError> {
        match self.peek_kind() {
            Some(TokenKind::Keyword(name)) => {
                self.advance();
                Ok((name, true))
            }
            Some(TokenKind::Ident(name)) | Some(TokenKind::ConstIdent(name)) => {
                self.advance();
                let mut name = name;
                if self.adjacent() {
                    if self.check(TokenKind::Question) {
                        self.advance();
                        name.push('?');
                    } else if self.peek_kind() == Some(TokenKind::Operator("!".to_string())) {
                        self.advance();
                        name.push('!');
                    }
                }
                Ok((name, false))
            }
            Some(TokenKind::QuotedMethod(name)) => {
                self.advance();
                Ok((name, false))
            }
            Some(TokenKind::Operator(op)) => {
                self.advance();
                Ok((op, false))
            }
            Some(TokenKind::Star) => {
                self.advance();
                Ok(("*".to_string(), false))
            }
            Some(TokenKind::StarStar) => {
                self.advance();
                Ok(("**".to_string(), false))
            }
            Some(TokenKind::Lt) => {
                self.advance();
                Ok(("<".to_string(), false))
            }
            Some(TokenKind::Gt) => {
                self.advance();
                Ok((">".to_string(), false))
            }
            Some(TokenKind::Amp) => {
                self.advance();
                Ok(("&".to_string(), false))
            }
            Some(TokenKind::Bar) => {
                self.advance();
                Ok(("|".to_string(), false))
            }
            Some(TokenKind::LBracket) => {
                self.advance();
                if !(self.adjacent() && self.matches(TokenKind::RBracket)) {
                    return Err(self.error_here("Expected `]` in method name"));
                }
                if self.adjacent() && self.matches(TokenKind::Eq) {
                    Ok(("[]=".to_string(), false))
                } else {
                    Ok(("[]".to_string(), false))
                }
            }
            _ => Err(self.error_here("Expected method name")),
        }
    }

    fn parse_method_type(&mut self) -> Result<MethodType, ParseError> {
        let type_params = self.parse_type_param_list()?;
        self.method_type_params.push(type_params.clone());
        let result = self.parse_method_type_body(type_params);
        self.method_type_params.pop();
        result
    }

    fn parse_method_type_body(
        &mut self,
        type_params: Vec<String>,
    ) -> Result<MethodType, ParseError> {
        let mut function = if self.check(TokenKind::LParen) {
            self.advance();
            let function = self.parse_function_params()?;
            self.expect(TokenKind::RParen)?;
            function
        } else {
            FunctionType::empty(Type::Void)
        };

        let block = if self.matches(TokenKind::LBrace) {
            let block_fn = self.parse_block_function()?;
            Some(Block {
                function: block_fn,
                required: true,
            })
        } else if self.check(TokenKind::Question)
            && self.peek_kind_n(1) == Some(TokenKind::LBrace)
        {
            self.advance();
            self.advance();
            let block_fn = self.parse_block_function()?;
            Some(Block {
                function: block_fn,
                required: false,
            })
        } else {
            None
        };

        self.expect(TokenKind::Arrow)?;
        function.return_type = self.parse_return_type()?;

        Ok(MethodType {
            type_params,
            function,
            block,
        })
    }

    fn parse_block_function(&mut self) -> Result<FunctionType, ParseError> {
        let mut function = if self.matches(TokenKind::LParen) {
            let function = self.parse_function_params()?;
            self.expect(TokenKind::RParen)?;
            function
        } else {
            FunctionType::empty(Type::Void)
        };
        self.expect(TokenKind::Arrow)?;
        function.return_type = self.parse_return_type()?;
        self.expect(TokenKind::RBrace)?;
        Ok(function)
    }

    // Parses the parameter groups between parens; the caller fills in the
    // return type.
    fn parse_function_params(&mut self) -> Result<FunctionType, ParseError> {
        let mut function = FunctionType::empty(Type::Void);
        if self.check(TokenKind::RParen) {
            return Ok(function);
        }
        loop {
            match self.peek_kind() {
                Some(TokenKind::Star) => {
                    self.advance();
                    if function.rest_positional.is_some() {
                        return Err(self.error_here("Multiple rest parameters"));
                    }
                    function.rest_positional = Some(self.parse_param()?);
                }
                Some(TokenKind::StarStar) => {
                    self.advance();
                    if function.rest_keywords.is_some() {
                        return Err(self.error_here("Multiple keyword rest parameters"));
                    }
                    function.rest_keywords = Some(self.parse_param()?);
                }
                Some(TokenKind::Question) => {
                    self.advance();
                    if let Some(TokenKind::Keyword(name)) = self.peek_kind() {
                        self.advance();
                        let param = self.parse_param()?;
                        function.optional_keywords.push((name, param));
                    } else {
                        if function.rest_positional.is_some() {
                            return Err(
                                self.error_here("Optional positional after rest parameter")
                            );
                        }
                        let param = self.parse_param()?;
                        function.optional_positionals.push(param);
                    }
                }
                Some(TokenKind::Keyword(name)) => {
                    self.advance();
                    let param = self.parse_param()?;
                    function.required_keywords.push((name, param));
                }
                _ => {
                    let param = self.parse_param()?;
                    if !function.required_keywords.is_empty()
                        || !function.optional_keywords.is_empty()
                        || function.rest_keywords.is_some()
                    {
                        return Err(self.error_here("Positional parameter after keywords"));
                    }
                    if function.rest_positional.is_some()
                        || !function.optional_positionals.is_empty()
                    {
                        function.trailing_positionals.push(param);
                    } else {
                        function.required_positionals.push(param);
                    }
                }
            }
            if !self.matches(TokenKind::Comma) {
                break;
            }
        }
        Ok(function)
    }

    fn parse_param(&mut self) -> Result<Param, ParseError> {
        let ty = self.parse_type()?;
        let name = match self.peek_kind() {
            Some(TokenKind::Ident(name)) => {
                self.advance();
                Some(name)
            }
            _ => None,
        };
        Ok(Param { name, ty })
    }

    fn parse_attribute(
        &mut self,
        kind: AttributeKind,
        annotations: Vec<Annotation>,
    ) -> Result<AttributeDefinition, ParseError> {
        let start = self.previous_start();
        let (name, ivar) = match self.peek_kind() {
            Some(TokenKind::Keyword(name)) => {
                self.advance();
                (name, IvarSpec::Inferred)
            }
            Some(TokenKind::Ident(name)) => {
                self.advance();
                let ivar = if self.matches(TokenKind::LParen) {
                    if self.matches(TokenKind::RParen) {
                        IvarSpec::Omitted
                    } else {
                        let ivar_name = match self.peek_kind() {
                            Some(TokenKind::IvarIdent(text)) => {
                                self.advance();
                                text
                            }
                            _ => return Err(self.error_here("Expected instance variable name")),
                        };
                        self.expect(TokenKind::RParen)?;
                        IvarSpec::Named(ivar_name)
                    }
                } else {
                    IvarSpec::Inferred
                };
                self.expect(TokenKind::Colon)?;
                (name, ivar)
            }
            _ => return Err(self.error_here("Expected attribute name")),
        };
        let ty = self.parse_type()?;
        let end = self.last_end(start);
        Ok(AttributeDefinition {
            name,
            kind,
            ivar,
            ty,
            annotations,
            span: Span::new(start, end),
        })
    }

    fn parse_alias_member(
        &mut self,
        annotations: Vec<Annotation>,
    ) -> Result<AliasMember, ParseError> {
        let start = self.previous_start();
        let new_singleton = self.parse_alias_self_prefix()?;
        let (new_name, _) = self.parse_method_name()?;
        let old_singleton = self.parse_alias_self_prefix()?;
        let (old_name, _) = self.parse_method_name()?;
        let end = self.last_end(start);
        let span = Span::new(start, end);
        if new_singleton != old_singleton {
            return Err(ParseError::semantics(
                "Alias must pair two instance methods or two singleton methods",
                span,
            ));
        }
        Ok(AliasMember {
            new_name,
            old_name,
            kind: if new_singleton {
                AliasKind::Singleton
            } else {
                AliasKind::Instance
            },
            annotations,
            span,
        })
    }

    fn parse_alias_self_prefix(&mut self) -> Result<bool, ParseError> {
        if self.check(TokenKind::KSelf) && self.peek_kind_n(1) == Some(TokenKind::Dot) {
            self.advance();
            self.advance();
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn parse_type(&mut self) -> Result<Type, ParseError> {
        let mut types = vec![self.parse_type_intersection()?];
        while self.matches(TokenKind::Bar) {
            types.push(self.parse_type_intersection()?);
        }
        if types.len() == 1 {
            Ok(types.pop().unwrap())
        } else {
            Ok(Type::Union(types))
        }
    }

    fn parse_type_intersection(&mut self) -> Result<Type, ParseError> {
        let mut types = vec![self.parse_type_optional()?];
        while self.matches(TokenKind::Amp) {
            types.push(self.parse_type_optional()?);
        }
        if types.len() == 1 {
            Ok(types.pop().unwrap())
        } else {
            Ok(Type::Intersection(types))
        }
    }

    // Postfix `?` and `.class`; also the level used by function return types,
    // where a bare `|` would read as an overload separator.
    fn parse_type_optional(&mut self) -> Result<Type, ParseError> {
        let mut ty = self.parse_type_primary()?;
        loop {
            if self.matches(TokenKind::Question) {
                ty = Type::Optional(Box::new(ty));
                continue;
            }
            if self.check(TokenKind::Dot) && self.peek_kind_n(1) == Some(TokenKind::KClass) {
                self.advance();
                self.advance();
                ty = match ty {
                    Type::ClassInstance { name, args } if args.is_empty() => {
                        Type::ClassSingleton { name }
                    }
                    _ => return Err(self.error_here("`.class` applies to a plain class name")),
                };
                continue;
            }
            break;
        }
        Ok(ty)
    }

    fn parse_return_type(&mut self) -> Result<Type, ParseError> {
        self.parse_type_optional()
    }

    fn parse_type_primary(&mut self) -> Result<Type, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::KAny) => {
                self.advance();
                Ok(Type::Any)
            }
            Some(TokenKind::KVoid) => {
                self.advance();
                Ok(Type::Void)
            }
            Some(TokenKind::KBool) => {
                self.advance();
                Ok(Type::Bool)
            }
            Some(TokenKind::KNil) => {
                self.advance();
                Ok(Type::Nil)
            }
            Some(TokenKind::KTop) => {
                self.advance();
                Ok(Type::Top)
            }
            Some(TokenKind::KBot) => {
                self.advance();
                Ok(Type::Bot)
            }
            Some(TokenKind::KSelf) => {
                self.advance();
                Ok(Type::SelfType)
            }
            Some(TokenKind::KInstance) => {
                self.advance();
                Ok(Type::Instance)
            }
            Some(TokenKind::KClass) => {
                self.advance();
                Ok(Type::Class)
            }
            Some(TokenKind::KTrue) => {
                self.advance();
                Ok(Type::Literal(LiteralValue::Bool(true)))
            }
            Some(TokenKind::KFalse) => {
                self.advance();
                Ok(Type::Literal(LiteralValue::Bool(false)))
            }
            Some(TokenKind::Integer(value)) => {
                self.advance();
                Ok(Type::Literal(LiteralValue::Integer(value)))
            }
            Some(TokenKind::Str(value)) => {
                self.advance();
                Ok(Type::Literal(LiteralValue::String(value)))
            }
            Some(TokenKind::Symbol(name)) => {
                self.advance();
                Ok(Type::Literal(LiteralValue::Symbol(name)))
            }
            Some(
                TokenKind::ColonColon
                | TokenKind::ConstIdent(_)
                | TokenKind::InterfaceIdent(_)
                | TokenKind::Ident(_),
            ) => self.parse_type_application(),
            Some(TokenKind::LBracket) => {
                self.advance();
                let mut types = Vec::new();
                if !self.check(TokenKind::RBracket) {
                    loop {
                        types.push(self.parse_type()?);
                        if !self.matches(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RBracket)?;
                Ok(Type::Tuple(types))
            }
            Some(TokenKind::LBrace) => {
                self.advance();
                let mut fields = Vec::new();
                if !self.check(TokenKind::RBrace) {
                    loop {
                        let name = match self.peek_kind() {
                            Some(TokenKind::Keyword(name)) => {
                                self.advance();
                                name
                            }
                            _ => return Err(self.error_here("Expected record field name")),
                        };
                        let ty = self.parse_type()?;
                        fields.push((name, ty));
                        if !self.matches(TokenKind::Comma) {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::RBrace)?;
                Ok(Type::Record(fields))
            }
            Some(TokenKind::LParen) => self.parse_paren_type(),
            Some(TokenKind::Arrow) => {
                self.advance();
                let return_type = self.parse_return_type()?;
                Ok(Type::Proc(Box::new(FunctionType::empty(return_type))))
            }
            _ => Err(self.error_here("Expected type")),
        }
    }

    // `(T, S) -> R` is a proc type, `(T)` is grouping; decide by the arrow.
    fn parse_paren_type(&mut self) -> Result<Type, ParseError> {
        let checkpoint = self.pos;
        self.advance();
        if let Ok(mut function) = self.parse_function_params() {
            if self.matches(TokenKind::RParen) && self.matches(TokenKind::Arrow) {
                function.return_type = self.parse_return_type()?;
                return Ok(Type::Proc(Box::new(function)));
            }
        }
        self.pos = checkpoint;
        self.advance();
        let ty = self.parse_type()?;
        self.expect(TokenKind::RParen)?;
        Ok(ty)
    }

    fn parse_type_application(&mut self) -> Result<Type, ParseError> {
        let name = self.parse_type_name_ref()?;
        if name.is_alias() {
            if self.check(TokenKind::LBracket) {
                return Err(self.error_here("Alias types take no type arguments"));
            }
            return Ok(Type::Alias { name });
        }
        if name.is_interface() {
            let args = self.parse_type_args()?;
            return Ok(Type::Interface { name, args });
        }
        if !name.is_absolute() && name.namespace.is_empty() && self.is_type_var(&name.name) {
            if self.check(TokenKind::LBracket) {
                return Err(self.error_here("Type variables take no type arguments"));
            }
            return Ok(Type::Var(name.name));
        }
        let args = self.parse_type_args()?;
        Ok(Type::ClassInstance { name, args })
    }

    fn parse_type_name_ref(&mut self) -> Result<TypeName, ParseError> {
        let absolute = self.matches(TokenKind::ColonColon);
        let mut path = Vec::new();
        loop {
            match self.peek_kind() {
                Some(TokenKind::ConstIdent(segment))
                    if self.peek_kind_n(1) == Some(TokenKind::ColonColon) =>
                {
                    self.advance();
                    self.advance();
                    path.push(segment);
                }
                Some(TokenKind::ConstIdent(name)) => {
                    self.advance();
                    return Ok(TypeName::new(Namespace::new(path, absolute), name));
                }
                Some(TokenKind::InterfaceIdent(name)) => {
                    self.advance();
                    return Ok(TypeName::new(Namespace::new(path, absolute), name));
                }
                Some(TokenKind::Ident(name)) => {
                    self.advance();
                    return Ok(TypeName::new(Namespace::new(path, absolute), name));
                }
                _ => return Err(self.error_here("Expected type name")),
            }
        }
    }

    fn parse_type_args(&mut self) -> Result<Vec<Type>, ParseError> {
        let mut args = Vec::new();
        if self.matches(TokenKind::LBracket) {
            if !self.check(TokenKind::RBracket) {
                loop {
                    args.push(self.parse_type()?);
                    if !self.matches(TokenKind::Comma) {
                        break;
                    }
                }
            }
            self.expect(TokenKind::RBracket)?;
        }
        Ok(args)
    }

    fn parse_type_param_list(&mut self) -> Result<Vec<String>, ParseError> {
        let mut params = Vec::new();
        if self.matches(TokenKind::LBracket) {
            loop {
                match self.peek_kind() {
                    Some(TokenKind::ConstIdent(name)) => {
                        self.advance();
                        params.push(name);
                    }
                    _ => return Err(self.error_here("Expected type parameter name")),
                }
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RBracket)?;
        }
        Ok(params)
    }

    fn parse_annotations(&mut self) -> Vec<Annotation> {
        let mut annotations = Vec::new();
        while let Some(TokenKind::Annotation(content)) = self.peek_kind() {
            let span = self.advance().span;
            annotations.push(Annotation { content, span });
        }
        annotations
    }

    fn is_type_var(&self, name: &str) -> bool {
        self.method_type_params
            .iter()
            .any(|scope| scope.iter().any(|p| p == name))
            || self.decl_type_params.iter().any(|p| p == name)
    }

    fn parse_declared_name(&mut self, shape: NameShape) -> Result<(TypeName, bool), ParseError> {
        let absolute = self.matches(TokenKind::ColonColon);
        let mut path = Vec::new();
        loop {
            match self.peek_kind() {
                Some(TokenKind::ConstIdent(segment))
                    if self.peek_kind_n(1) == Some(TokenKind::ColonColon) =>
                {
                    self.advance();
                    self.advance();
                    path.push(segment);
                }
                Some(TokenKind::ConstIdent(name)) if shape == NameShape::Class => {
                    self.advance();
                    return Ok((TypeName::new(Namespace::new(path, absolute), name), false));
                }
                Some(TokenKind::Keyword(name))
                    if shape == NameShape::Class && starts_uppercase(&name) =>
                {
                    self.advance();
                    return Ok((TypeName::new(Namespace::new(path, absolute), name), true));
                }
                Some(TokenKind::InterfaceIdent(name)) if shape == NameShape::Interface => {
                    self.advance();
                    return Ok((TypeName::new(Namespace::new(path, absolute), name), false));
                }
                Some(TokenKind::Ident(name)) if shape == NameShape::Alias => {
                    self.advance();
                    return Ok((TypeName::new(Namespace::new(path, absolute), name), false));
                }
                _ => {
                    let expected = match shape {
                        NameShape::Class => "class or module name",
                        NameShape::Interface => "interface name",
                        NameShape::Alias => "alias name",
                    };
                    return Err(self.error_here(&format!("Expected {}", expected)));
                }
            }
        }
    }

    fn expect_end(&mut self, saved_params: &[String]) -> Result<usize, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::KEnd) => Ok(self.advance().span.end),
            _ => {
                self.decl_type_params = saved_params.to_vec();
                Err(self.error_here("Expected `end`"))
            }
        }
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        matches!(self.peek_kind(), Some(tk) if tk == kind)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<&Token, ParseError> {
        if self.check(kind.clone()) {
            Ok(self.advance())
        } else {
            Err(self.error_here(&format!("Expected {:?}", kind)))
        }
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.tokens.get(self.pos).map(|t| t.kind.clone())
    }

    fn peek_kind_n(&self, n: usize) -> Option<TokenKind> {
        self.tokens.get(self.pos + n).map(|t| t.kind.clone())
    }

    fn advance(&mut self) -> &Token {
        let token = self
            .tokens
            .get(self.pos)
            .unwrap_or_else(|| self.tokens.last().unwrap());
        self.pos = (self.pos + 1).min(self.tokens.len());
        token
    }

    fn adjacent(&self) -> bool {
        if self.pos == 0 {
            return false;
        }
        match (self.tokens.get(self.pos - 1), self.tokens.get(self.pos)) {
            (Some(prev), Some(next)) => prev.span.end == next.span.start,
            _ => false,
        }
    }

    fn is_eof(&self) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Eof) | None)
    }

    fn current_span_start(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|t| t.span.start)
            .unwrap_or_else(|| self.tokens.last().map(|t| t.span.end).unwrap_or(0))
    }

    fn previous_start(&self) -> usize {
        if self.pos == 0 {
            return 0;
        }
        self.tokens[self.pos - 1].span.start
    }

    fn last_end(&self, fallback: usize) -> usize {
        if self.pos == 0 {
            return fallback;
        }
        self.tokens
            .get(self.pos - 1)
            .map(|t| t.span.end)
            .unwrap_or(fallback)
    }

    fn error_here(&self, message: &str) -> ParseError {
        ParseError::syntax(self.message_with_token(message), self.current_span())
    }

    fn semantics_error_here(&self, message: &str) -> ParseError {
        ParseError::semantics(message.to_string(), self.current_span())
    }

    fn message_with_token(&self, message: &str) -> String {
        match self.peek_kind() {
            Some(TokenKind::Eof) | None => format!("{} (found end of input)", message),
            Some(kind) => format!("{} (found {})", message, kind.describe()),
        }
    }

    fn current_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|t| t.span)
            .unwrap_or_else(|| {
                self.tokens
                    .last()
                    .map(|t| t.span)
                    .unwrap_or_else(|| Span::new(0, 0))
            })
    }

    fn report(&mut self, err: ParseError) {
        self.errors.push(err);
    }

    fn synchronize_declaration(&mut self) {
        while !self.is_eof() {
            match self.peek_kind() {
                Some(
                    TokenKind::KClass
                    | TokenKind::KModule
                    | TokenKind::KInterface
                    | TokenKind::KType
                    | TokenKind::KExtension
                    | TokenKind::GlobalIdent(_),
                ) => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn synchronize_member(&mut self) {
        while !self.is_eof() {
            match self.peek_kind() {
                Some(
                    TokenKind::KDef
                    | TokenKind::KInclude
                    | TokenKind::KExtend
                    | TokenKind::KPrepend
                    | TokenKind::KAttrReader
                    | TokenKind::KAttrWriter
                    | TokenKind::KAttrAccessor
                    | TokenKind::KAlias
                    | TokenKind::KPublic
                    | TokenKind::KPrivate
                    | TokenKind::KEnd
                    | TokenKind::IvarIdent(_)
                    | TokenKind::ClassVarIdent(_),
                ) => return,
                _ => {
                    self.advance();
                }
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum NameShape {
    Class,
    Interface,
    Alias,
}

fn starts_uppercase(name: &str) -> bool {
    name.starts_with(|c: char| c.is_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::errors::ParseErrorKind;

    fn parse_one(source: &str) -> Declaration {
        let mut decls = parse_signature(source).expect("parse");
        assert_eq!(decls.len(), 1, "expected one declaration");
        decls.pop().unwrap()
    }

    fn parse_failure(source: &str) -> ParseErrors {
        parse_signature(source).expect_err("expected parse failure")
    }

    #[test]
    fn parses_type_alias_declaration() {
        let decl = parse_one("type foo = any");
        let Declaration::Alias(alias) = decl else {
            panic!("expected alias declaration");
        };
        assert_eq!(alias.name.to_string(), "foo");
        assert_eq!(alias.ty, Type::Any);
    }

    #[test]
    fn parses_absolute_constant_declaration() {
        let decl = parse_one("::BAR: any");
        let Declaration::Constant(constant) = decl else {
            panic!("expected constant declaration");
        };
        assert_eq!(constant.name.to_string(), "::BAR");
        assert_eq!(constant.ty, Type::Any);
    }

    #[test]
    fn parses_interface_with_overloads_and_include() {
        let decl = parse_one(
            "interface _Each[A, B]
               def count: -> Integer
                        | (any) -> Integer
                        | [X] { (A) -> X } -> Integer
               include _Hash[Integer]
             end",
        );
        let Declaration::Interface(interface) = decl else {
            panic!("expected interface declaration");
        };
        assert_eq!(interface.name.to_string(), "_Each");
        assert_eq!(interface.type_params, vec!["A", "B"]);
        assert_eq!(interface.members.len(), 2);

        let Member::Method(method) = &interface.members[0] else {
            panic!("expected method member");
        };
        assert_eq!(method.name, "count");
        assert_eq!(method.overloads.len(), 3);
        let Overload::MethodType(third) = &method.overloads[2] else {
            panic!("expected method type overload");
        };
        assert_eq!(third.type_params, vec!["X"]);
        let block = third.block.as_ref().expect("block");
        assert!(block.required);
        assert_eq!(
            block.function.required_positionals[0].ty,
            Type::Var("A".to_string())
        );
        assert_eq!(block.function.return_type, Type::Var("X".to_string()));

        let Member::Include(include) = &interface.members[1] else {
            panic!("expected include member");
        };
        assert_eq!(include.name.to_string(), "_Hash");
        assert_eq!(include.args.len(), 1);
    }

    #[test]
    fn parses_class_with_superclass_and_members() {
        let decl = parse_one(
            "class Dictionary[A, B] < Collection[B]
               @entries: Array[A]
               def lookup: (A) -> B?
               def each: { ([A, B]) -> void } -> self | -> any
             end",
        );
        let Declaration::Class(class) = decl else {
            panic!("expected class declaration");
        };
        assert_eq!(class.name.to_string(), "Dictionary");
        let superclass = class.superclass.expect("superclass");
        assert_eq!(superclass.name.to_string(), "Collection");
        assert_eq!(superclass.args, vec![Type::Var("B".to_string())]);
        assert_eq!(class.members.len(), 3);
    }

    #[test]
    fn parses_extension_declaration() {
        let decl = parse_one(
            "extension C (Pathname)
               def path: -> String
             end",
        );
        let Declaration::Extension(extension) = decl else {
            panic!("expected extension declaration");
        };
        assert_eq!(extension.name.to_string(), "C");
        assert_eq!(extension.extension_name, "Pathname");
        assert_eq!(extension.members.len(), 1);
    }

    #[test]
    fn parses_operator_and_quoted_method_names() {
        let decl = parse_one(
            "class Num
               def ==: (any) -> bool
               def <=>: (self) -> Integer
               def []=: (Integer, any) -> any
               def +@: -> self
               def `class`: -> class
               def empty?: -> bool
               def save!: -> self
             end",
        );
        let Declaration::Class(class) = decl else {
            panic!("expected class declaration");
        };
        let names: Vec<&str> = class
            .members
            .iter()
            .map(|m| match m {
                Member::Method(m) => m.name.as_str(),
                other => panic!("unexpected member {:?}", other),
            })
            .collect();
        assert_eq!(names, vec!["==", "<=>", "[]=", "+@", "class", "empty?", "save!"]);
    }

    #[test]
    fn parses_parameter_groups() {
        let decl = parse_one(
            "class Call
               def invoke: (Integer, ?String note, *Symbol tags, bool, name: String, ?age: Integer, **any) -> void
             end",
        );
        let Declaration::Class(class) = decl else {
            panic!("expected class");
        };
        let Member::Method(method) = &class.members[0] else {
            panic!("expected method");
        };
        let Overload::MethodType(method_type) = &method.overloads[0] else {
            panic!("expected method type");
        };
        let function = &method_type.function;
        assert_eq!(function.required_positionals.len(), 1);
        assert_eq!(function.optional_positionals.len(), 1);
        assert!(function.rest_positional.is_some());
        assert_eq!(function.trailing_positionals.len(), 1);
        assert_eq!(function.required_keywords[0].0, "name");
        assert_eq!(function.optional_keywords[0].0, "age");
        assert!(function.rest_keywords.is_some());
    }

    #[test]
    fn parses_attribute_forms() {
        let decl = parse_one(
            "class Person
               attr_reader name: String
               attr_writer address(@raw_address): String
               attr_accessor phone(): String?
             end",
        );
        let Declaration::Class(class) = decl else {
            panic!("expected class");
        };
        let attrs: Vec<&AttributeDefinition> = class
            .members
            .iter()
            .map(|m| match m {
                Member::Attribute(a) => a,
                other => panic!("unexpected member {:?}", other),
            })
            .collect();
        assert_eq!(attrs[0].ivar, IvarSpec::Inferred);
        assert_eq!(attrs[1].ivar, IvarSpec::Named("@raw_address".to_string()));
        assert_eq!(attrs[2].ivar, IvarSpec::Omitted);
    }

    #[test]
    fn parses_record_tuple_and_proc_types() {
        let decl = parse_one("type shape = { name: String, points: Array[[Integer, Integer]] }");
        let Declaration::Alias(alias) = decl else {
            panic!("expected alias");
        };
        let Type::Record(fields) = &alias.ty else {
            panic!("expected record type");
        };
        assert_eq!(fields[0].0, "name");

        let decl = parse_one("type callback = (Integer) -> void");
        let Declaration::Alias(alias) = decl else {
            panic!("expected alias");
        };
        assert!(matches!(alias.ty, Type::Proc(_)));

        let decl = parse_one("type grouped = (Integer | String)");
        let Declaration::Alias(alias) = decl else {
            panic!("expected alias");
        };
        assert!(matches!(alias.ty, Type::Union(_)));
    }

    #[test]
    fn parses_singleton_types_and_module_self_types() {
        let decl = parse_one(
            "module Runnable : Object
               def self.default: -> Runnable.class
             end",
        );
        let Declaration::Module(module) = decl else {
            panic!("expected module");
        };
        assert_eq!(module.self_types.len(), 1);
        let Member::Method(method) = &module.members[0] else {
            panic!("expected method");
        };
        assert_eq!(method.kind, MethodKind::Singleton);
        let Overload::MethodType(method_type) = &method.overloads[0] else {
            panic!("expected method type");
        };
        assert!(matches!(
            method_type.function.return_type,
            Type::ClassSingleton { .. }
        ));
    }

    #[test]
    fn parses_nested_declarations_as_members() {
        let decl = parse_one(
            "class Outer
               VERSION: String
               class Inner
                 def value: -> Integer
               end
             end",
        );
        let Declaration::Class(class) = decl else {
            panic!("expected class");
        };
        assert!(matches!(
            class.members[0],
            Member::Decl(Declaration::Constant(_))
        ));
        assert!(matches!(class.members[1], Member::Decl(Declaration::Class(_))));
    }

    #[test]
    fn rejects_singleton_method_in_interface() {
        let errors = parse_failure("interface _Foo def self.make: -> any end");
        assert!(errors
            .errors
            .iter()
            .any(|e| e.kind == ParseErrorKind::Semantics));
    }

    #[test]
    fn rejects_class_include_in_interface() {
        let errors = parse_failure("interface _Foo include Enumerable end");
        assert!(errors
            .errors
            .iter()
            .any(|e| e.kind == ParseErrorKind::Semantics));
    }

    #[test]
    fn rejects_duplicate_super_overloads() {
        let errors = parse_failure("class C def f: super | super end");
        assert!(errors
            .errors
            .iter()
            .any(|e| e.kind == ParseErrorKind::Semantics));
    }

    #[test]
    fn rejects_mismatched_alias_kinds() {
        let errors = parse_failure("class C alias self.a b end");
        assert!(errors
            .errors
            .iter()
            .any(|e| e.kind == ParseErrorKind::Semantics));
    }

    #[test]
    fn annotations_attach_to_declarations_and_members() {
        let decl = parse_one(
            "%a{deprecated}
             class Legacy
               %a(pure) def checksum: -> Integer
             end",
        );
        let Declaration::Class(class) = decl else {
            panic!("expected class");
        };
        assert_eq!(class.annotations[0].content, "deprecated");
        let Member::Method(method) = &class.members[0] else {
            panic!("expected method");
        };
        assert_eq!(method.annotations[0].content, "pure");
    }

    #[test]
    fn recovers_at_declaration_boundaries() {
        let errors = parse_failure(
            "class Broken <
             type ok = any",
        );
        assert!(!errors.errors.is_empty());
    }

    #[test]
    fn parse_type_entry_point() {
        let ty = parse_type("Array[Integer | nil]").expect("type");
        assert_eq!(ty.to_string(), "Array[Integer | nil]");
    }
}

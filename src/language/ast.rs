use crate::language::{
    names::TypeName,
    span::Span,
    types::{MethodType, Type},
};
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Annotation {
    pub content: String,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Declaration {
    Class(ClassDecl),
    Module(ModuleDecl),
    Interface(InterfaceDecl),
    Constant(ConstantDecl),
    Global(GlobalDecl),
    Alias(AliasDecl),
    Extension(ExtensionDecl),
}

impl Declaration {
    pub fn span(&self) -> Span {
        match self {
            Declaration::Class(decl) => decl.span,
            Declaration::Module(decl) => decl.span,
            Declaration::Interface(decl) => decl.span,
            Declaration::Constant(decl) => decl.span,
            Declaration::Global(decl) => decl.span,
            Declaration::Alias(decl) => decl.span,
            Declaration::Extension(decl) => decl.span,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClassDecl {
    pub name: TypeName,
    pub type_params: Vec<String>,
    pub superclass: Option<Superclass>,
    pub members: Vec<Member>,
    pub annotations: Vec<Annotation>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Superclass {
    pub name: TypeName,
    pub args: Vec<Type>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModuleDecl {
    pub name: TypeName,
    pub type_params: Vec<String>,
    pub self_types: Vec<Type>,
    pub members: Vec<Member>,
    pub annotations: Vec<Annotation>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InterfaceDecl {
    pub name: TypeName,
    pub type_params: Vec<String>,
    pub members: Vec<Member>,
    pub annotations: Vec<Annotation>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConstantDecl {
    pub name: TypeName,
    pub ty: Type,
    pub annotations: Vec<Annotation>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GlobalDecl {
    pub name: String,
    pub ty: Type,
    pub annotations: Vec<Annotation>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AliasDecl {
    pub name: TypeName,
    pub ty: Type,
    pub annotations: Vec<Annotation>,
    pub span: Span,
}

/// Reopens an existing class or module under a labeled fragment; contributes
/// members but never alters inheritance.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExtensionDecl {
    pub name: TypeName,
    pub type_params: Vec<String>,
    pub extension_name: String,
    pub members: Vec<Member>,
    pub annotations: Vec<Annotation>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Member {
    Method(MethodDefinition),
    Include(Mixin),
    Extend(Mixin),
    Prepend(Mixin),
    Attribute(AttributeDefinition),
    InstanceVariable(VariableDefinition),
    ClassInstanceVariable(VariableDefinition),
    ClassVariable(VariableDefinition),
    Alias(AliasMember),
    Public(Span),
    Private(Span),
    Decl(Declaration),
}

impl Member {
    pub fn span(&self) -> Span {
        match self {
            Member::Method(m) => m.span,
            Member::Include(m) | Member::Extend(m) | Member::Prepend(m) => m.span,
            Member::Attribute(a) => a.span,
            Member::InstanceVariable(v)
            | Member::ClassInstanceVariable(v)
            | Member::ClassVariable(v) => v.span,
            Member::Alias(a) => a.span,
            Member::Public(span) | Member::Private(span) => *span,
            Member::Decl(decl) => decl.span(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum MethodKind {
    Instance,
    Singleton,
    /// `def self?.m` — a module function: private on instances, public on
    /// the singleton.
    SingletonInstance,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Overload {
    MethodType(MethodType),
    Super,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MethodDefinition {
    pub name: String,
    pub kind: MethodKind,
    pub overloads: Vec<Overload>,
    pub annotations: Vec<Annotation>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Mixin {
    pub name: TypeName,
    pub args: Vec<Type>,
    pub annotations: Vec<Annotation>,
    pub span: Span,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AttributeKind {
    Reader,
    Writer,
    Accessor,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum IvarSpec {
    /// No override written: the backing ivar is `@<name>`.
    Inferred,
    /// `name(@other)`: backed by the named ivar.
    Named(String),
    /// `name()`: no backing ivar.
    Omitted,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AttributeDefinition {
    pub name: String,
    pub kind: AttributeKind,
    pub ivar: IvarSpec,
    pub ty: Type,
    pub annotations: Vec<Annotation>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VariableDefinition {
    pub name: String,
    pub ty: Type,
    pub span: Span,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AliasKind {
    Instance,
    Singleton,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AliasMember {
    pub new_name: String,
    pub old_name: String,
    pub kind: AliasKind,
    pub annotations: Vec<Annotation>,
    pub span: Span,
}

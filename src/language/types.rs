use crate::language::names::TypeName;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum LiteralValue {
    String(String),
    Symbol(String),
    Integer(i64),
    Bool(bool),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum Type {
    Any,
    Void,
    Bool,
    SelfType,
    Instance,
    Class,
    Nil,
    Top,
    Bot,
    Literal(LiteralValue),
    Var(String),
    ClassInstance { name: TypeName, args: Vec<Type> },
    ClassSingleton { name: TypeName },
    Interface { name: TypeName, args: Vec<Type> },
    Alias { name: TypeName },
    Union(Vec<Type>),
    Intersection(Vec<Type>),
    Optional(Box<Type>),
    Tuple(Vec<Type>),
    Record(Vec<(String, Type)>),
    Proc(Box<FunctionType>),
}

impl Type {
    pub fn instance(name: TypeName) -> Self {
        Type::ClassInstance {
            name,
            args: Vec::new(),
        }
    }

    /// Pre-order walk over this type and every type nested inside it.
    pub fn each_type(&self, f: &mut impl FnMut(&Type)) {
        f(self);
        match self {
            Type::ClassInstance { args, .. } | Type::Interface { args, .. } => {
                for arg in args {
                    arg.each_type(f);
                }
            }
            Type::Union(types) | Type::Intersection(types) | Type::Tuple(types) => {
                for ty in types {
                    ty.each_type(f);
                }
            }
            Type::Optional(inner) => inner.each_type(f),
            Type::Record(fields) => {
                for (_, ty) in fields {
                    ty.each_type(f);
                }
            }
            Type::Proc(function) => function.each_type(f),
            _ => {}
        }
    }

    /// Rebuilds the type with every embedded type name rewritten through `f`.
    pub fn map_type_name<E, F>(&self, f: &mut F) -> Result<Type, E>
    where
        F: FnMut(&TypeName) -> Result<TypeName, E>,
    {
        let mapped = match self {
            Type::ClassInstance { name, args } => Type::ClassInstance {
                name: f(name)?,
                args: map_types(args, f)?,
            },
            Type::ClassSingleton { name } => Type::ClassSingleton { name: f(name)? },
            Type::Interface { name, args } => Type::Interface {
                name: f(name)?,
                args: map_types(args, f)?,
            },
            Type::Alias { name } => Type::Alias { name: f(name)? },
            Type::Union(types) => Type::Union(map_types(types, f)?),
            Type::Intersection(types) => Type::Intersection(map_types(types, f)?),
            Type::Optional(inner) => Type::Optional(Box::new(inner.map_type_name(f)?)),
            Type::Tuple(types) => Type::Tuple(map_types(types, f)?),
            Type::Record(fields) => {
                let mut mapped = Vec::with_capacity(fields.len());
                for (name, ty) in fields {
                    mapped.push((name.clone(), ty.map_type_name(f)?));
                }
                Type::Record(mapped)
            }
            Type::Proc(function) => Type::Proc(Box::new(function.map_type_name(f)?)),
            other => other.clone(),
        };
        Ok(mapped)
    }

    pub fn substitute(&self, subst: &Substitution) -> Type {
        match self {
            Type::Var(name) => subst
                .get(name)
                .cloned()
                .unwrap_or_else(|| self.clone()),
            Type::ClassInstance { name, args } => Type::ClassInstance {
                name: name.clone(),
                args: args.iter().map(|a| a.substitute(subst)).collect(),
            },
            Type::Interface { name, args } => Type::Interface {
                name: name.clone(),
                args: args.iter().map(|a| a.substitute(subst)).collect(),
            },
            Type::Union(types) => Type::Union(types.iter().map(|t| t.substitute(subst)).collect()),
            Type::Intersection(types) => {
                Type::Intersection(types.iter().map(|t| t.substitute(subst)).collect())
            }
            Type::Optional(inner) => Type::Optional(Box::new(inner.substitute(subst))),
            Type::Tuple(types) => Type::Tuple(types.iter().map(|t| t.substitute(subst)).collect()),
            Type::Record(fields) => Type::Record(
                fields
                    .iter()
                    .map(|(name, ty)| (name.clone(), ty.substitute(subst)))
                    .collect(),
            ),
            Type::Proc(function) => Type::Proc(Box::new(function.substitute(subst))),
            other => other.clone(),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Type::Proc(_) => 0,
            Type::Union(_) => 1,
            Type::Intersection(_) => 2,
            _ => 3,
        }
    }

    fn fmt_prec(&self, f: &mut fmt::Formatter<'_>, outer: u8) -> fmt::Result {
        if self.precedence() < outer {
            write!(f, "(")?;
            self.fmt_body(f)?;
            write!(f, ")")
        } else {
            self.fmt_body(f)
        }
    }

    fn fmt_body(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Any => write!(f, "any"),
            Type::Void => write!(f, "void"),
            Type::Bool => write!(f, "bool"),
            Type::SelfType => write!(f, "self"),
            Type::Instance => write!(f, "instance"),
            Type::Class => write!(f, "class"),
            Type::Nil => write!(f, "nil"),
            Type::Top => write!(f, "top"),
            Type::Bot => write!(f, "bot"),
            Type::Literal(LiteralValue::String(value)) => write!(f, "\"{}\"", escape(value)),
            Type::Literal(LiteralValue::Symbol(name)) => write!(f, ":{}", name),
            Type::Literal(LiteralValue::Integer(value)) => write!(f, "{}", value),
            Type::Literal(LiteralValue::Bool(value)) => write!(f, "{}", value),
            Type::Var(name) => write!(f, "{}", name),
            Type::ClassInstance { name, args } | Type::Interface { name, args } => {
                write!(f, "{}", name)?;
                fmt_args(f, args)
            }
            Type::ClassSingleton { name } => write!(f, "{}.class", name),
            Type::Alias { name } => write!(f, "{}", name),
            Type::Union(types) => fmt_joined(f, types, " | ", 2),
            Type::Intersection(types) => fmt_joined(f, types, " & ", 3),
            Type::Optional(inner) => {
                inner.fmt_prec(f, 3)?;
                write!(f, "?")
            }
            Type::Tuple(types) => {
                write!(f, "[")?;
                for (idx, ty) in types.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    ty.fmt_prec(f, 0)?;
                }
                write!(f, "]")
            }
            Type::Record(fields) => {
                write!(f, "{{ ")?;
                for (idx, (name, ty)) in fields.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: ", name)?;
                    ty.fmt_prec(f, 0)?;
                }
                write!(f, " }}")
            }
            Type::Proc(function) => write!(f, "{}", function),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_prec(f, 0)
    }
}

fn fmt_args(f: &mut fmt::Formatter<'_>, args: &[Type]) -> fmt::Result {
    if args.is_empty() {
        return Ok(());
    }
    write!(f, "[")?;
    for (idx, arg) in args.iter().enumerate() {
        if idx > 0 {
            write!(f, ", ")?;
        }
        arg.fmt_prec(f, 0)?;
    }
    write!(f, "]")
}

fn fmt_joined(f: &mut fmt::Formatter<'_>, types: &[Type], sep: &str, prec: u8) -> fmt::Result {
    for (idx, ty) in types.iter().enumerate() {
        if idx > 0 {
            write!(f, "{}", sep)?;
        }
        ty.fmt_prec(f, prec)?;
    }
    Ok(())
}

fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\t', "\\t")
}

fn map_types<E, F>(types: &[Type], f: &mut F) -> Result<Vec<Type>, E>
where
    F: FnMut(&TypeName) -> Result<TypeName, E>,
{
    types.iter().map(|t| t.map_type_name(f)).collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Param {
    pub name: Option<String>,
    pub ty: Type,
}

impl Param {
    pub fn new(ty: Type) -> Self {
        Self { name: None, ty }
    }

    pub fn named(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: Some(name.into()),
            ty,
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.ty.fmt_prec(f, 0)?;
        if let Some(name) = &self.name {
            write!(f, " {}", name)?;
        }
        Ok(())
    }
}

/// Ordered parameter groups plus the return type of one function shape.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FunctionType {
    pub required_positionals: Vec<Param>,
    pub optional_positionals: Vec<Param>,
    pub rest_positional: Option<Param>,
    pub trailing_positionals: Vec<Param>,
    pub required_keywords: Vec<(String, Param)>,
    pub optional_keywords: Vec<(String, Param)>,
    pub rest_keywords: Option<Param>,
    pub return_type: Type,
}

impl FunctionType {
    pub fn empty(return_type: Type) -> Self {
        Self {
            required_positionals: Vec::new(),
            optional_positionals: Vec::new(),
            rest_positional: None,
            trailing_positionals: Vec::new(),
            required_keywords: Vec::new(),
            optional_keywords: Vec::new(),
            rest_keywords: None,
            return_type,
        }
    }

    pub fn each_param(&self, f: &mut impl FnMut(&Param)) {
        for param in &self.required_positionals {
            f(param);
        }
        for param in &self.optional_positionals {
            f(param);
        }
        if let Some(param) = &self.rest_positional {
            f(param);
        }
        for param in &self.trailing_positionals {
            f(param);
        }
        for (_, param) in &self.required_keywords {
            f(param);
        }
        for (_, param) in &self.optional_keywords {
            f(param);
        }
        if let Some(param) = &self.rest_keywords {
            f(param);
        }
    }

    pub fn each_type(&self, f: &mut impl FnMut(&Type)) {
        self.each_param(&mut |param| param.ty.each_type(f));
        self.return_type.each_type(f);
    }

    pub fn map_type_name<E, F>(&self, f: &mut F) -> Result<FunctionType, E>
    where
        F: FnMut(&TypeName) -> Result<TypeName, E>,
    {
        let map_param = |param: &Param, f: &mut F| -> Result<Param, E> {
            Ok(Param {
                name: param.name.clone(),
                ty: param.ty.map_type_name(f)?,
            })
        };
        let map_params = |params: &[Param], f: &mut F| -> Result<Vec<Param>, E> {
            params.iter().map(|p| map_param(p, f)).collect()
        };
        let map_keywords =
            |keywords: &[(String, Param)], f: &mut F| -> Result<Vec<(String, Param)>, E> {
                keywords
                    .iter()
                    .map(|(name, p)| Ok((name.clone(), map_param(p, f)?)))
                    .collect()
            };
        Ok(FunctionType {
            required_positionals: map_params(&self.required_positionals, f)?,
            optional_positionals: map_params(&self.optional_positionals, f)?,
            rest_positional: self
                .rest_positional
                .as_ref()
                .map(|p| map_param(p, f))
                .transpose()?,
            trailing_positionals: map_params(&self.trailing_positionals, f)?,
            required_keywords: map_keywords(&self.required_keywords, f)?,
            optional_keywords: map_keywords(&self.optional_keywords, f)?,
            rest_keywords: self
                .rest_keywords
                .as_ref()
                .map(|p| map_param(p, f))
                .transpose()?,
            return_type: self.return_type.map_type_name(f)?,
        })
    }

    pub fn substitute(&self, subst: &Substitution) -> FunctionType {
        let sub_param = |param: &Param| Param {
            name: param.name.clone(),
            ty: param.ty.substitute(subst),
        };
        FunctionType {
            required_positionals: self.required_positionals.iter().map(sub_param).collect(),
            optional_positionals: self.optional_positionals.iter().map(sub_param).collect(),
            rest_positional: self.rest_positional.as_ref().map(sub_param),
            trailing_positionals: self.trailing_positionals.iter().map(sub_param).collect(),
            required_keywords: self
                .required_keywords
                .iter()
                .map(|(name, p)| (name.clone(), sub_param(p)))
                .collect(),
            optional_keywords: self
                .optional_keywords
                .iter()
                .map(|(name, p)| (name.clone(), sub_param(p)))
                .collect(),
            rest_keywords: self.rest_keywords.as_ref().map(sub_param),
            return_type: self.return_type.substitute(subst),
        }
    }

    fn fmt_params(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        let mut first = true;
        let mut sep = |f: &mut fmt::Formatter<'_>| -> fmt::Result {
            if first {
                first = false;
                Ok(())
            } else {
                write!(f, ", ")
            }
        };
        for param in &self.required_positionals {
            sep(f)?;
            write!(f, "{}", param)?;
        }
        for param in &self.optional_positionals {
            sep(f)?;
            write!(f, "?{}", param)?;
        }
        if let Some(param) = &self.rest_positional {
            sep(f)?;
            write!(f, "*{}", param)?;
        }
        for param in &self.trailing_positionals {
            sep(f)?;
            write!(f, "{}", param)?;
        }
        for (name, param) in &self.required_keywords {
            sep(f)?;
            write!(f, "{}: {}", name, param)?;
        }
        for (name, param) in &self.optional_keywords {
            sep(f)?;
            write!(f, "?{}: {}", name, param)?;
        }
        if let Some(param) = &self.rest_keywords {
            sep(f)?;
            write!(f, "**{}", param)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_params(f)?;
        write!(f, " -> ")?;
        self.return_type.fmt_prec(f, 3)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Block {
    pub function: FunctionType,
    pub required: bool,
}

/// One overloadable method shape: type parameters, a function type and an
/// optional block spec.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MethodType {
    pub type_params: Vec<String>,
    pub function: FunctionType,
    pub block: Option<Block>,
}

impl MethodType {
    pub fn each_type(&self, f: &mut impl FnMut(&Type)) {
        self.function.each_type(f);
        if let Some(block) = &self.block {
            block.function.each_type(f);
        }
    }

    pub fn map_type_name<E, F>(&self, f: &mut F) -> Result<MethodType, E>
    where
        F: FnMut(&TypeName) -> Result<TypeName, E>,
    {
        Ok(MethodType {
            type_params: self.type_params.clone(),
            function: self.function.map_type_name(f)?,
            block: self
                .block
                .as_ref()
                .map(|b| {
                    Ok(Block {
                        function: b.function.map_type_name(f)?,
                        required: b.required,
                    })
                })
                .transpose()?,
        })
    }

    pub fn substitute(&self, subst: &Substitution) -> MethodType {
        // Method-level type parameters shadow the enclosing declaration's.
        let reduced = subst.without(&self.type_params);
        MethodType {
            type_params: self.type_params.clone(),
            function: self.function.substitute(&reduced),
            block: self.block.as_ref().map(|b| Block {
                function: b.function.substitute(&reduced),
                required: b.required,
            }),
        }
    }
}

impl fmt::Display for MethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.type_params.is_empty() {
            write!(f, "[{}] ", self.type_params.join(", "))?;
        }
        self.function.fmt_params(f)?;
        if let Some(block) = &self.block {
            if block.required {
                write!(f, " {{ {} }}", block.function)?;
            } else {
                write!(f, " ?{{ {} }}", block.function)?;
            }
        }
        write!(f, " -> ")?;
        self.function.return_type.fmt_prec(f, 3)
    }
}

#[derive(Clone, Debug, Default)]
pub struct Substitution {
    mapping: HashMap<String, Type>,
}

impl Substitution {
    pub fn new(params: &[String], args: &[Type]) -> Self {
        let mapping = params
            .iter()
            .cloned()
            .zip(args.iter().cloned())
            .collect();
        Self { mapping }
    }

    pub fn identity() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Type> {
        self.mapping.get(name)
    }

    pub fn without(&self, shadowed: &[String]) -> Substitution {
        let mapping = self
            .mapping
            .iter()
            .filter(|(name, _)| !shadowed.contains(name))
            .map(|(name, ty)| (name.clone(), ty.clone()))
            .collect();
        Substitution { mapping }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::names::TypeName;

    fn name(text: &str) -> TypeName {
        TypeName::parse(text).expect(text)
    }

    #[test]
    fn displays_union_and_optional_with_parens() {
        let union = Type::Union(vec![
            Type::instance(name("::Integer")),
            Type::instance(name("::String")),
        ]);
        assert_eq!(union.to_string(), "::Integer | ::String");
        let optional = Type::Optional(Box::new(union));
        assert_eq!(optional.to_string(), "(::Integer | ::String)?");
    }

    #[test]
    fn displays_intersection_inside_union_without_parens() {
        let ty = Type::Union(vec![
            Type::Intersection(vec![
                Type::instance(name("::A")),
                Type::instance(name("::B")),
            ]),
            Type::Nil,
        ]);
        assert_eq!(ty.to_string(), "::A & ::B | nil");
    }

    #[test]
    fn substitutes_type_variables() {
        let subst = Substitution::new(
            &["A".to_string()],
            &[Type::instance(name("::Integer"))],
        );
        let ty = Type::ClassInstance {
            name: name("::Array"),
            args: vec![Type::Var("A".to_string())],
        };
        assert_eq!(
            ty.substitute(&subst).to_string(),
            "::Array[::Integer]"
        );
    }

    #[test]
    fn method_type_params_shadow_substitution() {
        let subst = Substitution::new(
            &["A".to_string()],
            &[Type::instance(name("::Integer"))],
        );
        let method = MethodType {
            type_params: vec!["A".to_string()],
            function: FunctionType::empty(Type::Var("A".to_string())),
            block: None,
        };
        let substituted = method.substitute(&subst);
        assert_eq!(substituted.function.return_type, Type::Var("A".to_string()));
    }

    #[test]
    fn method_type_display_includes_block() {
        let method = MethodType {
            type_params: vec!["X".to_string()],
            function: FunctionType::empty(Type::instance(name("::Integer"))),
            block: Some(Block {
                function: FunctionType {
                    required_positionals: vec![Param::new(Type::Var("A".to_string()))],
                    ..FunctionType::empty(Type::Var("X".to_string()))
                },
                required: true,
            }),
        };
        assert_eq!(method.to_string(), "[X] () { (A) -> X } -> ::Integer");
    }
}

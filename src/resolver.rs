use crate::environment::{BufferId, Environment, Location};
use crate::language::{
    ast::*,
    names::{NameKind, Namespace, TypeName},
    span::Span,
    types::{MethodType, Type},
};
use thiserror::Error;

#[derive(Clone, Debug, Error)]
#[error("cannot find type `{name}`")]
pub struct NoTypeFoundError {
    pub name: TypeName,
    pub location: Option<Location>,
}

impl NoTypeFoundError {
    fn new(name: &TypeName) -> Self {
        Self {
            name: name.clone(),
            location: None,
        }
    }

    fn at(mut self, buffer: BufferId, span: Span) -> Self {
        if self.location.is_none() {
            self.location = Some(Location { buffer, span });
        }
        self
    }
}

/// Resolves relative type references to absolute names by walking the
/// lexical context innermost-out. The syntactic kind of a name picks the
/// bucket it may resolve into.
pub struct TypeNameResolver<'a> {
    env: &'a Environment,
}

impl<'a> TypeNameResolver<'a> {
    pub fn new(env: &'a Environment) -> Self {
        Self { env }
    }

    pub fn resolve(
        &self,
        name: &TypeName,
        context: &Namespace,
    ) -> Result<TypeName, NoTypeFoundError> {
        if name.is_absolute() {
            if self.exists(name) {
                return Ok(name.clone());
            }
            return Err(NoTypeFoundError::new(name));
        }
        for namespace in context.ascend() {
            let candidate = name.absolute_in(&namespace);
            if self.exists(&candidate) {
                return Ok(candidate);
            }
        }
        Err(NoTypeFoundError::new(name))
    }

    fn exists(&self, name: &TypeName) -> bool {
        match name.kind() {
            NameKind::Class => self.env.has_class(name),
            NameKind::Interface => self.env.has_interface(name),
            NameKind::Alias => self.env.has_alias(name),
        }
    }
}

impl Environment {
    /// Rewrites every declaration to carry absolute type names only and
    /// returns the resolved environment. Resolving a resolved environment
    /// reproduces it.
    pub fn resolve_type_names(&self) -> Result<Environment, Vec<NoTypeFoundError>> {
        let resolver = TypeNameResolver::new(self);
        let mut out = Environment::new();
        self.clone_buffers_into(&mut out);
        let mut errors = Vec::new();
        let root = Namespace::root();
        for (buffer, decl) in self.declarations() {
            match resolve_declaration(&resolver, decl, &root, *buffer) {
                Ok(resolved) => {
                    // Structural checks already passed on the way in.
                    out.add(*buffer, std::slice::from_ref(&resolved));
                }
                Err(err) => errors.push(err),
            }
        }
        if errors.is_empty() { Ok(out) } else { Err(errors) }
    }
}

fn resolve_declaration(
    resolver: &TypeNameResolver<'_>,
    decl: &Declaration,
    context: &Namespace,
    buffer: BufferId,
) -> Result<Declaration, NoTypeFoundError> {
    match decl {
        Declaration::Class(class) => {
            let name = class.name.absolute_in(context);
            let inner = name.to_namespace();
            let superclass = class
                .superclass
                .as_ref()
                .map(|sup| {
                    Ok(Superclass {
                        name: resolver
                            .resolve(&sup.name, context)
                            .map_err(|e| e.at(buffer, class.span))?,
                        args: resolve_types(resolver, &sup.args, context, buffer, class.span)?,
                    })
                })
                .transpose()?;
            Ok(Declaration::Class(ClassDecl {
                name,
                type_params: class.type_params.clone(),
                superclass,
                members: resolve_members(resolver, &class.members, &inner, buffer)?,
                annotations: class.annotations.clone(),
                span: class.span,
            }))
        }
        Declaration::Module(module) => {
            let name = module.name.absolute_in(context);
            let inner = name.to_namespace();
            Ok(Declaration::Module(ModuleDecl {
                name,
                type_params: module.type_params.clone(),
                self_types: resolve_types(resolver, &module.self_types, &inner, buffer, module.span)?,
                members: resolve_members(resolver, &module.members, &inner, buffer)?,
                annotations: module.annotations.clone(),
                span: module.span,
            }))
        }
        Declaration::Interface(interface) => {
            let name = interface.name.absolute_in(context);
            let inner = name.to_namespace();
            Ok(Declaration::Interface(InterfaceDecl {
                name,
                type_params: interface.type_params.clone(),
                members: resolve_members(resolver, &interface.members, &inner, buffer)?,
                annotations: interface.annotations.clone(),
                span: interface.span,
            }))
        }
        Declaration::Constant(constant) => {
            let name = constant.name.absolute_in(context);
            let ty_context = name.namespace.clone();
            Ok(Declaration::Constant(ConstantDecl {
                ty: resolve_type(resolver, &constant.ty, &ty_context, buffer, constant.span)?,
                name,
                annotations: constant.annotations.clone(),
                span: constant.span,
            }))
        }
        Declaration::Global(global) => Ok(Declaration::Global(GlobalDecl {
            name: global.name.clone(),
            ty: resolve_type(resolver, &global.ty, context, buffer, global.span)?,
            annotations: global.annotations.clone(),
            span: global.span,
        })),
        Declaration::Alias(alias) => {
            let name = alias.name.absolute_in(context);
            let ty_context = name.namespace.clone();
            Ok(Declaration::Alias(AliasDecl {
                ty: resolve_type(resolver, &alias.ty, &ty_context, buffer, alias.span)?,
                name,
                annotations: alias.annotations.clone(),
                span: alias.span,
            }))
        }
        Declaration::Extension(extension) => {
            // The target must reference an existing class or module.
            let name = resolver
                .resolve(&extension.name, context)
                .map_err(|e| e.at(buffer, extension.span))?;
            let inner = name.to_namespace();
            Ok(Declaration::Extension(ExtensionDecl {
                name,
                type_params: extension.type_params.clone(),
                extension_name: extension.extension_name.clone(),
                members: resolve_members(resolver, &extension.members, &inner, buffer)?,
                annotations: extension.annotations.clone(),
                span: extension.span,
            }))
        }
    }
}

fn resolve_members(
    resolver: &TypeNameResolver<'_>,
    members: &[Member],
    context: &Namespace,
    buffer: BufferId,
) -> Result<Vec<Member>, NoTypeFoundError> {
    members
        .iter()
        .map(|member| resolve_member(resolver, member, context, buffer))
        .collect()
}

fn resolve_member(
    resolver: &TypeNameResolver<'_>,
    member: &Member,
    context: &Namespace,
    buffer: BufferId,
) -> Result<Member, NoTypeFoundError> {
    let span = member.span();
    match member {
        Member::Method(method) => {
            let overloads = method
                .overloads
                .iter()
                .map(|overload| match overload {
                    Overload::Super => Ok(Overload::Super),
                    Overload::MethodType(method_type) => Ok(Overload::MethodType(
                        resolve_method_type(resolver, method_type, context, buffer, span)?,
                    )),
                })
                .collect::<Result<Vec<_>, NoTypeFoundError>>()?;
            Ok(Member::Method(MethodDefinition {
                name: method.name.clone(),
                kind: method.kind,
                overloads,
                annotations: method.annotations.clone(),
                span: method.span,
            }))
        }
        Member::Include(mixin) => Ok(Member::Include(resolve_mixin(
            resolver, mixin, context, buffer,
        )?)),
        Member::Extend(mixin) => Ok(Member::Extend(resolve_mixin(
            resolver, mixin, context, buffer,
        )?)),
        Member::Prepend(mixin) => Ok(Member::Prepend(resolve_mixin(
            resolver, mixin, context, buffer,
        )?)),
        Member::Attribute(attr) => Ok(Member::Attribute(AttributeDefinition {
            name: attr.name.clone(),
            kind: attr.kind,
            ivar: attr.ivar.clone(),
            ty: resolve_type(resolver, &attr.ty, context, buffer, span)?,
            annotations: attr.annotations.clone(),
            span: attr.span,
        })),
        Member::InstanceVariable(var) => Ok(Member::InstanceVariable(resolve_variable(
            resolver, var, context, buffer,
        )?)),
        Member::ClassInstanceVariable(var) => Ok(Member::ClassInstanceVariable(resolve_variable(
            resolver, var, context, buffer,
        )?)),
        Member::ClassVariable(var) => Ok(Member::ClassVariable(resolve_variable(
            resolver, var, context, buffer,
        )?)),
        Member::Alias(_) | Member::Public(_) | Member::Private(_) => Ok(member.clone()),
        Member::Decl(decl) => Ok(Member::Decl(resolve_declaration(
            resolver, decl, context, buffer,
        )?)),
    }
}

fn resolve_mixin(
    resolver: &TypeNameResolver<'_>,
    mixin: &Mixin,
    context: &Namespace,
    buffer: BufferId,
) -> Result<Mixin, NoTypeFoundError> {
    Ok(Mixin {
        name: resolver
            .resolve(&mixin.name, context)
            .map_err(|e| e.at(buffer, mixin.span))?,
        args: resolve_types(resolver, &mixin.args, context, buffer, mixin.span)?,
        annotations: mixin.annotations.clone(),
        span: mixin.span,
    })
}

fn resolve_variable(
    resolver: &TypeNameResolver<'_>,
    var: &VariableDefinition,
    context: &Namespace,
    buffer: BufferId,
) -> Result<VariableDefinition, NoTypeFoundError> {
    Ok(VariableDefinition {
        name: var.name.clone(),
        ty: resolve_type(resolver, &var.ty, context, buffer, var.span)?,
        span: var.span,
    })
}

fn resolve_method_type(
    resolver: &TypeNameResolver<'_>,
    method_type: &MethodType,
    context: &Namespace,
    buffer: BufferId,
    span: Span,
) -> Result<MethodType, NoTypeFoundError> {
    method_type
        .map_type_name(&mut |name| resolver.resolve(name, context))
        .map_err(|e| e.at(buffer, span))
}

fn resolve_type(
    resolver: &TypeNameResolver<'_>,
    ty: &Type,
    context: &Namespace,
    buffer: BufferId,
    span: Span,
) -> Result<Type, NoTypeFoundError> {
    ty.map_type_name(&mut |name| resolver.resolve(name, context))
        .map_err(|e| e.at(buffer, span))
}

fn resolve_types(
    resolver: &TypeNameResolver<'_>,
    types: &[Type],
    context: &Namespace,
    buffer: BufferId,
    span: Span,
) -> Result<Vec<Type>, NoTypeFoundError> {
    types
        .iter()
        .map(|ty| resolve_type(resolver, ty, context, buffer, span))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::parser::parse_signature;

    fn build_env(source: &str) -> Environment {
        let decls = parse_signature(source).expect("parse");
        let mut env = Environment::new();
        let buffer = env.add_buffer("test.sig", source);
        let errors = env.add(buffer, &decls);
        assert!(errors.is_empty(), "environment errors: {:?}", errors);
        env
    }

    fn name(text: &str) -> TypeName {
        TypeName::parse(text).expect(text)
    }

    #[test]
    fn resolves_relative_names_innermost_first() {
        let env = build_env(
            "class String end
             module A
               class String end
               class B
                 def name: -> String
               end
             end",
        );
        let resolved = env.resolve_type_names().expect("resolve");
        let entry = resolved.class_entry(&name("::A::B")).expect("entry");
        let crate::environment::ClassEntry::Class(data) = entry else {
            panic!("expected class");
        };
        let Member::Method(method) = &data.fragments[0].decl.members[0] else {
            panic!("expected method");
        };
        let Overload::MethodType(method_type) = &method.overloads[0] else {
            panic!("expected method type");
        };
        assert_eq!(
            method_type.function.return_type.to_string(),
            "::A::String"
        );
    }

    #[test]
    fn absolute_references_are_verified_only() {
        let env = build_env(
            "class String end
             class C
               def name: -> ::Missing
             end",
        );
        let errors = env.resolve_type_names().expect_err("should fail");
        assert_eq!(errors[0].name.to_string(), "::Missing");
        assert!(errors[0].location.is_some());
    }

    #[test]
    fn interface_references_resolve_in_interface_bucket() {
        let env = build_env(
            "interface _Each end
             class C
               include _Each
             end",
        );
        let resolved = env.resolve_type_names().expect("resolve");
        let entry = resolved.class_entry(&name("::C")).expect("entry");
        let crate::environment::ClassEntry::Class(data) = entry else {
            panic!("expected class");
        };
        let Member::Include(include) = &data.fragments[0].decl.members[0] else {
            panic!("expected include");
        };
        assert_eq!(include.name.to_string(), "::_Each");
    }

    #[test]
    fn class_reference_does_not_resolve_to_interface() {
        let env = build_env(
            "interface _Each end
             class C
               def each: -> Each
             end",
        );
        let errors = env.resolve_type_names().expect_err("should fail");
        assert_eq!(errors[0].name.to_string(), "Each");
    }

    #[test]
    fn resolution_is_idempotent() {
        let env = build_env(
            "class Integer end
             module A
               type id = Integer
               class B
                 def b: (id) -> A::B
               end
             end",
        );
        let once = env.resolve_type_names().expect("first resolve");
        let twice = once.resolve_type_names().expect("second resolve");
        let first: Vec<_> = once.declarations().to_vec();
        let second: Vec<_> = twice.declarations().to_vec();
        assert_eq!(first.len(), second.len());
        for ((_, a), (_, b)) in first.iter().zip(second.iter()) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn extension_target_resolves_through_context() {
        let env = build_env(
            "module A
               class C end
               extension C (Pretty)
                 def pretty: -> C
               end
             end",
        );
        let resolved = env.resolve_type_names().expect("resolve");
        assert_eq!(resolved.extensions_of(&name("::A::C")).len(), 1);
    }
}

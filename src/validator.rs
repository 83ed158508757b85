use crate::builder::{DefinitionBuilder, DefinitionError};
use crate::environment::{ClassEntry, Environment, Location};
use crate::language::{
    ast::*,
    names::TypeName,
    types::Type,
};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Clone, Debug, Error)]
pub enum ValidationError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error("cannot find type `{name}`")]
    NoTypeFound {
        name: TypeName,
        location: Option<Location>,
    },
    #[error("wrong number of type arguments for `{name}`: expected {expected}, got {actual}")]
    InvalidTypeApplication {
        name: TypeName,
        expected: usize,
        actual: usize,
        location: Option<Location>,
    },
    #[error("self type `{ty}` of `{name}` must be a class or interface type")]
    InvalidSelfType {
        name: TypeName,
        ty: Type,
        location: Option<Location>,
    },
    #[error("type alias `{name}` is recursive")]
    RecursiveAliasDefinition {
        name: TypeName,
        location: Option<Location>,
    },
}

impl ValidationError {
    pub fn location(&self) -> Option<Location> {
        match self {
            ValidationError::Definition(err) => err.location(),
            ValidationError::NoTypeFound { location, .. }
            | ValidationError::InvalidTypeApplication { location, .. }
            | ValidationError::InvalidSelfType { location, .. }
            | ValidationError::RecursiveAliasDefinition { location, .. } => *location,
        }
    }
}

/// Sweeps every type reference in the environment: name resolution,
/// application arity, module self-type shape and alias recursion. Builds
/// every class and module definition so builder errors surface too.
pub struct Validator {
    builder: DefinitionBuilder,
}

impl Validator {
    pub fn new(builder: DefinitionBuilder) -> Self {
        Self { builder }
    }

    pub fn into_builder(self) -> DefinitionBuilder {
        self.builder
    }

    pub fn validate(&mut self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        let class_names: Vec<TypeName> = self
            .builder
            .env()
            .class_entries()
            .map(|entry| entry.name().clone())
            .collect();
        for name in &class_names {
            if let Err(err) = self.builder.build_instance(name) {
                errors.push(err.into());
            }
            if let Err(err) = self.builder.build_singleton(name) {
                errors.push(err.into());
            }
        }

        let env = self.builder.env();
        for entry in env.class_entries() {
            match entry {
                ClassEntry::Class(data) => {
                    for fragment in &data.fragments {
                        let location = fragment.location(fragment.decl.span);
                        if let Some(superclass) = &fragment.decl.superclass {
                            check_application(
                                env,
                                &superclass.name,
                                &superclass.args,
                                location,
                                &mut errors,
                            );
                            for arg in &superclass.args {
                                check_type(env, arg, location, &mut errors);
                            }
                        }
                        check_members(env, &data.name, &fragment.decl.members, fragment, &mut errors);
                    }
                }
                ClassEntry::Module(data) => {
                    for fragment in &data.fragments {
                        let location = fragment.location(fragment.decl.span);
                        for self_type in &fragment.decl.self_types {
                            if !matches!(
                                self_type,
                                Type::ClassInstance { .. } | Type::Interface { .. }
                            ) {
                                errors.push(ValidationError::InvalidSelfType {
                                    name: data.name.clone(),
                                    ty: self_type.clone(),
                                    location: Some(location),
                                });
                            }
                            check_type(env, self_type, location, &mut errors);
                        }
                        check_members(env, &data.name, &fragment.decl.members, fragment, &mut errors);
                    }
                }
            }
        }

        for (name, fragments) in env.extension_entries() {
            for fragment in fragments {
                check_members(env, name, &fragment.decl.members, fragment, &mut errors);
            }
        }

        for fragment in env.interface_entries() {
            check_members(
                env,
                &fragment.decl.name,
                &fragment.decl.members,
                fragment,
                &mut errors,
            );
        }

        for (name, fragment) in env.alias_entries() {
            let location = fragment.location(fragment.decl.span);
            check_type(env, &fragment.decl.ty, location, &mut errors);
            if alias_reaches_itself(env, name, &fragment.decl.ty) {
                errors.push(ValidationError::RecursiveAliasDefinition {
                    name: name.clone(),
                    location: Some(location),
                });
            }
        }

        for (_, fragment) in env.constant_entries() {
            let location = fragment.location(fragment.decl.span);
            check_type(env, &fragment.decl.ty, location, &mut errors);
        }

        for (_, fragment) in env.global_entries() {
            let location = fragment.location(fragment.decl.span);
            check_type(env, &fragment.decl.ty, location, &mut errors);
        }

        errors
    }
}

fn check_members<T>(
    env: &Environment,
    _owner: &TypeName,
    members: &[Member],
    fragment: &crate::environment::Fragment<T>,
    errors: &mut Vec<ValidationError>,
) {
    for member in members {
        let location = fragment.location(member.span());
        match member {
            Member::Method(method) => {
                for overload in &method.overloads {
                    if let Overload::MethodType(method_type) = overload {
                        method_type.each_type(&mut |ty| {
                            check_type_shallow(env, ty, location, errors);
                        });
                    }
                }
            }
            Member::Include(mixin) | Member::Extend(mixin) | Member::Prepend(mixin) => {
                check_application(env, &mixin.name, &mixin.args, location, errors);
                for arg in &mixin.args {
                    check_type(env, arg, location, errors);
                }
            }
            Member::Attribute(attr) => check_type(env, &attr.ty, location, errors),
            Member::InstanceVariable(var)
            | Member::ClassInstanceVariable(var)
            | Member::ClassVariable(var) => check_type(env, &var.ty, location, errors),
            Member::Alias(_) | Member::Public(_) | Member::Private(_) => {}
            // Nested declarations are validated through their own entries.
            Member::Decl(_) => {}
        }
    }
}

fn check_type(
    env: &Environment,
    ty: &Type,
    location: Location,
    errors: &mut Vec<ValidationError>,
) {
    ty.each_type(&mut |inner| check_type_shallow(env, inner, location, errors));
}

// each_type already recurses, so only the node itself is checked here.
fn check_type_shallow(
    env: &Environment,
    ty: &Type,
    location: Location,
    errors: &mut Vec<ValidationError>,
) {
    match ty {
        Type::ClassInstance { name, args } => {
            check_application(env, name, args, location, errors);
        }
        Type::Interface { name, args } => {
            if !env.has_interface(name) {
                errors.push(ValidationError::NoTypeFound {
                    name: name.clone(),
                    location: Some(location),
                });
            } else {
                check_arity(env, name, args.len(), location, errors);
            }
        }
        Type::ClassSingleton { name } => {
            if !env.has_class(name) {
                errors.push(ValidationError::NoTypeFound {
                    name: name.clone(),
                    location: Some(location),
                });
            }
        }
        Type::Alias { name } => {
            if !env.has_alias(name) {
                errors.push(ValidationError::NoTypeFound {
                    name: name.clone(),
                    location: Some(location),
                });
            }
        }
        _ => {}
    }
}

fn check_application(
    env: &Environment,
    name: &TypeName,
    args: &[Type],
    location: Location,
    errors: &mut Vec<ValidationError>,
) {
    let exists = match name.kind() {
        crate::language::names::NameKind::Interface => env.has_interface(name),
        _ => env.has_class(name),
    };
    if !exists {
        errors.push(ValidationError::NoTypeFound {
            name: name.clone(),
            location: Some(location),
        });
        return;
    }
    check_arity(env, name, args.len(), location, errors);
}

fn check_arity(
    env: &Environment,
    name: &TypeName,
    actual: usize,
    location: Location,
    errors: &mut Vec<ValidationError>,
) {
    if let Some(expected) = env.type_param_count(name) {
        if expected != actual {
            errors.push(ValidationError::InvalidTypeApplication {
                name: name.clone(),
                expected,
                actual,
                location: Some(location),
            });
        }
    }
}

fn alias_reaches_itself(env: &Environment, name: &TypeName, body: &Type) -> bool {
    let mut visited = HashSet::new();
    visited.insert(name.clone());
    let mut stack = alias_references(body);
    while let Some(next) = stack.pop() {
        if &next == name {
            return true;
        }
        if !visited.insert(next.clone()) {
            continue;
        }
        if let Some(fragment) = env.alias_entry(&next) {
            stack.extend(alias_references(&fragment.decl.ty));
        }
    }
    false
}

fn alias_references(ty: &Type) -> Vec<TypeName> {
    let mut names = Vec::new();
    ty.each_type(&mut |inner| {
        if let Type::Alias { name } = inner {
            names.push(name.clone());
        }
    });
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::parser::parse_signature;

    const PRELUDE: &str = "
        class BasicObject end
        class Object < BasicObject end
        class Module < Object end
        class Class < Module end
        class Integer end
        class String end
    ";

    fn validate(source: &str) -> Vec<ValidationError> {
        let text = format!("{}\n{}", PRELUDE, source);
        let decls = parse_signature(&text).expect("parse");
        let mut env = Environment::new();
        let buffer = env.add_buffer("test.sig", text.clone());
        let errors = env.add(buffer, &decls);
        assert!(errors.is_empty(), "environment errors: {:?}", errors);
        let env = env.resolve_type_names().expect("resolve");
        Validator::new(DefinitionBuilder::new(env)).validate()
    }

    #[test]
    fn clean_environment_validates() {
        let errors = validate(
            "class Box[A]
               def get: -> A
             end
             class User
               def box: -> Box[Integer]
             end",
        );
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    }

    #[test]
    fn wrong_application_arity_is_reported() {
        let errors = validate(
            "class Box[A] end
             class User
               def box: -> Box[Integer, String]
             end",
        );
        assert!(matches!(
            errors.as_slice(),
            [ValidationError::InvalidTypeApplication {
                expected: 1,
                actual: 2,
                ..
            }]
        ));
    }

    #[test]
    fn interface_arity_is_checked() {
        let errors = validate(
            "interface _Each[A]
               def each: { (A) -> void } -> void
             end
             class C
               include _Each
             end",
        );
        assert!(matches!(
            errors.as_slice(),
            [ValidationError::InvalidTypeApplication { .. }]
        ));
    }

    #[test]
    fn module_self_type_must_be_class_or_interface() {
        let errors = validate("module M : Integer? end");
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidSelfType { .. })));
    }

    #[test]
    fn recursive_alias_is_reported() {
        let errors = validate(
            "type a = b
             type b = a",
        );
        let recursive = errors
            .iter()
            .filter(|e| matches!(e, ValidationError::RecursiveAliasDefinition { .. }))
            .count();
        assert_eq!(recursive, 2);
    }

    #[test]
    fn alias_recursion_through_applications_is_reported() {
        let errors = validate(
            "class Array[A] end
             type tree = Array[tree]",
        );
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::RecursiveAliasDefinition { .. })));
    }

    #[test]
    fn recursive_superclasses_surface_through_validation() {
        let errors = validate(
            "class A < B end
             class B < A end",
        );
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::Definition(
                DefinitionError::RecursiveAncestor { .. }
            ))));
    }
}

use crate::language::{
    ast::{
        AliasDecl, ClassDecl, ConstantDecl, Declaration, ExtensionDecl, GlobalDecl, InterfaceDecl,
        Member, ModuleDecl, Superclass,
    },
    names::{Namespace, TypeName},
    span::Span,
};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferId(pub usize);

#[derive(Clone, Debug)]
pub struct SourceBuffer {
    pub name: String,
    pub source: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Location {
    pub buffer: BufferId,
    pub span: Span,
}

/// One open piece of a declaration, with the lexical namespace it appeared
/// in and the buffer it was parsed from.
#[derive(Clone, Debug)]
pub struct Fragment<T> {
    pub namespace: Namespace,
    pub buffer: BufferId,
    pub decl: T,
}

impl<T> Fragment<T> {
    pub fn location(&self, span: Span) -> Location {
        Location {
            buffer: self.buffer,
            span,
        }
    }
}

#[derive(Clone, Debug)]
pub enum ClassEntry {
    Class(ClassData),
    Module(ModuleData),
}

#[derive(Clone, Debug)]
pub struct ClassData {
    pub name: TypeName,
    pub fragments: Vec<Fragment<ClassDecl>>,
}

#[derive(Clone, Debug)]
pub struct ModuleData {
    pub name: TypeName,
    pub fragments: Vec<Fragment<ModuleDecl>>,
}

impl ClassEntry {
    pub fn name(&self) -> &TypeName {
        match self {
            ClassEntry::Class(data) => &data.name,
            ClassEntry::Module(data) => &data.name,
        }
    }

    pub fn is_class(&self) -> bool {
        matches!(self, ClassEntry::Class(_))
    }

    pub fn type_params(&self) -> &[String] {
        match self {
            ClassEntry::Class(data) => data
                .fragments
                .first()
                .map(|f| f.decl.type_params.as_slice())
                .unwrap_or(&[]),
            ClassEntry::Module(data) => data
                .fragments
                .first()
                .map(|f| f.decl.type_params.as_slice())
                .unwrap_or(&[]),
        }
    }

    /// The explicit superclass, taken from the first fragment that wrote one.
    pub fn superclass(&self) -> Option<&Superclass> {
        match self {
            ClassEntry::Class(data) => data
                .fragments
                .iter()
                .find_map(|f| f.decl.superclass.as_ref()),
            ClassEntry::Module(_) => None,
        }
    }
}

#[derive(Clone, Debug, Error)]
pub enum EnvironmentError {
    #[error("duplicate declaration of `{name}`")]
    DuplicateDeclaration { name: TypeName, location: Location },
    #[error("duplicate declaration of global `{name}`")]
    DuplicateGlobal { name: String, location: Location },
    #[error("superclass of `{name}` conflicts with an earlier declaration")]
    SuperclassMismatch { name: TypeName, location: Location },
    #[error("generic parameters of `{name}` do not match an earlier declaration")]
    GenericParameterMismatch { name: TypeName, location: Location },
}

impl EnvironmentError {
    pub fn location(&self) -> Location {
        match self {
            EnvironmentError::DuplicateDeclaration { location, .. }
            | EnvironmentError::DuplicateGlobal { location, .. }
            | EnvironmentError::SuperclassMismatch { location, .. }
            | EnvironmentError::GenericParameterMismatch { location, .. } => *location,
        }
    }
}

/// Index of all declarations by absolute name, grouped by kind. Open
/// classes accumulate fragments; extensions accumulate under the name they
/// reopen.
#[derive(Clone, Debug, Default)]
pub struct Environment {
    buffers: Vec<SourceBuffer>,
    declarations: Vec<(BufferId, Declaration)>,
    class_decls: HashMap<TypeName, ClassEntry>,
    extension_decls: HashMap<TypeName, Vec<Fragment<ExtensionDecl>>>,
    interface_decls: HashMap<TypeName, Fragment<InterfaceDecl>>,
    alias_decls: HashMap<TypeName, Fragment<AliasDecl>>,
    constant_decls: HashMap<TypeName, Fragment<ConstantDecl>>,
    global_decls: HashMap<String, Fragment<GlobalDecl>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_buffer(&mut self, name: impl Into<String>, source: impl Into<String>) -> BufferId {
        self.buffers.push(SourceBuffer {
            name: name.into(),
            source: source.into(),
        });
        BufferId(self.buffers.len() - 1)
    }

    pub fn buffer(&self, id: BufferId) -> Option<&SourceBuffer> {
        self.buffers.get(id.0)
    }

    pub fn buffers(&self) -> &[SourceBuffer] {
        &self.buffers
    }

    pub(crate) fn clone_buffers_into(&self, other: &mut Environment) {
        other.buffers = self.buffers.clone();
    }

    /// Inserts top-level declarations parsed from `buffer`, returning the
    /// structural errors encountered.
    pub fn add(&mut self, buffer: BufferId, decls: &[Declaration]) -> Vec<EnvironmentError> {
        let mut errors = Vec::new();
        let root = Namespace::root();
        for decl in decls {
            self.declarations.push((buffer, decl.clone()));
            self.insert_declaration(buffer, &root, decl, &mut errors);
        }
        errors
    }

    /// The top-level declarations in insertion order, with their buffers.
    pub fn declarations(&self) -> &[(BufferId, Declaration)] {
        &self.declarations
    }

    pub(crate) fn insert_declaration(
        &mut self,
        buffer: BufferId,
        namespace: &Namespace,
        decl: &Declaration,
        errors: &mut Vec<EnvironmentError>,
    ) {
        match decl {
            Declaration::Class(class) => {
                let name = class.name.absolute_in(namespace);
                self.insert_class(buffer, namespace, &name, class, errors);
                self.insert_nested(buffer, &name, &class.members, errors);
            }
            Declaration::Module(module) => {
                let name = module.name.absolute_in(namespace);
                self.insert_module(buffer, namespace, &name, module, errors);
                self.insert_nested(buffer, &name, &module.members, errors);
            }
            Declaration::Interface(interface) => {
                let name = interface.name.absolute_in(namespace);
                if self.interface_decls.contains_key(&name) {
                    errors.push(EnvironmentError::DuplicateDeclaration {
                        name,
                        location: Location {
                            buffer,
                            span: interface.span,
                        },
                    });
                    return;
                }
                self.interface_decls.insert(
                    name,
                    Fragment {
                        namespace: namespace.clone(),
                        buffer,
                        decl: interface.clone(),
                    },
                );
            }
            Declaration::Constant(constant) => {
                let name = constant.name.absolute_in(namespace);
                if self.constant_decls.contains_key(&name) {
                    errors.push(EnvironmentError::DuplicateDeclaration {
                        name,
                        location: Location {
                            buffer,
                            span: constant.span,
                        },
                    });
                    return;
                }
                self.constant_decls.insert(
                    name,
                    Fragment {
                        namespace: namespace.clone(),
                        buffer,
                        decl: constant.clone(),
                    },
                );
            }
            Declaration::Global(global) => {
                if self.global_decls.contains_key(&global.name) {
                    errors.push(EnvironmentError::DuplicateGlobal {
                        name: global.name.clone(),
                        location: Location {
                            buffer,
                            span: global.span,
                        },
                    });
                    return;
                }
                self.global_decls.insert(
                    global.name.clone(),
                    Fragment {
                        namespace: namespace.clone(),
                        buffer,
                        decl: global.clone(),
                    },
                );
            }
            Declaration::Alias(alias) => {
                let name = alias.name.absolute_in(namespace);
                if self.alias_decls.contains_key(&name) {
                    errors.push(EnvironmentError::DuplicateDeclaration {
                        name,
                        location: Location {
                            buffer,
                            span: alias.span,
                        },
                    });
                    return;
                }
                self.alias_decls.insert(
                    name,
                    Fragment {
                        namespace: namespace.clone(),
                        buffer,
                        decl: alias.clone(),
                    },
                );
            }
            Declaration::Extension(extension) => {
                let name = extension.name.absolute_in(namespace);
                self.extension_decls.entry(name.clone()).or_default().push(Fragment {
                    namespace: namespace.clone(),
                    buffer,
                    decl: extension.clone(),
                });
                self.insert_nested(buffer, &name, &extension.members, errors);
            }
        }
    }

    fn insert_nested(
        &mut self,
        buffer: BufferId,
        owner: &TypeName,
        members: &[Member],
        errors: &mut Vec<EnvironmentError>,
    ) {
        let namespace = owner.to_namespace();
        for member in members {
            if let Member::Decl(decl) = member {
                self.insert_declaration(buffer, &namespace, decl, errors);
            }
        }
    }

    fn insert_class(
        &mut self,
        buffer: BufferId,
        namespace: &Namespace,
        name: &TypeName,
        class: &ClassDecl,
        errors: &mut Vec<EnvironmentError>,
    ) {
        let fragment = Fragment {
            namespace: namespace.clone(),
            buffer,
            decl: class.clone(),
        };
        match self.class_decls.get_mut(name) {
            None => {
                self.class_decls.insert(
                    name.clone(),
                    ClassEntry::Class(ClassData {
                        name: name.clone(),
                        fragments: vec![fragment],
                    }),
                );
            }
            Some(ClassEntry::Class(data)) => {
                let existing_super = data.fragments.iter().find_map(|f| f.decl.superclass.as_ref());
                if let (Some(existing), Some(new)) = (existing_super, class.superclass.as_ref()) {
                    if existing != new {
                        errors.push(EnvironmentError::SuperclassMismatch {
                            name: name.clone(),
                            location: Location {
                                buffer,
                                span: class.span,
                            },
                        });
                        return;
                    }
                }
                let existing_params = data
                    .fragments
                    .first()
                    .map(|f| f.decl.type_params.len())
                    .unwrap_or(0);
                if existing_params != class.type_params.len() {
                    errors.push(EnvironmentError::GenericParameterMismatch {
                        name: name.clone(),
                        location: Location {
                            buffer,
                            span: class.span,
                        },
                    });
                    return;
                }
                data.fragments.push(fragment);
            }
            Some(ClassEntry::Module(_)) => {
                errors.push(EnvironmentError::DuplicateDeclaration {
                    name: name.clone(),
                    location: Location {
                        buffer,
                        span: class.span,
                    },
                });
            }
        }
    }

    fn insert_module(
        &mut self,
        buffer: BufferId,
        namespace: &Namespace,
        name: &TypeName,
        module: &ModuleDecl,
        errors: &mut Vec<EnvironmentError>,
    ) {
        let fragment = Fragment {
            namespace: namespace.clone(),
            buffer,
            decl: module.clone(),
        };
        match self.class_decls.get_mut(name) {
            None => {
                self.class_decls.insert(
                    name.clone(),
                    ClassEntry::Module(ModuleData {
                        name: name.clone(),
                        fragments: vec![fragment],
                    }),
                );
            }
            Some(ClassEntry::Module(data)) => {
                let existing_params = data
                    .fragments
                    .first()
                    .map(|f| f.decl.type_params.len())
                    .unwrap_or(0);
                if existing_params != module.type_params.len() {
                    errors.push(EnvironmentError::GenericParameterMismatch {
                        name: name.clone(),
                        location: Location {
                            buffer,
                            span: module.span,
                        },
                    });
                    return;
                }
                data.fragments.push(fragment);
            }
            Some(ClassEntry::Class(_)) => {
                errors.push(EnvironmentError::DuplicateDeclaration {
                    name: name.clone(),
                    location: Location {
                        buffer,
                        span: module.span,
                    },
                });
            }
        }
    }

    pub fn class_entry(&self, name: &TypeName) -> Option<&ClassEntry> {
        self.class_decls.get(name)
    }

    pub fn extensions_of(&self, name: &TypeName) -> &[Fragment<ExtensionDecl>] {
        self.extension_decls
            .get(name)
            .map(|fragments| fragments.as_slice())
            .unwrap_or(&[])
    }

    pub fn interface_entry(&self, name: &TypeName) -> Option<&Fragment<InterfaceDecl>> {
        self.interface_decls.get(name)
    }

    pub fn alias_entry(&self, name: &TypeName) -> Option<&Fragment<AliasDecl>> {
        self.alias_decls.get(name)
    }

    pub fn constant_entry(&self, name: &TypeName) -> Option<&Fragment<ConstantDecl>> {
        self.constant_decls.get(name)
    }

    pub fn global_entry(&self, name: &str) -> Option<&Fragment<GlobalDecl>> {
        self.global_decls.get(name)
    }

    pub fn class_entries(&self) -> impl Iterator<Item = &ClassEntry> {
        self.class_decls.values()
    }

    pub fn extension_entries(
        &self,
    ) -> impl Iterator<Item = (&TypeName, &Vec<Fragment<ExtensionDecl>>)> {
        self.extension_decls.iter()
    }

    pub fn interface_entries(&self) -> impl Iterator<Item = &Fragment<InterfaceDecl>> {
        self.interface_decls.values()
    }

    pub fn alias_entries(&self) -> impl Iterator<Item = (&TypeName, &Fragment<AliasDecl>)> {
        self.alias_decls.iter()
    }

    pub fn constant_entries(&self) -> impl Iterator<Item = (&TypeName, &Fragment<ConstantDecl>)> {
        self.constant_decls.iter()
    }

    pub fn global_entries(&self) -> impl Iterator<Item = (&String, &Fragment<GlobalDecl>)> {
        self.global_decls.iter()
    }

    pub fn has_class(&self, name: &TypeName) -> bool {
        self.class_decls.contains_key(name)
    }

    pub fn has_interface(&self, name: &TypeName) -> bool {
        self.interface_decls.contains_key(name)
    }

    pub fn has_alias(&self, name: &TypeName) -> bool {
        self.alias_decls.contains_key(name)
    }

    /// Declared type-parameter arity of a name, for application checking.
    /// Aliases take no arguments.
    pub fn type_param_count(&self, name: &TypeName) -> Option<usize> {
        if let Some(entry) = self.class_decls.get(name) {
            return Some(entry.type_params().len());
        }
        if let Some(fragment) = self.interface_decls.get(name) {
            return Some(fragment.decl.type_params.len());
        }
        if self.alias_decls.contains_key(name) {
            return Some(0);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::parser::parse_signature;

    fn build_env(source: &str) -> (Environment, Vec<EnvironmentError>) {
        let decls = parse_signature(source).expect("parse");
        let mut env = Environment::new();
        let buffer = env.add_buffer("test.sig", source);
        let errors = env.add(buffer, &decls);
        (env, errors)
    }

    fn name(text: &str) -> TypeName {
        TypeName::parse(text).expect(text)
    }

    #[test]
    fn merges_class_fragments_in_source_order() {
        let (env, errors) = build_env(
            "class C
               def a: -> void
             end
             class C
               def b: -> void
             end",
        );
        assert!(errors.is_empty());
        let Some(ClassEntry::Class(data)) = env.class_entry(&name("::C")) else {
            panic!("expected class entry");
        };
        assert_eq!(data.fragments.len(), 2);
    }

    #[test]
    fn nested_declarations_are_indexed_under_absolute_names() {
        let (env, errors) = build_env(
            "module A
               class B
                 VERSION: String
               end
             end",
        );
        assert!(errors.is_empty());
        assert!(env.class_entry(&name("::A")).is_some());
        assert!(env.class_entry(&name("::A::B")).is_some());
        assert!(env.constant_entry(&name("::A::B::VERSION")).is_some());
        let entry = env.constant_entry(&name("::A::B::VERSION")).unwrap();
        assert_eq!(entry.namespace.to_string(), "::A::B::");
    }

    #[test]
    fn duplicate_constant_is_an_error() {
        let (_, errors) = build_env("FOO: Integer\nFOO: String");
        assert!(matches!(
            errors.as_slice(),
            [EnvironmentError::DuplicateDeclaration { .. }]
        ));
    }

    #[test]
    fn interfaces_cannot_be_reopened() {
        let (_, errors) = build_env(
            "interface _A
               def a: -> void
             end
             interface _A
               def b: -> void
             end",
        );
        assert!(matches!(
            errors.as_slice(),
            [EnvironmentError::DuplicateDeclaration { .. }]
        ));
    }

    #[test]
    fn conflicting_superclasses_are_rejected() {
        let (_, errors) = build_env(
            "class C < Base end
             class C < Other end",
        );
        assert!(matches!(
            errors.as_slice(),
            [EnvironmentError::SuperclassMismatch { .. }]
        ));
    }

    #[test]
    fn omitted_superclass_agrees_with_explicit_one() {
        let (env, errors) = build_env(
            "class C < Base end
             class C end",
        );
        assert!(errors.is_empty());
        let entry = env.class_entry(&name("::C")).unwrap();
        assert_eq!(entry.superclass().unwrap().name.to_string(), "Base");
    }

    #[test]
    fn generic_arity_must_agree_across_fragments() {
        let (_, errors) = build_env(
            "class C[A] end
             class C end",
        );
        assert!(matches!(
            errors.as_slice(),
            [EnvironmentError::GenericParameterMismatch { .. }]
        ));
    }

    #[test]
    fn class_and_module_kinds_clash() {
        let (_, errors) = build_env(
            "class C end
             module C end",
        );
        assert!(matches!(
            errors.as_slice(),
            [EnvironmentError::DuplicateDeclaration { .. }]
        ));
    }

    #[test]
    fn extensions_accumulate_under_target_name() {
        let (env, errors) = build_env(
            "class C end
             extension C (Pathname)
               def path: -> String
             end
             extension C (Timestamps)
               def created_at: -> Integer
             end",
        );
        assert!(errors.is_empty());
        assert_eq!(env.extensions_of(&name("::C")).len(), 2);
    }
}

use crate::builder::{DefinitionBuilder, DefinitionError};
use crate::environment::{ClassEntry, Environment, Location};
use crate::language::{
    ast::Member,
    names::TypeName,
    types::{Substitution, Type},
};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

/// One node of the linearized lookup order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Ancestor {
    Instance {
        name: TypeName,
        args: Vec<Type>,
    },
    Singleton {
        name: TypeName,
    },
    ExtensionInstance {
        name: TypeName,
        extension_name: String,
        args: Vec<Type>,
    },
    ExtensionSingleton {
        name: TypeName,
        extension_name: String,
    },
}

impl Ancestor {
    pub fn name(&self) -> &TypeName {
        match self {
            Ancestor::Instance { name, .. }
            | Ancestor::Singleton { name }
            | Ancestor::ExtensionInstance { name, .. }
            | Ancestor::ExtensionSingleton { name, .. } => name,
        }
    }

    fn substitute(&self, subst: &Substitution) -> Ancestor {
        match self {
            Ancestor::Instance { name, args } => Ancestor::Instance {
                name: name.clone(),
                args: args.iter().map(|a| a.substitute(subst)).collect(),
            },
            Ancestor::ExtensionInstance {
                name,
                extension_name,
                args,
            } => Ancestor::ExtensionInstance {
                name: name.clone(),
                extension_name: extension_name.clone(),
                args: args.iter().map(|a| a.substitute(subst)).collect(),
            },
            other => other.clone(),
        }
    }

    fn key(&self) -> (u8, TypeName, Option<String>) {
        match self {
            Ancestor::Instance { name, .. } => (0, name.clone(), None),
            Ancestor::Singleton { name } => (1, name.clone(), None),
            Ancestor::ExtensionInstance {
                name,
                extension_name,
                ..
            } => (2, name.clone(), Some(extension_name.clone())),
            Ancestor::ExtensionSingleton {
                name,
                extension_name,
            } => (3, name.clone(), Some(extension_name.clone())),
        }
    }
}

impl fmt::Display for Ancestor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ancestor::Instance { name, args } => {
                write!(f, "{}", name)?;
                if !args.is_empty() {
                    let list: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                    write!(f, "[{}]", list.join(", "))?;
                }
                Ok(())
            }
            Ancestor::Singleton { name } => write!(f, "singleton({})", name),
            Ancestor::ExtensionInstance {
                name,
                extension_name,
                args,
            } => {
                write!(f, "{}", name)?;
                if !args.is_empty() {
                    let list: Vec<String> = args.iter().map(|a| a.to_string()).collect();
                    write!(f, "[{}]", list.join(", "))?;
                }
                write!(f, " ({})", extension_name)
            }
            Ancestor::ExtensionSingleton {
                name,
                extension_name,
            } => write!(f, "singleton({} ({}))", name, extension_name),
        }
    }
}

struct AncestorList {
    list: Vec<Ancestor>,
    seen: HashSet<(u8, TypeName, Option<String>)>,
}

impl AncestorList {
    fn new() -> Self {
        Self {
            list: Vec::new(),
            seen: HashSet::new(),
        }
    }

    // First occurrence wins; later duplicates are dropped.
    fn push(&mut self, ancestor: Ancestor) {
        if self.seen.insert(ancestor.key()) {
            self.list.push(ancestor);
        }
    }

    fn extend(&mut self, ancestors: &[Ancestor], subst: &Substitution) {
        for ancestor in ancestors {
            self.push(ancestor.substitute(subst));
        }
    }
}

fn identity_args(params: &[String]) -> Vec<Type> {
    params.iter().map(|p| Type::Var(p.clone())).collect()
}

fn basic_object() -> TypeName {
    TypeName::parse("::BasicObject").unwrap()
}

fn object() -> TypeName {
    TypeName::parse("::Object").unwrap()
}

fn class_type() -> TypeName {
    TypeName::parse("::Class").unwrap()
}

fn module_type() -> TypeName {
    TypeName::parse("::Module").unwrap()
}

impl DefinitionBuilder {
    pub fn instance_ancestors(
        &mut self,
        name: &TypeName,
    ) -> Result<Rc<Vec<Ancestor>>, DefinitionError> {
        if let Some(hit) = self.instance_ancestors_cache.get(name) {
            return Ok(hit.clone());
        }
        if !self.building_instance.insert(name.clone()) {
            return Err(DefinitionError::RecursiveAncestor {
                name: name.clone(),
                location: None,
            });
        }
        let computed = self.compute_instance_ancestors(name);
        self.building_instance.remove(name);
        let list = Rc::new(computed?);
        self.instance_ancestors_cache
            .insert(name.clone(), list.clone());
        Ok(list)
    }

    pub fn singleton_ancestors(
        &mut self,
        name: &TypeName,
    ) -> Result<Rc<Vec<Ancestor>>, DefinitionError> {
        if let Some(hit) = self.singleton_ancestors_cache.get(name) {
            return Ok(hit.clone());
        }
        if !self.building_singleton.insert(name.clone()) {
            return Err(DefinitionError::RecursiveAncestor {
                name: name.clone(),
                location: None,
            });
        }
        let computed = self.compute_singleton_ancestors(name);
        self.building_singleton.remove(name);
        let list = Rc::new(computed?);
        self.singleton_ancestors_cache
            .insert(name.clone(), list.clone());
        Ok(list)
    }

    fn compute_instance_ancestors(
        &mut self,
        name: &TypeName,
    ) -> Result<Vec<Ancestor>, DefinitionError> {
        if name.is_interface() {
            return self.compute_interface_ancestors(name);
        }

        let entry = self
            .env
            .class_entry(name)
            .ok_or_else(|| DefinitionError::NoTypeFound {
                name: name.clone(),
                location: None,
            })?;
        let params = entry.type_params().to_vec();
        let is_class = entry.is_class();
        let superclass = entry.superclass().cloned();
        let mixins = collect_mixins(&self.env, name);
        let args = identity_args(&params);

        let mut ancestors = AncestorList::new();

        for (mixin_name, mixin_args, location) in &mixins.prepends {
            let chain = self.mixin_ancestors(mixin_name, *location)?;
            let subst = self.mixin_substitution(mixin_name, mixin_args)?;
            ancestors.extend(&chain, &subst);
        }

        ancestors.push(Ancestor::Instance {
            name: name.clone(),
            args: args.clone(),
        });
        for fragment in self.env.extensions_of(name) {
            ancestors.push(Ancestor::ExtensionInstance {
                name: name.clone(),
                extension_name: fragment.decl.extension_name.clone(),
                args: args.clone(),
            });
        }

        for (mixin_name, mixin_args, location) in &mixins.includes {
            let chain = self.mixin_ancestors(mixin_name, *location)?;
            let subst = self.mixin_substitution(mixin_name, mixin_args)?;
            ancestors.extend(&chain, &subst);
        }

        if is_class && name != &basic_object() {
            let (super_name, super_args) = match superclass {
                Some(superclass) => (superclass.name, superclass.args),
                None if name == &object() => (basic_object(), Vec::new()),
                None => (object(), Vec::new()),
            };
            let chain = self.instance_ancestors(&super_name).map_err(|err| {
                promote_not_found(err, |name, location| DefinitionError::NoSuperclassFound {
                    name,
                    location,
                })
            })?;
            let super_params = self.mixin_params(&super_name)?;
            let subst = Substitution::new(&super_params, &super_args);
            ancestors.extend(&chain, &subst);
        }

        Ok(ancestors.list)
    }

    fn compute_interface_ancestors(
        &mut self,
        name: &TypeName,
    ) -> Result<Vec<Ancestor>, DefinitionError> {
        let fragment = self
            .env
            .interface_entry(name)
            .ok_or_else(|| DefinitionError::NoTypeFound {
                name: name.clone(),
                location: None,
            })?;
        let params = fragment.decl.type_params.clone();
        let includes: Vec<(TypeName, Vec<Type>, Location)> = fragment
            .decl
            .members
            .iter()
            .filter_map(|member| match member {
                Member::Include(mixin) => Some((
                    mixin.name.clone(),
                    mixin.args.clone(),
                    fragment.location(mixin.span),
                )),
                _ => None,
            })
            .collect();

        let mut ancestors = AncestorList::new();
        ancestors.push(Ancestor::Instance {
            name: name.clone(),
            args: identity_args(&params),
        });
        for (mixin_name, mixin_args, location) in includes {
            let chain = self.mixin_ancestors(&mixin_name, location)?;
            let subst = self.mixin_substitution(&mixin_name, &mixin_args)?;
            ancestors.extend(&chain, &subst);
        }
        Ok(ancestors.list)
    }

    fn compute_singleton_ancestors(
        &mut self,
        name: &TypeName,
    ) -> Result<Vec<Ancestor>, DefinitionError> {
        let entry = self
            .env
            .class_entry(name)
            .ok_or_else(|| DefinitionError::NoTypeFound {
                name: name.clone(),
                location: None,
            })?;
        let is_class = entry.is_class();
        let superclass = entry.superclass().cloned();
        let mixins = collect_mixins(&self.env, name);

        let mut ancestors = AncestorList::new();
        ancestors.push(Ancestor::Singleton { name: name.clone() });
        for fragment in self.env.extensions_of(name) {
            ancestors.push(Ancestor::ExtensionSingleton {
                name: name.clone(),
                extension_name: fragment.decl.extension_name.clone(),
            });
        }

        for (mixin_name, mixin_args, location) in &mixins.extends {
            let chain = self.mixin_ancestors(mixin_name, *location)?;
            let subst = self.mixin_substitution(mixin_name, mixin_args)?;
            ancestors.extend(&chain, &subst);
        }

        if is_class {
            if name == &basic_object() {
                // The root class's singleton chain continues into the
                // class-object type.
                let chain = self.instance_ancestors(&class_type())?;
                ancestors.extend(&chain, &Substitution::identity());
            } else {
                let (super_name, super_args) = match superclass {
                    Some(superclass) => (superclass.name, superclass.args),
                    None if name == &object() => (basic_object(), Vec::new()),
                    None => (object(), Vec::new()),
                };
                let chain = self.singleton_ancestors(&super_name).map_err(|err| {
                    promote_not_found(err, |name, location| DefinitionError::NoSuperclassFound {
                        name,
                        location,
                    })
                })?;
                let super_params = self.mixin_params(&super_name)?;
                let subst = Substitution::new(&super_params, &super_args);
                ancestors.extend(&chain, &subst);
            }
        } else {
            let chain = self.instance_ancestors(&module_type())?;
            ancestors.extend(&chain, &Substitution::identity());
        }

        Ok(ancestors.list)
    }

    fn mixin_ancestors(
        &mut self,
        name: &TypeName,
        location: Location,
    ) -> Result<Rc<Vec<Ancestor>>, DefinitionError> {
        self.instance_ancestors(name).map_err(|err| match err {
            DefinitionError::NoTypeFound { name, .. } => DefinitionError::NoMixinFound {
                name,
                location: Some(location),
            },
            other => other,
        })
    }

    fn mixin_params(&self, name: &TypeName) -> Result<Vec<String>, DefinitionError> {
        if let Some(entry) = self.env.class_entry(name) {
            return Ok(entry.type_params().to_vec());
        }
        if let Some(fragment) = self.env.interface_entry(name) {
            return Ok(fragment.decl.type_params.clone());
        }
        Err(DefinitionError::NoTypeFound {
            name: name.clone(),
            location: None,
        })
    }

    fn mixin_substitution(
        &self,
        name: &TypeName,
        args: &[Type],
    ) -> Result<Substitution, DefinitionError> {
        Ok(Substitution::new(&self.mixin_params(name)?, args))
    }
}

struct Mixins {
    prepends: Vec<(TypeName, Vec<Type>, Location)>,
    includes: Vec<(TypeName, Vec<Type>, Location)>,
    extends: Vec<(TypeName, Vec<Type>, Location)>,
}

fn collect_mixins(env: &Environment, name: &TypeName) -> Mixins {
    let mut mixins = Mixins {
        prepends: Vec::new(),
        includes: Vec::new(),
        extends: Vec::new(),
    };
    let Some(entry) = env.class_entry(name) else {
        return mixins;
    };
    match entry {
        ClassEntry::Class(data) => {
            for fragment in &data.fragments {
                collect_fragment_mixins(&fragment.decl.members, fragment.buffer, &mut mixins);
            }
        }
        ClassEntry::Module(data) => {
            for fragment in &data.fragments {
                collect_fragment_mixins(&fragment.decl.members, fragment.buffer, &mut mixins);
            }
        }
    }
    mixins
}

fn collect_fragment_mixins(
    members: &[Member],
    buffer: crate::environment::BufferId,
    mixins: &mut Mixins,
) {
    for member in members {
        match member {
            Member::Prepend(mixin) => mixins.prepends.push((
                mixin.name.clone(),
                mixin.args.clone(),
                Location {
                    buffer,
                    span: mixin.span,
                },
            )),
            Member::Include(mixin) => mixins.includes.push((
                mixin.name.clone(),
                mixin.args.clone(),
                Location {
                    buffer,
                    span: mixin.span,
                },
            )),
            Member::Extend(mixin) => mixins.extends.push((
                mixin.name.clone(),
                mixin.args.clone(),
                Location {
                    buffer,
                    span: mixin.span,
                },
            )),
            _ => {}
        }
    }
}

fn promote_not_found(
    err: DefinitionError,
    promote: impl FnOnce(TypeName, Option<Location>) -> DefinitionError,
) -> DefinitionError {
    match err {
        DefinitionError::NoTypeFound { name, location } => promote(name, location),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::DefinitionBuilder;
    use crate::language::parser::parse_signature;

    const PRELUDE: &str = "
        class BasicObject end
        class Object < BasicObject end
        class Module < Object end
        class Class < Module end
    ";

    fn builder(source: &str) -> DefinitionBuilder {
        let text = format!("{}\n{}", PRELUDE, source);
        let decls = parse_signature(&text).expect("parse");
        let mut env = Environment::new();
        let buffer = env.add_buffer("test.sig", text.clone());
        let errors = env.add(buffer, &decls);
        assert!(errors.is_empty(), "environment errors: {:?}", errors);
        let env = env.resolve_type_names().expect("resolve");
        DefinitionBuilder::new(env)
    }

    fn name(text: &str) -> TypeName {
        TypeName::parse(text).expect(text)
    }

    fn names(ancestors: &[Ancestor]) -> Vec<String> {
        ancestors.iter().map(|a| a.to_string()).collect()
    }

    #[test]
    fn extension_contributes_instance_ancestor() {
        let mut builder = builder(
            "class C end
             extension C (Pathname)
               def path: -> C
             end",
        );
        let ancestors = builder.instance_ancestors(&name("::C")).expect("ancestors");
        assert_eq!(
            names(&ancestors),
            vec!["::C", "::C (Pathname)", "::Object", "::BasicObject"]
        );
    }

    #[test]
    fn prepends_come_before_the_class_and_includes_after() {
        let mut builder = builder(
            "module Guard end
             module M1 end
             module M2 end
             class C
               prepend Guard
               include M1
               include M2
             end",
        );
        let ancestors = builder.instance_ancestors(&name("::C")).expect("ancestors");
        assert_eq!(
            names(&ancestors),
            vec!["::Guard", "::C", "::M1", "::M2", "::Object", "::BasicObject"]
        );
    }

    #[test]
    fn mixin_chains_are_inlined_with_substituted_arguments() {
        let mut builder = builder(
            "class Integer end
             module Layer[T] end
             module Box[T]
               include Layer[T]
             end
             class S
               include Box[Integer]
             end",
        );
        let ancestors = builder.instance_ancestors(&name("::S")).expect("ancestors");
        assert_eq!(
            names(&ancestors),
            vec![
                "::S",
                "::Box[::Integer]",
                "::Layer[::Integer]",
                "::Object",
                "::BasicObject"
            ]
        );
    }

    #[test]
    fn interface_includes_appear_in_instance_ancestors() {
        let mut builder = builder(
            "interface _Sized
               def size: -> Object
             end
             interface _Each[A]
               include _Sized
             end
             class C
               include _Each[Object]
             end",
        );
        let ancestors = builder.instance_ancestors(&name("::C")).expect("ancestors");
        assert_eq!(
            names(&ancestors),
            vec![
                "::C",
                "::_Each[::Object]",
                "::_Sized",
                "::Object",
                "::BasicObject"
            ]
        );
    }

    #[test]
    fn singleton_chain_passes_through_extend_and_ends_at_class() {
        let mut builder = builder(
            "module Helper end
             class C
               extend Helper
             end",
        );
        let ancestors = builder.singleton_ancestors(&name("::C")).expect("ancestors");
        assert_eq!(
            names(&ancestors),
            vec![
                "singleton(::C)",
                "::Helper",
                "singleton(::Object)",
                "singleton(::BasicObject)",
                "::Class",
                "::Module",
                "::Object",
                "::BasicObject"
            ]
        );
    }

    #[test]
    fn module_singleton_chain_ends_at_module() {
        let mut builder = builder("module M end");
        let ancestors = builder.singleton_ancestors(&name("::M")).expect("ancestors");
        assert_eq!(
            names(&ancestors),
            vec![
                "singleton(::M)",
                "::Module",
                "::Object",
                "::BasicObject"
            ]
        );
    }

    #[test]
    fn recursive_superclasses_are_detected() {
        let mut builder = builder(
            "class A < B end
             class B < A end",
        );
        let err = builder
            .instance_ancestors(&name("::A"))
            .expect_err("cycle should fail");
        assert!(matches!(err, DefinitionError::RecursiveAncestor { .. }));
    }

    #[test]
    fn missing_mixin_is_reported() {
        // An unresolved environment exercises the builder-side lookup.
        let text = "class BasicObject end
                    class Object < BasicObject end
                    class C include Missing end";
        let decls = parse_signature(text).expect("parse");
        let mut env = Environment::new();
        let buffer = env.add_buffer("test.sig", text);
        env.add(buffer, &decls);
        let mut builder = DefinitionBuilder::new(env);
        let err = builder
            .instance_ancestors(&name("::C"))
            .expect_err("missing mixin");
        assert!(matches!(err, DefinitionError::NoMixinFound { .. }));
    }

    #[test]
    fn ancestor_order_is_monotone_in_subclasses() {
        let mut builder = builder(
            "module M1 end
             module M2 end
             class C
               include M1
               include M2
             end
             class D < C end",
        );
        let base = names(&builder.instance_ancestors(&name("::C")).expect("base"));
        let derived = names(&builder.instance_ancestors(&name("::D")).expect("derived"));
        let pos = |list: &[String], needle: &str| {
            list.iter().position(|n| n == needle).expect(needle)
        };
        assert!(pos(&base, "::M1") < pos(&base, "::M2"));
        assert!(pos(&derived, "::M1") < pos(&derived, "::M2"));
    }
}

use crate::builder::{DefinitionBuilder, DefinitionError};
use crate::language::{
    names::{Namespace, TypeName},
    types::Type,
};

#[derive(Clone, Debug)]
pub struct Constant {
    pub name: TypeName,
    pub ty: Type,
}

/// Resolves constant references against the environment: absolute names
/// first, then the context namespaces innermost-out, then the ancestor
/// constants of the innermost enclosing class or module.
pub struct ConstantTable<'a> {
    builder: &'a mut DefinitionBuilder,
}

impl<'a> ConstantTable<'a> {
    pub fn new(builder: &'a mut DefinitionBuilder) -> Self {
        Self { builder }
    }

    pub fn resolve(
        &mut self,
        name: &TypeName,
        context: &Namespace,
    ) -> Result<Option<Constant>, DefinitionError> {
        if name.is_absolute() {
            return Ok(self.lookup_exact(name));
        }
        for namespace in context.ascend() {
            let candidate = name.absolute_in(&namespace);
            if let Some(constant) = self.lookup_exact(&candidate) {
                return Ok(Some(constant));
            }
        }
        if name.namespace.is_empty() {
            if let Some(enclosing) = context.to_type_name() {
                if self.builder.env().class_entry(&enclosing).is_some() {
                    let definition = self.builder.build_instance(&enclosing)?;
                    if let Some(found) = definition.constants.get(&name.name) {
                        let absolute =
                            TypeName::new(found.declared_in.to_namespace(), name.name.clone());
                        return Ok(Some(Constant {
                            name: absolute,
                            ty: found.ty.clone(),
                        }));
                    }
                }
            }
        }
        Ok(None)
    }

    fn lookup_exact(&self, name: &TypeName) -> Option<Constant> {
        let env = self.builder.env();
        if let Some(fragment) = env.constant_entry(name) {
            return Some(Constant {
                name: name.clone(),
                ty: fragment.decl.ty.clone(),
            });
        }
        if env.class_entry(name).is_some() {
            return Some(Constant {
                name: name.clone(),
                ty: Type::ClassSingleton { name: name.clone() },
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;
    use crate::language::parser::parse_signature;

    fn builder(source: &str) -> DefinitionBuilder {
        let text = format!(
            "class BasicObject end
             class Object < BasicObject end
             class Module < Object end
             class Class < Module end
             class String end
             class Integer end
             {}",
            source
        );
        let decls = parse_signature(&text).expect("parse");
        let mut env = Environment::new();
        let buffer = env.add_buffer("test.sig", text.clone());
        let errors = env.add(buffer, &decls);
        assert!(errors.is_empty(), "environment errors: {:?}", errors);
        DefinitionBuilder::new(env.resolve_type_names().expect("resolve"))
    }

    fn name(text: &str) -> TypeName {
        TypeName::parse(text).expect(text)
    }

    fn namespace(text: &str) -> Namespace {
        Namespace::parse(text).expect(text)
    }

    #[test]
    fn resolves_absolute_constants_directly() {
        let mut builder = builder("VERSION: String");
        let mut table = ConstantTable::new(&mut builder);
        let constant = table
            .resolve(&name("::VERSION"), &Namespace::root())
            .expect("resolve")
            .expect("constant");
        assert_eq!(constant.ty.to_string(), "::String");
    }

    #[test]
    fn walks_context_namespaces_innermost_first() {
        let mut builder = builder(
            "LIMIT: Integer
             module A
               LIMIT: String
               module B end
             end",
        );
        let mut table = ConstantTable::new(&mut builder);
        let inner = table
            .resolve(&name("LIMIT"), &namespace("::A::B"))
            .expect("resolve")
            .expect("constant");
        assert_eq!(inner.name.to_string(), "::A::LIMIT");
        assert_eq!(inner.ty.to_string(), "::String");

        let outer = table
            .resolve(&name("LIMIT"), &Namespace::root())
            .expect("resolve")
            .expect("constant");
        assert_eq!(outer.name.to_string(), "::LIMIT");
    }

    #[test]
    fn class_names_resolve_to_singleton_types() {
        let mut builder = builder("module A class C end end");
        let mut table = ConstantTable::new(&mut builder);
        let constant = table
            .resolve(&name("C"), &namespace("::A"))
            .expect("resolve")
            .expect("constant");
        assert_eq!(constant.name.to_string(), "::A::C");
        assert_eq!(constant.ty.to_string(), "::A::C.class");
    }

    #[test]
    fn falls_back_to_ancestor_constants() {
        let mut builder = builder(
            "class Base
               DEFAULT: Integer
             end
             class Child < Base end",
        );
        let mut table = ConstantTable::new(&mut builder);
        let constant = table
            .resolve(&name("DEFAULT"), &namespace("::Child"))
            .expect("resolve")
            .expect("constant");
        assert_eq!(constant.ty.to_string(), "::Integer");
    }

    #[test]
    fn missing_constants_return_none() {
        let mut builder = builder("VERSION: String");
        let mut table = ConstantTable::new(&mut builder);
        let result = table
            .resolve(&name("MISSING"), &Namespace::root())
            .expect("resolve");
        assert!(result.is_none());
    }
}

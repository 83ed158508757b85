mod ancestors;
mod definition;

pub use ancestors::Ancestor;
pub use definition::{Constant, Definition, DefinitionKind, Method, Variable};

use crate::environment::{Environment, Location};
use crate::language::names::TypeName;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use thiserror::Error;

#[derive(Clone, Debug, Error)]
pub enum DefinitionError {
    #[error("cannot find type `{name}`")]
    NoTypeFound {
        name: TypeName,
        location: Option<Location>,
    },
    #[error("cannot find superclass `{name}`")]
    NoSuperclassFound {
        name: TypeName,
        location: Option<Location>,
    },
    #[error("cannot find mixin `{name}`")]
    NoMixinFound {
        name: TypeName,
        location: Option<Location>,
    },
    #[error("ancestor chain of `{name}` is recursive")]
    RecursiveAncestor {
        name: TypeName,
        location: Option<Location>,
    },
    #[error("method `{method}` of `{type_name}` has no super method for its `super` overload")]
    SuperOverloadMethodDefinition {
        type_name: TypeName,
        method: String,
        location: Option<Location>,
    },
    #[error("method `{method}` is defined more than once in `{type_name}`")]
    DuplicatedMethodDefinition {
        type_name: TypeName,
        method: String,
        location: Option<Location>,
    },
    #[error("alias `{new_name}` in `{type_name}` refers to unknown method `{old_name}`")]
    UnknownMethodAlias {
        type_name: TypeName,
        new_name: String,
        old_name: String,
        location: Option<Location>,
    },
    #[error("variable `{variable}` of `{type_name}` is redeclared with a different type")]
    VariableTypeMismatch {
        type_name: TypeName,
        variable: String,
        location: Option<Location>,
    },
}

impl DefinitionError {
    pub fn location(&self) -> Option<Location> {
        match self {
            DefinitionError::NoTypeFound { location, .. }
            | DefinitionError::NoSuperclassFound { location, .. }
            | DefinitionError::NoMixinFound { location, .. }
            | DefinitionError::RecursiveAncestor { location, .. }
            | DefinitionError::SuperOverloadMethodDefinition { location, .. }
            | DefinitionError::DuplicatedMethodDefinition { location, .. }
            | DefinitionError::UnknownMethodAlias { location, .. }
            | DefinitionError::VariableTypeMismatch { location, .. } => *location,
        }
    }
}

/// Memoized ancestor and definition queries over a resolved environment.
///
/// Queries take `&mut self` for the caches; the builder itself is
/// single-threaded. Wrap it in a mutex to share across threads.
pub struct DefinitionBuilder {
    env: Environment,
    instance_ancestors_cache: HashMap<TypeName, Rc<Vec<Ancestor>>>,
    singleton_ancestors_cache: HashMap<TypeName, Rc<Vec<Ancestor>>>,
    instance_definitions: HashMap<TypeName, Rc<Definition>>,
    singleton_definitions: HashMap<TypeName, Rc<Definition>>,
    building_instance: HashSet<TypeName>,
    building_singleton: HashSet<TypeName>,
}

impl DefinitionBuilder {
    pub fn new(env: Environment) -> Self {
        Self {
            env,
            instance_ancestors_cache: HashMap::new(),
            singleton_ancestors_cache: HashMap::new(),
            instance_definitions: HashMap::new(),
            singleton_definitions: HashMap::new(),
            building_instance: HashSet::new(),
            building_singleton: HashSet::new(),
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn ancestors(
        &mut self,
        name: &TypeName,
        kind: DefinitionKind,
    ) -> Result<Rc<Vec<Ancestor>>, DefinitionError> {
        match kind {
            DefinitionKind::Instance => self.instance_ancestors(name),
            DefinitionKind::Singleton => self.singleton_ancestors(name),
        }
    }

    pub fn build(
        &mut self,
        name: &TypeName,
        kind: DefinitionKind,
    ) -> Result<Rc<Definition>, DefinitionError> {
        match kind {
            DefinitionKind::Instance => self.build_instance(name),
            DefinitionKind::Singleton => self.build_singleton(name),
        }
    }
}

use crate::builder::{Ancestor, DefinitionBuilder, DefinitionError};
use crate::environment::{BufferId, ClassEntry, Location};
use crate::language::{
    ast::*,
    names::TypeName,
    types::{FunctionType, MethodType, Param, Substitution, Type},
};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DefinitionKind {
    Instance,
    Singleton,
}

#[derive(Clone, Debug)]
pub struct Method {
    pub overloads: Vec<MethodType>,
    /// The most distant ancestor that contributed this method.
    pub defined_in: TypeName,
    /// The nearest non-interface ancestor that contributed an overload list.
    pub implemented_in: Option<TypeName>,
    pub accessibility: Visibility,
    pub annotations: Vec<Annotation>,
}

#[derive(Clone, Debug)]
pub struct Variable {
    pub ty: Type,
    pub declared_in: TypeName,
}

#[derive(Clone, Debug)]
pub struct Constant {
    pub ty: Type,
    pub declared_in: TypeName,
}

/// The computed semantic summary of a class or module at one kind.
#[derive(Clone, Debug)]
pub struct Definition {
    pub type_name: TypeName,
    pub kind: DefinitionKind,
    pub ancestors: Rc<Vec<Ancestor>>,
    pub methods: HashMap<String, Method>,
    pub instance_variables: HashMap<String, Variable>,
    pub class_variables: HashMap<String, Variable>,
    pub constants: HashMap<String, Constant>,
}

impl Definition {
    fn empty(type_name: TypeName, kind: DefinitionKind, ancestors: Rc<Vec<Ancestor>>) -> Self {
        Self {
            type_name,
            kind,
            ancestors,
            methods: HashMap::new(),
            instance_variables: HashMap::new(),
            class_variables: HashMap::new(),
            constants: HashMap::new(),
        }
    }
}

// Which side of an entry's members an ancestor contributes.
#[derive(Clone, Copy, PartialEq)]
enum MemberSide {
    Instance,
    Singleton,
}

impl DefinitionBuilder {
    pub fn build_instance(&mut self, name: &TypeName) -> Result<Rc<Definition>, DefinitionError> {
        if let Some(hit) = self.instance_definitions.get(name) {
            return Ok(hit.clone());
        }
        let ancestors = self.instance_ancestors(name)?;
        let mut definition =
            Definition::empty(name.clone(), DefinitionKind::Instance, ancestors.clone());
        for ancestor in ancestors.iter().rev() {
            self.contribute_ancestor(&mut definition, ancestor)?;
        }
        let definition = Rc::new(definition);
        self.instance_definitions
            .insert(name.clone(), definition.clone());
        Ok(definition)
    }

    pub fn build_singleton(&mut self, name: &TypeName) -> Result<Rc<Definition>, DefinitionError> {
        if let Some(hit) = self.singleton_definitions.get(name) {
            return Ok(hit.clone());
        }
        let ancestors = self.singleton_ancestors(name)?;
        let mut definition =
            Definition::empty(name.clone(), DefinitionKind::Singleton, ancestors.clone());
        for ancestor in ancestors.iter().rev() {
            self.contribute_ancestor(&mut definition, ancestor)?;
        }
        let definition = Rc::new(definition);
        self.singleton_definitions
            .insert(name.clone(), definition.clone());
        Ok(definition)
    }

    fn contribute_ancestor(
        &self,
        definition: &mut Definition,
        ancestor: &Ancestor,
    ) -> Result<(), DefinitionError> {
        match ancestor {
            Ancestor::Instance { name, args } => {
                self.contribute_entry(definition, name, args, MemberSide::Instance)
            }
            Ancestor::Singleton { name } => {
                self.contribute_entry(definition, name, &[], MemberSide::Singleton)
            }
            Ancestor::ExtensionInstance {
                name,
                extension_name,
                args,
            } => self.contribute_extension(definition, name, extension_name, args, MemberSide::Instance),
            Ancestor::ExtensionSingleton {
                name,
                extension_name,
            } => self.contribute_extension(definition, name, extension_name, &[], MemberSide::Singleton),
        }
    }

    fn contribute_entry(
        &self,
        definition: &mut Definition,
        owner: &TypeName,
        args: &[Type],
        side: MemberSide,
    ) -> Result<(), DefinitionError> {
        let mut defined_here = HashSet::new();
        if owner.is_interface() {
            let fragment = self
                .env
                .interface_entry(owner)
                .ok_or_else(|| DefinitionError::NoTypeFound {
                    name: owner.clone(),
                    location: None,
                })?;
            let subst = Substitution::new(&fragment.decl.type_params, args);
            return self.contribute_members(
                definition,
                owner,
                fragment.buffer,
                &fragment.decl.members,
                &subst,
                side,
                false,
                &mut defined_here,
            );
        }

        let entry = self
            .env
            .class_entry(owner)
            .ok_or_else(|| DefinitionError::NoTypeFound {
                name: owner.clone(),
                location: None,
            })?;
        match entry {
            ClassEntry::Class(data) => {
                for fragment in &data.fragments {
                    let subst = Substitution::new(&fragment.decl.type_params, args);
                    self.contribute_members(
                        definition,
                        owner,
                        fragment.buffer,
                        &fragment.decl.members,
                        &subst,
                        side,
                        true,
                        &mut defined_here,
                    )?;
                }
            }
            ClassEntry::Module(data) => {
                for fragment in &data.fragments {
                    let subst = Substitution::new(&fragment.decl.type_params, args);
                    self.contribute_members(
                        definition,
                        owner,
                        fragment.buffer,
                        &fragment.decl.members,
                        &subst,
                        side,
                        true,
                        &mut defined_here,
                    )?;
                }
            }
        }
        Ok(())
    }

    fn contribute_extension(
        &self,
        definition: &mut Definition,
        owner: &TypeName,
        extension_name: &str,
        args: &[Type],
        side: MemberSide,
    ) -> Result<(), DefinitionError> {
        let mut defined_here = HashSet::new();
        for fragment in self.env.extensions_of(owner) {
            if fragment.decl.extension_name != extension_name {
                continue;
            }
            let subst = Substitution::new(&fragment.decl.type_params, args);
            self.contribute_members(
                definition,
                owner,
                fragment.buffer,
                &fragment.decl.members,
                &subst,
                side,
                true,
                &mut defined_here,
            )?;
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn contribute_members(
        &self,
        definition: &mut Definition,
        owner: &TypeName,
        buffer: BufferId,
        members: &[Member],
        subst: &Substitution,
        side: MemberSide,
        concrete: bool,
        defined_here: &mut HashSet<String>,
    ) -> Result<(), DefinitionError> {
        let mut visibility = Visibility::Public;
        for member in members {
            let location = Location {
                buffer,
                span: member.span(),
            };
            match member {
                Member::Method(method) => {
                    let applicable = match side {
                        MemberSide::Instance => matches!(
                            method.kind,
                            MethodKind::Instance | MethodKind::SingletonInstance
                        ),
                        MemberSide::Singleton => matches!(
                            method.kind,
                            MethodKind::Singleton | MethodKind::SingletonInstance
                        ),
                    };
                    if !applicable {
                        continue;
                    }
                    let accessibility = match (side, method.kind) {
                        (MemberSide::Instance, MethodKind::SingletonInstance) => Visibility::Private,
                        (MemberSide::Singleton, _) => Visibility::Public,
                        (MemberSide::Instance, _) => visibility,
                    };
                    let overloads: Vec<Overload> = method
                        .overloads
                        .iter()
                        .map(|overload| match overload {
                            Overload::Super => Overload::Super,
                            Overload::MethodType(method_type) => {
                                Overload::MethodType(method_type.substitute(subst))
                            }
                        })
                        .collect();
                    merge_method(
                        definition,
                        owner,
                        &method.name,
                        overloads,
                        accessibility,
                        concrete,
                        method.annotations.clone(),
                        defined_here,
                        location,
                    )?;
                }
                Member::Attribute(attr) if side == MemberSide::Instance => {
                    self.contribute_attribute(
                        definition,
                        owner,
                        attr,
                        subst,
                        visibility,
                        concrete,
                        defined_here,
                        location,
                    )?;
                }
                Member::InstanceVariable(var) if side == MemberSide::Instance => {
                    merge_variable(
                        &mut definition.instance_variables,
                        &var.name,
                        var.ty.substitute(subst),
                        owner,
                        location,
                    )?;
                }
                Member::ClassInstanceVariable(var) if side == MemberSide::Singleton => {
                    merge_variable(
                        &mut definition.instance_variables,
                        &var.name,
                        var.ty.substitute(subst),
                        owner,
                        location,
                    )?;
                }
                Member::ClassVariable(var) => {
                    merge_variable(
                        &mut definition.class_variables,
                        &var.name,
                        var.ty.substitute(subst),
                        owner,
                        location,
                    )?;
                }
                Member::Alias(alias) => {
                    let applicable = match side {
                        MemberSide::Instance => alias.kind == AliasKind::Instance,
                        MemberSide::Singleton => alias.kind == AliasKind::Singleton,
                    };
                    if !applicable {
                        continue;
                    }
                    let Some(existing) = definition.methods.get(&alias.old_name).cloned() else {
                        return Err(DefinitionError::UnknownMethodAlias {
                            type_name: owner.clone(),
                            new_name: alias.new_name.clone(),
                            old_name: alias.old_name.clone(),
                            location: Some(location),
                        });
                    };
                    defined_here.insert(alias.new_name.clone());
                    definition.methods.insert(alias.new_name.clone(), existing);
                }
                Member::Public(_) if side == MemberSide::Instance => {
                    visibility = Visibility::Public;
                }
                Member::Private(_) if side == MemberSide::Instance => {
                    visibility = Visibility::Private;
                }
                Member::Decl(decl)
                    if side == MemberSide::Instance
                        && definition.kind == DefinitionKind::Instance =>
                {
                    match decl {
                        Declaration::Class(class) => {
                            definition.constants.insert(
                                class.name.name.clone(),
                                Constant {
                                    ty: Type::ClassSingleton {
                                        name: class.name.clone(),
                                    },
                                    declared_in: owner.clone(),
                                },
                            );
                        }
                        Declaration::Module(module) => {
                            definition.constants.insert(
                                module.name.name.clone(),
                                Constant {
                                    ty: Type::ClassSingleton {
                                        name: module.name.clone(),
                                    },
                                    declared_in: owner.clone(),
                                },
                            );
                        }
                        Declaration::Constant(constant) => {
                            definition.constants.insert(
                                constant.name.name.clone(),
                                Constant {
                                    ty: constant.ty.clone(),
                                    declared_in: owner.clone(),
                                },
                            );
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn contribute_attribute(
        &self,
        definition: &mut Definition,
        owner: &TypeName,
        attr: &AttributeDefinition,
        subst: &Substitution,
        visibility: Visibility,
        concrete: bool,
        defined_here: &mut HashSet<String>,
        location: Location,
    ) -> Result<(), DefinitionError> {
        let ty = attr.ty.substitute(subst);

        match &attr.ivar {
            IvarSpec::Omitted => {}
            IvarSpec::Named(name) => {
                merge_variable(
                    &mut definition.instance_variables,
                    name,
                    ty.clone(),
                    owner,
                    location,
                )?;
            }
            IvarSpec::Inferred => {
                let name = format!("@{}", attr.name);
                merge_variable(
                    &mut definition.instance_variables,
                    &name,
                    ty.clone(),
                    owner,
                    location,
                )?;
            }
        }

        if matches!(attr.kind, AttributeKind::Reader | AttributeKind::Accessor) {
            let reader = MethodType {
                type_params: Vec::new(),
                function: FunctionType::empty(ty.clone()),
                block: None,
            };
            merge_method(
                definition,
                owner,
                &attr.name,
                vec![Overload::MethodType(reader)],
                visibility,
                concrete,
                attr.annotations.clone(),
                defined_here,
                location,
            )?;
        }
        if matches!(attr.kind, AttributeKind::Writer | AttributeKind::Accessor) {
            let mut function = FunctionType::empty(ty.clone());
            function.required_positionals = vec![Param::named(attr.name.clone(), ty)];
            let writer = MethodType {
                type_params: Vec::new(),
                function,
                block: None,
            };
            merge_method(
                definition,
                owner,
                &format!("{}=", attr.name),
                vec![Overload::MethodType(writer)],
                visibility,
                concrete,
                attr.annotations.clone(),
                defined_here,
                location,
            )?;
        }
        Ok(())
    }
}

#[allow(clippy::too_many_arguments)]
fn merge_method(
    definition: &mut Definition,
    owner: &TypeName,
    name: &str,
    overloads: Vec<Overload>,
    accessibility: Visibility,
    concrete: bool,
    annotations: Vec<Annotation>,
    defined_here: &mut HashSet<String>,
    location: Location,
) -> Result<(), DefinitionError> {
    if !defined_here.insert(name.to_string()) {
        return Err(DefinitionError::DuplicatedMethodDefinition {
            type_name: owner.clone(),
            method: name.to_string(),
            location: Some(location),
        });
    }

    let has_super = overloads.iter().any(|o| matches!(o, Overload::Super));
    let resolved: Vec<MethodType> = if has_super {
        // The sentinel splices the previously accumulated overload list at
        // its position, in original order.
        let Some(previous) = definition.methods.get(name) else {
            return Err(DefinitionError::SuperOverloadMethodDefinition {
                type_name: owner.clone(),
                method: name.to_string(),
                location: Some(location),
            });
        };
        let mut resolved = Vec::new();
        for overload in overloads {
            match overload {
                Overload::MethodType(method_type) => resolved.push(method_type),
                Overload::Super => resolved.extend(previous.overloads.iter().cloned()),
            }
        }
        resolved
    } else {
        overloads
            .into_iter()
            .map(|overload| match overload {
                Overload::MethodType(method_type) => method_type,
                Overload::Super => unreachable!(),
            })
            .collect()
    };

    match definition.methods.get_mut(name) {
        Some(method) => {
            method.overloads = resolved;
            if concrete {
                method.implemented_in = Some(owner.clone());
            }
            method.accessibility = accessibility;
            method.annotations = annotations;
        }
        None => {
            definition.methods.insert(
                name.to_string(),
                Method {
                    overloads: resolved,
                    defined_in: owner.clone(),
                    implemented_in: if concrete { Some(owner.clone()) } else { None },
                    accessibility,
                    annotations,
                },
            );
        }
    }
    Ok(())
}

fn merge_variable(
    map: &mut HashMap<String, Variable>,
    name: &str,
    ty: Type,
    owner: &TypeName,
    location: Location,
) -> Result<(), DefinitionError> {
    match map.get(name) {
        Some(existing) => {
            if existing.ty != ty {
                return Err(DefinitionError::VariableTypeMismatch {
                    type_name: owner.clone(),
                    variable: name.to_string(),
                    location: Some(location),
                });
            }
            Ok(())
        }
        None => {
            map.insert(
                name.to_string(),
                Variable {
                    ty,
                    declared_in: owner.clone(),
                },
            );
            Ok(())
        }
    }
}

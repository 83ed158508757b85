use crate::builder::DefinitionBuilder;
use crate::environment::Environment;
use crate::language::names::{Namespace, TypeName};
use crate::language::parser::parse_signature;
use crate::loader::EnvironmentLoader;
use crate::validator::Validator;

fn name(text: &str) -> TypeName {
    TypeName::parse(text).expect(text)
}

fn builtin_environment_with(source: &str) -> Environment {
    let loader = EnvironmentLoader::new();
    let (mut env, errors) = loader.load().expect("load builtin");
    assert!(errors.is_empty(), "builtin environment errors: {:?}", errors);
    let decls = parse_signature(source).expect("parse test source");
    let buffer = env.add_buffer("app.sig", source);
    let errors = env.add(buffer, &decls);
    assert!(errors.is_empty(), "environment errors: {:?}", errors);
    env.resolve_type_names().expect("resolve")
}

#[test]
fn builtin_environment_validates_cleanly() {
    let loader = EnvironmentLoader::new();
    let (env, errors) = loader.load().expect("load builtin");
    assert!(errors.is_empty());
    let env = env.resolve_type_names().expect("resolve builtin");
    let mut validator = Validator::new(DefinitionBuilder::new(env));
    let errors = validator.validate();
    assert!(errors.is_empty(), "builtin validation errors: {:?}", errors);
}

#[test]
fn application_signatures_build_on_the_builtin() {
    let env = builtin_environment_with(
        "module App
           VERSION: String

           class Config
             @entries: Hash[Symbol, String]

             def []: (Symbol) -> String?
             def []=: (Symbol, String) -> String
             def each: { ([Symbol, String]) -> void } -> self
             attr_reader path: String?
           end

           class Store[A] < Config
             include Enumerable[A]

             def push: (A) -> self
             def each: { (A) -> void } -> self | super
           end
         end",
    );
    let mut builder = DefinitionBuilder::new(env);

    let definition = builder
        .build_instance(&name("::App::Store"))
        .expect("definition");
    // The spliced overload list keeps the subclass's shape first.
    let each = &definition.methods["each"];
    assert_eq!(each.overloads.len(), 2);
    assert_eq!(each.defined_in.to_string(), "::App::Config");
    assert_eq!(
        each.implemented_in.as_ref().map(|n| n.to_string()),
        Some("::App::Store".to_string())
    );

    // Inherited builtin methods are present.
    assert!(definition.methods.contains_key("tap"));
    assert!(definition.methods.contains_key("to_s"));
    // Attribute accessors from the superclass survive.
    assert!(definition.methods.contains_key("path"));
    // Enumerable's generic methods arrive substituted.
    assert!(definition.methods.contains_key("map"));

    assert_eq!(
        definition.instance_variables["@entries"].ty.to_string(),
        "::Hash[::Symbol, ::String]"
    );
}

#[test]
fn validate_accepts_a_full_application_environment() {
    let env = builtin_environment_with(
        "interface _Serializable
           def serialize: -> String
         end

         class Document
           include _Serializable
           def serialize: -> String
           def title: -> String
         end",
    );
    let mut validator = Validator::new(DefinitionBuilder::new(env));
    let errors = validator.validate();
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
}

#[test]
fn ancestors_of_builtin_classes_read_naturally() {
    let env = builtin_environment_with("");
    let mut builder = DefinitionBuilder::new(env);
    let ancestors = builder
        .instance_ancestors(&name("::String"))
        .expect("ancestors");
    let display: Vec<String> = ancestors.iter().map(|a| a.to_string()).collect();
    assert_eq!(
        display,
        vec![
            "::String",
            "::Comparable",
            "::Object",
            "::Kernel",
            "::BasicObject"
        ]
    );
}

#[test]
fn constant_queries_see_nested_namespaces() {
    let env = builtin_environment_with(
        "module App
           VERSION: String
           class Config end
         end",
    );
    let mut builder = DefinitionBuilder::new(env);
    let mut table = crate::constants::ConstantTable::new(&mut builder);
    let version = table
        .resolve(&name("VERSION"), &Namespace::parse("::App").unwrap())
        .expect("resolve")
        .expect("constant");
    assert_eq!(version.name.to_string(), "::App::VERSION");
    let config = table
        .resolve(&name("Config"), &Namespace::parse("::App").unwrap())
        .expect("resolve")
        .expect("constant");
    assert_eq!(config.ty.to_string(), "::App::Config.class");
}

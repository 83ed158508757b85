use clap::{Parser, Subcommand};
use sig_lang::{
    builder::{DefinitionBuilder, DefinitionKind},
    constants::ConstantTable,
    diagnostics,
    environment::{ClassEntry, Environment},
    language::{
        ast::{Declaration, Visibility},
        names::{Namespace, TypeName},
        parser::parse_signature,
    },
    loader::{EnvironmentLoader, LoadError, SourcePath},
    logging,
    validator::Validator,
};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "sig-lang",
    version,
    about = "Signature language toolchain",
    arg_required_else_help = true
)]
struct Cli {
    /// Load a library found under the SIG_PATH roots
    #[arg(short = 'r', value_name = "LIBRARY", global = true)]
    libraries: Vec<String>,
    /// Add a signature file or directory
    #[arg(short = 'I', value_name = "DIR", global = true)]
    dirs: Vec<PathBuf>,
    /// Skip the bundled core signatures
    #[arg(long = "no-stdlib", global = true, default_value_t = false)]
    no_stdlib: bool,
    /// Log verbosity: error, warn, info, debug, trace
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    log_level: Option<String>,
    /// Write log output to a file instead of stderr
    #[arg(long = "log-output", value_name = "FILE", global = true)]
    log_output: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List classes, modules and interfaces
    List {
        #[arg(long, default_value_t = false)]
        class: bool,
        #[arg(long, default_value_t = false)]
        module: bool,
        #[arg(long, default_value_t = false)]
        interface: bool,
    },
    /// Show the linearized ancestors of a type
    Ancestors {
        #[arg(long, conflicts_with = "singleton", default_value_t = false)]
        instance: bool,
        #[arg(long, default_value_t = false)]
        singleton: bool,
        #[arg(value_name = "TYPE")]
        type_name: String,
    },
    /// Show the methods of a type
    Methods {
        #[arg(long, conflicts_with = "singleton", default_value_t = false)]
        instance: bool,
        #[arg(long, default_value_t = false)]
        singleton: bool,
        /// Include inherited methods (default)
        #[arg(long, overrides_with = "no_inherit", default_value_t = false)]
        inherit: bool,
        /// Only methods the type itself defines or implements
        #[arg(long = "no-inherit", default_value_t = false)]
        no_inherit: bool,
        #[arg(value_name = "TYPE")]
        type_name: String,
    },
    /// Show one method of a type
    Method {
        #[arg(long, conflicts_with = "singleton", default_value_t = false)]
        instance: bool,
        #[arg(long, default_value_t = false)]
        singleton: bool,
        #[arg(value_name = "TYPE")]
        type_name: String,
        #[arg(value_name = "METHOD")]
        method_name: String,
    },
    /// Resolve a constant reference
    Constant {
        /// Namespace context to resolve from, e.g. ::A::B
        #[arg(long, value_name = "NS")]
        context: Option<String>,
        #[arg(value_name = "NAME")]
        name: String,
    },
    /// Check every type reference in the environment
    Validate,
    /// Print the signature search path
    Paths,
    /// Parse signature files and report errors
    Parse {
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },
    /// Emit declarations as a JSON tree
    Ast {
        #[arg(value_name = "PATTERN")]
        patterns: Vec<String>,
    },
    /// Print the version
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(message) = logging::init(cli.log_level.as_deref(), cli.log_output.as_deref()) {
        eprintln!("error: {}", message);
        return ExitCode::FAILURE;
    }
    if run(&cli) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn run(cli: &Cli) -> bool {
    match &cli.command {
        Commands::Version => {
            println!("sig-lang {}", env!("CARGO_PKG_VERSION"));
            true
        }
        Commands::Parse { files } => run_parse(files),
        Commands::Paths => run_paths(cli),
        Commands::Ast { patterns } => run_ast(cli, patterns),
        Commands::List {
            class,
            module,
            interface,
        } => with_environment(cli, |env| run_list(env, *class, *module, *interface)),
        Commands::Validate => with_environment(cli, run_validate),
        Commands::Ancestors {
            instance,
            singleton,
            type_name,
        } => {
            let kind = definition_kind(*instance, *singleton);
            with_environment(cli, |env| run_ancestors(env, kind, type_name))
        }
        Commands::Methods {
            instance,
            singleton,
            inherit,
            no_inherit,
            type_name,
        } => {
            let kind = definition_kind(*instance, *singleton);
            let inherit = *inherit || !*no_inherit;
            with_environment(cli, |env| run_methods(env, kind, inherit, type_name))
        }
        Commands::Method {
            instance,
            singleton,
            type_name,
            method_name,
        } => {
            let kind = definition_kind(*instance, *singleton);
            with_environment(cli, |env| run_method(env, kind, type_name, method_name))
        }
        Commands::Constant { context, name } => {
            with_environment(cli, |env| run_constant(env, context.as_deref(), name))
        }
    }
}

// Instance is the default; clap rejects both flags at once.
fn definition_kind(instance: bool, singleton: bool) -> DefinitionKind {
    if singleton && !instance {
        DefinitionKind::Singleton
    } else {
        DefinitionKind::Instance
    }
}

fn build_loader(cli: &Cli) -> EnvironmentLoader {
    let mut loader = EnvironmentLoader::new();
    loader.no_builtin(cli.no_stdlib);
    for library in &cli.libraries {
        loader.add_library(library);
    }
    for dir in &cli.dirs {
        loader.add_path(dir);
    }
    loader
}

// Loads, reports, resolves; hands the resolved environment to `f`.
fn with_environment(cli: &Cli, f: impl FnOnce(Environment) -> bool) -> bool {
    let loader = build_loader(cli);
    let (env, env_errors) = match loader.load() {
        Ok(loaded) => loaded,
        Err(err) => {
            report_load_error(err);
            return false;
        }
    };
    if !env_errors.is_empty() {
        diagnostics::emit_environment_errors(&env, &env_errors);
        return false;
    }
    match env.resolve_type_names() {
        Ok(resolved) => f(resolved),
        Err(errors) => {
            diagnostics::emit_resolve_errors(&env, &errors);
            false
        }
    }
}

fn report_load_error(err: LoadError) {
    match err {
        LoadError::Io { path, error } => diagnostics::report_io_error(&path, &error),
        LoadError::Syntax(files) => diagnostics::emit_file_errors(&files),
        LoadError::LibraryNotFound { name } => {
            eprintln!("error: cannot find library `{}` under SIG_PATH", name);
        }
    }
}

fn run_parse(files: &[PathBuf]) -> bool {
    let mut ok = true;
    for path in files {
        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(error) => {
                diagnostics::report_io_error(path, &error);
                ok = false;
                continue;
            }
        };
        if let Err(errors) = parse_signature(&source) {
            diagnostics::emit_parse_errors(path, &source, &errors);
            ok = false;
        }
    }
    ok
}

fn run_paths(cli: &Cli) -> bool {
    let loader = build_loader(cli);
    match loader.sources() {
        Ok(sources) => {
            for source in sources {
                match source {
                    SourcePath::Builtin => println!("builtin: <bundled core signatures>"),
                    SourcePath::Library { name, path } => {
                        println!("library {}: {}", name, path.display())
                    }
                    SourcePath::Path(path) => println!("path: {}", path.display()),
                }
            }
            true
        }
        Err(err) => {
            report_load_error(err);
            false
        }
    }
}

fn run_ast(cli: &Cli, patterns: &[String]) -> bool {
    let loader = build_loader(cli);
    let (env, _) = match loader.load() {
        Ok(loaded) => loaded,
        Err(err) => {
            report_load_error(err);
            return false;
        }
    };
    let decls: Vec<&Declaration> = env
        .declarations()
        .iter()
        .map(|(_, decl)| decl)
        .filter(|decl| patterns.is_empty() || matches_pattern(decl, patterns))
        .collect();
    match serde_json::to_string_pretty(&decls) {
        Ok(json) => {
            println!("{}", json);
            true
        }
        Err(err) => {
            eprintln!("error: {}", err);
            false
        }
    }
}

fn matches_pattern(decl: &Declaration, patterns: &[String]) -> bool {
    let name = match decl {
        Declaration::Class(decl) => decl.name.to_string(),
        Declaration::Module(decl) => decl.name.to_string(),
        Declaration::Interface(decl) => decl.name.to_string(),
        Declaration::Constant(decl) => decl.name.to_string(),
        Declaration::Global(decl) => decl.name.clone(),
        Declaration::Alias(decl) => decl.name.to_string(),
        Declaration::Extension(decl) => decl.name.to_string(),
    };
    patterns.iter().any(|pattern| name.contains(pattern))
}

fn run_list(env: Environment, class: bool, module: bool, interface: bool) -> bool {
    let all = !class && !module && !interface;
    let mut lines = Vec::new();
    for entry in env.class_entries() {
        match entry {
            ClassEntry::Class(data) if all || class => {
                lines.push(format!("class {}", data.name));
            }
            ClassEntry::Module(data) if all || module => {
                lines.push(format!("module {}", data.name));
            }
            _ => {}
        }
    }
    if all || interface {
        for fragment in env.interface_entries() {
            lines.push(format!("interface {}", fragment.decl.name));
        }
    }
    lines.sort();
    for line in lines {
        println!("{}", line);
    }
    true
}

fn run_validate(env: Environment) -> bool {
    let mut validator = Validator::new(DefinitionBuilder::new(env));
    let errors = validator.validate();
    if errors.is_empty() {
        true
    } else {
        let builder = validator.into_builder();
        diagnostics::emit_validation_errors(builder.env(), &errors);
        false
    }
}

fn parse_type_name(text: &str) -> Option<TypeName> {
    let name = TypeName::parse(text)?;
    Some(name.absolute_in(&Namespace::root()))
}

fn run_ancestors(env: Environment, kind: DefinitionKind, type_name: &str) -> bool {
    let Some(name) = parse_type_name(type_name) else {
        eprintln!("error: invalid type name `{}`", type_name);
        return false;
    };
    let mut builder = DefinitionBuilder::new(env);
    match builder.ancestors(&name, kind) {
        Ok(ancestors) => {
            for ancestor in ancestors.iter() {
                println!("{}", ancestor);
            }
            true
        }
        Err(err) => {
            diagnostics::emit_definition_error(builder.env(), &err);
            false
        }
    }
}

fn run_methods(env: Environment, kind: DefinitionKind, inherit: bool, type_name: &str) -> bool {
    let Some(name) = parse_type_name(type_name) else {
        eprintln!("error: invalid type name `{}`", type_name);
        return false;
    };
    let mut builder = DefinitionBuilder::new(env);
    match builder.build(&name, kind) {
        Ok(definition) => {
            let mut names: Vec<&String> = definition
                .methods
                .iter()
                .filter(|(_, method)| {
                    inherit
                        || method.defined_in == name
                        || method.implemented_in.as_ref() == Some(&name)
                })
                .map(|(method_name, _)| method_name)
                .collect();
            names.sort();
            for method_name in names {
                let method = &definition.methods[method_name];
                println!("{} ({})", method_name, visibility_text(method.accessibility));
            }
            true
        }
        Err(err) => {
            diagnostics::emit_definition_error(builder.env(), &err);
            false
        }
    }
}

fn run_method(
    env: Environment,
    kind: DefinitionKind,
    type_name: &str,
    method_name: &str,
) -> bool {
    let Some(name) = parse_type_name(type_name) else {
        eprintln!("error: invalid type name `{}`", type_name);
        return false;
    };
    let mut builder = DefinitionBuilder::new(env);
    let definition = match builder.build(&name, kind) {
        Ok(definition) => definition,
        Err(err) => {
            diagnostics::emit_definition_error(builder.env(), &err);
            return false;
        }
    };
    let Some(method) = definition.methods.get(method_name) else {
        eprintln!("error: cannot find method `{}` of `{}`", method_name, name);
        return false;
    };
    let separator = match kind {
        DefinitionKind::Instance => "#",
        DefinitionKind::Singleton => ".",
    };
    println!("{}{}{}", name, separator, method_name);
    println!("  accessibility: {}", visibility_text(method.accessibility));
    println!("  defined_in: {}", method.defined_in);
    match &method.implemented_in {
        Some(implemented_in) => println!("  implemented_in: {}", implemented_in),
        None => println!("  implemented_in: (abstract)"),
    }
    println!("  types:");
    for overload in &method.overloads {
        println!("    {}", overload);
    }
    true
}

fn run_constant(env: Environment, context: Option<&str>, name: &str) -> bool {
    let Some(constant_name) = TypeName::parse(name) else {
        eprintln!("error: invalid constant name `{}`", name);
        return false;
    };
    let namespace = match context {
        Some(text) => match Namespace::parse(text) {
            Some(namespace) if namespace.is_absolute() => namespace,
            _ => {
                eprintln!("error: invalid namespace `{}` (expected ::A::B form)", text);
                return false;
            }
        },
        None => Namespace::root(),
    };
    let mut builder = DefinitionBuilder::new(env);
    let mut table = ConstantTable::new(&mut builder);
    match table.resolve(&constant_name, &namespace) {
        Ok(Some(constant)) => {
            println!("{}: {}", constant.name, constant.ty);
            true
        }
        Ok(None) => {
            eprintln!("error: cannot find constant `{}`", name);
            false
        }
        Err(err) => {
            eprintln!("error: {}", err);
            false
        }
    }
}

fn visibility_text(visibility: Visibility) -> &'static str {
    match visibility {
        Visibility::Public => "public",
        Visibility::Private => "private",
    }
}

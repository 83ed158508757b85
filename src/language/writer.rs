use crate::language::ast::*;

/// Renders declarations back into canonical signature text. The output
/// always parses, and writing the reparsed result is a fixpoint.
pub fn write_declarations(decls: &[Declaration]) -> String {
    let mut out = String::new();
    for (idx, decl) in decls.iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        write_declaration(&mut out, decl, 0);
    }
    out
}

fn write_declaration(out: &mut String, decl: &Declaration, indent: usize) {
    let prefix = "  ".repeat(indent);
    match decl {
        Declaration::Class(class) => {
            write_annotations(out, &class.annotations, &prefix);
            out.push_str(&prefix);
            out.push_str(&format!("class {}", class.name));
            write_type_params(out, &class.type_params);
            if let Some(superclass) = &class.superclass {
                out.push_str(&format!(" < {}", superclass.name));
                write_type_args_text(out, &superclass.args);
            }
            out.push('\n');
            write_members(out, &class.members, indent + 1);
            out.push_str(&prefix);
            out.push_str("end\n");
        }
        Declaration::Module(module) => {
            write_annotations(out, &module.annotations, &prefix);
            out.push_str(&prefix);
            out.push_str(&format!("module {}", module.name));
            write_type_params(out, &module.type_params);
            if !module.self_types.is_empty() {
                let list: Vec<String> = module.self_types.iter().map(|t| t.to_string()).collect();
                out.push_str(&format!(" : {}", list.join(", ")));
            }
            out.push('\n');
            write_members(out, &module.members, indent + 1);
            out.push_str(&prefix);
            out.push_str("end\n");
        }
        Declaration::Interface(interface) => {
            write_annotations(out, &interface.annotations, &prefix);
            out.push_str(&prefix);
            out.push_str(&format!("interface {}", interface.name));
            write_type_params(out, &interface.type_params);
            out.push('\n');
            write_members(out, &interface.members, indent + 1);
            out.push_str(&prefix);
            out.push_str("end\n");
        }
        Declaration::Constant(constant) => {
            write_annotations(out, &constant.annotations, &prefix);
            out.push_str(&prefix);
            out.push_str(&format!("{}: {}\n", constant.name, constant.ty));
        }
        Declaration::Global(global) => {
            write_annotations(out, &global.annotations, &prefix);
            out.push_str(&prefix);
            out.push_str(&format!("{}: {}\n", global.name, global.ty));
        }
        Declaration::Alias(alias) => {
            write_annotations(out, &alias.annotations, &prefix);
            out.push_str(&prefix);
            out.push_str(&format!("type {} = {}\n", alias.name, alias.ty));
        }
        Declaration::Extension(extension) => {
            write_annotations(out, &extension.annotations, &prefix);
            out.push_str(&prefix);
            out.push_str(&format!("extension {}", extension.name));
            write_type_params(out, &extension.type_params);
            out.push_str(&format!(" ({})\n", extension.extension_name));
            write_members(out, &extension.members, indent + 1);
            out.push_str(&prefix);
            out.push_str("end\n");
        }
    }
}

fn write_members(out: &mut String, members: &[Member], indent: usize) {
    let prefix = "  ".repeat(indent);
    for member in members {
        match member {
            Member::Method(method) => {
                write_annotations(out, &method.annotations, &prefix);
                out.push_str(&prefix);
                let receiver = match method.kind {
                    MethodKind::Instance => "",
                    MethodKind::Singleton => "self.",
                    MethodKind::SingletonInstance => "self?.",
                };
                let overloads: Vec<String> = method
                    .overloads
                    .iter()
                    .map(|overload| match overload {
                        Overload::MethodType(method_type) => method_type.to_string(),
                        Overload::Super => "super".to_string(),
                    })
                    .collect();
                out.push_str(&format!(
                    "def {}{}: {}\n",
                    receiver,
                    method_name_text(&method.name),
                    overloads.join(" | ")
                ));
            }
            Member::Include(mixin) => write_mixin(out, "include", mixin, &prefix),
            Member::Extend(mixin) => write_mixin(out, "extend", mixin, &prefix),
            Member::Prepend(mixin) => write_mixin(out, "prepend", mixin, &prefix),
            Member::Attribute(attr) => {
                write_annotations(out, &attr.annotations, &prefix);
                out.push_str(&prefix);
                let keyword = match attr.kind {
                    AttributeKind::Reader => "attr_reader",
                    AttributeKind::Writer => "attr_writer",
                    AttributeKind::Accessor => "attr_accessor",
                };
                let ivar = match &attr.ivar {
                    IvarSpec::Inferred => String::new(),
                    IvarSpec::Named(name) => format!("({})", name),
                    IvarSpec::Omitted => "()".to_string(),
                };
                out.push_str(&format!("{} {}{}: {}\n", keyword, attr.name, ivar, attr.ty));
            }
            Member::InstanceVariable(var) => {
                out.push_str(&prefix);
                out.push_str(&format!("{}: {}\n", var.name, var.ty));
            }
            Member::ClassInstanceVariable(var) => {
                out.push_str(&prefix);
                out.push_str(&format!("self.{}: {}\n", var.name, var.ty));
            }
            Member::ClassVariable(var) => {
                out.push_str(&prefix);
                out.push_str(&format!("{}: {}\n", var.name, var.ty));
            }
            Member::Alias(alias) => {
                write_annotations(out, &alias.annotations, &prefix);
                out.push_str(&prefix);
                match alias.kind {
                    AliasKind::Instance => out.push_str(&format!(
                        "alias {} {}\n",
                        method_name_text(&alias.new_name),
                        method_name_text(&alias.old_name)
                    )),
                    AliasKind::Singleton => out.push_str(&format!(
                        "alias self.{} self.{}\n",
                        method_name_text(&alias.new_name),
                        method_name_text(&alias.old_name)
                    )),
                }
            }
            Member::Public(_) => {
                out.push_str(&prefix);
                out.push_str("public\n");
            }
            Member::Private(_) => {
                out.push_str(&prefix);
                out.push_str("private\n");
            }
            Member::Decl(decl) => write_declaration(out, decl, indent),
        }
    }
}

fn write_mixin(out: &mut String, keyword: &str, mixin: &Mixin, prefix: &str) {
    write_annotations(out, &mixin.annotations, prefix);
    out.push_str(prefix);
    out.push_str(&format!("{} {}", keyword, mixin.name));
    write_type_args_text(out, &mixin.args);
    out.push('\n');
}

fn write_annotations(out: &mut String, annotations: &[Annotation], prefix: &str) {
    for annotation in annotations {
        out.push_str(prefix);
        let (open, close) = annotation_delimiters(&annotation.content);
        out.push_str(&format!("%a{}{}{}\n", open, annotation.content, close));
    }
}

fn annotation_delimiters(content: &str) -> (char, char) {
    for (open, close) in [('{', '}'), ('(', ')'), ('[', ']'), ('<', '>'), ('|', '|')] {
        if !content.contains(close) {
            return (open, close);
        }
    }
    ('{', '}')
}

fn write_type_params(out: &mut String, params: &[String]) {
    if !params.is_empty() {
        out.push_str(&format!("[{}]", params.join(", ")));
    }
}

fn write_type_args_text(out: &mut String, args: &[crate::language::types::Type]) {
    if !args.is_empty() {
        let list: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        out.push_str(&format!("[{}]", list.join(", ")));
    }
}

// Reserved words used as method names need backtick quoting to lex again.
fn method_name_text(name: &str) -> String {
    let base = name.trim_end_matches(['?', '!']);
    let plain = !base.is_empty()
        && base
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !base.starts_with(|c: char| c.is_ascii_digit());
    if plain && !is_reserved(base) {
        return name.to_string();
    }
    if is_operator_name(name) {
        return name.to_string();
    }
    format!("`{}`", name)
}

fn is_reserved(name: &str) -> bool {
    matches!(
        name,
        "class"
            | "module"
            | "interface"
            | "type"
            | "include"
            | "extend"
            | "prepend"
            | "extension"
            | "def"
            | "self"
            | "super"
            | "public"
            | "private"
            | "attr_reader"
            | "attr_writer"
            | "attr_accessor"
            | "alias"
            | "any"
            | "void"
            | "bool"
            | "top"
            | "bot"
            | "nil"
            | "instance"
            | "end"
            | "true"
            | "false"
    )
}

fn is_operator_name(name: &str) -> bool {
    matches!(
        name,
        "==" | "<=>"
            | "[]"
            | "[]="
            | "!"
            | "+"
            | "-"
            | "*"
            | "/"
            | "&"
            | "^"
            | "|"
            | "<"
            | "<="
            | ">"
            | ">="
            | "<<"
            | ">>"
            | "%"
            | "**"
            | "~"
            | "+@"
            | "-@"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::parser::parse_signature;

    const SOURCE: &str = "
        %a{core}
        class Registry[A] < Store[A]
          VERSION: String
          @entries: Array[A]
          @@count: Integer
          self.@tracer: any

          include Enumerable[A]
          prepend Guard
          extend Helper

          def get: (Integer key) -> A?
          def set: (Integer, A) -> A | super
          def each: { (A) -> void } -> self | -> Sequence[A]
          def fetch: [X] (Integer) ?{ (Integer) -> X } -> (A | X)
          def `class`: -> class
          def ==: (any) -> bool

          attr_reader name: String
          attr_writer source(@raw): String
          attr_accessor note(): String?

          private
          def reindex: () -> void
          alias lookup get

          class Inner
            def value: -> { ok: bool, when: Symbol }
          end
        end

        module Runnable : Object
          def self?.run: -> void
        end

        interface _Each[A]
          def each: { (A) -> void } -> void
          include _Sized
        end

        extension Registry (Pretty)
          def inspect: -> String
        end

        type key = Integer | Symbol
        ::LIMIT: Integer
        $registry: Registry[any]
    ";

    #[test]
    fn writing_is_a_fixpoint_of_parsing() {
        let first = parse_signature(SOURCE).expect("parse source");
        let written = write_declarations(&first);
        let second = parse_signature(&written).expect("parse written output");
        let rewritten = write_declarations(&second);
        assert_eq!(written, rewritten);
    }

    #[test]
    fn written_output_preserves_structure() {
        let decls = parse_signature(SOURCE).expect("parse source");
        let written = write_declarations(&decls);
        let reparsed = parse_signature(&written).expect("reparse");
        assert_eq!(decls.len(), reparsed.len());
        let Declaration::Class(first) = &decls[0] else {
            panic!("expected class first");
        };
        let Declaration::Class(second) = &reparsed[0] else {
            panic!("expected class first after reparse");
        };
        assert_eq!(first.members.len(), second.members.len());
        assert_eq!(first.type_params, second.type_params);
    }

    #[test]
    fn quotes_reserved_method_names() {
        assert_eq!(method_name_text("class"), "`class`");
        assert_eq!(method_name_text("each"), "each");
        assert_eq!(method_name_text("[]="), "[]=");
        assert_eq!(method_name_text("empty?"), "empty?");
    }
}

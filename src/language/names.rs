use serde::{Serialize, Serializer};
use std::fmt;

/// An ordered path of namespace segments plus an absolute/relative flag.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Namespace {
    path: Vec<String>,
    absolute: bool,
}

impl Namespace {
    pub fn new(path: Vec<String>, absolute: bool) -> Self {
        Self { path, absolute }
    }

    pub fn root() -> Self {
        Self::new(Vec::new(), true)
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), false)
    }

    pub fn parse(source: &str) -> Option<Self> {
        let (absolute, rest) = match source.strip_prefix("::") {
            Some(rest) => (true, rest),
            None => (false, source),
        };
        if rest.is_empty() {
            return Some(Self::new(Vec::new(), absolute));
        }
        let mut path = Vec::new();
        for segment in rest.split("::") {
            if segment.is_empty() || !segment.starts_with(|c: char| c.is_ascii_uppercase()) {
                return None;
            }
            path.push(segment.to_string());
        }
        Some(Self::new(path, absolute))
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.absolute && self.path.is_empty()
    }

    pub fn append(&self, segment: impl Into<String>) -> Self {
        let mut path = self.path.clone();
        path.push(segment.into());
        Self::new(path, self.absolute)
    }

    pub fn parent(&self) -> Self {
        let mut path = self.path.clone();
        path.pop();
        Self::new(path, self.absolute)
    }

    /// Prefix this namespace with `context` unless it is already absolute.
    pub fn absolute_in(&self, context: &Namespace) -> Self {
        if self.absolute {
            return self.clone();
        }
        let mut path = context.path.clone();
        path.extend(self.path.iter().cloned());
        Self::new(path, true)
    }

    /// Yields self, parent, grandparent, … down to the root namespace.
    pub fn ascend(&self) -> Ascend {
        Ascend {
            current: Some(self.clone()),
        }
    }

    /// Splits off the last segment as a type name, if any.
    pub fn to_type_name(&self) -> Option<TypeName> {
        let (last, rest) = self.path.split_last()?;
        Some(TypeName::new(
            Namespace::new(rest.to_vec(), self.absolute),
            last.clone(),
        ))
    }
}

pub struct Ascend {
    current: Option<Namespace>,
}

impl Iterator for Ascend {
    type Item = Namespace;

    fn next(&mut self) -> Option<Namespace> {
        let current = self.current.take()?;
        if !current.path.is_empty() {
            self.current = Some(current.parent());
        }
        Some(current)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            write!(f, "::")?;
        }
        for segment in &self.path {
            write!(f, "{}::", segment)?;
        }
        Ok(())
    }
}

impl Serialize for Namespace {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Syntactic kind of a simple name: `Foo` is class-like, `_Foo` an
/// interface, `foo` an alias.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum NameKind {
    Class,
    Interface,
    Alias,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeName {
    pub namespace: Namespace,
    pub name: String,
}

impl TypeName {
    pub fn new(namespace: Namespace, name: impl Into<String>) -> Self {
        Self {
            namespace,
            name: name.into(),
        }
    }

    /// A relative, unqualified name.
    pub fn simple(name: impl Into<String>) -> Self {
        Self::new(Namespace::empty(), name)
    }

    pub fn parse(source: &str) -> Option<Self> {
        let namespace = Namespace::parse(source);
        if let Some(ns) = namespace {
            // Every segment was class-like; the last one is the simple name.
            if let Some(name) = ns.to_type_name() {
                return Some(name);
            }
            return None;
        }
        // The last segment may be an interface or alias name.
        let (prefix, name) = match source.rfind("::") {
            Some(idx) => (&source[..idx + 2], &source[idx + 2..]),
            None => ("", source),
        };
        if name.is_empty() {
            return None;
        }
        let namespace = if prefix.is_empty() {
            Namespace::empty()
        } else if prefix == "::" {
            Namespace::root()
        } else {
            Namespace::parse(&prefix[..prefix.len() - 2])?
        };
        Some(Self::new(namespace, name))
    }

    pub fn kind(&self) -> NameKind {
        let mut chars = self.name.chars();
        match chars.next() {
            Some('_') => NameKind::Interface,
            Some(c) if c.is_ascii_uppercase() => NameKind::Class,
            _ => NameKind::Alias,
        }
    }

    pub fn is_class(&self) -> bool {
        self.kind() == NameKind::Class
    }

    pub fn is_interface(&self) -> bool {
        self.kind() == NameKind::Interface
    }

    pub fn is_alias(&self) -> bool {
        self.kind() == NameKind::Alias
    }

    pub fn is_absolute(&self) -> bool {
        self.namespace.is_absolute()
    }

    pub fn absolute_in(&self, context: &Namespace) -> Self {
        Self::new(self.namespace.absolute_in(context), self.name.clone())
    }

    /// The namespace formed by this name's own path, for resolving members
    /// declared inside it.
    pub fn to_namespace(&self) -> Namespace {
        self.namespace.append(self.name.clone())
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.namespace, self.name)
    }
}

impl Serialize for TypeName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_round_trips() {
        for text in ["::A::B::C", "A::C", "C", "::C"] {
            let name = TypeName::parse(text).expect(text);
            assert_eq!(name.to_string(), text);
        }
    }

    #[test]
    fn parses_interface_and_alias_names() {
        let iface = TypeName::parse("::A::_Each").expect("interface");
        assert_eq!(iface.kind(), NameKind::Interface);
        assert_eq!(iface.namespace.to_string(), "::A::");

        let alias = TypeName::parse("json").expect("alias");
        assert_eq!(alias.kind(), NameKind::Alias);
        assert!(alias.namespace.is_empty());
    }

    #[test]
    fn ascend_walks_to_root() {
        let ns = Namespace::parse("::A::B").expect("namespace");
        let chain: Vec<String> = ns.ascend().map(|n| n.to_string()).collect();
        assert_eq!(chain, vec!["::A::B::", "::A::", "::"]);
    }

    #[test]
    fn ascend_of_relative_namespace_ends_at_empty() {
        let ns = Namespace::parse("A").expect("namespace");
        let chain: Vec<String> = ns.ascend().map(|n| n.to_string()).collect();
        assert_eq!(chain, vec!["A::", ""]);
    }

    #[test]
    fn absolute_in_prefixes_relative_names() {
        let context = Namespace::parse("::A::B").expect("context");
        let name = TypeName::parse("C::D").expect("name");
        assert_eq!(name.absolute_in(&context).to_string(), "::A::B::C::D");

        let already = TypeName::parse("::X").expect("absolute");
        assert_eq!(already.absolute_in(&context).to_string(), "::X");
    }

    #[test]
    fn to_namespace_appends_own_name() {
        let name = TypeName::parse("::A::B").expect("name");
        assert_eq!(name.to_namespace().to_string(), "::A::B::");
    }
}

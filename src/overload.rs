use crate::language::types::MethodType;
use std::collections::BTreeSet;
use std::fmt;

/// The observable shape of one method call: how many positional arguments,
/// which keywords, and whether a block was given. This is the input the
/// runtime checking hook matches against a method's overload list.
#[derive(Clone, Debug, Default)]
pub struct CallShape {
    pub positionals: usize,
    pub keywords: BTreeSet<String>,
    pub block_given: bool,
}

impl CallShape {
    pub fn positional(count: usize) -> Self {
        Self {
            positionals: count,
            ..Self::default()
        }
    }

    pub fn with_keyword(mut self, name: impl Into<String>) -> Self {
        self.keywords.insert(name.into());
        self
    }

    pub fn with_block(mut self) -> Self {
        self.block_given = true;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShapeError {
    MissingPositionals { expected_at_least: usize, actual: usize },
    ExtraPositionals { expected_at_most: usize, actual: usize },
    MissingKeyword { name: String },
    UnexpectedKeyword { name: String },
    MissingBlock,
    UnexpectedBlock,
}

impl ShapeError {
    // Block mismatches make the better diagnostic: an overload that only
    // failed on argument shape was likely never the intended one.
    fn weight(&self) -> u8 {
        match self {
            ShapeError::MissingBlock | ShapeError::UnexpectedBlock => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeError::MissingPositionals {
                expected_at_least,
                actual,
            } => write!(
                f,
                "wrong number of arguments: expected at least {}, got {}",
                expected_at_least, actual
            ),
            ShapeError::ExtraPositionals {
                expected_at_most,
                actual,
            } => write!(
                f,
                "wrong number of arguments: expected at most {}, got {}",
                expected_at_most, actual
            ),
            ShapeError::MissingKeyword { name } => write!(f, "missing keyword `{}`", name),
            ShapeError::UnexpectedKeyword { name } => write!(f, "unexpected keyword `{}`", name),
            ShapeError::MissingBlock => write!(f, "method expects a block"),
            ShapeError::UnexpectedBlock => write!(f, "method does not take a block"),
        }
    }
}

/// Tries each overload in order and returns the first that accepts the
/// call shape. On failure, returns every overload's failure with the best
/// diagnostic first.
pub fn best_overload<'a>(
    overloads: &'a [MethodType],
    shape: &CallShape,
) -> Result<&'a MethodType, Vec<ShapeError>> {
    let mut failures = Vec::new();
    for method_type in overloads {
        match match_method_type(method_type, shape) {
            Ok(()) => return Ok(method_type),
            Err(err) => failures.push(err),
        }
    }
    failures.sort_by_key(|err| std::cmp::Reverse(err.weight()));
    Err(failures)
}

pub fn match_method_type(method_type: &MethodType, shape: &CallShape) -> Result<(), ShapeError> {
    let function = &method_type.function;

    let required = function.required_positionals.len() + function.trailing_positionals.len();
    if shape.positionals < required {
        return Err(ShapeError::MissingPositionals {
            expected_at_least: required,
            actual: shape.positionals,
        });
    }
    if function.rest_positional.is_none() {
        let max = required + function.optional_positionals.len();
        if shape.positionals > max {
            return Err(ShapeError::ExtraPositionals {
                expected_at_most: max,
                actual: shape.positionals,
            });
        }
    }

    for (name, _) in &function.required_keywords {
        if !shape.keywords.contains(name) {
            return Err(ShapeError::MissingKeyword { name: name.clone() });
        }
    }
    if function.rest_keywords.is_none() {
        for name in &shape.keywords {
            let known = function
                .required_keywords
                .iter()
                .chain(function.optional_keywords.iter())
                .any(|(keyword, _)| keyword == name);
            if !known {
                return Err(ShapeError::UnexpectedKeyword { name: name.clone() });
            }
        }
    }

    match &method_type.block {
        Some(block) if block.required && !shape.block_given => Err(ShapeError::MissingBlock),
        None if shape.block_given => Err(ShapeError::UnexpectedBlock),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::ast::{Declaration, Member, Overload};
    use crate::language::parser::parse_signature;

    fn overloads(method_source: &str) -> Vec<MethodType> {
        let text = format!("class C\n{}\nend", method_source);
        let decls = parse_signature(&text).expect("parse");
        let Declaration::Class(class) = &decls[0] else {
            panic!("expected class");
        };
        let Member::Method(method) = &class.members[0] else {
            panic!("expected method");
        };
        method
            .overloads
            .iter()
            .map(|o| match o {
                Overload::MethodType(t) => t.clone(),
                Overload::Super => panic!("unexpected super"),
            })
            .collect()
    }

    #[test]
    fn picks_the_first_matching_overload() {
        let overloads = overloads("def f: (Integer) -> void | (Integer, Integer) -> void");
        let chosen = best_overload(&overloads, &CallShape::positional(2)).expect("match");
        assert_eq!(chosen.function.required_positionals.len(), 2);
    }

    #[test]
    fn optional_and_rest_positionals_widen_the_range() {
        let overloads = overloads("def f: (Integer, ?Integer, *Integer) -> void");
        assert!(best_overload(&overloads, &CallShape::positional(1)).is_ok());
        assert!(best_overload(&overloads, &CallShape::positional(5)).is_ok());
        assert!(best_overload(&overloads, &CallShape::positional(0)).is_err());
    }

    #[test]
    fn keywords_are_checked() {
        let overloads = overloads("def f: (name: Integer, ?age: Integer) -> void");
        let shape = CallShape::positional(0).with_keyword("name");
        assert!(best_overload(&overloads, &shape).is_ok());

        let missing = CallShape::positional(0);
        assert!(matches!(
            best_overload(&overloads, &missing),
            Err(errors) if errors == vec![ShapeError::MissingKeyword { name: "name".into() }]
        ));

        let unexpected = CallShape::positional(0)
            .with_keyword("name")
            .with_keyword("city");
        assert!(matches!(
            best_overload(&overloads, &unexpected),
            Err(errors) if errors == vec![ShapeError::UnexpectedKeyword { name: "city".into() }]
        ));
    }

    #[test]
    fn keyword_rest_accepts_any_keyword() {
        let overloads = overloads("def f: (**any) -> void");
        let shape = CallShape::positional(0).with_keyword("anything");
        assert!(best_overload(&overloads, &shape).is_ok());
    }

    #[test]
    fn block_requirements_are_checked() {
        let required = overloads("def f: { (Integer) -> void } -> void");
        assert!(matches!(
            best_overload(&required, &CallShape::positional(0)),
            Err(errors) if errors == vec![ShapeError::MissingBlock]
        ));
        assert!(best_overload(&required, &CallShape::positional(0).with_block()).is_ok());

        let optional = overloads("def f: ?{ (Integer) -> void } -> void");
        assert!(best_overload(&optional, &CallShape::positional(0)).is_ok());
        assert!(best_overload(&optional, &CallShape::positional(0).with_block()).is_ok());

        let none = overloads("def f: -> void");
        assert!(matches!(
            best_overload(&none, &CallShape::positional(0).with_block()),
            Err(errors) if errors == vec![ShapeError::UnexpectedBlock]
        ));
    }

    #[test]
    fn block_errors_rank_above_argument_shape_errors() {
        let overloads =
            overloads("def f: (Integer) -> void | { (Integer) -> void } -> void");
        let errors = best_overload(&overloads, &CallShape::positional(0))
            .expect_err("no overload matches");
        assert_eq!(errors[0], ShapeError::MissingBlock);
    }
}

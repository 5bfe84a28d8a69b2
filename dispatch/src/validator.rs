use std::fmt;
use std::sync::Arc;

use dt_model::builtins::is_valid_lexical;
use dt_model::{FacetViolation, ModelObject, QName, Tag, TypeRef, Variant, VariantTable, Variety};

use super::error::SwitchError;
use super::switch::{Outcome, Switch};

/// One failed facet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    /// The variant declaring the facet; may be an ancestor of the instance's own variant
    pub variant: QName,
    pub violation: FacetViolation,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.variant, self.violation)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Report {
    pub diagnostics: Vec<Diagnostic>,
}

impl Report {
    pub fn is_valid(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

/// Checks the lexical values of instances against the facets of their variant chain.
///
/// Every variant that constrains its values, by facets or by being a list or union, gets a
/// handler checking the whole chain; other variants defer to the nearest ancestor that has one.
/// List values are split on whitespace and each item is checked against the item type. A union
/// value is valid when any of its member types accepts it.
pub struct Validator {
    switch: Switch<Report>,
}

impl Validator {
    pub fn new(table: Arc<VariantTable>) -> Result<Self, SwitchError> {
        let constrained = table
            .iter()
            .filter(|(_, variant)| variant.is_constrained())
            .map(|(tag, _)| tag)
            .collect::<Vec<_>>();

        let mut builder = Switch::builder(table.clone());
        for tag in constrained {
            let table = table.clone();
            builder = builder.case(tag, move |object| {
                let Some(value) = object.lexical_value() else {
                    return Ok(Outcome::Concrete(Report::default()));
                };
                let diagnostics = check_value(&table, tag, &value, &mut Vec::new());
                Ok(Outcome::Concrete(Report { diagnostics }))
            })?;
        }

        Ok(Self {
            switch: builder.otherwise(|_| Ok(Some(Report::default()))).build(),
        })
    }

    pub fn table(&self) -> &Arc<VariantTable> {
        self.switch.table()
    }

    pub fn validate(&self, object: &dyn ModelObject) -> Result<Report, SwitchError> {
        Ok(self.switch.dispatch(object)?.unwrap_or_default())
    }
}

/// Checks `value` against `tag` and all its ancestors. `visiting` holds the variants whose check
/// is in progress; a variant reached again through its own item or member types rejects.
fn check_value(
    table: &VariantTable,
    tag: Tag,
    value: &str,
    visiting: &mut Vec<Tag>,
) -> Vec<Diagnostic> {
    let chain = table
        .ancestors(tag)
        .filter_map(|t| table.get(t))
        .collect::<Vec<_>>();
    let Some(variant) = chain.first() else {
        return Vec::new();
    };
    if visiting.contains(&tag) {
        return vec![diagnostic(variant, FacetViolation::MemberTypes)];
    }
    visiting.push(tag);

    let mut diagnostics = Vec::new();
    // Restrictions of a list or union keep the variety of the nearest step that has one
    let variety = chain
        .iter()
        .find(|v| v.variety != Variety::Atomic)
        .map(|v| (*v, &v.variety));
    let items = match variety {
        Some((list, Variety::List(item))) => {
            let items = value.split_whitespace().collect::<Vec<_>>();
            for &item_value in &items {
                diagnostics.extend(check_member(table, list, item, item_value, visiting));
            }
            Some(items.len())
        }
        Some((union, Variety::Union(members))) => {
            let accepted = members
                .iter()
                .any(|m| check_member(table, union, m, value, visiting).is_empty());
            if !accepted {
                diagnostics.push(diagnostic(union, FacetViolation::MemberTypes));
            }
            None
        }
        _ => None,
    };

    for variant in &chain {
        let violations = match items {
            Some(items) => variant.facets.check_list(value, items),
            None => variant.facets.check(value),
        };
        diagnostics.extend(violations.into_iter().map(|v| diagnostic(variant, v)));
    }

    visiting.pop();
    diagnostics
}

fn check_member(
    table: &VariantTable,
    owner: &Variant,
    member: &TypeRef,
    value: &str,
    visiting: &mut Vec<Tag>,
) -> Vec<Diagnostic> {
    match member {
        TypeRef::Variant(tag) => check_value(table, *tag, value, visiting),
        TypeRef::Builtin(name) if is_valid_lexical(name, value) => Vec::new(),
        TypeRef::Builtin(name) => vec![diagnostic(
            owner,
            FacetViolation::Lexical {
                value: value.to_string(),
                builtin: name.local_name.clone(),
            },
        )],
    }
}

fn diagnostic(variant: &Variant, violation: FacetViolation) -> Diagnostic {
    Diagnostic {
        variant: variant.name.clone(),
        violation,
    }
}

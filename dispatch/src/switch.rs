use std::sync::Arc;

use tracing::trace;

use dt_model::{ModelObject, QName, Tag, VariantTable};

use super::error::{HandlerError, SwitchError};

/// What a handler decided for an instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome<T> {
    /// A result; the walk stops here
    Concrete(T),
    /// No opinion; ask the base variant
    Defer,
    /// Explicitly no result; the walk stops here as well
    Absent,
}

impl<T> Outcome<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Concrete(value) => Outcome::Concrete(f(value)),
            Self::Defer => Outcome::Defer,
            Self::Absent => Outcome::Absent,
        }
    }
}

impl<T> From<Option<T>> for Outcome<T> {
    /// `None` defers, like a `null` result from a case method.
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Defer, Self::Concrete)
    }
}

pub type HandlerResult<T> = Result<Outcome<T>, HandlerError>;

type Handler<T> = Box<dyn Fn(&dyn ModelObject) -> HandlerResult<T> + Send + Sync>;
type DefaultHandler<T> = Box<dyn Fn(&dyn ModelObject) -> Result<Option<T>, HandlerError> + Send + Sync>;

/// Dispatches instances of a variant table to per-variant handlers.
///
/// Starting at the instance's dynamic tag, the handler of each tag on the ancestor chain is asked
/// in turn until one of them does not [defer](Outcome::Defer). If every tag defers, the default
/// handler decides. The handler table is fixed once the switch is built.
pub struct Switch<T> {
    table: Arc<VariantTable>,
    handlers: Box<[Option<Handler<T>>]>,
    default: DefaultHandler<T>,
}

impl<T> Switch<T> {
    pub fn builder(table: Arc<VariantTable>) -> SwitchBuilder<T> {
        SwitchBuilder::new(table)
    }

    pub fn table(&self) -> &Arc<VariantTable> {
        &self.table
    }

    pub fn has_handler(&self, tag: Tag) -> bool {
        self.table.contains(tag) && self.handlers[tag.index()].is_some()
    }

    /// Resolves `object` starting at its own dynamic tag.
    pub fn dispatch(&self, object: &dyn ModelObject) -> Result<Option<T>, SwitchError> {
        let variant = object.variant();
        self.check_known(variant)?;
        self.walk(variant, object)
    }

    /// Resolves `object` starting at `start`, which must be the object's dynamic tag or one of its
    /// ancestors. Lets a handler fall back to the behavior of its base variant.
    pub fn dispatch_from(
        &self,
        start: Tag,
        object: &dyn ModelObject,
    ) -> Result<Option<T>, SwitchError> {
        let variant = object.variant();
        self.check_known(variant)?;
        self.check_known(start)?;
        if !self.table.is_ancestor_or_self(start, variant) {
            return Err(SwitchError::NotAnAncestor {
                start: self.name_of(start),
                variant: self.name_of(variant),
            });
        }
        self.walk(start, object)
    }

    fn walk(&self, start: Tag, object: &dyn ModelObject) -> Result<Option<T>, SwitchError> {
        for tag in self.table.ancestors(start) {
            let Some(handler) = &self.handlers[tag.index()] else {
                continue;
            };
            let outcome = handler(object).map_err(|source| SwitchError::HandlerFailure {
                variant: self.name_of(tag),
                source,
            })?;
            match outcome {
                Outcome::Concrete(value) => {
                    trace!(variant = %self.name_of(tag), "resolved");
                    return Ok(Some(value));
                }
                Outcome::Absent => {
                    trace!(variant = %self.name_of(tag), "resolved to no result");
                    return Ok(None);
                }
                Outcome::Defer => trace!(variant = %self.name_of(tag), "deferred"),
            }
        }

        trace!(variant = %self.name_of(object.variant()), "falling back to default");
        (self.default)(object).map_err(|source| SwitchError::HandlerFailure {
            variant: self.name_of(object.variant()),
            source,
        })
    }

    fn check_known(&self, tag: Tag) -> Result<(), SwitchError> {
        if self.table.contains(tag) {
            Ok(())
        } else {
            Err(SwitchError::UnknownVariant {
                tag,
                family: self.table.family(),
            })
        }
    }

    fn name_of(&self, tag: Tag) -> QName {
        self.table
            .name(tag)
            .cloned()
            .expect("tag was checked against the table")
    }
}

pub struct SwitchBuilder<T> {
    table: Arc<VariantTable>,
    handlers: Vec<Option<Handler<T>>>,
    default: Option<DefaultHandler<T>>,
}

impl<T> SwitchBuilder<T> {
    fn new(table: Arc<VariantTable>) -> Self {
        let handlers = std::iter::repeat_with(|| None).take(table.len()).collect();
        Self {
            table,
            handlers,
            default: None,
        }
    }

    /// Registers the handler for `tag`. Each tag takes at most one handler.
    pub fn case<F>(mut self, tag: Tag, handler: F) -> Result<Self, SwitchError>
    where
        F: Fn(&dyn ModelObject) -> HandlerResult<T> + Send + Sync + 'static,
    {
        let Some(variant) = self.table.get(tag) else {
            return Err(SwitchError::UnknownVariant {
                tag,
                family: self.table.family(),
            });
        };
        let slot = &mut self.handlers[tag.index()];
        if slot.is_some() {
            return Err(SwitchError::DuplicateHandler(variant.name.clone()));
        }
        *slot = Some(Box::new(handler));
        Ok(self)
    }

    /// Registers the handler for the variant called `name`.
    pub fn case_named<F>(self, name: &QName, handler: F) -> Result<Self, SwitchError>
    where
        F: Fn(&dyn ModelObject) -> HandlerResult<T> + Send + Sync + 'static,
    {
        let tag = self
            .table
            .tag(name)
            .ok_or_else(|| SwitchError::UnknownName(name.clone()))?;
        self.case(tag, handler)
    }

    /// Registers the handler for the variant called `local_name` in the table's target namespace.
    pub fn case_local<F>(self, local_name: &str, handler: F) -> Result<Self, SwitchError>
    where
        F: Fn(&dyn ModelObject) -> HandlerResult<T> + Send + Sync + 'static,
    {
        let name =
            QName::with_optional_namespace(self.table.target_namespace(), local_name);
        self.case_named(&name, handler)
    }

    /// Sets the handler used once every tag on the chain has deferred. Without one, the switch
    /// yields no result.
    pub fn otherwise<F>(mut self, handler: F) -> Self
    where
        F: Fn(&dyn ModelObject) -> Result<Option<T>, HandlerError> + Send + Sync + 'static,
    {
        self.default = Some(Box::new(handler));
        self
    }

    pub fn build(self) -> Switch<T> {
        Switch {
            table: self.table,
            handlers: self.handlers.into_boxed_slice(),
            default: self
                .default
                .unwrap_or_else(|| Box::new(|_: &dyn ModelObject| Ok(None))),
        }
    }
}

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::num::{NonZeroU32, NonZeroUsize};
use std::sync::atomic::{AtomicU32, Ordering};

/// Identifies one built [`VariantTable`](crate::VariantTable). Tags of different families never
/// compare equal, even if their indices coincide.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct FamilyId(NonZeroU32);

impl FamilyId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU32 = AtomicU32::new(1);
        let id = NEXT.fetch_add(1, Ordering::Relaxed);
        Self(NonZeroU32::new(id).expect("Family ID counter wrapped around"))
    }
}

impl fmt::Display for FamilyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "family #{}", self.0)
    }
}

/// A variant type tag: one node of a table's closed type hierarchy.
///
/// Tags are only created by [`VariantTable`](crate::VariantTable) and are meaningless without it;
/// use the table to get at the variant's name and base.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Tag {
    family: FamilyId,
    id: NonZeroU32,
}

impl Tag {
    pub(crate) const fn new(family: FamilyId, id: NonZeroU32) -> Self {
        Self { family, id }
    }

    pub const fn family(self) -> FamilyId {
        self.family
    }

    /// Zero-based position of this tag in its table.
    pub fn index(self) -> usize {
        let size: NonZeroUsize = self
            .id
            .try_into()
            .expect("Could not convert variant tag to usize index");
        usize::from(size) - 1
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "<Tag #{} of {}>", self.id, self.family)
    }
}

/// Helper supertrait that lets `dyn ModelObject` be viewed as `dyn Any`.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An instance of the model hierarchy.
///
/// Every instance reports exactly one dynamic tag; it is implicitly an instance of every ancestor
/// of that tag as well.
pub trait ModelObject: AsAny + Send + Sync + 'static {
    fn variant(&self) -> Tag;

    /// The lexical form of simple content, if this instance has any.
    fn lexical_value(&self) -> Option<Cow<'_, str>> {
        None
    }
}

impl dyn ModelObject {
    pub fn downcast_ref<T: ModelObject>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }

    pub fn is<T: ModelObject>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

impl fmt::Debug for dyn ModelObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelObject")
            .field("variant", &self.variant())
            .finish_non_exhaustive()
    }
}

/// A model instance that carries nothing but its tag and an optional lexical value.
///
/// Useful for tooling that only knows the schema, not the generated model types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DynamicObject {
    variant: Tag,
    text: Option<String>,
}

impl DynamicObject {
    pub fn new(variant: Tag) -> Self {
        Self {
            variant,
            text: None,
        }
    }

    pub fn with_text(variant: Tag, text: impl Into<String>) -> Self {
        Self {
            variant,
            text: Some(text.into()),
        }
    }
}

impl ModelObject for DynamicObject {
    fn variant(&self) -> Tag {
        self.variant
    }

    fn lexical_value(&self) -> Option<Cow<'_, str>> {
        self.text.as_deref().map(Cow::Borrowed)
    }
}

use std::collections::HashMap;
use std::num::NonZeroU32;

use tracing::debug;

use super::builtins::{is_builtin_name, XS_ANY_SIMPLE_TYPE_NAME, XS_ANY_TYPE_NAME};
use super::error::TableError;
use super::facets::{FacetSource, Facets};
use super::tag::{FamilyId, Tag};
use super::xstypes::QName;
use super::UnsupportedFacetAction;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VariantKind {
    /// The universal base variant every chain ends in
    Root,
    Complex,
    Simple,
}

/// An item or member type of a list or union variant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeRef {
    Variant(Tag),
    /// A builtin type of the XML Schema namespace; never part of a table
    Builtin(QName),
}

/// {variety} of a simple type definition (pt. 2, §4.1.1). `R` names item and member types.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Variety<R = TypeRef> {
    Atomic,
    List(R),
    Union(Vec<R>),
}

impl<R> Variety<R> {
    fn map<S>(self, mut f: impl FnMut(R) -> S) -> Variety<S> {
        match self {
            Self::Atomic => Variety::Atomic,
            Self::List(item) => Variety::List(f(item)),
            Self::Union(members) => Variety::Union(members.into_iter().map(f).collect()),
        }
    }

    fn try_map<S, E>(self, mut f: impl FnMut(R) -> Result<S, E>) -> Result<Variety<S>, E> {
        Ok(match self {
            Self::Atomic => Variety::Atomic,
            Self::List(item) => Variety::List(f(item)?),
            Self::Union(members) => {
                Variety::Union(members.into_iter().map(f).collect::<Result<_, _>>()?)
            }
        })
    }
}

/// One entry of a [`VariantTable`].
#[derive(Clone, Debug)]
pub struct Variant {
    pub name: QName,
    pub kind: VariantKind,
    /// The direct ancestor; `None` only for the root
    pub base: Option<Tag>,
    pub facets: Facets,
    /// `Atomic` for complex variants and the root
    pub variety: Variety,
}

impl Variant {
    /// Whether values of this variant are constrained beyond those of its base.
    pub fn is_constrained(&self) -> bool {
        !self.facets.is_empty() || self.variety != Variety::Atomic
    }
}

/// The closed set of variant tags of one schema family, with their single-inheritance ancestor
/// relation.
///
/// A table is immutable once built. Each table gets its own [`FamilyId`], so tags of one table
/// are never mistaken for tags of another.
#[derive(Debug)]
pub struct VariantTable {
    family: FamilyId,
    target_namespace: Option<String>,
    variants: Box<[Variant]>,
    lookup: HashMap<QName, Tag>,
}

impl VariantTable {
    pub fn builder(target_namespace: Option<&str>) -> VariantTableBuilder {
        VariantTableBuilder::new(target_namespace)
    }

    pub fn family(&self) -> FamilyId {
        self.family
    }

    pub fn target_namespace(&self) -> Option<&str> {
        self.target_namespace.as_deref()
    }

    /// The universal base tag.
    pub fn root(&self) -> Tag {
        // The root is always stored first
        Tag::new(self.family, NonZeroU32::MIN)
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn contains(&self, tag: Tag) -> bool {
        tag.family() == self.family && tag.index() < self.variants.len()
    }

    pub fn get(&self, tag: Tag) -> Option<&Variant> {
        if tag.family() != self.family {
            return None;
        }
        self.variants.get(tag.index())
    }

    pub fn name(&self, tag: Tag) -> Option<&QName> {
        self.get(tag).map(|v| &v.name)
    }

    pub fn base(&self, tag: Tag) -> Option<Tag> {
        self.get(tag).and_then(|v| v.base)
    }

    pub fn facets(&self, tag: Tag) -> Option<&Facets> {
        self.get(tag).map(|v| &v.facets)
    }

    pub fn tag(&self, name: &QName) -> Option<Tag> {
        self.lookup.get(name).copied()
    }

    /// Looks up a variant by its local name in the table's target namespace.
    pub fn tag_by_local_name(&self, local_name: &str) -> Option<Tag> {
        let name = QName::with_optional_namespace(self.target_namespace.as_deref(), local_name);
        self.tag(&name)
    }

    /// Iterates over `tag` and its ancestors, most specific first, ending with the root.
    /// A foreign tag yields nothing.
    pub fn ancestors(&self, tag: Tag) -> Ancestors<'_> {
        Ancestors {
            current: self.contains(tag).then_some(tag),
            table: self,
        }
    }

    /// Whether `ancestor` is `tag` itself or lies on `tag`'s ancestor chain.
    pub fn is_ancestor_or_self(&self, ancestor: Tag, tag: Tag) -> bool {
        self.ancestors(tag).any(|t| t == ancestor)
    }

    /// Number of derivation steps between `tag` and the root.
    pub fn depth(&self, tag: Tag) -> Option<usize> {
        self.contains(tag).then(|| self.ancestors(tag).count() - 1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tag, &Variant)> + '_ {
        self.variants.iter().enumerate().map(|(index, variant)| {
            // The builder checks the table size against u32
            let id = NonZeroU32::MIN.saturating_add(index as u32);
            (Tag::new(self.family, id), variant)
        })
    }
}

/// Iterator over a tag and its ancestors.
/// > The ancestors of a ·type definition· are its {base type definition} and the ·ancestors· of
/// > its {base type definition}. (pt. 1, §3.16.2.2)
///
/// Unlike the type definition hierarchy of XSD itself, where `xs:anyType` is its own base, the
/// root of a variant table has no base, so this iterator always terminates.
pub struct Ancestors<'a> {
    current: Option<Tag>,
    table: &'a VariantTable,
}

impl Iterator for Ancestors<'_> {
    type Item = Tag;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.current?;
        self.current = self.table.base(current);
        Some(current)
    }
}

struct Declaration {
    name: QName,
    kind: VariantKind,
    base: Option<QName>,
    facets: FacetSource,
    variety: Variety<QName>,
}

pub struct VariantTableBuilder {
    target_namespace: Option<String>,
    root_name: QName,
    declarations: Vec<Declaration>,
    unsupported_facet: UnsupportedFacetAction,
}

impl VariantTableBuilder {
    fn new(target_namespace: Option<&str>) -> Self {
        Self {
            target_namespace: target_namespace.map(Into::into),
            root_name: XS_ANY_TYPE_NAME.clone(),
            declarations: Vec::new(),
            unsupported_facet: UnsupportedFacetAction::Deny,
        }
    }

    /// Overrides the name of the universal base variant (`xs:anyType` by default).
    pub fn root_name(mut self, name: QName) -> Self {
        self.root_name = name;
        self
    }

    pub fn unsupported_facet(mut self, action: UnsupportedFacetAction) -> Self {
        self.unsupported_facet = action;
        self
    }

    /// Declares a variant. A `base` of `None`, or the root's name, makes it a direct child of the
    /// root. Item and member types are either builtins or other declared variants.
    pub fn declare(
        &mut self,
        name: QName,
        kind: VariantKind,
        base: Option<QName>,
        facets: FacetSource,
        variety: Variety<QName>,
    ) -> &mut Self {
        self.declarations.push(Declaration {
            name,
            kind,
            base,
            facets,
            variety,
        });
        self
    }

    /// Shorthand for declaring a complex variant by local names in the target namespace.
    pub fn variant(mut self, local_name: &str, base: Option<&str>) -> Self {
        let name = self.local(local_name);
        let base = base.map(|b| self.local(b));
        self.declare(
            name,
            VariantKind::Complex,
            base,
            FacetSource::default(),
            Variety::Atomic,
        );
        self
    }

    /// Shorthand for declaring a simple variant with facets by local names in the target
    /// namespace.
    pub fn simple_variant(
        mut self,
        local_name: &str,
        base: Option<&str>,
        facets: FacetSource,
    ) -> Self {
        let name = self.local(local_name);
        let base = base.map(|b| self.local(b));
        self.declare(name, VariantKind::Simple, base, facets, Variety::Atomic);
        self
    }

    /// Shorthand for declaring a list variant in the target namespace, constrained by `facets`.
    pub fn list_variant(mut self, local_name: &str, item: QName, facets: FacetSource) -> Self {
        let name = self.local(local_name);
        self.declare(name, VariantKind::Simple, None, facets, Variety::List(item));
        self
    }

    /// Shorthand for declaring a union variant in the target namespace.
    pub fn union_variant(mut self, local_name: &str, members: Vec<QName>) -> Self {
        let name = self.local(local_name);
        self.declare(
            name,
            VariantKind::Simple,
            None,
            FacetSource::default(),
            Variety::Union(members),
        );
        self
    }

    /// Rewrites the declared base, item and member type names. A base mapped to `None` attaches
    /// the variant to the root; an item or member type mapped to `None` becomes
    /// `xs:anySimpleType`.
    pub(crate) fn map_references(mut self, f: impl Fn(&QName) -> Option<QName>) -> Self {
        for declaration in &mut self.declarations {
            if let Some(base) = &declaration.base {
                declaration.base = f(base);
            }
            let variety = std::mem::replace(&mut declaration.variety, Variety::Atomic);
            declaration.variety =
                variety.map(|r| f(&r).unwrap_or_else(|| XS_ANY_SIMPLE_TYPE_NAME.clone()));
        }
        self
    }

    fn local(&self, local_name: &str) -> QName {
        QName::with_optional_namespace(self.target_namespace.as_deref(), local_name)
    }

    pub fn build(self) -> Result<VariantTable, TableError> {
        let family = FamilyId::next();
        let count = self.declarations.len() + 1;
        if u32::try_from(count).is_err() {
            return Err(TableError::Overflow);
        }
        // `index + 1` fits into u32 after the check above
        let tag_at = |index: usize| Tag::new(family, NonZeroU32::MIN.saturating_add(index as u32));

        let mut lookup = HashMap::with_capacity(count);
        lookup.insert(self.root_name.clone(), tag_at(0));
        for (i, declaration) in self.declarations.iter().enumerate() {
            if lookup
                .insert(declaration.name.clone(), tag_at(i + 1))
                .is_some()
            {
                return Err(TableError::DuplicateVariant(declaration.name.clone()));
            }
        }

        let mut variants = Vec::with_capacity(count);
        variants.push(Variant {
            name: self.root_name.clone(),
            kind: VariantKind::Root,
            base: None,
            facets: Facets::default(),
            variety: Variety::Atomic,
        });
        for declaration in self.declarations {
            let base = match declaration.base {
                None => tag_at(0),
                Some(base) => *lookup.get(&base).ok_or_else(|| TableError::UnknownBase {
                    variant: declaration.name.clone(),
                    base,
                })?,
            };
            let facets = Facets::compile(
                &declaration.name,
                declaration.facets,
                self.unsupported_facet,
            )?;
            let variety = declaration.variety.try_map(|reference| {
                if is_builtin_name(&reference) {
                    Ok(TypeRef::Builtin(reference))
                } else {
                    match lookup.get(&reference) {
                        Some(&tag) => Ok(TypeRef::Variant(tag)),
                        None => Err(TableError::UnknownTypeReference {
                            variant: declaration.name.clone(),
                            reference,
                        }),
                    }
                }
            })?;
            variants.push(Variant {
                name: declaration.name,
                kind: declaration.kind,
                base: Some(base),
                facets,
                variety,
            });
        }

        check_acyclic(&variants)?;
        debug!(%family, variants = variants.len(), "built variant table");

        Ok(VariantTable {
            family,
            target_namespace: self.target_namespace,
            variants: variants.into_boxed_slice(),
            lookup,
        })
    }
}

/// Every chain must reach the root; a chain that revisits a variant before that is a cycle.
fn check_acyclic(variants: &[Variant]) -> Result<(), TableError> {
    #[derive(Copy, Clone, PartialEq, Eq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    let mut marks = vec![Mark::Unvisited; variants.len()];
    marks[0] = Mark::Done;
    for start in 1..variants.len() {
        let mut path = Vec::new();
        let mut current = start;
        while marks[current] == Mark::Unvisited {
            marks[current] = Mark::InProgress;
            path.push(current);
            // Only the root lacks a base, and it is already marked done
            current = variants[current].base.map(Tag::index).unwrap_or(0);
        }
        if marks[current] == Mark::InProgress {
            return Err(TableError::Cycle(variants[current].name.clone()));
        }
        for index in path {
            marks[index] = Mark::Done;
        }
    }
    Ok(())
}

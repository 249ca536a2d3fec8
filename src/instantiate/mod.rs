//! Instantiation catalogues and call-time dispatch.
//!
//! Every entry point of a template (one export name) gets a [`Catalogue`]:
//! its instantiations, most specific first, each with the argument patterns
//! of its callable signatures. [`Catalogue::select`] matches a runtime
//! [`CallDescriptor`] against the patterns with a fixed predicate chain:
//!
//! 1. [`MatchTier::Exact`]: scalar kinds and classes match exactly,
//! 2. [`MatchTier::Compatible`]: arrays of matching rank and shape with a
//!    convertible element type, numeric widening, subclasses,
//! 3. [`MatchTier::Generic`]: parameters accepting any rank or any value.
//!
//! A call takes the best tier any entry reaches. Within that tier the first
//! entry in catalogue order wins, unless a second one of the same
//! specificity matches too. Catalogues are immutable and `Send + Sync`, so
//! concurrent lookups need no locking.

use serde::Serialize;
use smol_str::SmolStr;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

use crate::base::mangle;
use crate::error::{DispatchError, MarshalError};
use crate::export::{ExportedInstantiation, ExportedItem, ExportedTemplate};
use crate::marshal::{Dim, NativeType, Ownership, Registry, ScalarKind};
use crate::model::{Param, Specificity};
use crate::runtime::{HostElement, HostValue};
use crate::runtime::value::join;

// ============================================================================
// Call descriptors
// ============================================================================

/// The shape of one runtime argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArgTag {
    None,
    Bool,
    Int,
    Float,
    Str,
    Object(String),
    Array { element: HostElement, shape: Vec<usize> },
}

impl ArgTag {
    pub fn of(value: &HostValue) -> ArgTag {
        match value {
            HostValue::None => ArgTag::None,
            HostValue::Bool(_) => ArgTag::Bool,
            HostValue::Int(_) => ArgTag::Int,
            HostValue::Float(_) => ArgTag::Float,
            HostValue::Str(_) => ArgTag::Str,
            HostValue::Object(o) => ArgTag::Object(o.class().to_string()),
            HostValue::Array(a) => ArgTag::Array {
                element: a.element(),
                shape: a.shape.clone(),
            },
        }
    }
}

impl fmt::Display for ArgTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgTag::None => f.write_str("None"),
            ArgTag::Bool => f.write_str("bool"),
            ArgTag::Int => f.write_str("int"),
            ArgTag::Float => f.write_str("float"),
            ArgTag::Str => f.write_str("str"),
            ArgTag::Object(class) => f.write_str(class),
            ArgTag::Array { element, shape } => write!(f, "array<{element}>[{}]", join(shape)),
        }
    }
}

/// Argument count plus a tag per argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct CallDescriptor {
    pub args: Vec<ArgTag>,
}

impl CallDescriptor {
    pub fn new(args: Vec<ArgTag>) -> Self {
        Self { args }
    }

    pub fn of(values: &[HostValue]) -> Self {
        Self {
            args: values.iter().map(ArgTag::of).collect(),
        }
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

impl fmt::Display for CallDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{arg}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Patterns
// ============================================================================

/// How well an argument matches a pattern; lower is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchTier {
    Exact,
    Compatible,
    Generic,
}

/// What one parameter accepts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "pattern", rename_all = "lowercase")]
pub enum ArgPattern {
    Scalar { kind: ScalarKind },
    Str,
    Object { class: String, nullable: bool },
    Array { element: ScalarKind, dims: Option<Vec<Dim>> },
    Any,
}

impl ArgPattern {
    /// `None` for `void`.
    pub fn from_native(native: &NativeType) -> Option<ArgPattern> {
        Some(match native {
            NativeType::Void => return None,
            NativeType::Scalar { kind } => ArgPattern::Scalar { kind: *kind },
            NativeType::String { .. } => ArgPattern::Str,
            NativeType::Array(a) => ArgPattern::Array {
                element: a.element,
                dims: a.dims.clone(),
            },
            NativeType::Object { class, ownership } => ArgPattern::Object {
                class: class.clone(),
                nullable: *ownership == Ownership::Borrowed,
            },
            NativeType::HostObject => ArgPattern::Any,
        })
    }

    pub fn matches(&self, arg: &ArgTag, is_subclass: &dyn Fn(&str, &str) -> bool) -> Option<MatchTier> {
        match (self, arg) {
            (ArgPattern::Any, _) => Some(MatchTier::Generic),
            (ArgPattern::Scalar { kind }, arg) => scalar_tier(*kind, arg),
            (ArgPattern::Str, ArgTag::Str) => Some(MatchTier::Exact),
            (ArgPattern::Object { class, .. }, ArgTag::Object(actual)) => {
                if actual == class {
                    Some(MatchTier::Exact)
                } else if is_subclass(actual, class) {
                    Some(MatchTier::Compatible)
                } else {
                    None
                }
            }
            (ArgPattern::Object { nullable: true, .. }, ArgTag::None) => Some(MatchTier::Compatible),
            (ArgPattern::Array { element, dims }, ArgTag::Array { element: host, shape }) => {
                if !element_compatible(*element, *host) {
                    return None;
                }
                match dims {
                    None => Some(MatchTier::Generic),
                    Some(dims) => (dims.len() == shape.len()
                        && dims.iter().zip(shape).all(|(d, n)| d.accepts(*n)))
                    .then_some(MatchTier::Compatible),
                }
            }
            _ => None,
        }
    }
}

fn scalar_tier(kind: ScalarKind, arg: &ArgTag) -> Option<MatchTier> {
    match (kind, arg) {
        (ScalarKind::Bool, ArgTag::Bool) => Some(MatchTier::Exact),
        (ScalarKind::Char, ArgTag::Str) => Some(MatchTier::Compatible),
        (k, ArgTag::Int) if k.is_integer() => Some(MatchTier::Exact),
        (k, ArgTag::Int) if k.is_float() => Some(MatchTier::Compatible),
        (k, ArgTag::Float) if k.is_float() => Some(MatchTier::Exact),
        _ => None,
    }
}

fn element_compatible(element: ScalarKind, host: HostElement) -> bool {
    match host {
        HostElement::Bool => element == ScalarKind::Bool,
        HostElement::Int => element.is_integer() || element.is_float(),
        HostElement::Float => element.is_float(),
    }
}

/// Patterns of one callable signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SignaturePattern {
    pub params: Vec<ArgPattern>,
    /// Trailing parameters with default arguments may be omitted.
    pub required: usize,
}

impl SignaturePattern {
    pub fn from_params(params: &[Param], registry: &Registry) -> Result<Self, MarshalError> {
        let patterns = params
            .iter()
            .map(|p| {
                let rule = registry.rule(&p.ty)?;
                ArgPattern::from_native(&rule.native)
                    .ok_or_else(|| MarshalError::unsupported(p.ty.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let required = params
            .iter()
            .rposition(|p| p.default.is_none())
            .map_or(0, |i| i + 1);
        Ok(Self {
            params: patterns,
            required,
        })
    }

    /// The worst tier over all arguments, if every argument matches.
    pub fn matches(&self, call: &CallDescriptor, is_subclass: &dyn Fn(&str, &str) -> bool) -> Option<MatchTier> {
        if call.arity() < self.required || call.arity() > self.params.len() {
            return None;
        }
        let mut tier = MatchTier::Exact;
        for (pattern, arg) in self.params.iter().zip(&call.args) {
            tier = tier.max(pattern.matches(arg, is_subclass)?);
        }
        Some(tier)
    }
}

// ============================================================================
// Catalogues
// ============================================================================

/// One instantiation reachable through an entry point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    /// `Sum<int, 3>`, `sum<float, 3>`.
    pub native: String,
    pub specificity: Specificity,
    /// Constructors for classes, the signature for functions.
    pub signatures: Vec<SignaturePattern>,
}

/// The result of a successful match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub entry: usize,
    pub signature: usize,
    pub tier: MatchTier,
}

#[derive(Debug, Clone, Serialize)]
pub struct Catalogue {
    pub name: SmolStr,
    /// Most specific first.
    entries: Vec<Entry>,
    #[serde(skip)]
    registry: Registry,
}

impl Catalogue {
    /// Entries are stably ordered by specificity.
    pub fn new(name: impl Into<SmolStr>, mut entries: Vec<Entry>, registry: Registry) -> Self {
        entries.sort_by_key(|e| e.specificity);
        Self {
            name: name.into(),
            entries,
            registry,
        }
    }

    /// The catalogue of entry point `export_name` of `template`, shared.
    ///
    /// Fails when one of its instantiations cannot be registered: a
    /// constructor or function parameter, or a function return type, without
    /// a marshaling rule.
    pub fn for_entry_point(
        template: &ExportedTemplate,
        export_name: &str,
        registry: &Registry,
    ) -> Result<Arc<Catalogue>, MarshalError> {
        let entries = template
            .instantiations
            .iter()
            .filter(|i| i.export_name == export_name)
            .map(|i| entry(i, registry))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Arc::new(Catalogue::new(export_name, entries, registry.clone())))
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pick the instantiation for `call`.
    pub fn select(&self, call: &CallDescriptor) -> Result<Selection, DispatchError> {
        let is_subclass = |d: &str, b: &str| self.registry.is_subclass(d, b);
        let matches: Vec<Selection> = self
            .entries
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                entry
                    .signatures
                    .iter()
                    .enumerate()
                    .filter_map(|(s, sig)| sig.matches(call, &is_subclass).map(|tier| (s, tier)))
                    .min_by_key(|(_, tier)| *tier)
                    .map(|(signature, tier)| Selection {
                        entry: index,
                        signature,
                        tier,
                    })
            })
            .collect();

        let Some(best) = matches.iter().map(|m| m.tier).min() else {
            return Err(DispatchError::NoMatchingInstantiation {
                name: self.name.to_string(),
                descriptor: call.to_string(),
            });
        };
        let tier: Vec<&Selection> = matches.iter().filter(|m| m.tier == best).collect();
        let first = *tier[0];
        let specificity = self.entries[first.entry].specificity;
        let rivals: Vec<String> = tier
            .iter()
            .filter(|m| self.entries[m.entry].specificity == specificity)
            .map(|m| self.entries[m.entry].native.clone())
            .collect();
        if rivals.len() > 1 {
            return Err(DispatchError::AmbiguousInstantiation {
                name: self.name.to_string(),
                candidates: rivals,
            });
        }
        trace!(
            entry_point = %self.name,
            native = %self.entries[first.entry].native,
            tier = ?first.tier,
            "dispatched"
        );
        Ok(first)
    }

    pub fn entry(&self, selection: &Selection) -> Option<&Entry> {
        self.entries.get(selection.entry)
    }
}

/// Host name under which one instantiation is registered: the export name
/// when no other instantiation shares it, otherwise the export name
/// suffixed with the mangled template arguments (`Sum_int_3`).
pub fn binding_name(instantiation: &ExportedInstantiation, shared: bool) -> String {
    if !shared {
        return instantiation.export_name.to_string();
    }
    let args: Vec<String> = instantiation.args.iter().map(ToString::to_string).collect();
    format!("{}_{}", instantiation.export_name, mangle(&args.join("_")))
}

fn entry(instantiation: &ExportedInstantiation, registry: &Registry) -> Result<Entry, MarshalError> {
    let signatures = match &instantiation.item {
        ExportedItem::Function(f) => {
            registry.return_rule(&f.signature.ret)?;
            vec![SignaturePattern::from_params(&f.signature.params, registry)?]
        }
        ExportedItem::Class(c) => {
            let mut signatures = c
                .constructors
                .iter()
                .map(|ctor| SignaturePattern::from_params(&ctor.params, registry))
                .collect::<Result<Vec<_>, _>>()?;
            if c.default_constructor {
                signatures.push(SignaturePattern {
                    params: Vec::new(),
                    required: 0,
                });
            }
            signatures
        }
    };
    Ok(Entry {
        native: instantiation.native.clone(),
        specificity: instantiation.specificity,
        signatures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::HostArray;
    use rstest::rstest;

    fn array(element: ScalarKind, dims: &[Dim]) -> ArgPattern {
        ArgPattern::Array {
            element,
            dims: Some(dims.to_vec()),
        }
    }

    fn sig(params: Vec<ArgPattern>) -> SignaturePattern {
        let required = params.len();
        SignaturePattern { params, required }
    }

    fn entry(native: &str, specificity: Specificity, params: Vec<ArgPattern>) -> Entry {
        Entry {
            native: native.to_string(),
            specificity,
            signatures: vec![sig(params)],
        }
    }

    fn ranked() -> Catalogue {
        Catalogue::new(
            "norm",
            vec![
                entry("norm<1>", Specificity::Primary, vec![array(ScalarKind::F64, &[Dim::Dynamic])]),
                entry(
                    "norm<2>",
                    Specificity::Primary,
                    vec![array(ScalarKind::F64, &[Dim::Dynamic, Dim::Dynamic])],
                ),
            ],
            Registry::new(),
        )
    }

    fn call(values: &[HostValue]) -> CallDescriptor {
        CallDescriptor::of(values)
    }

    #[test]
    fn test_rank_selects_instantiation() {
        let catalogue = ranked();
        let rank1 = call(&[HostArray::vector([1.0, 2.0]).into()]);
        let rank2 = call(&[HostArray::from_floats(&[2, 2], [1.0; 4]).unwrap().into()]);
        let rank3 = call(&[HostArray::from_floats(&[1, 1, 1], [1.0]).unwrap().into()]);
        assert_eq!(catalogue.select(&rank1).unwrap().entry, 0);
        assert_eq!(catalogue.select(&rank2).unwrap().entry, 1);
        assert!(matches!(
            catalogue.select(&rank3),
            Err(DispatchError::NoMatchingInstantiation { .. })
        ));
    }

    #[test]
    fn test_fixed_lengths_disambiguate() {
        let catalogue = Catalogue::new(
            "sum",
            vec![
                entry("sum<float, 3>", Specificity::Primary, vec![array(ScalarKind::F32, &[Dim::Fixed(3)])]),
                entry("sum<float, 4>", Specificity::Primary, vec![array(ScalarKind::F32, &[Dim::Fixed(4)])]),
            ],
            Registry::new(),
        );
        let four = call(&[HostArray::vector([1.0; 4]).into()]);
        let selection = catalogue.select(&four).unwrap();
        assert_eq!(catalogue.entry(&selection).unwrap().native, "sum<float, 4>");
    }

    #[test]
    fn test_exact_scalar_beats_widening() {
        let catalogue = Catalogue::new(
            "twice",
            vec![
                entry("twice<double>", Specificity::Primary, vec![ArgPattern::Scalar { kind: ScalarKind::F64 }]),
                entry("twice<int>", Specificity::Primary, vec![ArgPattern::Scalar { kind: ScalarKind::I32 }]),
            ],
            Registry::new(),
        );
        let int = catalogue.select(&call(&[HostValue::Int(2)])).unwrap();
        assert_eq!((int.entry, int.tier), (1, MatchTier::Exact));
        let float = catalogue.select(&call(&[HostValue::Float(2.0)])).unwrap();
        assert_eq!((float.entry, float.tier), (0, MatchTier::Exact));
    }

    #[test]
    fn test_generic_is_a_fallback() {
        let catalogue = Catalogue::new(
            "total",
            vec![
                entry("total<any>", Specificity::Primary, vec![ArgPattern::Array {
                    element: ScalarKind::F64,
                    dims: None,
                }]),
                entry("total<1>", Specificity::Primary, vec![array(ScalarKind::F64, &[Dim::Dynamic])]),
            ],
            Registry::new(),
        );
        let rank1 = catalogue.select(&call(&[HostArray::vector([1.0]).into()])).unwrap();
        assert_eq!((rank1.entry, rank1.tier), (1, MatchTier::Compatible));
        let rank3 = catalogue
            .select(&call(&[HostArray::from_floats(&[1, 1, 1], [1.0]).unwrap().into()]))
            .unwrap();
        assert_eq!((rank3.entry, rank3.tier), (0, MatchTier::Generic));
    }

    #[rstest]
    #[case(Specificity::Primary, Specificity::Primary, true)]
    #[case(Specificity::Full, Specificity::Primary, false)]
    #[case(Specificity::Partial, Specificity::Primary, false)]
    fn test_same_specificity_is_ambiguous(
        #[case] first: Specificity,
        #[case] second: Specificity,
        #[case] ambiguous: bool,
    ) {
        let vector = vec![array(ScalarKind::F64, &[Dim::Dynamic])];
        let catalogue = Catalogue::new(
            "f",
            vec![entry("b", second, vector.clone()), entry("a", first, vector)],
            Registry::new(),
        );
        let result = catalogue.select(&call(&[HostArray::vector([1.0]).into()]));
        if ambiguous {
            let Err(DispatchError::AmbiguousInstantiation { candidates, .. }) = result else {
                panic!("expected ambiguity, got {result:?}");
            };
            assert_eq!(candidates, vec!["b".to_string(), "a".to_string()]);
        } else {
            let selection = result.unwrap();
            assert_eq!(catalogue.entry(&selection).unwrap().native, "a");
        }
    }

    #[test]
    fn test_defaults_allow_shorter_calls() {
        let signature = SignaturePattern {
            params: vec![
                ArgPattern::Scalar { kind: ScalarKind::I32 },
                ArgPattern::Scalar { kind: ScalarKind::I32 },
            ],
            required: 1,
        };
        let none = |_: &str, _: &str| false;
        assert_eq!(signature.matches(&call(&[HostValue::Int(1)]), &none), Some(MatchTier::Exact));
        assert_eq!(signature.matches(&call(&[]), &none), None);
    }

    #[test]
    fn test_catalogue_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Arc<Catalogue>>();
    }
}

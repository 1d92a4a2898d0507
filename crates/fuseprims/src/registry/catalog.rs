//! Operation Catalog: the fixed, versioned list of operations the registry binds.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ops::{BinaryOp, TernaryOp, UnaryOp};

/// Version tag of the standard catalog. Bump when an operation is added or removed.
pub const CATALOG_VERSION: &str = "fuseprims.catalog/1";

/// Operations that rearrange or retype a tensor without elementwise math.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeOp {
    BroadcastInDim,
    ConvertElementType,
}

impl ShapeOp {
    pub fn name(self) -> &'static str {
        match self {
            ShapeOp::BroadcastInDim => "broadcast_in_dim",
            ShapeOp::ConvertElementType => "convert_element_type",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReductionOp {
    Sum,
    Var,
    Amax,
    Amin,
    /// Composite variance-and-mean; has no donor primitive.
    VarMean,
}

impl ReductionOp {
    pub fn name(self) -> &'static str {
        match self {
            ReductionOp::Sum => "sum",
            ReductionOp::Var => "var",
            ReductionOp::Amax => "amax",
            ReductionOp::Amin => "amin",
            ReductionOp::VarMean => "var_mean",
        }
    }
}

/// Shape-class partition of the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeClass {
    Unary,
    Binary,
    Ternary,
    Shape,
    Reduction,
}

/// A catalog entry, typed by its shape class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "class", content = "op", rename_all = "snake_case")]
pub enum CatalogOp {
    Unary(UnaryOp),
    Binary(BinaryOp),
    Ternary(TernaryOp),
    Shape(ShapeOp),
    Reduction(ReductionOp),
}

impl CatalogOp {
    pub fn name(self) -> &'static str {
        match self {
            CatalogOp::Unary(op) => op.name(),
            CatalogOp::Binary(op) => op.name(),
            CatalogOp::Ternary(op) => op.name(),
            CatalogOp::Shape(op) => op.name(),
            CatalogOp::Reduction(op) => op.name(),
        }
    }

    pub fn shape_class(self) -> ShapeClass {
        match self {
            CatalogOp::Unary(_) => ShapeClass::Unary,
            CatalogOp::Binary(_) => ShapeClass::Binary,
            CatalogOp::Ternary(_) => ShapeClass::Ternary,
            CatalogOp::Shape(_) => ShapeClass::Shape,
            CatalogOp::Reduction(_) => ShapeClass::Reduction,
        }
    }

    /// Composite operations are registered by bespoke logic instead of donor delegation.
    pub fn is_composite(self) -> bool {
        matches!(self, CatalogOp::Reduction(ReductionOp::VarMean))
    }
}

impl fmt::Display for CatalogOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered, versioned set of catalog operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    version: String,
    ops: Vec<CatalogOp>,
}

impl Catalog {
    pub fn new(version: impl Into<String>, ops: Vec<CatalogOp>) -> Self {
        Self {
            version: version.into(),
            ops,
        }
    }

    /// The standard catalog: unary, binary, then shape, ternary and reduction operations.
    pub fn standard() -> Self {
        let mut ops = Vec::new();
        ops.extend(UnaryOp::ALL.iter().copied().map(CatalogOp::Unary));
        ops.extend(BinaryOp::ALL.iter().copied().map(CatalogOp::Binary));
        ops.push(CatalogOp::Shape(ShapeOp::BroadcastInDim));
        ops.push(CatalogOp::Ternary(TernaryOp::Where));
        ops.push(CatalogOp::Shape(ShapeOp::ConvertElementType));
        ops.extend(
            [
                ReductionOp::Sum,
                ReductionOp::Var,
                ReductionOp::Amax,
                ReductionOp::Amin,
                ReductionOp::VarMean,
            ]
            .map(CatalogOp::Reduction),
        );
        Self::new(CATALOG_VERSION, ops)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn ops(&self) -> &[CatalogOp] {
        &self.ops
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.ops.iter().map(|op| op.name())
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn lookup(&self, name: &str) -> Option<CatalogOp> {
        self.ops.iter().copied().find(|op| op.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn shape_class_of(&self, name: &str) -> Option<ShapeClass> {
        self.lookup(name).map(CatalogOp::shape_class)
    }

    /// Operations of one shape class, in catalog order.
    pub fn by_class(&self, class: ShapeClass) -> Vec<CatalogOp> {
        self.ops
            .iter()
            .copied()
            .filter(|op| op.shape_class() == class)
            .collect()
    }

    /// Returns a copy without the named operation.
    pub fn without(&self, name: &str) -> Self {
        Self {
            version: self.version.clone(),
            ops: self
                .ops
                .iter()
                .copied()
                .filter(|op| op.name() != name)
                .collect(),
        }
    }

    /// JSON manifest: version plus every entry's name and shape class.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        #[derive(Serialize)]
        struct Entry {
            name: &'static str,
            class: ShapeClass,
        }

        #[derive(Serialize)]
        struct Manifest<'a> {
            version: &'a str,
            ops: Vec<Entry>,
        }

        serde_json::to_string_pretty(&Manifest {
            version: &self.version,
            ops: self
                .ops
                .iter()
                .map(|op| Entry {
                    name: op.name(),
                    class: op.shape_class(),
                })
                .collect(),
        })
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::standard()
    }
}

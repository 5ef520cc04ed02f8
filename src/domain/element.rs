use crate::foundation::core::Vec2;
use crate::foundation::ids::ElementId;
use crate::foundation::math::{StableHasher, unit_from_hash};

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum DomainShape {
    Line,
    Grid { rows: u32, cols: u32, spacing: f64 },
}

/// Per-element value that a domain can produce without any upstream input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldSource {
    /// `i / (n - 1)`, or `0` for a single element.
    Index,
    /// Grid cell position; line domains lay elements out along x with unit spacing.
    Position,
    /// Uniform in `[0, 1)`, fixed per element id and patch seed.
    Random,
}

/// Indexed set of elements with stable identities.
///
/// Ids are a pure function of the owning block's stable id, the shape and the index, so they are
/// identical across frames and across recompiles that leave the generator untouched.
#[derive(Debug, Clone)]
pub(crate) struct ElementDomain {
    owner: String,
    shape: DomainShape,
    seed: u64,
    ids: Vec<ElementId>,
    identity: u64,
}

impl ElementDomain {
    pub(crate) fn line(owner: &str, count: u32, seed: u64) -> Self {
        Self::build(owner, DomainShape::Line, count, seed)
    }

    pub(crate) fn grid(owner: &str, rows: u32, cols: u32, spacing: f64, seed: u64) -> Self {
        Self::build(
            owner,
            DomainShape::Grid {
                rows,
                cols,
                spacing,
            },
            rows.saturating_mul(cols),
            seed,
        )
    }

    fn build(owner: &str, shape: DomainShape, count: u32, seed: u64) -> Self {
        let mut ident = StableHasher::new();
        ident.write_str(owner);
        write_shape(&mut ident, shape);
        ident.write_u32(count);
        let identity = ident.finish_u64();

        let ids = (0..count)
            .map(|i| {
                let mut h = StableHasher::new();
                h.write_str(owner);
                write_shape(&mut h, shape);
                h.write_u32(i);
                ElementId(h.finish_u64())
            })
            .collect();

        Self {
            owner: owner.to_owned(),
            shape,
            seed,
            ids,
            identity,
        }
    }

    pub(crate) fn owner(&self) -> &str {
        &self.owner
    }

    pub(crate) fn shape(&self) -> DomainShape {
        self.shape
    }

    pub(crate) fn count(&self) -> usize {
        self.ids.len()
    }

    pub(crate) fn stable_id(&self, index: usize) -> Option<ElementId> {
        self.ids.get(index).copied()
    }

    pub(crate) fn ids(&self) -> &[ElementId] {
        &self.ids
    }

    /// Hash of owner, shape and count. Used as the domain half of field cache keys.
    pub(crate) fn identity(&self) -> u64 {
        self.identity
    }

    pub(crate) fn index01(&self, i: usize) -> f64 {
        let n = self.count();
        if n <= 1 {
            0.0
        } else {
            i as f64 / (n - 1) as f64
        }
    }

    pub(crate) fn position(&self, i: usize) -> Vec2 {
        match self.shape {
            DomainShape::Line => Vec2::new(i as f64, 0.0),
            DomainShape::Grid { cols, spacing, .. } => {
                let cols = cols.max(1) as usize;
                let (r, c) = (i / cols, i % cols);
                Vec2::new(c as f64 * spacing, r as f64 * spacing)
            }
        }
    }

    pub(crate) fn random01(&self, i: usize) -> f64 {
        let Some(id) = self.stable_id(i) else {
            return 0.0;
        };
        let mut h = StableHasher::new();
        h.write_u64(id.0);
        h.write_u64(self.seed);
        unit_from_hash(h.finish_u64())
    }
}

fn write_shape(h: &mut StableHasher, shape: DomainShape) {
    match shape {
        DomainShape::Line => h.write_u8(0),
        DomainShape::Grid {
            rows,
            cols,
            spacing,
        } => {
            h.write_u8(1);
            h.write_u32(rows);
            h.write_u32(cols);
            h.write_u64(spacing.to_bits());
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/domain/element.rs"]
mod tests;

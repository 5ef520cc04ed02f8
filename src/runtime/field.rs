use crate::domain::element::FieldSource;
use crate::foundation::ids::{DomainIdx, FieldId};
use crate::ir::field::FieldExpr;
use crate::ir::program::{BusSource, CompiledProgram};
use crate::runtime::pool::BufferPool;
use crate::runtime::signal::{EvalError, read_sig};
use crate::runtime::state::RuntimeState;
use crate::types::descriptor::{Domain, TypeDesc};
use crate::types::value::Value;
use std::collections::HashMap;

/// Materialized buffers of the current frame, keyed by `(field, domain identity)`.
///
/// Entries never outlive their frame epoch: [`FieldCache::begin_frame`] returns every buffer to
/// the pool.
#[derive(Debug, Default)]
pub(crate) struct FieldCache {
    epoch: u64,
    entries: HashMap<(FieldId, u64), Vec<f64>>,
    pub(crate) hits: u64,
    pub(crate) misses: u64,
}

impl FieldCache {
    pub(crate) fn begin_frame(&mut self, epoch: u64, pool: &mut BufferPool) {
        self.clear(pool);
        self.epoch = epoch;
    }

    pub(crate) fn clear(&mut self, pool: &mut BufferPool) {
        for (_, buf) in self.entries.drain() {
            pool.release(buf);
        }
    }

    pub(crate) fn get(&self, p: &CompiledProgram, f: FieldId, d: DomainIdx) -> Option<&[f64]> {
        let ident = p.domains.get(d.0 as usize)?.identity();
        self.entries.get(&(f, ident)).map(Vec::as_slice)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

fn source_value(p: &CompiledProgram, d: DomainIdx, source: FieldSource, i: usize) -> Value {
    let dom = &p.domains[d.0 as usize];
    match source {
        FieldSource::Index => Value::Number(dom.index01(i)),
        FieldSource::Position => Value::Vec2(dom.position(i)),
        FieldSource::Random => Value::Number(dom.random01(i)),
    }
}

fn checked(ty: TypeDesc, f: FieldId, v: Option<Value>) -> Result<Value, EvalError> {
    match v {
        Some(v) if v.domain() == ty.domain => Ok(v),
        Some(v) => Err(EvalError::new(format!(
            "field F{} produced {} for a {ty} node",
            f.0,
            v.domain().name()
        ))),
        None => Err(EvalError::new(format!("field F{} is undefined for its input", f.0))),
    }
}

/// Value of `field` at element `i` of domain `d`. This is the reference semantics;
/// [`materialize`] must agree with it at every index.
pub(crate) fn value_at(
    p: &CompiledProgram,
    st: &RuntimeState,
    f: FieldId,
    d: DomainIdx,
    i: usize,
) -> Result<Value, EvalError> {
    let n = p.domains[d.0 as usize].count();
    if i >= n {
        return Err(EvalError::new(format!(
            "element {i} out of range for a domain of {n}"
        )));
    }
    let node = &p.fields[f.0 as usize];
    let v = match node.expr {
        FieldExpr::Const(v) => Some(v),
        FieldExpr::Source { domain, source } => Some(source_value(p, domain, source, i)),
        FieldExpr::Broadcast { sig, .. } => Some(read_sig(p, st, sig)?),
        FieldExpr::Map { input, op } => op.apply(value_at(p, st, input, d, i)?),
        FieldExpr::Zip { a, b, op } => op.apply(value_at(p, st, a, d, i)?, value_at(p, st, b, d, i)?),
        FieldExpr::BusRead(b) => {
            let bus = &p.buses[b.0 as usize];
            let mut values = Vec::with_capacity(bus.sources.len());
            for src in &bus.sources {
                values.push(match *src {
                    BusSource::Field(x) => value_at(p, st, x, d, i)?,
                    BusSource::Signal(s) => read_sig(p, st, s)?,
                });
            }
            if values.is_empty() {
                Some(bus.silent)
            } else {
                bus.combine.fold(values)
            }
        }
        FieldExpr::InputRef(_) => {
            return Err(EvalError::new(format!("field F{} is an unlinked placeholder", f.0)));
        }
    };
    checked(node.ty, f, v)
}

fn put(buf: &mut [f64], arity: usize, i: usize, v: Value) {
    v.write_components(&mut buf[i * arity..(i + 1) * arity]);
}

fn at(buf: &[f64], domain: Domain, i: usize) -> Result<Value, EvalError> {
    let arity = domain.arity();
    buf.get(i * arity..(i + 1) * arity)
        .and_then(|c| Value::from_components(domain, c))
        .ok_or_else(|| EvalError::new(format!("buffer too short for element {i}")))
}

/// Fill (or reuse) the pooled buffer for `field` over domain `d` in the current frame.
pub(crate) fn materialize(
    p: &CompiledProgram,
    st: &RuntimeState,
    cache: &mut FieldCache,
    pool: &mut BufferPool,
    f: FieldId,
    d: DomainIdx,
) -> Result<(), EvalError> {
    let dom = &p.domains[d.0 as usize];
    let key = (f, dom.identity());
    if cache.entries.contains_key(&key) {
        cache.hits += 1;
        return Ok(());
    }
    cache.misses += 1;

    let node = &p.fields[f.0 as usize];
    let mut buf = pool.borrow(dom.count() * node.ty.element_arity());
    match fill(p, st, cache, pool, f, d, &mut buf) {
        Ok(()) => {
            cache.entries.insert(key, buf);
            Ok(())
        }
        Err(e) => {
            pool.release(buf);
            Err(e)
        }
    }
}

fn fill(
    p: &CompiledProgram,
    st: &RuntimeState,
    cache: &mut FieldCache,
    pool: &mut BufferPool,
    f: FieldId,
    d: DomainIdx,
    buf: &mut [f64],
) -> Result<(), EvalError> {
    let node = &p.fields[f.0 as usize];
    let arity = node.ty.element_arity();
    let n = p.domains[d.0 as usize].count();

    match node.expr {
        FieldExpr::Const(v) => {
            let v = checked(node.ty, f, Some(v))?;
            (0..n).for_each(|i| put(buf, arity, i, v));
        }
        FieldExpr::Broadcast { sig, .. } => {
            let v = checked(node.ty, f, Some(read_sig(p, st, sig)?))?;
            (0..n).for_each(|i| put(buf, arity, i, v));
        }
        FieldExpr::Source { domain, source } => {
            for i in 0..n {
                let v = checked(node.ty, f, Some(source_value(p, domain, source, i)))?;
                put(buf, arity, i, v);
            }
        }
        FieldExpr::Map { input, op } => {
            materialize(p, st, cache, pool, input, d)?;
            let in_domain = p.fields[input.0 as usize].ty.domain;
            let src = cache
                .get(p, input, d)
                .ok_or_else(|| EvalError::new(format!("field F{} was not materialized", input.0)))?;
            for i in 0..n {
                let v = checked(node.ty, f, op.apply(at(src, in_domain, i)?))?;
                put(buf, arity, i, v);
            }
        }
        FieldExpr::Zip { a, b, op } => {
            materialize(p, st, cache, pool, a, d)?;
            materialize(p, st, cache, pool, b, d)?;
            let (da, db) = (p.fields[a.0 as usize].ty.domain, p.fields[b.0 as usize].ty.domain);
            let missing = |x: FieldId| EvalError::new(format!("field F{} was not materialized", x.0));
            let sa = cache.get(p, a, d).ok_or_else(|| missing(a))?;
            let sb = cache.get(p, b, d).ok_or_else(|| missing(b))?;
            for i in 0..n {
                let v = checked(node.ty, f, op.apply(at(sa, da, i)?, at(sb, db, i)?))?;
                put(buf, arity, i, v);
            }
        }
        FieldExpr::BusRead(b) => {
            let bus = &p.buses[b.0 as usize];
            if bus.sources.is_empty() {
                let v = checked(node.ty, f, Some(bus.silent))?;
                (0..n).for_each(|i| put(buf, arity, i, v));
                return Ok(());
            }
            for src in &bus.sources {
                if let BusSource::Field(x) = *src {
                    materialize(p, st, cache, pool, x, d)?;
                }
            }
            for i in 0..n {
                let mut values = Vec::with_capacity(bus.sources.len());
                for src in &bus.sources {
                    values.push(match *src {
                        BusSource::Field(x) => {
                            let dx = p.fields[x.0 as usize].ty.domain;
                            let s = cache.get(p, x, d).ok_or_else(|| {
                                EvalError::new(format!("field F{} was not materialized", x.0))
                            })?;
                            at(s, dx, i)?
                        }
                        BusSource::Signal(s) => read_sig(p, st, s)?,
                    });
                }
                let v = checked(node.ty, f, bus.combine.fold(values))?;
                put(buf, arity, i, v);
            }
        }
        FieldExpr::InputRef(_) => {
            return Err(EvalError::new(format!("field F{} is an unlinked placeholder", f.0)));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/runtime/field.rs"]
mod tests;

//! # Query Execution
//!
//! The tuple-calculus interpreter. An [`Evaluator`] walks a [`TcExpr`]
//! bottom-up, calling the backend for graph data and producing a [`Value`].
//!
//! Column-driven operators (project, strip, order, step, ...) locate their
//! slots through the column-tree annotation of their *input* expression, so
//! the tree handed to the evaluator must be annotated the way the front
//! end's inference leaves it. Row predicates and adjoin functions are
//! lambda nodes applied once per row.
//!
//! Failure model: value-level type mismatches abort the query with a typed
//! [`ExecError`] (the context records it and reports nil); backend failures
//! propagate verbatim; Repeat terminates because the object graph is finite
//! and a visited set admits each endpoint once.

mod ops;

pub use ops::apply_op;

use std::rc::Rc;

use thiserror::Error;
use tracing::trace;

use crate::backend::{Backend, BackendError, VERSIONS_GLOBAL};
use crate::columns::{ColName, ColSet};
use crate::tcalc::{Closure, TcExpr, TcKind};
use crate::types::{Datatype, TypeManager};
use crate::value::Value;

/// Execution failures. `Type` covers everything the value layer rejects.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("type error: {0}")]
    Type(String),

    #[error("unbound variable .K{0}")]
    UnboundVar(u32),

    #[error("column {0} not present in row")]
    NoSuchColumn(String),

    #[error("missing column annotation on {0} input")]
    MissingAnnotation(&'static str),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

type Result<T> = std::result::Result<T, ExecError>;

/// One query's interpreter state: the environment stack and the
/// distinguisher counter, over a type manager and a backend.
pub struct Evaluator<'a> {
    tm: &'a TypeManager,
    backend: &'a mut dyn Backend,
    env: Vec<(u32, Value)>,
    next_distinguisher: u32,
}

impl<'a> Evaluator<'a> {
    pub fn new(tm: &'a TypeManager, backend: &'a mut dyn Backend) -> Evaluator<'a> {
        Evaluator {
            tm,
            backend,
            env: Vec::new(),
            next_distinguisher: 0,
        }
    }

    // ------------------------------------------------------------------
    // environment

    fn lookup(&self, id: u32) -> Result<Value> {
        self.env
            .iter()
            .rev()
            .find(|(vid, _)| *vid == id)
            .map(|(_, v)| v.clone())
            .ok_or(ExecError::UnboundVar(id))
    }

    fn with_binding<T>(
        &mut self,
        id: u32,
        val: Value,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.env.push((id, val));
        let r = f(self);
        self.env.pop();
        r
    }

    fn with_env<T>(
        &mut self,
        env: Vec<(u32, Value)>,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let saved = std::mem::replace(&mut self.env, env);
        let r = f(self);
        self.env = saved;
        r
    }

    // ------------------------------------------------------------------
    // evaluation

    pub fn eval(&mut self, e: &TcExpr) -> Result<Value> {
        trace!(node = node_name(&e.kind), "eval");
        match &e.kind {
            TcKind::Value(v) => Ok(v.clone()),

            TcKind::ReadVar(var) => self.lookup(var.id()),

            TcKind::ReadGlobal(g) => Ok(self.backend.read_global(self.tm, g.name())?),

            TcKind::Let { var, value, body } => {
                let v = self.eval(value)?;
                self.with_binding(var.id(), v, |me| me.eval(body))
            }

            TcKind::Map { var, set, result } => {
                let coll = self.eval(set)?;
                expect_coll(&coll, "map input")?;
                let as_sequence = coll.is_sequence();
                let mut out = RowSink::new(self.tm, as_sequence);
                for m in coll.coll_members() {
                    let r = self.with_binding(var.id(), m.clone(), |me| me.eval(result))?;
                    out.add(r);
                }
                Ok(out.finish())
            }

            TcKind::Filter { sub, predicate } => {
                let coll = self.eval(sub)?;
                expect_coll(&coll, "filter input")?;
                let as_sequence = coll.is_sequence();
                let mut out = RowSink::new(self.tm, as_sequence);
                for row in coll.coll_members() {
                    if self.apply_row(predicate, row.clone())?.truth() {
                        out.add(row.clone());
                    }
                }
                Ok(out.finish())
            }

            TcKind::Project { sub, cols } => {
                let coll = self.eval(sub)?;
                let cols = resolve_cols(sub, cols)?;
                let indices = col_indices(sub, &cols)?;
                self.per_row(coll, |row| {
                    Ok(Value::tuple_specific(
                        indices.iter().map(|&ix| row.tuple_get(ix).clone()).collect(),
                    ))
                })
            }

            TcKind::Strip { sub, cols } => {
                let coll = self.eval(sub)?;
                let cols = resolve_cols(sub, cols)?;
                let tree = row_tree(sub, "strip")?;
                let drop: Vec<usize> = cols
                    .iter()
                    .filter_map(|c| tree.find(c))
                    .collect();
                self.per_row(coll, |row| {
                    let keep: Vec<Value> = (0..row.tuple_arity())
                        .filter(|ix| !drop.contains(ix))
                        .map(|ix| row.tuple_get(ix).clone())
                        .collect();
                    Ok(Value::tuple_specific(keep))
                })
            }

            TcKind::Rename { sub, .. } => {
                // purely a naming operation; rows pass through untouched
                self.eval(sub)
            }

            TcKind::Join {
                left,
                right,
                predicate,
            } => {
                let lcoll = self.eval(left)?;
                let rcoll = self.eval(right)?;
                expect_coll(&lcoll, "join left")?;
                expect_coll(&rcoll, "join right")?;
                let mut out = RowSink::new(self.tm, false);
                for lrow in lcoll.coll_members() {
                    for rrow in rcoll.coll_members() {
                        let pasted = Value::paste(lrow, rrow);
                        if let Some(p) = predicate {
                            if !self.apply_row(p, pasted.clone())?.truth() {
                                continue;
                            }
                        }
                        out.add(pasted);
                    }
                }
                Ok(out.finish())
            }

            TcKind::Order { sub, cols } => {
                let coll = self.eval(sub)?;
                expect_coll(&coll, "order input")?;
                let cols = resolve_cols(sub, cols)?;
                let indices = col_indices(sub, &cols)?;
                let as_sequence = coll.is_sequence();
                let mut rows: Vec<Value> = coll.coll_members().to_vec();
                rows.sort_by(|a, b| compare_on(a, b, &indices));
                let elem = coll.coll_member_type().clone();
                Ok(mk_coll(as_sequence, elem, rows))
            }

            TcKind::Uniq { sub, cols } => {
                let coll = self.eval(sub)?;
                expect_coll(&coll, "uniq input")?;
                let cols = resolve_cols(sub, cols)?;
                let indices = col_indices(sub, &cols)?;
                let as_sequence = coll.is_sequence();
                let mut rows: Vec<Value> = Vec::new();
                for row in coll.coll_members() {
                    let dup = rows
                        .last()
                        .map_or(false, |prev| {
                            compare_on(prev, row, &indices) == std::cmp::Ordering::Equal
                        });
                    if !dup {
                        rows.push(row.clone());
                    }
                }
                let elem = coll.coll_member_type().clone();
                Ok(mk_coll(as_sequence, elem, rows))
            }

            TcKind::Nest { sub, cols, .. } => {
                let coll = self.eval(sub)?;
                expect_coll(&coll, "nest input")?;
                let cols = resolve_cols(sub, cols)?;
                let tree = row_tree(sub, "nest")?;
                let nested: Vec<usize> = cols.iter().filter_map(|c| tree.find(c)).collect();
                let arity = tree.arity();
                let keys: Vec<usize> = (0..arity).filter(|ix| !nested.contains(ix)).collect();

                // group rows by the remaining columns, preserving first-seen
                // order
                let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
                for row in coll.coll_members() {
                    let key = Value::tuple_specific(
                        keys.iter().map(|&ix| row.tuple_get(ix).clone()).collect(),
                    );
                    let member = Value::tuple_specific(
                        nested.iter().map(|&ix| row.tuple_get(ix).clone()).collect(),
                    );
                    match groups.iter_mut().find(|(k, _)| k.identical(&key)) {
                        Some((_, ms)) => ms.push(member),
                        None => groups.push((key, vec![member])),
                    }
                }

                let mut out = RowSink::new(self.tm, false);
                for (key, members) in groups {
                    let mut inner = RowSink::new(self.tm, false);
                    for m in members {
                        inner.add(m);
                    }
                    out.add(key.tuple_add(inner.finish()));
                }
                Ok(out.finish())
            }

            TcKind::Unnest { sub, col } => {
                let coll = self.eval(sub)?;
                expect_coll(&coll, "unnest input")?;
                let ix = colindex(sub, col, "unnest")?;
                let mut out = RowSink::new(self.tm, false);
                for row in coll.coll_members() {
                    let inner = row.tuple_get(ix);
                    if !inner.is_coll() {
                        return Err(ExecError::Type(format!(
                            "unnest of non-collection value {}",
                            inner
                        )));
                    }
                    let rest = row.clone().tuple_strip(ix);
                    for m in inner.coll_members() {
                        out.add(Value::paste(&rest, m));
                    }
                }
                Ok(out.finish())
            }

            TcKind::Distinguish { sub, .. } => {
                let coll = self.eval(sub)?;
                expect_coll(&coll, "distinguish input")?;
                let mut out = RowSink::new(self.tm, coll.is_sequence());
                for row in coll.coll_members() {
                    let d = Value::Distinguisher(self.next_distinguisher);
                    self.next_distinguisher += 1;
                    out.add(row.clone().tuple_add(d));
                }
                Ok(out.finish())
            }

            TcKind::Adjoin { left, func, .. } => {
                let coll = self.eval(left)?;
                expect_coll(&coll, "adjoin input")?;
                let as_sequence = coll.is_sequence();
                let mut out = RowSink::new(self.tm, as_sequence);
                for row in coll.coll_members() {
                    let v = self.apply_row(func, row.clone())?;
                    out.add(row.clone().tuple_add(v));
                }
                Ok(out.finish())
            }

            TcKind::Step {
                sub,
                subcolumn,
                edgename,
                reversed,
                predicate,
                ..
            } => {
                let coll = self.eval(sub)?;
                expect_coll(&coll, "step input")?;
                let ix = colindex(sub, subcolumn, "step")?;
                let mut out = RowSink::new(self.tm, false);
                for row in coll.coll_members() {
                    let obj = row.tuple_get(ix);
                    if obj.is_nil() {
                        continue;
                    }
                    if !obj.is_struct() {
                        return Err(ExecError::Type(format!(
                            "step from non-object value {}",
                            obj
                        )));
                    }
                    let steps: Vec<(Value, Value)> = match edgename {
                        Some(edge) => {
                            let targets =
                                self.backend.follow(self.tm, obj, edge, *reversed)?;
                            targets
                                .coll_members()
                                .iter()
                                .map(|t| (edge.clone(), t.clone()))
                                .collect()
                        }
                        None => {
                            let pairs = self.backend.followall(self.tm, obj, *reversed)?;
                            pairs
                                .coll_members()
                                .iter()
                                .map(|p| (p.tuple_get(0).clone(), p.tuple_get(1).clone()))
                                .collect()
                        }
                    };
                    for (edge, target) in steps {
                        let steprow = Value::Tuple(vec![obj.clone(), edge, target]);
                        let newrow = Value::paste(row, &steprow);
                        if let Some(p) = predicate {
                            if !self.apply_row(p, newrow.clone())?.truth() {
                                continue;
                            }
                        }
                        out.add(newrow);
                    }
                }
                Ok(out.finish())
            }

            TcKind::Repeat {
                sub,
                subendcolumn,
                loopvar,
                bodystartcolumn,
                body,
                bodypathcolumn,
                bodyendcolumn,
                ..
            } => {
                let coll = self.eval(sub)?;
                expect_coll(&coll, "repeat input")?;
                let start_ix = colindex(sub, subendcolumn, "repeat")?;
                let bstart_ix = colindex(body, bodystartcolumn, "repeat body")?;
                let bpath_ix = colindex(body, bodypathcolumn, "repeat body")?;
                let bend_ix = colindex(body, bodyendcolumn, "repeat body")?;

                let mut out = RowSink::new(self.tm, false);
                for subrow in coll.coll_members() {
                    let start = subrow.tuple_get(start_ix).clone();
                    let reached =
                        self.repeat_closure(loopvar.id(), body, &start, bstart_ix, bpath_ix, bend_ix)?;
                    for (path, endpoint) in reached {
                        let mut pathval = Value::empty_sequence(self.tm);
                        for p in path {
                            sequence_widen_add(self.tm, &mut pathval, p);
                        }
                        let newrow = Value::paste(
                            subrow,
                            &Value::pair(pathval, endpoint),
                        );
                        out.add(newrow);
                    }
                }
                Ok(out.finish())
            }

            TcKind::Scan {
                predicate, ..
            } => {
                let objs = self.backend.read_global(self.tm, VERSIONS_GLOBAL)?;
                expect_coll(&objs, "scan universe")?;
                let mut out = RowSink::new(self.tm, false);
                let members: Vec<Value> = objs.coll_members().to_vec();
                for obj in members {
                    let pairs = self.backend.followall(self.tm, &obj, false)?;
                    for p in pairs.coll_members() {
                        let row = Value::Tuple(vec![
                            obj.clone(),
                            p.tuple_get(0).clone(),
                            p.tuple_get(1).clone(),
                        ]);
                        if let Some(pr) = predicate {
                            if !self.apply_row(pr, row.clone())?.truth() {
                                continue;
                            }
                        }
                        out.add(row);
                    }
                }
                Ok(out.finish())
            }

            TcKind::Bop { left, op, right } => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                apply_op(self.tm, *op, &[l, r])
            }

            TcKind::Uop { op, sub } => {
                let v = self.eval(sub)?;
                apply_op(self.tm, *op, &[v])
            }

            TcKind::Func { op, args } => {
                let mut vals = Vec::with_capacity(args.len());
                for a in args {
                    vals.push(self.eval(a)?);
                }
                apply_op(self.tm, *op, &vals)
            }

            TcKind::Lambda { var, body } => Ok(Value::Lambda(Rc::new(Closure {
                var: var.clone(),
                body: (**body).clone(),
                env: self.env.clone(),
            }))),

            TcKind::Apply { lambda, arg } => {
                let argval = self.eval(arg)?;
                match &lambda.kind {
                    TcKind::Lambda { var, body } => {
                        self.with_binding(var.id(), argval, |me| me.eval(body))
                    }
                    _ => {
                        let f = self.eval(lambda)?;
                        if !f.is_lambda() {
                            return Err(ExecError::Type(format!(
                                "apply of non-lambda value {}",
                                f
                            )));
                        }
                        let closure = Rc::clone(f.as_lambda());
                        let mut env = closure.env.clone();
                        env.push((closure.var.id(), argval));
                        self.with_env(env, |me| me.eval(&closure.body))
                    }
                }
            }

            TcKind::CreatePathElement { sub } => {
                let v = self.eval(sub)?;
                if v.tuple_arity() != 3 {
                    return Err(ExecError::Type(format!(
                        "path element needs a 3-tuple, got {}",
                        v
                    )));
                }
                Ok(Value::pathelement(
                    v.tuple_get(0).clone(),
                    v.tuple_get(1).clone(),
                    v.tuple_get(2).clone(),
                ))
            }

            TcKind::Splatter { value, name } => {
                let v = self.eval(value)?;
                let n = self.eval(name)?;
                if !n.is_string() {
                    return Err(ExecError::Type(format!(
                        "splatter name must be a string, got {}",
                        n
                    )));
                }
                Ok(Value::pair(n, v))
            }

            TcKind::Tuple { exprs, .. } => {
                let mut members = Vec::with_capacity(exprs.len());
                for e in exprs {
                    members.push(self.eval(e)?);
                }
                Ok(Value::tuple_specific(members))
            }
        }
    }

    /// Transitive closure from one start object: iterate the body over the
    /// frontier until no new endpoint appears. Each endpoint is reached
    /// once, with the first path found to it.
    fn repeat_closure(
        &mut self,
        loopvar: u32,
        body: &TcExpr,
        start: &Value,
        bstart_ix: usize,
        bpath_ix: usize,
        bend_ix: usize,
    ) -> Result<Vec<(Vec<Value>, Value)>> {
        let mut visited: Vec<Value> = vec![start.clone()];
        let mut reached: Vec<(Vec<Value>, Value)> = Vec::new();
        // (endpoint, path so far)
        let mut frontier: Vec<(Value, Vec<Value>)> = vec![(start.clone(), Vec::new())];

        while !frontier.is_empty() {
            let mut fset = Value::empty_set(self.tm);
            for (end, _) in &frontier {
                sequence_widen_add(self.tm, &mut fset, end.clone());
            }
            let outrows =
                self.with_binding(loopvar, fset, |me| me.eval(body))?;
            expect_coll(&outrows, "repeat body result")?;

            let mut next: Vec<(Value, Vec<Value>)> = Vec::new();
            for orow in outrows.coll_members() {
                let ostart = orow.tuple_get(bstart_ix);
                let opath = orow.tuple_get(bpath_ix);
                let oend = orow.tuple_get(bend_ix);
                let origin = frontier.iter().find(|(end, _)| end.identical(ostart));
                let (_, prefix) = match origin {
                    Some(o) => o,
                    None => continue,
                };
                let mut path = prefix.clone();
                if opath.is_coll() {
                    path.extend(opath.coll_members().iter().cloned());
                } else {
                    path.push(opath.clone());
                }
                if visited.iter().any(|v| v.identical(oend)) {
                    continue;
                }
                visited.push(oend.clone());
                reached.push((path.clone(), oend.clone()));
                next.push((oend.clone(), path));
            }
            frontier = next;
        }
        Ok(reached)
    }

    /// Apply a row function (a lambda node, or an expression producing a
    /// closure) to one row.
    fn apply_row(&mut self, func: &TcExpr, row: Value) -> Result<Value> {
        match &func.kind {
            TcKind::Lambda { var, body } => {
                self.with_binding(var.id(), row, |me| me.eval(body))
            }
            _ => {
                let f = self.eval(func)?;
                if !f.is_lambda() {
                    return Err(ExecError::Type(format!(
                        "row predicate is not a lambda: {}",
                        f
                    )));
                }
                let closure = Rc::clone(f.as_lambda());
                let mut env = closure.env.clone();
                env.push((closure.var.id(), row));
                self.with_env(env, |me| me.eval(&closure.body))
            }
        }
    }

    /// Map every row of a collection (or a bare row) through `f`.
    fn per_row(
        &mut self,
        input: Value,
        mut f: impl FnMut(&Value) -> Result<Value>,
    ) -> Result<Value> {
        if input.is_coll() {
            let as_sequence = input.is_sequence();
            let mut out = RowSink::new(self.tm, as_sequence);
            for row in input.coll_members() {
                out.add(f(row)?);
            }
            Ok(out.finish())
        } else {
            f(&input)
        }
    }
}

// ============================================================================
// helpers
// ============================================================================

fn node_name(kind: &TcKind) -> &'static str {
    match kind {
        TcKind::Filter { .. } => "filter",
        TcKind::Project { .. } => "project",
        TcKind::Strip { .. } => "strip",
        TcKind::Rename { .. } => "rename",
        TcKind::Join { .. } => "join",
        TcKind::Order { .. } => "order",
        TcKind::Uniq { .. } => "uniq",
        TcKind::Nest { .. } => "nest",
        TcKind::Unnest { .. } => "unnest",
        TcKind::Distinguish { .. } => "distinguish",
        TcKind::Adjoin { .. } => "adjoin",
        TcKind::Step { .. } => "step",
        TcKind::Repeat { .. } => "repeat",
        TcKind::Scan { .. } => "scan",
        TcKind::Bop { .. } => "bop",
        TcKind::Uop { .. } => "uop",
        TcKind::Func { .. } => "func",
        TcKind::Map { .. } => "map",
        TcKind::Let { .. } => "let",
        TcKind::Lambda { .. } => "lambda",
        TcKind::Apply { .. } => "apply",
        TcKind::ReadVar(_) => "readvar",
        TcKind::ReadGlobal(_) => "readglobal",
        TcKind::CreatePathElement { .. } => "createpathelement",
        TcKind::Splatter { .. } => "splatter",
        TcKind::Tuple { .. } => "tuple",
        TcKind::Value(_) => "value",
    }
}

fn expect_coll(v: &Value, what: &str) -> Result<()> {
    if v.is_coll() {
        Ok(())
    } else {
        Err(ExecError::Type(format!(
            "{} is not a set or sequence: {}",
            what, v
        )))
    }
}

fn row_tree<'e>(e: &'e TcExpr, what: &'static str) -> Result<&'e crate::columns::ColTree> {
    e.colnames.as_ref().ok_or(ExecError::MissingAnnotation(what))
}

fn colindex(e: &TcExpr, col: &ColName, what: &'static str) -> Result<usize> {
    row_tree(e, what)?
        .find(col)
        .ok_or_else(|| ExecError::NoSuchColumn(col.to_string()))
}

fn resolve_cols(e: &TcExpr, cols: &ColSet) -> Result<ColSet> {
    let mut cols = cols.clone();
    if cols.is_tocomplement() {
        let tree = row_tree(e, "column complement")?;
        cols.resolve_tocomplement(tree);
    }
    Ok(cols)
}

fn col_indices(e: &TcExpr, cols: &ColSet) -> Result<Vec<usize>> {
    let tree = row_tree(e, "columns")?;
    cols.iter()
        .map(|c| {
            tree.find(c)
                .ok_or_else(|| ExecError::NoSuchColumn(c.to_string()))
        })
        .collect()
}

/// Compare two rows on the listed slots; the whole row when none listed.
fn compare_on(a: &Value, b: &Value, indices: &[usize]) -> std::cmp::Ordering {
    if indices.is_empty() {
        return a.compare(b);
    }
    for &ix in indices {
        match a.tuple_get(ix).compare(b.tuple_get(ix)) {
            std::cmp::Ordering::Equal => {}
            other => return other,
        }
    }
    std::cmp::Ordering::Equal
}

fn mk_coll(as_sequence: bool, elem: Datatype, members: Vec<Value>) -> Value {
    if as_sequence {
        Value::Sequence { elem, members }
    } else {
        Value::Set { elem, members }
    }
}

/// Add a member, widening the member type without the insert-time
/// compatibility fault: executor results may legitimately mix row shapes
/// mid-plan, and a mismatch must surface as a query error downstream, not
/// an abort here.
fn sequence_widen_add(tm: &TypeManager, coll: &mut Value, v: Value) {
    match coll {
        Value::Set { elem, members } | Value::Sequence { elem, members } => {
            *elem = tm.generalize(elem, &v.datatype(tm));
            members.push(v);
        }
        _ => crate::contract::contract_violation("widen_add on non-collection"),
    }
}

/// Accumulates result rows with member-type widening.
struct RowSink<'a> {
    tm: &'a TypeManager,
    as_sequence: bool,
    elem: Datatype,
    members: Vec<Value>,
}

impl<'a> RowSink<'a> {
    fn new(tm: &'a TypeManager, as_sequence: bool) -> RowSink<'a> {
        RowSink {
            tm,
            as_sequence,
            elem: tm.bottom(),
            members: Vec::new(),
        }
    }

    fn add(&mut self, v: Value) {
        self.elem = self.tm.generalize(&self.elem, &v.datatype(self.tm));
        self.members.push(v);
    }

    fn finish(self) -> Value {
        mk_coll(self.as_sequence, self.elem, self.members)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemBackend;
    use crate::columns::{ColTree, NamePool};
    use crate::tcalc::{Op, TcGlobal, VarPool};

    fn eval_with(backend: &mut MemBackend, e: &TcExpr) -> Value {
        let tm = TypeManager::new();
        let mut ev = Evaluator::new(&tm, backend);
        ev.eval(e).unwrap()
    }

    fn eval1(e: &TcExpr) -> Value {
        let mut be = MemBackend::new();
        eval_with(&mut be, e)
    }

    #[test]
    fn value_and_let_and_readvar() {
        let vars = VarPool::new();
        let v = vars.fresh();
        let e = TcExpr::let_(
            v.clone(),
            TcExpr::value(Value::Int(5)),
            TcExpr::bop(
                TcExpr::readvar(v.clone()),
                Op::Add,
                TcExpr::value(Value::Int(2)),
            ),
        );
        assert!(eval1(&e).identical(&Value::Int(7)));
    }

    #[test]
    fn unbound_variable_is_an_error() {
        let vars = VarPool::new();
        let e = TcExpr::readvar(vars.fresh());
        let tm = TypeManager::new();
        let mut be = MemBackend::new();
        let mut ev = Evaluator::new(&tm, &mut be);
        assert!(matches!(ev.eval(&e), Err(ExecError::UnboundVar(_))));
    }

    #[test]
    fn map_collects_preserving_collection_kind() {
        let tm = TypeManager::new();
        let vars = VarPool::new();
        let v = vars.fresh();
        let seq = Value::sequence_from(&tm, vec![Value::Int(1), Value::Int(2)]);
        let e = TcExpr::map(
            v.clone(),
            TcExpr::value(seq),
            TcExpr::bop(
                TcExpr::readvar(v.clone()),
                Op::Mul,
                TcExpr::value(Value::Int(10)),
            ),
        );
        let out = eval1(&e);
        assert!(out.is_sequence());
        assert_eq!(out.to_string(), "{10, 20}");
    }

    #[test]
    fn filter_keeps_truthy_rows() {
        let tm = TypeManager::new();
        let vars = VarPool::new();
        let v = vars.fresh();
        let set = Value::set_from(
            &tm,
            vec![Value::Int(1), Value::Int(0), Value::Int(3)],
        );
        let e = TcExpr::filter(
            TcExpr::value(set),
            TcExpr::lambda(v.clone(), TcExpr::readvar(v.clone())),
        );
        assert_eq!(eval1(&e).to_string(), "{1, 3}");
    }

    #[test]
    fn project_follows_the_annotation() {
        let tm = TypeManager::new();
        let names = NamePool::new();
        let (a, b) = (names.named("a"), names.named("b"));
        let rows = Value::set_from(
            &tm,
            vec![
                Value::pair(Value::Int(1), Value::string("x")),
                Value::pair(Value::Int(2), Value::string("y")),
            ],
        );
        let sub = TcExpr::value(rows).with_cols(ColTree::pair_of(a.clone(), b.clone()));
        let e = TcExpr::project_one(sub, b.clone());
        assert_eq!(eval1(&e).to_string(), "{x, y}");
    }

    #[test]
    fn join_crosses_rows() {
        let tm = TypeManager::new();
        let l = Value::set_from(&tm, vec![Value::Int(1), Value::Int(2)]);
        let r = Value::set_from(&tm, vec![Value::Int(2), Value::Int(3)]);
        let e = TcExpr::join(TcExpr::value(l), TcExpr::value(r), None);
        let out = eval1(&e);
        assert_eq!(out.set_num(), 4);
        assert_eq!(out.set_get(0).to_string(), "(1, 2)");
        assert_eq!(out.set_get(3).to_string(), "(2, 3)");
    }

    #[test]
    fn lambda_closes_over_environment() {
        let vars = VarPool::new();
        let x = vars.fresh();
        let y = vars.fresh();
        // let x = 10 in apply (lambda y. x + y) 5
        let e = TcExpr::let_(
            x.clone(),
            TcExpr::value(Value::Int(10)),
            TcExpr::apply(
                TcExpr::lambda(
                    y.clone(),
                    TcExpr::bop(
                        TcExpr::readvar(x.clone()),
                        Op::Add,
                        TcExpr::readvar(y.clone()),
                    ),
                ),
                TcExpr::value(Value::Int(5)),
            ),
        );
        assert!(eval1(&e).identical(&Value::Int(15)));
    }

    #[test]
    fn closure_value_survives_let() {
        let vars = VarPool::new();
        let x = vars.fresh();
        let f = vars.fresh();
        let y = vars.fresh();
        // let x = 3 in let f = (lambda y. y + x) in apply f 4
        let e = TcExpr::let_(
            x.clone(),
            TcExpr::value(Value::Int(3)),
            TcExpr::let_(
                f.clone(),
                TcExpr::lambda(
                    y.clone(),
                    TcExpr::bop(
                        TcExpr::readvar(y.clone()),
                        Op::Add,
                        TcExpr::readvar(x.clone()),
                    ),
                ),
                TcExpr::apply(TcExpr::readvar(f.clone()), TcExpr::value(Value::Int(4))),
            ),
        );
        assert!(eval1(&e).identical(&Value::Int(7)));
    }

    #[test]
    fn createpathelement_packages_triples() {
        let e = TcExpr::createpathelement(TcExpr::value(Value::Tuple(vec![
            Value::struct_(0, 1, 0),
            Value::string("input"),
            Value::struct_(0, 2, 0),
        ])));
        let out = eval1(&e);
        assert!(out.is_pathelement());
        assert_eq!(out.to_string(), "{0.1}.input.{0.2}");
    }

    #[test]
    fn readglobal_asks_the_backend() {
        let mut be = MemBackend::new();
        be.bind_global("answer", Value::Int(42));
        let e = TcExpr::readglobal(TcGlobal::new("answer"));
        assert!(eval_with(&mut be, &e).identical(&Value::Int(42)));
        let e = TcExpr::readglobal(TcGlobal::new("missing"));
        assert!(eval_with(&mut be, &e).is_nil());
    }

    #[test]
    fn distinguishers_are_unique_per_row() {
        let tm = TypeManager::new();
        let names = NamePool::new();
        let a = names.named("a");
        let rows = Value::set_from(&tm, vec![Value::Int(1), Value::Int(2)]);
        let sub = TcExpr::value(rows).with_cols(ColTree::scalar(Some(a.clone())));
        let e = TcExpr::distinguish(sub, names.named("d"));
        let out = eval1(&e);
        assert_eq!(out.set_num(), 2);
        let d0 = out.set_get(0).tuple_get(1);
        let d1 = out.set_get(1).tuple_get(1);
        assert!(d0.is_distinguisher());
        assert!(!d0.identical(d1));
    }
}

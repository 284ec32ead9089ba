//! Base algebraic rewrites: pushdowns, no-op elimination, fusion, constant
//! folding, and let elimination.

use crate::columns::{ColName, ColSet, ColTree};
use crate::execution::apply_op;
use crate::tcalc::{TcExpr, TcKind, TcVar};
use crate::value::Value;

use super::Optimizer;

impl Optimizer<'_> {
    /// One bottom-up pass: rewrite children first, then this node.
    pub(super) fn baseopt(&mut self, e: TcExpr) -> TcExpr {
        let e = map_subtrees(e, &mut |c| self.baseopt(c));
        self.baseopt_local(e)
    }

    fn baseopt_local(&mut self, e: TcExpr) -> TcExpr {
        let e = self.fold_constants(e);
        let e = self.eliminate_let(e);
        let e = self.drop_noop_project(e);
        let e = self.push_filter_down(e);
        let e = self.hoist_rename(e);
        self.fuse_nest_unnest(e)
    }

    // ------------------------------------------------------------------
    // constant folding

    /// Evaluate Bop/Uop/Func whose operands are all literal values through
    /// the executor's own primitive table. Anything that would error at
    /// run time (division by zero, bad coercion) is left for run time.
    fn fold_constants(&mut self, e: TcExpr) -> TcExpr {
        let folded = match &e.kind {
            TcKind::Bop { left, op, right } => match (&left.kind, &right.kind) {
                (TcKind::Value(l), TcKind::Value(r)) => {
                    apply_op(self.tm, *op, &[l.clone(), r.clone()]).ok()
                }
                _ => None,
            },
            TcKind::Uop { op, sub } => match &sub.kind {
                TcKind::Value(v) => apply_op(self.tm, *op, &[v.clone()]).ok(),
                _ => None,
            },
            TcKind::Func { op, args } => {
                let vals: Option<Vec<Value>> = args
                    .iter()
                    .map(|a| match &a.kind {
                        TcKind::Value(v) => Some(v.clone()),
                        _ => None,
                    })
                    .collect();
                vals.and_then(|vals| apply_op(self.tm, *op, &vals).ok())
            }
            _ => None,
        };
        match folded {
            Some(v) => {
                self.hit("fold_constants");
                TcExpr {
                    datatype: e.datatype,
                    colnames: e.colnames,
                    kind: TcKind::Value(v),
                }
            }
            None => e,
        }
    }

    // ------------------------------------------------------------------
    // let elimination

    /// Drop a let whose variable is never read; substitute one whose bound
    /// value is a literal used exactly once.
    fn eliminate_let(&mut self, e: TcExpr) -> TcExpr {
        if let TcKind::Let { var, value, body } = e.kind {
            let uses = body.count_var_uses(&var);
            if uses == 0 {
                self.hit("eliminate_let_unused");
                return *body;
            }
            if uses == 1 {
                if let TcKind::Value(_) = &value.kind {
                    self.hit("eliminate_let_single_value");
                    return subst_readvar(*body, &var, &value);
                }
            }
            return TcExpr {
                datatype: e.datatype,
                colnames: e.colnames,
                kind: TcKind::Let { var, value, body },
            };
        }
        e
    }

    // ------------------------------------------------------------------
    // projection

    /// A project whose column set names the input's columns in the input's
    /// own order changes nothing.
    fn drop_noop_project(&mut self, e: TcExpr) -> TcExpr {
        if let TcKind::Project { sub, cols } = &e.kind {
            if !cols.is_tocomplement() {
                if let Some(tree) = &sub.colnames {
                    let below = tree.toplevel_columns();
                    let same = below.len() == cols.num()
                        && below.iter().zip(cols.iter()).all(|(a, b)| a == b);
                    if same {
                        self.hit("drop_noop_project");
                        if let TcKind::Project { sub, .. } = e.kind {
                            return *sub;
                        }
                    }
                }
            }
        }
        e
    }

    // ------------------------------------------------------------------
    // filter pushdown

    /// Move a filter below a project, strip, or join when the predicate's
    /// free columns remain in scope underneath. The predicate reads its
    /// row through the column tree annotated on its bound variable, so the
    /// pushed copy is retargeted at the lower row shape; a predicate that
    /// is not a lambda node cannot be retargeted and stays put.
    fn push_filter_down(&mut self, e: TcExpr) -> TcExpr {
        let TcKind::Filter { sub, predicate } = e.kind else {
            return e;
        };
        let freecols = predicate.referenced_columns();
        let is_lambda = matches!(predicate.kind, TcKind::Lambda { .. });
        let sub_datatype = sub.datatype.clone();
        let sub_colnames = sub.colnames.clone();

        match sub.kind {
            TcKind::Project { sub: inner, cols }
                if is_lambda && in_scope(&freecols, &inner) && !cols.is_tocomplement() =>
            {
                self.hit("push_filter_below_project");
                let predicate = retarget_rowvar(predicate, &inner.colnames);
                let filtered = filter_like(inner, predicate);
                TcExpr {
                    datatype: e.datatype,
                    colnames: e.colnames,
                    kind: TcKind::Project {
                        sub: Box::new(filtered),
                        cols,
                    },
                }
            }
            TcKind::Strip { sub: inner, cols }
                if is_lambda && disjoint(&freecols, &cols) && in_scope(&freecols, &inner) =>
            {
                self.hit("push_filter_below_strip");
                let predicate = retarget_rowvar(predicate, &inner.colnames);
                let filtered = filter_like(inner, predicate);
                TcExpr {
                    datatype: e.datatype,
                    colnames: e.colnames,
                    kind: TcKind::Strip {
                        sub: Box::new(filtered),
                        cols,
                    },
                }
            }
            TcKind::Join {
                left,
                right,
                predicate: jpred,
            } if is_lambda
                && (in_scope_strict(&freecols, &left)
                    || in_scope_strict(&freecols, &right)) =>
            {
                let kind = if in_scope_strict(&freecols, &left) {
                    self.hit("push_filter_below_join_left");
                    let predicate = retarget_rowvar(predicate, &left.colnames);
                    TcKind::Join {
                        left: Box::new(filter_like(left, predicate)),
                        right,
                        predicate: jpred,
                    }
                } else {
                    self.hit("push_filter_below_join_right");
                    let predicate = retarget_rowvar(predicate, &right.colnames);
                    TcKind::Join {
                        left,
                        right: Box::new(filter_like(right, predicate)),
                        predicate: jpred,
                    }
                };
                TcExpr {
                    datatype: e.datatype,
                    colnames: e.colnames,
                    kind,
                }
            }
            other => TcExpr {
                datatype: e.datatype,
                colnames: e.colnames,
                kind: TcKind::Filter {
                    sub: Box::new(TcExpr {
                        datatype: sub_datatype,
                        colnames: sub_colnames,
                        kind: other,
                    }),
                    predicate,
                },
            },
        }
    }

    // ------------------------------------------------------------------
    // rename commuting

    /// Hoist a rename above an order/uniq/filter that does not mention
    /// either end of the renaming; downstream rules then see through the
    /// unrelated node.
    fn hoist_rename(&mut self, e: TcExpr) -> TcExpr {
        match e.kind {
            TcKind::Order { sub, cols }
                if rename_unrelated_to_cols(&sub, &cols) =>
            {
                self.hit("hoist_rename_above_order");
                swap_rename(e.datatype, e.colnames, *sub, |inner| TcKind::Order {
                    sub: Box::new(inner),
                    cols,
                })
            }
            TcKind::Uniq { sub, cols }
                if rename_unrelated_to_cols(&sub, &cols) =>
            {
                self.hit("hoist_rename_above_uniq");
                swap_rename(e.datatype, e.colnames, *sub, |inner| TcKind::Uniq {
                    sub: Box::new(inner),
                    cols,
                })
            }
            TcKind::Filter { sub, predicate }
                if rename_unrelated_to_pred(&sub, &predicate) =>
            {
                self.hit("hoist_rename_above_filter");
                swap_rename(e.datatype, e.colnames, *sub, |inner| TcKind::Filter {
                    sub: Box::new(inner),
                    predicate,
                })
            }
            kind => TcExpr {
                datatype: e.datatype,
                colnames: e.colnames,
                kind,
            },
        }
    }

    // ------------------------------------------------------------------
    // nest/unnest fusion

    /// `unnest(nest(S, cols, g), g)` is the identity when the nested
    /// columns already sit at the end of the row, which is where nest puts
    /// them back.
    fn fuse_nest_unnest(&mut self, e: TcExpr) -> TcExpr {
        if let TcKind::Unnest { sub, col } = &e.kind {
            if let TcKind::Nest {
                sub: inner,
                cols,
                newcol,
            } = &sub.kind
            {
                if col == newcol && cols_are_trailing(cols, inner) {
                    self.hit("fuse_nest_unnest");
                    if let TcKind::Unnest { sub, .. } = e.kind {
                        if let TcKind::Nest { sub: inner, .. } = sub.kind {
                            return *inner;
                        }
                    }
                    unreachable!();
                }
            }
        }
        e
    }
}

// ============================================================================
// helpers
// ============================================================================

/// Point a pushed predicate at the lower row shape: every read of the
/// lambda's row variable gets the lower column tree.
fn retarget_rowvar(predicate: Box<TcExpr>, lower: &Option<ColTree>) -> Box<TcExpr> {
    let Some(lower) = lower else {
        return predicate;
    };
    let TcKind::Lambda { var, body } = predicate.kind else {
        unreachable!("guarded by is_lambda");
    };
    fn retag(e: TcExpr, var: &TcVar, lower: &ColTree) -> TcExpr {
        if let TcKind::ReadVar(v) = &e.kind {
            if v == var {
                return TcExpr {
                    datatype: e.datatype,
                    colnames: Some(lower.clone()),
                    kind: e.kind,
                };
            }
            return e;
        }
        map_subtrees(e, &mut |c| retag(c, var, lower))
    }
    let body = retag(*body, &var, lower);
    Box::new(TcExpr {
        datatype: predicate.datatype,
        colnames: predicate.colnames,
        kind: TcKind::Lambda {
            var,
            body: Box::new(body),
        },
    })
}

/// Build a filter around `inner`, inheriting inner's annotations (a
/// filter never changes row shape).
fn filter_like(inner: Box<TcExpr>, predicate: Box<TcExpr>) -> TcExpr {
    TcExpr {
        datatype: inner.datatype.clone(),
        colnames: inner.colnames.clone(),
        kind: TcKind::Filter {
            sub: inner,
            predicate,
        },
    }
}

/// All free columns present at top level of the expression's column tree.
/// Unannotated inputs fail open for project (projection cannot invent
/// columns) but this helper is only called when a tree is available.
fn in_scope(freecols: &[ColName], e: &TcExpr) -> bool {
    match &e.colnames {
        Some(tree) => freecols.iter().all(|c| tree.contains_toplevel(c)),
        None => false,
    }
}

/// As `in_scope`, but an empty footprint does not count: a predicate that
/// names no columns gives no reason to prefer one join side.
fn in_scope_strict(freecols: &[ColName], e: &TcExpr) -> bool {
    !freecols.is_empty() && in_scope(freecols, e)
}

fn disjoint(freecols: &[ColName], cols: &ColSet) -> bool {
    freecols.iter().all(|c| !cols.contains(c))
}

fn rename_unrelated_to_cols(sub: &TcExpr, cols: &ColSet) -> bool {
    match &sub.kind {
        TcKind::Rename { oldcol, newcol, .. } => {
            !cols.contains(oldcol) && !cols.contains(newcol)
        }
        _ => false,
    }
}

fn rename_unrelated_to_pred(sub: &TcExpr, predicate: &TcExpr) -> bool {
    match &sub.kind {
        TcKind::Rename { oldcol, newcol, .. } => {
            let free = predicate.referenced_columns();
            !free.contains(oldcol) && !free.contains(newcol)
        }
        _ => false,
    }
}

/// Rewrite `outer(Rename(inner))` into `Rename(outer(inner))`.
fn swap_rename(
    datatype: Option<crate::types::Datatype>,
    colnames: Option<ColTree>,
    rename_node: TcExpr,
    outer: impl FnOnce(TcExpr) -> TcKind,
) -> TcExpr {
    let TcKind::Rename {
        sub: inner,
        oldcol,
        newcol,
    } = rename_node.kind
    else {
        unreachable!("guarded by rename_unrelated_*");
    };
    let inner_annotated = TcExpr {
        datatype: inner.datatype.clone(),
        colnames: inner.colnames.clone(),
        kind: outer(*inner),
    };
    TcExpr {
        datatype,
        colnames,
        kind: TcKind::Rename {
            sub: Box::new(inner_annotated),
            oldcol,
            newcol,
        },
    }
}

/// Do `cols` name exactly the trailing columns of the input, in order?
fn cols_are_trailing(cols: &ColSet, inner: &TcExpr) -> bool {
    let Some(tree) = &inner.colnames else {
        return false;
    };
    let top = tree.toplevel_columns();
    if cols.num() == 0 || cols.num() > top.len() {
        return false;
    }
    let tail = &top[top.len() - cols.num()..];
    tail.iter().zip(cols.iter()).all(|(a, b)| a == b)
}

/// Replace each read of `var` with the bound literal, keeping the read
/// site's annotations.
fn subst_readvar(body: TcExpr, var: &TcVar, value: &TcExpr) -> TcExpr {
    if let TcKind::ReadVar(v) = &body.kind {
        if v == var {
            return TcExpr {
                datatype: body.datatype.or_else(|| value.datatype.clone()),
                colnames: body.colnames.or_else(|| value.colnames.clone()),
                kind: value.kind.clone(),
            };
        }
        return body;
    }
    map_subtrees(body, &mut |c| subst_readvar(c, var, value))
}

/// Apply `f` to every direct subtree, rebuilding the node.
pub(super) fn map_subtrees(e: TcExpr, f: &mut dyn FnMut(TcExpr) -> TcExpr) -> TcExpr {
    let TcExpr {
        datatype,
        colnames,
        kind,
    } = e;
    let kind = match kind {
        TcKind::Filter { sub, predicate } => TcKind::Filter {
            sub: Box::new(f(*sub)),
            predicate: Box::new(f(*predicate)),
        },
        TcKind::Project { sub, cols } => TcKind::Project {
            sub: Box::new(f(*sub)),
            cols,
        },
        TcKind::Strip { sub, cols } => TcKind::Strip {
            sub: Box::new(f(*sub)),
            cols,
        },
        TcKind::Rename {
            sub,
            oldcol,
            newcol,
        } => TcKind::Rename {
            sub: Box::new(f(*sub)),
            oldcol,
            newcol,
        },
        TcKind::Join {
            left,
            right,
            predicate,
        } => TcKind::Join {
            left: Box::new(f(*left)),
            right: Box::new(f(*right)),
            predicate: predicate.map(|p| Box::new(f(*p))),
        },
        TcKind::Order { sub, cols } => TcKind::Order {
            sub: Box::new(f(*sub)),
            cols,
        },
        TcKind::Uniq { sub, cols } => TcKind::Uniq {
            sub: Box::new(f(*sub)),
            cols,
        },
        TcKind::Nest { sub, cols, newcol } => TcKind::Nest {
            sub: Box::new(f(*sub)),
            cols,
            newcol,
        },
        TcKind::Unnest { sub, col } => TcKind::Unnest {
            sub: Box::new(f(*sub)),
            col,
        },
        TcKind::Distinguish { sub, newcol } => TcKind::Distinguish {
            sub: Box::new(f(*sub)),
            newcol,
        },
        TcKind::Adjoin { left, func, newcol } => TcKind::Adjoin {
            left: Box::new(f(*left)),
            func: Box::new(f(*func)),
            newcol,
        },
        TcKind::Step {
            sub,
            subcolumn,
            edgename,
            reversed,
            leftobjcolumn,
            edgecolumn,
            rightobjcolumn,
            predicate,
        } => TcKind::Step {
            sub: Box::new(f(*sub)),
            subcolumn,
            edgename,
            reversed,
            leftobjcolumn,
            edgecolumn,
            rightobjcolumn,
            predicate: predicate.map(|p| Box::new(f(*p))),
        },
        TcKind::Repeat {
            sub,
            subendcolumn,
            loopvar,
            bodystartcolumn,
            body,
            bodypathcolumn,
            bodyendcolumn,
            repeatpathcolumn,
            repeatendcolumn,
        } => TcKind::Repeat {
            sub: Box::new(f(*sub)),
            subendcolumn,
            loopvar,
            bodystartcolumn,
            body: Box::new(f(*body)),
            bodypathcolumn,
            bodyendcolumn,
            repeatpathcolumn,
            repeatendcolumn,
        },
        TcKind::Scan {
            leftobjcolumn,
            edgecolumn,
            rightobjcolumn,
            predicate,
        } => TcKind::Scan {
            leftobjcolumn,
            edgecolumn,
            rightobjcolumn,
            predicate: predicate.map(|p| Box::new(f(*p))),
        },
        TcKind::Bop { left, op, right } => TcKind::Bop {
            left: Box::new(f(*left)),
            op,
            right: Box::new(f(*right)),
        },
        TcKind::Uop { op, sub } => TcKind::Uop {
            op,
            sub: Box::new(f(*sub)),
        },
        TcKind::Func { op, args } => TcKind::Func {
            op,
            args: args.into_iter().map(&mut *f).collect(),
        },
        TcKind::Map { var, set, result } => TcKind::Map {
            var,
            set: Box::new(f(*set)),
            result: Box::new(f(*result)),
        },
        TcKind::Let { var, value, body } => TcKind::Let {
            var,
            value: Box::new(f(*value)),
            body: Box::new(f(*body)),
        },
        TcKind::Lambda { var, body } => TcKind::Lambda {
            var,
            body: Box::new(f(*body)),
        },
        TcKind::Apply { lambda, arg } => TcKind::Apply {
            lambda: Box::new(f(*lambda)),
            arg: Box::new(f(*arg)),
        },
        TcKind::CreatePathElement { sub } => TcKind::CreatePathElement {
            sub: Box::new(f(*sub)),
        },
        TcKind::Splatter { value, name } => TcKind::Splatter {
            value: Box::new(f(*value)),
            name: Box::new(f(*name)),
        },
        TcKind::Tuple { exprs, columns } => TcKind::Tuple {
            exprs: exprs.into_iter().map(&mut *f).collect(),
            columns,
        },
        leaf @ (TcKind::ReadVar(_) | TcKind::ReadGlobal(_) | TcKind::Value(_)) => leaf,
    };
    TcExpr {
        datatype,
        colnames,
        kind,
    }
}

//! Graph-pattern rewrites: turn scan-shaped plans into step probes, which
//! a backend can serve from an edge index instead of a full sweep.

use crate::columns::{ColSet, ColTree};
use crate::tcalc::{Op, TcExpr, TcKind};
use crate::value::Value;

use super::baseopt::map_subtrees;
use super::Optimizer;

impl Optimizer<'_> {
    /// One bottom-up indexify pass.
    pub(super) fn indexify(&mut self, e: TcExpr) -> TcExpr {
        let e = map_subtrees(e, &mut |c| self.indexify(c));
        let e = self.scan_filter_to_step(e);
        if self.fuse_step_chains {
            return self.chain_to_repeat(e);
        }
        e
    }

    /// `filter(scan(l, e, r), λrow. row.e == K)` with a concrete edge
    /// constant K is the nominal index probe: step every object along edge
    /// K. The probe runs from the object universe under a throwaway
    /// column, stripped away on top.
    fn scan_filter_to_step(&mut self, e: TcExpr) -> TcExpr {
        let TcKind::Filter { sub, predicate } = &e.kind else {
            return e;
        };
        let TcKind::Scan {
            leftobjcolumn,
            edgecolumn,
            rightobjcolumn,
            predicate: scanpred,
        } = &sub.kind
        else {
            return e;
        };
        let Some(edgeval) = edge_equality_constant(predicate, edgecolumn) else {
            return e;
        };
        if !(edgeval.is_string() || edgeval.is_int()) {
            return e;
        }
        self.hit("scan_filter_to_step");

        let universe_col = self.names.fresh();
        let universe = TcExpr::readglobal(crate::tcalc::TcGlobal::new(
            crate::backend::VERSIONS_GLOBAL,
        ))
        .with_type(self.tm.set(self.tm.struct_()))
        .with_cols(ColTree::scalar(Some(universe_col.clone())));

        let step_tree = ColTree::tuple(
            None,
            vec![
                ColTree::scalar(Some(universe_col.clone())),
                ColTree::scalar(Some(leftobjcolumn.clone())),
                ColTree::scalar(Some(edgecolumn.clone())),
                ColTree::scalar(Some(rightobjcolumn.clone())),
            ],
        );
        let step = TcExpr::step(
            universe,
            universe_col.clone(),
            Some(edgeval),
            false,
            leftobjcolumn.clone(),
            edgecolumn.clone(),
            rightobjcolumn.clone(),
            scanpred.as_deref().cloned(),
        )
        .with_cols(step_tree);

        TcExpr {
            datatype: e.datatype.clone(),
            colnames: e.colnames.clone(),
            kind: TcKind::Strip {
                sub: Box::new(step),
                cols: ColSet::singleton(universe_col),
            },
        }
    }

    /// Fuse `step∘step` chains (same edge and direction, no intermediate
    /// predicate) into a repeat with path accumulation. The repeat reaches
    /// every endpoint at one or more hops, so this widens an exact
    /// two-hop chain; it is enabled only when the embedder opts in.
    fn chain_to_repeat(&mut self, e: TcExpr) -> TcExpr {
        let TcKind::Step {
            sub: outer_sub,
            subcolumn: outer_subcol,
            edgename: Some(edge),
            reversed,
            predicate: None,
            ..
        } = &e.kind
        else {
            return e;
        };
        let TcKind::Step {
            sub: inner_sub,
            subcolumn: inner_subcol,
            edgename: Some(inner_edge),
            reversed: inner_reversed,
            rightobjcolumn: inner_right,
            predicate: None,
            ..
        } = &outer_sub.kind
        else {
            return e;
        };
        if reversed != inner_reversed || !edge.eq_value(inner_edge) || outer_subcol != inner_right
        {
            return e;
        }
        self.hit("chain_to_repeat");

        let loopvar = self.vars_fresh();
        let bstart = self.names.fresh();
        let bleft = self.names.fresh();
        let bedge = self.names.fresh();
        let bright = self.names.fresh();
        let bpath = self.names.fresh();
        let rpath = self.names.fresh();
        let rend = self.names.fresh();

        let frontier = TcExpr::readvar(loopvar.clone())
            .with_cols(ColTree::scalar(Some(bstart.clone())));
        let step = TcExpr::step(
            frontier,
            bstart.clone(),
            Some(edge.clone()),
            *reversed,
            bleft.clone(),
            bedge.clone(),
            bright.clone(),
            None,
        )
        .with_cols(ColTree::tuple(
            None,
            vec![
                ColTree::scalar(Some(bstart.clone())),
                ColTree::scalar(Some(bleft.clone())),
                ColTree::scalar(Some(bedge.clone())),
                ColTree::scalar(Some(bright.clone())),
            ],
        ));

        // adjoin one path element per traversed step
        let rowvar = self.vars_fresh();
        let rowtree = ColTree::tuple(
            None,
            vec![
                ColTree::scalar(Some(bstart.clone())),
                ColTree::scalar(Some(bleft.clone())),
                ColTree::scalar(Some(bedge.clone())),
                ColTree::scalar(Some(bright.clone())),
            ],
        );
        let mkpath = TcExpr::lambda(
            rowvar.clone(),
            TcExpr::createpathelement(TcExpr::tuple(
                vec![
                    TcExpr::project_one(
                        TcExpr::readvar(rowvar.clone()).with_cols(rowtree.clone()),
                        bleft.clone(),
                    ),
                    TcExpr::project_one(
                        TcExpr::readvar(rowvar.clone()).with_cols(rowtree.clone()),
                        bedge.clone(),
                    ),
                    TcExpr::project_one(
                        TcExpr::readvar(rowvar.clone()).with_cols(rowtree),
                        bright.clone(),
                    ),
                ],
                ColSet::triple(bleft.clone(), bedge.clone(), bright.clone()),
            )),
        );
        let with_path = TcExpr::adjoin(step, mkpath, bpath.clone()).with_cols(ColTree::tuple(
            None,
            vec![
                ColTree::scalar(Some(bstart.clone())),
                ColTree::scalar(Some(bleft.clone())),
                ColTree::scalar(Some(bedge.clone())),
                ColTree::scalar(Some(bright.clone())),
                ColTree::scalar(Some(bpath.clone())),
            ],
        ));
        let body = TcExpr::project(
            with_path,
            ColSet::triple(bstart.clone(), bpath.clone(), bright.clone()),
        )
        .with_cols(ColTree::tuple(
            None,
            vec![
                ColTree::scalar(Some(bstart.clone())),
                ColTree::scalar(Some(bpath.clone())),
                ColTree::scalar(Some(bright.clone())),
            ],
        ));

        let TcKind::Step {
            sub: outer_sub, ..
        } = e.kind
        else {
            unreachable!();
        };
        let TcKind::Step {
            sub: origin,
            subcolumn: origin_col,
            ..
        } = outer_sub.kind
        else {
            unreachable!();
        };

        TcExpr::repeat(
            *origin,
            origin_col,
            loopvar,
            bstart,
            body,
            bpath.clone(),
            bright,
            rpath,
            rend,
        )
    }

    fn vars_fresh(&self) -> crate::tcalc::TcVar {
        self.vars.fresh()
    }
}

/// Match `λrow. row.col == K` (either operand order) and return K.
fn edge_equality_constant(
    predicate: &TcExpr,
    edgecolumn: &crate::columns::ColName,
) -> Option<Value> {
    let TcKind::Lambda { var, body } = &predicate.kind else {
        return None;
    };
    let TcKind::Bop {
        left,
        op: Op::Eq,
        right,
    } = &body.kind
    else {
        return None;
    };

    let is_edge_read = |e: &TcExpr| -> bool {
        let TcKind::Project { sub, cols } = &e.kind else {
            return false;
        };
        if cols.num() != 1 || cols.get(0) != edgecolumn {
            return false;
        }
        matches!(&sub.kind, TcKind::ReadVar(v) if v == var)
    };
    let constant_of = |e: &TcExpr| -> Option<Value> {
        match &e.kind {
            TcKind::Value(v) => Some(v.clone()),
            _ => None,
        }
    };

    if is_edge_read(left) {
        return constant_of(right);
    }
    if is_edge_read(right) {
        return constant_of(left);
    }
    None
}

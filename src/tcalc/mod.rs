//! # Tuple Calculus
//!
//! The engine's intermediate representation: a named-column relational
//! algebra extended with graph steps and closure. The front end translates
//! parsed queries into [`TcExpr`] trees; the optimizer rewrites them; the
//! executor interprets them against a backend.
//!
//! Every node may carry its inferred [`Datatype`] and [`ColTree`] once
//! inference has run. Trees are owned by exactly one parent slot; cloning a
//! tree deep-copies the structure while reference-bumping the shared
//! handles (column names, variables, globals), so annotations stay aliased
//! the way the refcount discipline of the calculus requires.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::columns::{ColName, ColSet, ColTree};
use crate::layout::Layout;
use crate::types::Datatype;
use crate::value::Value;

// ============================================================================
// Variables and globals
// ============================================================================

struct VarInner {
    id: u32,
    datatype: RefCell<Option<Datatype>>,
    colnames: RefCell<Option<ColTree>>,
    live: Rc<Cell<isize>>,
}

impl Drop for VarInner {
    fn drop(&mut self) {
        self.live.set(self.live.get() - 1);
    }
}

/// A bound variable of the calculus. Shared handle; two variables are the
/// same binding iff the handles alias. Carries its resolved datatype and
/// column tree once type inference has run.
#[derive(Clone)]
pub struct TcVar(Rc<VarInner>);

impl PartialEq for TcVar {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for TcVar {}

impl TcVar {
    pub fn id(&self) -> u32 {
        self.0.id
    }

    pub fn datatype(&self) -> Option<Datatype> {
        self.0.datatype.borrow().clone()
    }

    pub fn set_datatype(&self, t: Datatype) {
        *self.0.datatype.borrow_mut() = Some(t);
    }

    pub fn colnames(&self) -> Option<ColTree> {
        self.0.colnames.borrow().clone()
    }

    pub fn set_colnames(&self, ct: ColTree) {
        *self.0.colnames.borrow_mut() = Some(ct);
    }
}

impl fmt::Debug for TcVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ".K{}", self.0.id)
    }
}

/// Allocator for variables; `live()` is the leak check, as for column names.
pub struct VarPool {
    next_id: Cell<u32>,
    live: Rc<Cell<isize>>,
}

impl VarPool {
    pub fn new() -> VarPool {
        VarPool {
            next_id: Cell::new(0),
            live: Rc::new(Cell::new(0)),
        }
    }

    pub fn fresh(&self) -> TcVar {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.live.set(self.live.get() + 1);
        TcVar(Rc::new(VarInner {
            id,
            datatype: RefCell::new(None),
            colnames: RefCell::new(None),
            live: Rc::clone(&self.live),
        }))
    }

    pub fn live(&self) -> isize {
        self.live.get()
    }
}

impl Default for VarPool {
    fn default() -> Self {
        Self::new()
    }
}

/// A named placeholder resolved by the backend at run time.
#[derive(Clone)]
pub struct TcGlobal(Rc<String>);

impl TcGlobal {
    pub fn new(name: &str) -> TcGlobal {
        TcGlobal(Rc::new(name.to_owned()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl PartialEq for TcGlobal {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}
impl Eq for TcGlobal {}

impl fmt::Debug for TcGlobal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Operators
// ============================================================================

/// Scalar and set-theoretic primitives for Bop/Uop/Func nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    // logical
    And,
    Or,
    Not,
    // comparison (value-model promotions apply)
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    // arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    Abs,
    // string
    Concat,
    StrLen,
    ToString,
    // set / sequence
    Union,
    Intersect,
    Except,
    In,
    NonEmpty,
    Count,
    Min,
    Max,
    Sum,
    Choose,
}

impl Op {
    pub fn name(self) -> &'static str {
        match self {
            Op::And => "and",
            Op::Or => "or",
            Op::Not => "not",
            Op::Eq => "==",
            Op::NotEq => "!=",
            Op::Lt => "<",
            Op::LtEq => "<=",
            Op::Gt => ">",
            Op::GtEq => ">=",
            Op::Add => "+",
            Op::Sub => "-",
            Op::Mul => "*",
            Op::Div => "/",
            Op::Mod => "%",
            Op::Neg => "neg",
            Op::Abs => "abs",
            Op::Concat => "++",
            Op::StrLen => "strlen",
            Op::ToString => "tostring",
            Op::Union => "union",
            Op::Intersect => "intersect",
            Op::Except => "except",
            Op::In => "in",
            Op::NonEmpty => "nonempty",
            Op::Count => "count",
            Op::Min => "min",
            Op::Max => "max",
            Op::Sum => "sum",
            Op::Choose => "choose",
        }
    }
}

// ============================================================================
// Expressions
// ============================================================================

/// A runtime closure: a lambda body closed over the environment at the
/// point the lambda was evaluated.
#[derive(Debug)]
pub struct Closure {
    pub var: TcVar,
    pub body: TcExpr,
    pub env: Vec<(u32, Value)>,
}

/// One node of a tuple-calculus tree, with its (optional, post-inference)
/// type and column annotations.
#[derive(Debug, Clone)]
pub struct TcExpr {
    pub datatype: Option<Datatype>,
    pub colnames: Option<ColTree>,
    pub kind: TcKind,
}

/// The node kinds of the calculus.
#[derive(Debug, Clone)]
pub enum TcKind {
    /// Keep the rows of `sub` satisfying `predicate` (a row lambda).
    Filter {
        sub: Box<TcExpr>,
        predicate: Box<TcExpr>,
    },
    /// Keep only the named columns, in the set's order.
    Project { sub: Box<TcExpr>, cols: ColSet },
    /// Drop the named columns.
    Strip { sub: Box<TcExpr>, cols: ColSet },
    Rename {
        sub: Box<TcExpr>,
        oldcol: ColName,
        newcol: ColName,
    },
    /// Cross product, optionally filtered by a row lambda over the pasted
    /// rows.
    Join {
        left: Box<TcExpr>,
        right: Box<TcExpr>,
        predicate: Option<Box<TcExpr>>,
    },
    /// Stable sort by the listed columns.
    Order { sub: Box<TcExpr>, cols: ColSet },
    /// Consecutive-duplicate elimination on the listed columns.
    Uniq { sub: Box<TcExpr>, cols: ColSet },
    /// Group by the remaining columns; collect `cols` into a set under
    /// `newcol`.
    Nest {
        sub: Box<TcExpr>,
        cols: ColSet,
        newcol: ColName,
    },
    /// Flatten the set-valued column `col` back into rows.
    Unnest { sub: Box<TcExpr>, col: ColName },
    /// Append a fresh distinguisher per row under `newcol`.
    Distinguish { sub: Box<TcExpr>, newcol: ColName },
    /// Evaluate `func` (a row lambda) per row; append the result under
    /// `newcol`.
    Adjoin {
        left: Box<TcExpr>,
        func: Box<TcExpr>,
        newcol: ColName,
    },
    /// Follow an edge from the object in `subcolumn` of each row. A `None`
    /// edge name means every edge.
    Step {
        sub: Box<TcExpr>,
        subcolumn: ColName,
        edgename: Option<Value>,
        reversed: bool,
        leftobjcolumn: ColName,
        edgecolumn: ColName,
        rightobjcolumn: ColName,
        predicate: Option<Box<TcExpr>>,
    },
    /// Transitive closure: iterate `body` from the frontier of endpoints,
    /// accumulating traversed paths, until no new endpoint appears.
    Repeat {
        sub: Box<TcExpr>,
        subendcolumn: ColName,
        loopvar: TcVar,
        bodystartcolumn: ColName,
        body: Box<TcExpr>,
        bodypathcolumn: ColName,
        bodyendcolumn: ColName,
        repeatpathcolumn: ColName,
        repeatendcolumn: ColName,
    },
    /// Every (left, edge, right) triple in the store.
    Scan {
        leftobjcolumn: ColName,
        edgecolumn: ColName,
        rightobjcolumn: ColName,
        predicate: Option<Box<TcExpr>>,
    },
    Bop {
        left: Box<TcExpr>,
        op: Op,
        right: Box<TcExpr>,
    },
    Uop { op: Op, sub: Box<TcExpr> },
    Func { op: Op, args: Vec<TcExpr> },
    /// Evaluate `result` with `var` bound to each member of `set`.
    Map {
        var: TcVar,
        set: Box<TcExpr>,
        result: Box<TcExpr>,
    },
    Let {
        var: TcVar,
        value: Box<TcExpr>,
        body: Box<TcExpr>,
    },
    Lambda { var: TcVar, body: Box<TcExpr> },
    Apply {
        lambda: Box<TcExpr>,
        arg: Box<TcExpr>,
    },
    ReadVar(TcVar),
    ReadGlobal(TcGlobal),
    /// Package a 3-tuple (left, edge, right) into a path element.
    CreatePathElement { sub: Box<TcExpr> },
    /// Attach a name to a value for downstream record construction.
    Splatter {
        value: Box<TcExpr>,
        name: Box<TcExpr>,
    },
    /// Build a fresh tuple from the argument expressions, named by
    /// `columns`.
    Tuple { exprs: Vec<TcExpr>, columns: ColSet },
    Value(Value),
}

impl TcExpr {
    fn mk(kind: TcKind) -> TcExpr {
        TcExpr {
            datatype: None,
            colnames: None,
            kind,
        }
    }

    // ------------------------------------------------------------------
    // builders (take ownership of their inputs)

    pub fn filter(sub: TcExpr, predicate: TcExpr) -> TcExpr {
        TcExpr::mk(TcKind::Filter {
            sub: Box::new(sub),
            predicate: Box::new(predicate),
        })
    }

    pub fn project(sub: TcExpr, cols: ColSet) -> TcExpr {
        TcExpr::mk(TcKind::Project {
            sub: Box::new(sub),
            cols,
        })
    }

    pub fn project_one(sub: TcExpr, col: ColName) -> TcExpr {
        TcExpr::project(sub, ColSet::singleton(col))
    }

    pub fn strip(sub: TcExpr, cols: ColSet) -> TcExpr {
        TcExpr::mk(TcKind::Strip {
            sub: Box::new(sub),
            cols,
        })
    }

    pub fn rename(sub: TcExpr, oldcol: ColName, newcol: ColName) -> TcExpr {
        TcExpr::mk(TcKind::Rename {
            sub: Box::new(sub),
            oldcol,
            newcol,
        })
    }

    pub fn join(left: TcExpr, right: TcExpr, predicate: Option<TcExpr>) -> TcExpr {
        TcExpr::mk(TcKind::Join {
            left: Box::new(left),
            right: Box::new(right),
            predicate: predicate.map(Box::new),
        })
    }

    pub fn order(sub: TcExpr, cols: ColSet) -> TcExpr {
        TcExpr::mk(TcKind::Order {
            sub: Box::new(sub),
            cols,
        })
    }

    pub fn uniq(sub: TcExpr, cols: ColSet) -> TcExpr {
        TcExpr::mk(TcKind::Uniq {
            sub: Box::new(sub),
            cols,
        })
    }

    pub fn nest(sub: TcExpr, cols: ColSet, newcol: ColName) -> TcExpr {
        TcExpr::mk(TcKind::Nest {
            sub: Box::new(sub),
            cols,
            newcol,
        })
    }

    pub fn unnest(sub: TcExpr, col: ColName) -> TcExpr {
        TcExpr::mk(TcKind::Unnest {
            sub: Box::new(sub),
            col,
        })
    }

    pub fn distinguish(sub: TcExpr, newcol: ColName) -> TcExpr {
        TcExpr::mk(TcKind::Distinguish {
            sub: Box::new(sub),
            newcol,
        })
    }

    pub fn adjoin(left: TcExpr, func: TcExpr, newcol: ColName) -> TcExpr {
        TcExpr::mk(TcKind::Adjoin {
            left: Box::new(left),
            func: Box::new(func),
            newcol,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn step(
        sub: TcExpr,
        subcolumn: ColName,
        edgename: Option<Value>,
        reversed: bool,
        leftobjcolumn: ColName,
        edgecolumn: ColName,
        rightobjcolumn: ColName,
        predicate: Option<TcExpr>,
    ) -> TcExpr {
        TcExpr::mk(TcKind::Step {
            sub: Box::new(sub),
            subcolumn,
            edgename,
            reversed,
            leftobjcolumn,
            edgecolumn,
            rightobjcolumn,
            predicate: predicate.map(Box::new),
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn repeat(
        sub: TcExpr,
        subendcolumn: ColName,
        loopvar: TcVar,
        bodystartcolumn: ColName,
        body: TcExpr,
        bodypathcolumn: ColName,
        bodyendcolumn: ColName,
        repeatpathcolumn: ColName,
        repeatendcolumn: ColName,
    ) -> TcExpr {
        TcExpr::mk(TcKind::Repeat {
            sub: Box::new(sub),
            subendcolumn,
            loopvar,
            bodystartcolumn,
            body: Box::new(body),
            bodypathcolumn,
            bodyendcolumn,
            repeatpathcolumn,
            repeatendcolumn,
        })
    }

    pub fn scan(
        leftobjcolumn: ColName,
        edgecolumn: ColName,
        rightobjcolumn: ColName,
        predicate: Option<TcExpr>,
    ) -> TcExpr {
        TcExpr::mk(TcKind::Scan {
            leftobjcolumn,
            edgecolumn,
            rightobjcolumn,
            predicate: predicate.map(Box::new),
        })
    }

    pub fn bop(left: TcExpr, op: Op, right: TcExpr) -> TcExpr {
        TcExpr::mk(TcKind::Bop {
            left: Box::new(left),
            op,
            right: Box::new(right),
        })
    }

    pub fn uop(op: Op, sub: TcExpr) -> TcExpr {
        TcExpr::mk(TcKind::Uop {
            op,
            sub: Box::new(sub),
        })
    }

    pub fn func(op: Op, args: Vec<TcExpr>) -> TcExpr {
        TcExpr::mk(TcKind::Func { op, args })
    }

    pub fn map(var: TcVar, set: TcExpr, result: TcExpr) -> TcExpr {
        TcExpr::mk(TcKind::Map {
            var,
            set: Box::new(set),
            result: Box::new(result),
        })
    }

    pub fn let_(var: TcVar, value: TcExpr, body: TcExpr) -> TcExpr {
        TcExpr::mk(TcKind::Let {
            var,
            value: Box::new(value),
            body: Box::new(body),
        })
    }

    pub fn lambda(var: TcVar, body: TcExpr) -> TcExpr {
        TcExpr::mk(TcKind::Lambda {
            var,
            body: Box::new(body),
        })
    }

    pub fn apply(lambda: TcExpr, arg: TcExpr) -> TcExpr {
        TcExpr::mk(TcKind::Apply {
            lambda: Box::new(lambda),
            arg: Box::new(arg),
        })
    }

    pub fn readvar(var: TcVar) -> TcExpr {
        TcExpr::mk(TcKind::ReadVar(var))
    }

    pub fn readglobal(global: TcGlobal) -> TcExpr {
        TcExpr::mk(TcKind::ReadGlobal(global))
    }

    pub fn createpathelement(sub: TcExpr) -> TcExpr {
        TcExpr::mk(TcKind::CreatePathElement { sub: Box::new(sub) })
    }

    pub fn splatter(value: TcExpr, name: TcExpr) -> TcExpr {
        TcExpr::mk(TcKind::Splatter {
            value: Box::new(value),
            name: Box::new(name),
        })
    }

    pub fn tuple(exprs: Vec<TcExpr>, columns: ColSet) -> TcExpr {
        TcExpr::mk(TcKind::Tuple { exprs, columns })
    }

    pub fn value(v: Value) -> TcExpr {
        TcExpr::mk(TcKind::Value(v))
    }

    // ------------------------------------------------------------------
    // annotations

    pub fn with_type(mut self, t: Datatype) -> TcExpr {
        self.datatype = Some(t);
        self
    }

    pub fn with_cols(mut self, ct: ColTree) -> TcExpr {
        self.colnames = Some(ct);
        self
    }

    // ------------------------------------------------------------------
    // audit

    /// Count references to `name` in this tree: annotations, column sets,
    /// and node fields. The clone/destroy discipline is violated exactly
    /// when the count diverges between a tree and its clone.
    pub fn count_name_refs(&self, name: &ColName) -> usize {
        let mut count = 0;
        self.walk(&mut |e| {
            if let Some(ct) = &e.colnames {
                count += tree_refs(ct, name);
            }
            count += kind_refs(&e.kind, name);
        });
        count
    }

    /// Every column name a node of this tree names explicitly (annotations
    /// excluded). For a predicate lambda this is its free-column footprint.
    pub fn referenced_columns(&self) -> Vec<ColName> {
        let mut out: Vec<ColName> = Vec::new();
        self.walk(&mut |e| {
            collect_kind_cols(&e.kind, &mut out);
        });
        out
    }

    /// Count uses of a variable (ReadVar occurrences) in this tree.
    pub fn count_var_uses(&self, var: &TcVar) -> usize {
        let mut count = 0;
        self.walk(&mut |e| {
            if let TcKind::ReadVar(v) = &e.kind {
                if v == var {
                    count += 1;
                }
            }
        });
        count
    }

    /// Pre-order walk over every node of the tree.
    pub fn walk(&self, f: &mut dyn FnMut(&TcExpr)) {
        f(self);
        match &self.kind {
            TcKind::Filter { sub, predicate } => {
                sub.walk(f);
                predicate.walk(f);
            }
            TcKind::Project { sub, .. }
            | TcKind::Strip { sub, .. }
            | TcKind::Rename { sub, .. }
            | TcKind::Order { sub, .. }
            | TcKind::Uniq { sub, .. }
            | TcKind::Nest { sub, .. }
            | TcKind::Unnest { sub, .. }
            | TcKind::Distinguish { sub, .. }
            | TcKind::CreatePathElement { sub }
            | TcKind::Uop { sub, .. } => sub.walk(f),
            TcKind::Join {
                left,
                right,
                predicate,
            } => {
                left.walk(f);
                right.walk(f);
                if let Some(p) = predicate {
                    p.walk(f);
                }
            }
            TcKind::Adjoin { left, func, .. } => {
                left.walk(f);
                func.walk(f);
            }
            TcKind::Step { sub, predicate, .. } => {
                sub.walk(f);
                if let Some(p) = predicate {
                    p.walk(f);
                }
            }
            TcKind::Repeat { sub, body, .. } => {
                sub.walk(f);
                body.walk(f);
            }
            TcKind::Scan { predicate, .. } => {
                if let Some(p) = predicate {
                    p.walk(f);
                }
            }
            TcKind::Bop { left, right, .. } => {
                left.walk(f);
                right.walk(f);
            }
            TcKind::Func { args, .. } => {
                for a in args {
                    a.walk(f);
                }
            }
            TcKind::Map { set, result, .. } => {
                set.walk(f);
                result.walk(f);
            }
            TcKind::Let { value, body, .. } => {
                value.walk(f);
                body.walk(f);
            }
            TcKind::Lambda { body, .. } => body.walk(f),
            TcKind::Apply { lambda, arg } => {
                lambda.walk(f);
                arg.walk(f);
            }
            TcKind::Splatter { value, name } => {
                value.walk(f);
                name.walk(f);
            }
            TcKind::Tuple { exprs, .. } => {
                for e in exprs {
                    e.walk(f);
                }
            }
            TcKind::ReadVar(_) | TcKind::ReadGlobal(_) | TcKind::Value(_) => {}
        }
    }

    // ------------------------------------------------------------------
    // dumps

    /// Layout of the tree for dumps; format with a width and render.
    pub fn layout(&self) -> Layout {
        match &self.kind {
            TcKind::Filter { sub, predicate } => node_layout(
                "filter",
                vec![sub.layout(), predicate.layout()],
            ),
            TcKind::Project { sub, cols } => node_layout(
                "project",
                vec![sub.layout(), Layout::text(format!("{:?}", cols))],
            ),
            TcKind::Strip { sub, cols } => node_layout(
                "strip",
                vec![sub.layout(), Layout::text(format!("{:?}", cols))],
            ),
            TcKind::Rename {
                sub,
                oldcol,
                newcol,
            } => node_layout(
                "rename",
                vec![
                    sub.layout(),
                    Layout::text(format!("{} -> {}", oldcol, newcol)),
                ],
            ),
            TcKind::Join {
                left,
                right,
                predicate,
            } => {
                let mut args = vec![left.layout(), right.layout()];
                if let Some(p) = predicate {
                    args.push(p.layout());
                }
                node_layout("join", args)
            }
            TcKind::Order { sub, cols } => node_layout(
                "order",
                vec![sub.layout(), Layout::text(format!("{:?}", cols))],
            ),
            TcKind::Uniq { sub, cols } => node_layout(
                "uniq",
                vec![sub.layout(), Layout::text(format!("{:?}", cols))],
            ),
            TcKind::Nest { sub, cols, newcol } => node_layout(
                "nest",
                vec![
                    sub.layout(),
                    Layout::text(format!("{:?} -> {}", cols, newcol)),
                ],
            ),
            TcKind::Unnest { sub, col } => {
                node_layout("unnest", vec![sub.layout(), Layout::text(col.to_string())])
            }
            TcKind::Distinguish { sub, newcol } => node_layout(
                "distinguish",
                vec![sub.layout(), Layout::text(newcol.to_string())],
            ),
            TcKind::Adjoin { left, func, newcol } => node_layout(
                "adjoin",
                vec![
                    left.layout(),
                    func.layout(),
                    Layout::text(newcol.to_string()),
                ],
            ),
            TcKind::Step {
                sub,
                subcolumn,
                edgename,
                reversed,
                leftobjcolumn,
                edgecolumn,
                rightobjcolumn,
                predicate,
            } => {
                let edge = match edgename {
                    Some(e) => e.to_string(),
                    None => "%".to_owned(),
                };
                let arrow = if *reversed { "<-" } else { "->" };
                let mut args = vec![
                    sub.layout(),
                    Layout::text(format!(
                        "{} {} {} ({}, {}, {})",
                        subcolumn, arrow, edge, leftobjcolumn, edgecolumn, rightobjcolumn
                    )),
                ];
                if let Some(p) = predicate {
                    args.push(p.layout());
                }
                node_layout("step", args)
            }
            TcKind::Repeat {
                sub,
                subendcolumn,
                loopvar,
                body,
                repeatpathcolumn,
                repeatendcolumn,
                ..
            } => node_layout(
                "repeat",
                vec![
                    sub.layout(),
                    Layout::text(format!(
                        "{} as {:?} yielding ({}, {})",
                        subendcolumn, loopvar, repeatpathcolumn, repeatendcolumn
                    )),
                    body.layout(),
                ],
            ),
            TcKind::Scan {
                leftobjcolumn,
                edgecolumn,
                rightobjcolumn,
                predicate,
            } => {
                let mut args = vec![Layout::text(format!(
                    "({}, {}, {})",
                    leftobjcolumn, edgecolumn, rightobjcolumn
                ))];
                if let Some(p) = predicate {
                    args.push(p.layout());
                }
                node_layout("scan", args)
            }
            TcKind::Bop { left, op, right } => Layout::wrap(
                "(",
                Layout::triple(left.layout(), Layout::text(op.name()), right.layout()),
                ")",
            ),
            TcKind::Uop { op, sub } => {
                Layout::wrap("(", Layout::pair(Layout::text(op.name()), sub.layout()), ")")
            }
            TcKind::Func { op, args } => {
                let mut items = vec![Layout::text(op.name())];
                items.extend(args.iter().map(|a| a.layout()));
                Layout::wrap("(", Layout::Sequence(items), ")")
            }
            TcKind::Map { var, set, result } => node_layout(
                "map",
                vec![
                    Layout::text(format!("{:?} in", var)),
                    set.layout(),
                    result.layout(),
                ],
            ),
            TcKind::Let { var, value, body } => node_layout(
                "let",
                vec![
                    Layout::text(format!("{:?} =", var)),
                    value.layout(),
                    body.layout(),
                ],
            ),
            TcKind::Lambda { var, body } => node_layout(
                "lambda",
                vec![Layout::text(format!("{:?}:", var)), body.layout()],
            ),
            TcKind::Apply { lambda, arg } => {
                node_layout("apply", vec![lambda.layout(), arg.layout()])
            }
            TcKind::ReadVar(var) => Layout::text(format!("{:?}", var)),
            TcKind::ReadGlobal(g) => Layout::text(format!("read {}", g.name())),
            TcKind::CreatePathElement { sub } => {
                node_layout("mkpathelement", vec![sub.layout()])
            }
            TcKind::Splatter { value, name } => {
                node_layout("splatter", vec![value.layout(), name.layout()])
            }
            TcKind::Tuple { exprs, columns } => {
                let mut items: Vec<Layout> = exprs.iter().map(|e| e.layout()).collect();
                items.push(Layout::text(format!("{:?}", columns)));
                node_layout("tuple", items)
            }
            TcKind::Value(v) => Layout::from_value(v),
        }
    }
}

fn node_layout(name: &str, args: Vec<Layout>) -> Layout {
    Layout::indent(
        Layout::text(format!("{} (", name)),
        Layout::leftalign(args),
        Some(Layout::text(")")),
    )
}

fn tree_refs(ct: &ColTree, name: &ColName) -> usize {
    let mut count = 0;
    if ct.wholecolumn() == Some(name) {
        count += 1;
    }
    if ct.istuple() {
        for i in 0..ct.num() {
            count += tree_refs(ct.get(i), name);
        }
    }
    count
}

fn set_refs(cs: &ColSet, name: &ColName) -> usize {
    cs.iter().filter(|c| *c == name).count()
}

fn col_ref(c: &ColName, name: &ColName) -> usize {
    usize::from(c == name)
}

fn collect_kind_cols(kind: &TcKind, out: &mut Vec<ColName>) {
    let mut push = |c: &ColName| {
        if !out.contains(c) {
            out.push(c.clone());
        }
    };
    match kind {
        TcKind::Project { cols, .. }
        | TcKind::Strip { cols, .. }
        | TcKind::Order { cols, .. }
        | TcKind::Uniq { cols, .. } => cols.iter().for_each(|c| push(c)),
        TcKind::Rename { oldcol, newcol, .. } => {
            push(oldcol);
            push(newcol);
        }
        TcKind::Nest { cols, newcol, .. } => {
            cols.iter().for_each(&mut push);
            push(newcol);
        }
        TcKind::Unnest { col, .. } => push(col),
        TcKind::Distinguish { newcol, .. } | TcKind::Adjoin { newcol, .. } => push(newcol),
        TcKind::Step {
            subcolumn,
            leftobjcolumn,
            edgecolumn,
            rightobjcolumn,
            ..
        } => {
            push(subcolumn);
            push(leftobjcolumn);
            push(edgecolumn);
            push(rightobjcolumn);
        }
        TcKind::Repeat {
            subendcolumn,
            bodystartcolumn,
            bodypathcolumn,
            bodyendcolumn,
            repeatpathcolumn,
            repeatendcolumn,
            ..
        } => {
            push(subendcolumn);
            push(bodystartcolumn);
            push(bodypathcolumn);
            push(bodyendcolumn);
            push(repeatpathcolumn);
            push(repeatendcolumn);
        }
        TcKind::Scan {
            leftobjcolumn,
            edgecolumn,
            rightobjcolumn,
            ..
        } => {
            push(leftobjcolumn);
            push(edgecolumn);
            push(rightobjcolumn);
        }
        TcKind::Tuple { columns, .. } => columns.iter().for_each(|c| push(c)),
        _ => {}
    }
}

fn kind_refs(kind: &TcKind, name: &ColName) -> usize {
    match kind {
        TcKind::Project { cols, .. }
        | TcKind::Strip { cols, .. }
        | TcKind::Order { cols, .. }
        | TcKind::Uniq { cols, .. } => set_refs(cols, name),
        TcKind::Rename { oldcol, newcol, .. } => {
            col_ref(oldcol, name) + col_ref(newcol, name)
        }
        TcKind::Nest { cols, newcol, .. } => set_refs(cols, name) + col_ref(newcol, name),
        TcKind::Unnest { col, .. } => col_ref(col, name),
        TcKind::Distinguish { newcol, .. } | TcKind::Adjoin { newcol, .. } => {
            col_ref(newcol, name)
        }
        TcKind::Step {
            subcolumn,
            leftobjcolumn,
            edgecolumn,
            rightobjcolumn,
            ..
        } => {
            col_ref(subcolumn, name)
                + col_ref(leftobjcolumn, name)
                + col_ref(edgecolumn, name)
                + col_ref(rightobjcolumn, name)
        }
        TcKind::Repeat {
            subendcolumn,
            bodystartcolumn,
            bodypathcolumn,
            bodyendcolumn,
            repeatpathcolumn,
            repeatendcolumn,
            ..
        } => {
            col_ref(subendcolumn, name)
                + col_ref(bodystartcolumn, name)
                + col_ref(bodypathcolumn, name)
                + col_ref(bodyendcolumn, name)
                + col_ref(repeatpathcolumn, name)
                + col_ref(repeatendcolumn, name)
        }
        TcKind::Scan {
            leftobjcolumn,
            edgecolumn,
            rightobjcolumn,
            ..
        } => {
            col_ref(leftobjcolumn, name)
                + col_ref(edgecolumn, name)
                + col_ref(rightobjcolumn, name)
        }
        TcKind::Tuple { columns, .. } => set_refs(columns, name),
        _ => 0,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::NamePool;

    #[test]
    fn clone_shares_handles_and_destroys_clean() {
        let names = NamePool::new();
        let vars = VarPool::new();

        let a = names.named("a");
        let b = names.named("b");
        let var = vars.fresh();

        let tree = TcExpr::project(
            TcExpr::rename(
                TcExpr::readvar(var.clone()),
                a.clone(),
                b.clone(),
            ),
            ColSet::singleton(b.clone()),
        );

        let cloned = tree.clone();
        assert_eq!(tree.count_name_refs(&b), cloned.count_name_refs(&b));
        assert_eq!(tree.count_name_refs(&a), 1);
        assert_eq!(cloned.count_name_refs(&a), 1);

        // dropping in either order leaves only our local handles
        drop(tree);
        drop(cloned);
        drop(a);
        drop(b);
        drop(var);
        assert_eq!(names.live(), 0);
        assert_eq!(vars.live(), 0);
    }

    #[test]
    fn clone_preserves_annotations() {
        let names = NamePool::new();
        let tm = crate::types::TypeManager::new();
        let a = names.named("a");

        let tree = TcExpr::value(Value::Int(3))
            .with_type(tm.int())
            .with_cols(ColTree::scalar(Some(a.clone())));
        let cloned = tree.clone();
        assert_eq!(cloned.datatype, Some(tm.int()));
        assert!(cloned
            .colnames
            .as_ref()
            .unwrap()
            .eq_tree(tree.colnames.as_ref().unwrap()));
    }

    #[test]
    fn count_name_refs_sees_all_positions() {
        let names = NamePool::new();
        let a = names.named("a");
        let b = names.named("b");
        let c = names.named("c");

        let tree = TcExpr::step(
            TcExpr::scan(a.clone(), b.clone(), c.clone(), None),
            c.clone(),
            Some(Value::string("input")),
            false,
            names.named("l"),
            names.named("e"),
            names.named("r"),
            None,
        );
        assert_eq!(tree.count_name_refs(&c), 2);
        assert_eq!(tree.count_name_refs(&a), 1);
    }

    #[test]
    fn layout_renders_within_width() {
        let tree = TcExpr::filter(
            TcExpr::readglobal(TcGlobal::new("Provenance")),
            TcExpr::lambda(
                VarPool::new().fresh(),
                TcExpr::value(Value::Bool(true)),
            ),
        );
        let s = tree.layout().format(40).render();
        assert!(s.contains("filter"));
        assert!(s.contains("Provenance"));
        assert!(s.lines().all(|l| l.chars().count() <= 40));
    }

    #[test]
    fn var_annotations_are_shared_through_clones() {
        let vars = VarPool::new();
        let tm = crate::types::TypeManager::new();
        let v = vars.fresh();
        let v2 = v.clone();
        v.set_datatype(tm.int());
        assert_eq!(v2.datatype(), Some(tm.int()));
        assert_eq!(v, v2);
        assert_ne!(v, vars.fresh());
    }
}

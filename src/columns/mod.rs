//! # Column Names and Name Trees
//!
//! Tuples flowing through the tuple calculus are positional; this module
//! supplies the naming layer over them. A [`ColName`] is a shared handle
//! with a process-unique id — two names are the same column iff the handles
//! alias. A [`ColSet`] is an ordered pick of names, optionally flagged
//! "to-complement" for late resolution against an ambient tree. A
//! [`ColTree`] mirrors a value's tuple shape and carries the names for the
//! whole column and each slot.
//!
//! The tree algebra (project/strip/rename/join/nest/unnest/adjoin) operates
//! purely on structure and underlies the corresponding relational operators.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use crate::contract::pql_contract;

// ============================================================================
// Names
// ============================================================================

struct ColInner {
    id: u32,
    name: Option<String>,
    live: Rc<Cell<isize>>,
}

impl Drop for ColInner {
    fn drop(&mut self) {
        self.live.set(self.live.get() - 1);
    }
}

/// Shared column-name handle. Cloning bumps the reference; the underlying
/// record is freed when the last handle drops, which the owning pool's live
/// counter observes.
#[derive(Clone)]
pub struct ColName(Rc<ColInner>);

impl PartialEq for ColName {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for ColName {}

impl ColName {
    pub fn id(&self) -> u32 {
        self.0.id
    }

    pub fn human_name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }
}

impl fmt::Display for ColName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0.name {
            Some(n) => f.write_str(n),
            None => write!(f, ".C{}", self.0.id),
        }
    }
}

impl fmt::Debug for ColName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ColName({})", self)
    }
}

/// Allocator for column names. One per engine context; `live()` reports how
/// many name records are still reachable, which must drop to zero when all
/// values and trees of the context are gone.
pub struct NamePool {
    next_id: Cell<u32>,
    live: Rc<Cell<isize>>,
}

impl NamePool {
    pub fn new() -> NamePool {
        NamePool {
            next_id: Cell::new(0),
            live: Rc::new(Cell::new(0)),
        }
    }

    /// A fresh user-named column.
    pub fn named(&self, name: &str) -> ColName {
        self.mk(Some(name.to_owned()))
    }

    /// A fresh anonymous column; it renders as `.C<id>`.
    pub fn fresh(&self) -> ColName {
        self.mk(None)
    }

    fn mk(&self, name: Option<String>) -> ColName {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.live.set(self.live.get() + 1);
        ColName(Rc::new(ColInner {
            id,
            name,
            live: Rc::clone(&self.live),
        }))
    }

    /// Outstanding name records.
    pub fn live(&self) -> isize {
        self.live.get()
    }
}

impl Default for NamePool {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Column sets
// ============================================================================

/// An ordered collection of column names. The `tocomplement` flag marks a
/// set written as "everything but these"; it is resolved against the
/// ambient column tree before use.
#[derive(Clone)]
pub struct ColSet {
    cols: Vec<ColName>,
    tocomplement: bool,
}

impl ColSet {
    pub fn empty() -> ColSet {
        ColSet {
            cols: Vec::new(),
            tocomplement: false,
        }
    }

    pub fn singleton(col: ColName) -> ColSet {
        ColSet {
            cols: vec![col],
            tocomplement: false,
        }
    }

    pub fn pair(c1: ColName, c2: ColName) -> ColSet {
        ColSet {
            cols: vec![c1, c2],
            tocomplement: false,
        }
    }

    pub fn triple(c1: ColName, c2: ColName, c3: ColName) -> ColSet {
        ColSet {
            cols: vec![c1, c2, c3],
            tocomplement: false,
        }
    }

    pub fn from_vec(cols: Vec<ColName>) -> ColSet {
        ColSet {
            cols,
            tocomplement: false,
        }
    }

    pub fn num(&self) -> usize {
        self.cols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cols.is_empty()
    }

    pub fn get(&self, ix: usize) -> &ColName {
        &self.cols[ix]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColName> {
        self.cols.iter()
    }

    pub fn add(&mut self, col: ColName) {
        self.cols.push(col);
    }

    pub fn contains(&self, col: &ColName) -> bool {
        self.cols.iter().any(|c| c == col)
    }

    pub fn find(&self, col: &ColName) -> Option<usize> {
        self.cols.iter().position(|c| c == col)
    }

    /// Remove the first occurrence; true if it was present.
    pub fn remove(&mut self, col: &ColName) -> bool {
        match self.find(col) {
            Some(ix) => {
                self.cols.remove(ix);
                true
            }
            None => false,
        }
    }

    pub fn remove_by_index(&mut self, ix: usize) {
        self.cols.remove(ix);
    }

    pub fn replace(&mut self, old: &ColName, new: ColName) -> bool {
        match self.find(old) {
            Some(ix) => {
                self.cols[ix] = new;
                true
            }
            None => false,
        }
    }

    /// Move every column of `other` onto the end of this set.
    pub fn moveappend(&mut self, other: &mut ColSet) {
        self.cols.append(&mut other.cols);
    }

    pub fn eq_set(&self, other: &ColSet) -> bool {
        self.cols == other.cols
    }

    pub fn mark_tocomplement(&mut self) {
        self.tocomplement = true;
    }

    pub fn is_tocomplement(&self) -> bool {
        self.tocomplement
    }

    /// If flagged, replace the listed columns with the ambient tree's
    /// top-level columns that are *not* listed, preserving tree order, and
    /// clear the flag.
    pub fn resolve_tocomplement(&mut self, context: &ColTree) {
        if !self.tocomplement {
            return;
        }
        self.tocomplement = false;
        let mut resolved = context.toplevel_columns();
        resolved.retain(|c| !self.contains(c));
        self.cols = resolved;
    }
}

impl fmt::Debug for ColSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.cols.iter().map(|c| c.to_string()).collect();
        if self.tocomplement {
            write!(f, "~{{{}}}", names.join(", "))
        } else {
            write!(f, "{{{}}}", names.join(", "))
        }
    }
}

// ============================================================================
// Column trees
// ============================================================================

/// The name tree attached to a value or TC expression. Mirrors the arity
/// structure: a scalar column, or a tuple of subtrees. A tuple with no
/// subtrees is unit.
#[derive(Clone)]
pub enum ColTree {
    Scalar {
        whole: Option<ColName>,
    },
    Tuple {
        whole: Option<ColName>,
        subs: Vec<ColTree>,
    },
}

impl ColTree {
    // ------------------------------------------------------------------
    // construction

    pub fn scalar(whole: Option<ColName>) -> ColTree {
        ColTree::Scalar { whole }
    }

    pub fn scalar_fresh(pool: &NamePool) -> ColTree {
        ColTree::Scalar {
            whole: Some(pool.fresh()),
        }
    }

    pub fn unit() -> ColTree {
        ColTree::Tuple {
            whole: None,
            subs: Vec::new(),
        }
    }

    pub fn tuple(whole: Option<ColName>, subs: Vec<ColTree>) -> ColTree {
        ColTree::Tuple { whole, subs }
    }

    /// A two-column tuple of scalars.
    pub fn pair_of(c1: ColName, c2: ColName) -> ColTree {
        ColTree::Tuple {
            whole: None,
            subs: vec![ColTree::scalar(Some(c1)), ColTree::scalar(Some(c2))],
        }
    }

    pub fn triple_of(c1: ColName, c2: ColName, c3: ColName) -> ColTree {
        ColTree::Tuple {
            whole: None,
            subs: vec![
                ColTree::scalar(Some(c1)),
                ColTree::scalar(Some(c2)),
                ColTree::scalar(Some(c3)),
            ],
        }
    }

    // ------------------------------------------------------------------
    // inspection

    pub fn istuple(&self) -> bool {
        matches!(self, ColTree::Tuple { .. })
    }

    pub fn wholecolumn(&self) -> Option<&ColName> {
        match self {
            ColTree::Scalar { whole } | ColTree::Tuple { whole, .. } => whole.as_ref(),
        }
    }

    pub fn set_wholecolumn(&mut self, col: Option<ColName>) {
        match self {
            ColTree::Scalar { whole } | ColTree::Tuple { whole, .. } => *whole = col,
        }
    }

    /// Number of immediate subtrees; a scalar has none.
    pub fn num(&self) -> usize {
        match self {
            ColTree::Scalar { .. } => 0,
            ColTree::Tuple { subs, .. } => subs.len(),
        }
    }

    /// Arity of the matching tuple value: 1 for a scalar (a monople).
    pub fn arity(&self) -> usize {
        match self {
            ColTree::Scalar { .. } => 1,
            ColTree::Tuple { subs, .. } => subs.len(),
        }
    }

    pub fn get(&self, ix: usize) -> &ColTree {
        match self {
            ColTree::Tuple { subs, .. } => {
                pql_contract!(ix < subs.len(), "coltree subtree {} out of range", ix);
                &subs[ix]
            }
            ColTree::Scalar { .. } => {
                crate::contract::contract_violation("coltree get on a scalar")
            }
        }
    }

    /// Slot index of `col`, for indexing into the matching tuple value.
    /// A scalar tree matches at slot 0.
    pub fn find(&self, col: &ColName) -> Option<usize> {
        match self {
            ColTree::Scalar { whole } => {
                if whole.as_ref() == Some(col) {
                    Some(0)
                } else {
                    None
                }
            }
            ColTree::Tuple { subs, .. } => subs
                .iter()
                .position(|s| s.wholecolumn() == Some(col)),
        }
    }

    /// Is `col` the whole-column name or an immediate subtree name?
    pub fn contains_toplevel(&self, col: &ColName) -> bool {
        if self.wholecolumn() == Some(col) {
            return true;
        }
        match self {
            ColTree::Scalar { .. } => false,
            ColTree::Tuple { subs, .. } => {
                subs.iter().any(|s| s.wholecolumn() == Some(col))
            }
        }
    }

    /// The immediate subtree names (or the whole name, for a scalar), in
    /// tree order.
    pub fn toplevel_columns(&self) -> Vec<ColName> {
        match self {
            ColTree::Scalar { whole } => whole.iter().cloned().collect(),
            ColTree::Tuple { subs, .. } => subs
                .iter()
                .filter_map(|s| s.wholecolumn().cloned())
                .collect(),
        }
    }

    /// Structural equality, including whole-column names.
    pub fn eq_tree(&self, other: &ColTree) -> bool {
        if self.wholecolumn() != other.wholecolumn() {
            return false;
        }
        match (self, other) {
            (ColTree::Scalar { .. }, ColTree::Scalar { .. }) => true,
            (ColTree::Tuple { subs: a, .. }, ColTree::Tuple { subs: b, .. }) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.eq_tree(y))
            }
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // algebra

    /// Keep only the columns in `keep`, in `keep`'s order. If exactly one
    /// subtree remains and there is no whole-column name, that subtree's
    /// name is promoted to the root and the result is a scalar.
    pub fn project(&self, keep: &ColSet) -> ColTree {
        match self {
            ColTree::Scalar { whole } => {
                if whole.as_ref().map_or(false, |w| keep.contains(w)) {
                    ColTree::Scalar {
                        whole: whole.clone(),
                    }
                } else {
                    // nothing matched; the result is unit
                    ColTree::Tuple {
                        whole: whole.clone(),
                        subs: Vec::new(),
                    }
                }
            }
            ColTree::Tuple { whole, subs } => {
                let mut out: Vec<ColTree> = Vec::new();
                for col in keep.iter() {
                    if let Some(sub) = subs.iter().find(|s| s.wholecolumn() == Some(col)) {
                        out.push(sub.clone());
                    }
                }
                promote_monople(whole.clone(), out)
            }
        }
    }

    /// The dual of `project`: drop the listed columns. The same monople
    /// promotion applies; stripping a matching scalar yields unit.
    pub fn strip(&self, remove: &ColSet) -> ColTree {
        match self {
            ColTree::Scalar { whole } => {
                if whole.as_ref().map_or(false, |w| remove.contains(w)) {
                    ColTree::Tuple {
                        whole: whole.clone(),
                        subs: Vec::new(),
                    }
                } else {
                    ColTree::Scalar {
                        whole: whole.clone(),
                    }
                }
            }
            ColTree::Tuple { whole, subs } => {
                let out: Vec<ColTree> = subs
                    .iter()
                    .filter(|s| {
                        !s.wholecolumn().map_or(false, |w| remove.contains(w))
                    })
                    .cloned()
                    .collect();
                promote_monople(whole.clone(), out)
            }
        }
    }

    /// Substitute `new` for `old` recursively.
    pub fn rename(&self, old: &ColName, new: &ColName) -> ColTree {
        let whole = match self.wholecolumn() {
            Some(w) if w == old => Some(new.clone()),
            other => other.cloned(),
        };
        match self {
            ColTree::Scalar { .. } => ColTree::Scalar { whole },
            ColTree::Tuple { subs, .. } => ColTree::Tuple {
                whole,
                subs: subs.iter().map(|s| s.rename(old, new)).collect(),
            },
        }
    }

    /// Concatenate two trees into one tuple with no whole-column name.
    /// A scalar side contributes itself as one subtree; a unit side
    /// contributes nothing.
    pub fn join(left: &ColTree, right: &ColTree) -> ColTree {
        let mut subs = Vec::new();
        for side in [left, right] {
            match side {
                ColTree::Scalar { whole } => subs.push(ColTree::Scalar {
                    whole: whole.clone(),
                }),
                ColTree::Tuple { subs: s, .. } => subs.extend(s.iter().cloned()),
            }
        }
        ColTree::Tuple { whole: None, subs }
    }

    /// Gather `cols` into one subtree named `newname`, appended after the
    /// remaining columns.
    pub fn nest(&self, cols: &ColSet, newname: Option<ColName>) -> ColTree {
        let kept = self.strip(cols);
        let mut nested = self.project(cols);
        nested.set_wholecolumn(newname);
        match kept {
            ColTree::Tuple { whole, mut subs } => {
                subs.push(nested);
                ColTree::Tuple { whole, subs }
            }
            scalar => ColTree::Tuple {
                whole: None,
                subs: vec![scalar, nested],
            },
        }
    }

    /// Splice the contents of column `col` back in at top level, keeping
    /// this tree's whole-column name.
    pub fn unnest(&self, col: &ColName) -> ColTree {
        let cs = ColSet::singleton(col.clone());
        let kept = self.strip(&cs);
        let mut expanded = self.project(&cs);
        expanded.set_wholecolumn(None);
        let mut ret = ColTree::join(&kept, &expanded);
        ret.set_wholecolumn(self.wholecolumn().cloned());
        ret
    }

    /// Append one new scalar column.
    pub fn adjoin(&self, newcol: Option<ColName>) -> ColTree {
        self.adjoin_tree(ColTree::Scalar { whole: newcol })
    }

    /// Append `newstuff` as a final subtree, promoting a scalar to a pair.
    pub fn adjoin_tree(&self, newstuff: ColTree) -> ColTree {
        match self.clone() {
            ColTree::Tuple { whole, mut subs } => {
                subs.push(newstuff);
                ColTree::Tuple { whole, subs }
            }
            scalar => ColTree::Tuple {
                whole: None,
                subs: vec![scalar, newstuff],
            },
        }
    }
}

/// Monople promotion shared by project and strip: a single surviving
/// subtree with no root name becomes the root, as a scalar.
fn promote_monople(whole: Option<ColName>, subs: Vec<ColTree>) -> ColTree {
    if subs.len() == 1 && whole.is_none() {
        ColTree::Scalar {
            whole: subs[0].wholecolumn().cloned(),
        }
    } else {
        ColTree::Tuple { whole, subs }
    }
}

impl fmt::Debug for ColTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColTree::Scalar { whole } => match whole {
                Some(w) => write!(f, "{}", w),
                None => f.write_str("_"),
            },
            ColTree::Tuple { whole, subs } => {
                if let Some(w) = whole {
                    write!(f, "{}:", w)?;
                }
                f.write_str("(")?;
                for (i, s) in subs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{:?}", s)?;
                }
                f.write_str(")")
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

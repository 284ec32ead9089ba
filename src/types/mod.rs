//! # Datatype Lattice
//!
//! Interned runtime types for query values and tuple-calculus nodes.
//! Types are hash-consed by the [`TypeManager`]; a [`Datatype`] is a cheap
//! handle and two handles denote the same type iff they alias.
//!
//! The lattice has abstract interior points (bottom, dbedge, number, atom,
//! dbobj, top) over the concrete leaves, plus covariant compounds:
//!
//! ```text
//!                    top
//!                     |
//!                   dbobj
//!                  /     \
//!               atom    struct
//!              /  |  \
//!        number string bool        string, int <= dbedge
//!         /  \
//!       int  double
//!         \   |   ...
//!          bottom
//! ```
//!
//! Tuples are nested pairs over the left spine with `unit` as the zero-tuple,
//! so arity is a derived property and tuples sharing a prefix share structure.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

// ============================================================================
// Representation
// ============================================================================

/// The shape of a type. Leaves are interned once; compounds are hash-consed
/// on their member handles.
#[derive(Debug)]
pub enum TypeKind {
    /// Absorbing lower bound; also the member type of empty collections.
    Bottom,
    /// The zero-tuple.
    Unit,
    Bool,
    Int,
    Double,
    String,
    /// A database object reference (dbnum, oid, subid).
    Struct,
    /// A path step (leftobj, edgename, rightobj).
    PathElement,
    /// Opaque unique marker inserted by the optimizer.
    Distinguisher,
    /// Abstract: something usable as an edge label (string or int).
    DbEdge,
    /// Abstract: int or double.
    Number,
    /// Abstract: number, string, or bool.
    Atom,
    /// Abstract: atom or struct.
    DbObj,
    /// Absorbing upper bound.
    Top,
    Set(Datatype),
    Sequence(Datatype),
    /// Tuple cell: left spine holds the leading columns.
    Pair(Datatype, Datatype),
    Lambda(Datatype, Datatype),
}

#[derive(Debug)]
struct TypeNode {
    kind: TypeKind,
    name: String,
}

/// Interned type handle. Compared and hashed by identity.
#[derive(Debug, Clone)]
pub struct Datatype(Rc<TypeNode>);

impl PartialEq for Datatype {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for Datatype {}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.name)
    }
}

impl Datatype {
    fn kind(&self) -> &TypeKind {
        &self.0.kind
    }

    fn key(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// Canonical rendered name, e.g. `set(int)` or `(int, string)`.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    // ------------------------------------------------------------------
    // exact tests

    pub fn is_bottom(&self) -> bool {
        matches!(self.kind(), TypeKind::Bottom)
    }
    pub fn is_unit(&self) -> bool {
        matches!(self.kind(), TypeKind::Unit)
    }
    pub fn is_bool(&self) -> bool {
        matches!(self.kind(), TypeKind::Bool)
    }
    pub fn is_int(&self) -> bool {
        matches!(self.kind(), TypeKind::Int)
    }
    pub fn is_double(&self) -> bool {
        matches!(self.kind(), TypeKind::Double)
    }
    pub fn is_string(&self) -> bool {
        matches!(self.kind(), TypeKind::String)
    }
    pub fn is_struct(&self) -> bool {
        matches!(self.kind(), TypeKind::Struct)
    }
    pub fn is_pathelement(&self) -> bool {
        matches!(self.kind(), TypeKind::PathElement)
    }
    pub fn is_distinguisher(&self) -> bool {
        matches!(self.kind(), TypeKind::Distinguisher)
    }
    pub fn is_abs_dbedge(&self) -> bool {
        matches!(self.kind(), TypeKind::DbEdge)
    }
    pub fn is_abs_number(&self) -> bool {
        matches!(self.kind(), TypeKind::Number)
    }
    pub fn is_abs_atom(&self) -> bool {
        matches!(self.kind(), TypeKind::Atom)
    }
    pub fn is_abs_dbobj(&self) -> bool {
        matches!(self.kind(), TypeKind::DbObj)
    }
    pub fn is_top(&self) -> bool {
        matches!(self.kind(), TypeKind::Top)
    }
    pub fn is_set(&self) -> bool {
        matches!(self.kind(), TypeKind::Set(_))
    }
    pub fn is_sequence(&self) -> bool {
        matches!(self.kind(), TypeKind::Sequence(_))
    }
    pub fn is_lambda(&self) -> bool {
        matches!(self.kind(), TypeKind::Lambda(..))
    }

    /// True for unit and for pair cells. A bare leaf is a monople, not a
    /// tuple, even though it answers arity 1.
    pub fn is_tuple(&self) -> bool {
        matches!(self.kind(), TypeKind::Unit | TypeKind::Pair(..))
    }

    // ------------------------------------------------------------------
    // class tests

    /// int, double, or the abstract number.
    pub fn is_any_number(&self) -> bool {
        matches!(self.kind(), TypeKind::Int | TypeKind::Double | TypeKind::Number)
    }

    /// Anything below (or equal to) the abstract atom.
    pub fn is_any_atom(&self) -> bool {
        self.is_any_number()
            || matches!(self.kind(), TypeKind::String | TypeKind::Bool | TypeKind::Atom)
    }

    /// Anything usable as an edge label: string, int, or the abstract dbedge.
    pub fn is_any_dbedge(&self) -> bool {
        matches!(self.kind(), TypeKind::String | TypeKind::Int | TypeKind::DbEdge)
    }

    /// Anything below (or equal to) the abstract dbobj.
    pub fn is_any_dbobj(&self) -> bool {
        self.is_any_atom() || matches!(self.kind(), TypeKind::Struct | TypeKind::DbObj)
    }

    // ------------------------------------------------------------------
    // members

    pub fn set_member(&self) -> Datatype {
        match self.kind() {
            TypeKind::Set(m) => m.clone(),
            _ => crate::contract::contract_violation(&format!(
                "set_member on non-set type {}",
                self
            )),
        }
    }

    pub fn sequence_member(&self) -> Datatype {
        match self.kind() {
            TypeKind::Sequence(m) => m.clone(),
            _ => crate::contract::contract_violation(&format!(
                "sequence_member on non-sequence type {}",
                self
            )),
        }
    }

    /// Member type of either collection kind.
    pub fn coll_member(&self) -> Datatype {
        match self.kind() {
            TypeKind::Set(m) | TypeKind::Sequence(m) => m.clone(),
            _ => crate::contract::contract_violation(&format!(
                "coll_member on non-collection type {}",
                self
            )),
        }
    }

    pub fn lambda_argument(&self) -> Datatype {
        match self.kind() {
            TypeKind::Lambda(a, _) => a.clone(),
            _ => crate::contract::contract_violation(&format!(
                "lambda_argument on non-lambda type {}",
                self
            )),
        }
    }

    pub fn lambda_result(&self) -> Datatype {
        match self.kind() {
            TypeKind::Lambda(_, r) => r.clone(),
            _ => crate::contract::contract_violation(&format!(
                "lambda_result on non-lambda type {}",
                self
            )),
        }
    }

    // ------------------------------------------------------------------
    // tuple inspection
    //
    // All types function as tuples; non-tuples are tuples of arity 1. This
    // keeps the callers free of special cases.

    /// Number of tuple slots: 0 for unit, 1 for a monople, left-spine depth
    /// for a pair chain.
    pub fn arity(&self) -> u32 {
        match self.kind() {
            TypeKind::Unit => 0,
            TypeKind::Pair(left, _) => {
                // A unit in the left slot is a real member, not the spine
                // terminator; count it as one.
                if left.is_unit() {
                    2
                } else {
                    left.arity() + 1
                }
            }
            _ => 1,
        }
    }

    /// Arity, looking through one set/sequence wrapper.
    pub fn nonset_arity(&self) -> u32 {
        match self.kind() {
            TypeKind::Set(m) | TypeKind::Sequence(m) => m.arity(),
            _ => self.arity(),
        }
    }

    /// The type of slot `ix`. Getting index 0 from a monople returns the
    /// monople itself.
    pub fn getnth(&self, ix: u32) -> Datatype {
        assert!(!self.is_unit(), "getnth on unit");
        let mut arity = self.arity();
        assert!(ix < arity, "getnth index {} out of range for {}", ix, self);
        if arity == 1 {
            return self.clone();
        }
        let mut t = self.clone();
        while arity >= 2 {
            let (left, right) = match t.kind() {
                TypeKind::Pair(l, r) => (l.clone(), r.clone()),
                _ => unreachable!("arity >= 2 implies a pair"),
            };
            if ix == arity - 1 {
                return right;
            }
            t = left;
            arity -= 1;
        }
        t
    }
}

// ============================================================================
// Manager
// ============================================================================

/// Hash-consing pool for types. One per engine context; handles from
/// different managers never compare equal.
pub struct TypeManager {
    bottom: Datatype,
    unit: Datatype,
    bool_t: Datatype,
    int_t: Datatype,
    double_t: Datatype,
    string_t: Datatype,
    struct_t: Datatype,
    pathelement_t: Datatype,
    distinguisher_t: Datatype,
    dbedge_t: Datatype,
    number_t: Datatype,
    atom_t: Datatype,
    dbobj_t: Datatype,
    top: Datatype,
    sets: RefCell<HashMap<usize, Datatype>>,
    sequences: RefCell<HashMap<usize, Datatype>>,
    pairs: RefCell<HashMap<(usize, usize), Datatype>>,
    lambdas: RefCell<HashMap<(usize, usize), Datatype>>,
}

fn mkleaf(kind: TypeKind, name: &str) -> Datatype {
    Datatype(Rc::new(TypeNode {
        kind,
        name: name.to_owned(),
    }))
}

impl TypeManager {
    pub fn new() -> Self {
        TypeManager {
            bottom: mkleaf(TypeKind::Bottom, "bottom"),
            unit: mkleaf(TypeKind::Unit, "unit"),
            bool_t: mkleaf(TypeKind::Bool, "bool"),
            int_t: mkleaf(TypeKind::Int, "int"),
            double_t: mkleaf(TypeKind::Double, "double"),
            string_t: mkleaf(TypeKind::String, "string"),
            struct_t: mkleaf(TypeKind::Struct, "struct"),
            pathelement_t: mkleaf(TypeKind::PathElement, "pathelement"),
            distinguisher_t: mkleaf(TypeKind::Distinguisher, "distinguisher"),
            dbedge_t: mkleaf(TypeKind::DbEdge, "dbedge"),
            number_t: mkleaf(TypeKind::Number, "number"),
            atom_t: mkleaf(TypeKind::Atom, "atom"),
            dbobj_t: mkleaf(TypeKind::DbObj, "dbobj"),
            top: mkleaf(TypeKind::Top, "top"),
            sets: RefCell::new(HashMap::new()),
            sequences: RefCell::new(HashMap::new()),
            pairs: RefCell::new(HashMap::new()),
            lambdas: RefCell::new(HashMap::new()),
        }
    }

    // ------------------------------------------------------------------
    // leaves

    pub fn bottom(&self) -> Datatype {
        self.bottom.clone()
    }
    pub fn unit(&self) -> Datatype {
        self.unit.clone()
    }
    pub fn boolean(&self) -> Datatype {
        self.bool_t.clone()
    }
    pub fn int(&self) -> Datatype {
        self.int_t.clone()
    }
    pub fn double(&self) -> Datatype {
        self.double_t.clone()
    }
    pub fn string(&self) -> Datatype {
        self.string_t.clone()
    }
    pub fn struct_(&self) -> Datatype {
        self.struct_t.clone()
    }
    pub fn pathelement(&self) -> Datatype {
        self.pathelement_t.clone()
    }
    pub fn distinguisher(&self) -> Datatype {
        self.distinguisher_t.clone()
    }
    pub fn dbedge(&self) -> Datatype {
        self.dbedge_t.clone()
    }
    pub fn number(&self) -> Datatype {
        self.number_t.clone()
    }
    pub fn atom(&self) -> Datatype {
        self.atom_t.clone()
    }
    pub fn dbobj(&self) -> Datatype {
        self.dbobj_t.clone()
    }
    pub fn top(&self) -> Datatype {
        self.top.clone()
    }

    // ------------------------------------------------------------------
    // compounds

    pub fn set(&self, member: Datatype) -> Datatype {
        if let Some(t) = self.sets.borrow().get(&member.key()) {
            return t.clone();
        }
        let name = format!("set({})", member.name());
        let t = Datatype(Rc::new(TypeNode {
            kind: TypeKind::Set(member.clone()),
            name,
        }));
        self.sets.borrow_mut().insert(member.key(), t.clone());
        t
    }

    pub fn sequence(&self, member: Datatype) -> Datatype {
        if let Some(t) = self.sequences.borrow().get(&member.key()) {
            return t.clone();
        }
        let name = format!("seq({})", member.name());
        let t = Datatype(Rc::new(TypeNode {
            kind: TypeKind::Sequence(member.clone()),
            name,
        }));
        self.sequences.borrow_mut().insert(member.key(), t.clone());
        t
    }

    /// Tuple cell. `left` may itself be a tuple: `pair(pair(a, b), c)` is
    /// the triple `(a, b, c)`.
    pub fn pair(&self, left: Datatype, right: Datatype) -> Datatype {
        let key = (left.key(), right.key());
        if let Some(t) = self.pairs.borrow().get(&key) {
            return t.clone();
        }
        let name = {
            let mut members = Vec::new();
            collect_tuple_names(&left, &mut members);
            members.push(right.name().to_owned());
            format!("({})", members.join(", "))
        };
        let t = Datatype(Rc::new(TypeNode {
            kind: TypeKind::Pair(left, right),
            name,
        }));
        self.pairs.borrow_mut().insert(key, t.clone());
        t
    }

    pub fn lambda(&self, arg: Datatype, res: Datatype) -> Datatype {
        let key = (arg.key(), res.key());
        if let Some(t) = self.lambdas.borrow().get(&key) {
            return t.clone();
        }
        let name = format!("{} -> {}", arg.name(), res.name());
        let t = Datatype(Rc::new(TypeNode {
            kind: TypeKind::Lambda(arg, res),
            name,
        }));
        self.lambdas.borrow_mut().insert(key, t.clone());
        t
    }

    // ------------------------------------------------------------------
    // tuple construction

    /// Cons a (non-tuple-treated) member onto the end of a tuple. Unit is
    /// the identity on either side.
    pub fn tuple_append(&self, t0: Datatype, t1: Datatype) -> Datatype {
        if t0.is_unit() {
            return t1;
        }
        if t1.is_unit() {
            return t0;
        }
        self.pair(t0, t1)
    }

    /// Concatenate two tuples slot-wise.
    pub fn tuple_concat(&self, t0: Datatype, t1: Datatype) -> Datatype {
        if t0.is_unit() {
            return t1;
        }
        if t1.is_unit() {
            return t0;
        }
        match t1.kind() {
            TypeKind::Pair(l, r) => {
                let left = self.tuple_concat(t0, l.clone());
                self.pair(left, r.clone())
            }
            _ => self.pair(t0, t1),
        }
    }

    /// Build a tuple with exactly these member types. Zero members yields
    /// unit; one member yields the member itself (a monople).
    pub fn tuple_specific(&self, members: &[Datatype]) -> Datatype {
        let mut t = self.unit();
        for m in members {
            t = self.tuple_append(t, m.clone());
        }
        t
    }

    /// Remove slot `ix`. A resulting monople unwraps to its member; a
    /// resulting zero-tuple is unit.
    pub fn tuple_strip(&self, t: &Datatype, ix: u32) -> Datatype {
        let arity = t.arity();
        assert!(ix < arity, "tuple_strip index {} out of range for {}", ix, t);

        if arity == 1 {
            return self.unit();
        }
        let (left, right) = match t.kind() {
            TypeKind::Pair(l, r) => (l.clone(), r.clone()),
            _ => unreachable!("arity >= 2 implies a pair"),
        };
        if ix == arity - 1 {
            return left;
        }
        let stripped = self.tuple_strip(&left, ix);
        if stripped.arity() == 0 {
            return right;
        }
        self.pair(stripped, right)
    }

    /// `tuple_strip` through an outer set/sequence wrapper, preserving it.
    pub fn tupleset_strip(&self, t: &Datatype, ix: u32) -> Datatype {
        match t.kind() {
            TypeKind::Set(m) => {
                let inner = self.tuple_strip(&m.clone(), ix);
                self.set(inner)
            }
            TypeKind::Sequence(m) => {
                let inner = self.tuple_strip(&m.clone(), ix);
                self.sequence(inner)
            }
            _ => self.tuple_strip(t, ix),
        }
    }

    // ------------------------------------------------------------------
    // lattice

    /// Least upper bound.
    pub fn generalize(&self, t1: &Datatype, t2: &Datatype) -> Datatype {
        if t1 == t2 {
            return t1.clone();
        }
        if t1.is_bottom() {
            return t2.clone();
        }
        if t2.is_bottom() {
            return t1.clone();
        }

        if t1.is_set() && t2.is_set() {
            let m = self.generalize(&t1.set_member(), &t2.set_member());
            return self.set(m);
        }
        if t1.is_sequence() && t2.is_sequence() {
            let m = self.generalize(&t1.sequence_member(), &t2.sequence_member());
            return self.sequence(m);
        }

        // Nonidentical lambdas don't unify; the engine only builds
        // exact-matching ones.
        if t1.is_lambda() || t2.is_lambda() {
            return self.top();
        }

        if t1.is_tuple() && t2.is_tuple() {
            let arity = t1.arity();
            if arity != t2.arity() {
                return self.top();
            }
            let members: Vec<Datatype> = (0..arity)
                .map(|i| self.generalize(&t1.getnth(i), &t2.getnth(i)))
                .collect();
            return self.tuple_specific(&members);
        }
        if t1.is_tuple() || t2.is_tuple() {
            return self.top();
        }

        // Don't introduce dbedge unless it's already present.
        if (t1.is_abs_dbedge() && t2.is_any_dbedge())
            || (t1.is_any_dbedge() && t2.is_abs_dbedge())
        {
            return self.dbedge();
        }
        if t1.is_any_number() && t2.is_any_number() {
            return self.number();
        }
        if t1.is_any_atom() && t2.is_any_atom() {
            return self.atom();
        }
        if t1.is_any_dbobj() && t2.is_any_dbobj() {
            return self.dbobj();
        }

        self.top()
    }

    /// Greatest lower bound; `None` means the types have no common subtype.
    /// Failure is distinct from bottom.
    pub fn specialize(&self, t1: &Datatype, t2: &Datatype) -> Option<Datatype> {
        if t1 == t2 {
            return Some(t1.clone());
        }
        if t1.is_bottom() || t2.is_bottom() {
            return Some(self.bottom());
        }
        if t1.is_top() {
            return Some(t2.clone());
        }
        if t2.is_top() {
            return Some(t1.clone());
        }

        if t1.is_set() && t2.is_set() {
            let m = self.specialize(&t1.set_member(), &t2.set_member())?;
            return Some(self.set(m));
        }
        if t1.is_sequence() && t2.is_sequence() {
            let m = self.specialize(&t1.sequence_member(), &t2.sequence_member())?;
            return Some(self.sequence(m));
        }

        if t1.is_lambda() || t2.is_lambda() {
            return None;
        }

        if t1.is_tuple() && t2.is_tuple() {
            let arity = t1.arity();
            if arity != t2.arity() {
                return None;
            }
            let mut members = Vec::with_capacity(arity as usize);
            for i in 0..arity {
                members.push(self.specialize(&t1.getnth(i), &t2.getnth(i))?);
            }
            return Some(self.tuple_specific(&members));
        }
        if t1.is_tuple() || t2.is_tuple() {
            return None;
        }

        if t1.is_abs_dbedge() && t2.is_any_dbedge() {
            return Some(t2.clone());
        }
        if t1.is_any_dbedge() && t2.is_abs_dbedge() {
            return Some(t1.clone());
        }
        if t1.is_abs_number() && t2.is_any_number() {
            return Some(t2.clone());
        }
        if t1.is_any_number() && t2.is_abs_number() {
            return Some(t1.clone());
        }
        if t1.is_abs_atom() && t2.is_any_atom() {
            return Some(t2.clone());
        }
        if t1.is_any_atom() && t2.is_abs_atom() {
            return Some(t1.clone());
        }
        if t1.is_abs_dbobj() && t2.is_any_dbobj() {
            return Some(t2.clone());
        }
        if t1.is_any_dbobj() && t2.is_abs_dbobj() {
            return Some(t1.clone());
        }

        None
    }
}

impl Default for TypeManager {
    fn default() -> Self {
        Self::new()
    }
}

fn collect_tuple_names(t: &Datatype, out: &mut Vec<String>) {
    match t.kind() {
        TypeKind::Unit => {}
        TypeKind::Pair(l, r) => {
            collect_tuple_names(l, out);
            out.push(r.name().to_owned());
        }
        _ => out.push(t.name().to_owned()),
    }
}

// ============================================================================
// Tests
// ============================================================================

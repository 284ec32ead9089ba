//! # Runtime Values
//!
//! The dynamically typed value model: everything a query produces or a
//! backend returns is a [`Value`]. Values are owned trees; `clone` is deep
//! and destruction is recursive. Collections carry their member type so that
//! empty collections stay typed (member type bottom, widening on insert).
//!
//! Three comparison relations coexist:
//!
//! - [`Value::eq_value`] — the language's `=`, with promotions
//!   (int→float, string→number, anything→bool when a bool is present);
//! - [`Value::identical`] — strict: same type, same value in that type;
//! - [`Value::compare`] — a total-ish order for sorting, which falls back to
//!   canonical string form for mixed atoms and a fixed type rank otherwise.
//!
//! The canonical string form produced by `Display` is part of the engine's
//! observable surface; its grammar is fixed.

use std::cmp::Ordering;
use std::fmt;
use std::rc::Rc;

use crate::contract::pql_contract;
use crate::tcalc::Closure;
use crate::types::{Datatype, TypeManager};

// ============================================================================
// Representation
// ============================================================================

/// A database object reference: storage region, object id, version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbObj {
    pub dbnum: i32,
    pub oid: u64,
    pub subid: u64,
}

/// One step of a path: left object, edge label, right object.
#[derive(Debug, Clone)]
pub struct PathElement {
    pub leftobj: Value,
    pub edgename: Value,
    pub rightobj: Value,
}

/// A runtime value.
///
/// `Lambda` is executor-internal: it appears only while a query runs, and is
/// neither picklable nor orderable. Backends must not produce it.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i32),
    Float(f64),
    Str(String),
    Struct(DbObj),
    PathElement(Box<PathElement>),
    Distinguisher(u32),
    /// Finite ordered sequence of slots. `Tuple(vec![])` is unit. An
    /// arity-1 tuple never exists as such; it unwraps to its member (the
    /// monople rule).
    Tuple(Vec<Value>),
    Set { elem: Datatype, members: Vec<Value> },
    Sequence { elem: Datatype, members: Vec<Value> },
    Lambda(Rc<Closure>),
}

impl Value {
    // ------------------------------------------------------------------
    // constructors

    pub fn string(s: impl Into<String>) -> Value {
        Value::Str(s.into())
    }

    pub fn struct_(dbnum: i32, oid: u64, subid: u64) -> Value {
        Value::Struct(DbObj { dbnum, oid, subid })
    }

    pub fn pathelement(leftobj: Value, edgename: Value, rightobj: Value) -> Value {
        Value::PathElement(Box::new(PathElement {
            leftobj,
            edgename,
            rightobj,
        }))
    }

    /// The zero-tuple.
    pub fn unit() -> Value {
        Value::Tuple(Vec::new())
    }

    pub fn pair(a: Value, b: Value) -> Value {
        Value::Tuple(vec![a, b])
    }

    /// Build a tuple from member values, applying the monople rule: zero
    /// members is unit, one member is the member itself.
    pub fn tuple_specific(mut members: Vec<Value>) -> Value {
        if members.len() == 1 {
            members.pop().unwrap()
        } else {
            Value::Tuple(members)
        }
    }

    pub fn empty_set(tm: &TypeManager) -> Value {
        Value::Set {
            elem: tm.bottom(),
            members: Vec::new(),
        }
    }

    pub fn empty_sequence(tm: &TypeManager) -> Value {
        Value::Sequence {
            elem: tm.bottom(),
            members: Vec::new(),
        }
    }

    /// Build a set from members, widening the member type as inserts do.
    pub fn set_from(tm: &TypeManager, members: Vec<Value>) -> Value {
        let mut s = Value::empty_set(tm);
        for m in members {
            s.set_add(tm, m);
        }
        s
    }

    pub fn sequence_from(tm: &TypeManager, members: Vec<Value>) -> Value {
        let mut s = Value::empty_sequence(tm);
        for m in members {
            s.sequence_add(tm, m);
        }
        s
    }

    // ------------------------------------------------------------------
    // type tests

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }
    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }
    pub fn is_int(&self) -> bool {
        matches!(self, Value::Int(_))
    }
    pub fn is_float(&self) -> bool {
        matches!(self, Value::Float(_))
    }
    pub fn is_string(&self) -> bool {
        matches!(self, Value::Str(_))
    }
    pub fn is_struct(&self) -> bool {
        matches!(self, Value::Struct(_))
    }
    pub fn is_pathelement(&self) -> bool {
        matches!(self, Value::PathElement(_))
    }
    pub fn is_distinguisher(&self) -> bool {
        matches!(self, Value::Distinguisher(_))
    }
    pub fn is_tuple(&self) -> bool {
        matches!(self, Value::Tuple(_))
    }
    pub fn is_set(&self) -> bool {
        matches!(self, Value::Set { .. })
    }
    pub fn is_sequence(&self) -> bool {
        matches!(self, Value::Sequence { .. })
    }
    pub fn is_coll(&self) -> bool {
        matches!(self, Value::Set { .. } | Value::Sequence { .. })
    }
    pub fn is_lambda(&self) -> bool {
        matches!(self, Value::Lambda(_))
    }

    /// The value's datatype. Collections report their carried member type;
    /// everything else derives structurally.
    pub fn datatype(&self, tm: &TypeManager) -> Datatype {
        match self {
            Value::Nil => tm.bottom(),
            Value::Bool(_) => tm.boolean(),
            Value::Int(_) => tm.int(),
            Value::Float(_) => tm.double(),
            Value::Str(_) => tm.string(),
            Value::Struct(_) => tm.struct_(),
            Value::PathElement(_) => tm.pathelement(),
            Value::Distinguisher(_) => tm.distinguisher(),
            Value::Tuple(members) => {
                let tys: Vec<Datatype> = members.iter().map(|m| m.datatype(tm)).collect();
                tm.tuple_specific(&tys)
            }
            Value::Set { elem, .. } => tm.set(elem.clone()),
            Value::Sequence { elem, .. } => tm.sequence(elem.clone()),
            Value::Lambda(_) => tm.lambda(tm.top(), tm.top()),
        }
    }

    // ------------------------------------------------------------------
    // accessors (wrong variant is a contract violation)

    pub fn as_bool(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            _ => crate::contract::contract_violation("as_bool on non-bool value"),
        }
    }

    pub fn as_int(&self) -> i32 {
        match self {
            Value::Int(i) => *i,
            _ => crate::contract::contract_violation("as_int on non-int value"),
        }
    }

    pub fn as_float(&self) -> f64 {
        match self {
            Value::Float(f) => *f,
            _ => crate::contract::contract_violation("as_float on non-float value"),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Value::Str(s) => s,
            _ => crate::contract::contract_violation("as_str on non-string value"),
        }
    }

    pub fn as_struct(&self) -> &DbObj {
        match self {
            Value::Struct(o) => o,
            _ => crate::contract::contract_violation("as_struct on non-struct value"),
        }
    }

    pub fn as_pathelement(&self) -> &PathElement {
        match self {
            Value::PathElement(p) => p,
            _ => crate::contract::contract_violation("as_pathelement on non-pathelement value"),
        }
    }

    pub fn as_lambda(&self) -> &Rc<Closure> {
        match self {
            Value::Lambda(c) => c,
            _ => crate::contract::contract_violation("as_lambda on non-lambda value"),
        }
    }

    // ------------------------------------------------------------------
    // tuple operations
    //
    // Non-tuples act as tuples of arity 1 (monoples), which removes a pile
    // of special cases for the executor.

    pub fn tuple_arity(&self) -> usize {
        match self {
            Value::Tuple(members) => members.len(),
            _ => 1,
        }
    }

    /// Borrow slot `ix`. Index 0 of a monople is the monople itself.
    pub fn tuple_get(&self, ix: usize) -> &Value {
        match self {
            Value::Tuple(members) => {
                pql_contract!(ix < members.len(), "tuple_get index {} out of range", ix);
                &members[ix]
            }
            _ => {
                pql_contract!(ix == 0, "tuple_get index {} on a monople", ix);
                self
            }
        }
    }

    /// Append `val` as a new final slot, consuming self. A monople becomes a
    /// pair; unit becomes the appended value alone.
    pub fn tuple_add(self, val: Value) -> Value {
        match self {
            Value::Tuple(members) if members.is_empty() => val,
            Value::Tuple(mut members) => {
                members.push(val);
                Value::Tuple(members)
            }
            other => Value::Tuple(vec![other, val]),
        }
    }

    /// Remove slot `ix`, unwrapping a resulting monople.
    pub fn tuple_strip(self, ix: usize) -> Value {
        match self {
            Value::Tuple(mut members) => {
                pql_contract!(ix < members.len(), "tuple_strip index {} out of range", ix);
                members.remove(ix);
                if members.len() == 1 {
                    members.pop().unwrap()
                } else {
                    Value::Tuple(members)
                }
            }
            _ => {
                pql_contract!(ix == 0, "tuple_strip index {} on a monople", ix);
                Value::unit()
            }
        }
    }

    /// Replace slot `ix`, returning the old slot value.
    pub fn tuple_replace(&mut self, ix: usize, val: Value) -> Value {
        match self {
            Value::Tuple(members) => {
                pql_contract!(ix < members.len(), "tuple_replace index {} out of range", ix);
                std::mem::replace(&mut members[ix], val)
            }
            _ => {
                pql_contract!(ix == 0, "tuple_replace index {} on a monople", ix);
                std::mem::replace(self, val)
            }
        }
    }

    /// Concatenate two tuples slot-wise; unit is the identity.
    pub fn paste(t1: &Value, t2: &Value) -> Value {
        let arity1 = t1.tuple_arity();
        let arity2 = t2.tuple_arity();
        if arity1 == 0 {
            return t2.clone();
        }
        if arity2 == 0 {
            return t1.clone();
        }
        let mut members = Vec::with_capacity(arity1 + arity2);
        for i in 0..arity1 {
            members.push(t1.tuple_get(i).clone());
        }
        for i in 0..arity2 {
            members.push(t2.tuple_get(i).clone());
        }
        Value::Tuple(members)
    }

    // ------------------------------------------------------------------
    // collection operations

    pub fn coll_num(&self) -> usize {
        match self {
            Value::Set { members, .. } | Value::Sequence { members, .. } => members.len(),
            _ => crate::contract::contract_violation("coll_num on non-collection value"),
        }
    }

    pub fn coll_get(&self, ix: usize) -> &Value {
        match self {
            Value::Set { members, .. } | Value::Sequence { members, .. } => {
                pql_contract!(ix < members.len(), "coll_get index {} out of range", ix);
                &members[ix]
            }
            _ => crate::contract::contract_violation("coll_get on non-collection value"),
        }
    }

    pub fn coll_members(&self) -> &[Value] {
        match self {
            Value::Set { members, .. } | Value::Sequence { members, .. } => members,
            _ => crate::contract::contract_violation("coll_members on non-collection value"),
        }
    }

    pub fn coll_member_type(&self) -> &Datatype {
        match self {
            Value::Set { elem, .. } | Value::Sequence { elem, .. } => elem,
            _ => crate::contract::contract_violation("coll_member_type on non-collection value"),
        }
    }

    pub fn coll_drop(&mut self, ix: usize) {
        match self {
            Value::Set { members, .. } | Value::Sequence { members, .. } => {
                pql_contract!(ix < members.len(), "coll_drop index {} out of range", ix);
                members.remove(ix);
            }
            _ => crate::contract::contract_violation("coll_drop on non-collection value"),
        }
    }

    pub fn set_num(&self) -> usize {
        pql_contract!(self.is_set(), "set_num on non-set value");
        self.coll_num()
    }

    pub fn set_get(&self, ix: usize) -> &Value {
        pql_contract!(self.is_set(), "set_get on non-set value");
        self.coll_get(ix)
    }

    pub fn sequence_num(&self) -> usize {
        pql_contract!(self.is_sequence(), "sequence_num on non-sequence value");
        self.coll_num()
    }

    pub fn sequence_get(&self, ix: usize) -> &Value {
        pql_contract!(self.is_sequence(), "sequence_get on non-sequence value");
        self.coll_get(ix)
    }

    pub fn set_add(&mut self, tm: &TypeManager, val: Value) {
        match self {
            Value::Set { elem, members } => {
                widen_member_type(tm, elem, &val);
                members.push(val);
            }
            _ => crate::contract::contract_violation("set_add on non-set value"),
        }
    }

    pub fn sequence_add(&mut self, tm: &TypeManager, val: Value) {
        match self {
            Value::Sequence { elem, members } => {
                widen_member_type(tm, elem, &val);
                members.push(val);
            }
            _ => crate::contract::contract_violation("sequence_add on non-sequence value"),
        }
    }

    /// Retag a set as a sequence; the representation is shared.
    pub fn set_to_sequence(self) -> Value {
        match self {
            Value::Set { elem, members } => Value::Sequence { elem, members },
            _ => crate::contract::contract_violation("set_to_sequence on non-set value"),
        }
    }

    pub fn sequence_to_set(self) -> Value {
        match self {
            Value::Sequence { elem, members } => Value::Set { elem, members },
            _ => crate::contract::contract_violation("sequence_to_set on non-sequence value"),
        }
    }

    // ------------------------------------------------------------------
    // truth

    /// FILTER's notion of truth: nil, false, zero, the empty string, and
    /// empty collections are false; everything else is true.
    pub fn truth(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Set { members, .. } | Value::Sequence { members, .. } => !members.is_empty(),
            _ => true,
        }
    }

    // ------------------------------------------------------------------
    // equality and ordering

    /// Strict equality: same type, same value in that type.
    pub fn identical(&self, other: &Value) -> bool {
        if !same_type(self, other) {
            return false;
        }
        structural(self, other, &Value::identical_ord) == Ordering::Equal
    }

    fn identical_ord(&self, other: &Value) -> Ordering {
        if !same_type(self, other) {
            return Ordering::Less;
        }
        structural(self, other, &Value::identical_ord)
    }

    /// The language's equality, with promotions. `1.0 = 1` and
    /// `"6" = 6` hold; `6 = "yes"` does not (bool conversion applies only
    /// when a bool is present).
    pub fn eq_value(&self, other: &Value) -> bool {
        self.convertible_ord(other) == Ordering::Equal
    }

    fn convertible_ord(&self, other: &Value) -> Ordering {
        match (self.is_nil(), other.is_nil()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }

        if same_type(self, other) {
            return structural(self, other, &Value::convertible_ord);
        }

        if self.is_numberlike() || other.is_numberlike() {
            if let (Some(a), Some(b)) = (convert_to_number(self), convert_to_number(other)) {
                return a.cmp_num(&b);
            }
        }

        if self.is_bool() || other.is_bool() {
            if let (Some(a), Some(b)) = (convert_to_bool(self), convert_to_bool(other)) {
                return a.cmp(&b);
            }
        }

        if self.is_tuple() && other.is_tuple() {
            return tuplewise_compare(self, other);
        }

        if self.is_coll() && other.is_coll() {
            // A sequence promotes to a set; compare structurally.
            return structural(self, other, &Value::compare);
        }

        // Not a real ordering; only the equal/not-equal answer matters here.
        Ordering::Less
    }

    /// Ordering for sorting. The language's `<` is unusable here (mixing
    /// strings and numbers makes it cyclic), so mixed atoms order by their
    /// canonical string form and unrelated types by a fixed rank.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self.is_nil(), other.is_nil()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }

        if same_type(self, other) {
            return structural(self, other, &Value::compare);
        }

        if self.is_atom() && other.is_atom() {
            return atom_string(self).cmp(&atom_string(other));
        }

        if self.is_tuple() && other.is_tuple() {
            return tuplewise_compare(self, other);
        }

        if self.is_coll() && other.is_coll() {
            return structural(self, other, &Value::compare);
        }

        rank(self).cmp(&rank(other))
    }

    fn is_numberlike(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_) | Value::Str(_))
    }

    fn is_atom(&self) -> bool {
        matches!(
            self,
            Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_)
        )
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        self.identical(other)
    }
}

fn widen_member_type(tm: &TypeManager, elem: &mut Datatype, val: &Value) {
    let valty = val.datatype(tm);
    if elem.is_bottom() {
        *elem = valty;
        return;
    }
    let widened = tm.generalize(elem, &valty);
    // Widening within the lattice interior is fine; falling all the way to
    // top from non-top inputs means the member is unrelated to the rest.
    pql_contract!(
        !widened.is_top() || elem.is_top() || valty.is_top(),
        "collection member type {} incompatible with {}",
        valty.name(),
        elem.name()
    );
    *elem = widened;
}

/// Same-type test used to pick the structural comparison path. Collections
/// must agree on member type; path elements are one type regardless of
/// their contents.
fn same_type(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Nil, Value::Nil)
        | (Value::Bool(_), Value::Bool(_))
        | (Value::Int(_), Value::Int(_))
        | (Value::Float(_), Value::Float(_))
        | (Value::Str(_), Value::Str(_))
        | (Value::Struct(_), Value::Struct(_))
        | (Value::PathElement(_), Value::PathElement(_))
        | (Value::Distinguisher(_), Value::Distinguisher(_)) => true,
        (Value::Tuple(xs), Value::Tuple(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| same_type(x, y))
        }
        (Value::Set { elem: e1, .. }, Value::Set { elem: e2, .. })
        | (Value::Sequence { elem: e1, .. }, Value::Sequence { elem: e2, .. }) => e1 == e2,
        (Value::Lambda(c1), Value::Lambda(c2)) => Rc::ptr_eq(c1, c2),
        _ => false,
    }
}

/// Compare two values of the same shape, recursing through `sub`.
fn structural(a: &Value, b: &Value, sub: &dyn Fn(&Value, &Value) -> Ordering) -> Ordering {
    match (a, b) {
        (Value::Nil, Value::Nil) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        (Value::Struct(x), Value::Struct(y)) => x
            .dbnum
            .cmp(&y.dbnum)
            .then(x.oid.cmp(&y.oid))
            .then(x.subid.cmp(&y.subid)),
        (Value::PathElement(x), Value::PathElement(y)) => sub(&x.edgename, &y.edgename)
            .then_with(|| sub(&x.leftobj, &y.leftobj))
            .then_with(|| sub(&x.rightobj, &y.rightobj)),
        (Value::Distinguisher(x), Value::Distinguisher(y)) => x.cmp(y),
        (Value::Tuple(xs), Value::Tuple(ys)) => elementwise(xs, ys, sub),
        (Value::Set { members: xs, .. }, Value::Set { members: ys, .. })
        | (Value::Sequence { members: xs, .. }, Value::Sequence { members: ys, .. })
        | (Value::Set { members: xs, .. }, Value::Sequence { members: ys, .. })
        | (Value::Sequence { members: xs, .. }, Value::Set { members: ys, .. }) => {
            elementwise(xs, ys, sub)
        }
        (Value::Lambda(_), Value::Lambda(_)) => Ordering::Equal,
        _ => crate::contract::contract_violation("structural compare on mismatched values"),
    }
}

fn elementwise(xs: &[Value], ys: &[Value], sub: &dyn Fn(&Value, &Value) -> Ordering) -> Ordering {
    match xs.len().cmp(&ys.len()) {
        Ordering::Equal => {}
        other => return other,
    }
    for (x, y) in xs.iter().zip(ys) {
        match sub(x, y) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    Ordering::Equal
}

fn tuplewise_compare(a: &Value, b: &Value) -> Ordering {
    let ar = a.tuple_arity();
    let br = b.tuple_arity();
    match ar.cmp(&br) {
        Ordering::Equal => {}
        other => return other,
    }
    for i in 0..ar {
        match a.tuple_get(i).compare(b.tuple_get(i)) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    Ordering::Equal
}

enum Num {
    I(i32),
    F(f64),
}

impl Num {
    fn cmp_num(&self, other: &Num) -> Ordering {
        match (self, other) {
            (Num::I(a), Num::I(b)) => a.cmp(b),
            _ => {
                let a = self.as_f64();
                let b = other.as_f64();
                a.partial_cmp(&b).unwrap_or(Ordering::Equal)
            }
        }
    }

    fn as_f64(&self) -> f64 {
        match self {
            Num::I(i) => *i as f64,
            Num::F(f) => *f,
        }
    }
}

fn convert_to_number(v: &Value) -> Option<Num> {
    match v {
        Value::Int(i) => Some(Num::I(*i)),
        Value::Float(f) => Some(Num::F(*f)),
        Value::Str(s) => {
            if let Ok(i) = s.trim().parse::<i32>() {
                Some(Num::I(i))
            } else if let Ok(f) = s.trim().parse::<f64>() {
                Some(Num::F(f))
            } else {
                None
            }
        }
        _ => None,
    }
}

fn convert_to_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Int(i) => Some(*i != 0),
        Value::Float(f) => Some(*f != 0.0),
        Value::Str(s) => match s.as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Canonical string of an atom, for mixed-atom ordering.
fn atom_string(v: &Value) -> String {
    match v {
        Value::Str(s) => s.clone(),
        Value::Bool(_) | Value::Int(_) | Value::Float(_) => v.to_string(),
        _ => crate::contract::contract_violation("atom_string on non-atom value"),
    }
}

/// Sort rank for values of unrelated types: atoms first, then structs, path
/// elements, distinguishers, tuples, collections.
fn rank(v: &Value) -> u32 {
    match v {
        Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::Str(_) => 0,
        Value::Struct(_) => 1,
        Value::PathElement(_) => 2,
        Value::Distinguisher(_) => 3,
        Value::Tuple(_) => 4,
        Value::Set { .. } | Value::Sequence { .. } => 5,
        _ => crate::contract::contract_violation("rank on unsortable value"),
    }
}

// ============================================================================
// Staged tuple construction
// ============================================================================

/// Out-of-order tuple construction, used by the unpickler and the executor
/// when slot values arrive in arbitrary order.
pub struct TupleBuilder {
    slots: Vec<Option<Value>>,
}

impl TupleBuilder {
    pub fn begin(arity: usize) -> TupleBuilder {
        TupleBuilder {
            slots: (0..arity).map(|_| None).collect(),
        }
    }

    pub fn assign(&mut self, slot: usize, val: Value) {
        pql_contract!(slot < self.slots.len(), "tuple slot {} out of range", slot);
        pql_contract!(self.slots[slot].is_none(), "tuple slot {} assigned twice", slot);
        self.slots[slot] = Some(val);
    }

    /// Finish; every slot must be filled. The monople rule applies.
    pub fn end(self) -> Value {
        let members: Vec<Value> = self
            .slots
            .into_iter()
            .enumerate()
            .map(|(i, s)| match s {
                Some(v) => v,
                None => crate::contract::contract_violation(&format!(
                    "tuple slot {} never assigned",
                    i
                )),
            })
            .collect();
        Value::tuple_specific(members)
    }
}

// ============================================================================
// Canonical string form
// ============================================================================

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => f.write_str(if *b { "true" } else { "false" }),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => f.write_str(&format_g(*x)),
            Value::Str(s) => f.write_str(s),
            Value::Struct(o) => {
                if o.subid == 0 {
                    write!(f, "{{{}.{}}}", o.dbnum, o.oid)
                } else {
                    write!(f, "{{{}.{}.{}}}", o.dbnum, o.oid, o.subid)
                }
            }
            Value::PathElement(p) => {
                write!(f, "{}.{}.{}", p.leftobj, p.edgename, p.rightobj)
            }
            Value::Distinguisher(id) => write!(f, ".D{}", id),
            Value::Tuple(members) => {
                f.write_str("(")?;
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", m)?;
                }
                f.write_str(")")
            }
            Value::Set { members, .. } | Value::Sequence { members, .. } => {
                f.write_str("{")?;
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", m)?;
                }
                f.write_str("}")
            }
            Value::Lambda(_) => f.write_str("<lambda>"),
        }
    }
}

/// Render a float the way C's `%g` does: six significant digits, trailing
/// zeros trimmed, scientific notation outside [1e-4, 1e6).
pub(crate) fn format_g(v: f64) -> String {
    if v.is_nan() {
        return "nan".to_owned();
    }
    if v.is_infinite() {
        return if v < 0.0 { "-inf" } else { "inf" }.to_owned();
    }
    if v == 0.0 {
        return if v.is_sign_negative() { "-0" } else { "0" }.to_owned();
    }

    // Round to six significant digits first; the exponent of the rounded
    // value decides the style.
    let sci = format!("{:.5e}", v);
    let (mant, exp) = sci.split_once('e').expect("exponential form");
    let exp: i32 = exp.parse().expect("exponent");

    if (-4..6).contains(&exp) {
        let prec = (5 - exp).max(0) as usize;
        let mut s = format!("{:.*}", prec, v);
        if s.contains('.') {
            while s.ends_with('0') {
                s.pop();
            }
            if s.ends_with('.') {
                s.pop();
            }
        }
        s
    } else {
        let mut m = mant.to_owned();
        if m.contains('.') {
            while m.ends_with('0') {
                m.pop();
            }
            if m.ends_with('.') {
                m.pop();
            }
        }
        format!("{}e{}{:02}", m, if exp < 0 { "-" } else { "+" }, exp.abs())
    }
}

// ============================================================================
// Tests
// ============================================================================

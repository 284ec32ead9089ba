//! # Storage Backend Contract
//!
//! The engine fetches graph data through five operations on a pluggable
//! [`Backend`]: resolve a named global, create a temp object, assign an
//! edge, follow one edge, and follow all edges. Everything else — on-disk
//! layout, indices, transport — lives behind this trait.
//!
//! [`TempDb`] is the in-memory temp-object graph used for intermediate
//! objects a query creates: an append-only array of objects, each an
//! ordered list of (edge, value) pairs. [`MemBackend`] wraps a `TempDb`
//! with a table of named globals and is what the tests (and embedders
//! without real storage) run against.

use std::collections::HashMap;

use thiserror::Error;

use crate::types::TypeManager;
use crate::value::Value;

/// The storage region owned by the temp graph. Real stores use
/// non-negative region numbers.
pub const TEMP_DBNUM: i32 = -1;

/// The distinguished global naming the set of all versioned objects; SCAN
/// drives the store through it.
pub const VERSIONS_GLOBAL: &str = "VERSIONS";

/// The distinguished global returning the provenance root object.
pub const PROVENANCE_GLOBAL: &str = "Provenance";

/// Failures a backend may surface. The engine propagates them verbatim.
#[derive(Error, Debug)]
pub enum BackendError {
    /// Assignment on a backend (or object) that cannot be written.
    #[error("backend is read-only")]
    ReadOnly,

    #[error("no such object: {0}")]
    NoSuchObject(String),

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// The backend contract (§ the five operations).
///
/// `follow` returns the set of values `v` such that an edge labeled `edge`
/// runs from `obj` to `v` (or from `v` to `obj` when `reversed`).
/// `followall` returns every outgoing (or incoming) edge as an
/// (edge, value) pair. Returned sets are typed; an empty set has member
/// type bottom.
pub trait Backend {
    /// The value bound to a global name; nil if unbound.
    fn read_global(&mut self, tm: &TypeManager, name: &str) -> Result<Value, BackendError>;

    /// A fresh temp object in the backend's dedicated storage region.
    fn newobject(&mut self, tm: &TypeManager) -> Result<Value, BackendError>;

    /// Attach `edge -> val` to an object previously created by
    /// `newobject`. Read-only backends report [`BackendError::ReadOnly`].
    fn assign(
        &mut self,
        tm: &TypeManager,
        obj: &Value,
        edge: &Value,
        val: &Value,
    ) -> Result<(), BackendError>;

    fn follow(
        &mut self,
        tm: &TypeManager,
        obj: &Value,
        edge: &Value,
        reversed: bool,
    ) -> Result<Value, BackendError>;

    fn followall(
        &mut self,
        tm: &TypeManager,
        obj: &Value,
        reversed: bool,
    ) -> Result<Value, BackendError>;
}

// ============================================================================
// Temp object graph
// ============================================================================

struct Field {
    edge: Value,
    val: Value,
}

struct TempObject {
    fields: Vec<Field>,
}

/// Append-only in-memory object graph. Objects are identified by index;
/// once created they are never removed.
pub struct TempDb {
    dbnum: i32,
    objects: Vec<TempObject>,
}

impl TempDb {
    pub fn new(dbnum: i32) -> TempDb {
        TempDb {
            dbnum,
            objects: Vec::new(),
        }
    }

    pub fn dbnum(&self) -> i32 {
        self.dbnum
    }

    pub fn num_objects(&self) -> usize {
        self.objects.len()
    }

    /// The struct value referring to object `ix`.
    pub fn object_value(&self, ix: usize) -> Value {
        Value::struct_(self.dbnum, ix as u64, 0)
    }

    pub fn newobject(&mut self) -> Value {
        let ix = self.objects.len();
        self.objects.push(TempObject { fields: Vec::new() });
        self.object_value(ix)
    }

    fn object_index(&self, obj: &Value) -> Result<usize, BackendError> {
        if !obj.is_struct() {
            return Err(BackendError::NoSuchObject(obj.to_string()));
        }
        let o = obj.as_struct();
        let ix = o.oid as usize;
        if o.dbnum != self.dbnum || ix >= self.objects.len() {
            return Err(BackendError::NoSuchObject(obj.to_string()));
        }
        Ok(ix)
    }

    /// Both edge and value are cloned on insertion; later mutation of the
    /// caller's copies never reaches the graph.
    pub fn assign(&mut self, obj: &Value, edge: &Value, val: &Value) -> Result<(), BackendError> {
        let ix = self.object_index(obj)?;
        self.objects[ix].fields.push(Field {
            edge: edge.clone(),
            val: val.clone(),
        });
        Ok(())
    }

    /// Linear scan of the object's pairs, matching the edge by the value
    /// model's equality. A nil edge matches any edge; that is how
    /// `followall` drives this path.
    pub fn follow(
        &self,
        tm: &TypeManager,
        obj: &Value,
        edge: &Value,
        reversed: bool,
    ) -> Result<Value, BackendError> {
        let matches = |f: &Field| edge.is_nil() || edge.eq_value(&f.edge);
        let mut ret = Value::empty_set(tm);
        if !reversed {
            let ix = self.object_index(obj)?;
            for f in &self.objects[ix].fields {
                if matches(f) {
                    ret.set_add(tm, f.val.clone());
                }
            }
        } else {
            self.object_index(obj)?;
            for (ix, o) in self.objects.iter().enumerate() {
                for f in &o.fields {
                    if matches(f) && f.val.eq_value(obj) {
                        ret.set_add(tm, self.object_value(ix));
                    }
                }
            }
        }
        Ok(ret)
    }

    pub fn followall(
        &self,
        tm: &TypeManager,
        obj: &Value,
        reversed: bool,
    ) -> Result<Value, BackendError> {
        let mut ret = Value::empty_set(tm);
        if !reversed {
            let ix = self.object_index(obj)?;
            for f in &self.objects[ix].fields {
                ret.set_add(tm, Value::pair(f.edge.clone(), f.val.clone()));
            }
        } else {
            self.object_index(obj)?;
            for (ix, o) in self.objects.iter().enumerate() {
                for f in &o.fields {
                    if f.val.eq_value(obj) {
                        ret.set_add(tm, Value::pair(f.edge.clone(), self.object_value(ix)));
                    }
                }
            }
        }
        Ok(ret)
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

/// A complete backend over a [`TempDb`] plus a table of named globals.
///
/// `VERSIONS` resolves to the set of every object in the graph unless a
/// binding overrides it; `Provenance` (and anything else) is whatever was
/// bound with [`MemBackend::bind_global`].
pub struct MemBackend {
    graph: TempDb,
    globals: HashMap<String, Value>,
}

impl MemBackend {
    pub fn new() -> MemBackend {
        MemBackend {
            graph: TempDb::new(TEMP_DBNUM),
            globals: HashMap::new(),
        }
    }

    pub fn bind_global(&mut self, name: &str, val: Value) {
        self.globals.insert(name.to_owned(), val);
    }

    pub fn graph(&self) -> &TempDb {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut TempDb {
        &mut self.graph
    }
}

impl Default for MemBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemBackend {
    fn read_global(&mut self, tm: &TypeManager, name: &str) -> Result<Value, BackendError> {
        if let Some(v) = self.globals.get(name) {
            return Ok(v.clone());
        }
        if name == VERSIONS_GLOBAL {
            let mut all = Value::empty_set(tm);
            for ix in 0..self.graph.num_objects() {
                all.set_add(tm, self.graph.object_value(ix));
            }
            return Ok(all);
        }
        Ok(Value::Nil)
    }

    fn newobject(&mut self, _tm: &TypeManager) -> Result<Value, BackendError> {
        Ok(self.graph.newobject())
    }

    fn assign(
        &mut self,
        _tm: &TypeManager,
        obj: &Value,
        edge: &Value,
        val: &Value,
    ) -> Result<(), BackendError> {
        self.graph.assign(obj, edge, val)
    }

    fn follow(
        &mut self,
        tm: &TypeManager,
        obj: &Value,
        edge: &Value,
        reversed: bool,
    ) -> Result<Value, BackendError> {
        self.graph.follow(tm, obj, edge, reversed)
    }

    fn followall(
        &mut self,
        tm: &TypeManager,
        obj: &Value,
        reversed: bool,
    ) -> Result<Value, BackendError> {
        self.graph.followall(tm, obj, reversed)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn tm() -> TypeManager {
        TypeManager::new()
    }

    #[test]
    fn newobject_assign_follow() {
        let tm = tm();
        let mut db = TempDb::new(TEMP_DBNUM);
        let o0 = db.newobject();
        let o1 = db.newobject();
        assert_eq!(o0.as_struct().oid, 0);
        assert_eq!(o1.as_struct().oid, 1);

        db.assign(&o0, &Value::string("name"), &Value::string("foo"))
            .unwrap();
        db.assign(&o0, &Value::string("input"), &o1).unwrap();
        db.assign(&o1, &Value::string("name"), &Value::string("bar"))
            .unwrap();

        let names = db.follow(&tm, &o0, &Value::string("name"), false).unwrap();
        assert_eq!(names.set_num(), 1);
        assert_eq!(names.set_get(0).to_string(), "foo");

        let inputs = db.follow(&tm, &o0, &Value::string("input"), false).unwrap();
        assert_eq!(inputs.set_num(), 1);
        assert!(inputs.set_get(0).identical(&o1));

        // empty result is a set of bottom
        let none = db.follow(&tm, &o1, &Value::string("input"), false).unwrap();
        assert_eq!(none.set_num(), 0);
        assert!(none.coll_member_type().is_bottom());
    }

    #[test]
    fn edge_matching_uses_value_eq() {
        let tm = tm();
        let mut db = TempDb::new(TEMP_DBNUM);
        let o = db.newobject();
        db.assign(&o, &Value::Int(7), &Value::string("seven"))
            .unwrap();
        // "7" matches 7 under the language's equality
        let hits = db.follow(&tm, &o, &Value::string("7"), false).unwrap();
        assert_eq!(hits.set_num(), 1);
    }

    #[test]
    fn reversed_follow_scans_sources() {
        let tm = tm();
        let mut db = TempDb::new(TEMP_DBNUM);
        let o0 = db.newobject();
        let o1 = db.newobject();
        db.assign(&o0, &Value::string("input"), &o1).unwrap();

        let back = db.follow(&tm, &o1, &Value::string("input"), true).unwrap();
        assert_eq!(back.set_num(), 1);
        assert!(back.set_get(0).identical(&o0));

        let all_back = db.followall(&tm, &o1, true).unwrap();
        assert_eq!(all_back.set_num(), 1);
        let pair = all_back.set_get(0);
        assert_eq!(pair.tuple_get(0).to_string(), "input");
        assert!(pair.tuple_get(1).identical(&o0));
    }

    #[test]
    fn followall_preserves_insertion_order() {
        let tm = tm();
        let mut db = TempDb::new(TEMP_DBNUM);
        let o = db.newobject();
        db.assign(&o, &Value::string("a"), &Value::Int(1)).unwrap();
        db.assign(&o, &Value::string("b"), &Value::Int(2)).unwrap();
        let all = db.followall(&tm, &o, false).unwrap();
        assert_eq!(all.set_num(), 2);
        assert_eq!(all.set_get(0).tuple_get(0).to_string(), "a");
        assert_eq!(all.set_get(1).tuple_get(0).to_string(), "b");
    }

    #[test]
    fn bogus_objects_are_rejected() {
        let tm = tm();
        let db = TempDb::new(TEMP_DBNUM);
        let bogus = Value::struct_(TEMP_DBNUM, 99, 0);
        assert!(matches!(
            db.follow(&tm, &bogus, &Value::string("x"), false),
            Err(BackendError::NoSuchObject(_))
        ));
        let not_an_object = Value::Int(3);
        assert!(matches!(
            db.follow(&tm, &not_an_object, &Value::string("x"), false),
            Err(BackendError::NoSuchObject(_))
        ));
    }

    #[test]
    fn read_only_backends_refuse_assign() {
        struct Frozen(TempDb);

        impl Backend for Frozen {
            fn read_global(&mut self, _: &TypeManager, _: &str) -> Result<Value, BackendError> {
                Ok(Value::Nil)
            }
            fn newobject(&mut self, _: &TypeManager) -> Result<Value, BackendError> {
                Err(BackendError::ReadOnly)
            }
            fn assign(
                &mut self,
                _: &TypeManager,
                _: &Value,
                _: &Value,
                _: &Value,
            ) -> Result<(), BackendError> {
                Err(BackendError::ReadOnly)
            }
            fn follow(
                &mut self,
                tm: &TypeManager,
                obj: &Value,
                edge: &Value,
                reversed: bool,
            ) -> Result<Value, BackendError> {
                self.0.follow(tm, obj, edge, reversed)
            }
            fn followall(
                &mut self,
                tm: &TypeManager,
                obj: &Value,
                reversed: bool,
            ) -> Result<Value, BackendError> {
                self.0.followall(tm, obj, reversed)
            }
        }

        let tm = tm();
        let mut db = TempDb::new(TEMP_DBNUM);
        let o = db.newobject();
        let mut frozen = Frozen(db);
        assert!(matches!(
            frozen.assign(&tm, &o, &Value::string("x"), &Value::Int(1)),
            Err(BackendError::ReadOnly)
        ));
        assert!(matches!(
            frozen.newobject(&tm),
            Err(BackendError::ReadOnly)
        ));
        // reads still work
        let all = frozen.followall(&tm, &o, false).unwrap();
        assert_eq!(all.set_num(), 0);
    }

    #[test]
    fn membackend_globals_and_versions() {
        let tm = tm();
        let mut be = MemBackend::new();
        let o0 = be.newobject(&tm).unwrap();
        let o1 = be.newobject(&tm).unwrap();
        be.bind_global(PROVENANCE_GLOBAL, o0.clone());

        let root = be.read_global(&tm, PROVENANCE_GLOBAL).unwrap();
        assert!(root.identical(&o0));

        let versions = be.read_global(&tm, VERSIONS_GLOBAL).unwrap();
        assert_eq!(versions.set_num(), 2);
        assert!(versions.set_get(1).identical(&o1));

        assert!(be.read_global(&tm, "NoSuchGlobal").unwrap().is_nil());
    }
}

//! # provql — Provenance Query Engine
//!
//! A query engine for graph-structured provenance databases: nodes
//! (objects with versions) connected by named edges. A declarative query
//! arrives as a tuple-calculus plan, is rewritten by the optimizer, and is
//! interpreted against a pluggable storage backend. It answers questions
//! such as "all ancestors of this file two hops back" or "processes whose
//! environment contained PATH".
//!
//! ## Pipeline Architecture
//!
//! ```text
//! Query Source Text
//!     ↓
//! [Parser + translation]  (external)    → TcExpr (typed, column-named)
//!     ↓
//! [baseopt]                             → algebraic rewrites to fixpoint
//!     ↓
//! [indexify]                            → graph patterns become index probes
//!     ↓
//! [Executor]                            → walks the plan, calls the Backend
//!     ↓
//! Value  →  canonical text form  |  pickle wire blob  |  layout dump
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use provql::{Context, MemBackend, TcExpr, TcGlobal, Value};
//!
//! let mut ctx = Context::new();
//! let mut backend = MemBackend::new();
//! backend.bind_global("answer", Value::Int(42));
//!
//! let plan = TcExpr::readglobal(TcGlobal::new("answer"));
//! let query = ctx.prepare(plan).expect("compiles");
//! let result = ctx.run(&query, &mut backend);
//! assert_eq!(result.to_string(), "42");
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `value` | Runtime values: equality, ordering, canonical string form |
//! | `types` | Interned datatype lattice; generalize/specialize |
//! | `columns` | Column names, column sets, column-tree algebra |
//! | `tcalc` | Tuple-calculus IR: node kinds, builders, audits |
//! | `layout` | Pretty-layout trees for plan and value dumps |
//! | `backend` | Storage contract + in-memory temp-object graph |
//! | `pickle` | Version-tagged binary wire format for values |
//! | `execution` | The plan interpreter |
//! | `optimizer` | baseopt / indexify rewrite passes + checkers |
//! | `context` | Engine context: errors, dumps, trace, leak accounting |
//! | `config` | TOML + environment configuration |
//!
//! Ownership model: one context per engine instance, single-threaded;
//! shared handles (column names, variables) are reference-counted and
//! deliberately not `Send`. `Context::live_names` exposes the leak check.

pub mod backend;
pub mod columns;
pub mod config;
pub mod context;
pub(crate) mod contract;
pub mod execution;
pub mod layout;
pub mod optimizer;
pub mod pickle;
pub mod tcalc;
pub mod types;
pub mod value;

// Re-export the working set for convenience
pub use backend::{Backend, BackendError, MemBackend, TempDb};
pub use config::Config;
pub use context::{Context, Query};
pub use contract::set_assertion_handler;
pub use execution::{Evaluator, ExecError};
pub use layout::Layout;
pub use optimizer::Optimizer;
pub use pickle::{pickle, unpickle, PickleError};
pub use tcalc::{Op, TcExpr, TcGlobal, TcKind, TcVar};
pub use types::{Datatype, TypeManager};
pub use value::Value;

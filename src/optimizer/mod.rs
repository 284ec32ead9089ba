//! # Plan Optimizer
//!
//! Algebraic rewrites on tuple-calculus trees, applied to fixpoint:
//!
//! - `baseopt` — filter pushdown below project/strip/join, rename
//!   commuting, no-op project elimination, nest/unnest fusion, constant
//!   folding through the shared scalar evaluator, and let elimination;
//! - `indexify` — graph-pattern rewrites: a scan filtered by a concrete
//!   edge becomes a step (the nominal index probe), and step chains can be
//!   fused into a repeat with path accumulation.
//!
//! ```text
//! TcExpr (from translation) -> [baseopt*] -> [indexify] -> Optimized TcExpr
//! ```
//!
//! Every enabled rewrite preserves the root datatype, the root column
//! tree, and the semantic set-equality of the result; [`checks`] verifies
//! the annotation invariants after each pass.

mod baseopt;
mod checks;
mod indexify;

pub use checks::{verify_rewrite, CheckError};

use tracing::debug;

use crate::columns::NamePool;
use crate::tcalc::{TcExpr, VarPool};
use crate::types::TypeManager;

/// Fixpoint driver over the rewrite rules.
pub struct Optimizer<'a> {
    tm: &'a TypeManager,
    names: &'a NamePool,
    vars: &'a VarPool,
    max_passes: usize,
    fuse_step_chains: bool,
    hits: usize,
}

impl<'a> Optimizer<'a> {
    pub fn new(tm: &'a TypeManager, names: &'a NamePool, vars: &'a VarPool) -> Optimizer<'a> {
        Optimizer {
            tm,
            names,
            vars,
            max_passes: 10,
            fuse_step_chains: false,
            hits: 0,
        }
    }

    pub fn with_max_passes(mut self, max_passes: usize) -> Self {
        self.max_passes = max_passes;
        self
    }

    /// Enable the step-chain fusion rewrite. It widens an exact n-hop
    /// chain into closure semantics, so it is opt-in.
    pub fn with_step_chain_fusion(mut self, on: bool) -> Self {
        self.fuse_step_chains = on;
        self
    }

    /// Apply `baseopt` to fixpoint, then one `indexify` pass.
    pub fn optimize(&mut self, e: TcExpr) -> TcExpr {
        let e = self.baseopt_to_fixpoint(e);
        self.indexify_once(e)
    }

    /// The `baseopt` stage alone, for staged drivers (and dumps).
    pub fn baseopt_to_fixpoint(&mut self, e: TcExpr) -> TcExpr {
        let mut current = self.baseopt(e);
        let mut current_hits = self.hits;

        for pass in 1..self.max_passes {
            current = self.baseopt(current);
            if self.hits == current_hits {
                debug!(pass, "baseopt reached fixpoint");
                break;
            }
            current_hits = self.hits;
        }
        current
    }

    /// The `indexify` stage alone.
    pub fn indexify_once(&mut self, e: TcExpr) -> TcExpr {
        self.indexify(e)
    }

    /// Rewrites applied this optimizer's lifetime; the fixpoint test.
    pub fn hits(&self) -> usize {
        self.hits
    }

    fn hit(&mut self, rule: &'static str) {
        debug!(rule, "rewrite");
        self.hits += 1;
    }
}

// ============================================================================
// Tests
// ============================================================================

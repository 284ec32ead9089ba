//! Engine Context
//!
//! A [`Context`] owns everything one engine instance shares across
//! queries: the interned type lattice, the column-name and variable pools,
//! the compile-error list, and the dump/trace buffers. Two contexts can
//! coexist; values and trees must never cross between them.
//!
//! The query lifecycle is `prepare` (optimize + verify; compile errors are
//! recorded and no handle is returned) followed by any number of `run`
//! calls against a backend. Run-time failures abort the query, record the
//! error, and report nil; the context stays usable.

use tracing::debug;

use crate::backend::Backend;
use crate::columns::NamePool;
use crate::config::Config;
use crate::execution::Evaluator;
use crate::optimizer::{verify_rewrite, Optimizer};
use crate::tcalc::{TcExpr, VarPool};
use crate::types::TypeManager;
use crate::value::Value;

/// A prepared, optimized query.
pub struct Query {
    expr: TcExpr,
}

impl Query {
    /// The optimized plan, for inspection and dumps.
    pub fn plan(&self) -> &TcExpr {
        &self.expr
    }
}

/// One engine instance.
pub struct Context {
    types: TypeManager,
    names: NamePool,
    vars: VarPool,
    config: Config,
    errors: Vec<String>,
    dumps: Vec<(String, String)>,
    trace_lines: Vec<String>,
}

impl Context {
    pub fn new() -> Context {
        Context::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Context {
        Context {
            types: TypeManager::new(),
            names: NamePool::new(),
            vars: VarPool::new(),
            config,
            errors: Vec::new(),
            dumps: Vec::new(),
            trace_lines: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // shared facilities

    pub fn types(&self) -> &TypeManager {
        &self.types
    }

    pub fn names(&self) -> &NamePool {
        &self.names
    }

    pub fn vars(&self) -> &VarPool {
        &self.vars
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Outstanding column-name records; zero once every value and tree of
    /// this context is gone. The leak check.
    pub fn live_names(&self) -> isize {
        self.names.live()
    }

    pub fn live_vars(&self) -> isize {
        self.vars.live()
    }

    // ------------------------------------------------------------------
    // errors

    pub fn post_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn num_errors(&self) -> usize {
        self.errors.len()
    }

    pub fn error_at(&self, which: usize) -> &str {
        &self.errors[which]
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    // ------------------------------------------------------------------
    // dumps and trace

    pub fn set_dumps(&mut self, onoff: bool) {
        self.config.dumps.enabled = onoff;
    }

    pub fn set_trace(&mut self, onoff: bool) {
        self.config.dumps.trace = onoff;
    }

    pub fn num_dumps(&self) -> usize {
        self.dumps.len()
    }

    pub fn dump_name(&self, which: usize) -> &str {
        &self.dumps[which].0
    }

    pub fn dump_text(&self, which: usize) -> &str {
        &self.dumps[which].1
    }

    pub fn dump_by_name(&self, name: &str) -> Option<&str> {
        self.dumps
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t.as_str())
    }

    pub fn clear_dumps(&mut self) {
        self.dumps.clear();
    }

    pub fn num_trace_lines(&self) -> usize {
        self.trace_lines.len()
    }

    pub fn trace_line(&self, which: usize) -> &str {
        &self.trace_lines[which]
    }

    pub fn clear_trace(&mut self) {
        self.trace_lines.clear();
    }

    fn record_dump(
        dumps: &mut Vec<(String, String)>,
        config: &Config,
        name: &str,
        expr: &TcExpr,
    ) {
        if config.dumps.enabled {
            let text = expr.layout().format(config.dumps.layout_width).render();
            dumps.push((name.to_owned(), text));
        }
    }

    // ------------------------------------------------------------------
    // queries

    /// Optimize a translated tuple-calculus tree into a runnable query.
    /// On failure the error is recorded and no handle is returned.
    pub fn prepare(&mut self, expr: TcExpr) -> Option<Query> {
        Self::record_dump(&mut self.dumps, &self.config, "tc", &expr);
        let before = expr.clone();

        let mut opt = Optimizer::new(&self.types, &self.names, &self.vars)
            .with_max_passes(self.config.optimizer.max_passes)
            .with_step_chain_fusion(self.config.optimizer.fuse_step_chains);

        let expr = opt.baseopt_to_fixpoint(expr);
        Self::record_dump(&mut self.dumps, &self.config, "baseopt", &expr);

        let expr = opt.indexify_once(expr);
        Self::record_dump(&mut self.dumps, &self.config, "indexify", &expr);

        debug!(rewrites = opt.hits(), "prepared query");

        // chain fusion deliberately reshapes the root; skip the shape
        // check when it is on
        if !self.config.optimizer.fuse_step_chains {
            if let Err(e) = verify_rewrite(&before, &expr) {
                self.post_error(format!("optimizer invariant violated: {}", e));
                return None;
            }
        }

        Some(Query { expr })
    }

    /// Execute a prepared query. Failures are recorded in the context's
    /// error list and reported as nil; the context stays usable.
    pub fn run(&mut self, query: &Query, backend: &mut dyn Backend) -> Value {
        if self.config.dumps.trace {
            let line = query
                .expr
                .layout()
                .format(self.config.dumps.layout_width)
                .render();
            self.trace_lines
                .push(format!("run: {}", line.lines().next().unwrap_or("")));
        }

        let mut ev = Evaluator::new(&self.types, backend);
        match ev.eval(&query.expr) {
            Ok(v) => {
                if self.config.dumps.trace {
                    self.trace_lines.push(format!("result: {}", v));
                }
                v
            }
            Err(e) => {
                self.post_error(e.to_string());
                Value::Nil
            }
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemBackend;
    use crate::tcalc::Op;

    #[test]
    fn prepare_and_run_a_constant_query() {
        let mut ctx = Context::new();
        let e = TcExpr::bop(
            TcExpr::value(Value::Int(40)),
            Op::Add,
            TcExpr::value(Value::Int(2)),
        );
        let q = ctx.prepare(e).expect("prepare");
        let mut be = MemBackend::new();
        let v = ctx.run(&q, &mut be);
        assert!(v.identical(&Value::Int(42)));
        assert_eq!(ctx.num_errors(), 0);
    }

    #[test]
    fn runtime_error_reports_nil_and_keeps_context_usable() {
        let mut ctx = Context::new();
        let bad = TcExpr::bop(
            TcExpr::value(Value::string("zzz")),
            Op::Add,
            TcExpr::value(Value::Int(1)),
        );
        let q = ctx.prepare(bad).expect("prepare");
        let mut be = MemBackend::new();
        let v = ctx.run(&q, &mut be);
        assert!(v.is_nil());
        assert_eq!(ctx.num_errors(), 1);
        assert!(ctx.error_at(0).contains("type error"));

        // the context still works
        ctx.clear_errors();
        let ok = TcExpr::value(Value::Int(1));
        let q = ctx.prepare(ok).expect("prepare");
        assert!(ctx.run(&q, &mut be).identical(&Value::Int(1)));
        assert_eq!(ctx.num_errors(), 0);
    }

    #[test]
    fn dumps_record_each_stage() {
        let mut ctx = Context::new();
        ctx.set_dumps(true);
        let e = TcExpr::bop(
            TcExpr::value(Value::Int(1)),
            Op::Add,
            TcExpr::value(Value::Int(2)),
        );
        ctx.prepare(e).expect("prepare");
        assert_eq!(ctx.num_dumps(), 3);
        assert_eq!(ctx.dump_name(0), "tc");
        assert!(ctx.dump_by_name("baseopt").is_some());
        assert!(ctx.dump_by_name("indexify").is_some());
        // the folded plan is just the constant
        assert_eq!(ctx.dump_by_name("indexify").unwrap().trim(), "3");
        ctx.clear_dumps();
        assert_eq!(ctx.num_dumps(), 0);
    }

    #[test]
    fn trace_records_runs() {
        let mut ctx = Context::new();
        ctx.set_trace(true);
        let e = TcExpr::value(Value::Int(7));
        let q = ctx.prepare(e).unwrap();
        let mut be = MemBackend::new();
        ctx.run(&q, &mut be);
        assert_eq!(ctx.num_trace_lines(), 2);
        assert!(ctx.trace_line(0).starts_with("run:"));
        assert_eq!(ctx.trace_line(1), "result: 7");
        ctx.clear_trace();
        assert_eq!(ctx.num_trace_lines(), 0);
    }

    #[test]
    fn leak_check_reaches_zero() {
        let ctx = Context::new();
        {
            let a = ctx.names().named("a");
            let tree = TcExpr::project_one(
                TcExpr::readglobal(crate::tcalc::TcGlobal::new("R")),
                a.clone(),
            );
            assert!(ctx.live_names() >= 1);
            drop(tree);
            drop(a);
        }
        assert_eq!(ctx.live_names(), 0);
        assert_eq!(ctx.live_vars(), 0);
    }
}

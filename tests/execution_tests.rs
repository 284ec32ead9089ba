//! End-to-end executor tests over the in-memory backend.

use provql::backend::PROVENANCE_GLOBAL;
use provql::columns::{ColName, ColSet, ColTree, NamePool};
use provql::tcalc::VarPool;
use provql::{Context, MemBackend, TcExpr, TcGlobal, TypeManager, Value};

/// Provenance seed -> obj0 { name="foo", input -> obj1 { name="bar" } }.
fn sample_graph() -> (MemBackend, Value, Value) {
    let tm = TypeManager::new();
    let mut be = MemBackend::new();
    let seed = be.graph_mut().newobject();
    let o0 = be.graph_mut().newobject();
    let o1 = be.graph_mut().newobject();

    let g = be.graph_mut();
    g.assign(&seed, &Value::string("obj"), &o0).unwrap();
    g.assign(&o0, &Value::string("name"), &Value::string("foo"))
        .unwrap();
    g.assign(&o0, &Value::string("input"), &o1).unwrap();
    g.assign(&o1, &Value::string("name"), &Value::string("bar"))
        .unwrap();

    be.bind_global(PROVENANCE_GLOBAL, Value::set_from(&tm, vec![seed]));
    (be, o0, o1)
}

fn step_tree(prefix: &ColTree, l: &ColName, e: &ColName, r: &ColName) -> ColTree {
    let mut subs = match prefix {
        t if t.istuple() => (0..t.num()).map(|i| t.get(i).clone()).collect::<Vec<_>>(),
        t => vec![t.clone()],
    };
    subs.push(ColTree::scalar(Some(l.clone())));
    subs.push(ColTree::scalar(Some(e.clone())));
    subs.push(ColTree::scalar(Some(r.clone())));
    ColTree::tuple(None, subs)
}

#[test]
fn two_hop_step_reaches_the_input_object() {
    let (mut be, _o0, o1) = sample_graph();
    let mut ctx = Context::new();
    let names = NamePool::new();

    let p = names.named("p");
    let (l1, e1, r1) = (names.named("l1"), names.named("e1"), names.named("r1"));
    let (l2, e2, r2) = (names.named("l2"), names.named("e2"), names.named("r2"));
    let (l3, e3, r3) = (names.named("l3"), names.named("e3"), names.named("r3"));

    let prov = TcExpr::readglobal(TcGlobal::new(PROVENANCE_GLOBAL))
        .with_cols(ColTree::scalar(Some(p.clone())));
    let t0 = ColTree::scalar(Some(p.clone()));

    let t1 = step_tree(&t0, &l1, &e1, &r1);
    let step1 = TcExpr::step(
        prov,
        p.clone(),
        Some(Value::string("obj")),
        false,
        l1.clone(),
        e1.clone(),
        r1.clone(),
        None,
    )
    .with_cols(t1.clone());

    let t2 = step_tree(&t1, &l2, &e2, &r2);
    let step2 = TcExpr::step(
        step1,
        r1.clone(),
        Some(Value::string("input")),
        false,
        l2.clone(),
        e2.clone(),
        r2.clone(),
        None,
    )
    .with_cols(t2.clone());

    let t3 = step_tree(&t2, &l3, &e3, &r3);
    let step3 = TcExpr::step(
        step2,
        r2.clone(),
        Some(Value::string("name")),
        false,
        l3.clone(),
        e3.clone(),
        r3.clone(),
        None,
    )
    .with_cols(t3.clone());

    let q = ctx.prepare(step3).expect("prepare");
    let out = ctx.run(&q, &mut be);
    assert_eq!(ctx.num_errors(), 0, "errors: {:?}", ctx.error_at(0));

    assert_eq!(out.set_num(), 1);
    let row = out.set_get(0);
    // rightcol of the second hop is object 1
    let r2_ix = t3.find(&r2).unwrap();
    assert!(row.tuple_get(r2_ix).identical(&o1));
    // and its name column reads "bar"
    let r3_ix = t3.find(&r3).unwrap();
    assert_eq!(row.tuple_get(r3_ix).to_string(), "bar");
}

#[test]
fn step_with_no_edge_follows_everything() {
    let (mut be, o0, _o1) = sample_graph();
    let mut ctx = Context::new();
    let names = NamePool::new();
    let tm = TypeManager::new();

    let s = names.named("s");
    let (l, e, r) = (names.named("l"), names.named("e"), names.named("r"));
    let sub = TcExpr::value(Value::set_from(&tm, vec![o0]))
        .with_cols(ColTree::scalar(Some(s.clone())));
    let step = TcExpr::step(
        sub,
        s.clone(),
        None,
        false,
        l.clone(),
        e.clone(),
        r.clone(),
        None,
    );

    let q = ctx.prepare(step).unwrap();
    let out = ctx.run(&q, &mut be);
    // object 0 carries two edges: name and input
    assert_eq!(out.set_num(), 2);
}

#[test]
fn reversed_step_finds_the_source() {
    let (mut be, o0, o1) = sample_graph();
    let mut ctx = Context::new();
    let names = NamePool::new();
    let tm = TypeManager::new();

    let s = names.named("s");
    let (l, e, r) = (names.named("l"), names.named("e"), names.named("r"));
    let sub = TcExpr::value(Value::set_from(&tm, vec![o1]))
        .with_cols(ColTree::scalar(Some(s.clone())));
    let tree = step_tree(&ColTree::scalar(Some(s.clone())), &l, &e, &r);
    let step = TcExpr::step(
        sub,
        s.clone(),
        Some(Value::string("input")),
        true,
        l.clone(),
        e.clone(),
        r.clone(),
        None,
    )
    .with_cols(tree.clone());

    let q = ctx.prepare(step).unwrap();
    let out = ctx.run(&q, &mut be);
    assert_eq!(out.set_num(), 1);
    let row = out.set_get(0);
    let r_ix = tree.find(&r).unwrap();
    assert!(row.tuple_get(r_ix).identical(&o0));
}

#[test]
fn nest_then_unnest_is_identity_on_the_data() {
    let mut ctx = Context::new();
    let names = NamePool::new();
    let tm = TypeManager::new();
    let mut be = MemBackend::new();

    let (a, b, g) = (names.named("a"), names.named("b"), names.named("g"));
    let rows = Value::set_from(
        &tm,
        vec![
            Value::pair(Value::Int(1), Value::string("x")),
            Value::pair(Value::Int(1), Value::string("y")),
            Value::pair(Value::Int(2), Value::string("z")),
        ],
    );
    let base_tree = ColTree::pair_of(a.clone(), b.clone());
    let sub = TcExpr::value(rows.clone()).with_cols(base_tree.clone());

    let nest_tree = base_tree.nest(&ColSet::singleton(b.clone()), Some(g.clone()));
    let nested = TcExpr::nest(sub, ColSet::singleton(b.clone()), g.clone())
        .with_cols(nest_tree.clone());
    let unnested = TcExpr::unnest(nested, g.clone());

    let q = ctx.prepare(unnested).unwrap();
    let out = ctx.run(&q, &mut be);
    assert_eq!(ctx.num_errors(), 0);

    // equal as a multiset
    assert_eq!(out.set_num(), rows.set_num());
    let mut got: Vec<Value> = out.coll_members().to_vec();
    let mut want: Vec<Value> = rows.coll_members().to_vec();
    got.sort_by(|x, y| x.compare(y));
    want.sort_by(|x, y| x.compare(y));
    for (g_, w) in got.iter().zip(&want) {
        assert!(g_.identical(w), "{} != {}", g_, w);
    }
}

#[test]
fn nest_then_unnest_through_the_interpreter_alone() {
    // bypass the optimizer (which fuses the inverse pair away) and check
    // the executor's own nest/unnest path
    let names = NamePool::new();
    let tm = TypeManager::new();
    let mut be = MemBackend::new();

    let (a, b, g) = (names.named("a"), names.named("b"), names.named("g"));
    let rows = Value::set_from(
        &tm,
        vec![
            Value::pair(Value::Int(1), Value::string("x")),
            Value::pair(Value::Int(1), Value::string("y")),
            Value::pair(Value::Int(2), Value::string("z")),
        ],
    );
    let base_tree = ColTree::pair_of(a.clone(), b.clone());
    let sub = TcExpr::value(rows.clone()).with_cols(base_tree.clone());
    let nest_tree = base_tree.nest(&ColSet::singleton(b.clone()), Some(g.clone()));
    let nested =
        TcExpr::nest(sub, ColSet::singleton(b.clone()), g.clone()).with_cols(nest_tree);
    let unnested = TcExpr::unnest(nested, g.clone());

    let mut ev = provql::Evaluator::new(&tm, &mut be);
    let out = ev.eval(&unnested).unwrap();

    assert_eq!(out.set_num(), rows.set_num());
    let mut got: Vec<Value> = out.coll_members().to_vec();
    let mut want: Vec<Value> = rows.coll_members().to_vec();
    got.sort_by(|x, y| x.compare(y));
    want.sort_by(|x, y| x.compare(y));
    for (g_, w) in got.iter().zip(&want) {
        assert!(g_.identical(w), "{} != {}", g_, w);
    }
}

#[test]
fn nest_groups_by_remaining_columns() {
    let mut ctx = Context::new();
    let names = NamePool::new();
    let tm = TypeManager::new();
    let mut be = MemBackend::new();

    let (a, b, g) = (names.named("a"), names.named("b"), names.named("g"));
    let rows = Value::set_from(
        &tm,
        vec![
            Value::pair(Value::Int(1), Value::string("x")),
            Value::pair(Value::Int(1), Value::string("y")),
            Value::pair(Value::Int(2), Value::string("z")),
        ],
    );
    let sub = TcExpr::value(rows).with_cols(ColTree::pair_of(a.clone(), b.clone()));
    let nested = TcExpr::nest(sub, ColSet::singleton(b.clone()), g.clone());

    let q = ctx.prepare(nested).unwrap();
    let out = ctx.run(&q, &mut be);
    assert_eq!(out.set_num(), 2);
    assert_eq!(out.set_get(0).to_string(), "(1, {x, y})");
    assert_eq!(out.set_get(1).to_string(), "(2, {z})");
}

#[test]
fn order_then_uniq_deduplicates_globally() {
    let mut ctx = Context::new();
    let names = NamePool::new();
    let tm = TypeManager::new();
    let mut be = MemBackend::new();

    let a = names.named("a");
    let rows = Value::set_from(
        &tm,
        vec![
            Value::Int(3),
            Value::Int(1),
            Value::Int(3),
            Value::Int(2),
            Value::Int(1),
        ],
    );
    let tree = ColTree::scalar(Some(a.clone()));
    let sub = TcExpr::value(rows).with_cols(tree.clone());
    let ordered = TcExpr::order(sub, ColSet::singleton(a.clone())).with_cols(tree.clone());
    let uniqued = TcExpr::uniq(ordered, ColSet::singleton(a.clone()));

    let q = ctx.prepare(uniqued).unwrap();
    let out = ctx.run(&q, &mut be);
    assert_eq!(out.to_string(), "{1, 2, 3}");
}

#[test]
fn scan_yields_every_triple() {
    let (mut be, _o0, _o1) = sample_graph();
    let mut ctx = Context::new();
    let names = NamePool::new();

    let (l, e, r) = (names.named("l"), names.named("e"), names.named("r"));
    let scan = TcExpr::scan(l.clone(), e.clone(), r.clone(), None);
    let q = ctx.prepare(scan).unwrap();
    let out = ctx.run(&q, &mut be);
    // four assignments in the sample graph
    assert_eq!(out.set_num(), 4);
    for row in out.coll_members() {
        assert_eq!(row.tuple_arity(), 3);
        assert!(row.tuple_get(0).is_struct());
    }
}

#[test]
fn repeat_reaches_the_transitive_closure() {
    let mut ctx = Context::new();
    let names = NamePool::new();
    let vars = VarPool::new();
    let tm = TypeManager::new();
    let mut be = MemBackend::new();

    // o0 -input-> o1 -input-> o2
    let o0 = be.graph_mut().newobject();
    let o1 = be.graph_mut().newobject();
    let o2 = be.graph_mut().newobject();
    be.graph_mut()
        .assign(&o0, &Value::string("input"), &o1)
        .unwrap();
    be.graph_mut()
        .assign(&o1, &Value::string("input"), &o2)
        .unwrap();

    let s_end = names.named("s");
    let sub = TcExpr::value(Value::set_from(&tm, vec![o0.clone()]))
        .with_cols(ColTree::scalar(Some(s_end.clone())));

    // body: step one input edge from the frontier, package the step as a
    // path element, and report (start, path, end)
    let loopvar = vars.fresh();
    let (bs, bl, be_, br, bp) = (
        names.named("bs"),
        names.named("bl"),
        names.named("be"),
        names.named("br"),
        names.named("bp"),
    );
    let frontier =
        TcExpr::readvar(loopvar.clone()).with_cols(ColTree::scalar(Some(bs.clone())));
    let step = TcExpr::step(
        frontier,
        bs.clone(),
        Some(Value::string("input")),
        false,
        bl.clone(),
        be_.clone(),
        br.clone(),
        None,
    )
    .with_cols(ColTree::tuple(
        None,
        vec![
            ColTree::scalar(Some(bs.clone())),
            ColTree::scalar(Some(bl.clone())),
            ColTree::scalar(Some(be_.clone())),
            ColTree::scalar(Some(br.clone())),
        ],
    ));
    let rowvar = vars.fresh();
    let rowtree = ColTree::tuple(
        None,
        vec![
            ColTree::scalar(Some(bs.clone())),
            ColTree::scalar(Some(bl.clone())),
            ColTree::scalar(Some(be_.clone())),
            ColTree::scalar(Some(br.clone())),
        ],
    );
    let read_row = || TcExpr::readvar(rowvar.clone()).with_cols(rowtree.clone());
    let mkpath = TcExpr::lambda(
        rowvar.clone(),
        TcExpr::createpathelement(TcExpr::tuple(
            vec![
                TcExpr::project_one(read_row(), bl.clone()),
                TcExpr::project_one(read_row(), be_.clone()),
                TcExpr::project_one(read_row(), br.clone()),
            ],
            ColSet::triple(bl.clone(), be_.clone(), br.clone()),
        )),
    );
    let with_path = TcExpr::adjoin(step, mkpath, bp.clone()).with_cols(ColTree::tuple(
        None,
        vec![
            ColTree::scalar(Some(bs.clone())),
            ColTree::scalar(Some(bl.clone())),
            ColTree::scalar(Some(be_.clone())),
            ColTree::scalar(Some(br.clone())),
            ColTree::scalar(Some(bp.clone())),
        ],
    ));
    let body = TcExpr::project(
        with_path,
        ColSet::triple(bs.clone(), bp.clone(), br.clone()),
    )
    .with_cols(ColTree::tuple(
        None,
        vec![
            ColTree::scalar(Some(bs.clone())),
            ColTree::scalar(Some(bp.clone())),
            ColTree::scalar(Some(br.clone())),
        ],
    ));

    let (rpath, rend) = (names.named("rpath"), names.named("rend"));
    let repeat = TcExpr::repeat(
        sub,
        s_end.clone(),
        loopvar,
        bs.clone(),
        body,
        bp.clone(),
        br.clone(),
        rpath.clone(),
        rend.clone(),
    );

    let q = ctx.prepare(repeat).unwrap();
    let out = ctx.run(&q, &mut be);
    assert_eq!(ctx.num_errors(), 0, "errors: {:?}", ctx.error_at(0));

    // endpoints o1 (one hop) and o2 (two hops)
    assert_eq!(out.set_num(), 2);
    let mut endpoints: Vec<String> = Vec::new();
    for row in out.coll_members() {
        // row = (start, path, endpoint)
        assert_eq!(row.tuple_arity(), 3);
        let path = row.tuple_get(1);
        let end = row.tuple_get(2);
        assert!(path.is_sequence());
        endpoints.push(end.to_string());
        if end.identical(&o1) {
            assert_eq!(path.sequence_num(), 1);
        }
        if end.identical(&o2) {
            assert_eq!(path.sequence_num(), 2);
        }
    }
    endpoints.sort();
    assert_eq!(endpoints, vec![o1.to_string(), o2.to_string()]);
}

#[test]
fn adjoin_appends_a_computed_column() {
    let mut ctx = Context::new();
    let names = NamePool::new();
    let vars = VarPool::new();
    let tm = TypeManager::new();
    let mut be = MemBackend::new();

    let a = names.named("a");
    let d = names.named("d");
    let rows = Value::set_from(&tm, vec![Value::Int(2), Value::Int(5)]);
    let sub = TcExpr::value(rows).with_cols(ColTree::scalar(Some(a.clone())));
    let v = vars.fresh();
    let doubler = TcExpr::lambda(
        v.clone(),
        TcExpr::bop(
            TcExpr::project_one(
                TcExpr::readvar(v.clone()).with_cols(ColTree::scalar(Some(a.clone()))),
                a.clone(),
            ),
            provql::Op::Mul,
            TcExpr::value(Value::Int(2)),
        ),
    );
    let adjoined = TcExpr::adjoin(sub, doubler, d.clone());

    let q = ctx.prepare(adjoined).unwrap();
    let out = ctx.run(&q, &mut be);
    assert_eq!(ctx.num_errors(), 0, "errors: {:?}", ctx.error_at(0));
    assert_eq!(out.to_string(), "{(2, 4), (5, 10)}");
}

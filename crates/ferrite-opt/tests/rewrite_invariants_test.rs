//! Rewrite invariants: idempotence, determinism, protection, conservatism

use anyhow::Result;

use ferrite_ir::annotations::{apply_annotations, parse_annotations};
use ferrite_ir::prelude::*;
use ferrite_opt::constprop::{ConstProp, ConstPropError, ConstPropStats};

fn u8_ty() -> Type {
    Type::UInt(Some(8))
}

fn connect_to(circuit: &Circuit, module: ModuleId, dest: ValueId) -> Option<OpId> {
    circuit
        .module(module)
        .body()
        .find(|&op| matches!(circuit.op(op).kind, OpKind::Connect) && circuit.op(op).operands[0] == dest)
}

/// A two-level hierarchy with a foldable register, used by the
/// determinism and idempotence checks.
fn build_hierarchy() -> Result<Circuit> {
    let mut circuit = Circuit::new("Fixture");

    let child = circuit.add_module(
        "Child",
        false,
        vec![
            PortDecl::input("clk", Type::Clock),
            PortDecl::input("in", u8_ty()),
            PortDecl::output("out", Type::UInt(Some(9))),
        ],
    );
    let clk = circuit.module(child).ports()[0].value;
    let input = circuit.module(child).ports()[1].value;
    let out = circuit.module(child).ports()[2].value;
    let one = circuit.add_constant(child, IntAttr::uint(8, 1));
    let reg = circuit.add_reg(child, "_state", u8_ty(), clk, NameKind::Droppable);
    circuit.add_connect(child, reg, input);
    let sum = circuit.add_prim(child, PrimOp::Add, &[reg, one])?;
    circuit.add_connect(child, out, sum);

    let top = circuit.add_module(
        "Top",
        true,
        vec![
            PortDecl::input("clk", Type::Clock),
            PortDecl::output("result", Type::UInt(Some(9))),
        ],
    );
    let top_clk = circuit.module(top).ports()[0].value;
    let result = circuit.module(top).ports()[1].value;
    let inst = circuit.add_instance(top, "c0", child);
    let inst_clk = circuit.op(inst).results[0];
    let inst_in = circuit.op(inst).results[1];
    let inst_out = circuit.op(inst).results[2];
    let six = circuit.add_constant(top, IntAttr::uint(8, 6));
    circuit.add_connect(top, inst_clk, top_clk);
    circuit.add_connect(top, inst_in, six);
    circuit.add_connect(top, result, inst_out);

    Ok(circuit)
}

#[test]
fn test_repeated_runs_are_deterministic() -> Result<()> {
    let mut first = build_hierarchy()?;
    let mut second = build_hierarchy()?;

    let stats_first = ConstProp::new().run(&mut first).unwrap();
    let stats_second = ConstProp::new().run(&mut second).unwrap();

    assert_eq!(stats_first, stats_second);
    assert_eq!(print_circuit(&first), print_circuit(&second));
    Ok(())
}

/// Re-applying the rewrite for the same converged lattice map changes
/// nothing the second time.
#[test]
fn test_rewrite_is_idempotent() -> Result<()> {
    let mut circuit = build_hierarchy()?;
    let pass = ConstProp::new();

    let analysis = pass.analyze(&circuit).unwrap();
    pass.rewrite(&mut circuit, &analysis);
    let after_first = print_circuit(&circuit);

    pass.rewrite(&mut circuit, &analysis);
    let after_second = print_circuit(&circuit);

    assert_eq!(after_first, after_second);
    Ok(())
}

/// A protected wire driven by a literal stays overdefined: never deleted,
/// never substituted at its uses.
#[test]
fn test_protected_wire_is_untouchable() {
    let mut circuit = Circuit::new("Guard");
    let top = circuit.add_module("Guard", true, vec![PortDecl::output("out", u8_ty())]);
    let out = circuit.module(top).ports()[0].value;
    let five = circuit.add_constant(top, IntAttr::uint(8, 5));
    let state = circuit.add_wire(top, "state", u8_ty(), NameKind::Interesting);
    circuit.add_connect(top, state, five);
    circuit.add_connect(top, out, state);

    let annotations = parse_annotations(
        r#"[{"class": "ferrite.DontTouchAnnotation", "target": "~Guard|Guard>state"}]"#,
    )
    .unwrap();
    apply_annotations(&mut circuit, &annotations).unwrap();

    let analysis = ConstProp::new().analyze(&circuit).unwrap();
    assert!(analysis.lattice_of(state).is_overdefined());

    ConstProp::new().run(&mut circuit).unwrap();

    assert!(circuit
        .module(top)
        .body()
        .any(|op| matches!(circuit.op(op).kind, OpKind::Wire { .. })));
    // Both the driver and the reader survive, still referencing the wire.
    assert!(connect_to(&circuit, top, state).is_some());
    let reader = connect_to(&circuit, top, out).unwrap();
    assert_eq!(circuit.op(reader).operands[1], state);
}

/// An interesting name alone blocks deletion but not constant forwarding:
/// readers fold, the declaration and its driver stay.
#[test]
fn test_named_wire_keeps_driver_but_readers_fold() {
    let mut circuit = Circuit::new("Named");
    let top = circuit.add_module("Named", true, vec![PortDecl::output("out", u8_ty())]);
    let out = circuit.module(top).ports()[0].value;
    let five = circuit.add_constant(top, IntAttr::uint(8, 5));
    let state = circuit.add_wire(top, "state", u8_ty(), NameKind::Interesting);
    circuit.add_connect(top, state, five);
    circuit.add_connect(top, out, state);

    ConstProp::new().run(&mut circuit).unwrap();

    assert!(connect_to(&circuit, top, state).is_some(), "driver survives");
    let reader = connect_to(&circuit, top, out).unwrap();
    let src = circuit.op(reader).operands[1];
    assert_ne!(src, state, "reader was redirected to a constant");
    let src_def = circuit.defining_op(src).unwrap();
    assert!(matches!(circuit.op(src_def).kind, OpKind::Constant(_)));
}

/// Aggregate-typed registers are out of the precise domain: no folding,
/// no diagnostics.
#[test]
fn test_aggregate_register_never_folds() {
    let mut circuit = Circuit::new("Agg");
    let bundle = Type::Bundle(vec![BundleField {
        name: "v".into(),
        flip: false,
        ty: u8_ty(),
    }]);
    let top = circuit.add_module(
        "Agg",
        true,
        vec![
            PortDecl::input("clk", Type::Clock),
            PortDecl::output("out", u8_ty()),
        ],
    );
    let clk = circuit.module(top).ports()[0].value;
    let out = circuit.module(top).ports()[1].value;

    let reg = circuit.add_reg(top, "_r", bundle, clk, NameKind::Droppable);
    let field_w = circuit.add_subfield(top, reg, 0).unwrap();
    let field_r = circuit.add_subfield(top, reg, 0).unwrap();
    let seven = circuit.add_constant(top, IntAttr::uint(8, 7));
    circuit.add_connect(top, field_w, seven);
    circuit.add_connect(top, out, field_r);

    let analysis = ConstProp::new().analyze(&circuit).unwrap();
    assert!(analysis.lattice_of(reg).is_overdefined());
    assert!(analysis.lattice_of(field_r).is_overdefined());

    let stats = ConstProp::new().run(&mut circuit).unwrap();
    assert_eq!(stats, ConstPropStats::default());
    assert!(circuit
        .module(top)
        .body()
        .any(|op| matches!(circuit.op(op).kind, OpKind::Reg { .. })));
}

/// Drives into memory sub-elements carry no information and are ignored
/// without complaint.
#[test]
fn test_memory_drives_are_ignored() {
    let mut circuit = Circuit::new("Mem");
    let port_ty = Type::Bundle(vec![BundleField {
        name: "data".into(),
        flip: false,
        ty: u8_ty(),
    }]);
    let top = circuit.add_module("Mem", true, vec![PortDecl::output("out", u8_ty())]);
    let out = circuit.module(top).ports()[0].value;

    let mem = circuit.add_mem(top, "table", vec![port_ty]);
    let mem_port = circuit.op(mem).results[0];
    let data = circuit.add_subfield(top, mem_port, 0).unwrap();
    let five = circuit.add_constant(top, IntAttr::uint(8, 5));
    circuit.add_connect(top, data, five);
    circuit.add_connect(top, out, data);

    let analysis = ConstProp::new().analyze(&circuit).unwrap();
    assert!(analysis.lattice_of(mem_port).is_overdefined());
    // The drive into the memory leaves the literal itself precise.
    assert!(analysis.lattice_of(five).is_constant());

    ConstProp::new().run(&mut circuit).unwrap();
    assert!(circuit
        .module(top)
        .body()
        .any(|op| matches!(circuit.op(op).kind, OpKind::Mem { .. })));
}

/// A connect aimed at something that is not a storage location is a
/// malformed input: hard error, circuit untouched.
#[test]
fn test_unhandled_connect_destination_is_fatal() {
    let mut circuit = Circuit::new("Bad");
    let top = circuit.add_module("Bad", true, vec![]);
    let one = circuit.add_constant(top, IntAttr::uint(8, 1));
    let renamed = circuit.add_node(top, "n", one, NameKind::Droppable);
    circuit.add_connect(top, renamed, one);

    let before = print_circuit(&circuit);
    let err = ConstProp::new().run(&mut circuit).unwrap_err();
    assert!(matches!(err, ConstPropError::UnhandledConnect { .. }));
    assert_eq!(print_circuit(&circuit), before, "failed runs leave no trace");
}

/// Modules unreachable from any public root are never analyzed or
/// rewritten.
#[test]
fn test_unreachable_module_left_alone() {
    let mut circuit = Circuit::new("Orphaned");
    let orphan = circuit.add_module("Orphan", false, vec![]);
    let three = circuit.add_constant(orphan, IntAttr::uint(8, 3));
    let w = circuit.add_wire(orphan, "_w", u8_ty(), NameKind::Droppable);
    circuit.add_connect(orphan, w, three);
    circuit.add_module("Top", true, vec![]);

    let analysis = ConstProp::new().analyze(&circuit).unwrap();
    assert!(!analysis.is_executable(orphan));
    assert!(analysis.lattice_of(w).is_unknown());

    ConstProp::new().run(&mut circuit).unwrap();
    assert_eq!(circuit.module(orphan).body().count(), 3);
}

/// Serialized statistics are stable for downstream tooling.
#[test]
fn test_stats_serialize() -> Result<()> {
    let mut circuit = build_hierarchy()?;
    let stats = ConstProp::new().run(&mut circuit).unwrap();
    let json = serde_json::to_value(stats)?;
    assert!(json.get("ops_folded").is_some());
    assert!(json.get("ops_erased").is_some());
    Ok(())
}

//! Cross-module constant propagation scenarios

use ferrite_ir::prelude::*;
use ferrite_opt::constprop::{ConstProp, LatticeValue};

fn u8_ty() -> Type {
    Type::UInt(Some(8))
}

fn kinds(circuit: &Circuit, module: ModuleId) -> Vec<OpKind> {
    circuit
        .module(module)
        .body()
        .map(|op| circuit.op(op).kind.clone())
        .collect()
}

fn count_connects(circuit: &Circuit, module: ModuleId) -> usize {
    kinds(circuit, module)
        .iter()
        .filter(|k| matches!(k, OpKind::Connect))
        .count()
}

/// The connect feeding a given destination, if any survives.
fn connect_to(circuit: &Circuit, module: ModuleId, dest: ValueId) -> Option<OpId> {
    circuit
        .module(module)
        .body()
        .find(|&op| matches!(circuit.op(op).kind, OpKind::Connect) && circuit.op(op).operands[0] == dest)
}

/// A literal `7` reaches a register through a pass-through rename and a
/// reset whose enable is a literal `1`; the register and every consumer
/// collapse to `7`, and the register-driving connect disappears.
#[test]
fn test_constant_through_rename_and_reset_register() {
    let mut circuit = Circuit::new("TestA");

    let child = circuit.add_module(
        "Child",
        false,
        vec![
            PortDecl::input("clk", Type::Clock),
            PortDecl::input("in", u8_ty()),
            PortDecl::output("out", u8_ty()),
        ],
    );
    let child_clk = circuit.module(child).ports()[0].value;
    let child_in = circuit.module(child).ports()[1].value;
    let child_out = circuit.module(child).ports()[2].value;

    let one = circuit.add_constant(child, IntAttr::uint(1, 1));
    let renamed = circuit.add_node(child, "_renamed", child_in, NameKind::Droppable);
    let reg = circuit.add_reg_reset(
        child,
        "_r",
        u8_ty(),
        child_clk,
        one,
        renamed,
        NameKind::Droppable,
    );
    circuit.add_connect(child, reg, renamed);
    circuit.add_connect(child, child_out, reg);

    let top = circuit.add_module(
        "Top",
        true,
        vec![
            PortDecl::input("clk", Type::Clock),
            PortDecl::output("result", u8_ty()),
        ],
    );
    let top_clk = circuit.module(top).ports()[0].value;
    let top_result = circuit.module(top).ports()[1].value;

    let inst = circuit.add_instance(top, "c0", child);
    let inst_clk = circuit.op(inst).results[0];
    let inst_in = circuit.op(inst).results[1];
    let inst_out = circuit.op(inst).results[2];
    let seven = circuit.add_constant(top, IntAttr::uint(8, 7));
    circuit.add_connect(top, inst_clk, top_clk);
    circuit.add_connect(top, inst_in, seven);
    circuit.add_connect(top, top_result, inst_out);

    let analysis = ConstProp::new().analyze(&circuit).unwrap();
    assert_eq!(
        analysis.lattice_of(reg),
        &LatticeValue::Constant(IntAttr::uint(8, 7))
    );
    assert_eq!(
        analysis.lattice_of(inst_out),
        &LatticeValue::Constant(IntAttr::uint(8, 7))
    );
    // Public output stays pinned at overdefined regardless.
    assert!(analysis.lattice_of(top_result).is_overdefined());

    let stats = ConstProp::new().run(&mut circuit).unwrap();
    assert!(stats.ops_folded >= 1);
    assert!(stats.ops_erased >= 2);

    // The register and its driving connect are gone.
    assert!(!kinds(&circuit, child)
        .iter()
        .any(|k| matches!(k, OpKind::RegReset { .. })));
    // Only the port-driving connect survives in the child.
    assert_eq!(count_connects(&circuit, child), 1);
    let out_connect = connect_to(&circuit, child, child_out).unwrap();
    let out_src = circuit.op(out_connect).operands[1];
    let src_def = circuit.defining_op(out_src).unwrap();
    assert!(matches!(circuit.op(src_def).kind, OpKind::Constant(_)));

    // The parent's consumer sees a materialized 7, not the instance port.
    let result_connect = connect_to(&circuit, top, top_result).unwrap();
    let result_src = circuit.op(result_connect).operands[1];
    let result_def = circuit.defining_op(result_src).unwrap();
    match &circuit.op(result_def).kind {
        OpKind::Constant(attr) => assert_eq!(attr.as_u128(), 7),
        other => panic!("expected a materialized constant, got {other:?}"),
    }
}

/// Two instantiation sites drive the same port with `3` and `4`: the
/// formal port goes overdefined and nothing is materialized for it.
#[test]
fn test_conflicting_drivers_across_sites_saturate() {
    let mut circuit = Circuit::new("TestB");

    let sink = circuit.add_module(
        "Sink",
        false,
        vec![PortDecl::input("in", u8_ty()), PortDecl::output("out", u8_ty())],
    );
    let sink_in = circuit.module(sink).ports()[0].value;
    let sink_out = circuit.module(sink).ports()[1].value;
    circuit.add_connect(sink, sink_out, sink_in);

    let top = circuit.add_module(
        "Top",
        true,
        vec![
            PortDecl::output("o1", u8_ty()),
            PortDecl::output("o2", u8_ty()),
        ],
    );
    let o1 = circuit.module(top).ports()[0].value;
    let o2 = circuit.module(top).ports()[1].value;

    let three = circuit.add_constant(top, IntAttr::uint(8, 3));
    let four = circuit.add_constant(top, IntAttr::uint(8, 4));
    let i0 = circuit.add_instance(top, "s0", sink);
    let i1 = circuit.add_instance(top, "s1", sink);
    let i0_in = circuit.op(i0).results[0];
    let i0_out = circuit.op(i0).results[1];
    let i1_in = circuit.op(i1).results[0];
    let i1_out = circuit.op(i1).results[1];
    circuit.add_connect(top, i0_in, three);
    circuit.add_connect(top, i1_in, four);
    circuit.add_connect(top, o1, i0_out);
    circuit.add_connect(top, o2, i1_out);

    let analysis = ConstProp::new().analyze(&circuit).unwrap();
    // Each site keeps its local view; the formal port sees both and
    // saturates, as does everything downstream of it.
    assert_eq!(
        analysis.lattice_of(i0_in),
        &LatticeValue::Constant(IntAttr::uint(8, 3))
    );
    assert_eq!(
        analysis.lattice_of(i1_in),
        &LatticeValue::Constant(IntAttr::uint(8, 4))
    );
    assert!(analysis.lattice_of(sink_in).is_overdefined());
    assert!(analysis.lattice_of(sink_out).is_overdefined());
    assert!(analysis.lattice_of(i0_out).is_overdefined());
    assert!(analysis.lattice_of(i1_out).is_overdefined());

    ConstProp::new().run(&mut circuit).unwrap();

    // The parent outputs still read the instance ports, not constants.
    for (port, inst) in [(o1, i0), (o2, i1)] {
        let connect = connect_to(&circuit, top, port).unwrap();
        let src = circuit.op(connect).operands[1];
        assert_eq!(circuit.defining_op(src), Some(inst));
    }
}

/// One site drives a child whose output is a constant: the constant flows
/// out of the child into the parent's consumers.
#[test]
fn test_output_port_forwards_to_site() {
    let mut circuit = Circuit::new("TestFwd");

    let src_mod = circuit.add_module("Source", false, vec![PortDecl::output("out", u8_ty())]);
    let source_out = circuit.module(src_mod).ports()[0].value;
    let three = circuit.add_constant(src_mod, IntAttr::uint(8, 3));
    circuit.add_connect(src_mod, source_out, three);

    let top = circuit.add_module("Top", true, vec![PortDecl::output("result", u8_ty())]);
    let result = circuit.module(top).ports()[0].value;
    let inst = circuit.add_instance(top, "s0", src_mod);
    let inst_out = circuit.op(inst).results[0];
    let renamed = circuit.add_node(top, "_n", inst_out, NameKind::Droppable);
    circuit.add_connect(top, result, renamed);

    let analysis = ConstProp::new().analyze(&circuit).unwrap();
    assert_eq!(
        analysis.lattice_of(renamed),
        &LatticeValue::Constant(IntAttr::uint(8, 3))
    );

    ConstProp::new().run(&mut circuit).unwrap();

    // The node collapsed; the port connect reads a constant.
    assert!(!kinds(&circuit, top).iter().any(|k| matches!(k, OpKind::Node { .. })));
    let connect = connect_to(&circuit, top, result).unwrap();
    let src_def = circuit.defining_op(circuit.op(connect).operands[1]).unwrap();
    assert!(matches!(circuit.op(src_def).kind, OpKind::Constant(_)));
}

/// External definitions are opaque: their outputs never fold.
#[test]
fn test_external_module_results_stay_opaque() {
    let mut circuit = Circuit::new("TestExt");

    let ext = circuit.add_extern_module("Analog", vec![PortDecl::output("out", u8_ty())]);
    let top = circuit.add_module("Top", true, vec![PortDecl::output("result", u8_ty())]);
    let result = circuit.module(top).ports()[0].value;
    let inst = circuit.add_instance(top, "a0", ext);
    let inst_out = circuit.op(inst).results[0];
    circuit.add_connect(top, result, inst_out);

    let analysis = ConstProp::new().analyze(&circuit).unwrap();
    assert!(analysis.lattice_of(inst_out).is_overdefined());

    ConstProp::new().run(&mut circuit).unwrap();
    let connect = connect_to(&circuit, top, result).unwrap();
    assert_eq!(circuit.op(connect).operands[1], inst_out);
}

/// A reset whose enable is a literal zero contributes nothing; the
/// register takes the connected value instead.
#[test]
fn test_disabled_reset_contributes_nothing() {
    let mut circuit = Circuit::new("TestReset");

    let top = circuit.add_module(
        "Top",
        true,
        vec![
            PortDecl::input("clk", Type::Clock),
            PortDecl::output("out", u8_ty()),
        ],
    );
    let clk = circuit.module(top).ports()[0].value;
    let out = circuit.module(top).ports()[1].value;

    let zero = circuit.add_constant(top, IntAttr::uint(1, 0));
    let nine = circuit.add_constant(top, IntAttr::uint(8, 9));
    let seven = circuit.add_constant(top, IntAttr::uint(8, 7));
    let reg = circuit.add_reg_reset(top, "_r", u8_ty(), clk, zero, nine, NameKind::Droppable);
    circuit.add_connect(top, reg, seven);
    circuit.add_connect(top, out, reg);

    let analysis = ConstProp::new().analyze(&circuit).unwrap();
    assert_eq!(
        analysis.lattice_of(reg),
        &LatticeValue::Constant(IntAttr::uint(8, 7))
    );
}

/// A chain of primitive folds collapses to one materialized constant.
#[test]
fn test_primitive_chain_folds() {
    let mut circuit = Circuit::new("TestChain");

    let top = circuit.add_module("Top", true, vec![PortDecl::output("out", u8_ty())]);
    let out = circuit.module(top).ports()[0].value;

    let two = circuit.add_constant(top, IntAttr::uint(8, 2));
    let three = circuit.add_constant(top, IntAttr::uint(8, 3));
    // add : UInt<9> = 5, shl 2 : UInt<11> = 20, bits 7..0 : UInt<8> = 20
    let sum = circuit.add_prim(top, PrimOp::Add, &[two, three]).unwrap();
    let shifted = circuit.add_prim(top, PrimOp::Shl(2), &[sum]).unwrap();
    let low = circuit.add_prim(top, PrimOp::Bits(7, 0), &[shifted]).unwrap();
    circuit.add_connect(top, out, low);

    let analysis = ConstProp::new().analyze(&circuit).unwrap();
    assert_eq!(
        analysis.lattice_of(low),
        &LatticeValue::Constant(IntAttr::uint(8, 20))
    );

    let stats = ConstProp::new().run(&mut circuit).unwrap();
    assert!(stats.ops_erased >= 3, "the whole chain should collapse");
    assert!(!kinds(&circuit, top).iter().any(|k| matches!(k, OpKind::Prim(_))));
}

/// Clock- and reset-typed literals have no width to extend; they move
/// through connects as-is.
#[test]
fn test_special_constants_propagate_without_widths() {
    let mut circuit = Circuit::new("TestClk");
    let top = circuit.add_module("Top", true, vec![]);
    let high = circuit.add_constant(top, IntAttr::clock(true));
    let gate = circuit.add_wire(top, "gate", Type::Clock, NameKind::Interesting);
    circuit.add_connect(top, gate, high);

    let analysis = ConstProp::new().analyze(&circuit).unwrap();
    assert_eq!(
        analysis.lattice_of(gate),
        &LatticeValue::Constant(IntAttr::clock(true))
    );
}

/// A selector that folds to a constant forwards the surviving operand's
/// state even when that operand is not a constant.
#[test]
fn test_mux_forwards_selected_operand() {
    let mut circuit = Circuit::new("TestMux");

    let top = circuit.add_module(
        "Top",
        true,
        vec![PortDecl::input("a", u8_ty()), PortDecl::output("out", u8_ty())],
    );
    let a = circuit.module(top).ports()[0].value;
    let out = circuit.module(top).ports()[1].value;

    let sel = circuit.add_constant(top, IntAttr::uint(1, 0));
    let five = circuit.add_constant(top, IntAttr::uint(8, 5));
    // Selector is 0: the false arm (5) wins even though `a` is opaque.
    let picked = circuit.add_prim(top, PrimOp::Mux, &[sel, a, five]).unwrap();
    circuit.add_connect(top, out, picked);

    let analysis = ConstProp::new().analyze(&circuit).unwrap();
    assert_eq!(
        analysis.lattice_of(picked),
        &LatticeValue::Constant(IntAttr::uint(8, 5))
    );
}

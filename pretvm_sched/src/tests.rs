use std::collections::HashMap;

use pretvm_builder::{ast::*, elaborate, InstanceTree};
use pretvm_core::{Tag, TimeValue};

use crate::{
    dag::DagNode, explore, generate_dag, generate_instructions, link, partition,
    split_fragments, Dag, EmissionError, ExplorationError, ExplorationMode, Executable, Fragment,
    FragmentGraph, LabelGenerator, ObjectFile, Opcode, Operand, Phase, Register, SchedulerConfig,
    StateSpaceDiagram, Transition,
};

/// Main with a single 1s timer driving one reaction.
fn single_timer_program() -> Program {
    Program::new("Main").with_class(
        ReactorClass::new("Main")
            .with_timer("t", TimeValue::ZERO, TimeValue::from_secs(1))
            .with_reaction(ReactionDecl::named("r").with_timer_trigger("t")),
    )
}

/// A produces every 100ms starting at 100ms, B consumes after a 50ms delay.
fn after_delay_program() -> Program {
    Program::new("Main")
        .with_class(
            ReactorClass::new("A")
                .with_output("out")
                .with_timer("t", TimeValue::from_millis(100), TimeValue::from_millis(100))
                .with_reaction(
                    ReactionDecl::named("produce")
                        .with_timer_trigger("t")
                        .with_port_effect(PortRef::local("out")),
                ),
        )
        .with_class(
            ReactorClass::new("B").with_input("inp").with_reaction(
                ReactionDecl::named("consume").with_port_trigger(PortRef::local("inp")),
            ),
        )
        .with_class(
            ReactorClass::new("Main")
                .with_child("a", "A")
                .with_child("b", "B")
                .with_connection_after(
                    PortRef::of("a", "out"),
                    PortRef::of("b", "inp"),
                    TimeValue::from_millis(50),
                ),
        )
}

fn explore_forever(program: &Program) -> (InstanceTree, crate::StateSpaceDiagram) {
    let tree = elaborate(program).unwrap();
    let diagram = explore(&tree, Tag::FOREVER, ExplorationMode::InitAndPeriodic).unwrap();
    (tree, diagram)
}

fn reaction_dag_node(dag: &Dag, tree: &InstanceTree, fqn: &str) -> petgraph::graph::NodeIndex {
    dag.reaction_nodes()
        .find(|&n| {
            dag.graph[n]
                .reaction()
                .map(|r| tree.reaction_fqn(r) == fqn)
                .unwrap_or(false)
        })
        .unwrap_or_else(|| panic!("no dag node for {fqn}"))
}

fn opcodes(stream: &[crate::Instruction]) -> Vec<Opcode> {
    stream.iter().map(|i| i.opcode).collect()
}

/// Compile `program` end to end with the given config.
fn compile(program: &Program, config: &SchedulerConfig) -> (InstanceTree, Executable) {
    let tree = elaborate(program).unwrap();
    let horizon = config.timeout.map(|t| Tag::new(t, 0)).unwrap_or(Tag::FOREVER);
    let diagram = explore(&tree, horizon, ExplorationMode::InitAndPeriodic).unwrap();
    let hyperperiod = diagram.hyperperiod;
    let shutdown = config.timeout.map(|t| {
        explore(&tree, Tag::FOREVER, ExplorationMode::ShutdownTimeout(t)).unwrap()
    });
    let fragments = split_fragments(&diagram, shutdown);
    let mut labels = LabelGenerator::new();
    let mut objects = Vec::new();
    for fragment in &fragments.fragments {
        let mut dag = generate_dag(&tree, &fragment.diagram, fragment.terminal);
        partition(&mut dag, config.workers).unwrap();
        objects.push(generate_instructions(
            &tree,
            &dag,
            fragment.phase,
            config,
            &mut labels,
        ));
    }
    let executable = link(&tree, &fragments, objects, config, hyperperiod, &mut labels).unwrap();
    (tree, executable)
}

// --- state-space exploration -------------------------------------------------

#[test_log::test]
fn single_timer_finds_one_second_hyperperiod() {
    let (_, diagram) = explore_forever(&single_timer_program());
    assert_eq!(diagram.len(), 2);
    assert!(diagram.has_loop());
    assert_eq!(diagram.hyperperiod, Some(TimeValue::from_secs(1)));

    let order = diagram.nodes_head_to_tail();
    assert_eq!(diagram.node(order[0]).tag, Tag::ZERO);
    assert_eq!(diagram.node(order[1]).tag, Tag::new(TimeValue::from_secs(1), 0));
    // The loop covers the second node only; the startup node stays in INIT.
    assert_eq!(diagram.loop_position(), Some(1));
    let next = diagram.loop_node_next.as_ref().unwrap();
    assert_eq!(
        next.tag.time - diagram.node(diagram.loop_node.unwrap()).tag.time,
        diagram.hyperperiod.unwrap()
    );
}

#[test]
fn after_delay_interleaves_producer_and_consumer() {
    let (_tree, diagram) = explore_forever(&after_delay_program());
    assert!(diagram.has_loop());
    assert_eq!(diagram.hyperperiod, Some(TimeValue::from_millis(100)));

    // Nodes at 0 (startup, no reactions), 100ms (produce), 150ms (consume).
    let order = diagram.nodes_head_to_tail();
    assert_eq!(diagram.len(), 3);
    assert!(diagram.node(order[0]).reactions_invoked.is_empty());
    assert_eq!(diagram.node(order[1]).tag.time, TimeValue::from_millis(100));
    assert_eq!(diagram.node(order[2]).tag.time, TimeValue::from_millis(150));

    // Two reactions per hyperperiod.
    let fragments = split_fragments(&diagram, None);
    let periodic = fragments.get(Phase::Periodic).unwrap();
    let invocations: usize = periodic
        .diagram
        .nodes_head_to_tail()
        .iter()
        .map(|&n| periodic.diagram.node(n).reactions_invoked.len())
        .sum();
    assert_eq!(invocations, 2);
}

#[test]
fn physical_actions_are_never_enqueued() {
    let program = Program::new("Main").with_class(
        ReactorClass::new("Main")
            .with_physical_action("p", TimeValue::ZERO)
            .with_reaction(
                ReactionDecl::named("emit")
                    .with_startup()
                    .with_action_effect("p"),
            )
            .with_reaction(ReactionDecl::named("react").with_action_trigger("p")),
    );
    let (tree, diagram) = explore_forever(&program);
    assert_eq!(diagram.len(), 1);
    assert!(!diagram.has_loop());
    let node = diagram.node(diagram.nodes_head_to_tail()[0]);
    let invoked: Vec<_> = node
        .reactions_invoked
        .iter()
        .map(|&r| tree.reaction_fqn(r))
        .collect();
    assert_eq!(invoked, vec!["main.emit"]);
}

#[test]
fn shutdown_timeout_overapproximates_inputs() {
    let program = Program::new("Main").with_class(
        ReactorClass::new("Main").with_input("p").with_reaction(
            ReactionDecl::named("on_p").with_port_trigger(PortRef::local("p")),
        ),
    );
    let tree = elaborate(&program).unwrap();
    let diagram = explore(
        &tree,
        Tag::FOREVER,
        ExplorationMode::ShutdownTimeout(TimeValue::from_secs(10)),
    )
    .unwrap();
    assert_eq!(diagram.len(), 1);
    let node = diagram.node(diagram.nodes_head_to_tail()[0]);
    assert_eq!(node.tag, Tag::ZERO);
    let invoked: Vec<_> = node
        .reactions_invoked
        .iter()
        .map(|&r| tree.reaction_fqn(r))
        .collect();
    assert_eq!(invoked, vec!["main.on_p"]);
}

#[test]
fn shutdown_timeout_fires_aligned_timers() {
    let program = Program::new("Main").with_class(
        ReactorClass::new("Main")
            .with_timer("even", TimeValue::ZERO, TimeValue::from_secs(2))
            .with_timer("odd", TimeValue::from_secs(1), TimeValue::from_secs(2))
            .with_reaction(ReactionDecl::named("on_even").with_timer_trigger("even"))
            .with_reaction(ReactionDecl::named("on_odd").with_timer_trigger("odd")),
    );
    let tree = elaborate(&program).unwrap();
    // 10s timeout lands on the even schedule (0, 2, 4, ...) only.
    let diagram = explore(
        &tree,
        Tag::FOREVER,
        ExplorationMode::ShutdownTimeout(TimeValue::from_secs(10)),
    )
    .unwrap();
    let node = diagram.node(diagram.nodes_head_to_tail()[0]);
    let invoked: Vec<_> = node
        .reactions_invoked
        .iter()
        .map(|&r| tree.reaction_fqn(r))
        .collect();
    assert_eq!(invoked, vec!["main.on_even"]);
}

#[test]
fn microstep_only_loop_is_detected() {
    let program = Program::new("Main").with_class(
        ReactorClass::new("Main")
            .with_logical_action("a1", TimeValue::ZERO)
            .with_logical_action("a2", TimeValue::ZERO)
            .with_reaction(
                ReactionDecl::named("r1")
                    .with_startup()
                    .with_action_trigger("a1")
                    .with_action_effect("a2"),
            )
            .with_reaction(
                ReactionDecl::named("r2")
                    .with_action_trigger("a2")
                    .with_action_effect("a1"),
            ),
    );
    let (tree, diagram) = explore_forever(&program);
    assert!(diagram.has_loop());
    assert_eq!(diagram.hyperperiod, Some(TimeValue::ZERO));
    assert_eq!(diagram.len(), 1);

    // The DAG of the zero-hyperperiod fragment has no DUMMY between syncs.
    let fragments = split_fragments(&diagram, None);
    let periodic = fragments.get(Phase::Periodic).unwrap();
    let dag = generate_dag(&tree, &periodic.diagram, periodic.terminal);
    assert!(dag
        .graph
        .node_indices()
        .all(|n| !matches!(dag.graph[n], DagNode::Dummy { .. })));
}

#[test]
fn one_shot_timer_fires_once() {
    let program = Program::new("Main").with_class(
        ReactorClass::new("Main")
            .with_timer("once", TimeValue::from_millis(5), TimeValue::ZERO)
            .with_reaction(ReactionDecl::named("r").with_timer_trigger("once")),
    );
    let (tree, diagram) = explore_forever(&program);
    assert!(!diagram.has_loop());
    assert_eq!(diagram.len(), 2);

    let fragments = split_fragments(&diagram, None);
    let init = fragments.get(Phase::Init).unwrap();
    assert_eq!(init.terminal, TimeValue::FOREVER);
    let dag = generate_dag(&tree, &init.diagram, init.terminal);
    assert_eq!(dag.reaction_nodes().count(), 1);
}

#[test]
fn horizon_cuts_exploration_short() {
    let tree = elaborate(&single_timer_program()).unwrap();
    let horizon = Tag::new(TimeValue::from_millis(1_500), 0);
    let diagram = explore(&tree, horizon, ExplorationMode::InitAndPeriodic).unwrap();
    assert!(diagram.truncated);
    assert!(!diagram.has_loop());
    assert_eq!(diagram.len(), 2);
}

#[test]
fn negative_timing_is_rejected() {
    let program = Program::new("Main").with_class(
        ReactorClass::new("Main")
            .with_timer("t", TimeValue::from_nanos(-5), TimeValue::ZERO)
            .with_reaction(ReactionDecl::named("r").with_timer_trigger("t")),
    );
    let tree = elaborate(&program).unwrap();
    assert!(matches!(
        explore(&tree, Tag::FOREVER, ExplorationMode::InitAndPeriodic),
        Err(ExplorationError::MalformedTiming { .. })
    ));
}

#[test_log::test]
fn exploration_is_idempotent() {
    let tree = elaborate(&after_delay_program()).unwrap();
    let first = explore(&tree, Tag::FOREVER, ExplorationMode::InitAndPeriodic).unwrap();
    let second = explore(&tree, Tag::FOREVER, ExplorationMode::InitAndPeriodic).unwrap();
    assert_eq!(first.len(), second.len());
    assert_eq!(first.hyperperiod, second.hyperperiod);
    assert_eq!(first.loop_position(), second.loop_position());
    let tags = |d: &crate::StateSpaceDiagram| {
        d.nodes_head_to_tail()
            .iter()
            .map(|&n| d.node(n).tag)
            .collect::<Vec<_>>()
    };
    assert_eq!(tags(&first), tags(&second));
}

// --- DAG generation ----------------------------------------------------------

#[test]
fn single_timer_dag_has_sync_reaction_dummy_sync() {
    let (tree, diagram) = explore_forever(&single_timer_program());
    let fragments = split_fragments(&diagram, None);
    let periodic = fragments.get(Phase::Periodic).unwrap();
    let dag = generate_dag(&tree, &periodic.diagram, periodic.terminal);

    assert_eq!(dag.sync_time(dag.head), TimeValue::ZERO);
    assert_eq!(dag.sync_time(dag.tail), TimeValue::from_secs(1));
    assert_eq!(dag.reaction_nodes().count(), 1);
    assert_eq!(
        dag.graph
            .node_indices()
            .filter(|&n| matches!(dag.graph[n], DagNode::Dummy { .. }))
            .count(),
        1
    );

    // The reaction hangs off the head sync and pins the tail.
    let r = reaction_dag_node(&dag, &tree, "main.r");
    assert!(dag.graph.contains_edge(dag.head, r));
    assert!(dag.graph.contains_edge(r, dag.tail));
}

#[test]
fn priority_chain_orders_same_tag_reactions() {
    let program = Program::new("Main").with_class(
        ReactorClass::new("Main")
            .with_timer("t", TimeValue::ZERO, TimeValue::from_secs(1))
            .with_reaction(ReactionDecl::named("r1").with_timer_trigger("t"))
            .with_reaction(ReactionDecl::named("r2").with_timer_trigger("t")),
    );
    let (tree, diagram) = explore_forever(&program);
    let fragments = split_fragments(&diagram, None);
    let periodic = fragments.get(Phase::Periodic).unwrap();
    let dag = generate_dag(&tree, &periodic.diagram, periodic.terminal);

    let r1 = reaction_dag_node(&dag, &tree, "main.r1");
    let r2 = reaction_dag_node(&dag, &tree, "main.r2");
    assert!(dag.graph.contains_edge(dag.head, r1));
    assert!(dag.graph.contains_edge(dag.head, r2));
    assert!(dag.graph.contains_edge(r1, r2));
}

#[test]
fn same_tag_port_write_orders_writer_before_reader() {
    let program = Program::new("Main")
        .with_class(
            ReactorClass::new("W")
                .with_output("out")
                .with_reaction(
                    ReactionDecl::named("write")
                        .with_startup()
                        .with_port_effect(PortRef::local("out")),
                ),
        )
        .with_class(
            ReactorClass::new("R").with_input("inp").with_reaction(
                ReactionDecl::named("read").with_port_trigger(PortRef::local("inp")),
            ),
        )
        .with_class(
            ReactorClass::new("Main")
                .with_child("w", "W")
                .with_child("r", "R")
                .with_connection(PortRef::of("w", "out"), PortRef::of("r", "inp")),
        );
    let (tree, diagram) = explore_forever(&program);
    // Zero-delay propagation merges both invocations into the startup node.
    assert_eq!(diagram.len(), 1);

    let fragments = split_fragments(&diagram, None);
    let init = fragments.get(Phase::Init).unwrap();
    let dag = generate_dag(&tree, &init.diagram, init.terminal);
    let writer = reaction_dag_node(&dag, &tree, "main.w.write");
    let reader = reaction_dag_node(&dag, &tree, "main.r.read");
    assert!(dag.graph.contains_edge(writer, reader));
}

#[test]
fn partition_assigns_workers_releases_and_syncs() {
    let (tree, diagram) = explore_forever(&after_delay_program());
    let fragments = split_fragments(&diagram, None);
    let periodic = fragments.get(Phase::Periodic).unwrap();
    let mut dag = generate_dag(&tree, &periodic.diagram, periodic.terminal);
    partition(&mut dag, 2).unwrap();

    for idx in dag.reaction_nodes().collect::<Vec<_>>() {
        let DagNode::Reaction {
            worker,
            release,
            associated_sync,
            ..
        } = &dag.graph[idx]
        else {
            unreachable!()
        };
        assert!(worker.is_some());
        assert!(release.is_some());
        let sync = associated_sync.expect("exactly one nearest upstream sync");
        assert!(dag.graph[sync].is_sync());
    }

    // The consumer's associated sync is the 50ms boundary, not the head.
    let consume = reaction_dag_node(&dag, &tree, "main.b.consume");
    let DagNode::Reaction {
        associated_sync: Some(sync),
        ..
    } = &dag.graph[consume]
    else {
        unreachable!()
    };
    assert_eq!(dag.sync_time(*sync), TimeValue::from_millis(50));
}

#[test]
fn cross_step_edges_pin_repeated_invocations() {
    // Two timers in one reactor: on_b fires every 500ms, on_a every second.
    let program = Program::new("Main").with_class(
        ReactorClass::new("Main")
            .with_timer("ta", TimeValue::ZERO, TimeValue::from_secs(1))
            .with_timer("tb", TimeValue::ZERO, TimeValue::from_millis(500))
            .with_reaction(ReactionDecl::named("on_a").with_timer_trigger("ta"))
            .with_reaction(ReactionDecl::named("on_b").with_timer_trigger("tb")),
    );
    let (tree, diagram) = explore_forever(&program);
    assert_eq!(diagram.hyperperiod, Some(TimeValue::from_secs(1)));

    let fragments = split_fragments(&diagram, None);
    let periodic = fragments.get(Phase::Periodic).unwrap();
    let dag = generate_dag(&tree, &periodic.diagram, periodic.terminal);

    // Two invocations of on_b: one under the head sync, one at 500ms.
    let b_nodes: Vec<_> = dag
        .reaction_nodes()
        .filter(|&n| {
            dag.graph[n]
                .reaction()
                .map(|r| tree.reaction_fqn(r) == "main.on_b")
                .unwrap_or(false)
        })
        .collect();
    assert_eq!(b_nodes.len(), 2);
    let first_b = *b_nodes
        .iter()
        .find(|&&n| dag.graph.contains_edge(dag.head, n))
        .expect("an on_b under the head sync");
    let second_b = *b_nodes.iter().find(|&&n| n != first_b).unwrap();

    let second_sync = dag
        .graph
        .node_indices()
        .find(|&n| dag.graph[n].is_sync() && dag.sync_time(n) == TimeValue::from_millis(500))
        .expect("sync at 500ms");

    // Repeated invocation pins the earlier one before the next sync, and
    // both same-reactor successors are ordered after it.
    assert!(dag.graph.contains_edge(first_b, second_sync));
    assert!(dag.graph.contains_edge(first_b, second_b));
    let a_node = reaction_dag_node(&dag, &tree, "main.on_a");
    assert!(dag.graph.contains_edge(first_b, a_node));
    // Intra-reactor priority still holds at the second step.
    assert!(dag.graph.contains_edge(a_node, second_b));
}

// --- code generation and linking ---------------------------------------------

#[test]
fn duplicate_default_transitions_are_rejected() {
    let tree = elaborate(&single_timer_program()).unwrap();
    let fragments = FragmentGraph {
        fragments: vec![Fragment {
            phase: Phase::Init,
            diagram: StateSpaceDiagram::new(Phase::Init),
            terminal: TimeValue::FOREVER,
            downstream: vec![
                (Phase::Epilogue, Transition::unconditional(Phase::Epilogue)),
                (Phase::Epilogue, Transition::unconditional(Phase::Epilogue)),
            ],
            upstream: Vec::new(),
        }],
    };
    let objects = vec![ObjectFile {
        phase: Phase::Init,
        workers: vec![Vec::new()],
        placeholders: vec![HashMap::new()],
    }];
    let mut labels = LabelGenerator::new();
    let result = link(
        &tree,
        &fragments,
        objects,
        &SchedulerConfig::default(),
        None,
        &mut labels,
    );
    assert!(matches!(
        result,
        Err(EmissionError::DuplicateDefaultTransition { phase: Phase::Init })
    ));
}

#[cfg(feature = "visualization")]
#[test]
fn dot_renderers_produce_digraphs() {
    let (tree, diagram) = explore_forever(&after_delay_program());
    let dot = crate::dot::diagram_to_dot(&tree, &diagram);
    assert!(dot.starts_with("digraph state_space {"));
    assert!(dot.contains("main.a.produce"));

    let fragments = split_fragments(&diagram, None);
    let periodic = fragments.get(Phase::Periodic).unwrap();
    let mut dag = generate_dag(&tree, &periodic.diagram, periodic.terminal);
    partition(&mut dag, 2).unwrap();
    let dot = crate::dot::dag_to_dot(&tree, &dag);
    assert!(dot.starts_with("digraph dag {"));
    assert!(dot.contains("SYNC@"));
    assert!(dot.contains("DUMMY"));
}

#[test]
fn single_timer_single_worker_executable() {
    let (_, executable) = compile(&single_timer_program(), &SchedulerConfig::default());
    assert_eq!(executable.worker_count(), 1);
    assert_eq!(executable.hyperperiod, Some(TimeValue::from_secs(1)));

    let stream = &executable.workers[0];
    assert_eq!(
        opcodes(stream),
        vec![
            // preamble
            Opcode::Add,
            Opcode::Addi,
            Opcode::Addi,
            Opcode::Jal,
            // INIT body: execute, publish, wait out the first second, barrier
            Opcode::Bit,
            Opcode::Exe,
            Opcode::Addi,
            Opcode::Du,
            Opcode::Addi,
            Opcode::Jal,
            Opcode::Jal,
            // PERIODIC body
            Opcode::Bit,
            Opcode::Exe,
            Opcode::Addi,
            Opcode::Du,
            Opcode::Addi,
            Opcode::Jal,
            Opcode::Jal,
            // sync block
            Opcode::Add,
            Opcode::Addi,
            Opcode::Advi,
            Opcode::Jalr,
            // epilogue
            Opcode::Stp,
        ]
    );

    // Placeholders resolved and label resolution succeeds.
    assert!(stream.iter().all(|i| !i.has_placeholder()));
    assert!(executable.resolve_labels().is_ok());
    assert_eq!(stream.last().unwrap().opcode, Opcode::Stp);
}

#[test]
fn fast_mode_suppresses_delay_until() {
    let config = SchedulerConfig {
        fast_mode: true,
        ..Default::default()
    };
    let (_, executable) = compile(&single_timer_program(), &config);
    assert!(executable.workers[0].iter().all(|i| i.opcode != Opcode::Du));
}

#[test]
fn priority_chain_across_two_workers_waits_on_release() {
    let program = Program::new("Main").with_class(
        ReactorClass::new("Main")
            .with_timer("t", TimeValue::ZERO, TimeValue::from_secs(1))
            .with_reaction(ReactionDecl::named("r1").with_timer_trigger("t"))
            .with_reaction(ReactionDecl::named("r2").with_timer_trigger("t")),
    );
    let config = SchedulerConfig {
        workers: 2,
        ..Default::default()
    };
    let (_, executable) = compile(&program, &config);
    assert_eq!(executable.worker_count(), 2);

    // Worker 1 runs r2 and must first observe r1's release on worker 0.
    let w1 = &executable.workers[1];
    let wu = w1
        .iter()
        .find(|i| i.opcode == Opcode::Wu)
        .expect("cross-worker wait");
    assert_eq!(
        wu.operands,
        vec![
            Operand::Reg(Register::WorkerCounter(0)),
            Operand::Imm(1),
        ]
    );

    // On worker 0, the ADDI publishing r1's release comes before anything
    // else r1-related ends; the EXE precedes it.
    let w0 = &executable.workers[0];
    let exe_pos = w0.iter().position(|i| i.opcode == Opcode::Exe).unwrap();
    assert_eq!(w0[exe_pos + 1].opcode, Opcode::Addi);

    // Both workers still end on STP.
    for stream in &executable.workers {
        assert_eq!(stream.last().unwrap().opcode, Opcode::Stp);
    }
}

#[test]
fn guarded_exe_wraps_port_triggered_reactions() {
    let (_tree, executable) = compile(&after_delay_program(), &SchedulerConfig::default());
    let stream = &executable.workers[0];

    // The consumer reaction is guarded: BEQ presence -> EXE, JAL skip.
    let beq = stream
        .iter()
        .find(|i| i.opcode == Opcode::Beq)
        .expect("presence guard");
    assert!(matches!(beq.operands[0], Operand::Runtime(ref a) if a.contains("is_present")));
    assert_eq!(beq.operands[1], Operand::Reg(Register::GlobalOne));

    let beq_pos = stream.iter().position(|i| i.opcode == Opcode::Beq).unwrap();
    assert_eq!(stream[beq_pos + 1].opcode, Opcode::Jal);
    assert_eq!(stream[beq_pos + 2].opcode, Opcode::Exe);
    assert_eq!(stream[beq_pos + 3].opcode, Opcode::Addi);
}

#[test]
fn timeout_wires_shutdown_fragment_behind_a_guard() {
    let config = SchedulerConfig {
        timeout: Some(TimeValue::from_secs(10)),
        ..Default::default()
    };
    let (_, executable) = compile(&single_timer_program(), &config);
    let stream = &executable.workers[0];

    // The periodic fragment carries a BGE guard against GLOBAL_TIMEOUT.
    let bge = stream
        .iter()
        .find(|i| i.opcode == Opcode::Bge)
        .expect("timeout guard");
    assert_eq!(bge.operands[0], Operand::Reg(Register::GlobalOffset));
    assert_eq!(bge.operands[1], Operand::Reg(Register::GlobalTimeout));

    // The shutdown fragment is present and labeled.
    assert!(stream
        .iter()
        .any(|i| i.label.as_ref().map(|l| l.as_str()) == Some(Phase::ShutdownTimeout.label())));
    assert!(executable.resolve_labels().is_ok());
}

#[test]
fn labels_are_unique_and_branches_resolve() {
    let config = SchedulerConfig {
        workers: 2,
        timeout: Some(TimeValue::from_secs(5)),
        ..Default::default()
    };
    let (_, executable) = compile(&after_delay_program(), &config);
    let resolved = executable.resolve_labels().unwrap();
    for stream in &resolved {
        for insn in stream {
            assert!(insn.branch_target().is_none(), "label survived resolution");
        }
    }
}

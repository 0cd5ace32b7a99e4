use pretvm_core::TimeValue;

use crate::{ast::*, elaborate, ElaborationError, PortKey, ReactionKey};

fn port_by_fqn(tree: &crate::InstanceTree, fqn: &str) -> PortKey {
    tree.ports
        .keys()
        .find(|&k| tree.port_fqn(k) == fqn)
        .unwrap_or_else(|| panic!("no port named {fqn}"))
}

fn reaction_by_fqn(tree: &crate::InstanceTree, fqn: &str) -> ReactionKey {
    tree.reactions
        .keys()
        .find(|&k| tree.reaction_fqn(k) == fqn)
        .unwrap_or_else(|| panic!("no reaction named {fqn}"))
}

/// Main { a: A, b: B; a.out -> b.inp } with A driven by a 100ms timer.
fn pipeline_program() -> Program {
    Program::new("Main")
        .with_class(
            ReactorClass::new("A")
                .with_output("out")
                .with_timer("t", TimeValue::ZERO, TimeValue::from_millis(100))
                .with_reaction(
                    ReactionDecl::named("emit")
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
                .with_connection(PortRef::of("a", "out"), PortRef::of("b", "inp")),
        )
}

#[test]
fn unknown_main_class_is_an_error() {
    let program = Program::new("Nowhere");
    assert!(matches!(
        elaborate(&program).expect_err("expected failure"),
        ElaborationError::UnknownReactorClass { class, .. } if class == "Nowhere"
    ));
}

#[test]
fn unknown_child_class_is_an_error() {
    let program = Program::new("Main")
        .with_class(ReactorClass::new("Main").with_child("x", "Missing"));
    assert!(matches!(
        elaborate(&program).expect_err("expected failure"),
        ElaborationError::UnknownReactorClass { class, .. } if class == "Missing"
    ));
}

#[test]
fn duplicate_names_are_an_error() {
    let program = Program::new("Main").with_class(
        ReactorClass::new("Main")
            .with_input("p")
            .with_output("p"),
    );
    assert!(matches!(
        elaborate(&program).expect_err("expected duplicate"),
        ElaborationError::Duplicate { reactor, name, .. } if reactor == "Main" && name == "p"
    ));
}

#[test]
fn unresolved_connection_port_is_an_error() {
    let program = Program::new("Main").with_class(
        ReactorClass::new("Main")
            .with_child("a", "A")
            .with_connection(PortRef::of("a", "out"), PortRef::local("nowhere")),
    );
    let program = program.with_class(ReactorClass::new("A").with_output("out"));
    assert!(matches!(
        elaborate(&program).expect_err("expected failure"),
        ElaborationError::UnresolvedPort { port, .. } if port == "nowhere"
    ));
}

#[test]
fn unresolved_timer_trigger_is_an_error() {
    let program = Program::new("Main").with_class(
        ReactorClass::new("Main")
            .with_reaction(ReactionDecl::new().with_timer_trigger("ghost")),
    );
    assert!(matches!(
        elaborate(&program).expect_err("expected failure"),
        ElaborationError::UnresolvedTrigger { name, .. } if name == "ghost"
    ));
}

#[test_log::test]
fn connection_endpoints_resolve_within_one_level() {
    let tree = elaborate(&pipeline_program()).unwrap();
    for (key, reactor) in &tree.reactors {
        for conn in &reactor.connections {
            for port in [conn.source, conn.target] {
                let owner = tree.ports[port].reactor;
                assert!(
                    owner == key || tree.reactors[owner].parent == Some(key),
                    "connection endpoint {} escapes {}",
                    tree.port_fqn(port),
                    tree.reactor_fqn(key)
                );
            }
        }
    }
}

#[test]
fn port_reaction_edges_are_recorded() {
    let tree = elaborate(&pipeline_program()).unwrap();
    let out = port_by_fqn(&tree, "main.a.out");
    let inp = port_by_fqn(&tree, "main.b.inp");
    let emit = reaction_by_fqn(&tree, "main.a.emit");
    let consume = reaction_by_fqn(&tree, "main.b.consume");

    assert!(tree.ports[out].antidependencies.contains(&emit));
    assert!(tree.ports[inp].dependencies.contains(&consume));
    assert!(tree.reactions[consume].triggers.contains(&tree.ports[inp].trigger));
}

#[test]
fn priority_chain_links_neighboring_reactions() {
    let program = Program::new("Main").with_class(
        ReactorClass::new("Main")
            .with_timer("t", TimeValue::ZERO, TimeValue::from_secs(1))
            .with_reaction(ReactionDecl::named("r1").with_timer_trigger("t"))
            .with_reaction(ReactionDecl::named("r2").with_timer_trigger("t"))
            .with_reaction(ReactionDecl::named("r3").with_timer_trigger("t")),
    );
    let tree = elaborate(&program).unwrap();
    let r1 = reaction_by_fqn(&tree, "main.r1");
    let r2 = reaction_by_fqn(&tree, "main.r2");
    let r3 = reaction_by_fqn(&tree, "main.r3");

    assert_eq!(tree.reactions[r1].priority, 1);
    assert_eq!(tree.reactions[r3].priority, 3);
    assert!(tree.reactions[r2].depends_on_reactions.contains(&r1));
    assert!(tree.reactions[r1].dependent_reactions.contains(&r2));
    assert!(tree.reactions[r3].depends_on_reactions.contains(&r2));
    assert!(!tree.reactions[r3].depends_on_reactions.contains(&r1));
}

#[test]
fn sibling_ordinals_count_same_class_instances() {
    let program = Program::new("Main")
        .with_class(ReactorClass::new("Worker"))
        .with_class(ReactorClass::new("Other"))
        .with_class(
            ReactorClass::new("Main")
                .with_child("w0", "Worker")
                .with_child("x", "Other")
                .with_child("w1", "Worker"),
        );
    let tree = elaborate(&program).unwrap();
    let main = &tree.reactors[tree.main];
    let ordinals: Vec<_> = main
        .children
        .iter()
        .map(|&c| (tree.reactors[c].name().to_owned(), tree.reactors[c].ordinal()))
        .collect();
    assert_eq!(
        ordinals,
        vec![
            ("w0".to_owned(), 0),
            ("x".to_owned(), 0),
            ("w1".to_owned(), 1)
        ]
    );
}

#[test]
fn transitive_closure_stops_at_output_destinations() {
    // inner.out -> mid.out (inside Mid), mid.out -> sink.inp (inside Main).
    let program = Program::new("Main")
        .with_class(ReactorClass::new("Inner").with_output("out"))
        .with_class(
            ReactorClass::new("Mid")
                .with_output("out")
                .with_child("inner", "Inner")
                .with_connection(PortRef::of("inner", "out"), PortRef::local("out")),
        )
        .with_class(ReactorClass::new("Sink").with_input("inp"))
        .with_class(
            ReactorClass::new("Main")
                .with_child("mid", "Mid")
                .with_child("sink", "Sink")
                .with_connection(PortRef::of("mid", "out"), PortRef::of("sink", "inp")),
        );
    let tree = elaborate(&program).unwrap();
    let inner_out = port_by_fqn(&tree, "main.mid.inner.out");
    let mid_out = port_by_fqn(&tree, "main.mid.out");
    let sink_inp = port_by_fqn(&tree, "main.sink.inp");

    let closure = tree.transitive_closure(inner_out);
    assert!(closure.contains(&mid_out));
    assert!(
        !closure.contains(&sink_inp),
        "closure must not escape upward through a destination output port"
    );

    // Message propagation does continue through the output boundary.
    let eventual: Vec<_> = tree
        .eventual_destinations(inner_out)
        .into_iter()
        .map(|(p, d)| (tree.port_fqn(p), d))
        .collect();
    assert!(eventual.contains(&("main.mid.out".to_owned(), TimeValue::ZERO)));
    assert!(eventual.contains(&("main.sink.inp".to_owned(), TimeValue::ZERO)));
}

#[test]
fn eventual_destinations_accumulate_after_delays() {
    let program = Program::new("Main")
        .with_class(ReactorClass::new("A").with_output("out"))
        .with_class(
            ReactorClass::new("B")
                .with_input("inp")
                .with_child("c", "C")
                .with_connection_after(
                    PortRef::local("inp"),
                    PortRef::of("c", "inp"),
                    TimeValue::from_millis(20),
                ),
        )
        .with_class(ReactorClass::new("C").with_input("inp"))
        .with_class(
            ReactorClass::new("Main")
                .with_child("a", "A")
                .with_child("b", "B")
                .with_connection_after(
                    PortRef::of("a", "out"),
                    PortRef::of("b", "inp"),
                    TimeValue::from_millis(50),
                ),
        );
    let tree = elaborate(&program).unwrap();
    let a_out = port_by_fqn(&tree, "main.a.out");
    let destinations: Vec<_> = tree
        .eventual_destinations(a_out)
        .into_iter()
        .map(|(p, d)| (tree.port_fqn(p), d))
        .collect();
    assert!(destinations.contains(&("main.b.inp".to_owned(), TimeValue::from_millis(50))));
    assert!(destinations.contains(&("main.b.c.inp".to_owned(), TimeValue::from_millis(70))));
}

#[test_log::test]
fn elaboration_is_idempotent() {
    let program = pipeline_program();
    let first = elaborate(&program).unwrap();
    let second = elaborate(&program).unwrap();
    assert_eq!(first.reactors.len(), second.reactors.len());
    assert_eq!(first.reactions.len(), second.reactions.len());
    assert_eq!(first.to_string(), second.to_string());
}

#[test]
fn depth_first_order_starts_at_main() {
    let tree = elaborate(&pipeline_program()).unwrap();
    let order = tree.reactors_depth_first();
    assert_eq!(order[0], tree.main);
    assert_eq!(tree.reactor_index(tree.main), 0);
    // Children in declaration order.
    let names: Vec<_> = order
        .iter()
        .map(|&k| tree.reactors[k].name().to_owned())
        .collect();
    assert_eq!(names, vec!["main", "a", "b"]);
}

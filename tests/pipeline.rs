//! End-to-end pipeline tests: program in, linked executable out.

use pretvm::builder::ast::*;
use pretvm::builder::{desugar_delayed_connections, CTargetTypes};
use pretvm::core::TimeValue;
use pretvm::sched::{Opcode, Phase};
use pretvm::{compile, CompileError, CompilerConfig};

fn single_timer() -> Program {
    Program::new("Main").with_class(
        ReactorClass::new("Main")
            .with_timer("t", TimeValue::ZERO, TimeValue::from_secs(1))
            .with_reaction(ReactionDecl::named("tick").with_timer_trigger("t")),
    )
}

fn producer_consumer(after: Option<TimeValue>) -> Program {
    let mut main = ReactorClass::new("Main")
        .with_child("a", "A")
        .with_child("b", "B");
    main = match after {
        Some(delay) => main.with_connection_after(
            PortRef::of("a", "out"),
            PortRef::of("b", "inp"),
            delay,
        ),
        None => main.with_connection(PortRef::of("a", "out"), PortRef::of("b", "inp")),
    };
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
        .with_class(main)
}

#[test_log::test]
fn single_timer_compiles_to_periodic_executable() {
    let executable = compile(&single_timer(), &CompilerConfig::default()).unwrap();
    assert_eq!(executable.hyperperiod, Some(TimeValue::from_secs(1)));
    assert_eq!(executable.worker_count(), 1);

    let stream = &executable.workers[0];
    assert_eq!(stream.last().unwrap().opcode, Opcode::Stp);
    assert!(stream.iter().all(|i| !i.has_placeholder()));
    assert!(executable.resolve_labels().is_ok());

    // Both the INIT and PERIODIC entry points exist.
    for phase in [Phase::Preamble, Phase::Init, Phase::Periodic, Phase::SyncBlock, Phase::Epilogue]
    {
        assert!(
            stream
                .iter()
                .any(|i| i.label.as_ref().map(|l| l.as_str()) == Some(phase.label())),
            "missing phase label {phase}"
        );
    }
}

#[test_log::test]
fn after_delay_pipeline_compiles_on_two_workers() {
    let config = CompilerConfig {
        workers: 2,
        ..Default::default()
    };
    let program = producer_consumer(Some(TimeValue::from_millis(50)));
    let executable = compile(&program, &config).unwrap();
    assert_eq!(executable.hyperperiod, Some(TimeValue::from_millis(100)));
    assert_eq!(executable.worker_count(), 2);
    for stream in &executable.workers {
        assert_eq!(stream.last().unwrap().opcode, Opcode::Stp);
        assert!(stream.iter().all(|i| !i.has_placeholder()));
    }
    assert!(executable.resolve_labels().is_ok());
}

#[test_log::test]
fn timeout_produces_shutdown_fragment() {
    let config = CompilerConfig {
        timeout: Some(TimeValue::from_secs(10)),
        ..Default::default()
    };
    let executable = compile(&single_timer(), &config).unwrap();
    let stream = &executable.workers[0];
    assert!(stream
        .iter()
        .any(|i| i.label.as_ref().map(|l| l.as_str()) == Some(Phase::ShutdownTimeout.label())));
    assert!(stream.iter().any(|i| i.opcode == Opcode::Bge));
}

#[test_log::test]
fn starved_program_gets_shutdown_fragment() {
    // One-shot timer, a shutdown reaction, no timeout: the queue drains and
    // shutdown triggers by starvation.
    let program = Program::new("Main").with_class(
        ReactorClass::new("Main")
            .with_timer("once", TimeValue::from_millis(1), TimeValue::ZERO)
            .with_reaction(ReactionDecl::named("work").with_timer_trigger("once"))
            .with_reaction(ReactionDecl::named("bye").with_shutdown()),
    );
    let executable = compile(&program, &CompilerConfig::default()).unwrap();
    let stream = &executable.workers[0];
    assert!(stream.iter().any(
        |i| i.label.as_ref().map(|l| l.as_str()) == Some(Phase::ShutdownStarvation.label())
    ));
    assert_eq!(stream.last().unwrap().opcode, Opcode::Stp);
}

#[test_log::test]
fn desugared_delays_compile_to_the_same_hyperperiod() {
    let program = producer_consumer(Some(TimeValue::from_millis(50)));
    let desugared = desugar_delayed_connections(&program, &CTargetTypes).unwrap();
    let direct = compile(&program, &CompilerConfig::default()).unwrap();
    let through_delay_reactor = compile(&desugared, &CompilerConfig::default()).unwrap();
    assert_eq!(direct.hyperperiod, through_delay_reactor.hyperperiod);
}

#[test_log::test]
fn elaboration_failures_surface_as_compile_errors() {
    let program = Program::new("Missing");
    assert!(matches!(
        compile(&program, &CompilerConfig::default()),
        Err(CompileError::Elaboration(_))
    ));
}

//! Desugaring of delayed connections into generated delay reactors.
//!
//! `a.out -> b.in after 50ms` becomes an intermediate reactor with a logical
//! action whose minimum delay is the `after` value: one reaction schedules the
//! action when the input arrives, a second forwards the triggered action to
//! the output. The scheduler handles `after` natively, so this pass is
//! optional; it exists for targets whose runtimes want the delay reified.

use pretvm_core::TimeValue;
use tracing::debug;

use crate::{
    ast::{ConnectionDecl, PortRef, Program, ReactionDecl, ReactorClass},
    InferredType, TargetTypes, UnsupportedFeature,
};

/// Rewrite every delayed connection in `program` through a generated delay
/// reactor. Returns the transformed program; classes without delayed
/// connections are untouched.
pub fn desugar_delayed_connections(
    program: &Program,
    target: &dyn TargetTypes,
) -> Result<Program, UnsupportedFeature> {
    let mut result = Program::new(&program.main);
    let mut generated: Vec<ReactorClass> = Vec::new();
    let mut counter = 0usize;

    for class in &program.classes {
        let mut rewritten = class.clone();
        let original: Vec<ConnectionDecl> = rewritten.connections.drain(..).collect();
        let mut connections = Vec::with_capacity(original.len());
        for conn in original {
            match conn.after {
                Some(delay) if !conn.physical => {
                    let (delay_class, instance) = make_delay_class(delay, counter, target)?;
                    counter += 1;
                    debug!(
                        class = %class.name,
                        delay = %delay,
                        "rewriting delayed connection through {instance}"
                    );
                    for (from, to) in conn.lhs.iter().zip(&conn.rhs) {
                        connections.push(ConnectionDecl::new(
                            from.clone(),
                            PortRef::of(&instance, "inp"),
                        ));
                        connections.push(ConnectionDecl::new(
                            PortRef::of(&instance, "out"),
                            to.clone(),
                        ));
                    }
                    rewritten = rewritten.with_child(&instance, &delay_class.name);
                    generated.push(delay_class);
                }
                _ => connections.push(conn),
            }
        }
        rewritten.connections = connections;
        result = result.with_class(rewritten);
    }

    for class in generated {
        result = result.with_class(class);
    }
    Ok(result)
}

fn make_delay_class(
    delay: TimeValue,
    ordinal: usize,
    target: &dyn TargetTypes,
) -> Result<(ReactorClass, String), UnsupportedFeature> {
    // The payload type follows the connection; untyped stays untyped.
    let ty = InferredType::Undefined;
    let rendered_ty = target.render_type(&ty)?;

    let class_name = format!("__Delay{ordinal}");
    let instance = format!("__delay{ordinal}");

    let mut class = ReactorClass::new(&class_name)
        .with_input("inp")
        .with_output("out")
        .with_logical_action("act", delay);
    class.inputs[0].ty = Some(rendered_ty.clone());
    class.outputs[0].ty = Some(rendered_ty);

    // Forward first, then delay: the forwarding reaction must observe the
    // action before a same-tag arrival reschedules it.
    class = class
        .with_reaction(
            ReactionDecl::named("forward")
                .with_action_trigger("act")
                .with_port_effect(PortRef::local("out"))
                .with_body(&target.render_forward_body("act", "out")),
        )
        .with_reaction(
            ReactionDecl::named("delay")
                .with_port_trigger(PortRef::local("inp"))
                .with_action_effect("act")
                .with_body(&target.render_delay_reaction_body("act", "inp")),
        );

    Ok((class, instance))
}

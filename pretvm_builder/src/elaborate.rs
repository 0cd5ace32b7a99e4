//! Elaboration: unfold the checked AST into the runtime instance tree.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::{
    ast, tree::ConnectionInstance, ActionInstance, ActionKey, Effect, ElaborationError,
    InstanceTree, PortInstance, PortKey, PortType, ReactionInstance, ReactorInstance, ReactorKey,
    TimerInstance, TimerKey, TriggerInstance,
};

/// Produce the full `main`-rooted instance tree for `program`.
///
/// Fails on unknown classes, unresolvable port or trigger references, and
/// duplicate names within one reactor; those are validator responsibilities,
/// but elaboration re-asserts them rather than building a broken tree.
pub fn elaborate(program: &ast::Program) -> Result<InstanceTree, ElaborationError> {
    let mut tree = InstanceTree::default();
    tree.startup = tree.triggers.insert(TriggerInstance::Startup);
    tree.shutdown = tree.triggers.insert(TriggerInstance::Shutdown);

    let main_class =
        program
            .class(&program.main)
            .ok_or_else(|| ElaborationError::UnknownReactorClass {
                class: program.main.clone(),
                span: ast::Span::default(),
            })?;

    tree.main = instantiate(&mut tree, program, main_class, "main", 0, None)?;
    tree.finish();

    debug!(
        reactors = tree.reactors.len(),
        ports = tree.ports.len(),
        reactions = tree.reactions.len(),
        "elaborated instance tree"
    );
    Ok(tree)
}

fn instantiate(
    tree: &mut InstanceTree,
    program: &ast::Program,
    class: &ast::ReactorClass,
    name: &str,
    ordinal: usize,
    parent: Option<ReactorKey>,
) -> Result<ReactorKey, ElaborationError> {
    let key = tree
        .reactors
        .insert(ReactorInstance::new(name, &class.name, ordinal, parent));
    if let Some(parent) = parent {
        tree.reactors[parent].children.push(key);
    }

    let mut names: HashSet<&str> = HashSet::new();
    let duplicate = |name: &str, span| ElaborationError::Duplicate {
        reactor: class.name.clone(),
        name: name.to_owned(),
        span,
    };

    // Children, in declaration order. The ordinal counts earlier siblings of
    // the same class.
    let mut class_counts: HashMap<&str, usize> = HashMap::new();
    for inst in &class.instantiations {
        if !names.insert(&inst.name) {
            return Err(duplicate(&inst.name, inst.span));
        }
        let child_class =
            program
                .class(&inst.class)
                .ok_or_else(|| ElaborationError::UnknownReactorClass {
                    class: inst.class.clone(),
                    span: inst.span,
                })?;
        let count = class_counts.entry(inst.class.as_str()).or_default();
        instantiate(tree, program, child_class, &inst.name, *count, Some(key))?;
        *count += 1;
    }

    // Ports, timers, and actions owned by this reactor.
    for decl in &class.inputs {
        if !names.insert(&decl.name) {
            return Err(duplicate(&decl.name, decl.span));
        }
        add_port(tree, key, &decl.name, PortType::Input);
    }
    for decl in &class.outputs {
        if !names.insert(&decl.name) {
            return Err(duplicate(&decl.name, decl.span));
        }
        add_port(tree, key, &decl.name, PortType::Output);
    }
    for decl in &class.timers {
        if !names.insert(&decl.name) {
            return Err(duplicate(&decl.name, decl.span));
        }
        let timer = tree.timers.insert_with_key(|timer_key| {
            let trigger = tree.triggers.insert(TriggerInstance::Timer(timer_key));
            TimerInstance::new(&decl.name, key, decl.offset, decl.period, trigger)
        });
        tree.reactors[key].timers.push(timer);
    }
    for decl in &class.actions {
        if !names.insert(&decl.name) {
            return Err(duplicate(&decl.name, decl.span));
        }
        let action = tree.actions.insert_with_key(|action_key| {
            let trigger = tree.triggers.insert(TriggerInstance::Action(action_key));
            ActionInstance::new(&decl.name, key, decl.origin, decl.min_delay, trigger)
        });
        tree.reactors[key].actions.push(action);
    }

    // Connections at this level. Both endpoints must resolve to a local port
    // or a port of an immediate child.
    for decl in &class.connections {
        let pairs: Vec<(&ast::PortRef, &ast::PortRef)> = if decl.lhs.len() == decl.rhs.len() {
            decl.lhs.iter().zip(&decl.rhs).collect()
        } else if decl.lhs.len() == 1 {
            decl.rhs.iter().map(|to| (&decl.lhs[0], to)).collect()
        } else {
            return Err(ElaborationError::ConnectionLengthMismatch {
                from: decl.lhs.len(),
                to: decl.rhs.len(),
                span: decl.span,
            });
        };
        for (from, to) in pairs {
            let source = resolve_port(tree, key, from, decl.span)?;
            let target = resolve_port(tree, key, to, decl.span)?;
            let conn = ConnectionInstance {
                source,
                target,
                after: decl.after,
                physical: decl.physical,
            };
            tree.reactors[key].connections.push(conn);
            tree.outward.entry(source).unwrap().or_default().push(conn);
        }
    }

    // Reactions, in declaration order. Each is chained after its predecessor
    // so effects of earlier reactions are observed at the same tag.
    let mut previous = None;
    for (index, decl) in class.reactions.iter().enumerate() {
        let priority = index + 1;
        let reaction = tree
            .reactions
            .insert(ReactionInstance::new(decl.name.as_deref(), priority, key));
        tree.reactors[key].reactions.push(reaction);

        if let Some(previous) = previous {
            tree.reactions[reaction].depends_on_reactions.insert(previous);
            tree.reactions[previous].dependent_reactions.insert(reaction);
        }
        previous = Some(reaction);

        for trigger_ref in &decl.triggers {
            let trigger = match trigger_ref {
                ast::TriggerRef::Startup => tree.startup,
                ast::TriggerRef::Shutdown => tree.shutdown,
                ast::TriggerRef::Port(port_ref) => {
                    let port = resolve_port(tree, key, port_ref, decl.span)?;
                    tree.ports[port].dependencies.insert(reaction);
                    tree.ports[port].trigger
                }
                ast::TriggerRef::Timer(name) => {
                    let timer = find_timer(tree, key, name)
                        .ok_or_else(|| unresolved_trigger(tree, key, name, decl.span))?;
                    tree.timers[timer].trigger
                }
                ast::TriggerRef::Action(name) => {
                    let action = find_action(tree, key, name)
                        .ok_or_else(|| unresolved_trigger(tree, key, name, decl.span))?;
                    tree.actions[action].trigger
                }
            };
            tree.reactions[reaction].triggers.insert(trigger);
            tree.trigger_dependencies
                .entry(trigger)
                .unwrap()
                .or_default()
                .insert(reaction);
        }

        for source_ref in &decl.sources {
            let port = resolve_port(tree, key, source_ref, decl.span)?;
            tree.ports[port].dependencies.insert(reaction);
            tree.reactions[reaction].sources.insert(port);
        }

        for effect_ref in &decl.effects {
            match effect_ref {
                ast::EffectRef::Port(port_ref) => {
                    let port = resolve_port(tree, key, port_ref, decl.span)?;
                    tree.ports[port].antidependencies.insert(reaction);
                    tree.reactions[reaction].effects.push(Effect::Port(port));
                }
                ast::EffectRef::Action(name) => {
                    let action = find_action(tree, key, name)
                        .ok_or_else(|| unresolved_trigger(tree, key, name, decl.span))?;
                    tree.reactions[reaction].effects.push(Effect::Action(action));
                }
            }
        }
    }

    Ok(key)
}

fn add_port(tree: &mut InstanceTree, reactor: ReactorKey, name: &str, port_type: PortType) {
    let port = tree.ports.insert_with_key(|port_key| {
        let trigger = tree.triggers.insert(TriggerInstance::Port(port_key));
        PortInstance::new(name, port_type, reactor, trigger)
    });
    match port_type {
        PortType::Input => tree.reactors[reactor].inputs.push(port),
        PortType::Output => tree.reactors[reactor].outputs.push(port),
    }
}

/// Resolve a port reference relative to `reactor`: either one of its own
/// ports, or `child.port` on an immediate child.
fn resolve_port(
    tree: &InstanceTree,
    reactor: ReactorKey,
    port_ref: &ast::PortRef,
    span: ast::Span,
) -> Result<PortKey, ElaborationError> {
    let unresolved = || ElaborationError::UnresolvedPort {
        reactor: tree.reactor_fqn(reactor),
        port: port_ref.to_string(),
        span,
    };

    let owner = match &port_ref.container {
        None => reactor,
        Some(container) => tree.reactors[reactor]
            .children
            .iter()
            .copied()
            .find(|&child| tree.reactors[child].name() == container.as_str())
            .ok_or_else(unresolved)?,
    };

    let owner = &tree.reactors[owner];
    owner
        .inputs
        .iter()
        .chain(&owner.outputs)
        .copied()
        .find(|&port| tree.ports[port].name() == port_ref.port)
        .ok_or_else(unresolved)
}

fn find_timer(tree: &InstanceTree, reactor: ReactorKey, name: &str) -> Option<TimerKey> {
    tree.reactors[reactor]
        .timers
        .iter()
        .copied()
        .find(|&timer| tree.timers[timer].name() == name)
}

fn find_action(tree: &InstanceTree, reactor: ReactorKey, name: &str) -> Option<ActionKey> {
    tree.reactors[reactor]
        .actions
        .iter()
        .copied()
        .find(|&action| tree.actions[action].name() == name)
}

fn unresolved_trigger(
    tree: &InstanceTree,
    reactor: ReactorKey,
    name: &str,
    span: ast::Span,
) -> ElaborationError {
    ElaborationError::UnresolvedTrigger {
        reactor: tree.reactor_fqn(reactor),
        name: name.to_owned(),
        span,
    }
}

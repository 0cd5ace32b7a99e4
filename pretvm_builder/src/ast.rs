//! The checked abstract syntax handed over by the upstream parser and
//! validator: reactor classes with their ports, timers, actions, child
//! instantiations, connections, and reactions.
//!
//! Name binding and validation happen upstream; this module only models the
//! shapes the elaborator consumes. The constructor helpers keep test programs
//! and generated transformations readable.

use std::fmt::Display;

use pretvm_core::TimeValue;

use crate::ActionOrigin;

/// Source position propagated into diagnostics.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A whole program: the set of reactor classes plus the name of the main one.
#[derive(Debug, Default, Clone)]
pub struct Program {
    pub classes: Vec<ReactorClass>,
    pub main: String,
}

impl Program {
    pub fn new(main: &str) -> Self {
        Self {
            classes: Vec::new(),
            main: main.to_owned(),
        }
    }

    pub fn with_class(mut self, class: ReactorClass) -> Self {
        self.classes.push(class);
        self
    }

    pub fn class(&self, name: &str) -> Option<&ReactorClass> {
        self.classes.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Default, Clone)]
pub struct ReactorClass {
    pub name: String,
    pub inputs: Vec<PortDecl>,
    pub outputs: Vec<PortDecl>,
    pub timers: Vec<TimerDecl>,
    pub actions: Vec<ActionDecl>,
    pub instantiations: Vec<Instantiation>,
    pub connections: Vec<ConnectionDecl>,
    pub reactions: Vec<ReactionDecl>,
    pub span: Span,
}

impl ReactorClass {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    pub fn with_input(mut self, name: &str) -> Self {
        self.inputs.push(PortDecl::new(name));
        self
    }

    pub fn with_output(mut self, name: &str) -> Self {
        self.outputs.push(PortDecl::new(name));
        self
    }

    pub fn with_timer(mut self, name: &str, offset: TimeValue, period: TimeValue) -> Self {
        self.timers.push(TimerDecl {
            name: name.to_owned(),
            offset,
            period,
            span: Span::default(),
        });
        self
    }

    pub fn with_logical_action(mut self, name: &str, min_delay: TimeValue) -> Self {
        self.actions.push(ActionDecl {
            name: name.to_owned(),
            origin: ActionOrigin::Logical,
            min_delay,
            span: Span::default(),
        });
        self
    }

    pub fn with_physical_action(mut self, name: &str, min_delay: TimeValue) -> Self {
        self.actions.push(ActionDecl {
            name: name.to_owned(),
            origin: ActionOrigin::Physical,
            min_delay,
            span: Span::default(),
        });
        self
    }

    pub fn with_child(mut self, name: &str, class: &str) -> Self {
        self.instantiations.push(Instantiation {
            name: name.to_owned(),
            class: class.to_owned(),
            span: Span::default(),
        });
        self
    }

    pub fn with_connection(mut self, from: PortRef, to: PortRef) -> Self {
        self.connections.push(ConnectionDecl::new(from, to));
        self
    }

    pub fn with_connection_after(mut self, from: PortRef, to: PortRef, after: TimeValue) -> Self {
        self.connections.push(ConnectionDecl::new(from, to).after(after));
        self
    }

    pub fn with_reaction(mut self, reaction: ReactionDecl) -> Self {
        self.reactions.push(reaction);
        self
    }
}

#[derive(Debug, Default, Clone)]
pub struct PortDecl {
    pub name: String,
    /// Target-language type, opaque to the scheduler.
    pub ty: Option<String>,
    pub span: Span,
}

impl PortDecl {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ty: None,
            span: Span::default(),
        }
    }
}

/// A timer with an offset and a period. A zero period makes it a one-shot.
#[derive(Debug, Clone)]
pub struct TimerDecl {
    pub name: String,
    pub offset: TimeValue,
    pub period: TimeValue,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct ActionDecl {
    pub name: String,
    pub origin: ActionOrigin,
    pub min_delay: TimeValue,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Instantiation {
    /// Instance name of the child.
    pub name: String,
    /// Class being instantiated.
    pub class: String,
    pub span: Span,
}

/// A reference to a port, either local (`port`) or on an immediate child
/// (`child.port`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortRef {
    pub container: Option<String>,
    pub port: String,
}

impl PortRef {
    pub fn local(port: &str) -> Self {
        Self {
            container: None,
            port: port.to_owned(),
        }
    }

    pub fn of(container: &str, port: &str) -> Self {
        Self {
            container: Some(container.to_owned()),
            port: port.to_owned(),
        }
    }
}

impl Display for PortRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.container {
            Some(container) => write!(f, "{}.{}", container, self.port),
            None => write!(f, "{}", self.port),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionDecl {
    pub lhs: Vec<PortRef>,
    pub rhs: Vec<PortRef>,
    /// Logical delay between source and destination presence.
    pub after: Option<TimeValue>,
    pub physical: bool,
    /// Width spec for bank/multiport connections; carried through from the
    /// validator, which has already checked it.
    pub width: Option<usize>,
    pub span: Span,
}

impl ConnectionDecl {
    pub fn new(from: PortRef, to: PortRef) -> Self {
        Self {
            lhs: vec![from],
            rhs: vec![to],
            after: None,
            physical: false,
            width: None,
            span: Span::default(),
        }
    }

    pub fn after(mut self, delay: TimeValue) -> Self {
        self.after = Some(delay);
        self
    }

    pub fn physical(mut self) -> Self {
        self.physical = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerRef {
    Startup,
    Shutdown,
    Port(PortRef),
    Timer(String),
    Action(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectRef {
    Port(PortRef),
    Action(String),
}

#[derive(Debug, Default, Clone)]
pub struct ReactionDecl {
    pub name: Option<String>,
    pub triggers: Vec<TriggerRef>,
    /// Ports read without triggering.
    pub sources: Vec<PortRef>,
    pub effects: Vec<EffectRef>,
    /// Target-language body, opaque to the scheduler.
    pub body: Option<String>,
    pub span: Span,
}

impl ReactionDecl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_owned()),
            ..Default::default()
        }
    }

    pub fn with_trigger(mut self, trigger: TriggerRef) -> Self {
        self.triggers.push(trigger);
        self
    }

    pub fn with_startup(self) -> Self {
        self.with_trigger(TriggerRef::Startup)
    }

    pub fn with_shutdown(self) -> Self {
        self.with_trigger(TriggerRef::Shutdown)
    }

    pub fn with_timer_trigger(self, timer: &str) -> Self {
        self.with_trigger(TriggerRef::Timer(timer.to_owned()))
    }

    pub fn with_action_trigger(self, action: &str) -> Self {
        self.with_trigger(TriggerRef::Action(action.to_owned()))
    }

    pub fn with_port_trigger(self, port: PortRef) -> Self {
        self.with_trigger(TriggerRef::Port(port))
    }

    pub fn with_source(mut self, port: PortRef) -> Self {
        self.sources.push(port);
        self
    }

    pub fn with_port_effect(mut self, port: PortRef) -> Self {
        self.effects.push(EffectRef::Port(port));
        self
    }

    pub fn with_action_effect(mut self, action: &str) -> Self {
        self.effects.push(EffectRef::Action(action.to_owned()));
        self
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = Some(body.to_owned());
        self
    }
}

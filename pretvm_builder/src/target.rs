//! The target-types adapter: everything the scheduler needs to know about
//! rendering types, time literals, and generated reaction bodies in the
//! target language. The backend itself never interprets the produced strings.

use std::fmt::Debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Nsec,
    Usec,
    Msec,
    Sec,
    Minute,
    Hour,
    Day,
    Week,
}

impl TimeUnit {
    pub fn suffix(&self) -> &'static str {
        match self {
            TimeUnit::Nsec => "nsec",
            TimeUnit::Usec => "usec",
            TimeUnit::Msec => "msec",
            TimeUnit::Sec => "sec",
            TimeUnit::Minute => "minute",
            TimeUnit::Hour => "hour",
            TimeUnit::Day => "day",
            TimeUnit::Week => "week",
        }
    }
}

/// A type as inferred by the upstream validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InferredType {
    /// No type could be inferred (untyped port or action).
    Undefined,
    /// A time value in the target's native time representation.
    Time,
    /// A named target-language type, possibly with type arguments.
    Named {
        name: String,
        type_args: Vec<InferredType>,
    },
}

impl InferredType {
    pub fn named(name: &str) -> Self {
        Self::Named {
            name: name.to_owned(),
            type_args: Vec::new(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
#[error("The target does not support {0}")]
pub struct UnsupportedFeature(pub String);

/// How the target language renders the constructs the backend generates.
pub trait TargetTypes: Debug {
    /// Whether generated reactors may carry type parameters.
    fn supports_generics(&self) -> bool;

    fn render_time_literal(&self, magnitude: i64, unit: TimeUnit) -> String;

    fn render_type(&self, ty: &InferredType) -> Result<String, UnsupportedFeature>;

    /// Body of the reaction that schedules `action` when `port` is present,
    /// used by the delayed-connection transformation.
    fn render_delay_reaction_body(&self, action: &str, port: &str) -> String;

    /// Body of the reaction that forwards a triggered `action` to `port`.
    fn render_forward_body(&self, action: &str, port: &str) -> String;
}

/// The reference adapter for a C-flavored target runtime.
#[derive(Debug, Default)]
pub struct CTargetTypes;

impl TargetTypes for CTargetTypes {
    fn supports_generics(&self) -> bool {
        false
    }

    fn render_time_literal(&self, magnitude: i64, unit: TimeUnit) -> String {
        format!("{} {}", magnitude, unit.suffix())
    }

    fn render_type(&self, ty: &InferredType) -> Result<String, UnsupportedFeature> {
        match ty {
            InferredType::Undefined => Ok("void".to_owned()),
            InferredType::Time => Ok("interval_t".to_owned()),
            InferredType::Named { name, type_args } if type_args.is_empty() => Ok(name.clone()),
            InferredType::Named { name, .. } => Err(UnsupportedFeature(format!(
                "generic type '{name}'"
            ))),
        }
    }

    fn render_delay_reaction_body(&self, action: &str, port: &str) -> String {
        format!("lf_schedule({action}, 0);\n(void){port};")
    }

    fn render_forward_body(&self, action: &str, port: &str) -> String {
        format!("lf_set({port}, {action}->value);")
    }
}

//! Recording operators shared by unit tests

use std::sync::{Arc, Mutex};

use glam::Vec3;

use super::execution_engine::ExecutionContext;
use super::factory::PortDefinition;
use super::interface::{NodeData, ParamValue, Parameters};
use super::operator::{Operator, OperatorKind};
use super::port::SocketKind;
use crate::error::ExecutionError;

/// Shared record of operator invocations, in call order
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog(Arc<Mutex<Vec<String>>>);

impl ExecutionLog {
    pub fn record(&self, label: &str) {
        self.0.lock().unwrap().push(label.to_string());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, label: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|entry| *entry == label).count()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

#[derive(Debug)]
enum Behaviour {
    Constant(Vec3),
    Scale(f32),
    Sum,
    Sink,
    Fail,
}

/// Vector-typed operator that logs every `execute` call
#[derive(Debug)]
pub struct Probe {
    label: String,
    behaviour: Behaviour,
    log: ExecutionLog,
    result: Option<NodeData>,
}

impl Probe {
    fn boxed(label: &str, behaviour: Behaviour, log: &ExecutionLog) -> Box<dyn Operator> {
        Box::new(Self {
            label: label.to_string(),
            behaviour,
            log: log.clone(),
            result: None,
        })
    }

    pub fn source(label: &str, value: Vec3, log: &ExecutionLog) -> Box<dyn Operator> {
        Self::boxed(label, Behaviour::Constant(value), log)
    }

    /// Multiplies its input by the `factor` parameter
    pub fn scale(label: &str, factor: f32, log: &ExecutionLog) -> Box<dyn Operator> {
        Self::boxed(label, Behaviour::Scale(factor), log)
    }

    pub fn sum(label: &str, log: &ExecutionLog) -> Box<dyn Operator> {
        Self::boxed(label, Behaviour::Sum, log)
    }

    pub fn sink(label: &str, log: &ExecutionLog) -> Box<dyn Operator> {
        Self::boxed(label, Behaviour::Sink, log)
    }

    pub fn failing(label: &str, log: &ExecutionLog) -> Box<dyn Operator> {
        Self::boxed(label, Behaviour::Fail, log)
    }
}

impl Operator for Probe {
    fn type_name(&self) -> &'static str {
        "Probe"
    }

    fn kind(&self) -> OperatorKind {
        match self.behaviour {
            Behaviour::Sink => OperatorKind::Viewer,
            _ => OperatorKind::Generic,
        }
    }

    fn inputs(&self) -> Vec<PortDefinition> {
        match self.behaviour {
            Behaviour::Constant(_) => vec![],
            Behaviour::Sum => vec![
                PortDefinition::required("in0", SocketKind::Vector),
                PortDefinition::optional("in1", SocketKind::Vector),
            ],
            _ => vec![PortDefinition::required("in0", SocketKind::Vector)],
        }
    }

    fn outputs(&self) -> Vec<PortDefinition> {
        match self.behaviour {
            Behaviour::Sink => vec![],
            _ => vec![PortDefinition::required("out", SocketKind::Vector)],
        }
    }

    fn default_parameters(&self) -> Parameters {
        match self.behaviour {
            Behaviour::Scale(factor) => Parameters::new().with("factor", ParamValue::Float(factor)),
            _ => Parameters::new(),
        }
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), ExecutionError> {
        self.log.record(&self.label);
        match self.behaviour {
            Behaviour::Constant(value) => ctx.set_output(0, NodeData::Vector3(value)),
            Behaviour::Scale(default) => {
                let factor = ctx.parameters().float_or("factor", default);
                let value = ctx.input_vector(0)?;
                ctx.set_output(0, NodeData::Vector3(value * factor));
            }
            Behaviour::Sum => {
                let mut total = ctx.input_vector(0)?;
                if let Some(NodeData::Vector3(extra)) = ctx.optional_input(1)? {
                    total += extra;
                }
                ctx.set_output(0, NodeData::Vector3(total));
            }
            Behaviour::Sink => {
                self.result = Some(ctx.input(0)?);
            }
            Behaviour::Fail => return Err(ExecutionError::Failed(format!("{} failed", self.label))),
        }
        Ok(())
    }

    fn result(&self) -> Option<&NodeData> {
        self.result.as_ref()
    }
}

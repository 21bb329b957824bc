//! Point operators: nodes that only exist as bytecode inside a point graph
//!
//! Each `compile` emits the opcode, the offsets of its inputs, its constant
//! operands, and then reserves its outputs so they directly follow the
//! operands. The interpreter relies on that layout.

use glam::Vec3;
use log::warn;

use super::compiler::CompileContext;
use super::noise::FlowNoise;
use super::stack::{MathOperation, OpCode};
use crate::error::{CompileError, ExecutionError};
use crate::nodes::execution_engine::ExecutionContext;
use crate::nodes::factory::{NodeCategory, NodeFactory, NodeMetadata, PortDefinition};
use crate::nodes::interface::{ParamValue, Parameters};
use crate::nodes::operator::{Operator, OperatorKind};
use crate::nodes::SocketKind;

fn compiled_only(ctx: &ExecutionContext<'_>) -> ExecutionError {
    ExecutionError::Failed(format!("'{}' only runs compiled inside a point graph", ctx.node_name()))
}

/// Declares the parts every point operator shares
macro_rules! point_operator {
    ($ty:ident) => {
        impl $ty {
            fn boxed() -> Box<dyn Operator> {
                Box::new(Self::default())
            }
        }
    };
}

/// Per-datum input: the point position
#[derive(Debug, Default, Clone)]
pub struct EntryOperator;
point_operator!(EntryOperator);

impl NodeFactory for EntryOperator {
    fn metadata() -> NodeMetadata {
        NodeMetadata::new("point.entry", "Entry", NodeCategory::point(), "Position of the point being evaluated")
            .with_tags(vec!["input", "position"])
    }

    fn create() -> Box<dyn Operator> {
        Self::boxed()
    }
}

impl Operator for EntryOperator {
    fn type_name(&self) -> &'static str {
        "point.entry"
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::Point
    }

    fn inputs(&self) -> Vec<PortDefinition> {
        vec![]
    }

    fn outputs(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::required("position", SocketKind::Vector)]
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), ExecutionError> {
        Err(compiled_only(ctx))
    }

    fn compile(&self, ctx: &mut CompileContext<'_>) -> Result<(), CompileError> {
        ctx.emit_opcode(OpCode::Entry)?;
        ctx.reserve_output(0)?;
        Ok(())
    }
}

/// Scalar constant
#[derive(Debug, Default, Clone)]
pub struct ValueOperator;
point_operator!(ValueOperator);

impl NodeFactory for ValueOperator {
    fn metadata() -> NodeMetadata {
        NodeMetadata::new("point.value", "Value", NodeCategory::point(), "Constant scalar")
    }

    fn create() -> Box<dyn Operator> {
        Self::boxed()
    }
}

impl Operator for ValueOperator {
    fn type_name(&self) -> &'static str {
        "point.value"
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::Point
    }

    fn inputs(&self) -> Vec<PortDefinition> {
        vec![]
    }

    fn outputs(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::required("value", SocketKind::Scalar)]
    }

    fn default_parameters(&self) -> Parameters {
        Parameters::new().with("value", ParamValue::Float(0.0))
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), ExecutionError> {
        Err(compiled_only(ctx))
    }

    fn compile(&self, ctx: &mut CompileContext<'_>) -> Result<(), CompileError> {
        let value = ctx.parameters().float_or("value", 0.0);
        ctx.emit_opcode(OpCode::Value)?;
        let slot = ctx.reserve_output(0)?;
        ctx.store(slot, &[value])
    }
}

/// Vector constant
#[derive(Debug, Default, Clone)]
pub struct VectorOperator;
point_operator!(VectorOperator);

impl NodeFactory for VectorOperator {
    fn metadata() -> NodeMetadata {
        NodeMetadata::new("point.vector", "Vector", NodeCategory::point(), "Constant vector")
    }

    fn create() -> Box<dyn Operator> {
        Self::boxed()
    }
}

impl Operator for VectorOperator {
    fn type_name(&self) -> &'static str {
        "point.vector"
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::Point
    }

    fn inputs(&self) -> Vec<PortDefinition> {
        vec![]
    }

    fn outputs(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::required("vector", SocketKind::Vector)]
    }

    fn default_parameters(&self) -> Parameters {
        Parameters::new().with("value", ParamValue::Vector(Vec3::ZERO))
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), ExecutionError> {
        Err(compiled_only(ctx))
    }

    fn compile(&self, ctx: &mut CompileContext<'_>) -> Result<(), CompileError> {
        let value = ctx.parameters().vector_or("value", Vec3::ZERO);
        ctx.emit_opcode(OpCode::Vector)?;
        let slot = ctx.reserve_output(0)?;
        ctx.store(slot, &value.to_array())
    }
}

/// Component-wise arithmetic on two vectors
#[derive(Debug, Default, Clone)]
pub struct MathOperator;
point_operator!(MathOperator);

impl NodeFactory for MathOperator {
    fn metadata() -> NodeMetadata {
        NodeMetadata::new("point.math", "Math", NodeCategory::point(), "Add, subtract, multiply or divide two vectors")
            .with_tags(vec!["add", "subtract", "multiply", "divide"])
    }

    fn create() -> Box<dyn Operator> {
        Self::boxed()
    }
}

impl Operator for MathOperator {
    fn type_name(&self) -> &'static str {
        "point.math"
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::Point
    }

    fn inputs(&self) -> Vec<PortDefinition> {
        vec![
            PortDefinition::required("a", SocketKind::Vector),
            PortDefinition::required("b", SocketKind::Vector),
        ]
    }

    fn outputs(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::required("result", SocketKind::Vector)]
    }

    fn default_parameters(&self) -> Parameters {
        Parameters::new().with("operation", ParamValue::Text(MathOperation::Add.name().to_string()))
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), ExecutionError> {
        Err(compiled_only(ctx))
    }

    fn compile(&self, ctx: &mut CompileContext<'_>) -> Result<(), CompileError> {
        let name = ctx.parameters().text_or("operation", "add");
        let operation = MathOperation::from_name(name).unwrap_or_else(|| {
            warn!("Unknown math operation '{}' on '{}', using add", name, ctx.node_name());
            MathOperation::Add
        });
        ctx.emit_opcode(OpCode::Math)?;
        ctx.emit_input(0)?;
        ctx.emit_input(1)?;
        ctx.emit(operation.code())?;
        ctx.reserve_output(0)?;
        Ok(())
    }
}

/// Vector into three scalars
#[derive(Debug, Default, Clone)]
pub struct SplitVectorOperator;
point_operator!(SplitVectorOperator);

impl NodeFactory for SplitVectorOperator {
    fn metadata() -> NodeMetadata {
        NodeMetadata::new("point.split_vector", "Split Vector", NodeCategory::point(), "Separate x, y and z")
    }

    fn create() -> Box<dyn Operator> {
        Self::boxed()
    }
}

impl Operator for SplitVectorOperator {
    fn type_name(&self) -> &'static str {
        "point.split_vector"
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::Point
    }

    fn inputs(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::required("vector", SocketKind::Vector)]
    }

    fn outputs(&self) -> Vec<PortDefinition> {
        vec![
            PortDefinition::required("x", SocketKind::Scalar),
            PortDefinition::required("y", SocketKind::Scalar),
            PortDefinition::required("z", SocketKind::Scalar),
        ]
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), ExecutionError> {
        Err(compiled_only(ctx))
    }

    fn compile(&self, ctx: &mut CompileContext<'_>) -> Result<(), CompileError> {
        ctx.emit_opcode(OpCode::SplitVector)?;
        ctx.emit_input(0)?;
        for port in 0..3 {
            ctx.reserve_output(port)?;
        }
        Ok(())
    }
}

/// Three scalars into a vector
#[derive(Debug, Default, Clone)]
pub struct CombineVectorOperator;
point_operator!(CombineVectorOperator);

impl NodeFactory for CombineVectorOperator {
    fn metadata() -> NodeMetadata {
        NodeMetadata::new("point.combine_vector", "Combine Vector", NodeCategory::point(), "Build a vector from x, y and z")
    }

    fn create() -> Box<dyn Operator> {
        Self::boxed()
    }
}

impl Operator for CombineVectorOperator {
    fn type_name(&self) -> &'static str {
        "point.combine_vector"
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::Point
    }

    fn inputs(&self) -> Vec<PortDefinition> {
        vec![
            PortDefinition::required("x", SocketKind::Scalar),
            PortDefinition::required("y", SocketKind::Scalar),
            PortDefinition::required("z", SocketKind::Scalar),
        ]
    }

    fn outputs(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::required("vector", SocketKind::Vector)]
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), ExecutionError> {
        Err(compiled_only(ctx))
    }

    fn compile(&self, ctx: &mut CompileContext<'_>) -> Result<(), CompileError> {
        ctx.emit_opcode(OpCode::CombineVector)?;
        for port in 0..3 {
            ctx.emit_input(port)?;
        }
        ctx.reserve_output(0)?;
        Ok(())
    }
}

/// Fractal flow noise sampled at a position.
///
/// With `dimension` 1 a single generator is splatted to all components,
/// with 3 each component has its own seed.
#[derive(Debug, Default, Clone)]
pub struct NoiseOperator;
point_operator!(NoiseOperator);

impl NodeFactory for NoiseOperator {
    fn metadata() -> NodeMetadata {
        NodeMetadata::new("point.noise", "Noise", NodeCategory::point(), "Fractal flow noise")
            .with_tags(vec!["fbm", "turbulence", "procedural"])
    }

    fn create() -> Box<dyn Operator> {
        Self::boxed()
    }
}

impl Operator for NoiseOperator {
    fn type_name(&self) -> &'static str {
        "point.noise"
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::Point
    }

    fn inputs(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::required("position", SocketKind::Vector)]
    }

    fn outputs(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::required("noise", SocketKind::Vector)]
    }

    fn default_parameters(&self) -> Parameters {
        Parameters::new()
            .with("dimension", ParamValue::Int(3))
            .with("seed", ParamValue::Int(0))
            .with("time_scale", ParamValue::Float(1.0))
            .with("turbulent", ParamValue::Bool(false))
            .with("frequency", ParamValue::Vector(Vec3::ONE))
            .with("offset", ParamValue::Vector(Vec3::ZERO))
            .with("octaves", ParamValue::Int(3))
            .with("amplitude", ParamValue::Float(1.0))
            .with("persistence", ParamValue::Float(0.5))
            .with("lacunarity", ParamValue::Float(2.0))
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), ExecutionError> {
        Err(compiled_only(ctx))
    }

    fn compile(&self, ctx: &mut CompileContext<'_>) -> Result<(), CompileError> {
        let params = ctx.parameters().clone();
        let dimension: u64 = if params.int_or("dimension", 3) == 1 { 1 } else { 3 };
        let seed = params.int_or("seed", 0).max(0) as u64;
        let time = ctx.time() * params.float_or("time_scale", 1.0);

        ctx.emit_opcode(OpCode::Noise)?;
        ctx.emit_input(0)?;
        ctx.emit(dimension as f32)?;
        for component in 0..dimension {
            let handle = ctx.add_noise(FlowNoise::new(seed + component).with_time(time));
            ctx.emit(handle as f32)?;
        }
        ctx.emit(if params.bool_or("turbulent", false) { 1.0 } else { 0.0 })?;
        for value in params.vector_or("frequency", Vec3::ONE).to_array() {
            ctx.emit(value)?;
        }
        for value in params.vector_or("offset", Vec3::ZERO).to_array() {
            ctx.emit(value)?;
        }
        ctx.emit(params.int_or("octaves", 3).max(0) as f32)?;
        ctx.emit(params.float_or("amplitude", 1.0))?;
        ctx.emit(params.float_or("persistence", 0.5))?;
        ctx.emit(params.float_or("lacunarity", 2.0))?;
        ctx.reserve_output(0)?;
        Ok(())
    }
}

/// Linear remap of each component from one interval to another
#[derive(Debug, Default, Clone)]
pub struct RangeRemapOperator;
point_operator!(RangeRemapOperator);

impl NodeFactory for RangeRemapOperator {
    fn metadata() -> NodeMetadata {
        NodeMetadata::new("point.range_remap", "Range Remap", NodeCategory::point(), "Map values between intervals")
    }

    fn create() -> Box<dyn Operator> {
        Self::boxed()
    }
}

impl Operator for RangeRemapOperator {
    fn type_name(&self) -> &'static str {
        "point.range_remap"
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::Point
    }

    fn inputs(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::required("value", SocketKind::Vector)]
    }

    fn outputs(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::required("result", SocketKind::Vector)]
    }

    fn default_parameters(&self) -> Parameters {
        Parameters::new()
            .with("old_min", ParamValue::Float(0.0))
            .with("old_max", ParamValue::Float(1.0))
            .with("new_min", ParamValue::Float(0.0))
            .with("new_max", ParamValue::Float(1.0))
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), ExecutionError> {
        Err(compiled_only(ctx))
    }

    fn compile(&self, ctx: &mut CompileContext<'_>) -> Result<(), CompileError> {
        let params = ctx.parameters().clone();
        ctx.emit_opcode(OpCode::RangeRemap)?;
        ctx.emit_input(0)?;
        ctx.emit(params.float_or("old_min", 0.0))?;
        ctx.emit(params.float_or("old_max", 1.0))?;
        ctx.emit(params.float_or("new_min", 0.0))?;
        ctx.emit(params.float_or("new_max", 1.0))?;
        ctx.reserve_output(0)?;
        Ok(())
    }
}

/// Per-datum result of the point graph
#[derive(Debug, Default, Clone)]
pub struct ExitOperator;
point_operator!(ExitOperator);

impl NodeFactory for ExitOperator {
    fn metadata() -> NodeMetadata {
        NodeMetadata::new("point.exit", "Exit", NodeCategory::point(), "Value written back for each point")
            .with_tags(vec!["output"])
    }

    fn create() -> Box<dyn Operator> {
        Self::boxed()
    }
}

impl Operator for ExitOperator {
    fn type_name(&self) -> &'static str {
        "point.exit"
    }

    fn kind(&self) -> OperatorKind {
        OperatorKind::Point
    }

    fn inputs(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::required("result", SocketKind::Vector)]
    }

    fn outputs(&self) -> Vec<PortDefinition> {
        vec![PortDefinition::required("result", SocketKind::Vector)]
    }

    fn execute(&mut self, ctx: &mut ExecutionContext<'_>) -> Result<(), ExecutionError> {
        Err(compiled_only(ctx))
    }

    fn compile(&self, ctx: &mut CompileContext<'_>) -> Result<(), CompileError> {
        ctx.emit_opcode(OpCode::Exit)?;
        ctx.emit_input(0)?;
        ctx.reserve_output(0)?;
        ctx.mark_exit();
        Ok(())
    }
}

//! Point graphs: small graphs of point operators compiled to bytecode and
//! interpreted once per point

pub mod compiler;
pub mod interpreter;
pub mod noise;
pub mod operators;
pub mod point_graph;
pub mod stack;

pub use compiler::{compile_graph, CompileContext, CompiledProgram};
pub use interpreter::{execute_program, execute_stack};
pub use point_graph::PointGraphOperator;

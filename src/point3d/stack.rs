//! Fixed-capacity float stack holding compiled point-graph bytecode
//!
//! Opcodes, operand offsets, compile-time constants and node output slots
//! are interleaved in one buffer. Every output slot is reserved right after
//! the operands of the instruction that writes it.

use glam::Vec3;

use crate::constants::stack::UNRESOLVED;
use crate::error::{CompileError, InterpretError};

/// Instruction tags. Stored on the stack as floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Entry = 1,
    Value = 2,
    Vector = 3,
    Math = 4,
    SplitVector = 5,
    CombineVector = 6,
    Noise = 7,
    RangeRemap = 8,
    Exit = 9,
}

impl OpCode {
    pub fn to_f32(self) -> f32 {
        self as u8 as f32
    }

    pub fn from_f32(value: f32) -> Option<Self> {
        if value.fract() != 0.0 {
            return None;
        }
        match value as i32 {
            1 => Some(OpCode::Entry),
            2 => Some(OpCode::Value),
            3 => Some(OpCode::Vector),
            4 => Some(OpCode::Math),
            5 => Some(OpCode::SplitVector),
            6 => Some(OpCode::CombineVector),
            7 => Some(OpCode::Noise),
            8 => Some(OpCode::RangeRemap),
            9 => Some(OpCode::Exit),
            _ => None,
        }
    }
}

/// Element-wise operation applied by math instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOperation {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl MathOperation {
    pub fn code(self) -> f32 {
        match self {
            MathOperation::Add => 0.0,
            MathOperation::Subtract => 1.0,
            MathOperation::Multiply => 2.0,
            MathOperation::Divide => 3.0,
        }
    }

    pub fn from_code(code: f32) -> Option<Self> {
        match code as i32 {
            0 => Some(MathOperation::Add),
            1 => Some(MathOperation::Subtract),
            2 => Some(MathOperation::Multiply),
            3 => Some(MathOperation::Divide),
            _ => None,
        }
    }

    /// Parse the `operation` parameter
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "add" => Some(MathOperation::Add),
            "subtract" | "sub" => Some(MathOperation::Subtract),
            "multiply" | "mul" => Some(MathOperation::Multiply),
            "divide" | "div" => Some(MathOperation::Divide),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            MathOperation::Add => "add",
            MathOperation::Subtract => "subtract",
            MathOperation::Multiply => "multiply",
            MathOperation::Divide => "divide",
        }
    }

    /// Division by zero yields zero in that component
    pub fn apply(self, a: Vec3, b: Vec3) -> Vec3 {
        match self {
            MathOperation::Add => a + b,
            MathOperation::Subtract => a - b,
            MathOperation::Multiply => a * b,
            MathOperation::Divide => Vec3::new(safe_div(a.x, b.x), safe_div(a.y, b.y), safe_div(a.z, b.z)),
        }
    }
}

fn safe_div(a: f32, b: f32) -> f32 {
    if b == 0.0 {
        0.0
    } else {
        a / b
    }
}

/// Bytecode buffer with a bounds-checked write cursor
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStack {
    data: Vec<f32>,
    capacity: usize,
}

impl CompiledStack {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn reset(&mut self) {
        self.data.clear();
    }

    /// Write cursor: number of slots in use
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Append one value, returning its position
    pub fn push(&mut self, value: f32) -> Result<usize, CompileError> {
        let offset = self.allocate(1)?;
        self.data[offset] = value;
        Ok(offset)
    }

    /// Reserve `count` zeroed slots at the cursor, returning the first position
    pub fn allocate(&mut self, count: usize) -> Result<usize, CompileError> {
        let offset = self.data.len();
        let requested = offset + count;
        if requested > self.capacity {
            return Err(CompileError::StackOverflow {
                capacity: self.capacity,
                requested,
            });
        }
        self.data.resize(requested, 0.0);
        Ok(offset)
    }

    /// Overwrite already allocated slots
    pub fn store(&mut self, offset: usize, values: &[f32]) -> Result<(), CompileError> {
        match self.data.get_mut(offset..offset + values.len()) {
            Some(slots) if offset != UNRESOLVED => {
                slots.copy_from_slice(values);
                Ok(())
            }
            _ => Err(CompileError::StackOverflow {
                capacity: self.capacity,
                requested: offset + values.len(),
            }),
        }
    }
}

/// Bounds-checked reads and writes on an interpreter's working copy
pub(crate) struct StackView<'a> {
    data: &'a mut [f32],
}

impl<'a> StackView<'a> {
    pub fn new(data: &'a mut [f32]) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn read(&self, position: usize) -> Result<f32, InterpretError> {
        self.data.get(position).copied().ok_or(InterpretError::OutOfBounds(position))
    }

    /// Read an operand holding a stack offset
    pub fn read_offset(&self, position: usize) -> Result<usize, InterpretError> {
        let value = self.read(position)?;
        if value < 0.0 || value.fract() != 0.0 || value >= self.data.len() as f32 {
            return Err(InterpretError::OutOfBounds(position));
        }
        Ok(value as usize)
    }

    pub fn read_vec3(&self, position: usize) -> Result<Vec3, InterpretError> {
        match self.data.get(position..).and_then(|rest| rest.get(..3)) {
            Some(v) => Ok(Vec3::new(v[0], v[1], v[2])),
            None => Err(InterpretError::OutOfBounds(position)),
        }
    }

    pub fn write(&mut self, position: usize, value: f32) -> Result<(), InterpretError> {
        let slot = self.data.get_mut(position).ok_or(InterpretError::OutOfBounds(position))?;
        *slot = value;
        Ok(())
    }

    pub fn write_vec3(&mut self, position: usize, value: Vec3) -> Result<(), InterpretError> {
        match self.data.get_mut(position..).and_then(|rest| rest.get_mut(..3)) {
            Some(slots) => {
                slots.copy_from_slice(&value.to_array());
                Ok(())
            }
            None => Err(InterpretError::OutOfBounds(position)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_encoding() {
        for op in [OpCode::Entry, OpCode::Math, OpCode::Exit] {
            assert_eq!(OpCode::from_f32(op.to_f32()), Some(op));
        }
        assert_eq!(OpCode::from_f32(0.0), None);
        assert_eq!(OpCode::from_f32(4.5), None);
        assert_eq!(OpCode::from_f32(42.0), None);
    }

    #[test]
    fn test_allocate_is_bounds_checked() {
        let mut stack = CompiledStack::new(8);
        assert_eq!(stack.push(1.0).unwrap(), 0);
        assert_eq!(stack.allocate(3).unwrap(), 1);
        assert_eq!(stack.allocate(4).unwrap(), 4);
        let err = stack.allocate(1).unwrap_err();
        assert_eq!(err, CompileError::StackOverflow { capacity: 8, requested: 9 });
        assert_eq!(stack.len(), 8);

        stack.reset();
        assert!(stack.is_empty());
    }

    #[test]
    fn test_store_into_allocated_slots() {
        let mut stack = CompiledStack::new(4);
        stack.push(OpCode::Vector.to_f32()).unwrap();
        let slot = stack.allocate(3).unwrap();
        stack.store(slot, &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(stack.as_slice(), &[3.0, 1.0, 2.0, 3.0]);
        assert!(stack.store(2, &[0.0, 0.0, 0.0]).is_err());
    }

    #[test]
    fn test_math_operations() {
        let a = Vec3::new(6.0, 4.0, 1.0);
        let b = Vec3::new(2.0, 0.0, 4.0);
        assert_eq!(MathOperation::Add.apply(a, b), Vec3::new(8.0, 4.0, 5.0));
        assert_eq!(MathOperation::Subtract.apply(a, b), Vec3::new(4.0, 4.0, -3.0));
        assert_eq!(MathOperation::Multiply.apply(a, b), Vec3::new(12.0, 0.0, 4.0));
        assert_eq!(MathOperation::Divide.apply(a, b), Vec3::new(3.0, 0.0, 0.25));
        assert_eq!(MathOperation::from_name("mul"), Some(MathOperation::Multiply));
        assert_eq!(MathOperation::from_code(MathOperation::Divide.code()), Some(MathOperation::Divide));
    }

    #[test]
    fn test_view_rejects_out_of_range() {
        let mut data = vec![0.0; 4];
        let mut view = StackView::new(&mut data);
        assert!(view.write_vec3(1, Vec3::ONE).is_ok());
        assert_eq!(view.write_vec3(2, Vec3::ONE), Err(InterpretError::OutOfBounds(2)));
        assert_eq!(view.read(9), Err(InterpretError::OutOfBounds(9)));
        assert_eq!(view.read_vec3(1).unwrap(), Vec3::ONE);
        assert_eq!(view.read_vec3(usize::MAX), Err(InterpretError::OutOfBounds(usize::MAX)));
        assert_eq!(view.write_vec3(usize::MAX, Vec3::ONE), Err(InterpretError::OutOfBounds(usize::MAX)));
    }

    #[test]
    fn test_offsets_must_point_inside_the_stack() {
        let mut data = vec![3.0, 1.0e30, 4.0, -1.0, 1.5, 0.0];
        let view = StackView::new(&mut data);
        assert_eq!(view.read_offset(0).unwrap(), 3);
        assert_eq!(view.read_offset(1), Err(InterpretError::OutOfBounds(1)));
        assert_eq!(view.read_offset(2).unwrap(), 4);
        assert_eq!(view.read_offset(3), Err(InterpretError::OutOfBounds(3)));
        assert_eq!(view.read_offset(4), Err(InterpretError::OutOfBounds(4)));

        let mut short = vec![2.0, 0.0];
        let view = StackView::new(&mut short);
        assert_eq!(view.read_offset(0), Err(InterpretError::OutOfBounds(0)));
    }
}

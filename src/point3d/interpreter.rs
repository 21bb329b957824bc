//! Executes compiled point-graph bytecode for one datum

use glam::Vec3;

use super::compiler::CompiledProgram;
use super::noise::{fractal_sum, FractalParameters, NoiseRegistry};
use super::stack::{MathOperation, OpCode, StackView};
use crate::error::InterpretError;

/// Run the instruction stream in `stack` with `input` as the entry value.
///
/// `stack` is a working copy: output slots are overwritten in place.
/// Returns the value reaching the first exit instruction.
pub fn execute_stack(stack: &mut [f32], noises: &NoiseRegistry, input: Vec3) -> Result<Vec3, InterpretError> {
    let mut view = StackView::new(stack);
    let mut pc = 0;

    while pc < view.len() {
        let value = view.read(pc)?;
        let opcode = OpCode::from_f32(value).ok_or(InterpretError::InvalidOpcode { position: pc, value })?;
        pc += 1;

        match opcode {
            OpCode::Entry => {
                view.write_vec3(pc, input)?;
                pc += 3;
            }
            // Constants were written into their slots at compile time.
            OpCode::Value => pc += 1,
            OpCode::Vector => pc += 3,
            OpCode::Math => {
                let a = view.read_vec3(view.read_offset(pc)?)?;
                let b = view.read_vec3(view.read_offset(pc + 1)?)?;
                let code = view.read(pc + 2)?;
                let operation = MathOperation::from_code(code).ok_or(InterpretError::InvalidOpcode {
                    position: pc + 2,
                    value: code,
                })?;
                view.write_vec3(pc + 3, operation.apply(a, b))?;
                pc += 6;
            }
            OpCode::SplitVector => {
                let v = view.read_vec3(view.read_offset(pc)?)?;
                view.write(pc + 1, v.x)?;
                view.write(pc + 2, v.y)?;
                view.write(pc + 3, v.z)?;
                pc += 4;
            }
            OpCode::CombineVector => {
                let x = view.read(view.read_offset(pc)?)?;
                let y = view.read(view.read_offset(pc + 1)?)?;
                let z = view.read(view.read_offset(pc + 2)?)?;
                view.write_vec3(pc + 3, Vec3::new(x, y, z))?;
                pc += 6;
            }
            OpCode::Noise => {
                let position = view.read_vec3(view.read_offset(pc)?)?;
                let dimension = view.read(pc + 1)?;
                let count = match dimension as i32 {
                    1 => 1,
                    3 => 3,
                    _ => {
                        return Err(InterpretError::InvalidOpcode {
                            position: pc + 1,
                            value: dimension,
                        })
                    }
                };
                let mut handles = [0usize; 3];
                for (i, handle) in handles.iter_mut().take(count).enumerate() {
                    *handle = view.read_offset(pc + 2 + i)?;
                }
                let cursor = pc + 2 + count;
                let frequency = view.read_vec3(cursor + 1)?;
                let params = FractalParameters {
                    turbulent: view.read(cursor)? != 0.0,
                    // A scalar noise scales every axis by the first component.
                    frequency: if count == 1 { Vec3::splat(frequency.x) } else { frequency },
                    offset: view.read_vec3(cursor + 4)?,
                    octaves: view.read(cursor + 7)?.max(0.0) as u32,
                    amplitude: view.read(cursor + 8)?,
                    persistence: view.read(cursor + 9)?,
                    lacunarity: view.read(cursor + 10)?,
                };

                let sample = |handle: usize| {
                    noises
                        .get(handle)
                        .map(|noise| fractal_sum(noise, position, &params))
                        .ok_or(InterpretError::UnknownNoise(handle))
                };
                let result = if count == 1 {
                    Vec3::splat(sample(handles[0])?)
                } else {
                    Vec3::new(sample(handles[0])?, sample(handles[1])?, sample(handles[2])?)
                };

                let out = cursor + 11;
                view.write_vec3(out, result)?;
                pc = out + 3;
            }
            OpCode::RangeRemap => {
                let v = view.read_vec3(view.read_offset(pc)?)?;
                let old_min = view.read(pc + 1)?;
                let old_max = view.read(pc + 2)?;
                let new_min = view.read(pc + 3)?;
                let new_max = view.read(pc + 4)?;
                let span = old_max - old_min;
                let remapped = if span == 0.0 {
                    Vec3::splat(new_min)
                } else {
                    Vec3::splat(new_min) + (v - Vec3::splat(old_min)) / span * (new_max - new_min)
                };
                view.write_vec3(pc + 5, remapped)?;
                pc += 8;
            }
            OpCode::Exit => {
                let v = view.read_vec3(view.read_offset(pc)?)?;
                view.write_vec3(pc + 1, v)?;
                return Ok(v);
            }
        }
    }

    Err(InterpretError::NoExit)
}

/// Run a program on a fresh copy of its stack
pub fn execute_program(program: &CompiledProgram, input: Vec3) -> Result<Vec3, InterpretError> {
    let mut working = program.stack.as_slice().to_vec();
    execute_stack(&mut working, &program.noises, input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_to_exit() {
        let mut stack = vec![
            OpCode::Entry.to_f32(), 0.0, 0.0, 0.0,
            OpCode::Exit.to_f32(), 1.0, 0.0, 0.0, 0.0,
        ];
        let out = execute_stack(&mut stack, &NoiseRegistry::new(), Vec3::new(1.0, 2.0, 3.0)).unwrap();
        assert_eq!(out, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(&stack[6..9], &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_split_then_combine_swizzles() {
        let mut stack = vec![
            OpCode::Entry.to_f32(), 0.0, 0.0, 0.0,
            OpCode::SplitVector.to_f32(), 1.0, 0.0, 0.0, 0.0,
            // z, y, x
            OpCode::CombineVector.to_f32(), 8.0, 7.0, 6.0, 0.0, 0.0, 0.0,
            OpCode::Exit.to_f32(), 13.0, 0.0, 0.0, 0.0,
        ];
        let out = execute_stack(&mut stack, &NoiseRegistry::new(), Vec3::new(1.0, 2.0, 3.0)).unwrap();
        assert_eq!(out, Vec3::new(3.0, 2.0, 1.0));
    }

    #[test]
    fn test_range_remap() {
        let mut stack = vec![
            OpCode::Entry.to_f32(), 0.0, 0.0, 0.0,
            OpCode::RangeRemap.to_f32(), 1.0, 0.0, 10.0, -1.0, 1.0, 0.0, 0.0, 0.0,
            OpCode::Exit.to_f32(), 10.0, 0.0, 0.0, 0.0,
        ];
        let out = execute_stack(&mut stack, &NoiseRegistry::new(), Vec3::new(0.0, 5.0, 10.0)).unwrap();
        assert_eq!(out, Vec3::new(-1.0, 0.0, 1.0));
    }

    #[test]
    fn test_invalid_opcode() {
        let mut stack = vec![42.0];
        let err = execute_stack(&mut stack, &NoiseRegistry::new(), Vec3::ZERO).unwrap_err();
        assert_eq!(err, InterpretError::InvalidOpcode { position: 0, value: 42.0 });
    }

    #[test]
    fn test_missing_exit() {
        let mut stack = vec![OpCode::Vector.to_f32(), 1.0, 2.0, 3.0];
        let err = execute_stack(&mut stack, &NoiseRegistry::new(), Vec3::ZERO).unwrap_err();
        assert_eq!(err, InterpretError::NoExit);
    }

    #[test]
    fn test_damaged_offset_is_out_of_bounds() {
        let mut stack = vec![OpCode::Exit.to_f32(), 1.0e30, 0.0, 0.0, 0.0];
        let err = execute_stack(&mut stack, &NoiseRegistry::new(), Vec3::ONE).unwrap_err();
        assert_eq!(err, InterpretError::OutOfBounds(1));
    }

    #[test]
    fn test_truncated_instruction() {
        let mut stack = vec![OpCode::Entry.to_f32(), 0.0];
        let err = execute_stack(&mut stack, &NoiseRegistry::new(), Vec3::ONE).unwrap_err();
        assert_eq!(err, InterpretError::OutOfBounds(1));
    }

    #[test]
    fn test_unknown_noise_handle() {
        let mut stack = vec![
            OpCode::Entry.to_f32(), 0.0, 0.0, 0.0,
            OpCode::Noise.to_f32(), 1.0, 1.0, 5.0, 0.0,
            1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.5, 2.0,
            0.0, 0.0, 0.0,
        ];
        let err = execute_stack(&mut stack, &NoiseRegistry::new(), Vec3::ONE).unwrap_err();
        assert_eq!(err, InterpretError::UnknownNoise(5));
    }
}

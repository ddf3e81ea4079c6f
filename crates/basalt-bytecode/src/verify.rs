//! Structural validity checks for emitted methods.
//!
//! The compiler upholds these invariants by construction; the pass exists so
//! callers (and the compiler's own tests) can check them independently:
//! every branch target lands inside the method body, every local slot access
//! is within `locals_length`, and every `CallLocal` index resolves.

use crate::{Instr, Method};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyError {
    pub message: String,
}

impl VerifyError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl core::fmt::Display for VerifyError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "verify error: {}", self.message)
    }
}

impl std::error::Error for VerifyError {}

/// Verifies a single method against a method table of size `method_count`.
pub fn verify_method(method: &Method, method_count: usize) -> Result<(), VerifyError> {
    if method.args_length > method.locals_length {
        return Err(VerifyError::new(format!(
            "args length {} exceeds locals length {}",
            method.args_length, method.locals_length
        )));
    }

    let len = method.instrs.len();
    for (index, instr) in method.instrs.iter().enumerate() {
        match instr {
            Instr::Jump(offset) | Instr::IfTrue(offset) | Instr::IfFalse(offset) => {
                let target = index as i64 + i64::from(*offset) + 1;
                if target < 0 || target >= len as i64 {
                    return Err(VerifyError::new(format!(
                        "branch at {index} targets {target}, outside of 0..{len}"
                    )));
                }
            }
            Instr::LoadLocal(slot) | Instr::StoreLocal(slot) => {
                if usize::from(*slot) >= method.locals_length {
                    return Err(VerifyError::new(format!(
                        "local slot {slot} out of range (locals={})",
                        method.locals_length
                    )));
                }
            }
            Instr::CallLocal(target) => {
                if usize::from(*target) >= method_count {
                    return Err(VerifyError::new(format!(
                        "call target {target} out of range (methods={method_count})"
                    )));
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// Verifies every method of a compiled script or contract.
pub fn verify_methods(methods: &[Method]) -> Result<(), VerifyError> {
    for method in methods {
        verify_method(method, methods.len())?;
    }
    Ok(())
}

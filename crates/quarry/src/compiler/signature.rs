//! Argument validation for built-in calls.

use crate::error::SignatureError;
use crate::program::Primitive;
use crate::types::TypeTag;

/// Required argument count and declared per-position types of a built-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub required: usize,
    pub args: Vec<TypeTag>,
}

impl FunctionSignature {
    pub fn new(required: usize, args: Vec<TypeTag>) -> Self {
        Self { required, args }
    }

    /// Signature of a call that takes no arguments.
    pub fn none() -> Self {
        Self::new(0, Vec::new())
    }

    fn expected(&self) -> String {
        if self.required == self.args.len() {
            self.required.to_string()
        } else {
            format!("{}-{}", self.required, self.args.len())
        }
    }

    /// Check supplied arguments against this signature.
    pub fn validate(&self, args: &[Primitive]) -> Result<(), SignatureError> {
        let given = args.len();

        if given == 0 {
            if self.required > 0 {
                return Err(SignatureError::NoArguments {
                    expected: self.expected(),
                });
            }
            return Ok(());
        }

        if given < self.required {
            return Err(SignatureError::NotEnough {
                expected: self.expected(),
                given,
            });
        }
        if given > self.args.len() {
            return Err(SignatureError::TooMany {
                expected: self.expected(),
                given,
            });
        }

        for (position, (arg, declared)) in args.iter().zip(&self.args).enumerate() {
            if arg.typ() != declared {
                return Err(SignatureError::IncorrectArgument {
                    position,
                    expected: declared.label(),
                    actual: arg.typ().label(),
                });
            }
        }
        Ok(())
    }
}

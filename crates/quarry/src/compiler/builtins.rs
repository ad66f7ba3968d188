//! Built-in functions and operators on non-resource values.

use crate::ast::BinOp;
use crate::types::TypeTag;

use super::signature::FunctionSignature;

/// Signature and result type of a built-in call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Builtin {
    pub signature: FunctionSignature,
    pub result: TypeTag,
}

impl Builtin {
    fn new(required: usize, args: Vec<TypeTag>, result: TypeTag) -> Self {
        Self {
            signature: FunctionSignature::new(required, args),
            result,
        }
    }
}

/// Look up a method callable on a value of type `typ`.
pub fn method(typ: &TypeTag, name: &str) -> Option<Builtin> {
    match (typ, name) {
        (TypeTag::String, "contains") => Some(Builtin::new(1, vec![TypeTag::String], TypeTag::Bool)),
        (TypeTag::String, "downcase" | "upcase") => Some(Builtin::new(0, vec![], TypeTag::String)),
        (TypeTag::String | TypeTag::Array(_) | TypeTag::Map(..), "length") => {
            Some(Builtin::new(0, vec![], TypeTag::Int))
        }
        (TypeTag::Array(child), "contains") => {
            Some(Builtin::new(1, vec![(**child).clone()], TypeTag::Bool))
        }
        _ => None,
    }
}

/// Look up a binary operator whose left operand has type `lhs`.
pub fn operator(op: BinOp, lhs: &TypeTag) -> Option<Builtin> {
    match op {
        BinOp::Eq | BinOp::Neq => Some(Builtin::new(1, vec![lhs.clone()], TypeTag::Bool)),
        BinOp::Lt | BinOp::Lte | BinOp::Gt | BinOp::Gte => match lhs {
            TypeTag::Int | TypeTag::Float | TypeTag::String => {
                Some(Builtin::new(1, vec![lhs.clone()], TypeTag::Bool))
            }
            _ => None,
        },
        BinOp::And | BinOp::Or => match lhs {
            TypeTag::Bool => Some(Builtin::new(1, vec![TypeTag::Bool], TypeTag::Bool)),
            _ => None,
        },
    }
}

/// Operation id of logical negation.
pub const NOT: &str = "!";

//! Handlers for operators and built-in functions on non-resource values.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::ast::BinOp;
use crate::compiler::builtins::NOT;
use crate::error::ExecResult;
use crate::value::{RawData, Value};

use super::registry::{Call, HandlerRegistry, Step, TypeFamily};
use super::{ready, Executor};

pub(super) fn register(registry: &mut HandlerRegistry) {
    registry
        .register(BinOp::Eq.symbol(), TypeFamily::Any, |exec, call| {
            equality(exec, call, true)
        })
        .register(BinOp::Neq.symbol(), TypeFamily::Any, |exec, call| {
            equality(exec, call, false)
        })
        .register(BinOp::And.symbol(), TypeFamily::Bool, |exec, call| {
            logical(exec, call, true)
        })
        .register(BinOp::Or.symbol(), TypeFamily::Bool, |exec, call| {
            logical(exec, call, false)
        })
        .register(NOT, TypeFamily::Any, |_, call| {
            Ok(Step::Done(RawData::bool(!call.bound.is_truthy())))
        })
        .register("contains", TypeFamily::String, string_contains)
        .register("contains", TypeFamily::Array, array_contains)
        .register("downcase", TypeFamily::String, |_, call| {
            map_string(call, str::to_lowercase)
        })
        .register("upcase", TypeFamily::String, |_, call| {
            map_string(call, str::to_uppercase)
        })
        .register("length", TypeFamily::String, collection_length)
        .register("length", TypeFamily::Array, collection_length)
        .register("length", TypeFamily::Map, collection_length);

    for op in [BinOp::Lt, BinOp::Lte, BinOp::Gt, BinOp::Gte] {
        for family in [TypeFamily::Int, TypeFamily::Float, TypeFamily::String] {
            registry.register(op.symbol(), family, move |exec, call| ordering(exec, call, op));
        }
    }
}

/// Resolve the single right-hand operand; errors propagate as error data.
macro_rules! operand {
    ($exec:expr, $call:expr) => {{
        let rhs = ready!($call.resolve_arg($exec, 0)?);
        if let Some(msg) = rhs.error_message() {
            return Ok($call.error(msg));
        }
        rhs
    }};
}

fn equality(exec: &Arc<Executor>, call: &Call<'_>, equal: bool) -> ExecResult<Step> {
    let rhs = operand!(exec, call);
    let same = call.bound.value == rhs.value;
    Ok(Step::Done(RawData::bool(same == equal)))
}

fn logical(exec: &Arc<Executor>, call: &Call<'_>, and: bool) -> ExecResult<Step> {
    let lhs = call.bound.is_truthy();
    // Short-circuit without waiting on the right-hand side.
    if lhs != and {
        return Ok(Step::Done(RawData::bool(lhs)));
    }
    let rhs = operand!(exec, call);
    Ok(Step::Done(RawData::bool(rhs.is_truthy())))
}

fn ordering(exec: &Arc<Executor>, call: &Call<'_>, op: BinOp) -> ExecResult<Step> {
    let rhs = operand!(exec, call);
    let Some(order) = compare(&call.bound.value, &rhs.value) else {
        return Ok(call.error(format!(
            "cannot compare {} with {}",
            call.bound.value, rhs.value
        )));
    };
    let result = match op {
        BinOp::Lt => order == Ordering::Less,
        BinOp::Lte => order != Ordering::Greater,
        BinOp::Gt => order == Ordering::Greater,
        BinOp::Gte => order != Ordering::Less,
        _ => false,
    };
    Ok(Step::Done(RawData::bool(result)))
}

fn compare(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn string_contains(exec: &Arc<Executor>, call: &Call<'_>) -> ExecResult<Step> {
    let rhs = operand!(exec, call);
    match (&call.bound.value, &rhs.value) {
        (Value::String(haystack), Value::String(needle)) => {
            Ok(Step::Done(RawData::bool(haystack.contains(needle.as_str()))))
        }
        (Value::Null, _) => Ok(Step::Done(RawData::bool(false))),
        (lhs, rhs) => Ok(call.error(format!("cannot search {rhs} in {lhs}"))),
    }
}

fn array_contains(exec: &Arc<Executor>, call: &Call<'_>) -> ExecResult<Step> {
    let rhs = operand!(exec, call);
    match &call.bound.value {
        Value::Sequence(items) => Ok(Step::Done(RawData::bool(items.contains(&rhs.value)))),
        Value::Null => Ok(Step::Done(RawData::bool(false))),
        other => Ok(call.error(format!("expected a list, got {other}"))),
    }
}

fn map_string(call: &Call<'_>, f: fn(&str) -> String) -> ExecResult<Step> {
    match &call.bound.value {
        Value::String(s) => Ok(Step::Done(RawData::string(f(s)))),
        other => Ok(call.error(format!("expected a string, got {other}"))),
    }
}

fn collection_length(_: &Arc<Executor>, call: &Call<'_>) -> ExecResult<Step> {
    let len = match &call.bound.value {
        Value::String(s) => s.chars().count(),
        Value::Sequence(items) => items.len(),
        Value::Mapping(entries) => entries.len(),
        Value::Null => 0,
        other => return Ok(call.error(format!("cannot take the length of {other}"))),
    };
    Ok(Step::Done(RawData::int(len as i64)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{Environment, InlineBlockRunner, Resolved};
    use crate::program::{Chunk, Primitive, Program};
    use crate::runtime::MockRuntime;
    use crate::schema::Schema;
    use crate::types::TypeTag;

    fn eval(lhs: RawData, id: &str, args: Vec<Primitive>, typ: TypeTag) -> RawData {
        let mut program = Program::new();
        let l = program.add_chunk(Chunk::value(Primitive::literal(lhs)));
        let r = program.add_chunk(Chunk::call(id, typ, Some(l), args));
        program.entrypoints.push(r);

        let env = Environment::new(
            Arc::new(MockRuntime::new(Schema::new())),
            Arc::new(HandlerRegistry::builtin()),
            Arc::new(InlineBlockRunner),
        );
        let exec = Executor::new(env, Arc::new(program), None);
        match exec.resolve_value(r).unwrap() {
            Resolved::Ready(data) => data,
            Resolved::Pending(dep) => panic!("still pending on {dep}"),
        }
    }

    fn lit(data: RawData) -> Vec<Primitive> {
        vec![Primitive::literal(data)]
    }

    #[test]
    fn test_equality() {
        let eq = eval(RawData::int(3), "==", lit(RawData::int(3)), TypeTag::Bool);
        assert_eq!(eq, RawData::bool(true));
        let neq = eval(RawData::string("a"), "!=", lit(RawData::string("a")), TypeTag::Bool);
        assert_eq!(neq, RawData::bool(false));
    }

    #[test]
    fn test_ordering() {
        let lt = eval(RawData::int(2), "<", lit(RawData::int(3)), TypeTag::Bool);
        assert_eq!(lt, RawData::bool(true));
        let gte = eval(RawData::float(2.5), ">=", lit(RawData::float(2.5)), TypeTag::Bool);
        assert_eq!(gte, RawData::bool(true));
        let gt = eval(RawData::string("abc"), ">", lit(RawData::string("abd")), TypeTag::Bool);
        assert_eq!(gt, RawData::bool(false));
    }

    #[test]
    fn test_logical_short_circuit() {
        let and = eval(RawData::bool(false), "&&", vec![Primitive::reference(9, TypeTag::Bool)], TypeTag::Bool);
        assert_eq!(and, RawData::bool(false));
        let or = eval(RawData::bool(false), "||", lit(RawData::bool(true)), TypeTag::Bool);
        assert_eq!(or, RawData::bool(true));
    }

    #[test]
    fn test_not() {
        let not = eval(RawData::string(""), NOT, vec![], TypeTag::Bool);
        assert_eq!(not, RawData::bool(true));
    }

    #[test]
    fn test_string_functions() {
        let contains = eval(
            RawData::string("openssh-server"),
            "contains",
            lit(RawData::string("ssh")),
            TypeTag::Bool,
        );
        assert_eq!(contains, RawData::bool(true));
        let up = eval(RawData::string("Arch"), "upcase", vec![], TypeTag::String);
        assert_eq!(up, RawData::string("ARCH"));
        let down = eval(RawData::string("Arch"), "downcase", vec![], TypeTag::String);
        assert_eq!(down, RawData::string("arch"));
        let len = eval(RawData::string("héllo"), "length", vec![], TypeTag::Int);
        assert_eq!(len, RawData::int(5));
    }

    #[test]
    fn test_array_functions() {
        let tags = RawData::new(
            TypeTag::array(TypeTag::String),
            Value::Sequence(vec![Value::String("a".into()), Value::String("b".into())]),
        );
        let len = eval(tags.clone(), "length", vec![], TypeTag::Int);
        assert_eq!(len, RawData::int(2));
        let contains = eval(tags, "contains", lit(RawData::string("b")), TypeTag::Bool);
        assert_eq!(contains, RawData::bool(true));
    }
}

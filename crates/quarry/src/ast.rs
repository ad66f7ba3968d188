//! Expression tree consumed by the compiler.
//!
//! Parsing text into this tree happens outside of this crate; the tree is
//! serde-deserializable so front ends can hand it over as JSON.

use serde::{Deserialize, Serialize};

/// A literal operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
}

impl BinOp {
    /// Operation id emitted into the program for this operator.
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Eq => "==",
            BinOp::Neq => "!=",
            BinOp::Lt => "<",
            BinOp::Lte => "<=",
            BinOp::Gt => ">",
            BinOp::Gte => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        }
    }
}

/// A call argument, optionally named.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arg {
    #[serde(default)]
    pub name: Option<String>,
    pub value: Expr,
}

impl Arg {
    pub fn unnamed(value: Expr) -> Self {
        Self { name: None, value }
    }

    pub fn named(name: &str, value: Expr) -> Self {
        Self {
            name: Some(name.to_string()),
            value,
        }
    }
}

/// An expression node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Literal(Literal),
    /// A root identifier: a resource, a block field or a lambda parameter.
    Ident {
        name: String,
        #[serde(default)]
        args: Option<Vec<Arg>>,
    },
    /// `target.name` or `target.name(args)`.
    Member {
        target: Box<Expr>,
        name: String,
        #[serde(default)]
        args: Option<Vec<Arg>>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Not(Box<Expr>),
    /// `param => body`; the parameter names the block input.
    Lambda { param: String, body: Box<Expr> },
    /// `{ expr; expr }`; truthy when every expression is.
    Block(Vec<Expr>),
}

impl Expr {
    pub fn ident(name: &str) -> Self {
        Expr::Ident {
            name: name.to_string(),
            args: None,
        }
    }

    pub fn call_ident(name: &str, args: Vec<Arg>) -> Self {
        Expr::Ident {
            name: name.to_string(),
            args: Some(args),
        }
    }

    pub fn bool(v: bool) -> Self {
        Expr::Literal(Literal::Bool(v))
    }

    pub fn int(v: i64) -> Self {
        Expr::Literal(Literal::Int(v))
    }

    pub fn string(v: &str) -> Self {
        Expr::Literal(Literal::String(v.to_string()))
    }

    /// `self.name`
    pub fn field(self, name: &str) -> Self {
        Expr::Member {
            target: Box::new(self),
            name: name.to_string(),
            args: None,
        }
    }

    /// `self.name(args)`
    pub fn call(self, name: &str, args: Vec<Arg>) -> Self {
        Expr::Member {
            target: Box::new(self),
            name: name.to_string(),
            args: Some(args),
        }
    }

    pub fn binary(self, op: BinOp, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(self),
            rhs: Box::new(rhs),
        }
    }

    pub fn lambda(param: &str, body: Expr) -> Self {
        Expr::Lambda {
            param: param.to_string(),
            body: Box::new(body),
        }
    }

    /// Dotted path such as `sshd.config.params`.
    pub fn path(path: &str) -> Self {
        let mut parts = path.split('.');
        let root = Expr::ident(parts.next().unwrap_or_default());
        parts.fold(root, |expr, part| expr.field(part))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_builds_member_chain() {
        let expr = Expr::path("a.b.c");
        assert_eq!(expr, Expr::ident("a").field("b").field("c"));
    }

    #[test]
    fn test_deserialize_where_call() {
        let json = r#"{
            "member": {
                "target": { "ident": { "name": "packages" } },
                "name": "where",
                "args": [ { "value": { "lambda": {
                    "param": "p",
                    "body": { "member": { "target": { "ident": { "name": "p" } }, "name": "installed" } }
                } } } ]
            }
        }"#;
        let expr: Expr = serde_json::from_str(json).unwrap();
        let expected = Expr::ident("packages").call(
            "where",
            vec![Arg::unnamed(Expr::lambda("p", Expr::ident("p").field("installed")))],
        );
        assert_eq!(expr, expected);
    }
}

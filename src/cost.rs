// Portions of this code are heavily inspired from https://github.com/Kuadrant/wasm-shim/
// Under Apache 2.0 license (https://github.com/Kuadrant/wasm-shim/blob/main/LICENSE)

use std::fmt::{Debug, Formatter};

use cel_interpreter::{Context, Value};
use cel_parser::Expression as CelExpression;
use serde::{Serialize, Serializer};

use crate::llm::TokenUsage;
use crate::*;

#[derive(thiserror::Error, Debug)]
pub enum Error {
	#[error("parse: {0}")]
	Parse(#[from] cel_parser::ParseError),
	#[error("program exceeds {MAX_PROGRAM_NODES} nodes")]
	TooLarge,
	#[error("unknown variable: {0}")]
	UnknownVariable(String),
	#[error("execution: {0}")]
	Execution(#[from] cel_interpreter::ExecutionError),
	#[error("expression yielded {0}, want a non-negative integer")]
	NotAnInteger(String),
}

/// Variables a cost program may reference.
const VARIABLES: &[&str] = &[
	"model",
	"backend",
	"input_tokens",
	"output_tokens",
	"total_tokens",
];

/// CEL has no recursion or loops, so a bound on the parsed AST bounds the
/// evaluation step count as well.
pub const MAX_PROGRAM_NODES: usize = 256;

/// A compiled cost expression. Compilation is eager at config-load time;
/// evaluation is pure, reentrant, and cannot poison the compiled program.
pub struct CostProgram {
	expression: CelExpression,
	source: String,
}

impl Serialize for CostProgram {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.source)
	}
}

impl Debug for CostProgram {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("CostProgram")
			.field("source", &self.source)
			.finish()
	}
}

/// The values exposed to a program for one evaluation.
#[derive(Debug, Clone)]
pub struct CostContext<'a> {
	pub model: &'a str,
	pub backend: &'a str,
	pub usage: TokenUsage,
}

impl CostProgram {
	pub fn compile(source: impl Into<String>) -> Result<Self, Error> {
		let source = source.into();
		let expression = cel_parser::parse(&source)?;
		let mut nodes = 0usize;
		validate(&expression, &mut nodes)?;
		Ok(CostProgram { expression, source })
	}

	pub fn source(&self) -> &str {
		&self.source
	}

	pub fn eval(&self, ec: &CostContext) -> Result<u64, Error> {
		let mut ctx = Context::default();
		ctx.add_variable_from_value("model", Value::String(Arc::new(ec.model.to_string())));
		ctx.add_variable_from_value("backend", Value::String(Arc::new(ec.backend.to_string())));
		ctx.add_variable_from_value("input_tokens", Value::UInt(ec.usage.input as u64));
		ctx.add_variable_from_value("output_tokens", Value::UInt(ec.usage.output as u64));
		ctx.add_variable_from_value("total_tokens", Value::UInt(ec.usage.total as u64));
		match Value::resolve(&self.expression, &ctx)? {
			Value::UInt(n) => Ok(n),
			Value::Int(n) if n >= 0 => Ok(n as u64),
			Value::Int(n) => Err(Error::NotAnInteger(n.to_string())),
			Value::Float(f) => Err(Error::NotAnInteger(f.to_string())),
			Value::Bool(b) => Err(Error::NotAnInteger(b.to_string())),
			Value::String(s) => Err(Error::NotAnInteger(format!("{s:?}"))),
			_ => Err(Error::NotAnInteger("a non-numeric value".to_string())),
		}
	}
}

/// Walk the AST, counting nodes and checking that every identifier in value
/// position is a known variable. Function call names are not identifiers.
fn validate(exp: &CelExpression, nodes: &mut usize) -> Result<(), Error> {
	*nodes += 1;
	if *nodes > MAX_PROGRAM_NODES {
		return Err(Error::TooLarge);
	}
	match exp {
		CelExpression::Arithmetic(e1, _, e2)
		| CelExpression::Relation(e1, _, e2)
		| CelExpression::Or(e1, e2)
		| CelExpression::And(e1, e2) => {
			validate(e1, nodes)?;
			validate(e2, nodes)?;
		},
		CelExpression::Ternary(cond, a, b) => {
			validate(cond, nodes)?;
			validate(a, nodes)?;
			validate(b, nodes)?;
		},
		CelExpression::Unary(_, e) => {
			validate(e, nodes)?;
		},
		CelExpression::Member(e, _) => {
			validate(e, nodes)?;
		},
		CelExpression::FunctionCall(_, target, args) => {
			// The function name is not a variable reference.
			if let Some(target) = target {
				validate(target, nodes)?;
			}
			for e in args {
				validate(e, nodes)?;
			}
		},
		CelExpression::List(items) => {
			for e in items {
				validate(e, nodes)?;
			}
		},
		CelExpression::Map(entries) => {
			for (k, v) in entries {
				validate(k, nodes)?;
				validate(v, nodes)?;
			}
		},
		CelExpression::Atom(_) => {},
		CelExpression::Ident(v) => {
			if !VARIABLES.contains(&v.as_str()) {
				return Err(Error::UnknownVariable(v.to_string()));
			}
		},
	}
	Ok(())
}

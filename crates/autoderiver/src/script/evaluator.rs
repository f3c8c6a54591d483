//! Tree-walking evaluation of a compiled [`Program`].

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::trace;

use super::builtins::{self, Arguments};
use super::{
    Argument, Arithmetic, Arm, Comparison, ErrorKind, Expression, FunctionDefinition, Literal,
    Logical, Pattern, Program, RequireHandle, ScriptError, Span, Spanned, TextPart, Value,
};
use crate::domain::{CategoryDomain, CategoryRecord};
use crate::parameters::{OptionsView, PackedValues};

/// Sized so the deepest allowed evaluation fits a default 2 MiB thread stack.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 64;

/// The `require` capability handed to a schema in derivation mode.
pub trait Requirer {
    /// Resolve `name` against the chain of schemas currently being derived.
    fn require(&self, name: &str) -> Result<RequireHandle, ErrorKind>;

    /// Invoke the schema behind `handle`. `options` are layered over the
    /// target schema's own stored values. `call_depth` is the call depth
    /// already spent by the requiring schemas; the target continues from it.
    fn derive(
        &self,
        handle: &RequireHandle,
        record: CategoryRecord,
        head: Option<&str>,
        options: Option<&PackedValues>,
        call_depth: usize,
    ) -> Result<Value, ScriptError>;
}

/// Everything one run of a program can see from the outside.
#[derive(Clone)]
pub struct Invocation<'a> {
    pub record: Option<CategoryRecord>,
    pub head: Option<&'a str>,
    pub options: OptionsView,
    pub requirer: Option<&'a dyn Requirer>,
    pub domain: Option<&'a dyn CategoryDomain>,
    pub max_call_depth: usize,
    /// Depth already used by schemas further up the require chain.
    pub call_depth: usize,
}

impl<'a> Invocation<'a> {
    /// Configuration mode: `record`, `head` and `require` are `Null`.
    pub fn configuration(options: OptionsView) -> Self {
        Self {
            record: None,
            head: None,
            options,
            requirer: None,
            domain: None,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            call_depth: 0,
        }
    }

    pub fn derivation(
        record: CategoryRecord,
        head: Option<&'a str>,
        options: OptionsView,
        requirer: &'a dyn Requirer,
    ) -> Self {
        Self {
            record: Some(record),
            head,
            options,
            requirer: Some(requirer),
            domain: None,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            call_depth: 0,
        }
    }

    pub fn with_domain(mut self, domain: &'a dyn CategoryDomain) -> Self {
        self.domain = Some(domain);
        self
    }

    pub fn with_max_call_depth(mut self, max_call_depth: usize) -> Self {
        self.max_call_depth = max_call_depth;
        self
    }

    pub fn with_call_depth(mut self, call_depth: usize) -> Self {
        self.call_depth = call_depth;
        self
    }
}

/// Run `program` and return the value of its last bare expression.
pub fn evaluate(program: &Program, invocation: &Invocation<'_>) -> Result<Value, ScriptError> {
    let mut bindings = vec![
        (
            "record",
            Binding::Ready(invocation.record.map_or(Value::Null, Value::Record)),
        ),
        (
            "head",
            Binding::Ready(invocation.head.map_or(Value::Null, Value::text)),
        ),
        ("options", Binding::Ready(Value::Options(invocation.options.clone()))),
        (
            "require",
            Binding::Ready(if invocation.requirer.is_some() {
                Value::Require
            } else {
                Value::Null
            }),
        ),
    ];
    let mut output = None;
    for item in &program.items {
        match &item.node {
            Expression::Variable(variable) => {
                bindings.push((variable.name.as_str(), Binding::lazy(&variable.value)))
            }
            Expression::Function(_) => {}
            _ => output = Some(item),
        }
    }
    let root = Scope {
        bindings,
        parent: None,
    };
    let interpreter = Interpreter {
        functions: program
            .functions()
            .map(|function| (function.name.as_str(), function))
            .collect(),
        invocation,
        root: &root,
        depth: Cell::new(invocation.call_depth),
    };
    match output {
        Some(expression) => interpreter.eval(expression, &root),
        None => Ok(Value::Null),
    }
}

enum Binding<'p> {
    Ready(Value),
    Lazy {
        expression: &'p Spanned<Expression>,
        state: RefCell<LazyState>,
    },
}

enum LazyState {
    Pending,
    Evaluating,
    Done(Value),
}

impl<'p> Binding<'p> {
    fn lazy(expression: &'p Spanned<Expression>) -> Self {
        Binding::Lazy {
            expression,
            state: RefCell::new(LazyState::Pending),
        }
    }
}

struct Scope<'p, 's> {
    bindings: Vec<(&'p str, Binding<'p>)>,
    parent: Option<&'s Scope<'p, 's>>,
}

impl<'p, 's> Scope<'p, 's> {
    /// Innermost binding named `name`, with the scope that owns it.
    fn lookup(&self, name: &str) -> Option<(&Binding<'p>, &Self)> {
        let mut scope = self;
        loop {
            if let Some((_, binding)) = scope.bindings.iter().rev().find(|(n, _)| *n == name) {
                return Some((binding, scope));
            }
            scope = scope.parent?;
        }
    }
}

struct Interpreter<'p, 'r, 'i> {
    functions: HashMap<&'p str, &'p FunctionDefinition>,
    invocation: &'r Invocation<'i>,
    root: &'r Scope<'p, 'r>,
    depth: Cell<usize>,
}

impl<'p> Interpreter<'p, '_, '_> {
    fn eval(
        &self,
        expression: &'p Spanned<Expression>,
        scope: &Scope<'p, '_>,
    ) -> Result<Value, ScriptError> {
        let span = expression.span;
        let located = |kind: ErrorKind| ScriptError::new(kind, span);
        match &expression.node {
            Expression::Literal(literal) => Ok(literal_value(literal)),
            Expression::Variable(variable) => self.eval(&variable.value, scope),
            Expression::List { items } => Ok(Value::List(Rc::new(
                items
                    .iter()
                    .map(|item| self.eval(item, scope))
                    .collect::<Result<Vec<_>, _>>()?,
            ))),
            Expression::Object { fields } => {
                let mut object = IndexMap::with_capacity(fields.len());
                for field in fields {
                    let value = self.eval(&field.node.value, scope)?;
                    object.insert(field.node.name.clone(), value);
                }
                Ok(Value::Object(Rc::new(object)))
            }
            Expression::Function(_) => Err(located(ErrorKind::NestedFunction)),
            Expression::FunctionCall { path, arguments } => {
                self.call(path, arguments, None, scope, span)
            }
            Expression::Alias { parts } => self.resolve_path(parts, scope, span),
            Expression::When { .. } => Err(located(ErrorKind::MissingPipeInput)),
            Expression::Pipe { from, to } => {
                let input = self.eval(from, scope)?;
                match &to.node {
                    Expression::FunctionCall { path, arguments } => {
                        self.call(path, arguments, Some(input), scope, to.span)
                    }
                    Expression::When { arms } => self.when(input, arms, scope, to.span),
                    _ => Err(ScriptError::new(ErrorKind::InvalidPipe, to.span)),
                }
            }
            Expression::Block { variables, output } => {
                let block_scope = Scope {
                    bindings: variables
                        .iter()
                        .map(|variable| {
                            (
                                variable.node.name.as_str(),
                                Binding::lazy(&variable.node.value),
                            )
                        })
                        .collect(),
                    parent: Some(scope),
                };
                self.eval(output, &block_scope)
            }
            Expression::Coalesce { value, fallback } => {
                let value = self.eval(value, scope)?;
                if value.is_absent() {
                    self.eval(fallback, scope)
                } else {
                    Ok(value)
                }
            }
            Expression::Logical(logical) => self.logical(logical, scope),
            Expression::Comparator {
                comparison,
                operand_a,
                operand_b,
            } => {
                let a = self.eval(operand_a, scope)?;
                let b = self.eval(operand_b, scope)?;
                compare(*comparison, &a, &b).map_err(located)
            }
            Expression::ArithmeticOperator {
                operator,
                operand_a,
                operand_b,
            } => {
                let a = self.eval(operand_a, scope)?;
                let b = self.eval(operand_b, scope)?;
                arithmetic(*operator, a, b).map_err(located)
            }
            Expression::Negate { operand } => match self.eval(operand, scope)? {
                Value::Number(number) => Ok(Value::Number(-number)),
                other => Err(located(ErrorKind::TypeMismatch {
                    function: "-".to_owned(),
                    expected: "number",
                    found: other.type_name().to_owned(),
                })),
            },
            Expression::TextLiteral { parts } => {
                let mut text = String::new();
                for part in parts {
                    match part {
                        TextPart::Text(part) => text.push_str(part),
                        TextPart::Interpolation { path } => {
                            text.push_str(&self.resolve_path(path, scope, span)?.to_string())
                        }
                    }
                }
                Ok(Value::text(text))
            }
        }
    }

    fn force(
        &self,
        name: &str,
        binding: &Binding<'p>,
        scope: &Scope<'p, '_>,
        span: Span,
    ) -> Result<Value, ScriptError> {
        let (expression, state) = match binding {
            Binding::Ready(value) => return Ok(value.clone()),
            Binding::Lazy { expression, state } => (*expression, state),
        };
        let cached = match &*state.borrow() {
            LazyState::Done(value) => Some(Ok(value.clone())),
            LazyState::Evaluating => Some(Err(ScriptError::new(
                ErrorKind::RecursiveBinding(name.to_owned()),
                span,
            ))),
            LazyState::Pending => None,
        };
        if let Some(cached) = cached {
            return cached;
        }
        state.replace(LazyState::Evaluating);
        let result = self.eval(expression, scope);
        state.replace(match &result {
            Ok(value) => LazyState::Done(value.clone()),
            Err(_) => LazyState::Pending,
        });
        result
    }

    fn resolve_path(
        &self,
        path: &[String],
        scope: &Scope<'p, '_>,
        span: Span,
    ) -> Result<Value, ScriptError> {
        let Some((first, rest)) = path.split_first() else {
            return Err(ScriptError::new(ErrorKind::UnknownVariable(String::new()), span));
        };
        let (binding, owner) = scope
            .lookup(first)
            .ok_or_else(|| ScriptError::new(ErrorKind::UnknownVariable(first.clone()), span))?;
        let mut value = self.force(first, binding, owner, span)?;
        for part in rest {
            value = value
                .field(part)
                .map_err(|kind| ScriptError::new(kind, span))?;
        }
        Ok(value)
    }

    fn call(
        &self,
        path: &'p [String],
        arguments: &'p [Spanned<Argument>],
        piped: Option<Value>,
        scope: &Scope<'p, '_>,
        span: Span,
    ) -> Result<Value, ScriptError> {
        let mut named: SmallVec<[(&'p str, Value); 4]> = SmallVec::new();
        for argument in arguments {
            let value = match &argument.node.value {
                Some(expression) => self.eval(expression, scope)?,
                None => self.resolve_path(
                    std::slice::from_ref(&argument.node.name),
                    scope,
                    argument.span,
                )?,
            };
            named.push((argument.node.name.as_str(), value));
        }

        if let [name] = path {
            if let Some(function) = self.functions.get(name.as_str()) {
                return self.call_function(function, piped, named, span);
            }
        }

        let name = path.join("/");
        let mut arguments = Arguments::new(name.clone(), piped, named);
        builtins::call(&name, &mut arguments, self.invocation, self.depth.get())
            .map_err(|error| error.at(span))
    }

    fn call_function(
        &self,
        function: &'p FunctionDefinition,
        mut piped: Option<Value>,
        mut named: SmallVec<[(&'p str, Value); 4]>,
        span: Span,
    ) -> Result<Value, ScriptError> {
        let depth = self.depth.get() + 1;
        if depth > self.invocation.max_call_depth {
            return Err(ScriptError::new(
                ErrorKind::CallDepthExceeded(self.invocation.max_call_depth),
                span,
            ));
        }

        let mut bindings = Vec::with_capacity(function.parameters.len());
        for (index, parameter) in function.parameters.iter().enumerate() {
            let name = parameter.node.as_str();
            let from_pipe = if index == 0 { piped.take() } else { None };
            let value = match (named.iter().position(|(n, _)| *n == name), from_pipe) {
                (Some(position), from_pipe) => {
                    piped = from_pipe;
                    named.remove(position).1
                }
                (None, Some(value)) => value,
                (None, None) => {
                    return Err(ScriptError::new(
                        ErrorKind::MissingArgument {
                            function: function.name.clone(),
                            argument: name.to_owned(),
                        },
                        span,
                    ));
                }
            };
            bindings.push((name, Binding::Ready(value)));
        }
        let unexpected = named
            .first()
            .map(|(name, _)| (*name).to_owned())
            .or_else(|| piped.is_some().then(|| "piped value".to_owned()));
        if let Some(argument) = unexpected {
            return Err(ScriptError::new(
                ErrorKind::UnexpectedArgument {
                    function: function.name.clone(),
                    argument,
                },
                span,
            ));
        }

        trace!(function = %function.name, depth, "calling script function");
        let scope = Scope {
            bindings,
            parent: Some(self.root),
        };
        self.depth.set(depth);
        let result = self.eval(&function.body, &scope);
        self.depth.set(depth - 1);
        result.map_err(|error| error.within(None, Some(&function.name), Some(span)))
    }

    fn when(
        &self,
        input: Value,
        arms: &'p [Arm],
        scope: &Scope<'p, '_>,
        span: Span,
    ) -> Result<Value, ScriptError> {
        for arm in arms {
            match &arm.pattern {
                Pattern::WildCard => return self.eval(&arm.body, scope),
                Pattern::Literal(literal) => {
                    if literal_value(literal) == input {
                        return self.eval(&arm.body, scope);
                    }
                }
                Pattern::Alias { name } => {
                    let arm_scope = Scope {
                        bindings: vec![(name.as_str(), Binding::Ready(input))],
                        parent: Some(scope),
                    };
                    return self.eval(&arm.body, &arm_scope);
                }
            }
        }
        Err(ScriptError::new(
            ErrorKind::NoMatchingArm(input.describe()),
            span,
        ))
    }

    fn logical(&self, logical: &'p Logical, scope: &Scope<'p, '_>) -> Result<Value, ScriptError> {
        let boolean = |operator: &str, operand: &'p Spanned<Expression>| {
            let value = self.eval(operand, scope)?;
            value.as_bool().ok_or_else(|| {
                ScriptError::new(
                    ErrorKind::TypeMismatch {
                        function: operator.to_owned(),
                        expected: "boolean",
                        found: value.type_name().to_owned(),
                    },
                    operand.span,
                )
            })
        };
        Ok(Value::Bool(match logical {
            Logical::And {
                operand_a,
                operand_b,
            } => boolean("AND", operand_a)? && boolean("AND", operand_b)?,
            Logical::Or {
                operand_a,
                operand_b,
            } => boolean("OR", operand_a)? || boolean("OR", operand_b)?,
            Logical::Not { operand } => !boolean("NOT", operand)?,
        }))
    }
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Number(number) => Value::Number(*number),
        Literal::Text(text) => Value::text(text),
        Literal::Tag(tag) => match tag.as_str() {
            "True" => Value::Bool(true),
            "False" => Value::Bool(false),
            "Null" => Value::Null,
            _ => Value::Tag(Rc::from(tag.as_str())),
        },
    }
}

fn compare(comparison: Comparison, a: &Value, b: &Value) -> Result<Value, ErrorKind> {
    let ordering = match comparison {
        Comparison::Equal => return Ok(Value::Bool(a == b)),
        Comparison::NotEqual => return Ok(Value::Bool(a != b)),
        _ => match (a, b) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            _ => {
                return Err(ErrorKind::TypeMismatch {
                    function: "comparison".to_owned(),
                    expected: "two numbers or two texts",
                    found: format!("{} and {}", a.type_name(), b.type_name()),
                });
            }
        },
    };
    let Some(ordering) = ordering else {
        return Ok(Value::Bool(false));
    };
    Ok(Value::Bool(match comparison {
        Comparison::Greater => ordering.is_gt(),
        Comparison::GreaterOrEqual => ordering.is_ge(),
        Comparison::Less => ordering.is_lt(),
        _ => ordering.is_le(),
    }))
}

fn arithmetic(operator: Arithmetic, a: Value, b: Value) -> Result<Value, ErrorKind> {
    let symbol = match operator {
        Arithmetic::Add => "+",
        Arithmetic::Subtract => "-",
        Arithmetic::Multiply => "*",
        Arithmetic::Divide => "/",
    };
    match (operator, a, b) {
        (Arithmetic::Add, Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
        (Arithmetic::Subtract, Value::Number(a), Value::Number(b)) => Ok(Value::Number(a - b)),
        (Arithmetic::Multiply, Value::Number(a), Value::Number(b)) => Ok(Value::Number(a * b)),
        (Arithmetic::Divide, Value::Number(a), Value::Number(b)) => Ok(Value::Number(a / b)),
        (Arithmetic::Add, a @ (Value::Text(_) | Value::Number(_)), b @ Value::Text(_))
        | (Arithmetic::Add, a @ Value::Text(_), b @ Value::Number(_)) => {
            Ok(Value::text(format!("{a}{b}")))
        }
        (Arithmetic::Add, Value::List(a), Value::List(b)) => {
            Ok(Value::list(a.iter().chain(b.iter()).cloned()))
        }
        (_, a, b) => Err(ErrorKind::TypeMismatch {
            function: symbol.to_owned(),
            expected: "numbers",
            found: format!("{} and {}", a.type_name(), b.type_name()),
        }),
    }
}

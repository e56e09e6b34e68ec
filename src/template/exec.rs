//! Tree-walking evaluator.

use super::error::{Result, TemplateError};
use super::funcs;
use super::helpers::HelperError;
use super::lexer::line_of;
use super::parse::{Command, Node, Operand, Pipeline, Span, Template};
use super::value::Value;
use super::{Engine, MissingKey, PartContext};

enum Flow {
    Normal,
    Break,
    Continue,
}

struct State<'a> {
    engine: &'a Engine,
    source: &'a str,
    cx: &'a mut dyn PartContext,
    /// Variable stack, innermost last; `$` is always the first entry
    vars: Vec<(String, Value)>,
    /// Action currently being evaluated, for error reporting
    span: Span,
}

pub(super) fn run(
    engine: &Engine,
    template: &Template,
    data: &Value,
    cx: &mut dyn PartContext,
) -> Result<String> {
    let mut state = State {
        engine,
        source: &template.source,
        cx,
        vars: vec![("$".to_string(), data.clone())],
        span: Span::default(),
    };
    let mut out = String::with_capacity(template.source.len());
    state.walk(&template.nodes, data, &mut out)?;
    Ok(out)
}

impl<'a> State<'a> {
    fn walk(&mut self, nodes: &[Node], dot: &Value, out: &mut String) -> Result<Flow> {
        for node in nodes {
            let flow = match node {
                Node::Text(text) => {
                    out.push_str(text);
                    Flow::Normal
                }
                Node::Action {
                    pipe,
                    trim_left,
                    trim_right,
                    span,
                } => {
                    self.span = *span;
                    let value = self.eval_pipeline(pipe, dot)?;
                    if pipe.decl.is_empty() {
                        self.print(&value, *trim_left, *trim_right, out)?;
                    }
                    Flow::Normal
                }
                Node::If {
                    branches,
                    otherwise,
                } => {
                    let mark = self.vars.len();
                    let mut taken = None;
                    for branch in branches {
                        self.span = branch.span;
                        if self.eval_pipeline(&branch.pipe, dot)?.is_truthy() {
                            taken = Some(&branch.body);
                            break;
                        }
                    }
                    let flow = match taken.or(otherwise.as_ref()) {
                        Some(body) => self.walk(body, dot, out)?,
                        None => Flow::Normal,
                    };
                    self.vars.truncate(mark);
                    flow
                }
                Node::With {
                    branches,
                    otherwise,
                } => {
                    let mark = self.vars.len();
                    let mut taken = None;
                    for branch in branches {
                        self.span = branch.span;
                        let value = self.eval_pipeline(&branch.pipe, dot)?;
                        if value.is_truthy() {
                            taken = Some((&branch.body, value));
                            break;
                        }
                    }
                    let flow = match (taken, otherwise) {
                        (Some((body, value)), _) => self.walk(body, &value, out)?,
                        (None, Some(body)) => self.walk(body, dot, out)?,
                        (None, None) => Flow::Normal,
                    };
                    self.vars.truncate(mark);
                    flow
                }
                Node::Range {
                    pipe,
                    body,
                    otherwise,
                    span,
                } => {
                    self.span = *span;
                    self.range(pipe, body, otherwise.as_deref(), dot, out)?;
                    Flow::Normal
                }
                Node::Break => Flow::Break,
                Node::Continue => Flow::Continue,
            };
            if !matches!(flow, Flow::Normal) {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn range(
        &mut self,
        pipe: &Pipeline,
        body: &[Node],
        otherwise: Option<&[Node]>,
        dot: &Value,
        out: &mut String,
    ) -> Result<()> {
        let value = self.eval_commands(&pipe.cmds, dot)?;
        let items: Vec<(Value, Value)> = match value {
            Value::Seq(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, v)| (Value::from(i), v))
                .collect(),
            Value::Map(map) => map.into_iter().map(|(k, v)| (Value::text(&k), v)).collect(),
            Value::Int(n) => (0..n.max(0)).map(|i| (Value::Int(i), Value::Int(i))).collect(),
            Value::Null => Vec::new(),
            other => {
                return Err(self.error(format!("range can't iterate over {}", other.type_name())));
            }
        };

        if items.is_empty() {
            if let Some(body) = otherwise {
                let mark = self.vars.len();
                self.walk(body, dot, out)?;
                self.vars.truncate(mark);
            }
            return Ok(());
        }

        let mark = self.vars.len();
        for (key, elem) in items {
            match pipe.decl.as_slice() {
                [] => {}
                [_] => self.bind(pipe, vec![elem.clone()])?,
                _ => self.bind(pipe, vec![key, elem.clone()])?,
            }
            let flow = self.walk(body, &elem, out)?;
            self.vars.truncate(mark);
            if matches!(flow, Flow::Break) {
                break;
            }
        }
        Ok(())
    }

    fn print(&mut self, value: &Value, trim_left: bool, trim_right: bool, out: &mut String) -> Result<()> {
        let text = match value {
            Value::Image(image) => self.cx.embed_image(image).map_err(|message| self.image_error(message))?,
            other => other.to_text(),
        };
        let mut text = text.as_str();
        if trim_left {
            text = text.trim_start_matches(is_space);
        }
        if trim_right {
            text = text.trim_end_matches(is_space);
        }
        out.push_str(text);
        Ok(())
    }

    fn eval_pipeline(&mut self, pipe: &Pipeline, dot: &Value) -> Result<Value> {
        let value = self.eval_commands(&pipe.cmds, dot)?;
        if !pipe.decl.is_empty() {
            self.bind(pipe, vec![value.clone()])?;
        }
        Ok(value)
    }

    fn eval_commands(&mut self, cmds: &[Command], dot: &Value) -> Result<Value> {
        let mut value = None;
        for cmd in cmds {
            value = Some(self.eval_command(cmd, dot, value)?);
        }
        Ok(value.unwrap_or_default())
    }

    /// Declares or assigns the pipeline's variables, pairing them with `values`
    fn bind(&mut self, pipe: &Pipeline, values: Vec<Value>) -> Result<()> {
        for (name, value) in pipe.decl.iter().zip(values) {
            if pipe.is_assign {
                match self.vars.iter_mut().rev().find(|(n, _)| n == name) {
                    Some(slot) => slot.1 = value,
                    None => return Err(self.error(format!("undefined variable: {}", name))),
                }
            } else {
                self.vars.push((name.clone(), value));
            }
        }
        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<Value> {
        self.vars
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| self.error(format!("undefined variable: {}", name)))
    }

    fn eval_command(&mut self, cmd: &Command, dot: &Value, last: Option<Value>) -> Result<Value> {
        let Some((first, rest)) = cmd.args.split_first() else {
            return Err(self.error("empty command"));
        };
        match first {
            Operand::Function(name) => self.call(name, rest, dot, last),
            operand => {
                if !rest.is_empty() || last.is_some() {
                    return Err(self.error(format!(
                        "can't give argument to non-function {}",
                        describe(operand)
                    )));
                }
                self.eval_operand(operand, dot)
            }
        }
    }

    fn eval_operand(&mut self, operand: &Operand, dot: &Value) -> Result<Value> {
        match operand {
            Operand::Dot => Ok(dot.clone()),
            Operand::Field(path) => self.resolve(dot, path),
            Operand::Variable(name, path) => {
                let base = self.lookup(name)?;
                self.resolve(&base, path)
            }
            Operand::Function(name) => self.call(name, &[], dot, None),
            Operand::Literal(value) => Ok(value.clone()),
            Operand::Nil => Ok(Value::Null),
            Operand::Pipe(pipe, path) => {
                let base = self.eval_pipeline(pipe, dot)?;
                self.resolve(&base, path)
            }
        }
    }

    /// Follows `.a.b.c` from `base` under the missing-key policy
    fn resolve(&self, base: &Value, path: &[String]) -> Result<Value> {
        let mut cur = base;
        for key in path {
            let next = match cur {
                Value::Map(map) => map.get(key),
                Value::Null => None,
                other => {
                    return Err(self.error(format!(
                        "can't evaluate field {} in type {}",
                        key,
                        other.type_name()
                    )));
                }
            };
            match next {
                Some(value) => cur = value,
                None => {
                    return match self.engine.missing_key {
                        MissingKey::Empty => Ok(Value::Null),
                        MissingKey::Error => Err(TemplateError::MissingKey {
                            key: key.clone(),
                            line: self.line(),
                            tag: self.tag(),
                        }),
                    };
                }
            }
        }
        Ok(cur.clone())
    }

    fn call(&mut self, name: &str, args: &[Operand], dot: &Value, last: Option<Value>) -> Result<Value> {
        let engine = self.engine;
        if let Some(helper) = engine.helpers.get(name) {
            let values = self.eval_args(args, dot, last)?;
            return helper(&mut *self.cx, &values).map_err(|err| match err {
                HelperError::Image(err) => self.image_error(err.to_string()),
                HelperError::Message(message) => {
                    self.error(format!("error calling {}: {}", name, message))
                }
            });
        }

        match name {
            "and" | "or" => self.logical(name == "and", args, dot, last),
            _ => {
                let values = self.eval_args(args, dot, last)?;
                funcs::call(name, &values).map_err(|message| {
                    self.error(format!("error calling {}: {}", name, message))
                })
            }
        }
    }

    /// `and` returns the first falsy argument, `or` the first truthy one;
    /// later arguments are not evaluated
    fn logical(&mut self, is_and: bool, args: &[Operand], dot: &Value, last: Option<Value>) -> Result<Value> {
        if args.is_empty() && last.is_none() {
            let name = if is_and { "and" } else { "or" };
            return Err(self.error(format!("wrong number of args for {}: want at least 1 got 0", name)));
        }
        let mut result = Value::Null;
        for operand in args {
            result = self.eval_operand(operand, dot)?;
            if result.is_truthy() != is_and {
                return Ok(result);
            }
        }
        Ok(last.unwrap_or(result))
    }

    fn eval_args(&mut self, args: &[Operand], dot: &Value, last: Option<Value>) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(args.len() + 1);
        for operand in args {
            values.push(self.eval_operand(operand, dot)?);
        }
        values.extend(last);
        Ok(values)
    }

    fn line(&self) -> usize {
        line_of(self.source, self.span.start)
    }

    fn tag(&self) -> Option<String> {
        if self.span.end <= self.span.start {
            return None;
        }
        self.source
            .get(self.span.start..self.span.end)
            .map(str::to_string)
    }

    fn error(&self, message: impl Into<String>) -> TemplateError {
        TemplateError::execution(message, self.line(), self.tag())
    }

    fn image_error(&self, message: String) -> TemplateError {
        TemplateError::Image {
            message,
            line: self.line(),
            tag: self.tag(),
        }
    }
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn describe(operand: &Operand) -> String {
    match operand {
        Operand::Dot => ".".to_string(),
        Operand::Field(path) => format!(".{}", path.join(".")),
        Operand::Variable(name, path) if path.is_empty() => name.clone(),
        Operand::Variable(name, path) => format!("{}.{}", name, path.join(".")),
        Operand::Function(name) => name.clone(),
        Operand::Literal(value) => value.to_text(),
        Operand::Nil => "nil".to_string(),
        Operand::Pipe(..) => "(pipeline)".to_string(),
    }
}

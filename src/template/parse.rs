//! Recursive-descent parser producing the action tree.

use super::error::{Result, TemplateError};
use super::lexer::{self, line_of, Item, Keyword, Token};
use super::value::Value;

/// Byte range of an action, `{{` through `}}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Text(String),
    Action {
        pipe: Pipeline,
        trim_left: bool,
        trim_right: bool,
        span: Span,
    },
    If {
        branches: Vec<Branch>,
        otherwise: Option<Vec<Node>>,
    },
    With {
        branches: Vec<Branch>,
        otherwise: Option<Vec<Node>>,
    },
    Range {
        pipe: Pipeline,
        body: Vec<Node>,
        otherwise: Option<Vec<Node>>,
        span: Span,
    },
    Break,
    Continue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Branch {
    pub pipe: Pipeline,
    pub body: Vec<Node>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pipeline {
    /// Variables declared (`:=`) or assigned (`=`) by this pipeline
    pub decl: Vec<String>,
    pub is_assign: bool,
    pub cmds: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub args: Vec<Operand>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Dot,
    /// `.a.b.c`
    Field(Vec<String>),
    /// `$x.a.b`
    Variable(String, Vec<String>),
    Function(String),
    Literal(Value),
    Nil,
    /// `(pipeline).a.b`
    Pipe(Box<Pipeline>, Vec<String>),
}

/// A parsed template, ready to be executed any number of times
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub(crate) source: String,
    pub(crate) nodes: Vec<Node>,
}

impl Template {
    /// Parse `source`; `is_function` decides which identifiers may be called
    pub fn parse(source: &str, is_function: &dyn Fn(&str) -> bool) -> Result<Self> {
        let items = lexer::lex(source)?;
        let mut parser = Parser {
            src: source,
            items,
            pos: 0,
            is_function,
            vars: vec!["$".to_string()],
            range_depth: 0,
            action_start: 0,
        };
        let (nodes, end) = parser.parse_list()?;
        match end {
            Terminator::Eof => Ok(Self {
                source: source.to_string(),
                nodes,
            }),
            Terminator::End(span) => Err(parser.error_at("unexpected {{end}}", span)),
            Terminator::Else(span) | Terminator::ElseIf(_, span) | Terminator::ElseWith(_, span) => {
                Err(parser.error_at("unexpected {{else}}", span))
            }
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

/// What ended a node list
enum Terminator {
    Eof,
    End(Span),
    Else(Span),
    ElseIf(Pipeline, Span),
    ElseWith(Pipeline, Span),
}

enum Parsed {
    Node(Node),
    Done(Terminator),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    If,
    With,
}

struct Parser<'a> {
    src: &'a str,
    items: Vec<Item>,
    pos: usize,
    is_function: &'a dyn Fn(&str) -> bool,
    /// Declared variables, innermost last
    vars: Vec<String>,
    range_depth: usize,
    /// Offset of the `{{` of the action being parsed
    action_start: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &Token {
        self.items
            .get(self.pos)
            .map(|i| &i.token)
            .unwrap_or(&Token::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.items
            .get(self.pos + offset)
            .map(|i| &i.token)
            .unwrap_or(&Token::Eof)
    }

    fn next(&mut self) -> Item {
        let item = self.items.get(self.pos).cloned().unwrap_or(Item {
            token: Token::Eof,
            start: self.src.len(),
            end: self.src.len(),
        });
        if self.pos < self.items.len() {
            self.pos += 1;
        }
        item
    }

    fn prev_end(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.items.get(i))
            .map_or(0, |i| i.end)
    }

    /// Span of the current action, up to its `}}`
    fn current_span(&self) -> Span {
        let end = self
            .items
            .iter()
            .find(|i| i.start >= self.action_start && matches!(i.token, Token::RightDelim { .. }))
            .map_or(self.src.len(), |i| i.end);
        Span {
            start: self.action_start,
            end,
        }
    }

    fn error_at(&self, message: impl Into<String>, span: Span) -> TemplateError {
        TemplateError::syntax(
            message,
            line_of(self.src, span.start),
            Some(self.src[span.start..span.end.min(self.src.len())].to_string()),
        )
    }

    fn error(&self, message: impl Into<String>) -> TemplateError {
        self.error_at(message, self.current_span())
    }

    fn unexpected(&self, item: &Item, context: &str) -> TemplateError {
        let message = match item.token {
            Token::Eof => format!("unexpected EOF in {}", context),
            _ => format!("unexpected {} in {}", item.token.describe(), context),
        };
        self.error(message)
    }

    fn parse_list(&mut self) -> Result<(Vec<Node>, Terminator)> {
        let mut nodes = Vec::new();
        loop {
            let item = self.next();
            match item.token {
                Token::Text(text) => nodes.push(Node::Text(text)),
                Token::LeftDelim { trim } => {
                    self.action_start = item.start;
                    match self.parse_action(trim)? {
                        Parsed::Node(node) => nodes.push(node),
                        Parsed::Done(end) => return Ok((nodes, end)),
                    }
                }
                Token::Eof => return Ok((nodes, Terminator::Eof)),
                _ => return Err(self.unexpected(&item, "template")),
            }
        }
    }

    fn expect_right_delim(&mut self, context: &str) -> Result<bool> {
        let item = self.next();
        match item.token {
            Token::RightDelim { trim } => Ok(trim),
            _ => Err(self.unexpected(&item, context)),
        }
    }

    fn parse_action(&mut self, trim_left: bool) -> Result<Parsed> {
        let start = self.action_start;
        match self.peek().clone() {
            Token::Keyword(Keyword::End) => {
                self.next();
                self.expect_right_delim("end")?;
                Ok(Parsed::Done(Terminator::End(self.span_from(start))))
            }
            Token::Keyword(Keyword::Else) => {
                self.next();
                match self.peek() {
                    Token::Keyword(Keyword::If) => {
                        self.next();
                        let (pipe, _) = self.parse_pipeline("if", false)?;
                        Ok(Parsed::Done(Terminator::ElseIf(pipe, self.span_from(start))))
                    }
                    Token::Keyword(Keyword::With) => {
                        self.next();
                        let (pipe, _) = self.parse_pipeline("with", false)?;
                        Ok(Parsed::Done(Terminator::ElseWith(pipe, self.span_from(start))))
                    }
                    _ => {
                        self.expect_right_delim("else")?;
                        Ok(Parsed::Done(Terminator::Else(self.span_from(start))))
                    }
                }
            }
            Token::Keyword(Keyword::If) => {
                self.next();
                self.parse_conditional(BlockKind::If).map(Parsed::Node)
            }
            Token::Keyword(Keyword::With) => {
                self.next();
                self.parse_conditional(BlockKind::With).map(Parsed::Node)
            }
            Token::Keyword(Keyword::Range) => {
                self.next();
                self.parse_range().map(Parsed::Node)
            }
            Token::Keyword(k @ (Keyword::Break | Keyword::Continue)) => {
                self.next();
                if self.range_depth == 0 {
                    return Err(self.error(format!("{{{{{}}}}} outside {{{{range}}}}", k.as_str())));
                }
                self.expect_right_delim(k.as_str())?;
                Ok(Parsed::Node(if k == Keyword::Break {
                    Node::Break
                } else {
                    Node::Continue
                }))
            }
            _ => {
                let (pipe, trim_right) = self.parse_pipeline("command", false)?;
                Ok(Parsed::Node(Node::Action {
                    pipe,
                    trim_left,
                    trim_right,
                    span: self.span_from(start),
                }))
            }
        }
    }

    fn span_from(&self, start: usize) -> Span {
        Span {
            start,
            end: self.prev_end(),
        }
    }

    /// `if` / `with` with any number of `else if` / `else with` branches
    fn parse_conditional(&mut self, kind: BlockKind) -> Result<Node> {
        let name = match kind {
            BlockKind::If => "if",
            BlockKind::With => "with",
        };
        let mark = self.vars.len();
        let start = self.action_start;
        let (mut pipe, _) = self.parse_pipeline(name, false)?;
        let mut span = self.span_from(start);
        let opening = span;
        let mut branches = Vec::new();
        let mut otherwise = None;

        loop {
            let (body, end) = self.parse_list()?;
            branches.push(Branch { pipe, body, span });
            match end {
                Terminator::End(_) => break,
                Terminator::Else(_) => {
                    let (body, end) = self.parse_list()?;
                    if !matches!(end, Terminator::End(_)) {
                        self.vars.truncate(mark);
                        return Err(self.terminator_error(end, name, opening));
                    }
                    otherwise = Some(body);
                    break;
                }
                Terminator::ElseIf(next, s) if kind == BlockKind::If => {
                    pipe = next;
                    span = s;
                }
                Terminator::ElseWith(next, s) if kind == BlockKind::With => {
                    pipe = next;
                    span = s;
                }
                other => {
                    self.vars.truncate(mark);
                    return Err(self.terminator_error(other, name, opening));
                }
            }
        }
        self.vars.truncate(mark);

        Ok(match kind {
            BlockKind::If => Node::If {
                branches,
                otherwise,
            },
            BlockKind::With => Node::With {
                branches,
                otherwise,
            },
        })
    }

    fn parse_range(&mut self) -> Result<Node> {
        let mark = self.vars.len();
        let start = self.action_start;
        let (pipe, _) = self.parse_pipeline("range", true)?;
        let span = self.span_from(start);

        self.range_depth += 1;
        let (body, end) = self.parse_list()?;
        self.range_depth -= 1;

        let otherwise = match end {
            Terminator::End(_) => None,
            Terminator::Else(_) => {
                let (body, end) = self.parse_list()?;
                if !matches!(end, Terminator::End(_)) {
                    return Err(self.terminator_error(end, "range", span));
                }
                Some(body)
            }
            other => return Err(self.terminator_error(other, "range", span)),
        };
        self.vars.truncate(mark);

        Ok(Node::Range {
            pipe,
            body,
            otherwise,
            span,
        })
    }

    /// `opening` is the action that started the block
    fn terminator_error(&self, end: Terminator, context: &str, opening: Span) -> TemplateError {
        match end {
            Terminator::Eof => self.error_at(
                format!("unexpected EOF: {{{{{}}}}} has no matching {{{{end}}}}", context),
                opening,
            ),
            Terminator::ElseIf(_, span) | Terminator::ElseWith(_, span) | Terminator::Else(span) => {
                self.error_at(format!("unexpected {{{{else}}}} in {}", context), span)
            }
            Terminator::End(span) => self.error_at("unexpected {{end}}", span),
        }
    }

    /// Parses up to and including `}}`; returns the pipeline and the right trim flag
    fn parse_pipeline(&mut self, context: &str, allow_pair: bool) -> Result<(Pipeline, bool)> {
        let mut pipe = Pipeline::default();
        self.parse_declarations(&mut pipe, context, allow_pair)?;

        loop {
            let cmd = self.parse_command()?;
            if cmd.args.is_empty() {
                let item = self.next();
                return Err(match item.token {
                    Token::RightDelim { .. } => self.error(format!("missing value for {}", context)),
                    _ => self.unexpected(&item, context),
                });
            }
            pipe.cmds.push(cmd);

            let item = self.next();
            match item.token {
                Token::Pipe => continue,
                Token::RightDelim { trim } => {
                    self.declare(&pipe);
                    return Ok((pipe, trim));
                }
                _ => return Err(self.unexpected(&item, context)),
            }
        }
    }

    /// Pipeline inside parentheses; consumes the closing `)`
    fn parse_nested_pipeline(&mut self) -> Result<Pipeline> {
        let mut pipe = Pipeline::default();
        self.parse_declarations(&mut pipe, "parenthesized pipeline", false)?;
        loop {
            let cmd = self.parse_command()?;
            if cmd.args.is_empty() {
                let item = self.next();
                return Err(self.unexpected(&item, "parenthesized pipeline"));
            }
            pipe.cmds.push(cmd);
            let item = self.next();
            match item.token {
                Token::Pipe => continue,
                Token::RightParen => {
                    self.declare(&pipe);
                    return Ok(pipe);
                }
                _ => return Err(self.unexpected(&item, "parenthesized pipeline")),
            }
        }
    }

    fn parse_declarations(&mut self, pipe: &mut Pipeline, context: &str, allow_pair: bool) -> Result<()> {
        let Token::Variable(first) = self.peek().clone() else {
            return Ok(());
        };
        match self.peek_at(1) {
            Token::Declare | Token::Assign => {
                pipe.is_assign = matches!(self.peek_at(1), Token::Assign);
                self.next();
                self.next();
                pipe.decl.push(first);
            }
            Token::Comma if allow_pair => {
                let Token::Variable(second) = self.peek_at(2).clone() else {
                    return Err(self.error(format!(
                        "unexpected {} in {}",
                        self.peek_at(2).describe(),
                        context
                    )));
                };
                match self.peek_at(3) {
                    Token::Declare | Token::Assign => {
                        pipe.is_assign = matches!(self.peek_at(3), Token::Assign);
                    }
                    _ => return Err(self.error(format!("expected := after {}, {}", first, second))),
                }
                for _ in 0..4 {
                    self.next();
                }
                pipe.decl.push(first);
                pipe.decl.push(second);
            }
            _ => return Ok(()),
        }
        if pipe.is_assign {
            if let Some(missing) = pipe.decl.iter().find(|v| !self.vars.contains(v)) {
                return Err(self.error(format!("undefined variable {:?}", missing)));
            }
        }
        Ok(())
    }

    fn declare(&mut self, pipe: &Pipeline) {
        if !pipe.is_assign {
            self.vars.extend(pipe.decl.iter().cloned());
        }
    }

    fn parse_command(&mut self) -> Result<Command> {
        let mut args = Vec::new();
        loop {
            match self.peek() {
                Token::Pipe | Token::RightDelim { .. } | Token::RightParen | Token::Eof => break,
                _ => args.push(self.parse_operand()?),
            }
        }
        Ok(Command { args })
    }

    fn parse_operand(&mut self) -> Result<Operand> {
        let item = self.next();
        let operand = match item.token {
            Token::Dot => return Ok(Operand::Dot),
            Token::Field(name) => {
                let mut fields = vec![name];
                fields.extend(self.field_chain());
                return Ok(Operand::Field(fields));
            }
            Token::Variable(name) => {
                if !self.vars.contains(&name) {
                    return Err(self.error(format!("undefined variable {:?}", name)));
                }
                let fields = self.field_chain();
                Operand::Variable(name, fields)
            }
            Token::Identifier(name) => {
                if !(self.is_function)(&name) {
                    let span = self.current_span();
                    return Err(TemplateError::UndefinedFunction {
                        name,
                        line: line_of(self.src, span.start),
                        tag: Some(self.src[span.start..span.end].to_string()),
                    });
                }
                Operand::Function(name)
            }
            Token::String(s) => Operand::Literal(Value::markup(s)),
            Token::Number(n) => Operand::Literal(self.number(&n)?),
            Token::Bool(b) => Operand::Literal(Value::Bool(b)),
            Token::Nil => Operand::Nil,
            Token::LeftParen => {
                let pipe = self.parse_nested_pipeline()?;
                let fields = self.field_chain();
                Operand::Pipe(Box::new(pipe), fields)
            }
            _ => return Err(self.unexpected(&item, "operand")),
        };
        Ok(operand)
    }

    /// Field tokens glued to the previous token (`$x.a.b`, `(…).a`)
    fn field_chain(&mut self) -> Vec<String> {
        let mut fields = Vec::new();
        while let Some(item) = self.items.get(self.pos) {
            let Token::Field(name) = &item.token else { break };
            if item.start != self.prev_end() {
                break;
            }
            fields.push(name.clone());
            self.pos += 1;
        }
        fields
    }

    fn number(&self, text: &str) -> Result<Value> {
        let clean = text.replace('_', "");
        let (negative, digits) = match clean.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, clean.strip_prefix('+').unwrap_or(&clean)),
        };
        if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
            let n = i64::from_str_radix(hex, 16)
                .map_err(|_| self.error(format!("bad number syntax: {:?}", text)))?;
            return Ok(Value::Int(if negative { -n } else { n }));
        }
        if let Ok(n) = clean.parse::<i64>() {
            return Ok(Value::Int(n));
        }
        clean
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| self.error(format!("bad number syntax: {:?}", text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Result<Template> {
        Template::parse(src, &|name| matches!(name, "len" | "printf" | "link"))
    }

    #[test]
    fn test_parse_field_action() {
        let t = parse("a {{.User.Name}} b").unwrap();
        assert_eq!(t.nodes.len(), 3);
        let Node::Action { pipe, .. } = &t.nodes[1] else {
            panic!("expected action")
        };
        assert_eq!(
            pipe.cmds[0].args,
            vec![Operand::Field(vec!["User".to_string(), "Name".to_string()])]
        );
    }

    #[test]
    fn test_separate_fields_are_separate_args() {
        let t = parse("{{printf \"%s\" .A .B}}").unwrap();
        let Node::Action { pipe, .. } = &t.nodes[0] else {
            panic!("expected action")
        };
        assert_eq!(pipe.cmds[0].args.len(), 4);
    }

    #[test]
    fn test_if_else_if_chain() {
        let t = parse("{{if .A}}a{{else if .B}}b{{else}}c{{end}}").unwrap();
        let Node::If {
            branches,
            otherwise,
        } = &t.nodes[0]
        else {
            panic!("expected if")
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(otherwise.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn test_range_declarations() {
        let t = parse("{{range $i, $e := .Items}}{{$i}}={{$e}}{{end}}").unwrap();
        let Node::Range { pipe, body, .. } = &t.nodes[0] else {
            panic!("expected range")
        };
        assert_eq!(pipe.decl, vec!["$i".to_string(), "$e".to_string()]);
        assert_eq!(body.len(), 3);
    }

    #[test]
    fn test_variables_are_scoped() {
        assert!(parse("{{range $e := .Items}}{{end}}{{$e}}").is_err());
        assert!(parse("{{$x := 1}}{{if .A}}{{$x = 2}}{{end}}{{$x}}").is_ok());
        assert!(parse("{{$y = 2}}").is_err());
    }

    #[test]
    fn test_undefined_function() {
        let err = parse("{{upper .Name}}").unwrap_err();
        assert!(matches!(err, TemplateError::UndefinedFunction { ref name, .. } if name == "upper"));
        assert_eq!(err.tag(), Some("{{upper .Name}}"));
    }

    #[test]
    fn test_missing_end() {
        let err = parse("{{if .A}}x").unwrap_err();
        assert!(err.to_string().contains("unexpected EOF"));
    }

    #[test]
    fn test_stray_end() {
        let err = parse("x{{end}}").unwrap_err();
        assert_eq!(err.tag(), Some("{{end}}"));
    }

    #[test]
    fn test_break_outside_range() {
        assert!(parse("{{break}}").is_err());
        assert!(parse("{{range .A}}{{if .B}}{{break}}{{end}}{{end}}").is_ok());
    }

    #[test]
    fn test_numbers() {
        let t = parse("{{len 0x1F}}{{len -2.5}}{{len 1_000}}").unwrap();
        let literals: Vec<Value> = t
            .nodes
            .iter()
            .filter_map(|n| match n {
                Node::Action { pipe, .. } => match &pipe.cmds[0].args[1] {
                    Operand::Literal(v) => Some(v.clone()),
                    _ => None,
                },
                _ => None,
            })
            .collect();
        assert_eq!(
            literals,
            vec![Value::Int(31), Value::Float(-2.5), Value::Int(1000)]
        );
    }

    #[test]
    fn test_parenthesized_pipeline_with_field() {
        let t = parse("{{(index .M \"k\").Name}}");
        // index is not known to this parser
        assert!(t.is_err());
        let t = Template::parse("{{(index .M \"k\").Name}}", &|n| n == "index").unwrap();
        let Node::Action { pipe, .. } = &t.nodes[0] else {
            panic!("expected action")
        };
        assert!(matches!(&pipe.cmds[0].args[0], Operand::Pipe(_, f) if f == &vec!["Name".to_string()]));
    }
}

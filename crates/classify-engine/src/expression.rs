//! Value expressions evaluated per feature by the point loader.
//!
//! An expression is either the name of a source field or a small arithmetic
//! expression over fields:
//!
//! ```text
//! "depth" * -1
//! sqrt(u^2 + v^2)
//! coalesce(elevation, 0) / 1000
//! ```
//!
//! Expressions are parsed once, prepared against a field schema (resolving
//! field names to attribute indices) and then evaluated per feature. NULL
//! propagates through arithmetic, and division by zero yields NULL.

use classify_common::{AttributeValue, ClassifyError, ClassifyResult, FieldDef};
use logos::{Logos, Span};

/// Result of evaluating an expression for one feature.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Number(f64),
    Text(String),
}

impl Value {
    fn from_attribute(value: &AttributeValue) -> Self {
        match value {
            AttributeValue::Null => Value::Null,
            AttributeValue::Int(v) => Value::Number(*v as f64),
            AttributeValue::Double(v) => Value::Number(*v),
            AttributeValue::Text(s) => Value::Text(s.clone()),
        }
    }

    /// Numeric view, `Ok(None)` for NULL and an error for non-numeric text.
    pub fn to_number(&self) -> ClassifyResult<Option<f64>> {
        match self {
            Value::Null => Ok(None),
            Value::Number(v) => Ok(Some(*v)),
            Value::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(Some)
                .map_err(|_| ClassifyError::NotNumber(s.clone())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Text(String),
    Null,
    Field(String),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Function {
    Abs,
    Sqrt,
    Ln,
    Log10,
    Exp,
    Floor,
    Ceil,
    Round,
    Min,
    Max,
    Coalesce,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        let func = match name.to_lowercase().as_str() {
            "abs" => Function::Abs,
            "sqrt" => Function::Sqrt,
            "ln" => Function::Ln,
            "log10" => Function::Log10,
            "exp" => Function::Exp,
            "floor" => Function::Floor,
            "ceil" => Function::Ceil,
            "round" => Function::Round,
            "min" => Function::Min,
            "max" => Function::Max,
            "coalesce" => Function::Coalesce,
            _ => return None,
        };
        Some(func)
    }

    /// Accepted argument count range (inclusive).
    fn arity(&self) -> (usize, usize) {
        match self {
            Function::Round => (1, 2),
            Function::Min | Function::Max | Function::Coalesce => (1, usize::MAX),
            _ => (1, 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Prepared {
    Constant(Value),
    Field(usize),
    Neg(Box<Prepared>),
    Binary {
        op: BinaryOp,
        lhs: Box<Prepared>,
        rhs: Box<Prepared>,
    },
    Call {
        func: Function,
        args: Vec<Prepared>,
    },
}

/// A parsed, not yet prepared, value expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueExpression {
    text: String,
    expr: Expr,
}

impl ValueExpression {
    /// Parse an expression string.
    ///
    /// Errors name the byte range of the offending token.
    pub fn parse(text: &str) -> ClassifyResult<Self> {
        let expr = parse_tokens(text).map_err(|e| {
            ClassifyError::ExpressionParse(format!(
                "expression '{}': {} at {}..{}",
                text, e.message, e.span.start, e.span.end
            ))
        })?;
        Ok(Self {
            text: text.to_string(),
            expr,
        })
    }

    /// Parse `text`, treating it as a plain field reference when it names a
    /// field exactly (so names with spaces or operators need no quoting).
    pub fn for_fields(text: &str, fields: &[FieldDef]) -> ClassifyResult<Self> {
        if fields.iter().any(|f| f.name == text) {
            return Ok(Self {
                text: text.to_string(),
                expr: Expr::Field(text.to_string()),
            });
        }
        Self::parse(text)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the expression is a bare field reference.
    pub fn is_field(&self) -> bool {
        matches!(self.expr, Expr::Field(_))
    }

    /// Names of the fields the expression reads.
    pub fn referenced_fields(&self) -> Vec<String> {
        let mut names = Vec::new();
        collect_fields(&self.expr, &mut names);
        names
    }

    /// Resolve field names and functions against a schema.
    pub fn prepare(&self, fields: &[FieldDef]) -> ClassifyResult<PreparedExpression> {
        let root = prepare_expr(&self.expr, fields)
            .map_err(|_| ClassifyError::ExpressionPrepare(self.text.clone()))?;
        Ok(PreparedExpression { root })
    }
}

fn collect_fields(expr: &Expr, names: &mut Vec<String>) {
    match expr {
        Expr::Field(name) => {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        Expr::Neg(inner) => collect_fields(inner, names),
        Expr::Binary { lhs, rhs, .. } => {
            collect_fields(lhs, names);
            collect_fields(rhs, names);
        }
        Expr::Call { args, .. } => args.iter().for_each(|a| collect_fields(a, names)),
        Expr::Number(_) | Expr::Text(_) | Expr::Null => {}
    }
}

fn prepare_expr(expr: &Expr, fields: &[FieldDef]) -> Result<Prepared, ()> {
    Ok(match expr {
        Expr::Number(v) => Prepared::Constant(Value::Number(*v)),
        Expr::Text(s) => Prepared::Constant(Value::Text(s.clone())),
        Expr::Null => Prepared::Constant(Value::Null),
        Expr::Field(name) => {
            let index = fields.iter().position(|f| &f.name == name).ok_or(())?;
            Prepared::Field(index)
        }
        Expr::Neg(inner) => Prepared::Neg(Box::new(prepare_expr(inner, fields)?)),
        Expr::Binary { op, lhs, rhs } => Prepared::Binary {
            op: *op,
            lhs: Box::new(prepare_expr(lhs, fields)?),
            rhs: Box::new(prepare_expr(rhs, fields)?),
        },
        Expr::Call { name, args } => {
            let func = Function::lookup(name).ok_or(())?;
            let (min_args, max_args) = func.arity();
            if args.len() < min_args || args.len() > max_args {
                return Err(());
            }
            let args = args
                .iter()
                .map(|a| prepare_expr(a, fields))
                .collect::<Result<Vec<_>, _>>()?;
            Prepared::Call { func, args }
        }
    })
}

/// An expression bound to a field schema, ready for evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedExpression {
    root: Prepared,
}

impl PreparedExpression {
    /// Evaluate against one feature's attributes.
    pub fn evaluate(&self, attributes: &[AttributeValue]) -> ClassifyResult<Value> {
        eval(&self.root, attributes)
    }
}

fn eval(node: &Prepared, attributes: &[AttributeValue]) -> ClassifyResult<Value> {
    match node {
        Prepared::Constant(v) => Ok(v.clone()),
        Prepared::Field(index) => Ok(attributes
            .get(*index)
            .map(Value::from_attribute)
            .unwrap_or(Value::Null)),
        Prepared::Neg(inner) => Ok(match eval(inner, attributes)?.to_number()? {
            Some(v) => Value::Number(-v),
            None => Value::Null,
        }),
        Prepared::Binary { op, lhs, rhs } => {
            let a = eval(lhs, attributes)?.to_number()?;
            let b = eval(rhs, attributes)?.to_number()?;
            let (a, b) = match (a, b) {
                (Some(a), Some(b)) => (a, b),
                _ => return Ok(Value::Null),
            };
            let result = match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div | BinaryOp::Rem if b == 0.0 => return Ok(Value::Null),
                BinaryOp::Div => a / b,
                BinaryOp::Rem => a % b,
                BinaryOp::Pow => a.powf(b),
            };
            Ok(Value::Number(result))
        }
        Prepared::Call { func, args } => eval_call(*func, args, attributes),
    }
}

fn eval_call(func: Function, args: &[Prepared], attributes: &[AttributeValue]) -> ClassifyResult<Value> {
    match func {
        Function::Coalesce => {
            for arg in args {
                let value = eval(arg, attributes)?;
                if value != Value::Null {
                    return Ok(value);
                }
            }
            Ok(Value::Null)
        }
        Function::Min | Function::Max => {
            let mut best: Option<f64> = None;
            for arg in args {
                if let Some(v) = eval(arg, attributes)?.to_number()? {
                    best = Some(match best {
                        None => v,
                        Some(b) if func == Function::Min => b.min(v),
                        Some(b) => b.max(v),
                    });
                }
            }
            Ok(best.map_or(Value::Null, Value::Number))
        }
        Function::Round => {
            let value = eval(&args[0], attributes)?.to_number()?;
            let places = match args.get(1) {
                Some(arg) => eval(arg, attributes)?.to_number()?,
                None => Some(0.0),
            };
            Ok(match (value, places) {
                (Some(v), Some(p)) => {
                    let scale = 10f64.powi(p as i32);
                    Value::Number((v * scale).round() / scale)
                }
                _ => Value::Null,
            })
        }
        _ => {
            let value = match eval(&args[0], attributes)?.to_number()? {
                Some(v) => v,
                None => return Ok(Value::Null),
            };
            let result = match func {
                Function::Abs => value.abs(),
                Function::Sqrt => value.sqrt(),
                Function::Ln => value.ln(),
                Function::Log10 => value.log10(),
                Function::Exp => value.exp(),
                Function::Floor => value.floor(),
                Function::Ceil => value.ceil(),
                _ => unreachable!("handled above"),
            };
            Ok(Value::Number(result))
        }
    }
}

/// Nesting limit for parentheses, calls, unary operators and operator chains.
const MAX_DEPTH: usize = 128;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
enum Token {
    #[regex(r"[0-9]+(\.[0-9]*)?([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),
    #[regex(r"[\p{L}_][\p{L}\p{N}_]*", |lex| lex.slice().to_string())]
    Ident(String),
    #[regex(r#""([^"]|"")*""#, |lex| unquote(lex.slice(), '"'))]
    QuotedIdent(String),
    #[regex(r"'([^']|'')*'", |lex| unquote(lex.slice(), '\''))]
    Text(String),
    #[regex(r"[-+*/%^]", |lex| lex.slice().chars().next())]
    Op(char),
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,
}

/// Strip the surrounding quotes; a doubled quote is an escaped quote.
fn unquote(slice: &str, quote: char) -> String {
    let inner = &slice[1..slice.len() - 1];
    let doubled: String = [quote, quote].iter().collect();
    inner.replace(&doubled, &quote.to_string())
}

#[derive(Debug, Clone, PartialEq)]
struct SyntaxError {
    message: String,
    span: Span,
}

impl SyntaxError {
    fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<(Token, Span)>, SyntaxError> {
    Token::lexer(text)
        .spanned()
        .map(|(token, span)| match token {
            Ok(token) => Ok((token, span)),
            Err(()) => Err(SyntaxError::new(
                format!("unexpected '{}'", &text[span.clone()]),
                span,
            )),
        })
        .collect()
}

fn parse_tokens(text: &str) -> Result<Expr, SyntaxError> {
    let mut parser = Parser {
        text,
        tokens: tokenize(text)?,
        pos: 0,
        depth: 0,
    };
    let expr = parser.parse_expression()?;
    match parser.tokens.get(parser.pos) {
        Some((_, span)) => Err(parser.unexpected(span.clone())),
        None => Ok(expr),
    }
}

struct Parser<'a> {
    text: &'a str,
    tokens: Vec<(Token, Span)>,
    pos: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(token, _)| token)
    }

    fn next(&mut self) -> Result<(Token, Span), SyntaxError> {
        match self.tokens.get(self.pos) {
            Some(entry) => {
                self.pos += 1;
                Ok(entry.clone())
            }
            None => Err(self.end_of_input()),
        }
    }

    fn unexpected(&self, span: Span) -> SyntaxError {
        let found = &self.text[span.clone()];
        SyntaxError::new(format!("unexpected '{}'", found), span)
    }

    fn end_of_input(&self) -> SyntaxError {
        let end = self.text.len();
        SyntaxError::new("unexpected end of expression", end..end)
    }

    /// Enter one nesting level at the token just consumed.
    fn descend(&mut self) -> Result<(), SyntaxError> {
        if self.depth >= MAX_DEPTH {
            let span = self.tokens[self.pos - 1].1.clone();
            return Err(SyntaxError::new(
                format!("expression nested more than {} levels deep", MAX_DEPTH),
                span,
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn parse_expression(&mut self) -> Result<Expr, SyntaxError> {
        let entry = self.depth;
        let mut lhs = self.parse_term()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek().cloned() {
            self.pos += 1;
            self.descend()?;
            let rhs = self.parse_term()?;
            let op = if op == '+' { BinaryOp::Add } else { BinaryOp::Sub };
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        self.depth = entry;
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, SyntaxError> {
        let entry = self.depth;
        let mut lhs = self.parse_unary()?;
        while let Some(Token::Op(op @ ('*' | '/' | '%'))) = self.peek().cloned() {
            self.pos += 1;
            self.descend()?;
            let rhs = self.parse_unary()?;
            let op = match op {
                '*' => BinaryOp::Mul,
                '/' => BinaryOp::Div,
                _ => BinaryOp::Rem,
            };
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        self.depth = entry;
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, SyntaxError> {
        match self.peek() {
            Some(Token::Op(op @ ('-' | '+'))) => {
                let negate = *op == '-';
                self.pos += 1;
                self.descend()?;
                let inner = self.parse_unary()?;
                self.depth -= 1;
                Ok(if negate { Expr::Neg(Box::new(inner)) } else { inner })
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Expr, SyntaxError> {
        let base = self.parse_primary()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.pos += 1;
            self.descend()?;
            let exponent = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expr::Binary {
                op: BinaryOp::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, SyntaxError> {
        let (token, span) = self.next()?;
        match token {
            Token::Number(v) => Ok(Expr::Number(v)),
            Token::Text(s) => Ok(Expr::Text(s)),
            Token::QuotedIdent(name) => Ok(Expr::Field(name)),
            Token::Ident(name) => {
                if let Some(Token::LParen) = self.peek() {
                    self.pos += 1;
                    self.descend()?;
                    let args = self.parse_arguments()?;
                    self.depth -= 1;
                    Ok(Expr::Call { name, args })
                } else if name.eq_ignore_ascii_case("null") {
                    Ok(Expr::Null)
                } else {
                    Ok(Expr::Field(name))
                }
            }
            Token::LParen => {
                self.descend()?;
                let inner = self.parse_expression()?;
                self.depth -= 1;
                match self.next()? {
                    (Token::RParen, _) => Ok(inner),
                    (_, span) => Err(self.unexpected(span)),
                }
            }
            _ => Err(self.unexpected(span)),
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, SyntaxError> {
        let mut args = Vec::new();
        if let Some(Token::RParen) = self.peek() {
            self.pos += 1;
            return Ok(args);
        }
        loop {
            args.push(self.parse_expression()?);
            match self.next()? {
                (Token::Comma, _) => continue,
                (Token::RParen, _) => return Ok(args),
                (_, span) => return Err(self.unexpected(span)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classify_common::FieldType;

    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::new("depth", FieldType::Double),
            FieldDef::new("name", FieldType::String),
            FieldDef::new("sea level", FieldType::Double),
        ]
    }

    fn eval_str(text: &str, attrs: &[AttributeValue]) -> ClassifyResult<Value> {
        ValueExpression::for_fields(text, &fields())?
            .prepare(&fields())?
            .evaluate(attrs)
    }

    fn attrs(depth: AttributeValue) -> Vec<AttributeValue> {
        vec![depth, AttributeValue::Text("a".into()), AttributeValue::Double(2.0)]
    }

    #[test]
    fn test_plain_field() {
        let value = eval_str("depth", &attrs(AttributeValue::Double(4.5))).unwrap();
        assert_eq!(value, Value::Number(4.5));
    }

    #[test]
    fn test_field_with_space_needs_no_quotes() {
        let value = eval_str("sea level", &attrs(AttributeValue::Null)).unwrap();
        assert_eq!(value, Value::Number(2.0));
    }

    #[test]
    fn test_arithmetic_precedence() {
        let value = eval_str("\"depth\" * -2 + 3 ^ 2", &attrs(AttributeValue::Int(1))).unwrap();
        assert_eq!(value, Value::Number(7.0));
        let value = eval_str("-2 ^ 2", &attrs(AttributeValue::Null)).unwrap();
        assert_eq!(value, Value::Number(-4.0));
        let value = eval_str("(1 + 2) * 3", &attrs(AttributeValue::Null)).unwrap();
        assert_eq!(value, Value::Number(9.0));
    }

    #[test]
    fn test_functions() {
        let a = attrs(AttributeValue::Double(-9.0));
        assert_eq!(eval_str("sqrt(abs(depth))", &a).unwrap(), Value::Number(3.0));
        assert_eq!(eval_str("max(depth, 1, 4)", &a).unwrap(), Value::Number(4.0));
        assert_eq!(eval_str("round(2.346, 2)", &a).unwrap(), Value::Number(2.35));
        let nulls = attrs(AttributeValue::Null);
        assert_eq!(eval_str("coalesce(depth, 7)", &nulls).unwrap(), Value::Number(7.0));
    }

    #[test]
    fn test_null_propagation() {
        let value = eval_str("depth + 1", &attrs(AttributeValue::Null)).unwrap();
        assert_eq!(value, Value::Null);
        let value = eval_str("1 / 0", &attrs(AttributeValue::Null)).unwrap();
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn test_text_coercion() {
        let value = eval_str("depth * 2", &attrs(AttributeValue::Text("1.5".into()))).unwrap();
        assert_eq!(value, Value::Number(3.0));
        let err = eval_str("name + 1", &attrs(AttributeValue::Null)).unwrap_err();
        assert!(matches!(err, ClassifyError::NotNumber(_)));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            ValueExpression::parse("depth +"),
            Err(ClassifyError::ExpressionParse(_))
        ));
        assert!(matches!(
            ValueExpression::parse("(depth"),
            Err(ClassifyError::ExpressionParse(_))
        ));
        assert!(matches!(
            ValueExpression::parse("depth $ 2"),
            Err(ClassifyError::ExpressionParse(_))
        ));
    }

    #[test]
    fn test_parse_error_reports_position() {
        let err = ValueExpression::parse("depth $ 2").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Cannot parse expression 'depth $ 2': unexpected '$' at 6..7"
        );

        let err = ValueExpression::parse("(depth + 1))").unwrap_err();
        assert!(err.to_string().ends_with("unexpected ')' at 11..12"), "{}", err);

        let err = ValueExpression::parse("depth +").unwrap_err();
        assert!(err.to_string().ends_with("unexpected end of expression at 7..7"), "{}", err);

        let err = ValueExpression::parse("'open").unwrap_err();
        assert!(err.to_string().contains("at 0.."), "{}", err);
    }

    #[test]
    fn test_quoted_tokens() {
        let expr = ValueExpression::parse("\"say \"\"hi\"\"\" + 'it''s'").unwrap();
        assert_eq!(expr.referenced_fields(), vec!["say \"hi\""]);
        assert_eq!(
            eval_str("coalesce(NULL, 'it''s')", &attrs(AttributeValue::Null)).unwrap(),
            Value::Text("it's".into())
        );
        assert_eq!(eval_str(".5e1 + 1.", &attrs(AttributeValue::Null)).unwrap(), Value::Number(6.0));
    }

    #[test]
    fn test_deep_nesting_rejected() {
        for text in [
            "(".repeat(10_000) + "1" + &")".repeat(10_000),
            "-".repeat(100_000) + "1",
            "2".to_string() + &"^2".repeat(10_000),
            "abs(".repeat(10_000) + "1" + &")".repeat(10_000),
            "1".to_string() + &"+1".repeat(100_000),
        ] {
            let err = ValueExpression::parse(&text).unwrap_err();
            match err {
                ClassifyError::ExpressionParse(message) => {
                    assert!(message.contains("nested more than"), "{}", &message[message.len() - 60..])
                }
                other => panic!("unexpected error {:?}", other),
            }
        }

        let text = "(".repeat(MAX_DEPTH - 1) + "1" + &")".repeat(MAX_DEPTH - 1);
        assert_eq!(eval_str(&text, &attrs(AttributeValue::Null)).unwrap(), Value::Number(1.0));
    }

    #[test]
    fn test_prepare_errors() {
        let expr = ValueExpression::parse("height * 2").unwrap();
        assert!(matches!(
            expr.prepare(&fields()),
            Err(ClassifyError::ExpressionPrepare(_))
        ));
        let expr = ValueExpression::parse("frobnicate(depth)").unwrap();
        assert!(expr.prepare(&fields()).is_err());
        let expr = ValueExpression::parse("sqrt(depth, 2)").unwrap();
        assert!(expr.prepare(&fields()).is_err());
    }

    #[test]
    fn test_referenced_fields() {
        let expr = ValueExpression::parse("depth + \"sea level\" * depth").unwrap();
        assert_eq!(expr.referenced_fields(), vec!["depth", "sea level"]);
        assert!(!expr.is_field());
    }
}

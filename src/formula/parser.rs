//! Recursive-descent parser producing the formula AST.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr       := or ( "if" or "else" expr )?
//! or         := and ( "or" and )*
//! and        := not ( "and" not )*
//! not        := "not" not | comparison
//! comparison := sum ( cmp_op sum )*
//! sum        := term ( ("+" | "-") term )*
//! term       := unary ( ("*" | "/" | "//" | "%") unary )*
//! unary      := ("-" | "+") unary | power
//! power      := postfix ( "**" unary )?
//! postfix    := primary ( "[" expr "]" | "." name | "." name "(" args ")" )*
//! primary    := literal | name | name "(" args ")" | "(" expr ")"
//! ```
//!
//! Calls are only accepted on a bare function name or as a method on a
//! member access; anything else (calling the result of an index, a
//! parenthesised value, ...) is rejected while parsing.

use super::lexer::{tokenize, Spanned, Token};
use super::value::Value;
use super::ExprError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Formula expression tree.
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    Name(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// `a < b <= c` keeps every operand so each is evaluated once.
    Compare(Box<Expr>, Vec<(CmpOp, Expr)>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Index(Box<Expr>, Box<Expr>),
    Member(Box<Expr>, String),
    Call(String, Vec<Expr>),
    MethodCall(Box<Expr>, String, Vec<Expr>),
}

impl Expr {
    /// Every bare name the expression reads, in source order.
    pub fn names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Literal(_) => {}
            Expr::Name(n) => out.push(n),
            Expr::Unary(_, e) | Expr::Not(e) | Expr::Member(e, _) => e.collect_names(out),
            Expr::Binary(_, a, b) | Expr::And(a, b) | Expr::Or(a, b) | Expr::Index(a, b) => {
                a.collect_names(out);
                b.collect_names(out);
            }
            Expr::Compare(first, rest) => {
                first.collect_names(out);
                for (_, e) in rest {
                    e.collect_names(out);
                }
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                then.collect_names(out);
                condition.collect_names(out);
                otherwise.collect_names(out);
            }
            Expr::Call(_, args) => {
                for a in args {
                    a.collect_names(out);
                }
            }
            Expr::MethodCall(target, _, args) => {
                target.collect_names(out);
                for a in args {
                    a.collect_names(out);
                }
            }
        }
    }
}

/// Parse a complete expression. Trailing tokens are an error.
pub fn parse(source: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: source.len(),
    };
    let expr = parser.parse_expr()?;
    if let Some(tok) = parser.peek() {
        return Err(ExprError::Syntax {
            offset: tok.offset,
            message: format!("unexpected trailing {}", describe(&tok.token)),
        });
    }
    Ok(expr)
}

/// Keywords that can never be used as names.
const KEYWORDS: &[&str] = &[
    "and", "or", "not", "if", "else", "True", "False", "None", "lambda", "import", "for", "in",
    "is",
];

fn describe(token: &Token) -> String {
    match token {
        Token::Int(i) => format!("number {i}"),
        Token::Float(f) => format!("number {f}"),
        Token::Str(s) => format!("string '{s}'"),
        Token::Ident(name) => format!("name '{name}'"),
        Token::Symbol(s) => format!("'{s}'"),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    fn offset(&self) -> usize {
        self.peek().map_or(self.end, |t| t.offset)
    }

    fn error(&self, message: impl Into<String>) -> ExprError {
        ExprError::Syntax {
            offset: self.offset(),
            message: message.into(),
        }
    }

    fn at_symbol(&self, sym: &str) -> bool {
        matches!(self.peek(), Some(Spanned { token: Token::Symbol(s), .. }) if *s == sym)
    }

    fn at_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Spanned { token: Token::Ident(s), .. }) if s == kw)
    }

    fn eat_symbol(&mut self, sym: &str) -> bool {
        if self.at_symbol(sym) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.at_keyword(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, sym: &str) -> Result<(), ExprError> {
        if self.eat_symbol(sym) {
            return Ok(());
        }
        let found = self
            .peek()
            .map_or_else(|| "end of input".to_string(), |t| describe(&t.token));
        Err(self.error(format!("expected '{sym}', found {found}")))
    }

    fn parse_expr(&mut self) -> Result<Expr, ExprError> {
        let value = self.parse_or()?;
        if self.eat_keyword("if") {
            let condition = self.parse_or()?;
            if !self.eat_keyword("else") {
                return Err(self.error("expected 'else' in conditional expression"));
            }
            let otherwise = self.parse_expr()?;
            return Ok(Expr::Conditional {
                condition: Box::new(condition),
                then: Box::new(value),
                otherwise: Box::new(otherwise),
            });
        }
        Ok(value)
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_and()?;
        while self.eat_keyword("or") {
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_not()?;
        while self.eat_keyword("and") {
            let rhs = self.parse_not()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, ExprError> {
        if self.eat_keyword("not") {
            let operand = self.parse_not()?;
            return Ok(Expr::Not(Box::new(operand)));
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let first = self.parse_sum()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.peek() {
                Some(Spanned {
                    token: Token::Symbol(s),
                    ..
                }) => match *s {
                    "==" => CmpOp::Eq,
                    "!=" => CmpOp::Ne,
                    "<" => CmpOp::Lt,
                    "<=" => CmpOp::Le,
                    ">" => CmpOp::Gt,
                    ">=" => CmpOp::Ge,
                    _ => break,
                },
                _ => break,
            };
            self.pos += 1;
            rest.push((op, self.parse_sum()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare(Box::new(first), rest))
        }
    }

    fn parse_sum(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_term()?;
        loop {
            let op = if self.eat_symbol("+") {
                BinaryOp::Add
            } else if self.eat_symbol("-") {
                BinaryOp::Sub
            } else {
                break;
            };
            let rhs = self.parse_term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.eat_symbol("*") {
                BinaryOp::Mul
            } else if self.eat_symbol("//") {
                BinaryOp::FloorDiv
            } else if self.eat_symbol("/") {
                BinaryOp::Div
            } else if self.eat_symbol("%") {
                BinaryOp::Mod
            } else {
                break;
            };
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat_symbol("-") {
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.parse_unary()?)));
        }
        if self.eat_symbol("+") {
            return Ok(Expr::Unary(UnaryOp::Pos, Box::new(self.parse_unary()?)));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, ExprError> {
        let base = self.parse_postfix()?;
        if self.eat_symbol("**") {
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(
                BinaryOp::Pow,
                Box::new(base),
                Box::new(exponent),
            ));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expr, ExprError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.eat_symbol("[") {
                let key = self.parse_expr()?;
                self.expect_symbol("]")?;
                expr = Expr::Index(Box::new(expr), Box::new(key));
            } else if self.eat_symbol(".") {
                let name = self.parse_name("attribute name")?;
                if self.eat_symbol("(") {
                    let args = self.parse_args()?;
                    expr = Expr::MethodCall(Box::new(expr), name, args);
                } else {
                    expr = Expr::Member(Box::new(expr), name);
                }
            } else if self.at_symbol("(") {
                return Err(ExprError::DisallowedCall(
                    "only named functions can be called".to_string(),
                ));
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_name(&mut self, what: &str) -> Result<String, ExprError> {
        match self.peek() {
            Some(Spanned {
                token: Token::Ident(name),
                ..
            }) if !KEYWORDS.contains(&name.as_str()) => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error(format!("expected {what}"))),
        }
    }

    /// Arguments after an already-consumed `(`, through the closing `)`.
    fn parse_args(&mut self) -> Result<Vec<Expr>, ExprError> {
        let mut args = Vec::new();
        if self.eat_symbol(")") {
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            if self.eat_symbol(")") {
                return Ok(args);
            }
            self.expect_symbol(",")?;
            // Trailing comma.
            if self.eat_symbol(")") {
                return Ok(args);
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ExprError> {
        let Some(spanned) = self.peek().cloned() else {
            return Err(self.error("unexpected end of input"));
        };

        match spanned.token {
            Token::Int(i) => {
                self.pos += 1;
                Ok(Expr::Literal(Value::Int(i)))
            }
            Token::Float(f) => {
                self.pos += 1;
                Ok(Expr::Literal(Value::Float(f)))
            }
            Token::Str(s) => {
                self.pos += 1;
                Ok(Expr::Literal(Value::Str(s)))
            }
            Token::Symbol("(") => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                self.expect_symbol(")")?;
                Ok(inner)
            }
            Token::Ident(name) => match name.as_str() {
                "True" => {
                    self.pos += 1;
                    Ok(Expr::Literal(Value::Bool(true)))
                }
                "False" => {
                    self.pos += 1;
                    Ok(Expr::Literal(Value::Bool(false)))
                }
                "None" => {
                    self.pos += 1;
                    Ok(Expr::Literal(Value::Null))
                }
                "lambda" | "import" | "for" | "in" | "is" => {
                    Err(ExprError::Disallowed(format!("'{name}' is not supported")))
                }
                _ if KEYWORDS.contains(&name.as_str()) => {
                    Err(self.error(format!("unexpected keyword '{name}'")))
                }
                _ => {
                    self.pos += 1;
                    if name.starts_with("__") {
                        return Err(ExprError::Disallowed(format!(
                            "dunder name '{name}' is not allowed"
                        )));
                    }
                    if self.eat_symbol("(") {
                        let args = self.parse_args()?;
                        Ok(Expr::Call(name, args))
                    } else {
                        Ok(Expr::Name(name))
                    }
                }
            },
            other => Err(self.error(format!("unexpected {}", describe(&other)))),
        }
    }
}

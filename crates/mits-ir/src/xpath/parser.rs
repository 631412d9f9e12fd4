//! Recursive-descent parser producing the expression tree

use super::lexer::{Spanned, Token, tokenize};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    Ancestor,
    AncestorOrSelf,
    SelfAxis,
    Attribute,
    FollowingSibling,
    PrecedingSibling,
}

impl Axis {
    fn from_name(name: &str) -> Option<Axis> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "self" => Axis::SelfAxis,
            "attribute" => Axis::Attribute,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NodeTest {
    /// Named test; `prefix` is resolved through the namespace bindings
    Name {
        prefix: Option<String>,
        local: String,
    },
    /// `*` or `prefix:*`
    Any { prefix: Option<String> },
    /// `text()`
    Text,
    /// `node()`
    Node,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Step {
    pub axis: Axis,
    pub test: NodeTest,
    pub predicates: Vec<Expr>,
}

impl Step {
    fn descendant_or_self() -> Self {
        Step {
            axis: Axis::DescendantOrSelf,
            test: NodeTest::Node,
            predicates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Negate(Box<Expr>),
    Union(Box<Expr>, Box<Expr>),
    Literal(String),
    Number(f64),
    Function(String, Vec<Expr>),
    /// Location path; `absolute` paths start at the document node
    Path { absolute: bool, steps: Vec<Step> },
    /// Primary expression with predicates and an optional trailing path
    Filter {
        primary: Box<Expr>,
        predicates: Vec<Expr>,
        steps: Vec<Step>,
    },
}

impl Expr {
    /// Turn relative location paths into `//path` so they match anywhere,
    /// the way rule contexts are interpreted.
    pub(crate) fn anchor_anywhere(self) -> Expr {
        match self {
            Expr::Path {
                absolute: false,
                mut steps,
            } => {
                steps.insert(0, Step::descendant_or_self());
                Expr::Path {
                    absolute: true,
                    steps,
                }
            }
            Expr::Union(a, b) => Expr::Union(
                Box::new(a.anchor_anywhere()),
                Box::new(b.anchor_anywhere()),
            ),
            other => other,
        }
    }
}

pub(crate) fn parse(expr: &str) -> Result<Expr> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser {
        expr,
        tokens,
        pos: 0,
    };
    if parser.tokens.is_empty() {
        return Err(Error::xpath_syntax(expr, 0, "empty expression"));
    }
    let ast = parser.parse_or()?;
    if let Some((tok, offset)) = parser.tokens.get(parser.pos) {
        return Err(Error::xpath_syntax(
            expr,
            *offset,
            format!("unexpected token {tok:?}"),
        ));
    }
    Ok(ast)
}

struct Parser<'e> {
    expr: &'e str,
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.tokens.get(self.pos + ahead).map(|(t, _)| t)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.expr.len(), |(_, o)| *o)
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::xpath_syntax(self.expr, self.offset(), message)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(self.error(format!("expected {expected:?}")))
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Some(Token::Name(n)) if n == word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while self.eat_keyword("or") {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_equality()?;
        while self.eat_keyword("and") {
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => BinaryOp::Eq,
                Some(Token::NotEq) => BinaryOp::NotEq,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_relational()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_relational(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => BinaryOp::Lt,
                Some(Token::LtEq) => BinaryOp::LtEq,
                Some(Token::Gt) => BinaryOp::Gt,
                Some(Token::GtEq) => BinaryOp::GtEq,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Name(n)) if n == "div" => BinaryOp::Div,
                Some(Token::Name(n)) if n == "mod" => BinaryOp::Mod,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if self.eat(&Token::Minus) {
            let inner = self.parse_unary()?;
            return Ok(Expr::Negate(Box::new(inner)));
        }
        self.parse_union()
    }

    fn parse_union(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_path_expr()?;
        while self.eat(&Token::Pipe) {
            let rhs = self.parse_path_expr()?;
            lhs = Expr::Union(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn starts_primary(&self) -> bool {
        match self.peek() {
            Some(Token::LParen | Token::Literal(_) | Token::Number(_)) => true,
            Some(Token::Name(n)) => {
                self.peek_at(1) == Some(&Token::LParen)
                    && !matches!(n.as_str(), "text" | "node" | "comment" | "processing-instruction")
            }
            _ => false,
        }
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Dot | Token::DotDot | Token::At | Token::Star | Token::Name(_))
        )
    }

    fn parse_path_expr(&mut self) -> Result<Expr> {
        if self.starts_primary() {
            let primary = self.parse_primary()?;
            let predicates = self.parse_predicates()?;
            let mut steps = Vec::new();
            if matches!(self.peek(), Some(Token::Slash | Token::DoubleSlash)) {
                self.parse_relative_steps(&mut steps, true)?;
            }
            if predicates.is_empty() && steps.is_empty() {
                return Ok(primary);
            }
            return Ok(Expr::Filter {
                primary: Box::new(primary),
                predicates,
                steps,
            });
        }

        match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                let mut steps = Vec::new();
                if self.starts_step() {
                    self.parse_relative_steps(&mut steps, false)?;
                }
                Ok(Expr::Path {
                    absolute: true,
                    steps,
                })
            }
            Some(Token::DoubleSlash) => {
                self.pos += 1;
                let mut steps = vec![Step::descendant_or_self()];
                self.parse_relative_steps(&mut steps, false)?;
                Ok(Expr::Path {
                    absolute: true,
                    steps,
                })
            }
            _ if self.starts_step() => {
                let mut steps = Vec::new();
                self.parse_relative_steps(&mut steps, false)?;
                Ok(Expr::Path {
                    absolute: false,
                    steps,
                })
            }
            Some(_) => Err(self.error("expected expression")),
            None => Err(self.error("unexpected end of expression")),
        }
    }

    /// Parse `step (('/' | '//') step)*`. With `leading_separator` the first
    /// step must be preceded by a separator.
    fn parse_relative_steps(&mut self, steps: &mut Vec<Step>, leading_separator: bool) -> Result<()> {
        let mut need_separator = leading_separator;
        loop {
            if need_separator {
                match self.peek() {
                    Some(Token::Slash) => self.pos += 1,
                    Some(Token::DoubleSlash) => {
                        self.pos += 1;
                        steps.push(Step::descendant_or_self());
                    }
                    _ => return Ok(()),
                }
            }
            steps.push(self.parse_step()?);
            need_separator = true;
        }
    }

    fn parse_step(&mut self) -> Result<Step> {
        match self.peek() {
            Some(Token::Dot) => {
                self.pos += 1;
                return Ok(Step {
                    axis: Axis::SelfAxis,
                    test: NodeTest::Node,
                    predicates: Vec::new(),
                });
            }
            Some(Token::DotDot) => {
                self.pos += 1;
                return Ok(Step {
                    axis: Axis::Parent,
                    test: NodeTest::Node,
                    predicates: Vec::new(),
                });
            }
            _ => {}
        }

        let axis = if self.eat(&Token::At) {
            Axis::Attribute
        } else if let (Some(Token::Name(n)), Some(Token::DoubleColon)) = (self.peek(), self.peek_at(1)) {
            let axis = Axis::from_name(n).ok_or_else(|| self.error(format!("unknown axis '{n}'")))?;
            self.pos += 2;
            axis
        } else {
            Axis::Child
        };

        let test = self.parse_node_test()?;
        let predicates = self.parse_predicates()?;
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn parse_node_test(&mut self) -> Result<NodeTest> {
        match self.advance() {
            Some(Token::Star) => Ok(NodeTest::Any { prefix: None }),
            Some(Token::Name(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    let test = match name.as_str() {
                        "text" => NodeTest::Text,
                        "node" => NodeTest::Node,
                        other => return Err(self.error(format!("unsupported node test '{other}()'"))),
                    };
                    self.pos += 1;
                    self.expect(&Token::RParen)?;
                    return Ok(test);
                }
                match name.split_once(':') {
                    Some((prefix, "*")) => Ok(NodeTest::Any {
                        prefix: Some(prefix.to_string()),
                    }),
                    Some((prefix, local)) => Ok(NodeTest::Name {
                        prefix: Some(prefix.to_string()),
                        local: local.to_string(),
                    }),
                    None => Ok(NodeTest::Name {
                        prefix: None,
                        local: name,
                    }),
                }
            }
            _ => {
                self.pos = self.pos.saturating_sub(1);
                Err(self.error("expected node test"))
            }
        }
    }

    fn parse_predicates(&mut self) -> Result<Vec<Expr>> {
        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.parse_or()?);
            self.expect(&Token::RBracket)?;
        }
        Ok(predicates)
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Literal(s)) => Ok(Expr::Literal(s)),
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Name(name)) => {
                self.expect(&Token::LParen)?;
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.parse_or()?);
                        if self.eat(&Token::RParen) {
                            break;
                        }
                        self.expect(&Token::Comma)?;
                    }
                }
                Ok(Expr::Function(name, args))
            }
            _ => Err(self.error("expected primary expression")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence() {
        let ast = parse("1 + 2 * 3 = 7 and true()").unwrap();
        let Expr::Binary(BinaryOp::And, lhs, _) = ast else {
            panic!("expected and");
        };
        let Expr::Binary(BinaryOp::Eq, sum, _) = *lhs else {
            panic!("expected =");
        };
        assert!(matches!(*sum, Expr::Binary(BinaryOp::Add, _, _)));
    }

    #[test]
    fn test_double_slash_expands() {
        let ast = parse("//Item/Code").unwrap();
        let Expr::Path { absolute, steps } = ast else {
            panic!("expected path");
        };
        assert!(absolute);
        assert_eq!(steps.len(), 3);
        assert_eq!(steps[0].axis, Axis::DescendantOrSelf);
        assert_eq!(
            steps[2].test,
            NodeTest::Name {
                prefix: None,
                local: "Code".into()
            }
        );
    }

    #[test]
    fn test_star_as_wildcard_and_multiply() {
        let ast = parse("count(*) * 2").unwrap();
        assert!(matches!(ast, Expr::Binary(BinaryOp::Mul, _, _)));
    }

    #[test]
    fn test_names_that_look_like_operators() {
        let ast = parse("div/mod").unwrap();
        let Expr::Path { steps, .. } = ast else {
            panic!("expected path");
        };
        assert_eq!(steps.len(), 2);
    }

    #[test]
    fn test_filter_expression() {
        let ast = parse("(//Item)[1]/Code").unwrap();
        assert!(matches!(ast, Expr::Filter { .. }));
    }

    #[test]
    fn test_anchor_anywhere() {
        let ast = parse("Item | /Root").unwrap().anchor_anywhere();
        let Expr::Union(a, b) = ast else {
            panic!("expected union");
        };
        assert!(matches!(*a, Expr::Path { absolute: true, ref steps } if steps.len() == 2));
        assert!(matches!(*b, Expr::Path { absolute: true, ref steps } if steps.len() == 1));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(parse("").is_err());
        assert!(parse("count(").is_err());
        assert!(parse("a[1").is_err());
        assert!(parse("bogus::a").is_err());
        assert!(parse("a b").is_err());
        assert!(parse("comment()").is_err());
    }
}

//! Recursive-descent parser for the BUILD-file subset.

use super::ast::{Arg, BinOp, CallExpr, Expr, Stmt};
use super::lexer::{self, Spanned, Token};
use super::BuildError;

/// Parse a whole build file into statements.
pub fn parse(source: &str) -> Result<Vec<Stmt>, BuildError> {
    let tokens = lexer::lex(source)?;
    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
    };
    let mut stmts = Vec::new();
    while !parser.at_end() {
        stmts.push(parser.parse_stmt()?);
    }
    Ok(stmts)
}

struct Parser<'s> {
    source: &'s str,
    tokens: Vec<Spanned>,
    pos: usize,
}

impl<'s> Parser<'s> {
    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        self.pos += 1;
        token
    }

    fn line(&self) -> usize {
        match self.tokens.get(self.pos.min(self.tokens.len().saturating_sub(1))) {
            Some((_, span)) => lexer::line_of(self.source, span.start),
            None => lexer::line_of(self.source, self.source.len()),
        }
    }

    fn error(&self, detail: impl Into<String>) -> BuildError {
        BuildError::Parse {
            line: self.line(),
            detail: detail.into(),
        }
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), BuildError> {
        match self.peek() {
            Some(t) if t == expected => {
                self.pos += 1;
                Ok(())
            }
            Some(t) => Err(self.error(format!("expected {what}, found {t:?}"))),
            None => Err(self.error(format!("expected {what}, found end of file"))),
        }
    }

    fn parse_stmt(&mut self) -> Result<Stmt, BuildError> {
        if let (Some(Token::Ident(_)), Some(Token::Eq)) = (self.peek(), self.peek_at(1)) {
            let Some(Token::Ident(name)) = self.next() else {
                unreachable!()
            };
            self.pos += 1; // '='
            let value = self.parse_expr()?;
            return Ok(Stmt::Assign { name, value });
        }
        match self.parse_expr()? {
            Expr::Call(call) => Ok(Stmt::Call(*call)),
            other => Ok(Stmt::Expr(other)),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, BuildError> {
        let mut lhs = self.parse_primary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.pos += 1;
            let rhs = self.parse_primary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_primary(&mut self) -> Result<Expr, BuildError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::Int(n)) => Ok(Expr::Int(n)),
            Some(Token::True) => Ok(Expr::Bool(true)),
            Some(Token::False) => Ok(Expr::Bool(false)),
            Some(Token::None) => Ok(Expr::None),
            Some(Token::Minus) => match self.next() {
                Some(Token::Int(n)) => Ok(Expr::Int(-n)),
                _ => Err(self.error("expected integer after unary '-'")),
            },
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let call = self.parse_call(name)?;
                    Ok(Expr::Call(Box::new(call)))
                } else {
                    Ok(Expr::Ident(name))
                }
            }
            Some(Token::LBracket) => self.parse_list(),
            Some(Token::LBrace) => self.parse_dict(),
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(other) => Err(self.error(format!("unexpected token {other:?}"))),
            None => Err(self.error("unexpected end of file")),
        }
    }

    fn parse_call(&mut self, name: String) -> Result<CallExpr, BuildError> {
        let mut args = Vec::new();
        loop {
            if self.peek() == Some(&Token::RParen) {
                self.pos += 1;
                break;
            }
            if let (Some(Token::Ident(_)), Some(Token::Eq)) = (self.peek(), self.peek_at(1)) {
                let Some(Token::Ident(arg_name)) = self.next() else {
                    unreachable!()
                };
                self.pos += 1; // '='
                let value = self.parse_expr()?;
                args.push(Arg {
                    name: Some(arg_name),
                    value,
                });
            } else {
                let value = self.parse_expr()?;
                args.push(Arg { name: None, value });
            }
            match self.peek() {
                Some(Token::Comma) => {
                    self.pos += 1;
                }
                Some(Token::RParen) => {}
                _ => return Err(self.error("expected ',' or ')' in argument list")),
            }
        }
        Ok(CallExpr { name, args })
    }

    fn parse_list(&mut self) -> Result<Expr, BuildError> {
        let mut items = Vec::new();
        loop {
            if self.peek() == Some(&Token::RBracket) {
                self.pos += 1;
                break;
            }
            items.push(self.parse_expr()?);
            match self.peek() {
                Some(Token::Comma) => {
                    self.pos += 1;
                }
                Some(Token::RBracket) => {}
                _ => return Err(self.error("expected ',' or ']' in list")),
            }
        }
        Ok(Expr::List(items))
    }

    fn parse_dict(&mut self) -> Result<Expr, BuildError> {
        let mut entries = Vec::new();
        loop {
            if self.peek() == Some(&Token::RBrace) {
                self.pos += 1;
                break;
            }
            let key = self.parse_expr()?;
            self.expect(&Token::Colon, "':'")?;
            let value = self.parse_expr()?;
            entries.push((key, value));
            match self.peek() {
                Some(Token::Comma) => {
                    self.pos += 1;
                }
                Some(Token::RBrace) => {}
                _ => return Err(self.error("expected ',' or '}' in dict")),
            }
        }
        Ok(Expr::Dict(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_rule_call() {
        let stmts = parse(
            "go_library(\n    name = \"foo\",\n    srcs = [\"foo.go\"],\n    deps = [\"//a:b\"],\n)\n",
        )
        .unwrap();
        assert_eq!(stmts.len(), 1);
        let Stmt::Call(call) = &stmts[0] else {
            panic!("expected call")
        };
        assert_eq!(call.name, "go_library");
        assert_eq!(call.rule_name(), "foo");
        assert_eq!(call.str_list_attr("srcs"), Some(vec!["foo.go".to_string()]));
    }

    #[test]
    fn test_parse_positional_and_keyword_args() {
        let stmts = parse("subinclude(\"///go//build_defs:go\")\npackage(default_visibility = [\"PUBLIC\"])\n").unwrap();
        assert_eq!(stmts.len(), 2);
        let Stmt::Call(sub) = &stmts[0] else {
            panic!()
        };
        assert_eq!(
            sub.positional(0).and_then(Expr::as_str),
            Some("///go//build_defs:go")
        );
        let Stmt::Call(pkg) = &stmts[1] else {
            panic!()
        };
        assert_eq!(
            pkg.str_list_attr("default_visibility"),
            Some(vec!["PUBLIC".to_string()])
        );
    }

    #[test]
    fn test_parse_glob_algebra() {
        let stmts = parse("go_library(name = \"x\", srcs = glob([\"*.go\"]) - glob([\"*_test.go\"]))\n").unwrap();
        let Stmt::Call(call) = &stmts[0] else {
            panic!()
        };
        let Some(Expr::Binary { op, lhs, .. }) = call.attr("srcs") else {
            panic!("expected binary srcs")
        };
        assert_eq!(*op, BinOp::Sub);
        assert!(matches!(**lhs, Expr::Call(_)));
    }

    #[test]
    fn test_parse_assignment_and_reference() {
        let stmts = parse("SRCS = [\"a.go\", \"b.go\"]\ngo_library(name = \"x\", srcs = SRCS)\n").unwrap();
        assert!(matches!(&stmts[0], Stmt::Assign { name, .. } if name == "SRCS"));
        let Stmt::Call(call) = &stmts[1] else {
            panic!()
        };
        assert_eq!(call.attr("srcs"), Some(&Expr::Ident("SRCS".into())));
    }

    #[test]
    fn test_parse_trailing_commas() {
        let stmts = parse("go_library(\n    name = \"x\",\n    srcs = [\n        \"a.go\",\n    ],\n)\n").unwrap();
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn test_parse_dict_and_misc_exprs() {
        let stmts = parse("go_test(name = \"t\", flags = {\"k\": \"v\"}, size = 2, sharded = True)\n").unwrap();
        let Stmt::Call(call) = &stmts[0] else {
            panic!()
        };
        assert!(matches!(call.attr("flags"), Some(Expr::Dict(_))));
        assert_eq!(call.attr("size"), Some(&Expr::Int(2)));
        assert!(call.bool_attr("sharded"));
    }

    #[test]
    fn test_parse_docstring_statement() {
        let stmts = parse("\"module docstring\"\ngo_library(name = \"x\")\n").unwrap();
        assert!(matches!(&stmts[0], Stmt::Expr(Expr::Str(_))));
    }

    #[test]
    fn test_parse_error_position() {
        let err = parse("go_library(\nname = = \"x\",\n)\n").unwrap_err();
        assert!(err.to_string().contains("line 2"), "{err}");
    }
}

//! Recursive-descent filter parser
//!
//! Precedence, loosest first: `OR`/`||`/`NOR`, `AND`/`&&`, `NOT`, then a
//! parenthesized expression or a single comparison. Operators are matched
//! case-insensitively and chains are left-associative.

use super::ast::{ComparisonOp, FilterNode, LogicalOp, Operand};
use super::lexer::{tokenize, Token, TokenKind};
use super::value::{lookup_param, Params, PARAM_SIGILS};
use crate::engine::error::{ConnectorError, Result};

pub const LIST_NOT_PARENTHESIZED: &str = "Filter value lists must be wrapped in parentheses.";

pub struct FilterParser<'a> {
    params: &'a Params,
}

impl<'a> FilterParser<'a> {
    pub fn new(params: &'a Params) -> Self {
        Self { params }
    }

    /// Parse filter text. Empty text means "no filter".
    pub fn parse(&self, text: &str) -> Result<Option<FilterNode>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        let mut cursor = Cursor {
            src: text,
            tokens: tokenize(text)?,
            pos: 0,
            params: self.params,
        };
        let node = cursor.parse_or()?;
        if let Some(tok) = cursor.peek() {
            return Err(cursor.error_at(tok, "unexpected trailing input"));
        }
        Ok(Some(node))
    }
}

struct Cursor<'s> {
    src: &'s str,
    tokens: Vec<Token>,
    pos: usize,
    params: &'s Params,
}

impl<'s> Cursor<'s> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        self.peek().map_or(false, |t| t.is_keyword(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_symbol(&mut self, symbol: &str) -> bool {
        if matches!(self.peek(), Some(Token { kind: TokenKind::Symbol(s), .. }) if *s == symbol) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn error_at(&self, tok: &Token, message: &str) -> ConnectorError {
        ConnectorError::BadFilter(format!(
            "{} '{}' at position {}",
            message,
            &self.src[tok.start..tok.end],
            tok.start
        ))
    }

    fn error_at_end(&self, message: &str) -> ConnectorError {
        ConnectorError::BadFilter(format!("{} at end of filter", message))
    }

    fn parse_or(&mut self) -> Result<FilterNode> {
        let mut node = self.parse_and()?;
        loop {
            if self.eat_keyword("or") || self.eat_symbol("||") {
                let rhs = self.parse_and()?;
                node = FilterNode::join(LogicalOp::Or, node, rhs);
            } else if self.eat_keyword("nor") {
                let rhs = self.parse_and()?;
                node = FilterNode::not(FilterNode::join(LogicalOp::Or, node, rhs));
            } else {
                return Ok(node);
            }
        }
    }

    fn parse_and(&mut self) -> Result<FilterNode> {
        let mut node = self.parse_not()?;
        while self.eat_keyword("and") || self.eat_symbol("&&") {
            let rhs = self.parse_not()?;
            node = FilterNode::join(LogicalOp::And, node, rhs);
        }
        Ok(node)
    }

    fn parse_not(&mut self) -> Result<FilterNode> {
        // `not = 1` compares a field called "not"
        let logical_not = self.peek_keyword("not")
            && !matches!(
                self.peek_at(1),
                None | Some(Token { kind: TokenKind::Symbol(_), .. })
            );
        if logical_not {
            self.pos += 1;
            let child = self.parse_not()?;
            return Ok(FilterNode::not(child));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<FilterNode> {
        match self.peek() {
            Some(Token { kind: TokenKind::LParen, .. }) => {
                self.pos += 1;
                let node = self.parse_or()?;
                match self.advance() {
                    Some(Token { kind: TokenKind::RParen, .. }) => Ok(node),
                    Some(tok) => Err(self.error_at(&tok, "expected ')' but found")),
                    None => Err(self.error_at_end("missing ')'")),
                }
            }
            Some(Token { kind: TokenKind::Word(_), .. }) => self.parse_comparison(),
            Some(tok) => Err(self.error_at(tok, "expected a comparison but found")),
            None => Err(self.error_at_end("expected a comparison")),
        }
    }

    fn parse_comparison(&mut self) -> Result<FilterNode> {
        let field = match self.advance() {
            Some(Token { kind: TokenKind::Word(w), .. }) => w,
            Some(tok) => return Err(self.error_at(&tok, "expected a field name but found")),
            None => return Err(self.error_at_end("expected a field name")),
        };

        let negated = self.eat_keyword("not");
        let op = self.parse_operator(&field)?;
        let value = if op.requires_no_value() {
            Operand::None
        } else if op.requires_value_list() {
            self.parse_list()?
        } else {
            self.parse_value()?
        };

        let mut node = FilterNode::comparison(&field, op, value);
        if let FilterNode::Comparison(cmp) = &mut node {
            cmp.negated = negated;
        }
        Ok(node)
    }

    fn parse_operator(&mut self, field: &str) -> Result<ComparisonOp> {
        let tok = self.advance().ok_or_else(|| {
            ConnectorError::BadFilter(format!(
                "no comparison operator found after field '{}'",
                field
            ))
        })?;

        let op = match &tok.kind {
            TokenKind::Symbol("=") | TokenKind::Symbol("==") => ComparisonOp::Eq,
            TokenKind::Symbol("!=") | TokenKind::Symbol("<>") => ComparisonOp::Ne,
            TokenKind::Symbol(">") => ComparisonOp::Gt,
            TokenKind::Symbol(">=") => ComparisonOp::Ge,
            TokenKind::Symbol("<") => ComparisonOp::Lt,
            TokenKind::Symbol("<=") => ComparisonOp::Le,
            TokenKind::Word(w) => match w.to_lowercase().as_str() {
                "eq" => ComparisonOp::Eq,
                "ne" | "neq" => ComparisonOp::Ne,
                "gt" => ComparisonOp::Gt,
                "ge" | "gte" => ComparisonOp::Ge,
                "lt" => ComparisonOp::Lt,
                "le" | "lte" => ComparisonOp::Le,
                "in" => ComparisonOp::In,
                "like" => ComparisonOp::Like,
                "is" => {
                    let not = self.eat_keyword("not");
                    if !self.eat_keyword("null") {
                        return Err(self.error_at(&tok, "expected NULL after"));
                    }
                    if not {
                        ComparisonOp::IsNotNull
                    } else {
                        ComparisonOp::IsNull
                    }
                }
                _ => return Err(self.error_at(&tok, "unknown comparison operator")),
            },
            _ => return Err(self.error_at(&tok, "unknown comparison operator")),
        };
        Ok(op)
    }

    fn parse_list(&mut self) -> Result<Operand> {
        if !matches!(self.peek(), Some(Token { kind: TokenKind::LParen, .. })) {
            return Err(ConnectorError::BadFilter(LIST_NOT_PARENTHESIZED.to_string()));
        }
        self.pos += 1;

        let mut items = Vec::new();
        loop {
            items.push(self.parse_value()?);
            match self.advance() {
                Some(Token { kind: TokenKind::Comma, .. }) => continue,
                Some(Token { kind: TokenKind::RParen, .. }) => break,
                Some(tok) => return Err(self.error_at(&tok, "expected ',' or ')' in value list but found")),
                None => return Err(self.error_at_end("unterminated value list")),
            }
        }
        Ok(Operand::List(items))
    }

    fn parse_value(&mut self) -> Result<Operand> {
        let tok = self
            .advance()
            .ok_or_else(|| self.error_at_end("missing comparison value"))?;

        match &tok.kind {
            TokenKind::Str(raw) => Ok(Operand::Value(raw.clone())),
            TokenKind::Word(word) => {
                if matches!(self.peek(), Some(Token { kind: TokenKind::LParen, .. })) {
                    let end = self.skip_call_arguments()?;
                    return Ok(Operand::Function(self.src[tok.start..end].to_string()));
                }
                if word.starts_with(&PARAM_SIGILS[..]) {
                    return Ok(Operand::Param(word[1..].to_string()));
                }
                if lookup_param(self.params, word).is_some() {
                    return Ok(Operand::Param(word.clone()));
                }
                Ok(Operand::Value(word.clone()))
            }
            TokenKind::LParen => Err(self.error_at(&tok, "value lists are only valid with IN, found")),
            _ => Err(self.error_at(&tok, "expected a value but found")),
        }
    }

    /// Consume a balanced `( ... )` argument list, returning the byte offset past it
    fn skip_call_arguments(&mut self) -> Result<usize> {
        let mut depth = 0usize;
        while let Some(tok) = self.advance() {
            match tok.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(tok.end);
                    }
                }
                _ => {}
            }
        }
        Err(self.error_at_end("unbalanced function call"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(text: &str) -> FilterNode {
        FilterParser::new(&Params::new()).parse(text).unwrap().unwrap()
    }

    fn cmp(field: &str, op: ComparisonOp, raw: &str) -> FilterNode {
        FilterNode::comparison(field, op, Operand::Value(raw.to_string()))
    }

    #[test]
    fn test_empty_filter_is_no_filter() {
        let params = Params::new();
        assert_eq!(FilterParser::new(&params).parse("   ").unwrap(), None);
    }

    #[test]
    fn test_parse_parenthesized_and() {
        let node = parse("(age > 21) AND (status = 'active')");
        assert_eq!(
            node,
            FilterNode::Logical {
                op: LogicalOp::And,
                children: vec![
                    cmp("age", ComparisonOp::Gt, "21"),
                    cmp("status", ComparisonOp::Eq, "'active'"),
                ],
            }
        );
    }

    #[test]
    fn test_redundant_parentheses_are_stripped() {
        assert_eq!(parse("((region eq 'west'))"), cmp("region", ComparisonOp::Eq, "'west'"));
    }

    #[test]
    fn test_precedence_not_and_or() {
        let node = parse("a = 1 or b = 2 and not c = 3");
        let expected = FilterNode::Logical {
            op: LogicalOp::Or,
            children: vec![
                cmp("a", ComparisonOp::Eq, "1"),
                FilterNode::Logical {
                    op: LogicalOp::And,
                    children: vec![
                        cmp("b", ComparisonOp::Eq, "2"),
                        FilterNode::not(cmp("c", ComparisonOp::Eq, "3")),
                    ],
                },
            ],
        };
        assert_eq!(node, expected);
    }

    #[test]
    fn test_symbolic_logical_operators_and_nor() {
        let node = parse("(a = 1)&&(b = 2)");
        assert_eq!(node.comparison_count(), 2);

        let node = parse("(a = 1) NOR (b = 2)");
        match node {
            FilterNode::Logical { op: LogicalOp::Not, children } => {
                assert!(matches!(children[0], FilterNode::Logical { op: LogicalOp::Or, .. }))
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_negated_comparison() {
        match parse("status NOT = 'closed'") {
            FilterNode::Comparison(c) => {
                assert!(c.negated);
                assert_eq!(c.field, "status");
                assert_eq!(c.op, ComparisonOp::Eq);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_in_requires_parenthesized_list() {
        match parse("id IN ('a', 'b', 3)") {
            FilterNode::Comparison(c) => assert_eq!(
                c.value,
                Operand::List(vec![
                    Operand::Value("'a'".into()),
                    Operand::Value("'b'".into()),
                    Operand::Value("3".into()),
                ])
            ),
            other => panic!("unexpected {:?}", other),
        }

        let params = Params::new();
        let err = FilterParser::new(&params).parse("id IN 'a'").unwrap_err();
        assert_eq!(err.to_string(), format!("Invalid or unparsable filter: {}", LIST_NOT_PARENTHESIZED));
    }

    #[test]
    fn test_null_checks_take_no_value() {
        match parse("deleted_at is not null") {
            FilterNode::Comparison(c) => {
                assert_eq!(c.op, ComparisonOp::IsNotNull);
                assert_eq!(c.value, Operand::None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_function_and_param_values() {
        let mut params = Params::new();
        params.insert("min_age".into(), json!(18));
        let parser = FilterParser::new(&params);

        match parser.parse("created < datetime('2024-01-01', 'utc')").unwrap().unwrap() {
            FilterNode::Comparison(c) => {
                assert_eq!(c.value, Operand::Function("datetime('2024-01-01', 'utc')".into()))
            }
            other => panic!("unexpected {:?}", other),
        }

        match parser.parse("age >= min_age").unwrap().unwrap() {
            FilterNode::Comparison(c) => assert_eq!(c.value, Operand::Param("min_age".into())),
            other => panic!("unexpected {:?}", other),
        }

        match parser.parse("t.age > @age1").unwrap().unwrap() {
            FilterNode::Comparison(c) => {
                assert_eq!(c.field, "t.age");
                assert_eq!(c.value, Operand::Param("age1".into()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_malformed_filters() {
        let params = Params::new();
        let parser = FilterParser::new(&params);
        for bad in ["age", "age ~ 3", "(age = 1", "age = 1)", "age = 1 AND", "age between 1"] {
            assert!(
                matches!(parser.parse(bad), Err(ConnectorError::BadFilter(_))),
                "expected BadFilter for {:?}",
                bad
            );
        }
    }
}

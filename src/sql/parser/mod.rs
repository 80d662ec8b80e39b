use std::fmt::Display;
use std::str::FromStr;

use crate::error::Error;
use crate::error::Result;
use crate::parse_err;
use crate::sql::parser::ast::BinaryOperator;
use crate::sql::parser::ast::Column;
use crate::sql::parser::ast::CreateTable;
use crate::sql::parser::ast::Cte;
use crate::sql::parser::ast::DataType;
use crate::sql::parser::ast::Expr;
use crate::sql::parser::ast::Function;
use crate::sql::parser::ast::Ident;
use crate::sql::parser::ast::Insert;
use crate::sql::parser::ast::InsertSource;
use crate::sql::parser::ast::LimitClause;
use crate::sql::parser::ast::OrderByExpr;
use crate::sql::parser::ast::Precedence;
use crate::sql::parser::ast::Query;
use crate::sql::parser::ast::Select;
use crate::sql::parser::ast::SelectItem;
use crate::sql::parser::ast::SetExpr;
use crate::sql::parser::ast::SetOperator;
use crate::sql::parser::ast::Statement;
use crate::sql::parser::ast::TableFactor;
use crate::sql::parser::ast::UnaryOperator;
use crate::sql::parser::ast::Value;
use crate::sql::parser::ast::Values;
use crate::sql::parser::ast::With;
use crate::sql::parser::lexer::Keyword;
use crate::sql::parser::lexer::Lexer;
use crate::sql::parser::lexer::Token;

pub mod ast;
mod display_utils;
mod lexer;

pub struct Parser {
    /// The tokens
    tokens: Vec<Token>,
    /// The index of the first unprocessed token in [`Parser::tokens`].
    index: usize,
}

impl Parser {
    /// Creates a new parser for the given string input
    pub fn new(query: &str) -> Result<Parser> {
        let tokens = Lexer::new(query).collect::<Result<Vec<_>>>()?;
        Ok(Parser { tokens, index: 0 })
    }

    /// Parse potentially multiple statements
    /// e.g., "SELECT * FROM foo; SELECT * FROM bar;"
    pub fn parse_statements(&mut self) -> Result<Vec<Statement>> {
        let mut stmts = Vec::new();
        let mut expecting_statement_delimiter = false;
        loop {
            // ignore empty statements (between successive statement delimiters)
            while self.consume_token(&Token::Semicolon) {
                expecting_statement_delimiter = false;
            }

            if self.peek_token() == Token::EOF {
                break;
            }

            if expecting_statement_delimiter {
                return self.expected("end of statement", self.peek_token());
            }

            let statement = self.parse_statement()?;
            stmts.push(statement);
            expecting_statement_delimiter = true;
        }
        Ok(stmts)
    }

    /// Parses the input string into an AST statement
    pub fn parse_statement(&mut self) -> Result<Statement> {
        let next_token = self.next_token();
        match &next_token {
            Token::Keyword(w) => match w {
                Keyword::Create => self.parse_ddl_create(),
                Keyword::Insert => self.parse_dml_insert(),
                Keyword::Select | Keyword::Values | Keyword::With => {
                    self.backup_token();
                    let query = self.parse_query()?;
                    Ok(Statement::Select { query })
                }
                _ => self.expected("an SQL statement", next_token),
            },
            _ => self.expected("an SQL statement", next_token),
        }
    }

    fn parse_ddl_create(&mut self) -> Result<Statement> {
        if self.parse_keyword(Keyword::Table) {
            return self.parse_ddl_create_table();
        }
        self.expected("an object type after CREATE", self.peek_token())
    }

    fn parse_ddl_create_table(&mut self) -> Result<Statement> {
        let if_not_exists = self.parse_keywords(&[Keyword::If, Keyword::Not, Keyword::Exists]);
        let table_name = self.parse_ident()?;
        let columns = self.parse_columns()?;
        let create_table = CreateTable { name: table_name, columns, if_not_exists };
        Ok(Statement::CreateTable(create_table))
    }

    fn parse_columns(&mut self) -> Result<Vec<Column>> {
        let mut columns = vec![];
        if !self.consume_token(&Token::LParen) || self.consume_token(&Token::RParen) {
            return Ok(columns);
        }
        loop {
            columns.push(self.parse_ddl_column_spec()?);
            let comma = self.consume_token(&Token::Comma);
            let rparen = self.peek_token() == Token::RParen;
            if !comma && !rparen {
                return self.expected("',' or ')' after column definition", self.peek_token());
            };
            if rparen {
                let _ = self.consume_token(&Token::RParen);
                break;
            }
        }
        Ok(columns)
    }

    fn parse_ddl_column_spec(&mut self) -> Result<Column> {
        let column_name = self.parse_ident()?;
        let next_token = self.next_token();
        let datatype = match &next_token {
            Token::Keyword(w) => match w {
                Keyword::Integer | Keyword::BigInt => Ok(DataType::Integer),
                Keyword::Double | Keyword::Float => Ok(DataType::Float),
                Keyword::Boolean => Ok(DataType::Boolean),
                Keyword::Text => Ok(DataType::String),
                Keyword::Varchar => {
                    // parse optional character length
                    if self.consume_token(&Token::LParen) {
                        let _ = self.parse_literal_uint()?;
                        self.expect_token(&Token::RParen)?;
                    }
                    Ok(DataType::String)
                }
                _ => self.expected("a data type name", next_token),
            },
            _ => self.expected("a data type name", next_token),
        }?;
        let mut column = Column { name: column_name, datatype, ..Default::default() };
        loop {
            let ok = self.parse_optional_column_option(&mut column)?;
            if !ok {
                break;
            }
        }
        Ok(column)
    }

    fn parse_optional_column_option(&mut self, column: &mut Column) -> Result<bool> {
        if self.parse_keywords(&[Keyword::Primary, Keyword::Key]) {
            column.primary_key = true;
            column.nullable = false;
            column.unique = true;
            return Ok(true);
        }
        if self.parse_keywords(&[Keyword::Not, Keyword::Null]) {
            column.nullable = false;
            return Ok(true);
        }
        if self.parse_keyword(Keyword::Null) {
            column.nullable = true;
            return Ok(true);
        }
        if self.parse_keyword(Keyword::Unique) {
            column.unique = true;
            return Ok(true);
        }
        if self.parse_keyword(Keyword::Default) {
            let expr = self.parse_expr()?;
            column.default = Some(expr);
            return Ok(true);
        }
        Ok(false)
    }

    fn parse_dml_insert(&mut self) -> Result<Statement> {
        self.expect_keyword(&Keyword::Into)?;
        let table = self.parse_ident()?;
        let mut columns = vec![];
        if self.consume_token(&Token::LParen) {
            columns = self.parse_comma_separated(Parser::parse_ident)?;
            self.expect_token(&Token::RParen)?;
        }
        let next_token = self.next_token();
        let source = match next_token {
            Token::Keyword(Keyword::Values) => {
                let values = self.parse_values()?;
                Ok(InsertSource::Values(values))
            }
            Token::Keyword(Keyword::Select) | Token::Keyword(Keyword::With) => {
                self.backup_token();
                let query = self.parse_query()?;
                Ok(InsertSource::Select(query))
            }
            _ => self.expected("'VALUES' or 'SELECT' as insert source", next_token),
        }?;
        Ok(Statement::Insert(Insert { table, columns, source }))
    }

    fn parse_values(&mut self) -> Result<Values> {
        let rows = self.parse_comma_separated(|parser| {
            parser.expect_token(&Token::LParen)?;
            let exprs = parser.parse_comma_separated(Parser::parse_expr)?;
            parser.expect_token(&Token::RParen)?;
            Ok(exprs)
        })?;
        Ok(Values { rows })
    }

    /// Parse a query expression: `[WITH [RECURSIVE] ...] body
    /// [ORDER BY ...] [LIMIT ... OFFSET ...]`
    fn parse_query(&mut self) -> Result<Box<Query>> {
        let with = if self.parse_keyword(Keyword::With) {
            let recursive = self.parse_keyword(Keyword::Recursive);
            let ctes = self.parse_comma_separated(Parser::parse_cte)?;
            Some(With { recursive, ctes })
        } else {
            None
        };
        let body = self.parse_set_expr()?;
        let order_by = self.parse_optional_order_by()?.unwrap_or_default();
        let limit_clause = self.parse_optional_limit_clause()?;
        Ok(Box::new(Query { with, body, order_by, limit_clause }))
    }

    fn parse_cte(&mut self) -> Result<Cte> {
        let alias = self.parse_ident()?;
        self.expect_keyword(&Keyword::As)?;
        self.expect_token(&Token::LParen)?;
        let query = self.parse_query()?;
        self.expect_token(&Token::RParen)?;
        Ok(Cte { alias, query })
    }

    /// Parse a tree of UNION [ALL] set operations over SELECT/VALUES terms.
    fn parse_set_expr(&mut self) -> Result<SetExpr> {
        let mut expr = self.parse_set_expr_term()?;
        while self.parse_keyword(Keyword::Union) {
            let all = self.parse_keyword(Keyword::All);
            let right = self.parse_set_expr_term()?;
            expr = SetExpr::SetOperation {
                left: Box::new(expr),
                op: SetOperator::Union,
                all,
                right: Box::new(right),
            };
        }
        Ok(expr)
    }

    fn parse_set_expr_term(&mut self) -> Result<SetExpr> {
        let next_token = self.next_token();
        match next_token {
            Token::Keyword(Keyword::Select) => {
                self.backup_token();
                Ok(SetExpr::Select(Box::new(self.parse_select()?)))
            }
            Token::Keyword(Keyword::Values) => Ok(SetExpr::Values(self.parse_values()?)),
            Token::LParen => {
                let expr = self.parse_set_expr()?;
                self.expect_token(&Token::RParen)?;
                Ok(expr)
            }
            tok => self.expected("SELECT, VALUES or '('", tok),
        }
    }

    fn parse_select(&mut self) -> Result<Select> {
        self.expect_keyword(&Keyword::Select)?;
        let projection = self.parse_comma_separated(Parser::parse_select_item)?;
        let from =
            if self.parse_keyword(Keyword::From) { Some(self.parse_table_factor()?) } else { None };
        let selection =
            if self.parse_keyword(Keyword::Where) { Some(self.parse_expr()?) } else { None };
        Ok(Select { projection, from, selection })
    }

    /// Parse one item of the comma-separated list following `SELECT`
    fn parse_select_item(&mut self) -> Result<SelectItem> {
        if self.consume_token(&Token::Mul) {
            return Ok(SelectItem::Wildcard);
        }
        let expr = self.parse_expr()?;
        if self.parse_keyword(Keyword::As) {
            let alias = self.parse_ident()?;
            Ok(SelectItem::ExprWithAlias { expr, alias })
        } else {
            Ok(SelectItem::UnnamedExpr(expr))
        }
    }

    fn parse_table_factor(&mut self) -> Result<TableFactor> {
        let next_token = self.next_token();
        match &next_token {
            Token::Ident(_, _) => {
                let table_name = Ident::from_ident_token(&next_token);
                let alias = self.parse_optional_alias()?;
                Ok(TableFactor::Table { name: table_name, alias })
            }
            Token::LParen => {
                let subquery = self.parse_query()?;
                self.expect_token(&Token::RParen)?;
                let alias = self.parse_optional_alias()?;
                Ok(TableFactor::Derived { subquery, alias })
            }
            _ => self.expected("table identifier or '('", next_token),
        }
    }

    fn parse_optional_alias(&mut self) -> Result<Option<String>> {
        if self.parse_keyword(Keyword::As) {
            let alias = self.parse_ident()?;
            return Ok(Some(alias.value));
        }
        Ok(None)
    }

    fn parse_optional_order_by(&mut self) -> Result<Option<Vec<OrderByExpr>>> {
        if !self.parse_keywords(&[Keyword::Order, Keyword::By]) {
            return Ok(None);
        }
        let exprs = self.parse_comma_separated(Parser::parse_order_by_item)?;
        Ok(Some(exprs))
    }

    fn parse_order_by_item(&mut self) -> Result<OrderByExpr> {
        let expr = self.parse_expr()?;
        let desc = if self.parse_keyword(Keyword::Desc) {
            Some(true)
        } else if self.parse_keyword(Keyword::Asc) {
            Some(false)
        } else {
            None
        };
        Ok(OrderByExpr { expr, desc })
    }

    fn parse_optional_limit_clause(&mut self) -> Result<Option<LimitClause>> {
        let limit = if self.parse_keyword(Keyword::Limit) {
            Some(self.parse_literal_uint()?)
        } else {
            None
        };
        let offset = if self.parse_keyword(Keyword::Offset) {
            Some(self.parse_literal_uint()?)
        } else {
            None
        };
        if offset.is_none() && limit.is_none() {
            return Ok(None);
        }
        Ok(Some(LimitClause { limit, offset }))
    }

    /// Parses an expr using Pratt (top-down precedence) parser
    pub fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_subexpr(self.prec_unknown())
    }

    fn parse_subexpr(&mut self, precedence: u8) -> Result<Expr> {
        let mut expr = self.parse_prefix()?;
        loop {
            let next_precedence = self.get_next_precedence()?;
            if next_precedence <= precedence {
                break;
            }
            expr = self.parse_infix(expr, next_precedence)?;
        }
        Ok(expr)
    }

    /// Parse expr prefix(position-wise)
    fn parse_prefix(&mut self) -> Result<Expr> {
        let next_token = self.next_token();
        let expr = match &next_token {
            Token::Keyword(w) if w == &Keyword::True => Ok(Expr::Value(Value::Boolean(true))),
            Token::Keyword(w) if w == &Keyword::False => Ok(Expr::Value(Value::Boolean(false))),
            Token::Keyword(w) if w == &Keyword::Null => Ok(Expr::Value(Value::Null)),
            Token::Keyword(w) if w == &Keyword::Not => {
                let expr = self.parse_subexpr(self.prec_value(Precedence::UnaryOp))?;
                Ok(Expr::UnaryOp { op: UnaryOperator::Not, expr: Box::new(expr) })
            }
            tok @ Token::Ident(_, _) => match self.peek_token() {
                Token::LParen => self.parse_function(Ident::from_ident_token(tok)),
                _ => {
                    let ident = Ident::from_ident_token(tok);
                    if let Some(idents) = self.try_parse_compound_idents(ident.clone())? {
                        Ok(Expr::CompoundIdentifier(idents))
                    } else {
                        Ok(Expr::Identifier(ident))
                    }
                }
            },
            Token::Number(s) => Ok(Expr::Value(Value::Number(s.clone()))),
            Token::String(s) => Ok(Expr::Value(Value::String(s.clone()))),
            Token::Param(s) => {
                let index = Self::parse_str::<usize>(s.clone())?;
                if index == 0 {
                    return Err(Error::parse("Parameter index must start at $1"));
                }
                Ok(Expr::Parameter(index))
            }
            tok @ Token::Plus | tok @ Token::Minus => {
                let op =
                    if *tok == Token::Plus { UnaryOperator::Plus } else { UnaryOperator::Minus };
                let expr = self.parse_subexpr(self.prec_value(Precedence::UnaryOp))?;
                Ok(Expr::UnaryOp { op, expr: Box::new(expr) })
            }
            Token::LParen => {
                let expr = self.parse_expr()?;
                self.expect_token(&Token::RParen)?;
                Ok(Expr::Nested(Box::new(expr)))
            }
            _ => self.expected_ref("an expression", &next_token),
        }?;
        Ok(expr)
    }

    fn parse_infix(&mut self, expr: Expr, precedence: u8) -> Result<Expr> {
        let next_token = self.next_token();
        let regular_binary_op = match &next_token {
            Token::Plus => Some(BinaryOperator::Plus),
            Token::Minus => Some(BinaryOperator::Minus),
            Token::Mul => Some(BinaryOperator::Multiply),
            Token::Div => Some(BinaryOperator::Divide),
            Token::Mod => Some(BinaryOperator::Modulo),
            Token::Eq => Some(BinaryOperator::Eq),
            Token::Neq => Some(BinaryOperator::NotEq),
            Token::Gt => Some(BinaryOperator::Gt),
            Token::GtEq => Some(BinaryOperator::GtEq),
            Token::Lt => Some(BinaryOperator::Lt),
            Token::LtEq => Some(BinaryOperator::LtEq),
            Token::Keyword(w) => match w {
                Keyword::And => Some(BinaryOperator::And),
                Keyword::Or => Some(BinaryOperator::Or),
                _ => None,
            },
            _ => None,
        };
        if let Some(op) = regular_binary_op {
            let rhs = self.parse_subexpr(precedence)?;
            return Ok(Expr::BinaryOp { left: Box::new(expr), op, right: Box::new(rhs) });
        }

        match &next_token {
            Token::Keyword(w) if w == &Keyword::Is => self.parse_is(expr),
            Token::Keyword(w) if w == &Keyword::Not || w == &Keyword::Like => {
                self.backup_token();
                let negated = self.parse_keyword(Keyword::Not);
                if self.parse_keyword(Keyword::Like) {
                    let rhs = self.parse_subexpr(self.prec_value(Precedence::Like))?;
                    return Ok(Expr::Like {
                        negated,
                        expr: Box::new(expr),
                        pattern: Box::new(rhs),
                    });
                }
                self.expected("LIKE after NOT", self.peek_token())
            }
            _ => self.expected("an infix operator", next_token),
        }
    }

    fn parse_is(&mut self, expr: Expr) -> Result<Expr> {
        if self.parse_keyword(Keyword::Null) {
            return Ok(Expr::IsNull(Box::new(expr)));
        }
        if self.parse_keywords(&[Keyword::Not, Keyword::Null]) {
            return Ok(Expr::IsNotNull(Box::new(expr)));
        }
        self.expected("[NOT] NULL", self.peek_token())
    }

    fn parse_function(&mut self, func_name: Ident) -> Result<Expr> {
        self.expect_token(&Token::LParen)?;
        if self.consume_token(&Token::RParen) {
            return Ok(Expr::Function(Function { name: func_name, args: vec![] }));
        }
        let args = self.parse_comma_separated(Parser::parse_expr)?;
        self.expect_token(&Token::RParen)?;
        Ok(Expr::Function(Function { name: func_name, args }))
    }

    fn try_parse_compound_idents(&mut self, ident: Ident) -> Result<Option<Vec<Ident>>> {
        let mut idents = vec![];
        while self.consume_token(&Token::Dot) {
            let next_token = self.peek_token_ref();
            match next_token {
                tok @ Token::Ident(_, _) => {
                    idents.push(Ident::from_ident_token(tok));
                    self.advance_token();
                }
                _ => self.expected_ref("an identifier after '.'", next_token)?,
            }
        }
        if idents.is_empty() {
            return Ok(None);
        }
        idents.insert(0, ident);
        Ok(Some(idents))
    }

    /// Parse a comma-separated list of 1+ items accepted by `F`
    fn parse_comma_separated<T, F>(&mut self, mut f: F) -> Result<Vec<T>>
    where
        F: FnMut(&mut Parser) -> Result<T>,
    {
        let mut values = vec![];
        loop {
            values.push(f(self)?);
            if !self.consume_token(&Token::Comma) {
                break;
            }
        }
        Ok(values)
    }

    fn get_next_precedence(&self) -> Result<u8> {
        macro_rules! p {
            ($precedence:ident) => {
                self.prec_value(Precedence::$precedence)
            };
        }

        let token = self.peek_token();
        match token {
            Token::Keyword(w) if w == Keyword::Not => match self.peek_nth_token(1) {
                // The precedence of NOT varies depending on the keyword
                // that follows it. If it is followed by LIKE, it takes on
                // the precedence of that token. Otherwise, it is not an
                // infix operator, and therefore has zero precedence.
                Token::Keyword(w) if w == Keyword::Like => Ok(p!(Like)),
                _ => Ok(self.prec_unknown()),
            },
            Token::Keyword(w) if w == Keyword::Is => Ok(p!(Is)),
            Token::Keyword(w) if w == Keyword::And => Ok(p!(And)),
            Token::Keyword(w) if w == Keyword::Or => Ok(p!(Or)),
            Token::Keyword(w) if w == Keyword::Like => Ok(p!(Like)),
            Token::Mul | Token::Div | Token::Mod => Ok(p!(MulDivModOp)),
            Token::Plus | Token::Minus => Ok(p!(PlusMinus)),
            Token::Eq | Token::Neq | Token::Gt | Token::GtEq | Token::Lt | Token::LtEq => {
                Ok(p!(Eq))
            }
            _ => Ok(self.prec_unknown()),
        }
    }

    /// Decide the lexical Precedence of operators.
    ///
    /// Uses (APPROXIMATELY) <https://www.postgresql.org/docs/7.0/operators.htm#AEN2026> as a reference
    fn prec_value(&self, prec: Precedence) -> u8 {
        match prec {
            Precedence::UnaryOp => 50,
            Precedence::MulDivModOp => 40,
            Precedence::PlusMinus => 30,
            Precedence::Eq => 20,
            Precedence::Like => 19,
            Precedence::Is => 17,
            Precedence::And => 10,
            Precedence::Or => 5,
        }
    }

    fn prec_unknown(&self) -> u8 {
        0
    }

    /// Parse an unsigned literal integer/long
    fn parse_literal_uint(&mut self) -> Result<u64> {
        let next_token = self.next_token();
        match next_token {
            Token::Number(s) => Self::parse_str::<u64>(s),
            _ => self.expected("literal int", next_token),
        }
    }

    fn parse_str<T: FromStr>(s: String) -> Result<T>
    where
        <T as FromStr>::Err: Display,
    {
        s.parse::<T>().map_err(|e| {
            Error::parse(format!("Could not parse '{s}' as {}: {e}", std::any::type_name::<T>()))
        })
    }

    fn parse_ident(&mut self) -> Result<Ident> {
        let next_token = self.next_token();
        match &next_token {
            tok @ Token::Ident(_, _) => Ok(Ident::from_ident_token(tok)),
            _ => self.expected("ident", next_token),
        }
    }

    /// Consume the next token if it matches the expected token, otherwise return false
    fn consume_token(&mut self, expected: &Token) -> bool {
        if self.peek_token_ref() == expected {
            self.advance_token();
            true
        } else {
            false
        }
    }

    fn expect_token(&mut self, expected: &Token) -> Result<Token> {
        if self.peek_token_ref() == expected {
            Ok(self.next_token())
        } else {
            self.expected_ref(&expected.to_string(), self.peek_token_ref())
        }
    }

    fn expect_keyword(&mut self, keyword: &Keyword) -> Result<Keyword> {
        match &self.peek_token_ref() {
            Token::Keyword(w) if w == keyword => {
                self.advance_token();
                Ok(*keyword)
            }
            _ => self.expected_ref(keyword.to_string().as_str(), self.peek_token_ref()),
        }
    }

    /// If the current and subsequent tokens exactly match the `keywords`
    /// sequence, consume them and returns true. Otherwise, no tokens are
    /// consumed and returns false
    fn parse_keywords(&mut self, keywords: &[Keyword]) -> bool {
        let index = self.index;
        for &keyword in keywords {
            if !self.parse_keyword(keyword) {
                self.index = index;
                return false;
            }
        }
        true
    }

    /// If the current token is the `expected` keyword, consume it and returns
    /// true. Otherwise, no tokens are consumed and returns false.
    fn parse_keyword(&mut self, expected: Keyword) -> bool {
        if self.peek_keyword(expected) {
            self.advance_token();
            true
        } else {
            false
        }
    }

    fn peek_keyword(&self, expected: Keyword) -> bool {
        matches!(self.peek_token(), Token::Keyword(w) if expected == w)
    }

    /// Return the first token that has not yet been processed
    /// or Token::EOF
    fn peek_token(&self) -> Token {
        self.peek_nth_token(0)
    }

    /// Return a reference to the first token that has not yet
    /// been processed or Token::EOF
    fn peek_token_ref(&self) -> &Token {
        self.peek_nth_token_ref(0)
    }

    /// Return nth token that has not yet been processed
    fn peek_nth_token(&self, n: usize) -> Token {
        self.peek_nth_token_ref(n).clone()
    }

    /// Return nth token that has not yet been processed
    fn peek_nth_token_ref(&self, n: usize) -> &Token {
        self.tokens.get(self.index + n).unwrap_or(&Token::EOF)
    }

    /// Advances to the next token and returns a copy.
    fn next_token(&mut self) -> Token {
        self.advance_token();
        self.tokens.get(self.index - 1).unwrap_or(&Token::EOF).clone()
    }

    /// Seek back the last token.
    fn backup_token(&mut self) {
        assert!(self.index > 0);
        self.index -= 1;
    }

    /// Advances the current token to the next token
    fn advance_token(&mut self) {
        self.index += 1;
    }

    fn expected<T>(&self, expected: &str, found: Token) -> Result<T> {
        Err(parse_err!("Expected: {expected}, found: {found}"))
    }

    fn expected_ref<T>(&self, expected: &str, found: &Token) -> Result<T> {
        Err(parse_err!("Expected: {expected}, found: {found}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::parser::ast::StatementKind;

    fn parse(sql: &str) -> Result<Statement> {
        Parser::new(sql)?.parse_statement()
    }

    fn kind_of(sql: &str) -> Result<StatementKind> {
        Ok(parse(sql)?.kind())
    }

    #[test]
    fn test_statement_kinds() -> Result<()> {
        assert_eq!(kind_of("SELECT 1")?, StatementKind::Select);
        assert_eq!(kind_of("SELECT 1 UNION SELECT 2")?, StatementKind::Union);
        assert_eq!(kind_of("SELECT 1 UNION ALL SELECT 2")?, StatementKind::UnionAll);
        assert_eq!(kind_of("WITH a AS (SELECT 1) SELECT * FROM a")?, StatementKind::With);
        assert_eq!(
            kind_of("WITH RECURSIVE a AS (SELECT 1) SELECT * FROM a")?,
            StatementKind::WithRecursive
        );
        assert_eq!(kind_of("VALUES (1, 'a'), (2, 'b')")?, StatementKind::Values);
        assert_eq!(
            kind_of("CREATE TABLE t (id INTEGER PRIMARY KEY)")?,
            StatementKind::CreateTable
        );
        assert_eq!(kind_of("INSERT INTO t (id) VALUES (1)")?, StatementKind::Insert);
        Ok(())
    }

    #[test]
    fn test_parse_statements_multi() -> Result<()> {
        let stmts = Parser::new("SELECT 1; SELECT 2;")?.parse_statements()?;
        assert_eq!(stmts.len(), 2);
        let stmts = Parser::new("")?.parse_statements()?;
        assert_eq!(stmts.len(), 0);
        assert!(Parser::new("SELECT 1 SELECT 2")?.parse_statements().is_err());
        Ok(())
    }

    #[test]
    fn test_parse_select_with_parameters() -> Result<()> {
        let stmt = parse("select $1 + $2")?;
        assert_eq!(stmt.to_string(), "SELECT $1 + $2");
        assert!(parse("select $0").is_err());
        Ok(())
    }

    #[test]
    fn test_parse_expr_precedence() -> Result<()> {
        let stmt = parse("SELECT 1 + 2 * 3 = 7 AND true")?;
        assert_eq!(stmt.to_string(), "SELECT 1 + 2 * 3 = 7 AND true");
        Ok(())
    }

    #[test]
    fn test_parse_function_call_with_expr_args() -> Result<()> {
        let stmt = parse("SELECT fib($1 - 1) + fib($1 - 2)")?;
        assert_eq!(stmt.to_string(), "SELECT fib($1 - 1) + fib($1 - 2)");
        Ok(())
    }

    #[test]
    fn test_parse_query_clauses() -> Result<()> {
        let stmt = parse(
            "WITH RECURSIVE r AS (SELECT 1 AS n UNION ALL SELECT n + 1 FROM r WHERE n < 5) \
             SELECT n FROM r ORDER BY n DESC LIMIT 3 OFFSET 1",
        )?;
        assert_eq!(stmt.kind(), StatementKind::WithRecursive);
        let rendered = stmt.to_string();
        assert!(rendered.contains("UNION ALL"));
        assert!(rendered.contains("LIMIT 3 OFFSET 1"));
        Ok(())
    }

    #[test]
    fn test_parse_derived_table() -> Result<()> {
        let stmt = parse("SELECT * FROM (SELECT 1, 2) AS t")?;
        assert_eq!(stmt.to_string(), "SELECT * FROM (SELECT 1, 2) AS t");
        Ok(())
    }

    #[test]
    fn test_parse_create_table() -> Result<()> {
        let stmt = parse(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                name VARCHAR(100) NOT NULL,
                score DOUBLE DEFAULT 1.5
            )",
        )?;
        assert_eq!(stmt.kind(), StatementKind::CreateTable);
        Ok(())
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse("FROBNICATE everything").is_err());
        assert!(parse("SELECT FROM").is_err());
        assert!(parse("SELECT 1 UNION").is_err());
    }
}

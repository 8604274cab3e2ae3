//! Recursive-descent parser over the token stream, grounded on the
//! teacher's `compiler::parser` precedence-climbing expression parser.

use smol_str::SmolStr;

use super::ast::*;
use super::lexer::{Tok, Token};
use super::CompileError;

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    source_name: String,
}

impl Parser {
    pub fn new(tokens: Vec<Token>, source_name: String) -> Self {
        Parser { tokens, pos: 0, source_name }
    }

    fn cur(&self) -> &Tok {
        &self.tokens[self.pos].tok
    }

    fn line(&self) -> u32 {
        self.tokens[self.pos].line
    }

    fn advance(&mut self) -> Tok {
        let t = self.tokens[self.pos].tok.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn err(&self, message: impl Into<String>) -> CompileError {
        CompileError {
            message: message.into(),
            source_name: self.source_name.clone(),
            line: self.line(),
            col: self.tokens[self.pos].col,
        }
    }

    fn expect(&mut self, tok: Tok) -> Result<(), CompileError> {
        if std::mem::discriminant(self.cur()) == std::mem::discriminant(&tok) {
            self.advance();
            Ok(())
        } else {
            Err(self.err(format!("expected {:?}, found {:?}", tok, self.cur())))
        }
    }

    fn check(&self, tok: &Tok) -> bool {
        std::mem::discriminant(self.cur()) == std::mem::discriminant(tok)
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.check(tok) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn name(&mut self) -> Result<SmolStr, CompileError> {
        match self.advance() {
            Tok::Name(n) => Ok(n),
            other => Err(self.err(format!("expected identifier, found {:?}", other))),
        }
    }

    pub fn parse_chunk(&mut self) -> Result<Block, CompileError> {
        let block = self.parse_block()?;
        if !self.check(&Tok::Eof) {
            return Err(self.err(format!("unexpected token {:?} after chunk", self.cur())));
        }
        Ok(block)
    }

    fn block_follow(&self) -> bool {
        matches!(
            self.cur(),
            Tok::Eof | Tok::End | Tok::Else | Tok::Elseif | Tok::Until
        )
    }

    fn parse_block(&mut self) -> Result<Block, CompileError> {
        let mut stats = Vec::new();
        while !self.block_follow() {
            if self.check(&Tok::Return) {
                stats.push(self.parse_return()?);
                break;
            }
            if let Some(stat) = self.parse_stat()? {
                stats.push(stat);
            }
        }
        Ok(Block { stats })
    }

    fn parse_return(&mut self) -> Result<Stat, CompileError> {
        let line = self.line();
        self.advance();
        let mut exprs = Vec::new();
        if !self.block_follow() && !self.check(&Tok::Semi) {
            exprs = self.parse_exprlist()?;
        }
        self.eat(&Tok::Semi);
        Ok(Stat::Return { exprs, line })
    }

    fn parse_stat(&mut self) -> Result<Option<Stat>, CompileError> {
        let line = self.line();
        match self.cur().clone() {
            Tok::Semi => {
                self.advance();
                Ok(None)
            }
            Tok::DColon => {
                self.advance();
                let name = self.name()?;
                self.expect(Tok::DColon)?;
                Ok(Some(Stat::Label(name)))
            }
            Tok::Break => {
                self.advance();
                Ok(Some(Stat::Break))
            }
            Tok::Goto => {
                self.advance();
                let label = self.name()?;
                Ok(Some(Stat::Goto { label, line }))
            }
            Tok::Do => {
                self.advance();
                let block = self.parse_block()?;
                self.expect(Tok::End)?;
                Ok(Some(Stat::Do(block)))
            }
            Tok::While => {
                self.advance();
                let cond = self.parse_expr()?;
                self.expect(Tok::Do)?;
                let body = self.parse_block()?;
                self.expect(Tok::End)?;
                Ok(Some(Stat::While { cond, body }))
            }
            Tok::Repeat => {
                self.advance();
                let body = self.parse_block()?;
                self.expect(Tok::Until)?;
                let cond = self.parse_expr()?;
                Ok(Some(Stat::Repeat { body, cond }))
            }
            Tok::If => Ok(Some(self.parse_if()?)),
            Tok::For => Ok(Some(self.parse_for(line)?)),
            Tok::Function => Ok(Some(self.parse_function_stat(line)?)),
            Tok::Local => Ok(Some(self.parse_local(line)?)),
            _ => Ok(Some(self.parse_expr_stat(line)?)),
        }
    }

    fn parse_if(&mut self) -> Result<Stat, CompileError> {
        self.advance();
        let mut arms = Vec::new();
        let cond = self.parse_expr()?;
        self.expect(Tok::Then)?;
        let block = self.parse_block()?;
        arms.push((cond, block));
        let mut else_block = None;
        loop {
            match self.cur() {
                Tok::Elseif => {
                    self.advance();
                    let cond = self.parse_expr()?;
                    self.expect(Tok::Then)?;
                    let block = self.parse_block()?;
                    arms.push((cond, block));
                }
                Tok::Else => {
                    self.advance();
                    else_block = Some(self.parse_block()?);
                    break;
                }
                _ => break,
            }
        }
        self.expect(Tok::End)?;
        Ok(Stat::If { arms, else_block })
    }

    fn parse_for(&mut self, line: u32) -> Result<Stat, CompileError> {
        self.advance();
        let first = self.name()?;
        if self.eat(&Tok::Assign) {
            let start = self.parse_expr()?;
            self.expect(Tok::Comma)?;
            let stop = self.parse_expr()?;
            let step = if self.eat(&Tok::Comma) { Some(self.parse_expr()?) } else { None };
            self.expect(Tok::Do)?;
            let body = self.parse_block()?;
            self.expect(Tok::End)?;
            Ok(Stat::NumericFor { var: first, start, stop, step, body, line })
        } else {
            let mut names = vec![first];
            while self.eat(&Tok::Comma) {
                names.push(self.name()?);
            }
            self.expect(Tok::In)?;
            let exprs = self.parse_exprlist()?;
            self.expect(Tok::Do)?;
            let body = self.parse_block()?;
            self.expect(Tok::End)?;
            Ok(Stat::GenericFor { names, exprs, body, line })
        }
    }

    fn parse_function_stat(&mut self, line: u32) -> Result<Stat, CompileError> {
        self.advance();
        let mut target = Expr::Name(self.name()?);
        let mut is_method = false;
        loop {
            match self.cur() {
                Tok::Dot => {
                    self.advance();
                    let key = self.name()?;
                    target = Expr::Index { target: Box::new(target), key: Box::new(Expr::Str(key)) };
                }
                Tok::Colon => {
                    self.advance();
                    let key = self.name()?;
                    target = Expr::Index { target: Box::new(target), key: Box::new(Expr::Str(key)) };
                    is_method = true;
                    break;
                }
                _ => break,
            }
        }
        let body = self.parse_function_body(is_method, line)?;
        Ok(Stat::FunctionDecl { target, is_method, body, line })
    }

    fn parse_local(&mut self, line: u32) -> Result<Stat, CompileError> {
        self.advance();
        if self.eat(&Tok::Function) {
            let name = self.name()?;
            let body = self.parse_function_body(false, line)?;
            return Ok(Stat::LocalFunction { name, body, line });
        }
        let mut names = vec![self.name()?];
        // attribute syntax `<const>`/`<close>` is accepted and ignored.
        self.skip_attrib()?;
        while self.eat(&Tok::Comma) {
            names.push(self.name()?);
            self.skip_attrib()?;
        }
        let exprs = if self.eat(&Tok::Assign) { self.parse_exprlist()? } else { Vec::new() };
        Ok(Stat::Local { names, exprs, line })
    }

    fn skip_attrib(&mut self) -> Result<(), CompileError> {
        if self.eat(&Tok::Lt) {
            self.name()?;
            self.expect(Tok::Gt)?;
        }
        Ok(())
    }

    fn parse_function_body(&mut self, is_method: bool, line: u32) -> Result<FunctionBody, CompileError> {
        self.expect(Tok::LParen)?;
        let mut params = Vec::new();
        if is_method {
            params.push(SmolStr::new("self"));
        }
        let mut is_vararg = false;
        if !self.check(&Tok::RParen) {
            loop {
                if self.eat(&Tok::Ellipsis) {
                    is_vararg = true;
                    break;
                }
                params.push(self.name()?);
                if !self.eat(&Tok::Comma) {
                    break;
                }
            }
        }
        self.expect(Tok::RParen)?;
        let block = self.parse_block()?;
        self.expect(Tok::End)?;
        Ok(FunctionBody { params, is_vararg, block, line })
    }

    fn parse_expr_stat(&mut self, line: u32) -> Result<Stat, CompileError> {
        let first = self.parse_suffixed_expr()?;
        if self.check(&Tok::Assign) || self.check(&Tok::Comma) {
            let mut targets = vec![first];
            while self.eat(&Tok::Comma) {
                targets.push(self.parse_suffixed_expr()?);
            }
            self.expect(Tok::Assign)?;
            let exprs = self.parse_exprlist()?;
            Ok(Stat::Assign { targets, exprs, line })
        } else {
            match &first {
                Expr::Call { .. } | Expr::MethodCall { .. } => Ok(Stat::Call(first)),
                _ => Err(self.err("syntax error: expression statement must be a call")),
            }
        }
    }

    fn parse_exprlist(&mut self) -> Result<Vec<Expr>, CompileError> {
        let mut exprs = vec![self.parse_expr()?];
        while self.eat(&Tok::Comma) {
            exprs.push(self.parse_expr()?);
        }
        Ok(exprs)
    }

    fn parse_expr(&mut self) -> Result<Expr, CompileError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_and()?;
        while self.check(&Tok::Or) {
            let line = self.line();
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Binary { op: BinOp::Or, lhs: Box::new(lhs), rhs: Box::new(rhs), line };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_cmp()?;
        while self.check(&Tok::And) {
            let line = self.line();
            self.advance();
            let rhs = self.parse_cmp()?;
            lhs = Expr::Binary { op: BinOp::And, lhs: Box::new(lhs), rhs: Box::new(rhs), line };
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_bor()?;
        loop {
            let op = match self.cur() {
                Tok::Eq => BinOp::Eq,
                Tok::Ne => BinOp::Ne,
                Tok::Lt => BinOp::Lt,
                Tok::Le => BinOp::Le,
                Tok::Gt => BinOp::Gt,
                Tok::Ge => BinOp::Ge,
                _ => break,
            };
            let line = self.line();
            self.advance();
            let rhs = self.parse_bor()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), line };
        }
        Ok(lhs)
    }

    fn parse_bor(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_bxor()?;
        while self.check(&Tok::Pipe) {
            let line = self.line();
            self.advance();
            let rhs = self.parse_bxor()?;
            lhs = Expr::Binary { op: BinOp::BOr, lhs: Box::new(lhs), rhs: Box::new(rhs), line };
        }
        Ok(lhs)
    }

    fn parse_bxor(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_band()?;
        while self.check(&Tok::Tilde) {
            let line = self.line();
            self.advance();
            let rhs = self.parse_band()?;
            lhs = Expr::Binary { op: BinOp::BXor, lhs: Box::new(lhs), rhs: Box::new(rhs), line };
        }
        Ok(lhs)
    }

    fn parse_band(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_shift()?;
        while self.check(&Tok::Amp) {
            let line = self.line();
            self.advance();
            let rhs = self.parse_shift()?;
            lhs = Expr::Binary { op: BinOp::BAnd, lhs: Box::new(lhs), rhs: Box::new(rhs), line };
        }
        Ok(lhs)
    }

    fn parse_shift(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_concat()?;
        loop {
            let op = match self.cur() {
                Tok::Shl => BinOp::Shl,
                Tok::Shr => BinOp::Shr,
                _ => break,
            };
            let line = self.line();
            self.advance();
            let rhs = self.parse_concat()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), line };
        }
        Ok(lhs)
    }

    fn parse_concat(&mut self) -> Result<Expr, CompileError> {
        let lhs = self.parse_add()?;
        if self.check(&Tok::Concat) {
            let line = self.line();
            self.advance();
            let rhs = self.parse_concat()?;
            return Ok(Expr::Binary { op: BinOp::Concat, lhs: Box::new(lhs), rhs: Box::new(rhs), line });
        }
        Ok(lhs)
    }

    fn parse_add(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.cur() {
                Tok::Plus => BinOp::Add,
                Tok::Minus => BinOp::Sub,
                _ => break,
            };
            let line = self.line();
            self.advance();
            let rhs = self.parse_mul()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), line };
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.cur() {
                Tok::Star => BinOp::Mul,
                Tok::Slash => BinOp::Div,
                Tok::DSlash => BinOp::IDiv,
                Tok::Percent => BinOp::Mod,
                _ => break,
            };
            let line = self.line();
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), line };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, CompileError> {
        let op = match self.cur() {
            Tok::Not => UnOp::Not,
            Tok::Minus => UnOp::Neg,
            Tok::Hash => UnOp::Len,
            Tok::Tilde => UnOp::BNot,
            _ => return self.parse_pow(),
        };
        let line = self.line();
        self.advance();
        let expr = self.parse_unary()?;
        Ok(Expr::Unary { op, expr: Box::new(expr), line })
    }

    fn parse_pow(&mut self) -> Result<Expr, CompileError> {
        let lhs = self.parse_suffixed_expr_or_primary()?;
        if self.check(&Tok::Caret) {
            let line = self.line();
            self.advance();
            let rhs = self.parse_unary()?;
            return Ok(Expr::Binary { op: BinOp::Pow, lhs: Box::new(lhs), rhs: Box::new(rhs), line });
        }
        Ok(lhs)
    }

    fn parse_suffixed_expr_or_primary(&mut self) -> Result<Expr, CompileError> {
        match self.cur().clone() {
            Tok::Nil => { self.advance(); Ok(Expr::Nil) }
            Tok::True => { self.advance(); Ok(Expr::True) }
            Tok::False => { self.advance(); Ok(Expr::False) }
            Tok::Int(i) => { self.advance(); Ok(Expr::Int(i)) }
            Tok::Float(f) => { self.advance(); Ok(Expr::Float(f)) }
            Tok::Str(s) => { self.advance(); Ok(Expr::Str(SmolStr::new(s))) }
            Tok::Ellipsis => { self.advance(); Ok(Expr::Vararg) }
            Tok::Function => {
                let line = self.line();
                self.advance();
                let body = self.parse_function_body(false, line)?;
                Ok(Expr::Function(Box::new(body)))
            }
            Tok::LBrace => self.parse_table(),
            _ => self.parse_suffixed_expr(),
        }
    }

    fn parse_primary_expr(&mut self) -> Result<Expr, CompileError> {
        match self.advance() {
            Tok::Name(n) => Ok(Expr::Name(n)),
            Tok::LParen => {
                let inner = self.parse_expr()?;
                self.expect(Tok::RParen)?;
                Ok(Expr::Paren(Box::new(inner)))
            }
            other => Err(self.err(format!("unexpected token {:?}", other))),
        }
    }

    fn parse_suffixed_expr(&mut self) -> Result<Expr, CompileError> {
        let mut expr = self.parse_primary_expr()?;
        loop {
            let line = self.line();
            match self.cur() {
                Tok::Dot => {
                    self.advance();
                    let key = self.name()?;
                    expr = Expr::Index { target: Box::new(expr), key: Box::new(Expr::Str(key)) };
                }
                Tok::LBracket => {
                    self.advance();
                    let key = self.parse_expr()?;
                    self.expect(Tok::RBracket)?;
                    expr = Expr::Index { target: Box::new(expr), key: Box::new(key) };
                }
                Tok::Colon => {
                    self.advance();
                    let method = self.name()?;
                    let args = self.parse_args()?;
                    expr = Expr::MethodCall { target: Box::new(expr), method, args, line };
                }
                Tok::LParen | Tok::Str(_) | Tok::LBrace => {
                    let args = self.parse_args()?;
                    expr = Expr::Call { target: Box::new(expr), args, line };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, CompileError> {
        match self.cur().clone() {
            Tok::LParen => {
                self.advance();
                let args = if self.check(&Tok::RParen) { Vec::new() } else { self.parse_exprlist()? };
                self.expect(Tok::RParen)?;
                Ok(args)
            }
            Tok::Str(s) => {
                self.advance();
                Ok(vec![Expr::Str(SmolStr::new(s))])
            }
            Tok::LBrace => Ok(vec![self.parse_table()?]),
            other => Err(self.err(format!("expected function arguments, found {:?}", other))),
        }
    }

    fn parse_table(&mut self) -> Result<Expr, CompileError> {
        self.expect(Tok::LBrace)?;
        let mut array = Vec::new();
        let mut fields = Vec::new();
        while !self.check(&Tok::RBrace) {
            match self.cur().clone() {
                Tok::LBracket => {
                    self.advance();
                    let key = self.parse_expr()?;
                    self.expect(Tok::RBracket)?;
                    self.expect(Tok::Assign)?;
                    let value = self.parse_expr()?;
                    fields.push((key, value));
                }
                Tok::Name(n) if matches!(self.tokens[self.pos + 1].tok, Tok::Assign) => {
                    self.advance();
                    self.advance();
                    let value = self.parse_expr()?;
                    fields.push((Expr::Str(n), value));
                }
                _ => {
                    array.push(self.parse_expr()?);
                }
            }
            if !self.eat(&Tok::Comma) && !self.eat(&Tok::Semi) {
                break;
            }
        }
        self.expect(Tok::RBrace)?;
        Ok(Expr::Table { array, fields })
    }
}

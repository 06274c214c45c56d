//! Rule compiler.
//!
//! Turns rule source text into programs in a fresh [`Arena`]:
//!
//! ```text
//! on @Outside_Temp then                 Program "@Outside_Temp"
//!   if @Outside_Temp < 5 then             If ─┬─ Binary(<) ─┬─ Var @Outside_Temp
//!     @SetHeatpump = 1;                       │             └─ Literal 5
//!   end                                       └─ Assign ─┬─ Var @SetHeatpump
//! end                                                    └─ Literal 1
//! ```
//!
//! Compilation is all-or-nothing: the first error aborts and the partially
//! built arena is dropped, so the caller's current rule set stays intact.
//! Identifiers are validated through the token classifier against the live
//! registries; rule-to-rule calls are resolved after every block is known,
//! so a rule may call one defined further down the file.

use log::debug;

use crate::app::ports::BindingCatalog;
use crate::error::{ParseError, ParseReason};
use crate::rules::ast::{Arena, BinaryOp, Node, NodeId, NodeList, Program, UnaryOp};
use crate::rules::functions::{Builtin, MAX_ARGS};
use crate::rules::lexer::{Keyword, Lexer, Symbol, Tok};
use crate::rules::token::{self, Binding};
use crate::rules::value::{Arith, Compare, Value};

/// Recursion limit for nested expressions and `if` blocks.
const MAX_NESTING: u16 = 48;

/// Size limits applied while compiling.
#[derive(Debug, Clone, Copy)]
pub struct CompileLimits {
    pub arena_capacity: usize,
    pub max_rules: usize,
}

impl From<&crate::config::EngineConfig> for CompileLimits {
    fn from(cfg: &crate::config::EngineConfig) -> Self {
        Self {
            arena_capacity: cfg.arena_capacity as usize,
            max_rules: cfg.max_rules as usize,
        }
    }
}

/// Output of a successful compile.
#[derive(Debug, Clone)]
pub struct Compiled {
    pub arena: Arena,
    pub programs: Vec<Program>,
}

impl Compiled {
    pub fn rule_by_name(&self, name: &str) -> Option<usize> {
        let symbol = self.arena.lookup(name)?;
        self.programs.iter().position(|p| p.name == symbol)
    }
}

/// Compile `source` into a fresh arena.
pub fn compile(
    source: &str,
    limits: CompileLimits,
    catalog: &impl BindingCatalog,
) -> Result<Compiled, ParseError> {
    let mut parser = Parser {
        lx: Lexer::new(source),
        arena: Arena::with_capacity(limits.arena_capacity),
        catalog,
        programs: Vec::new(),
        calls: Vec::new(),
        depth: 0,
    };

    loop {
        let next = parser.lx.peek()?;
        match next.tok {
            Tok::Eof => break,
            Tok::Keyword(Keyword::On) => {
                if parser.programs.len() >= limits.max_rules {
                    return Err(ParseError::new(next.line, ParseReason::TooManyRules, ""));
                }
                parser.block()?;
            }
            tok => return Err(unexpected(next.line, tok)),
        }
    }

    parser.resolve_calls()?;
    debug!(
        "Compiler: {} rules, {} nodes, {} arena entries",
        parser.programs.len(),
        parser.arena.len(),
        parser.arena.used()
    );
    Ok(Compiled {
        arena: parser.arena,
        programs: parser.programs,
    })
}

struct Parser<'a, 'c, C> {
    lx: Lexer<'a>,
    arena: Arena,
    catalog: &'c C,
    programs: Vec<Program>,
    /// `Go` nodes awaiting resolution, with their source line.
    calls: Vec<(NodeId, u32)>,
    depth: u16,
}

impl<C: BindingCatalog> Parser<'_, '_, C> {
    // ── Blocks and statements ─────────────────────────────────

    fn block(&mut self) -> Result<(), ParseError> {
        self.lx.bump()?; // `on`
        let (name, line) = self.lx.event_name()?;
        if !token::is_event(name, self.catalog) {
            return Err(ParseError::new(line, ParseReason::InvalidEventName, name));
        }
        let symbol = self.arena.intern(name).map_err(|r| ParseError::new(line, r, name))?;
        if self.programs.iter().any(|p| p.name == symbol) {
            return Err(ParseError::new(line, ParseReason::DuplicateRule, name));
        }
        self.expect_keyword(Keyword::Then)?;

        let statements = self.statements()?;
        self.expect_keyword(Keyword::End)?;
        let body = self.list(&statements)?;

        self.programs.push(Program {
            name: symbol,
            index: self.programs.len() as u16,
            body,
            line,
        });
        Ok(())
    }

    /// Statements up to (not including) `end`, `elseif` or `else`.
    fn statements(&mut self) -> Result<Vec<NodeId>, ParseError> {
        let mut out = Vec::new();
        loop {
            let next = self.lx.peek()?;
            match next.tok {
                Tok::Keyword(Keyword::End | Keyword::ElseIf | Keyword::Else) => return Ok(out),
                Tok::Keyword(Keyword::If) => {
                    self.lx.bump()?;
                    out.push(self.if_chain()?);
                }
                Tok::Word(word) => {
                    self.lx.bump()?;
                    out.push(self.word_statement(word, next.line)?);
                }
                Tok::Eof => return Err(ParseError::new(next.line, ParseReason::UnexpectedEnd, "")),
                tok => return Err(unexpected(next.line, tok)),
            }
        }
    }

    /// Everything after `if` / `elseif`; consumes the closing `end`.
    fn if_chain(&mut self) -> Result<NodeId, ParseError> {
        self.enter()?;
        let condition = self.expr()?;
        self.expect_keyword(Keyword::Then)?;
        let then = self.statements()?;
        let then = self.list(&then)?;

        let next = self.lx.bump()?;
        let otherwise = match next.tok {
            Tok::Keyword(Keyword::ElseIf) => Some(self.if_chain()?),
            Tok::Keyword(Keyword::Else) => {
                let stmts = self.statements()?;
                self.expect_keyword(Keyword::End)?;
                let list = self.list(&stmts)?;
                Some(self.push(Node::Block(list))?)
            }
            _ => None, // `end`, guaranteed by `statements`
        };
        self.leave();
        self.push(Node::If {
            condition,
            then,
            otherwise,
        })
    }

    fn word_statement(&mut self, word: &str, line: u32) -> Result<NodeId, ParseError> {
        let binding = self.classify(word, line)?;
        if binding == Binding::None {
            let node = self.call(word, line, true)?;
            self.expect_sym(Symbol::Semicolon)?;
            return Ok(node);
        }
        if !binding.assignable() {
            return Err(ParseError::new(line, ParseReason::ReadOnlyTarget, word));
        }
        let target = self.var(word, binding, line)?;
        self.expect_sym(Symbol::Assign)?;
        let value = self.expr()?;
        self.expect_sym(Symbol::Semicolon)?;
        self.push(Node::Assign { target, value })
    }

    /// `name(args)`.  Built-ins take arguments; anything else must be a
    /// bare call of another rule and is only allowed as a statement.
    fn call(&mut self, name: &str, line: u32, statement: bool) -> Result<NodeId, ParseError> {
        self.expect_sym(Symbol::LParen)?;

        let Some(function) = Builtin::lookup(name) else {
            if !statement {
                return Err(ParseError::new(line, ParseReason::UnknownFunction, name));
            }
            let next = self.lx.bump()?;
            if next.tok != Tok::Sym(Symbol::RParen) {
                return Err(ParseError::new(line, ParseReason::UnknownFunction, name));
            }
            let symbol = self.arena.intern(name).map_err(|r| ParseError::new(line, r, name))?;
            let node = self.push(Node::Go { name: symbol, rule: None })?;
            self.calls.push((node, line));
            return Ok(node);
        };

        let mut args: heapless::Vec<NodeId, MAX_ARGS> = heapless::Vec::new();
        if self.lx.peek()?.tok == Tok::Sym(Symbol::RParen) {
            self.lx.bump()?;
        } else {
            loop {
                let arg = self.expr()?;
                if args.push(arg).is_err() {
                    return Err(ParseError::new(line, ParseReason::BadArity, name));
                }
                let next = self.lx.bump()?;
                match next.tok {
                    Tok::Sym(Symbol::Comma) => {}
                    Tok::Sym(Symbol::RParen) => break,
                    tok => return Err(unexpected(next.line, tok)),
                }
            }
        }
        if !function.accepts(args.len()) {
            return Err(ParseError::new(line, ParseReason::BadArity, name));
        }
        let args = self.list(&args)?;
        self.push(Node::Call { function, args })
    }

    // ── Expressions ───────────────────────────────────────────

    fn expr(&mut self) -> Result<NodeId, ParseError> {
        self.enter()?;
        let node = self.or_expr();
        self.leave();
        node
    }

    fn or_expr(&mut self) -> Result<NodeId, ParseError> {
        let mut lhs = self.and_expr()?;
        while self.eat_sym(Symbol::OrOr)? {
            let rhs = self.and_expr()?;
            lhs = self.push(Node::Binary { op: BinaryOp::Or, lhs, rhs })?;
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<NodeId, ParseError> {
        let mut lhs = self.comparison()?;
        while self.eat_sym(Symbol::AndAnd)? {
            let rhs = self.comparison()?;
            lhs = self.push(Node::Binary { op: BinaryOp::And, lhs, rhs })?;
        }
        Ok(lhs)
    }

    fn comparison(&mut self) -> Result<NodeId, ParseError> {
        let lhs = self.sum()?;
        let op = match self.lx.peek()?.tok {
            Tok::Sym(Symbol::EqEq) => Compare::Eq,
            Tok::Sym(Symbol::NotEq) => Compare::Ne,
            Tok::Sym(Symbol::Lt) => Compare::Lt,
            Tok::Sym(Symbol::Le) => Compare::Le,
            Tok::Sym(Symbol::Gt) => Compare::Gt,
            Tok::Sym(Symbol::Ge) => Compare::Ge,
            _ => return Ok(lhs),
        };
        self.lx.bump()?;
        let rhs = self.sum()?;
        self.push(Node::Binary { op: BinaryOp::Compare(op), lhs, rhs })
    }

    fn sum(&mut self) -> Result<NodeId, ParseError> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.lx.peek()?.tok {
                Tok::Sym(Symbol::Plus) => Arith::Add,
                Tok::Sym(Symbol::Minus) => Arith::Sub,
                _ => return Ok(lhs),
            };
            self.lx.bump()?;
            let rhs = self.term()?;
            lhs = self.push(Node::Binary { op: BinaryOp::Arith(op), lhs, rhs })?;
        }
    }

    fn term(&mut self) -> Result<NodeId, ParseError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.lx.peek()?.tok {
                Tok::Sym(Symbol::Star) => Arith::Mul,
                Tok::Sym(Symbol::Slash) => Arith::Div,
                Tok::Sym(Symbol::Percent) => Arith::Rem,
                _ => return Ok(lhs),
            };
            self.lx.bump()?;
            let rhs = self.unary()?;
            lhs = self.push(Node::Binary { op: BinaryOp::Arith(op), lhs, rhs })?;
        }
    }

    fn unary(&mut self) -> Result<NodeId, ParseError> {
        let op = match self.lx.peek()?.tok {
            Tok::Sym(Symbol::Minus) => UnaryOp::Neg,
            Tok::Sym(Symbol::Bang) => UnaryOp::Not,
            _ => return self.power(),
        };
        self.lx.bump()?;
        self.enter()?;
        let operand = self.unary()?;
        self.leave();

        // Fold `-<literal>` so negative constants cost one node.
        if op == UnaryOp::Neg {
            if let Some(Node::Literal(v)) = self.arena.node(operand).copied() {
                if let Some(node) = self.arena.node_mut(operand) {
                    *node = Node::Literal(v.negate());
                }
                return Ok(operand);
            }
        }
        self.push(Node::Unary { op, operand })
    }

    fn power(&mut self) -> Result<NodeId, ParseError> {
        let base = self.atom()?;
        if !self.eat_sym(Symbol::Caret)? {
            return Ok(base);
        }
        self.enter()?;
        let exponent = self.unary()?;
        self.leave();
        self.push(Node::Binary {
            op: BinaryOp::Arith(Arith::Pow),
            lhs: base,
            rhs: exponent,
        })
    }

    fn atom(&mut self) -> Result<NodeId, ParseError> {
        let next = self.lx.bump()?;
        match next.tok {
            Tok::Number(v) => self.push(Node::Literal(v)),
            Tok::Keyword(Keyword::Null) => self.push(Node::Literal(Value::Null)),
            Tok::Sym(Symbol::LParen) => {
                let inner = self.expr()?;
                self.expect_sym(Symbol::RParen)?;
                Ok(inner)
            }
            Tok::Word(word) => {
                let binding = self.classify(word, next.line)?;
                if binding == Binding::None {
                    self.call(word, next.line, false)
                } else {
                    self.var(word, binding, next.line)
                }
            }
            Tok::Eof => Err(ParseError::new(next.line, ParseReason::UnexpectedEnd, "")),
            tok => Err(unexpected(next.line, tok)),
        }
    }

    // ── Helpers ───────────────────────────────────────────────

    fn classify(&self, word: &str, line: u32) -> Result<Binding, ParseError> {
        match token::classify(word, self.catalog) {
            Some(c) if c.len == word.len() => Ok(c.binding),
            _ => Err(ParseError::new(line, ParseReason::UnknownIdentifier, word)),
        }
    }

    fn var(&mut self, word: &str, binding: Binding, line: u32) -> Result<NodeId, ParseError> {
        let symbol = self.arena.intern(word).map_err(|r| ParseError::new(line, r, word))?;
        self.push(Node::Var { symbol, binding })
    }

    fn push(&mut self, node: Node) -> Result<NodeId, ParseError> {
        self.arena
            .push(node)
            .map_err(|r| ParseError::new(self.lx.line(), r, ""))
    }

    fn list(&mut self, ids: &[NodeId]) -> Result<NodeList, ParseError> {
        self.arena
            .push_list(ids)
            .map_err(|r| ParseError::new(self.lx.line(), r, ""))
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(ParseError::new(self.lx.line(), ParseReason::NestingTooDeep, ""));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    fn eat_sym(&mut self, sym: Symbol) -> Result<bool, ParseError> {
        if self.lx.peek()?.tok == Tok::Sym(sym) {
            self.lx.bump()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect_sym(&mut self, sym: Symbol) -> Result<(), ParseError> {
        let next = self.lx.bump()?;
        if next.tok == Tok::Sym(sym) {
            Ok(())
        } else {
            Err(unexpected(next.line, next.tok))
        }
    }

    fn expect_keyword(&mut self, kw: Keyword) -> Result<(), ParseError> {
        let next = self.lx.bump()?;
        if next.tok == Tok::Keyword(kw) {
            Ok(())
        } else {
            Err(unexpected(next.line, next.tok))
        }
    }

    fn resolve_calls(&mut self) -> Result<(), ParseError> {
        for &(id, line) in &self.calls {
            let Some(&Node::Go { name, .. }) = self.arena.node(id) else {
                continue;
            };
            let Some(target) = self.programs.iter().find(|p| p.name == name) else {
                return Err(ParseError::new(
                    line,
                    ParseReason::UnknownRule,
                    self.arena.name(name),
                ));
            };
            let rule = Some(target.index);
            if let Some(node) = self.arena.node_mut(id) {
                *node = Node::Go { name, rule };
            }
        }
        Ok(())
    }
}

fn unexpected(line: u32, tok: Tok<'_>) -> ParseError {
    let text = match tok {
        Tok::Eof => return ParseError::new(line, ParseReason::UnexpectedEnd, ""),
        Tok::Word(w) => w.to_owned(),
        Tok::Keyword(kw) => format!("{kw:?}").to_ascii_lowercase(),
        Tok::Number(v) => v.to_string(),
        Tok::Sym(s) => format!("{s:?}"),
    };
    ParseError::new(line, ParseReason::UnexpectedToken, &text)
}

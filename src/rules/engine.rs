//! Rule execution engine.
//!
//! [`RuleEngine`] owns the active rule set (arena + per-rule state), the
//! global variable table and the load mode.  Everything outside the engine
//! is reached through a `&mut impl RuleHost` passed into each call.
//!
//! ```text
//!             ┌──────────── RuleEngine ────────────┐
//!  parse() ──▶│ RuleSet { arena, rules[] }  globals │
//!             └────────────────────────────────────┘
//!  run(i) ──▶ Idle ──▶ Running ──┬──▶ Done
//!                                ├──▶ Chained   (called another rule)
//!                                └──▶ Error     (chain refused / out of memory)
//! ```
//!
//! ## Chaining
//!
//! A bare `name();` statement runs another rule to completion before the
//! caller continues.  The callee's `return_to` records the caller.  A call
//! that would re-enter a rule already on the stack, or nest deeper than
//! `max_chain_depth`, is refused with [`Error::RuleCycle`]; the caller keeps
//! running and finishes in [`RunState::Error`].
//!
//! ## Reload
//!
//! [`RuleEngine::parse`] compiles into a fresh arena, then evaluates each
//! new rule once in [`EngineMode::Loading`] against scratch globals, with
//! external writes suppressed.  A failed check is logged and does not block
//! the load.  Only a successful compile replaces the active set (and clears
//! globals and timers); a failed one leaves everything as it was.

use log::{debug, error, info, warn};
use serde::Serialize;

use crate::app::ports::{RuleHost, TimerPort};
use crate::config::EngineConfig;
use crate::diagnostics;
use crate::error::{Error, LookupMiss, Result};
use crate::rules::ast::{Arena, BinaryOp, Node, NodeId, NodeList, Program, SymbolId, UnaryOp};
use crate::rules::bindings::{self, DispatchPolicy, EngineMode};
use crate::rules::compiler::{self, CompileLimits};
use crate::rules::functions::MAX_ARGS;
use crate::rules::store::{Scope, VarTable};
use crate::rules::token::Binding;
use crate::rules::value::Value;

// ═══════════════════════════════════════════════════════════════
//  Run state and reports
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunState {
    Idle,
    Running,
    /// Finished after handing control to at least one other rule.
    Chained,
    Done,
    Error,
}

/// Outcome of one rule run, including every rule it chained into.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub rule: u16,
    pub name: String,
    pub outcome: RunState,
    pub elapsed_us: u64,
    /// Caller this run returned to, `None` for a top-level run.
    pub returned_to: Option<u16>,
    /// `name = value` lines, truncated to the dump budget.
    pub locals: String,
    pub globals: String,
    pub chained: Vec<RunReport>,
}

impl RunReport {
    /// This report followed by every chained report, depth first.
    pub fn flatten(&self) -> Vec<&RunReport> {
        let mut out = vec![self];
        for child in &self.chained {
            out.extend(child.flatten());
        }
        out
    }
}

/// Serializable view of the engine for the web front end.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSnapshot {
    pub rules: Vec<RuleSummary>,
    pub globals: Vec<(String, Value)>,
    pub nodes_used: usize,
    pub nodes_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleSummary {
    pub name: String,
    pub state: RunState,
    pub last_elapsed_us: u64,
}

// ═══════════════════════════════════════════════════════════════
//  Rule set
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct RuleInstance {
    pub program: Program,
    locals: VarTable,
    pub state: RunState,
    /// Last rule this one chained into during its most recent run.
    pub go: Option<u16>,
    pub return_to: Option<u16>,
    pub last_elapsed_us: u64,
}

impl RuleInstance {
    fn new(program: Program, local_slots: usize) -> Self {
        Self {
            program,
            locals: VarTable::new(Scope::Local, local_slots),
            state: RunState::Idle,
            go: None,
            return_to: None,
            last_elapsed_us: 0,
        }
    }
}

#[derive(Debug)]
struct RuleSet {
    arena: Arena,
    rules: Vec<RuleInstance>,
}

// ═══════════════════════════════════════════════════════════════
//  RuleEngine
// ═══════════════════════════════════════════════════════════════

pub struct RuleEngine {
    config: EngineConfig,
    set: Option<RuleSet>,
    globals: VarTable,
    mode: EngineMode,
}

impl RuleEngine {
    pub fn new(config: EngineConfig) -> Self {
        let globals = VarTable::new(Scope::Global, usize::from(config.max_global_slots));
        Self {
            config,
            set: None,
            globals,
            mode: EngineMode::Live,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn mode(&self) -> EngineMode {
        self.mode
    }

    pub fn is_loaded(&self) -> bool {
        self.set.is_some()
    }

    pub fn rule_count(&self) -> usize {
        self.set.as_ref().map_or(0, |s| s.rules.len())
    }

    pub fn rule(&self, index: usize) -> Option<&RuleInstance> {
        self.set.as_ref()?.rules.get(index)
    }

    pub fn rule_name(&self, index: usize) -> Option<&str> {
        let set = self.set.as_ref()?;
        let rule = set.rules.get(index)?;
        Some(set.arena.name(rule.program.name))
    }

    /// Case-insensitive lookup of a rule block.
    pub fn rule_by_name(&self, name: &str) -> Option<usize> {
        let set = self.set.as_ref()?;
        let symbol = set.arena.lookup(name)?;
        set.rules.iter().position(|r| r.program.name == symbol)
    }

    // ── Loading ───────────────────────────────────────────────

    /// Compile `source`, check every rule once, and on success make it the
    /// active rule set.
    ///
    /// The engine stays in [`EngineMode::Loading`] until the new set is
    /// installed, so the check pass never sends a command or touches a
    /// device field.  Returns the number of rules loaded.
    pub fn parse(&mut self, source: &str, host: &mut impl RuleHost) -> Result<usize> {
        self.mode = EngineMode::Loading;
        let loaded = self.load(source, host);
        self.mode = EngineMode::Live;
        loaded
    }

    fn load(&mut self, source: &str, host: &mut impl RuleHost) -> Result<usize> {
        let compiled = match compiler::compile(source, CompileLimits::from(&self.config), &*host) {
            Ok(c) => c,
            Err(e) => {
                warn!("RuleEngine: rules not loaded, {}", e);
                return Err(e.into());
            }
        };

        let local_slots = usize::from(self.config.max_local_slots);
        let mut rules = Vec::new();
        rules
            .try_reserve_exact(compiled.programs.len())
            .map_err(|_| Error::AllocationFailure("rule table allocation"))?;
        rules.extend(
            compiled
                .programs
                .into_iter()
                .map(|p| RuleInstance::new(p, local_slots)),
        );

        // Check pass: every rule body once, against scratch globals.
        let mut scratch = VarTable::new(Scope::Global, usize::from(self.config.max_global_slots));
        let mut exec = Exec {
            arena: &compiled.arena,
            rules: &mut rules,
            globals: &mut scratch,
            host: &mut *host,
            mode: self.mode,
            policy: DispatchPolicy::from(&self.config),
            max_depth: self.config.max_chain_depth,
            dump_bytes: usize::from(self.config.dump_bytes),
        };
        let mut failed = 0usize;
        for rule in 0..u16::try_from(exec.rules.len()).unwrap_or(u16::MAX) {
            if let Err(e) = exec.check_rule(rule) {
                warn!("RuleEngine: '{}' failed its load check, {}", exec.rule_label(rule), e);
                failed += 1;
            }
        }

        TimerPort::clear(host);
        self.globals.clear();
        info!(
            "rules memory used: {} / {}",
            compiled.arena.used(),
            compiled.arena.capacity()
        );
        let count = rules.len();
        self.set = Some(RuleSet {
            arena: compiled.arena,
            rules,
        });
        if failed > 0 {
            info!("RuleEngine: {} rules loaded, {} failed the load check", count, failed);
        } else {
            info!("RuleEngine: {} rules loaded", count);
        }
        Ok(count)
    }

    /// Drop the rule set and all variables.  Safe to call repeatedly.
    pub fn deinitialize(&mut self) {
        if self.set.take().is_some() {
            info!("RuleEngine: rules unloaded");
        }
        self.globals.clear();
    }

    // ── Running ───────────────────────────────────────────────

    /// Run rule `index` to completion, then emit its diagnostics (and those
    /// of every rule it chained into) to the host.
    pub fn run(&mut self, index: usize, host: &mut impl RuleHost) -> Result<RunReport> {
        let policy = DispatchPolicy::from(&self.config);
        let max_depth = self.config.max_chain_depth;
        let dump_bytes = usize::from(self.config.dump_bytes);
        let mode = self.mode;

        let set = self.set.as_mut().ok_or(Error::NotLoaded)?;
        let rule = u16::try_from(index)
            .ok()
            .filter(|&i| usize::from(i) < set.rules.len())
            .ok_or(Error::LookupMiss(LookupMiss::Rule))?;

        let mut exec = Exec {
            arena: &set.arena,
            rules: &mut set.rules,
            globals: &mut self.globals,
            host: &mut *host,
            mode,
            policy,
            max_depth,
            dump_bytes,
        };
        match exec.run_rule(rule, None, 0) {
            Ok(report) => {
                for r in report.flatten() {
                    diagnostics::emit_run_report(r, &mut *host);
                }
                Ok(report)
            }
            Err(Error::AllocationFailure(what)) => {
                error!("RuleEngine: out of memory ({}), restarting", what);
                host.fatal(what);
                Err(Error::AllocationFailure(what))
            }
            Err(e) => Err(e),
        }
    }

    // ── Variable access ───────────────────────────────────────

    pub fn format_locals(&self, index: usize) -> Option<String> {
        let set = self.set.as_ref()?;
        let rule = set.rules.get(index)?;
        Some(rule.locals.format(&set.arena, usize::from(self.config.dump_bytes)))
    }

    pub fn format_globals(&self) -> String {
        self.set.as_ref().map_or_else(String::new, |s| {
            self.globals.format(&s.arena, usize::from(self.config.dump_bytes))
        })
    }

    /// Current value of global `name` (`#` included).
    pub fn global(&self, name: &str) -> Value {
        self.global_symbol(name).map_or(Value::Null, |s| self.globals.get(s))
    }

    /// Set global `name`, which must appear somewhere in the loaded rules.
    pub fn set_global(&mut self, name: &str, value: Value) -> Result<()> {
        let set = self.set.as_ref().ok_or(Error::NotLoaded)?;
        let symbol = set.arena.lookup(name).ok_or(Error::LookupMiss(LookupMiss::Rule))?;
        let owner = self
            .globals
            .find(symbol)
            .map(|s| s.owner)
            .or_else(|| first_var_node(&set.arena, symbol))
            .ok_or(Error::LookupMiss(LookupMiss::Rule))?;
        self.globals.set(symbol, owner, u16::MAX, value)
    }

    /// Remove global `name`.  Returns whether it was set.
    pub fn delete_global(&mut self, name: &str) -> bool {
        let Some(owner) = self
            .global_symbol(name)
            .and_then(|s| self.globals.find(s))
            .map(|s| s.owner)
        else {
            return false;
        };
        self.globals.delete(owner)
    }

    fn global_symbol(&self, name: &str) -> Option<SymbolId> {
        self.set.as_ref()?.arena.lookup(name)
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let Some(set) = self.set.as_ref() else {
            return EngineSnapshot {
                rules: Vec::new(),
                globals: Vec::new(),
                nodes_used: 0,
                nodes_capacity: usize::from(self.config.arena_capacity),
            };
        };
        EngineSnapshot {
            rules: set
                .rules
                .iter()
                .map(|r| RuleSummary {
                    name: set.arena.name(r.program.name).to_owned(),
                    state: r.state,
                    last_elapsed_us: r.last_elapsed_us,
                })
                .collect(),
            globals: self
                .globals
                .slots()
                .iter()
                .filter_map(|s| Some((set.arena.name(s.symbol).to_owned(), s.value()?)))
                .collect(),
            nodes_used: set.arena.used(),
            nodes_capacity: set.arena.capacity(),
        }
    }
}

fn first_var_node(arena: &Arena, symbol: SymbolId) -> Option<NodeId> {
    (0..arena.len()).find_map(|i| {
        let id = NodeId::from_index(i)?;
        match arena.node(id) {
            Some(Node::Var { symbol: s, binding: Binding::Global }) if *s == symbol => Some(id),
            _ => None,
        }
    })
}

// ═══════════════════════════════════════════════════════════════
//  Evaluator
// ═══════════════════════════════════════════════════════════════

/// Borrowed view of the engine for the duration of one top-level run.
struct Exec<'e, H> {
    arena: &'e Arena,
    rules: &'e mut [RuleInstance],
    globals: &'e mut VarTable,
    host: &'e mut H,
    mode: EngineMode,
    policy: DispatchPolicy,
    max_depth: u8,
    dump_bytes: usize,
}

struct Frame {
    rule: u16,
    depth: u8,
    failed: bool,
    chained: Vec<RunReport>,
}

impl<H: RuleHost> Exec<'_, H> {
    fn run_rule(&mut self, rule: u16, caller: Option<u16>, depth: u8) -> Result<RunReport> {
        let arena = self.arena;
        let idx = usize::from(rule);
        let instance = self.rules.get_mut(idx).ok_or(Error::LookupMiss(LookupMiss::Rule))?;
        if depth > self.max_depth || instance.state == RunState::Running {
            return Err(Error::RuleCycle { rule, depth });
        }
        instance.state = RunState::Running;
        instance.locals.clear();
        instance.return_to = caller;
        instance.go = None;
        let body = instance.program.body;
        let name = arena.name(instance.program.name);
        debug!("RuleEngine: running '{}' (depth {})", name, depth);

        let started = self.host.uptime_us();
        let mut frame = Frame {
            rule,
            depth,
            failed: false,
            chained: Vec::new(),
        };
        let result = self.exec_list(body, &mut frame);
        let elapsed_us = self.host.uptime_us().saturating_sub(started);

        let outcome = if result.is_err() || frame.failed {
            RunState::Error
        } else if frame.chained.is_empty() {
            RunState::Done
        } else {
            RunState::Chained
        };
        let locals = match self.rules.get_mut(idx) {
            Some(instance) => {
                instance.state = outcome;
                instance.last_elapsed_us = elapsed_us;
                instance.locals.format(arena, self.dump_bytes)
            }
            None => String::new(),
        };
        result?;

        Ok(RunReport {
            rule,
            name: name.to_owned(),
            outcome,
            elapsed_us,
            returned_to: caller,
            locals,
            globals: self.globals.format(arena, self.dump_bytes),
            chained: frame.chained,
        })
    }

    /// Evaluate one rule body while loading.  Go-links are not followed and
    /// nothing is reported; the rule is left idle with empty locals.
    fn check_rule(&mut self, rule: u16) -> Result<()> {
        let idx = usize::from(rule);
        let instance = self.rules.get_mut(idx).ok_or(Error::LookupMiss(LookupMiss::Rule))?;
        instance.state = RunState::Running;
        let body = instance.program.body;
        let mut frame = Frame {
            rule,
            depth: 0,
            failed: false,
            chained: Vec::new(),
        };
        let result = self.exec_list(body, &mut frame);
        if let Some(instance) = self.rules.get_mut(idx) {
            instance.state = RunState::Idle;
            instance.locals.clear();
            instance.go = None;
        }
        result
    }

    // ── Statements ────────────────────────────────────────────

    fn exec_list(&mut self, list: NodeList, frame: &mut Frame) -> Result<()> {
        let arena = self.arena;
        for &id in arena.list(list) {
            self.exec(id, frame)?;
        }
        Ok(())
    }

    fn exec(&mut self, id: NodeId, frame: &mut Frame) -> Result<()> {
        let Some(&node) = self.arena.node(id) else {
            return Ok(());
        };
        match node {
            Node::Assign { target, value } => {
                let value = self.eval(value, frame.rule);
                self.assign(target, value, frame.rule)
            }
            Node::If {
                condition,
                then,
                otherwise,
            } => {
                if self.eval(condition, frame.rule).truthy() {
                    self.exec_list(then, frame)
                } else if let Some(other) = otherwise {
                    self.exec(other, frame)
                } else {
                    Ok(())
                }
            }
            Node::Block(list) => self.exec_list(list, frame),
            Node::Go { name, rule } => self.chain(name, rule, frame),
            _ => {
                self.eval(id, frame.rule);
                Ok(())
            }
        }
    }

    fn assign(&mut self, target: NodeId, value: Value, rule: u16) -> Result<()> {
        let Some(&Node::Var { symbol, binding }) = self.arena.node(target) else {
            return Ok(());
        };
        match binding {
            Binding::Local => match self.rules.get_mut(usize::from(rule)) {
                Some(instance) => instance.locals.set(symbol, target, rule, value),
                None => Ok(()),
            },
            Binding::Global => self.globals.set(symbol, target, rule, value),
            _ => {
                let name = self.arena.name(symbol);
                if let Err(miss) =
                    bindings::write(binding, name, value, self.mode, self.policy, &mut *self.host)
                {
                    warn!("RuleEngine: {} not written, {}", name, miss);
                }
                Ok(())
            }
        }
    }

    fn chain(&mut self, name: SymbolId, target: Option<u16>, frame: &mut Frame) -> Result<()> {
        let Some(target) = target else {
            warn!("RuleEngine: {} '{}'", LookupMiss::Rule, self.arena.name(name));
            return Ok(());
        };
        if self.mode == EngineMode::Loading {
            return Ok(());
        }
        if let Some(me) = self.rules.get_mut(usize::from(frame.rule)) {
            me.go = Some(target);
        }
        match self.run_rule(target, Some(frame.rule), frame.depth.saturating_add(1)) {
            Ok(report) => {
                frame.chained.push(report);
                Ok(())
            }
            Err(e @ Error::RuleCycle { .. }) => {
                warn!(
                    "RuleEngine: '{}' not called from '{}', {}",
                    self.arena.name(name),
                    self.rule_label(frame.rule),
                    e
                );
                frame.failed = true;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn rule_label(&self, rule: u16) -> &str {
        self.rules
            .get(usize::from(rule))
            .map_or("?", |r| self.arena.name(r.program.name))
    }

    // ── Expressions ───────────────────────────────────────────

    fn eval(&mut self, id: NodeId, rule: u16) -> Value {
        let Some(&node) = self.arena.node(id) else {
            return Value::Null;
        };
        match node {
            Node::Literal(v) => v,
            Node::Var { symbol, binding } => self.load(symbol, binding, rule),
            Node::Unary {
                op: UnaryOp::Neg,
                operand,
            } => self.eval(operand, rule).negate(),
            Node::Unary {
                op: UnaryOp::Not,
                operand,
            } => Value::Integer(i32::from(!self.eval(operand, rule).truthy())),
            Node::Binary {
                op: BinaryOp::And,
                lhs,
                rhs,
            } => Value::Integer(i32::from(
                self.eval(lhs, rule).truthy() && self.eval(rhs, rule).truthy(),
            )),
            Node::Binary {
                op: BinaryOp::Or,
                lhs,
                rhs,
            } => Value::Integer(i32::from(
                self.eval(lhs, rule).truthy() || self.eval(rhs, rule).truthy(),
            )),
            Node::Binary {
                op: BinaryOp::Arith(op),
                lhs,
                rhs,
            } => {
                let a = self.eval(lhs, rule);
                let b = self.eval(rhs, rule);
                if a.is_null() || b.is_null() {
                    debug!("RuleEngine: {} in {:?}, NULL operand", Error::TypeMismatch, op);
                }
                a.arith(op, b)
            }
            Node::Binary {
                op: BinaryOp::Compare(op),
                lhs,
                rhs,
            } => {
                let a = self.eval(lhs, rule);
                let b = self.eval(rhs, rule);
                a.compare(op, b)
            }
            Node::Call { function, args } => {
                let arena = self.arena;
                let mut values: heapless::Vec<Value, MAX_ARGS> = heapless::Vec::new();
                for &arg in arena.list(args) {
                    let v = self.eval(arg, rule);
                    let _ = values.push(v);
                }
                function.call(&values, &mut *self.host)
            }
            Node::Assign { .. } | Node::If { .. } | Node::Block(_) | Node::Go { .. } => {
                Value::Null
            }
        }
    }

    fn load(&self, symbol: SymbolId, binding: Binding, rule: u16) -> Value {
        match binding {
            Binding::Local => self
                .rules
                .get(usize::from(rule))
                .map_or(Value::Null, |r| r.locals.get(symbol)),
            Binding::Global => self.globals.get(symbol),
            _ => {
                let name = self.arena.name(symbol);
                bindings::read(binding, name, &*self.host).unwrap_or_else(|miss| {
                    debug!("RuleEngine: {} reads NULL, {}", name, miss);
                    Value::Null
                })
            }
        }
    }
}

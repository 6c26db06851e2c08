// Copyright (c) Asymptotic
// SPDX-License-Identifier: Apache-2.0

//! Value types of the SSA model: tracked machine-state slots, versioned
//! values, phi nodes and the persistent per-program-point state.

use crate::cfg::BlockId;
use anyhow::bail;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;

/// Physical machine state tracked through SSA.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SsaBase {
    #[serde(rename = "A")]
    RegisterA,
    #[serde(rename = "X")]
    RegisterX,
    #[serde(rename = "Y")]
    RegisterY,
    #[serde(rename = "Z")]
    FlagZero,
    #[serde(rename = "N")]
    FlagNegative,
    #[serde(rename = "C")]
    FlagCarry,
    #[serde(rename = "V")]
    FlagOverflow,
}

impl SsaBase {
    pub const ALL: [SsaBase; 7] = [
        SsaBase::RegisterA,
        SsaBase::RegisterX,
        SsaBase::RegisterY,
        SsaBase::FlagZero,
        SsaBase::FlagNegative,
        SsaBase::FlagCarry,
        SsaBase::FlagOverflow,
    ];

    /// Name of the incoming (version 0) value.
    pub fn param_name(self) -> &'static str {
        match self {
            SsaBase::RegisterA => "A",
            SsaBase::RegisterX => "X",
            SsaBase::RegisterY => "Y",
            SsaBase::FlagZero => "flagZ",
            SsaBase::FlagNegative => "flagN",
            SsaBase::FlagCarry => "flagC",
            SsaBase::FlagOverflow => "flagV",
        }
    }

    pub fn is_flag(self) -> bool {
        !matches!(
            self,
            SsaBase::RegisterA | SsaBase::RegisterX | SsaBase::RegisterY
        )
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for SsaBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.param_name())
    }
}

/// A set of tracked bases, packed into one byte.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Vec<SsaBase>", into = "Vec<SsaBase>")]
pub struct BaseSet(u8);

impl BaseSet {
    pub const fn empty() -> Self {
        BaseSet(0)
    }

    pub fn all() -> Self {
        Self::of(&SsaBase::ALL)
    }

    pub fn flags() -> Self {
        Self::of(&[
            SsaBase::FlagZero,
            SsaBase::FlagNegative,
            SsaBase::FlagCarry,
            SsaBase::FlagOverflow,
        ])
    }

    pub fn of(bases: &[SsaBase]) -> Self {
        bases.iter().fold(Self::empty(), |set, base| set.with(*base))
    }

    pub fn with(self, base: SsaBase) -> Self {
        BaseSet(self.0 | base.bit())
    }

    pub fn insert(&mut self, base: SsaBase) {
        self.0 |= base.bit();
    }

    pub fn contains(self, base: SsaBase) -> bool {
        self.0 & base.bit() != 0
    }

    pub fn union(self, other: BaseSet) -> Self {
        BaseSet(self.0 | other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = SsaBase> {
        SsaBase::ALL.into_iter().filter(move |base| self.contains(*base))
    }
}

impl From<Vec<SsaBase>> for BaseSet {
    fn from(bases: Vec<SsaBase>) -> Self {
        Self::of(&bases)
    }
}

impl From<BaseSet> for Vec<SsaBase> {
    fn from(set: BaseSet) -> Self {
        set.iter().collect()
    }
}

impl fmt::Debug for BaseSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// The name of one SSA value: a base plus its function-wide version.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SsaName {
    pub base: SsaBase,
    pub version: u32,
}

impl SsaName {
    pub fn new(base: SsaBase, version: u32) -> Self {
        Self { base, version }
    }

    pub fn param(base: SsaBase) -> Self {
        Self::new(base, 0)
    }
}

impl fmt::Display for SsaName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.version == 0 {
            f.write_str(self.base.param_name())
        } else {
            write!(f, "{}_{}", self.base.param_name(), self.version)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Eq,
    Ne,
    Ge,
    Gt,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Ge => ">=",
            BinaryOp::Gt => ">",
        }
    }

    /// Applies the operator to integer operands. Comparisons yield 0 or 1.
    pub fn apply(self, lhs: i64, rhs: i64) -> i64 {
        match self {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Sub => lhs - rhs,
            BinaryOp::And => lhs & rhs,
            BinaryOp::Or => lhs | rhs,
            BinaryOp::Xor => lhs ^ rhs,
            BinaryOp::Shl => lhs << rhs,
            BinaryOp::Shr => lhs >> rhs,
            BinaryOp::Eq => (lhs == rhs) as i64,
            BinaryOp::Ne => (lhs != rhs) as i64,
            BinaryOp::Ge => (lhs >= rhs) as i64,
            BinaryOp::Gt => (lhs > rhs) as i64,
        }
    }
}

/// The computation that defines an SSA value. Operands that are themselves
/// SSA values are referenced by name, never inlined, so an expression always
/// denotes the operand values live before its instruction.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SsaExpr {
    /// Incoming value of a base at function entry.
    Param(SsaBase),
    /// Result of the phi node with this name.
    Phi(SsaName),
    Value(SsaName),
    Const(u8),
    Bool(bool),
    /// A memory read at `address` (plus an index register value).
    Memory {
        address: u16,
        index: Option<SsaName>,
    },
    /// A memory read through a symbolic location.
    Symbol(String),
    Binary(BinaryOp, Box<SsaExpr>, Box<SsaExpr>),
    /// A value pulled off the hardware stack.
    StackPull(SsaBase),
    StackPointer,
    /// A base left undefined by a subroutine call.
    Clobbered {
        callee: Option<String>,
        base: SsaBase,
    },
}

impl SsaExpr {
    pub fn binary(op: BinaryOp, lhs: SsaExpr, rhs: SsaExpr) -> Self {
        SsaExpr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    /// Visits every SSA name this expression mentions.
    pub fn for_each_name(&self, f: &mut impl FnMut(SsaName)) {
        match self {
            SsaExpr::Param(base) => f(SsaName::param(*base)),
            SsaExpr::Phi(name) | SsaExpr::Value(name) => f(*name),
            SsaExpr::Memory {
                index: Some(name), ..
            } => f(*name),
            SsaExpr::Binary(_, lhs, rhs) => {
                lhs.for_each_name(f);
                rhs.for_each_name(f);
            }
            _ => {}
        }
    }

    pub fn names(&self) -> Vec<SsaName> {
        let mut names = vec![];
        self.for_each_name(&mut |name| names.push(name));
        names
    }
}

impl fmt::Display for SsaExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SsaExpr::Param(base) => write!(f, "{}", base),
            SsaExpr::Phi(name) => write!(f, "phi {}", name),
            SsaExpr::Value(name) => write!(f, "{}", name),
            SsaExpr::Const(v) => write!(f, "0x{:02X}", v),
            SsaExpr::Bool(b) => write!(f, "{}", b),
            SsaExpr::Memory { address, index } => match index {
                Some(index) => write!(f, "mem[0x{:04X} + {}]", address, index),
                None => write!(f, "mem[0x{:04X}]", address),
            },
            SsaExpr::Symbol(label) => write!(f, "{}", label),
            SsaExpr::Binary(op, lhs, rhs) => write!(f, "({} {} {})", lhs, op.symbol(), rhs),
            SsaExpr::StackPull(base) => write!(f, "pull_{}", base),
            SsaExpr::StackPointer => write!(f, "S"),
            SsaExpr::Clobbered { callee, base } => match callee {
                Some(callee) => write!(f, "{}.{}", callee, base),
                None => write!(f, "clobbered_{}", base),
            },
        }
    }
}

/// One immutable SSA value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SsaValue {
    pub base: SsaBase,
    pub version: u32,
    pub expr: Rc<SsaExpr>,
    pub block: Option<BlockId>,
}

impl SsaValue {
    pub fn new(base: SsaBase, version: u32, expr: SsaExpr, block: Option<BlockId>) -> Self {
        Self {
            base,
            version,
            expr: Rc::new(expr),
            block,
        }
    }

    /// The version-0 value standing for the incoming state of `base`.
    pub fn param(base: SsaBase) -> Self {
        Self::new(base, 0, SsaExpr::Param(base), None)
    }

    pub fn name(&self) -> SsaName {
        SsaName::new(self.base, self.version)
    }

    pub fn versioned_name(&self) -> String {
        self.name().to_string()
    }

    /// An expression that reads this value by name.
    pub fn as_operand(&self) -> SsaExpr {
        SsaExpr::Value(self.name())
    }
}

impl fmt::Display for SsaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.name(), self.expr)
    }
}

/// A merge of the incoming values of `target` at a join block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhiNode {
    pub target: SsaBase,
    pub result_version: u32,
    pub block: BlockId,
    /// Incoming values keyed by direct predecessor.
    pub sources: BTreeMap<BlockId, SsaValue>,
}

impl PhiNode {
    pub fn new(target: SsaBase, result_version: u32, block: BlockId) -> Self {
        Self {
            target,
            result_version,
            block,
            sources: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> SsaName {
        SsaName::new(self.target, self.result_version)
    }

    /// The value this phi defines.
    pub fn value(&self) -> SsaValue {
        SsaValue::new(
            self.target,
            self.result_version,
            SsaExpr::Phi(self.name()),
            Some(self.block),
        )
    }

    /// Renders the phi with block labels supplied by `label`.
    pub fn display_with<'a>(&'a self, label: impl Fn(BlockId) -> String + 'a) -> impl fmt::Display + 'a {
        PhiDisplay { phi: self, label }
    }
}

struct PhiDisplay<'a, F> {
    phi: &'a PhiNode,
    label: F,
}

impl<F: Fn(BlockId) -> String> fmt::Display for PhiDisplay<'_, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} = phi({})",
            self.phi.name(),
            self.phi
                .sources
                .iter()
                .map(|(pred, value)| format!("{} from {}", value.name(), (self.label)(*pred)))
                .join(", ")
        )
    }
}

impl fmt::Display for PhiNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_with(|block| format!("@{}", block)))
    }
}

/// The live value of every base at one program point. Updates produce new
/// states and never touch a state that has already been handed out.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct SsaState {
    values: im::OrdMap<SsaBase, SsaValue>,
}

impl SsaState {
    pub fn new() -> Self {
        Self::default()
    }

    /// A state where every base holds its version-0 parameter value.
    pub fn with_parameters() -> Self {
        SsaBase::ALL
            .into_iter()
            .fold(Self::new(), |state, base| state.with(SsaValue::param(base)))
    }

    pub fn get(&self, base: SsaBase) -> Option<&SsaValue> {
        self.values.get(&base)
    }

    pub fn with(&self, value: SsaValue) -> Self {
        Self {
            values: self.values.update(value.base, value),
        }
    }

    pub fn with_all(&self, values: impl IntoIterator<Item = SsaValue>) -> Self {
        values
            .into_iter()
            .fold(self.clone(), |state, value| state.with(value))
    }

    pub fn values(&self) -> impl Iterator<Item = &SsaValue> {
        self.values.values()
    }
}

/// Everything the SSA builder computed for one function.
#[derive(Clone, Debug, Default)]
pub struct SsaResult {
    pub phi_nodes: BTreeMap<BlockId, Vec<PhiNode>>,
    pub block_entry_state: BTreeMap<BlockId, SsaState>,
    pub block_exit_state: BTreeMap<BlockId, SsaState>,
    /// The state in front of each instruction of each renamed block.
    pub instruction_states: BTreeMap<BlockId, Vec<SsaState>>,
    pub all_values: Vec<SsaValue>,
}

impl SsaResult {
    pub fn phis_at(&self, block: BlockId) -> &[PhiNode] {
        self.phi_nodes.get(&block).map_or(&[], Vec::as_slice)
    }

    pub fn entry_state(&self, block: BlockId) -> Option<&SsaState> {
        self.block_entry_state.get(&block)
    }

    pub fn exit_state(&self, block: BlockId) -> Option<&SsaState> {
        self.block_exit_state.get(&block)
    }

    pub fn exit_value(&self, block: BlockId, base: SsaBase) -> Option<&SsaValue> {
        self.exit_state(block)?.get(base)
    }

    pub fn state_before(&self, block: BlockId, index: usize) -> Option<&SsaState> {
        self.instruction_states.get(&block)?.get(index)
    }

    /// Values newly defined by instruction `index` of `block`, in base order.
    pub fn defined_by(&self, block: BlockId, index: usize) -> Vec<&SsaValue> {
        let Some(before) = self.state_before(block, index) else {
            return vec![];
        };
        let after = self
            .state_before(block, index + 1)
            .or_else(|| self.exit_state(block));
        let Some(after) = after else {
            return vec![];
        };
        after
            .values()
            .filter(|value| before.get(value.base).map(SsaValue::name) != Some(value.name()))
            .collect()
    }

    pub fn phi_count(&self) -> usize {
        self.phi_nodes.values().map(Vec::len).sum()
    }

    /// Checks that each `(base, version)` is defined once, that every name
    /// read (phi sources included) is defined, and that no definition reads
    /// a version of its own base allocated at or after its own.
    pub fn verify_single_assignment(&self) -> anyhow::Result<()> {
        let mut defined = BTreeSet::new();
        for value in &self.all_values {
            if !defined.insert(value.name()) {
                bail!("{} is defined more than once", value.name());
            }
        }
        for value in &self.all_values {
            let own = matches!(*value.expr, SsaExpr::Param(_) | SsaExpr::Phi(_));
            for name in value.expr.names() {
                if !defined.contains(&name) {
                    bail!("{} reads undefined {}", value, name);
                }
                if !own && name.base == value.base && name.version >= value.version {
                    bail!("{} reads {}, which is not older", value, name);
                }
            }
        }
        for phi in self.phi_nodes.values().flatten() {
            if !defined.contains(&phi.name()) {
                bail!("phi {} is missing from the value list", phi);
            }
            if let Some(source) = phi.sources.values().find(|source| !defined.contains(&source.name())) {
                bail!("phi {} has undefined source {}", phi, source.name());
            }
        }
        Ok(())
    }
}

// This module defines the block graph the legalization passes operate on. A
// MachineFunction owns an arena of MachineBlocks addressed by stable BlockId values and
// a separate layout vector giving their order in the final code. Inserting a block
// appends an arena slot and splices its id into the layout, so ids held by a pass stay
// valid across edits. Each block carries a layout number that is only refreshed at
// explicit renumbering checkpoints, mirroring how a backend numbers basic blocks. Blocks
// hold ordered MachineInsts (opcode, operands, bundle flag) and an explicit successor
// list that graph surgery keeps up to date.

//! Machine-level block graph.
//!
//! The graph is an arena of blocks plus a layout order. Blocks are referred to by
//! [`BlockId`], which never changes once a block is created; the layout number of a
//! block changes only when [`MachineFunction::renumber_blocks`] runs.

use std::fmt;

use crate::cpu0::{Opcode, Reg};

/// Stable identity of a block inside its function's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn from_index(index: usize) -> Self {
        BlockId(index as u32)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "block{}", self.0)
    }
}

/// Relocation modifier applied to a symbol operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolModifier {
    Hi,
    Lo,
}

impl SymbolModifier {
    pub fn name(self) -> &'static str {
        match self {
            SymbolModifier::Hi => "hi",
            SymbolModifier::Lo => "lo",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Reg(Reg),
    Imm(i64),
    Block(BlockId),
    Symbol { name: String, modifier: SymbolModifier },
}

/// One machine instruction.
///
/// `bundled_with_succ` ties the following instruction to this one, which is how a
/// filled delay slot is represented. Bundled instructions move together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineInst {
    pub opcode: Opcode,
    pub operands: Vec<Operand>,
    pub bundled_with_succ: bool,
}

impl MachineInst {
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            operands: Vec::new(),
            bundled_with_succ: false,
        }
    }

    pub fn reg(mut self, reg: Reg) -> Self {
        self.operands.push(Operand::Reg(reg));
        self
    }

    pub fn imm(mut self, imm: i64) -> Self {
        self.operands.push(Operand::Imm(imm));
        self
    }

    pub fn block(mut self, block: BlockId) -> Self {
        self.operands.push(Operand::Block(block));
        self
    }

    pub fn symbol(mut self, name: &str, modifier: SymbolModifier) -> Self {
        self.operands.push(Operand::Symbol {
            name: name.to_string(),
            modifier,
        });
        self
    }

    /// Mark the next instruction as part of this instruction's bundle.
    pub fn bundled(mut self) -> Self {
        self.bundled_with_succ = true;
        self
    }

    /// First block operand, which is the destination of a direct branch.
    pub fn target_block(&self) -> Option<BlockId> {
        self.block_operands().next()
    }

    pub fn block_operands(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.operands.iter().filter_map(|op| match op {
            Operand::Block(id) => Some(*id),
            _ => None,
        })
    }

    pub fn reg_operands(&self) -> impl Iterator<Item = Reg> + '_ {
        self.operands.iter().filter_map(|op| match op {
            Operand::Reg(reg) => Some(*reg),
            _ => None,
        })
    }

    /// Point the first block operand at `target`. Returns false if there is none.
    pub fn set_target_block(&mut self, target: BlockId) -> bool {
        for op in &mut self.operands {
            if let Operand::Block(id) = op {
                *id = target;
                return true;
            }
        }
        false
    }
}

/// Position of an instruction: block identity plus index within the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstLoc {
    pub block: BlockId,
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineBlock {
    name: String,
    number: usize,
    insts: Vec<MachineInst>,
    succs: Vec<BlockId>,
}

impl MachineBlock {
    fn new(name: String) -> Self {
        Self {
            name,
            number: 0,
            insts: Vec::new(),
            succs: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Layout number as of the last renumbering.
    pub fn number(&self) -> usize {
        self.number
    }

    pub fn insts(&self) -> &[MachineInst] {
        &self.insts
    }

    pub fn insts_mut(&mut self) -> &mut Vec<MachineInst> {
        &mut self.insts
    }

    pub fn push(&mut self, inst: MachineInst) {
        self.insts.push(inst);
    }

    pub fn successors(&self) -> &[BlockId] {
        &self.succs
    }

    pub fn is_successor(&self, block: BlockId) -> bool {
        self.succs.contains(&block)
    }

    pub fn add_successor(&mut self, block: BlockId) {
        if !self.succs.contains(&block) {
            self.succs.push(block);
        }
    }

    pub fn remove_successor(&mut self, block: BlockId) {
        self.succs.retain(|&succ| succ != block);
    }

    /// Replace the edge to `old` with an edge to `new`, keeping its position.
    pub fn replace_successor(&mut self, old: BlockId, new: BlockId) {
        if self.succs.contains(&new) {
            self.remove_successor(old);
            return;
        }
        for succ in &mut self.succs {
            if *succ == old {
                *succ = new;
            }
        }
    }
}

/// A function as a list of blocks in layout order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineFunction {
    name: String,
    blocks: Vec<MachineBlock>,
    layout: Vec<BlockId>,
}

impl MachineFunction {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            blocks: Vec::new(),
            layout: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Create a block in the arena without placing it in the layout.
    pub fn create_block(&mut self, name: &str) -> BlockId {
        let id = BlockId::from_index(self.blocks.len());
        self.blocks.push(MachineBlock::new(name.to_string()));
        id
    }

    /// Create a block named after `base` with a unique suffix.
    pub fn create_derived_block(&mut self, base: BlockId, suffix: &str) -> BlockId {
        let stem = format!("{}.{}", self.block(base).name, suffix);
        let mut name = stem.clone();
        let mut counter = 1;
        while self.blocks.iter().any(|b| b.name == name) {
            name = format!("{stem}{counter}");
            counter += 1;
        }
        self.create_block(&name)
    }

    /// Create a block and append it to the layout.
    pub fn push_block(&mut self, name: &str) -> BlockId {
        let id = self.create_block(name);
        self.blocks[id.index()].number = self.layout.len();
        self.layout.push(id);
        id
    }

    /// Place `block` in the layout immediately after `after`.
    pub fn insert_block_after(&mut self, after: BlockId, block: BlockId) {
        let pos = self
            .layout_position(after)
            .map(|p| p + 1)
            .unwrap_or(self.layout.len());
        self.layout.insert(pos, block);
    }

    pub fn layout(&self) -> &[BlockId] {
        &self.layout
    }

    pub fn layout_position(&self, block: BlockId) -> Option<usize> {
        self.layout.iter().position(|&b| b == block)
    }

    /// Block following `block` in the layout, i.e. its fallthrough.
    pub fn layout_successor(&self, block: BlockId) -> Option<BlockId> {
        self.layout_position(block)
            .and_then(|pos| self.layout.get(pos + 1).copied())
    }

    pub fn num_blocks(&self) -> usize {
        self.layout.len()
    }

    pub fn entry_block(&self) -> Option<BlockId> {
        self.layout.first().copied()
    }

    pub fn block(&self, id: BlockId) -> &MachineBlock {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut MachineBlock {
        &mut self.blocks[id.index()]
    }

    pub fn find_block(&self, name: &str) -> Option<BlockId> {
        self.layout
            .iter()
            .copied()
            .find(|&id| self.block(id).name == name)
    }

    pub fn inst(&self, loc: InstLoc) -> &MachineInst {
        &self.block(loc.block).insts[loc.index]
    }

    pub fn inst_mut(&mut self, loc: InstLoc) -> &mut MachineInst {
        &mut self.block_mut(loc.block).insts[loc.index]
    }

    /// Blocks in layout order.
    pub fn blocks(&self) -> impl Iterator<Item = (BlockId, &MachineBlock)> + '_ {
        self.layout.iter().map(move |&id| (id, self.block(id)))
    }

    pub fn predecessors(&self, block: BlockId) -> Vec<BlockId> {
        self.blocks()
            .filter(|(_, b)| b.is_successor(block))
            .map(|(id, _)| id)
            .collect()
    }

    /// Assign layout numbers `0..n` in layout order.
    pub fn renumber_blocks(&mut self) {
        for (number, id) in self.layout.iter().enumerate() {
            self.blocks[id.index()].number = number;
        }
    }

    /// Move every successor edge of `from` onto `to`.
    pub fn transfer_successors(&mut self, from: BlockId, to: BlockId) {
        let succs = std::mem::take(&mut self.block_mut(from).succs);
        for succ in succs {
            self.block_mut(to).add_successor(succ);
        }
    }

    /// Move instructions `start..` of `from` to the end of `to`.
    pub fn splice_tail(&mut self, from: BlockId, start: usize, to: BlockId) {
        let tail = self.block_mut(from).insts.split_off(start);
        self.block_mut(to).insts.extend(tail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> (MachineFunction, [BlockId; 3]) {
        let mut func = MachineFunction::new("f");
        let entry = func.push_block("entry");
        let then = func.push_block("then");
        let exit = func.push_block("exit");
        func.block_mut(entry)
            .push(MachineInst::new(Opcode::Beq).reg(Reg::A0).reg(Reg::Zero).block(exit));
        func.block_mut(entry).add_successor(exit);
        func.block_mut(entry).add_successor(then);
        func.block_mut(then).add_successor(exit);
        (func, [entry, then, exit])
    }

    #[test]
    fn test_insert_keeps_ids_and_defers_numbering() {
        let (mut func, [entry, then, exit]) = diamond();
        let new = func.create_derived_block(entry, "split");
        func.insert_block_after(entry, new);

        assert_eq!(func.layout(), &[entry, new, then, exit]);
        assert_eq!(func.block(then).number(), 1);

        func.renumber_blocks();
        assert_eq!(func.block(new).number(), 1);
        assert_eq!(func.block(then).number(), 2);
        assert_eq!(func.block(new).name(), "entry.split");
    }

    #[test]
    fn test_derived_block_names_are_unique() {
        let (mut func, [entry, ..]) = diamond();
        let a = func.create_derived_block(entry, "longbr");
        let b = func.create_derived_block(entry, "longbr");
        assert_eq!(func.block(a).name(), "entry.longbr");
        assert_eq!(func.block(b).name(), "entry.longbr1");
    }

    #[test]
    fn test_successor_edits() {
        let (mut func, [entry, then, exit]) = diamond();
        let new = func.create_block("new");
        func.transfer_successors(entry, new);
        assert!(func.block(entry).successors().is_empty());
        assert_eq!(func.block(new).successors(), &[exit, then]);

        func.block_mut(new).replace_successor(exit, entry);
        assert_eq!(func.block(new).successors(), &[entry, then]);
        assert_eq!(func.predecessors(exit), vec![then]);
    }

    #[test]
    fn test_retarget_branch() {
        let (mut func, [entry, then, exit]) = diamond();
        let loc = InstLoc { block: entry, index: 0 };
        assert_eq!(func.inst(loc).target_block(), Some(exit));
        assert!(func.inst_mut(loc).set_target_block(then));
        assert_eq!(func.inst(loc).target_block(), Some(then));
        assert!(!MachineInst::new(Opcode::Nop).set_target_block(then));
    }
}

//! Textual machine IR parser.

use hashbrown::HashMap;

use crate::core::{BlockId, InstLoc, InstrInfo, MachineFunction, MachineInst, Operand, SymbolModifier};
use crate::cpu0::{Opcode, Reg};
use crate::relax::split::last_bundle_head;

pub fn parse_functions<I: InstrInfo + ?Sized>(
    text: &str,
    ii: &I,
) -> Result<Vec<MachineFunction>, String> {
    Parser::new(text, ii).parse()
}

struct Parser<'a, 'i, I: ?Sized> {
    text: &'a str,
    pos: usize,
    ii: &'i I,

    // Per-function maps
    blocks: HashMap<&'a str, BlockId>,
    block_resolves: Vec<Resolve<'a>>,
}

/// Block operand naming a block that was not defined yet.
#[derive(Debug)]
struct Resolve<'a> {
    name: &'a str,
    loc: InstLoc,
    operand: usize,
}

impl<'a, 'i, I: InstrInfo + ?Sized> Parser<'a, 'i, I> {
    fn new(text: &'a str, ii: &'i I) -> Self {
        Self {
            text,
            pos: 0,
            ii,
            blocks: HashMap::new(),
            block_resolves: Vec::new(),
        }
    }

    fn parse(mut self) -> Result<Vec<MachineFunction>, String> {
        let mut funcs = Vec::new();
        self.skip_whitespace(true);

        while !self.is_eof() {
            let func = self
                .parse_function()
                .map_err(|e| format!("{} (line {})", e, self.line_number()))?;
            funcs.push(func);
            self.skip_whitespace(true);
        }

        Ok(funcs)
    }

    fn line_number(&self) -> usize {
        self.text[..self.pos].matches('\n').count() + 1
    }

    fn is_eof(&self) -> bool {
        self.pos >= self.text.len()
    }

    fn current_char(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn advance(&mut self) {
        if let Some(ch) = self.current_char() {
            self.pos += ch.len_utf8();
        }
    }

    /// Skip blanks and comments. Comments end before their newline.
    fn skip_whitespace(&mut self, skip_newlines: bool) {
        while let Some(ch) = self.current_char() {
            if ch == ';' {
                while let Some(ch) = self.current_char() {
                    if ch == '\n' {
                        break;
                    }
                    self.advance();
                }
            } else if ch.is_whitespace() {
                if ch == '\n' && !skip_newlines {
                    break;
                }
                self.advance();
            } else {
                break;
            }
        }
    }

    fn try_read(&mut self, ch: char) -> bool {
        self.skip_whitespace(false);
        if self.current_char() == Some(ch) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> Result<(), String> {
        if !self.try_read(ch) {
            return Err(format!(
                "Expected '{}' but found {:?}",
                ch,
                self.current_char()
            ));
        }
        Ok(())
    }

    fn read_identifier(&mut self) -> Result<&'a str, String> {
        self.skip_whitespace(false);
        let start = self.pos;

        match self.current_char() {
            Some(ch) if ch.is_alphabetic() || ch == '_' || ch == '.' => {}
            Some(ch) => return Err(format!("Expected identifier but found '{}'", ch)),
            None => return Err("Expected identifier but found EOF".to_string()),
        }

        while let Some(ch) = self.current_char() {
            if ch.is_alphanumeric() || ch == '_' || ch == '.' {
                self.advance();
            } else {
                break;
            }
        }

        Ok(&self.text[start..self.pos])
    }

    fn read_number(&mut self) -> Result<i64, String> {
        self.skip_whitespace(false);
        let negative = self.current_char() == Some('-');
        if negative {
            self.advance();
        }

        let start = self.pos;
        let is_hex = self.text[self.pos..].starts_with("0x") || self.text[self.pos..].starts_with("0X");
        if is_hex {
            self.pos += 2;
        }
        let digits_start = self.pos;
        while let Some(ch) = self.current_char() {
            if (is_hex && ch.is_ascii_hexdigit()) || ch.is_ascii_digit() {
                self.advance();
            } else {
                break;
            }
        }

        let digits = &self.text[digits_start..self.pos];
        if digits.is_empty() {
            return Err(format!("Expected number at '{}'", &self.text[start..self.pos]));
        }
        let value = if is_hex {
            u64::from_str_radix(digits, 16).map(|v| v as i64)
        } else {
            digits.parse::<i64>()
        }
        .map_err(|e| format!("Invalid number '{}': {}", digits, e))?;

        Ok(if negative { value.wrapping_neg() } else { value })
    }

    fn parse_function(&mut self) -> Result<MachineFunction, String> {
        self.blocks.clear();
        self.block_resolves.clear();

        let name = self.read_identifier()?;
        self.expect('{')?;
        let mut func = MachineFunction::new(name);
        let mut current: Option<BlockId> = None;

        loop {
            self.skip_whitespace(true);
            match self.current_char() {
                None => return Err(format!("Unexpected end of input in function {}", name)),
                Some('}') => {
                    self.advance();
                    break;
                }
                Some('+') => {
                    self.advance();
                    let block = current.ok_or("Bundled instruction outside of a block")?;
                    let prev = func
                        .block_mut(block)
                        .insts_mut()
                        .last_mut()
                        .ok_or("Bundled instruction without a leader")?;
                    prev.bundled_with_succ = true;
                    let ident = self.read_identifier()?;
                    self.parse_instruction(&mut func, block, ident)?;
                }
                Some(_) => {
                    let ident = self.read_identifier()?;
                    if self.try_read(':') {
                        if self.blocks.contains_key(ident) {
                            return Err(format!("Duplicate block '{}'", ident));
                        }
                        let block = func.push_block(ident);
                        self.blocks.insert(ident, block);
                        current = Some(block);
                    } else {
                        let block = current.ok_or_else(|| {
                            format!("Instruction '{}' outside of a block", ident)
                        })?;
                        self.parse_instruction(&mut func, block, ident)?;
                    }
                }
            }
        }

        self.resolve_block_references(&mut func)?;
        derive_successors(&mut func, self.ii);
        Ok(func)
    }

    fn parse_instruction(
        &mut self,
        func: &mut MachineFunction,
        block: BlockId,
        mnemonic: &'a str,
    ) -> Result<(), String> {
        let opcode =
            Opcode::parse(mnemonic).ok_or_else(|| format!("Unknown opcode '{}'", mnemonic))?;
        let loc = InstLoc {
            block,
            index: func.block(block).insts().len(),
        };
        let mut inst = MachineInst::new(opcode);

        self.skip_whitespace(false);
        if !matches!(self.current_char(), None | Some('\n') | Some('}')) {
            loop {
                let operand = self.parse_operand(loc, inst.operands.len())?;
                inst.operands.push(operand);
                if !self.try_read(',') {
                    break;
                }
            }
        }

        self.skip_whitespace(false);
        match self.current_char() {
            None | Some('\n') | Some('}') => {}
            Some(ch) => return Err(format!("Unexpected '{}' after {} operands", ch, opcode)),
        }

        func.block_mut(block).push(inst);
        Ok(())
    }

    fn parse_operand(&mut self, loc: InstLoc, index: usize) -> Result<Operand, String> {
        self.skip_whitespace(false);
        match self.current_char() {
            Some('$') => {
                self.advance();
                let name = self.read_identifier()?;
                Reg::from_name(name)
                    .map(Operand::Reg)
                    .ok_or_else(|| format!("Unknown register '${}'", name))
            }
            Some('^') => {
                self.advance();
                let name = self.read_identifier()?;
                match self.blocks.get(name) {
                    Some(&id) => Ok(Operand::Block(id)),
                    None => {
                        self.block_resolves.push(Resolve {
                            name,
                            loc,
                            operand: index,
                        });
                        Ok(Operand::Block(BlockId::from_index(0)))
                    }
                }
            }
            Some('%') => {
                self.advance();
                let modifier = match self.read_identifier()? {
                    "hi" => SymbolModifier::Hi,
                    "lo" => SymbolModifier::Lo,
                    other => return Err(format!("Unknown symbol modifier '%{}'", other)),
                };
                self.expect('(')?;
                let name = self.read_identifier()?;
                self.expect(')')?;
                Ok(Operand::Symbol {
                    name: name.to_string(),
                    modifier,
                })
            }
            Some(ch) if ch == '-' || ch.is_ascii_digit() => self.read_number().map(Operand::Imm),
            Some(ch) => Err(format!("Unexpected '{}' in operand", ch)),
            None => Err("Expected operand but found EOF".to_string()),
        }
    }

    fn resolve_block_references(&mut self, func: &mut MachineFunction) -> Result<(), String> {
        for resolve in self.block_resolves.drain(..) {
            let id = *self
                .blocks
                .get(resolve.name)
                .ok_or_else(|| format!("Undefined block '^{}'", resolve.name))?;
            func.inst_mut(resolve.loc).operands[resolve.operand] = Operand::Block(id);
        }
        Ok(())
    }
}

/// Branch targets in instruction order, then the layout fallthrough unless the
/// block ends in a barrier.
fn derive_successors<I: InstrInfo + ?Sized>(func: &mut MachineFunction, ii: &I) {
    let layout: Vec<BlockId> = func.layout().to_vec();

    for (pos, &id) in layout.iter().enumerate() {
        let insts = func.block(id).insts();
        let mut succs: Vec<BlockId> = insts
            .iter()
            .filter(|inst| ii.is_branch(inst))
            .flat_map(|inst| inst.block_operands())
            .collect();

        let falls_through = match last_bundle_head(ii, insts, insts.len()) {
            Some(last) => !ii.is_barrier(&insts[last]),
            None => true,
        };
        if falls_through {
            if let Some(&next) = layout.get(pos + 1) {
                succs.push(next);
            }
        }

        for succ in succs {
            func.block_mut(id).add_successor(succ);
        }
    }
}

// Shared helpers for the integration tests: builders for functions with precisely
// sized gaps between branches, and a small control-flow simulator. The simulator walks
// a function from its entry block, deciding conditional branches from a fixed register
// environment, and records the names of the blocks it enters. Blocks created by the
// relaxation pass carry a dotted suffix (".split", ".longbr", ".baltgt") and are left
// out of the trace, so a function and its relaxed form must produce identical traces.
// Long-branch sequences are executed for real: the pseudos and their lowered lui/addiu
// forms compute $at from block byte offsets, bal sets $lr, and jr jumps by address.

#![allow(dead_code)]

use hashbrown::HashMap;

use cpu0_legalize::core::bits::sign_extend;
use cpu0_legalize::cpu0::{Cpu0InstrInfo, Opcode, Reg};
use cpu0_legalize::fixup::{block_offsets, FixupKind};
use cpu0_legalize::{BlockId, InstrInfo, MachineFunction, MachineInst, Operand};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn nops(func: &mut MachineFunction, block: BlockId, count: usize) {
    for _ in 0..count {
        func.block_mut(block).push(MachineInst::new(Opcode::Nop));
    }
}

/// Total encoded size of the function.
pub fn code_size(func: &MachineFunction) -> u64 {
    let ii = Cpu0InstrInfo::new();
    func.blocks().map(|(_, b)| ii.insts_size(b.insts())).sum()
}

/// How the simulated walk ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Returned,
    FellOffEnd,
    StepLimit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    pub blocks: Vec<String>,
    pub outcome: Outcome,
}

/// Register values that decide conditional branches.
#[derive(Debug, Clone, Default)]
pub struct Env {
    pub regs: HashMap<Reg, i64>,
}

impl Env {
    pub fn new(values: &[(Reg, i64)]) -> Self {
        Self {
            regs: values.iter().copied().collect(),
        }
    }

    fn get(&self, reg: Reg) -> i64 {
        if reg == Reg::Zero {
            return 0;
        }
        self.regs.get(&reg).copied().unwrap_or(0)
    }
}

fn imm_operand(inst: &MachineInst) -> Option<i64> {
    inst.operands.iter().find_map(|op| match op {
        Operand::Imm(imm) => Some(*imm),
        _ => None,
    })
}

fn condition_holds(inst: &MachineInst, env: &Env) -> bool {
    let regs: Vec<Reg> = inst.reg_operands().collect();
    let lhs = env.get(regs[0]);
    let rhs = regs.get(1).map(|&r| env.get(r)).unwrap_or(0);
    match inst.opcode {
        Opcode::Beq => lhs == rhs,
        Opcode::Bne => lhs != rhs,
        Opcode::Jeq => lhs == 0,
        Opcode::Jne => lhs != 0,
        Opcode::Jlt => lhs < 0,
        Opcode::Jge => lhs >= 0,
        Opcode::Jgt => lhs > 0,
        Opcode::Jle => lhs <= 0,
        other => panic!("{} is not a conditional branch", other),
    }
}

/// Walk `func` from its entry under `env`.
pub fn simulate(func: &MachineFunction, env: &Env, max_steps: usize) -> Trace {
    let ii = Cpu0InstrInfo::new();
    let offsets = block_offsets(func, &ii);
    let mut by_address: HashMap<u64, BlockId> = HashMap::new();
    for &id in func.layout().iter().rev() {
        by_address.insert(offsets[&id], id);
    }

    let mut env = env.clone();
    let mut trace = Trace {
        blocks: Vec::new(),
        outcome: Outcome::StepLimit,
    };
    let Some(mut block) = func.entry_block() else {
        trace.outcome = Outcome::FellOffEnd;
        return trace;
    };

    for _ in 0..max_steps {
        let name = func.block(block).name();
        if !name.contains('.') {
            trace.blocks.push(name.to_string());
        }

        let mut address = offsets[&block];
        let mut next: Option<BlockId> = None;

        for inst in func.block(block).insts() {
            let here = address;
            address += ii.inst_size(inst);
            let regs: Vec<Reg> = inst.reg_operands().collect();

            match inst.opcode {
                Opcode::Ret => {
                    trace.outcome = Outcome::Returned;
                    return trace;
                }
                Opcode::Jmp => {
                    next = inst.target_block();
                    break;
                }
                Opcode::Bal => {
                    env.regs.insert(Reg::Lr, (here + 4) as i64);
                    next = inst.target_block();
                    break;
                }
                Opcode::Jr => {
                    let target = env.get(regs[0]) as u64;
                    next = Some(by_address[&target]);
                    break;
                }
                Opcode::LongBranchLui | Opcode::LongBranchAddiu => {
                    let blocks: Vec<BlockId> = inst.block_operands().collect();
                    let d = offsets[&blocks[0]] as i64 - offsets[&blocks[1]] as i64;
                    let value = if inst.opcode == Opcode::LongBranchLui {
                        sign_extend(16, FixupKind::Hi16.adjust(d) as u64) << 16
                    } else {
                        env.get(regs[1]) + sign_extend(16, FixupKind::Lo16.adjust(d) as u64)
                    };
                    env.regs.insert(regs[0], value);
                }
                Opcode::Lui => {
                    if let Some(imm) = imm_operand(inst) {
                        env.regs.insert(regs[0], sign_extend(16, imm as u64) << 16);
                    }
                }
                Opcode::Addiu => {
                    if let Some(imm) = imm_operand(inst) {
                        let value = env.get(regs[1]) + imm;
                        env.regs.insert(regs[0], value);
                    }
                }
                Opcode::Addu => {
                    let value = env.get(regs[1]) + env.get(regs[2]);
                    env.regs.insert(regs[0], value);
                }
                _ if ii.is_conditional_branch(inst) => {
                    if condition_holds(inst, &env) {
                        next = inst.target_block();
                        break;
                    }
                }
                _ => {}
            }
        }

        block = match next.or_else(|| func.layout_successor(block)) {
            Some(b) => b,
            None => {
                trace.outcome = Outcome::FellOffEnd;
                return trace;
            }
        };
    }

    trace
}

use crate::encoding::InstructionClass;

/// Instruction and dispatch forms that have fixed cycle costs in the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CycleCostKind {
    /// Register and immediate moves.
    Move,
    /// Memory reads.
    Load,
    /// Memory writes.
    Store,
    /// Integer add/sub/compare/extend class.
    Arithmetic,
    /// Integer multiply and multiply-accumulate.
    Multiply,
    /// Bitwise logic.
    Logic,
    /// Shifts and rotates.
    Shift,
    /// Conditional branch when the predicate is false.
    BranchNotTaken,
    /// Taken branch, jump, call or return.
    BranchTaken,
    /// Flag, cache-hint and control-register store class.
    System,
    /// Control-register loads (`LDC`).
    ControlLoad,
    /// FPU register moves and sign operations.
    FpuMove,
    /// FPU add/multiply/convert class.
    FpuArith,
    /// FPU divide, square root and matrix class.
    FpuComplex,
    /// General exception entry sequence.
    ExceptionEntry,
    /// Interrupt entry sequence.
    InterruptEntry,
}

/// Single source-of-truth cycle-cost table.
pub const CYCLE_COST_TABLE: &[(CycleCostKind, u16)] = &[
    (CycleCostKind::Move, 1),
    (CycleCostKind::Load, 2),
    (CycleCostKind::Store, 1),
    (CycleCostKind::Arithmetic, 1),
    (CycleCostKind::Multiply, 2),
    (CycleCostKind::Logic, 1),
    (CycleCostKind::Shift, 1),
    (CycleCostKind::BranchNotTaken, 1),
    (CycleCostKind::BranchTaken, 2),
    (CycleCostKind::System, 1),
    (CycleCostKind::ControlLoad, 4),
    (CycleCostKind::FpuMove, 1),
    (CycleCostKind::FpuArith, 1),
    (CycleCostKind::FpuComplex, 10),
    (CycleCostKind::ExceptionEntry, 5),
    (CycleCostKind::InterruptEntry, 5),
];

/// Looks up the cycle cost for a cycle-cost kind.
#[must_use]
pub fn cycle_cost(kind: CycleCostKind) -> Option<u16> {
    CYCLE_COST_TABLE
        .iter()
        .find_map(|(entry_kind, cycles)| (*entry_kind == kind).then_some(*cycles))
}

/// Cost kind charged for an executed instruction of `class`.
#[must_use]
pub const fn kind_for(class: InstructionClass, branch_taken: bool) -> CycleCostKind {
    match class {
        InstructionClass::Move => CycleCostKind::Move,
        InstructionClass::Load => CycleCostKind::Load,
        InstructionClass::Store => CycleCostKind::Store,
        InstructionClass::Arithmetic => CycleCostKind::Arithmetic,
        InstructionClass::Multiply => CycleCostKind::Multiply,
        InstructionClass::Logic => CycleCostKind::Logic,
        InstructionClass::Shift => CycleCostKind::Shift,
        InstructionClass::Branch if branch_taken => CycleCostKind::BranchTaken,
        InstructionClass::Branch => CycleCostKind::BranchNotTaken,
        InstructionClass::System => CycleCostKind::System,
        InstructionClass::ControlLoad => CycleCostKind::ControlLoad,
        InstructionClass::FpuMove => CycleCostKind::FpuMove,
        InstructionClass::FpuArith => CycleCostKind::FpuArith,
        InstructionClass::FpuComplex => CycleCostKind::FpuComplex,
    }
}

/// Cycles charged for one instruction; never zero.
#[must_use]
pub fn instruction_cycles(class: InstructionClass, branch_taken: bool) -> u64 {
    cycle_cost(kind_for(class, branch_taken)).map_or(1, |cycles| u64::from(cycles.max(1)))
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{cycle_cost, instruction_cycles, CycleCostKind, CYCLE_COST_TABLE};
    use crate::encoding::{InstructionClass, OPCODE_TABLE};

    #[test]
    fn table_contains_unique_kinds() {
        let kinds: HashSet<_> = CYCLE_COST_TABLE.iter().map(|(kind, _)| *kind).collect();
        assert_eq!(kinds.len(), CYCLE_COST_TABLE.len());
    }

    #[test]
    fn table_values_match_canonical_costs() {
        assert_eq!(cycle_cost(CycleCostKind::Move), Some(1));
        assert_eq!(cycle_cost(CycleCostKind::Load), Some(2));
        assert_eq!(cycle_cost(CycleCostKind::BranchNotTaken), Some(1));
        assert_eq!(cycle_cost(CycleCostKind::BranchTaken), Some(2));
        assert_eq!(cycle_cost(CycleCostKind::ExceptionEntry), Some(5));
    }

    #[test]
    fn every_table_entry_resolves_via_lookup() {
        for (kind, expected_cycles) in CYCLE_COST_TABLE {
            assert_eq!(cycle_cost(*kind), Some(*expected_cycles));
        }
    }

    #[test]
    fn every_instruction_costs_at_least_one_cycle() {
        for def in OPCODE_TABLE {
            assert!(instruction_cycles(def.class, true) >= 1);
            assert!(instruction_cycles(def.class, false) >= 1);
        }
        assert!(
            instruction_cycles(InstructionClass::Branch, true)
                > instruction_cycles(InstructionClass::Branch, false)
        );
    }
}

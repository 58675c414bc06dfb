use crate::constants::MAX_GENOME_LENGTH;
use crate::error::GenomeError;
use crate::instruction::{Instruction, InstructionCatalog, Opcode};
use rand::Rng;
use std::fmt;

/// Wire size of a genome: every live instruction plus the zero sentinel.
pub const GENOME_BYTES: usize = MAX_GENOME_LENGTH + 1;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MutationKind {
    Insert,
    Modify,
    Delete,
    Swap,
}

impl MutationKind {
    pub const ALL: [MutationKind; 4] = [
        MutationKind::Insert,
        MutationKind::Modify,
        MutationKind::Delete,
        MutationKind::Swap,
    ];
}

/// An ordered program of 1..=`MAX_GENOME_LENGTH` instructions.
///
/// Stored in its wire form so genomes are cheap to copy, hash and persist.
/// A genome built through the public API is never empty.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Genome {
    code: [u8; GENOME_BYTES],
}

impl Genome {
    /// Copies up to `MAX_GENOME_LENGTH` instructions; extra ones are dropped.
    pub fn new(instructions: &[Instruction]) -> Result<Self, GenomeError> {
        if instructions.is_empty() {
            return Err(GenomeError::Empty);
        }
        let mut code = [0u8; GENOME_BYTES];
        for (slot, ins) in code
            .iter_mut()
            .zip(instructions.iter().take(MAX_GENOME_LENGTH))
        {
            *slot = ins.to_byte();
        }
        Ok(Self { code })
    }

    pub fn plant() -> Self {
        let mut code = [0u8; GENOME_BYTES];
        code[0] = Instruction::always(Opcode::Photosynthesize).to_byte();
        Self { code }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GenomeError> {
        let mut code = [0u8; GENOME_BYTES];
        for (position, &byte) in bytes.iter().take(MAX_GENOME_LENGTH).enumerate() {
            if byte == 0 {
                break;
            }
            if Instruction::from_byte(byte).is_none() {
                return Err(GenomeError::InvalidInstruction { position, byte });
            }
            code[position] = byte;
        }
        if code[0] == 0 {
            return Err(GenomeError::Empty);
        }
        Ok(Self { code })
    }

    #[inline]
    pub fn to_bytes(&self) -> [u8; GENOME_BYTES] {
        self.code
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.code.iter().position(|&b| b == 0).unwrap_or(MAX_GENOME_LENGTH)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.code[0] == 0
    }

    pub fn get(&self, index: usize) -> Option<Instruction> {
        if index >= self.len() {
            return None;
        }
        Instruction::from_byte(self.code[index])
    }

    pub fn iter(&self) -> impl Iterator<Item = Instruction> + '_ {
        self.code
            .iter()
            .take_while(|&&b| b != 0)
            .filter_map(|&b| Instruction::from_byte(b))
    }

    pub fn count(&self, opcode: Opcode) -> usize {
        self.iter().filter(|ins| ins.opcode == opcode).count()
    }

    /// Motile genomes contain at least one movement instruction.
    pub fn is_motile(&self) -> bool {
        self.iter().any(|ins| ins.opcode.is_movement())
    }

    /// Applies one uniformly chosen mutation and returns the offspring genome.
    pub fn mutate<R: Rng + ?Sized>(
        &self,
        catalog: &InstructionCatalog,
        rng: &mut R,
    ) -> Result<Self, GenomeError> {
        let kind = MutationKind::ALL[rng.gen_range(0..MutationKind::ALL.len())];
        self.mutate_with(kind, catalog, rng)
    }

    pub fn mutate_with<R: Rng + ?Sized>(
        &self,
        kind: MutationKind,
        catalog: &InstructionCatalog,
        rng: &mut R,
    ) -> Result<Self, GenomeError> {
        let mut program: Vec<Instruction> = self.iter().collect();
        let len = program.len();
        match kind {
            MutationKind::Insert => {
                if len < MAX_GENOME_LENGTH - 1 {
                    let at = rng.gen_range(0..=len);
                    program.insert(at, catalog.random_instruction(rng)?);
                }
            }
            MutationKind::Modify => {
                if len > 0 {
                    let at = rng.gen_range(0..len);
                    let fresh = catalog.random_instruction(rng)?;
                    if rng.gen_bool(0.5) {
                        program[at].opcode = fresh.opcode;
                    } else if program[at].opcode.supports_conditions() {
                        program[at].condition = fresh.condition;
                    }
                }
            }
            MutationKind::Delete => {
                if len > 1 {
                    program.remove(rng.gen_range(0..len));
                }
            }
            MutationKind::Swap => {
                if len > 1 {
                    let at = rng.gen_range(0..len - 1);
                    program.swap(at, at + 1);
                }
            }
        }
        if program.is_empty() {
            return Err(GenomeError::MutatedToEmpty);
        }
        Self::new(&program)
    }
}

impl fmt::Debug for Genome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Genome({self})")
    }
}

impl fmt::Display for Genome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, ins) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{ins}")?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instruction::Condition;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn program(len: usize) -> Genome {
        let ops = [Opcode::Move, Opcode::TurnLeft, Opcode::Photosynthesize];
        let seq: Vec<Instruction> = (0..len)
            .map(|i| Instruction::always(ops[i % ops.len()]))
            .collect();
        Genome::new(&seq).unwrap()
    }

    #[test]
    fn new_rejects_empty_sequences() {
        assert_eq!(Genome::new(&[]), Err(GenomeError::Empty));
    }

    #[test]
    fn new_truncates_to_capacity() {
        let seq = vec![Instruction::always(Opcode::Move); MAX_GENOME_LENGTH + 4];
        let genome = Genome::new(&seq).unwrap();
        assert_eq!(genome.len(), MAX_GENOME_LENGTH);
        assert_eq!(genome.to_bytes()[MAX_GENOME_LENGTH], 0);
    }

    #[test]
    fn wire_form_is_sentinel_terminated() {
        let genome = Genome::new(&[
            Instruction::new(Opcode::TurnLeft, Condition::If),
            Instruction::always(Opcode::Move),
        ])
        .unwrap();
        let bytes = genome.to_bytes();
        assert_eq!(bytes[2], 0);
        assert_eq!(Genome::from_bytes(&bytes).unwrap(), genome);
        assert_eq!(Genome::from_bytes(&bytes[..2]).unwrap(), genome);
    }

    #[test]
    fn from_bytes_reports_bad_instructions() {
        assert_eq!(Genome::from_bytes(&[0]), Err(GenomeError::Empty));
        assert_eq!(
            Genome::from_bytes(&[1, 0x7f]),
            Err(GenomeError::InvalidInstruction {
                position: 1,
                byte: 0x7f
            })
        );
    }

    #[test]
    fn every_mutation_branch_respects_length_bounds() {
        let catalog = InstructionCatalog::default();
        for seed in 0..64u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            for len in 1..=MAX_GENOME_LENGTH {
                let parent = program(len);
                for &kind in &MutationKind::ALL {
                    let child = parent.mutate_with(kind, &catalog, &mut rng).unwrap();
                    assert!(!child.is_empty());
                    assert!((1..=MAX_GENOME_LENGTH).contains(&child.len()));
                    let expected = match kind {
                        MutationKind::Insert if len < MAX_GENOME_LENGTH - 1 => len + 1,
                        MutationKind::Delete if len > 1 => len - 1,
                        _ => len,
                    };
                    assert_eq!(child.len(), expected, "{kind:?} on length {len}");
                }
            }
        }
    }

    #[test]
    fn repeated_random_mutation_stays_in_bounds() {
        let catalog = InstructionCatalog::default();
        let mut rng = StdRng::seed_from_u64(99);
        let mut genome = Genome::plant();
        for _ in 0..2_000 {
            genome = genome.mutate(&catalog, &mut rng).unwrap();
            assert!((1..=MAX_GENOME_LENGTH).contains(&genome.len()));
        }
    }

    #[test]
    fn swap_on_single_instruction_is_a_copy() {
        let catalog = InstructionCatalog::default();
        let mut rng = StdRng::seed_from_u64(3);
        let genome = Genome::plant();
        let child = genome
            .mutate_with(MutationKind::Swap, &catalog, &mut rng)
            .unwrap();
        assert_eq!(child, genome);
    }

    #[test]
    fn modify_keeps_photosynthesize_condition() {
        let mut catalog = InstructionCatalog::empty();
        catalog.set_available(Opcode::Photosynthesize, true);
        let genome = Genome::plant();
        for seed in 0..32 {
            let mut rng = StdRng::seed_from_u64(seed);
            let child = genome
                .mutate_with(MutationKind::Modify, &catalog, &mut rng)
                .unwrap();
            assert_eq!(child.get(0), Some(Instruction::always(Opcode::Photosynthesize)));
        }
    }

    #[test]
    fn display_lists_mnemonics() {
        let genome = Genome::new(&[
            Instruction::always(Opcode::Photosynthesize),
            Instruction::new(Opcode::Move, Condition::NotIf),
        ])
        .unwrap();
        assert_eq!(genome.to_string(), "[photo ifnot:move]");
    }
}

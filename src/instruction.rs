use crate::error::CatalogError;
use rand::Rng;
use std::fmt;

const OPCODE_MASK: u8 = 0b0001_1111;
const CONDITION_SHIFT: u32 = 5;
const CONDITION_MASK: u8 = 0b0110_0000;

pub const OPCODE_COUNT: usize = 16;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Opcode {
    Move = 1,
    MoveAndEat,
    TurnLeft,
    TurnRight,
    HardTurnLeft,
    HardTurnRight,
    Sleep,
    Hyper,
    Photosynthesize,
    TestSeeFood,
    TestBlocked,
    TestPreyedOn,
    TestOccluded,
    SetAnchored,
    ClearAnchored,
    Barrier,
}

impl Opcode {
    pub const ALL: [Opcode; OPCODE_COUNT] = [
        Opcode::Move,
        Opcode::MoveAndEat,
        Opcode::TurnLeft,
        Opcode::TurnRight,
        Opcode::HardTurnLeft,
        Opcode::HardTurnRight,
        Opcode::Sleep,
        Opcode::Hyper,
        Opcode::Photosynthesize,
        Opcode::TestSeeFood,
        Opcode::TestBlocked,
        Opcode::TestPreyedOn,
        Opcode::TestOccluded,
        Opcode::SetAnchored,
        Opcode::ClearAnchored,
        Opcode::Barrier,
    ];

    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get((code as usize).checked_sub(1)?).copied()
    }

    #[inline]
    pub fn is_movement(self) -> bool {
        matches!(self, Opcode::Move | Opcode::MoveAndEat)
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Move => "move",
            Opcode::MoveAndEat => "move-eat",
            Opcode::TurnLeft => "turn-left",
            Opcode::TurnRight => "turn-right",
            Opcode::HardTurnLeft => "hard-left",
            Opcode::HardTurnRight => "hard-right",
            Opcode::Sleep => "sleep",
            Opcode::Hyper => "hyper",
            Opcode::Photosynthesize => "photo",
            Opcode::TestSeeFood => "see-food?",
            Opcode::TestBlocked => "blocked?",
            Opcode::TestPreyedOn => "preyed-on?",
            Opcode::TestOccluded => "occluded?",
            Opcode::SetAnchored => "anchor",
            Opcode::ClearAnchored => "unanchor",
            Opcode::Barrier => "barrier",
        }
    }

    /// Whether the condition half of an instruction means anything for this opcode.
    #[inline]
    pub fn supports_conditions(self) -> bool {
        self != Opcode::Photosynthesize
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum Condition {
    #[default]
    Always,
    If,
    NotIf,
}

impl Condition {
    pub const ALL: [Condition; 3] = [Condition::Always, Condition::If, Condition::NotIf];

    fn bits(self) -> u8 {
        match self {
            Condition::Always => 0,
            Condition::If => 1,
            Condition::NotIf => 2,
        }
    }

    fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Condition::Always),
            1 => Some(Condition::If),
            2 => Some(Condition::NotIf),
            _ => None,
        }
    }

    /// Whether an instruction guarded by this condition runs given the flag.
    #[inline]
    pub fn permits(self, flag: bool) -> bool {
        match self {
            Condition::Always => true,
            Condition::If => flag,
            Condition::NotIf => !flag,
        }
    }
}

/// One genome instruction: an opcode plus the condition that gates it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub opcode: Opcode,
    pub condition: Condition,
}

impl Instruction {
    pub const fn new(opcode: Opcode, condition: Condition) -> Self {
        Self { opcode, condition }
    }

    pub const fn always(opcode: Opcode) -> Self {
        Self::new(opcode, Condition::Always)
    }

    /// Packs the instruction into its wire byte. Never zero.
    #[inline]
    pub fn to_byte(self) -> u8 {
        self.opcode.code() | (self.condition.bits() << CONDITION_SHIFT)
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        let opcode = Opcode::from_code(byte & OPCODE_MASK)?;
        if byte & !(OPCODE_MASK | CONDITION_MASK) != 0 {
            return None;
        }
        let condition = Condition::from_bits((byte & CONDITION_MASK) >> CONDITION_SHIFT)?;
        Some(Self { opcode, condition })
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.condition {
            Condition::Always => write!(f, "{}", self.opcode),
            Condition::If => write!(f, "if:{}", self.opcode),
            Condition::NotIf => write!(f, "ifnot:{}", self.opcode),
        }
    }
}

/// The set of opcodes random mutation is allowed to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionCatalog {
    available: [bool; OPCODE_COUNT],
}

impl Default for InstructionCatalog {
    fn default() -> Self {
        let mut catalog = Self {
            available: [true; OPCODE_COUNT],
        };
        // Barriers are placed by control code, never evolved.
        catalog.set_available(Opcode::Barrier, false);
        catalog
    }
}

impl InstructionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog with nothing selectable.
    pub fn empty() -> Self {
        Self {
            available: [false; OPCODE_COUNT],
        }
    }

    pub fn set_available(&mut self, opcode: Opcode, available: bool) {
        self.available[opcode.code() as usize - 1] = available;
    }

    #[inline]
    pub fn is_available(&self, opcode: Opcode) -> bool {
        self.available[opcode.code() as usize - 1]
    }

    pub fn available(&self) -> impl Iterator<Item = Opcode> + '_ {
        Opcode::ALL
            .iter()
            .copied()
            .filter(|&op| self.is_available(op))
    }

    pub fn random_opcode<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Opcode, CatalogError> {
        let count = self.available().count();
        if count == 0 {
            return Err(CatalogError::NothingAvailable);
        }
        let pick = rng.gen_range(0..count);
        self.available()
            .nth(pick)
            .ok_or(CatalogError::NothingAvailable)
    }

    pub fn random_instruction<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
    ) -> Result<Instruction, CatalogError> {
        let opcode = self.random_opcode(rng)?;
        let condition = Condition::ALL[rng.gen_range(0..Condition::ALL.len())];
        Ok(Instruction { opcode, condition })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn wire_bytes_are_never_the_sentinel() {
        for &opcode in &Opcode::ALL {
            for &condition in &Condition::ALL {
                let ins = Instruction::new(opcode, condition);
                assert_ne!(ins.to_byte(), 0);
                assert_eq!(Instruction::from_byte(ins.to_byte()), Some(ins));
            }
        }
    }

    #[test]
    fn rejects_unknown_bytes() {
        assert_eq!(Instruction::from_byte(0), None);
        assert_eq!(Instruction::from_byte(17), None);
        assert_eq!(Instruction::from_byte(0b0110_0001), None);
        assert_eq!(Instruction::from_byte(0b1000_0001), None);
    }

    #[test]
    fn random_opcode_only_returns_available_opcodes() {
        let mut catalog = InstructionCatalog::empty();
        catalog.set_available(Opcode::TurnLeft, true);
        catalog.set_available(Opcode::Sleep, true);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let op = catalog.random_opcode(&mut rng).unwrap();
            assert!(op == Opcode::TurnLeft || op == Opcode::Sleep);
        }
    }

    #[test]
    fn random_opcode_fails_when_nothing_is_available() {
        let catalog = InstructionCatalog::empty();
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            catalog.random_opcode(&mut rng),
            Err(CatalogError::NothingAvailable)
        );
    }

    #[test]
    fn default_catalog_excludes_barriers() {
        let catalog = InstructionCatalog::default();
        assert!(!catalog.is_available(Opcode::Barrier));
        assert_eq!(catalog.available().count(), Opcode::ALL.len() - 1);
    }

    #[test]
    fn photosynthesize_ignores_conditions() {
        assert!(!Opcode::Photosynthesize.supports_conditions());
        assert!(Opcode::MoveAndEat.supports_conditions());
    }
}

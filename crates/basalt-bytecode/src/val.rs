//! Runtime values and the bounded 256-bit integer types.

use core::fmt;

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{ToPrimitive, Zero};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::Instr;

fn i256_upper() -> BigInt {
    BigInt::from(1) << 255
}

/// An unsigned 256-bit integer.
///
/// The wrapped [`BigUint`] is always `< 2^256`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct U256(BigUint);

impl U256 {
    pub fn new(value: BigUint) -> Option<U256> {
        if value.bits() <= 256 {
            Some(U256(value))
        } else {
            None
        }
    }

    pub fn zero() -> U256 {
        U256(BigUint::zero())
    }

    pub fn inner(&self) -> &BigUint {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn to_usize(&self) -> Option<usize> {
        self.0.to_usize()
    }

    pub fn checked_add(&self, rhs: &U256) -> Option<U256> {
        U256::new(&self.0 + &rhs.0)
    }

    pub fn checked_sub(&self, rhs: &U256) -> Option<U256> {
        if self.0 < rhs.0 {
            None
        } else {
            Some(U256(&self.0 - &rhs.0))
        }
    }

    pub fn checked_mul(&self, rhs: &U256) -> Option<U256> {
        U256::new(&self.0 * &rhs.0)
    }

    pub fn checked_div(&self, rhs: &U256) -> Option<U256> {
        if rhs.0.is_zero() {
            None
        } else {
            Some(U256(&self.0 / &rhs.0))
        }
    }

    pub fn checked_rem(&self, rhs: &U256) -> Option<U256> {
        if rhs.0.is_zero() {
            None
        } else {
            Some(U256(&self.0 % &rhs.0))
        }
    }
}

impl From<u64> for U256 {
    fn from(value: u64) -> U256 {
        U256(BigUint::from(value))
    }
}

impl From<usize> for U256 {
    fn from(value: usize) -> U256 {
        U256(BigUint::from(value))
    }
}

impl fmt::Display for U256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A signed 256-bit integer.
///
/// The wrapped [`BigInt`] is always in `[-2^255, 2^255)`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct I256(BigInt);

impl I256 {
    pub fn new(value: BigInt) -> Option<I256> {
        let upper = i256_upper();
        if value >= -upper.clone() && value < upper {
            Some(I256(value))
        } else {
            None
        }
    }

    pub fn zero() -> I256 {
        I256(BigInt::zero())
    }

    pub fn inner(&self) -> &BigInt {
        &self.0
    }

    pub fn is_negative(&self) -> bool {
        self.0.sign() == Sign::Minus
    }

    pub fn checked_add(&self, rhs: &I256) -> Option<I256> {
        I256::new(&self.0 + &rhs.0)
    }

    pub fn checked_sub(&self, rhs: &I256) -> Option<I256> {
        I256::new(&self.0 - &rhs.0)
    }

    pub fn checked_mul(&self, rhs: &I256) -> Option<I256> {
        I256::new(&self.0 * &rhs.0)
    }

    pub fn checked_div(&self, rhs: &I256) -> Option<I256> {
        if rhs.0.is_zero() {
            None
        } else {
            I256::new(&self.0 / &rhs.0)
        }
    }

    pub fn checked_rem(&self, rhs: &I256) -> Option<I256> {
        if rhs.0.is_zero() {
            None
        } else {
            I256::new(&self.0 % &rhs.0)
        }
    }
}

impl From<i64> for I256 {
    fn from(value: i64) -> I256 {
        I256(BigInt::from(value))
    }
}

impl fmt::Display for I256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 32-byte account or contract address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Address(pub [u8; 32]);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// A primitive runtime value: one cell on the VM operand stack.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Val {
    Bool(bool),
    I256(I256),
    U256(U256),
    ByteVec(Vec<u8>),
    Address(Address),
}

impl Val {
    /// The instruction that pushes this value.
    ///
    /// Small `U256` constants use the dedicated `U256Const0..U256Const5`
    /// opcodes.
    pub fn to_const_instr(&self) -> Instr {
        match self {
            Val::Bool(b) => Instr::BoolConst(*b),
            Val::I256(v) => Instr::I256Const(v.clone()),
            Val::U256(v) => match v.to_usize() {
                Some(0) => Instr::U256Const0,
                Some(1) => Instr::U256Const1,
                Some(2) => Instr::U256Const2,
                Some(3) => Instr::U256Const3,
                Some(4) => Instr::U256Const4,
                Some(5) => Instr::U256Const5,
                _ => Instr::U256Const(v.clone()),
            },
            Val::ByteVec(bytes) => Instr::BytesConst(bytes.clone()),
            Val::Address(address) => Instr::AddressConst(*address),
        }
    }
}

impl fmt::Display for Val {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Val::Bool(b) => write!(f, "{b}"),
            Val::I256(v) => write!(f, "{v}i"),
            Val::U256(v) => write!(f, "{v}"),
            Val::ByteVec(bytes) => {
                write!(f, "#")?;
                for byte in bytes {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
            Val::Address(address) => write!(f, "@{address}"),
        }
    }
}

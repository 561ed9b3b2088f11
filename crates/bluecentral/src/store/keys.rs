//! Security keys kept for a bonded peer
//!
//! Only what reconnection needs is stored: the long term key with its
//! diversifier, and the peer's identity address with its resolving key.

use crate::gap::{AddressType, BdAddr, TypedAddress};
use bitflags::bitflags;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{Read, Write};

/// Encoded size of [`SecurityKeys`].
pub const KEYS_SIZE: usize = 52;

/// Address type byte marking an absent identity address.
const NO_IDENTITY: u8 = 0xFF;

bitflags! {
    /// Key types distributed during pairing
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct KeySet: u8 {
        /// LTK, EDIV and RAND
        const ENCRYPTION = 0x01;
        /// IRK and identity address
        const IDENTITY = 0x02;
        /// CSRK, not stored
        const SIGNING = 0x04;
    }
}

/// Long Term Key (LTK) information
#[derive(Clone, PartialEq, Eq, Default)]
pub struct LongTermKey {
    /// Key value
    pub key: [u8; 16],
    /// EDIV (Encrypted Diversifier)
    pub ediv: u16,
    /// RAND (Random number)
    pub rand: [u8; 8],
    /// Whether the pairing that produced the key was authenticated
    pub authenticated: bool,
}

impl LongTermKey {
    pub fn new(key: [u8; 16], ediv: u16, rand: [u8; 8], authenticated: bool) -> Self {
        Self {
            key,
            ediv,
            rand,
            authenticated,
        }
    }
}

// Key material stays out of logs.
impl fmt::Debug for LongTermKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LongTermKey")
            .field("ediv", &self.ediv)
            .field("rand", &hex::encode(self.rand))
            .field("authenticated", &self.authenticated)
            .finish_non_exhaustive()
    }
}

/// Keys received from a peer during pairing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SecurityKeys {
    pub key_set: KeySet,
    pub identity: Option<TypedAddress>,
    pub ltk: Option<LongTermKey>,
    pub irk: Option<[u8; 16]>,
    /// Negotiated encryption key size in bytes
    pub key_size: u8,
}

impl SecurityKeys {
    /// Keys worth keeping: at least an encryption or identity key, plus the
    /// identity address the bond will be looked up by.
    pub fn is_valid(&self) -> bool {
        self.key_set.intersects(KeySet::ENCRYPTION | KeySet::IDENTITY) && self.identity.is_some()
    }

    pub(crate) fn encode<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u8(self.key_set.bits())?;
        match &self.identity {
            Some(identity) => {
                w.write_u8(identity.addr_type.into())?;
                w.write_all(&identity.addr.bytes)?;
            }
            None => {
                w.write_u8(NO_IDENTITY)?;
                w.write_all(&[0u8; 6])?;
            }
        }
        let ltk = self.ltk.clone().unwrap_or_default();
        w.write_all(&ltk.key)?;
        w.write_u16::<LittleEndian>(ltk.ediv)?;
        w.write_all(&ltk.rand)?;
        w.write_u8(ltk.authenticated as u8)?;
        w.write_all(&self.irk.unwrap_or([0u8; 16]))?;
        w.write_u8(self.key_size)?;
        Ok(())
    }

    pub(crate) fn decode<R: Read>(r: &mut R) -> std::io::Result<Self> {
        let key_set = KeySet::from_bits_truncate(r.read_u8()?);

        let addr_type = r.read_u8()?;
        let mut addr = [0u8; 6];
        r.read_exact(&mut addr)?;
        let identity = (addr_type != NO_IDENTITY)
            .then(|| TypedAddress::new(AddressType::from(addr_type), BdAddr::new(addr)));

        let mut ltk = LongTermKey::default();
        r.read_exact(&mut ltk.key)?;
        ltk.ediv = r.read_u16::<LittleEndian>()?;
        r.read_exact(&mut ltk.rand)?;
        ltk.authenticated = r.read_u8()? != 0;

        let mut irk = [0u8; 16];
        r.read_exact(&mut irk)?;
        let key_size = r.read_u8()?;

        Ok(Self {
            key_set,
            identity,
            ltk: key_set.contains(KeySet::ENCRYPTION).then_some(ltk),
            irk: key_set.contains(KeySet::IDENTITY).then_some(irk),
            key_size,
        })
    }
}

//! Deterministic binary serialization of transactions.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! version u16 | flags u8 | lock_time u32
//! n_inputs u32  { txid [32] | vout u32 | sequence u32 }*
//! n_outputs u32 { type u8 | amount u64 | script }*
//! if flags & 1: per input { n_items u32 { len u32 | bytes }* }
//! ```
//!
//! The txid and every signature hash are computed over the encoding with
//! witnesses removed, so adding signatures never changes what was signed.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::{Script, TxOutput};
use crate::error::{OmpError, OmpResult};
use crate::marketplace::OutputType;
use crate::util::sha256d;

pub const TX_VERSION: u16 = 0xa0;

/// Sequence that disables the lock time check for an input.
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// Sequence that leaves the transaction lock time enforced.
pub const SEQUENCE_LOCKTIME: u32 = 0xffff_fffe;

const FLAG_WITNESS: u8 = 0x01;
const SCRIPT_ADDRESS: u8 = 0x01;
const SCRIPT_MULTISIG: u8 = 0x02;
const SCRIPT_BURN: u8 = 0x6a;

/// Upper bound on items accepted from a decoded length prefix.
const MAX_DECODE_ITEMS: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    /// Hex-encoded 32-byte id of the transaction being spent.
    pub txid: String,
    pub vout: u32,
    pub sequence: u32,
    pub witness: Vec<Vec<u8>>,
}

impl TxInput {
    pub const fn new(txid: String, vout: u32, sequence: u32) -> Self {
        Self {
            txid,
            vout,
            sequence,
            witness: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTransaction {
    pub version: u16,
    pub lock_time: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl RawTransaction {
    pub const fn new(lock_time: u32) -> Self {
        Self {
            version: TX_VERSION,
            lock_time,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Full encoding, witnesses included.
    pub fn encode(&self) -> OmpResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_to(&mut buf, true).map_err(encode_err)?;
        Ok(buf)
    }

    /// Encoding without witnesses.
    pub fn encode_unsigned(&self) -> OmpResult<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_to(&mut buf, false).map_err(encode_err)?;
        Ok(buf)
    }

    pub fn to_hex(&self) -> OmpResult<String> {
        Ok(hex::encode(self.encode()?))
    }

    pub fn unsigned_hex(&self) -> OmpResult<String> {
        Ok(hex::encode(self.encode_unsigned()?))
    }

    pub fn from_hex(raw: &str) -> OmpResult<Self> {
        let bytes = hex::decode(raw.trim())
            .map_err(|e| OmpError::Serialization(format!("transaction is not hex: {e}")))?;
        Self::decode(&bytes)
    }

    pub fn decode(bytes: &[u8]) -> OmpResult<Self> {
        let mut cursor = Cursor::new(bytes);
        let tx = Self::read_from(&mut cursor).map_err(|e| {
            OmpError::Serialization(format!("malformed transaction: {e}"))
        })?;
        if cursor.position() as usize != bytes.len() {
            return Err(OmpError::Serialization(format!(
                "malformed transaction: {} trailing bytes",
                bytes.len() - cursor.position() as usize
            )));
        }
        Ok(tx)
    }

    /// Transaction id: double SHA-256 of the unsigned encoding.
    pub fn txid(&self) -> OmpResult<String> {
        Ok(hex::encode(sha256d(&self.encode_unsigned()?)))
    }

    /// Digest a signer commits to for input `index` spending `amount`.
    pub fn sighash(&self, index: u32, amount: u64) -> OmpResult<[u8; 32]> {
        let mut preimage = self.encode_unsigned()?;
        preimage
            .write_u32::<LittleEndian>(index)
            .and_then(|()| preimage.write_u64::<LittleEndian>(amount))
            .map_err(encode_err)?;
        Ok(sha256d(&preimage))
    }

    /// Copy with every witness cleared.
    pub fn without_witnesses(&self) -> Self {
        let mut tx = self.clone();
        for input in &mut tx.inputs {
            input.witness.clear();
        }
        tx
    }

    pub fn has_witnesses(&self) -> bool {
        self.inputs.iter().any(|i| !i.witness.is_empty())
    }

    /// Whether any input leaves the lock time enforced.
    pub fn lock_time_enforced(&self) -> bool {
        self.lock_time != 0 && self.inputs.iter().any(|i| i.sequence != SEQUENCE_FINAL)
    }

    pub fn output_total(&self) -> Option<u64> {
        self.outputs
            .iter()
            .try_fold(0u64, |acc, o| acc.checked_add(o.amount))
    }

    fn write_to<W: Write>(&self, w: &mut W, with_witness: bool) -> std::io::Result<()> {
        let with_witness = with_witness && self.has_witnesses();
        w.write_u16::<LittleEndian>(self.version)?;
        w.write_u8(if with_witness { FLAG_WITNESS } else { 0 })?;
        w.write_u32::<LittleEndian>(self.lock_time)?;

        w.write_u32::<LittleEndian>(len_u32(self.inputs.len())?)?;
        for input in &self.inputs {
            let txid = decode_txid(&input.txid)?;
            w.write_all(&txid)?;
            w.write_u32::<LittleEndian>(input.vout)?;
            w.write_u32::<LittleEndian>(input.sequence)?;
        }

        w.write_u32::<LittleEndian>(len_u32(self.outputs.len())?)?;
        for output in &self.outputs {
            w.write_u8(output.output_type.tag())?;
            w.write_u64::<LittleEndian>(output.amount)?;
            write_script(w, &output.script)?;
        }

        if with_witness {
            for input in &self.inputs {
                w.write_u32::<LittleEndian>(len_u32(input.witness.len())?)?;
                for item in &input.witness {
                    w.write_u32::<LittleEndian>(len_u32(item.len())?)?;
                    w.write_all(item)?;
                }
            }
        }
        Ok(())
    }

    fn read_from<R: Read>(r: &mut R) -> std::io::Result<Self> {
        let version = r.read_u16::<LittleEndian>()?;
        let flags = r.read_u8()?;
        if flags & !FLAG_WITNESS != 0 {
            return Err(invalid(format!("unknown flags {flags:#04x}")));
        }
        let lock_time = r.read_u32::<LittleEndian>()?;

        let n_inputs = read_count(r)?;
        let mut inputs = Vec::with_capacity(n_inputs);
        for _ in 0..n_inputs {
            let mut txid = [0u8; 32];
            r.read_exact(&mut txid)?;
            let vout = r.read_u32::<LittleEndian>()?;
            let sequence = r.read_u32::<LittleEndian>()?;
            inputs.push(TxInput::new(hex::encode(txid), vout, sequence));
        }

        let n_outputs = read_count(r)?;
        let mut outputs = Vec::with_capacity(n_outputs);
        for _ in 0..n_outputs {
            let tag = r.read_u8()?;
            let output_type = OutputType::from_tag(tag)
                .ok_or_else(|| invalid(format!("unknown output type {tag}")))?;
            let amount = r.read_u64::<LittleEndian>()?;
            let script = read_script(r)?;
            outputs.push(TxOutput {
                output_type,
                amount,
                script,
            });
        }

        if flags & FLAG_WITNESS != 0 {
            for input in &mut inputs {
                let n_items = read_count(r)?;
                for _ in 0..n_items {
                    let len = read_count(r)?;
                    let mut item = vec![0u8; len];
                    r.read_exact(&mut item)?;
                    input.witness.push(item);
                }
            }
        }

        Ok(Self {
            version,
            lock_time,
            inputs,
            outputs,
        })
    }
}

fn write_script<W: Write>(w: &mut W, script: &Script) -> std::io::Result<()> {
    match script {
        Script::Address { address } => {
            w.write_u8(SCRIPT_ADDRESS)?;
            write_str(w, address)
        }
        Script::Multisig { required, pubkeys } => {
            w.write_u8(SCRIPT_MULTISIG)?;
            w.write_u8(*required)?;
            let n = u8::try_from(pubkeys.len())
                .map_err(|_| invalid("too many multisig keys".into()))?;
            w.write_u8(n)?;
            for key in pubkeys {
                write_str(w, key)?;
            }
            Ok(())
        }
        Script::Burn => w.write_u8(SCRIPT_BURN),
    }
}

fn read_script<R: Read>(r: &mut R) -> std::io::Result<Script> {
    match r.read_u8()? {
        SCRIPT_ADDRESS => Ok(Script::Address {
            address: read_str(r)?,
        }),
        SCRIPT_MULTISIG => {
            let required = r.read_u8()?;
            let n = r.read_u8()?;
            let pubkeys = (0..n).map(|_| read_str(r)).collect::<Result<_, _>>()?;
            Ok(Script::Multisig { required, pubkeys })
        }
        SCRIPT_BURN => Ok(Script::Burn),
        other => Err(invalid(format!("unknown script tag {other:#04x}"))),
    }
}

fn write_str<W: Write>(w: &mut W, s: &str) -> std::io::Result<()> {
    let len = u16::try_from(s.len()).map_err(|_| invalid("script data too long".into()))?;
    w.write_u16::<LittleEndian>(len)?;
    w.write_all(s.as_bytes())
}

fn read_str<R: Read>(r: &mut R) -> std::io::Result<String> {
    let len = r.read_u16::<LittleEndian>()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| invalid(e.to_string()))
}

fn read_count<R: Read>(r: &mut R) -> std::io::Result<usize> {
    let n = r.read_u32::<LittleEndian>()?;
    if n > MAX_DECODE_ITEMS {
        return Err(invalid(format!("length prefix {n} too large")));
    }
    Ok(n as usize)
}

fn decode_txid(txid: &str) -> std::io::Result<[u8; 32]> {
    let bytes = hex::decode(txid).map_err(|e| invalid(format!("bad txid '{txid}': {e}")))?;
    bytes
        .try_into()
        .map_err(|_| invalid(format!("txid '{txid}' is not 32 bytes")))
}

fn len_u32(len: usize) -> std::io::Result<u32> {
    u32::try_from(len).map_err(|_| invalid("length overflows u32".into()))
}

fn invalid(msg: String) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidData, msg)
}

fn encode_err(e: std::io::Error) -> OmpError {
    OmpError::TransactionBuild(format!("encoding failed: {e}"))
}

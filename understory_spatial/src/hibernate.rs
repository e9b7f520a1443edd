// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Wire format for hibernating a tree.
//!
//! A hibernation stream is a flat sequence of [`ReconstructOp`] records. Each
//! record starts with a one-byte opcode:
//!
//! | opcode | record | body |
//! |---|---|---|
//! | `0` | `End` | none |
//! | `1` | `AddEntry` | `x`, `y`, `z` as `f64`, the value's [`Payload`], then a `u32` sequence number |
//! | `2` | `DescendToNewChild` | `u8` child slot |
//! | `3` | `AscendToParent` | none |
//!
//! All multi-byte fields are little-endian. The format carries no version
//! field; readers must match the writer's layout exactly.

use std::io::{self, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Result, SpatialError};
use crate::types::Point3;

/// Opcode of [`ReconstructOp::End`].
pub const OP_END: u8 = 0;
/// Opcode of [`ReconstructOp::AddEntry`].
pub const OP_ADD_ENTRY: u8 = 1;
/// Opcode of [`ReconstructOp::DescendToNewChild`].
pub const OP_DESCEND: u8 = 2;
/// Opcode of [`ReconstructOp::AscendToParent`].
pub const OP_ASCEND: u8 = 3;

/// Fixed-width binary encoding of a stored value.
///
/// ```rust
/// use understory_spatial::Payload;
///
/// let mut buf = Vec::new();
/// [1.5_f64, -2.0].write_payload(&mut buf).unwrap();
/// assert_eq!(buf.len(), 16);
/// let back = <[f64; 2]>::read_payload(&mut buf.as_slice()).unwrap();
/// assert_eq!(back, [1.5, -2.0]);
/// ```
pub trait Payload: Sized {
    /// Append the encoding of `self` to `w`.
    fn write_payload<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()>;

    /// Decode a value previously written by [`write_payload`](Self::write_payload).
    fn read_payload<R: Read + ?Sized>(r: &mut R) -> io::Result<Self>;
}

impl Payload for () {
    fn write_payload<W: Write + ?Sized>(&self, _w: &mut W) -> io::Result<()> {
        Ok(())
    }

    fn read_payload<R: Read + ?Sized>(_r: &mut R) -> io::Result<Self> {
        Ok(())
    }
}

impl Payload for u8 {
    fn write_payload<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        w.write_u8(*self)
    }

    fn read_payload<R: Read + ?Sized>(r: &mut R) -> io::Result<Self> {
        r.read_u8()
    }
}

macro_rules! payload_via_byteorder {
    ($($ty:ty => $write:ident, $read:ident;)*) => {
        $(
            impl Payload for $ty {
                fn write_payload<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
                    w.$write::<LittleEndian>(*self)
                }

                fn read_payload<R: Read + ?Sized>(r: &mut R) -> io::Result<Self> {
                    r.$read::<LittleEndian>()
                }
            }
        )*
    };
}

payload_via_byteorder! {
    u16 => write_u16, read_u16;
    u32 => write_u32, read_u32;
    u64 => write_u64, read_u64;
    i32 => write_i32, read_i32;
    i64 => write_i64, read_i64;
    f32 => write_f32, read_f32;
    f64 => write_f64, read_f64;
}

impl<const N: usize> Payload for [f64; N] {
    fn write_payload<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        for v in self {
            w.write_f64::<LittleEndian>(*v)?;
        }
        Ok(())
    }

    fn read_payload<R: Read + ?Sized>(r: &mut R) -> io::Result<Self> {
        let mut out = [0.0; N];
        r.read_f64_into::<LittleEndian>(&mut out)?;
        Ok(out)
    }
}

impl<A: Payload, B: Payload> Payload for (A, B) {
    fn write_payload<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        self.0.write_payload(w)?;
        self.1.write_payload(w)
    }

    fn read_payload<R: Read + ?Sized>(r: &mut R) -> io::Result<Self> {
        Ok((A::read_payload(r)?, B::read_payload(r)?))
    }
}

/// One step of rebuilding a tree.
///
/// A tree is written depth-first: internal nodes bracket each non-empty child
/// with `DescendToNewChild` / `AscendToParent`, leaves emit one `AddEntry` per
/// entry, and the stream closes with `End`.
#[derive(Clone, Debug, PartialEq)]
pub enum ReconstructOp<V> {
    /// Add an entry to the leaf under construction.
    AddEntry {
        /// Slot index the entry occupied in the hibernated index.
        sequence: u32,
        /// Position of the entry.
        point: Point3,
        /// Stored value.
        value: V,
    },
    /// Create child `slot` of the current node and make it current.
    DescendToNewChild(u8),
    /// Make the parent of the current node current.
    AscendToParent,
    /// The tree is complete.
    End,
}

impl<V: Payload> ReconstructOp<V> {
    /// Encode this record.
    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        match self {
            Self::AddEntry {
                sequence,
                point,
                value,
            } => write_add_entry(w, *sequence, *point, value),
            Self::DescendToNewChild(slot) => write_descend(w, *slot),
            Self::AscendToParent => w.write_u8(OP_ASCEND),
            Self::End => w.write_u8(OP_END),
        }
    }

    /// Decode the next record.
    ///
    /// Running out of input, at a record boundary or inside one, is reported
    /// as [`SpatialError::Corrupt`], since a well-formed stream always ends
    /// with `End`.
    pub fn read_from<R: Read + ?Sized>(r: &mut R) -> Result<Self> {
        let opcode = r
            .read_u8()
            .map_err(|e| eof_as_corrupt(e, "stream ended before the End record"))?;
        match opcode {
            OP_END => Ok(Self::End),
            OP_ASCEND => Ok(Self::AscendToParent),
            OP_DESCEND => {
                let slot = r
                    .read_u8()
                    .map_err(|e| eof_as_corrupt(e, "truncated DescendToNewChild record"))?;
                Ok(Self::DescendToNewChild(slot))
            }
            OP_ADD_ENTRY => read_add_entry(r)
                .map_err(|e| eof_as_corrupt(e, "truncated AddEntry record")),
            _ => Err(SpatialError::Corrupt("unknown opcode")),
        }
    }
}

fn read_add_entry<V: Payload, R: Read + ?Sized>(r: &mut R) -> io::Result<ReconstructOp<V>> {
    let x = r.read_f64::<LittleEndian>()?;
    let y = r.read_f64::<LittleEndian>()?;
    let z = r.read_f64::<LittleEndian>()?;
    let value = V::read_payload(r)?;
    let sequence = r.read_u32::<LittleEndian>()?;
    Ok(ReconstructOp::AddEntry {
        sequence,
        point: Point3::new(x, y, z),
        value,
    })
}

/// Write an `AddEntry` record from a borrowed value.
pub(crate) fn write_add_entry<V: Payload, W: Write + ?Sized>(
    w: &mut W,
    sequence: u32,
    point: Point3,
    value: &V,
) -> io::Result<()> {
    w.write_u8(OP_ADD_ENTRY)?;
    w.write_f64::<LittleEndian>(point.x)?;
    w.write_f64::<LittleEndian>(point.y)?;
    w.write_f64::<LittleEndian>(point.z)?;
    value.write_payload(w)?;
    w.write_u32::<LittleEndian>(sequence)
}

pub(crate) fn write_descend<W: Write + ?Sized>(w: &mut W, slot: u8) -> io::Result<()> {
    w.write_u8(OP_DESCEND)?;
    w.write_u8(slot)
}

fn eof_as_corrupt(e: io::Error, what: &'static str) -> SpatialError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        SpatialError::Corrupt(what)
    } else {
        SpatialError::Io(e)
    }
}

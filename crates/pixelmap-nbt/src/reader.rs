//! The streaming walk itself.

use pixelmap_codec::endian;

use crate::error::NbtError;
use crate::value::{IntArray, LongArray, Tag, TagType, Value};
use crate::Endian;

/// Upper bound on compound/list nesting, to bound the explicit stack.
const MAX_DEPTH: usize = 512;

/// Visitor driven by [`parse`]. Returning `true` skips the remainder of the
/// subtree the callback was invoked for; skipping a primitive is a no-op
/// since it has already been consumed.
pub trait Visitor {
    /// A named tag inside a compound. An `End` value closes the compound.
    fn tag(&mut self, tag: &Tag<'_>) -> bool;

    /// An unnamed value inside a list.
    fn value(&mut self, _value: &Value<'_>) -> bool {
        false
    }
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    endian: Endian,
}

impl<'a> Cursor<'a> {
    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn need(&self, n: usize) -> Result<(), NbtError> {
        if self.remaining() < n {
            Err(NbtError::UnexpectedEof)
        } else {
            Ok(())
        }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], NbtError> {
        self.need(n)?;
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, NbtError> {
        self.need(1)?;
        let v = self.data[self.pos];
        self.pos += 1;
        Ok(v)
    }

    fn tag_type(&mut self) -> Result<TagType, NbtError> {
        let id = self.u8()?;
        TagType::from_id(id).ok_or(NbtError::UnknownTagType(id))
    }

    fn i16(&mut self) -> Result<i16, NbtError> {
        let b = self.take(2)?;
        Ok(match self.endian {
            Endian::Big => endian::i16_be(b),
            Endian::Little => endian::i16_le(b),
        })
    }

    fn i32(&mut self) -> Result<i32, NbtError> {
        let b = self.take(4)?;
        Ok(match self.endian {
            Endian::Big => endian::i32_be(b),
            Endian::Little => endian::i32_le(b),
        })
    }

    fn i64(&mut self) -> Result<i64, NbtError> {
        let b = self.take(8)?;
        Ok(match self.endian {
            Endian::Big => endian::i64_be(b),
            Endian::Little => endian::i64_le(b),
        })
    }

    fn f32(&mut self) -> Result<f32, NbtError> {
        let b = self.take(4)?;
        Ok(match self.endian {
            Endian::Big => endian::f32_be(b),
            Endian::Little => endian::f32_le(b),
        })
    }

    fn f64(&mut self) -> Result<f64, NbtError> {
        let b = self.take(8)?;
        Ok(match self.endian {
            Endian::Big => endian::f64_be(b),
            Endian::Little => endian::f64_le(b),
        })
    }

    fn len(&mut self) -> Result<usize, NbtError> {
        let n = self.i32()?;
        if n < 0 {
            return Err(NbtError::NegativeLength(n));
        }
        Ok(n as usize)
    }

    fn string(&mut self) -> Result<&'a str, NbtError> {
        let n = self.i16()? as u16 as usize;
        let raw = self.take(n)?;
        std::str::from_utf8(raw).map_err(|_| NbtError::InvalidUtf8)
    }

    fn skip_string(&mut self) -> Result<(), NbtError> {
        let n = self.i16()? as u16 as usize;
        self.take(n)?;
        Ok(())
    }
}

/// List-or-compound frame on the explicit stack. `remaining < 0` marks a
/// compound, which closes on its `End` tag instead of a counter.
struct Frame {
    elem: TagType,
    remaining: i32,
}

impl Frame {
    fn compound() -> Self {
        Frame { elem: TagType::Compound, remaining: -1 }
    }

    fn list(elem: TagType, remaining: i32) -> Self {
        Frame { elem, remaining }
    }
}

/// Walk an NBT stream, invoking the visitor per tag and list value.
/// Returns the number of bytes consumed, which for concatenated documents
/// (Bedrock sub-chunk palettes) is the offset of the next document.
pub fn parse(data: &[u8], endian: Endian, visitor: &mut dyn Visitor) -> Result<usize, NbtError> {
    let mut cur = Cursor { data, pos: 0, endian };
    let mut stack: Vec<Frame> = Vec::new();

    let root = cur.u8()?;
    if root != TagType::Compound as u8 {
        return Err(NbtError::ExpectedCompound { got: root });
    }
    let name = cur.string()?;
    stack.push(Frame::compound());
    let mut skip = visitor.tag(&Tag { name, value: Value::Compound });
    let mut skip_depth = 0usize;

    while cur.pos < data.len() && !stack.is_empty() {
        let in_list = stack.last().map_or(false, |f| f.remaining > 0);
        if in_list {
            let ty = stack.last().unwrap().elem;
            if ty != TagType::Compound {
                stack.last_mut().unwrap().remaining -= 1;
            }
            if skip && skip_depth <= stack.len() {
                skip_value(&mut cur, ty, &mut stack)?;
            } else {
                skip = false;
                skip_depth = 0;
                let value = read_value(&mut cur, ty, &mut stack)?;
                if visitor.value(&value) {
                    apply_skip(&value, &stack, &mut skip, &mut skip_depth);
                }
            }
            if ty != TagType::Compound {
                if let Some(top) = stack.last() {
                    if top.remaining == 0 {
                        stack.pop();
                    }
                }
            }
        } else {
            let ty = cur.tag_type()?;
            if skip && skip_depth <= stack.len() {
                if ty != TagType::End {
                    cur.skip_string()?;
                }
                skip_value(&mut cur, ty, &mut stack)?;
            } else {
                let name = if ty != TagType::End { cur.string()? } else { "" };
                let value = read_value(&mut cur, ty, &mut stack)?;
                skip = false;
                skip_depth = 0;
                if visitor.tag(&Tag { name, value }) {
                    apply_skip(&value, &stack, &mut skip, &mut skip_depth);
                }
            }
            // A compound that closed inside a list finishes one element.
            if ty == TagType::End {
                if let Some(top) = stack.last_mut() {
                    if top.remaining > 0 {
                        top.remaining -= 1;
                        if top.remaining == 0 {
                            stack.pop();
                        }
                    }
                }
            }
        }
        if stack.len() > MAX_DEPTH {
            return Err(NbtError::NestingTooDeep { limit: MAX_DEPTH });
        }
    }

    if !stack.is_empty() {
        return Err(NbtError::UnexpectedEof);
    }
    Ok(cur.pos)
}

fn apply_skip(value: &Value<'_>, stack: &[Frame], skip: &mut bool, skip_depth: &mut usize) {
    match value {
        Value::List { len, .. } if *len > 0 => {
            *skip = true;
            *skip_depth = stack.len();
        }
        Value::Compound => {
            *skip = true;
            *skip_depth = stack.len();
        }
        // Primitives and empty lists are already fully consumed.
        _ => {
            *skip = false;
            *skip_depth = 0;
        }
    }
}

fn read_value<'a>(
    cur: &mut Cursor<'a>,
    ty: TagType,
    stack: &mut Vec<Frame>,
) -> Result<Value<'a>, NbtError> {
    Ok(match ty {
        TagType::End => {
            stack.pop();
            Value::End
        }
        TagType::Byte => Value::Byte(cur.u8()? as i8),
        TagType::Short => Value::Short(cur.i16()?),
        TagType::Int => Value::Int(cur.i32()?),
        TagType::Long => Value::Long(cur.i64()?),
        TagType::Float => Value::Float(cur.f32()?),
        TagType::Double => Value::Double(cur.f64()?),
        TagType::ByteArray => {
            let n = cur.len()?;
            Value::ByteArray(cur.take(n)?)
        }
        TagType::String => Value::String(cur.string()?),
        TagType::List => {
            let elem = cur.tag_type()?;
            let len = cur.i32()?;
            if len > 0 {
                stack.push(Frame::list(elem, len));
            }
            Value::List { elem, len }
        }
        TagType::Compound => {
            stack.push(Frame::compound());
            Value::Compound
        }
        TagType::IntArray => {
            let n = cur.len()?;
            let raw = cur.take(n.checked_mul(4).ok_or(NbtError::UnexpectedEof)?)?;
            Value::IntArray(IntArray::new(raw, cur.endian))
        }
        TagType::LongArray => {
            let n = cur.len()?;
            let raw = cur.take(n.checked_mul(8).ok_or(NbtError::UnexpectedEof)?)?;
            Value::LongArray(LongArray::new(raw, cur.endian))
        }
    })
}

fn skip_value(cur: &mut Cursor<'_>, ty: TagType, stack: &mut Vec<Frame>) -> Result<(), NbtError> {
    match ty {
        TagType::End => {
            stack.pop();
        }
        TagType::Byte => {
            cur.take(1)?;
        }
        TagType::Short => {
            cur.take(2)?;
        }
        TagType::Int | TagType::Float => {
            cur.take(4)?;
        }
        TagType::Long | TagType::Double => {
            cur.take(8)?;
        }
        TagType::ByteArray => {
            let n = cur.len()?;
            cur.take(n)?;
        }
        TagType::String => cur.skip_string()?,
        TagType::List => {
            let elem = cur.tag_type()?;
            // Primitive element lists advance the cursor in one step; only
            // nested structures go back through the stack.
            match elem {
                TagType::Byte => {
                    let n = cur.len()?;
                    cur.take(n)?;
                }
                TagType::Short => {
                    let n = cur.len()?;
                    cur.take(n.checked_mul(2).ok_or(NbtError::UnexpectedEof)?)?;
                }
                TagType::Int | TagType::Float => {
                    let n = cur.len()?;
                    cur.take(n.checked_mul(4).ok_or(NbtError::UnexpectedEof)?)?;
                }
                TagType::Long | TagType::Double => {
                    let n = cur.len()?;
                    cur.take(n.checked_mul(8).ok_or(NbtError::UnexpectedEof)?)?;
                }
                _ => {
                    let len = cur.i32()?;
                    if len > 0 {
                        stack.push(Frame::list(elem, len));
                    }
                }
            }
        }
        TagType::Compound => stack.push(Frame::compound()),
        TagType::IntArray => {
            let n = cur.len()?;
            cur.take(n.checked_mul(4).ok_or(NbtError::UnexpectedEof)?)?;
        }
        TagType::LongArray => {
            let n = cur.len()?;
            cur.take(n.checked_mul(8).ok_or(NbtError::UnexpectedEof)?)?;
        }
    }
    Ok(())
}

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::fmt;
use std::io::{Cursor, Read};

use crate::error::Error;

/// The closed set of wire types a field may have.
///
/// All multi-byte values are little-endian. The three `Blob*` variants cover
/// the byte-array shapes that appear in framed protocols: an 8-bit or 16-bit
/// length prefix followed by that many bytes, a greedy blob that absorbs the
/// remainder of the frame, and a fixed-width blob whose size comes from the
/// field definition itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
	U8,
	U16,
	U32,
	I8,
	I16,
	I32,
	F32,
	/// 6-byte MAC address
	Mac,
	/// Byte blob with a 1-byte length prefix
	BlobL8,
	/// Byte blob with a 2-byte length prefix
	BlobL16,
	/// Byte blob consuming the remainder of the frame
	BlobGreedy,
	/// Byte blob of exactly [`Field::width`] bytes
	BlobFixed,
}

/// A single field in a packet layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
	pub name: &'static str,
	pub kind: FieldType,
	/// Only meaningful for [`FieldType::BlobFixed`].
	pub width: usize,
}

impl Field {
	pub const fn new(name: &'static str, kind: FieldType) -> Field {
		Field {
			name,
			kind,
			width: 0,
		}
	}

	pub const fn fixed(name: &'static str, width: usize) -> Field {
		Field {
			name,
			kind: FieldType::BlobFixed,
			width,
		}
	}

	/// Deterministic size contribution of this field.
	///
	/// Length-prefixed blobs contribute their prefix only; a greedy blob
	/// contributes nothing.
	fn fixed_width(&self) -> usize {
		match self.kind {
			FieldType::U8 | FieldType::I8 | FieldType::BlobL8 => 1,
			FieldType::U16 | FieldType::I16 | FieldType::BlobL16 => 2,
			FieldType::U32 | FieldType::I32 | FieldType::F32 => 4,
			FieldType::Mac => 6,
			FieldType::BlobGreedy => 0,
			FieldType::BlobFixed => self.width,
		}
	}
}

/// A typed field value, keyed by field name in a [`ValueMap`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
	U8(u8),
	U16(u16),
	U32(u32),
	I8(i8),
	I16(i16),
	I32(i32),
	F32(f32),
	Mac([u8; 6]),
	Bytes(Vec<u8>),
}

impl Value {
	pub fn as_u8(&self) -> Option<u8> {
		match *self {
			Value::U8(v) => Some(v),
			_ => None,
		}
	}

	pub fn as_u16(&self) -> Option<u16> {
		match *self {
			Value::U16(v) => Some(v),
			_ => None,
		}
	}

	pub fn as_u32(&self) -> Option<u32> {
		match *self {
			Value::U32(v) => Some(v),
			_ => None,
		}
	}

	pub fn as_i8(&self) -> Option<i8> {
		match *self {
			Value::I8(v) => Some(v),
			_ => None,
		}
	}

	pub fn as_i16(&self) -> Option<i16> {
		match *self {
			Value::I16(v) => Some(v),
			_ => None,
		}
	}

	pub fn as_i32(&self) -> Option<i32> {
		match *self {
			Value::I32(v) => Some(v),
			_ => None,
		}
	}

	pub fn as_f32(&self) -> Option<f32> {
		match *self {
			Value::F32(v) => Some(v),
			_ => None,
		}
	}

	pub fn as_mac(&self) -> Option<[u8; 6]> {
		match *self {
			Value::Mac(v) => Some(v),
			_ => None,
		}
	}

	pub fn as_bytes(&self) -> Option<&[u8]> {
		match self {
			Value::Bytes(v) => Some(v),
			_ => None,
		}
	}
}

impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Value::U8(v) => write!(f, "{}", v),
			Value::U16(v) => write!(f, "{}", v),
			Value::U32(v) => write!(f, "{}", v),
			Value::I8(v) => write!(f, "{}", v),
			Value::I16(v) => write!(f, "{}", v),
			Value::I32(v) => write!(f, "{}", v),
			Value::F32(v) => write!(f, "{}", v),
			Value::Mac(v) => write!(
				f,
				"{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
				v[0], v[1], v[2], v[3], v[4], v[5]
			),
			Value::Bytes(v) => {
				write!(f, "[")?;
				for (i, b) in v.iter().enumerate() {
					if i > 0 {
						write!(f, " ")?;
					}
					write!(f, "{:02X}", b)?;
				}
				write!(f, "]")
			}
		}
	}
}

impl From<u8> for Value {
	fn from(v: u8) -> Value {
		Value::U8(v)
	}
}

impl From<u16> for Value {
	fn from(v: u16) -> Value {
		Value::U16(v)
	}
}

impl From<u32> for Value {
	fn from(v: u32) -> Value {
		Value::U32(v)
	}
}

impl From<i8> for Value {
	fn from(v: i8) -> Value {
		Value::I8(v)
	}
}

impl From<i16> for Value {
	fn from(v: i16) -> Value {
		Value::I16(v)
	}
}

impl From<i32> for Value {
	fn from(v: i32) -> Value {
		Value::I32(v)
	}
}

impl From<f32> for Value {
	fn from(v: f32) -> Value {
		Value::F32(v)
	}
}

impl From<[u8; 6]> for Value {
	fn from(v: [u8; 6]) -> Value {
		Value::Mac(v)
	}
}

impl From<Vec<u8>> for Value {
	fn from(v: Vec<u8>) -> Value {
		Value::Bytes(v)
	}
}

impl From<&[u8]> for Value {
	fn from(v: &[u8]) -> Value {
		Value::Bytes(v.to_vec())
	}
}

impl From<&str> for Value {
	fn from(v: &str) -> Value {
		Value::Bytes(v.as_bytes().to_vec())
	}
}

/// Field values keyed by field name.
pub type ValueMap = HashMap<&'static str, Value>;

/// Cached layout information for a field list.
///
/// `expected_length` is the minimum deterministic size of a buffer packed
/// from the field list: fixed-width fields contribute their full width,
/// length-prefixed blobs contribute only the prefix, greedy blobs nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackingInfo {
	pub expected_length: usize,
}

/// Calculates the packing layout for a field list.
pub fn packing_info(fields: &[Field]) -> PackingInfo {
	PackingInfo {
		expected_length: fields.iter().map(Field::fixed_width).sum(),
	}
}

/// Byte offset of the named field within a packed buffer, or `None` if the
/// field list does not contain it.
///
/// Offsets count deterministic widths only, so fields after a variable-width
/// blob are positioned as if the blob were empty.
pub fn field_offset(fields: &[Field], name: &str) -> Option<usize> {
	let mut offset = 0;
	for field in fields {
		if field.name == name {
			return Some(offset);
		}
		offset += field.fixed_width();
	}
	None
}

fn bad_field(field: &Field) -> Error {
	Error::BadField {
		field: field.name,
		reason: format!("expected {:?} value", field.kind),
	}
}

/// Packs a value map into a byte buffer according to a field list.
///
/// Fails with [`Error::MissingField`] if a required key is absent and with
/// [`Error::BadField`] if a value does not match its declared type, if a
/// length-prefixed blob is too large for its prefix, or if a fixed-width
/// blob is not exactly its declared width.
pub fn pack(values: &ValueMap, fields: &[Field]) -> Result<Vec<u8>, Error> {
	let mut out = Vec::with_capacity(packing_info(fields).expected_length);

	for field in fields {
		let value = values
			.get(field.name)
			.ok_or(Error::MissingField(field.name))?;

		match field.kind {
			FieldType::U8 => out.write_u8(value.as_u8().ok_or_else(|| bad_field(field))?)?,
			FieldType::U16 => out
				.write_u16::<LittleEndian>(value.as_u16().ok_or_else(|| bad_field(field))?)?,
			FieldType::U32 => out
				.write_u32::<LittleEndian>(value.as_u32().ok_or_else(|| bad_field(field))?)?,
			FieldType::I8 => out.write_i8(value.as_i8().ok_or_else(|| bad_field(field))?)?,
			FieldType::I16 => out
				.write_i16::<LittleEndian>(value.as_i16().ok_or_else(|| bad_field(field))?)?,
			FieldType::I32 => out
				.write_i32::<LittleEndian>(value.as_i32().ok_or_else(|| bad_field(field))?)?,
			FieldType::F32 => out
				.write_f32::<LittleEndian>(value.as_f32().ok_or_else(|| bad_field(field))?)?,
			FieldType::Mac => {
				let mac = value.as_mac().ok_or_else(|| bad_field(field))?;
				out.extend_from_slice(&mac);
			}
			FieldType::BlobL8 => {
				let blob = value.as_bytes().ok_or_else(|| bad_field(field))?;
				if blob.len() > u8::max_value() as usize {
					return Err(Error::BadField {
						field: field.name,
						reason: format!("{} bytes exceeds 8-bit length prefix", blob.len()),
					});
				}
				out.write_u8(blob.len() as u8)?;
				out.extend_from_slice(blob);
			}
			FieldType::BlobL16 => {
				let blob = value.as_bytes().ok_or_else(|| bad_field(field))?;
				if blob.len() > u16::max_value() as usize {
					return Err(Error::BadField {
						field: field.name,
						reason: format!("{} bytes exceeds 16-bit length prefix", blob.len()),
					});
				}
				out.write_u16::<LittleEndian>(blob.len() as u16)?;
				out.extend_from_slice(blob);
			}
			FieldType::BlobGreedy => {
				let blob = value.as_bytes().ok_or_else(|| bad_field(field))?;
				out.extend_from_slice(blob);
			}
			FieldType::BlobFixed => {
				let blob = value.as_bytes().ok_or_else(|| bad_field(field))?;
				if blob.len() != field.width {
					return Err(Error::BadField {
						field: field.name,
						reason: format!("need exactly {} bytes, got {}", field.width, blob.len()),
					});
				}
				out.extend_from_slice(blob);
			}
		}
	}

	Ok(out)
}

/// Unpacks a byte buffer into a value map according to a field list.
///
/// The optional `info` lets a caller that has already calculated the layout
/// avoid a second pass. Fails with [`Error::ShortBuffer`] if the buffer is
/// smaller than the deterministic layout size and with
/// [`Error::LengthMismatch`] if a length-prefixed blob declares a length
/// other than the bytes remaining after the deterministic portion. A greedy
/// blob absorbs the remainder unchecked.
pub fn unpack(
	buffer: &[u8],
	fields: &[Field],
	info: Option<PackingInfo>,
) -> Result<ValueMap, Error> {
	let info = info.unwrap_or_else(|| packing_info(fields));

	if buffer.len() < info.expected_length {
		return Err(Error::ShortBuffer {
			needed: info.expected_length,
			actual: buffer.len(),
		});
	}

	// bytes past the deterministic portion belong to the variable blob
	let remainder = &buffer[info.expected_length..];
	let mut c = Cursor::new(&buffer[..info.expected_length]);
	let mut values = ValueMap::new();

	for field in fields {
		let value = match field.kind {
			FieldType::U8 => Value::U8(c.read_u8()?),
			FieldType::U16 => Value::U16(c.read_u16::<LittleEndian>()?),
			FieldType::U32 => Value::U32(c.read_u32::<LittleEndian>()?),
			FieldType::I8 => Value::I8(c.read_i8()?),
			FieldType::I16 => Value::I16(c.read_i16::<LittleEndian>()?),
			FieldType::I32 => Value::I32(c.read_i32::<LittleEndian>()?),
			FieldType::F32 => Value::F32(c.read_f32::<LittleEndian>()?),
			FieldType::Mac => {
				let mut mac = [0u8; 6];
				c.read_exact(&mut mac)?;
				Value::Mac(mac)
			}
			FieldType::BlobL8 => {
				let declared = c.read_u8()? as usize;
				if declared != remainder.len() {
					return Err(Error::LengthMismatch {
						declared,
						actual: remainder.len(),
					});
				}
				Value::Bytes(remainder.to_vec())
			}
			FieldType::BlobL16 => {
				let declared = c.read_u16::<LittleEndian>()? as usize;
				if declared != remainder.len() {
					return Err(Error::LengthMismatch {
						declared,
						actual: remainder.len(),
					});
				}
				Value::Bytes(remainder.to_vec())
			}
			FieldType::BlobGreedy => Value::Bytes(remainder.to_vec()),
			FieldType::BlobFixed => {
				let mut blob = vec![0u8; field.width];
				c.read_exact(&mut blob)?;
				Value::Bytes(blob)
			}
		};
		values.insert(field.name, value);
	}

	Ok(values)
}

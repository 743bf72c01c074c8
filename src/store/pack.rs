//! Packfile encoding
//!
//! Layout:
//!
//! ```text
//! "GLPK" | version: u32 BE | count: u32 BE
//! count x ( kind: u8 | length: u32 BE | payload )
//! blake3 checksum of everything above (32 bytes)
//! ```
//!
//! Entries carry no id; the receiver recomputes it from kind and payload.

use crate::error::StoreError;

const PACK_SIGNATURE: &[u8; 4] = b"GLPK";
const PACK_VERSION: u32 = 1;
const HEADER_LEN: usize = 12;
const CHECKSUM_LEN: usize = 32;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ObjectKind {
	Blob,
	Commit,
}

impl ObjectKind {
	fn code(self) -> u8 {
		match self {
			ObjectKind::Blob => 1,
			ObjectKind::Commit => 2,
		}
	}

	fn from_code(code: u8) -> Option<Self> {
		match code {
			1 => Some(ObjectKind::Blob),
			2 => Some(ObjectKind::Commit),
			_ => None,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			ObjectKind::Blob => "blob",
			ObjectKind::Commit => "commit",
		}
	}

	pub fn parse(name: &str) -> Option<Self> {
		match name {
			"blob" => Some(ObjectKind::Blob),
			"commit" => Some(ObjectKind::Commit),
			_ => None,
		}
	}
}

/// Object as carried inside a pack
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PackedObject {
	pub kind: ObjectKind,
	pub data: Vec<u8>,
}

/// Content address of an object
pub fn object_id(kind: ObjectKind, data: &[u8]) -> String {
	let mut hasher = blake3::Hasher::new();
	hasher.update(kind.as_str().as_bytes());
	hasher.update(b" ");
	hasher.update(data.len().to_string().as_bytes());
	hasher.update(b"\0");
	hasher.update(data);
	hasher.finalize().to_hex().to_string()
}

/// Builds a pack from a set of objects
#[derive(Default)]
pub struct PackBuilder {
	objects: Vec<PackedObject>,
}

impl PackBuilder {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add(&mut self, object: PackedObject) {
		self.objects.push(object);
	}

	pub fn len(&self) -> usize {
		self.objects.len()
	}

	pub fn is_empty(&self) -> bool {
		self.objects.is_empty()
	}

	pub fn build(self) -> Result<Vec<u8>, StoreError> {
		let mut pack = Vec::new();
		pack.extend_from_slice(PACK_SIGNATURE);
		pack.extend_from_slice(&PACK_VERSION.to_be_bytes());
		pack.extend_from_slice(&to_u32(self.objects.len())?.to_be_bytes());

		for object in &self.objects {
			pack.push(object.kind.code());
			pack.extend_from_slice(&to_u32(object.data.len())?.to_be_bytes());
			pack.extend_from_slice(&object.data);
		}

		let checksum = blake3::hash(&pack);
		pack.extend_from_slice(checksum.as_bytes());
		Ok(pack)
	}
}

fn to_u32(n: usize) -> Result<u32, StoreError> {
	u32::try_from(n)
		.map_err(|_| StoreError::InvalidPack { message: format!("{} exceeds pack limits", n) })
}

/// Verify the checksum and split a pack into its objects
pub fn parse_pack(data: &[u8]) -> Result<Vec<PackedObject>, StoreError> {
	if data.len() < HEADER_LEN + CHECKSUM_LEN {
		return Err(invalid(format!("pack too short: {} bytes", data.len())));
	}
	if &data[..4] != PACK_SIGNATURE {
		return Err(invalid("bad signature".to_string()));
	}

	let (body, trailer) = data.split_at(data.len() - CHECKSUM_LEN);
	if blake3::hash(body).as_bytes() != trailer {
		return Err(invalid("checksum mismatch".to_string()));
	}

	let version = read_u32(body, 4)?;
	if version != PACK_VERSION {
		return Err(invalid(format!("unsupported version {}", version)));
	}
	let count = read_u32(body, 8)? as usize;

	let mut objects = Vec::with_capacity(count.min(4096));
	let mut pos = HEADER_LEN;
	for index in 0..count {
		let code = *body.get(pos).ok_or_else(|| invalid(format!("truncated at object {}", index)))?;
		let kind = ObjectKind::from_code(code)
			.ok_or_else(|| invalid(format!("unknown object type {}", code)))?;
		let len = read_u32(body, pos + 1)? as usize;
		let start = pos + 5;
		let end = start
			.checked_add(len)
			.filter(|end| *end <= body.len())
			.ok_or_else(|| invalid(format!("object {} overruns pack", index)))?;
		objects.push(PackedObject { kind, data: body[start..end].to_vec() });
		pos = end;
	}

	if pos != body.len() {
		return Err(invalid(format!("{} trailing bytes", body.len() - pos)));
	}
	Ok(objects)
}

fn read_u32(data: &[u8], at: usize) -> Result<u32, StoreError> {
	let bytes: [u8; 4] = data
		.get(at..at + 4)
		.and_then(|s| s.try_into().ok())
		.ok_or_else(|| invalid(format!("truncated header at offset {}", at)))?;
	Ok(u32::from_be_bytes(bytes))
}

fn invalid(message: String) -> StoreError {
	StoreError::InvalidPack { message }
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_pack() -> Vec<u8> {
		let mut builder = PackBuilder::new();
		builder.add(PackedObject { kind: ObjectKind::Blob, data: b"hello".to_vec() });
		builder.add(PackedObject { kind: ObjectKind::Commit, data: b"{}".to_vec() });
		builder.add(PackedObject { kind: ObjectKind::Blob, data: vec![0xff, 0x00, 0xfe] });
		builder.build().unwrap()
	}

	#[test]
	fn test_parse_built_pack() {
		let objects = parse_pack(&sample_pack()).unwrap();
		assert_eq!(objects.len(), 3);
		assert_eq!(objects[1].kind, ObjectKind::Commit);
		assert_eq!(objects[2].data, vec![0xff, 0x00, 0xfe]);
	}

	#[test]
	fn test_empty_pack() {
		let pack = PackBuilder::new().build().unwrap();
		assert_eq!(pack.len(), 12 + 32);
		assert!(parse_pack(&pack).unwrap().is_empty());
	}

	#[test]
	fn test_corrupted_byte_fails_checksum() {
		let mut pack = sample_pack();
		pack[14] ^= 0x01;
		let err = parse_pack(&pack).unwrap_err();
		assert!(err.to_string().contains("checksum"));
	}

	#[test]
	fn test_truncated_pack_rejected() {
		let pack = sample_pack();
		assert!(parse_pack(&pack[..20]).is_err());
		assert!(parse_pack(b"GLPK").is_err());
	}

	#[test]
	fn test_object_id_depends_on_kind() {
		assert_ne!(object_id(ObjectKind::Blob, b"x"), object_id(ObjectKind::Commit, b"x"));
		assert_eq!(object_id(ObjectKind::Blob, b"x"), object_id(ObjectKind::Blob, b"x"));
	}
}

// vim: ts=4

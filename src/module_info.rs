//! Module name discovery for module path entries
//!
//! Reads just enough of a `module-info.class` to find the module name, and
//! derives automatic module names from jar file names when a jar carries no
//! descriptor.

use crate::{PackError, PackResult};

const CLASS_MAGIC: u32 = 0xCAFE_BABE;
const ACC_MODULE: u16 = 0x8000;

const CONSTANT_UTF8: u8 = 1;
const CONSTANT_INTEGER: u8 = 3;
const CONSTANT_FLOAT: u8 = 4;
const CONSTANT_LONG: u8 = 5;
const CONSTANT_DOUBLE: u8 = 6;
const CONSTANT_CLASS: u8 = 7;
const CONSTANT_STRING: u8 = 8;
const CONSTANT_FIELDREF: u8 = 9;
const CONSTANT_METHODREF: u8 = 10;
const CONSTANT_INTERFACE_METHODREF: u8 = 11;
const CONSTANT_NAME_AND_TYPE: u8 = 12;
const CONSTANT_METHOD_HANDLE: u8 = 15;
const CONSTANT_METHOD_TYPE: u8 = 16;
const CONSTANT_DYNAMIC: u8 = 17;
const CONSTANT_INVOKE_DYNAMIC: u8 = 18;
const CONSTANT_MODULE: u8 = 19;
const CONSTANT_PACKAGE: u8 = 20;

#[derive(Debug, Clone)]
enum Constant {
    Utf8(String),
    Module(u16),
    Other,
}

struct ClassCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ClassCursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> PackResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| PackError::InvalidClassFile("Unexpected end of class file".into()))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> PackResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> PackResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> PackResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn skip(&mut self, n: usize) -> PackResult<()> {
        self.take(n).map(|_| ())
    }

    fn skip_attributes(&mut self) -> PackResult<()> {
        let count = self.u16()?;
        for _ in 0..count {
            self.skip(2)?;
            let len = self.u32()? as usize;
            self.skip(len)?;
        }
        Ok(())
    }

    fn skip_members(&mut self) -> PackResult<()> {
        let count = self.u16()?;
        for _ in 0..count {
            self.skip(6)?;
            self.skip_attributes()?;
        }
        Ok(())
    }
}

fn read_constant_pool(cursor: &mut ClassCursor<'_>) -> PackResult<Vec<Constant>> {
    let count = cursor.u16()? as usize;
    let mut pool = vec![Constant::Other; count.max(1)];

    let mut index = 1;
    while index < count {
        let tag = cursor.u8()?;
        let mut slots = 1;
        pool[index] = match tag {
            CONSTANT_UTF8 => {
                let len = cursor.u16()? as usize;
                let bytes = cursor.take(len)?;
                let text = String::from_utf8(bytes.to_vec()).map_err(|_| {
                    PackError::InvalidClassFile(format!("Unsupported UTF-8 constant at #{}", index))
                })?;
                Constant::Utf8(text)
            }
            CONSTANT_MODULE => Constant::Module(cursor.u16()?),
            CONSTANT_CLASS | CONSTANT_STRING | CONSTANT_METHOD_TYPE | CONSTANT_PACKAGE => {
                cursor.skip(2)?;
                Constant::Other
            }
            CONSTANT_METHOD_HANDLE => {
                cursor.skip(3)?;
                Constant::Other
            }
            CONSTANT_INTEGER
            | CONSTANT_FLOAT
            | CONSTANT_FIELDREF
            | CONSTANT_METHODREF
            | CONSTANT_INTERFACE_METHODREF
            | CONSTANT_NAME_AND_TYPE
            | CONSTANT_DYNAMIC
            | CONSTANT_INVOKE_DYNAMIC => {
                cursor.skip(4)?;
                Constant::Other
            }
            CONSTANT_LONG | CONSTANT_DOUBLE => {
                cursor.skip(8)?;
                slots = 2;
                Constant::Other
            }
            other => {
                return Err(PackError::InvalidClassFile(format!(
                    "Unknown constant pool tag {} at #{}",
                    other, index
                )))
            }
        };
        index += slots;
    }

    Ok(pool)
}

fn utf8_at(pool: &[Constant], index: u16) -> PackResult<&str> {
    match pool.get(index as usize) {
        Some(Constant::Utf8(s)) => Ok(s),
        _ => Err(PackError::InvalidClassFile(format!(
            "Constant #{} is not a UTF-8 entry",
            index
        ))),
    }
}

/// Read the module name from the bytes of a `module-info.class`
pub fn read_module_name(class_file: &[u8]) -> PackResult<String> {
    let mut cursor = ClassCursor::new(class_file);

    if cursor.u32()? != CLASS_MAGIC {
        return Err(PackError::InvalidClassFile("Bad magic number".into()));
    }
    cursor.skip(4)?; // minor + major version

    let pool = read_constant_pool(&mut cursor)?;

    let access_flags = cursor.u16()?;
    if access_flags & ACC_MODULE == 0 {
        return Err(PackError::InvalidClassFile(
            "Not a module descriptor (ACC_MODULE not set)".into(),
        ));
    }

    cursor.skip(4)?; // this_class, super_class
    let interfaces = cursor.u16()? as usize;
    cursor.skip(interfaces * 2)?;
    cursor.skip_members()?; // fields
    cursor.skip_members()?; // methods

    let attributes = cursor.u16()?;
    for _ in 0..attributes {
        let name_index = cursor.u16()?;
        let len = cursor.u32()? as usize;
        if utf8_at(&pool, name_index)? == "Module" {
            let mut body = ClassCursor::new(cursor.take(len)?);
            let module_index = body.u16()?;
            return match pool.get(module_index as usize) {
                Some(Constant::Module(name_index)) => {
                    Ok(utf8_at(&pool, *name_index)?.replace('/', "."))
                }
                _ => Err(PackError::InvalidClassFile(format!(
                    "Constant #{} is not a module entry",
                    module_index
                ))),
            };
        }
        cursor.skip(len)?;
    }

    Err(PackError::InvalidClassFile("Missing Module attribute".into()))
}

/// Derive an automatic module name from a jar file name
///
/// `foo-bar-1.2.3.jar` becomes `foo.bar`. Returns `None` when nothing usable
/// is left.
pub fn derive_automatic_module_name(file_name: &str) -> Option<String> {
    let mut name = file_name.strip_suffix(".jar").unwrap_or(file_name);

    if let Some(cut) = version_suffix_start(name) {
        name = &name[..cut];
    }

    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if c.is_ascii_alphanumeric() { c } else { '.' };
        if c == '.' && (out.is_empty() || out.ends_with('.')) {
            continue;
        }
        out.push(c);
    }
    while out.ends_with('.') {
        out.pop();
    }

    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

/// Position of the first `-<digits>` followed by `.` or end of name
fn version_suffix_start(name: &str) -> Option<usize> {
    let bytes = name.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b != b'-' {
            continue;
        }
        let digits = bytes[i + 1..]
            .iter()
            .take_while(|c| c.is_ascii_digit())
            .count();
        if digits == 0 {
            continue;
        }
        match bytes.get(i + 1 + digits) {
            None | Some(b'.') => return Some(i),
            _ => continue,
        }
    }
    None
}

//! Reading 32-bit Mach-O relocatable objects.
//!
//! The reader parses just what the linker consumes: the section list (with
//! raw contents and relocation entries) and the symbol table. Only i386
//! objects are accepted. Sections are kept in file order across all load
//! commands, which is what makes the 1-based section ordinals in symbol
//! entries meaningful.

use std::fs;
use std::path::Path;

use snafu::ResultExt;

use super::writer::{
  CPU_TYPE_I386, FILE_HEADER_LEN, LC_SEGMENT, LC_SYMTAB, MH_MAGIC, MH_OBJECT,
  SECTION32_LEN, SECTION_TYPE_MASK, SEGMENT32_LEN, S_ZEROFILL,
};
use super::{IoSnafu, LinkError};

/// High bit of the first word marks a scattered relocation entry.
const R_SCATTERED: u32 = 0x8000_0000;

/// One relocation entry: a byte offset within its section and the patch
/// width as a power of two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reloc {
  pub addr: u32,
  pub len: u8,
}

/// One symbol table entry. `sect` is the 1-based ordinal of the section the
/// symbol is defined in; 0 means undefined.
#[derive(Debug, Clone)]
pub struct Symbol {
  pub name: String,
  pub sect: u8,
  pub value: u32,
}

#[derive(Debug)]
struct SectionHeader {
  name: String,
  addr: u32,
  size: u32,
  offset: u32,
  reloff: u32,
  nreloc: u32,
  flags: u32,
}

#[derive(Debug)]
pub struct ObjectFile {
  data: Vec<u8>,
  sections: Vec<SectionHeader>,
  symbols: Vec<Symbol>,
}

impl ObjectFile {
  pub fn open(path: &Path) -> Result<ObjectFile, LinkError> {
    let data = fs::read(path).context(IoSnafu)?;
    ObjectFile::parse(data)
  }

  pub fn parse(data: Vec<u8>) -> Result<ObjectFile, LinkError> {
    let magic = read_u32(&data, 0)?;
    if magic != MH_MAGIC {
      return Err(malformed("bad magic"));
    }
    let cputype = read_u32(&data, 4)?;
    if cputype != CPU_TYPE_I386 {
      return Err(LinkError::UnsupportedCpu { cputype });
    }
    let filetype = read_u32(&data, 12)?;
    if filetype != MH_OBJECT {
      return Err(malformed("not a relocatable object"));
    }
    let ncmds = read_u32(&data, 16)?;

    let mut sections = Vec::new();
    let mut symbols = Vec::new();
    let mut off = FILE_HEADER_LEN as usize;
    for _ in 0..ncmds {
      let cmd = read_u32(&data, off)?;
      let cmdsize = read_u32(&data, off + 4)? as usize;
      if cmdsize < 8 {
        return Err(malformed("load command too short"));
      }
      match cmd {
        LC_SEGMENT => {
          let nsects = read_u32(&data, off + 48)?;
          let expect = SEGMENT32_LEN as usize + nsects as usize * SECTION32_LEN as usize;
          if cmdsize < expect {
            return Err(malformed("segment command too short"));
          }
          let mut sect_off = off + SEGMENT32_LEN as usize;
          for _ in 0..nsects {
            sections.push(SectionHeader {
              name: read_name16(&data, sect_off)?,
              addr: read_u32(&data, sect_off + 32)?,
              size: read_u32(&data, sect_off + 36)?,
              offset: read_u32(&data, sect_off + 40)?,
              reloff: read_u32(&data, sect_off + 48)?,
              nreloc: read_u32(&data, sect_off + 52)?,
              flags: read_u32(&data, sect_off + 56)?,
            });
            sect_off += SECTION32_LEN as usize;
          }
        }
        LC_SYMTAB => {
          let symoff = read_u32(&data, off + 8)? as usize;
          let nsyms = read_u32(&data, off + 12)? as usize;
          let stroff = read_u32(&data, off + 16)? as usize;
          let strsize = read_u32(&data, off + 20)? as usize;
          let strtab = data
            .get(stroff..stroff + strsize)
            .ok_or_else(|| malformed("string table out of bounds"))?;
          for i in 0..nsyms {
            let entry = symoff + i * 12;
            let n_strx = read_u32(&data, entry)? as usize;
            let n_sect = *data
              .get(entry + 5)
              .ok_or_else(|| malformed("symbol table out of bounds"))?;
            let n_value = read_u32(&data, entry + 8)?;
            symbols.push(Symbol {
              name: read_cstr(strtab, n_strx),
              sect: n_sect,
              value: n_value,
            });
          }
        }
        _ => {}
      }
      off += cmdsize;
    }

    Ok(ObjectFile {
      data,
      sections,
      symbols,
    })
  }

  /// The virtual address and raw content of a named section. Zero-fill
  /// sections read as zeros.
  pub fn section(&self, name: &str) -> Result<(u32, Vec<u8>), LinkError> {
    let sect = self.find(name)?;
    if sect.flags & SECTION_TYPE_MASK == S_ZEROFILL {
      return Ok((sect.addr, vec![0; sect.size as usize]));
    }
    let start = sect.offset as usize;
    let content = self
      .data
      .get(start..start + sect.size as usize)
      .ok_or_else(|| malformed("section content out of bounds"))?;
    Ok((sect.addr, content.to_vec()))
  }

  /// The relocation entries attached to a named section.
  pub fn relocs(&self, name: &str) -> Result<Vec<Reloc>, LinkError> {
    let sect = self.find(name)?;
    let mut relocs = Vec::with_capacity(sect.nreloc as usize);
    for i in 0..sect.nreloc as usize {
      let entry = sect.reloff as usize + i * 8;
      let word0 = read_u32(&self.data, entry)?;
      let word1 = read_u32(&self.data, entry + 4)?;
      let reloc = if word0 & R_SCATTERED != 0 {
        // Scattered entry: address in the low 24 bits of the first word,
        // length packed above it.
        Reloc {
          addr: word0 & 0x00ff_ffff,
          len: ((word0 >> 28) & 0x3) as u8,
        }
      } else {
        Reloc {
          addr: word0,
          len: ((word1 >> 25) & 0x3) as u8,
        }
      };
      relocs.push(reloc);
    }
    Ok(relocs)
  }

  /// The symbol table, rejecting undefined entries: the executable we link
  /// claims MH_NOUNDEFS, so the input must resolve everything itself.
  pub fn symbols(&self) -> Result<&[Symbol], LinkError> {
    for sym in &self.symbols {
      if sym.sect == 0 {
        return Err(LinkError::UndefinedSymbol {
          name: sym.name.clone(),
        });
      }
    }
    Ok(&self.symbols)
  }

  /// The virtual offset of the entry symbol, literally named `start`,
  /// within `__text`.
  pub fn entry(&self) -> Result<u32, LinkError> {
    for sym in &self.symbols {
      if sym.name != "start" || sym.sect == 0 {
        continue;
      }
      if let Some(sect) = self.sections.get(sym.sect as usize - 1) {
        if sect.name == "__text" {
          return Ok(sym.value);
        }
      }
    }
    Err(LinkError::EntryNotFound)
  }

  fn find(&self, name: &str) -> Result<&SectionHeader, LinkError> {
    self
      .sections
      .iter()
      .find(|sect| sect.name == name)
      .ok_or_else(|| LinkError::SectionNotFound {
        name: name.to_string(),
      })
  }
}

fn malformed(reason: &str) -> LinkError {
  LinkError::Malformed {
    reason: reason.to_string(),
  }
}

fn read_u32(data: &[u8], off: usize) -> Result<u32, LinkError> {
  match data.get(off..off + 4) {
    Some(b) => Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]])),
    None => Err(malformed("unexpected end of file")),
  }
}

/// A 16-byte, NUL-padded name field.
fn read_name16(data: &[u8], off: usize) -> Result<String, LinkError> {
  let field = data
    .get(off..off + 16)
    .ok_or_else(|| malformed("unexpected end of file"))?;
  Ok(read_cstr(field, 0))
}

/// The NUL-terminated string at `off`, or everything to the end of the
/// buffer if no terminator is found.
fn read_cstr(data: &[u8], off: usize) -> String {
  let tail = data.get(off..).unwrap_or(&[]);
  let end = tail.iter().position(|&b| b == 0).unwrap_or(tail.len());
  String::from_utf8_lossy(&tail[..end]).into_owned()
}

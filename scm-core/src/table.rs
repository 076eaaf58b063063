//! Opcode definition table and the INI-style listing loader.

use std::collections::HashMap;

use anyhow::{Context, Result};
use log::debug;

use crate::opcode::NEGATED_BIT;
use crate::operand::OperandType;

/// One expected operand slot of a command definition.
///
/// Listings only say that an operand exists, via a `%Nd%` token; the
/// concrete type stays [`OperandType::Unknown`] until the first decoded
/// occurrence reveals it and the table is refined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperandSlot {
    pub ty: OperandType,
    /// Numeric value of the `%Nd%` token that produced this slot.
    pub width: u8,
}

/// Canonical description of one command shared by all of its
/// occurrences in a script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    pub opcode: u16,
    /// Display template; the token `$i` stands for operand `i`.
    pub name: String,
    pub operands: Vec<OperandSlot>,
}

impl Definition {
    pub fn new(opcode: u16, name: impl Into<String>, types: &[OperandType]) -> Self {
        Self {
            opcode,
            name: name.into(),
            operands: types
                .iter()
                .enumerate()
                .map(|(i, &ty)| OperandSlot {
                    ty,
                    width: (i + 1) as u8,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct OpcodeTable {
    defs: HashMap<u16, Definition>,
}

impl OpcodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn lookup(&self, opcode: u16) -> Option<&Definition> {
        self.defs.get(&opcode)
    }

    /// Register a definition. Opcodes with a clear high nibble are
    /// mirrored at `opcode | 0x8000` (the negated form) unless that
    /// slot is already taken by a real entry.
    pub fn register(&mut self, def: Definition) {
        let opcode = def.opcode;
        if opcode & 0xF000 == 0 {
            let negated = opcode | NEGATED_BIT;
            if !self.defs.contains_key(&negated) {
                let mut mirror = def.clone();
                mirror.opcode = negated;
                self.defs.insert(negated, mirror);
            }
        }
        self.defs.insert(opcode, def);
    }

    /// Record a type discovered while decoding. Only placeholder slots
    /// are refined; a concrete type from the listing is authoritative.
    pub fn refine(&mut self, opcode: u16, slot: usize, ty: OperandType) {
        if let Some(def) = self.defs.get_mut(&opcode) {
            if let Some(op) = def.operands.get_mut(slot) {
                if op.ty == OperandType::Unknown {
                    op.ty = ty;
                }
            }
        }
    }

    /// Parse an opcode listing in the common INI dialect:
    ///
    /// ```text
    /// 0004=2,%1d% = %2d%  ; store immediate
    /// ```
    ///
    /// Section headers and comment lines are skipped, as is anything
    /// after `;` or `//` on a line. Lines without `=` or with a
    /// non-hexadecimal opcode field are ignored rather than fatal.
    pub fn load_from_str(listing: &str) -> Self {
        let mut table = Self::new();

        for line in listing.lines() {
            if line.starts_with(';') || line.starts_with('[') {
                continue;
            }

            let mut line = line;
            if let Some(i) = line.find(';') {
                line = &line[..i];
            }
            if let Some(i) = line.find("//") {
                line = &line[..i];
            }
            let line = line.trim();

            let Some(eq) = line.find('=') else { continue };

            let opcode_field = line[..eq].trim();
            if opcode_field.is_empty()
                || !opcode_field.bytes().all(|b| b.is_ascii_hexdigit())
            {
                continue;
            }
            let Ok(opcode) = u16::from_str_radix(opcode_field, 16) else {
                continue;
            };

            // The name is everything after the first comma; a line
            // without one keeps its full text as the name.
            let info = match line.find(',') {
                Some(i) => line[i + 1..].trim(),
                None => line,
            };

            let (name, widths) = strip_operand_tokens(info);

            let operands = widths
                .into_iter()
                .map(|w| OperandSlot {
                    ty: OperandType::Unknown,
                    width: w,
                })
                .collect();

            table.register(Definition {
                opcode,
                name,
                operands,
            });
        }

        debug!("loaded {} opcode definitions", table.len());
        table
    }

    pub fn load_from_file(path: &std::path::Path) -> Result<Self> {
        let listing = std::fs::read_to_string(path)
            .with_context(|| format!("reading opcode listing {}", path.display()))?;
        Ok(Self::load_from_str(&listing))
    }
}

/// Replace each `%Nd%` token with the placeholder `$<N-1>` and collect
/// the `N` values in order of appearance.
fn strip_operand_tokens(info: &str) -> (String, Vec<u8>) {
    let mut name = info.to_string();
    let mut widths = Vec::new();

    loop {
        let Some(start) = name.find('%') else { break };
        let Some(rel_end) = name[start + 1..].find('%') else {
            break;
        };
        let end = start + 1 + rel_end;

        // Token body minus its trailing format character.
        let body = &name[start + 1..end.saturating_sub(1).max(start + 1)];
        let Ok(n) = body.parse::<u8>() else { break };
        if n == 0 {
            break;
        }

        widths.push(n);
        name.replace_range(start..=end, &format!("${}", n - 1));
    }

    (name, widths)
}
